//! # SyncVault CLI - Encrypted directory backup and restore
//!
//! Command-line interface for the SyncVault synchronization engine.
//!
//! ## Usage
//! ```bash
//! # Generate key material
//! syncvault keygen --output backup.key
//!
//! # Mirror a directory, encrypting every file
//! syncvault sync -s ./documents -d ./backup --transform secure --key backup.key
//!
//! # Decrypt the mirror back into a plain directory
//! syncvault sync -s ./backup -d ./recovered --transform unsecure --key backup.key
//!
//! # List and restore stored versions of one object
//! syncvault versions -r ./backup docs/report.txt
//! syncvault restore -r ./backup --key backup.key docs/report.txt
//! ```

use clap::{Parser, Subcommand};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use syncvault::{
    ArtifactCleaner, CheckLevel, CipherKey, EndpointConfig, LocalDestination, ProgressInfo,
    RepositoryKind, Restorer, SyncConfig, SyncEngine, SyncStats, TransformKind, VersionProvider,
};
use tracing_subscriber::EnvFilter;

/// SyncVault CLI - encrypted directory-to-repository synchronization
#[derive(Parser)]
#[command(name = "syncvault")]
#[command(version)]
#[command(about = "Mirror a directory into a repository with encryption and point-in-time restore")]
#[command(long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synchronize a source directory into a destination repository
    Sync {
        /// Source directory
        #[arg(short, long)]
        source: PathBuf,

        /// Destination directory
        #[arg(short, long)]
        destination: PathBuf,

        /// Source repository kind
        #[arg(long, default_value = "local")]
        source_kind: RepositoryKind,

        /// Destination repository kind
        #[arg(long, default_value = "local")]
        destination_kind: RepositoryKind,

        /// Transform applied to every pushed file
        #[arg(short, long, default_value = "none")]
        transform: TransformKind,

        /// Key file (mandatory with a transform)
        #[arg(short, long)]
        key: Option<PathBuf>,

        /// Change-detection policy
        #[arg(short, long, default_value = "localmd5")]
        check_level: CheckLevel,

        /// Skip the ghost-deletion and artifact-cleaning phases
        #[arg(long)]
        no_cleaning: bool,

        /// Log full object paths instead of truncated ones
        #[arg(short, long)]
        wide: bool,

        /// Show a progress bar
        #[arg(long)]
        progress: bool,
    },

    /// Generate a key file for the secure/unsecure transforms
    Keygen {
        /// Where to write the key file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Remove orphaned sidecars without running a full sync
    Clean {
        /// Directory whose hive should be cleaned
        #[arg(short, long)]
        source: PathBuf,

        /// Log full object paths instead of truncated ones
        #[arg(short, long)]
        wide: bool,
    },

    /// List the stored versions of one object
    Versions {
        /// Repository directory
        #[arg(short, long)]
        repository: PathBuf,

        /// Object name (relative path, with or without the encrypted suffix)
        name: String,
    },

    /// Restore one stored version of an object
    Restore {
        /// Repository directory
        #[arg(short, long)]
        repository: PathBuf,

        /// Key file used when the repository was written
        #[arg(short, long)]
        key: PathBuf,

        /// Object name (relative path, with or without the encrypted suffix)
        name: String,

        /// Version index as printed by `versions` (1 = newest)
        #[arg(long, default_value = "1")]
        version: usize,

        /// Output path (derived from the version identifier if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Answer yes to every confirmation question
        #[arg(short, long)]
        yes: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("syncvault=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("syncvault=info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    if let Err(e) = run(cli) {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Sync {
            source,
            destination,
            source_kind,
            destination_kind,
            transform,
            key,
            check_level,
            no_cleaning,
            wide,
            progress,
        } => {
            let config = SyncConfig {
                source: EndpointConfig {
                    kind: source_kind,
                    path: source,
                    credentials: None,
                },
                destination: EndpointConfig {
                    kind: destination_kind,
                    path: destination,
                    credentials: None,
                },
                transform,
                crypto_key: key,
                check_level,
                no_cleaning,
                wide_display: wide,
            };
            sync(&config, progress)
        }
        Commands::Keygen { output } => keygen(&output),
        Commands::Clean { source, wide } => clean(&source, wide),
        Commands::Versions { repository, name } => versions(&repository, &name),
        Commands::Restore {
            repository,
            key,
            name,
            version,
            output,
            yes,
        } => restore(&repository, &key, &name, version, output.as_deref(), yes),
    }
}

fn sync(config: &SyncConfig, progress: bool) -> anyhow::Result<()> {
    let started = Instant::now();
    let mut engine = SyncEngine::from_config(config)?;

    if progress {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
                .progress_chars("#>-"),
        );
        let bar_ref = bar.clone();
        engine = engine.with_progress(Arc::new(move |info: ProgressInfo| {
            bar_ref.set_length(info.total as u64);
            bar_ref.set_position(info.processed as u64);
            if let Some(current) = info.current {
                bar_ref.set_message(current);
            }
        }));
        let stats = engine.run()?;
        bar.finish_and_clear();
        print_stats(&stats, started.elapsed());
        exit_code_for(&stats)
    } else {
        let stats = engine.run()?;
        print_stats(&stats, started.elapsed());
        exit_code_for(&stats)
    }
}

fn print_stats(stats: &SyncStats, elapsed: std::time::Duration) {
    println!();
    println!("{}", "Synchronization finished".bold());
    println!("  scanned:      {}", stats.scanned);
    println!("  synchronized: {}", stats.synchronized.to_string().green());
    println!("  ignored:      {}", stats.ignored);
    println!("  deleted:      {}", stats.deleted);
    if stats.has_errors() {
        println!("  errors:       {}", stats.errors.to_string().red().bold());
    } else {
        println!("  errors:       0");
    }
    println!(
        "  {} read, {} written in {:.1}s",
        human_bytes(stats.bytes_read),
        human_bytes(stats.bytes_written),
        elapsed.as_secs_f32()
    );
}

fn exit_code_for(stats: &SyncStats) -> anyhow::Result<()> {
    if stats.has_errors() {
        anyhow::bail!("{} object(s) failed; see the log for details", stats.errors);
    }
    Ok(())
}

fn keygen(output: &std::path::Path) -> anyhow::Result<()> {
    if output.exists() {
        anyhow::bail!("{} already exists; refusing to overwrite key material", output.display());
    }
    let key = CipherKey::generate();
    key.save(output)?;
    println!("{} {}", "Key written to".green(), output.display().to_string().bold());
    println!("Keep this file safe: without it, secured objects cannot be recovered.");
    Ok(())
}

fn clean(source: &std::path::Path, wide: bool) -> anyhow::Result<()> {
    let mut stats = SyncStats::default();
    ArtifactCleaner::new(source)
        .with_wide_display(wide)
        .process(&mut stats)?;
    println!(
        "Removed {} orphaned artifact(s), {} error(s)",
        stats.deleted.to_string().green(),
        stats.errors
    );
    Ok(())
}

fn versions(repository: &std::path::Path, name: &str) -> anyhow::Result<()> {
    let dest = LocalDestination::new(repository, None)?;
    let versions = dest.get_versions(name)?;

    println!("{}", format!("Versions of {}", name).bold());
    for (index, version) in versions.iter().enumerate() {
        println!(
            "  {}. {} {} [{}] {} {}",
            index + 1,
            version.created.format("%Y-%m-%d %H:%M:%S"),
            version.name,
            human_bytes(version.size),
            version.storage_class.dimmed(),
            version.version_id.dimmed()
        );
    }
    Ok(())
}

fn restore(
    repository: &std::path::Path,
    key_path: &std::path::Path,
    name: &str,
    version_index: usize,
    output: Option<&std::path::Path>,
    yes: bool,
) -> anyhow::Result<()> {
    let key = CipherKey::load(key_path)?;
    let dest = LocalDestination::new(repository, Some(&key))?;

    let versions = dest.get_versions(name)?;
    let version = versions
        .get(version_index.wrapping_sub(1))
        .ok_or_else(|| {
            anyhow::anyhow!("version {version_index} not found ({} available)", versions.len())
        })?;

    let confirm = |question: &str| {
        if yes {
            return true;
        }
        print!("{} [y/N] ", question.yellow());
        let _ = io::stdout().flush();
        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim(), "y" | "Y" | "yes")
    };

    let restorer = Restorer::new(&dest, &key)?;
    let written = restorer.restore(name, version, output, &confirm)?;
    println!("{} {}", "Restored to".green(), written.display().to_string().bold());
    Ok(())
}

fn human_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[unit])
    } else {
        format!("{:.2} {}", size, UNITS[unit])
    }
}
