//! # SyncVault - Encrypted directory-to-repository synchronization
//!
//! A backup and sync engine that mirrors a directory tree into a repository,
//! optionally encrypting every file on the way in and decrypting it on the
//! way out, with tamper-evident metadata and point-in-time restore.
//!
//! ## Overview
//!
//! SyncVault keeps a destination repository in step with a source directory:
//! - Detect changed files via persisted content signatures, a remote
//!   signature check, or a fast dirty-flag check
//! - Encrypt content and metadata with AES-256-GCM before they leave the
//!   source machine (or decrypt on the way back)
//! - Verify two independent signatures on every decryption, so tampered or
//!   corrupted objects are never silently restored
//! - Delete destination objects whose source file is gone and prune the
//!   sidecar store of orphaned records
//! - List and recover historical versions of one object from versioned
//!   backends
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use syncvault::{CheckLevel, EndpointConfig, SyncConfig, SyncEngine, TransformKind};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SyncConfig {
//!     source: EndpointConfig::local("./documents"),
//!     destination: EndpointConfig::local("./backup"),
//!     transform: TransformKind::None,
//!     crypto_key: None,
//!     check_level: CheckLevel::LocalMd5,
//!     no_cleaning: false,
//!     wide_display: false,
//! };
//!
//! let mut engine = SyncEngine::from_config(&config)?;
//! let stats = engine.run()?;
//! println!("synchronized {} files", stats.synchronized);
//! # Ok(())
//! # }
//! ```
//!
//! ## Key Concepts
//!
//! ### The hive
//!
//! A hidden directory (`.syncvault`) mirroring the source tree, holding one
//! signature sidecar per synchronized file and, for objects that are already
//! encrypted on the source side, an encrypted copy of their metadata. Sidecars
//! are the only state the engine itself persists; deleting the hive simply
//! forces a full re-synchronization.
//!
//! ### Signatures
//!
//! Two SHA-256 digests accompany every object: one over the decrypted content
//! bytes and one over the serialized metadata bytes. Both are checked when an
//! object is unsecured, which is what makes stored data tamper-evident
//! end-to-end.
//!
//! ### Check levels
//!
//! Change detection policy per run: `LocalMd5` consults only the local
//! sidecars, `RemoteMd5` additionally asks the destination whether its stored
//! signature still matches, and `ArchiveFlag` trusts a dirty flag and never
//! reads content at all.
//!
//! ### Three phases
//!
//! A run pushes changed files, then deletes ghost objects from the
//! destination, then cleans orphaned sidecars. The last two phases can be
//! switched off for faster incremental runs.
//!
//! ## Module Organization
//!
//! - [`engine`]: the three-phase synchronization state machine
//! - [`transform`]: encrypt/decrypt with integrity verification
//! - [`crypto`]: key material and the AES-256-GCM cipher
//! - [`hive`]: the sidecar namespace (signatures and metadata)
//! - [`discovery`]: directory walking with exclusions and progress
//! - [`repository`]: the source/destination contract backends implement
//! - [`local`]: the local-filesystem destination backend
//! - [`cleaner`]: orphaned-sidecar removal
//! - [`restore`]: version listing and point-in-time recovery
//! - [`config`]: the run configuration surface
//! - [`types`]: the content model and run accounting types
//! - [`error`]: error types and handling

// Public API modules
pub mod cleaner;
pub mod config;
pub mod crypto;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod hive;
pub mod local;
pub mod repository;
pub mod restore;
pub mod signature;
pub mod transform;
pub mod types;

// Internal helpers
mod utils;


// Re-export main types for convenience
pub use cleaner::ArtifactCleaner;
pub use config::{CheckLevel, EndpointConfig, RepositoryKind, SyncConfig, TransformKind};
pub use crypto::{Cipher, CipherKey};
pub use engine::SyncEngine;
pub use error::{Result, SyncError};
pub use hive::{FsHive, MemoryHive, SignatureStore};
pub use local::LocalDestination;
pub use repository::{Destination, Source};
pub use restore::{FetchedVersion, Restorer, VersionProvider};
pub use transform::{SecureTransform, Transform, UnsecureTransform};
pub use types::{
    DiscoveredObject, FileAttributes, FileMetadata, FileObject, ObjectKind, ObjectVersion,
    ProgressCallback, ProgressInfo, SyncStats,
};
