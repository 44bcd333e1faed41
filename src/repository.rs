//! The repository source/destination contract
//!
//! One canonical trait pair that every backend satisfies identically from
//! the engine's point of view. The engine, cleaner and restore subsystem
//! depend only on these traits, never on backend-specific types; concrete
//! backends (local filesystem here, cloud buckets elsewhere) keep their SDK,
//! auth and paging mechanics behind them.
//!
//! Error policy at this boundary: operations with a contractual boolean
//! outcome (`write`, `delete`, `is_metadata_match`, `after_directory_scan`)
//! catch backend faults at the point of use and fold them into `false`; the
//! caller counts, logs and moves on. Only `get_objects` may propagate an
//! error, because listing has no partial-success story.

use crate::error::Result;
use crate::types::{DiscoveredObject, FileObject};

/// Write side of a repository
pub trait Destination: Send + Sync {
    /// Human-readable description for run headers
    fn description(&self) -> String;

    /// Write one file object (content plus sidecars) into the repository
    ///
    /// Returns `false` on failure; the failure is already logged.
    fn write(&self, fo: &FileObject) -> bool;

    /// Check whether the stored object for `key` matches the source
    ///
    /// Consulted only under the remote check level. `secured` says whether
    /// the stored object carries the encrypted suffix;
    /// `expected_original_signature` is the digest of the source's decrypted
    /// content. Missing objects or signatures simply return `false`.
    fn is_metadata_match(&self, key: &str, secured: bool, expected_original_signature: &str)
        -> bool;

    /// Enumerate every object in the repository
    ///
    /// Paths in the result are rooted relative keys; directory entries
    /// follow their children.
    fn get_objects(&self) -> Result<Vec<DiscoveredObject>>;

    /// Delete the object stored under `key` (as listed by [`get_objects`])
    ///
    /// Also removes any sidecars belonging to the object. Returns `false`
    /// on failure.
    ///
    /// [`get_objects`]: Destination::get_objects
    fn delete(&self, key: &str) -> bool;

    /// Hook fired once every child of `key` finished its ghost-deletion pass
    ///
    /// Lets the destination prune now-empty containers. Must not fire before
    /// all children of the directory have been evaluated.
    fn after_directory_scan(&self, key: &str) -> bool;
}

/// Read side of a repository
///
/// A source drives its own enumeration against a bound destination and
/// transform; [`process`] runs the whole synchronization and reports whether
/// it completed without aborting.
///
/// [`process`]: Source::process
pub trait Source {
    /// Human-readable description for run headers
    fn description(&self) -> String;

    /// Run the synchronization against the bound destination
    fn process(&mut self) -> Result<bool>;
}
