//! dgit core library
//!
//! A small local version-control system:
//! - Content-addressed blob store and immutable commit graph
//! - Staging area and working-directory operations
//! - Branches, checkout, reset and three-way merge
//! - Push / fetch / pull against repositories on a shared filesystem

pub mod clock;
pub mod config;
pub mod error;
pub mod graph;
pub mod merge;
pub mod object;
pub mod remote;
pub mod repository;
pub mod staging;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::RepoConfig;
pub use error::{RepoError, Result};
pub use graph::CommitGraph;
pub use merge::{MergeAction, MergeOutcome};
pub use object::{Commit, FileMap, ObjectId};
pub use remote::{FsRemote, ObjectStore, RemoteHandle, TransferStats};
pub use repository::{Modification, Repository, Status, META_DIR};
pub use staging::StagingArea;
pub use storage::{ContentStore, StorageError};
