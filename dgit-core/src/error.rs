//! Error type for repository operations.
//!
//! The messages are what the command line prints, so they are phrased for
//! the user rather than for a log.

use std::path::PathBuf;

use crate::storage::StorageError;

pub type Result<T> = std::result::Result<T, RepoError>;

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    // Repository lifecycle
    #[error("A dgit version-control system already exists in {0:?}.")]
    AlreadyInitialized(PathBuf),

    #[error("Not in an initialized dgit directory.")]
    NotInitialized,

    // Not found
    #[error("File does not exist: {0}")]
    FileNotFound(String),

    #[error("No commit with that id exists: {0}")]
    CommitNotFound(String),

    #[error("Commit id prefix {prefix} is ambiguous ({matches} matches).")]
    AmbiguousCommit { prefix: String, matches: usize },

    #[error("File does not exist in that commit: {0}")]
    FileNotInCommit(String),

    #[error("No such branch exists: {0}")]
    BranchNotFound(String),

    #[error("Found no commit with that message.")]
    NoCommitWithMessage,

    #[error("A remote with that name does not exist: {0}")]
    RemoteNotFound(String),

    #[error("Remote directory not found: {0:?}")]
    RemoteDirNotFound(PathBuf),

    #[error("That remote does not have that branch: {0}")]
    RemoteBranchNotFound(String),

    #[error("Cannot fetch into the checked-out branch: {0}")]
    FetchIntoCurrentBranch(String),

    // Preconditions
    #[error("A branch with that name already exists: {0}")]
    BranchExists(String),

    #[error("Cannot remove the current branch.")]
    RemoveCurrentBranch,

    #[error("No need to checkout the current branch.")]
    AlreadyOnBranch,

    #[error("No changes added to the commit.")]
    NothingToCommit,

    #[error("Please enter a commit message.")]
    EmptyMessage,

    #[error("No reason to remove the file: {0}")]
    NothingToRemove(String),

    #[error("There is an untracked file in the way; delete it, or add and commit it first: {0}")]
    UntrackedFileInTheWay(String),

    #[error("You have uncommitted changes.")]
    UncommittedChanges,

    #[error("Cannot merge a branch with itself.")]
    MergeWithSelf,

    #[error("A remote with that name already exists: {0}")]
    RemoteExists(String),

    #[error("Remote refers to this repository.")]
    RemoteIsSelf,

    // Divergence
    #[error("Please pull down remote changes before pushing.")]
    RemoteDiverged,

    // Structural
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupted repository state: {0}")]
    State(#[from] serde_json::Error),
}
