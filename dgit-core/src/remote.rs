//! Remote synchronization over a shared filesystem.
//!
//! A remote is another repository's metadata directory reachable by path.
//! History moves between the two through [`ObjectStore`] and
//! [`RemoteHandle`], so a different transport only needs another
//! implementation of those traits.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use crate::error::{RepoError, Result};
use crate::graph::CommitGraph;
use crate::merge::MergeOutcome;
use crate::object::{Commit, ObjectId};
use crate::repository::{RepoState, Repository, META_DIR, STATE_FILE};
use crate::storage::{ContentStore, StorageError};

/// Commit and blob access on one side of a transfer.
pub trait ObjectStore {
    fn has_commit(&self, id: &ObjectId) -> bool;
    fn read_commit(&self, id: &ObjectId) -> Result<Commit>;
    fn write_commit(&self, commit: &Commit) -> Result<()>;
    fn has_blob(&self, id: &ObjectId) -> bool;
    fn read_blob(&self, id: &ObjectId) -> Result<Vec<u8>>;
    fn write_blob(&self, data: &[u8]) -> Result<ObjectId>;
}

/// A repository on the other end: its objects plus its branch map.
pub trait RemoteHandle: ObjectStore {
    fn uuid(&self) -> &str;
    fn branch(&self, name: &str) -> Option<ObjectId>;
    fn set_branch(&mut self, name: &str, tip: ObjectId);
    /// Write the branch map back to the remote.
    fn persist(&self) -> Result<()>;
}

/// Local commit graph and blob store viewed as an [`ObjectStore`].
pub struct LocalObjects<'a> {
    graph: &'a CommitGraph,
    blobs: &'a ContentStore,
}

impl<'a> LocalObjects<'a> {
    pub fn new(graph: &'a CommitGraph, blobs: &'a ContentStore) -> Self {
        Self { graph, blobs }
    }
}

impl ObjectStore for LocalObjects<'_> {
    fn has_commit(&self, id: &ObjectId) -> bool {
        self.graph.contains(id)
    }

    fn read_commit(&self, id: &ObjectId) -> Result<Commit> {
        self.graph.get(id)
    }

    fn write_commit(&self, commit: &Commit) -> Result<()> {
        self.graph.store(commit)
    }

    fn has_blob(&self, id: &ObjectId) -> bool {
        self.blobs.contains(id)
    }

    fn read_blob(&self, id: &ObjectId) -> Result<Vec<u8>> {
        Ok(self.blobs.get(id)?)
    }

    fn write_blob(&self, data: &[u8]) -> Result<ObjectId> {
        Ok(self.blobs.put(data)?)
    }
}

/// Another repository on a shared filesystem.
pub struct FsRemote {
    meta_dir: PathBuf,
    state: RepoState,
    graph: CommitGraph,
    blobs: ContentStore,
}

impl FsRemote {
    /// Open the repository at `path`, which may be its metadata directory or
    /// the working directory that contains one.
    pub fn open(path: &Path) -> Result<Self> {
        let nested = path.join(META_DIR);
        let meta_dir = if nested.is_dir() { nested } else { path.to_path_buf() };
        if !meta_dir.join(STATE_FILE).is_file() {
            return Err(RepoError::RemoteDirNotFound(path.to_path_buf()));
        }
        let state = RepoState::load(&meta_dir)?;
        Ok(Self {
            graph: CommitGraph::open(meta_dir.join("commits"))?,
            blobs: ContentStore::open(meta_dir.join("storage"))?,
            meta_dir,
            state,
        })
    }

    fn objects(&self) -> LocalObjects<'_> {
        LocalObjects::new(&self.graph, &self.blobs)
    }
}

impl ObjectStore for FsRemote {
    fn has_commit(&self, id: &ObjectId) -> bool {
        self.objects().has_commit(id)
    }

    fn read_commit(&self, id: &ObjectId) -> Result<Commit> {
        self.objects().read_commit(id)
    }

    fn write_commit(&self, commit: &Commit) -> Result<()> {
        self.objects().write_commit(commit)
    }

    fn has_blob(&self, id: &ObjectId) -> bool {
        self.objects().has_blob(id)
    }

    fn read_blob(&self, id: &ObjectId) -> Result<Vec<u8>> {
        self.objects().read_blob(id)
    }

    fn write_blob(&self, data: &[u8]) -> Result<ObjectId> {
        self.objects().write_blob(data)
    }
}

impl RemoteHandle for FsRemote {
    fn uuid(&self) -> &str {
        &self.state.uuid
    }

    fn branch(&self, name: &str) -> Option<ObjectId> {
        self.state.branches.get(name).copied()
    }

    fn set_branch(&mut self, name: &str, tip: ObjectId) {
        self.state.branches.insert(name.to_string(), tip);
    }

    fn persist(&self) -> Result<()> {
        self.state.save(&self.meta_dir)
    }
}

/// Counts of objects copied by a push or fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    pub commits: usize,
    pub blobs: usize,
}

/// Copy `tip` and every ancestor `dst` lacks, blobs before the commits that
/// use them and parents before children.
pub fn copy_history<S, D>(src: &S, dst: &D, tip: &ObjectId) -> Result<TransferStats>
where
    S: ObjectStore + ?Sized,
    D: ObjectStore + ?Sized,
{
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([*tip]);
    let mut missing = Vec::new();
    while let Some(id) = queue.pop_front() {
        if dst.has_commit(&id) || !seen.insert(id) {
            continue;
        }
        let commit = src.read_commit(&id)?;
        queue.extend(commit.parents().iter().copied());
        missing.push(commit);
    }

    let mut stats = TransferStats::default();
    for commit in &parents_first(missing) {
        for blob in commit.files().values() {
            if dst.has_blob(blob) {
                continue;
            }
            let written = dst.write_blob(&src.read_blob(blob)?)?;
            if written != *blob {
                return Err(StorageError::Corrupt {
                    id: blob.to_hex(),
                    reason: format!("content hashes to {}", written),
                }
                .into());
            }
            stats.blobs += 1;
        }
        dst.write_commit(commit)?;
        stats.commits += 1;
        tracing::debug!("copied commit {}", commit.id().short(7));
    }
    Ok(stats)
}

/// Order commits so that every parent in the set precedes its children. An
/// interrupted copy then never leaves a commit whose parent is missing.
fn parents_first(commits: Vec<Commit>) -> Vec<Commit> {
    let order: Vec<ObjectId> = commits.iter().map(Commit::id).collect();
    let mut pending: HashMap<ObjectId, Commit> = commits.into_iter().map(|c| (c.id(), c)).collect();
    let mut sorted = Vec::with_capacity(pending.len());
    for start in order {
        let mut stack = vec![(start, false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                if let Some(commit) = pending.remove(&id) {
                    sorted.push(commit);
                }
                continue;
            }
            let Some(commit) = pending.get(&id) else {
                continue;
            };
            stack.push((id, true));
            for parent in commit.parents() {
                if pending.contains_key(parent) {
                    stack.push((*parent, false));
                }
            }
        }
    }
    sorted
}

impl Repository {
    pub fn add_remote(&mut self, name: &str, path: impl Into<PathBuf>) -> Result<()> {
        if self.state.remotes.contains_key(name) {
            return Err(RepoError::RemoteExists(name.to_string()));
        }
        self.state.remotes.insert(name.to_string(), path.into());
        Ok(())
    }

    pub fn remove_remote(&mut self, name: &str) -> Result<()> {
        self.state
            .remotes
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| RepoError::RemoteNotFound(name.to_string()))
    }

    pub fn open_remote(&self, name: &str) -> Result<FsRemote> {
        let path = self
            .state
            .remotes
            .get(name)
            .ok_or_else(|| RepoError::RemoteNotFound(name.to_string()))?;
        // Relative remote paths are taken from the working directory.
        let remote = FsRemote::open(&self.work_dir.join(path))?;
        if remote.uuid() == self.state.uuid {
            return Err(RepoError::RemoteIsSelf);
        }
        Ok(remote)
    }

    /// Push the current branch's history to `branch` on the configured remote `remote`.
    pub fn push(&self, remote: &str, branch: &str) -> Result<TransferStats> {
        let mut handle = self.open_remote(remote)?;
        let stats = self.push_to(&mut handle, branch)?;
        tracing::info!(
            "pushed {} commit(s), {} blob(s) to {}/{}",
            stats.commits,
            stats.blobs,
            remote,
            branch
        );
        Ok(stats)
    }

    /// Push to any remote. Rejected when the remote branch has commits HEAD does not contain.
    pub fn push_to(&self, remote: &mut dyn RemoteHandle, branch: &str) -> Result<TransferStats> {
        let head = self.branch_tip(&self.state.head)?;
        if let Some(remote_tip) = remote.branch(branch) {
            if !self.graph.ancestors(&head)?.contains(&remote_tip) {
                return Err(RepoError::RemoteDiverged);
            }
        }
        let local = LocalObjects::new(&self.graph, &self.blobs);
        let stats = copy_history(&local, &*remote, &head)?;
        remote.set_branch(branch, head);
        remote.persist()?;
        Ok(stats)
    }

    /// Copy `branch` from the configured remote into the tracking branch `remote/branch`.
    pub fn fetch(&mut self, remote: &str, branch: &str) -> Result<TransferStats> {
        let handle = self.open_remote(remote)?;
        let stats = self.fetch_from(&handle, remote, branch)?;
        tracing::info!(
            "fetched {} commit(s), {} blob(s) from {}/{}",
            stats.commits,
            stats.blobs,
            remote,
            branch
        );
        Ok(stats)
    }

    /// Fails when `remote/branch` is checked out, since moving it would leave the working tree stale.
    pub fn fetch_from(&mut self, remote: &dyn RemoteHandle, remote_name: &str, branch: &str) -> Result<TransferStats> {
        let tracking = tracking_branch(remote_name, branch);
        if tracking == self.state.head {
            return Err(RepoError::FetchIntoCurrentBranch(tracking));
        }
        let tip = remote
            .branch(branch)
            .ok_or_else(|| RepoError::RemoteBranchNotFound(branch.to_string()))?;
        let local = LocalObjects::new(&self.graph, &self.blobs);
        let stats = copy_history(remote, &local, &tip)?;
        self.state.branches.insert(tracking, tip);
        Ok(stats)
    }

    /// Fetch, then merge the tracking branch into the current branch.
    pub fn pull(&mut self, remote: &str, branch: &str) -> Result<MergeOutcome> {
        self.fetch(remote, branch)?;
        self.merge(&tracking_branch(remote, branch))
    }
}

/// Name of the local branch that mirrors `branch` on `remote`.
pub fn tracking_branch(remote: &str, branch: &str) -> String {
    format!("{}/{}", remote, branch)
}
