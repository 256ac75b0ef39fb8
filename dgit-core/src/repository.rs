//! Repository: branches, HEAD, staging and the working directory.
//!
//! Layout on disk:
//! ```text
//! {work}/.dgit/
//!   config.json          repository configuration
//!   state.json           HEAD, branches, staging area, remotes
//!   commits/{digest}     commit objects (bincode)
//!   storage/{digest}     blob contents
//!   staging/{digest}     copies of staged, uncommitted blobs
//! ```
//!
//! Each command opens the repository, mutates it in memory and the working
//! directory, and calls [`Repository::save`] once at the end. There is no
//! locking: two processes working on the same directory will race.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::clock::{Clock, SystemClock};
use crate::config::RepoConfig;
use crate::error::{RepoError, Result};
use crate::graph::CommitGraph;
use crate::object::{Commit, FileMap, ObjectId};
use crate::staging::{StagingArea, StagingMirror};
use crate::storage::{write_atomic, ContentStore};

/// Name of the metadata directory inside the working directory.
pub const META_DIR: &str = ".dgit";

pub(crate) const STATE_FILE: &str = "state.json";

/// Mutable repository state, persisted as JSON after every successful command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoState {
    pub uuid: String,
    pub head: String,
    pub branches: BTreeMap<String, ObjectId>,
    #[serde(default)]
    pub staging: StagingArea,
    #[serde(default)]
    pub remotes: BTreeMap<String, PathBuf>,
}

impl RepoState {
    pub fn load(meta_dir: &Path) -> Result<Self> {
        let data = fs::read_to_string(meta_dir.join(STATE_FILE))?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn save(&self, meta_dir: &Path) -> Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        write_atomic(&meta_dir.join(STATE_FILE), data.as_bytes())?;
        Ok(())
    }
}

/// How a working file differs from what the next commit would record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modification {
    Modified,
    Deleted,
}

impl std::fmt::Display for Modification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Modification::Modified => write!(f, "modified"),
            Modification::Deleted => write!(f, "deleted"),
        }
    }
}

/// Snapshot reported by `status`. Every list is sorted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub head: String,
    pub branches: Vec<String>,
    pub staged: Vec<String>,
    pub removed: Vec<String>,
    pub unstaged: Vec<(String, Modification)>,
    pub untracked: Vec<String>,
}

pub struct Repository {
    pub(crate) work_dir: PathBuf,
    pub(crate) meta_dir: PathBuf,
    pub(crate) config: RepoConfig,
    pub(crate) state: RepoState,
    pub(crate) blobs: ContentStore,
    pub(crate) mirror: StagingMirror,
    pub(crate) graph: CommitGraph,
    pub(crate) clock: Box<dyn Clock>,
}

impl Repository {
    /// Create a repository in `work_dir` with the default configuration.
    pub fn init(work_dir: &Path) -> Result<Self> {
        Self::init_with(work_dir, RepoConfig::default(), Box::new(SystemClock))
    }

    /// Create a repository with an explicit configuration and clock.
    ///
    /// The root commit always carries timestamp 0 and no files, so every
    /// repository with the same initial message shares the same root and
    /// histories created independently can still be merged.
    pub fn init_with(work_dir: &Path, config: RepoConfig, clock: Box<dyn Clock>) -> Result<Self> {
        let meta_dir = work_dir.join(META_DIR);
        if meta_dir.exists() {
            return Err(RepoError::AlreadyInitialized(work_dir.to_path_buf()));
        }
        fs::create_dir_all(&meta_dir)?;
        config.save(&meta_dir)?;

        let graph = CommitGraph::open(meta_dir.join("commits"))?;
        let root = Commit::new(config.initial_message.clone(), 0, vec![], FileMap::new());
        graph.store(&root)?;

        let state = RepoState {
            uuid: uuid::Uuid::new_v4().to_string(),
            head: config.default_branch.clone(),
            branches: BTreeMap::from([(config.default_branch.clone(), root.id())]),
            staging: StagingArea::new(),
            remotes: BTreeMap::new(),
        };

        let repo = Self {
            work_dir: work_dir.to_path_buf(),
            blobs: ContentStore::open(meta_dir.join("storage"))?,
            mirror: StagingMirror::open(meta_dir.join("staging"))?,
            graph,
            meta_dir,
            config,
            state,
            clock,
        };
        repo.save()?;
        tracing::info!("initialized repository {} at {:?}", repo.state.uuid, repo.work_dir);
        Ok(repo)
    }

    /// Open the repository in `work_dir`.
    pub fn open(work_dir: &Path) -> Result<Self> {
        Self::open_with(work_dir, Box::new(SystemClock))
    }

    pub fn open_with(work_dir: &Path, clock: Box<dyn Clock>) -> Result<Self> {
        let meta_dir = work_dir.join(META_DIR);
        if !meta_dir.is_dir() {
            return Err(RepoError::NotInitialized);
        }
        let config = RepoConfig::load(&meta_dir)?;
        let state = RepoState::load(&meta_dir)?;
        Ok(Self {
            work_dir: work_dir.to_path_buf(),
            blobs: ContentStore::open(meta_dir.join("storage"))?,
            mirror: StagingMirror::open(meta_dir.join("staging"))?,
            graph: CommitGraph::open(meta_dir.join("commits"))?,
            meta_dir,
            config,
            state,
            clock,
        })
    }

    /// Persist HEAD, branches, staging and remotes.
    pub fn save(&self) -> Result<()> {
        self.state.save(&self.meta_dir)
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn meta_dir(&self) -> &Path {
        &self.meta_dir
    }

    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    pub fn uuid(&self) -> &str {
        &self.state.uuid
    }

    /// Name of the checked-out branch
    pub fn head(&self) -> &str {
        &self.state.head
    }

    pub fn branches(&self) -> &BTreeMap<String, ObjectId> {
        &self.state.branches
    }

    pub fn staging(&self) -> &StagingArea {
        &self.state.staging
    }

    pub fn remotes(&self) -> &BTreeMap<String, PathBuf> {
        &self.state.remotes
    }

    pub fn graph(&self) -> &CommitGraph {
        &self.graph
    }

    pub fn blobs(&self) -> &ContentStore {
        &self.blobs
    }

    pub fn branch_tip(&self, name: &str) -> Result<ObjectId> {
        self.state
            .branches
            .get(name)
            .copied()
            .ok_or_else(|| RepoError::BranchNotFound(name.to_string()))
    }

    pub fn head_commit(&self) -> Result<Commit> {
        let tip = self.branch_tip(&self.state.head)?;
        self.graph.get(&tip)
    }

    /// Resolve a commit digest or unique prefix
    pub fn resolve(&self, reference: &str) -> Result<Commit> {
        self.graph.lookup(reference)
    }

    // ==================== Working directory ====================

    pub(crate) fn work_path(&self, name: &str) -> PathBuf {
        self.work_dir.join(name)
    }

    pub(crate) fn read_work(&self, name: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.work_path(name)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) fn write_work(&self, name: &str, data: &[u8]) -> Result<()> {
        let path = self.work_path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, data)?;
        Ok(())
    }

    pub(crate) fn delete_work(&self, name: &str) -> Result<()> {
        match fs::remove_file(self.work_path(name)) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    /// Plain files directly inside the working directory, sorted.
    pub(crate) fn working_files(&self) -> Result<BTreeSet<String>> {
        let mut names = BTreeSet::new();
        for entry in fs::read_dir(&self.work_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.insert(name.to_string());
            }
        }
        Ok(names)
    }

    /// Fail if a working file untracked by `current` would be clobbered by one of `incoming`.
    pub(crate) fn check_untracked<'a>(
        &self,
        current: &Commit,
        incoming: impl IntoIterator<Item = &'a String>,
    ) -> Result<()> {
        for name in incoming {
            if !current.tracks(name) && self.work_path(name).is_file() {
                return Err(RepoError::UntrackedFileInTheWay(name.clone()));
            }
        }
        Ok(())
    }

    /// Make the working directory match `target`, starting from `current`, and drop pending changes.
    pub(crate) fn checkout_tree(&mut self, current: &Commit, target: &Commit) -> Result<()> {
        for (name, blob) in target.files() {
            self.write_work(name, &self.blobs.get(blob)?)?;
        }
        for name in current.files().keys() {
            if !target.tracks(name) {
                self.delete_work(name)?;
            }
        }
        self.state.staging.clear();
        self.mirror.clear()?;
        Ok(())
    }

    // ==================== Staging ====================

    /// Stage the working copy of `name` for the next commit.
    pub fn add(&mut self, name: &str) -> Result<()> {
        let data = self
            .read_work(name)?
            .ok_or_else(|| RepoError::FileNotFound(name.to_string()))?;
        let id = ObjectId::from_data(&data);
        let head = self.head_commit()?;

        if head.blob(name) == Some(id) {
            // Back to the committed version: nothing left to stage.
            if let Some(stale) = self.state.staging.unstage(name) {
                self.mirror.discard(&stale, &self.state.staging)?;
            }
            self.state.staging.unmark_removed(name);
            return Ok(());
        }

        self.blobs.put(&data)?;
        self.mirror.put(&data)?;
        if let Some(previous) = self.state.staging.stage(name, id) {
            if previous != id {
                self.mirror.discard(&previous, &self.state.staging)?;
            }
        }
        tracing::debug!("staged {} at {}", name, id.short(7));
        Ok(())
    }

    /// Unstage `name`, and if the current commit tracks it, delete it and mark it for removal.
    pub fn rm(&mut self, name: &str) -> Result<()> {
        let head = self.head_commit()?;
        let staged = self.state.staging.staged(name);
        if staged.is_none() && !head.tracks(name) {
            return Err(RepoError::NothingToRemove(name.to_string()));
        }
        if let Some(id) = self.state.staging.unstage(name) {
            self.mirror.discard(&id, &self.state.staging)?;
        }
        if head.tracks(name) {
            self.delete_work(name)?;
            self.state.staging.mark_removed(name);
        }
        Ok(())
    }

    // ==================== Commits ====================

    /// Record the staged changes as a new commit on the current branch.
    pub fn commit(&mut self, message: &str) -> Result<Commit> {
        if message.trim().is_empty() {
            return Err(RepoError::EmptyMessage);
        }
        if self.state.staging.is_empty() {
            return Err(RepoError::NothingToCommit);
        }
        self.commit_with(message, None)
    }

    /// Commit whatever is staged, with `second_parent` recorded for merges.
    pub(crate) fn commit_with(&mut self, message: &str, second_parent: Option<ObjectId>) -> Result<Commit> {
        let head = self.head_commit()?;
        let files = self.state.staging.apply_to(head.files());
        let mut parents = vec![head.id()];
        parents.extend(second_parent);

        let commit = self.graph.create(self.clock.as_ref(), message, files, parents)?;
        self.state.branches.insert(self.state.head.clone(), commit.id());
        self.state.staging.clear();
        self.mirror.clear()?;
        tracing::info!("[{}] {} {}", self.state.head, commit.id().short(7), message);
        Ok(commit)
    }

    /// History of the current branch, newest first, following first parents.
    pub fn log(&self) -> Result<Vec<Commit>> {
        let tip = self.branch_tip(&self.state.head)?;
        self.graph.first_parent_chain(&tip)
    }

    /// Every commit ever stored, in digest order.
    pub fn global_log(&self) -> Result<Vec<Commit>> {
        self.graph
            .list()?
            .iter()
            .map(|id| self.graph.get(id))
            .collect()
    }

    /// Digests of all commits whose message is exactly `message`.
    pub fn find(&self, message: &str) -> Result<Vec<ObjectId>> {
        let found: Vec<ObjectId> = self
            .global_log()?
            .into_iter()
            .filter(|c| c.message() == message)
            .map(|c| c.id())
            .collect();
        if found.is_empty() {
            return Err(RepoError::NoCommitWithMessage);
        }
        Ok(found)
    }

    pub fn status(&self) -> Result<Status> {
        let head = self.head_commit()?;
        let staging = &self.state.staging;
        let working = self.working_files()?;
        let mut unstaged = BTreeMap::new();

        for (name, tracked) in head.files() {
            if staging.is_removed(name) || staging.staged(name).is_some() {
                continue;
            }
            match self.read_work(name)? {
                None => {
                    unstaged.insert(name.clone(), Modification::Deleted);
                }
                Some(data) if ObjectId::from_data(&data) != *tracked => {
                    unstaged.insert(name.clone(), Modification::Modified);
                }
                Some(_) => {}
            }
        }
        for (name, staged) in staging.additions() {
            match self.read_work(name)? {
                None => {
                    unstaged.insert(name.clone(), Modification::Deleted);
                }
                Some(data) if ObjectId::from_data(&data) != *staged => {
                    unstaged.insert(name.clone(), Modification::Modified);
                }
                Some(_) => {}
            }
        }

        let untracked = working
            .into_iter()
            .filter(|name| {
                staging.is_removed(name) || (staging.staged(name).is_none() && !head.tracks(name))
            })
            .collect();

        Ok(Status {
            head: self.state.head.clone(),
            branches: self.state.branches.keys().cloned().collect(),
            staged: staging.additions().keys().cloned().collect(),
            removed: staging.removals().iter().cloned().collect(),
            unstaged: unstaged.into_iter().collect(),
            untracked,
        })
    }

    // ==================== Branches & checkout ====================

    /// Create a branch at the current commit.
    pub fn create_branch(&mut self, name: &str) -> Result<()> {
        if self.state.branches.contains_key(name) {
            return Err(RepoError::BranchExists(name.to_string()));
        }
        let tip = self.branch_tip(&self.state.head)?;
        self.state.branches.insert(name.to_string(), tip);
        tracing::info!("created branch {} at {}", name, tip.short(7));
        Ok(())
    }

    pub fn remove_branch(&mut self, name: &str) -> Result<()> {
        if !self.state.branches.contains_key(name) {
            return Err(RepoError::BranchNotFound(name.to_string()));
        }
        if self.state.head == name {
            return Err(RepoError::RemoveCurrentBranch);
        }
        self.state.branches.remove(name);
        Ok(())
    }

    /// Overwrite the working copy of `name` with its version in `commit` (HEAD when `None`).
    pub fn checkout_file(&mut self, commit: Option<&str>, name: &str) -> Result<()> {
        let commit = match commit {
            Some(reference) => self.resolve(reference)?,
            None => self.head_commit()?,
        };
        let blob = commit
            .blob(name)
            .ok_or_else(|| RepoError::FileNotInCommit(name.to_string()))?;
        self.write_work(name, &self.blobs.get(&blob)?)
    }

    /// Switch HEAD to `name`, replacing the working tree with that branch's files.
    pub fn checkout_branch(&mut self, name: &str) -> Result<()> {
        let target_id = self.branch_tip(name)?;
        if self.state.head == name {
            return Err(RepoError::AlreadyOnBranch);
        }
        let current = self.head_commit()?;
        let target = self.graph.get(&target_id)?;
        self.check_untracked(&current, target.files().keys())?;
        self.checkout_tree(&current, &target)?;
        self.state.head = name.to_string();
        tracing::info!("switched to branch {}", name);
        Ok(())
    }

    /// Move the current branch to `reference` and check out its files.
    pub fn reset(&mut self, reference: &str) -> Result<Commit> {
        let target = self.resolve(reference)?;
        let current = self.head_commit()?;
        self.check_untracked(&current, target.files().keys())?;
        self.checkout_tree(&current, &target)?;
        self.state.branches.insert(self.state.head.clone(), target.id());
        tracing::info!("reset {} to {}", self.state.head, target.id().short(7));
        Ok(target)
    }
}
