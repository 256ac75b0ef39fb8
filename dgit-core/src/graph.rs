//! Commit graph: persistence and traversal of immutable commits.
//!
//! Layout: `{dir}/{hex digest}` holds one bincode-encoded [`Commit`].
//! Commits reference parents by digest, so walking history loads one
//! commit at a time instead of dragging whole sub-graphs around.

use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use crate::clock::Clock;
use crate::error::{RepoError, Result};
use crate::object::{Commit, FileMap, ObjectId};
use crate::storage::{write_atomic, StorageError};

#[derive(Debug, Clone)]
pub struct CommitGraph {
    dir: PathBuf,
}

impl CommitGraph {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn commit_path(&self, id: &ObjectId) -> PathBuf {
        self.dir.join(id.to_hex())
    }

    /// Build a commit stamped by `clock`, persist it and return it.
    pub fn create(
        &self,
        clock: &dyn Clock,
        message: impl Into<String>,
        files: FileMap,
        parents: Vec<ObjectId>,
    ) -> Result<Commit> {
        let commit = Commit::new(message.into(), clock.now(), parents, files);
        self.store(&commit)?;
        tracing::debug!(
            "created commit {} with {} parent(s)",
            commit.id().short(7),
            commit.parents().len()
        );
        Ok(commit)
    }

    /// Persist an already-built commit. A commit that is already present is left alone.
    pub fn store(&self, commit: &Commit) -> Result<()> {
        let path = self.commit_path(&commit.id());
        if path.exists() {
            return Ok(());
        }
        let data = commit.to_bytes().map_err(StorageError::from)?;
        write_atomic(&path, &data)?;
        Ok(())
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.commit_path(id).exists()
    }

    /// Load a commit by its full digest, checking that the stored digest still matches.
    pub fn get(&self, id: &ObjectId) -> Result<Commit> {
        let data = match fs::read(self.commit_path(id)) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(*id).into());
            }
            Err(e) => return Err(e.into()),
        };
        let commit = Commit::from_bytes(&data).map_err(StorageError::from)?;
        if commit.id() != *id || !commit.verify() {
            return Err(StorageError::Corrupt {
                id: id.to_hex(),
                reason: "digest does not match contents".to_string(),
            }
            .into());
        }
        Ok(commit)
    }

    /// Every stored commit digest, sorted.
    pub fn list(&self) -> Result<Vec<ObjectId>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            // Leftover temp files and strays are not commits.
            if let Some(id) = name.to_str().and_then(|n| n.parse::<ObjectId>().ok()) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Resolve a full digest or a unique hex prefix of one.
    pub fn lookup(&self, reference: &str) -> Result<Commit> {
        let prefix = reference.trim().to_ascii_lowercase();
        if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(RepoError::CommitNotFound(reference.to_string()));
        }
        if let Ok(id) = prefix.parse::<ObjectId>() {
            return match self.get(&id) {
                Err(RepoError::Storage(StorageError::NotFound(_))) => {
                    Err(RepoError::CommitNotFound(reference.to_string()))
                }
                other => other,
            };
        }

        let matches: Vec<ObjectId> = self
            .list()?
            .into_iter()
            .filter(|id| id.to_hex().starts_with(&prefix))
            .collect();
        match matches.as_slice() {
            [id] => self.get(id),
            [] => Err(RepoError::CommitNotFound(reference.to_string())),
            many => Err(RepoError::AmbiguousCommit {
                prefix: reference.to_string(),
                matches: many.len(),
            }),
        }
    }

    pub fn parents(&self, commit: &Commit) -> Result<Vec<Commit>> {
        commit.parents().iter().map(|id| self.get(id)).collect()
    }

    /// Commits from `start` back to the root following first parents only.
    pub fn first_parent_chain(&self, start: &ObjectId) -> Result<Vec<Commit>> {
        let mut chain = Vec::new();
        let mut next = Some(*start);
        while let Some(id) = next {
            let commit = self.get(&id)?;
            next = commit.first_parent();
            chain.push(commit);
        }
        Ok(chain)
    }

    /// `start` and everything reachable from it through any parent.
    pub fn ancestors(&self, start: &ObjectId) -> Result<HashSet<ObjectId>> {
        self.reachable(start, |_| false)
    }

    /// Breadth-first walk over all parents from `start`, not descending past
    /// commits for which `stop` returns true (those are left out of the result).
    pub fn reachable<F>(&self, start: &ObjectId, stop: F) -> Result<HashSet<ObjectId>>
    where
        F: Fn(&ObjectId) -> bool,
    {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([*start]);
        while let Some(id) = queue.pop_front() {
            if stop(&id) || !seen.insert(id) {
                continue;
            }
            queue.extend(self.get(&id)?.parents().iter().copied());
        }
        Ok(seen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use tempfile::TempDir;

    fn graph() -> (TempDir, CommitGraph) {
        let tmp = TempDir::new().unwrap();
        let graph = CommitGraph::open(tmp.path().join("commits")).unwrap();
        (tmp, graph)
    }

    #[test]
    fn test_create_and_get() {
        let (_tmp, graph) = graph();
        let clock = ManualClock::fixed(42);
        let commit = graph.create(&clock, "first", FileMap::new(), vec![]).unwrap();
        let loaded = graph.get(&commit.id()).unwrap();
        assert_eq!(loaded, commit);
        assert_eq!(loaded.timestamp(), 42);
    }

    #[test]
    fn test_identical_commits_collide() {
        let (_tmp, graph) = graph();
        let clock = ManualClock::fixed(1);
        let a = graph.create(&clock, "same", FileMap::new(), vec![]).unwrap();
        let b = graph.create(&clock, "same", FileMap::new(), vec![]).unwrap();
        assert_eq!(a.id(), b.id());
        assert_eq!(graph.list().unwrap().len(), 1);
    }

    #[test]
    fn test_lookup_by_prefix() {
        let (_tmp, graph) = graph();
        let clock = ManualClock::new(0, 1);
        let commit = graph.create(&clock, "one", FileMap::new(), vec![]).unwrap();
        let hex = commit.id().to_hex();
        assert_eq!(graph.lookup(&hex[..8]).unwrap().id(), commit.id());
        assert_eq!(graph.lookup(&hex.to_uppercase()).unwrap().id(), commit.id());
        assert_eq!(graph.lookup(&hex).unwrap().id(), commit.id());
    }

    #[test]
    fn test_lookup_unknown_and_ambiguous() {
        let (_tmp, graph) = graph();
        let clock = ManualClock::new(0, 1);
        let mut ids = Vec::new();
        for i in 0..40 {
            ids.push(graph.create(&clock, format!("c{}", i), FileMap::new(), vec![]).unwrap().id());
        }
        // 40 commits over 16 leading hex digits: some single digit prefix repeats.
        let digit = (0..16)
            .map(|d| format!("{:x}", d))
            .find(|d| ids.iter().filter(|id| id.to_hex().starts_with(d.as_str())).count() > 1)
            .unwrap();
        assert!(matches!(graph.lookup(&digit), Err(RepoError::AmbiguousCommit { .. })));
        assert!(matches!(graph.lookup("zz"), Err(RepoError::CommitNotFound(_))));
        let missing = ObjectId::from_data(b"missing").to_hex();
        assert!(matches!(graph.lookup(&missing), Err(RepoError::CommitNotFound(_))));
    }

    #[test]
    fn test_chain_and_ancestors() {
        let (_tmp, graph) = graph();
        let clock = ManualClock::new(0, 1);
        let root = graph.create(&clock, "root", FileMap::new(), vec![]).unwrap();
        let left = graph.create(&clock, "left", FileMap::new(), vec![root.id()]).unwrap();
        let right = graph.create(&clock, "right", FileMap::new(), vec![root.id()]).unwrap();
        let merge = graph
            .create(&clock, "merge", FileMap::new(), vec![left.id(), right.id()])
            .unwrap();

        let chain: Vec<_> = graph
            .first_parent_chain(&merge.id())
            .unwrap()
            .iter()
            .map(|c| c.message().to_string())
            .collect();
        assert_eq!(chain, vec!["merge", "left", "root"]);

        let ancestors = graph.ancestors(&merge.id()).unwrap();
        assert_eq!(ancestors.len(), 4);
        assert!(ancestors.contains(&right.id()));

        let parents = graph.parents(&merge).unwrap();
        assert_eq!(parents[1].id(), right.id());

        let above_root = graph.reachable(&merge.id(), |id| *id == root.id()).unwrap();
        assert_eq!(above_root.len(), 3);
    }

    #[test]
    fn test_corrupted_commit_is_rejected() {
        let (_tmp, graph) = graph();
        let clock = ManualClock::fixed(3);
        let a = graph.create(&clock, "a", FileMap::new(), vec![]).unwrap();
        let b = Commit::new("b".into(), 4, vec![], FileMap::new());
        // Put b's bytes under a's name.
        fs::write(graph.dir().join(a.id().to_hex()), b.to_bytes().unwrap()).unwrap();
        assert!(matches!(
            graph.get(&a.id()),
            Err(RepoError::Storage(StorageError::Corrupt { .. }))
        ));
    }
}
