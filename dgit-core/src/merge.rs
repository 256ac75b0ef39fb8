//! Three-way merge of a branch into the current branch.
//!
//! The merge base ("split point") is a lowest common ancestor over the full
//! commit DAG, not just the first-parent chains: of all commits reachable
//! from both tips, the ones that are not a parent of another common commit
//! are the candidates, and the one closest to HEAD in breadth-first order
//! wins.
//!
//! Per file, with S/C/G the split, current and given digests:
//!
//! | S vs C    | S vs G    | result                          |
//! |-----------|-----------|---------------------------------|
//! | C == G    |           | keep current                    |
//! | same      | changed   | take given (or remove if gone)  |
//! | changed   | same      | keep current                    |
//! | changed   | changed   | conflict                        |

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use crate::error::{RepoError, Result};
use crate::graph::CommitGraph;
use crate::object::{Commit, FileMap, ObjectId};
use crate::repository::Repository;

/// What merging one file requires. Files that keep the current version have no action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeAction {
    /// Check out the given branch's version and stage it.
    TakeGiven(ObjectId),
    /// Delete the file and stage its removal.
    Remove,
    /// Both sides changed the file differently. `None` means deleted on that side.
    Conflict {
        current: Option<ObjectId>,
        given: Option<ObjectId>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The given branch is already contained in the current one.
    UpToDate,
    /// The current branch was moved forward to the given commit; no merge commit was made.
    FastForward(ObjectId),
    /// A merge commit was created. `conflicts` lists the files written with conflict markers.
    Merged { commit: Commit, conflicts: Vec<String> },
}

impl MergeOutcome {
    pub fn has_conflicts(&self) -> bool {
        matches!(self, MergeOutcome::Merged { conflicts, .. } if !conflicts.is_empty())
    }
}

/// Commits reachable from `start` through any parent, in breadth-first order.
fn breadth_first(graph: &CommitGraph, start: &ObjectId) -> Result<Vec<Commit>> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([*start]);
    let mut order = Vec::new();
    while let Some(id) = queue.pop_front() {
        if !seen.insert(id) {
            continue;
        }
        let commit = graph.get(&id)?;
        queue.extend(commit.parents().iter().copied());
        order.push(commit);
    }
    Ok(order)
}

/// Most recent common ancestor of `current` and `given`, if the histories meet at all.
pub fn split_point(graph: &CommitGraph, current: &ObjectId, given: &ObjectId) -> Result<Option<ObjectId>> {
    let given_ancestors = graph.ancestors(given)?;
    if given_ancestors.contains(current) {
        return Ok(Some(*current));
    }
    let common: Vec<Commit> = breadth_first(graph, current)?
        .into_iter()
        .filter(|c| given_ancestors.contains(&c.id()))
        .collect();
    // The common set is closed under ancestry, so anything that is a parent
    // of a common commit has a better candidate below it.
    let superseded: HashSet<ObjectId> = common
        .iter()
        .flat_map(|c| c.parents().iter().copied())
        .collect();
    Ok(common
        .iter()
        .map(Commit::id)
        .find(|id| !superseded.contains(id)))
}

fn decide(split: Option<ObjectId>, current: Option<ObjectId>, given: Option<ObjectId>) -> Option<MergeAction> {
    if current == given || split == given {
        return None;
    }
    if split == current {
        return Some(match given {
            Some(id) => MergeAction::TakeGiven(id),
            None => MergeAction::Remove,
        });
    }
    Some(MergeAction::Conflict { current, given })
}

/// Apply the three-way rules to every file named by any of the three snapshots.
pub fn plan(split: &FileMap, current: &FileMap, given: &FileMap) -> BTreeMap<String, MergeAction> {
    let names: BTreeSet<&String> = split.keys().chain(current.keys()).chain(given.keys()).collect();
    names
        .into_iter()
        .filter_map(|name| {
            let action = decide(
                split.get(name).copied(),
                current.get(name).copied(),
                given.get(name).copied(),
            )?;
            Some((name.clone(), action))
        })
        .collect()
}

/// Contents written to a conflicted file. An absent side contributes nothing.
pub fn conflict_contents(current: &[u8], given: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(current.len() + given.len() + 32);
    out.extend_from_slice(b"<<<<<<< HEAD\n");
    out.extend_from_slice(current);
    out.extend_from_slice(b"=======\n");
    out.extend_from_slice(given);
    out.extend_from_slice(b">>>>>>>\n");
    out
}

impl Repository {
    /// Merge branch `name` into the current branch.
    pub fn merge(&mut self, name: &str) -> Result<MergeOutcome> {
        if !self.state.staging.is_empty() {
            return Err(RepoError::UncommittedChanges);
        }
        let given_id = self.branch_tip(name)?;
        if name == self.state.head {
            return Err(RepoError::MergeWithSelf);
        }
        let current = self.head_commit()?;
        let given = self.graph.get(&given_id)?;

        let split = split_point(&self.graph, &current.id(), &given_id)?;
        if split == Some(given_id) {
            tracing::info!("{} is already merged into {}", name, self.state.head);
            return Ok(MergeOutcome::UpToDate);
        }
        if split == Some(current.id()) {
            self.check_untracked(&current, given.files().keys())?;
            self.checkout_tree(&current, &given)?;
            self.state.branches.insert(self.state.head.clone(), given_id);
            tracing::info!("fast-forwarded {} to {}", self.state.head, given_id.short(7));
            return Ok(MergeOutcome::FastForward(given_id));
        }

        let split_files = match split {
            Some(id) => self.graph.get(&id)?.files().clone(),
            None => FileMap::new(),
        };
        let actions = plan(&split_files, current.files(), given.files());
        self.check_untracked(&current, actions.keys())?;

        let mut conflicts = Vec::new();
        for (file, action) in &actions {
            match *action {
                MergeAction::TakeGiven(blob) => {
                    let data = self.blobs.get(&blob)?;
                    self.write_work(file, &data)?;
                    self.mirror.put(&data)?;
                    self.state.staging.stage(file.as_str(), blob);
                }
                MergeAction::Remove => {
                    self.delete_work(file)?;
                    self.state.staging.mark_removed(file.as_str());
                }
                MergeAction::Conflict { current, given } => {
                    let ours = match current {
                        Some(id) => self.blobs.get(&id)?,
                        None => Vec::new(),
                    };
                    let theirs = match given {
                        Some(id) => self.blobs.get(&id)?,
                        None => Vec::new(),
                    };
                    let data = conflict_contents(&ours, &theirs);
                    self.write_work(file, &data)?;
                    let blob = self.blobs.put(&data)?;
                    self.mirror.put(&data)?;
                    self.state.staging.stage(file.as_str(), blob);
                    tracing::warn!("merge conflict in {}", file);
                    conflicts.push(file.clone());
                }
            }
        }

        let message = format!("Merged {} into {}.", name, self.state.head);
        let commit = self.commit_with(&message, Some(given_id))?;
        Ok(MergeOutcome::Merged { commit, conflicts })
    }
}
