//! Folder watch driver — reports membership changes per watched root.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sigwatch_core::Result;

/// Parameters from the listener definition's JSON blob.
#[derive(Debug, Clone, Deserialize)]
pub struct FoldersParams {
    /// Watched root directories, walked recursively.
    pub paths: Vec<String>,
}

/// Watches directory trees through snapshots of their member sets.
///
/// One message per changed root, reporting added/removed file counts. The
/// cached member sets are part of the checkpoint state and travel across
/// hot-swaps via [`FoldersSource::inherit`].
pub struct FoldersSource {
    roots: Vec<PathBuf>,
    contents: HashMap<PathBuf, BTreeSet<PathBuf>>,
    checkpoint: DateTime<Utc>,
}

impl FoldersSource {
    pub fn new(params: FoldersParams) -> Result<Self> {
        let roots: Vec<PathBuf> = params.paths.iter().map(PathBuf::from).collect();
        let mut contents = HashMap::new();
        for root in &roots {
            contents.insert(root.clone(), walk(root)?);
        }
        Ok(Self {
            roots,
            contents,
            checkpoint: Utc::now(),
        })
    }

    /// Transplant checkpoint state and cached member sets from a prior
    /// instance; roots the prior instance did not track keep their fresh
    /// construction-time snapshot.
    pub fn inherit(&mut self, other: &FoldersSource) {
        for root in &self.roots {
            if let Some(prev) = other.contents.get(root) {
                self.contents.insert(root.clone(), prev.clone());
            }
        }
        self.checkpoint = other.checkpoint;
    }

    pub fn check(&mut self) -> Result<Vec<String>> {
        let observed = Utc::now();
        // Walk every root before committing anything so a failing walk
        // leaves all snapshots untouched.
        let mut current = HashMap::new();
        for root in &self.roots {
            current.insert(root.clone(), walk(root)?);
        }

        let mut messages = Vec::new();
        for root in &self.roots {
            let old = &self.contents[root];
            let new = &current[root];
            let added = new.difference(old).count();
            let removed = old.difference(new).count();
            if added == 0 && removed == 0 {
                continue;
            }
            let mut msg = format!("[{}]\n", root.display());
            if added > 0 {
                msg.push_str(&format!("added {added} file(s);\n"));
            }
            if removed > 0 {
                msg.push_str(&format!("removed {removed} file(s);\n"));
            }
            messages.push(msg);
        }

        self.contents = current;
        self.checkpoint = observed;
        Ok(messages)
    }

    pub fn close(&mut self) {}

    pub fn checkpoint(&self) -> DateTime<Utc> {
        self.checkpoint
    }
}

/// Collect every file under `root`. A missing root yields an empty set, so
/// deleting the directory reads as removing all of its members.
fn walk(root: &Path) -> Result<BTreeSet<PathBuf>> {
    let mut files = BTreeSet::new();
    if !root.exists() {
        return Ok(files);
    }
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                pending.push(path);
            } else {
                files.insert(path);
            }
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("sigwatch-folders-{name}"));
        fs::remove_dir_all(&dir).ok();
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn source_for(dir: &Path) -> FoldersSource {
        FoldersSource::new(FoldersParams {
            paths: vec![dir.to_string_lossy().into_owned()],
        })
        .unwrap()
    }

    #[test]
    fn test_add_and_remove_in_one_message() {
        let dir = scratch("churn");
        fs::write(dir.join("a.txt"), "a").unwrap();
        let mut source = source_for(&dir);

        fs::write(dir.join("b.txt"), "b").unwrap();
        fs::remove_file(dir.join("a.txt")).unwrap();
        let messages = source.check().unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("added 1 file(s);"));
        assert!(messages[0].contains("removed 1 file(s);"));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_quiescent_folder_reports_nothing() {
        let dir = scratch("quiet");
        fs::write(dir.join("a.txt"), "a").unwrap();
        let mut source = source_for(&dir);
        assert!(source.check().unwrap().is_empty());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_nested_files_tracked() {
        let dir = scratch("nested");
        let mut source = source_for(&dir);
        fs::create_dir_all(dir.join("sub/deep")).unwrap();
        fs::write(dir.join("sub/deep/x.txt"), "x").unwrap();
        let messages = source.check().unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("added 1 file(s);"));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_inherit_carries_snapshot() {
        let dir = scratch("inherit");
        fs::write(dir.join("a.txt"), "a").unwrap();
        let first = source_for(&dir);

        // The swapped-in instance snapshots a changed tree, but inheriting
        // restores the prior view so the change is still reported.
        fs::write(dir.join("b.txt"), "b").unwrap();
        let mut second = source_for(&dir);
        second.inherit(&first);
        let messages = second.check().unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("added 1 file(s);"));
        fs::remove_dir_all(&dir).ok();
    }
}
