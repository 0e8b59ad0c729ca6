//! File watch driver — reports created, removed, and modified files.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sigwatch_core::{Result, SigwatchError};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parameters from the listener definition's JSON blob.
#[derive(Debug, Clone, Deserialize)]
pub struct FilesParams {
    /// Watched paths; each entry may be a literal file path or a glob
    /// pattern. Directory entries are expanded through `mask`.
    pub paths: Vec<String>,
    /// Glob mask applied inside directory entries (e.g. `*.log`).
    #[serde(default)]
    pub mask: Option<String>,
    /// Collapse one run's findings into a single message.
    #[serde(default)]
    pub single_message: bool,
}

/// Watches a set of files through their modification times.
///
/// The checkpoint is the observation time of the last successful check;
/// per-file mtimes are tracked so creations and removals are reported once.
pub struct FilesSource {
    params: FilesParams,
    state: HashMap<PathBuf, DateTime<Utc>>,
    checkpoint: DateTime<Utc>,
}

impl FilesSource {
    pub fn new(params: FilesParams) -> Result<Self> {
        // Validate patterns up front so a typo fails the definition at
        // construction, not mid-schedule.
        for pattern in &params.paths {
            glob::Pattern::new(pattern)
                .map_err(|e| SigwatchError::Listener(format!("Invalid path pattern '{pattern}': {e}")))?;
        }
        if let Some(mask) = &params.mask {
            glob::Pattern::new(mask)
                .map_err(|e| SigwatchError::Listener(format!("Invalid mask '{mask}': {e}")))?;
        }
        let mut this = Self {
            params,
            state: HashMap::new(),
            checkpoint: Utc::now(),
        };
        this.state = this.enumerate()?;
        Ok(this)
    }

    /// Transplant checkpoint state from a prior instance.
    pub fn inherit(&mut self, other: &FilesSource) {
        self.checkpoint = other.checkpoint;
        for (path, mtime) in self.state.iter_mut() {
            if let Some(prev) = other.state.get(path) {
                *mtime = *prev;
            }
        }
    }

    pub fn check(&mut self) -> Result<Vec<String>> {
        let observed = Utc::now();
        // Observe everything before mutating anything: an IO failure here
        // leaves checkpoint and per-file state untouched.
        let current = self.enumerate()?;

        let mut lines = Vec::new();
        for (path, mtime) in &current {
            match self.state.get(path) {
                None => lines.push(format!(
                    "File {} was created at {}.",
                    path.display(),
                    mtime.format(TS_FORMAT)
                )),
                Some(_) if *mtime > self.checkpoint => lines.push(format!(
                    "File {} was modified at {}.",
                    path.display(),
                    mtime.format(TS_FORMAT)
                )),
                Some(_) => {}
            }
        }
        for path in self.state.keys() {
            if !current.contains_key(path) {
                lines.push(format!("File {} was removed.", path.display()));
            }
        }

        self.state = current;
        self.checkpoint = observed;

        if self.params.single_message && !lines.is_empty() {
            Ok(vec![format!("Changed files:\n{}", lines.join("\n"))])
        } else {
            Ok(lines)
        }
    }

    pub fn close(&mut self) {}

    pub fn checkpoint(&self) -> DateTime<Utc> {
        self.checkpoint
    }

    /// Current watched set with modification times.
    fn enumerate(&self) -> Result<HashMap<PathBuf, DateTime<Utc>>> {
        let mut found = HashMap::new();
        for entry in &self.params.paths {
            for path in expand(entry, self.params.mask.as_deref())? {
                match std::fs::metadata(&path) {
                    Ok(meta) if meta.is_file() => {
                        let mtime = meta.modified().map(DateTime::<Utc>::from)?;
                        found.insert(path, mtime);
                    }
                    // Raced away between listing and stat, or a directory.
                    Ok(_) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(found)
    }
}

/// Expand one configured entry into concrete paths.
fn expand(entry: &str, mask: Option<&str>) -> Result<Vec<PathBuf>> {
    let path = Path::new(entry);
    let pattern = if path.is_dir() {
        format!("{}/{}", entry.trim_end_matches('/'), mask.unwrap_or("*"))
    } else if entry.contains(['*', '?', '[']) {
        entry.to_string()
    } else {
        // Literal file path; a missing file is simply absent this round.
        return Ok(vec![path.to_path_buf()]);
    };
    let paths = glob::glob(&pattern)
        .map_err(|e| SigwatchError::Listener(format!("Invalid path pattern '{pattern}': {e}")))?;
    let mut expanded = Vec::new();
    for item in paths {
        match item {
            Ok(p) => expanded.push(p),
            Err(e) => return Err(SigwatchError::Io(e.into_error())),
        }
    }
    Ok(expanded)
}
