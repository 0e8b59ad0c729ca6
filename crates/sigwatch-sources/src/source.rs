//! The closed set of source driver kinds.
//!
//! Adding a new kind means adding one variant here plus its driver module;
//! the scheduler never matches on kinds itself.

use chrono::{DateTime, Utc};
use sigwatch_core::{Result, SigwatchError};

use crate::files::{FilesParams, FilesSource};
use crate::folders::{FoldersParams, FoldersSource};
use crate::sql::{SqlParams, SqlSource};

/// A source driver instance holding its kind-specific checkpoint state.
pub enum Source {
    Files(FilesSource),
    Folders(FoldersSource),
    Sql(SqlSource),
}

impl Source {
    /// Construct a driver from a definition's kind tag and JSON parameter
    /// blob. Unknown kinds and bad parameters fail the definition without
    /// touching anything else.
    pub fn from_definition(kind: &str, parameters: &str) -> Result<Self> {
        match kind {
            "files" => {
                let params: FilesParams = parse_params(parameters)?;
                Ok(Self::Files(FilesSource::new(params)?))
            }
            "folders" => {
                let params: FoldersParams = parse_params(parameters)?;
                Ok(Self::Folders(FoldersSource::new(params)?))
            }
            "sql" => {
                let params: SqlParams = parse_params(parameters)?;
                Ok(Self::Sql(SqlSource::new(params)?))
            }
            other => Err(SigwatchError::Listener(format!(
                "Unknown source kind '{other}'"
            ))),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Files(_) => "files",
            Self::Folders(_) => "folders",
            Self::Sql(_) => "sql",
        }
    }

    /// Observe changes since the checkpoint. Advances the checkpoint on
    /// success only.
    pub fn check(&mut self) -> Result<Vec<String>> {
        match self {
            Self::Files(s) => s.check(),
            Self::Folders(s) => s.check(),
            Self::Sql(s) => s.check(),
        }
    }

    /// Release driver-held resources. Idempotent.
    pub fn close(&mut self) {
        match self {
            Self::Files(s) => s.close(),
            Self::Folders(s) => s.close(),
            Self::Sql(s) => s.close(),
        }
    }

    /// Transplant checkpoint state from a prior instance of the same kind.
    /// Returns false (and transfers nothing) when the kinds differ.
    pub fn inherit(&mut self, other: &Source) -> bool {
        match (self, other) {
            (Self::Files(new), Self::Files(old)) => {
                new.inherit(old);
                true
            }
            (Self::Folders(new), Self::Folders(old)) => {
                new.inherit(old);
                true
            }
            (Self::Sql(new), Self::Sql(old)) => {
                new.inherit(old);
                true
            }
            _ => false,
        }
    }

    pub fn checkpoint(&self) -> DateTime<Utc> {
        match self {
            Self::Files(s) => s.checkpoint(),
            Self::Folders(s) => s.checkpoint(),
            Self::Sql(s) => s.checkpoint(),
        }
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(parameters: &str) -> Result<T> {
    serde_json::from_str(parameters)
        .map_err(|e| SigwatchError::Listener(format!("Bad driver parameters: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_kind_rejected() {
        let result = Source::from_definition("carrier-pigeon", "{}");
        assert!(matches!(result, Err(SigwatchError::Listener(_))));
    }

    #[test]
    fn test_bad_parameters_rejected() {
        assert!(Source::from_definition("files", "not json").is_err());
        assert!(Source::from_definition("sql", "{\"connection\": \":memory:\"}").is_err());
    }

    #[test]
    fn test_cross_kind_inherit_refused() {
        let mut files = Source::from_definition("files", "{\"paths\": []}").unwrap();
        let sql = Source::from_definition(
            "sql",
            "{\"connection\": \":memory:\", \"query\": \"SELECT 1, 2 WHERE 0 > ?1\"}",
        )
        .unwrap();
        assert!(!files.inherit(&sql));
    }

    #[test]
    fn test_same_kind_inherit_copies_checkpoint() {
        let params = "{\"paths\": []}";
        let old = Source::from_definition("files", params).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let mut new = Source::from_definition("files", params).unwrap();
        assert_ne!(new.checkpoint(), old.checkpoint());
        assert!(new.inherit(&old));
        assert_eq!(new.checkpoint(), old.checkpoint());
    }
}
