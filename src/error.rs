use std::path::PathBuf;
use thiserror::Error;

use crate::records::NodeId;

#[derive(Debug, Error)]
pub enum PageRankError {
    #[error("malformed edge record on line {line}: {reason} ({record:?})")]
    MalformedRecord {
        line: usize,
        record: String,
        reason: String,
    },

    /// A key received contributions but no node record. Recoverable: the group is dropped.
    #[error("contributions for node {0} have no node record")]
    MissingNode(NodeId),

    /// Supplied graph bounds disagree with the edge list. Reported as a warning only.
    #[error("configured {field} = {supplied} but the edge list implies {observed}")]
    ConfigMismatch {
        field: &'static str,
        supplied: u64,
        observed: u64,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {source} (path: {path})")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },

    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("dataflow failure: {0}")]
    Dataflow(String),
}

pub type Result<T> = std::result::Result<T, PageRankError>;

impl PageRankError {
    pub fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        PageRankError::Io {
            source,
            path: path.into(),
        }
    }
}

// `?` on a bare std::io::Error, path unknown.
impl From<std::io::Error> for PageRankError {
    fn from(source: std::io::Error) -> Self {
        PageRankError::Io {
            source,
            path: PathBuf::from("<unknown>"),
        }
    }
}
