use std::{io, path::PathBuf};

use thiserror::Error;

use crate::batcher::PartitionKind;

/// Failures raised while fetching, decoding and slicing the sprite dataset.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to fetch {url}: {source}")]
    ResourceUnavailable {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("{what} has {actual} values, expected {expected}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("failed to decode sprite sheet: {0}")]
    DecodeFailure(#[from] image::ImageError),
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot draw a batch from the empty {0} partition")]
    EmptyPartition(PartitionKind),
}

impl DatasetError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error came from the network boundary.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::ResourceUnavailable { .. })
    }
}
