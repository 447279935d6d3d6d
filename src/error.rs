use std::io;

use thiserror::Error;

/// Every fatal condition the extractor can hit.
///
/// Registry backends report failures as `anyhow::Error`; the resolver and the
/// archive filter wrap them in the variant for the stage that failed.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Bad command line, detected before any network call
    #[error("{0}\n\nusage: regextract [--output=file.tgz] image[:tag] [files...]")]
    Usage(String),

    #[error("cannot fetch manifest for {image}")]
    ManifestFetch {
        image: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("layer {index} is out of range: image has {count} layers")]
    LayerIndex { index: i64, count: usize },

    #[error("cannot read layer {digest}")]
    LayerDownload {
        digest: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("cannot uncompress layer: {0}")]
    Decompression(String),

    /// Malformed tar data in the middle of the layer
    #[error("malformed layer archive")]
    ArchiveFormat(#[source] io::Error),

    #[error("cannot write to {target}")]
    IoWrite {
        target: String,
        #[source]
        source: io::Error,
    },
}

impl ExtractError {
    pub fn io_write(target: impl Into<String>, source: io::Error) -> Self {
        ExtractError::IoWrite {
            target: target.into(),
            source,
        }
    }
}
