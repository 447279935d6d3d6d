pub mod auth;
pub mod http;

#[cfg(test)]
pub mod memory;

use std::fmt;
use std::io::Read;

use anyhow::Result;

use crate::error::ExtractError;

/// An image named on the command line as `name[:tag]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub repository: String,
    pub tag: String,
}

impl ImageRef {
    /// Split on the first `:`; the tag defaults to `latest`.
    pub fn parse(arg: &str) -> Result<Self, ExtractError> {
        let (repository, tag) = match arg.split_once(':') {
            Some((name, tag)) => (name, tag),
            None => (arg, "latest"),
        };

        if repository.is_empty() {
            return Err(ExtractError::Usage(format!(
                "image reference '{arg}' has no repository name"
            )));
        }
        if tag.is_empty() {
            return Err(ExtractError::Usage(format!(
                "image reference '{arg}' has an empty tag"
            )));
        }

        Ok(Self {
            repository: repository.to_string(),
            tag: tag.to_string(),
        })
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

/// One entry of an image manifest's layer list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerDescriptor {
    /// Content digest of the compressed blob (e.g. sha256:abc123...)
    pub digest: String,

    /// Blob size in bytes as advertised by the manifest
    pub size: u64,
}

/// The two registry operations the extractor needs.
pub trait Registry {
    /// Layers of `repository:tag`, oldest first.
    fn fetch_manifest(&mut self, repository: &str, tag: &str) -> Result<Vec<LayerDescriptor>>;

    /// Open a stream over the compressed layer blob. Dropping it closes the
    /// underlying connection.
    fn download_layer(&mut self, repository: &str, digest: &str) -> Result<Box<dyn Read>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_defaults_tag_to_latest() {
        let r = ImageRef::parse("myapp").unwrap();
        assert_eq!(r.repository, "myapp");
        assert_eq!(r.tag, "latest");
    }

    #[test]
    fn parse_splits_on_first_colon() {
        let r = ImageRef::parse("myapp:v2").unwrap();
        assert_eq!(r.repository, "myapp");
        assert_eq!(r.tag, "v2");

        let r = ImageRef::parse("org/app:1.0:extra").unwrap();
        assert_eq!(r.repository, "org/app");
        assert_eq!(r.tag, "1.0:extra");
    }

    #[test]
    fn parse_rejects_empty_parts() {
        assert!(matches!(ImageRef::parse(":v1"), Err(ExtractError::Usage(_))));
        assert!(matches!(ImageRef::parse("app:"), Err(ExtractError::Usage(_))));
        assert!(matches!(ImageRef::parse(""), Err(ExtractError::Usage(_))));
    }

    #[test]
    fn display_round_trips() {
        let r = ImageRef::parse("library/ubuntu:22.04").unwrap();
        assert_eq!(r.to_string(), "library/ubuntu:22.04");
    }
}
