use std::collections::HashMap;
use std::io::{Cursor, Read};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

use super::{LayerDescriptor, Registry};

/// Serves synthetic manifests and blobs; counts calls so tests can assert
/// that nothing touched the network.
#[derive(Default)]
pub struct MemoryRegistry {
    manifests: HashMap<(String, String), Vec<LayerDescriptor>>,
    blobs: HashMap<String, Vec<u8>>,
    pub calls: usize,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an image whose layers are `blobs`, oldest first.
    pub fn with_image(mut self, repository: &str, tag: &str, blobs: Vec<Vec<u8>>) -> Self {
        let layers = blobs
            .into_iter()
            .map(|blob| {
                let digest = sha256_digest(&blob);
                let layer = LayerDescriptor {
                    digest: digest.clone(),
                    size: blob.len() as u64,
                };
                self.blobs.insert(digest, blob);
                layer
            })
            .collect();

        self.manifests
            .insert((repository.to_string(), tag.to_string()), layers);
        self
    }

    /// Replace the blob behind `digest` without touching the manifest.
    pub fn corrupt_blob(&mut self, digest: &str, blob: Vec<u8>) {
        self.blobs.insert(digest.to_string(), blob);
    }
}

pub fn sha256_digest(data: &[u8]) -> String {
    format!("sha256:{:x}", Sha256::digest(data))
}

impl Registry for MemoryRegistry {
    fn fetch_manifest(&mut self, repository: &str, tag: &str) -> Result<Vec<LayerDescriptor>> {
        self.calls += 1;
        self.manifests
            .get(&(repository.to_string(), tag.to_string()))
            .cloned()
            .with_context(|| format!("manifest unknown: {repository}:{tag}"))
    }

    fn download_layer(&mut self, _repository: &str, digest: &str) -> Result<Box<dyn Read>> {
        self.calls += 1;
        let blob = self
            .blobs
            .get(digest)
            .cloned()
            .with_context(|| format!("blob unknown: {digest}"))?;
        Ok(Box::new(Cursor::new(blob)))
    }
}
