use crate::error::ExtractError;
use crate::registry::{ImageRef, LayerDescriptor, Registry};

/// The layer picked out of an image's manifest.
#[derive(Debug, Clone)]
pub struct ResolvedLayer {
    pub index: usize,
    pub layer_count: usize,
    pub layer: LayerDescriptor,
}

/// Map a possibly negative layer index onto `0..count`.
///
/// `-1` is the newest layer, `-count` the oldest.
pub fn normalize_index(index: i64, count: usize) -> Option<usize> {
    let count = i64::try_from(count).ok()?;
    let normalized = if index < 0 { index + count } else { index };
    if (0..count).contains(&normalized) {
        usize::try_from(normalized).ok()
    } else {
        None
    }
}

pub fn resolve(
    registry: &mut dyn Registry,
    image: &ImageRef,
    layer_index: i64,
) -> Result<ResolvedLayer, ExtractError> {
    let layers = registry
        .fetch_manifest(&image.repository, &image.tag)
        .map_err(|source| ExtractError::ManifestFetch {
            image: image.to_string(),
            source,
        })?;

    let layer_count = layers.len();
    let index = normalize_index(layer_index, layer_count).ok_or(ExtractError::LayerIndex {
        index: layer_index,
        count: layer_count,
    })?;

    Ok(ResolvedLayer {
        index,
        layer_count,
        layer: layers[index].clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::memory::MemoryRegistry;

    fn five_layer_registry() -> MemoryRegistry {
        let blobs = (0..5).map(|i| format!("layer-{i}").into_bytes()).collect();
        MemoryRegistry::new().with_image("myapp", "latest", blobs)
    }

    #[test]
    fn normalizes_every_valid_index() {
        for count in 1..8usize {
            let n = count as i64;
            for index in -n..n {
                let got = normalize_index(index, count).unwrap();
                assert!(got < count);
                let expected = if index < 0 { index + n } else { index };
                assert_eq!(got as i64, expected);
            }
            assert_eq!(normalize_index(-1, count), Some(count - 1));
            assert_eq!(normalize_index(-n, count), Some(0));
        }
    }

    #[test]
    fn rejects_out_of_range_indices() {
        assert_eq!(normalize_index(5, 5), None);
        assert_eq!(normalize_index(-6, 5), None);
        assert_eq!(normalize_index(0, 0), None);
        assert_eq!(normalize_index(-1, 0), None);
        assert_eq!(normalize_index(i64::MIN, 3), None);
        assert_eq!(normalize_index(i64::MAX, 3), None);
    }

    #[test]
    fn newest_layer_is_the_default_pick() {
        let mut registry = five_layer_registry();
        let image = ImageRef::parse("myapp:latest").unwrap();

        let resolved = resolve(&mut registry, &image, -1).unwrap();
        assert_eq!(resolved.index, 4);
        assert_eq!(resolved.layer_count, 5);

        let oldest = resolve(&mut registry, &image, 0).unwrap();
        assert_eq!(oldest.index, 0);
        assert_ne!(oldest.layer.digest, resolved.layer.digest);
    }

    #[test]
    fn out_of_range_is_a_layer_index_error() {
        let mut registry = five_layer_registry();
        let image = ImageRef::parse("myapp").unwrap();

        match resolve(&mut registry, &image, 7) {
            Err(ExtractError::LayerIndex { index, count }) => {
                assert_eq!(index, 7);
                assert_eq!(count, 5);
            }
            other => panic!("expected LayerIndex error, got {other:?}"),
        }
        assert!(matches!(
            resolve(&mut registry, &image, -6),
            Err(ExtractError::LayerIndex { .. })
        ));
    }

    #[test]
    fn unknown_image_is_a_manifest_error() {
        let mut registry = five_layer_registry();
        let image = ImageRef::parse("other:v1").unwrap();

        let err = resolve(&mut registry, &image, -1).unwrap_err();
        assert!(matches!(err, ExtractError::ManifestFetch { .. }));
        assert!(err.to_string().contains("other:v1"));
    }
}
