use std::io::Write;

use crate::config::{Config, OutputMode};
use crate::error::ExtractError;
use crate::filter;
use crate::progress::{Spinner, format_bytes, short_digest};
use crate::registry::Registry;
use crate::resolver;

/// Resolve the configured layer, download it and write it out in the
/// configured mode. `stdout` receives the filtered archive.
pub fn run<W: Write>(
    config: &Config,
    registry: &mut dyn Registry,
    stdout: W,
) -> Result<(), ExtractError> {
    let spinner = Spinner::new(
        format!("Fetching manifest for {} ...", config.image),
        config.quiet,
    );
    let resolved = resolver::resolve(registry, &config.image, config.layer)?;
    spinner.finish(format!(
        "Found {} manifest layers, using layer {}",
        resolved.layer_count, resolved.index
    ));

    let digest = resolved.layer.digest.as_str();
    let spinner = Spinner::new(
        format!("Downloading layer {} ...", short_digest(digest)),
        config.quiet,
    );
    let reader = registry
        .download_layer(&config.image.repository, digest)
        .map_err(|source| ExtractError::LayerDownload {
            digest: digest.to_string(),
            source,
        })?;

    match &config.mode {
        OutputMode::Raw(path) => {
            if resolved.layer.size > 0 {
                spinner.track_bytes(resolved.layer.size);
            }
            let written = filter::copy_raw(spinner.wrap_read(reader), path, digest)?;
            spinner.finish(format!(
                "Wrote layer {} ({}) to {}",
                short_digest(digest),
                format_bytes(written),
                path.display()
            ));
        }
        OutputMode::Filtered(selection) => {
            spinner.set_message(format!("Filtering layer {} ...", short_digest(digest)));
            let summary = filter::filter_layer(reader, stdout, selection)?;
            spinner.finish(format!(
                "Copied {} of {} entries",
                summary.copied,
                summary.copied + summary.skipped
            ));
        }
    }

    Ok(())
}
