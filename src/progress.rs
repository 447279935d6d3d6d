use std::io::Read;

use crossterm::style::Stylize;
use indicatif::{ProgressBar, ProgressBarIter, ProgressState, ProgressStyle};

/// A spinner for long-running stages, drawn on stderr so stdout stays a clean
/// tar stream. Quiet spinners draw nothing.
pub struct Spinner {
    bar: ProgressBar,
    quiet: bool,
}

impl Spinner {
    pub fn new(message: impl Into<String>, quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new_spinner()
        };
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.dim} {msg}")
                .unwrap(),
        );
        bar.set_message(message.into());
        if !quiet {
            bar.enable_steady_tick(std::time::Duration::from_millis(80));
        }
        Self { bar, quiet }
    }

    pub fn set_message(&self, message: impl Into<String>) {
        self.bar.set_message(message.into());
    }

    /// Switch to a byte progress bar for a download of `total` bytes.
    pub fn track_bytes(&self, total: u64) {
        self.bar.set_length(total);
        self.bar.set_position(0);
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.dim} {msg} [{bar:20}] {bytes}/{total_bytes} ({elapsed_precise:.>5})",
            )
            .unwrap()
            .with_key("elapsed_precise", |state: &ProgressState, w: &mut dyn std::fmt::Write| {
                let _ = write!(w, "{}s", state.elapsed().as_secs());
            })
            .progress_chars("━╸░"),
        );
    }

    /// Advance the bar by the bytes read through `reader`.
    pub fn wrap_read<R: Read>(&self, reader: R) -> ProgressBarIter<R> {
        self.bar.wrap_read(reader)
    }

    /// Clear the spinner and print a `✔ message` line to stderr.
    pub fn finish(self, message: impl Into<String>) {
        self.bar.finish_and_clear();
        if !self.quiet {
            eprintln!("{} {}", "✔".green(), message.into());
        }
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    for unit in UNITS {
        if size < 1024.0 {
            return if size.fract() < 0.05 {
                format!("{:.0} {unit}", size)
            } else {
                format!("{:.1} {unit}", size)
            };
        }
        size /= 1024.0;
    }
    format!("{:.1} TB", size)
}

/// `sha256:0123456789ab...` shortened to its first 12 hex characters.
pub fn short_digest(digest: &str) -> &str {
    let hex = digest.split_once(':').map_or(digest, |(_, hex)| hex);
    hex.get(..12).unwrap_or(hex)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_sizes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3 MB");
    }

    #[test]
    fn shortens_digests() {
        assert_eq!(
            short_digest("sha256:a3ed95caeb02ffe68cdd9fd84406680ae93d633cb16422d00e8a7c22955b46d4"),
            "a3ed95caeb02"
        );
        assert_eq!(short_digest("abc"), "abc");
    }
}
