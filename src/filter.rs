use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, BufWriter, Cursor, Read, Write};
use std::path::Path;

use anyhow::anyhow;
use flate2::read::MultiGzDecoder;
use sha2::{Digest, Sha256};

use crate::error::ExtractError;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Which entries of the layer make it into the output archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    Names(BTreeSet<String>),
}

impl Selection {
    /// No file names on the command line means every entry.
    pub fn from_files(files: &[String]) -> Self {
        if files.is_empty() {
            Selection::All
        } else {
            Selection::Names(files.iter().cloned().collect())
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            Selection::All => true,
            Selection::Names(names) => names.contains(name),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FilterSummary {
    pub copied: usize,
    pub skipped: usize,
}

/// Copy the compressed blob to `dest` unchanged.
///
/// The copy is checked against `digest` when it is a sha256 digest. A failed
/// copy leaves no file behind.
pub fn copy_raw<R: Read>(reader: R, dest: &Path, digest: &str) -> Result<u64, ExtractError> {
    let target = dest.display().to_string();
    let file = File::create(dest).map_err(|e| ExtractError::io_write(&target, e))?;

    let result = copy_verified(reader, BufWriter::new(file), &target, digest);
    if result.is_err() {
        let _ = fs::remove_file(dest);
    }
    result
}

fn copy_verified<R: Read, W: Write>(
    mut reader: R,
    mut out: W,
    target: &str,
    digest: &str,
) -> Result<u64, ExtractError> {
    let download_error = |source: anyhow::Error| ExtractError::LayerDownload {
        digest: digest.to_string(),
        source,
    };

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(download_error(e.into())),
        };
        hasher.update(&buf[..n]);
        out.write_all(&buf[..n])
            .map_err(|e| ExtractError::io_write(target, e))?;
        total += n as u64;
    }
    out.flush().map_err(|e| ExtractError::io_write(target, e))?;

    if let Some(expected) = digest.strip_prefix("sha256:") {
        let actual = format!("{:x}", hasher.finalize());
        if actual != expected {
            return Err(download_error(anyhow!(
                "digest mismatch: downloaded content hashes to sha256:{actual}"
            )));
        }
    }

    Ok(total)
}

/// Decompress a gzip layer and write the selected entries as a new,
/// uncompressed tar archive to `out`.
///
/// Entry headers and payloads are copied unchanged; the output keeps the
/// source order.
pub fn filter_layer<R: Read, W: Write>(
    mut reader: R,
    out: W,
    selection: &Selection,
) -> Result<FilterSummary, ExtractError> {
    let mut magic = [0u8; 2];
    reader.read_exact(&mut magic).map_err(|e| {
        ExtractError::Decompression(format!("cannot read gzip header: {e}"))
    })?;
    if magic != GZIP_MAGIC {
        return Err(ExtractError::Decompression(format!(
            "not a gzip stream (starts with {:02x} {:02x})",
            magic[0], magic[1]
        )));
    }

    let decoder = MultiGzDecoder::new(Cursor::new(magic).chain(reader));
    let mut archive = tar::Archive::new(decoder);
    let mut builder = tar::Builder::new(out);
    let mut summary = FilterSummary::default();

    for entry in archive.entries().map_err(ExtractError::ArchiveFormat)? {
        let mut entry = entry.map_err(ExtractError::ArchiveFormat)?;
        let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();

        if !selection.matches(&name) {
            summary.skipped += 1;
            continue;
        }

        copy_entry(&mut builder, &mut entry)?;
        summary.copied += 1;
    }

    let mut out = builder
        .into_inner()
        .map_err(|e| ExtractError::io_write("standard output", e))?;
    out.flush()
        .map_err(|e| ExtractError::io_write("standard output", e))?;

    Ok(summary)
}

fn copy_entry<R: Read, W: Write>(
    builder: &mut tar::Builder<W>,
    entry: &mut tar::Entry<'_, R>,
) -> Result<(), ExtractError> {
    let header = entry.header().clone();

    // PAX records (xattrs, long paths, sub-second times) precede the header
    // block; the reader folds them into the entry.
    let mut pax = Vec::new();
    if let Some(extensions) = entry.pax_extensions().map_err(ExtractError::ArchiveFormat)? {
        for extension in extensions {
            let extension = extension.map_err(ExtractError::ArchiveFormat)?;
            let key = extension
                .key()
                .map_err(|e| ExtractError::ArchiveFormat(io::Error::new(io::ErrorKind::InvalidData, e)))?;
            pax.push((key.to_string(), extension.value_bytes().to_vec()));
        }
    }
    let pax_has = |key: &str| pax.iter().any(|(k, _)| k == key);

    // GNU long names live outside the header block too; PAX paths already
    // travel with the records above.
    let long_path = entry.path_bytes() != header.path_bytes() && !pax_has("path");
    let long_link = entry.link_name_bytes() != header.link_name_bytes() && !pax_has("linkpath");

    let path = if long_path || long_link {
        Some(entry.path().map_err(ExtractError::ArchiveFormat)?.into_owned())
    } else {
        None
    };
    let link = if long_link {
        entry
            .link_name()
            .map_err(ExtractError::ArchiveFormat)?
            .map(|l| l.into_owned())
    } else {
        None
    };

    if !pax.is_empty() {
        builder
            .append_pax_extensions(pax.iter().map(|(k, v)| (k.as_str(), v.as_slice())))
            .map_err(|e| ExtractError::io_write("standard output", e))?;
    }

    let mut payload = ReadTracker::new(entry);
    let result = match (path, link) {
        (None, _) => builder.append(&header, &mut payload),
        (Some(path), Some(target)) => {
            let mut header = header;
            builder.append_link(&mut header, path, target)
        }
        (Some(path), None) => {
            let mut header = header;
            builder.append_data(&mut header, path, &mut payload)
        }
    };

    result.map_err(|e| {
        if payload.failed {
            ExtractError::ArchiveFormat(e)
        } else {
            ExtractError::io_write("standard output", e)
        }
    })
}

/// Remembers whether a read failed, so copy errors can be attributed to the
/// input or the output side.
struct ReadTracker<R> {
    inner: R,
    failed: bool,
}

impl<R> ReadTracker<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            failed: false,
        }
    }
}

impl<R: Read> Read for ReadTracker<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf).inspect_err(|_| self.failed = true)
    }
}
