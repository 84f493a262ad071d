//! Deterministic zip building from a staging directory.
//!
//! Files are enumerated recursively, ordered lexicographically by
//! relative path, and streamed into the writer one at a time with
//! `io::copy`, so memory stays bounded regardless of how large the
//! document set is. A directory with zero files yields a valid empty
//! archive; the caller decides whether that is an acceptable response.

use std::fs;
use std::io::{self, Seek, Write};
use std::path::{Path, PathBuf};

use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::ArchiveError;

/// What a build pass produced.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveSummary {
    /// Number of file entries written
    pub entries: usize,

    /// Total uncompressed bytes copied into the archive
    pub bytes_copied: u64,
}

impl ArchiveSummary {
    /// Whether the archive contains no entries. Surfaced to callers as
    /// a warning rather than an error.
    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }
}

/// Stream every file under `dir` into a zip written to `writer`,
/// preserving paths relative to `dir`.
pub fn build_archive<W: Write + Seek>(dir: &Path, writer: W) -> Result<ArchiveSummary, ArchiveError> {
    if !dir.is_dir() {
        return Err(ArchiveError::MissingDirectory {
            path: dir.to_path_buf(),
        });
    }

    let mut files = Vec::new();
    collect_files(dir, dir, &mut files)?;
    files.sort();

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(writer);
    let mut summary = ArchiveSummary::default();

    for relative in &files {
        let mut file = fs::File::open(dir.join(relative))?;
        zip.start_file(entry_name(relative), options)?;
        summary.bytes_copied += io::copy(&mut file, &mut zip)?;
        summary.entries += 1;
    }

    zip.finish()?;
    debug!(
        dir = %dir.display(),
        entries = summary.entries,
        bytes = summary.bytes_copied,
        "archive built"
    );
    Ok(summary)
}

/// Build the archive into an anonymous temp file, rewound and ready for
/// streaming. The spool lives outside the staging root so it can never
/// race the reclamation sweep.
pub fn build_to_tempfile(dir: &Path) -> Result<(fs::File, ArchiveSummary), ArchiveError> {
    let mut file = tempfile::tempfile()?;
    let summary = build_archive(dir, &mut file)?;
    file.rewind()?;
    Ok((file, summary))
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_files(root, &path, out)?;
        } else if let Ok(relative) = path.strip_prefix(root) {
            out.push(relative.to_path_buf());
        }
    }
    Ok(())
}

/// Zip entry names always use forward slashes.
fn entry_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
