// docbackup/src/backup/archive.rs
//! Archive format: a gzip stream holding a short header (magic bytes and a
//! format version) followed by the bincode encoding of the [`Snapshot`].

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use bincode::Options;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::info;

use crate::errors::{AppError, Result};
use crate::snapshot::Snapshot;

const ARCHIVE_MAGIC: &[u8; 6] = b"DOCBAK";
const ARCHIVE_VERSION: u8 = 1;

/// Writes `snapshot` as a compressed archive at `archive_dest_path`.
///
/// The archive is assembled in a temporary file next to the destination and
/// renamed into place, so a reader never sees a partially written archive.
pub fn encode_snapshot(snapshot: &Snapshot, archive_dest_path: &Path) -> Result<PathBuf> {
    let parent = archive_dest_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    fs::create_dir_all(parent)?;

    info!(
        "🗜 Writing archive with {} collections ({} documents) to {}",
        snapshot.collections.len(),
        snapshot.document_count(),
        archive_dest_path.display()
    );

    let staging = NamedTempFile::new_in(parent)?;
    {
        let mut encoder = GzEncoder::new(BufWriter::new(staging.as_file()), Compression::default());
        write_snapshot(&mut encoder, snapshot)?;
        let mut writer = encoder.finish()?;
        writer.flush()?;
    }
    staging.as_file().sync_all()?;
    staging
        .persist(archive_dest_path)
        .map_err(|e| AppError::Io(e.error))?;

    info!("✓ Archive written to {}", archive_dest_path.display());
    Ok(archive_dest_path.to_path_buf())
}

/// Reads a snapshot back from an archive written by [`encode_snapshot`].
pub fn decode_snapshot(archive_path: &Path) -> Result<Snapshot> {
    let archive_file = match File::open(archive_path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(AppError::NotFound(format!(
                "Archive {} does not exist",
                archive_path.display()
            )));
        }
        Err(e) => return Err(e.into()),
    };

    info!("Reading archive {}", archive_path.display());
    let snapshot = read_snapshot(GzDecoder::new(BufReader::new(archive_file)))?;
    info!(
        "✓ Archive holds {} collections ({} documents)",
        snapshot.collections.len(),
        snapshot.document_count()
    );
    Ok(snapshot)
}

pub(crate) fn write_snapshot<W: Write>(writer: &mut W, snapshot: &Snapshot) -> Result<()> {
    writer.write_all(ARCHIVE_MAGIC)?;
    writer.write_all(&[ARCHIVE_VERSION])?;
    snapshot_codec().serialize_into(&mut *writer, snapshot).map_err(|e| match *e {
        bincode::ErrorKind::Io(io_err) => AppError::Io(io_err),
        other => AppError::Io(io::Error::other(format!("Failed to serialize snapshot: {}", other))),
    })
}

pub(crate) fn read_snapshot<R: Read>(mut reader: R) -> Result<Snapshot> {
    let mut header = [0u8; ARCHIVE_MAGIC.len() + 1];
    reader
        .read_exact(&mut header)
        .map_err(|e| corrupt("unreadable archive header", e))?;
    if &header[..ARCHIVE_MAGIC.len()] != ARCHIVE_MAGIC {
        return Err(AppError::CorruptArchive("bad magic bytes".to_string()));
    }
    let version = header[ARCHIVE_MAGIC.len()];
    if version != ARCHIVE_VERSION {
        return Err(AppError::CorruptArchive(format!(
            "unsupported archive version {}",
            version
        )));
    }

    // decoding from a slice bounds every length prefix by the bytes present
    let mut payload = Vec::new();
    reader
        .read_to_end(&mut payload)
        .map_err(|e| corrupt("unreadable archive payload", e))?;

    snapshot_codec()
        .deserialize(&payload)
        .map_err(|e| corrupt("undecodable snapshot", e))
}

/// Fixed-width little-endian bincode; anything after the snapshot is an error.
fn snapshot_codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes()
}

fn corrupt(what: &str, err: impl std::fmt::Display) -> AppError {
    AppError::CorruptArchive(format!("{}: {}", what, err))
}
