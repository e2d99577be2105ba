//! Archive store
//!
//! One JSON object per line, UTF-8, newline-terminated. The file is
//! rewritten wholesale by every collection run and only ever
//! replaced atomically: readers see either the previous archive or
//! the complete new one.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;

use crate::schema::NormalizedRecord;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("archive I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("serializing record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("{path} line {line}: {source}")]
    Parse {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> ArchiveError + '_ {
    move |source| ArchiveError::Io { path: path.to_path_buf(), source }
}

/// Replaces the archive at `path` with `records`.
pub fn write_archive(path: &Path, records: &[NormalizedRecord]) -> Result<(), ArchiveError> {
    replace_atomically(path, |w| {
        for record in records {
            serde_json::to_writer(&mut *w, record)?;
            w.write_all(b"\n").map_err(io_err(path))?;
        }
        Ok(())
    })
}

/// Writes through `fill` into a temp file next to `path`, syncs it,
/// then renames it over `path`.
///
/// If `fill` or any step fails the temp file is removed on drop and
/// the file at `path` is left as it was.
fn replace_atomically<F>(path: &Path, fill: F) -> Result<(), ArchiveError>
where
    F: FnOnce(&mut BufWriter<&mut File>) -> Result<(), ArchiveError>,
{
    // Same directory, so the final rename never crosses filesystems
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(io_err(dir))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err(dir))?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        fill(&mut writer)?;
        writer.flush().map_err(io_err(path))?;
    }
    tmp.as_file().sync_all().map_err(io_err(path))?;

    tmp.persist(path).map_err(|e| io_err(path)(e.error))?;
    Ok(())
}

/// Reads every record of the archive, in file order.
///
/// Blank lines are skipped; a malformed line is an error naming
/// its 1-based line number.
pub fn read_archive(path: &Path) -> Result<Vec<NormalizedRecord>, ArchiveError> {
    let file = File::open(path).map_err(io_err(path))?;
    let reader = BufReader::new(file);

    let mut records = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(io_err(path))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let record = serde_json::from_str(trimmed).map_err(|source| ArchiveError::Parse {
            path: path.to_path_buf(),
            line: idx + 1,
            source,
        })?;
        records.push(record);
    }
    Ok(records)
}
