//! Per-target append-only log of retained filenames
//!
//! The log is the only source of resume state: the directory listing is
//! never trusted, so a truncated file left behind by a crash is simply
//! downloaded again. The log itself is only ever appended to.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Reads the retained filenames from a log, skipping blank lines
///
/// A missing log reads as empty.
pub fn read_log(path: &Path) -> io::Result<Vec<String>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}

/// True for an empty file or one whose last byte is '\n'
fn ends_with_newline(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0_u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// Open handle on a target's log, owned by that target's crawl task
#[derive(Debug)]
pub struct PersistenceLog {
    path: PathBuf,
    file: File,
    entries: usize,
}

impl PersistenceLog {
    /// Opens the log for appending and returns the entries it already holds
    ///
    /// Existing content is never rewritten. A last line without its newline
    /// gets one before the first append.
    pub fn open(path: &Path) -> io::Result<(Self, Vec<String>)> {
        let existing = read_log(path)?;

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        if !ends_with_newline(path)? {
            writeln!(file)?;
            file.flush()?;
        }

        let log = Self {
            path: path.to_path_buf(),
            file,
            entries: existing.len(),
        };
        Ok((log, existing))
    }

    /// Appends one filename and flushes it to disk
    pub fn append(&mut self, filename: &str) -> io::Result<()> {
        writeln!(self.file, "{}", filename)?;
        self.file.flush()?;
        self.entries += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of filenames in the log
    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }
}
