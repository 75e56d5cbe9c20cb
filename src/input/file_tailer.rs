use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while reading the monitored log
#[derive(Error, Debug)]
pub enum TailError {
    #[error("Log file not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Lines appended since the cursor, plus the offset just past them.
///
/// Reading does not move the cursor; the caller commits `end_offset`
/// once the lines have been handled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chunk {
    pub lines: Vec<String>,
    pub end_offset: u64,
}

/// Incremental reader over an append-only log file
#[derive(Debug)]
pub struct LogTailer {
    file_path: PathBuf,
    cursor: u64,
}

impl LogTailer {
    /// Create a tailer with the cursor at the start of the file
    pub fn new(file_path: PathBuf) -> Self {
        LogTailer {
            file_path,
            cursor: 0,
        }
    }

    /// Move the cursor to the current end of file so only new appends are seen.
    ///
    /// A missing file leaves the cursor at 0; once it appears it is read from
    /// its first byte.
    pub fn prime(&mut self) {
        match std::fs::metadata(&self.file_path) {
            Ok(meta) => {
                self.cursor = meta.len();
                log::info!(
                    "Tailing {:?} from offset {}",
                    self.file_path,
                    self.cursor
                );
            }
            Err(e) => {
                self.cursor = 0;
                log::warn!(
                    "Cannot stat {:?} ({}), starting from offset 0",
                    self.file_path,
                    e
                );
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Read every complete line appended after the cursor.
    ///
    /// A trailing fragment with no newline yet is left for the next read.
    pub fn read_new(&self) -> Result<Chunk, TailError> {
        let mut file = File::open(&self.file_path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => TailError::NotFound(self.file_path.display().to_string()),
            _ => TailError::Io(e),
        })?;

        let len = file.metadata()?.len();
        if len < self.cursor {
            // Rotation and truncation are not followed
            log::warn!(
                "{:?} shrank to {} bytes, below cursor {}; waiting for it to grow",
                self.file_path,
                len,
                self.cursor
            );
            return Ok(Chunk {
                lines: Vec::new(),
                end_offset: self.cursor,
            });
        }

        file.seek(SeekFrom::Start(self.cursor))?;
        let mut buf = Vec::with_capacity((len - self.cursor) as usize);
        file.read_to_end(&mut buf)?;

        let Some(last_newline) = buf.iter().rposition(|&b| b == b'\n') else {
            return Ok(Chunk {
                lines: Vec::new(),
                end_offset: self.cursor,
            });
        };
        let consumed = last_newline + 1;

        let lines = buf[..last_newline]
            .split(|&b| b == b'\n')
            .map(|raw| {
                let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
                String::from_utf8_lossy(raw).into_owned()
            })
            .collect();

        Ok(Chunk {
            lines,
            end_offset: self.cursor + consumed as u64,
        })
    }

    /// Advance the cursor after a chunk was handled; never moves backwards
    pub fn commit(&mut self, end_offset: u64) {
        if end_offset > self.cursor {
            self.cursor = end_offset;
        }
    }
}
