//! Replay of MessagePack record files
//!
//! Records are decoded lazily, one per `next()`, in write order. Each call to
//! [`RecordReader::records`] reopens the file, so a replay can be restarted.

use crate::{Item, SinkError};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Reader for files written by [`MessagePackSink`](crate::output::MessagePackSink)
#[derive(Debug, Clone)]
pub struct RecordReader {
    path: PathBuf,
}

impl RecordReader {
    /// Creates a reader; the file must exist
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        std::fs::metadata(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Starts a new pass over the records
    pub fn records(&self) -> Result<Records, SinkError> {
        let file = File::open(&self.path)?;
        Ok(Records {
            reader: BufReader::new(file),
            done: false,
        })
    }
}

/// Lazy iterator over the records of one file
///
/// Stops after the first decoding error; a truncated final record is
/// reported as an error rather than silently skipped.
#[derive(Debug)]
pub struct Records {
    reader: BufReader<File>,
    done: bool,
}

impl Iterator for Records {
    type Item = Result<Item, SinkError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        // End of file is only legal on a record boundary
        match self.reader.fill_buf() {
            Ok([]) => {
                self.done = true;
                return None;
            }
            Ok(_) => {}
            Err(e) => {
                self.done = true;
                return Some(Err(e.into()));
            }
        }

        match rmp_serde::from_read::<_, Item>(&mut self.reader) {
            Ok(item) => Some(Ok(item)),
            Err(e) => {
                self.done = true;
                Some(Err(e.into()))
            }
        }
    }
}
