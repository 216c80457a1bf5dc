/// Append-only CSV output for accelerometer readings
use log::info;
use std::fs::OpenOptions;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::models::Reading;

pub const CSV_HEADER: &str = "timestamp,ctr,ax_g,ay_g,az_g";

/// CSV file that readings are appended to
///
/// The file is opened, written and closed for every record, so no handle
/// is held between notifications.
#[derive(Debug, Clone)]
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    /// Prepare the sink, creating the file with a header if it does not exist
    ///
    /// An existing file is left untouched, whatever it contains.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                writeln!(file, "{}", CSV_HEADER)?;
                info!("Created {} with header", path.display());
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                info!("Appending to existing {}", path.display());
            }
            Err(e) => return Err(e),
        }

        Ok(CsvSink { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one reading as a single line
    pub fn append(&self, reading: &Reading) -> io::Result<()> {
        let mut file = OpenOptions::new().append(true).create(true).open(&self.path)?;
        // One write call per record keeps the line intact under O_APPEND
        let line = format!("{}\n", reading.to_csv_line());
        file.write_all(line.as_bytes())
    }
}
