//! Durable measurement log.
//!
//! One delimited text file per pipeline run. The header is written when the file
//! is created, every row is flushed as soon as it is written, and a failed write
//! drops the handle so the next row reopens the file in append mode.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::{AppResult, DynoError};
use crate::measurement::{MeasurementRecord, SampleKind};

/// Consecutive failed appends before the log is reported as degraded.
pub const PERSISTENCE_ALERT_THRESHOLD: u32 = 3;

/// Column delimiter of the log file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delimiter {
    /// `\t`, the default
    #[default]
    Tab,
    /// `,`
    Comma,
}

impl Delimiter {
    /// The delimiter byte handed to the csv writer.
    pub fn as_byte(self) -> u8 {
        match self {
            Delimiter::Tab => b'\t',
            Delimiter::Comma => b',',
        }
    }
}

/// Header row for logs fed by `kind` samples.
pub fn header(kind: SampleKind) -> [&'static str; 6] {
    let first = match kind {
        SampleKind::Pulse => "Index",
        SampleKind::Window => "Pulses",
    };
    [first, "RPM", "Δt(ns)", "ω(rad/s)", "Torque(Nm)", "Power(W)"]
}

/// Render one record with the fixed column precision.
pub fn format_row(record: &MeasurementRecord) -> [String; 6] {
    [
        record.count.to_string(),
        format!("{:.2}", record.rpm),
        format!("{:.2}", record.interval_ns as f64),
        format!("{:.2}", record.omega),
        format!("{:.3}", record.torque),
        format!("{:.2}", record.power),
    ]
}

/// Append-only log owned by the writer thread.
pub struct MeasurementLog {
    path: PathBuf,
    delimiter: Delimiter,
    kind: SampleKind,
    writer: Option<csv::Writer<File>>,
    rows_written: u64,
    consecutive_failures: u32,
    degraded: bool,
}

impl MeasurementLog {
    /// Create (or truncate) the log at `path` and write its header.
    ///
    /// A failure here is not fatal: it is logged and the first append retries.
    pub fn create(path: impl Into<PathBuf>, delimiter: Delimiter, kind: SampleKind) -> Self {
        let mut log = Self {
            path: path.into(),
            delimiter,
            kind,
            writer: None,
            rows_written: 0,
            consecutive_failures: 0,
            degraded: false,
        };

        match log.open(true) {
            Ok(writer) => {
                info!(path = %log.path.display(), ?delimiter, "Measurement log created");
                log.writer = Some(writer);
            }
            Err(e) => {
                warn!(path = %log.path.display(), error = %e, "Could not create measurement log, will retry on first record");
            }
        }
        log
    }

    fn open(&self, truncate: bool) -> AppResult<csv::Writer<File>> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = if truncate {
            File::create(&self.path)?
        } else {
            OpenOptions::new()
                .create(true)
                .read(true)
                .append(true)
                .open(&self.path)?
        };
        let len = file.metadata()?.len();
        let needs_header = len == 0;

        // a write that failed mid-row leaves no terminator; start the next row clean
        if len > 0 && !truncate {
            let mut last = [0u8; 1];
            file.seek(SeekFrom::End(-1))?;
            file.read_exact(&mut last)?;
            if last[0] != b'\n' {
                file.write_all(b"\n")?;
            }
        }

        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter.as_byte())
            .has_headers(false)
            .from_writer(file);

        if needs_header {
            writer.write_record(header(self.kind))?;
            writer.flush()?;
        }
        Ok(writer)
    }

    fn write_row(&mut self, record: &MeasurementRecord) -> AppResult<()> {
        if self.writer.is_none() {
            self.writer = Some(self.open(false)?);
        }
        if let Some(writer) = self.writer.as_mut() {
            writer.write_record(format_row(record))?;
            writer.flush()?;
        }
        Ok(())
    }

    /// Append one row and flush it.
    ///
    /// On failure the handle is dropped and the next call reopens the file.
    pub fn append(&mut self, record: &MeasurementRecord) -> AppResult<()> {
        match self.write_row(record) {
            Ok(()) => {
                self.rows_written += 1;
                if self.degraded {
                    info!(path = %self.path.display(), "Measurement log recovered");
                }
                self.consecutive_failures = 0;
                self.degraded = false;
                Ok(())
            }
            Err(e) => {
                self.writer = None;
                self.consecutive_failures += 1;
                if self.consecutive_failures == PERSISTENCE_ALERT_THRESHOLD {
                    self.degraded = true;
                    error!(
                        path = %self.path.display(),
                        failures = self.consecutive_failures,
                        error = %e,
                        "Measurement log is failing, live data continues without durable copy"
                    );
                }
                Err(DynoError::PersistenceFailure(e.to_string()))
            }
        }
    }

    /// Flush and release the file handle.
    pub fn close(&mut self) -> AppResult<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            info!(path = %self.path.display(), rows = self.rows_written, "Measurement log closed");
        }
        Ok(())
    }

    /// Location of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the last [`PERSISTENCE_ALERT_THRESHOLD`] or more appends failed.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Rows appended and flushed since creation, header excluded.
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }
}

impl Drop for MeasurementLog {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "Failed to flush measurement log on drop");
        }
    }
}
