use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, LineWriter, Write};
use std::path::{Path, PathBuf};

use ftsim_types::ChannelSample;
use tracing::{debug, warn};

use crate::error::{MetricsError, Result};

/// Append-only RSSI/SNR log.
///
/// The file is opened on the first sample and stays open until [`close`]
/// (or drop). If it cannot be opened the sink disables itself for the rest
/// of the run; samples are dropped, the transfer is unaffected.
///
/// [`close`]: ChannelLog::close
pub struct ChannelLog {
    path: PathBuf,
    writer: Option<LineWriter<File>>,
    disabled: bool,
    written: u64,
}

impl ChannelLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: None,
            disabled: false,
            written: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of lines written by this instance.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn record(&mut self, sample: &ChannelSample) {
        if self.disabled {
            return;
        }

        if self.writer.is_none() {
            match open_append(&self.path) {
                Ok(file) => self.writer = Some(LineWriter::new(file)),
                Err(e) => {
                    warn!("Channel log disabled for this run: {}", e);
                    self.disabled = true;
                    return;
                }
            }
        }

        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        if let Err(e) = writeln!(writer, "{}", sample) {
            warn!(path = %self.path.display(), "Channel log write failed, disabling: {}", e);
            self.writer = None;
            self.disabled = true;
            return;
        }
        self.written += 1;
    }

    /// Flush and release the file handle. Recording again reopens it.
    pub fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                warn!(path = %self.path.display(), "Channel log flush failed: {}", e);
            }
            debug!(path = %self.path.display(), samples = self.written, "Channel log closed");
        }
    }
}

impl Drop for ChannelLog {
    fn drop(&mut self) {
        self.close();
    }
}

fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| MetricsError::Write {
            path: path.to_path_buf(),
            source,
        })?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| MetricsError::Write {
            path: path.to_path_buf(),
            source,
        })
}

/// Parse one `time,RSSI=<v>,SNR=<v>` line.
pub fn parse_sample_line(line: &str) -> Option<ChannelSample> {
    let mut fields = line.trim().split(',');
    let time = fields.next()?.trim().parse().ok()?;
    let rssi_dbm = fields.next()?.trim().strip_prefix("RSSI=")?.parse().ok()?;
    let snr_db = fields.next()?.trim().strip_prefix("SNR=")?.parse().ok()?;
    if fields.next().is_some() {
        return None;
    }
    Some(ChannelSample {
        time,
        rssi_dbm,
        snr_db,
    })
}

/// Most recent sample in a channel log.
///
/// `Ok(None)` if the file is missing, empty, or its last line is malformed.
pub fn read_last_sample(path: &Path) -> Result<Option<ChannelSample>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(MetricsError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    Ok(text
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .and_then(parse_sample_line))
}
