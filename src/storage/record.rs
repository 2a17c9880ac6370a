//! The append-only CSV record store.
//!
//! The first write of a session truncates (or creates) the file and writes
//! the header before the first row. Every later write appends one row.
//! Each write is flushed and synced to stable storage before returning.

use crate::core::snapshot::Snapshot;
use chrono::NaiveTime;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Header row of the record file.
pub const RECORD_HEADER: &str = "Timestamp,HeartRate,RMSSD,SDNN,StressLevel,AccelX,AccelY,AccelZ";

/// Wall-clock format of the timestamp column.
pub const TIMESTAMP_FORMAT: &str = "%H:%M:%S";

/// Render one data row (without the trailing newline).
///
/// Missing numbers render as `0.0` and a missing stress label as `null`.
pub fn format_row(snapshot: &Snapshot, at: NaiveTime) -> String {
    let [ax, ay, az] = snapshot.acceleration;
    let stress = snapshot.stress.map_or("null", |s| s.label());
    format!(
        "{},{:?},{:?},{:?},{},{:?},{:?},{:?}",
        at.format(TIMESTAMP_FORMAT),
        snapshot.heart_rate.unwrap_or(0.0),
        snapshot.rmssd.unwrap_or(0.0),
        snapshot.sdnn.unwrap_or(0.0),
        stress,
        ax,
        ay,
        az
    )
}

/// Session-scoped handle on the record file.
#[derive(Debug)]
pub struct RecordStore {
    path: PathBuf,
    initialized: bool,
    rows_written: u64,
}

impl RecordStore {
    /// A store for a new session: the first write replaces any existing file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            initialized: false,
            rows_written: 0,
        }
    }

    /// A store continuing an existing file: writes append if the file already
    /// has content.
    pub fn resume(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let initialized = std::fs::metadata(&path)
            .map(|m| m.len() > 0)
            .unwrap_or(false);
        Self {
            path,
            initialized,
            rows_written: 0,
        }
    }

    /// Write one row for `snapshot`, durably. Returns the file size afterwards.
    pub fn append(&mut self, snapshot: &Snapshot, at: NaiveTime) -> io::Result<u64> {
        let row = format_row(snapshot, at);
        let first = !self.initialized;

        let file = if first {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&self.path)?
        } else {
            OpenOptions::new()
                .append(true)
                .create(true)
                .open(&self.path)?
        };

        let mut writer = BufWriter::new(file);
        if first {
            writeln!(writer, "{RECORD_HEADER}")?;
        }
        writeln!(writer, "{row}")?;
        writer.flush()?;

        let file: &File = writer.get_ref();
        file.sync_all()?;
        let size = file.metadata()?.len();

        // Only a synced header counts as initialized; a failed first write
        // is retried as a first write.
        self.initialized = true;
        self.rows_written += 1;
        Ok(size)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Rows written by this handle.
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    pub fn into_path(self) -> PathBuf {
        self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hrv::StressLevel;

    fn noon() -> NaiveTime {
        NaiveTime::from_hms_opt(12, 34, 56).unwrap()
    }

    #[test]
    fn test_format_row_defaults() {
        let row = format_row(&Snapshot::default(), noon());
        assert_eq!(row, "12:34:56,0.0,0.0,0.0,null,0.0,0.0,0.0");
    }

    #[test]
    fn test_format_row_values() {
        let snapshot = Snapshot {
            heart_rate: Some(72.0),
            rmssd: Some(42.5),
            sdnn: Some(10.25),
            stress: Some(StressLevel::Moderate),
            acceleration: [0.5, -9.75, 1.0],
        };
        let row = format_row(&snapshot, noon());
        assert_eq!(
            row,
            "12:34:56,72.0,42.5,10.25,Moderate Stress,0.5,-9.75,1.0"
        );
    }

    #[test]
    fn test_format_row_extreme_magnitudes_use_exponent() {
        let snapshot = Snapshot {
            heart_rate: Some(1e20),
            acceleration: [1e-7, 0.0, -2.5e-8],
            ..Snapshot::default()
        };
        let row = format_row(&snapshot, noon());
        assert_eq!(row, "12:34:56,1e20,0.0,0.0,null,1e-7,0.0,-2.5e-8");
    }

    #[test]
    fn test_first_write_has_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("record.csv");
        let mut store = RecordStore::new(&path);

        store.append(&Snapshot::default(), noon()).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], RECORD_HEADER);
        assert!(store.is_initialized());
    }

    #[test]
    fn test_later_writes_append_one_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("record.csv");
        let mut store = RecordStore::new(&path);

        store.append(&Snapshot::default(), noon()).unwrap();
        let before = std::fs::read(&path).unwrap();

        let snapshot = Snapshot {
            heart_rate: Some(80.0),
            ..Snapshot::default()
        };
        let size = store.append(&snapshot, noon()).unwrap();
        let after = std::fs::read(&path).unwrap();

        assert_eq!(size, after.len() as u64);
        assert!(after.starts_with(&before));
        let tail = String::from_utf8(after[before.len()..].to_vec()).unwrap();
        assert_eq!(tail, "12:34:56,80.0,0.0,0.0,null,0.0,0.0,0.0\n");
        assert_eq!(store.rows_written(), 2);
    }

    #[test]
    fn test_new_session_truncates_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("record.csv");
        std::fs::write(&path, "stale,data\nfrom,before\n").unwrap();

        let mut store = RecordStore::new(&path);
        store.append(&Snapshot::default(), noon()).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("stale"));
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn test_resume_appends_without_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("record.csv");
        RecordStore::new(&path)
            .append(&Snapshot::default(), noon())
            .unwrap();

        let mut resumed = RecordStore::resume(&path);
        assert!(resumed.is_initialized());
        resumed.append(&Snapshot::default(), noon()).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches(RECORD_HEADER).count(), 1);
        assert_eq!(content.lines().count(), 3);
    }

    #[test]
    fn test_failed_first_write_stays_uninitialized() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be makes the open fail.
        let path = dir.path().join("record.csv");
        std::fs::create_dir(&path).unwrap();

        let mut store = RecordStore::new(&path);
        assert!(store.append(&Snapshot::default(), noon()).is_err());
        assert!(!store.is_initialized());
        assert_eq!(store.rows_written(), 0);
    }
}
