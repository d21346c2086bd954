// PID record for the supervised server

use crate::error::{FpsmonError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Plain-text file holding the server's PID
#[derive(Debug, Clone)]
pub struct PidRecord {
    path: PathBuf,
}

impl PidRecord {
    pub fn with_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Write `pid` to the record, replacing any previous value
    pub fn write(&self, pid: u32) -> Result<()> {
        fs::write(&self.path, pid.to_string())
            .map_err(|e| FpsmonError::PidRecord(format!("Failed to write PID file: {}", e)))?;
        Ok(())
    }

    pub fn read(&self) -> Result<u32> {
        let content = fs::read_to_string(&self.path)
            .map_err(|e| FpsmonError::PidRecord(format!("Failed to read PID file: {}", e)))?;

        content
            .trim()
            .parse::<u32>()
            .map_err(|e| FpsmonError::PidRecord(format!("Invalid PID in file: {}", e)))
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Remove the record; a missing file is fine
    pub fn remove(&self) -> Result<()> {
        if self.exists() {
            fs::remove_file(&self.path)
                .map_err(|e| FpsmonError::PidRecord(format!("Failed to remove PID file: {}", e)))?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let record = PidRecord::with_path(temp_dir.path().join("server.pid"));

        record.write(4242).unwrap();
        assert_eq!(record.read().unwrap(), 4242);
        assert_eq!(fs::read_to_string(record.path()).unwrap(), "4242");
    }

    #[test]
    fn test_remove() {
        let temp_dir = TempDir::new().unwrap();
        let record = PidRecord::with_path(temp_dir.path().join("server.pid"));

        record.remove().unwrap();
        record.write(1).unwrap();
        assert!(record.exists());
        record.remove().unwrap();
        assert!(!record.exists());
    }

    #[test]
    fn test_invalid_content() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("server.pid");
        fs::write(&path, "not a pid").unwrap();

        let record = PidRecord::with_path(&path);
        assert!(matches!(record.read(), Err(FpsmonError::PidRecord(_))));
    }
}
