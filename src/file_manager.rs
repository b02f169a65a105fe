// src/file_manager.rs - Motion download storage
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct FileManager {
    motion_dir: PathBuf,
}

impl FileManager {
    pub fn new<P: Into<PathBuf>>(motion_dir: P) -> Self {
        Self {
            motion_dir: motion_dir.into(),
        }
    }

    pub fn motion_dir(&self) -> &Path {
        &self.motion_dir
    }

    /// `<motion_dir>/<YYYY-mm-dd_HHMMSS>_<action>`, without extension.
    pub fn download_base(&self, action: &str, at: DateTime<Local>) -> PathBuf {
        self.motion_dir
            .join(format!("{}_{}", at.format("%Y-%m-%d_%H%M%S"), action))
    }

    /// Create the `.puls` file for a download.
    pub fn create_motion_file(&self, base: &Path) -> std::io::Result<BufWriter<File>> {
        fs::create_dir_all(&self.motion_dir)?;
        let path = base.with_extension("puls");
        tracing::info!("Writing motion file: {}", path.display());
        Ok(BufWriter::new(File::create(path)?))
    }

    /// Write the pretty-printed `.info` file next to a download.
    pub fn write_info<T: Serialize>(&self, base: &Path, info: &T) -> std::io::Result<PathBuf> {
        let path = base.with_extension("info");
        let mut file = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(&mut file, info)?;
        writeln!(file)?;
        file.flush()?;
        Ok(path)
    }

    /// Remove whatever a failed download left behind.
    pub fn discard(&self, base: &Path) {
        for path in [base.with_extension("puls"), base.with_extension("info")] {
            match fs::remove_file(&path) {
                Ok(()) => tracing::info!("Removed {}", path.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Cannot remove {}: {}", path.display(), e),
            }
        }
    }
}
