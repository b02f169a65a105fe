// src/communication/transport.rs - Download and upload boundary
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("unsupported URL: {0}")]
    Unsupported(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where motion files come from and where captured images go.
pub trait Transport: Send + Sync {
    /// Open `url` as a byte stream. The caller reads it incrementally.
    fn fetch(&self, url: &str) -> Result<Box<dyn Read + Send>, TransportError>;

    /// Hand a captured image for request `action_id` to the service.
    fn upload_image(&self, action_id: u64, action: &str, file_name: &str, bytes: &[u8]) -> Result<(), TransportError>;
}

/// Reads `file://` URLs and plain paths; writes uploads into a directory.
#[derive(Debug, Clone)]
pub struct LocalTransport {
    upload_dir: PathBuf,
}

impl LocalTransport {
    pub fn new<P: Into<PathBuf>>(upload_dir: P) -> Self {
        Self {
            upload_dir: upload_dir.into(),
        }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    /// Name an upload is stored under.
    pub fn upload_path(&self, action_id: u64, action: &str, file_name: &str) -> PathBuf {
        self.upload_dir.join(format!("{}_{}_{}", action_id, action, file_name))
    }

    fn resolve(url: &str) -> Result<&Path, TransportError> {
        if let Some(path) = url.strip_prefix("file://") {
            return Ok(Path::new(path));
        }
        match url.split_once("://") {
            Some(_) => Err(TransportError::Unsupported(url.to_string())),
            None => Ok(Path::new(url)),
        }
    }
}

impl Transport for LocalTransport {
    fn fetch(&self, url: &str) -> Result<Box<dyn Read + Send>, TransportError> {
        let path = Self::resolve(url)?;
        tracing::debug!("Fetching {}", path.display());
        match File::open(path) {
            Ok(file) => Ok(Box::new(BufReader::new(file))),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(TransportError::NotFound(url.to_string())),
            Err(e) => Err(TransportError::Io(e)),
        }
    }

    fn upload_image(&self, action_id: u64, action: &str, file_name: &str, bytes: &[u8]) -> Result<(), TransportError> {
        std::fs::create_dir_all(&self.upload_dir)?;
        let path = self.upload_path(action_id, action, file_name);
        tracing::info!("Uploading {} ({} bytes) to {}", file_name, bytes.len(), path.display());
        std::fs::write(path, bytes)?;
        Ok(())
    }
}
