// # File Config Sink
//
// Applies rendered documents to a path the proxy watches for dynamic
// configuration.
//
// ## Atomicity
//
// Every apply writes the document to a temporary file next to the
// destination, flushes it, then renames it over the watched path. Rename
// is atomic on POSIX filesystems, so the proxy observes either the old
// document or the new one, never a mixture. On a mid-write failure the
// temporary file is abandoned and the watched path is untouched.
//
// ## Failure classification
//
// All I/O failures here are classified transient (disk pressure, missing
// mounts): the engine retries them with backoff. The sink performs one
// write attempt per apply call and never retries itself.

use async_trait::async_trait;
use routesync_core::config::SinkConfig;
use routesync_core::render::RenderedConfig;
use routesync_core::traits::{ConfigSink, ConfigSinkFactory};
use routesync_core::{Error, Result, SyncRegistry};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// File-based config sink with atomic rename semantics
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    /// Create a file sink for the given watched path
    ///
    /// Creates the parent directory if it does not exist so that the first
    /// apply does not fail on a fresh host.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::config(format!(
                        "Failed to create sink directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        Ok(Self { path })
    }

    /// Path to the temporary file used for atomic writes
    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }
}

#[async_trait]
impl ConfigSink for FileSink {
    async fn apply(&self, config: &RenderedConfig) -> Result<()> {
        let temp_path = self.temp_path();

        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::write_transient(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.write_all(config.as_bytes()).await.map_err(|e| {
                Error::write_transient(format!(
                    "Failed to write to temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.flush().await.map_err(|e| {
                Error::write_transient(format!(
                    "Failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        // Atomic rename (temp -> watched path)
        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::write_transient(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::debug!(
            "wrote configuration {} to {}",
            config.fingerprint(),
            self.path.display()
        );
        Ok(())
    }

    fn sink_name(&self) -> &'static str {
        "file"
    }
}

/// Factory for creating file sinks
pub struct FileSinkFactory;

impl ConfigSinkFactory for FileSinkFactory {
    fn create(&self, config: &SinkConfig) -> Result<Box<dyn ConfigSink>> {
        match config {
            SinkConfig::File { path } => Ok(Box::new(FileSink::new(path)?)),
            _ => Err(Error::config("Invalid config for file sink")),
        }
    }
}

/// Register the file sink with a registry
pub fn register(registry: &SyncRegistry) {
    registry.register_sink("file", Box::new(FileSinkFactory));
}
