// # File Target Source
//
// Reads the desired targets from a JSON file on disk. Meant for CI runs,
// static fleets, and hosts without a container registry; the file holds a
// plain array of target specs:
//
// ```json
// [
//   {"id": "web-1", "rule_host": "x.test", "address": "10.0.0.1", "port": 80},
//   {"id": "web-2", "rule_host": "x.test", "address": "10.0.0.2", "port": 80}
// ]
// ```
//
// A missing file is transient (a deployer may be mid-replace); a file that
// exists but does not parse is permanent, because rereading the same bytes
// cannot succeed.
//
// `watch()` polls the file's modification time and emits a ChangeNotice
// when it moves.

use async_trait::async_trait;
use routesync_core::config::SourceConfig;
use routesync_core::model::{RouteSet, Target};
use routesync_core::traits::{ChangeNotice, TargetSource, TargetSourceFactory};
use routesync_core::{Error, Result, SyncRegistry};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::{Duration, SystemTime};
use tokio_stream::Stream;
use tokio_stream::wrappers::ReceiverStream;

/// Capacity of the watch notice channel
const NOTICE_CHANNEL_CAPACITY: usize = 16;

/// File-based target source
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    poll_interval: Duration,
}

impl FileSource {
    /// Create a file source for the given target list path
    pub fn new<P: AsRef<Path>>(path: P, poll_interval: Duration) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            poll_interval,
        }
    }

    /// Poll loop behind `watch()`
    ///
    /// Stops as soon as the notice stream is dropped, even when the file
    /// never changes again.
    async fn poll_for_changes(
        path: PathBuf,
        poll_interval: Duration,
        tx: tokio::sync::mpsc::Sender<ChangeNotice>,
    ) {
        tracing::info!(
            "watching target list {} (interval {:?})",
            path.display(),
            poll_interval
        );

        let mut last_modified: Option<SystemTime> = None;
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = tx.closed() => {
                    tracing::debug!("notice stream dropped, stopping watch");
                    return;
                }
            }

            let modified = match tokio::fs::metadata(&path).await {
                Ok(meta) => meta.modified().ok(),
                // Absent file: wait for it to appear.
                Err(_) => None,
            };

            if modified.is_some() && modified != last_modified {
                last_modified = modified;
                // Full channel means a notice is already pending.
                let _ = tx.try_send(ChangeNotice::new("file"));
            }
        }
    }

    async fn read_targets(path: &Path) -> Result<RouteSet> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            Error::discovery_transient(format!(
                "Failed to read target list {}: {}",
                path.display(),
                e
            ))
        })?;

        let targets: Vec<Target> = serde_json::from_slice(&bytes).map_err(|e| {
            Error::discovery_permanent(format!(
                "Malformed target list {}: {}",
                path.display(),
                e
            ))
        })?;

        Ok(RouteSet::from_targets(targets))
    }
}

#[async_trait]
impl TargetSource for FileSource {
    async fn fetch(&self) -> Result<RouteSet> {
        Self::read_targets(&self.path).await
    }

    fn watch(&self) -> Pin<Box<dyn Stream<Item = ChangeNotice> + Send + 'static>> {
        let (tx, rx) = tokio::sync::mpsc::channel(NOTICE_CHANNEL_CAPACITY);

        tokio::spawn(Self::poll_for_changes(
            self.path.clone(),
            self.poll_interval,
            tx,
        ));

        Box::pin(ReceiverStream::new(rx))
    }

    fn source_name(&self) -> &'static str {
        "file"
    }
}

/// Factory for creating file sources
pub struct FileSourceFactory;

impl TargetSourceFactory for FileSourceFactory {
    fn create(&self, config: &SourceConfig) -> Result<Box<dyn TargetSource>> {
        match config {
            SourceConfig::File {
                path,
                poll_interval_secs,
            } => Ok(Box::new(FileSource::new(
                path,
                Duration::from_secs(*poll_interval_secs),
            ))),
            _ => Err(Error::config("Invalid config for file source")),
        }
    }
}

/// Register the file source with a registry
pub fn register(registry: &SyncRegistry) {
    registry.register_source("file", Box::new(FileSourceFactory));
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn fetch_reads_target_list() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("targets.json");
        std::fs::write(
            &path,
            r#"[
                {"id": "web-1", "rule_host": "x.test", "address": "10.0.0.1", "port": 80},
                {"id": "web-2", "rule_host": "x.test", "address": "10.0.0.2", "port": 80,
                 "priority": 5, "healthy": false}
            ]"#,
        )
        .unwrap();

        let source = FileSource::new(&path, Duration::from_secs(1));
        let routes = source.fetch().await.unwrap();

        assert_eq!(routes.len(), 2);
        assert_eq!(routes.targets()[0].id, "web-1");
        assert!(routes.targets()[0].healthy);
        assert_eq!(routes.targets()[1].priority, 5);
        assert!(!routes.targets()[1].healthy);
    }

    #[tokio::test]
    async fn missing_file_is_transient() {
        let dir = tempdir().unwrap();
        let source = FileSource::new(dir.path().join("absent.json"), Duration::from_secs(1));

        let err = source.fetch().await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn malformed_file_is_permanent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("targets.json");
        std::fs::write(&path, "not json").unwrap();

        let source = FileSource::new(&path, Duration::from_secs(1));
        let err = source.fetch().await.unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn empty_list_is_a_valid_route_set() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("targets.json");
        std::fs::write(&path, "[]").unwrap();

        let source = FileSource::new(&path, Duration::from_secs(1));
        let routes = source.fetch().await.unwrap();
        assert!(routes.is_empty());
    }

    #[tokio::test]
    async fn watch_notices_a_rewrite() {
        use tokio_stream::StreamExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("targets.json");
        std::fs::write(&path, "[]").unwrap();

        let source = FileSource::new(&path, Duration::from_millis(50));
        let mut notices = source.watch();

        // First tick observes the file and records its mtime.
        let first = tokio::time::timeout(Duration::from_secs(2), notices.next())
            .await
            .expect("initial notice");
        assert!(first.is_some());

        // A rewrite with a newer mtime produces another notice.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let file = std::fs::OpenOptions::new()
            .write(true)
            .open(&path)
            .unwrap();
        file.set_modified(SystemTime::now()).unwrap();
        drop(file);

        let second = tokio::time::timeout(Duration::from_secs(2), notices.next())
            .await
            .expect("notice after rewrite");
        assert!(second.is_some());
    }

    #[tokio::test]
    async fn watcher_stops_when_stream_is_dropped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("targets.json");
        std::fs::write(&path, "[]").unwrap();

        let (tx, rx) = tokio::sync::mpsc::channel(16);
        let handle = tokio::spawn(FileSource::poll_for_changes(
            path,
            Duration::from_millis(10),
            tx,
        ));

        // Dropping the receiver must end the loop even though the file
        // never changes again.
        drop(rx);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("poll loop must stop once the stream is dropped")
            .unwrap();
    }
}
