//! Watches a mesh container directory (e.g. `root/pubsub`) and reports
//! topics as they appear and disappear on disk — the async analog of
//! `WSDiscover`'s directory listing plus inotify watch in the original
//! implementation.

use std::path::PathBuf;
use std::time::Duration;

use notify::RecursiveMode;
use notify_debouncer_full::{new_debouncer, DebounceEventResult};
use tokio::sync::mpsc;

use super::MeshError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoverKind {
    Added,
    Removed,
}

#[derive(Debug, Clone)]
pub struct DiscoverEvent {
    pub kind: DiscoverKind,
    pub topic: String,
}

/// Starts watching `root/container` and returns a channel that first
/// yields one `Added` event per existing entry, then live add/remove
/// events as they happen. The container directory is created if absent.
pub async fn watch(
    root: PathBuf,
    container: &str,
) -> Result<mpsc::UnboundedReceiver<DiscoverEvent>, MeshError> {
    let container_dir = root.join(container);
    std::fs::create_dir_all(&container_dir)?;

    let (tx, rx) = mpsc::unbounded_channel();

    for entry in std::fs::read_dir(&container_dir)? {
        let entry = entry?;
        if let Some(name) = entry.file_name().to_str() {
            let _ = tx.send(DiscoverEvent { kind: DiscoverKind::Added, topic: name.to_string() });
        }
    }

    let (raw_tx, mut raw_rx) = mpsc::unbounded_channel();
    let mut debouncer = new_debouncer(Duration::from_millis(200), None, move |res: DebounceEventResult| {
        let _ = raw_tx.send(res);
    })
    .map_err(|e| MeshError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;
    debouncer
        .watcher()
        .watch(&container_dir, RecursiveMode::NonRecursive)
        .map_err(|e| MeshError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;
    // The debouncer owns the OS watch handle and has no other owner once
    // this function returns; it must outlive the caller's await point.
    std::mem::forget(debouncer);

    tokio::spawn(async move {
        while let Some(res) = raw_rx.recv().await {
            let Ok(events) = res else { continue };
            for event in events {
                for path in &event.event.paths {
                    let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
                    let kind = match event.event.kind {
                        notify::EventKind::Create(_) => DiscoverKind::Added,
                        notify::EventKind::Remove(_) => DiscoverKind::Removed,
                        _ => continue,
                    };
                    if tx.send(DiscoverEvent { kind, topic: name.to_string() }).is_err() {
                        return;
                    }
                }
            }
        }
    });

    Ok(rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    #[tokio::test]
    async fn lists_existing_entries_on_start() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("pubsub")).unwrap();
        std::fs::write(tmp.path().join("pubsub").join("existing"), b"").unwrap();

        let mut rx = watch(tmp.path().to_path_buf(), "pubsub").await.unwrap();
        let event = tokio::time::timeout(StdDuration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for initial listing")
            .unwrap();
        assert_eq!(event.kind, DiscoverKind::Added);
        assert_eq!(event.topic, "existing");
    }

    #[tokio::test]
    async fn reports_a_newly_created_topic_file() {
        let tmp = tempfile::tempdir().unwrap();
        let mut rx = watch(tmp.path().to_path_buf(), "pubsub").await.unwrap();

        tokio::time::sleep(StdDuration::from_millis(100)).await;
        std::fs::write(tmp.path().join("pubsub").join("fresh"), b"").unwrap();

        let event = tokio::time::timeout(StdDuration::from_secs(3), async {
            loop {
                let event = rx.recv().await.unwrap();
                if event.topic == "fresh" {
                    return event;
                }
            }
        })
        .await
        .expect("timed out waiting for create event");
        assert_eq!(event.kind, DiscoverKind::Added);
    }
}
