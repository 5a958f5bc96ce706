//! Log topics — identical shape to pub/sub topics, but each packet also
//! carries a [`LogLevel`] and a listener is constructed with a level
//! floor it filters against.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};

use super::Packet;
use crate::handshake::LogLevel;

#[derive(Debug, Clone)]
pub struct LogPacket {
    pub level: LogLevel,
    pub packet: Packet,
}

struct Inner {
    tx: broadcast::Sender<LogPacket>,
    next_seq: std::sync::atomic::AtomicU64,
}

pub struct LogTopic {
    inner: Arc<Inner>,
}

impl LogTopic {
    fn new() -> Self {
        let (tx, _rx) = broadcast::channel(1024);
        Self {
            inner: Arc::new(Inner {
                tx,
                next_seq: std::sync::atomic::AtomicU64::new(1),
            }),
        }
    }

    pub fn publish(&self, level: LogLevel, headers: Vec<(String, String)>, payload: Vec<u8>) {
        let seq = self
            .inner
            .next_seq
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let packet = Packet { seq, headers, payload };
        let _ = self.inner.tx.send(LogPacket { level, packet });
    }

    pub fn listen(&self, floor: Option<LogLevel>) -> LogListener {
        LogListener { rx: self.inner.tx.subscribe(), floor }
    }
}

pub struct LogListener {
    rx: broadcast::Receiver<LogPacket>,
    floor: Option<LogLevel>,
}

impl LogListener {
    pub async fn next(&mut self) -> Option<Packet> {
        loop {
            match self.rx.recv().await {
                Ok(entry) => {
                    if let Some(floor) = self.floor {
                        if entry.level < floor {
                            continue;
                        }
                    }
                    return Some(entry.packet);
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[derive(Default)]
pub struct LogRegistry {
    topics: Mutex<HashMap<String, Arc<LogTopic>>>,
}

impl LogRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_create(&self, name: &str) -> Arc<LogTopic> {
        let mut topics = self.topics.lock().await;
        topics
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(LogTopic::new()))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn level_floor_filters_below_threshold() {
        let topic = LogTopic::new();
        let mut listener = topic.listen(Some(LogLevel::Warn));
        topic.publish(LogLevel::Dbg, vec![], b"debug".to_vec());
        topic.publish(LogLevel::Crit, vec![], b"critical".to_vec());
        let pkt = listener.next().await.unwrap();
        assert_eq!(pkt.payload, b"critical");
    }
}
