//! A named, ordered stream of [`Packet`]s with bounded replay history —
//! backs both `/wsapi/sub` (pub/sub topics) and `/wsapi/read` (file-backed
//! streams); the two routes simply use separate [`TopicRegistry`]
//! instances.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};

use super::Packet;
use crate::handshake::ReaderInit;

/// How many packets a topic keeps around for `OLDEST` replay. The real
/// messaging library backs this with a memory-mapped ring file; an
/// in-memory bound is the direct analog for this stand-in.
const HISTORY_CAP: usize = 256;

struct Inner {
    tx: broadcast::Sender<Packet>,
    next_seq: AtomicU64,
    history: Mutex<VecDeque<Packet>>,
}

pub struct Topic {
    inner: Arc<Inner>,
}

impl Topic {
    fn new() -> Self {
        let (tx, _rx) = broadcast::channel(1024);
        Self {
            inner: Arc::new(Inner {
                tx,
                next_seq: AtomicU64::new(1),
                history: Mutex::new(VecDeque::with_capacity(HISTORY_CAP)),
            }),
        }
    }

    pub async fn publish(&self, headers: Vec<(String, String)>, payload: Vec<u8>) -> Packet {
        let seq = self.inner.next_seq.fetch_add(1, Ordering::SeqCst);
        let pkt = Packet { seq, headers, payload };
        {
            let mut history = self.inner.history.lock().await;
            if history.len() == HISTORY_CAP {
                history.pop_front();
            }
            history.push_back(pkt.clone());
        }
        // No receivers is fine — mirrors the teacher's EventBroadcaster.
        let _ = self.inner.tx.send(pkt.clone());
        pkt
    }

    /// Subscribes and returns a [`Subscription`] that replays backlog
    /// (per `init`/`seq_min`) before switching to live delivery.
    pub async fn subscribe(&self, init: ReaderInit, seq_min: u64) -> Subscription {
        // Subscribe to the broadcast channel *before* reading history to
        // avoid a race where a publish lands in the gap between snapshot
        // and subscribe.
        let rx = self.inner.tx.subscribe();
        let history = self.inner.history.lock().await;
        let (backlog, last_seq) = match init {
            ReaderInit::Oldest => {
                let backlog: VecDeque<Packet> = history
                    .iter()
                    .filter(|p| p.seq > seq_min)
                    .cloned()
                    .collect();
                let last = backlog.back().map(|p| p.seq).unwrap_or(0);
                (backlog, last)
            }
            ReaderInit::MostRecent => {
                let backlog: VecDeque<Packet> = history.back().cloned().into_iter().collect();
                let last = backlog.back().map(|p| p.seq).unwrap_or(0);
                (backlog, last)
            }
            ReaderInit::AwaitNew => (VecDeque::new(), u64::MAX),
        };
        Subscription { rx, backlog, last_seq, seq_min }
    }
}

/// A live hand-off out of a [`Topic`]: backlog packets first, then live
/// broadcast events, de-duplicated against whatever backlog already
/// delivered and filtered against `seq_min` for the lifetime of the
/// subscription — not just the initial backlog — per `spec.md` §8
/// testable property 3.
pub struct Subscription {
    rx: broadcast::Receiver<Packet>,
    backlog: VecDeque<Packet>,
    last_seq: u64,
    seq_min: u64,
}

impl Subscription {
    /// Returns the next packet, or `None` if the topic has no more
    /// senders (it will never happen in practice — the registry keeps the
    /// sender alive — but keeps the producer loop well-formed).
    pub async fn next(&mut self) -> Option<Packet> {
        if let Some(pkt) = self.backlog.pop_front() {
            self.last_seq = pkt.seq;
            return Some(pkt);
        }
        loop {
            match self.rx.recv().await {
                Ok(pkt) => {
                    if pkt.seq <= self.seq_min {
                        // Below the client's requested floor, regardless of
                        // how far backlog replay already got.
                        continue;
                    }
                    if self.last_seq != u64::MAX && pkt.seq <= self.last_seq {
                        // Already delivered via backlog replay.
                        continue;
                    }
                    self.last_seq = pkt.seq;
                    return Some(pkt);
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[derive(Default)]
pub struct TopicRegistry {
    topics: Mutex<HashMap<String, Arc<Topic>>>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_create(&self, name: &str) -> Arc<Topic> {
        let mut topics = self.topics.lock().await;
        topics
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Topic::new()))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn await_new_skips_prior_history() {
        let topic = Topic::new();
        topic.publish(vec![], b"a".to_vec()).await;
        let mut sub = topic.subscribe(ReaderInit::AwaitNew, 0).await;
        topic.publish(vec![], b"b".to_vec()).await;
        let pkt = sub.next().await.unwrap();
        assert_eq!(pkt.payload, b"b");
    }

    #[tokio::test]
    async fn oldest_replays_full_history_then_live() {
        let topic = Topic::new();
        topic.publish(vec![], b"a".to_vec()).await;
        topic.publish(vec![], b"b".to_vec()).await;
        let mut sub = topic.subscribe(ReaderInit::Oldest, 0).await;
        assert_eq!(sub.next().await.unwrap().payload, b"a");
        assert_eq!(sub.next().await.unwrap().payload, b"b");
        topic.publish(vec![], b"c".to_vec()).await;
        assert_eq!(sub.next().await.unwrap().payload, b"c");
    }

    #[tokio::test]
    async fn numeric_seq_min_filters_history() {
        let topic = Topic::new();
        for p in ["a", "b", "c"] {
            topic.publish(vec![], p.as_bytes().to_vec()).await;
        }
        // seqs are 1,2,3 — seq_min=1 should drop seq 1 ("a").
        let mut sub = topic.subscribe(ReaderInit::Oldest, 1).await;
        assert_eq!(sub.next().await.unwrap().payload, b"b");
        assert_eq!(sub.next().await.unwrap().payload, b"c");
    }

    #[tokio::test]
    async fn most_recent_replays_only_latest() {
        let topic = Topic::new();
        topic.publish(vec![], b"a".to_vec()).await;
        topic.publish(vec![], b"b".to_vec()).await;
        let mut sub = topic.subscribe(ReaderInit::MostRecent, 0).await;
        assert_eq!(sub.next().await.unwrap().payload, b"b");
        topic.publish(vec![], b"c".to_vec()).await;
        assert_eq!(sub.next().await.unwrap().payload, b"c");
    }

    #[tokio::test]
    async fn seq_min_beyond_history_still_filters_live_events() {
        let topic = Topic::new();
        for p in ["a", "b", "c"] {
            topic.publish(vec![], p.as_bytes().to_vec()).await;
        }
        // seqs published so far are 1,2,3; seq_min=5 is past all of them,
        // so the empty backlog must not reset the floor to 0 — live
        // packets at seq 4 and 5 are still <= seq_min and must be dropped,
        // only seq 6 onward may be delivered.
        let mut sub = topic.subscribe(ReaderInit::Oldest, 5).await;
        for p in ["d", "e"] {
            topic.publish(vec![], p.as_bytes().to_vec()).await;
        }
        topic.publish(vec![], b"f".to_vec()).await; // seq 6, first allowed
        assert_eq!(sub.next().await.unwrap().payload, b"f");
    }
}
