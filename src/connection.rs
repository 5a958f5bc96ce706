//! Per-connection flow-control block — `spec.md` §3 (`WSCommon`) and §9's
//! design note on breaking the socket↔producer↔closure cycle.
//!
//! `FlowControl` is the piece a mesh producer task is allowed to hold: it
//! has no socket handle, only `wake_cnt`/`Notify`/`done`. The connection's
//! owning task is the only thing that ever sends bytes; producers reach it
//! through an `mpsc` channel of [`OutboundFrame`]s (the event-loop bridge,
//! `spec.md` §4.5).

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use crate::handshake::SchedulerMode;

/// A frame the owning connection task must perform on behalf of a producer.
#[derive(Debug)]
pub enum OutboundFrame {
    Text(String),
    Close(u16, String),
}

pub type WakeHook = Box<dyn Fn() + Send + Sync>;

pub struct FlowControl {
    sched: SchedulerMode,
    wake_cnt: AtomicI64,
    notify: Notify,
    done: AtomicBool,
    running: Arc<AtomicBool>,
    wake_hook: Mutex<Option<WakeHook>>,
    /// Resolves SPEC_FULL.md Open Question #1 (ON_DRAIN double-count).
    /// Set when the owning task dispatches a frame under `ON_DRAIN`;
    /// whichever of "send succeeded synchronously" or "drain event with an
    /// empty buffer" observes it first consumes it and wakes the producer
    /// — the other is a no-op. Since a connection has exactly one producer
    /// blocked on `wait()` at a time under `ON_DRAIN`, there is never more
    /// than one frame in flight, so a single flag (not a per-frame epoch)
    /// is sufficient.
    pending_credit: AtomicBool,
}

impl FlowControl {
    pub fn new(sched: SchedulerMode, running: Arc<AtomicBool>) -> Arc<Self> {
        Arc::new(Self {
            sched,
            wake_cnt: AtomicI64::new(0),
            notify: Notify::new(),
            done: AtomicBool::new(false),
            running,
            wake_hook: Mutex::new(None),
            pending_credit: AtomicBool::new(false),
        })
    }

    pub fn scheduler(&self) -> SchedulerMode {
        self.sched
    }

    pub fn set_wake_hook(&self, hook: WakeHook) {
        *self.wake_hook.lock().unwrap() = Some(hook);
    }

    /// Snapshot the wake counter before handing a frame to the event-loop
    /// bridge — must be captured before the send, per `spec.md` §5.
    pub fn pre_send_cnt(&self) -> i64 {
        self.wake_cnt.load(Ordering::SeqCst)
    }

    pub fn wake(&self) {
        self.wake_cnt.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_waiters();
        if let Some(hook) = self.wake_hook.lock().unwrap().as_ref() {
            hook();
        }
    }

    /// Marks a frame as dispatched under `ON_DRAIN`, armed to be credited
    /// by exactly one of `wake_on_send_success`/`wake_on_drain`. No-op
    /// outside `ON_DRAIN` (the other schedulers don't use this path).
    pub fn mark_send_pending(&self) {
        if self.sched == SchedulerMode::OnDrain {
            self.pending_credit.store(true, Ordering::SeqCst);
        }
    }

    /// Called by the owning task once a send has been confirmed successful
    /// (`ON_DRAIN` send-success branch).
    pub fn wake_on_send_success(&self) {
        if self.sched == SchedulerMode::OnDrain
            && self.pending_credit.swap(false, Ordering::SeqCst)
        {
            self.wake();
        }
    }

    /// Called by the owning task on a drain event with zero buffered bytes
    /// (`ON_DRAIN` drain-event branch).
    pub fn wake_on_drain(&self) {
        if self.sched == SchedulerMode::OnDrain
            && self.pending_credit.swap(false, Ordering::SeqCst)
        {
            self.wake();
        }
    }

    /// `ACK` scheduler path: a client `"ACK"` text frame wakes the producer.
    pub fn wake_on_ack(&self) {
        self.wake();
    }

    pub fn mark_done(&self) {
        self.done.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    /// Step 1 of the adapter callback body (`spec.md` §4.3): producers
    /// check this before doing any further work on each event.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Blocks (asynchronously) until the system is shutting down, the
    /// connection is closing, or `wake_cnt` has advanced past
    /// `pre_send_cnt`. Returns immediately under `IMMEDIATE` scheduling.
    pub async fn wait(&self, pre_send_cnt: i64) {
        if self.sched == SchedulerMode::Immediate {
            return;
        }
        loop {
            let notified = self.notify.notified();
            if !self.running.load(Ordering::SeqCst)
                || self.done.load(Ordering::SeqCst)
                || pre_send_cnt < self.wake_cnt.load(Ordering::SeqCst)
            {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn immediate_scheduler_never_blocks() {
        let running = Arc::new(AtomicBool::new(true));
        let fc = FlowControl::new(SchedulerMode::Immediate, running);
        let pre = fc.pre_send_cnt();
        tokio::time::timeout(Duration::from_millis(50), fc.wait(pre))
            .await
            .expect("IMMEDIATE must not block");
    }

    #[tokio::test]
    async fn on_ack_wakes_on_ack_event() {
        let running = Arc::new(AtomicBool::new(true));
        let fc = FlowControl::new(SchedulerMode::OnAck, running);
        let pre = fc.pre_send_cnt();
        let fc2 = Arc::clone(&fc);
        let waiter = tokio::spawn(async move {
            fc2.wait(pre).await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        fc.wake_on_ack();
        tokio::time::timeout(Duration::from_millis(200), waiter)
            .await
            .expect("wait should have returned after wake")
            .unwrap();
    }

    #[tokio::test]
    async fn done_unblocks_wait() {
        let running = Arc::new(AtomicBool::new(true));
        let fc = FlowControl::new(SchedulerMode::OnDrain, running);
        let pre = fc.pre_send_cnt();
        let fc2 = Arc::clone(&fc);
        let waiter = tokio::spawn(async move {
            fc2.wait(pre).await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        fc.mark_done();
        tokio::time::timeout(Duration::from_millis(200), waiter)
            .await
            .expect("wait should unblock on done")
            .unwrap();
    }

    #[tokio::test]
    async fn on_drain_send_success_then_drain_does_not_double_count() {
        let running = Arc::new(AtomicBool::new(true));
        let fc = FlowControl::new(SchedulerMode::OnDrain, running);
        let before = fc.pre_send_cnt();
        fc.mark_send_pending();
        fc.wake_on_send_success();
        let after_send = fc.pre_send_cnt();
        assert_eq!(after_send, before + 1);
        // A drain event for the same frame must not increment again.
        fc.wake_on_drain();
        assert_eq!(fc.pre_send_cnt(), after_send);
    }

    #[tokio::test]
    async fn on_drain_credits_a_drain_only_frame_exactly_once() {
        let running = Arc::new(AtomicBool::new(true));
        let fc = FlowControl::new(SchedulerMode::OnDrain, running);
        let before = fc.pre_send_cnt();
        // A frame whose send never completes synchronously — only the
        // later drain event credits it.
        fc.mark_send_pending();
        fc.wake_on_drain();
        assert_eq!(fc.pre_send_cnt(), before + 1);
        // A second, spurious drain event for the same (already-credited)
        // frame must not wake again.
        fc.wake_on_drain();
        assert_eq!(fc.pre_send_cnt(), before + 1);
    }
}
