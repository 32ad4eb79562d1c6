//! State shared between the relay tasks of one session.
//!
//! Only two things are shared and mutable: the active flag and the last-audio
//! timestamp. Everything else is owned by a single task or travels through
//! the queue.

use crate::{config::SessionConfig, queue::QueueProducer};
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Whether the session is still running.
///
/// Starts out active and can be cleared exactly once; it never becomes active
/// again. Clearing also wakes every task waiting in [`ActiveFlag::cleared`],
/// so each suspension point can race its work against shutdown.
#[derive(Clone, Debug)]
pub struct ActiveFlag {
    active: Arc<AtomicBool>,
    token: CancellationToken,
}

impl Default for ActiveFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl ActiveFlag {
    pub fn new() -> Self {
        Self {
            active: Arc::new(AtomicBool::new(true)),
            token: CancellationToken::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Clears the flag. Returns `true` only for the call that actually
    /// performed the transition.
    pub fn deactivate(&self) -> bool {
        let was_active = self.active.swap(false, Ordering::AcqRel);
        self.token.cancel();
        was_active
    }

    /// Resolves once the flag has been cleared.
    pub async fn cleared(&self) {
        self.token.cancelled().await
    }
}

/// When audio last arrived from the client, and whether that audio has been
/// followed by an end-of-stream signal yet.
///
/// Stored as milliseconds since the session epoch so it can be read and
/// written without a lock.
#[derive(Debug)]
pub struct AudioClock {
    epoch: Instant,
    last_audio_ms: AtomicU64,
    unended: AtomicBool,
}

impl Default for AudioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioClock {
    /// A clock whose last audio is "now".
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            last_audio_ms: AtomicU64::new(0),
            unended: AtomicBool::new(false),
        }
    }

    pub fn mark(&self) {
        self.mark_at(Instant::now());
    }

    pub fn mark_at(&self, at: Instant) {
        let offset = at.saturating_duration_since(self.epoch).as_millis() as u64;
        self.last_audio_ms.store(offset, Ordering::Release);
        self.unended.store(true, Ordering::Release);
    }

    /// Claims the audio marked since the last claim. `false` if there is none.
    pub fn take_unended(&self) -> bool {
        self.unended.swap(false, Ordering::AcqRel)
    }

    pub fn last_audio(&self) -> Instant {
        self.epoch + Duration::from_millis(self.last_audio_ms.load(Ordering::Acquire))
    }

    pub fn since_last_audio(&self) -> Duration {
        Instant::now().saturating_duration_since(self.last_audio())
    }
}

/// What every relay task of one session gets a copy of.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    pub active: ActiveFlag,
    pub clock: Arc<AudioClock>,
    pub queue: QueueProducer,
    pub config: Arc<SessionConfig>,
}

impl SessionHandle {
    pub fn new(active: ActiveFlag, queue: QueueProducer, config: Arc<SessionConfig>) -> Self {
        Self {
            active,
            clock: Arc::new(AudioClock::new()),
            queue,
            config,
        }
    }
}

/// The concurrent tasks of an active session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    InboundRelay,
    UpstreamSender,
    ClientForwarder,
    SilenceMonitor,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::InboundRelay => write!(f, "inbound_relay"),
            TaskKind::UpstreamSender => write!(f, "upstream_sender"),
            TaskKind::ClientForwarder => write!(f, "client_forwarder"),
            TaskKind::SilenceMonitor => write!(f, "silence_monitor"),
        }
    }
}

/// How a relay task finished when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskExit {
    /// The active flag was cleared by someone else.
    Cancelled,
    /// The client sent the termination keyword.
    ClientEnded,
    /// The client connection closed.
    ClientDisconnected,
    /// The outbound queue closed underneath the task.
    QueueClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_active_flag_clears_exactly_once() {
        let flag = ActiveFlag::new();
        let other = flag.clone();
        assert!(flag.is_active());

        assert!(other.deactivate());
        assert!(!flag.deactivate());
        assert!(!flag.is_active());
        assert!(!other.is_active());

        // Already cleared, so this resolves immediately.
        flag.cleared().await;
    }

    #[tokio::test]
    async fn test_cleared_wakes_waiters() {
        let flag = ActiveFlag::new();
        let waiter = tokio::spawn({
            let flag = flag.clone();
            async move { flag.cleared().await }
        });
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());
        flag.deactivate();
        waiter.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_audio_clock_tracks_elapsed_time() {
        let clock = AudioClock::new();
        tokio::time::advance(Duration::from_millis(1500)).await;
        assert_eq!(clock.since_last_audio(), Duration::from_millis(1500));

        clock.mark();
        assert_eq!(clock.since_last_audio(), Duration::ZERO);

        tokio::time::advance(Duration::from_millis(700)).await;
        assert_eq!(clock.since_last_audio(), Duration::from_millis(700));
    }

    #[test]
    fn test_audio_clock_unended_audio_is_claimed_once() {
        let clock = AudioClock::new();
        assert!(!clock.take_unended());

        clock.mark();
        clock.mark();
        assert!(clock.take_unended());
        assert!(!clock.take_unended());
    }

    #[test]
    fn test_task_kind_display() {
        assert_eq!(TaskKind::InboundRelay.to_string(), "inbound_relay");
        assert_eq!(TaskKind::ClientForwarder.to_string(), "client_forwarder");
    }
}
