//! End-of-speech detection by silence timing.
//!
//! The monitor never touches the upstream session directly. When the candidate
//! has been quiet for longer than the threshold it queues a
//! [`QueueEntry::StreamEnd`] behind whatever audio is still waiting, so the
//! upstream sender always sees the audio before the end-of-stream signal.

use crate::{
    error::SessionError,
    queue::QueueEntry,
    session::{SessionHandle, TaskExit},
};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info};

pub struct SilenceMonitor {
    handle: SessionHandle,
    threshold: Duration,
    poll_interval: Duration,
}

impl SilenceMonitor {
    pub fn new(handle: SessionHandle) -> Self {
        let threshold = handle.config.silence_threshold;
        let poll_interval = handle.config.silence_poll_interval;
        Self {
            handle,
            threshold,
            poll_interval,
        }
    }

    /// Polls the audio clock until the session is shut down.
    ///
    /// Fires at most once per stretch of client audio: after a firing, further
    /// silence is ignored until new audio arrives. No audio at all never fires.
    pub async fn run(self) -> Result<TaskExit, SessionError> {
        let active = &self.handle.active;
        let mut ticker = interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while active.is_active() {
            tokio::select! {
                biased;
                _ = active.cleared() => break,
                _ = ticker.tick() => {}
            }

            let clock = &self.handle.clock;
            let silent_for = clock.since_last_audio();
            if silent_for <= self.threshold || !clock.take_unended() {
                continue;
            }

            info!(
                silent_ms = silent_for.as_millis() as u64,
                "Silence detected, ending the audio stream."
            );
            let pushed = tokio::select! {
                biased;
                _ = active.cleared() => break,
                pushed = self.handle.queue.push(QueueEntry::StreamEnd) => pushed,
            };
            if pushed.is_err() {
                debug!("Audio queue closed, silence monitor stopping.");
                return Ok(TaskExit::QueueClosed);
            }
        }
        Ok(TaskExit::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::SessionConfig,
        queue::{QueueConsumer, backpressure_queue},
        session::ActiveFlag,
    };
    use std::sync::Arc;
    use tokio::time::sleep;

    fn monitor() -> (SilenceMonitor, SessionHandle, QueueConsumer) {
        let (producer, consumer) = backpressure_queue(16);
        let handle = SessionHandle::new(
            ActiveFlag::new(),
            producer,
            Arc::new(SessionConfig::default()),
        );
        (SilenceMonitor::new(handle.clone()), handle, consumer)
    }

    fn drain(queue: &mut QueueConsumer) -> usize {
        let mut count = 0;
        while let Some(entry) = queue.try_pop() {
            assert_eq!(entry, QueueEntry::StreamEnd);
            count += 1;
        }
        count
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_after_threshold() {
        let (monitor, handle, mut queue) = monitor();
        let task = tokio::spawn(monitor.run());
        handle.clock.mark();

        sleep(Duration::from_millis(2000)).await;
        assert_eq!(drain(&mut queue), 0);

        sleep(Duration::from_millis(600)).await;
        assert_eq!(drain(&mut queue), 1);

        handle.active.deactivate();
        assert_eq!(task.await.unwrap().unwrap(), TaskExit::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recent_audio_suppresses_firing() {
        let (monitor, handle, mut queue) = monitor();
        let task = tokio::spawn(monitor.run());

        for _ in 0..8 {
            sleep(Duration::from_millis(1000)).await;
            handle.clock.mark();
        }
        assert_eq!(drain(&mut queue), 0);

        handle.active.deactivate();
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_silence_fires_only_once() {
        let (monitor, handle, mut queue) = monitor();
        let task = tokio::spawn(monitor.run());
        handle.clock.mark();

        sleep(Duration::from_millis(10_000)).await;
        assert_eq!(drain(&mut queue), 1);

        handle.active.deactivate();
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_audio_rearms_after_firing() {
        let (monitor, handle, mut queue) = monitor();
        let task = tokio::spawn(monitor.run());
        handle.clock.mark();

        sleep(Duration::from_millis(3000)).await;
        assert_eq!(drain(&mut queue), 1);

        handle.clock.mark();
        sleep(Duration::from_millis(3000)).await;
        assert_eq!(drain(&mut queue), 1);

        handle.active.deactivate();
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_fires_without_audio() {
        let (monitor, handle, mut queue) = monitor();
        let task = tokio::spawn(monitor.run());

        sleep(Duration::from_millis(7600)).await;
        assert_eq!(drain(&mut queue), 0);

        handle.active.deactivate();
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_exits_when_queue_closes() {
        let (monitor, handle, queue) = monitor();
        handle.clock.mark();
        drop(queue);
        let exit = monitor.run().await.unwrap();
        assert_eq!(exit, TaskExit::QueueClosed);
    }
}
