//! Scheduled capture ticks with an explicit disarm guard.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

/// Drives periodic capture callbacks while a session is recording.
///
/// The armed flag is checked at fire time, not at schedule time, so a
/// `stop()` issued between scheduling and firing suppresses the next
/// tick even before the task abort lands. Both the abort and the flag
/// are needed to close that race.
pub struct CaptureClock {
    armed: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl CaptureClock {
    pub fn new() -> Self {
        Self {
            armed: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }

    /// Fire `on_capture` once immediately, then every `interval` until
    /// disarmed. No-op when already running.
    pub fn start<F>(&mut self, interval: Duration, mut on_capture: F)
    where
        F: FnMut() + Send + 'static,
    {
        if self.task.is_some() {
            debug!("capture clock already armed; ignoring start");
            return;
        }
        self.armed.store(true, Ordering::SeqCst);
        on_capture();

        let armed = Arc::clone(&self.armed);
        self.task = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if !armed.load(Ordering::SeqCst) {
                    break;
                }
                on_capture();
            }
        }));
    }

    /// Disarm and cancel the pending tick. Idempotent.
    pub fn stop(&mut self) {
        self.armed.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }
}

impl Default for CaptureClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CaptureClock {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_callback() -> (Arc<AtomicUsize>, impl FnMut() + Send + 'static) {
        let fired = Arc::new(AtomicUsize::new(0));
        let handle = Arc::clone(&fired);
        (fired, move || {
            handle.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn fires_immediately_then_every_interval() {
        let (fired, cb) = counting_callback();
        let mut clock = CaptureClock::new();

        clock.start(Duration::from_secs(1), cb);
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // T = 3s at interval 1s: floor(T / interval) + 1 captures
        tokio::time::sleep(Duration::from_millis(3_100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 4);

        clock.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_is_ignored() {
        let (first, cb_first) = counting_callback();
        let (second, cb_second) = counting_callback();
        let mut clock = CaptureClock::new();

        clock.start(Duration::from_secs(1), cb_first);
        clock.start(Duration::from_secs(10), cb_second);
        assert_eq!(second.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2_100)).await;
        assert_eq!(first.load(Ordering::SeqCst), 3);
        assert_eq!(second.load(Ordering::SeqCst), 0);

        clock.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_pending_tick_and_is_idempotent() {
        let (fired, cb) = counting_callback();
        let mut clock = CaptureClock::new();

        clock.start(Duration::from_secs(1), cb);
        clock.stop();
        clock.stop();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!clock.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn disarm_flag_is_checked_at_fire_time() {
        let (fired, cb) = counting_callback();
        let mut clock = CaptureClock::new();

        clock.start(Duration::from_secs(1), cb);
        // Simulate a stop landing after the tick was scheduled but
        // before it fires: only the flag is cleared, the task lives on.
        clock.armed.store(false, Ordering::SeqCst);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        clock.stop();
    }
}
