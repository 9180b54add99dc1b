//! Repeating background timers
//!
//! Used by the purge janitor and the catch-up scheduler. Stopping a timer
//! prevents future ticks; a tick already running completes.

use std::future::Future;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Handle to a repeating timer task
#[derive(Debug)]
pub struct Timer {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl Timer {
    /// Run `tick` every `every`, first after one full period
    pub fn spawn<F, Fut>(every: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (stop, mut stopped) = oneshot::channel::<()>();
        let every = every.max(Duration::from_millis(1));

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = &mut stopped => break,
                    _ = ticker.tick() => {}
                }
                tick().await;
            }
        });

        Self {
            stop: Some(stop),
            task,
        }
    }

    /// Stop future ticks
    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }

    /// Stop and wait for an in-flight tick to finish
    pub async fn shutdown(mut self) {
        self.stop();
        let _ = (&mut self.task).await;
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.stop();
    }
}
