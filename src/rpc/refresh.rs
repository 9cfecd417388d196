//! Background thread refreshing a routing table on a jittered interval.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use flume::{RecvTimeoutError, Sender};
use rand::Rng;
use tracing::{debug, info};

use crate::common::RoutingTable;

use super::{drive, Config, Transport, Updater};

#[derive(Debug)]
/// Handle to a running refresh task, stops it when dropped.
pub struct RefreshHandle {
    sender: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl RefreshHandle {
    /// Stop the task and wait for the current sweep to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(());
        }

        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Spawn a thread running a full [Updater] sweep, then waiting for a random
/// duration between half and one and a half of `config.refresh_interval`.
pub(crate) fn spawn<T>(table: Arc<RoutingTable>, transport: Arc<T>, config: Config) -> RefreshHandle
where
    T: Transport + Send + Sync + ?Sized + 'static,
{
    let (sender, receiver) = flume::bounded::<()>(1);

    let handle = thread::spawn(move || {
        info!(id = %table.id(), "Refresh task started");

        loop {
            let mut updater = Updater::new(table.clone(), &config);
            let sent = drive(&mut updater, &*transport, config.request_timeout);

            let wait = jittered(config.refresh_interval, rand::thread_rng().gen_range(0.5..1.5));

            debug!(sent, known = table.known_count(), ?wait, "Refresh sweep done");

            match receiver.recv_timeout(wait) {
                Err(RecvTimeoutError::Timeout) => continue,
                // Stopped, or the handle is gone.
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        info!(id = %table.id(), "Refresh task stopped");
    });

    RefreshHandle {
        sender: Some(sender),
        handle: Some(handle),
    }
}

fn jittered(interval: Duration, factor: f64) -> Duration {
    interval.mul_f64(factor.clamp(0.5, 1.5))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    use crate::common::{Id, SeekRequest, SeekResponse};

    use super::*;

    #[derive(Default)]
    struct Counting(AtomicUsize);

    impl Transport for Counting {
        fn send(&self, _: &Id, _: &SeekRequest, _: Duration) -> Option<SeekResponse> {
            self.0.fetch_add(1, Ordering::SeqCst);
            None
        }
    }

    #[test]
    fn jitter_bounds() {
        let interval = Duration::from_secs(60);

        assert_eq!(jittered(interval, 0.5), Duration::from_secs(30));
        assert_eq!(jittered(interval, 1.0), interval);
        assert_eq!(jittered(interval, 3.0), Duration::from_secs(90));
    }

    #[test]
    fn sweeps_until_stopped() {
        let own = Id::random(2);
        let table = Arc::new(RoutingTable::new(own.clone()));
        let transport = Arc::new(Counting::default());

        let config = Config {
            refresh_interval: Duration::from_millis(10),
            ..Default::default()
        };

        // Every sweep blacklists the only node, so re-add it.
        let handle = spawn(table.clone(), transport.clone(), config);

        let start = Instant::now();
        while transport.0.load(Ordering::SeqCst) < 3 && start.elapsed() < Duration::from_secs(5) {
            table.add(&own.flip_bit(0), true);
            thread::sleep(Duration::from_millis(1));
        }

        handle.stop();

        let sent = transport.0.load(Ordering::SeqCst);
        assert!(sent >= 3);

        table.add(&own.flip_bit(0), true);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(transport.0.load(Ordering::SeqCst), sent);
    }

    #[test]
    fn dropping_the_handle_stops_the_task() {
        let table = Arc::new(RoutingTable::new(Id::random(2)));

        let start = Instant::now();
        drop(spawn(table, Arc::new(Counting::default()), Config::default()));

        // Default interval is minutes long.
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
