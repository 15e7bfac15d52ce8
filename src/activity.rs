use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::info;

const LOG_CAPACITY: usize = 15;

/// Shared activity log. Every task pushes lines into one channel; a single
/// consumer prints them while holding the terminal lock so they never land
/// in the middle of an open picker. Lines arriving while the picker is open
/// are buffered, so senders never wait on the operator.
#[derive(Clone)]
pub struct ActivityLog {
    tx: mpsc::Sender<String>,
}

impl ActivityLog {
    /// The consumer ends once every clone of the log is dropped and returns
    /// how many lines it printed.
    pub fn channel(terminal: Arc<Mutex<()>>) -> (Self, JoinHandle<usize>) {
        let (tx, mut rx) = mpsc::channel::<String>(LOG_CAPACITY);
        let consumer = tokio::spawn(async move {
            let mut printed = 0;
            let mut pending = VecDeque::new();
            while let Some(line) = rx.recv().await {
                pending.push_back(line);
                // Keep the channel drained while a picker owns the terminal.
                let lock = terminal.lock();
                tokio::pin!(lock);
                let _guard = loop {
                    tokio::select! {
                        guard = &mut lock => break guard,
                        Some(line) = rx.recv() => pending.push_back(line),
                    }
                };
                while let Ok(line) = rx.try_recv() {
                    pending.push_back(line);
                }
                for line in pending.drain(..) {
                    info!("{line}");
                    printed += 1;
                }
            }
            printed
        });
        (Self { tx }, consumer)
    }

    pub async fn push_log(&self, line: impl Into<String>) {
        let _ = self.tx.send(line.into()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn consumer_drains_everything_before_exiting() {
        let terminal = Arc::new(Mutex::new(()));
        let (log, consumer) = ActivityLog::channel(terminal);
        let mut writers = Vec::new();
        for i in 0..8 {
            let log = log.clone();
            writers.push(tokio::spawn(async move {
                for j in 0..10 {
                    log.push_log(format!("writer {i} line {j}")).await;
                }
            }));
        }
        for w in writers {
            w.await.unwrap();
        }
        drop(log);
        assert_eq!(consumer.await.unwrap(), 80);
    }

    #[tokio::test]
    async fn held_terminal_delays_output_but_not_senders() {
        let terminal = Arc::new(Mutex::new(()));
        let (log, consumer) = ActivityLog::channel(Arc::clone(&terminal));
        let guard = terminal.lock().await;
        let lines = LOG_CAPACITY * 3;
        for i in 0..lines {
            tokio::time::timeout(Duration::from_secs(1), log.push_log(format!("queued {i}")))
                .await
                .unwrap_or_else(|_| panic!("sender stalled at line {i}"));
        }
        drop(guard);
        drop(log);
        assert_eq!(consumer.await.unwrap(), lines);
    }
}
