//! Latest-value cache cell (component B, §4.B).
//!
//! A single-writer/many-reader rendezvous holding the most recently written
//! `HealthResult` for one service. Modelled as an actor task that owns the
//! value and alternates between accepting a write and answering a read,
//! exactly as the design notes (§9) prescribe and as
//! `original_source/cache.go`'s `maintainCache` does. Tokio's `mpsc` has no
//! capacity-0 channel (it asserts `buffer > 0`), so the write side uses a
//! capacity-1 channel paired with an explicit `oneshot` ack: the writer's
//! `write()` doesn't resolve until the actor has dequeued the value and
//! sent the ack back, which reproduces the same "write blocks until
//! accepted" rendezvous the design note wants without relying on an
//! unsupported 0-capacity channel. Reads go through a request/reply
//! protocol so any number of readers can ask for the current value without
//! contending with the writer.

use tokio::sync::{mpsc, oneshot};

use crate::domain::HealthResult;

struct Write {
    value: HealthResult,
    ack: oneshot::Sender<()>,
}

/// Handle held by the writer (exactly one: the service's scheduler).
#[derive(Clone)]
pub struct CacheWriter {
    write_tx: mpsc::Sender<Write>,
}

impl CacheWriter {
    /// Rendezvous write: resolves once the actor has accepted the value.
    /// Returns `Err` only if the cell has been terminated and its actor
    /// task has exited — callers must stop publishing at that point (§5).
    pub async fn write(&self, value: HealthResult) -> Result<(), HealthResult> {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.write_tx.send(Write { value: value.clone(), ack: ack_tx }).await.is_err() {
            return Err(value);
        }
        ack_rx.await.map_err(|_| value)
    }
}

/// Handle held by readers (any number: the aggregator, request handlers).
#[derive(Clone)]
pub struct CacheReader {
    read_tx: mpsc::UnboundedSender<oneshot::Sender<HealthResult>>,
}

impl CacheReader {
    /// Returns the most recently completed write, or the zero value if no
    /// write has happened yet (§4.B).
    pub async fn read(&self) -> HealthResult {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.read_tx.send(reply_tx).is_err() {
            return HealthResult::default();
        }
        reply_rx.await.unwrap_or_default()
    }
}

/// Owns the actor task and lets the registry terminate a generation's cell.
pub struct CacheCell {
    terminate_tx: Option<oneshot::Sender<()>>,
}

impl CacheCell {
    /// Spawn the actor task and return `(cell, writer, reader)`.
    pub fn spawn() -> (Self, CacheWriter, CacheReader) {
        let (write_tx, mut write_rx) = mpsc::channel::<Write>(1);
        let (read_tx, mut read_rx) = mpsc::unbounded_channel::<oneshot::Sender<HealthResult>>();
        let (terminate_tx, mut terminate_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let mut current = HealthResult::default();
            loop {
                tokio::select! {
                    biased;
                    _ = &mut terminate_rx => break,
                    maybe_write = write_rx.recv() => {
                        match maybe_write {
                            Some(Write { value, ack }) => {
                                current = value;
                                let _ = ack.send(());
                            }
                            None => break,
                        }
                    }
                    maybe_reply = read_rx.recv() => {
                        match maybe_reply {
                            Some(reply) => { let _ = reply.send(current.clone()); }
                            None => break,
                        }
                    }
                }
            }
        });

        (
            Self {
                terminate_tx: Some(terminate_tx),
            },
            CacheWriter { write_tx },
            CacheReader { read_tx },
        )
    }

    /// Signal the actor to stop. Idempotent; a cell may be terminated
    /// without ever having had a write.
    pub fn terminate(&mut self) {
        if let Some(tx) = self.terminate_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for CacheCell {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CheckResult;

    #[tokio::test]
    async fn reader_sees_zero_value_before_any_write() {
        let (_cell, _writer, reader) = CacheCell::spawn();
        let got = reader.read().await;
        assert_eq!(got, HealthResult::default());
    }

    #[tokio::test]
    async fn reader_observes_latest_completed_write() {
        let (_cell, writer, reader) = CacheCell::spawn();
        let hr = HealthResult::single(CheckResult::new("foo", 2, true, ""));
        writer.write(hr.clone()).await.unwrap();
        assert_eq!(reader.read().await, hr);

        let hr2 = HealthResult::single(CheckResult::new("foo", 1, false, "boom"));
        writer.write(hr2.clone()).await.unwrap();
        assert_eq!(reader.read().await, hr2);
    }

    #[tokio::test]
    async fn many_readers_observe_same_value_without_blocking_each_other() {
        let (_cell, writer, reader) = CacheCell::spawn();
        let hr = HealthResult::single(CheckResult::new("foo", 2, true, ""));
        writer.write(hr.clone()).await.unwrap();

        let r1 = reader.clone();
        let r2 = reader.clone();
        let (a, b) = tokio::join!(r1.read(), r2.read());
        assert_eq!(a, hr);
        assert_eq!(b, hr);
    }

    #[tokio::test]
    async fn terminated_cell_rejects_further_writes() {
        let (mut cell, writer, _reader) = CacheCell::spawn();
        cell.terminate();
        // give the actor a chance to observe termination
        tokio::task::yield_now().await;
        let hr = HealthResult::single(CheckResult::new("foo", 2, true, ""));
        let result = writer.write(hr).await;
        assert!(result.is_err(), "write after terminate must fail");
    }
}
