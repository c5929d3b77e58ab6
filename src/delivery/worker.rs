//! Serialized delivery worker
//!
//! Commands arrive over an unbounded channel and run one at a time, in
//! arrival order. The worker is the only writer of the queue file.
//!
//! Drain policy: a record that fails resend is pushed to the end of the
//! pass's `remaining` list. With one writer this keeps failed records in
//! their relative order; repeated failures never block later records from
//! being attempted. Queue growth is unbounded.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::client::CollectorClient;
use super::connectivity::ConnectivityGate;
use super::wire::{self, WireRecord};
use crate::lifecycle::WakeLease;
use crate::location::LocationEvent;
use crate::store::DurableQueue;

enum Command {
    Submit(LocationEvent),
    Drain,
}

/// Cloneable sender side of the worker. Never blocks.
#[derive(Clone)]
pub struct WorkerHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl WorkerHandle {
    /// Returns false if the worker has shut down.
    pub fn submit(&self, event: LocationEvent) -> bool {
        self.tx.send(Command::Submit(event)).is_ok()
    }

    pub fn drain(&self) -> bool {
        self.tx.send(Command::Drain).is_ok()
    }
}

/// Counters reported when the worker exits
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeliveryStats {
    /// Fresh events delivered on first attempt
    pub delivered: usize,
    /// Fresh events written to the queue
    pub queued: usize,
    /// Queued records delivered by a drain
    pub resent: usize,
    /// Events dropped because the queue could not be written
    pub lost: usize,
}

pub struct DeliveryWorker {
    queue: DurableQueue,
    client: CollectorClient,
    gate: Arc<dyn ConnectivityGate>,
    lease: Arc<WakeLease>,
    stats: DeliveryStats,
}

impl DeliveryWorker {
    pub fn new(
        queue: DurableQueue,
        client: CollectorClient,
        gate: Arc<dyn ConnectivityGate>,
        lease: Arc<WakeLease>,
    ) -> Self {
        Self {
            queue,
            client,
            gate,
            lease,
            stats: DeliveryStats::default(),
        }
    }

    pub fn lease(&self) -> Arc<WakeLease> {
        Arc::clone(&self.lease)
    }

    #[cfg(test)]
    pub fn queue(&self) -> &DurableQueue {
        &self.queue
    }

    #[cfg(test)]
    pub fn stats(&self) -> &DeliveryStats {
        &self.stats
    }

    /// Move the worker onto its own task.
    ///
    /// The task ends once every handle is dropped and all commands
    /// already sent have been processed.
    pub fn spawn(self) -> (WorkerHandle, JoinHandle<DeliveryStats>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.run(rx));
        (WorkerHandle { tx }, task)
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) -> DeliveryStats {
        info!("Delivery worker started (collector: {})", self.client.url());
        while let Some(cmd) = rx.recv().await {
            self.lease.touch();
            match cmd {
                Command::Submit(event) => self.submit(event).await,
                Command::Drain => self.drain().await,
            }
        }
        info!(
            delivered = self.stats.delivered,
            queued = self.stats.queued,
            resent = self.stats.resent,
            lost = self.stats.lost,
            "Delivery worker stopped"
        );
        self.stats
    }

    /// Send one event now, or queue it. Never fails.
    pub async fn submit(&mut self, event: LocationEvent) {
        let record = wire::encode(&event);
        info!("Sending: lat={} lon={}", event.latitude, event.longitude);

        if !self.gate.is_available() {
            info!("Network unavailable - queuing");
            self.enqueue(&record);
            return;
        }

        match self.client.post(&record).await {
            Ok(()) => {
                self.stats.delivered += 1;
                debug!("Delivered: {}", record);
                self.drain().await;
            }
            Err(e) => {
                warn!("Delivery failed, queuing: {}", e);
                self.enqueue(&record);
            }
        }
    }

    /// Resend everything in the queue. Safe to call at any time.
    pub async fn drain(&mut self) {
        let records = match self.queue.snapshot() {
            Ok(records) => records,
            Err(e) => {
                error!("Drain error: {:#}", e);
                return;
            }
        };

        if records.is_empty() {
            if let Err(e) = self.queue.clear() {
                error!("Failed to remove empty queue file: {:#}", e);
            }
            return;
        }

        info!("Draining {} pending record(s)", records.len());
        let mut remaining: Vec<WireRecord> = Vec::new();
        let mut pending = records.into_iter();

        while let Some(record) = pending.next() {
            if !self.gate.is_available() {
                info!(
                    "Network lost during drain, keeping {} unattempted record(s)",
                    pending.len() + 1
                );
                remaining.push(record);
                remaining.extend(pending.by_ref());
                break;
            }

            match self.client.post(&record).await {
                Ok(()) => self.stats.resent += 1,
                Err(e) => {
                    debug!("Resend failed: {}", e);
                    remaining.push(record);
                }
            }
        }

        match self.queue.replace(&remaining) {
            Ok(()) if remaining.is_empty() => info!("All pending records sent"),
            Ok(()) => info!("Pending: {} remaining", remaining.len()),
            Err(e) => error!("Failed to rewrite queue after drain: {:#}", e),
        }
    }

    fn enqueue(&mut self, record: &WireRecord) {
        match self.queue.append(record) {
            Ok(()) => self.stats.queued += 1,
            Err(e) => {
                self.stats.lost += 1;
                error!("Failed to append pending record, event lost: {:#}", e);
            }
        }
    }
}
