//! At-least-once delivery of location events to the collector
//!
//! ## How it works:
//! 1. Each event is encoded once into a `WireRecord`
//! 2. Online: POST it; 2xx drops it and drains the backlog
//! 3. Offline or failed: append it to the durable queue
//! 4. The queue is drained on start and after every successful send
//!
//! All sends and queue mutations run on one worker task, so the queue
//! file never sees two writers.

pub mod client;
pub mod connectivity;
pub mod wire;
pub mod worker;

pub use client::CollectorClient;
pub use connectivity::{ConnectivityGate, ManualGate, SysfsGate};
pub use worker::{DeliveryStats, DeliveryWorker, WorkerHandle};
