//! Running-state machine for the tracking task
//!
//! `Stopped -> Starting -> Active -> Stopped`. The controller owns the
//! location subscription and the wake lease; the delivery worker runs on
//! its own task for the controller's whole life.

pub mod wake;

use std::fmt;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::delivery::{DeliveryStats, DeliveryWorker, WorkerHandle};
use crate::error::SourceError;
use crate::location::{FixSink, LocationRequest, LocationSource, Subscription};

pub use wake::WakeLease;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunningState {
    Stopped,
    Starting,
    Active,
}

impl fmt::Display for RunningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunningState::Stopped => write!(f, "Stopped"),
            RunningState::Starting => write!(f, "Starting"),
            RunningState::Active => write!(f, "Active"),
        }
    }
}

/// What every event from this installation is stamped with
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub request: LocationRequest,
    pub device_id: String,
    pub app_tag: String,
}

pub struct LifecycleController {
    state: RunningState,
    settings: SessionSettings,
    source: Box<dyn LocationSource>,
    subscription: Option<Subscription>,
    lease: Arc<WakeLease>,
    worker: WorkerHandle,
    worker_task: JoinHandle<DeliveryStats>,
}

impl LifecycleController {
    /// Spawns the delivery worker; sampling starts with `start`.
    pub fn new(
        worker: DeliveryWorker,
        source: Box<dyn LocationSource>,
        settings: SessionSettings,
    ) -> Self {
        let lease = worker.lease();
        let (handle, worker_task) = worker.spawn();
        Self {
            state: RunningState::Stopped,
            settings,
            source,
            subscription: None,
            lease,
            worker: handle,
            worker_task,
        }
    }

    pub fn state(&self) -> RunningState {
        self.state
    }

    #[cfg(test)]
    pub fn lease(&self) -> &WakeLease {
        &self.lease
    }

    /// Acquire the wake lease, subscribe to locations and schedule a drain.
    ///
    /// The drain is scheduled whether or not the subscription comes up. A
    /// subscription failure stops the run and is returned; it is not
    /// retried here.
    pub fn start(&mut self) -> Result<(), SourceError> {
        if self.state != RunningState::Stopped {
            warn!("Start requested while {}, ignoring", self.state);
            return Ok(());
        }

        self.state = RunningState::Starting;
        info!("Tracking starting ({} source)", self.source.name());
        if self.lease.acquire() {
            info!("Wake lease acquired");
        }

        let result = match self.subscribe() {
            Ok(subscription) => {
                self.subscription = Some(subscription);
                self.state = RunningState::Active;
                info!("Location tracking ACTIVE");
                Ok(())
            }
            Err(e) => {
                if e.is_permission_denied() {
                    error!("No location permission - stopping: {}", e);
                } else {
                    error!("Location updates FAILED: {}", e);
                }
                self.stop();
                Err(e)
            }
        };

        self.worker.drain();
        result
    }

    fn subscribe(&mut self) -> Result<Subscription, SourceError> {
        self.source.check_permission()?;
        let sink = FixSink::new(
            self.worker.clone(),
            self.settings.device_id.clone(),
            self.settings.app_tag.clone(),
            self.settings.request.min_displacement_m,
        );
        self.source.start(self.settings.request, sink)
    }

    /// Cancel sampling and release the wake lease. Idempotent.
    pub fn stop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.cancel();
            info!("Location updates removed");
        }
        if self.lease.release() {
            info!("Wake lease released");
        }
        if self.state != RunningState::Stopped {
            self.state = RunningState::Stopped;
            info!("Tracking stopped");
        }
    }

    /// Stop, then wait for the worker to finish everything already handed
    /// to it (each item is either delivered or queued).
    pub async fn shutdown(mut self) -> DeliveryStats {
        if let Some(subscription) = self.subscription.take() {
            subscription.cancel_and_wait().await;
            info!("Location updates removed");
        }
        self.stop();

        let Self {
            worker,
            worker_task,
            ..
        } = self;
        drop(worker);

        match worker_task.await {
            Ok(stats) => stats,
            Err(e) => {
                error!("Delivery worker ended abnormally: {}", e);
                DeliveryStats::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CollectorConfig;
    use crate::delivery::{CollectorClient, ConnectivityGate, ManualGate};
    use crate::delivery::wire::{self, WireRecord};
    use crate::location::{Fix, LocationEvent};
    use crate::store::{DurableQueue, QUEUE_FILE};
    use chrono::{TimeZone, Utc};
    use std::time::Duration;
    use tempfile::TempDir;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Hands a fixed list of fixes to the sink while subscribing
    struct ScriptedSource {
        fixes: Vec<Fix>,
        denied: bool,
    }

    impl LocationSource for ScriptedSource {
        fn name(&self) -> &str {
            "scripted"
        }

        fn check_permission(&self) -> Result<(), SourceError> {
            if self.denied {
                Err(SourceError::PermissionDenied("test".to_string()))
            } else {
                Ok(())
            }
        }

        fn start(
            &mut self,
            _request: LocationRequest,
            mut sink: FixSink,
        ) -> Result<Subscription, SourceError> {
            for fix in self.fixes.drain(..) {
                sink.deliver(fix);
            }
            Ok(Subscription::new(tokio::spawn(
                std::future::pending::<()>(),
            )))
        }
    }

    fn fix(n: u32) -> Fix {
        Fix {
            latitude: 47.6062 + f64::from(n) * 0.001,
            longitude: -122.3321,
            time: Utc.with_ymd_and_hms(2026, 10, 19, 8, n, 0).unwrap(),
            accuracy: 5.0,
            speed: 1.5,
            bearing: 90.0,
        }
    }

    fn settings() -> SessionSettings {
        SessionSettings {
            request: LocationRequest {
                interval: Duration::from_secs(30),
                min_displacement_m: 5.0,
            },
            device_id: "device_abc123".to_string(),
            app_tag: "X".to_string(),
        }
    }

    fn controller(
        url: &str,
        dir: &TempDir,
        gate: Arc<dyn ConnectivityGate>,
        source: ScriptedSource,
    ) -> LifecycleController {
        let client = CollectorClient::new(&CollectorConfig {
            url: url.to_string(),
            connect_timeout_secs: 2,
            timeout_secs: 2,
            user_agent: "location-relay-test".to_string(),
        })
        .unwrap();
        let worker = DeliveryWorker::new(
            DurableQueue::open(dir.path().join(QUEUE_FILE)).unwrap(),
            client,
            gate,
            Arc::new(WakeLease::new(Duration::from_secs(3600))),
        );
        LifecycleController::new(worker, Box::new(source), settings())
    }

    fn stored(dir: &TempDir) -> Vec<String> {
        DurableQueue::open(dir.path().join(QUEUE_FILE))
            .unwrap()
            .snapshot()
            .unwrap()
            .into_iter()
            .map(WireRecord::into_string)
            .collect()
    }

    #[tokio::test]
    async fn test_start_and_stop_transitions() {
        let dir = TempDir::new().unwrap();
        let source = ScriptedSource {
            fixes: vec![],
            denied: false,
        };
        let mut controller = controller(
            "http://127.0.0.1:9/record-location",
            &dir,
            Arc::new(ManualGate::new(false)),
            source,
        );
        assert_eq!(controller.state(), RunningState::Stopped);

        controller.start().unwrap();
        assert_eq!(controller.state(), RunningState::Active);
        assert!(controller.lease().is_held());

        controller.stop();
        assert_eq!(controller.state(), RunningState::Stopped);
        assert!(!controller.lease().is_held());

        // second stop is harmless
        controller.stop();
        assert_eq!(controller.state(), RunningState::Stopped);

        controller.shutdown().await;
    }

    #[tokio::test]
    async fn test_permission_denied_stops_run() {
        let dir = TempDir::new().unwrap();
        let source = ScriptedSource {
            fixes: vec![fix(0)],
            denied: true,
        };
        let mut controller = controller(
            "http://127.0.0.1:9/record-location",
            &dir,
            Arc::new(ManualGate::new(false)),
            source,
        );

        let err = controller.start().unwrap_err();
        assert!(err.is_permission_denied());
        assert_eq!(controller.state(), RunningState::Stopped);
        assert!(!controller.lease().is_held());

        let stats = controller.shutdown().await;
        assert_eq!(stats, DeliveryStats::default());
        assert!(stored(&dir).is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_flushes_dispatched_events_to_queue() {
        let dir = TempDir::new().unwrap();
        let source = ScriptedSource {
            fixes: vec![fix(0), fix(1), fix(2)],
            denied: false,
        };
        let mut controller = controller(
            "http://127.0.0.1:9/record-location",
            &dir,
            Arc::new(ManualGate::new(false)),
            source,
        );

        controller.start().unwrap();
        let stats = controller.shutdown().await;

        assert_eq!(stats.queued, 3);
        let expected: Vec<String> = (0..3)
            .map(|n| {
                wire::encode(&LocationEvent::from_fix(&fix(n), "device_abc123", "X")).into_string()
            })
            .collect();
        assert_eq!(stored(&dir), expected);
    }

    #[tokio::test]
    async fn test_start_drains_backlog() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let queue = DurableQueue::open(dir.path().join(QUEUE_FILE)).unwrap();
        for n in 0..2 {
            queue
                .append(&wire::encode(&LocationEvent::from_fix(&fix(n), "device_abc123", "X")))
                .unwrap();
        }

        let source = ScriptedSource {
            fixes: vec![],
            denied: false,
        };
        let mut controller = controller(
            &format!("{}/record-location", server.uri()),
            &dir,
            Arc::new(ManualGate::new(true)),
            source,
        );

        controller.start().unwrap();
        let stats = controller.shutdown().await;

        assert_eq!(stats.resent, 2);
        assert!(!dir.path().join(QUEUE_FILE).exists());
    }

    #[tokio::test]
    async fn test_denied_start_still_drains_backlog() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        DurableQueue::open(dir.path().join(QUEUE_FILE))
            .unwrap()
            .append(&wire::encode(&LocationEvent::from_fix(&fix(0), "device_abc123", "X")))
            .unwrap();

        let source = ScriptedSource {
            fixes: vec![],
            denied: true,
        };
        let mut controller = controller(
            &format!("{}/record-location", server.uri()),
            &dir,
            Arc::new(ManualGate::new(true)),
            source,
        );

        assert!(controller.start().is_err());
        assert_eq!(controller.state(), RunningState::Stopped);
        let stats = controller.shutdown().await;

        assert_eq!(stats.resent, 1);
        assert!(!dir.path().join(QUEUE_FILE).exists());
    }

    #[tokio::test]
    async fn test_double_start_is_ignored() {
        let dir = TempDir::new().unwrap();
        let source = ScriptedSource {
            fixes: vec![fix(0)],
            denied: false,
        };
        let mut controller = controller(
            "http://127.0.0.1:9/record-location",
            &dir,
            Arc::new(ManualGate::new(false)),
            source,
        );

        controller.start().unwrap();
        controller.start().unwrap();
        assert_eq!(controller.state(), RunningState::Active);

        let stats = controller.shutdown().await;
        assert_eq!(stats.queued, 1);
    }
}
