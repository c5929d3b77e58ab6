//! Replays recorded fixes from a JSON-lines file, one fix per interval.
//!
//! Each line is a `Fix` object, e.g.
//! `{"latitude":47.6062,"longitude":-122.3321,"time":"2026-10-19T08:30:00Z","accuracy":5.0}`.
//! Malformed lines are skipped.

use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::PathBuf;

use tracing::{info, warn};

use super::{Fix, FixSink, LocationRequest, LocationSource, Subscription};
use crate::error::SourceError;

pub struct ReplaySource {
    path: PathBuf,
}

impl ReplaySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn open(&self) -> Result<File, SourceError> {
        File::open(&self.path).map_err(|e| match e.kind() {
            ErrorKind::PermissionDenied => {
                SourceError::PermissionDenied(format!("{}: {}", self.path.display(), e))
            }
            _ => SourceError::Unavailable(format!("{}: {}", self.path.display(), e)),
        })
    }

    fn load(&self) -> Result<Vec<Fix>, SourceError> {
        let reader = BufReader::new(self.open()?);
        let mut fixes = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line =
                line.map_err(|e| SourceError::Unavailable(format!("read failed: {}", e)))?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Fix>(line) {
                Ok(fix) => fixes.push(fix),
                Err(e) => warn!("Skipping line {} of {:?}: {}", idx + 1, self.path, e),
            }
        }
        Ok(fixes)
    }
}

impl LocationSource for ReplaySource {
    fn name(&self) -> &str {
        "replay"
    }

    fn check_permission(&self) -> Result<(), SourceError> {
        self.open().map(|_| ())
    }

    fn start(
        &mut self,
        request: LocationRequest,
        mut sink: FixSink,
    ) -> Result<Subscription, SourceError> {
        let fixes = self.load()?;
        info!("Replaying {} fix(es) from {:?}", fixes.len(), self.path);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(request.interval);
            for fix in fixes {
                ticker.tick().await;
                if !sink.deliver(fix) {
                    info!("Delivery worker gone, replay stopping");
                    return;
                }
            }
            info!("Replay exhausted");
        });

        Ok(Subscription::new(task))
    }
}
