//! Location input: authorization state, the typed event stream, and providers.
//!
//! The proximity monitor never talks to a platform API. Providers push
//! [`LocationEvent`]s into a channel and the router consumes them on its
//! control thread.

use crate::error::{Result, SoundWalkError};
use crate::events::Transition;
use crate::geo::{GeoPoint, LocationFix};
use crossbeam_channel::Sender;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationStatus {
    NotDetermined,
    Restricted,
    Denied,
    WhenInUse,
    Always,
}

impl AuthorizationStatus {
    pub fn allows_monitoring(&self) -> bool {
        matches!(self, Self::WhenInUse | Self::Always)
    }
}

/// Everything a location provider can report.
#[derive(Debug, Clone, PartialEq)]
pub enum LocationEvent {
    Fix(LocationFix),
    /// Raw crossing signal from a platform region monitor.
    RegionCrossing {
        zone_id: String,
        transition: Transition,
    },
    AuthorizationChanged(AuthorizationStatus),
}

/// Narrow interface over a platform location service.
///
/// Calls dispatch and return promptly; results (fixes, authorization
/// changes) arrive later as [`LocationEvent`]s.
pub trait LocationProvider: Send {
    fn authorization_status(&self) -> AuthorizationStatus;
    fn request_authorization(&mut self);
    fn start_updates(&mut self) -> Result<()>;
    fn stop_updates(&mut self);
}

/// Replays a fixed list of fixes on a background thread.
pub struct ReplayLocationProvider {
    sender: Sender<LocationEvent>,
    route: Vec<GeoPoint>,
    interval: Duration,
    status: AuthorizationStatus,
    grant: AuthorizationStatus,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl ReplayLocationProvider {
    /// `grant` is the status reported once authorization is requested.
    pub fn new(
        sender: Sender<LocationEvent>,
        route: Vec<GeoPoint>,
        interval: Duration,
        grant: AuthorizationStatus,
    ) -> Self {
        Self {
            sender,
            route,
            interval,
            status: AuthorizationStatus::NotDetermined,
            grant,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// A straight walk from `from` to `to` in `steps` equal hops (inclusive).
    pub fn walk(from: GeoPoint, to: GeoPoint, steps: usize) -> Vec<GeoPoint> {
        let steps = steps.max(1);
        (0..=steps)
            .map(|i| from.lerp(&to, i as f64 / steps as f64))
            .collect()
    }
}

impl LocationProvider for ReplayLocationProvider {
    fn authorization_status(&self) -> AuthorizationStatus {
        self.status
    }

    fn request_authorization(&mut self) {
        self.status = self.grant;
        if self
            .sender
            .send(LocationEvent::AuthorizationChanged(self.grant))
            .is_err()
        {
            log::warn!("Location receiver dropped before authorization was reported");
        }
    }

    fn start_updates(&mut self) -> Result<()> {
        if !self.status.allows_monitoring() {
            return Err(SoundWalkError::Location(format!(
                "cannot start updates while {:?}",
                self.status
            )));
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let sender = self.sender.clone();
        let route = self.route.clone();
        let interval = self.interval;
        let running = self.running.clone();

        let worker = std::thread::Builder::new()
            .name("soundwalk-replay".into())
            .spawn(move || {
                for point in route {
                    if !running.load(Ordering::SeqCst) {
                        break;
                    }
                    let fix = LocationFix::at(point, SystemTime::now());
                    if sender.send(LocationEvent::Fix(fix)).is_err() {
                        break;
                    }
                    std::thread::sleep(interval);
                }
                running.store(false, Ordering::SeqCst);
                log::debug!("Replay route finished");
            })
            .map_err(|e| SoundWalkError::Location(format!("failed to spawn replay: {}", e)))?;

        self.worker = Some(worker);
        log::info!("Replaying {} fixes", self.route.len());
        Ok(())
    }

    fn stop_updates(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for ReplayLocationProvider {
    fn drop(&mut self) {
        self.stop_updates();
    }
}
