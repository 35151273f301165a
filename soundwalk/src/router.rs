//! The control sequence tying location, monitoring, mixing and playback
//! together.
//!
//! A [`SoundWalk`] owns every piece of mutable state. All mutations happen
//! through `&mut self`, and [`SoundWalk::run`] drives it from a single
//! `select!` loop, so location callbacks and editor commands are serialized
//! without locks.

use crate::config::SoundWalkDesc;
use crate::error::Result;
use crate::events::{Transition, WalkEvent, ZoneEvent};
use crate::location::{AuthorizationStatus, LocationEvent, LocationProvider};
use crate::mixer::{GainChange, StemMixer, StemOutput};
use crate::monitor::{ActiveZoneSet, ProximityMonitor};
use crate::geo::GeoPoint;
use crate::store::{ZoneStore, load_or_seed};
use crate::zone::{Zone, seed_zones, upsert_zone, validate_catalog};
use crossbeam_channel::{Receiver, Sender, select};

/// Requests from the UI or editor layer.
#[derive(Debug, Clone)]
pub enum WalkCommand {
    /// Replace the whole catalog.
    RefreshZones(Vec<Zone>),
    /// Insert or replace one zone (matched by id or title).
    UpsertZone(Zone),
    StartAudio,
    Shutdown,
}

pub struct SoundWalk<O: StemOutput> {
    desc: SoundWalkDesc,
    catalog: Vec<Zone>,
    store: Box<dyn ZoneStore>,
    monitor: ProximityMonitor,
    mixer: StemMixer,
    output: O,
    location: Box<dyn LocationProvider>,
    status: AuthorizationStatus,
    updating: bool,
    subscribers: Vec<Sender<WalkEvent>>,
}

impl<O: StemOutput> SoundWalk<O> {
    /// Load the catalog (or the seed zones) and wire the pieces together.
    ///
    /// Nothing is monitored until [`start`](Self::start).
    pub fn new(
        desc: SoundWalkDesc,
        store: Box<dyn ZoneStore>,
        output: O,
        location: Box<dyn LocationProvider>,
    ) -> Result<Self> {
        desc.validate()?;

        let mut catalog = load_or_seed(store.as_ref());
        if let Err(e) = validate_catalog(&catalog) {
            log::warn!("Stored catalog rejected ({}), using seed zones", e);
            catalog = seed_zones();
            if let Err(e) = store.save(&catalog) {
                log::error!("Failed to persist seed zones: {}", e);
            }
        }

        let status = location.authorization_status();
        let mut walk = Self {
            monitor: ProximityMonitor::new(&desc.monitor),
            mixer: StemMixer::new(desc.mix.clone()),
            desc,
            catalog,
            store,
            output,
            location,
            status,
            updating: false,
            subscribers: Vec::new(),
        };
        walk.remix();
        Ok(walk)
    }

    pub fn desc(&self) -> &SoundWalkDesc {
        &self.desc
    }

    pub fn zones(&self) -> &[Zone] {
        &self.catalog
    }

    pub fn active_zones(&self) -> &ActiveZoneSet {
        self.monitor.active_zones()
    }

    pub fn monitored_zone_ids(&self) -> &[String] {
        self.monitor.monitored_zone_ids()
    }

    pub fn authorization_status(&self) -> AuthorizationStatus {
        self.status
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut O {
        &mut self.output
    }

    /// Receive [`WalkEvent`]s from now on.
    pub fn subscribe(&mut self) -> Receiver<WalkEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.push(tx);
        rx
    }

    /// Begin the authorization flow.
    ///
    /// - `NotDetermined`: ask; the answer arrives as a location event.
    /// - `WhenInUse` / `Always`: start location updates.
    /// - `Denied` / `Restricted`: stay idle.
    pub fn start(&mut self) -> Result<()> {
        self.status = self.location.authorization_status();
        if self.status == AuthorizationStatus::NotDetermined {
            log::info!("Requesting location authorization");
            self.location.request_authorization();
            return Ok(());
        }
        self.apply_authorization()
    }

    /// Start the audio transport. Safe to call again after a failure.
    pub fn start_audio(&mut self) -> Result<()> {
        self.output.start_all()?;
        self.remix();
        Ok(())
    }

    pub fn handle_location_event(&mut self, event: LocationEvent) -> Result<()> {
        match event {
            LocationEvent::Fix(fix) => {
                self.on_fix(fix.point);
                Ok(())
            }
            LocationEvent::RegionCrossing {
                zone_id,
                transition,
            } => {
                self.on_region_crossing(&zone_id, transition);
                Ok(())
            }
            LocationEvent::AuthorizationChanged(status) => self.on_authorization_changed(status),
        }
    }

    /// Feed a position fix. Ignored unless location use is authorized.
    pub fn on_fix(&mut self, location: GeoPoint) -> Vec<ZoneEvent> {
        if !self.status.allows_monitoring() {
            log::debug!("Ignoring fix while {:?}", self.status);
            return Vec::new();
        }
        let before = self.monitor.active_zones().clone();
        let events = self.monitor.on_fix(location, &self.catalog);
        self.report(&events, &before, None);
        events
    }

    pub fn on_region_crossing(&mut self, zone_id: &str, transition: Transition) -> Option<ZoneEvent> {
        if !self.status.allows_monitoring() {
            return None;
        }
        let before = self.monitor.active_zones().clone();
        let event = self.monitor.on_region_crossing(zone_id, transition)?;
        self.report(std::slice::from_ref(&event), &before, None);
        Some(event)
    }

    pub fn on_authorization_changed(&mut self, status: AuthorizationStatus) -> Result<()> {
        log::info!("Location authorization: {:?}", status);
        self.status = status;
        self.publish(WalkEvent::AuthorizationChanged(status));
        self.apply_authorization()
    }

    fn apply_authorization(&mut self) -> Result<()> {
        if self.status.allows_monitoring() {
            if !self.updating {
                self.location.start_updates()?;
                self.updating = true;
                log::info!("Location updates started");
            }
            return Ok(());
        }

        if self.updating {
            self.location.stop_updates();
            self.updating = false;
            log::info!("Location updates stopped");
        }
        let before = self.monitor.active_zones().clone();
        let events = self.monitor.disarm();
        self.report(&events, &before, None);
        Ok(())
    }

    /// Replace the catalog, persist it, re-arm monitoring and remix.
    ///
    /// Zones that disappear while active get an Exit. A failed save is
    /// logged and does not stop the update.
    pub fn refresh_zones(&mut self, zones: Vec<Zone>) -> Result<()> {
        validate_catalog(&zones)?;

        if let Err(e) = self.store.save(&zones) {
            log::error!("Failed to persist zone catalog: {}", e);
        }

        let before = self.monitor.active_zones().clone();
        let previous = std::mem::replace(&mut self.catalog, zones);
        let events = self.monitor.rearm(&self.catalog);

        log::info!("Zone catalog updated: {} zones", self.catalog.len());
        self.publish(WalkEvent::CatalogChanged {
            zone_count: self.catalog.len(),
        });
        self.report(&events, &before, Some(previous.as_slice()));
        if events.is_empty() {
            // Gains may have changed even if no zone was crossed
            self.remix();
        }
        Ok(())
    }

    pub fn add_or_replace_zone(&mut self, zone: Zone) -> Result<()> {
        let next = upsert_zone(&self.catalog, zone);
        self.refresh_zones(next)
    }

    /// Publish zone events and remix if anything happened.
    fn report(&mut self, events: &[ZoneEvent], before: &ActiveZoneSet, previous: Option<&[Zone]>) {
        if events.is_empty() {
            return;
        }

        let notifications: Vec<WalkEvent> = events
            .iter()
            .map(|event| {
                log::debug!("{}", event);
                let title = self.zone_title(&event.zone_id, previous);
                let zone_id = event.zone_id.clone();
                match event.transition {
                    Transition::Enter => WalkEvent::ZoneEntered { zone_id, title },
                    Transition::Exit => WalkEvent::ZoneExited { zone_id, title },
                }
            })
            .collect();
        for notification in notifications {
            self.publish(notification);
        }

        if self.monitor.active_zones() != before {
            let active = self.monitor.active_zones().to_vec();
            log::info!("Active zones: {:?}", active);
            self.publish(WalkEvent::ActiveZonesChanged { active });
        }

        self.remix();
    }

    fn zone_title(&self, zone_id: &str, previous: Option<&[Zone]>) -> String {
        self.catalog
            .iter()
            .chain(previous.unwrap_or_default())
            .find(|z| z.id == zone_id)
            .map(|z| z.title.clone())
            .unwrap_or_else(|| zone_id.to_string())
    }

    fn remix(&mut self) {
        let changes = self
            .mixer
            .apply(self.monitor.active_zones(), &self.catalog, &mut self.output);
        for change in changes {
            if let GainChange::Ramp { stem_id, target } = change {
                self.publish(WalkEvent::MixChanged { stem_id, target });
            }
        }
    }

    fn publish(&mut self, event: WalkEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Apply one command. Returns `false` for `Shutdown`.
    pub fn handle_command(&mut self, command: WalkCommand) -> bool {
        let result = match command {
            WalkCommand::RefreshZones(zones) => self.refresh_zones(zones),
            WalkCommand::UpsertZone(zone) => self.add_or_replace_zone(zone),
            WalkCommand::StartAudio => self.start_audio(),
            WalkCommand::Shutdown => return false,
        };
        if let Err(e) = result {
            log::error!("Command failed: {}", e);
        }
        true
    }

    /// Run the control loop until `Shutdown` arrives or the command channel
    /// closes, then stop location updates and hand the walk back.
    pub fn run(mut self, locations: Receiver<LocationEvent>, commands: Receiver<WalkCommand>) -> Self {
        let closed = crossbeam_channel::never();
        let mut locations_open = true;

        if let Err(e) = self.start() {
            log::error!("Failed to start location monitoring: {}", e);
        }

        loop {
            let location_rx = if locations_open { &locations } else { &closed };
            select! {
                recv(location_rx) -> msg => match msg {
                    Ok(event) => {
                        if let Err(e) = self.handle_location_event(event) {
                            log::error!("Location event failed: {}", e);
                        }
                    }
                    Err(_) => {
                        log::info!("Location feed closed");
                        locations_open = false;
                    }
                },
                recv(commands) -> msg => match msg {
                    Ok(command) => {
                        if !self.handle_command(command) {
                            break;
                        }
                    }
                    Err(_) => break,
                },
            }
        }

        if self.updating {
            self.location.stop_updates();
            self.updating = false;
        }
        log::info!("Sound walk stopped");
        self
    }
}
