//! Proximity monitoring under a cap on simultaneously monitored regions.
//!
//! The monitor keeps the `K` zones nearest to the user armed as geofences and
//! turns position changes into edge-triggered Enter/Exit events. Its
//! [`ActiveZoneSet`] is only ever changed by applying the events it emits, so
//! the set always matches the history of events handed to the caller:
//!
//! - a zone that leaves the monitored window while active gets exactly one Exit;
//! - a zone that joins the window always gets an explicit Enter or Exit;
//! - a zone that stays in the window only produces an event when its
//!   inside/outside state flips.

use crate::config::MonitorDesc;
use crate::events::{Transition, ZoneEvent};
use crate::geo::{CircularRegion, GeoPoint};
use crate::zone::Zone;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Zones the user is currently considered inside.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveZoneSet {
    ids: BTreeSet<String>,
}

impl ActiveZoneSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, zone_id: &str) -> bool {
        self.ids.contains(zone_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.ids.iter().cloned().collect()
    }

    /// Apply an Enter or Exit. Returns whether membership changed.
    pub fn apply(&mut self, event: &ZoneEvent) -> bool {
        match event.transition {
            Transition::Enter => self.ids.insert(event.zone_id.clone()),
            Transition::Exit => self.ids.remove(&event.zone_id),
        }
    }
}

/// The `k` zones nearest to `location`, nearest first, ties broken by id.
pub fn select_nearest<'a>(location: GeoPoint, catalog: &'a [Zone], k: usize) -> Vec<&'a Zone> {
    let mut by_distance: Vec<(f64, &Zone)> = catalog
        .iter()
        .map(|zone| (location.distance_to(&zone.center()), zone))
        .collect();

    by_distance.sort_by(|(da, za), (db, zb)| da.total_cmp(db).then_with(|| za.id.cmp(&zb.id)));
    by_distance.truncate(k);
    by_distance.into_iter().map(|(_, zone)| zone).collect()
}

pub struct ProximityMonitor {
    max_regions: usize,
    min_radius: f64,
    reselect_after: Option<f64>,
    /// Monitored zone ids, nearest first at selection time.
    monitored: Vec<String>,
    /// Region id -> enforced geofence. Always replaced wholesale.
    regions: HashMap<String, CircularRegion>,
    active: ActiveZoneSet,
    last_location: Option<GeoPoint>,
    /// Where the current monitored set was selected.
    selection_origin: Option<GeoPoint>,
    rearm_pending: bool,
}

impl ProximityMonitor {
    pub fn new(desc: &MonitorDesc) -> Self {
        Self {
            max_regions: desc.max_monitored_regions,
            min_radius: desc.min_radius_meters,
            reselect_after: desc.reselect_after_meters,
            monitored: Vec::new(),
            regions: HashMap::new(),
            active: ActiveZoneSet::new(),
            last_location: None,
            selection_origin: None,
            rearm_pending: false,
        }
    }

    pub fn max_regions(&self) -> usize {
        self.max_regions
    }

    pub fn monitored_zone_ids(&self) -> &[String] {
        &self.monitored
    }

    pub fn is_monitored(&self, zone_id: &str) -> bool {
        self.regions.contains_key(zone_id)
    }

    pub fn active_zones(&self) -> &ActiveZoneSet {
        &self.active
    }

    pub fn last_location(&self) -> Option<GeoPoint> {
        self.last_location
    }

    pub fn is_rearm_pending(&self) -> bool {
        self.rearm_pending
    }

    /// Handle a new position.
    ///
    /// Rebuilds the monitored set if nothing is monitored yet, a re-arm is
    /// pending, or the user has drifted past `reselect_after_meters`;
    /// otherwise only reports boundary crossings of monitored zones.
    pub fn on_fix(&mut self, location: GeoPoint, catalog: &[Zone]) -> Vec<ZoneEvent> {
        if self.monitored.is_empty() || self.rearm_pending || self.drifted(location) {
            return self.refresh(location, catalog);
        }

        self.last_location = Some(location);
        let events: Vec<ZoneEvent> = self
            .monitored
            .iter()
            .filter_map(|zone_id| {
                let inside = self.regions.get(zone_id)?.contains(location);
                self.crossing(zone_id, inside)
            })
            .collect();
        self.commit(&events)
    }

    /// Reselect the monitored set around `location` and reconcile state.
    pub fn refresh(&mut self, location: GeoPoint, catalog: &[Zone]) -> Vec<ZoneEvent> {
        self.last_location = Some(location);
        self.selection_origin = Some(location);
        self.rearm_pending = false;

        let selected = select_nearest(location, catalog, self.max_regions);
        let new_ids: HashSet<&str> = selected.iter().map(|z| z.id.as_str()).collect();

        let mut events = Vec::new();

        // Zones leaving the window must not stay active
        for zone_id in &self.monitored {
            if !new_ids.contains(zone_id.as_str()) && self.active.contains(zone_id) {
                events.push(ZoneEvent::exit(zone_id.clone()));
            }
        }

        let mut monitored = Vec::with_capacity(selected.len());
        let mut regions = HashMap::with_capacity(selected.len());
        for zone in selected {
            let region = zone.region(self.min_radius);
            let inside = region.contains(location);

            if self.regions.contains_key(&zone.id) {
                events.extend(self.crossing(&zone.id, inside));
            } else if inside {
                events.push(ZoneEvent::enter(zone.id.clone()));
            } else {
                // Freshly armed zones always start from a communicated state
                events.push(ZoneEvent::exit(zone.id.clone()));
            }

            monitored.push(zone.id.clone());
            regions.insert(zone.id.clone(), region);
        }

        log::debug!(
            "Monitoring {} of {} zones around {}",
            monitored.len(),
            catalog.len(),
            location
        );

        self.monitored = monitored;
        self.regions = regions;
        self.commit(&events)
    }

    /// The catalog changed.
    ///
    /// With a known position this is an immediate [`refresh`](Self::refresh).
    /// Without one, vanished zones are dropped (with an Exit if active),
    /// geometry of the rest is updated, and the next fix rebuilds.
    pub fn rearm(&mut self, catalog: &[Zone]) -> Vec<ZoneEvent> {
        if let Some(location) = self.last_location {
            return self.refresh(location, catalog);
        }

        self.rearm_pending = true;
        let by_id: HashMap<&str, &Zone> = catalog.iter().map(|z| (z.id.as_str(), z)).collect();

        let mut events = Vec::new();
        let mut monitored = Vec::new();
        let mut regions = HashMap::new();
        for zone_id in &self.monitored {
            match by_id.get(zone_id.as_str()) {
                Some(zone) => {
                    monitored.push(zone_id.clone());
                    regions.insert(zone_id.clone(), zone.region(self.min_radius));
                }
                None if self.active.contains(zone_id) => {
                    events.push(ZoneEvent::exit(zone_id.clone()));
                }
                None => {}
            }
        }

        self.monitored = monitored;
        self.regions = regions;
        self.commit(&events)
    }

    /// A crossing signal reported by a platform region monitor.
    ///
    /// Ignored for zones that are not monitored and for signals that would
    /// not change state (a second Enter while inside, say).
    pub fn on_region_crossing(&mut self, zone_id: &str, transition: Transition) -> Option<ZoneEvent> {
        if !self.is_monitored(zone_id) {
            log::debug!("Ignoring crossing for unmonitored zone {}", zone_id);
            return None;
        }
        let event = self.crossing(zone_id, transition == Transition::Enter)?;
        self.commit(std::slice::from_ref(&event));
        Some(event)
    }

    /// Stop monitoring everything, exiting every active zone. The last known
    /// position is forgotten, so a later re-arm waits for a fresh fix.
    pub fn disarm(&mut self) -> Vec<ZoneEvent> {
        let events: Vec<ZoneEvent> = self.active.iter().map(ZoneEvent::exit).collect();
        self.monitored.clear();
        self.regions.clear();
        self.last_location = None;
        self.selection_origin = None;
        self.rearm_pending = false;
        self.commit(&events)
    }

    /// Edge detection: an event only when `inside` differs from the current state.
    fn crossing(&self, zone_id: &str, inside: bool) -> Option<ZoneEvent> {
        match (self.active.contains(zone_id), inside) {
            (false, true) => Some(ZoneEvent::enter(zone_id)),
            (true, false) => Some(ZoneEvent::exit(zone_id)),
            _ => None,
        }
    }

    fn drifted(&self, location: GeoPoint) -> bool {
        match (self.reselect_after, self.selection_origin) {
            (Some(threshold), Some(origin)) => origin.distance_to(&location) >= threshold,
            _ => false,
        }
    }

    fn commit(&mut self, events: &[ZoneEvent]) -> Vec<ZoneEvent> {
        for event in events {
            self.active.apply(event);
        }
        events.to_vec()
    }
}
