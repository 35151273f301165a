use approx::assert_relative_eq;
use soundwalk::audio_data::AudioClip;
use soundwalk::location::{AuthorizationStatus, LocationEvent, LocationProvider};
use soundwalk::store::{JsonZoneStore, MemoryZoneStore, ZoneStore};
use soundwalk::*;
use std::sync::Arc;

const RATE: u32 = 1000;
const STEMS: [&str; 4] = ["bass", "drums", "pads", "vox"];

/// Location access already granted; fixes are fed by the test.
struct GrantedProvider;

impl LocationProvider for GrantedProvider {
    fn authorization_status(&self) -> AuthorizationStatus {
        AuthorizationStatus::WhenInUse
    }

    fn request_authorization(&mut self) {}

    fn start_updates(&mut self) -> Result<()> {
        Ok(())
    }

    fn stop_updates(&mut self) {}
}

/// Shares one store between the walk and the test.
struct SharedStore(Arc<MemoryZoneStore>);

impl ZoneStore for SharedStore {
    fn load(&self) -> Result<Vec<Zone>> {
        self.0.load()
    }

    fn save(&self, zones: &[Zone]) -> Result<()> {
        self.0.save(zones)
    }
}

fn desc() -> SoundWalkDesc {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut desc = SoundWalkDesc::default();
    // 120 bpm in 4/4 at 1 kHz: one bar every 2000 frames
    desc.transport = TransportDesc::default()
        .sample_rate(RATE)
        .channels(1)
        .block_size(100)
        .tempo(120.0, 4)
        .preroll_seconds(0.0)
        .output(OutputMode::Offline);
    desc
}

fn transport(desc: &SoundWalkDesc) -> AudioTransport {
    let mut transport = AudioTransport::new(desc.transport.clone()).unwrap();
    for stem in STEMS {
        let clip = AudioClip::from_interleaved(vec![1.0; 4 * RATE as usize], RATE, 1).unwrap();
        transport.add_stem(stem, clip, 0.0).unwrap();
    }
    transport
}

fn walk_with_store(store: Box<dyn ZoneStore>) -> SoundWalk<AudioTransport> {
    let desc = desc();
    let output = transport(&desc);
    let mut walk = SoundWalk::new(desc, store, output, Box::new(GrantedProvider)).unwrap();
    walk.start().unwrap();
    walk.start_audio().unwrap();
    walk
}

fn zone_center(walk: &SoundWalk<AudioTransport>, id: &str) -> GeoPoint {
    walk.zones().iter().find(|z| z.id == id).unwrap().center()
}

fn gain(walk: &SoundWalk<AudioTransport>, stem: &str) -> f32 {
    walk.output().stem_gain(stem).unwrap()
}

#[test]
fn test_walking_between_zones_crossfades_on_bar_lines() {
    let mut walk = walk_with_store(Box::new(MemoryZoneStore::new()));
    let events = walk.subscribe();
    assert_eq!(walk.output().clock().t0(), Some(0));
    assert_eq!(walk.monitored_zone_ids().len(), 0);

    walk.output_mut().render_frames(500).unwrap();
    walk.output_mut().poll_events();

    // Both zones are armed; B starts out with an explicit Exit
    let entered = walk.on_fix(zone_center(&walk, "a"));
    assert_eq!(entered, vec![ZoneEvent::enter("a"), ZoneEvent::exit("b")]);
    assert_eq!(walk.monitored_zone_ids().len(), 2);
    assert_eq!(
        events.try_iter().collect::<Vec<_>>(),
        vec![
            WalkEvent::ZoneEntered {
                zone_id: "a".into(),
                title: "Zone A".into()
            },
            WalkEvent::ZoneExited {
                zone_id: "b".into(),
                title: "Zone B".into()
            },
            WalkEvent::ActiveZonesChanged {
                active: vec!["a".into()]
            },
            WalkEvent::MixChanged {
                stem_id: "drums".into(),
                target: 1.0
            },
            WalkEvent::MixChanged {
                stem_id: "pads".into(),
                target: 0.6
            },
        ]
    );

    // Nothing moves before the bar line at frame 2000
    let out = walk.output_mut().render_frames(3000).unwrap();
    assert_eq!(out[1999 - 500], 0.0);
    assert_relative_eq!(out[3400 - 500], 1.6, epsilon = 1e-5);
    assert_relative_eq!(gain(&walk, "drums"), 1.0);
    assert_relative_eq!(gain(&walk, "pads"), 0.6, epsilon = 1e-6);
    assert_eq!(gain(&walk, "bass"), 0.0);

    let ramps: Vec<_> = walk
        .output()
        .poll_events()
        .into_iter()
        .filter(|e| matches!(e, TransportEvent::RampStarted { .. }))
        .collect();
    assert_eq!(ramps.len(), 2);
    assert!(ramps.iter().all(|e| matches!(e, TransportEvent::RampStarted { frame: 2000, .. })));

    // Walk over to zone B: A's stems fade out while B's fade in
    let moved = walk.on_fix(zone_center(&walk, "b"));
    assert_eq!(moved.len(), 2);
    assert!(moved.contains(&ZoneEvent::exit("a")));
    assert!(moved.contains(&ZoneEvent::enter("b")));
    assert_eq!(walk.active_zones().to_vec(), vec!["b".to_string()]);

    walk.output_mut().render_frames(2000).unwrap();
    assert_eq!(gain(&walk, "drums"), 0.0);
    assert_eq!(gain(&walk, "pads"), 0.0);
    assert_relative_eq!(gain(&walk, "bass"), 1.0);
    assert_relative_eq!(gain(&walk, "vox"), 0.8, epsilon = 1e-6);

    let completed = walk
        .output()
        .poll_events()
        .into_iter()
        .filter(|e| matches!(e, TransportEvent::RampCompleted { frame: 5200, .. }))
        .count();
    assert_eq!(completed, 4);
    assert_eq!(walk.output().dropped_events(), 0);
}

#[test]
fn test_editing_the_active_zone_remixes_without_crossings() {
    let store = Arc::new(MemoryZoneStore::new());
    let mut walk = walk_with_store(Box::new(SharedStore(store.clone())));
    walk.on_fix(zone_center(&walk, "a"));

    let events = walk.subscribe();
    let mut edited = walk.zones()[0].clone();
    edited.stems.clear();
    edited.stems.insert("drums".into(), 0.2);
    walk.add_or_replace_zone(edited).unwrap();

    assert_eq!(
        events.try_iter().collect::<Vec<_>>(),
        vec![
            WalkEvent::CatalogChanged { zone_count: 2 },
            WalkEvent::MixChanged {
                stem_id: "drums".into(),
                target: 0.2
            },
            WalkEvent::MixChanged {
                stem_id: "pads".into(),
                target: 0.0
            },
        ]
    );
    assert!(walk.active_zones().contains("a"));

    let saved = store.snapshot().unwrap();
    assert_eq!(saved.len(), 2);
    assert_eq!(saved[0].stems.get("drums"), Some(&0.2));
}

#[test]
fn test_removing_the_active_zone_exits_it() {
    let mut walk = walk_with_store(Box::new(MemoryZoneStore::new()));
    walk.on_fix(zone_center(&walk, "a"));
    let events = walk.subscribe();

    let remaining: Vec<Zone> = walk.zones().iter().filter(|z| z.id != "a").cloned().collect();
    walk.refresh_zones(remaining).unwrap();

    let received: Vec<_> = events.try_iter().collect();
    assert!(received.contains(&WalkEvent::ZoneExited {
        zone_id: "a".into(),
        title: "Zone A".into()
    }));
    assert!(walk.active_zones().is_empty());
    assert_eq!(walk.output().stem_targets()["drums"], 0.0);
    assert_eq!(walk.monitored_zone_ids(), ["b".to_string()]);
}

#[test]
fn test_catalog_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();

    let mut walk = walk_with_store(Box::new(JsonZoneStore::in_dir(dir.path())));
    assert_eq!(walk.zones().len(), 2);
    walk.add_or_replace_zone(Zone::new("c", "Zone C", 51.48, -0.06, 120.0).with_stem("vox", 0.5))
        .unwrap();
    walk.output_mut().teardown();
    drop(walk);

    let walk = walk_with_store(Box::new(JsonZoneStore::in_dir(dir.path())));
    let ids: Vec<_> = walk.zones().iter().map(|z| z.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
}

#[test]
fn test_run_loop_applies_fixes_in_order() {
    let desc = desc();
    let output = transport(&desc);
    let mut walk = SoundWalk::new(
        desc,
        Box::new(MemoryZoneStore::new()),
        output,
        Box::new(GrantedProvider),
    )
    .unwrap();
    let a = zone_center(&walk, "a");
    let b = zone_center(&walk, "b");

    let (location_tx, location_rx) = crossbeam_channel::unbounded();
    let (command_tx, command_rx) = crossbeam_channel::unbounded();
    command_tx.send(WalkCommand::StartAudio).unwrap();
    for point in [a, a, b] {
        location_tx
            .send(LocationEvent::Fix(LocationFix::new(point.latitude, point.longitude)))
            .unwrap();
    }

    let feeder = std::thread::spawn(move || {
        // Once the last fix is taken, Shutdown is handled after it
        while !location_tx.is_empty() {
            std::thread::yield_now();
        }
        command_tx.send(WalkCommand::Shutdown).unwrap();
    });

    let events = walk.subscribe();
    let mut walk = walk.run(location_rx, command_rx);
    feeder.join().unwrap();

    assert!(walk.output().is_started());
    assert_eq!(walk.active_zones().to_vec(), vec!["b".to_string()]);

    let entered: Vec<_> = events
        .try_iter()
        .filter_map(|e| match e {
            WalkEvent::ZoneEntered { zone_id, .. } => Some(zone_id),
            _ => None,
        })
        .collect();
    assert_eq!(entered, vec!["a".to_string(), "b".to_string()]);

    walk.output_mut().teardown();
    assert!(!walk.output().is_started());
}
