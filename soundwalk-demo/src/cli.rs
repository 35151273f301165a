use anyhow::{Context, Result, bail};
use soundwalk::audio_data::AudioLibrary;
use soundwalk::location::{AuthorizationStatus, LocationProvider, ReplayLocationProvider};
use soundwalk::store::JsonZoneStore;
use soundwalk::*;
use std::path::PathBuf;
use std::time::Duration;

const USAGE: &str = "usage: soundwalk-demo [--offline] [--config walk.json] [zones.json] [user_audio_dir] [bundle_audio_dir]";

/// Fixes replayed between the first two zones.
const ROUTE_STEPS: usize = 40;
const FIX_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Default)]
pub struct DemoArgs {
    pub offline: bool,
    pub config: Option<PathBuf>,
    pub zones: Option<PathBuf>,
    pub user_audio: Option<PathBuf>,
    pub bundle_audio: Option<PathBuf>,
}

impl DemoArgs {
    pub fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut parsed = Self::default();
        let mut positional = Vec::new();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--offline" => parsed.offline = true,
                "--config" => {
                    let path = args.next().context("--config needs a path")?;
                    parsed.config = Some(path.into());
                }
                "-h" | "--help" => bail!(USAGE),
                flag if flag.starts_with("--") => bail!("unknown flag {}\n{}", flag, USAGE),
                _ => positional.push(PathBuf::from(arg)),
            }
        }
        if positional.len() > 3 {
            bail!(USAGE);
        }

        let mut positional = positional.into_iter();
        parsed.zones = positional.next();
        parsed.user_audio = positional.next();
        parsed.bundle_audio = positional.next();
        Ok(parsed)
    }

    fn desc(&self) -> Result<SoundWalkDesc> {
        match &self.config {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                Ok(SoundWalkDesc::from_json(&json)?)
            }
            None => Ok(SoundWalkDesc::default()),
        }
    }

    fn store(&self) -> JsonZoneStore {
        match &self.zones {
            Some(path) => JsonZoneStore::new(path),
            None => JsonZoneStore::in_dir("."),
        }
    }

    fn library(&self) -> AudioLibrary {
        AudioLibrary::new(self.user_audio.clone(), self.bundle_audio.clone())
    }
}

/// The first two zones of the catalog as a straight route.
fn route(zones: &[Zone]) -> Result<Vec<GeoPoint>> {
    match zones {
        [from, to, ..] => Ok(ReplayLocationProvider::walk(from.center(), to.center(), ROUTE_STEPS)),
        _ => bail!("need at least two zones to walk between"),
    }
}

/// Fixes are applied by hand and audio is rendered offline between them.
pub fn run_offline(args: DemoArgs) -> Result<()> {
    let mut desc = args.desc()?;
    desc.transport.output = OutputMode::Offline;

    let mut transport = AudioTransport::new(desc.transport.clone())?;
    transport.register_library(&args.library());

    let (location_tx, _location_rx) = crossbeam_channel::unbounded();
    let mut provider = ReplayLocationProvider::new(
        location_tx,
        Vec::new(),
        FIX_INTERVAL,
        AuthorizationStatus::WhenInUse,
    );
    provider.request_authorization();
    let mut walk = SoundWalk::new(desc, Box::new(args.store()), transport, Box::new(provider))?;
    walk.start()?;
    walk.start_audio()?;

    let frames_per_fix =
        (FIX_INTERVAL.as_secs_f64() * walk.desc().transport.sample_rate as f64) as usize;
    let mut peak = 0.0f32;

    for point in route(walk.zones())? {
        for event in walk.on_fix(point) {
            log::info!("{} at {}", event, point);
        }

        let rendered = walk.output_mut().render_frames(frames_per_fix)?;
        peak = rendered.iter().fold(peak, |p, s| p.max(s.abs()));
        for event in walk.output().poll_events() {
            if event.is_ramp_event() {
                log::info!("{:?}", event);
            }
        }
    }

    log::info!(
        "Rendered {:.1} s, peak {:.3}, {} events dropped",
        walk.output().clock().frames_to_seconds(walk.output().now_frame()),
        peak,
        walk.output().dropped_events()
    );
    walk.output_mut().teardown();
    Ok(())
}

/// Plays through the default output device while a replayed walk drives the
/// control loop.
pub fn run_device(args: DemoArgs) -> Result<()> {
    let desc = args.desc()?;
    let store = args.store();

    let mut transport = AudioTransport::new(desc.transport.clone())?;
    let stems = transport.register_library(&args.library());
    if stems.is_empty() {
        log::warn!("No audio files found; the walk will be silent");
    }

    let (location_tx, location_rx) = crossbeam_channel::unbounded();
    let route = route(&soundwalk::store::load_or_seed(&store))?;
    let walk_time = FIX_INTERVAL * route.len() as u32;
    let provider = ReplayLocationProvider::new(
        location_tx,
        route,
        FIX_INTERVAL,
        AuthorizationStatus::WhenInUse,
    );
    log::info!("Location authorization: {:?}", provider.authorization_status());

    let mut walk = SoundWalk::new(desc, Box::new(store), transport, Box::new(provider))?;
    let events = walk.subscribe();
    std::thread::spawn(move || {
        for event in events {
            match event {
                WalkEvent::ZoneEntered { title, .. } => log::info!("Entered {}", title),
                WalkEvent::ZoneExited { title, .. } => log::info!("Left {}", title),
                WalkEvent::MixChanged { stem_id, target } => {
                    log::info!("{} -> {:.2}", stem_id, target)
                }
                other => log::debug!("{:?}", other),
            }
        }
    });

    let (command_tx, command_rx) = crossbeam_channel::unbounded();
    command_tx.send(WalkCommand::StartAudio)?;
    std::thread::spawn(move || {
        // Let the last fades ring out before stopping
        std::thread::sleep(walk_time + Duration::from_secs(5));
        let _ = command_tx.send(WalkCommand::Shutdown);
    });

    let mut walk = walk.run(location_rx, command_rx);
    for event in walk.output().poll_events() {
        log::debug!("{:?}", event);
    }
    walk.output_mut().teardown();
    log::info!("Walk finished");
    Ok(())
}
