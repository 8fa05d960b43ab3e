use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use tokio_util::sync::CancellationToken;

use shiftcast::Error;
use shiftcast::clock::FakeClock;
use shiftcast::config::{EnforcerConfig, JsonFileSource};
use shiftcast::domain::JobKey;
use shiftcast::enforcer::Enforcer;
use shiftcast::process::testing::FakeProcessManager;
use shiftcast::recording::layout::segment_file_name;

struct Setup {
    _dir: tempfile::TempDir,
    media: PathBuf,
    channels_file: PathBuf,
    clock: FakeClock,
    processes: Arc<FakeProcessManager>,
    enforcer: Enforcer,
}

fn at(day: u32, h: u32, m: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 3, day)
        .unwrap()
        .and_hms_opt(h, m, s)
        .unwrap()
}

fn setup(channels_json: &str) -> Setup {
    let dir = tempfile::tempdir().unwrap();
    let media = dir.path().join("media");
    let channels_file = dir.path().join("channels.json");
    std::fs::write(&channels_file, channels_json).unwrap();

    let config = EnforcerConfig {
        channels_file: channels_file.clone(),
        ..EnforcerConfig::default()
    }
    .with_media_root(&media);

    let clock = FakeClock::new(at(10, 12, 0, 0));
    let processes = Arc::new(FakeProcessManager::new());
    let enforcer = Enforcer::new(
        config,
        Arc::new(JsonFileSource::new(&channels_file)),
        processes.clone(),
        Arc::new(clock.clone()),
    )
    .unwrap();

    Setup {
        _dir: dir,
        media,
        channels_file,
        clock,
        processes,
        enforcer,
    }
}

fn write_segments(dir: &Path, channel: &str, starts: &[NaiveDateTime]) -> Vec<PathBuf> {
    std::fs::create_dir_all(dir).unwrap();
    starts
        .iter()
        .map(|start| {
            let path = dir.join(segment_file_name(channel, *start));
            std::fs::write(&path, b"ts").unwrap();
            path
        })
        .collect()
}

fn live_channel_json(target: &str) -> String {
    format!(
        r#"{{
            "channels": [{{
                "id": 1,
                "name": "news",
                "input": {{"type": "udp_multicast", "url": "udp://@239.0.0.1:5000"}},
                "output": {{"type": "udp_ts", "target": "{target}"}},
                "schedule": {{"start_time": "08:00", "end_time": "20:00"}}
            }}]
        }}"#
    )
}

const DELAYED_CHANNEL_JSON: &str = r#"{
    "channels": [{
        "id": 2,
        "name": "delayed",
        "input": {"type": "internal_generator"},
        "output": {"type": "udp_ts", "target": "udp://239.1.1.1:5000"},
        "recording": {"segment_minutes": 1},
        "retention": {"enabled": true, "max_segments": 1},
        "timeshift": {"enabled": true, "delay_seconds": 3600}
    }]
}"#;

#[tokio::test]
async fn consecutive_ticks_are_idempotent() {
    let mut s = setup(&live_channel_json("udp://127.0.0.1:5002"));

    let first = s.enforcer.tick().await.unwrap();
    assert_eq!(first.spawned, 2);
    let calls = s.processes.calls().len();

    s.clock.advance(TimeDelta::seconds(5));
    let second = s.enforcer.tick().await.unwrap();

    assert_eq!(second.spawned, 0);
    assert_eq!(second.stopped, 0);
    assert_eq!(second.drift_restarts, 0);
    assert_eq!(s.processes.calls().len(), calls);
}

#[tokio::test]
async fn output_change_restarts_playback_once() {
    let mut s = setup(&live_channel_json("udp://127.0.0.1:5002"));
    s.enforcer.tick().await.unwrap();
    s.processes.clear_calls();

    std::fs::write(&s.channels_file, live_channel_json("udp://239.5.5.5:7000")).unwrap();
    for _ in 0..3 {
        s.clock.advance(TimeDelta::seconds(5));
        s.enforcer.tick().await.unwrap();
    }

    let terminated = s.processes.terminations();
    let spawned = s.processes.spawns();
    assert_eq!(terminated.len(), 1);
    assert_eq!(spawned.len(), 1);
    assert!(terminated[0].log_path.ends_with("news_playback.log"));
    assert!(spawned[0].log_path.ends_with("news_playback.log"));
    assert_eq!(
        spawned[0].argv.last().map(String::as_str),
        Some("udp://239.5.5.5:7000?pkt_size=1316&ttl=16")
    );

    let record = s.enforcer.job(&JobKey::record(1)).unwrap();
    assert_eq!(record.started_at, at(10, 12, 0, 0));
}

#[tokio::test]
async fn time_shift_playback_waits_for_recordings() {
    let mut s = setup(DELAYED_CHANNEL_JSON);

    let report = s.enforcer.tick().await.unwrap();
    assert_eq!(report.spawned, 1);
    assert_eq!(report.not_ready, 1);
    assert!(s.enforcer.job(&JobKey::playback(2)).is_none());

    // Target is 11:00 with a three hour lookback.
    let day_dir = s.media.join("recordings/delayed/20250310");
    let inside = write_segments(
        &day_dir,
        "delayed",
        &[at(10, 10, 57, 0), at(10, 10, 58, 0), at(10, 10, 59, 0)],
    );
    write_segments(&day_dir, "delayed", &[at(10, 11, 30, 0)]);

    s.clock.advance(TimeDelta::seconds(5));
    let report = s.enforcer.tick().await.unwrap();
    assert_eq!(report.spawned, 1);
    assert_eq!(report.not_ready, 0);

    let playback = s.enforcer.job(&JobKey::playback(2)).unwrap();
    let playlist = s.media.join("playlists/channel_2/concat.txt");
    assert!(playback.argv.contains(&playlist.to_string_lossy().into_owned()));
    assert!(playback.argv.windows(2).any(|w| w == ["-c:v", "copy"]));

    let contents = std::fs::read_to_string(&playlist).unwrap();
    let expected: String = inside
        .iter()
        .map(|p| format!("file '{}'\n", p.display()))
        .collect();
    assert_eq!(contents, expected);
}

#[tokio::test]
async fn pruning_keeps_segments_playback_may_read() {
    let mut s = setup(DELAYED_CHANNEL_JSON);

    let old_dir = s.media.join("recordings/delayed/20250309");
    let old_starts: Vec<_> = (0..10).map(|m| at(9, 10, m, 0)).collect();
    let old = write_segments(&old_dir, "delayed", &old_starts);
    let recent = write_segments(
        &s.media.join("recordings/delayed/20250310"),
        "delayed",
        &[at(10, 11, 58, 0), at(10, 11, 59, 0)],
    );

    let stats = s.enforcer.tick().await.unwrap().pruned.unwrap();
    assert_eq!(stats.scanned, 12);
    assert_eq!(stats.deleted, 10);
    assert_eq!(stats.skipped_protected, 1);
    assert_eq!(stats.failed, 0);

    assert!(old.iter().all(|p| !p.exists()));
    assert!(recent.iter().all(|p| p.exists()));

    // Throttled until the prune interval elapses.
    s.clock.advance(TimeDelta::seconds(5));
    assert!(s.enforcer.tick().await.unwrap().pruned.is_none());
}

#[tokio::test]
async fn losing_the_config_source_stops_everything() {
    let mut s = setup(&live_channel_json("udp://127.0.0.1:5002"));
    s.enforcer.tick().await.unwrap();
    assert_eq!(s.processes.running().len(), 2);

    std::fs::remove_file(&s.channels_file).unwrap();
    let processes = s.processes.clone();
    let result = s.enforcer.run(CancellationToken::new()).await;

    assert!(matches!(result, Err(Error::IoPath { .. })));
    assert_eq!(processes.terminations().len(), 2);
}

#[tokio::test]
async fn schedule_end_stops_both_purposes() {
    let mut s = setup(&live_channel_json("udp://127.0.0.1:5002"));
    s.enforcer.tick().await.unwrap();

    s.clock.set(at(10, 20, 0, 0));
    let report = s.enforcer.tick().await.unwrap();

    assert_eq!(report.desired, 0);
    assert_eq!(report.stopped, 2);
    assert!(s.enforcer.job_keys().is_empty());
}
