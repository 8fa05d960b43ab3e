//! Turns channel configuration into ffmpeg invocations.
//!
//! [`CommandBuilder::build`] is a pure planning step: it reads the segment
//! index but never writes. The returned [`JobCommand`] carries the
//! directories and playlist that must exist before the process starts, and
//! [`JobCommand::prepare`] materialises them.

pub mod codec;
pub mod input;
pub mod output;
pub mod playlist;
pub mod stream_url;

use std::path::PathBuf;

use chrono::{NaiveDateTime, TimeDelta};
use tracing::debug;

use crate::domain::{ChannelConfig, ChannelId, JobPurpose, PlaybackMode, TimeShiftProfile};
use crate::recording::layout::{recording_dir, segment_pattern};
use crate::recording::{DirLister, FsLister, SegmentIndex};
use crate::utils::filename::sanitize_log_component;
use crate::utils::fs::{ensure_dir_all, resolve_under, write_file};
use crate::{Error, Result};

/// Directory under the media root receiving child-process logs.
pub const PROCESS_LOG_DIR: &str = "ffmpeg_logs";

/// Playlist filename inside a channel's scratch directory.
pub const PLAYLIST_FILE_NAME: &str = "concat.txt";

/// Arguments every invocation starts with after the program name.
const GLOBAL_ARGS: &[&str] = &["-y", "-hide_banner", "-loglevel", "warning"];

/// Settings shared by every command built.
#[derive(Debug, Clone)]
pub struct CommandSettings {
    /// ffmpeg executable.
    pub ffmpeg_path: String,
    pub media_root: PathBuf,
    /// Scratch directory for playlists, relative to the media root unless absolute.
    pub scratch_dir: PathBuf,
    /// How far back before the delayed target a playlist may reach.
    pub playback_window: TimeDelta,
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            media_root: PathBuf::from("media"),
            scratch_dir: PathBuf::from("playlists"),
            playback_window: TimeDelta::hours(3),
        }
    }
}

/// A side effect a command needs before it can run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrepareAction {
    CreateDir(PathBuf),
    WritePlaylist { path: PathBuf, contents: String },
}

/// A built invocation and what must exist before it is spawned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobCommand {
    pub purpose: JobPurpose,
    /// Full argument vector, program first.
    pub argv: Vec<String>,
    pub prepare: Vec<PrepareAction>,
}

impl JobCommand {
    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }

    pub fn args(&self) -> &[String] {
        self.argv.get(1..).unwrap_or_default()
    }

    /// Create directories and write playlists this command depends on.
    pub fn prepare(&self) -> Result<()> {
        for action in &self.prepare {
            match action {
                PrepareAction::CreateDir(dir) => ensure_dir_all(dir)?,
                PrepareAction::WritePlaylist { path, contents } => {
                    write_file(path, contents)?;
                    debug!(path = %path.display(), "Wrote playlist");
                }
            }
        }
        Ok(())
    }

    /// Argument vector as a copy-pasteable shell line.
    pub fn to_shell_string(&self) -> String {
        self.argv
            .iter()
            .map(|arg| shell_quote(arg))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c));
    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Builds record and playback commands for channels.
#[derive(Debug, Clone)]
pub struct CommandBuilder<L = FsLister> {
    settings: CommandSettings,
    index: SegmentIndex<L>,
}

impl CommandBuilder<FsLister> {
    pub fn new(settings: CommandSettings) -> Self {
        let index = SegmentIndex::new(settings.media_root.clone());
        Self { settings, index }
    }
}

impl<L: DirLister> CommandBuilder<L> {
    pub fn with_index(settings: CommandSettings, index: SegmentIndex<L>) -> Self {
        Self { settings, index }
    }

    pub fn settings(&self) -> &CommandSettings {
        &self.settings
    }

    /// Scratch playlist path for a channel.
    pub fn playlist_path(&self, channel_id: ChannelId) -> PathBuf {
        resolve_under(&self.settings.media_root, &self.settings.scratch_dir)
            .join(format!("channel_{channel_id}"))
            .join(PLAYLIST_FILE_NAME)
    }

    /// Log file receiving a job's stdout and stderr.
    pub fn log_path(&self, channel: &ChannelConfig, purpose: JobPurpose) -> PathBuf {
        self.settings
            .media_root
            .join(PROCESS_LOG_DIR)
            .join(format!("{}_{}.log", sanitize_log_component(&channel.name), purpose))
    }

    /// Plan the invocation for `purpose` at `now` without touching disk.
    ///
    /// Fails with `NotReady` when a time-shift window has no segments yet and
    /// with `InvalidConfig` when a field the purpose needs is missing or out
    /// of range.
    pub fn build(
        &self,
        channel: &ChannelConfig,
        profile: Option<&TimeShiftProfile>,
        purpose: JobPurpose,
        now: NaiveDateTime,
    ) -> Result<JobCommand> {
        channel.validate()?;

        let mut argv = vec![self.settings.ffmpeg_path.clone()];
        argv.extend(GLOBAL_ARGS.iter().map(|s| s.to_string()));

        let prepare = match purpose {
            JobPurpose::Record => self.record_args(channel, now, &mut argv)?,
            JobPurpose::Playback => self.playback_args(channel, profile, now, &mut argv)?,
        };

        Ok(JobCommand {
            purpose,
            argv,
            prepare,
        })
    }

    /// [`build`](Self::build) followed by [`JobCommand::prepare`].
    pub fn build_and_prepare(
        &self,
        channel: &ChannelConfig,
        profile: Option<&TimeShiftProfile>,
        purpose: JobPurpose,
        now: NaiveDateTime,
    ) -> Result<JobCommand> {
        let command = self.build(channel, profile, purpose, now)?;
        command.prepare()?;
        Ok(command)
    }

    fn record_args(
        &self,
        channel: &ChannelConfig,
        now: NaiveDateTime,
        argv: &mut Vec<String>,
    ) -> Result<Vec<PrepareAction>> {
        argv.extend(input::input_args(&channel.input, &self.settings.media_root)?);
        argv.extend(codec::codec_args(channel));

        let dir = recording_dir(&self.settings.media_root, channel, now);
        let segment_seconds = u64::from(channel.recording.segment_minutes) * 60;
        argv.extend([
            "-f".to_string(),
            "segment".to_string(),
            "-segment_time".to_string(),
            segment_seconds.to_string(),
            "-reset_timestamps".to_string(),
            "1".to_string(),
            "-strftime".to_string(),
            "1".to_string(),
            segment_pattern(&dir, channel).to_string_lossy().into_owned(),
        ]);

        Ok(vec![PrepareAction::CreateDir(dir)])
    }

    fn playback_args(
        &self,
        channel: &ChannelConfig,
        profile: Option<&TimeShiftProfile>,
        now: NaiveDateTime,
        argv: &mut Vec<String>,
    ) -> Result<Vec<PrepareAction>> {
        // Resolve the output first so a bad target fails before any scan.
        let output = output::output_args(&channel.output)?;

        if let Some(profile) = profile.filter(|p| p.enabled) {
            profile.validate()?;
        }

        match TimeShiftProfile::mode(profile) {
            PlaybackMode::Live => {
                argv.extend(input::input_args(&channel.input, &self.settings.media_root)?);
                argv.extend(codec::codec_args(channel));
                argv.extend(output);
                Ok(Vec::new())
            }
            PlaybackMode::TimeShift(delay) => {
                let target = now - delay;
                let start = target - self.settings.playback_window;
                let segments = self.index.select_window(channel, start, target)?;

                if segments.is_empty() {
                    return Err(Error::not_ready(format!(
                        "no segments for {} between {} and {} (delay={}s); recording may still be warming up",
                        channel.label(),
                        start,
                        target,
                        delay.num_seconds()
                    )));
                }

                let playlist = self.playlist_path(channel.id);
                argv.extend([
                    "-re".to_string(),
                    "-f".to_string(),
                    "concat".to_string(),
                    "-safe".to_string(),
                    "0".to_string(),
                    "-i".to_string(),
                    playlist.to_string_lossy().into_owned(),
                    "-c:v".to_string(),
                    "copy".to_string(),
                    "-c:a".to_string(),
                    "copy".to_string(),
                ]);
                argv.extend(output);

                Ok(vec![PrepareAction::WritePlaylist {
                    path: playlist,
                    contents: playlist::render_concat_list(&segments),
                }])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AudioMode, InputSpec, OutputSpec, VideoMode};
    use crate::recording::FileEntry;
    use crate::recording::layout::segment_file_name;
    use chrono::NaiveDate;
    use parking_lot::Mutex;
    use std::io;
    use std::path::Path;
    use std::sync::Arc;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 10)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn channel() -> ChannelConfig {
        let mut channel = ChannelConfig::test_channel(4, "udp://239.1.1.1:5000", NaiveDate::MIN);
        channel.name = "news".into();
        channel.input = InputSpec::UdpMulticast {
            url: "udp://@239.0.0.1:5000".into(),
            interface: None,
        };
        channel.recording.segment_minutes = 10;
        channel
    }

    fn delay(seconds: u32) -> TimeShiftProfile {
        TimeShiftProfile {
            enabled: true,
            delay_seconds: seconds,
        }
    }

    fn settings(root: &Path) -> CommandSettings {
        CommandSettings {
            media_root: root.to_path_buf(),
            ..CommandSettings::default()
        }
    }

    /// Lister that counts how often it is consulted.
    #[derive(Clone, Default)]
    struct CountingLister {
        calls: Arc<Mutex<usize>>,
        files: Vec<FileEntry>,
    }

    impl DirLister for CountingLister {
        fn exists(&self, _path: &Path) -> bool {
            *self.calls.lock() += 1;
            true
        }

        fn list_files(&self, _root: &Path, _extension: &str) -> io::Result<Vec<FileEntry>> {
            *self.calls.lock() += 1;
            Ok(self.files.clone())
        }
    }

    fn counting_builder(files: Vec<FileEntry>) -> (CommandBuilder<CountingLister>, Arc<Mutex<usize>>) {
        let lister = CountingLister {
            files,
            ..Default::default()
        };
        let calls = lister.calls.clone();
        let settings = settings(Path::new("/srv/media"));
        let index = SegmentIndex::with_lister(settings.media_root.clone(), lister);
        (CommandBuilder::with_index(settings, index), calls)
    }

    #[test]
    fn test_record_command() {
        let builder = CommandBuilder::new(settings(Path::new("/srv/media")));
        let command = builder
            .build(&channel(), None, JobPurpose::Record, now())
            .unwrap();

        assert_eq!(
            command.argv,
            vec![
                "ffmpeg",
                "-y",
                "-hide_banner",
                "-loglevel",
                "warning",
                "-i",
                "udp://@239.0.0.1:5000?fifo_size=1000000&overrun_nonfatal=1",
                "-c:v",
                "copy",
                "-c:a",
                "copy",
                "-f",
                "segment",
                "-segment_time",
                "600",
                "-reset_timestamps",
                "1",
                "-strftime",
                "1",
                "/srv/media/recordings/news/20250310/news_%Y%m%d-%H%M%S.ts",
            ]
        );
        assert_eq!(
            command.prepare,
            vec![PrepareAction::CreateDir(PathBuf::from(
                "/srv/media/recordings/news/20250310/"
            ))]
        );
    }

    #[test]
    fn test_live_playback_never_reads_index() {
        for profile in [None, Some(delay(0)), Some(TimeShiftProfile {
            enabled: false,
            delay_seconds: 3600,
        })] {
            let (builder, calls) = counting_builder(Vec::new());
            let command = builder
                .build(&channel(), profile.as_ref(), JobPurpose::Playback, now())
                .unwrap();

            assert_eq!(*calls.lock(), 0);
            assert!(command.prepare.is_empty());
            assert_eq!(
                command.argv.last().unwrap(),
                "udp://239.1.1.1:5000?pkt_size=1316&ttl=16"
            );
            assert!(command.argv.contains(&"+resend_headers".to_string()));
        }
    }

    #[test]
    fn test_time_shift_without_segments_is_not_ready() {
        let (builder, calls) = counting_builder(Vec::new());
        let err = builder
            .build(&channel(), Some(&delay(3600)), JobPurpose::Playback, now())
            .unwrap_err();

        assert!(matches!(err, Error::NotReady(_)));
        assert!(*calls.lock() > 0);
    }

    #[test]
    fn test_time_shift_window_excludes_newer_segments() {
        let at = |h, m| now().date().and_hms_opt(h, m, 0).unwrap();
        let files = [at(8, 0), at(9, 0), at(10, 50), at(11, 0), at(11, 30)]
            .iter()
            .map(|t| FileEntry {
                path: PathBuf::from("/srv/media/recordings/news").join(segment_file_name("news", *t)),
                modified: None,
            })
            .collect();
        let (builder, _) = counting_builder(files);

        // Target 11:00, window 3h: 08:00 ..= 11:00.
        let command = builder
            .build(&channel(), Some(&delay(3600)), JobPurpose::Playback, now())
            .unwrap();

        let [PrepareAction::WritePlaylist { path, contents }] = command.prepare.as_slice() else {
            panic!("expected a playlist action, got {:?}", command.prepare);
        };
        assert_eq!(path, &PathBuf::from("/srv/media/playlists/channel_4/concat.txt"));
        assert_eq!(contents.lines().count(), 4);
        assert!(contents.starts_with("file '/srv/media/recordings/news/news_20250310-080000.ts'\n"));
        assert!(!contents.contains("113000"));

        let i = command.argv.iter().position(|a| a == "concat").unwrap();
        assert_eq!(command.argv[i - 2], "-re");
        assert_eq!(command.argv[i + 4], path.to_string_lossy());
    }

    #[test]
    fn test_time_shift_delay_out_of_range() {
        let (builder, calls) = counting_builder(Vec::new());
        let err = builder
            .build(&channel(), Some(&delay(86_401)), JobPurpose::Playback, now())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        assert_eq!(*calls.lock(), 0);
    }

    #[test]
    fn test_playback_requires_network_output() {
        let (builder, _) = counting_builder(Vec::new());
        let mut ch = channel();
        ch.output = OutputSpec::File {
            target: "out.ts".into(),
        };
        let err = builder
            .build(&ch, None, JobPurpose::Playback, now())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));

        // Record does not care about the output.
        assert!(builder.build(&ch, None, JobPurpose::Record, now()).is_ok());
    }

    #[test]
    fn test_live_playback_reuses_codec_choice() {
        let (builder, _) = counting_builder(Vec::new());
        let mut ch = channel();
        ch.codec.video = VideoMode::Encode;
        ch.codec.audio = AudioMode::Disable;

        let command = builder.build(&ch, None, JobPurpose::Playback, now()).unwrap();
        let joined = command.argv.join(" ");
        assert!(joined.contains("-c:v libx264 -an -f mpegts"));
    }

    #[test]
    fn test_build_is_side_effect_free_until_prepare() {
        let dir = tempfile::tempdir().unwrap();
        let builder = CommandBuilder::new(settings(dir.path()));
        let ch = channel();

        let command = builder.build(&ch, None, JobPurpose::Record, now()).unwrap();
        let record_dir = dir.path().join("recordings/news/20250310");
        assert!(!record_dir.exists());

        command.prepare().unwrap();
        assert!(record_dir.is_dir());
    }

    #[test]
    fn test_build_and_prepare_writes_playlist() {
        let dir = tempfile::tempdir().unwrap();
        let builder = CommandBuilder::new(settings(dir.path()));
        let ch = channel();

        let rec = dir.path().join("recordings/news/20250310");
        std::fs::create_dir_all(&rec).unwrap();
        let seg_time = now() - TimeDelta::minutes(90);
        std::fs::write(rec.join(segment_file_name("news", seg_time)), b"ts").unwrap();

        let command = builder
            .build_and_prepare(&ch, Some(&delay(3600)), JobPurpose::Playback, now())
            .unwrap();
        assert!(builder.playlist_path(ch.id).starts_with(dir.path()));

        let written = std::fs::read_to_string(builder.playlist_path(ch.id)).unwrap();
        assert_eq!(written.lines().count(), 1);
        assert!(written.contains("news_20250310-103000.ts"));
        assert_eq!(command.program(), "ffmpeg");
    }

    #[test]
    fn test_log_path_sanitized() {
        let builder = CommandBuilder::new(settings(Path::new("/srv/media")));
        let mut ch = channel();
        ch.name = "News HD/1".into();
        assert_eq!(
            builder.log_path(&ch, JobPurpose::Playback),
            PathBuf::from("/srv/media/ffmpeg_logs/News_HD_1_playback.log")
        );
    }

    #[test]
    fn test_shell_string() {
        let command = JobCommand {
            purpose: JobPurpose::Record,
            argv: vec!["ffmpeg".into(), "-i".into(), "a b.ts".into()],
            prepare: Vec::new(),
        };
        assert_eq!(command.to_shell_string(), "ffmpeg -i 'a b.ts'");
        assert_eq!(command.args(), &["-i".to_string(), "a b.ts".to_string()]);
    }
}
