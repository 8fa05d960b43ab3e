//! On-disk layout of recorded segments.
//!
//! Segments live under `<media_root>/<expanded path template>/` and are named
//! `<channel>_<YYYYMMDD>-<HHMMSS>.ts`, the timestamp being the segment start.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use crate::domain::ChannelConfig;
use crate::utils::fs::resolve_under;

/// Extension of recorded segment files.
pub const SEGMENT_EXTENSION: &str = "ts";

/// strftime pattern embedded in segment filenames.
pub const SEGMENT_TIME_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Directory searched when the template-derived root does not exist.
pub const FALLBACK_RECORDINGS_DIR: &str = "recordings";

/// Expand `{channel}`, `{date}` and `{time}` in a path template.
///
/// Unknown placeholders are left untouched.
pub fn expand_path_template(template: &str, channel: &str, date: &str, time: &str) -> String {
    template
        .replace("{channel}", channel)
        .replace("{date}", date)
        .replace("{time}", time)
}

/// Directory a record job started at `now` writes into.
pub fn recording_dir(media_root: &Path, channel: &ChannelConfig, now: NaiveDateTime) -> PathBuf {
    let expanded = expand_path_template(
        &channel.recording.path_template,
        &channel.fs_name(),
        &now.format("%Y%m%d").to_string(),
        &now.format("%H%M%S").to_string(),
    );
    resolve_under(media_root, expanded)
}

/// Root under which all of a channel's segments are searched.
///
/// The template is expanded with empty date and time, so a template like
/// `recordings/{channel}/{date}/` yields `recordings/<channel>/`.
pub fn recording_root(media_root: &Path, channel: &ChannelConfig) -> PathBuf {
    let expanded = expand_path_template(&channel.recording.path_template, &channel.fs_name(), "", "");
    resolve_under(media_root, expanded)
}

/// Conventional root used when [`recording_root`] does not exist.
pub fn fallback_recording_root(media_root: &Path, channel: &ChannelConfig) -> PathBuf {
    media_root
        .join(FALLBACK_RECORDINGS_DIR)
        .join(channel.fs_name())
}

/// strftime output pattern handed to the segment muxer.
///
/// ffmpeg expands the whole path, so literal `%` in the directory or the
/// channel name is written as `%%`.
pub fn segment_pattern(dir: &Path, channel: &ChannelConfig) -> PathBuf {
    let dir = escape_strftime(&dir.to_string_lossy());
    PathBuf::from(dir).join(format!(
        "{}_{}.{}",
        escape_strftime(&channel.fs_name()),
        SEGMENT_TIME_FORMAT,
        SEGMENT_EXTENSION
    ))
}

fn escape_strftime(literal: &str) -> String {
    literal.replace('%', "%%")
}

/// Concrete filename of a segment starting at `start`.
pub fn segment_file_name(channel_fs_name: &str, start: NaiveDateTime) -> String {
    format!(
        "{}_{}.{}",
        channel_fs_name,
        start.format(SEGMENT_TIME_FORMAT),
        SEGMENT_EXTENSION
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn channel(name: &str, template: &str) -> ChannelConfig {
        let mut channel = ChannelConfig::test_channel(3, "udp://127.0.0.1:5002", NaiveDate::MIN);
        channel.name = name.to_string();
        channel.recording.path_template = template.to_string();
        channel
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 10)
            .unwrap()
            .and_hms_opt(8, 5, 9)
            .unwrap()
    }

    #[test]
    fn test_expand_path_template() {
        assert_eq!(
            expand_path_template("rec/{channel}/{date}/{time}/{other}", "a", "20250310", "080509"),
            "rec/a/20250310/080509/{other}"
        );
    }

    #[test]
    fn test_recording_dir_relative_and_absolute() {
        let root = Path::new("/srv/media");
        let ch = channel("News/HD", "recordings/{channel}/{date}/");
        assert_eq!(
            recording_dir(root, &ch, now()),
            PathBuf::from("/srv/media/recordings/News_HD/20250310/")
        );

        let abs = channel("news", "/data/{channel}");
        assert_eq!(recording_dir(root, &abs, now()), PathBuf::from("/data/news"));
    }

    #[test]
    fn test_recording_root_drops_date() {
        let ch = channel("news", "recordings/{channel}/{date}/");
        let root = recording_root(Path::new("/m"), &ch);
        assert_eq!(root.components().count(), Path::new("/m/recordings/news").components().count());
        assert!(root.starts_with("/m/recordings/news"));
        assert_eq!(
            fallback_recording_root(Path::new("/m"), &ch),
            PathBuf::from("/m/recordings/news")
        );
    }

    #[test]
    fn test_segment_names() {
        let ch = channel("news", "recordings/{channel}/");
        assert_eq!(
            segment_pattern(Path::new("/r"), &ch),
            PathBuf::from("/r/news_%Y%m%d-%H%M%S.ts")
        );
        assert_eq!(segment_file_name("news", now()), "news_20250310-080509.ts");
    }

    #[test]
    fn test_percent_in_name_survives_strftime() {
        use crate::recording::index::parse_segment_timestamp;
        use std::fmt::Write;

        let ch = channel("100%News", "recordings/{channel}/{date}/");
        let dir = recording_dir(Path::new("/m"), &ch, now());
        let pattern = segment_pattern(&dir, &ch);
        assert_eq!(
            pattern,
            PathBuf::from("/m/recordings/100%%News/20250310/100%%News_%Y%m%d-%H%M%S.ts")
        );

        let mut rendered = String::new();
        write!(rendered, "{}", now().format(&pattern.to_string_lossy())).unwrap();
        let rendered = PathBuf::from(rendered);
        assert_eq!(rendered, dir.join(segment_file_name(&ch.fs_name(), now())));

        let file_name = rendered.file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(parse_segment_timestamp(&ch.fs_name(), &file_name), Some(now()));
    }
}
