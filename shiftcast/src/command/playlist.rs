//! Concat playlists for time-shift playback.

use std::path::Path;

use crate::recording::RecordedSegment;

/// Quote a path for the concat demuxer: single quotes, with embedded
/// quotes written as `'\''`.
pub fn quote_concat_path(path: &Path) -> String {
    let raw = path.to_string_lossy();
    format!("'{}'", raw.replace('\'', r"'\''"))
}

/// One `file '<path>'` line per segment, in the given order.
pub fn render_concat_list(segments: &[RecordedSegment]) -> String {
    let mut body = String::new();
    for segment in segments {
        body.push_str("file ");
        body.push_str(&quote_concat_path(&segment.path));
        body.push('\n');
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::TimestampSource;
    use chrono::NaiveDate;
    use std::path::PathBuf;

    #[test]
    fn test_quote_concat_path() {
        assert_eq!(quote_concat_path(Path::new("/r/a b.ts")), "'/r/a b.ts'");
        assert_eq!(
            quote_concat_path(Path::new("/r/it's.ts")),
            r"'/r/it'\''s.ts'"
        );
    }

    #[test]
    fn test_render_concat_list() {
        let timestamp = NaiveDate::from_ymd_opt(2025, 3, 10)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap();
        let segments: Vec<_> = ["/r/1.ts", "/r/2.ts"]
            .iter()
            .map(|p| RecordedSegment {
                timestamp,
                path: PathBuf::from(p),
                source: TimestampSource::FileName,
            })
            .collect();

        assert_eq!(
            render_concat_list(&segments),
            "file '/r/1.ts'\nfile '/r/2.ts'\n"
        );
    }
}
