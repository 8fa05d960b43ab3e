//! Codec arguments for record and live playback.
//!
//! Generator inputs have no compressed stream to copy, so they always encode,
//! with settings that let receivers join mid-stream.

use crate::domain::{AudioMode, ChannelConfig, VideoMode};

pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
pub const DEFAULT_AUDIO_CODEC: &str = "aac";

const GENERATOR_VIDEO_TUNING: &[&str] = &[
    "-preset",
    "veryfast",
    "-tune",
    "zerolatency",
    "-pix_fmt",
    "yuv420p",
    "-g",
    "50",
    "-x264-params",
    "repeat-headers=1",
];

const GENERATOR_AUDIO_TUNING: &[&str] = &["-b:a", "128k", "-ac", "2"];

fn extend(args: &mut Vec<String>, items: &[&str]) {
    args.extend(items.iter().map(|s| s.to_string()));
}

pub fn video_args(channel: &ChannelConfig) -> Vec<String> {
    let generator = channel.input.is_generator();
    let mut args = Vec::new();

    if !generator && channel.codec.video == VideoMode::Copy {
        extend(&mut args, &["-c:v", "copy"]);
        return args;
    }

    let codec = channel
        .codec
        .video_codec
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(DEFAULT_VIDEO_CODEC);
    extend(&mut args, &["-c:v", codec]);
    if generator {
        extend(&mut args, GENERATOR_VIDEO_TUNING);
    }
    args
}

pub fn audio_args(channel: &ChannelConfig) -> Vec<String> {
    let generator = channel.input.is_generator();
    let mut args = Vec::new();

    match channel.codec.audio {
        AudioMode::Disable => extend(&mut args, &["-an"]),
        AudioMode::Copy if !generator => extend(&mut args, &["-c:a", "copy"]),
        AudioMode::Copy | AudioMode::Encode => {
            let codec = channel
                .codec
                .audio_codec
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .unwrap_or(DEFAULT_AUDIO_CODEC);
            extend(&mut args, &["-c:a", codec]);
            if generator {
                extend(&mut args, GENERATOR_AUDIO_TUNING);
            }
        }
    }
    args
}

/// Video followed by audio arguments.
pub fn codec_args(channel: &ChannelConfig) -> Vec<String> {
    let mut args = video_args(channel);
    args.extend(audio_args(channel));
    args
}
