//! Input arguments per input variant.

use std::net::Ipv4Addr;
use std::path::Path;

use tracing::debug;

use super::stream_url::StreamUrl;
use crate::domain::InputSpec;
use crate::utils::fs::resolve_under;
use crate::{Error, Result};

/// Receive-buffer tuning added to multicast inputs, per key, unless set.
pub const MULTICAST_FIFO_PARAMS: &[(&str, &str)] =
    &[("fifo_size", "1000000"), ("overrun_nonfatal", "1")];

/// Synthetic input: test pattern and tone, paced in real time.
const GENERATOR_INPUT: &[&str] = &[
    "-re",
    "-f",
    "lavfi",
    "-i",
    "testsrc2=size=1280x720:rate=25",
    "-f",
    "lavfi",
    "-i",
    "sine=frequency=1000:sample_rate=48000",
    "-shortest",
    "-map",
    "0:v:0",
    "-map",
    "1:a:0",
];

/// Multicast input URL with receive tuning and an optional interface hint.
///
/// A URL that does not parse is passed through trimmed for ffmpeg to reject.
pub fn normalize_multicast_input(url: &str, interface: Option<&str>) -> String {
    let url = url.trim();
    let Some(mut parsed) = StreamUrl::parse(url) else {
        debug!(url, "Multicast input URL does not parse, passing through");
        return url.to_string();
    };

    for (key, value) in MULTICAST_FIFO_PARAMS {
        parsed.set_default(key, value);
    }

    if let Some(hint) = interface.map(str::trim).filter(|h| !h.is_empty()) {
        match hint.parse::<Ipv4Addr>() {
            Ok(addr) => parsed.set_default("localaddr", &addr.to_string()),
            Err(_) => debug!(interface = hint, "Ignoring non-IPv4 interface hint"),
        }
    }

    parsed.into_string()
}

fn required<'a>(value: &'a str, what: &str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::invalid_config(format!("{what} is empty")));
    }
    Ok(trimmed)
}

/// Input arguments for record and live playback.
pub fn input_args(input: &InputSpec, media_root: &Path) -> Result<Vec<String>> {
    let args = match input {
        InputSpec::InternalGenerator => GENERATOR_INPUT.iter().map(|s| s.to_string()).collect(),
        InputSpec::File { path } => {
            let path = resolve_under(media_root, required(path, "file input path")?);
            vec!["-i".to_string(), path.to_string_lossy().into_owned()]
        }
        InputSpec::UdpMulticast { url, interface } => {
            let url = required(url, "multicast input URL")?;
            vec![
                "-i".to_string(),
                normalize_multicast_input(url, interface.as_deref()),
            ]
        }
        InputSpec::Rtsp { url } => {
            vec!["-i".to_string(), required(url, "RTSP input URL")?.to_string()]
        }
        InputSpec::Rtmp { url } => {
            vec!["-i".to_string(), required(url, "RTMP input URL")?.to_string()]
        }
    };
    Ok(args)
}
