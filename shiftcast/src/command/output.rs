//! Playback output normalisation and muxer arguments.

use super::stream_url::StreamUrl;
use crate::domain::OutputSpec;
use crate::{Error, Result};

/// MPEG-TS packet payload size most receivers expect (7 x 188 bytes).
pub const UDP_PACKET_SIZE: u32 = 1316;

/// TTL appended to multicast outputs that do not set one.
pub const MULTICAST_TTL: u32 = 16;

/// Add `pkt_size` to UDP targets and a TTL to multicast ones, unless set.
///
/// Anything that is not a parseable `udp://` URL is returned trimmed.
pub fn normalize_output_url(target: &str) -> String {
    let target = target.trim();
    let Some(mut url) = StreamUrl::parse(target).filter(|url| url.scheme() == "udp") else {
        return target.to_string();
    };

    url.set_default("pkt_size", &UDP_PACKET_SIZE.to_string());
    if url.ipv4_host().is_some_and(|ip| ip.is_multicast()) {
        url.set_default("ttl", &MULTICAST_TTL.to_string());
    }

    url.into_string()
}

/// Muxer arguments followed by the normalized target for a playback output.
pub fn output_args(output: &OutputSpec) -> Result<Vec<String>> {
    let target = output.target().ok_or_else(|| {
        Error::invalid_config(format!("{} output has no target", output.as_str()))
    })?;

    let args = match output {
        OutputSpec::UdpTs { .. } => vec![
            "-f".to_string(),
            "mpegts".to_string(),
            "-mpegts_flags".to_string(),
            "+resend_headers".to_string(),
            "-muxdelay".to_string(),
            "0".to_string(),
            "-muxpreload".to_string(),
            "0".to_string(),
            normalize_output_url(target),
        ],
        OutputSpec::Rtmp { .. } => vec!["-f".to_string(), "flv".to_string(), target.to_string()],
        OutputSpec::Hls { .. } | OutputSpec::File { .. } => {
            return Err(Error::invalid_config(format!(
                "playback cannot write to a {} output; use udp_ts or rtmp",
                output.as_str()
            )));
        }
    };
    Ok(args)
}
