//! Query-parameter defaults for ffmpeg stream URLs.

use std::net::Ipv4Addr;

use url::Url;

/// ffmpeg's `udp://@group:port` listen form. An empty userinfo does not
/// survive `Url` serialisation, so the marker is stripped and restored.
const UDP_LISTEN_PREFIX: &str = "udp://@";

/// A parsed stream URL that only ever gains missing query parameters.
#[derive(Debug, Clone)]
pub struct StreamUrl {
    raw: String,
    url: Url,
    listen: bool,
    changed: bool,
}

impl StreamUrl {
    /// Parse a trimmed URL. `None` when it is not a valid absolute URL.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let (listen, candidate) = match raw.strip_prefix(UDP_LISTEN_PREFIX) {
            Some(rest) => (true, format!("udp://{rest}")),
            None => (false, raw.to_string()),
        };
        let url = Url::parse(&candidate).ok()?;

        Some(Self {
            raw: raw.to_string(),
            url,
            listen,
            changed: false,
        })
    }

    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    /// Host as an IPv4 address, if it is an IPv4 literal.
    pub fn ipv4_host(&self) -> Option<Ipv4Addr> {
        self.url.host_str()?.parse().ok()
    }

    pub fn has_param(&self, key: &str) -> bool {
        self.url.query_pairs().any(|(existing, _)| existing == key)
    }

    /// Append `key=value` unless `key` is already present.
    pub fn set_default(&mut self, key: &str, value: &str) {
        if self.has_param(key) {
            return;
        }
        self.url.query_pairs_mut().append_pair(key, value);
        self.changed = true;
    }

    /// The edited URL, or the trimmed input verbatim when nothing was added.
    pub fn into_string(self) -> String {
        if !self.changed {
            return self.raw;
        }
        let serialized = self.url.to_string();
        match (self.listen, serialized.strip_prefix("udp://")) {
            (true, Some(rest)) => format!("{UDP_LISTEN_PREFIX}{rest}"),
            _ => serialized,
        }
    }
}
