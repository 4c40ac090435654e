// * Tracking Payload Extraction & Visitor Identity
// * Pulls the beacon query string out of an access log line

use sha2::{Digest, Sha256};
use std::fmt;

use crate::config::constants::{DIG_MARKER, HTTP_VERSION_MARKER};

/// Decoded beacon query parameters
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrackingPayload {
    pub time: String,
    pub url: String,
    pub refer: String,
    pub ua: String,
}

impl TrackingPayload {
    /// Extracts the payload from one log line
    ///
    /// Lines without the beacon marker yield an empty payload. Missing keys are
    /// empty strings; for repeated keys the first value wins.
    pub fn extract(line: &str) -> Self {
        // * Only the tail is trimmed; the marker itself starts with a space
        let line = line.trim_end();
        let Some(pos) = line.find(DIG_MARKER) else {
            return Self::default();
        };

        let rest = &line[pos + DIG_MARKER.len()..];
        let query = match rest.find(HTTP_VERSION_MARKER) {
            Some(end) => &rest[..end],
            None => rest,
        };

        let mut payload = Self::default();
        let mut seen = [false; 4];
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            let (slot, field) = match &*key {
                "time" => (0, &mut payload.time),
                "url" => (1, &mut payload.url),
                "refer" => (2, &mut payload.refer),
                "ua" => (3, &mut payload.ua),
                _ => continue,
            };
            if !seen[slot] {
                seen[slot] = true;
                *field = value.into_owned();
            }
        }
        payload
    }

    /// True when the line carried no usable beacon data
    pub fn is_empty(&self) -> bool {
        self.time.is_empty() && self.url.is_empty() && self.refer.is_empty() && self.ua.is_empty()
    }

    pub fn visitor_id(&self) -> VisitorId {
        VisitorId::derive(&self.refer, &self.ua)
    }
}

/// Pseudo-identity of a visitor: lowercase hex SHA-256 of referrer ++ user agent
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VisitorId(String);

impl VisitorId {
    pub fn derive(refer: &str, ua: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(refer.as_bytes());
        hasher.update(ua.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VisitorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
