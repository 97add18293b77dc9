// FILE: src/core/uri.rs
//! Locator Codec
//!
//! A locator is the string we store on a synced file. It names one object
//! in the store. Three shapes are understood:
//! - `s3://bucket/key`
//! - virtual-hosted: `https://bucket.s3.<region>.amazonaws.com/key`
//! - path-style: `http(s)://host[:port]/bucket/key` (AWS or any S3-compatible endpoint)

use crate::error::{Result, SyncError};

const AMAZON_SUFFIX: &str = ".amazonaws.com";

/// The `{bucket, key}` pair a locator resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self { bucket: bucket.into(), key: key.into() }
    }
}

impl std::fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// Parse a locator into bucket and key. Never panics, never touches the network.
pub fn parse_locator(uri: &str) -> Result<ObjectLocation> {
    let uri = uri.trim();
    if uri.is_empty() {
        return Err(malformed(uri, "empty locator"));
    }

    let (scheme, rest) = uri.split_once("://")
        .ok_or_else(|| malformed(uri, "missing scheme"))?;

    // Drop query and fragment
    let rest = rest.split(['?', '#']).next().unwrap_or_default();

    let (bucket, raw_key) = match scheme.to_ascii_lowercase().as_str() {
        "s3" => {
            let (b, k) = rest.split_once('/').unwrap_or((rest, ""));
            (b.to_string(), k)
        }
        "http" | "https" => {
            let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
            let host = authority.rsplit('@').next().unwrap_or_default();
            let host = host.split(':').next().unwrap_or_default().to_ascii_lowercase();
            if host.is_empty() {
                return Err(malformed(uri, "missing host"));
            }

            match virtual_hosted_bucket(&host) {
                Some(bucket) => (bucket.to_string(), path),
                None => {
                    let (b, k) = path.split_once('/').unwrap_or((path, ""));
                    (b.to_string(), k)
                }
            }
        }
        other => return Err(malformed(uri, &format!("unsupported scheme '{}'", other))),
    };

    if bucket.is_empty() {
        return Err(malformed(uri, "missing bucket"));
    }
    if !bucket.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-') {
        return Err(malformed(uri, "invalid bucket name"));
    }

    let key = percent_decode(raw_key)
        .ok_or_else(|| malformed(uri, "invalid percent-encoding in key"))?;
    if key.is_empty() {
        return Err(malformed(uri, "missing key"));
    }

    Ok(ObjectLocation { bucket: bucket.to_ascii_lowercase(), key })
}

/// Path-style object URL for `bucket/key` under `endpoint`.
pub fn object_url(endpoint: &str, bucket: &str, key: &str) -> String {
    format!("{}/{}/{}", endpoint.trim_end_matches('/'), bucket, encode_key(key))
}

/// Percent-encode every segment of a key, keeping the `/` separators.
pub fn encode_key(key: &str) -> String {
    key.split('/')
        .map(encode_segment)
        .collect::<Vec<_>>()
        .join("/")
}

fn encode_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => out.push(byte as char),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

fn percent_decode(input: &str) -> Option<String> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = input.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

/// `bucket.s3.amazonaws.com`, `bucket.s3.eu-west-1.amazonaws.com`, `bucket.s3-eu-west-1.amazonaws.com`.
/// Plain regional endpoints (`s3.eu-west-1.amazonaws.com`) are path-style and return None.
fn virtual_hosted_bucket(host: &str) -> Option<&str> {
    if !host.ends_with(AMAZON_SUFFIX) {
        return None;
    }
    let idx = host.find(".s3.").or_else(|| host.find(".s3-"))?;
    if idx == 0 {
        return None;
    }
    Some(&host[..idx])
}

fn malformed(uri: &str, reason: &str) -> SyncError {
    SyncError::MalformedInput(format!("locator '{}': {}", uri, reason))
}
