//! Server label namespace and its DNS-safe annotation encoding
//!
//! Workspace containers describe their servers with labels such as
//! `che:server:4401/tcp:ref=wsagent`. Platform annotation keys only accept
//! alphanumerics, `.`, `-` and `_`, and must start and end with an
//! alphanumeric character, so labels stored on a Service are encoded:
//!
//! - keys: `:` becomes `.`, `/` becomes `-`
//! - values: `/` becomes `.`
//! - both are wrapped in `0…0`
//!
//! `che:server:4401/tcp:path=/api` is stored as
//! `0che.server.4401-tcp.path0=0.api0`. Characters that the mapping would
//! otherwise make ambiguous (`.`, `-`, `_` in the source text) are escaped
//! with `_`, so decoding restores exactly what was encoded.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::debug;

/// Prefix shared by all server labels
pub const SERVER_LABEL_PREFIX: &str = "che:server";

const PADDING: &str = "0";
const ESCAPE: char = '_';

fn padded_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^0(.*)0$").expect("padding pattern is valid"))
}

/// Field of a per-port server label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerLabelField {
    Ref,
    Protocol,
    Path,
}

impl ServerLabelField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerLabelField::Ref => "ref",
            ServerLabelField::Protocol => "protocol",
            ServerLabelField::Path => "path",
        }
    }
}

/// Build `che:server:<port>:<field>`, where `port` is either a
/// "port/protocol" token or a bare port number
pub fn server_label_key(port: &str, field: ServerLabelField) -> String {
    format!("{}:{}:{}", SERVER_LABEL_PREFIX, port, field.as_str())
}

/// Keep only labels under the server namespace
pub fn server_labels<'a, I>(labels: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    labels
        .into_iter()
        .filter(|(key, _)| key.starts_with(SERVER_LABEL_PREFIX))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Encode labels into DNS-safe annotations, skipping null values
pub fn encode(labels: &BTreeMap<String, Option<String>>) -> BTreeMap<String, String> {
    labels
        .iter()
        .filter_map(|(key, value)| {
            value
                .as_ref()
                .map(|value| (encode_key(key), encode_value(value)))
        })
        .collect()
}

/// Decode annotations produced by [`encode`]; anything else is ignored
pub fn decode(annotations: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    for (key, value) in annotations {
        match (decode_key(key), decode_value(value)) {
            (Some(key), Some(value)) => {
                labels.insert(key, value);
            }
            _ => debug!(annotation = %key, "Skipping annotation that is not an encoded label"),
        }
    }
    labels
}

/// `che:server:4401/tcp:ref` -> `0che.server.4401-tcp.ref0`
pub fn encode_key(key: &str) -> String {
    pad(&escape(key, |c| match c {
        ':' => Some('.'),
        '/' => Some('-'),
        _ => None,
    }))
}

/// `/api` -> `0.api0`
pub fn encode_value(value: &str) -> String {
    pad(&escape(value, |c| match c {
        '/' => Some('.'),
        _ => None,
    }))
}

/// Inverse of [`encode_key`]; `None` when the padding is missing
pub fn decode_key(name: &str) -> Option<String> {
    let inner = unpad(name)?;
    Some(unescape(inner, |c| match c {
        '.' => Some(':'),
        '-' => Some('/'),
        _ => None,
    }))
}

/// Inverse of [`encode_value`]; `None` when the padding is missing
pub fn decode_value(value: &str) -> Option<String> {
    let inner = unpad(value)?;
    Some(unescape(inner, |c| match c {
        '.' => Some('/'),
        _ => None,
    }))
}

fn pad(s: &str) -> String {
    format!("{PADDING}{s}{PADDING}")
}

fn unpad(s: &str) -> Option<&str> {
    padded_pattern()
        .captures(s)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

fn escape(input: &str, map: impl Fn(char) -> Option<char>) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if let Some(mapped) = map(c) {
            out.push(mapped);
            continue;
        }
        match c {
            ESCAPE => out.push_str("__"),
            '.' => out.push_str("_d"),
            '-' => out.push_str("_h"),
            _ => out.push(c),
        }
    }
    out
}

fn unescape(input: &str, map: impl Fn(char) -> Option<char>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        if c == ESCAPE {
            match chars.next() {
                Some(ESCAPE) => out.push(ESCAPE),
                Some('d') => out.push('.'),
                Some('h') => out.push('-'),
                Some(other) => {
                    out.push(ESCAPE);
                    out.push(other);
                }
                None => out.push(ESCAPE),
            }
        } else {
            out.push(map(c).unwrap_or(c));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(entries: &[(&str, Option<&str>)]) -> BTreeMap<String, Option<String>> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.map(str::to_string)))
            .collect()
    }

    #[test]
    fn test_encodes_server_label_like_the_wire_format() {
        assert_eq!(encode_key("che:server:4401/tcp:ref"), "0che.server.4401-tcp.ref0");
        assert_eq!(encode_value("/api"), "0.api0");
        assert_eq!(encode_value("wsagent"), "0wsagent0");
    }

    #[test]
    fn test_round_trip_restores_labels() {
        let input = labels(&[
            ("che:server:4401/tcp:ref", Some("wsagent")),
            ("che:server:4401/tcp:path", Some("/api")),
            ("che:server:8080:protocol", Some("http")),
            ("org.example/build-id", Some("v1.2_rc-3")),
            ("empty", Some("")),
        ]);

        let decoded = decode(&encode(&input));
        let expected: BTreeMap<String, String> = input
            .into_iter()
            .map(|(k, v)| (k, v.unwrap()))
            .collect();
        assert_eq!(decoded, expected);
    }

    #[test]
    fn test_null_values_are_not_encoded() {
        let input = labels(&[("che:server:4401/tcp:ref", None), ("keep", Some("yes"))]);
        let encoded = encode(&input);
        assert_eq!(encoded.len(), 1);
        assert!(encoded.contains_key("0keep0"));
    }

    #[test]
    fn test_decode_drops_foreign_annotations() {
        let mut annotations = BTreeMap::new();
        annotations.insert("openshift.io/generated-by".to_string(), "0x0".to_string());
        annotations.insert("0che.server.22-tcp.ref0".to_string(), "sshd".to_string());
        annotations.insert("0che.server.22-tcp.protocol0".to_string(), "0ssh0".to_string());

        let decoded = decode(&annotations);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded["che:server:22/tcp:protocol"], "ssh");
    }

    #[test]
    fn test_server_labels_filter() {
        let mut all = BTreeMap::new();
        all.insert("che:server:4401/tcp:ref".to_string(), "wsagent".to_string());
        all.insert("maintainer".to_string(), "someone".to_string());

        let filtered = server_labels(&all);
        assert_eq!(filtered.len(), 1);
        assert!(filtered.contains_key("che:server:4401/tcp:ref"));
    }

    #[test]
    fn test_server_label_key_with_bare_port() {
        assert_eq!(
            server_label_key("4401", ServerLabelField::Path),
            "che:server:4401:path"
        );
    }
}
