use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref RE_ATTRIBUTE: Regex = Regex::new(r#"([A-Za-z0-9_-]+)="([^"]*)""#).unwrap();
    static ref RE_LINE_BREAK: Regex = Regex::new(r"\r\n|\r|\n").unwrap();
}

/// `key="value"` pairs found on an `#EXTINF` line (`group-title`, `tvg-country`, ...).
pub type Attributes = BTreeMap<String, String>;

/// A playable entry. Two channels are equal when name and url match;
/// attributes are informational only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: Attributes,
}

impl Channel {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            attributes: Attributes::new(),
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

impl PartialEq for Channel {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.url == other.url
    }
}

impl Eq for Channel {}

/// Channels parsed from one playlist source, in order of appearance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Catalog {
    source: String,
    channels: Vec<Channel>,
}

impl Catalog {
    pub fn new(source: impl Into<String>, channels: Vec<Channel>) -> Self {
        Self {
            source: source.into(),
            channels,
        }
    }

    pub fn from_m3u(source: impl Into<String>, content: &str) -> Self {
        Self::new(source, parse_m3u(content))
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Channel> {
        self.channels.iter()
    }
}

impl<'a> IntoIterator for &'a Catalog {
    type Item = &'a Channel;
    type IntoIter = std::slice::Iter<'a, Channel>;

    fn into_iter(self) -> Self::IntoIter {
        self.channels.iter()
    }
}

fn is_stream_url(candidate: &str) -> bool {
    candidate.starts_with("http")
}

fn parse_extinf(line: &str) -> (String, Attributes) {
    // The display name follows the last comma; attributes live in front of it.
    let (head, name) = match line.rsplit_once(',') {
        Some((head, name)) => (head, name),
        None => (line, line),
    };

    let attributes = RE_ATTRIBUTE
        .captures_iter(head)
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
        .collect();

    (name.trim().to_string(), attributes)
}

/// Extracts `#EXTINF` / URL pairs. A metadata line whose next line is missing
/// or does not look like an http(s) URL is skipped. `\n`, `\r\n` and a bare
/// `\r` all end a line.
pub fn parse_m3u(content: &str) -> Vec<Channel> {
    let lines: Vec<&str> = RE_LINE_BREAK.split(content).collect();
    let mut channels = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        if !line.starts_with("#EXTINF") {
            continue;
        }

        let url = lines.get(i + 1).map(|next| next.trim()).unwrap_or("");
        if !is_stream_url(url) {
            continue;
        }

        let (name, attributes) = parse_extinf(line);
        channels.push(Channel {
            name,
            url: url.to_string(),
            attributes,
        });
    }

    channels
}
