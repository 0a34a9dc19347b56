//! Request and response model shared by the fetch client and the cache engine.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use rampart_core::CacheEntry;
use rampart_core::cache::hash::compute_cache_key;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use url::Url;

/// Declared resource type of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    /// Full-page navigation.
    Document,
    Image,
    Script,
    Style,
    Font,
    Manifest,
    /// Programmatic fetch with no declared destination.
    #[default]
    Empty,
}

impl FromStr for Destination {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "document" | "navigate" => Ok(Destination::Document),
            "image" => Ok(Destination::Image),
            "script" => Ok(Destination::Script),
            "style" => Ok(Destination::Style),
            "font" => Ok(Destination::Font),
            "manifest" => Ok(Destination::Manifest),
            "" | "empty" => Ok(Destination::Empty),
            other => Err(format!("unknown destination: {other}")),
        }
    }
}

/// An outgoing request.
#[derive(Debug, Clone)]
pub struct Request {
    /// Uppercase HTTP method.
    pub method: String,
    /// Canonical URL.
    pub url: Url,
    pub destination: Destination,
    pub headers: Vec<(String, String)>,
}

impl Request {
    pub fn get(url: Url) -> Self {
        Self { method: "GET".to_string(), url, destination: Destination::Empty, headers: Vec::new() }
    }

    pub fn with_method(mut self, method: &str) -> Self {
        self.method = method.to_ascii_uppercase();
        self
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn is_navigation(&self) -> bool {
        self.destination == Destination::Document
    }

    pub fn is_get(&self) -> bool {
        self.method == "GET"
    }

    /// Store key for this request.
    pub fn cache_key(&self) -> String {
        compute_cache_key(&self.method, self.url.as_str())
    }
}

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSource {
    /// Live network response.
    Network,
    /// Store hit served without touching the network.
    Cache,
    /// Stored entry served because the network failed.
    Stale,
    /// Synthesized or precached offline document.
    Offline,
}

impl ResponseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseSource::Network => "network",
            ResponseSource::Cache => "cache",
            ResponseSource::Stale => "stale",
            ResponseSource::Offline => "offline",
        }
    }
}

/// A response handed back to the caller.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub source: ResponseSource,
    /// When the payload was written to the store, for cached responses.
    pub cached_at: Option<DateTime<Utc>>,
}

impl Response {
    pub fn network(status: u16, headers: Vec<(String, String)>, body: impl Into<Bytes>) -> Self {
        Self { status, headers, body: body.into(), source: ResponseSource::Network, cached_at: None }
    }

    /// Rebuild a response from a stored entry.
    pub fn from_entry(entry: CacheEntry, source: ResponseSource) -> Self {
        Self {
            status: entry.status,
            headers: entry.headers,
            body: Bytes::from(entry.payload),
            source,
            cached_at: Some(entry.cached_at),
        }
    }

    /// Convert into a store entry stamped with `cached_at`.
    pub fn to_entry(&self, request: &Request, cached_at: DateTime<Utc>) -> CacheEntry {
        CacheEntry::new(
            &request.method,
            request.url.as_str(),
            self.status,
            self.headers.clone(),
            self.body.to_vec(),
            cached_at,
        )
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}
