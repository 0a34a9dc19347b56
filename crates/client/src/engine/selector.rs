//! Request classification.
//!
//! Rules, first match wins:
//! 1. Path under an API prefix → `api`
//! 2. Image destination, `Accept: image/*` or image file extension → `image`
//! 3. Everything else → `static`

use regex::Regex;
use std::sync::LazyLock;

use crate::request::{Destination, Request};
use rampart_core::PolicyClass;

static IMAGE_EXTENSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\.(png|jpe?g|gif|webp|avif|svg|ico|bmp)$").expect("image extension pattern is valid")
});

/// Which handler serves a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    CacheFirst,
    NetworkFirst,
}

impl Strategy {
    /// API calls and full-page navigations go to the network first.
    pub fn for_request(request: &Request, class: PolicyClass) -> Self {
        if class == PolicyClass::Api || request.is_navigation() { Strategy::NetworkFirst } else { Strategy::CacheFirst }
    }
}

/// Classifies requests into policy classes.
#[derive(Debug, Clone)]
pub struct StrategySelector {
    api_prefixes: Vec<String>,
}

impl StrategySelector {
    pub fn new(api_prefixes: Vec<String>) -> Self {
        Self { api_prefixes }
    }

    pub fn select(&self, request: &Request) -> PolicyClass {
        let path = request.url.path();

        if self.api_prefixes.iter().any(|prefix| path.starts_with(prefix.as_str())) {
            return PolicyClass::Api;
        }

        let accepts_image = request
            .header("accept")
            .is_some_and(|accept| accept.trim_start().starts_with("image/"));

        if request.destination == Destination::Image || accepts_image || IMAGE_EXTENSION.is_match(path) {
            return PolicyClass::Image;
        }

        PolicyClass::Static
    }
}

impl Default for StrategySelector {
    fn default() -> Self {
        Self::new(vec!["/api/".to_string()])
    }
}
