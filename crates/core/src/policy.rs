//! Policy classes and versioned cache namespaces.
//!
//! A namespace name has the shape `{app}-{class}-v{version}`. Bumping a
//! class version on deploy rotates the whole namespace: the old one is
//! dropped when the new deployment activates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Category of a request that decides which cache strategy applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyClass {
    Static,
    Image,
    Api,
}

impl PolicyClass {
    pub const ALL: [PolicyClass; 3] = [PolicyClass::Static, PolicyClass::Image, PolicyClass::Api];

    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyClass::Static => "static",
            PolicyClass::Image => "image",
            PolicyClass::Api => "api",
        }
    }

    /// Whether entries of this class are subject to a time-to-live.
    ///
    /// `static` and `image` entries only go away through namespace rotation.
    pub fn expires(&self) -> bool {
        matches!(self, PolicyClass::Api)
    }
}

impl fmt::Display for PolicyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "static" => Ok(PolicyClass::Static),
            "image" => Ok(PolicyClass::Image),
            "api" => Ok(PolicyClass::Api),
            other => Err(format!("unknown policy class: {other}")),
        }
    }
}

/// A versioned cache namespace owned by one application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheNamespace {
    pub app_name: String,
    pub policy_class: PolicyClass,
    pub version: u32,
}

impl CacheNamespace {
    pub fn new(app_name: impl Into<String>, policy_class: PolicyClass, version: u32) -> Self {
        Self { app_name: app_name.into(), policy_class, version }
    }

    /// Rendered store name, e.g. `shop-api-v3`.
    pub fn name(&self) -> String {
        format!("{}-{}-v{}", self.app_name, self.policy_class, self.version)
    }

    /// Parse a rendered namespace name back into its parts.
    ///
    /// The app name may itself contain dashes; class and version are taken
    /// from the right.
    pub fn parse(name: &str) -> Option<Self> {
        let (rest, version) = name.rsplit_once("-v")?;
        let version: u32 = version.parse().ok()?;
        let (app_name, class) = rest.rsplit_once('-')?;
        if app_name.is_empty() {
            return None;
        }
        let policy_class = class.parse().ok()?;
        Some(Self { app_name: app_name.to_string(), policy_class, version })
    }

    /// Whether `name` belongs to `app_name`, regardless of class or version.
    pub fn is_owned_by(name: &str, app_name: &str) -> bool {
        name.strip_prefix(app_name).is_some_and(|rest| rest.starts_with('-'))
    }
}

impl fmt::Display for CacheNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_name() {
        let ns = CacheNamespace::new("shop", PolicyClass::Api, 3);
        assert_eq!(ns.name(), "shop-api-v3");
    }

    #[test]
    fn test_namespace_parse_dashed_app() {
        let ns = CacheNamespace::parse("my-shop-image-v12").unwrap();
        assert_eq!(ns.app_name, "my-shop");
        assert_eq!(ns.policy_class, PolicyClass::Image);
        assert_eq!(ns.version, 12);
    }

    #[test]
    fn test_namespace_parse_rejects_garbage() {
        assert!(CacheNamespace::parse("shop-api").is_none());
        assert!(CacheNamespace::parse("shop-fonts-v1").is_none());
        assert!(CacheNamespace::parse("-api-v1").is_none());
        assert!(CacheNamespace::parse("shop-api-vx").is_none());
    }

    #[test]
    fn test_is_owned_by() {
        assert!(CacheNamespace::is_owned_by("shop-static-v1", "shop"));
        assert!(CacheNamespace::is_owned_by("shop-legacy", "shop"));
        assert!(!CacheNamespace::is_owned_by("shopping-static-v1", "shop"));
        assert!(!CacheNamespace::is_owned_by("other-static-v1", "shop"));
    }

    #[test]
    fn test_only_api_expires() {
        assert!(PolicyClass::Api.expires());
        assert!(!PolicyClass::Static.expires());
        assert!(!PolicyClass::Image.expires());
    }
}
