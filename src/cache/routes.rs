//! Request classification for the cache engine
//!
//! Rules are checked in order and the first match decides. A request no rule
//! matches is a static asset when it is same-origin or on an allowlisted
//! host, and passes straight through otherwise.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::CacheConfig;
use crate::error::{ConfigError, Error, Result};

/// How the engine serves a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteClass {
    /// Cache-first under the active generation
    StaticAsset,
    /// Network-first, cached copy as fallback
    LiveData,
    /// Network only, never cached
    Passthrough,
}

/// One entry of the route table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteRule {
    /// Host to match; subdomains match too
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_prefix: Option<String>,

    pub class: RouteClass,
}

impl RouteRule {
    pub fn host(host: &str, class: RouteClass) -> Self {
        Self {
            host: Some(host.to_ascii_lowercase()),
            path_prefix: None,
            class,
        }
    }

    pub fn path(prefix: &str, class: RouteClass) -> Self {
        Self {
            host: None,
            path_prefix: Some(prefix.to_string()),
            class,
        }
    }

    fn matches(&self, url: &Url) -> bool {
        let host_ok = match &self.host {
            Some(host) => url.host_str().is_some_and(|h| host_matches(h, host)),
            None => true,
        };
        let path_ok = match &self.path_prefix {
            Some(prefix) => url.path().starts_with(prefix.as_str()),
            None => true,
        };
        host_ok && path_ok
    }
}

fn host_matches(candidate: &str, host: &str) -> bool {
    candidate.eq_ignore_ascii_case(host)
        || candidate
            .to_ascii_lowercase()
            .ends_with(&format!(".{}", host.to_ascii_lowercase()))
}

/// Resolves request URLs and decides their [`RouteClass`]
#[derive(Debug, Clone)]
pub struct RouteTable {
    origin: Url,
    allowlist: Vec<String>,
    rules: Vec<RouteRule>,
}

impl RouteTable {
    pub fn new(origin: &str, allowlist: Vec<String>, rules: Vec<RouteRule>) -> Result<Self> {
        let origin = Url::parse(origin)
            .map_err(|e| ConfigError::Invalid(format!("cache origin {}: {}", origin, e)))?;
        Ok(Self {
            origin,
            allowlist,
            rules,
        })
    }

    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        Self::new(
            &config.origin,
            config.allowlist.clone(),
            config.routes.clone(),
        )
    }

    /// Parse `raw`, resolving paths like `/style.css` against the origin
    pub fn resolve(&self, raw: &str) -> Result<Url> {
        self.origin.join(raw).map_err(|e| Error::InvalidUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn classify(&self, url: &Url) -> RouteClass {
        if let Some(rule) = self.rules.iter().find(|rule| rule.matches(url)) {
            return rule.class;
        }

        let same_origin = url.origin() == self.origin.origin();
        let allowlisted = url
            .host_str()
            .is_some_and(|h| self.allowlist.iter().any(|allowed| host_matches(h, allowed)));

        if same_origin || allowlisted {
            RouteClass::StaticAsset
        } else {
            RouteClass::Passthrough
        }
    }
}
