//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled routes
//! - Look up the matching route for a request path
//! - Return matched route or explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Routes pre-sorted by prefix length, so the first hit is the longest
//! - Stable sort keeps declaration order for equal-length prefixes
//! - Explicit `None` rather than silent default

use std::sync::Arc;

use axum::http::uri::{Authority, Uri};
use url::Url;

use crate::config::{RouteConfig, ValidationError};
use crate::routing::matcher::PathPrefixMatcher;
use crate::routing::rewrite::join_base_path;

/// Resolved upstream target of a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstream {
    /// `host[:port]` exactly as written in the config, used for `Host`.
    authority: Authority,
    /// Host used for dialing dedicated connections.
    host: String,
    port: u16,
    /// Path component of the upstream URL, prepended to forwarded paths.
    base_path: String,
}

impl Upstream {
    /// Parse an upstream URL (`http://` or `ws://`).
    pub fn parse(raw: &str) -> Result<Self, String> {
        let url = Url::parse(raw).map_err(|e| e.to_string())?;
        if !matches!(url.scheme(), "http" | "ws") {
            return Err(format!("unsupported scheme {:?}", url.scheme()));
        }
        let host = url
            .host_str()
            .ok_or_else(|| "missing host".to_string())?
            .to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| "missing port".to_string())?;

        let authority = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.clone(),
        };
        let authority = Authority::try_from(authority.as_str()).map_err(|e| e.to_string())?;

        let base_path = url.path().trim_end_matches('/').to_string();

        Ok(Self {
            authority,
            host: host.trim_start_matches('[').trim_end_matches(']').to_string(),
            port,
            base_path,
        })
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Build the absolute outbound URI for a rewritten path and optional query.
    pub fn uri_for(&self, path: &str, query: Option<&str>) -> Result<Uri, axum::http::Error> {
        let path = join_base_path(&self.base_path, path);
        let path_and_query = match query {
            Some(q) => format!("{path}?{q}"),
            None => path,
        };
        let uri = Uri::builder()
            .scheme("http")
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()?;
        Ok(uri)
    }
}

impl std::fmt::Display for Upstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "http://{}{}", self.authority, self.base_path)
    }
}

/// A compiled route.
#[derive(Debug)]
pub struct Route {
    pub name: String,
    pub matcher: PathPrefixMatcher,
    pub upstream: Upstream,
    pub strip_prefix: bool,
    pub allow_upgrade: bool,
}

impl Route {
    pub fn from_config(config: &RouteConfig) -> Result<Self, ValidationError> {
        let upstream =
            Upstream::parse(&config.upstream).map_err(|reason| ValidationError::InvalidUpstream {
                prefix: config.prefix.clone(),
                upstream: config.upstream.clone(),
                reason,
            })?;
        Ok(Self {
            name: config.name.clone().unwrap_or_else(|| config.prefix.clone()),
            matcher: PathPrefixMatcher::new(config.prefix.clone()),
            upstream,
            strip_prefix: config.strip_prefix,
            allow_upgrade: config.allow_upgrade,
        })
    }

    pub fn prefix(&self) -> &str {
        self.matcher.as_str()
    }
}

/// The immutable route table.
#[derive(Debug, Default)]
pub struct RouteTable {
    /// Longest prefix first.
    routes: Vec<Arc<Route>>,
}

impl RouteTable {
    /// Compile routes from config, preserving declaration order among ties.
    pub fn from_config(configs: &[RouteConfig]) -> Result<Self, ValidationError> {
        let mut routes = configs
            .iter()
            .map(|c| Route::from_config(c).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;
        routes.sort_by(|a, b| b.matcher.len().cmp(&a.matcher.len()));

        for route in &routes {
            tracing::debug!(
                route = %route.name,
                prefix = %route.prefix(),
                upstream = %route.upstream,
                strip_prefix = route.strip_prefix,
                allow_upgrade = route.allow_upgrade,
                "Route compiled"
            );
        }
        Ok(Self { routes })
    }

    /// Find the route with the longest prefix matching `path`.
    pub fn match_path(&self, path: &str) -> Option<Arc<Route>> {
        self.routes
            .iter()
            .find(|route| route.matcher.matches(path))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Route>> {
        self.routes.iter()
    }
}
