//! Environment overrides.
//!
//! The gateway has historically been configured purely from the process
//! environment (`APP_PORT`, `PROXY_LOG` and one `*_UPSTREAM` variable per
//! backend service). Those variables are still honoured on top of the file
//! configuration so existing deployments keep working.

use crate::config::schema::{GatewayConfig, RouteConfig};

/// Path of the TOML configuration file.
pub const CONFIG_PATH_VAR: &str = "GATEWAY_CONFIG";
/// Listener port override.
pub const PORT_VAR: &str = "APP_PORT";
/// `true` enables debug logging for the forwarding engine.
pub const PROXY_LOG_VAR: &str = "PROXY_LOG";

/// Canonical backend services: (env var, prefix, allow_upgrade).
const SERVICE_ROUTES: [(&str, &str, bool); 3] = [
    ("ACCOUNT_UPSTREAM", "/account", false),
    ("CHAT_UPSTREAM", "/chat", true),
    ("NOTIFICATION_UPSTREAM", "/notification", false),
];

/// Apply environment overrides using the real process environment.
pub fn apply_process_env(config: &mut GatewayConfig) {
    apply_env(config, |key| std::env::var(key).ok());
}

/// Apply overrides read through `lookup`.
///
/// Service routes are only synthesized when the file declares no routes, so
/// a config file always has the final say over the route table.
pub fn apply_env<F>(config: &mut GatewayConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(port) = lookup(PORT_VAR).filter(|p| !p.trim().is_empty()) {
        config.listener.bind_address = with_port(&config.listener.bind_address, port.trim());
    }

    if let Some(flag) = lookup(PROXY_LOG_VAR) {
        config.observability.proxy_debug = flag.trim() == "true";
    }

    if config.routes.is_empty() {
        for (var, prefix, upgrade) in SERVICE_ROUTES {
            let Some(upstream) = lookup(var).filter(|u| !u.trim().is_empty()) else {
                tracing::debug!(variable = var, "Upstream not set, skipping route");
                continue;
            };
            config.routes.push(
                RouteConfig::new(prefix, upstream.trim())
                    .named(prefix.trim_start_matches('/'))
                    .strip_prefix(true)
                    .allow_upgrade(upgrade),
            );
        }
    }
}

/// Replace the port of a `host:port` bind address.
fn with_port(bind_address: &str, port: &str) -> String {
    match bind_address.rsplit_once(':') {
        Some((host, _)) => format!("{host}:{port}"),
        None => format!("{bind_address}:{port}"),
    }
}
