use std::{env, net::IpAddr};

use chrono::Duration;
use log::*;
use spg_common::{
    helpers::{parse_boolean_flag, parse_seconds},
    Secret,
};

const DEFAULT_SPG_HOST: &str = "127.0.0.1";
const DEFAULT_SPG_PORT: u16 = 8360;

/// The request header that carries the gateway's payload signature (base64-encoded HMAC-SHA256).
pub const GATEWAY_HMAC_HEADER: &str = "X-Gateway-Hmac-SHA256";

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_forwarded: bool,
    /// Payment gateway webhook configuration.
    pub gateway: GatewayConfig,
    /// Freshness/staleness windows for the read cache, per resource class.
    pub cache: CacheConfig,
    /// Outbound message relay configuration.
    pub mailer: MailerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SPG_HOST.to_string(),
            port: DEFAULT_SPG_PORT,
            database_url: String::default(),
            use_x_forwarded_for: false,
            use_forwarded: false,
            gateway: GatewayConfig::default(),
            cache: CacheConfig::default(),
            mailer: MailerConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("SPG_HOST").ok().unwrap_or_else(|| DEFAULT_SPG_HOST.into());
        let port = env::var("SPG_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for SPG_PORT. {e} Using the default, {DEFAULT_SPG_PORT}, instead."
                    );
                    DEFAULT_SPG_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_SPG_PORT);
        let database_url = env::var("SPG_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ SPG_DATABASE_URL is not set. Please set it to the URL for the canonical order store.");
            String::default()
        });
        let use_x_forwarded_for = parse_boolean_flag(env::var("SPG_USE_X_FORWARDED_FOR").ok(), false);
        let use_forwarded = parse_boolean_flag(env::var("SPG_USE_FORWARDED").ok(), false);
        Self {
            host,
            port,
            database_url,
            use_x_forwarded_for,
            use_forwarded,
            gateway: GatewayConfig::from_env_or_defaults(),
            cache: CacheConfig::from_env_or_defaults(),
            mailer: MailerConfig::from_env_or_defaults(),
        }
    }
}

//-------------------------------------------------  GatewayConfig  ---------------------------------------------------
#[derive(Clone, Debug, Default)]
pub struct GatewayConfig {
    /// The shared secret the gateway signs webhook payloads with.
    pub hmac_secret: Secret<String>,
    /// When false, webhook signatures are not checked. Development only.
    pub hmac_checks: bool,
    /// If supplied, requests against /gateway endpoints are checked against a whitelist of gateway IP addresses.
    /// To explicitly disable the whitelist, set SPG_GATEWAY_IP_WHITELIST to "false", "none", or "0".
    pub whitelist: Option<Vec<IpAddr>>,
}

impl GatewayConfig {
    pub fn from_env_or_defaults() -> Self {
        let hmac_secret = env::var("SPG_GATEWAY_HMAC_SECRET").ok().unwrap_or_else(|| {
            error!("🪛️ SPG_GATEWAY_HMAC_SECRET is not set. Please set it to the webhook signing secret for your \
                    payment gateway.");
            String::default()
        });
        let hmac_secret = Secret::new(hmac_secret);
        let hmac_checks = parse_boolean_flag(env::var("SPG_GATEWAY_HMAC_CHECKS").ok(), true);
        if !hmac_checks {
            warn!("🚨️ Gateway HMAC checks are DISABLED. Unverified webhook payloads will be accepted. Never run \
                   production like this.");
        }
        let whitelist = env::var("SPG_GATEWAY_IP_WHITELIST").ok().and_then(|s| {
            if ["none", "false", "0"].contains(&s.to_lowercase().as_str()) {
                info!(
                    "🪛️ Gateway IP whitelist is disabled. If this is not what you want, set \
                     SPG_GATEWAY_IP_WHITELIST to a comma-separated list of IP addresses to enable it."
                );
                return None;
            }
            let ip_addrs = s
                .split(',')
                .filter_map(|s| {
                    s.trim()
                        .parse()
                        .map_err(|e| {
                            warn!("🪛️ Ignoring invalid IP address ({s}) in SPG_GATEWAY_IP_WHITELIST: {e}");
                        })
                        .ok()
                })
                .collect::<Vec<IpAddr>>();
            Some(ip_addrs)
        });
        match &whitelist {
            Some(whitelist) if whitelist.is_empty() => {
                warn!(
                    "🚨️ The gateway IP whitelist was configured, but is empty. The server will run, but won't \
                     authorise any incoming gateway requests."
                );
            },
            None => {
                info!("🪛️ No gateway IP whitelist is set. Only HMAC validation will be used.");
            },
            Some(v) => {
                let addrs = v.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(", ");
                info!("🪛️ Gateway IP whitelist: {addrs}");
            },
        }
        Self { hmac_secret, hmac_checks, whitelist }
    }
}

//-------------------------------------------------  CacheConfig  -----------------------------------------------------
/// Freshness (TTL) and staleness (SWR) windows for the read cache, per resource class. The defaults follow the
/// recommended windows: single documents 60s/5min, lists 30s/2min, bulk fallback data 5min/30min.
#[derive(Clone, Copy, Debug)]
pub struct CacheConfig {
    pub doc_ttl: Duration,
    pub doc_swr: Duration,
    pub list_ttl: Duration,
    pub list_swr: Duration,
    pub bulk_ttl: Duration,
    pub bulk_swr: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            doc_ttl: Duration::seconds(60),
            doc_swr: Duration::seconds(300),
            list_ttl: Duration::seconds(30),
            list_swr: Duration::seconds(120),
            bulk_ttl: Duration::seconds(300),
            bulk_swr: Duration::seconds(1800),
        }
    }
}

impl CacheConfig {
    pub fn from_env_or_defaults() -> Self {
        let defaults = Self::default();
        let window = |name: &str, default: Duration| {
            Duration::seconds(parse_seconds(env::var(name).ok(), default.num_seconds()))
        };
        let config = Self {
            doc_ttl: window("SPG_CACHE_DOC_TTL_SECS", defaults.doc_ttl),
            doc_swr: window("SPG_CACHE_DOC_SWR_SECS", defaults.doc_swr),
            list_ttl: window("SPG_CACHE_LIST_TTL_SECS", defaults.list_ttl),
            list_swr: window("SPG_CACHE_LIST_SWR_SECS", defaults.list_swr),
            bulk_ttl: window("SPG_CACHE_BULK_TTL_SECS", defaults.bulk_ttl),
            bulk_swr: window("SPG_CACHE_BULK_SWR_SECS", defaults.bulk_swr),
        };
        for (label, ttl, swr) in [
            ("doc", config.doc_ttl, config.doc_swr),
            ("list", config.list_ttl, config.list_swr),
            ("bulk", config.bulk_ttl, config.bulk_swr),
        ] {
            if swr < ttl {
                warn!(
                    "🪛️ Cache {label} stale window ({}s) is shorter than its fresh window ({}s); the store will \
                     clamp it up.",
                    swr.num_seconds(),
                    ttl.num_seconds()
                );
            }
        }
        config
    }
}

//-------------------------------------------------  MailerConfig  ----------------------------------------------------
#[derive(Clone, Debug, Default)]
pub struct MailerConfig {
    /// The HTTP endpoint of the message relay.
    pub relay_url: String,
    pub api_key: Secret<String>,
    /// The From address for outbound messages.
    pub sender: String,
    /// Where operations notifications go.
    pub admin_address: String,
    /// When false, messages are logged and dropped instead of sent. Development only.
    pub enabled: bool,
}

impl MailerConfig {
    pub fn from_env_or_defaults() -> Self {
        let relay_url = env::var("SPG_MAIL_RELAY_URL").ok().unwrap_or_default();
        let api_key = Secret::new(env::var("SPG_MAIL_RELAY_API_KEY").ok().unwrap_or_default());
        let sender = env::var("SPG_MAIL_SENDER").ok().unwrap_or_else(|| "orders@example.com".into());
        let admin_address = env::var("SPG_MAIL_ADMIN_ADDRESS").ok().unwrap_or_else(|| {
            warn!("🪛️ SPG_MAIL_ADMIN_ADDRESS is not set. Operations notifications will go to a dummy address.");
            "ops@example.com".into()
        });
        let enabled = parse_boolean_flag(env::var("SPG_MAIL_ENABLED").ok(), !relay_url.is_empty());
        if !enabled {
            warn!("🚨️ The mail relay is disabled. Notifications will be logged and dropped.");
        }
        Self { relay_url, api_key, sender, admin_address, enabled }
    }
}
