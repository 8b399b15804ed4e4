//! Configuration management for Bazaar
//!
//! Configuration is loaded from environment variables.

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Which store backend the cache runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Redis,
    Memory,
}

impl FromStr for CacheBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" | "in-memory" | "in_memory" => Ok(Self::Memory),
            other => bail!("Unknown CACHE_BACKEND '{}', expected 'redis' or 'memory'", other),
        }
    }
}

/// Connection settings for the Redis pool
#[derive(Debug, Clone)]
pub struct RedisSettings {
    /// Redis connection URL
    pub url: String,
    /// Password applied on top of the URL
    pub password: Option<String>,
    /// Database index
    pub db: i64,
    /// Maximum pooled connections
    pub max_connections: usize,
    /// Connection creation and pool wait timeout
    pub connect_timeout: Duration,
    /// Per-command timeout
    pub socket_timeout: Duration,
    /// Startup connection attempts
    pub connect_retries: u32,
    /// Initial delay between startup attempts (doubles each retry)
    pub retry_delay: Duration,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            password: None,
            db: 0,
            max_connections: 20,
            connect_timeout: Duration::from_secs(30),
            socket_timeout: Duration::from_secs(30),
            connect_retries: 5,
            retry_delay: Duration::from_secs(2),
        }
    }
}

impl RedisSettings {
    /// URL safe for logs: any userinfo password is masked
    pub fn redacted_url(&self) -> String {
        let Some((scheme, rest)) = self.url.split_once("://") else {
            return self.url.clone();
        };
        match rest.split_once('@') {
            Some((userinfo, host)) => {
                let user = userinfo.split(':').next().unwrap_or_default();
                format!("{}://{}:***@{}", scheme, user, host)
            }
            None => self.url.clone(),
        }
    }
}

/// TTL policy per entity class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    /// Fallback for keys without an entity class
    pub default: Duration,
    /// Point lookups (single product, profile)
    pub entity: Duration,
    /// List and query results
    pub list: Duration,
    /// Session data
    pub session: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            default: Duration::from_secs(300),
            entity: Duration::from_secs(600),
            list: Duration::from_secs(120),
            session: Duration::from_secs(3600),
        }
    }
}

/// Override limit for one route path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteLimit {
    pub requests: u64,
    pub window_seconds: u64,
}

/// Rate-limiting thresholds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitSettings {
    /// Master switch
    pub enabled: bool,
    /// Global requests per minute per identifier
    pub per_minute: u64,
    /// Global requests per hour per identifier
    pub per_hour: u64,
    /// Per-path overrides, keyed by request path
    pub routes: HashMap<String, RouteLimit>,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            per_minute: 60,
            per_hour: 1000,
            routes: default_route_limits(),
        }
    }
}

/// Default per-route limits for sensitive endpoints
pub fn default_route_limits() -> HashMap<String, RouteLimit> {
    [
        ("/api/v1/auth/login", 5, 300),
        ("/api/v1/auth/register", 3, 300),
        ("/api/v1/auth/reset-password", 3, 600),
        ("/api/v1/products", 100, 60),
    ]
    .into_iter()
    .map(|(path, requests, window_seconds)| {
        (
            path.to_string(),
            RouteLimit {
                requests,
                window_seconds,
            },
        )
    })
    .collect()
}

/// Parse `path=requests/window;path=requests/window` route overrides
pub fn parse_route_limits(raw: &str) -> Result<HashMap<String, RouteLimit>> {
    let mut routes = HashMap::new();

    for entry in raw.split(';').map(str::trim).filter(|e| !e.is_empty()) {
        let (path, limit) = entry
            .split_once('=')
            .with_context(|| format!("Route limit '{}' is missing '='", entry))?;
        let (requests, window) = limit
            .split_once('/')
            .with_context(|| format!("Route limit '{}' is missing '/'", entry))?;

        let requests: u64 = requests
            .trim()
            .parse()
            .with_context(|| format!("Invalid request count in '{}'", entry))?;
        let window_seconds: u64 = window
            .trim()
            .parse()
            .with_context(|| format!("Invalid window in '{}'", entry))?;
        if window_seconds == 0 {
            bail!("Window must be positive in '{}'", entry);
        }

        routes.insert(
            path.trim().to_string(),
            RouteLimit {
                requests,
                window_seconds,
            },
        );
    }

    Ok(routes)
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,

    /// Store backend selection
    pub cache_backend: CacheBackend,
    /// Redis pool settings
    pub redis: RedisSettings,

    /// Cache TTL policy
    pub cache_ttl: CacheTtls,
    /// Rate-limiting thresholds
    pub rate_limit: RateLimitSettings,

    /// Default lifetime of a blacklisted token
    pub token_blacklist_ttl: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cache_backend: CacheBackend::Redis,
            redis: RedisSettings::default(),
            cache_ttl: CacheTtls::default(),
            rate_limit: RateLimitSettings::default(),
            token_blacklist_ttl: Duration::from_secs(1800),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let redis_url = match env::var("REDIS_URL") {
            Ok(url) => url,
            Err(_) => {
                let host = env::var("REDIS_HOST").unwrap_or_else(|_| "localhost".to_string());
                let port = env::var("REDIS_PORT").unwrap_or_else(|_| "6379".to_string());
                format!("redis://{}:{}", host, port)
            }
        };

        let routes = match env::var("RATE_LIMIT_ROUTES") {
            Ok(raw) => parse_route_limits(&raw).context("Invalid RATE_LIMIT_ROUTES")?,
            Err(_) => default_route_limits(),
        };

        Ok(Self {
            host: env::var("BAZAAR_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_var("BAZAAR_PORT", "8000")?,

            cache_backend: env::var("CACHE_BACKEND")
                .unwrap_or_else(|_| "redis".to_string())
                .parse()
                .context("Invalid CACHE_BACKEND")?,

            redis: RedisSettings {
                url: redis_url,
                password: env::var("REDIS_PASSWORD").ok().filter(|p| !p.is_empty()),
                db: parse_var("REDIS_DB", "0")?,
                max_connections: parse_var("REDIS_POOL_MAX_CONNECTIONS", "20")?,
                connect_timeout: Duration::from_secs(parse_var("REDIS_CONNECT_TIMEOUT_SECS", "30")?),
                socket_timeout: Duration::from_secs(parse_var("REDIS_SOCKET_TIMEOUT_SECS", "30")?),
                connect_retries: parse_var("REDIS_CONNECT_RETRIES", "5")?,
                retry_delay: Duration::from_secs(parse_var("REDIS_RETRY_DELAY_SECS", "2")?),
            },

            cache_ttl: CacheTtls {
                default: Duration::from_secs(parse_var("CACHE_TTL_SECONDS", "300")?),
                entity: Duration::from_secs(parse_var("CACHE_TTL_PRODUCTS", "600")?),
                list: Duration::from_secs(parse_var("CACHE_TTL_LISTS", "120")?),
                session: Duration::from_secs(parse_var("CACHE_TTL_USER_SESSIONS", "3600")?),
            },

            rate_limit: RateLimitSettings {
                enabled: env::var("RATE_LIMIT_ENABLED")
                    .map(|v| v == "true" || v == "1")
                    .unwrap_or(true),
                per_minute: parse_var("RATE_LIMIT_PER_MINUTE", "60")?,
                per_hour: parse_var("RATE_LIMIT_PER_HOUR", "1000")?,
                routes,
            },

            token_blacklist_ttl: Duration::from_secs(parse_var(
                "TOKEN_BLACKLIST_TTL_SECONDS",
                "1800",
            )?),
        })
    }
}

fn parse_var<T>(name: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .with_context(|| format!("Invalid {}", name))
}
