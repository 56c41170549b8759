use std::{fmt, str::FromStr, time::Duration};

use tracing::warn;

use crate::retry::{QueueRetryPolicy, RetryLimit};

pub const DEFAULT_PORT: u16 = 10000;
pub const DEFAULT_UPSTREAM_URL: &str = "https://www.mazmazika.com/dl2025.php";
pub const DEFAULT_CLIENT_TYPE: &str = "web";
pub const DEFAULT_CLIENT_NAME: &str = "Mazmazika";
const DEFAULT_UPSTREAM_TIMEOUT_SECONDS: u64 = 60;
const DEFAULT_RELAY_DEADLINE_SECONDS: u64 = 180;
const DEFAULT_QUEUE_RETRY_DELAY_MS: u64 = 3_000;
const DEFAULT_QUEUE_MAX_DELAY_SECONDS: u64 = 30;

/// How a finished conversion is handed back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseMode {
    /// `{ "filename": ..., "base64": ... }`
    #[default]
    Json,
    /// Raw `audio/mpeg` body served as an attachment.
    Download,
}

impl FromStr for ResponseMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" | "base64" => Ok(Self::Json),
            "download" | "binary" | "file" => Ok(Self::Download),
            other => Err(format!("unknown response mode {other:?}")),
        }
    }
}

impl fmt::Display for ResponseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => f.write_str("json"),
            Self::Download => f.write_str("download"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub url: String,
    pub client_type: String,
    pub client_name: String,
    /// Applies to each individual upstream call.
    pub request_timeout: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_UPSTREAM_URL.to_string(),
            client_type: DEFAULT_CLIENT_TYPE.to_string(),
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECONDS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub bind_addr: String,
    pub upstream: UpstreamConfig,
    pub response_mode: ResponseMode,
    pub queue_retry: QueueRetryPolicy,
    /// Upper bound on the whole submit/poll sequence of one request.
    pub deadline: Duration,
    pub accept_shorts: bool,
    pub status_route: bool,
    /// Empty means any origin is allowed.
    pub allowed_origins: Vec<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{DEFAULT_PORT}"),
            upstream: UpstreamConfig::default(),
            response_mode: ResponseMode::default(),
            queue_retry: QueueRetryPolicy {
                base_delay: Duration::from_millis(DEFAULT_QUEUE_RETRY_DELAY_MS),
                max_delay: Duration::from_secs(DEFAULT_QUEUE_MAX_DELAY_SECONDS),
                ..QueueRetryPolicy::default()
            },
            deadline: Duration::from_secs(DEFAULT_RELAY_DEADLINE_SECONDS),
            accept_shorts: true,
            status_route: true,
            allowed_origins: Vec::new(),
        }
    }
}

impl RelayConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source; invalid values are
    /// reported and replaced by their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let get = |name: &str| lookup(name).and_then(|value| non_empty(&value).map(str::to_string));

        let bind_addr = get("APP_ADDR").unwrap_or_else(|| {
            let port = parse_or_default(get("PORT"), "PORT", DEFAULT_PORT);
            format!("0.0.0.0:{port}")
        });

        let upstream = UpstreamConfig {
            url: get("UPSTREAM_URL").unwrap_or(defaults.upstream.url),
            client_type: get("UPSTREAM_CLIENT_TYPE").unwrap_or(defaults.upstream.client_type),
            client_name: get("UPSTREAM_CLIENT_NAME").unwrap_or(defaults.upstream.client_name),
            request_timeout: Duration::from_secs(parse_or_default(
                get("UPSTREAM_TIMEOUT_SECS"),
                "UPSTREAM_TIMEOUT_SECS",
                DEFAULT_UPSTREAM_TIMEOUT_SECONDS,
            )),
        };

        let queue_retry = QueueRetryPolicy {
            limit: parse_or_default(
                get("QUEUE_MAX_RETRIES"),
                "QUEUE_MAX_RETRIES",
                defaults.queue_retry.limit,
            ),
            base_delay: Duration::from_millis(parse_or_default(
                get("QUEUE_RETRY_DELAY_MS"),
                "QUEUE_RETRY_DELAY_MS",
                DEFAULT_QUEUE_RETRY_DELAY_MS,
            )),
            backoff_factor: parse_or_default(
                get("QUEUE_BACKOFF_FACTOR"),
                "QUEUE_BACKOFF_FACTOR",
                defaults.queue_retry.backoff_factor,
            ),
            max_delay: Duration::from_secs(parse_or_default(
                get("QUEUE_MAX_DELAY_SECS"),
                "QUEUE_MAX_DELAY_SECS",
                DEFAULT_QUEUE_MAX_DELAY_SECONDS,
            )),
        };

        let allowed_origins = get("ALLOWED_ORIGINS")
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            bind_addr,
            upstream,
            response_mode: parse_or_default(
                get("RESPONSE_MODE"),
                "RESPONSE_MODE",
                defaults.response_mode,
            ),
            queue_retry,
            deadline: Duration::from_secs(parse_or_default(
                get("RELAY_DEADLINE_SECS"),
                "RELAY_DEADLINE_SECS",
                DEFAULT_RELAY_DEADLINE_SECONDS,
            )),
            accept_shorts: read_bool(get("ACCEPT_SHORTS"), "ACCEPT_SHORTS")
                .unwrap_or(defaults.accept_shorts),
            status_route: read_bool(get("STATUS_ROUTE"), "STATUS_ROUTE")
                .unwrap_or(defaults.status_route),
            allowed_origins,
        }
    }

    pub fn unbounded_queue_polling(&self) -> bool {
        self.queue_retry.limit == RetryLimit::Unbounded
    }
}

fn parse_or_default<T>(value: Option<String>, name: &str, default: T) -> T
where
    T: FromStr + fmt::Display,
{
    let Some(raw) = value else {
        return default;
    };
    match raw.parse::<T>() {
        Ok(parsed) => parsed,
        Err(_) => {
            warn!("Invalid value {raw:?} for {name}; using default {default}");
            default
        }
    }
}

fn read_bool(value: Option<String>, name: &str) -> Option<bool> {
    let value = value?;
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            warn!("Invalid boolean {value:?} for {name}; using default");
            None
        }
    }
}

pub(crate) fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
