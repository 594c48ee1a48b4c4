//! Bridge configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Every key is prefixed with `BRIDGE_`.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::BridgeError;

/// Default WebSocket port.
pub const DEFAULT_PORT: u16 = 9400;

/// What a freshly authenticated client receives after `hello`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BridgeMode {
    /// A snapshot of the whitelisted states.
    #[default]
    State,
    /// The configured structure document.
    Structure,
}

impl FromStr for BridgeMode {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "state" | "snapshot" => Ok(Self::State),
            "structure" => Ok(Self::Structure),
            other => Err(BridgeError::Config(format!("unknown mode {other:?}"))),
        }
    }
}

/// Which sessions receive a whitelisted change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryPolicy {
    /// Every live session. Client `subscribe` requests are advisory.
    #[default]
    Global,
    /// Only sessions that subscribed to a pattern matching the id.
    Subscribed,
}

impl FromStr for DeliveryPolicy {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "global" | "all" => Ok(Self::Global),
            "subscribed" | "per_session" | "per-session" => Ok(Self::Subscribed),
            other => Err(BridgeError::Config(format!(
                "unknown delivery policy {other:?}"
            ))),
        }
    }
}

/// How unrecognized client requests are answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownRequestPolicy {
    /// Reply with `error{message: "unknown request"}`.
    #[default]
    Reply,
    /// Drop silently.
    Ignore,
}

impl FromStr for UnknownRequestPolicy {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reply" | "error" => Ok(Self::Reply),
            "ignore" | "drop" => Ok(Self::Ignore),
            other => Err(BridgeError::Config(format!(
                "unknown request policy {other:?}"
            ))),
        }
    }
}

/// Where the structure document comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum StructureConfig {
    /// JSON embedded in the configuration.
    Inline(String),
    /// JSON file on disk.
    File {
        /// Path to the document.
        path: PathBuf,
        /// Re-read the file on every `getStructure` request.
        reload: bool,
    },
}

/// Top-level bridge configuration.
///
/// Loaded once at startup via [`BridgeConfig::from_env`]; tests build it
/// directly starting from [`BridgeConfig::default`].
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Socket address to listen on (default `0.0.0.0:9400`).
    pub listen_addr: SocketAddr,

    /// Shared access token. Empty disables authentication.
    pub token: String,

    /// Whitelist pattern strings. Empty exposes every id.
    pub expose_states: Vec<String>,

    /// Whether clients may write states.
    pub allow_write: bool,

    /// Initial payload mode.
    pub mode: BridgeMode,

    /// Optional structure document source.
    pub structure: Option<StructureConfig>,

    /// Broadcast scoping policy.
    pub delivery: DeliveryPolicy,

    /// Handling of unrecognized requests.
    pub unknown_requests: UnknownRequestPolicy,

    /// Depth of each session's outbound queue.
    pub outbound_capacity: usize,

    /// Capacity of the state store change feed.
    pub change_feed_capacity: usize,

    /// JSON object of initial values for the built-in store.
    pub seed_file: Option<PathBuf>,

    /// Emit logs as JSON lines.
    pub json_logs: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            token: String::new(),
            expose_states: Vec::new(),
            allow_write: false,
            mode: BridgeMode::State,
            structure: None,
            delivery: DeliveryPolicy::Global,
            unknown_requests: UnknownRequestPolicy::Reply,
            outbound_capacity: 1024,
            change_feed_capacity: 10_000,
            seed_file: None,
            json_logs: false,
        }
    }
}

impl BridgeConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to defaults when a variable is not set. Calls
    /// `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] if the host is not an IP address, an
    /// enumerated setting has an unknown value, or the configuration is
    /// inconsistent (see [`BridgeConfig::validate`]).
    pub fn from_env() -> Result<Self, BridgeError> {
        dotenvy::dotenv().ok();

        let host: IpAddr = env_string("BRIDGE_HOST")
            .unwrap_or_else(|| "0.0.0.0".to_string())
            .parse()
            .map_err(|e| BridgeError::Config(format!("BRIDGE_HOST: {e}")))?;
        let port = parse_env("BRIDGE_PORT", DEFAULT_PORT);

        let structure = if let Some(json) = env_string("BRIDGE_STRUCTURE_JSON") {
            Some(StructureConfig::Inline(json))
        } else {
            env_string("BRIDGE_STRUCTURE_FILE").map(|path| StructureConfig::File {
                path: PathBuf::from(path),
                reload: parse_env_bool("BRIDGE_STRUCTURE_RELOAD", false),
            })
        };

        let config = Self {
            listen_addr: SocketAddr::new(host, port),
            token: env_string("BRIDGE_TOKEN").unwrap_or_default(),
            expose_states: parse_list(&env_string("BRIDGE_EXPOSE_STATES").unwrap_or_default()),
            allow_write: parse_env_bool("BRIDGE_ALLOW_WRITE", false),
            mode: env_string("BRIDGE_MODE")
                .map(|v| v.parse::<BridgeMode>())
                .transpose()?
                .unwrap_or_default(),
            structure,
            delivery: env_string("BRIDGE_DELIVERY")
                .map(|v| v.parse::<DeliveryPolicy>())
                .transpose()?
                .unwrap_or_default(),
            unknown_requests: env_string("BRIDGE_UNKNOWN_REQUESTS")
                .map(|v| v.parse::<UnknownRequestPolicy>())
                .transpose()?
                .unwrap_or_default(),
            outbound_capacity: parse_env("BRIDGE_OUTBOUND_CAPACITY", 1024),
            change_feed_capacity: parse_env("BRIDGE_CHANGE_FEED_CAPACITY", 10_000),
            seed_file: env_string("BRIDGE_SEED_FILE").map(PathBuf::from),
            json_logs: env_string("LOG_FORMAT").is_some_and(|v| v.eq_ignore_ascii_case("json")),
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] if structure mode has no structure
    /// source or a queue capacity is zero.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.mode == BridgeMode::Structure && self.structure.is_none() {
            return Err(BridgeError::Config(
                "structure mode requires BRIDGE_STRUCTURE_JSON or BRIDGE_STRUCTURE_FILE"
                    .to_string(),
            ));
        }
        if self.outbound_capacity == 0 || self.change_feed_capacity == 0 {
            return Err(BridgeError::Config(
                "queue capacities must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns `true` if clients must present a token.
    #[must_use]
    pub fn auth_required(&self) -> bool {
        !self.token.is_empty()
    }
}

/// Splits a comma-separated list, trimming entries and dropping empty ones.
#[must_use]
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Reads a non-empty environment variable.
fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Parses an environment variable as a boolean. Accepts `"true"`, `"1"`,
/// `"false"`, `"0"` (case-insensitive). Returns `default` otherwise.
fn parse_env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key)
        .ok()
        .map(|v| v.trim().to_ascii_lowercase())
        .as_deref()
    {
        Some("true") | Some("1") => true,
        Some("false") | Some("0") => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.listen_addr.port(), 9400);
        assert!(!cfg.auth_required());
        assert!(!cfg.allow_write);
        assert!(cfg.expose_states.is_empty());
        assert_eq!(cfg.mode, BridgeMode::State);
        assert_eq!(cfg.delivery, DeliveryPolicy::Global);
        assert_eq!(cfg.unknown_requests, UnknownRequestPolicy::Reply);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn list_parsing_trims_and_skips_empty() {
        assert_eq!(
            parse_list(" light.* , ,sensor.temp,"),
            vec!["light.*".to_string(), "sensor.temp".to_string()]
        );
        assert!(parse_list("").is_empty());
    }

    #[test]
    fn enum_settings_parse() {
        assert_eq!("Structure".parse::<BridgeMode>().ok(), Some(BridgeMode::Structure));
        assert_eq!(
            "per-session".parse::<DeliveryPolicy>().ok(),
            Some(DeliveryPolicy::Subscribed)
        );
        assert_eq!(
            "ignore".parse::<UnknownRequestPolicy>().ok(),
            Some(UnknownRequestPolicy::Ignore)
        );
        assert!("bogus".parse::<BridgeMode>().is_err());
        assert!("bogus".parse::<DeliveryPolicy>().is_err());
        assert!("bogus".parse::<UnknownRequestPolicy>().is_err());
    }

    #[test]
    fn structure_mode_needs_a_source() {
        let cfg = BridgeConfig {
            mode: BridgeMode::Structure,
            ..BridgeConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(BridgeError::Config(_))));

        let cfg = BridgeConfig {
            mode: BridgeMode::Structure,
            structure: Some(StructureConfig::Inline(r#"{"floors":[]}"#.to_string())),
            ..BridgeConfig::default()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_capacity_rejected() {
        let cfg = BridgeConfig {
            outbound_capacity: 0,
            ..BridgeConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
