//! Referral bridge configuration
//!
//! Configuration is resolved once at startup and passed explicitly to the
//! client and listener; nothing else in the crate reads the environment.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Port used for a destination clinic when none is given
pub const DEFAULT_PORT: u16 = 7777;

/// Maximum accepted frame payload (1 MiB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Application name placed in the header's sending application field
pub const DEFAULT_APPLICATION: &str = "CLINIC_REFERRAL";

/// Referral bridge configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralConfig {
    /// This clinic's facility id (sending facility on outbound messages)
    pub facility_id: String,
    /// Sending application name
    pub application: String,
    /// Destination port used when an endpoint omits one
    pub default_port: u16,
    /// Address the inbound listener binds to
    pub listen_addr: String,
    /// Upper bound on one send/await-ack exchange; `None` waits indefinitely
    pub ack_timeout: Option<Duration>,
    /// Maximum frame payload accepted from the wire
    pub max_frame_size: usize,
}

impl ReferralConfig {
    /// Configuration for `facility_id` with every other value at its default
    pub fn new(facility_id: &str) -> Self {
        ReferralConfig {
            facility_id: facility_id.to_string(),
            application: DEFAULT_APPLICATION.to_string(),
            default_port: DEFAULT_PORT,
            listen_addr: format!("0.0.0.0:{}", DEFAULT_PORT),
            ack_timeout: None,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Load configuration from environment variables
    ///
    /// | Variable                    | Default            |
    /// |-----------------------------|--------------------|
    /// | `CLINIC_FACILITY_ID`        | `CLINIC`           |
    /// | `CLINIC_APPLICATION`        | `CLINIC_REFERRAL`  |
    /// | `OTHER_CLINIC_TCP_PORT`     | `7777`             |
    /// | `REFERRAL_LISTEN_ADDR`      | `0.0.0.0:7777`     |
    /// | `REFERRAL_ACK_TIMEOUT_SECS` | unset (no timeout) |
    /// | `REFERRAL_MAX_FRAME_SIZE`   | `1048576`          |
    ///
    /// Unparsable values fall back to the default with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::new(&std::env::var("CLINIC_FACILITY_ID").unwrap_or_else(|_| "CLINIC".into()));
        if let Ok(application) = std::env::var("CLINIC_APPLICATION") {
            config.application = application;
        }
        config.default_port = env_parse("OTHER_CLINIC_TCP_PORT", config.default_port);
        config.listen_addr =
            std::env::var("REFERRAL_LISTEN_ADDR").unwrap_or_else(|_| config.listen_addr.clone());
        config.ack_timeout = std::env::var("REFERRAL_ACK_TIMEOUT_SECS")
            .ok()
            .and_then(|raw| match raw.parse::<u64>() {
                Ok(secs) => Some(Duration::from_secs(secs)),
                Err(_) => {
                    warn!(variable = "REFERRAL_ACK_TIMEOUT_SECS", value = %raw, "Ignoring unparsable value");
                    None
                }
            });
        config.max_frame_size = env_parse("REFERRAL_MAX_FRAME_SIZE", config.max_frame_size);
        config
    }
}

fn env_parse<T: FromStr>(variable: &str, default: T) -> T {
    match std::env::var(variable) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(variable = variable, value = %raw, "Ignoring unparsable value");
            default
        }),
        Err(_) => default,
    }
}

/// Network address of a destination clinic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClinicEndpoint {
    pub host: String,
    pub port: u16,
}

impl ClinicEndpoint {
    /// Endpoint at `host:port`
    pub fn new(host: &str, port: u16) -> Self {
        ClinicEndpoint {
            host: host.to_string(),
            port,
        }
    }

    /// Parse `host` or `host:port`, using `default_port` when the port is omitted
    ///
    /// Returns `None` for an empty host or an unparsable port.
    ///
    /// # Examples
    ///
    /// ```
    /// use clinic_referral::config::ClinicEndpoint;
    ///
    /// assert_eq!(ClinicEndpoint::parse("10.0.0.5", 7777).unwrap().port, 7777);
    /// assert_eq!(ClinicEndpoint::parse("clinic-b:2575", 7777).unwrap().port, 2575);
    /// ```
    pub fn parse(value: &str, default_port: u16) -> Option<Self> {
        let value = value.trim();
        let (host, port) = match value.rsplit_once(':') {
            Some((host, port)) => (host, port.parse().ok()?),
            None => (value, default_port),
        };
        if host.is_empty() {
            return None;
        }
        Some(Self::new(host, port))
    }
}

impl fmt::Display for ClinicEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
