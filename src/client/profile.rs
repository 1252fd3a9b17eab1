// ABOUTME: Connection profiles describing each SMSC target and how to bind and address it
// ABOUTME: Loaded once from a JSON file with serde; never mutated afterwards

use crate::datatypes::{NumericPlanIndicator, TypeOfNumber};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Baseline addressing used when a profile has no override: international / ISDN.
pub const DEFAULT_TON: TypeOfNumber = TypeOfNumber::International;
pub const DEFAULT_NPI: NumericPlanIndicator = NumericPlanIndicator::Isdn;

/// How a session binds to its SMSC.
///
/// Profiles are external input, so an unrecognized mode is kept rather than
/// rejected at load time; `Session::connect` refuses it before any I/O.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BindMode {
    /// One link bound with bind_transceiver
    Transceiver,
    /// A bind_transmitter link for sending plus a bind_receiver link
    TransmitterReceiver,
    Unsupported(String),
}

impl BindMode {
    pub fn as_str(&self) -> &str {
        match self {
            BindMode::Transceiver => "transceiver",
            BindMode::TransmitterReceiver => "transmitter_receiver",
            BindMode::Unsupported(mode) => mode,
        }
    }
}

impl From<String> for BindMode {
    fn from(mode: String) -> Self {
        match mode.as_str() {
            "transceiver" => BindMode::Transceiver,
            "transmitter_receiver" => BindMode::TransmitterReceiver,
            _ => BindMode::Unsupported(mode),
        }
    }
}

impl From<BindMode> for String {
    fn from(mode: BindMode) -> Self {
        mode.as_str().to_string()
    }
}

impl fmt::Display for BindMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compact character repertoire tried before falling back to UCS-2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextEncoding {
    /// GSM 03.38 default alphabet, data_coding 0x00
    #[default]
    Gsm,
    /// ISO-8859-1, data_coding 0x03
    Latin1,
}

/// Immutable descriptor of one SMSC target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionProfile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub host: String,
    pub port: u16,
    pub system_id: String,
    pub password: String,
    /// Carried for operators; the bind always sends an empty system_type.
    #[serde(default)]
    pub system_type: Option<String>,
    pub mode: BindMode,
    /// Maximum messages awaiting acknowledgment; unlimited when absent.
    #[serde(default)]
    pub window_size: Option<usize>,
    /// Messages per second; unlimited when absent.
    #[serde(default)]
    pub speed: Option<u32>,
    #[serde(default)]
    pub source_ton: Option<TypeOfNumber>,
    #[serde(default)]
    pub source_npi: Option<NumericPlanIndicator>,
    #[serde(default)]
    pub dest_addr_ton: Option<TypeOfNumber>,
    #[serde(default)]
    pub dest_addr_npi: Option<NumericPlanIndicator>,
    #[serde(default)]
    pub encoding: TextEncoding,
}

impl ConnectionProfile {
    /// A transceiver profile with no window, no rate limit and baseline addressing.
    pub fn new(
        id: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        system_id: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            host: host.into(),
            port,
            system_id: system_id.into(),
            password: password.into(),
            system_type: None,
            mode: BindMode::Transceiver,
            window_size: None,
            speed: None,
            source_ton: None,
            source_npi: None,
            dest_addr_ton: None,
            dest_addr_npi: None,
            encoding: TextEncoding::Gsm,
        }
    }

    pub fn with_mode(mut self, mode: BindMode) -> Self {
        self.mode = mode;
        self
    }

    /// Zero leaves the window unlimited.
    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = Some(window_size);
        self
    }

    pub fn with_speed(mut self, speed: u32) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// `host:port`, as handed to `TcpStream::connect`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn source_addressing(&self) -> (TypeOfNumber, NumericPlanIndicator) {
        (
            self.source_ton.unwrap_or(DEFAULT_TON),
            self.source_npi.unwrap_or(DEFAULT_NPI),
        )
    }

    pub fn destination_addressing(&self) -> (TypeOfNumber, NumericPlanIndicator) {
        (
            self.dest_addr_ton.unwrap_or(DEFAULT_TON),
            self.dest_addr_npi.unwrap_or(DEFAULT_NPI),
        )
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::Invalid {
            id: self.id.clone(),
            reason: reason.to_string(),
        };

        if self.id.is_empty() {
            return Err(invalid("id must not be empty"));
        }
        if self.window_size == Some(0) {
            return Err(invalid("window_size must be at least 1"));
        }
        if self.speed == Some(0) {
            return Err(invalid("speed must be at least 1"));
        }
        Ok(())
    }
}

/// Errors raised while loading connection profiles
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed profile file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Duplicate connection id: {0}")]
    DuplicateId(String),

    #[error("Invalid profile {id}: {reason}")]
    Invalid { id: String, reason: String },
}

/// Parse a JSON array of profiles.
pub fn parse_profiles(json: &str) -> Result<Vec<ConnectionProfile>, ConfigError> {
    let profiles: Vec<ConnectionProfile> = serde_json::from_str(json)?;

    let mut seen = HashSet::new();
    for profile in &profiles {
        profile.validate()?;
        if !seen.insert(profile.id.as_str()) {
            return Err(ConfigError::DuplicateId(profile.id.clone()));
        }
    }

    Ok(profiles)
}

/// Read and parse the profile file at `path`.
pub fn load_profiles(path: impl AsRef<Path>) -> Result<Vec<ConnectionProfile>, ConfigError> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_profiles(&json)
}
