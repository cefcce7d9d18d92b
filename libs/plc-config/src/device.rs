//! Device connection parameters

use std::fmt::Write as _;

use errors::ConfigError;
use serde::{Deserialize, Serialize};

use crate::serde_defaults::{self, bool_true, deserialize_bool_flexible};
use crate::types::ProtocolVariant;

/// Connection parameters of one PLC
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub id: String,

    #[serde(default)]
    pub comment: String,

    #[serde(default)]
    pub host: String,

    #[serde(default = "serde_defaults::port")]
    pub port: u16,

    #[serde(default, alias = "protocol_variant")]
    pub protocol: ProtocolVariant,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rack: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<u16>,

    /// Per-operation transport timeout; see [`DeviceConfig::timeout_ms`]
    #[serde(default, rename = "timeout_ms", alias = "timeout")]
    pub timeout: Option<u64>,

    #[serde(default, alias = "user_name", skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(
        default,
        alias = "user_password",
        skip_serializing_if = "Option::is_none"
    )]
    pub password: Option<String>,

    /// Hard ceiling on concurrent connections (PLC CPUs enforce one)
    #[serde(default, alias = "max_conn", skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_idle: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_idle: Option<u32>,

    /// Tear down the connection after a transport failure
    #[serde(
        default = "bool_true",
        alias = "reconnect",
        deserialize_with = "deserialize_bool_flexible"
    )]
    pub reconnect_on_error: bool,

    /// Timeout handed to the backends for facade calls
    #[serde(
        default,
        rename = "call_timeout_ms",
        skip_serializing_if = "Option::is_none"
    )]
    pub call_timeout: Option<u64>,
}

impl DeviceConfig {
    pub fn new(id: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            comment: String::new(),
            host: host.into(),
            port: serde_defaults::port(),
            protocol: ProtocolVariant::default(),
            rack: None,
            slot: None,
            timeout: None,
            username: None,
            password: None,
            max_connections: None,
            min_idle: None,
            max_idle: None,
            reconnect_on_error: true,
            call_timeout: None,
        }
    }

    /// Effective transport timeout, a zero or missing value gives the default
    pub fn timeout_ms(&self) -> u64 {
        match self.timeout {
            Some(ms) if ms > 0 => ms,
            _ => serde_defaults::timeout_ms(),
        }
    }

    /// Effective facade call timeout
    pub fn call_timeout_ms(&self) -> u64 {
        match self.call_timeout {
            Some(ms) if ms > 0 => ms,
            _ => serde_defaults::call_timeout_ms(),
        }
    }

    fn credentials(&self) -> Option<(&str, &str)> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => Some((user, pass)),
            _ => None,
        }
    }

    /// Connection string for the generic tag transport
    ///
    /// `<protocol>://[<user>:<password>@]<host>:<port>?timeout=<ms>[&remote-rack=<r>][&remote-slot=<s>]`
    pub fn connection_string(&self) -> String {
        self.render_connection_string(false)
    }

    /// Same as [`connection_string`](Self::connection_string) with the password masked
    pub fn masked_connection_string(&self) -> String {
        self.render_connection_string(true)
    }

    fn render_connection_string(&self, mask: bool) -> String {
        let mut out = format!("{}://", self.protocol.scheme());
        if let Some((user, pass)) = self.credentials() {
            let pass = if mask { "******" } else { pass };
            let _ = write!(out, "{}:{}@", user, pass);
        }
        let _ = write!(
            out,
            "{}:{}?timeout={}",
            self.host.trim(),
            self.port,
            self.timeout_ms()
        );
        if let Some(rack) = self.rack {
            let _ = write!(out, "&remote-rack={}", rack);
        }
        if let Some(slot) = self.slot {
            let _ = write!(out, "&remote-slot={}", slot);
        }
        out
    }

    /// Fail fast before any connection object is built
    pub fn validate_for_connect(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::MissingField {
                owner: self.id.clone(),
                field: "host",
            });
        }
        if self.port == 0 {
            return Err(ConfigError::MissingField {
                owner: self.id.clone(),
                field: "port",
            });
        }
        Ok(())
    }

    // ========================================================================
    // Pool sizing
    // ========================================================================

    /// Pool ceiling, never below 1 and never unbounded
    pub fn pool_max_total(&self) -> usize {
        self.max_connections.unwrap_or(0).max(1) as usize
    }

    /// Idle floor, capped by both `pool_max_total` and `pool_max_idle`
    pub fn pool_min_idle(&self) -> usize {
        (self.min_idle.unwrap_or(0).max(1) as usize)
            .min(self.pool_max_total())
            .min(self.pool_max_idle())
    }

    pub fn pool_max_idle(&self) -> usize {
        self.max_idle.unwrap_or(0).max(1) as usize
    }

    // ========================================================================
    // Area client addressing
    // ========================================================================

    pub fn area_rack(&self) -> u16 {
        self.rack.unwrap_or_else(serde_defaults::area_rack)
    }

    pub fn area_slot(&self) -> u16 {
        self.slot.unwrap_or_else(serde_defaults::area_slot)
    }

    /// `<comment><id>` label used in log titles
    pub fn label(&self) -> String {
        format!("{}{}", self.comment, self.id)
    }
}
