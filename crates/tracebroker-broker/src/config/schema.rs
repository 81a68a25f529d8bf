//! Config schema with strict parsing. `deny_unknown_fields` prevents silent
//! misconfiguration — a typo'd key fails at load time instead of quietly
//! being ignored.

use serde::Deserialize;

use tracebroker_core::error::{BrokerError, Result};
use tracebroker_core::event::DisableMode;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrokerConfig {
    #[serde(default = "default_tracer_host")]
    pub tracer_host: String,
    #[serde(default = "default_tracer_port")]
    pub tracer_port: u16,
    #[serde(default = "default_client_host")]
    pub client_host: String,
    #[serde(default = "default_client_port")]
    pub client_port: u16,
    #[serde(default = "default_route_fmt")]
    pub route_fmt: String,

    /// Seconds a newly-opened connection has to send a valid `start` event.
    #[serde(default = "default_auth_timeout")]
    pub auth_timeout_secs: f64,
    /// Seconds a lone peer waits for the other side of its session before
    /// being torn down. `0` means "never" (orphans are allowed to live
    /// indefinitely with no counterpart).
    #[serde(default = "default_attach_timeout")]
    pub attach_timeout_secs: f64,
    /// Minutes of silence on a paired session before it is swept.
    #[serde(default = "default_inactivity_timeout")]
    pub inactivity_timeout_minutes: f64,
    /// Seconds between inactivity sweeps.
    #[serde(default = "default_sweep_time")]
    pub sweep_time_secs: f64,
    #[serde(default = "default_disable_mode")]
    pub timeout_disable_mode: DisableMode,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        BrokerConfig {
            tracer_host: default_tracer_host(),
            tracer_port: default_tracer_port(),
            client_host: default_client_host(),
            client_port: default_client_port(),
            route_fmt: default_route_fmt(),
            auth_timeout_secs: default_auth_timeout(),
            attach_timeout_secs: default_attach_timeout(),
            inactivity_timeout_minutes: default_inactivity_timeout(),
            sweep_time_secs: default_sweep_time(),
            timeout_disable_mode: default_disable_mode(),
        }
    }
}

impl BrokerConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.route_fmt.contains("{uuid}") {
            return Err(BrokerError::Config(
                "route_fmt must contain a {uuid} slot".into(),
            ));
        }
        if self.auth_timeout_secs <= 0.0 {
            return Err(BrokerError::Config("auth_timeout must be positive".into()));
        }
        Ok(())
    }

    pub fn attach_timeout(&self) -> Option<std::time::Duration> {
        if self.attach_timeout_secs <= 0.0 {
            None
        } else {
            Some(std::time::Duration::from_secs_f64(self.attach_timeout_secs))
        }
    }

    pub fn auth_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.auth_timeout_secs)
    }

    pub fn inactivity_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.inactivity_timeout_minutes * 60.0)
    }

    pub fn sweep_time(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.sweep_time_secs)
    }
}

fn default_tracer_host() -> String {
    "0.0.0.0".into()
}
fn default_tracer_port() -> u16 {
    8001
}
fn default_client_host() -> String {
    "0.0.0.0".into()
}
fn default_client_port() -> u16 {
    8002
}
fn default_route_fmt() -> String {
    "/ws/{uuid}".into()
}
fn default_auth_timeout() -> f64 {
    60.0
}
fn default_attach_timeout() -> f64 {
    60.0
}
fn default_inactivity_timeout() -> f64 {
    60.0
}
fn default_sweep_time() -> f64 {
    60.0
}
fn default_disable_mode() -> DisableMode {
    DisableMode::Soft
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        BrokerConfig::default().validate().unwrap();
    }

    #[test]
    fn zero_attach_timeout_means_orphans_allowed() {
        let mut cfg = BrokerConfig::default();
        cfg.attach_timeout_secs = 0.0;
        assert!(cfg.attach_timeout().is_none());
    }

    #[test]
    fn route_fmt_without_uuid_slot_is_rejected() {
        let mut cfg = BrokerConfig::default();
        cfg.route_fmt = "/ws/static".into();
        assert!(cfg.validate().is_err());
    }
}
