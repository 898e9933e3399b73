//! # Configuration
//!
//! All settings arrive as CLI flags with environment-variable fallbacks,
//! so the bridge runs equally well from a shell, a systemd unit, or a
//! container. Validation happens once at startup; a bad value is a fatal
//! [`ReciboError::Config`] before anything connects.

use std::time::Duration;

use clap::Args;

use crate::error::{ReciboError, Result};
use crate::mqtt::MqttSettings;
use crate::printer::PrinterOptions;

/// Heartbeat interval bounds, in seconds.
const HEARTBEAT_RANGE: std::ops::RangeInclusive<u64> = 1..=300;

/// Bridge configuration.
#[derive(Debug, Clone, Args)]
pub struct Config {
    /// MQTT broker hostname
    #[arg(long, env = "MQTT_BROKER", default_value = "localhost")]
    pub mqtt_broker: String,

    /// MQTT broker port
    #[arg(long, env = "MQTT_PORT", default_value_t = 1883)]
    pub mqtt_port: u16,

    /// MQTT username; also the account segment of every topic
    #[arg(long, env = "MQTT_USERNAME")]
    pub mqtt_username: String,

    /// MQTT password
    #[arg(long, env = "MQTT_PASSWORD", hide_env_values = true)]
    pub mqtt_password: String,

    /// MQTT keepalive in seconds
    #[arg(long, env = "MQTT_KEEPALIVE", default_value_t = 60)]
    pub mqtt_keepalive: u64,

    /// System print queue name
    #[arg(long, env = "PRINTER_NAME", default_value = "thermal_80mm")]
    pub printer_name: String,

    /// Raw printer device node, tried when the queue is unavailable
    /// (e.g. /dev/usb/lp0)
    #[arg(long, env = "PRINTER_DEVICE")]
    pub printer_device: Option<String>,

    /// Stable printer identity used in topic paths; "auto" derives one
    /// from the machine id
    #[arg(long, env = "PRINTER_ID", default_value = "auto")]
    pub printer_id: String,

    /// Heartbeat interval in seconds (1-300)
    #[arg(long, env = "HEARTBEAT_INTERVAL", default_value_t = 30)]
    pub heartbeat_interval: u64,

    /// Consecutive failed reconnects before the bridge gives up
    #[arg(long, env = "MAX_RECOVERY_ATTEMPTS", default_value_t = 5)]
    pub max_recovery_attempts: u32,
}

impl Config {
    /// Validate value ranges. Called once at startup.
    pub fn validate(&self) -> Result<()> {
        if self.mqtt_broker.is_empty() {
            return Err(ReciboError::Config("MQTT broker is required".to_string()));
        }
        if self.mqtt_username.is_empty() {
            return Err(ReciboError::Config("MQTT username is required".to_string()));
        }
        if self.mqtt_password.is_empty() {
            return Err(ReciboError::Config("MQTT password is required".to_string()));
        }
        if self.printer_name.is_empty() {
            return Err(ReciboError::Config("printer name is required".to_string()));
        }
        if !HEARTBEAT_RANGE.contains(&self.heartbeat_interval) {
            return Err(ReciboError::Config(format!(
                "heartbeat interval must be between {} and {} seconds",
                HEARTBEAT_RANGE.start(),
                HEARTBEAT_RANGE.end()
            )));
        }
        if self.max_recovery_attempts == 0 {
            return Err(ReciboError::Config(
                "max recovery attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The printer identity: the configured value with separator colons
    /// stripped, or a machine-derived one when set to "auto".
    pub fn resolved_printer_id(&self) -> String {
        if self.printer_id != "auto" {
            return self.printer_id.replace(':', "");
        }

        match std::fs::read_to_string("/etc/machine-id") {
            Ok(id) => id.trim().chars().take(12).collect(),
            Err(_) => uuid::Uuid::new_v4().simple().to_string()[..12].to_string(),
        }
    }

    /// Assemble the MQTT settings, fixing the printer id for the lifetime
    /// of the process.
    pub fn mqtt_settings(&self) -> MqttSettings {
        let printer_id = self.resolved_printer_id();
        MqttSettings {
            broker: self.mqtt_broker.clone(),
            port: self.mqtt_port,
            username: self.mqtt_username.clone(),
            password: self.mqtt_password.clone(),
            keepalive: Duration::from_secs(self.mqtt_keepalive),
            client_id: format!("PrinterClient-{}", printer_id),
            printer_id,
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval),
        }
    }

    pub fn printer_options(&self) -> PrinterOptions {
        PrinterOptions {
            queue_name: self.printer_name.clone(),
            device_path: self.printer_device.clone(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            mqtt_broker: "broker.example.com".to_string(),
            mqtt_port: 1883,
            mqtt_username: "acct1".to_string(),
            mqtt_password: "secret".to_string(),
            mqtt_keepalive: 60,
            printer_name: "thermal_80mm".to_string(),
            printer_device: None,
            printer_id: "AA:BB:CC:DD:EE:FF".to_string(),
            heartbeat_interval: 30,
            max_recovery_attempts: 5,
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let mut config = base_config();
        config.mqtt_username = String::new();
        assert!(config.validate().is_err());

        let mut config = base_config();
        config.mqtt_password = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_heartbeat_bounds() {
        let mut config = base_config();
        config.heartbeat_interval = 0;
        assert!(config.validate().is_err());

        config.heartbeat_interval = 301;
        assert!(config.validate().is_err());

        config.heartbeat_interval = 1;
        assert!(config.validate().is_ok());
        config.heartbeat_interval = 300;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_printer_id_strips_colons() {
        let config = base_config();
        assert_eq!(config.resolved_printer_id(), "AABBCCDDEEFF");
    }

    #[test]
    fn test_auto_printer_id_nonempty() {
        let mut config = base_config();
        config.printer_id = "auto".to_string();
        assert!(!config.resolved_printer_id().is_empty());
    }

    #[test]
    fn test_mqtt_settings_assembly() {
        let settings = base_config().mqtt_settings();
        assert_eq!(settings.printer_id, "AABBCCDDEEFF");
        assert_eq!(settings.client_id, "PrinterClient-AABBCCDDEEFF");
        assert_eq!(settings.keepalive, Duration::from_secs(60));
        assert_eq!(settings.heartbeat_interval, Duration::from_secs(30));
    }
}
