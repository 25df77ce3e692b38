//! fleetgate.toml configuration parser.
//!
//! Every section is optional; a missing key falls back to the reference
//! deployment's constants. Durations are human strings (`"5s"`, `"1m"`).

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::types::{FleetTag, LaunchTemplate, ScalingPolicy};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FleetgateConfig {
    pub server: ServerConfig,
    pub gateway: GatewayConfig,
    pub queues: QueueConfig,
    pub poller: PollerConfig,
    pub fleet: FleetConfig,
    pub scaling: ScalingPolicy,
    pub drain: DrainConfig,
    pub supervisor: SupervisorConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    /// Largest accepted upload, in bytes.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    /// Upper bound on how long a submission waits for its result.
    /// Unset means wait until the result arrives or the daemon shuts down.
    #[serde(
        with = "crate::duration::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub deadline: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueueConfig {
    pub request_url: String,
    pub response_url: String,
    /// How long a received message stays invisible before redelivery.
    #[serde(with = "crate::duration")]
    pub visibility_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            request_url: "memory://requests".to_string(),
            response_url: "memory://responses".to_string(),
            visibility_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PollerConfig {
    /// Messages requested per receive call.
    pub batch_size: usize,
    /// Long-poll wait per receive call.
    #[serde(with = "crate::duration")]
    pub wait: Duration,
    /// Pause after a failed receive.
    #[serde(with = "crate::duration")]
    pub error_backoff: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            wait: Duration::from_secs(5),
            error_backoff: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FleetConfig {
    pub tag_key: String,
    pub tag_value: String,
    pub image_id: String,
    pub instance_type: String,
    /// Simulated boot time for the in-memory provisioner.
    #[serde(with = "crate::duration")]
    pub boot_delay: Duration,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            tag_key: "Name".to_string(),
            tag_value: "app-tier-instance".to_string(),
            image_id: "ami-00000000".to_string(),
            instance_type: "t2.micro".to_string(),
            boot_delay: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DrainConfig {
    #[serde(with = "crate::duration")]
    pub interval: Duration,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SupervisorConfig {
    /// Pause before restarting a loop that panicked.
    #[serde(with = "crate::duration")]
    pub restart_delay: Duration,
    /// How long shutdown waits for loops before aborting them.
    #[serde(with = "crate::duration")]
    pub shutdown_grace: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            restart_delay: Duration::from_secs(1),
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

impl FleetgateConfig {
    /// Load and validate a config file.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate config text.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: FleetgateConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values the control loops cannot run with.
    pub fn validate(&self) -> ConfigResult<()> {
        let s = &self.scaling;
        if s.ceiling == 0 {
            return Err(invalid("scaling.ceiling must be at least 1"));
        }
        if s.batch_size == 0 {
            return Err(invalid("scaling.batch_size must be at least 1"));
        }
        if s.max_creates_per_tick == 0 {
            return Err(invalid("scaling.max_creates_per_tick must be at least 1"));
        }
        if s.tick.is_zero() {
            return Err(invalid("scaling.tick must be non-zero"));
        }
        if self.drain.interval.is_zero() {
            return Err(invalid("drain.interval must be non-zero"));
        }
        if self.poller.batch_size == 0 {
            return Err(invalid("poller.batch_size must be at least 1"));
        }
        if self.poller.wait.is_zero() {
            return Err(invalid("poller.wait must be non-zero"));
        }
        if self.gateway.deadline.is_some_and(|d| d.is_zero()) {
            return Err(invalid("gateway.deadline must be non-zero when set"));
        }
        if self.fleet.tag_key.is_empty() || self.fleet.tag_value.is_empty() {
            return Err(invalid("fleet.tag_key and fleet.tag_value must be set"));
        }
        Ok(())
    }

    pub fn fleet_tag(&self) -> FleetTag {
        FleetTag::new(&self.fleet.tag_key, &self.fleet.tag_value)
    }

    pub fn launch_template(&self) -> LaunchTemplate {
        LaunchTemplate {
            image_id: self.fleet.image_id.clone(),
            instance_type: self.fleet.instance_type.clone(),
            tag: self.fleet_tag(),
        }
    }
}

fn invalid(msg: &str) -> ConfigError {
    ConfigError::Invalid(msg.to_string())
}
