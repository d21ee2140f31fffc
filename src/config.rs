//! Controller configuration
//!
//! The identity a controller runs with: where it binds, where it
//! broadcasts, which Port-Address it owns and how it describes itself in
//! ArtPollReply. Persisted as TOML.

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::{Path, PathBuf};

use crate::constants::DEFAULT_FRAME_RATE;
use crate::error::ConfigError;
use crate::protocol::{PortAddress, ARTNET_PORT};

/// Controller identity and runtime options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Local address to bind (0.0.0.0 for all interfaces)
    pub bind_address: Ipv4Addr,

    /// UDP port for sending and receiving
    pub port: u16,

    /// Destination for broadcast ArtDmx and ArtPoll
    pub broadcast_address: Ipv4Addr,

    /// The single universe this controller sends and listens to
    pub address: PortAddress,

    /// ShortName reported in ArtPollReply (17 characters on the wire)
    pub short_name: String,

    /// LongName reported in ArtPollReply (63 characters on the wire)
    pub long_name: String,

    /// NodeReport text reported in ArtPollReply
    pub node_report: String,

    /// OEM code reported in ArtPollReply
    pub oem: u16,

    /// ESTA manufacturer code reported in ArtPollReply
    pub esta_manufacturer: u16,

    /// MAC address reported in ArtPollReply
    pub mac: [u8; 6],

    /// Whether `send_dmx` transmits at all
    pub sending_enabled: bool,

    /// Output rate used when a frame generator is attached
    pub frame_rate: u32,

    /// Default tracing filter for binaries
    pub log_level: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            bind_address: Ipv4Addr::UNSPECIFIED,
            port: ARTNET_PORT,
            broadcast_address: Ipv4Addr::BROADCAST,
            address: PortAddress::default(),
            short_name: "ArtNet Controller".to_string(),
            long_name: "Art-Net DMX controller".to_string(),
            node_report: String::new(),
            oem: 0,
            esta_manufacturer: 0,
            mac: [0; 6],
            sending_enabled: true,
            frame_rate: DEFAULT_FRAME_RATE,
            log_level: "info".to_string(),
        }
    }
}

impl ControllerConfig {
    /// Identity bound to all interfaces on the standard port
    pub fn with_address(address: PortAddress) -> Self {
        Self {
            address,
            ..Default::default()
        }
    }

    pub fn bind_socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.bind_address, self.port))
    }

    pub fn broadcast_socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.broadcast_address, self.port))
    }

    /// Check values a TOML file could carry out of range
    ///
    /// Net, subnet and universe need no check; `PortAddress` masks them.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue("port must be non-zero".to_string()));
        }
        if self.frame_rate == 0 {
            return Err(ConfigError::InvalidFrameRate(self.frame_rate));
        }
        if !self.short_name.is_ascii() || !self.long_name.is_ascii() || !self.node_report.is_ascii() {
            return Err(ConfigError::InvalidValue(
                "node names must be ASCII".to_string(),
            ));
        }
        Ok(())
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
        let config: Self = toml::from_str(&text)
            .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Write configuration as TOML, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::Save(format!("{}: {}", parent.display(), e)))?;
        }
        let text = toml::to_string_pretty(self).map_err(|e| ConfigError::Save(e.to_string()))?;
        std::fs::write(path, text)
            .map_err(|e| ConfigError::Save(format!("{}: {}", path.display(), e)))
    }

    /// Platform config location, e.g. `~/.config/artnet-controller/controller.toml`
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "artnet-controller")
            .map(|dirs| dirs.config_dir().join("controller.toml"))
    }

    /// Load from the default location, falling back to defaults
    pub fn load_or_default() -> Self {
        match Self::default_path() {
            Some(path) if path.exists() => match Self::load(&path) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Ignoring configuration file: {}", e);
                    Self::default()
                }
            },
            _ => Self::default(),
        }
    }
}
