//! Global configuration model for the namespace operators.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{NsopsError, Result};

/// Root configuration shared by every action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NsopsConfig {
    /// Path of the `ip` tool.
    pub ip_bin: PathBuf,
    /// Path of the `iptables` tool.
    pub iptables_bin: PathBuf,
    /// Directory where named network namespaces are linked.
    pub netns_dir: PathBuf,
    /// Root of the device tree.
    pub dev_dir: PathBuf,
    /// FUSE overlay helper location, relative to the overlay source.
    pub fuse_overlayfs_rel: PathBuf,
    /// Fixed veth/NAT topology.
    pub bridge: BridgeSettings,
}

impl Default for NsopsConfig {
    fn default() -> Self {
        Self {
            ip_bin: PathBuf::from(constants::DEFAULT_IP_BIN),
            iptables_bin: PathBuf::from(constants::DEFAULT_IPTABLES_BIN),
            netns_dir: PathBuf::from(constants::DEFAULT_NETNS_DIR),
            dev_dir: PathBuf::from(constants::DEFAULT_DEV_DIR),
            fuse_overlayfs_rel: PathBuf::from(constants::DEFAULT_FUSE_OVERLAYFS_REL),
            bridge: BridgeSettings::default(),
        }
    }
}

impl NsopsConfig {
    /// Loads a configuration from a JSON file.
    ///
    /// Fields absent from the file keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON,
    /// or describes an unusable configuration.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| NsopsError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the configuration can drive the operators.
    ///
    /// # Errors
    ///
    /// Returns [`NsopsError::Config`] naming the first unusable field.
    pub fn validate(&self) -> Result<()> {
        let paths = [
            ("ip_bin", &self.ip_bin),
            ("iptables_bin", &self.iptables_bin),
            ("netns_dir", &self.netns_dir),
            ("dev_dir", &self.dev_dir),
        ];
        for (field, path) in paths {
            if !path.is_absolute() {
                return Err(NsopsError::Config {
                    message: format!("{field} must be an absolute path, got {}", path.display()),
                });
            }
        }
        if self.fuse_overlayfs_rel.as_os_str().is_empty() || self.fuse_overlayfs_rel.is_absolute() {
            return Err(NsopsError::Config {
                message: "fuse_overlayfs_rel must be a non-empty relative path".into(),
            });
        }
        self.bridge.validate()
    }
}

/// Interface names and addresses of the workspace network bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    /// Host-side veth endpoint.
    pub host_veth: String,
    /// Container-side veth endpoint.
    pub container_veth: String,
    /// Host-side address in CIDR notation.
    pub host_addr: String,
    /// Container-side address.
    pub container_addr: String,
    /// Uplink interface on the host.
    pub uplink: String,
    /// Subnet masqueraded when leaving via the uplink.
    pub masquerade_subnet: String,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            host_veth: constants::DEFAULT_HOST_VETH.into(),
            container_veth: constants::DEFAULT_CONTAINER_VETH.into(),
            host_addr: constants::DEFAULT_HOST_ADDR.into(),
            container_addr: constants::DEFAULT_CONTAINER_ADDR.into(),
            uplink: constants::DEFAULT_UPLINK.into(),
            masquerade_subnet: constants::DEFAULT_MASQUERADE_SUBNET.into(),
        }
    }
}

impl BridgeSettings {
    fn validate(&self) -> Result<()> {
        let fields = [
            ("host_veth", &self.host_veth),
            ("container_veth", &self.container_veth),
            ("host_addr", &self.host_addr),
            ("container_addr", &self.container_addr),
            ("uplink", &self.uplink),
            ("masquerade_subnet", &self.masquerade_subnet),
        ];
        for (field, value) in fields {
            if value.is_empty() || value.contains(char::is_whitespace) {
                return Err(NsopsError::Config {
                    message: format!("bridge.{field} must be a non-empty token, got {value:?}"),
                });
            }
        }
        if self.host_veth == self.container_veth {
            return Err(NsopsError::Config {
                message: "bridge endpoints must have distinct names".into(),
            });
        }
        Ok(())
    }
}
