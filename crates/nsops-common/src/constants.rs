//! System-wide constants and default paths.

/// Binary name for the CLI.
pub const BIN_NAME: &str = "nsops";

/// Environment variable carrying the workspace instance identifier.
///
/// Used for diagnostics only.
pub const INSTANCE_ID_ENV: &str = "GITPOD_INSTANCE_ID";

/// Environment variable pointing at an optional JSON configuration file.
pub const CONFIG_ENV: &str = "NSOPS_CONFIG";

/// Default path of the `ip` networking tool.
pub const DEFAULT_IP_BIN: &str = "/usr/sbin/ip";

/// Default path of the `iptables` firewall tool.
pub const DEFAULT_IPTABLES_BIN: &str = "/usr/sbin/iptables";

/// Directory in which named network namespaces are published.
pub const DEFAULT_NETNS_DIR: &str = "/var/run/netns";

/// Root of the device tree prepared by `prepare-dev`.
pub const DEFAULT_DEV_DIR: &str = "/dev";

/// Location of the FUSE overlay helper, relative to the overlay source.
pub const DEFAULT_FUSE_OVERLAYFS_REL: &str = ".supervisor/fuse-overlayfs";

/// Host-side veth endpoint name.
pub const DEFAULT_HOST_VETH: &str = "veth0";

/// Container-side veth endpoint name.
pub const DEFAULT_CONTAINER_VETH: &str = "ceth0";

/// Address assigned to the host-side endpoint.
pub const DEFAULT_HOST_ADDR: &str = "10.0.5.1/24";

/// Address assigned to the container-side endpoint.
pub const DEFAULT_CONTAINER_ADDR: &str = "10.0.5.2";

/// Host interface that carries workspace egress traffic.
pub const DEFAULT_UPLINK: &str = "eth0";

/// Source subnet masqueraded on the uplink.
pub const DEFAULT_MASQUERADE_SUBNET: &str = "10.0.5.0/24";

/// TUN device major/minor numbers.
pub const TUN_DEVICE: (u64, u64) = (10, 200);

/// FUSE device major/minor numbers.
pub const FUSE_DEVICE: (u64, u64) = (10, 229);

/// Permission bits applied to provisioned device nodes.
pub const DEVICE_MODE: u32 = 0o666;

/// Permission bits for directories created under the device tree.
pub const DEVICE_DIR_MODE: u32 = 0o755;
