//! Network bootstrapping for a workspace's network namespace.
//!
//! Bridges the container's private network to the host uplink through a
//! veth pair and NAT.

pub mod veth;
