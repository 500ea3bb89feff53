// SPDX-License-Identifier: Apache-2.0
// Copyright Gameplane Authors

//! Well-known label and annotation keys.
//!
//! Everything under the `gameplane.io/` domain belongs to this control plane.
//! The pod-name selector label follows the statefulset convention so the
//! materialized services select exactly one pod.

/// Pod annotation selecting the network plugin by name. Absent annotation
/// means the pod is not dispatched at all.
pub const NETWORK_TYPE: &str = "gameplane.io/network-type";
/// Pod annotation carrying the JSON list of `{name, value}` config pairs.
pub const NETWORK_CONF: &str = "gameplane.io/network-conf";
/// Pod annotation carrying the JSON network status published back by plugins.
pub const NETWORK_STATUS: &str = "gameplane.io/network-status";
/// Pod annotation flipping external exposure off ("true") and on.
pub const NETWORK_DISABLED: &str = "gameplane.io/network-disabled";

/// Readiness gate installed on pods whose service endpoints must include
/// not-ready containers.
pub const READINESS_GATE: &str = "gameplane.io/network-ready";

/// Pod label naming the owning workload (game-server set).
pub const OWNER_WORKLOAD: &str = "gameplane.io/owner-workload";
/// Label stamped on every object a plugin materializes; the value is the
/// plugin name and `init` uses it as its list filter.
pub const MANAGED_BY: &str = "gameplane.io/managed-by";
/// Statefulset-style pod-name label used as the service selector.
pub const POD_NAME: &str = "statefulset.kubernetes.io/pod-name";
/// Shared-LB plugins label each pod with its chosen load balancer so the
/// per-LB service selector enrolls it.
pub const SHARED_LB: &str = "gameplane.io/shared-lb";

/// Service annotation binding the service to a provider load balancer id.
pub const LB_ID: &str = "gameplane.io/lb-id";
/// Service annotation telling the provider controller to manage listeners
/// from the service ports rather than hand-configured ones.
pub const LB_LISTENER_OVERRIDE: &str = "gameplane.io/lb-listener-override";
/// Service annotation holding the opaque config fingerprint used to detect
/// drift between the materialized service and the current pod config.
pub const CONFIG_HASH: &str = "gameplane.io/config-hash";
/// Service annotation telling the provider controller to publish endpoints
/// for not-yet-ready pods.
pub const ALLOW_NOT_READY: &str = "gameplane.io/allow-not-ready";
/// Multi-LB service annotation recording which bank the ports came from.
pub const LB_BANK: &str = "gameplane.io/lb-bank";
/// Multi-LB service annotation recording the ISP group the service exposes.
pub const LB_GROUP: &str = "gameplane.io/lb-group";

/// NAT-gateway pod annotations consumed by the DNAT controller.
pub const DNAT_PORTS: &str = "gameplane.io/dnat-ports";
pub const DNAT_PROTOCOL: &str = "gameplane.io/dnat-protocol";
pub const DNAT_FIXED: &str = "gameplane.io/dnat-fixed";

/// Host-port pod annotation: CSV of `containerPort:hostPort` assignments.
pub const HOST_PORTS: &str = "gameplane.io/host-ports";

/// Health-check service annotations, derived from the parsed config.
pub const HEALTH_SWITCH: &str = "gameplane.io/health-check-switch";
pub const HEALTH_TYPE: &str = "gameplane.io/health-check-type";
pub const HEALTH_CONNECT_PORT: &str = "gameplane.io/health-check-connect-port";
pub const HEALTH_CONNECT_TIMEOUT: &str = "gameplane.io/health-check-connect-timeout";
pub const HEALTH_INTERVAL: &str = "gameplane.io/health-check-interval";
pub const HEALTH_URI: &str = "gameplane.io/health-check-uri";
pub const HEALTH_DOMAIN: &str = "gameplane.io/health-check-domain";
pub const HEALTH_METHOD: &str = "gameplane.io/health-check-method";
pub const HEALTH_HEALTHY_THRESHOLD: &str = "gameplane.io/health-check-healthy-threshold";
pub const HEALTH_UNHEALTHY_THRESHOLD: &str = "gameplane.io/health-check-unhealthy-threshold";
