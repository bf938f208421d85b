//! Well-known labels, paths and values shared with the node images.

use kindred_types::MinorVersion;

/// Label carrying the name of the cluster a node belongs to.
pub const CLUSTER_LABEL_KEY: &str = "io.x-k8s.kind.cluster";

/// Label carrying the node's comma-separated roles.
pub const ROLE_LABEL_KEY: &str = "io.x-k8s.kind.role";

/// Label that holds a node back from automated workflows when set to `true`.
pub const HOLD_LABEL_KEY: &str = "io.x-k8s.kindred.hold";

/// Rendered join configuration, read by `kubeadm join --config`.
pub const KUBEADM_CONFIG_PATH: &str = "/kind/kubeadm.conf";

/// Cluster settings persisted on every Kubernetes node.
pub const CLUSTER_SETTINGS_PATH: &str = "/kind/cluster-settings.json";

/// Where manifest overlays and patches are staged on a joining node.
pub const PATCHES_DIR: &str = "/kinder/patches";

/// Discovery kubeconfig used by file-based discovery.
pub const DISCOVERY_FILE_PATH: &str = "/kinder/discovery.conf";

pub const ADMIN_KUBECONFIG_PATH: &str = "/etc/kubernetes/admin.conf";

pub const PKI_DIR: &str = "/etc/kubernetes/pki";

pub const LOAD_BALANCER_CONFIG_PATH: &str = "/usr/local/etc/haproxy/haproxy.cfg";

pub const API_SERVER_PORT: u16 = 6443;

pub const CRI_SOCKET: &str = "unix:///run/containerd/containerd.sock";

/// Fixed bootstrap token created by `kubeadm init` on test clusters.
pub const BOOTSTRAP_TOKEN: &str = "abcdef.0123456789abcdef";

/// Fixed key used to upload and download control-plane certificates.
pub const CERTIFICATE_KEY: &str =
    "0123456789012345678901234567890123456789012345678901234567890123";

pub const IGNORE_PREFLIGHT_ERRORS_FLAG: &str = "--ignore-preflight-errors=all";

/// Minimum kubeadm accepting a manifest overlay directory (`-k`).
pub const KUSTOMIZE_MIN_VERSION: MinorVersion = MinorVersion::new(1, 17);

/// Minimum kubeadm accepting a patch directory.
pub const PATCHES_MIN_VERSION: MinorVersion = MinorVersion::new(1, 19);

/// First kubeadm where `--experimental-patches` is spelled `--patches`.
pub const PATCHES_FLAG_GA_VERSION: MinorVersion = MinorVersion::new(1, 22);
