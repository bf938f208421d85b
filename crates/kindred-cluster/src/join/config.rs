//! Join configuration rendering.
//!
//! The configuration is JSON, which kubeadm reads as YAML.

use kindred_types::{DiscoveryMode, IpFamily, KubeVersion, MinorVersion};
use serde_json::{json, Map, Value};
use tracing::debug;

use super::JoinOptions;
use crate::cluster::Cluster;
use crate::constants::{
    ADMIN_KUBECONFIG_PATH, API_SERVER_PORT, BOOTSTRAP_TOKEN, CERTIFICATE_KEY, CRI_SOCKET,
    DISCOVERY_FILE_PATH, KUBEADM_CONFIG_PATH,
};
use crate::loadbalancer::join_host_port;
use crate::node::Node;
use crate::{Error, Result};

/// The kubeadm configuration API version a kubeadm release understands.
pub fn kubeadm_api_version(kubeadm: &KubeVersion) -> &'static str {
    if !kubeadm.is_at_least(MinorVersion::new(1, 15)) {
        "kubeadm.k8s.io/v1beta1"
    } else if !kubeadm.is_at_least(MinorVersion::new(1, 22)) {
        "kubeadm.k8s.io/v1beta2"
    } else if !kubeadm.is_at_least(MinorVersion::new(1, 31)) {
        "kubeadm.k8s.io/v1beta3"
    } else {
        "kubeadm.k8s.io/v1beta4"
    }
}

/// `address:port` of the API server joining nodes talk to: the external load
/// balancer if there is one, else the bootstrap control plane.
fn api_server_endpoint(cluster: &Cluster, family: IpFamily) -> Result<String> {
    let endpoint_node = cluster
        .external_load_balancer()
        .or_else(|| cluster.bootstrap_control_plane())
        .ok_or_else(|| Error::InvariantViolation("no API server endpoint".to_string()))?;
    Ok(join_host_port(
        endpoint_node.address(family)?,
        API_SERVER_PORT,
    ))
}

fn kubelet_extra_args(api_version: &str, node_ip: &str) -> Value {
    let args = [("fail-swap-on", "false"), ("node-ip", node_ip)];
    if api_version.ends_with("v1beta4") {
        Value::Array(
            args.iter()
                .map(|(name, value)| json!({ "name": name, "value": value }))
                .collect(),
        )
    } else {
        Value::Object(
            args.iter()
                .map(|(name, value)| ((*name).to_string(), json!(value)))
                .collect(),
        )
    }
}

/// Renders the `JoinConfiguration` for a node.
pub fn render_join_config(cluster: &Cluster, node: &Node, options: &JoinOptions) -> Result<String> {
    let family = cluster.settings.ip_family;
    let api_version = kubeadm_api_version(node.kubeadm_version()?);
    let node_ip = node.address(family)?;

    let discovery = match options.discovery {
        DiscoveryMode::Token => json!({
            "bootstrapToken": {
                "apiServerEndpoint": api_server_endpoint(cluster, family)?,
                "token": BOOTSTRAP_TOKEN,
                "unsafeSkipCAVerification": true,
            }
        }),
        DiscoveryMode::FileWithEmbeddedClientCertificates => json!({
            "file": { "kubeConfigPath": DISCOVERY_FILE_PATH }
        }),
    };

    let mut config = Map::new();
    config.insert("apiVersion".into(), json!(api_version));
    config.insert("kind".into(), json!("JoinConfiguration"));
    config.insert("discovery".into(), discovery);
    config.insert(
        "nodeRegistration".into(),
        json!({
            "criSocket": CRI_SOCKET,
            "kubeletExtraArgs": kubelet_extra_args(api_version, node_ip),
        }),
    );

    if node.is_control_plane() {
        let mut control_plane = json!({
            "localAPIEndpoint": {
                "advertiseAddress": node_ip,
                "bindPort": API_SERVER_PORT,
            }
        });
        if options.automatic_copy_certs {
            control_plane["certificateKey"] = json!(CERTIFICATE_KEY);
        }
        config.insert("controlPlane".into(), control_plane);
    }

    serde_json::to_string_pretty(&Value::Object(config)).map_err(|e| Error::UnexpectedOutput {
        node: node.name().clone(),
        operation: "render join configuration".to_string(),
        message: e.to_string(),
    })
}

/// Writes the join configuration to the node, copying the discovery
/// kubeconfig first when file discovery is used.
pub(super) fn write_join_config(
    cluster: &Cluster,
    node: &Node,
    options: &JoinOptions,
) -> Result<()> {
    if options.discovery == DiscoveryMode::FileWithEmbeddedClientCertificates {
        copy_discovery_file(cluster, node)?;
    }

    let rendered = render_join_config(cluster, node, options)?;
    debug!(node = %node.name(), path = KUBEADM_CONFIG_PATH, "writing join configuration");
    node.write_file(KUBEADM_CONFIG_PATH, rendered.as_bytes())
}

fn copy_discovery_file(cluster: &Cluster, node: &Node) -> Result<()> {
    let bootstrap = cluster
        .bootstrap_control_plane()
        .ok_or_else(|| Error::InvariantViolation("no bootstrap control plane".to_string()))?;

    let staging = tempfile::NamedTempFile::new().map_err(|e| Error::io(std::env::temp_dir(), e))?;
    bootstrap.copy_from(ADMIN_KUBECONFIG_PATH, staging.path())?;
    node.mkdir_all("/kinder")?;
    node.copy_to(staging.path(), DISCOVERY_FILE_PATH)
}
