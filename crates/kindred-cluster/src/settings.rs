//! Cluster settings persisted on the nodes.
//!
//! Nodes are created and configured by separate invocations, so settings that
//! shape the cluster (the IP family) are stored on every Kubernetes node and
//! read back from the bootstrap control plane.

use kindred_types::IpFamily;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cluster::Cluster;
use crate::constants::CLUSTER_SETTINGS_PATH;
use crate::node::{args, Node};
use crate::{Error, Result};

/// Settings stored in the cluster and reused across invocations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterSettings {
    pub ip_family: IpFamily,
}

impl ClusterSettings {
    fn read_from(node: &Node) -> Result<Self> {
        let raw = node.exec("cat", &args(&[CLUSTER_SETTINGS_PATH]))?;
        serde_json::from_str(&raw).map_err(|e| Error::UnexpectedOutput {
            node: node.name().clone(),
            operation: format!("cat {CLUSTER_SETTINGS_PATH}"),
            message: e.to_string(),
        })
    }

    fn write_to(&self, node: &Node) -> Result<()> {
        let encoded = serde_json::to_vec(self).map_err(|e| Error::UnexpectedOutput {
            node: node.name().clone(),
            operation: "encode cluster settings".to_string(),
            message: e.to_string(),
        })?;
        node.write_file(CLUSTER_SETTINGS_PATH, &encoded)
    }
}

impl Cluster {
    /// Replaces the in-memory settings with those on the bootstrap control plane.
    pub fn read_settings(&mut self) -> Result<()> {
        debug!(cluster = %self.name(), "reading cluster settings");
        let bootstrap = self.bootstrap_control_plane().ok_or_else(|| {
            Error::InvariantViolation("no control-plane node to read cluster settings from".into())
        })?;

        let settings = ClusterSettings::read_from(bootstrap).map_err(|e| Error::Settings {
            node: bootstrap.name().clone(),
            operation: "read",
            source: Box::new(e),
        })?;
        self.settings = settings;
        Ok(())
    }

    /// Writes the in-memory settings to every Kubernetes node.
    ///
    /// Stops at the first failure; nodes written before it keep the new value.
    pub fn write_settings(&self) -> Result<()> {
        debug!(cluster = %self.name(), settings = ?self.settings, "writing cluster settings");
        for node in self.kubernetes_nodes() {
            self.settings.write_to(node).map_err(|e| Error::Settings {
                node: node.name().clone(),
                operation: "write",
                source: Box::new(e),
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimNode, SimProvider, SimWorld};

    fn world() -> SimWorld {
        let world = SimWorld::new();
        world.add_node(SimNode::control_plane("kind", "kind-control-plane"));
        world.add_node(SimNode::control_plane("kind", "kind-control-plane2"));
        world.add_node(SimNode::worker("kind", "kind-worker"));
        world.add_node(SimNode::load_balancer("kind", "kind-lb"));
        world
    }

    #[test]
    fn json_shape() {
        let settings = ClusterSettings {
            ip_family: IpFamily::Ipv6,
        };
        assert_eq!(
            serde_json::to_string(&settings).unwrap(),
            r#"{"ipFamily":"ipv6"}"#
        );
        assert_eq!(
            serde_json::from_str::<ClusterSettings>("{}").unwrap(),
            ClusterSettings::default()
        );
    }

    #[test]
    fn write_then_read_round_trips() {
        let world = world();
        let provider = SimProvider::new(world.clone());
        let mut cluster = Cluster::discover(&provider, "kind").unwrap();
        cluster.settings.ip_family = IpFamily::Ipv6;
        cluster.write_settings().unwrap();

        let mut fresh = Cluster::discover(&provider, "kind").unwrap();
        assert_eq!(fresh.settings.ip_family, IpFamily::Ipv4);
        fresh.read_settings().unwrap();
        assert_eq!(fresh.settings, cluster.settings);
    }

    #[test]
    fn write_reaches_every_kubernetes_node_only() {
        let world = world();
        let cluster = Cluster::discover(&SimProvider::new(world.clone()), "kind").unwrap();
        cluster.write_settings().unwrap();

        for name in ["kind-control-plane", "kind-control-plane2", "kind-worker"] {
            assert!(world.file(name, CLUSTER_SETTINGS_PATH).is_some(), "{name}");
        }
        assert!(world.file("kind-lb", CLUSTER_SETTINGS_PATH).is_none());
    }

    #[test]
    fn write_failure_names_node_and_stops() {
        let world = SimWorld::new();
        world.add_node(SimNode::control_plane("kind", "kind-control-plane"));
        world.add_node(SimNode::worker("kind", "kind-worker").fail_on("mkdir"));
        world.add_node(SimNode::worker("kind", "kind-worker2"));
        let cluster = Cluster::discover(&SimProvider::new(world.clone()), "kind").unwrap();

        let err = cluster.write_settings().unwrap_err();
        assert!(matches!(err, Error::Settings { operation: "write", .. }));
        assert_eq!(err.node().map(|n| n.as_str()), Some("kind-worker"));
        assert!(world.file("kind-control-plane", CLUSTER_SETTINGS_PATH).is_some());
        assert!(world.file("kind-worker2", CLUSTER_SETTINGS_PATH).is_none());
    }

    #[test]
    fn read_failure_names_bootstrap_node() {
        let world = world();
        let mut cluster = Cluster::discover(&SimProvider::new(world), "kind").unwrap();

        let err = cluster.read_settings().unwrap_err();
        assert!(matches!(err, Error::Settings { operation: "read", .. }));
        assert_eq!(err.node().map(|n| n.as_str()), Some("kind-control-plane"));
    }

    #[test]
    fn garbage_settings_file_is_unexpected_output() {
        let world = world();
        world.put_file("kind-control-plane", CLUSTER_SETTINGS_PATH, b"not json");
        let mut cluster = Cluster::discover(&SimProvider::new(world), "kind").unwrap();

        match cluster.read_settings().unwrap_err() {
            Error::Settings { source, .. } => {
                assert!(matches!(*source, Error::UnexpectedOutput { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
