//! Node selectors.
//!
//! A selector is a shortcut for a node or a set of nodes:
//!
//! | Selector | Nodes |
//! |----------|-------|
//! | `@all`   | every Kubernetes node |
//! | `@cp*`   | every control plane |
//! | `@cp1`   | the bootstrap control plane |
//! | `@cpn`   | secondary control planes |
//! | `@w*`    | workers |
//! | `@lb`    | the external load balancer |
//! | `@etcd`  | the external etcd |
//! | `name`   | the Kubernetes node `<cluster>-name` |
//!
//! `@` tokens and names are case-insensitive. A topology-aware path has the
//! form `[selector:]path`.

use std::fmt::Display;
use std::str::FromStr;

use crate::cluster::Cluster;
use crate::node::Node;
use crate::{Error, Result};

/// A parsed node selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    All,
    ControlPlanes,
    BootstrapControlPlane,
    SecondaryControlPlanes,
    Workers,
    LoadBalancer,
    Etcd,
    /// A node name without the `<cluster>-` prefix.
    Name(String),
}

impl FromStr for Selector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if !s.starts_with('@') {
            return Ok(Selector::Name(s.to_string()));
        }

        match s.to_ascii_lowercase().as_str() {
            "@all" => Ok(Selector::All),
            "@cp*" => Ok(Selector::ControlPlanes),
            "@cp1" => Ok(Selector::BootstrapControlPlane),
            "@cpn" => Ok(Selector::SecondaryControlPlanes),
            "@w*" => Ok(Selector::Workers),
            "@lb" => Ok(Selector::LoadBalancer),
            "@etcd" => Ok(Selector::Etcd),
            _ => Err(Error::InvalidSelector {
                selector: s.to_string(),
            }),
        }
    }
}

impl Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Selector::All => write!(f, "@all"),
            Selector::ControlPlanes => write!(f, "@cp*"),
            Selector::BootstrapControlPlane => write!(f, "@cp1"),
            Selector::SecondaryControlPlanes => write!(f, "@cpn"),
            Selector::Workers => write!(f, "@w*"),
            Selector::LoadBalancer => write!(f, "@lb"),
            Selector::Etcd => write!(f, "@etcd"),
            Selector::Name(name) => write!(f, "{name}"),
        }
    }
}

impl Cluster {
    /// Nodes matching a selector. A valid selector with no match is empty.
    pub fn select(&self, selector: &Selector) -> Vec<&Node> {
        match selector {
            Selector::All => self.kubernetes_nodes(),
            Selector::ControlPlanes => self.control_planes(),
            Selector::BootstrapControlPlane => self.bootstrap_control_plane().into_iter().collect(),
            Selector::SecondaryControlPlanes => self.secondary_control_planes(),
            Selector::Workers => self.workers(),
            Selector::LoadBalancer => self.external_load_balancer().into_iter().collect(),
            Selector::Etcd => self.external_etcd().into_iter().collect(),
            Selector::Name(suffix) => {
                let wanted = format!("{}-{suffix}", self.name());
                self.kubernetes_nodes()
                    .into_iter()
                    .filter(|n| n.name().as_str().eq_ignore_ascii_case(&wanted))
                    .take(1)
                    .collect()
            }
        }
    }

    /// Parses and resolves a selector string.
    pub fn select_nodes(&self, selector: &str) -> Result<Vec<&Node>> {
        Ok(self.select(&selector.parse()?))
    }

    /// Splits a `[selector:]path` into its nodes and residual path.
    ///
    /// Without a `:` the node set is `None` and the whole input is the path.
    pub fn resolve_nodes_path<'a>(
        &'a self,
        nodes_path: &str,
    ) -> Result<(Option<Vec<&'a Node>>, String)> {
        let parts: Vec<&str> = nodes_path.split(':').collect();
        match parts.as_slice() {
            [path] => Ok((None, (*path).to_string())),
            [selector, path] => Ok((Some(self.select_nodes(selector)?), (*path).to_string())),
            _ => Err(Error::InvalidNodesPath(nodes_path.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use test_case::test_case;

    use super::*;
    use crate::sim::{SimNode, SimProvider, SimWorld};

    const NODES: [&str; 6] = [
        "kind-control-plane",
        "kind-control-plane2",
        "kind-control-plane3",
        "kind-worker",
        "kind-worker2",
        "kind-lb",
    ];

    fn sim_node(name: &str) -> SimNode {
        if name.contains("control-plane") {
            SimNode::control_plane("kind", name)
        } else if name.contains("worker") {
            SimNode::worker("kind", name)
        } else {
            SimNode::load_balancer("kind", name)
        }
    }

    fn cluster_in_order(order: &[usize]) -> Cluster {
        let world = SimWorld::new();
        for i in order {
            world.add_node(sim_node(NODES[*i]));
        }
        Cluster::discover(&SimProvider::new(world), "kind").unwrap()
    }

    fn cluster() -> Cluster {
        cluster_in_order(&[0, 1, 2, 3, 4, 5])
    }

    const CP1: &str = "kind-control-plane";
    const CP2: &str = "kind-control-plane2";
    const CP3: &str = "kind-control-plane3";

    fn selected(cluster: &Cluster, selector: &str) -> Vec<String> {
        cluster
            .select_nodes(selector)
            .unwrap()
            .iter()
            .map(|n| n.name().to_string())
            .collect()
    }

    #[test_case(
        "@all",
        &[CP1, CP2, CP3, "kind-worker", "kind-worker2"];
        "all kubernetes nodes"
    )]
    #[test_case("@cp*", &[CP1, CP2, CP3]; "control planes")]
    #[test_case("@CP1", &["kind-control-plane"]; "bootstrap case insensitive")]
    #[test_case("@cpn", &[CP2, CP3]; "secondary control planes")]
    #[test_case("@w*", &["kind-worker", "kind-worker2"]; "workers")]
    #[test_case("@lb", &["kind-lb"]; "load balancer")]
    #[test_case("@etcd", &[]; "absent etcd is empty")]
    #[test_case("Worker2", &["kind-worker2"]; "name suffix")]
    #[test_case("lb", &[]; "load balancer is not a kubernetes node")]
    #[test_case("worker9", &[]; "unknown name is empty")]
    fn selects(selector: &str, expected: &[&str]) {
        assert_eq!(selected(&cluster(), selector), expected);
    }

    #[test]
    fn unknown_at_token_lists_valid_selectors() {
        let err = cluster().select_nodes("@masters").unwrap_err();
        assert!(matches!(err, Error::InvalidSelector { .. }));
        let message = err.to_string();
        for valid in ["@all", "@cp*", "@cp1", "@cpn", "@w*", "@lb", "@etcd"] {
            assert!(message.contains(valid), "{message} lacks {valid}");
        }
    }

    #[test]
    fn selector_display_round_trips() {
        for token in ["@all", "@cp*", "@cp1", "@cpn", "@w*", "@lb", "@etcd", "worker"] {
            assert_eq!(token.parse::<Selector>().unwrap().to_string(), token);
        }
    }

    #[test]
    fn nodes_path_without_selector() {
        let cluster = cluster();
        let (nodes, path) = cluster.resolve_nodes_path("/etc/kubernetes").unwrap();
        assert!(nodes.is_none());
        assert_eq!(path, "/etc/kubernetes");
    }

    #[test]
    fn nodes_path_with_selector() {
        let cluster = cluster();
        let (nodes, path) = cluster.resolve_nodes_path("@cpn:/kind/kubeadm.conf").unwrap();
        assert_eq!(nodes.unwrap().len(), 2);
        assert_eq!(path, "/kind/kubeadm.conf");
    }

    #[test]
    fn nodes_path_errors() {
        let cluster = cluster();
        assert!(matches!(
            cluster.resolve_nodes_path("@cp1:/a:/b"),
            Err(Error::InvalidNodesPath(_))
        ));
        assert!(matches!(
            cluster.resolve_nodes_path("@nope:/a"),
            Err(Error::InvalidSelector { .. })
        ));
    }

    proptest! {
        #[test]
        fn bootstrap_selector_ignores_discovery_order(
            order in Just((0..NODES.len()).collect::<Vec<_>>()).prop_shuffle()
        ) {
            let cluster = cluster_in_order(&order);
            let first = cluster.control_planes()[0].name().to_string();
            prop_assert_eq!(selected(&cluster, "@cp1"), vec![first.clone()]);
            prop_assert_eq!(first, "kind-control-plane");
        }
    }
}
