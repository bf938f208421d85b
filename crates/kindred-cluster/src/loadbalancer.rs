//! External load balancer configuration.
//!
//! The load balancer fronts the API servers of every joined control plane.
//! Its configuration is a pure function of the current backend membership:
//! the same set of control planes always renders the same bytes, whatever
//! order they joined in.

use std::collections::BTreeMap;

use kindred_types::IpFamily;
use tracing::{debug, info};

use crate::constants::{API_SERVER_PORT, LOAD_BALANCER_CONFIG_PATH};
use crate::node::{args, Node};
use crate::{Error, Result};

const HAPROXY_PREAMBLE: &str = r"# generated by kindred, do not edit
global
  log /dev/log local0
  log /dev/log local1 notice
  daemon

resolvers docker
  nameserver dns 127.0.0.11:53

defaults
  log global
  mode tcp
  option dontlognull
  timeout connect 5000
  timeout client 50000
  timeout server 50000
  default-server init-addr none

";

/// Formats `address:port`, bracketing IPv6 addresses.
pub fn join_host_port(address: &str, port: u16) -> String {
    if address.contains(':') {
        format!("[{address}]:{port}")
    } else {
        format!("{address}:{port}")
    }
}

/// Backend membership of the load balancer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadBalancerConfig {
    ip_family: IpFamily,
    /// Node name to `address:port`.
    backends: BTreeMap<String, String>,
}

impl LoadBalancerConfig {
    pub fn new(ip_family: IpFamily) -> Self {
        Self {
            ip_family,
            backends: BTreeMap::new(),
        }
    }

    /// Builds the membership from control-plane nodes.
    pub fn from_nodes<'a>(
        ip_family: IpFamily,
        control_planes: impl IntoIterator<Item = &'a Node>,
    ) -> Result<Self> {
        let mut config = Self::new(ip_family);
        for node in control_planes {
            config.add_backend(node.name().as_str(), node.address(ip_family)?);
        }
        Ok(config)
    }

    pub fn add_backend(&mut self, name: &str, address: &str) {
        self.backends
            .insert(name.to_string(), join_host_port(address, API_SERVER_PORT));
    }

    pub fn backends(&self) -> &BTreeMap<String, String> {
        &self.backends
    }

    /// Renders the haproxy configuration.
    pub fn render(&self) -> String {
        let resolve_prefer = match self.ip_family {
            IpFamily::Ipv4 => "ipv4",
            IpFamily::Ipv6 => "ipv6",
        };

        let mut out = String::from(HAPROXY_PREAMBLE);

        out.push_str("frontend control-plane\n");
        out.push_str(&format!("  bind *:{API_SERVER_PORT}\n"));
        if self.ip_family == IpFamily::Ipv6 {
            out.push_str(&format!("  bind :::{API_SERVER_PORT}\n"));
        }
        out.push_str("  default_backend kube-apiservers\n\n");

        out.push_str("backend kube-apiservers\n");
        out.push_str("  option httpchk GET /healthz\n");
        for (name, address) in &self.backends {
            out.push_str(&format!(
                "  server {name} {address} check check-ssl verify none \
                 resolvers docker resolve-prefer {resolve_prefer}\n"
            ));
        }
        out
    }
}

/// Outcome of applying a configuration to the load balancer node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadBalancerUpdate {
    /// The node already served this configuration.
    Unchanged,
    /// The configuration was written and the proxy reloaded.
    Reloaded,
}

/// Applies backend configurations to the external load balancer node.
#[derive(Debug, Clone, Copy)]
pub struct LoadBalancerReconfigurer<'a> {
    node: &'a Node,
}

impl<'a> LoadBalancerReconfigurer<'a> {
    pub fn new(node: &'a Node) -> Self {
        Self { node }
    }

    /// The configuration currently on the node, if any.
    pub fn current(&self) -> Option<String> {
        match self.node.exec("cat", &args(&[LOAD_BALANCER_CONFIG_PATH])) {
            Ok(raw) => Some(raw),
            Err(err) => {
                debug!(node = %self.node.name(), error = %err, "no readable load balancer config");
                None
            }
        }
    }

    /// Writes `config` and reloads the proxy, unless it is already in place.
    pub fn apply(&self, config: &LoadBalancerConfig) -> Result<LoadBalancerUpdate> {
        let rendered = config.render();
        if self.current().as_deref() == Some(rendered.as_str()) {
            debug!(node = %self.node.name(), "load balancer config unchanged");
            return Ok(LoadBalancerUpdate::Unchanged);
        }

        self.node
            .write_file(LOAD_BALANCER_CONFIG_PATH, rendered.as_bytes())?;
        self.node
            .exec("kill", &args(&["-s", "HUP", "1"]))
            .map_err(|e| match e {
                Error::Agent { node, source, .. } => Error::Agent {
                    node,
                    operation: "reload load balancer".to_string(),
                    source,
                },
                other => other,
            })?;

        info!(
            node = %self.node.name(),
            backends = ?config.backends().keys().collect::<Vec<_>>(),
            "load balancer reconfigured"
        );
        Ok(LoadBalancerUpdate::Reloaded)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn ipv6_addresses_are_bracketed() {
        assert_eq!(join_host_port("172.18.0.2", 6443), "172.18.0.2:6443");
        assert_eq!(join_host_port("fc00::2", 6443), "[fc00::2]:6443");
    }

    #[test]
    fn render_lists_backends_by_name() {
        let mut config = LoadBalancerConfig::new(IpFamily::Ipv4);
        config.add_backend("kind-control-plane2", "172.18.0.3");
        config.add_backend("kind-control-plane", "172.18.0.2");

        let rendered = config.render();
        let first = rendered.find("server kind-control-plane 172.18.0.2:6443").unwrap();
        let second = rendered.find("server kind-control-plane2 172.18.0.3:6443").unwrap();
        assert!(first < second);
        assert!(rendered.contains("resolve-prefer ipv4"));
        assert!(!rendered.contains("bind :::6443"));
    }

    #[test]
    fn render_emits_complete_sections() {
        let mut config = LoadBalancerConfig::new(IpFamily::Ipv4);
        config.add_backend("kind-control-plane", "172.18.0.2");

        let rendered = config.render();
        let tail = rendered.strip_prefix(HAPROXY_PREAMBLE).unwrap();
        assert_eq!(
            tail,
            "frontend control-plane\n\
             \x20 bind *:6443\n\
             \x20 default_backend kube-apiservers\n\
             \n\
             backend kube-apiservers\n\
             \x20 option httpchk GET /healthz\n\
             \x20 server kind-control-plane 172.18.0.2:6443 check check-ssl verify none \
             resolvers docker resolve-prefer ipv4\n"
        );
    }

    #[test]
    fn render_ipv6_binds_both_stacks() {
        let mut config = LoadBalancerConfig::new(IpFamily::Ipv6);
        config.add_backend("kind-control-plane", "fc00::2");
        let rendered = config.render();
        assert!(rendered.contains("bind :::6443"));
        assert!(rendered.contains("[fc00::2]:6443"));
        assert!(rendered.contains("resolve-prefer ipv6"));
    }

    proptest! {
        #[test]
        fn render_ignores_insertion_order(
            order in Just((1..=5_u8).collect::<Vec<_>>()).prop_shuffle()
        ) {
            let mut shuffled = LoadBalancerConfig::new(IpFamily::Ipv4);
            let mut sorted = LoadBalancerConfig::new(IpFamily::Ipv4);
            for i in &order {
                shuffled.add_backend(&format!("cp{i}"), &format!("10.0.0.{i}"));
            }
            for i in 1..=5_u8 {
                sorted.add_backend(&format!("cp{i}"), &format!("10.0.0.{i}"));
            }
            prop_assert_eq!(shuffled.render(), sorted.render());
        }
    }
}
