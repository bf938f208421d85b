//! Blocking readiness waits.

use std::collections::BTreeMap;
use std::thread;
use std::time::{Duration, Instant};

use kindred_types::NodeName;
use tracing::{debug, info, warn};

use crate::constants::ADMIN_KUBECONFIG_PATH;
use crate::node::{args, Node};
use crate::{Error, Result};

const READY_CONDITION_JSONPATH: &str = r#"{.status.conditions[?(@.type=="Ready")].status}"#;

/// An externally observable readiness signal.
pub trait ReadinessProbe {
    /// What is being waited for, for logs and errors.
    fn target(&self) -> String;

    /// One observation. `Ok(false)` and `Err` both mean "not ready yet".
    fn is_ready(&self) -> Result<bool>;
}

fn kubectl(via: &Node, rest: &[&str]) -> Result<String> {
    let mut argv = vec![format!("--kubeconfig={ADMIN_KUBECONFIG_PATH}")];
    argv.extend(args(rest));
    via.exec("kubectl", &argv)
}

/// Readiness of one node, as reported by the API server behind `via`.
#[derive(Debug)]
pub struct NodeReadyProbe<'a> {
    via: &'a Node,
    node: NodeName,
}

impl<'a> NodeReadyProbe<'a> {
    pub fn new(via: &'a Node, node: NodeName) -> Self {
        Self { via, node }
    }
}

impl ReadinessProbe for NodeReadyProbe<'_> {
    fn target(&self) -> String {
        format!("node {}", self.node)
    }

    fn is_ready(&self) -> Result<bool> {
        let jsonpath = format!("-o=jsonpath={READY_CONDITION_JSONPATH}");
        let status = kubectl(self.via, &["get", "nodes", self.node.as_str(), &jsonpath])?;
        Ok(status.trim() == "True")
    }
}

/// Every listed node reports Ready.
#[derive(Debug)]
pub struct ClusterReadyProbe<'a> {
    via: &'a Node,
    nodes: Vec<NodeName>,
}

impl<'a> ClusterReadyProbe<'a> {
    pub fn new(via: &'a Node, nodes: Vec<NodeName>) -> Self {
        Self { via, nodes }
    }
}

impl ReadinessProbe for ClusterReadyProbe<'_> {
    fn target(&self) -> String {
        format!("cluster ({} nodes)", self.nodes.len())
    }

    fn is_ready(&self) -> Result<bool> {
        let row = format!(r#"{{.metadata.name}}{{" "}}{READY_CONDITION_JSONPATH}{{"\n"}}"#);
        let jsonpath = format!("-o=jsonpath={{range .items[*]}}{row}{{end}}");
        let out = kubectl(self.via, &["get", "nodes", &jsonpath])?;

        let reported: BTreeMap<&str, &str> = out
            .lines()
            .filter_map(|line| line.trim().split_once(' '))
            .collect();
        Ok(self
            .nodes
            .iter()
            .all(|n| reported.get(n.as_str()).is_some_and(|s| s.trim() == "True")))
    }
}

/// How a wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The probe succeeded after `elapsed`.
    Ready { elapsed: Duration },
    /// No wait was requested; readiness was not checked.
    Unverified,
}

/// Polls a probe until it succeeds or a deadline passes.
#[derive(Debug, Clone, Copy)]
pub struct ReadinessWaiter {
    poll_interval: Duration,
}

impl Default for ReadinessWaiter {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl ReadinessWaiter {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Blocks until `probe` reports ready or `deadline` elapses.
    ///
    /// A zero deadline returns [`Readiness::Unverified`] without probing.
    pub fn wait(&self, probe: &dyn ReadinessProbe, deadline: Duration) -> Result<Readiness> {
        if deadline.is_zero() {
            debug!(target = %probe.target(), "not waiting for readiness");
            return Ok(Readiness::Unverified);
        }

        info!(target = %probe.target(), deadline = ?deadline, "waiting for readiness");
        let start = Instant::now();
        loop {
            match probe.is_ready() {
                Ok(true) => {
                    let elapsed = start.elapsed();
                    info!(target = %probe.target(), elapsed = ?elapsed, "ready");
                    return Ok(Readiness::Ready { elapsed });
                }
                Ok(false) => {}
                Err(err) => {
                    debug!(target = %probe.target(), error = %err, "readiness probe failed");
                }
            }

            let elapsed = start.elapsed();
            if elapsed >= deadline {
                warn!(target = %probe.target(), waited = ?elapsed, "readiness timeout");
                return Err(Error::ReadinessTimeout {
                    target: probe.target(),
                    waited: elapsed,
                });
            }
            thread::sleep(self.poll_interval.min(deadline - elapsed));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::agent::AgentError;

    struct Countdown {
        remaining: Cell<u32>,
        calls: Cell<u32>,
    }

    impl Countdown {
        fn new(not_ready: u32) -> Self {
            Self {
                remaining: Cell::new(not_ready),
                calls: Cell::new(0),
            }
        }
    }

    impl ReadinessProbe for Countdown {
        fn target(&self) -> String {
            "countdown".to_string()
        }

        fn is_ready(&self) -> Result<bool> {
            self.calls.set(self.calls.get() + 1);
            match self.remaining.get() {
                0 => Ok(true),
                n => {
                    self.remaining.set(n - 1);
                    // Alternate between "not ready" and a failing probe.
                    if n % 2 == 0 {
                        Ok(false)
                    } else {
                        Err(Error::Agent {
                            node: NodeName::from("kind-control-plane"),
                            operation: "kubectl".to_string(),
                            source: AgentError::new("connection refused"),
                        })
                    }
                }
            }
        }
    }

    #[test]
    fn zero_deadline_does_not_probe() {
        let probe = Countdown::new(0);
        let outcome = ReadinessWaiter::default()
            .wait(&probe, Duration::ZERO)
            .unwrap();
        assert_eq!(outcome, Readiness::Unverified);
        assert_eq!(probe.calls.get(), 0);
    }

    #[test]
    fn probe_errors_are_retried_until_ready() {
        let probe = Countdown::new(4);
        let outcome = ReadinessWaiter::new(Duration::from_millis(1))
            .wait(&probe, Duration::from_secs(10))
            .unwrap();
        assert!(matches!(outcome, Readiness::Ready { .. }));
        assert_eq!(probe.calls.get(), 5);
    }

    #[test]
    fn times_out_with_target() {
        let probe = Countdown::new(u32::MAX);
        let err = ReadinessWaiter::new(Duration::from_millis(2))
            .wait(&probe, Duration::from_millis(20))
            .unwrap_err();
        match err {
            Error::ReadinessTimeout { target, waited } => {
                assert_eq!(target, "countdown");
                assert!(waited >= Duration::from_millis(20));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
