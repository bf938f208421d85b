//! End-to-end workflows against the simulated fleet.
//!
//! Each test plays the part of separate invocations: discover, act, and
//! discover again, the way a user drives a cluster from the command line.

use std::time::Duration;

use kindred_cluster::constants::LOAD_BALANCER_CONFIG_PATH;
use kindred_cluster::sim::{SimNode, SimProvider, SimWorld};
use kindred_cluster::{
    ClusterReadyProbe, Cluster, Error, JoinOptions, JoinOrchestrator, Readiness, ReadinessWaiter,
};
use kindred_types::{IpFamily, NodeName};
use proptest::prelude::*;

const NAMES: [&str; 6] = [
    "kind-control-plane",
    "kind-control-plane2",
    "kind-control-plane3",
    "kind-lb",
    "kind-worker",
    "kind-worker2",
];

fn sim_node(name: &str) -> SimNode {
    match name {
        "kind-control-plane" => SimNode::control_plane("kind", name).initialized(),
        "kind-lb" => SimNode::load_balancer("kind", name),
        n if n.contains("control-plane") => SimNode::control_plane("kind", n),
        n => SimNode::worker("kind", n),
    }
}

fn world_in_order(order: &[usize]) -> SimWorld {
    let world = SimWorld::new();
    for i in order {
        world.add_node(sim_node(NAMES[*i]));
    }
    world
}

fn options() -> JoinOptions {
    JoinOptions {
        wait: Duration::from_secs(5),
        poll_interval: Duration::from_millis(1),
        ..JoinOptions::default()
    }
}

fn server_lines(world: &SimWorld) -> Vec<String> {
    let config = world.file("kind-lb", LOAD_BALANCER_CONFIG_PATH).unwrap_or_default();
    String::from_utf8_lossy(&config)
        .lines()
        .filter_map(|l| l.trim().strip_prefix("server "))
        .filter_map(|l| l.split_whitespace().next())
        .map(String::from)
        .collect()
}

#[test]
fn test_settings_survive_between_invocations() {
    let world = world_in_order(&[0, 1, 3, 4]);
    let provider = SimProvider::new(world.clone());

    // First invocation: record the IP family.
    let mut cluster = Cluster::discover(&provider, "kind").unwrap();
    cluster.settings.ip_family = IpFamily::Ipv6;
    cluster.write_settings().unwrap();

    // Second invocation: settings come back from the bootstrap node.
    let mut cluster = Cluster::discover(&provider, "kind").unwrap();
    cluster.read_settings().unwrap();
    assert_eq!(cluster.settings.ip_family, IpFamily::Ipv6);
}

#[test]
fn test_ipv6_cluster_needs_ipv6_addresses() {
    let world = world_in_order(&[0, 1, 3]);
    let mut cluster = Cluster::discover(&SimProvider::new(world.clone()), "kind").unwrap();
    cluster.settings.ip_family = IpFamily::Ipv6;

    let err = JoinOrchestrator::new(options()).join(&mut cluster).unwrap_err();
    assert!(matches!(err, Error::MissingAddress { family: IpFamily::Ipv6, .. }));
}

#[test]
fn test_full_join_then_cluster_is_ready() {
    let world = world_in_order(&[0, 1, 2, 3, 4, 5]);
    let provider = SimProvider::new(world.clone());
    let mut cluster = Cluster::discover(&provider, "kind").unwrap();

    let report = JoinOrchestrator::new(options()).join(&mut cluster).unwrap();
    assert_eq!(report.control_planes.len(), 2);
    assert_eq!(report.workers.len(), 2);
    assert!(report.skipped.is_empty());
    assert!(cluster.kubernetes_nodes().iter().skip(1).all(|n| n.state().is_ready()));

    let names: Vec<NodeName> = cluster
        .kubernetes_nodes()
        .iter()
        .map(|n| n.name().clone())
        .collect();
    let bootstrap = cluster.bootstrap_control_plane().unwrap();
    let probe = ClusterReadyProbe::new(bootstrap, names);
    let outcome = ReadinessWaiter::new(Duration::from_millis(1))
        .wait(&probe, Duration::from_secs(5))
        .unwrap();
    assert!(matches!(outcome, Readiness::Ready { .. }));
}

#[test]
fn test_rejoin_after_failure_uses_hold_for_finished_nodes() {
    let world = SimWorld::new();
    world.add_node(sim_node("kind-control-plane"));
    world.add_node(sim_node("kind-lb"));
    world.add_node(sim_node("kind-worker"));
    world.add_node(SimNode::worker("kind", "kind-worker2").fail_on("kubeadm join"));
    let provider = SimProvider::new(world.clone());

    let mut cluster = Cluster::discover(&provider, "kind").unwrap();
    let err = JoinOrchestrator::new(options()).join(&mut cluster).unwrap_err();
    assert_eq!(err.node().map(NodeName::as_str), Some("kind-worker2"));
    assert!(world.is_ready("kind-worker"));

    // A later invocation re-discovers and holds the node that already joined.
    let mut cluster = Cluster::discover(&provider, "kind").unwrap();
    assert!(cluster.hold(&NodeName::from("kind-worker")));
    let err = JoinOrchestrator::new(options())
        .join_workers(&mut cluster)
        .unwrap_err();
    assert!(matches!(err, Error::Agent { .. }));
    let joins = world
        .command_lines("kind-worker")
        .iter()
        .filter(|l| l.starts_with("kubeadm join"))
        .count();
    assert_eq!(joins, 1);
}

proptest! {
    #[test]
    fn prop_load_balancer_membership_ignores_discovery_order(
        order in Just((0..NAMES.len()).collect::<Vec<_>>()).prop_shuffle()
    ) {
        let world = world_in_order(&order);
        let mut cluster = Cluster::discover(&SimProvider::new(world.clone()), "kind").unwrap();
        JoinOrchestrator::new(JoinOptions { wait: Duration::ZERO, ..options() })
            .join_control_planes(&mut cluster)
            .unwrap();

        prop_assert_eq!(
            server_lines(&world),
            vec!["kind-control-plane", "kind-control-plane2", "kind-control-plane3"]
        );
        prop_assert_eq!(
            cluster.select_nodes("@cp1").unwrap()[0].name().as_str(),
            "kind-control-plane"
        );
    }
}
