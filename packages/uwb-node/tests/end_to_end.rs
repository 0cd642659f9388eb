//! Full system in lockstep: simulated nodes → tag bridge → host poll loop → solver.

use uwb_host::config::CycleConfig;
use uwb_host::{Controller, HostError, PollLoop, SolveError, SolverConfig};
use uwb_node::sim::{scenarios, SimConfig, SimNetwork, SimTransport};
use uwb_types::Vec3;

fn poll_loop(cfg: &SimConfig) -> PollLoop<SimTransport> {
    let network = SimNetwork::new(cfg).unwrap();
    let anchors = network.anchor_config().unwrap();
    let controller = Controller::new(SimTransport::new(network), cfg.anchor_count);
    PollLoop::new(controller, anchors, CycleConfig::default(), SolverConfig::default())
}

#[test]
fn test_host_locates_tag() {
    let cfg = SimConfig::load(None).unwrap();
    let mut pl = poll_loop(&cfg);

    let mut errors = Vec::new();
    let stats = pl.run(Some(3), |report| {
        assert_eq!(report.estimate.n_anchors, 5);
        errors.push(report.estimate.position.dist(&cfg.tag.position));
    });

    assert_eq!(stats.estimates, 3, "{stats:?}");
    for e in errors {
        assert!(e < 0.3, "estimate off by {e} m");
    }
}

#[test]
fn test_moving_tag_is_followed() {
    let cfg = SimConfig::load(None).unwrap();
    let mut pl = poll_loop(&cfg);
    let target = Vec3::new(6.0, 4.5, 1.5);
    pl.controller_mut().transport_mut().network_mut().set_tag_position(target);

    let report = pl.run_cycle().unwrap();
    assert!(report.estimate.position.dist(&target) < 0.3, "got {}", report.estimate.position);
}

#[test]
fn test_anchor_dropout_still_solves() {
    let mut cfg = SimConfig::load(None).unwrap();
    cfg.scenario = scenarios::preset_anchor_dropout();
    let mut pl = poll_loop(&cfg);

    let report = pl.run_cycle().unwrap();
    assert_eq!(report.estimate.n_anchors, 4);
    assert!(report.estimate.position.dist(&cfg.tag.position) < 0.5);
}

#[test]
fn test_too_few_anchors_is_reported_not_fatal() {
    let mut cfg = SimConfig::load(None).unwrap();
    cfg.anchors.truncate(2);
    let mut pl = poll_loop(&cfg);

    match pl.run_cycle() {
        Err(HostError::Solve(SolveError::InsufficientAnchors { valid })) => assert_eq!(valid, 2),
        other => panic!("unexpected {other:?}"),
    }
    let stats = pl.run(Some(2), |_| {});
    assert_eq!((stats.cycles, stats.failures), (2, 2));
}
