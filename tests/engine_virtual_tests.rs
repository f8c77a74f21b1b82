use eventnet::core::{Domain, Idle};
use eventnet::engine::{PipeAction, Resolution, Slot};
use eventnet::observability::{Diagnostics, LogLevel, MemorySink};
use eventnet::{Endpoint, Net, NetError, PipeOutcome, PortName};
use serde_json::json;
use std::sync::Arc;

fn test_net() -> Net {
    Net::with_domain(Domain::with_id("test").unwrap(), Diagnostics::new(LogLevel::Off))
}

#[test]
fn test_resolution_matches_direct_pipe() {
    let mut deferred = test_net();
    let a = deferred.add_node("A", json!({}), Idle);
    let next = deferred.next_node();
    let vport = deferred.virtual_port(next, PortName::INPUT).unwrap();
    assert_eq!(deferred.connect(a, vport).unwrap(), PipeOutcome::Queued);
    let a_out = deferred.port(a, PortName::OUTPUT).unwrap();
    assert!(deferred.links(a_out).is_empty());

    let b = deferred.add_node("B", json!({}), Idle);
    let replacement = deferred.replace_virtual_node(next, b).unwrap();
    assert_eq!(replacement.executed, vec![PipeOutcome::Linked]);
    assert!(replacement.failed.is_empty());
    assert_eq!(replacement.still_queued, 0);

    let mut direct = test_net();
    let a2 = direct.add_node("A", json!({}), Idle);
    let b2 = direct.add_node("B", json!({}), Idle);
    direct.connect(a2, b2).unwrap();

    assert_eq!(deferred.ports_state(a).unwrap(), direct.ports_state(a2).unwrap());
    assert_eq!(deferred.ports_state(b).unwrap(), direct.ports_state(b2).unwrap());
    let b_in = deferred.port(b, PortName::INPUT).unwrap();
    assert_eq!(deferred.links(a_out), &[b_in]);
    assert_eq!(deferred.links(b_in), &[a_out]);
}

#[test]
fn test_next_node_in_a_chain() {
    let mut net = test_net();
    let a = net.add_node("A", json!({}), Idle);
    let c = net.add_node("C", json!({}), Idle);
    let next = net.next_node();
    assert_eq!(net.virtual_node(next).unwrap().brand(), "NextNode");

    // a -> next -> c, with next unknown yet.
    assert_eq!(net.pipe(a, next).unwrap(), Some(Endpoint::VirtualNode(next)));
    assert_eq!(net.connect(next, c).unwrap(), PipeOutcome::Queued);
    assert_eq!(net.actions().len(), 2);

    let b = net.add_node("B", json!({}), Idle);
    let replacement = net.replace_virtual_node(next, b).unwrap();
    assert_eq!(replacement.executed, vec![PipeOutcome::Linked, PipeOutcome::Linked]);
    assert!(net.actions().is_empty());

    let a_out = net.port(a, PortName::OUTPUT).unwrap();
    let b_in = net.port(b, PortName::INPUT).unwrap();
    let b_out = net.port(b, PortName::OUTPUT).unwrap();
    let c_in = net.port(c, PortName::INPUT).unwrap();
    assert_eq!(net.links(a_out), &[b_in]);
    assert_eq!(net.links(b_out), &[c_in]);
}

#[test]
fn test_partially_resolved_actions_stay_queued() {
    let mut net = test_net();
    let first = net.add_virtual_node("First");
    let second = net.add_virtual_node("Second");
    assert_eq!(net.connect(first, second).unwrap(), PipeOutcome::Queued);
    assert_eq!(
        net.actions().iter().next().map(PipeAction::resolution),
        Some(Resolution::Unresolved)
    );

    let b = net.add_node("B", json!({}), Idle);
    let replacement = net.replace_virtual_node(first, b).unwrap();
    assert!(replacement.executed.is_empty());
    assert_eq!(replacement.still_queued, 1);

    let b_out = net.port(b, PortName::OUTPUT).unwrap();
    let action = *net.actions().iter().next().unwrap();
    assert_eq!(action.from, Slot::Real(b_out));
    assert_eq!(action.resolution(), Resolution::Partial);

    let c = net.add_node("C", json!({}), Idle);
    let replacement = net.replace_virtual_node(second, c).unwrap();
    assert_eq!(replacement.executed, vec![PipeOutcome::Linked]);
    let c_in = net.port(c, PortName::INPUT).unwrap();
    assert_eq!(net.links(b_out), &[c_in]);
}

#[test]
fn test_bound_placeholder_pipes_straight_through() {
    let mut net = test_net();
    let a = net.add_node("A", json!({}), Idle);
    let b = net.add_node("B", json!({}), Idle);
    let next = net.next_node();
    net.replace_virtual_node(next, b).unwrap();
    assert_eq!(net.virtual_node(next).unwrap().bound(), Some(b));

    assert_eq!(net.connect(a, next).unwrap(), PipeOutcome::Linked);
    assert!(net.actions().is_empty());

    let other = net.add_node("Other", json!({}), Idle);
    assert!(matches!(
        net.replace_virtual_node(next, other),
        Err(NetError::InvalidArgument(_))
    ));
}

#[test]
fn test_failed_replay_is_reported() {
    let mut net = test_net();
    let a = net.add_node("A", json!({}), Idle);
    let b = net.add_node("B", json!({}), Idle);
    net.connect(a, b).unwrap();
    let b_in = net.port(b, PortName::INPUT).unwrap();

    // b's input cannot act as a source, which only shows once the pipe runs.
    let next = net.next_node();
    assert_eq!(net.connect(b_in, next).unwrap(), PipeOutcome::Queued);

    let c = net.add_node("C", json!({}), Idle);
    let replacement = net.replace_virtual_node(next, c).unwrap();
    assert!(replacement.executed.is_empty());
    assert!(matches!(
        replacement.failed.as_slice(),
        [NetError::DirectionConflict { .. }]
    ));
    assert!(net.actions().is_empty());
}

#[test]
fn test_action_queue_utilities() {
    let mut net = test_net();
    let a = net.add_node("A", json!({}), Idle);
    let first = net.next_node();
    let second = net.next_node();
    net.connect(a, first).unwrap();
    net.connect(a, second).unwrap();
    assert_eq!(net.actions().len(), 2);

    let shifted = net.actions_mut().shift().unwrap();
    let first_in = net.virtual_port(first, PortName::INPUT).unwrap();
    assert_eq!(shifted.to, Slot::Virtual(first_in));

    let rest = net.actions_mut().clear();
    assert_eq!(rest.len(), 1);
    assert!(net.actions().is_empty());
}

#[test]
fn test_unbindable_action_is_logged_and_dropped() {
    let sink = Arc::new(MemorySink::new());
    let mut net = Net::with_domain(
        Domain::with_id("test").unwrap(),
        Diagnostics::with_sink(LogLevel::Debug, sink.clone()),
    );
    let a = net.add_node("A", json!({}), Idle);
    let next = net.next_node();
    // Only subnets have an inner error port; a real node cannot take this one.
    let vport = net.virtual_port(next, PortName::INNER_ERROR).unwrap();
    assert_eq!(net.connect(a, vport).unwrap(), PipeOutcome::Queued);

    let b = net.add_node("B", json!({}), Idle);
    let replacement = net.replace_virtual_node(next, b).unwrap();

    assert!(replacement.executed.is_empty());
    assert!(matches!(
        replacement.failed.as_slice(),
        [NetError::InvalidPortUsage { .. }]
    ));
    assert!(net.actions().is_empty());
    let errors = sink.at_level(LogLevel::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].msg.contains("dropped"));
    assert_eq!(errors[0].component, Some("Net::replace_virtual_node"));
}
