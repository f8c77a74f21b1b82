use eventnet::core::{Domain, Idle};
use eventnet::observability::{Diagnostics, LogLevel};
use eventnet::{IoRole, Net, NetError, NodeBuilder, PipeOutcome, PortName};
use serde_json::json;

fn test_net() -> Net {
    Net::with_domain(Domain::with_id("test").unwrap(), Diagnostics::new(LogLevel::Off))
}

#[test]
fn test_ports_are_created_lazily() {
    let mut net = test_net();
    let node = net.add_node("Plain", json!({}), Idle);
    assert_eq!(net.port_count(), 0);

    let first = net.port(node, "$data").unwrap();
    let second = net.port(node, "$data").unwrap();
    assert_eq!(first, second);
    assert_eq!(net.port_count(), 1);

    let port = net.get_port(first).unwrap();
    assert_eq!(port.name().as_str(), "$data");
    assert_eq!(port.direction(), IoRole::Undetermined);
    assert_eq!(port.io_type(), IoRole::Undetermined);
    assert!(!port.is_inner());
    assert!(port.links().is_empty());
}

#[test]
fn test_invalid_port_names() {
    let mut net = test_net();
    let node = net.add_node("Plain", json!({}), Idle);

    assert_eq!(
        net.port(node, "data").unwrap_err(),
        NetError::InvalidPortName("data".to_string())
    );
    assert!(matches!(net.port(node, "$"), Err(NetError::InvalidPortName(_))));
    assert!(matches!(
        net.port(node, PortName::INNER_ERROR),
        Err(NetError::InvalidPortUsage { .. })
    ));
    assert!(matches!(net.inner_port(node, "$I"), Err(NetError::InvalidArgument(_))));
    assert_eq!(net.port_count(), 0);
}

#[test]
fn test_direction_is_fixed_by_first_pipe() {
    let mut net = test_net();
    let a = net.add_node("A", json!({}), Idle);
    let b = net.add_node("B", json!({}), Idle);
    let c = net.add_node("C", json!({}), Idle);

    assert_eq!(net.connect(a, b).unwrap(), PipeOutcome::Linked);
    let a_out = net.port(a, PortName::OUTPUT).unwrap();
    let b_in = net.port(b, PortName::INPUT).unwrap();
    assert_eq!(net.get_port(a_out).unwrap().direction(), IoRole::Out);
    assert_eq!(net.get_port(b_in).unwrap().direction(), IoRole::In);

    // Out again is fine, In is not.
    assert_eq!(net.connect(a, c).unwrap(), PipeOutcome::Linked);
    let err = net.connect(c, a_out).unwrap_err();
    assert!(matches!(
        err,
        NetError::DirectionConflict {
            actual: IoRole::Out,
            requested: IoRole::In,
            ..
        }
    ));
    assert!(matches!(
        net.connect(b_in, c),
        Err(NetError::DirectionConflict { .. })
    ));
    assert_eq!(net.links(a_out).len(), 2);
}

#[test]
fn test_error_port_never_becomes_input() {
    let mut net = test_net();
    let a = net.add_node("A", json!({}), Idle);
    let b = net.add_node("B", json!({}), Idle);
    let b_err = net.port(b, PortName::ERROR).unwrap();

    for _ in 0..2 {
        assert!(matches!(
            net.connect(a, b_err),
            Err(NetError::InvalidPortUsage {
                requested: IoRole::In,
                ..
            })
        ));
    }
    assert_eq!(net.get_port(b_err).unwrap().direction(), IoRole::Undetermined);

    let a_err = net.port(a, PortName::ERROR).unwrap();
    assert_eq!(net.connect(a_err, b).unwrap(), PipeOutcome::Linked);
    assert_eq!(net.get_port(a_err).unwrap().io_type(), IoRole::Out);
}

#[test]
fn test_subnet_shares_direction_across_sides() {
    let mut net = test_net();
    let source = net.add_node("Source", json!({}), Idle);
    let subnet = net.add_subnet("Group", json!({}), Idle);
    let child = net.add_node("Child", json!({}), Idle);

    assert_eq!(net.connect(source, subnet).unwrap(), PipeOutcome::Linked);
    let inner_in = net.inner_port(subnet, PortName::INPUT).unwrap();
    let inner = net.get_port(inner_in).unwrap();
    assert!(inner.is_inner());
    assert_eq!(inner.direction(), IoRole::In);
    assert_eq!(inner.io_type(), IoRole::Out);

    // The inner side of an input feeds the children.
    assert_eq!(net.connect(inner_in, child).unwrap(), PipeOutcome::Linked);

    let inner_out = net.inner_port(subnet, PortName::OUTPUT).unwrap();
    assert_eq!(net.connect(child, inner_out).unwrap(), PipeOutcome::Linked);
    assert_eq!(net.get_port(inner_out).unwrap().io_type(), IoRole::In);
    let outer_out = net.port(subnet, PortName::OUTPUT).unwrap();
    assert_eq!(net.get_port(outer_out).unwrap().direction(), IoRole::Out);
    assert_eq!(net.get_port(outer_out).unwrap().io_type(), IoRole::Out);
}

#[test]
fn test_inner_error_port_only_receives() {
    let mut net = test_net();
    let subnet = net.add_subnet("Group", json!({}), Idle);
    let child = net.add_node("Child", json!({}), Idle);
    let other = net.add_node("Other", json!({}), Idle);

    let inner_err = net.inner_port(subnet, PortName::INNER_ERROR).unwrap();
    assert!(matches!(
        net.connect(inner_err, other),
        Err(NetError::InvalidPortUsage { .. })
    ));

    let child_err = net.port(child, PortName::ERROR).unwrap();
    assert_eq!(net.connect(child_err, inner_err).unwrap(), PipeOutcome::Linked);
    assert_eq!(net.get_port(inner_err).unwrap().io_type(), IoRole::In);
    // No outer counterpart was created.
    assert!(net.node(subnet).unwrap().ports().get(&PortName::INNER_ERROR).is_none());
}

#[test]
fn test_builder_declares_directions() {
    let mut net = test_net();
    let subnet = NodeBuilder::new("Mixer")
        .subnet()
        .port(PortName::new("$left").unwrap(), IoRole::In)
        .port(PortName::OUTPUT, IoRole::Out)
        .build(&mut net)
        .unwrap();

    let left = net.port(subnet, "$left").unwrap();
    assert_eq!(net.get_port(left).unwrap().io_type(), IoRole::In);

    // Counterparts created later inherit the declared direction.
    let inner_left = net.inner_port(subnet, "$left").unwrap();
    assert_eq!(net.get_port(inner_left).unwrap().direction(), IoRole::In);
    assert_eq!(net.get_port(inner_left).unwrap().io_type(), IoRole::Out);

    let bad = NodeBuilder::new("Broken")
        .port(PortName::ERROR, IoRole::In)
        .build(&mut net);
    assert!(matches!(bad, Err(NetError::InvalidPortUsage { .. })));
}

#[test]
fn test_labels() {
    let mut net = test_net();
    let plain = net.add_node("Plain", json!({}), Idle);
    let group = net.add_subnet("Group", json!({}), Idle);

    assert_eq!(net.node_label(plain), "test: Plain#0");
    let out = net.port(plain, PortName::OUTPUT).unwrap();
    assert_eq!(net.port_label(out), "[test: Plain#0].$O");
    let inner = net.inner_port(group, PortName::INPUT).unwrap();
    assert_eq!(net.port_label(inner), "[test: Group#1].[inner].$I");

    net.set_domain_id("renamed").unwrap();
    assert_eq!(net.node_label(plain), "renamed: Plain#0");
}

#[test]
fn test_plain_nodes_get_no_inner_ports() {
    let mut net = test_net();
    let a = net.add_node("A", json!({}), Idle);
    let b = net.add_node("B", json!({}), Idle);

    assert_eq!(net.connect(a, b).unwrap(), PipeOutcome::Linked);
    assert_eq!(net.port_count(), 2);
    assert!(net.node(b).unwrap().inner_ports().is_none());
    let b_in = net.port(b, PortName::INPUT).unwrap();
    assert_eq!(net.get_port(b_in).unwrap().direction(), IoRole::In);
}

#[test]
fn test_inner_error_port_cannot_feed_children() {
    let mut net = test_net();
    let subnet = net.add_subnet("Group", json!({}), Idle);
    let child = net.add_node("Child", json!({}), Idle);
    let inner_err = net.inner_port(subnet, PortName::ERROR).unwrap();
    let child_in = net.port(child, PortName::INPUT).unwrap();

    // Sending from the inner side would make the outer `$E` an input.
    assert!(matches!(
        net.connect(inner_err, child_in),
        Err(NetError::InvalidPortUsage { .. })
    ));
    assert_eq!(net.get_port(inner_err).unwrap().direction(), IoRole::Undetermined);
    assert_eq!(net.get_port(child_in).unwrap().direction(), IoRole::Undetermined);
    if let Some(outer_err) = net.node(subnet).unwrap().ports().get(&PortName::ERROR) {
        assert_eq!(net.get_port(outer_err).unwrap().direction(), IoRole::Undetermined);
    }
    assert!(net.links(inner_err).is_empty());

    // Collecting the children's errors is the allowed use.
    let child_err = net.port(child, PortName::ERROR).unwrap();
    assert_eq!(net.connect(child_err, inner_err).unwrap(), PipeOutcome::Linked);
    let outer_err = net.port(subnet, PortName::ERROR).unwrap();
    assert_eq!(net.get_port(outer_err).unwrap().direction(), IoRole::Out);
    assert_eq!(net.get_port(outer_err).unwrap().io_type(), IoRole::Out);
    assert_eq!(net.get_port(inner_err).unwrap().io_type(), IoRole::In);
}

#[test]
fn test_builder_rejects_conflicting_declarations() {
    let mut net = test_net();
    let before = net.node_count();

    let conflicting = NodeBuilder::new("Twice")
        .port(PortName::new("$x").unwrap(), IoRole::In)
        .port(PortName::new("$x").unwrap(), IoRole::Out)
        .build(&mut net);
    assert!(matches!(conflicting, Err(NetError::DirectionConflict { .. })));
    assert_eq!(net.node_count(), before);
    assert_eq!(net.port_count(), 0);

    let repeated = NodeBuilder::new("Repeated")
        .port(PortName::new("$x").unwrap(), IoRole::In)
        .port(PortName::new("$x").unwrap(), IoRole::In)
        .build(&mut net)
        .unwrap();
    assert_eq!(net.port_count(), 1);
    let x = net.port(repeated, "$x").unwrap();
    assert_eq!(net.get_port(x).unwrap().io_type(), IoRole::In);
}
