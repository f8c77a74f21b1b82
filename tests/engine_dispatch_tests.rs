use anyhow::anyhow;
use eventnet::core::{Domain, Idle};
use eventnet::engine::Settled;
use eventnet::observability::{Diagnostics, LogLevel, MemorySink};
use eventnet::{ControlInfo, Net, NodeHandler, NodeId, PortName, Priority, RunContext, Step};
use serde_json::{json, Value};
use std::future::IntoFuture;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tokio_test::{assert_pending, assert_ready};

type Journal = Arc<Mutex<Vec<String>>>;

fn test_net() -> (Net, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let net = Net::with_domain(
        Domain::with_id("test").unwrap(),
        Diagnostics::with_sink(LogLevel::Debug, sink.clone()),
    );
    (net, sink)
}

fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

/// Node whose body writes `"{name}:{data}"` to the journal.
fn recording_node(net: &mut Net, name: &'static str, log: &Journal) -> NodeId {
    let log = log.clone();
    net.add_node(name, json!({}), move |ctx: &RunContext| -> anyhow::Result<Step> {
        log.lock().unwrap().push(format!("{}:{}", name, ctx.data));
        Ok(Step::Ready)
    })
}

fn push(log: &Journal, entry: &str) {
    log.lock().unwrap().push(entry.to_string());
}

#[test]
fn test_run_lifecycle_order() {
    let (mut net, sink) = test_net();
    let log = journal();
    let node = recording_node(&mut net, "body", &log);
    let will = log.clone();
    net.on(
        node,
        NodeHandler::will_run(move |_| {
            push(&will, "will");
            Ok(Step::Ready)
        }),
        Priority::Normal,
    )
    .unwrap();
    let did = log.clone();
    net.on(
        node,
        NodeHandler::did_run(move |control| {
            push(&did, &format!("did:{}", control.data));
            Ok(Step::Ready)
        }),
        Priority::Normal,
    )
    .unwrap();

    let asap = net.run(node, json!(1), ControlInfo::default()).unwrap();

    assert_eq!(asap.outcome(), Some(Settled::Completed));
    assert_eq!(*log.lock().unwrap(), vec!["will", "body:1", "did:1"]);
    assert!(sink
        .messages()
        .iter()
        .any(|m| m == "[RunID=0] Node \"test: body#0\" start running."));
}

#[test]
fn test_prevent_running_skips_everything_after() {
    let (mut net, _) = test_net();
    let log = journal();
    let node = recording_node(&mut net, "body", &log);
    let guard = log.clone();
    net.on(
        node,
        NodeHandler::will_run(move |control| {
            push(&guard, "guard");
            control.prevent_running();
            Ok(Step::Ready)
        }),
        Priority::SystemHigh,
    )
    .unwrap();
    let late = log.clone();
    net.on(
        node,
        NodeHandler::will_run(move |_| {
            push(&late, "late");
            Ok(Step::Ready)
        }),
        Priority::Normal,
    )
    .unwrap();
    let did = log.clone();
    net.on(
        node,
        NodeHandler::did_run(move |_| {
            push(&did, "did");
            Ok(Step::Ready)
        }),
        Priority::Normal,
    )
    .unwrap();

    let asap = net.run(node, Value::Null, ControlInfo::default()).unwrap();

    assert_eq!(asap.outcome(), Some(Settled::Completed));
    assert_eq!(*log.lock().unwrap(), vec!["guard"]);
}

#[test]
fn test_will_run_can_replace_data() {
    let (mut net, _) = test_net();
    let log = journal();
    let node = recording_node(&mut net, "body", &log);
    net.on(
        node,
        NodeHandler::will_run(|control| {
            control.set_data(json!("patched"));
            Ok(Step::Ready)
        }),
        Priority::Normal,
    )
    .unwrap();

    let _ = net.run(node, json!("raw"), ControlInfo::default()).unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["body:\"patched\""]);
}

#[test]
fn test_handlers_after_deferred_one_wait_for_it() {
    let (mut net, _) = test_net();
    let log = journal();
    let node = recording_node(&mut net, "body", &log);
    let (tx, rx) = oneshot::channel::<()>();
    let rx = Mutex::new(Some(rx));

    let first = log.clone();
    net.on(
        node,
        NodeHandler::will_run(move |_| {
            push(&first, "first");
            Ok(Step::Ready)
        }),
        Priority::High,
    )
    .unwrap();
    let second = log.clone();
    net.on(
        node,
        NodeHandler::will_run(move |_| {
            push(&second, "second");
            let rx = rx.lock().unwrap().take().ok_or_else(|| anyhow!("ran twice"))?;
            Ok(Step::deferred(async move {
                rx.await?;
                Ok(())
            }))
        }),
        Priority::Normal,
    )
    .unwrap();
    let third = log.clone();
    net.on(
        node,
        NodeHandler::will_run(move |_| {
            push(&third, "third");
            Ok(Step::Ready)
        }),
        Priority::Low,
    )
    .unwrap();

    let asap = net.run(node, json!(0), ControlInfo::default()).unwrap();
    assert!(!asap.is_settled());
    assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);

    let mut task = tokio_test::task::spawn(asap.into_future());
    assert_pending!(task.poll());
    assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);

    tx.send(()).unwrap();
    assert!(task.is_woken());
    assert_eq!(assert_ready!(task.poll()), Settled::Completed);
    assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third", "body:0"]);
}

#[test]
fn test_failing_body_is_logged_and_cancels_did_run() {
    let (mut net, sink) = test_net();
    let log = journal();
    let node = net.add_node("Broken", json!({}), |_: &RunContext| -> anyhow::Result<Step> {
        Err(anyhow!("boom"))
    });
    let did = log.clone();
    net.on(
        node,
        NodeHandler::did_run(move |_| {
            push(&did, "did");
            Ok(Step::Ready)
        }),
        Priority::Normal,
    )
    .unwrap();

    let asap = net.run(node, Value::Null, ControlInfo::default()).unwrap();

    assert_eq!(asap.outcome(), Some(Settled::Cancelled));
    assert!(log.lock().unwrap().is_empty());
    let errors = sink.at_level(LogLevel::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].msg.contains("boom"));
    assert_eq!(errors[0].node.as_deref(), Some("test: Broken#0"));
}

#[test]
fn test_run_ids_increase() {
    let (mut net, _) = test_net();
    let ids = Arc::new(Mutex::new(Vec::new()));
    let seen = ids.clone();
    let node = net.add_node("Counter", json!({}), move |ctx: &RunContext| -> anyhow::Result<Step> {
        seen.lock().unwrap().push(ctx.run_id);
        Ok(Step::Ready)
    });

    for _ in 0..3 {
        let _ = net.run(node, Value::Null, ControlInfo::default()).unwrap();
    }

    assert_eq!(*ids.lock().unwrap(), vec![0, 1, 2]);
    assert_eq!(net.domain().node_run_id_counter(), 3);
}

#[test]
fn test_put_on_output_runs_every_peer() {
    let (mut net, _) = test_net();
    let log = journal();
    let source = net.add_node("Source", json!({}), Idle);
    let ports = Arc::new(Mutex::new(Vec::new()));
    let mut sinks = Vec::new();
    for name in ["left", "right"] {
        let log = log.clone();
        let ports = ports.clone();
        let node = net.add_node(name, json!({}), move |ctx: &RunContext| -> anyhow::Result<Step> {
            push(&log, &format!("{}:{}", name, ctx.data));
            ports.lock().unwrap().push(ctx.info.port);
            Ok(Step::Ready)
        });
        net.connect(source, node).unwrap();
        sinks.push(node);
    }

    let out = net.port(source, PortName::OUTPUT).unwrap();
    net.put(out, json!(7)).unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["left:7", "right:7"]);
    let expected: Vec<_> = sinks
        .iter()
        .map(|node| Some(net.port(*node, PortName::INPUT).unwrap()))
        .collect();
    assert_eq!(*ports.lock().unwrap(), expected);
    assert!(!net.has_pending());
}

#[test]
fn test_put_on_input_runs_own_node() {
    let (mut net, _) = test_net();
    let log = journal();
    let source = net.add_node("Source", json!({}), Idle);
    let sink_node = recording_node(&mut net, "sink", &log);
    net.connect(source, sink_node).unwrap();

    let input = net.port(sink_node, PortName::INPUT).unwrap();
    net.put(input, json!("direct")).unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["sink:\"direct\""]);
}

#[test]
fn test_put_on_undetermined_port_warns() {
    let (mut net, sink) = test_net();
    let log = journal();
    let node = recording_node(&mut net, "body", &log);
    let fresh = net.port(node, "$fresh").unwrap();

    net.put(fresh, json!(1)).unwrap();

    assert!(log.lock().unwrap().is_empty());
    let warnings = sink.at_level(LogLevel::Warn);
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].msg.contains("has not yet been determined"));
}

#[tokio::test]
async fn test_deferred_runs_are_driven_by_settle() {
    let (mut net, _) = test_net();
    let log = journal();
    let (tx, rx) = oneshot::channel::<()>();
    let rx = Mutex::new(Some(rx));
    let source = net.add_node("Source", json!({}), Idle);
    let slow = net.add_node("Slow", json!({}), move |_: &RunContext| -> anyhow::Result<Step> {
        let rx = rx.lock().unwrap().take().ok_or_else(|| anyhow!("ran twice"))?;
        Ok(Step::deferred(async move {
            rx.await?;
            Ok(())
        }))
    });
    let did = log.clone();
    net.on(
        slow,
        NodeHandler::did_run(move |_| {
            push(&did, "did");
            Ok(Step::Ready)
        }),
        Priority::Normal,
    )
    .unwrap();
    net.connect(source, slow).unwrap();

    let out = net.port(source, PortName::OUTPUT).unwrap();
    net.put(out, json!(1)).unwrap();
    assert!(net.has_pending());
    assert!(log.lock().unwrap().is_empty());

    tx.send(()).unwrap();
    net.settle().await;

    assert!(!net.has_pending());
    assert_eq!(*log.lock().unwrap(), vec!["did"]);
}
