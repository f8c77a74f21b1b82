use eventnet::observability::init_tracing;
use eventnet::{ControlInfo, Net, NetConfig, NodeBuilder, NodeHandler, PortName, Priority, RunContext, Step};
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("eventnet=debug")?;

    let config = NetConfig::from_json(json!({
        "log_level": "debug",
        "local_domain": { "id": "demo" }
    }))?;
    let mut net = Net::with_config(&config)?;

    // source -> gain -> (next node) -> printer
    let source = net.add_node("Source", json!({ "frequency": 440.0 }), |ctx: &RunContext| -> anyhow::Result<Step> {
        println!("source run #{} with {}", ctx.run_id, ctx.data);
        Ok(Step::Ready)
    });
    let gain = NodeBuilder::new("Gain")
        .state(json!({ "gain": 2.5 }))
        .body(|ctx: &RunContext| -> anyhow::Result<Step> {
            println!("gain received {} on {:?}", ctx.data, ctx.info.port);
            Ok(Step::Ready)
        })
        .on(
            NodeHandler::will_pipe(|event| {
                println!("gain: will pipe {} as {}", event.port_name, event.direction);
                true
            }),
            Priority::High,
        )
        .build(&mut net)?;

    net.pipe(source, gain)?;

    let next = net.next_node();
    net.connect(gain, next)?;
    println!("queued actions: {}", net.actions().len());

    let printer = net.add_node("Printer", json!({}), |ctx: &RunContext| -> anyhow::Result<Step> {
        println!("printer got {}", ctx.data);
        Ok(Step::Ready)
    });
    let replacement = net.replace_virtual_node(next, printer)?;
    println!("replayed pipes: {:?}", replacement.executed);

    let out = net.port(gain, PortName::OUTPUT)?;
    net.put(out, json!([0.1, 0.2, 0.3]))?;
    net.run(source, json!("tick"), ControlInfo::default())?.await;
    net.settle().await;

    println!("gain ports: {}", serde_json::to_string_pretty(&net.ports_state(gain)?)?);
    println!("gain factor: {:?}", net.read_state(gain, "gain"));
    Ok(())
}
