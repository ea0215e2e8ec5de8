//! Two in-process contexts talking to each other: each one creates an agent for the other,
//!  and then they exchange a greeting.

use std::sync::Arc;

use ackchannel::messaging::agent::AgentOptions;
use ackchannel::messaging::config::ConnectOptions;
use ackchannel::messaging::messaging::Messaging;
use ackchannel::messaging::transport::local::LocalContext;
use serde_json::json;
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .try_init()
        .ok();

    let parent = LocalContext::new("https://parent.example");
    let child = LocalContext::new("https://child.example");
    spawn_recv_loop(&parent);
    spawn_recv_loop(&child);

    let parent_messaging = Messaging::new(parent.events());
    let child_messaging = Messaging::new(child.events());

    let connecting_to_child = parent_messaging.create_agent(AgentOptions::new(
        parent.window_to(&child),
        ConnectOptions::new("greetings").origin(child.origin()),
        |msg| info!("parent received {} from {}", msg.data, msg.origin),
    ))?;
    let connecting_to_parent = child_messaging.create_agent(AgentOptions::new(
        child.window_to(&parent),
        ConnectOptions::new("greetings").origin(parent.origin()),
        |msg| info!("child received {} from {}", msg.data, msg.origin),
    ))?;

    let to_child = connecting_to_child.await?;
    let to_parent = connecting_to_parent.await?;

    to_child.send(json!({"text": "hello, child"})).await?;
    to_parent.send(json!({"text": "hello, parent"})).await?;
    info!("both greetings were confirmed");

    parent.cancel_recv_loop();
    child.cancel_recv_loop();
    Ok(())
}

fn spawn_recv_loop(ctx: &Arc<LocalContext>) {
    let ctx = ctx.clone();
    tokio::spawn(async move { ctx.recv_loop().await });
}
