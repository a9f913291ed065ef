//! Tail a workflow execution stream.
//!
//! Demonstrates:
//! - Building a Connection from an endpoint and JSON options
//! - Mounting a StreamConsumer and rendering state changes
//! - Typed workflow events via a per-kind handler
//! - Manual retry after the connection gives up
//!
//! Usage:
//!   cargo run --example tail_stream -- wss://host/ws/workflows/42
//!   cargo run --example tail_stream -- https://host/executions/42/events --debug
//!   cargo run --example tail_stream -- wss://host/ws --options '{"maxReconnectAttempts":3}' --retry

// ============================================================================
// Imports
// ============================================================================

use resilient_stream::protocol::WORKFLOW_EVENT_KINDS;
use resilient_stream::{
    Connection, ConnectionOptions, ConnectionState, Error, Result, StreamConsumer, WorkflowEvent,
};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Types
// ============================================================================

/// Command-line arguments.
#[derive(Debug, Clone)]
struct Args {
    endpoint: Option<String>,
    options: Option<String>,
    debug: bool,
    retry: bool,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = std::env::args().skip(1).collect();
        let options = args
            .iter()
            .position(|a| a == "--options")
            .and_then(|i| args.get(i + 1).cloned());
        let endpoint = args
            .iter()
            .find(|a| !a.starts_with("--") && Some(*a) != options.as_ref())
            .cloned();
        Self {
            endpoint,
            options,
            debug: args.iter().any(|a| a == "--debug"),
            retry: args.iter().any(|a| a == "--retry"),
        }
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

fn init_logging(debug: bool) {
    let filter = if debug {
        "resilient_stream=debug"
    } else {
        "resilient_stream=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

async fn run(args: Args) -> Result<()> {
    println!("=== Tail Stream ===\n");

    let endpoint = args
        .endpoint
        .ok_or_else(|| Error::config("usage: tail_stream <endpoint> [--options JSON] [--debug]"))?;
    let options = match &args.options {
        Some(json) => ConnectionOptions::from_json(json)?,
        None => ConnectionOptions::default(),
    };

    let connection = Connection::builder()
        .endpoint(endpoint.as_str())
        .options(options)
        .accept_kinds(WORKFLOW_EVENT_KINDS.iter().copied())
        .on_kind("node_completed", |message| {
            if let WorkflowEvent::NodeCompleted {
                node_id,
                duration_ms,
                ..
            } = WorkflowEvent::parse(message)
            {
                println!("        ✓ {node_id} ({duration_ms}ms)");
            }
        })
        .on_kind("node_failed", |message| {
            if let WorkflowEvent::NodeFailed { node_id, error, .. } = WorkflowEvent::parse(message) {
                println!("        ✗ {node_id}: {error}");
            }
        })
        .build()?;

    println!("[Setup] Streaming from {endpoint}\n");
    let mut consumer = StreamConsumer::mount(connection)?;
    let mut last_state = consumer.state();

    loop {
        let snapshot = tokio::select! {
            changed = consumer.changed() => changed?,
            _ = tokio::signal::ctrl_c() => {
                println!("\n[Exit] Ctrl+C received");
                break;
            }
        };

        if snapshot.state != last_state {
            last_state = snapshot.state;
            match snapshot.state {
                ConnectionState::Failed => println!(
                    "[State] reconnecting (attempt {}){}",
                    snapshot.attempts,
                    snapshot
                        .last_error
                        .as_ref()
                        .map(|e| format!(": {}", e.message))
                        .unwrap_or_default()
                ),
                state => println!("[State] {state}"),
            }
        }

        if let Some(message) = &snapshot.last_message
            && WorkflowEvent::parse(message).is_terminal()
        {
            println!("[Done] Execution finished");
            break;
        }

        if snapshot.needs_manual_retry() {
            if args.retry {
                println!("[Retry] Connection gave up, retrying");
                consumer.retry()?;
            } else {
                println!("[Done] Connection gave up ({:?})", snapshot.close_reason);
                break;
            }
        }
    }

    consumer.connection().shutdown().await;
    Ok(())
}
