//! Control binary: run a goal through the orchestrator
//!
//! Exit codes: 0 success, 1 goal failed, 2 configuration error,
//! 3 broker unreachable, 4 container runtime unreachable.

use clap::Parser;
use raid_core::RaidConfig;
use raid_engine::{ContextStatus, ControlAgent};
use raid_fabric::{Broker, RedisBroker};
use raid_orchestrator::{ContainerRuntime, DockerRuntime};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "raid-control", about = "Orchestrate workers to accomplish a goal")]
struct Args {
    /// The goal to accomplish, in natural language
    goal: String,

    /// Reuse a specific task id instead of generating one
    #[arg(long)]
    task_id: Option<String>,

    /// Path to the worker binary shipped into worker images
    #[arg(long, default_value = "raid-worker")]
    worker_binary: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let config = match RaidConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("configuration error: {e}");
            return ExitCode::from(2);
        }
    };

    let broker = match RedisBroker::connect(&config.broker).await {
        Ok(b) => Arc::new(b) as Arc<dyn Broker>,
        Err(e) => {
            error!("broker unreachable: {e}");
            return ExitCode::from(3);
        }
    };

    let runtime = match DockerRuntime::connect() {
        Ok(r) => Arc::new(r.with_worker_binary(&args.worker_binary)) as Arc<dyn ContainerRuntime>,
        Err(e) => {
            error!("container runtime unreachable: {e}");
            return ExitCode::from(4);
        }
    };
    if let Err(e) = runtime.ping().await {
        error!("container runtime unreachable: {e}");
        return ExitCode::from(4);
    }

    let agent = match ControlAgent::new(config, broker, runtime) {
        Ok(a) => a,
        Err(e) => {
            error!("configuration error: {e}");
            return ExitCode::from(2);
        }
    };

    agent.supervisor().start_monitoring();

    let context = agent.process_goal(&args.goal, args.task_id).await;

    info!(
        "goal finished: status={:?} steps={}",
        context.status,
        context.steps.len()
    );
    match &context.final_result {
        Some(result) => println!("{result}"),
        None => println!("(no result)"),
    }

    agent.shutdown().await;

    if context.status == ContextStatus::Completed {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}
