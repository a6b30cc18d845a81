//! Worker binary: runs inside a worker container
//!
//! Loads its profile from `RAID_SUB_AGENT_PROFILE`, connects to the broker,
//! and services its profile's task queue until stopped.

use clap::Parser;
use raid_core::{LlmBackendConfig, RaidConfig};
use raid_engine::WorkerAgent;
use raid_fabric::{Broker, RedisBroker};
use raid_llm::create_backend;
use raid_profiles::{Profile, ProfileRegistry};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "raid-worker", about = "Containerized worker process")]
struct Args {
    /// Workspace directory for file and subprocess tools
    #[arg(long, default_value = ".")]
    workspace: String,
}

/// Profile model options override the process-level backend configuration.
fn merged_llm_config(base: &LlmBackendConfig, profile: &Profile) -> LlmBackendConfig {
    let mut merged = base.clone();
    if let Some(model) = profile.llm_config.get("model").and_then(|v| v.as_str()) {
        merged.model = model.to_string();
    }
    if let Some(max_tokens) = profile.llm_config.get("max_tokens").and_then(|v| v.as_u64()) {
        merged.max_tokens = max_tokens as u32;
    }
    if let Some(temperature) = profile.llm_config.get("temperature").and_then(|v| v.as_f64()) {
        merged.temperature = temperature as f32;
    }
    merged
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

    let Ok(profile_name) = std::env::var("RAID_SUB_AGENT_PROFILE") else {
        error!("RAID_SUB_AGENT_PROFILE is not set");
        return ExitCode::from(2);
    };

    let config = match RaidConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("configuration error: {e}");
            return ExitCode::from(2);
        }
    };

    // Inside the image only ./profile.yaml exists; fall back to the
    // working directory when the profiles directory is absent.
    let profiles_dir = if Path::new(&config.profiles_dir).exists() {
        config.profiles_dir.clone()
    } else if Path::new("profile.yaml").exists() {
        ".".to_string()
    } else {
        config.profiles_dir.clone()
    };

    let registry = ProfileRegistry::new(&profiles_dir);
    let profile = match registry.load(&profile_name) {
        Ok(p) => p,
        Err(e) => {
            error!("cannot load profile '{profile_name}': {e}");
            return ExitCode::from(2);
        }
    };

    let backend = match create_backend(&merged_llm_config(&config.llm, &profile)) {
        Ok(b) => b,
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

    let tools = raid_tools::create_registry_for(&profile.tools, &args.workspace);

    let collaboration_group = match std::env::var("RAID_COLLABORATION_ENABLED") {
        Ok(flag) if flag.eq_ignore_ascii_case("true") => {
            std::env::var("RAID_COLLABORATION_GROUP_ID").ok()
        }
        _ => None,
    };
    if let Some(group) = &collaboration_group {
        info!("collaboration enabled for group {group}");
    }

    let agent = WorkerAgent::new(profile, backend, tools, broker, collaboration_group);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
                cancel.cancel();
            }
        });
    }

    agent.run(cancel).await;
    ExitCode::SUCCESS
}
