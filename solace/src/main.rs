//! Solace - operator CLI for the community moderation core
//!
//! Evaluates a submission against the configured evaluation service exactly
//! as the community services would, without touching any store.

mod config;

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use community::store::AccessPolicy;
use community::{CommunityConfig, SubmissionDraft};
use moderation::backend::OpenAiBackend;
use moderation::{LlmBackend, ModerationEngine, ModerationStatus, PolicyTable};

use config::{Args, Command, LogFormat};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    init_tracing(&args);

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let config = args.community_config()?;
    config
        .validate()
        .context("invalid community configuration")?;

    match &args.command {
        Command::Evaluate { file } => evaluate(&args, config, file).await,
        Command::Probe => probe(&args).await,
        Command::ShowConfig => {
            print!("{}", config.to_yaml()?);
            Ok(())
        }
    }
}

fn init_tracing(args: &Args) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log_filter()));
    let registry = tracing_subscriber::registry().with(filter);

    match args.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

fn backend(args: &Args) -> anyhow::Result<Arc<dyn LlmBackend>> {
    let backend = OpenAiBackend::new(&args.llm_base_url, &args.llm_model, args.llm_api_key.clone())
        .context("failed to create evaluation backend")?;
    Ok(Arc::new(backend))
}

async fn evaluate(
    args: &Args,
    config: CommunityConfig,
    file: &std::path::Path,
) -> anyhow::Result<()> {
    let raw = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let draft: SubmissionDraft =
        serde_json::from_str(&raw).context("submission is not valid JSON")?;
    draft.validate()?;

    let report = evaluation_report(draft, || backend(args), config).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Evaluate a draft the way the submission service would and report the
/// resulting status. Private journal entries stay pending and the backend
/// is never created.
async fn evaluation_report<F>(
    draft: SubmissionDraft,
    backend: F,
    config: CommunityConfig,
) -> anyhow::Result<serde_json::Value>
where
    F: FnOnce() -> anyhow::Result<Arc<dyn LlmBackend>>,
{
    let candidate = draft.into_candidate(Uuid::nil());

    if !AccessPolicy::is_shared(&candidate) {
        warn!("Private journal entries are never evaluated");
        return Ok(serde_json::json!({
            "contentType": candidate.content_type,
            "outcome": null,
            "status": ModerationStatus::Pending,
        }));
    }

    let policies = PolicyTable::from_config(&config.moderation);
    let engine = ModerationEngine::new(backend()?, config.moderation);

    info!(content_type = %candidate.content_type, "Evaluating submission");
    let outcome = engine.evaluate(&candidate).await;
    let status = policies.transition(candidate.content_type, &outcome);

    Ok(serde_json::json!({
        "contentType": candidate.content_type,
        "outcome": outcome,
        "status": status,
    }))
}

async fn probe(args: &Args) -> anyhow::Result<()> {
    let backend = backend(args)?;
    if backend.is_available().await {
        info!(backend = backend.id(), url = %args.llm_base_url, "Evaluation service reachable");
        println!("ok");
        Ok(())
    } else {
        anyhow::bail!("evaluation service at {} is not reachable", args.llm_base_url)
    }
}
