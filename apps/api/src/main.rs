mod artifacts;
mod cache;
mod config;
mod documents;
mod errors;
mod flow;
mod guardrails;
mod llm_client;
mod models;
mod pipeline;
mod routes;
mod state;

use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::artifacts::FsArtifactSink;
use crate::cache::{CacheStore, FileCache, MemoryCache, RedisCache};
use crate::config::{CacheBackend, Config};
use crate::documents::FsDocumentStore;
use crate::flow::{Collaborators, FlowController, FlowReport, PathSelector, Request, SourceRef, TriggerPayload};
use crate::llm_client::{LlmClient, LlmGenerator};
use crate::routes::build_router;
use crate::state::AppState;

const USAGE: &str = "usage: resume-flow [serve | run '<trigger json>' | interactive]";

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting resume-flow v{}", env!("CARGO_PKG_VERSION"));

    let controller = Arc::new(build_controller(&config).await?);
    let source_ref = SourceRef::new(config.source_document_path.clone());

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None | Some("serve") => serve(&config, controller, source_ref).await,
        Some("run") => {
            let raw = match args.get(1) {
                Some(raw) => raw.clone(),
                None => {
                    let mut raw = String::new();
                    tokio::io::stdin().read_to_string(&mut raw).await?;
                    raw
                }
            };
            let payload: TriggerPayload =
                serde_json::from_str(&raw).context("trigger payload must be a JSON object")?;
            let request = Request::from_trigger(&payload, source_ref)?;
            finish(controller.run(request).await?)
        }
        Some("interactive") => {
            let request = prompt_request(source_ref).await?;
            finish(controller.run(request).await?)
        }
        Some(other) => bail!("unknown mode '{other}'\n{USAGE}"),
    }
}

/// Wires the collaborators: Anthropic generator, the configured cache,
/// filesystem sink and document store.
async fn build_controller(config: &Config) -> Result<FlowController> {
    let llm = LlmClient::new(config.anthropic_api_key.clone())?;
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    let cache: Arc<dyn CacheStore> = match &config.cache_backend {
        CacheBackend::Redis(url) => Arc::new(RedisCache::connect(url).await?),
        CacheBackend::File => Arc::new(FileCache::new(&config.cache_dir)),
        CacheBackend::Memory => Arc::new(MemoryCache::new()),
    };
    info!("Cache backend: {}", cache.backend());

    let controller = FlowController::new(
        config.flow_settings(),
        Collaborators {
            generator: Arc::new(LlmGenerator::new(llm)),
            cache,
            sink: Arc::new(FsArtifactSink::new(&config.artifacts_dir, &config.site_output_dir)),
            documents: Arc::new(FsDocumentStore::new()),
        },
    )?;
    info!(
        "Flow {} ready (max {} parallel steps)",
        controller.settings().flow_version,
        controller.settings().max_parallel_steps
    );
    Ok(controller)
}

async fn serve(config: &Config, controller: Arc<FlowController>, source_ref: SourceRef) -> Result<()> {
    let state = AppState {
        controller,
        source_ref,
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Prints the report as JSON; a rejected run exits non-zero.
fn finish(report: FlowReport) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.outcome.is_failed() {
        std::process::exit(2);
    }
    Ok(())
}

async fn prompt_request(source_ref: SourceRef) -> Result<Request> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    ask("What would you like to do? [update_resume / create_website]: ")?;
    let path_answer = lines.next_line().await?.unwrap_or_default();
    let path = flow::request::classify_path(&path_answer)
        .with_context(|| format!("could not classify route '{}'", path_answer.trim()))?;

    let question = match path {
        PathSelector::Revise => "What should change in the resume? ",
        PathSelector::ReviseAndPublish => "Anything to change before publishing? (optional) ",
    };
    ask(question)?;
    let user_request = lines.next_line().await?.unwrap_or_default();

    if path == PathSelector::Revise && user_request.trim().is_empty() {
        bail!("a resume update needs an instruction");
    }
    Ok(Request::from_prompt(path.as_str(), &user_request, source_ref)?)
}

fn ask(question: &str) -> Result<()> {
    let mut stdout = std::io::stdout();
    write!(stdout, "{question}")?;
    stdout.flush()?;
    Ok(())
}
