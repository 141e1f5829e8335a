mod cli;

use std::process;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tracing::{Level, error, info};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use avfuse_core::{ErrorKind, JobResponse};
use avfuse_engine::{
    EngineConfig, EngineLifecycle, EngineOverrides, SidecarConfig, SidecarLoader,
    ToolWeightProvider,
};
use avfuse_pipeline::{
    FfmpegEncoder, GenerationPipeline, HttpReferenceFetcher, PipelineConfig,
    fetch::DEFAULT_IMAGE_TIMEOUT,
};
use avfuse_store::{SignedUploadStore, StoreConfig};

use crate::cli::{Args, Commands};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() {
    // optional .env for local runs; absence is fine
    dotenvy::dotenv().ok();
    let args = Args::parse();

    if let Err(e) = run(args).await {
        error!("worker failed: {e:#}");
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    init_logging(args.verbose, args.quiet);

    let pipeline = build_pipeline(&args).await?;

    match args.command {
        Commands::Serve => serve(&pipeline).await,
        Commands::Run { payload } => run_single(&pipeline, payload).await,
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    // stdout carries response envelopes; all diagnostics go to stderr
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

async fn build_pipeline(args: &Args) -> anyhow::Result<GenerationPipeline> {
    let engine_config = EngineConfig::resolve(args.config.as_deref(), &engine_overrides(args))
        .context("resolving engine configuration")?;
    info!(
        variant = %engine_config.model_variant,
        ckpt_dir = %engine_config.ckpt_dir.display(),
        "engine configuration resolved"
    );

    let store = SignedUploadStore::new(store_config(args)?)
        .context("constructing artifact store")?;

    let scratch_root = args
        .scratch_dir
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("avfuse"));
    tokio::fs::create_dir_all(&scratch_root)
        .await
        .with_context(|| format!("creating scratch directory `{}`", scratch_root.display()))?;

    let lifecycle = Arc::new(EngineLifecycle::new(
        engine_config,
        Arc::new(ToolWeightProvider::from_env()),
        Arc::new(SidecarLoader::new(SidecarConfig::from_env())),
    ));
    let fetcher = HttpReferenceFetcher::new(DEFAULT_IMAGE_TIMEOUT)
        .context("constructing reference image client")?;

    Ok(GenerationPipeline::new(
        lifecycle,
        Arc::new(fetcher),
        Arc::new(FfmpegEncoder::new()),
        Arc::new(store),
        PipelineConfig { scratch_root },
    ))
}

fn engine_overrides(args: &Args) -> EngineOverrides {
    let mut overrides = EngineOverrides::default();
    if let Some(dir) = &args.ckpt_dir {
        overrides = overrides.ckpt_dir(dir.clone());
    }
    if let Some(variant) = &args.model_variant {
        overrides = overrides.model_variant(variant.clone());
    }
    if args.fp8 {
        overrides = overrides.fp8(true);
    }
    if args.cpu_offload {
        overrides = overrides.cpu_offload(true);
    }
    if let Some(device) = args.device {
        overrides = overrides.device(device);
    }
    overrides
}

fn store_config(args: &Args) -> anyhow::Result<StoreConfig> {
    let mut missing = Vec::new();
    if args.store_cloud.is_none() {
        missing.push("--store-cloud / AVFUSE_STORE_CLOUD");
    }
    if args.store_api_key.is_none() {
        missing.push("--store-api-key / AVFUSE_STORE_API_KEY");
    }
    if args.store_api_secret.is_none() {
        missing.push("--store-api-secret / AVFUSE_STORE_API_SECRET");
    }
    if !missing.is_empty() {
        anyhow::bail!("missing store credentials: {}", missing.join(", "));
    }

    let mut config = StoreConfig {
        cloud: args.store_cloud.clone().unwrap_or_default(),
        api_key: args.store_api_key.clone().unwrap_or_default(),
        api_secret: args.store_api_secret.clone().unwrap_or_default(),
        ..StoreConfig::default()
    };
    if let Some(base_url) = &args.store_base_url {
        config.base_url = base_url.clone();
    }
    if let Some(folder) = &args.store_folder {
        config.folder = folder.clone();
    }
    Ok(config)
}

/// Process payloads line by line until stdin closes.
async fn serve(pipeline: &GenerationPipeline) -> anyhow::Result<()> {
    info!("serving jobs from stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let response = respond(pipeline, line).await;
        let mut encoded = serde_json::to_vec(&response)?;
        encoded.push(b'\n');
        stdout.write_all(&encoded).await?;
        stdout.flush().await?;
    }

    info!("stdin closed, shutting down");
    Ok(())
}

/// Run one payload and print its envelope.
async fn run_single(pipeline: &GenerationPipeline, payload: Option<String>) -> anyhow::Result<()> {
    let text = match payload {
        Some(inline) => inline,
        None => {
            let mut buffer = String::new();
            tokio::io::stdin().read_to_string(&mut buffer).await?;
            buffer
        }
    };

    let response = respond(pipeline, &text).await;
    let mut stdout = tokio::io::stdout();
    let mut encoded = serde_json::to_vec(&response)?;
    encoded.push(b'\n');
    stdout.write_all(&encoded).await?;
    stdout.flush().await?;
    Ok(())
}

async fn respond(pipeline: &GenerationPipeline, raw: &str) -> JobResponse {
    match serde_json::from_str(raw) {
        Ok(payload) => pipeline.run(payload).await,
        Err(e) => JobResponse::failure(
            ErrorKind::Validation,
            format!("payload is not valid JSON: {e}"),
        ),
    }
}
