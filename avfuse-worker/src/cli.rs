//! Command-line interface of the worker.
//!
//! Every flag has an `AVFUSE_*` environment fallback so containerized
//! deployments can configure the worker without argv.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "avfuse", version, about = "Audio/video fusion generation worker")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Engine configuration file (TOML).
    #[arg(long, global = true, env = "AVFUSE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Checkpoint directory holding model weights.
    #[arg(long, global = true, env = "AVFUSE_CKPT_DIR")]
    pub ckpt_dir: Option<PathBuf>,

    /// Model variant to load, e.g. `960x960_10s`.
    #[arg(long, global = true, env = "AVFUSE_MODEL_VARIANT")]
    pub model_variant: Option<String>,

    /// Quantize weights to fp8 at load time.
    #[arg(long, global = true, env = "AVFUSE_FP8")]
    pub fp8: bool,

    /// Keep idle submodules in host memory.
    #[arg(long, global = true, env = "AVFUSE_CPU_OFFLOAD")]
    pub cpu_offload: bool,

    /// Accelerator index to load on.
    #[arg(long, global = true, env = "AVFUSE_DEVICE")]
    pub device: Option<u32>,

    /// Directory for per-job scratch files.
    #[arg(long, global = true, env = "AVFUSE_SCRATCH_DIR")]
    pub scratch_dir: Option<PathBuf>,

    /// Object store tenant name.
    #[arg(long, global = true, env = "AVFUSE_STORE_CLOUD")]
    pub store_cloud: Option<String>,

    /// Object store API key.
    #[arg(long, global = true, env = "AVFUSE_STORE_API_KEY", hide_env_values = true)]
    pub store_api_key: Option<String>,

    /// Object store API secret.
    #[arg(long, global = true, env = "AVFUSE_STORE_API_SECRET", hide_env_values = true)]
    pub store_api_secret: Option<String>,

    /// Object store endpoint base URL.
    #[arg(long, global = true, env = "AVFUSE_STORE_BASE_URL")]
    pub store_base_url: Option<String>,

    /// Folder artifacts are stored under.
    #[arg(long, global = true, env = "AVFUSE_STORE_FOLDER")]
    pub store_folder: Option<String>,

    /// Verbose logging (debug level).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log errors only.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Serve jobs from stdin, one JSON payload per line, answering with one
    /// response envelope per line on stdout.
    Serve,

    /// Run a single job and print its response envelope.
    Run {
        /// Inline JSON payload; reads stdin to EOF when omitted.
        #[arg(long)]
        payload: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn serve_parses_with_overrides() {
        let args = Args::try_parse_from([
            "avfuse",
            "serve",
            "--model-variant",
            "720x720_5s",
            "--store-cloud",
            "acme",
        ])
        .unwrap();
        assert!(matches!(args.command, Commands::Serve));
        assert_eq!(args.model_variant.as_deref(), Some("720x720_5s"));
        assert_eq!(args.store_cloud.as_deref(), Some("acme"));
    }
}
