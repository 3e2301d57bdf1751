mod analyze;
mod presenter;
mod record;

use std::path::PathBuf;

use anyhow::Context;
use clap::builder::PossibleValuesParser;
use clap::{Parser, Subcommand, ValueEnum};

use speakeasy_config::{ServiceApi, SpeakEasyConfig};
use speakeasy_media::uploader::HttpAnalysisService;
use speakeasy_types::{AnalysisMode, SPEECH_PURPOSES};

use crate::presenter::Presenter;

#[derive(Parser)]
#[command(name = "speakeasy", about = "Speech analysis client")]
struct Cli {
    /// Disable coloured output
    #[arg(long, global = true)]
    no_color: bool,

    /// Upload-only or upload plus live recording (overrides config)
    #[arg(long, global = true, value_enum)]
    mode: Option<ModeArg>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a video file and show its analysis
    Analyze {
        /// Video file to analyze
        file: PathBuf,

        /// What the speech is for
        #[arg(short, long, value_parser = PossibleValuesParser::new(SPEECH_PURPOSES.iter().copied()))]
        purpose: Option<String>,

        /// Service API to call (overrides config)
        #[arg(long, value_enum)]
        api: Option<ApiArg>,

        /// Analysis service base URL (overrides config)
        #[arg(long)]
        url: Option<String>,

        /// Print the normalized result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Record from camera and microphone, then analyze
    Record {
        /// What the speech is for
        #[arg(short, long, value_parser = PossibleValuesParser::new(SPEECH_PURPOSES.iter().copied()))]
        purpose: Option<String>,

        /// Stop after this many seconds instead of waiting for Ctrl-C
        #[arg(short, long)]
        seconds: Option<u64>,

        /// Analysis service base URL (overrides config)
        #[arg(long)]
        url: Option<String>,

        /// Print the normalized result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check that the analysis service is reachable
    Health {
        /// Analysis service base URL (overrides config)
        #[arg(long)]
        url: Option<String>,
    },
    /// Print the effective configuration
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum ApiArg {
    /// POST /process with a `file` field
    Process,
    /// POST /api/analyze with a `video` field
    Analyze,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Upload,
    Live,
}

impl From<ModeArg> for AnalysisMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Upload => AnalysisMode::Upload,
            ModeArg::Live => AnalysisMode::Live,
        }
    }
}

impl From<ApiArg> for ServiceApi {
    fn from(api: ApiArg) -> Self {
        match api {
            ApiArg::Process => ServiceApi::Process,
            ApiArg::Analyze => ServiceApi::Analyze,
        }
    }
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr; views own stdout
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let presenter = Presenter::new(!cli.no_color);
    let mode = cli.mode.map(AnalysisMode::from);

    match cli.command {
        Commands::Analyze {
            file,
            purpose,
            api,
            url,
            json,
        } => {
            let mut config = load(url, mode)?;
            if let Some(api) = api {
                config.service.api = api.into();
            }
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(analyze::run_analyze(config, file, purpose, presenter, json))?;
        }
        Commands::Record {
            purpose,
            seconds,
            url,
            json,
        } => {
            let config = load(url, mode)?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(record::run_record(config, purpose, seconds, presenter, json))?;
        }
        Commands::Health { url } => {
            let config = load(url, mode)?;
            let service = HttpAnalysisService::from_config(&config.service)
                .context("Failed to build analysis client")?;
            let rt = tokio::runtime::Runtime::new()?;
            match rt.block_on(service.health()) {
                Ok(body) => {
                    println!("speakeasy service is healthy");
                    println!("  url: {}", config.service.base_url);
                    if !body.trim().is_empty() {
                        println!("  response: {}", body.trim());
                    }
                }
                Err(e) => {
                    eprintln!("{}", presenter.error(&e.user_message()));
                    std::process::exit(1);
                }
            }
        }
        Commands::Config => {
            let path = speakeasy_config::config_file_path()?;
            let config = load(None, mode)?;
            println!("# {}", path.display());
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn load(url: Option<String>, mode: Option<AnalysisMode>) -> anyhow::Result<SpeakEasyConfig> {
    let mut config = speakeasy_config::load_config()
        .context("Failed to load config")?
        .with_base_url(url);
    if let Some(mode) = mode {
        config.mode = mode;
    }
    Ok(config)
}
