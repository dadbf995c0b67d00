mod assessment;
mod config;
mod errors;
mod llm_client;
mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::assessment::artifacts::{create_run_dir, ViewPaths};
use crate::assessment::measurement::ProcessExtractor;
use crate::assessment::pipeline::{render_saved, AnalysisMode, AssessmentRequest, Pipeline, RunOutcome};
use crate::assessment::prompt::PromptTemplates;
use crate::assessment::render::HandlebarsRenderer;
use crate::config::Config;
use crate::llm_client::gemini::GeminiClient;
use crate::llm_client::{http_client, provider_from_config};
use crate::routes::build_router;
use crate::state::AppState;

#[derive(Parser, Debug)]
#[command(
    name = "posture",
    version,
    about = "Static postural assessment from four photographs"
)]
struct Cli {
    /// AI provider: gemini or openai (overrides AI_PROVIDER)
    #[arg(long, global = true)]
    provider: Option<String>,

    /// Model name (overrides GEMINI_MODEL / OPENAI_MODEL)
    #[arg(long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one assessment and write its artifacts to a new run directory
    Analyze {
        #[arg(long, default_value = "front.jpg")]
        front: PathBuf,
        #[arg(long, default_value = "left.jpg")]
        left: PathBuf,
        #[arg(long, default_value = "right.jpg")]
        right: PathBuf,
        #[arg(long, default_value = "back.jpg")]
        back: PathBuf,
        /// Subject height in cm, used to calibrate measurements
        #[arg(long)]
        height: Option<f64>,
        /// Extract pose landmarks first and ground the interpretation in them
        #[arg(long)]
        hybrid: bool,
    },
    /// Re-render report.html from a saved analysis.json
    Render {
        #[arg(long)]
        json: PathBuf,
    },
    /// Serve the upload page and assessment API
    Serve {
        /// Listen port (overrides PORT)
        #[arg(long)]
        port: Option<u16>,
    },
    /// List Gemini models available to the configured key
    Models,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    if let Some(provider) = &cli.provider {
        config.provider = provider.parse()?;
    }
    if let Some(model) = cli.model.clone() {
        config.set_model(model);
    }

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Analyze {
            front,
            left,
            right,
            back,
            height,
            hybrid,
        } => {
            let images = ViewPaths {
                front,
                left,
                right,
                back,
            };
            let mode = if hybrid {
                AnalysisMode::Hybrid
            } else {
                AnalysisMode::ImageOnly
            };
            analyze(&config, images, height, mode).await
        }
        Commands::Render { json } => {
            let renderer = HandlebarsRenderer::from_file(config.template_file.as_deref())?;
            let report = render_saved(&json, &renderer, &config.recommendations())?;
            println!("Posture score: {}", report.posture_score);
            println!("Report re-rendered next to {}", json.display());
            Ok(())
        }
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.port = port;
            }
            serve(config).await
        }
        Commands::Models => list_models(&config).await,
    }
}

fn build_pipeline(config: &Config) -> Result<Pipeline> {
    let provider = provider_from_config(config)?;
    info!("Provider initialized ({}, model: {})", provider.name(), provider.model());

    Ok(Pipeline {
        provider,
        extractor: Arc::new(ProcessExtractor::new(
            config.extractor_program.clone(),
            vec![config.extractor_script.clone()],
        )),
        renderer: Arc::new(HandlebarsRenderer::from_file(config.template_file.as_deref())?),
        templates: PromptTemplates::load(
            config.prompt_file.as_deref(),
            config.hybrid_prompt_file.as_deref(),
        )?,
        recommendations: config.recommendations(),
        extractor_timeout: config.extractor_timeout,
        provider_timeout: config.provider_timeout,
    })
}

async fn analyze(
    config: &Config,
    images: ViewPaths,
    height_cm: Option<f64>,
    mode: AnalysisMode,
) -> Result<()> {
    let pipeline = build_pipeline(config)?;
    let run_dir = create_run_dir(&config.output_dir)?;

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    let outcome = pipeline
        .run(
            AssessmentRequest {
                images,
                height_cm,
                mode,
                run_dir,
            },
            &cancel,
        )
        .await?;

    print_outcome(&outcome);
    if outcome.report.is_none() {
        bail!(
            "the model response could not be parsed; raw output kept in {}",
            outcome.run_dir.display()
        );
    }
    Ok(())
}

fn print_outcome(outcome: &RunOutcome) {
    if let Some(measurements) = &outcome.measurements {
        println!("\n=== MEASURED METRICS ===");
        for (name, metric) in measurements.entries() {
            println!(
                "  {name}: {:.1} {} (confidence {:.2})",
                metric.value, metric.unit, metric.confidence
            );
        }
    }

    for warning in &outcome.warnings {
        println!("warning: {warning}");
    }

    match &outcome.report {
        Some(report) => {
            println!("\nPosture score: {}/100", report.posture_score);
            for exercise in &report.exercises {
                println!("  - {} ({})", exercise.name, exercise.frequency);
            }
            println!("\nAnalysis complete! Results saved to: {}", outcome.run_dir.display());
        }
        None => {
            println!("\n=== RAW MODEL RESPONSE ===");
            println!("{}", outcome.raw_response);
        }
    }
}

async fn serve(config: Config) -> Result<()> {
    let pipeline = build_pipeline(&config)?;
    let shutdown = CancellationToken::new();

    let state = AppState {
        config: Arc::new(config.clone()),
        pipeline: Arc::new(pipeline),
        shutdown: shutdown.clone(),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Starting posture server v{} on {addr}", env!("CARGO_PKG_VERSION"));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(cancel_on_ctrl_c(shutdown))
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Cancels `token` on Ctrl-C so in-flight runs stop at their next stage boundary.
async fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => {
                    info!("Interrupt received, cancelling");
                    token.cancel();
                }
                Err(e) => {
                    warn!("Could not listen for Ctrl-C: {e}");
                    token.cancelled().await;
                }
            }
        }
        _ = token.cancelled() => {}
    }
}

async fn list_models(config: &Config) -> Result<()> {
    let Some(key) = config.gemini_api_key.clone() else {
        bail!("GOOGLE_API_KEY (or GEMINI_API_KEY) is not set");
    };
    let client = GeminiClient::new(http_client()?, key, config.gemini_model.clone());

    for model in client.list_models().await? {
        println!("{}  [{}]", model.name, model.supported_generation_methods.join(", "));
    }
    Ok(())
}
