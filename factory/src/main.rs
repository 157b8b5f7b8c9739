//! Software factory CLI.
//!
//! Runs the persona pipeline against the configured model and prints the
//! approved (or best-effort) artifact to stdout. Progress goes to stderr.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use factory::core::cancel::CancelToken;
use factory::core::persona::PersonaRegistry;
use factory::core::protocol::extract_reference_code;
use factory::core::types::ProgressEvent;
use factory::exit_codes;
use factory::io::backend::GeminiBackend;
use factory::io::config::{DEFAULT_CONFIG_FILE, FactoryConfig, load_config, write_config};
use factory::io::credentials::ApiKey;
use factory::io::invoker::PersonaInvoker;
use factory::logging;
use factory::workflow::{WorkflowRequest, run_workflow};

#[derive(Parser)]
#[command(
    name = "factory",
    version,
    about = "Multi-persona software factory loop"
)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config file if missing.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// Run the pipeline on a client request.
    Run {
        /// Request text. A `CÓDIGO BASE:` marker introduces reference code.
        #[arg(long, conflicts_with = "request_file")]
        request: Option<String>,

        /// Read the request text from a file.
        #[arg(long)]
        request_file: Option<PathBuf>,

        /// Iteration bound (defaults to `iterations.default` from config).
        #[arg(long)]
        max_iterations: Option<u32>,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Run {
            request,
            request_file,
            max_iterations,
        } => cmd_run(&cli.config, request, request_file.as_deref(), max_iterations),
    }
}

fn cmd_init(config_path: &Path, force: bool) -> Result<i32> {
    if !force && config_path.exists() {
        eprintln!("{} already exists (use --force to overwrite)", config_path.display());
        return Ok(exit_codes::OK);
    }
    write_config(config_path, &FactoryConfig::default())?;
    eprintln!("wrote {}", config_path.display());
    Ok(exit_codes::OK)
}

fn cmd_run(
    config_path: &Path,
    request: Option<String>,
    request_file: Option<&Path>,
    max_iterations: Option<u32>,
) -> Result<i32> {
    let config = load_config(config_path)?;
    let raw = match (request, request_file) {
        (Some(text), _) => text,
        (None, Some(path)) => {
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?
        }
        (None, None) => bail!("provide --request or --request-file"),
    };
    if raw.trim().is_empty() {
        bail!("request must not be empty");
    }

    let workflow_request = WorkflowRequest {
        client_request: extract_reference_code(&raw),
        max_iterations: max_iterations.unwrap_or(config.iterations.default),
        reference_policy: config.reference_policy,
    };

    let api_key = ApiKey::from_env(&config.api_key_env);
    api_key.warn_if_missing(&config.api_key_env);
    let backend = GeminiBackend::new(&config.api_base, api_key, config.request_timeout())?;
    let invoker = PersonaInvoker::new(backend);
    let registry = PersonaRegistry::with_model(&config.model);

    let outcome = run_workflow(
        &invoker,
        &registry,
        &workflow_request,
        &CancelToken::new(),
        |event| {
            if let Some(line) = progress_line(event) {
                eprintln!("{line}");
            }
        },
    )?;

    println!("{}", outcome.artifact);
    if outcome.success {
        Ok(exit_codes::OK)
    } else {
        Ok(exit_codes::NOT_APPROVED)
    }
}

/// Human-readable stderr line for a progress event.
fn progress_line(event: &ProgressEvent) -> Option<String> {
    match event {
        ProgressEvent::Started { message }
        | ProgressEvent::SpecReady { message, .. }
        | ProgressEvent::IterationStarted { message, .. }
        | ProgressEvent::DevDone { message, .. }
        | ProgressEvent::Analysis { message, .. }
        | ProgressEvent::VerifiersDone { message, .. }
        | ProgressEvent::Feedback { message, .. } => Some(message.clone()),
        ProgressEvent::Finished {
            success: true,
            language,
            ..
        } => Some(format!("🎉 Projeto concluído e aprovado! ({})", language.as_str())),
        ProgressEvent::Finished { message, .. } => message.clone(),
    }
}
