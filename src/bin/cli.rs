//! Codebox CLI
//!
//! Command-line interface for the sandboxed code execution service.

use clap::{Parser, Subcommand};
use codebox::runtime::DockerRuntime;
use codebox::service::CodeboxService;
use codebox::{Result, ServiceConfig, VERSION};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "codebox",
    author = "Codebox Contributors",
    version = VERSION,
    about = "Codebox - sandboxed code execution service",
    long_about = None
)]
struct Cli {
    /// Path to a configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute code in an ephemeral sandbox
    Run {
        /// Programming language
        language: String,
        /// Code to execute
        code: String,
        /// Timeout in seconds
        #[arg(short, long)]
        timeout: Option<u64>,
        /// Packages to install before running
        #[arg(short, long)]
        deps: Vec<String>,
    },

    /// Manage persistent sandboxes
    Sandbox {
        #[command(subcommand)]
        action: SandboxAction,
    },
}

#[derive(Subcommand)]
enum SandboxAction {
    /// Create a persistent sandbox
    Create {
        /// Programming language
        language: String,
        /// Sandbox name (generated when omitted)
        #[arg(short, long)]
        name: Option<String>,
        /// Packages to install after creation
        #[arg(short, long)]
        deps: Vec<String>,
    },
    /// List sandboxes
    List,
    /// Delete a sandbox
    Delete {
        /// Sandbox id
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("codebox=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let config = ServiceConfig::load(cli.config.as_deref())?;
    let runtime = Arc::new(DockerRuntime::connect(config.max_output_bytes).await?);
    let service = CodeboxService::new(runtime, config);

    let payload = match cli.command {
        Commands::Run {
            language,
            code,
            timeout,
            deps,
        } => service.execute_code(&language, &code, timeout, deps).await,
        Commands::Sandbox { action } => match action {
            SandboxAction::Create {
                language,
                name,
                deps,
            } => service.create_sandbox(&language, name, deps).await,
            SandboxAction::List => service.list_sandboxes(),
            SandboxAction::Delete { id } => service.delete_sandbox(&id).await,
        },
    };

    println!("{}", serde_json::to_string_pretty(&payload)?);

    Ok(())
}
