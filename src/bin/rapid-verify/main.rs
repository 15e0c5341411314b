//! rapid-verify CLI entry point.

mod cli;

use clap::Parser;
use cli::{Cli, Command};
use color_eyre::eyre::eyre;
use rapid_verify::{
    FileProofStore, InitiateRequest, Orchestrator, OrchestratorBuilder, ProofId, ProofView,
    VerificationType,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    // Logs go to stderr so stdout stays machine-readable.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    debug!("rapid-verify v{}", env!("CARGO_PKG_VERSION"));

    let config = cli.to_config()?;

    if let Command::WriteConfig { ref path } = cli.command {
        config.to_file(path)?;
        info!("Configuration written to {}", path.display());
        return Ok(());
    }

    let store = FileProofStore::open(config.store_path())?;
    info!("Using proof store at {}", store.path().display());

    let orchestrator = OrchestratorBuilder::new(config)
        .store(Arc::new(store))
        .build()?;

    run(&orchestrator, cli.command, cli.json).await
}

async fn run(orchestrator: &Orchestrator, command: Command, json: bool) -> color_eyre::Result<()> {
    match command {
        Command::Initiate {
            developer,
            domain,
            method,
            app,
        } => {
            let initiated = orchestrator
                .initiate(InitiateRequest {
                    developer_id: developer,
                    domain,
                    verification_type: VerificationType::from(method).as_str().to_string(),
                    app_id: app,
                })
                .await?;
            if json {
                print_json(&initiated)?;
            } else {
                println!("Verification id: {}", initiated.verification_id);
                println!("Token:           {}", initiated.token);
                println!("Expires at:      {}", initiated.expires_at);
                println!();
                println!("{}", initiated.instructions);
            }
        }
        Command::Verify { id } => {
            let id: ProofId = id.parse()?;
            let outcome = orchestrator.verify(&id).await?;
            if json {
                print_json(&outcome)?;
            } else {
                println!("{}: {}", outcome.status, outcome.message);
            }
        }
        Command::Status { id, developer } => {
            let id: ProofId = id.parse()?;
            let view = orchestrator.get_status(&id, &developer).await?;
            if json {
                print_json(&view)?;
            } else {
                print_view(&view);
            }
        }
        Command::List { developer } => {
            let views = orchestrator.list(&developer).await?;
            if json {
                print_json(&views)?;
            } else if views.is_empty() {
                println!("No verifications for {developer}");
            } else {
                for view in &views {
                    println!(
                        "{}  {:<13} {:<8} {}",
                        view.verification_id,
                        view.verification_type.as_str(),
                        view.status.as_str(),
                        view.domain
                    );
                }
            }
        }
        Command::Delete { id, developer } => {
            let id: ProofId = id.parse()?;
            if !orchestrator.delete(&id, &developer).await? {
                return Err(eyre!("verification not found: {id}"));
            }
            if json {
                print_json(&serde_json::json!({ "deleted": id }))?;
            } else {
                println!("Deleted {id}");
            }
        }
        Command::WriteConfig { .. } => {}
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> color_eyre::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_view(view: &ProofView) {
    println!("Verification id: {}", view.verification_id);
    println!("Domain:          {}", view.domain);
    println!("Method:          {}", view.verification_type);
    println!("Status:          {}", view.status);
    println!("Attempts:        {}/{}", view.retry_count, view.max_retries);
    println!("Expires at:      {}", view.expires_at);
    if let Some(verified_at) = view.verified_at {
        println!("Verified at:     {verified_at}");
    }
    if let Some(ref reason) = view.failure_reason {
        println!("Last failure:    {reason}");
    }
}
