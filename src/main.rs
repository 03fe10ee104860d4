use reelforge::cli::{Cli, Mode};
use reelforge::config::{self, Config};
use reelforge::pipeline::{
    EntryMode, FixedAnswer, PipelineOrchestrator, Prompter, RunOutcome, StageContext,
    StageRunner, TerminalPrompter,
};
use reelforge::standalone;
use reelforge_av::{run_until_interrupted, ProcessRegistry, ProcessRunner, ToolRegistry};
use reelforge_common::Error;

use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

/// Exit status of a run that stopped to wait for an edited document.
const EXIT_DEFERRED: u8 = 3;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "reelforge=debug,reelforge_av=debug,reelforge_common=debug".to_string()
        } else {
            "reelforge=info,reelforge_av=info,reelforge_common=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            let code = e.downcast_ref::<Error>().map_or(1, Error::exit_code);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = config::load_config_or_default(cli.config.as_deref())?;
    let tools = ToolRegistry::discover(&config.tools);
    let registry = ProcessRegistry::new();
    let runner = ProcessRunner::new(registry.clone());

    let rt = tokio::runtime::Runtime::new()?;
    // Spawned so the signal handler keeps running while a stage blocks on a
    // terminal prompt.
    let outcome = rt.block_on(async {
        let work = tokio::spawn(dispatch(cli, config, tools, runner));
        run_until_interrupted(&registry, work, shutdown_signal()).await
    });
    // A task stuck on a prompt must not hold up exit.
    rt.shutdown_timeout(Duration::from_secs(2));
    outcome?.context("pipeline task failed")?
}

async fn dispatch(
    cli: Cli,
    config: Config,
    tools: ToolRegistry,
    runner: ProcessRunner,
) -> Result<ExitCode> {
    let show_progress = std::io::stderr().is_terminal();

    match cli.mode() {
        Mode::CheckTools => {
            standalone::check_tools(&tools);
            Ok(ExitCode::SUCCESS)
        }
        Mode::LevelAudio(path) => {
            let measured =
                standalone::level_audio(&config, &tools, &runner, &path, show_progress)
                    .await
                    .with_context(|| format!("Failed to level {}", path.display()))?;
            println!(
                "Leveled {} (was {} LUFS integrated, target {} LUFS)",
                path.display(),
                measured.input_i.trim(),
                config.loudness.integrated
            );
            Ok(ExitCode::SUCCESS)
        }
        Mode::Preview {
            id,
            title,
            description,
            output,
        } => {
            let written = standalone::preview(
                &config,
                &tools,
                &runner,
                &id,
                &title,
                &description,
                output.as_deref(),
            )
            .await
            .with_context(|| format!("Failed to render preview for section {id}"))?;
            println!("Preview written to {}", written.display());
            Ok(ExitCode::SUCCESS)
        }
        Mode::Pipeline(mode) => {
            run_pipeline(&cli, config, tools, runner, mode, show_progress).await
        }
    }
}

async fn run_pipeline(
    cli: &Cli,
    config: Config,
    tools: ToolRegistry,
    runner: ProcessRunner,
    mode: EntryMode,
    show_progress: bool,
) -> Result<ExitCode> {
    let prompter: Arc<dyn Prompter> = if cli.yes {
        Arc::new(FixedAnswer(true))
    } else {
        Arc::new(TerminalPrompter)
    };

    let ctx = StageContext::new(
        config,
        cli.source.clone(),
        cli.workspace.as_deref(),
        tools,
        runner,
        prompter,
    )
    .with_stage_runner(StageRunner::new(show_progress));

    let orchestrator = PipelineOrchestrator::new(ctx);
    match orchestrator.run(mode).await? {
        RunOutcome::Completed { output } => {
            println!("Presentation written to {}", output.display());
            Ok(ExitCode::SUCCESS)
        }
        RunOutcome::Deferred(deferral) => {
            println!("Stopped after {}: {}", deferral.stage, deferral.reason);
            println!();
            println!("Next steps:");
            for (i, step) in deferral.next_steps.iter().enumerate() {
                println!("  {}. {step}", i + 1);
            }
            Ok(ExitCode::from(EXIT_DEFERRED))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
