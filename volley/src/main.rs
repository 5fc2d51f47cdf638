use std::io::{IsTerminal as _, Write as _};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use mimalloc::MiMalloc;
use tokio::sync::watch;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;
use volley_core::{Progress, RunSpec, Runner};

use crate::args::{Args, Format};

mod args;
mod report;
mod tls_files;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(err) = init_tracing(args.verbose) {
        eprintln!("Failed to set up logging: {err}");
    }
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("Failed to start runtime: {err}");
            return ExitCode::FAILURE;
        }
    };
    let _guard = rt.enter();
    match rt.block_on(run_cli(args)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) -> anyhow::Result<()> {
    let directive = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    tracing_subscriber::fmt()
        .with_ansi(std::io::stderr().is_terminal())
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(directive.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
}

async fn run_cli(args: Args) -> anyhow::Result<()> {
    let print = args.effective_print();
    let spec = args.to_run_spec()?;
    let runner = Runner::new(spec).context("Invalid run configuration")?;

    // JSON output is a single document on stdout.
    let plain = args.format == Format::PlainText;
    if print.intro && plain {
        println!("{}", report::intro(runner.spec()));
    }

    let stop = runner.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted, stopping run");
            stop.cancel();
        }
    });

    let progress = (print.progress && plain).then(|| {
        tokio::spawn(render_progress(runner.progress(), runner.spec().clone()))
    });

    let result = runner.run().await.context("Run failed")?;
    if let Some(progress) = progress {
        if let Err(err) = progress.await {
            tracing::warn!(%err, "progress task failed");
        }
    }

    if print.result {
        match args.format {
            Format::PlainText => print!("{}", report::plain_text(&result, args.latencies)),
            Format::Json => println!(
                "{}",
                report::json(&result).context("Failed to serialize result")?
            ),
        }
    }
    Ok(())
}

/// Redraws the progress line on stderr until the run drops its sender.
async fn render_progress(mut rx: watch::Receiver<Progress>, spec: RunSpec) {
    let mut stderr = std::io::stderr();
    while rx.changed().await.is_ok() {
        let line = report::progress_line(&rx.borrow_and_update(), &spec);
        let _ = write!(stderr, "\r{line}");
        let _ = stderr.flush();
    }
    let _ = writeln!(stderr);
}
