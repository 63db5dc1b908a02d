//! dupes - duplicate file detector
//!
//! Entry point for the CLI application.

use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::Parser;
use humansize::{format_size, DECIMAL};
use tracing::error;
use tracing_subscriber::EnvFilter;

use dupes::config::CliArgs;
use dupes::{filter_dir, filter_stream, CancelToken, Options};

fn main() -> ExitCode {
    let args = CliArgs::parse();
    setup_logging(args.verbose);

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: CliArgs) -> Result<ExitCode> {
    if args.workers == Some(0) {
        bail!("worker count must be at least 1");
    }

    let cancel = CancelToken::new();
    install_signal_handler(cancel.clone())?;

    let opts = Options {
        follow_symlinks: args.follow_symlinks,
        recursive: args.recursive,
        exit_on_error: args.exit_on_error,
        exit_on_dup: args.exit_on_dup,
        cancel: Some(cancel),
        uniq_writer: args.uniq.then(|| Box::new(io::stdout()) as Box<dyn Write>),
        dup_writer: args.dup.then(|| Box::new(io::stdout()) as Box<dyn Write>),
        err_writer: Some(Box::new(io::stderr())),
        workers: args.workers,
        fs: None,
    };

    let start = Instant::now();
    let outcome = match &args.dir {
        Some(dir) => filter_dir(dir, opts),
        None => filter_stream(io::stdin(), opts),
    };

    // Errors were already streamed to stderr as they happened.
    if !outcome.errors.is_empty() {
        return Ok(ExitCode::FAILURE);
    }

    let stats = outcome.sums.stats();
    eprintln!(
        "Evaluated {} files ({}) and found {} duplicates ({}) in {:.2?}.",
        stats.num_files,
        format_size(stats.num_bytes, DECIMAL),
        stats.num_dup_files,
        format_size(stats.num_dup_bytes, DECIMAL),
        start.elapsed(),
    );

    if args.all_dup {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        outcome
            .sums
            .write_all_dup(&mut out)
            .context("writing duplicate summary")?;
        out.flush().ok();
    }

    if stats.num_dup_files > 0 {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// First signal requests a cooperative shutdown; a second one force-exits.
fn install_signal_handler(cancel: CancelToken) -> Result<()> {
    let signals = Arc::new(AtomicU32::new(0));
    ctrlc::set_handler(move || {
        let prior = signals.fetch_add(1, Ordering::SeqCst);
        if prior == 0 {
            eprintln!("Interrupted; exiting...");
            cancel.trigger();
        } else {
            std::process::exit(130);
        }
    })
    .context("failed to install signal handler")
}

fn setup_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("dupes=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dupes=warn"))
    };

    // Logs go to stderr: stdout is reserved for path output.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}
