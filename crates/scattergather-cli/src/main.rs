#![doc = include_str!("../README.md")]

mod config;
mod lookup;
mod telemetry;

use clap::Parser;
use config::{CliArgs, CliConfig};
use lookup::{Directory, DirectoryClient};
use scattergather::{
    ContextProvider, DELIMITER, IdentifierRequest, ScatterGatherInvoker, ThreadLocalContext,
    WorkerPool,
};
use std::io::{BufWriter, Read, Write};
use std::sync::Arc;
use std::time::Instant;
use telemetry::init_telemetry;

fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = CliConfig::try_from(args)?;

    init_telemetry()?;

    let request: IdentifierRequest<String> = if config.ids.is_empty() {
        read_ids(std::io::stdin().lock())?
    } else {
        config.ids.iter().cloned().collect()
    };
    log_startup_info(&config, &request);

    let pool = WorkerPool::builder(config.num_workers)
        .queue_policy(config.queue)
        .build()?;
    let invoker = ScatterGatherInvoker::new(Arc::new(pool))
        .with_split_policy(config.split_policy)
        .with_trace_capture(config.capture_trace);
    let client = DirectoryClient::new(
        invoker,
        Directory::new(config.latency, config.fail_on.clone()),
    );

    let ctx = ThreadLocalContext;
    ctx.set_locale(config.locale.clone());
    if let Some(principal) = &config.principal {
        ctx.set_principal(principal.clone());
    }

    let started = Instant::now();
    let result = client.resolve(request);
    tracing::info!(elapsed = ?started.elapsed(), "Lookup finished");
    client.shutdown();

    let mut records: Vec<_> = result?.into_iter().collect();
    records.sort();

    let mut out = BufWriter::new(std::io::stdout().lock());
    for record in &records {
        writeln!(out, "{record}")?;
    }
    out.flush()?;

    tracing::info!(records = records.len(), "Wrote merged records");
    Ok(())
}

/// Reads identifiers separated by whitespace or the request delimiter.
fn read_ids(mut input: impl Read) -> anyhow::Result<IdentifierRequest<String>> {
    let mut buf = String::new();
    input.read_to_string(&mut buf)?;
    Ok(buf
        .split(|c: char| c.is_whitespace() || c == DELIMITER)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect())
}

fn log_startup_info(config: &CliConfig, request: &IdentifierRequest<String>) {
    if cfg!(debug_assertions) {
        tracing::info!(
            "Resolving {} identifiers with full config: {:#?}",
            request.len(),
            config
        );
    } else {
        tracing::info!(
            "Resolving {} identifiers in chunks of up to {} on {} workers",
            request.len(),
            config.split_policy.window(),
            config.num_workers
        );
    }
}
