mod app;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;

use app::{Cli, init_sink, process_input, summarize_mapping};
use osmroute::Mapping;
use osmroute::columns::ColumnRegistry;
use osmroute::config::{MappingConfig, RuntimeConfig};
use osmroute::geometry::EnginePool;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    let runtime = RuntimeConfig::load(cli.settings.as_deref())
        .context("Settings: Failed to load runtime settings")?;

    if let Some(threads) = cli.threads.or(runtime.threads) {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("CLI: Failed to initialize thread pool")?;
    }

    let config = MappingConfig::load(&cli.mapping)
        .with_context(|| format!("Mapping: Failed to load {:?}", cli.mapping))?;
    let pool = Arc::new(EnginePool::new(runtime.pool_size()));
    let mapping = Mapping::compile_with(config, &ColumnRegistry::builtin(), pool)
        .with_context(|| format!("Mapping: Failed to compile {:?}", cli.mapping))?;
    summarize_mapping(&mapping);

    let Some(input) = &cli.input else {
        tracing::info!("Mapping OK");
        return Ok(());
    };

    let filter_tags = runtime.filter_tags && !cli.no_filter_tags;
    let mut sink = init_sink(&cli.output)?;

    let row_count = process_input(&mapping, input, &mut sink, filter_tags)?;
    sink.finish().context("Output: Failed to finalize sink")?;
    tracing::info!("Done! Written {} rows", row_count);

    Ok(())
}
