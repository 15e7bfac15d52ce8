mod activity;
mod catalog;
mod config;
mod disambiguate;
mod extract;
mod fetch;
mod input;
mod lens;
mod model;
mod prompt;
mod resolver;
mod sink;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::{Args, Config};
use crate::fetch::{HttpTransport, Transport};
use crate::prompt::{LinePrompter, Prompter, TerminalPrompter};
use crate::resolver::Resolver;
use crate::sink::HtmlSink;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = Config::from_args(&args);

    let entities = input::load_entities(&config.input)?;
    let sink = Arc::new(
        HtmlSink::create(&config.output)
            .with_context(|| format!("creating result file {}", config.output.display()))?,
    );
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new().context("building http client")?);
    let prompter: Arc<dyn Prompter> = if config.plain {
        Arc::new(LinePrompter)
    } else {
        Arc::new(TerminalPrompter)
    };

    let resolver = Arc::new(Resolver::new(config.clone(), transport, prompter, Arc::clone(&sink)));
    let summary = resolver.run(entities).await;

    sink.finish()
        .await
        .with_context(|| format!("finishing result file {}", config.output.display()))?;
    info!(output = %config.output.display(), "{summary}");
    Ok(())
}
