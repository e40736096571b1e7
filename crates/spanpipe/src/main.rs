mod input;
mod telemetry;

use anyhow::bail;
use clap::{Parser, Subcommand};
use spanpipe_core::traceparent::TraceParent;
use spanpipe_core::{builder, envelope, fields};
use spanpipe_dispatch::{DispatchConfig, SinkMode, dispatch};

use crate::input::{SpanArgs, read_piped_span};
use crate::telemetry::init_cli_tracing;

#[derive(Parser, Debug)]
#[command(name = "spanpipe")]
#[command(about = "Build and ship OpenTelemetry spans from shell pipelines")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Create or update a span and print its envelope")]
    Span(SpanArgs),
    #[command(about = "Print the W3C traceparent for a piped span")]
    Traceparent,
    #[command(about = "End a piped span and push it to the configured sink")]
    Push {
        #[arg(long, default_value = "stdout", help = "Sink mode: stdout, otlp, otlphttp")]
        mode: String,
        #[arg(long, help = "Collector endpoint override")]
        endpoint: Option<String>,
        #[arg(long, default_value = "10s", help = "Export timeout")]
        timeout: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_cli_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Span(args) => {
            let base = read_piped_span().await?;
            let overrides = args.into_overrides()?;
            let span = builder::build(base, &overrides)?;
            println!("{}", envelope::encode(&span));
            Ok(())
        }
        Commands::Traceparent => {
            let Some(span) = read_piped_span().await? else {
                bail!("a piped span envelope is required");
            };
            let header = TraceParent::propagation(&span.trace_id, &span.span_id)?;
            println!("{header}");
            Ok(())
        }
        Commands::Push {
            mode,
            endpoint,
            timeout,
        } => {
            let mode: SinkMode = mode.parse()?;
            let Some(span) = read_piped_span().await? else {
                bail!("a piped span envelope is required");
            };
            if span.name.is_empty() {
                return Err(spanpipe_core::SpanpipeError::MissingName.into());
            }
            let cfg = DispatchConfig {
                mode,
                endpoint,
                timeout: fields::parse_duration_str(&timeout)?,
            };
            tracing::debug!(mode = ?cfg.mode, "dispatching span");
            dispatch(&span, &cfg)?;
            Ok(())
        }
    }
}
