//! `muse` command line
//!
//! Sections documents and derives Epic/Feature/Story hierarchies from
//! recorded reasoning responses. JSON goes to stdout, logs to stderr.

use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use muse_artifact::Document;
use muse_core::{CancellationToken, Pipeline, PipelineConfig, ReplayClient};
use muse_ingest::Sectioner;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn cli() -> Command {
    let document = Arg::new("document")
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("Converted document text (markdown or plain text)");
    let id = Arg::new("id")
        .long("id")
        .help("Document id used in artifact ids (default: derived from content)");
    let config = Arg::new("config")
        .long("config")
        .value_parser(value_parser!(PathBuf))
        .help("Pipeline configuration (TOML)");
    let pretty = Arg::new("pretty")
        .long("pretty")
        .action(ArgAction::SetTrue)
        .help("Pretty-print JSON output");

    Command::new("muse")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Derive traceable delivery artifacts from regulatory documents")
        .subcommand_required(true)
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .global(true)
                .value_parser(["text", "json"])
                .default_value("text")
                .help("Log line format on stderr"),
        )
        .subcommand(
            Command::new("split")
                .about("Print the document's sections as JSON")
                .arg(document.clone())
                .arg(id.clone())
                .arg(config.clone())
                .arg(pretty.clone()),
        )
        .subcommand(
            Command::new("derive")
                .about("Run the full pipeline against recorded responses")
                .arg(document)
                .arg(
                    Arg::new("responses")
                        .long("responses")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Recorded reasoning responses (JSON)"),
                )
                .arg(id)
                .arg(config.clone())
                .arg(pretty),
        )
        .subcommand(
            Command::new("config")
                .about("Print the effective configuration as TOML")
                .arg(config),
        )
}

fn init_logging(format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn load_config(args: &ArgMatches) -> Result<PipelineConfig> {
    match args.get_one::<PathBuf>("config") {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn load_document(args: &ArgMatches) -> Result<Document> {
    let path = args
        .get_one::<PathBuf>("document")
        .context("document path is required")?;
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading document {}", path.display()))?;
    let filename = path
        .file_name()
        .map_or_else(String::new, |name| name.to_string_lossy().into_owned());
    match args.get_one::<String>("id") {
        Some(id) => Ok(Document::with_id(id.as_str(), filename, text)?),
        None => Ok(Document::new(filename, text)),
    }
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{json}");
    Ok(())
}

fn split(args: &ArgMatches) -> Result<()> {
    let config = load_config(args)?;
    let document = load_document(args)?;
    let sections = Sectioner::with_config(config.sectioner).split(&document)?;
    info!(document = document.id(), sections = sections.len(), "document split");
    print_json(&sections, args.get_flag("pretty"))
}

async fn derive(args: &ArgMatches) -> Result<()> {
    let config = load_config(args)?;
    let document = load_document(args)?;
    let responses = args
        .get_one::<PathBuf>("responses")
        .context("--responses is required")?;
    let client = read_responses(responses)?;

    let pipeline = Pipeline::with_config(Arc::new(client), config)?;
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling run");
            interrupt.cancel();
        }
    });

    let output = pipeline.run(&document, &cancel).await?;
    print_json(&output, args.get_flag("pretty"))
}

fn read_responses(path: &Path) -> Result<ReplayClient> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading responses {}", path.display()))?;
    ReplayClient::from_json_str(&json)
        .with_context(|| format!("parsing responses {}", path.display()))
}

fn show_config(args: &ArgMatches) -> Result<()> {
    let config = load_config(args)?;
    print!("{}", config.to_toml_string()?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    let Some((command, args)) = matches.subcommand() else {
        bail!("no command given");
    };
    let format = args
        .get_one::<String>("log-format")
        .map_or("text", String::as_str);
    init_logging(format);

    match command {
        "split" => split(args),
        "derive" => derive(args).await,
        "config" => show_config(args),
        other => bail!("unknown command '{other}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        cli().debug_assert();
    }

    #[test]
    fn derive_requires_responses() {
        let err = cli()
            .try_get_matches_from(["muse", "derive", "policy.md"])
            .expect_err("missing --responses");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn log_format_is_global() {
        let matches = cli()
            .try_get_matches_from(["muse", "split", "policy.md", "--log-format", "json"])
            .expect("valid args");
        let split = matches.subcommand_matches("split").expect("split matched");
        assert_eq!(
            split.get_one::<String>("log-format").map(String::as_str),
            Some("json")
        );
    }
}
