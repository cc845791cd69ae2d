//! `catsync` command line
//!
//! `run` ingests a catalog file into an in-memory store, once or several
//! times, and prints each pass's report. `topology` prints the standard
//! database-service topology.

use anyhow::Context as _;
use catsync_core::{
    logging, Catalog, CatalogSource, Dispatcher, IngestionConfig, MemoryStore, RunReport,
    Traversal, Workflow,
};
use catsync_topology::{presets, NodeId, Topology};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Instrument;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Command::new("catsync")
        .version(catsync_core::VERSION)
        .about("Fingerprint-driven metadata reconciliation")
        .subcommand_required(true)
        .subcommand(
            Command::new("run")
                .about("Ingest a catalog file into an in-memory store")
                .arg(
                    Arg::new("catalog")
                        .long("catalog")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("YAML catalog describing the service"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("YAML ingestion config (defaults apply when omitted)"),
                )
                .arg(
                    Arg::new("passes")
                        .long("passes")
                        .default_value("1")
                        .value_parser(value_parser!(usize))
                        .help("Number of passes against the same store"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print run reports as JSON"),
                ),
        )
        .subcommand(
            Command::new("topology")
                .about("Print the database service topology")
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        );

    match cli.get_matches().subcommand() {
        Some(("run", args)) => run(args).await,
        Some(("topology", args)) => show_topology(args.get_flag("json")),
        _ => unreachable!("subcommand_required"),
    }
}

async fn run(args: &ArgMatches) -> anyhow::Result<()> {
    let config = match args.get_one::<PathBuf>("config") {
        Some(path) => IngestionConfig::from_path(path)?,
        None => IngestionConfig::default(),
    };
    logging::init(&config.logging);

    let catalog_path = args
        .get_one::<PathBuf>("catalog")
        .context("--catalog is required")?;
    let catalog = Catalog::from_path(catalog_path)?;
    let passes = args.get_one::<usize>("passes").copied().unwrap_or(1);
    let json = args.get_flag("json");

    let topology = Arc::new(presets::database_service()?);
    let store = Arc::new(MemoryStore::new());
    let workflow = Workflow::new(store.clone()).raise_on_error(config.workflow.raise_on_error);

    let mut failed = false;
    for pass in 1..=passes {
        let source = CatalogSource::new(catalog.clone(), &config.source)?;
        let span = logging::run_span(source.service_name(), pass);
        let dispatcher = Dispatcher::new(store.clone())
            .force_overwrite(config.source.force_entity_overwriting)
            .with_ack_attempts(config.source.ack_retries);
        let traversal = Traversal::for_source(topology.clone(), source, dispatcher)?;

        store.reset_metrics();
        let report = workflow.run(traversal).instrument(span).await?;
        failed |= report.status.has_failures();
        print_report(pass, &report, store.metrics().writes(), json)?;
    }

    if failed {
        anyhow::bail!("ingestion finished with failures");
    }
    Ok(())
}

fn print_report(pass: usize, report: &RunReport, writes: usize, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    let summary = &report.summary;
    println!("Pass {pass}:");
    println!("  Written:   {}", summary.records);
    println!("  Patched:   {}", summary.updated);
    println!("  Unchanged: {}", summary.unchanged);
    println!("  Filtered:  {}", summary.filtered);
    println!("  Warnings:  {}", summary.warnings);
    println!("  Failures:  {}", summary.failures);
    println!("  Store writes: {writes}");
    println!("  Success rate: {:.1}%", report.success_rate);
    println!("  Elapsed: {} ms", report.elapsed().num_milliseconds());
    for failure in &report.status.failures {
        println!("  ! {} ({:?}): {}", failure.name, failure.kind, failure.error);
    }
    Ok(())
}

fn show_topology(json: bool) -> anyhow::Result<()> {
    let topology = presets::database_service()?;
    if json {
        let nodes: Vec<_> = topology.nodes().map(|(_, node)| node).collect();
        println!("{}", serde_json::to_string_pretty(&nodes)?);
        return Ok(());
    }
    for &root in topology.roots() {
        print_node(&topology, root, 0);
    }
    Ok(())
}

fn print_node(topology: &Topology, id: NodeId, depth: usize) {
    let node = topology.node(id);
    let indent = "  ".repeat(depth);
    println!(
        "{indent}{} <- {}",
        node.name,
        node.producer.as_deref().unwrap_or("(no producer)")
    );
    for stage in &node.stages {
        let mut flags = Vec::new();
        if stage.nullable {
            flags.push("nullable");
        }
        if stage.must_ack {
            flags.push("must_ack");
        }
        if stage.cache_entities {
            flags.push("cache_entities");
        }
        if stage.use_cache {
            flags.push("use_cache");
        }
        if stage.clear_context {
            flags.push("clear_context");
        }
        if !stage.overwrite {
            flags.push("no_overwrite");
        }
        println!(
            "{indent}  - {} via {} [{}]",
            stage.entity_type,
            stage.processor,
            flags.join(", ")
        );
    }
    for hook in &node.post_process {
        println!("{indent}  * post-process {hook}");
    }
    for &child in topology.children(id) {
        print_node(topology, child, depth + 1);
    }
}
