//! `pipeline-builder`: builds visual data pipelines on the remote service.
//!
//! This binary is the composition root. It
//!
//! 1. resolves [`ClientConfig`] from a TOML file, then the environment, then flags;
//! 2. wires `tracing-subscriber` (text or JSON, optional OTLP export);
//! 3. constructs [`HttpPipelineService`] and drives a [`PipelineSession`].
//!
//! ```text
//! pipeline-builder templates [--category C] [--industry I] [--json]
//! pipeline-builder validate <definition.toml>
//! pipeline-builder apply <definition.toml> [--execute] [--force]
//! ```

mod definition;
mod telemetry;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use builder_api::{ClientConfig, HttpPipelineService};
use clap::{Parser, Subcommand};
use pipeline::{NodeId, NodeTemplate, PipelineReport, PipelineService, TemplateRegistry};
use sync::{PipelineSession, Reconciled};

use crate::definition::{draft, PipelineDefinition};
use crate::telemetry::LogFormat;

const DEFAULT_CONFIG_FILE: &str = "pipeline-builder.toml";

#[derive(Debug, Parser)]
#[command(name = "pipeline-builder", version, about = "Build and run visual data pipelines")]
struct Cli {
    /// Client config file. Defaults to `pipeline-builder.toml` when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Service base URL; overrides the config file and environment.
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Request timeout in seconds.
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the node template catalog.
    Templates {
        #[arg(long)]
        category: Option<String>,
        /// Keep templates whose name or description mentions this industry.
        #[arg(long)]
        industry: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Check a pipeline definition against the catalog without creating anything.
    Validate { definition: PathBuf },
    /// Create the pipeline described by a definition on the service.
    Apply {
        definition: PathBuf,
        /// Start a run once the pipeline is built.
        #[arg(long)]
        execute: bool,
        /// Execute even when node configs have validation errors.
        #[arg(long, requires = "execute")]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _telemetry = telemetry::init(cli.log_format)?;

    let config = client_config(&cli)?;
    tracing::debug!(base_url = %config.base_url, timeout_secs = config.timeout_secs, "client configured");
    let service = HttpPipelineService::new(&config)?;

    match cli.command {
        Command::Templates {
            category,
            industry,
            json,
        } => templates(&service, category.as_deref(), industry.as_deref(), json).await,
        Command::Validate { definition } => validate(&service, &definition).await,
        Command::Apply {
            definition,
            execute,
            force,
        } => apply(service, &definition, execute, force).await,
    }
}

fn client_config(cli: &Cli) -> anyhow::Result<ClientConfig> {
    let from_file = match &cli.config {
        Some(path) => ClientConfig::load(path)?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => ClientConfig::load(Path::new(DEFAULT_CONFIG_FILE))?,
        None => ClientConfig::default(),
    };
    let mut config = from_file.with_env_overrides();
    if let Some(url) = &cli.base_url {
        config.base_url = url.clone();
    }
    if let Some(secs) = cli.timeout_secs {
        config.timeout_secs = secs;
    }
    Ok(config)
}

fn read_definition(path: &Path) -> anyhow::Result<PipelineDefinition> {
    let contents = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    PipelineDefinition::parse(&contents).with_context(|| format!("in {}", path.display()))
}

async fn templates(
    service: &impl PipelineService,
    category: Option<&str>,
    industry: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let registry = service.node_templates().await?;
    let selected = select_templates(&registry, category, industry);

    if json {
        println!("{}", serde_json::to_string_pretty(&selected)?);
        return Ok(());
    }
    for template in selected {
        println!(
            "{:<16} {:<24} {:<10} {}",
            template.category,
            template.id.as_str(),
            template.kind.to_string(),
            template.name
        );
    }
    Ok(())
}

fn select_templates<'a>(
    registry: &'a TemplateRegistry,
    category: Option<&str>,
    industry: Option<&'a str>,
) -> Vec<&'a NodeTemplate> {
    let by_industry: Vec<&NodeTemplate> = match industry {
        Some(keyword) => registry.matching(keyword).collect(),
        None => registry.iter().collect(),
    };
    by_industry
        .into_iter()
        .filter(|t| category.map_or(true, |c| t.category.eq_ignore_ascii_case(c)))
        .collect()
}

async fn validate(service: &impl PipelineService, path: &Path) -> anyhow::Result<()> {
    let definition = read_definition(path)?;
    let registry = service.node_templates().await?;
    let check = draft(&definition, &registry)?;

    if !check.graph.is_acyclic() {
        println!("warning: the pipeline contains a cycle");
    }
    print_report(&check.report, &check.keys);
    if !check.report.is_clean() {
        bail!("{} has configuration errors", path.display());
    }
    println!(
        "{}: {} nodes, {} connections, ok",
        definition.name,
        check.graph.nodes().len(),
        check.graph.connections().len()
    );
    Ok(())
}

async fn apply(service: HttpPipelineService, path: &Path, execute: bool, force: bool) -> anyhow::Result<()> {
    let definition = read_definition(path)?;
    let session = PipelineSession::start(service, definition.empty_pipeline()).await?;
    let registry = session.registry().await;

    // Catch unknown templates and bad keys before anything is created remotely.
    draft(&definition, &registry)?;

    let mut ids: BTreeMap<&str, NodeId> = BTreeMap::new();
    let mut keys: BTreeMap<NodeId, String> = BTreeMap::new();
    for node in &definition.nodes {
        let template = registry.require(&node.template)?;
        let config = node.resolve_config(template)?;
        let created = match session.add_node(&node.template, node.position, config).await? {
            Reconciled::Applied(created) => created,
            Reconciled::Discarded { reason, .. } => bail!("node `{}` was not added: {reason}", node.key),
        };
        tracing::info!(key = %node.key, node_id = %created.id, "node created");
        ids.insert(node.key.as_str(), created.id.clone());
        keys.insert(created.id, node.key.clone());
    }

    for connection in &definition.connections {
        let (Some(source), Some(target)) = (ids.get(connection.from.as_str()), ids.get(connection.to.as_str())) else {
            bail!("connection {} -> {} refers to an unknown node", connection.from, connection.to);
        };
        if let Reconciled::Discarded { reason, .. } = session.connect(source, target).await? {
            bail!("connection {} -> {} was not made: {reason}", connection.from, connection.to);
        }
    }

    let pipeline_id = session.ensure_saved().await?;
    let report = session.validate().await;
    print_report(&report, &keys);
    println!("created pipeline {pipeline_id} with {} nodes", ids.len());

    if execute {
        if !report.is_clean() && !force {
            bail!("not executing: node configs have errors (use --force to run anyway)");
        }
        let receipt = session.execute().await?;
        match &receipt.ack.run_id {
            Some(run_id) => println!("execution started: run {run_id}"),
            None => println!(
                "execution accepted ({})",
                receipt.ack.status.as_deref().unwrap_or("no status")
            ),
        }
    }
    Ok(())
}

fn print_report(report: &PipelineReport, keys: &BTreeMap<NodeId, String>) {
    for line in report_lines(report, keys) {
        println!("{line}");
    }
}

fn report_lines(report: &PipelineReport, keys: &BTreeMap<NodeId, String>) -> Vec<String> {
    let key = |id: &NodeId| keys.get(id).cloned().unwrap_or_else(|| id.to_string());
    let mut lines = Vec::new();
    for node_id in &report.missing_templates {
        lines.push(format!("error: {}: node template is not in the catalog", key(node_id)));
    }
    for (node_id, errors) in &report.field_errors {
        for (field, message) in errors {
            lines.push(format!("error: {}.{field}: {message}", key(node_id)));
        }
    }
    lines
}
