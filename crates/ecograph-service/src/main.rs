//! CLI entry point for the ecograph technology graph.
//!
//! Payloads are read as JSON from stdin, results written as JSON to stdout.
//! Logs go to stderr.

use std::io::IsTerminal;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing_subscriber::{fmt, EnvFilter};

use ecograph_core::filter::{NodeFilter, RelationshipFilter, SubgraphFilter};
use ecograph_core::types::{
    NodeCreate, NodeUpdate, RelType, RelationshipCreate, RelationshipKey, RelationshipUpdate,
};
use ecograph_service::config::{Settings, DEFAULT_FILE_PREFIX};
use ecograph_service::GraphService;

#[derive(Parser)]
#[command(name = "ecograph")]
#[command(about = "Typed persistence and query layer for the ecograph technology graph")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file prefix (default: ecograph).
    #[arg(short, long, default_value = DEFAULT_FILE_PREFIX, global = true)]
    config: String,

    /// Run against an empty in-process graph instead of Neo4j.
    #[arg(long, global = true)]
    in_memory: bool,
}

#[derive(clap::Args)]
struct RelationshipArgs {
    /// Start node uid.
    #[arg(long)]
    source: String,
    /// End node uid.
    #[arg(long)]
    target: String,
    /// Relationship type, e.g. DEPENDS_ON.
    #[arg(long = "type")]
    rel_type: RelType,
}

impl RelationshipArgs {
    fn key(self) -> RelationshipKey {
        RelationshipKey {
            source_uid: self.source,
            target_uid: self.target,
            rel_type: self.rel_type,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Create the uid constraint and name/source indexes.
    InitSchema,
    /// Print node and relationship counts.
    Stats,
    /// Delete every node and relationship.
    Clear {
        /// Required confirmation.
        #[arg(long)]
        yes: bool,
    },
    /// Create one node (NodeCreate JSON on stdin).
    CreateNode,
    /// Create nodes, skipping duplicates (JSON array on stdin).
    CreateNodes,
    /// Fetch a node by uid.
    GetNode { uid: String },
    /// Search nodes (optional NodeFilter JSON on stdin).
    FindNodes,
    /// Update a node (NodeUpdate JSON on stdin).
    UpdateNode { uid: String },
    /// Delete a node and its relationships.
    DeleteNode { uid: String },
    /// Create one relationship (RelationshipCreate JSON on stdin).
    CreateRelationship,
    /// Create relationships, skipping missing endpoints (JSON array on stdin).
    CreateRelationships,
    /// List relationships of a node (optional RelationshipFilter JSON on stdin).
    Relationships { uid: String },
    /// Update a relationship (RelationshipUpdate JSON on stdin).
    UpdateRelationship {
        #[command(flatten)]
        key: RelationshipArgs,
    },
    /// Delete a relationship.
    DeleteRelationship {
        #[command(flatten)]
        key: RelationshipArgs,
    },
    /// Extract a neighborhood or filtered subgraph (SubgraphFilter JSON on stdin).
    Subgraph,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let cli = Cli::parse();

    let service = if cli.in_memory {
        GraphService::in_memory()
    } else {
        let settings = Settings::load(&cli.config)?;
        GraphService::connect(settings.neo4j)
            .await
            .context("Failed to connect to Neo4j")?
    };

    let result = run(&service, cli.command).await;
    service.close().await;
    result
}

async fn run(service: &GraphService, command: Command) -> anyhow::Result<()> {
    match command {
        Command::InitSchema => {
            service.init_schema().await?;
            print_json(&serde_json::json!({ "ok": true }))?;
        }
        Command::Stats => print_json(&service.get_stats().await?)?,
        Command::Clear { yes } => {
            if !yes {
                anyhow::bail!("refusing to clear the graph without --yes");
            }
            service.clear_all().await?;
            print_json(&serde_json::json!({ "ok": true }))?;
        }
        Command::CreateNode => {
            let data: NodeCreate = read_json()?;
            print_json(&service.create_node(&data).await?)?;
        }
        Command::CreateNodes => {
            let items: Vec<NodeCreate> = read_json()?;
            print_json(&service.create_nodes_batch(&items).await?)?;
        }
        Command::GetNode { uid } => print_json(&service.get_node(&uid).await?)?,
        Command::FindNodes => {
            let filter: NodeFilter = read_json_or_default()?;
            print_json(&service.find_nodes(&filter).await?)?;
        }
        Command::UpdateNode { uid } => {
            let data: NodeUpdate = read_json()?;
            print_json(&service.update_node(&uid, &data).await?)?;
        }
        Command::DeleteNode { uid } => {
            let deleted = service.delete_node(&uid).await?;
            print_json(&serde_json::json!({ "deleted": deleted }))?;
        }
        Command::CreateRelationship => {
            let data: RelationshipCreate = read_json()?;
            print_json(&service.create_relationship(&data).await?)?;
        }
        Command::CreateRelationships => {
            let items: Vec<RelationshipCreate> = read_json()?;
            print_json(&service.create_relationships_batch(&items).await?)?;
        }
        Command::Relationships { uid } => {
            let filter: Option<RelationshipFilter> = read_optional_json()?;
            print_json(&service.get_relationships(&uid, filter.as_ref()).await?)?;
        }
        Command::UpdateRelationship { key } => {
            let data: RelationshipUpdate = read_json()?;
            print_json(&service.update_relationship(&key.key(), &data).await?)?;
        }
        Command::DeleteRelationship { key } => {
            let deleted = service.delete_relationship(&key.key()).await?;
            print_json(&serde_json::json!({ "deleted": deleted }))?;
        }
        Command::Subgraph => {
            let filter: SubgraphFilter = read_json_or_default()?;
            print_json(&service.get_subgraph(&filter).await?)?;
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn read_stdin() -> anyhow::Result<Option<String>> {
    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }
    let input = std::io::read_to_string(stdin)?;
    Ok(if input.trim().is_empty() {
        None
    } else {
        Some(input)
    })
}

fn read_optional_json<T: DeserializeOwned>() -> anyhow::Result<Option<T>> {
    match read_stdin()? {
        Some(input) => Ok(Some(
            serde_json::from_str(&input).context("Invalid JSON on stdin")?,
        )),
        None => Ok(None),
    }
}

fn read_json<T: DeserializeOwned>() -> anyhow::Result<T> {
    read_optional_json()?.ok_or_else(|| anyhow::anyhow!("expected a JSON payload on stdin"))
}

fn read_json_or_default<T: DeserializeOwned + Default>() -> anyhow::Result<T> {
    Ok(read_optional_json()?.unwrap_or_default())
}
