//! flowsentinel CLI
//!
//! Administrative command-line tool exercising the flow engine and its
//! stores end to end: start/advance/inspect a flow instance, and
//! invalidate sessions by partition.

mod file_store;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use flow_engine::parser;
use flow_engine::store::FlowStore;
use flow_engine::Engine;
use flow_session::SessionManager;
use flow_store::{InMemoryStore, InMemoryStoreConfig};
use serde_json::{Map, Value};
use tracing::info;

use file_store::FileStore;

/// Which `FlowStore` implementation backs this invocation.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum Backend {
    /// JSON-file-backed store that persists across invocations (the
    /// default demo surface — see `file_store`).
    File,
    /// The real in-memory store (`flow-store::InMemoryStore`), built
    /// fresh for this process. Useful for exercising sliding-TTL/cap
    /// behavior directly, but state does not survive past this single
    /// invocation, so `start` and a later `advance` in a separate
    /// invocation won't see each other.
    Memory,
}

#[derive(Parser)]
#[command(name = "flowsentinel")]
#[command(about = "flowsentinel administration CLI")]
struct Cli {
    /// Path to the JSON file backing the demo store across invocations
    /// (only consulted when `--backend file`).
    #[arg(long, global = true, default_value = ".flowsentinel-store.json")]
    store: PathBuf,

    /// Which `FlowStore` implementation to exercise.
    #[arg(long, global = true, value_enum, default_value = "file")]
    backend: Backend,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Flow-instance operations.
    Flow {
        #[command(subcommand)]
        action: FlowCommands,
    },
    /// Session invalidation operations.
    Session {
        #[command(subcommand)]
        action: SessionCommands,
    },
}

#[derive(Subcommand)]
enum FlowCommands {
    /// Start a new flow instance from a definition file.
    Start {
        /// Path to the flow definition JSON file.
        #[arg(long)]
        definition: PathBuf,
        #[arg(long)]
        owner: Option<String>,
        #[arg(long)]
        instance: String,
        /// Initial attributes as a JSON object.
        #[arg(long, default_value = "{}")]
        attrs: String,
    },
    /// Advance an existing flow instance.
    Advance {
        #[arg(long)]
        definition: PathBuf,
        #[arg(long)]
        owner: Option<String>,
        #[arg(long)]
        instance: String,
        /// Payload as a JSON object; may include `"__targetStep"`.
        #[arg(long, default_value = "{}")]
        payload: String,
    },
    /// Show the current state of a flow instance.
    Show {
        #[arg(long)]
        flow_name: String,
        #[arg(long)]
        owner: Option<String>,
        #[arg(long)]
        instance: String,
    },
}

#[derive(Subcommand)]
enum SessionCommands {
    /// Invalidate every flow instance scoped to a partition.
    InvalidatePartition {
        #[arg(long)]
        partition: String,
        #[arg(long)]
        reason: Option<String>,
    },
}

fn storage_key(definition_id: &str, owner: Option<&str>, instance: &str) -> String {
    format!("{definition_id}:{}:{instance}", owner.unwrap_or("anonymous"))
}

fn parse_json_object(raw: &str) -> anyhow::Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!("expected a JSON object, got {other}"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    flow_common::init_tracing();
    let cli = Cli::parse();

    match cli.backend {
        Backend::File => {
            let store = Arc::new(FileStore::new(cli.store));
            dispatch(cli.command, store).await
        }
        Backend::Memory => {
            let store = Arc::new(InMemoryStore::new(&InMemoryStoreConfig::default()));
            dispatch(cli.command, store).await
        }
    }
}

async fn dispatch<S: FlowStore + 'static>(command: Commands, store: Arc<S>) -> anyhow::Result<()> {
    match command {
        Commands::Flow { action } => run_flow_command(action, store).await,
        Commands::Session { action } => run_session_command(action, store).await,
    }
}

async fn run_flow_command<S: FlowStore + 'static>(
    action: FlowCommands,
    store: Arc<S>,
) -> anyhow::Result<()> {
    let raw_store = Arc::clone(&store);
    let engine = Engine::new(store);

    match action {
        FlowCommands::Start {
            definition,
            owner,
            instance,
            attrs,
        } => {
            let def = Arc::new(parser::parse_file(&definition)?);
            let key = storage_key(def.id().as_str(), owner.as_deref(), &instance);
            let initial_attrs = parse_json_object(&attrs)?;

            let state = engine.start(&key, def, initial_attrs).await?;
            info!(key, step = %state.current_step(), "flow started");
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "key": key,
                    "step": state.current_step().as_str(),
                    "completed": state.completed(),
                }))?
            );
        }
        FlowCommands::Advance {
            definition,
            owner,
            instance,
            payload,
        } => {
            let def = Arc::new(parser::parse_file(&definition)?);
            let key = storage_key(def.id().as_str(), owner.as_deref(), &instance);
            let payload = parse_json_object(&payload)?;

            let state = engine.advance(&key, def, payload).await?;
            info!(key, step = %state.current_step(), completed = state.completed(), "flow advanced");
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "key": key,
                    "step": state.current_step().as_str(),
                    "completed": state.completed(),
                    "attributes": state.attributes(),
                }))?
            );
        }
        FlowCommands::Show {
            flow_name,
            owner,
            instance,
        } => {
            let key = storage_key(&flow_name, owner.as_deref(), &instance);
            // `getState` needs a definition only to rehydrate `FlowState`'s
            // reference to it; the CLI's demo surface has no definition
            // provider wired up, so this prints the raw persisted
            // snapshot instead of resolving one.
            let aggregate = raw_store.load_aggregate(&key).await?;
            match aggregate {
                Some(agg) => println!("{}", serde_json::to_string_pretty(&agg)?),
                None => println!("no flow instance found for key '{key}'"),
            }
        }
    }
    Ok(())
}

async fn run_session_command<S: FlowStore + 'static>(
    action: SessionCommands,
    store: Arc<S>,
) -> anyhow::Result<()> {
    let manager = SessionManager::new(store);
    match action {
        SessionCommands::InvalidatePartition { partition, reason } => {
            let removed = match reason {
                Some(reason) => manager.invalidate_on_security_event(&partition, &reason).await?,
                None => manager.invalidate_user_session(&partition).await?,
            };
            println!("invalidated {removed} flow instance(s) in partition '{partition}'");
        }
    }
    Ok(())
}
