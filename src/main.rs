//! # Analyst Console CLI (`anc`)
//!
//! The `anc` binary is the terminal frontend of the data-analysis assistant
//! platform. It provides commands for connecting data, talking to the
//! assistant, managing the query history, and running the notebook sandbox
//! against a remote execution cluster.
//!
//! ## Usage
//!
//! ```bash
//! anc --config ./config/anc.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `anc init` | Create the local state database |
//! | `anc status` | Data sources, backend health, and clusters |
//! | `anc upload <path>...` | Upload files into the indexing pipeline |
//! | `anc connect <name>` | Register a live database/API connection |
//! | `anc ask "<prompt>"` | One chat round-trip with the assistant |
//! | `anc chat` | Interactive assistant session |
//! | `anc agents` | List the backend's agent personas |
//! | `anc history` | Show (or clear) the assistant transcript |
//! | `anc queries` | Manage the query history |
//! | `anc run` | Run the active query's notebook on a cluster |
//! | `anc clusters <action>` | Cluster lifecycle operations |
//! | `anc stub` | Serve the local stub backend |
//!
//! ## Examples
//!
//! ```bash
//! # First run: create the state database
//! anc init
//!
//! # Work offline against the stub backend (in a second terminal)
//! anc stub --bind 127.0.0.1:8000
//!
//! # Connect data and ask for an analysis
//! anc upload ./data/orders.csv --wait
//! anc ask "Plot monthly revenue" --sandbox
//!
//! # Execute the generated code on a cluster
//! anc run --cluster mock-cluster-1
//! ```

use anyhow::{bail, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use analyst_console::backend::Backend;
use analyst_console::chat_client::ChatClient;
use analyst_console::chat_panel::ChatPanel;
use analyst_console::cluster_client::ClusterClient;
use analyst_console::config::{self, Config};
use analyst_console::file_client::FileClient;
use analyst_console::models::{DataSourceKind, DataSourceStatus};
use analyst_console::notebook::{CellStatus, ClusterPanel, Notebook};
use analyst_console::persist::SqliteSnapshotStore;
use analyst_console::status;
use analyst_console::store::{AppState, AppStore, QueryPatch};
use analyst_console::stub;
use analyst_console::upload;

/// Analyst Console — terminal frontend for a data-analysis assistant
/// platform.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file with the backend location and local storage settings.
#[derive(Parser)]
#[command(
    name = "anc",
    about = "Analyst Console — a terminal frontend for a data-analysis assistant platform",
    version,
    long_about = "Analyst Console talks to the platform's chat, file-indexing, and \
    cluster-execution backends, keeps a persistent local record of data sources, queries, \
    and the assistant transcript, and runs generated code on remote clusters through a \
    notebook-style sandbox."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/anc.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the local state database.
    ///
    /// Creates the SQLite file and schema used to persist data sources,
    /// queries, and the assistant transcript. Idempotent.
    Init,

    /// Show data sources, backend health, and available clusters.
    Status,

    /// Register a live connection as a data source.
    ///
    /// Live connections are store-only bookkeeping: the backend reaches the
    /// underlying system itself, the console just tracks it in the sidebar.
    Connect {
        /// Display name for the connection.
        name: String,

        /// Connection kind.
        #[arg(long, value_enum)]
        kind: ConnectionKind,
    },

    /// Remove a data source (full or prefix id).
    Remove {
        /// Data source id, as shown by `anc status`.
        id: String,
    },

    /// Upload files into the indexing pipeline.
    ///
    /// Files are processed strictly one at a time, in the order given; a
    /// failed file is recorded as an errored data source and the batch
    /// continues. Directories are expanded with the configured globs.
    Upload {
        /// Files or directories to upload.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Poll each file until the pipeline reports indexed or failed.
        #[arg(long)]
        wait: bool,
    },

    /// Send one message to the assistant and print the parsed reply.
    Ask {
        /// The message to send.
        prompt: String,

        /// Agent persona to address (default from config).
        #[arg(long)]
        agent: Option<String>,

        /// Send the reply's code block to the sandbox as a new query.
        #[arg(long)]
        sandbox: bool,
    },

    /// Interactive assistant session.
    ///
    /// Keeps one conversation (and its backend session) across turns.
    /// `:sandbox` sends the last reply's code block to the sandbox,
    /// `:quit` exits.
    Chat {
        /// Agent persona to address (default from config).
        #[arg(long)]
        agent: Option<String>,
    },

    /// List the backend's agent personas.
    Agents,

    /// Show the assistant transcript.
    History {
        /// Clear the transcript instead of showing it.
        #[arg(long)]
        clear: bool,
    },

    /// Show or manage the query history.
    Queries {
        /// Make this query (full or prefix id) the active one.
        #[arg(long)]
        activate: Option<String>,

        /// Delete this query (full or prefix id).
        #[arg(long)]
        remove: Option<String>,

        /// Open this query's detail view: code, output, and artifacts.
        #[arg(long)]
        show: Option<String>,
    },

    /// Run the active query's notebook on a cluster.
    ///
    /// Seeds the working cell from the active query, runs every cell in
    /// order (stopping at the first failure), and records the output on the
    /// query.
    Run {
        /// Cluster to execute on. Without it, the single running cluster is
        /// picked automatically.
        #[arg(long)]
        cluster: Option<String>,
    },

    /// Cluster lifecycle operations.
    Clusters {
        #[command(subcommand)]
        action: ClusterAction,
    },

    /// Serve the local stub backend.
    ///
    /// Hosts demo implementations of the chat, file, and execution services
    /// so the console works offline.
    Stub {
        /// Address to bind.
        #[arg(long, default_value = "127.0.0.1:8000")]
        bind: String,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell to generate completions for.
        shell: clap_complete::Shell,
    },
}

/// Cluster lifecycle subcommands.
#[derive(Subcommand)]
enum ClusterAction {
    /// List clusters and their states.
    List,

    /// Request a cluster start. The console shows the cluster as PENDING
    /// right away; the next `list` reconciles with the backend.
    Start {
        /// Cluster id.
        cluster_id: String,
    },

    /// Request a cluster stop.
    Stop {
        /// Cluster id.
        cluster_id: String,
    },

    /// Destroy the cluster's execution context (kernel restart).
    RestartContext {
        /// Cluster id.
        cluster_id: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ConnectionKind {
    Database,
    Api,
}

impl From<ConnectionKind> for DataSourceKind {
    fn from(kind: ConnectionKind) -> Self {
        match kind {
            ConnectionKind::Database => DataSourceKind::DatabaseConnection,
            ConnectionKind::Api => DataSourceKind::ApiConnection,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .without_time()
        .init();

    let cli = Cli::parse();

    // Commands that don't require config
    match &cli.command {
        Commands::Stub { bind } => {
            return stub::run_stub(bind).await;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(*shell, &mut Cli::command(), "anc", &mut std::io::stdout());
            return Ok(());
        }
        _ => {}
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let snapshots = SqliteSnapshotStore::open(&cfg.storage).await?;
            snapshots.close().await;
            println!(
                "State database initialized at {}.",
                cfg.storage.path.display()
            );
        }

        Commands::Status => {
            let store = open_store(&cfg).await?;
            let backend = Backend::new(&cfg.backend)?;
            let clusters = ClusterClient::new(backend.clone());
            status::print_status(store.state(), &backend, &clusters).await?;
        }

        Commands::Connect { name, kind } => {
            let mut store = open_store(&cfg).await?;
            let source = store.add_data_source(&name, kind.into()).await;
            println!("Connected {} ({}).", source.name, source.kind.label());
        }

        Commands::Remove { id } => {
            let mut store = open_store(&cfg).await?;
            let Some(source_id) = resolve_source_id(store.state(), &id) else {
                bail!("No data source matches '{id}'");
            };
            store.remove_data_source(&source_id).await;
            println!("Removed data source {source_id}.");
        }

        Commands::Upload { paths, wait } => {
            let mut store = open_store(&cfg).await?;
            let backend = Backend::new(&cfg.backend)?;
            let client = FileClient::new(backend);
            let report =
                upload::upload_batch(&mut store, &client, &cfg.upload, &paths, wait).await?;
            for entry in &report.entries {
                let marker = match entry.status {
                    DataSourceStatus::Error => "failed",
                    _ => "ok",
                };
                println!("{:<7} {}  ({})", marker, entry.path.display(), entry.detail);
            }
            println!(
                "{} uploaded, {} failed.",
                report.succeeded(),
                report.failed()
            );
        }

        Commands::Ask {
            prompt,
            agent,
            sandbox,
        } => {
            let mut store = open_store(&cfg).await?;
            let backend = Backend::new(&cfg.backend)?;
            let mut panel = ChatPanel::new(ChatClient::new(backend), &cfg.chat);
            panel.restore_viewport(store.state());

            let outcome = panel.send(&mut store, &prompt, agent.as_deref()).await?;
            status::print_message(&outcome.message);

            if sandbox {
                match &outcome.message.code {
                    Some(code) => {
                        let query = panel.send_to_sandbox(&mut store, &prompt, code).await;
                        println!(
                            "Created query #{} — run it with `anc run`.",
                            query.number
                        );
                    }
                    None => println!("No code block in the reply; nothing sent to the sandbox."),
                }
            }
        }

        Commands::Chat { agent } => {
            let mut store = open_store(&cfg).await?;
            let backend = Backend::new(&cfg.backend)?;
            let mut panel = ChatPanel::new(ChatClient::new(backend), &cfg.chat);
            panel.restore_viewport(store.state());
            run_chat(&mut store, &mut panel, agent.as_deref()).await?;
        }

        Commands::Agents => {
            let backend = Backend::new(&cfg.backend)?;
            let client = ChatClient::new(backend);
            let agents = client.list_agents().await?;
            println!("{:<20} {:<10} DESCRIPTION", "AGENT", "STATUS");
            for agent in agents {
                println!("{:<20} {:<10} {}", agent.name, agent.status, agent.description);
            }
        }

        Commands::History { clear } => {
            let mut store = open_store(&cfg).await?;
            if clear {
                let backend = Backend::new(&cfg.backend)?;
                let mut panel = ChatPanel::new(ChatClient::new(backend), &cfg.chat);
                panel.clear_transcript(&mut store).await;
                println!("Transcript cleared.");
            } else {
                status::print_transcript(store.state());
            }
        }

        Commands::Queries {
            activate,
            remove,
            show,
        } => {
            let mut store = open_store(&cfg).await?;
            if let Some(arg) = remove {
                let Some(id) = resolve_query_id(store.state(), &arg) else {
                    bail!("No query matches '{arg}'");
                };
                store.remove_query(&id).await;
                println!("Removed query {id}.");
            } else if let Some(arg) = activate {
                let Some(id) = resolve_query_id(store.state(), &arg) else {
                    bail!("No query matches '{arg}'");
                };
                store.set_active_query(Some(&id)).await;
                println!("Query {id} is now active.");
            } else if let Some(arg) = show {
                let Some(query) = store
                    .state()
                    .queries
                    .iter()
                    .find(|q| q.id == arg || q.id.starts_with(&arg))
                    .cloned()
                else {
                    bail!("No query matches '{arg}'");
                };
                status::print_query_detail(&query);

                // opening the detail view makes its first artifact the
                // active one, with the originating code alongside
                let first = query.artifacts.first().cloned();
                store
                    .set_active_artifact(first, Some(query.code.clone()))
                    .await;
            } else {
                status::print_queries(store.state());
            }
        }

        Commands::Run { cluster } => {
            let mut store = open_store(&cfg).await?;
            let Some(query) = store.state().active_query().cloned() else {
                bail!(
                    "No active query. Create one with `anc ask --sandbox` or pick one with \
                     `anc queries --activate <id>`."
                );
            };

            let backend = Backend::new(&cfg.backend)?;
            let client = ClusterClient::new(backend);
            let cluster_id = match cluster {
                Some(id) => id,
                None => pick_running_cluster(&client).await?,
            };

            let mut notebook = Notebook::new(Arc::new(client), &cfg.notebook);
            notebook.select_cluster(cluster_id.as_str());
            notebook.seed_from_query(&query);

            println!("Running query #{} on {cluster_id}...", query.number);
            let summary = notebook.run_all().await?;

            for cell in notebook.cells() {
                let marker = match cell.status {
                    CellStatus::Success => "ok",
                    CellStatus::Error => "error",
                    CellStatus::Running => "running",
                    CellStatus::Idle => "idle",
                };
                println!("[{marker}]");
                if let Some(output) = &cell.output {
                    println!("{output}");
                }
            }

            store
                .update_query(
                    &query.id,
                    QueryPatch {
                        output: Some(notebook.collected_output()),
                        ..QueryPatch::default()
                    },
                )
                .await;

            match summary.failed_cell {
                Some(_) => println!("Run stopped at a failing cell."),
                None => println!("Run complete ({} cells).", summary.executed),
            }
        }

        Commands::Clusters { action } => {
            let backend = Backend::new(&cfg.backend)?;
            let client = ClusterClient::new(backend);
            let mut panel = ClusterPanel::new();
            match action {
                ClusterAction::List => {
                    panel.refresh(&client).await?;
                    status::print_clusters(panel.clusters());
                }
                ClusterAction::Start { cluster_id } => {
                    panel.refresh(&client).await?;
                    match panel.start(&client, &cluster_id).await {
                        Ok(()) => println!("Cluster {cluster_id} start requested (PENDING)."),
                        Err(err) => println!(
                            "Start request for {cluster_id} failed: {err:#}. \
                             Check `anc clusters list` for the actual state."
                        ),
                    }
                }
                ClusterAction::Stop { cluster_id } => {
                    panel.refresh(&client).await?;
                    match panel.stop(&client, &cluster_id).await {
                        Ok(()) => println!("Cluster {cluster_id} stop requested (TERMINATING)."),
                        Err(err) => println!(
                            "Stop request for {cluster_id} failed: {err:#}. \
                             Check `anc clusters list` for the actual state."
                        ),
                    }
                }
                ClusterAction::RestartContext { cluster_id } => {
                    client.restart_context(&cluster_id).await?;
                    println!("Execution context for {cluster_id} destroyed.");
                }
            }
        }

        // handled before config load
        Commands::Stub { .. } | Commands::Completions { .. } => unreachable!(),
    }

    Ok(())
}

async fn open_store(cfg: &Config) -> Result<AppStore> {
    let snapshots = SqliteSnapshotStore::open(&cfg.storage).await?;
    Ok(AppStore::open(Box::new(snapshots), cfg.storage.namespace.clone()).await)
}

/// Resolve a full or prefix query id.
fn resolve_query_id(state: &AppState, arg: &str) -> Option<String> {
    state
        .queries
        .iter()
        .find(|q| q.id == arg || q.id.starts_with(arg))
        .map(|q| q.id.clone())
}

/// Resolve a full or prefix data source id.
fn resolve_source_id(state: &AppState, arg: &str) -> Option<String> {
    state
        .data_sources
        .iter()
        .find(|s| s.id == arg || s.id.starts_with(arg))
        .map(|s| s.id.clone())
}

/// Pick the only running cluster, or explain what to pass.
async fn pick_running_cluster(client: &ClusterClient) -> Result<String> {
    let clusters = client.list_clusters().await?;
    let running: Vec<_> = clusters.iter().filter(|c| c.is_running()).collect();
    match running.as_slice() {
        [one] => Ok(one.cluster_id.clone()),
        [] => bail!("No running cluster. Start one with `anc clusters start <id>`."),
        many => {
            let names: Vec<_> = many.iter().map(|c| c.cluster_id.as_str()).collect();
            bail!(
                "Multiple running clusters ({}); pass --cluster <id>.",
                names.join(", ")
            )
        }
    }
}

/// Interactive chat loop over stdin.
async fn run_chat(
    store: &mut AppStore,
    panel: &mut ChatPanel,
    agent: Option<&str>,
) -> Result<()> {
    println!("Interactive assistant. ':sandbox' sends the last code block to the sandbox, ':quit' exits.");

    let mut last_code: Option<(String, String)> = None;
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if std::io::stdin().lock().read_line(&mut line)? == 0 {
            break; // EOF
        }
        let line = line.trim();

        match line {
            "" => continue,
            ":quit" | ":q" => break,
            ":sandbox" => match &last_code {
                Some((prompt, code)) => {
                    let query = panel.send_to_sandbox(store, prompt, code).await;
                    println!("Created query #{} — run it with `anc run`.", query.number);
                }
                None => println!("No code block received yet."),
            },
            _ => {
                println!("assistant is typing...");
                let outcome = panel.send(store, line, agent).await?;
                status::print_message(&outcome.message);
                if let Some(code) = &outcome.message.code {
                    last_code = Some((line.to_string(), code.clone()));
                }
            }
        }
    }
    Ok(())
}
