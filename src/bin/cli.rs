use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use intent_relay::error::AppError;
use intent_relay::events::TracingEmitter;
use intent_relay::execution;
use intent_relay::instruction::InstructionList;
use intent_relay::logging;
use intent_relay::paths;
use intent_relay::pipeline::{process_intent, RunReport};
use intent_relay::registry::catalog::{self, ActionCategory};
use intent_relay::registry::handlers::project::ProcessLauncher;
use intent_relay::registry::handlers::space::MemorySpaceStore;
use intent_relay::registry::{ExecutorRegistry, LocalExecutor, RemoteExecutor};
use intent_relay::resolution::{AssetSearchResolver, Resolver, StaticResolver};
use intent_relay::settings::{self, AppSettings, LlmConfigInfo};
use intent_relay::state::{ClientContext, ServerContext};
use intent_relay::translation::rules::RuleTranslator;
use intent_relay::translation::{Cascade, Translator};
use intent_relay::transport::link::Connector;
use intent_relay::transport::tcp::{TcpAcceptor, TcpConnector};
use intent_relay::transport::{
    memory, spawn_pump, ClientTransport, ServerTransport, TransportConfig,
};
use intent_relay::util::CancelToken;

// ── CLI argument parsing ─────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "intent-relay",
    about = "Turns plain-language requests into editor instructions",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config directory override
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Peer host override
    #[arg(long, global = true)]
    host: Option<String>,

    /// Peer port override
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Output raw JSON instead of formatted text
    #[arg(long, global = true)]
    json: bool,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Translate and run each request against the editor peer
    Ask {
        #[arg(required = true)]
        requests: Vec<String>,
    },
    /// Read requests from stdin, one per line, until EOF
    Chat,
    /// Translate a request and print the instruction list
    Translate {
        #[arg(required = true)]
        words: Vec<String>,
    },
    /// Run the editor-peer role until Ctrl-C
    Serve,
    /// Run both roles in this process over an in-memory link
    Demo {
        #[arg(required = true)]
        requests: Vec<String>,
    },
    /// Inspect or change settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// List the actions a translator may produce
    Actions,
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print the current settings
    Show,
    /// Set one value by dotted key, e.g. `link.port 7779`
    Set { key: String, value: String },
}

// ── Client session ───────────────────────────────────────────────

/// A client context with its pump running. `close` disconnects and stops it.
struct Session {
    ctx: ClientContext,
    executors: ExecutorRegistry<ClientContext>,
    pump: tokio::task::JoinHandle<()>,
}

impl Session {
    fn start(
        config_dir: &Path,
        settings: AppSettings,
        connector: Arc<dyn Connector>,
        resolver: Arc<dyn Resolver>,
    ) -> Result<Self, AppError> {
        let tick = Duration::from_millis(settings.link.tick_ms);
        let transport = Arc::new(ClientTransport::new(
            connector,
            Arc::new(TracingEmitter),
            TransportConfig::from_settings(&settings.link),
        ));
        let ctx = ClientContext::new(
            config_dir.to_path_buf(),
            settings,
            transport,
            Arc::new(ProcessLauncher),
            resolver,
        );
        let pump = spawn_pump(Arc::clone(&ctx.transport), tick, ctx.cancel.clone());
        Ok(Self {
            ctx,
            executors: LocalExecutor::registry()?,
            pump,
        })
    }

    async fn handle(&self, cascade: &Cascade, request: &str, raw_json: bool) -> bool {
        match process_intent(&self.ctx, cascade, &self.executors, request).await {
            Ok(report) => {
                print_report(&report, raw_json);
                report.succeeded
            }
            Err(e) => {
                eprintln!("Error: {e}");
                false
            }
        }
    }

    async fn close(self) {
        self.ctx.transport.disconnect();
        self.ctx.cancel.cancel();
        let _ = self.pump.await;
    }
}

fn tcp_session(config_dir: &Path, settings: AppSettings) -> Result<Session, AppError> {
    let connector = Arc::new(TcpConnector::new(settings.link.address()));
    let resolver = Arc::new(AssetSearchResolver::new(
        &settings.asset_search_url,
        Duration::from_millis(settings.asset_search_timeout_ms),
    ));
    Session::start(config_dir, settings, connector, resolver)
}

// ── Output formatting ────────────────────────────────────────────

fn print_report(report: &RunReport, raw_json: bool) {
    if raw_json {
        println!("{}", serde_json::to_string_pretty(report).unwrap_or_default());
        return;
    }
    for line in &report.transcript {
        println!("{line}");
    }
    if !report.succeeded {
        eprintln!("(request did not complete)");
    }
}

fn print_actions(raw_json: bool) {
    if raw_json {
        let schema = catalog::to_json_schema();
        println!("{}", serde_json::to_string_pretty(&schema).unwrap_or_default());
        return;
    }
    let entries = catalog::action_catalog();
    for category in ActionCategory::all() {
        println!("{}:", category.title());
        for entry in entries.iter().filter(|e| e.category == *category) {
            println!("  {:<22} {:?}  {}", entry.name, entry.state, entry.params);
        }
    }
}

// ── Commands ─────────────────────────────────────────────────────

async fn ask(
    config_dir: &Path,
    settings: AppSettings,
    requests: &[String],
    raw_json: bool,
) -> Result<bool, AppError> {
    let cascade = Cascade::from_settings(config_dir, &settings)?;
    let session = tcp_session(config_dir, settings)?;
    let mut all_ok = true;
    for request in requests {
        all_ok &= session.handle(&cascade, request, raw_json).await;
    }
    session.close().await;
    Ok(all_ok)
}

async fn chat(config_dir: &Path, settings: AppSettings, raw_json: bool) -> Result<bool, AppError> {
    let cascade = Cascade::from_settings(config_dir, &settings)?;
    let session = tcp_session(config_dir, settings)?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let request = line.trim();
        if request.is_empty() {
            continue;
        }
        session.handle(&cascade, request, raw_json).await;
    }
    session.close().await;
    Ok(true)
}

async fn translate(
    config_dir: &Path,
    settings: &AppSettings,
    words: &[String],
) -> Result<bool, AppError> {
    let cascade = Cascade::from_settings(config_dir, settings)?;
    let instructions = cascade.translate(&words.join(" ")).await?;
    let list = InstructionList::new(instructions);
    println!("{}", serde_json::to_string_pretty(&list)?);
    Ok(true)
}

async fn serve(settings: &AppSettings) -> Result<bool, AppError> {
    let acceptor = TcpAcceptor::bind(&settings.link.address()).await?;
    tracing::info!(address = %acceptor.local_addr()?, "waiting for the assistant");
    let transport = Arc::new(ServerTransport::new(
        Arc::new(TracingEmitter),
        &TransportConfig::from_settings(&settings.link),
    ));
    transport.start(Box::new(acceptor));
    let ctx = Arc::new(ServerContext::new(transport, Arc::new(MemorySpaceStore::new())));

    let cancel = CancelToken::new();
    let server = tokio::spawn(execution::run_server(
        ctx,
        RemoteExecutor::registry()?,
        Duration::from_millis(settings.link.tick_ms),
        cancel.clone(),
    ));
    tokio::signal::ctrl_c().await?;
    cancel.cancel();
    server.await.map_err(|e| AppError::Execution {
        message: format!("Server loop failed: {e}"),
    })?;
    Ok(true)
}

/// Rule translation only, and a resolver that hands every description the
/// same placeholder asset, so the demo needs no network.
async fn demo(
    config_dir: &Path,
    settings: AppSettings,
    requests: &[String],
    raw_json: bool,
) -> Result<bool, AppError> {
    let tick = Duration::from_millis(settings.link.tick_ms);
    let (connector, acceptor) = memory::listener();

    let server_transport = Arc::new(ServerTransport::new(
        Arc::new(TracingEmitter),
        &TransportConfig::from_settings(&settings.link),
    ));
    server_transport.start(Box::new(acceptor));
    let store = Arc::new(MemorySpaceStore::new());
    let server_ctx = Arc::new(ServerContext::new(server_transport, store.clone()));
    let cancel = CancelToken::new();
    let server = tokio::spawn(execution::run_server(
        server_ctx,
        RemoteExecutor::registry()?,
        tick,
        cancel.clone(),
    ));

    let rules: Arc<dyn Translator> = Arc::new(RuleTranslator::new()?);
    let cascade = Cascade::new(vec![rules]);
    let resolver = Arc::new(StaticResolver::new().with_fallback(&["Primitives/Cube.prefab"]));
    let session = Session::start(config_dir, settings, Arc::new(connector), resolver)?;

    let mut all_ok = true;
    for request in requests {
        all_ok &= session.handle(&cascade, request, raw_json).await;
    }
    session.close().await;
    cancel.cancel();
    let _ = server.await;

    if !raw_json {
        eprintln!("Spaces: {}", store.names().join(", "));
    }
    Ok(all_ok)
}

fn settings_command(
    config_dir: &Path,
    mut settings: AppSettings,
    action: &SettingsAction,
    raw_json: bool,
) -> Result<bool, AppError> {
    match action {
        SettingsAction::Show => {
            let view = serde_json::json!({
                "configDir": config_dir.display().to_string(),
                "settings": settings,
                "llm": LlmConfigInfo::from_config(&settings.llm),
            });
            if raw_json {
                println!("{view}");
            } else {
                println!("{}", serde_json::to_string_pretty(&view)?);
            }
        }
        SettingsAction::Set { key, value } => {
            if key == "llm.api_key" {
                settings::save_api_key(config_dir, value)?;
            } else {
                settings.set_field(key, value)?;
                settings::save_settings(config_dir, &settings)?;
            }
            println!("Updated {key}.");
        }
    }
    Ok(true)
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config_dir = cli.config_dir.clone().unwrap_or_else(paths::default_config_dir);
    let stored = settings::load_or_default(&config_dir);
    let mut effective = stored.clone();
    if let Some(host) = &cli.host {
        effective.link.host.clone_from(host);
    }
    if let Some(port) = cli.port {
        effective.link.port = port;
    }

    let raw = cli.json;
    let result = match &cli.command {
        Commands::Ask { requests } => ask(&config_dir, effective, requests, raw).await,
        Commands::Chat => chat(&config_dir, effective, raw).await,
        Commands::Translate { words } => translate(&config_dir, &effective, words).await,
        Commands::Serve => serve(&effective).await,
        Commands::Demo { requests } => demo(&config_dir, effective, requests, raw).await,
        // Host and port overrides are per-run and never persisted.
        Commands::Settings { action } => settings_command(&config_dir, stored, action, raw),
        Commands::Actions => {
            print_actions(raw);
            Ok(true)
        }
    };

    match result {
        Ok(true) => {}
        Ok(false) => process::exit(2),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
