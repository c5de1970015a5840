//! fold-coord MCP server
//!
//! Lets several coding agents working in the same fold avoid duplicating and
//! colliding with each other's work, through task dedup and soft claims.

use anyhow::{Result, anyhow};
use clap::Parser;
use fold_coord::cli::{Cli, Command};
use fold_coord::config::{Config, ConfigLoader};
use fold_coord::coord::{AvailableFilter, Coordinator, TaskFilter};
use fold_coord::db::{Database, now_ms};
use fold_coord::error::ToolError;
use fold_coord::format::{format_available, format_claims, format_tasks};
use fold_coord::logging::{LogLevelFilter, Logger};
use fold_coord::tools::{ToolContext, ToolHandler};
use fold_coord::types::{AgentContext, Priority};
use rmcp::{
    ErrorData, RoleServer, ServerHandler, ServiceExt,
    model::{
        CallToolRequestParams, CallToolResult, Content, InitializeResult, ListToolsResult,
        PaginatedRequestParams, ServerCapabilities,
    },
    service::RequestContext,
    transport::io::stdio,
};
use serde_json::{Value, json};
use std::fs::OpenOptions;
use std::sync::Arc;
use tracing::{Level, debug, info, warn};
use tracing_subscriber::FmtSubscriber;

struct FoldCoordServer {
    tool_handler: Arc<ToolHandler>,
    /// Client-adjustable via logging/setLevel.
    level_filter: Arc<LogLevelFilter>,
}

const INSTRUCTIONS: &str = "\
Coordinates agents sharing this fold. Before starting work: list_available() \u{2192} pick_task(task_id) \u{2192} \
update_task(status=\"in_progress\") \u{2192} work \u{2192} update_task(status=\"done\"). \
Use create_task for new work (duplicates are rejected), claim/unclaim for work outside tasks, \
and end_session when you stop.";

impl ServerHandler for FoldCoordServer {
    fn get_info(&self) -> InitializeResult {
        InitializeResult {
            protocol_version: Default::default(),
            server_info: rmcp::model::Implementation {
                name: "fold-coord".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            capabilities: ServerCapabilities {
                tools: Some(rmcp::model::ToolsCapability::default()),
                logging: Some(Default::default()),
                ..Default::default()
            },
            instructions: Some(INSTRUCTIONS.to_string()),
        }
    }

    async fn set_level(
        &self,
        request: rmcp::model::SetLevelRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<(), ErrorData> {
        self.level_filter.set(request.level);
        info!(level = ?request.level, "Logging level updated via MCP");
        Ok(())
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult {
            tools: self.tool_handler.get_tools(),
            next_cursor: None,
            meta: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> std::result::Result<CallToolResult, ErrorData> {
        let tool_name = request.name.clone();
        let start = std::time::Instant::now();

        let logger = Logger::new()
            .with_peer(context.peer.clone())
            .with_level_filter(Arc::clone(&self.level_filter))
            .with_name(format!("tool:{}", tool_name));
        let tool_ctx = ToolContext::new(logger);

        let args = Value::Object(request.arguments.unwrap_or_default());
        match self.tool_handler.call_tool(&tool_name, args, &tool_ctx).await {
            Ok(output) => {
                debug!(
                    tool = %tool_name,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Tool call succeeded"
                );
                Ok(CallToolResult {
                    content: vec![Content::text(output.text)],
                    is_error: None,
                    meta: None,
                    structured_content: Some(output.structured),
                })
            }
            Err(e) => {
                let tool_err = ToolError::from(e);
                warn!(
                    tool = %tool_name,
                    error_code = ?tool_err.code,
                    error_message = %tool_err.message,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Tool call failed"
                );
                let error_json = serde_json::to_string(&tool_err)
                    .unwrap_or_else(|_| json!({ "error": tool_err.to_string() }).to_string());
                Ok(CallToolResult {
                    content: vec![Content::text(error_json)],
                    is_error: Some(true),
                    meta: None,
                    structured_content: None,
                })
            }
        }
    }
}

fn init_logging(cli: &Cli) -> Result<()> {
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    match cli.log.as_str() {
        "0" | "off" => {}
        "1" | "stdout" => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_writer(std::io::stdout)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        "2" | "stderr" => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        filename => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(filename)?;
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_writer(file)
                .with_ansi(false)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }
    Ok(())
}

/// Resolve who this process is: CLI flags, then config, then the OS user.
fn resolve_identity(cli: &Cli, config: &Config) -> AgentContext {
    use petname::{Generator, Petnames};

    let fold = cli
        .fold
        .clone()
        .unwrap_or_else(|| config.identity.fold.clone());
    let user = cli
        .user
        .clone()
        .or_else(|| config.identity.user.clone())
        .or_else(|| std::env::var("USER").ok())
        .or_else(|| std::env::var("USERNAME").ok())
        .unwrap_or_else(|| "agent".to_string());
    let agent = cli.agent.clone().unwrap_or_else(|| {
        let name = Petnames::medium()
            .generate_one(2, "-")
            .unwrap_or_else(|| format!("agent-{}", now_ms()));
        format!("{}/{}", user, name)
    });
    let session = cli
        .session
        .clone()
        .unwrap_or_else(|| uuid::Uuid::now_v7().to_string());

    AgentContext::new(fold, agent, user, session)
}

fn open_coordinator(config: &Config) -> Result<Coordinator> {
    config.ensure_db_dir()?;
    let db = Database::open(&config.server.db_path)?;
    info!("Database: {:?}", config.server.db_path);
    Ok(Coordinator::new(Arc::new(db), config.coordination.clone()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    // SAFETY: single-threaded at this point; no other thread reads the environment yet
    if let Some(config_path) = &cli.config {
        unsafe {
            std::env::set_var(fold_coord::config::ENV_CONFIG_PATH, config_path);
        }
    }
    let mut loader = ConfigLoader::load()?;
    for (tier, path) in loader.sources() {
        debug!(?tier, path = %path.display(), "Config layer loaded");
    }
    if let Some(db_path) = &cli.database {
        loader.config_mut().server.db_path = db_path.into();
    }
    let config = loader.into_config();
    config.validate()?;

    let identity = resolve_identity(&cli, &config);
    let coordinator = open_coordinator(&config)?;

    match cli.command {
        Some(Command::Claims) => {
            let claims = coordinator.active_claims(&identity, None)?;
            println!("{}", format_claims(&claims, now_ms()));
        }
        Some(Command::Tasks { all }) => {
            let filter = TaskFilter {
                include_done: all,
                ..Default::default()
            };
            let tasks = coordinator.list_tasks(&identity, &filter)?;
            println!("{}", format_tasks(&tasks));
        }
        Some(Command::Available {
            priority,
            milestone,
        }) => {
            let priority = priority
                .map(|p| p.parse::<Priority>())
                .transpose()
                .map_err(|e| anyhow!(e))?;
            let filter = AvailableFilter {
                priority,
                milestone,
            };
            let availability = coordinator.list_available(&identity, &filter)?;
            println!("{}", format_available(&availability));
        }
        Some(Command::Serve) | None => run_server(coordinator, identity).await?,
    }

    Ok(())
}

async fn run_server(coordinator: Coordinator, identity: AgentContext) -> Result<()> {
    info!(
        "Starting fold-coord MCP server v{}",
        env!("CARGO_PKG_VERSION")
    );
    info!(
        fold = %identity.fold_id,
        agent = %identity.agent,
        session = %identity.session_id,
        "Identity resolved"
    );

    let server = FoldCoordServer {
        tool_handler: Arc::new(ToolHandler::new(coordinator, identity)),
        level_filter: Arc::new(LogLevelFilter::default()),
    };

    info!("Server ready, listening on stdio");
    let service = server.serve(stdio()).await?;
    service.waiting().await?;

    Ok(())
}
