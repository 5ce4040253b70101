use std::path::PathBuf;
use std::sync::Arc;

use adminboard::config::ConsoleConfig;
use adminboard::error::{ConsoleError, ErrorCode};
use adminboard::guard::{NavigationGuard, NavigationOutcome, Navigator, TracingProgress};
use adminboard::labels::{MENU_STATUS, enum_to_label};
use adminboard::net::types::{CompareOp, Credentials, MenuNode, MenuPatch, NewMenu, QueryRequest};
use adminboard::net::{HttpAuthService, HttpClient, MenuApi, ParameterApi};
use adminboard::notify::RecordingNotifier;
use adminboard::router::RouterHandle;
use adminboard::routes::RouteTables;
use adminboard::session::SessionStore;
use adminboard::token::FileTokenStore;
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{0}")]
    Console(#[from] ConsoleError),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("menu {0} not found")]
    MenuNotFound(i64),
    #[error("nothing to update; pass at least one field")]
    EmptyPatch,
}

#[derive(Parser, Debug)]
#[command(name = "adminboard", about = "Admin console client: sign in, browse role-gated routes, manage menus and parameters")]
struct Cli {
    #[arg(long, env = "ADMINBOARD_BASE_URL")]
    base_url: Option<String>,

    #[arg(long, env = "ADMINBOARD_TOKEN_FILE")]
    token_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and land on the return target.
    Login {
        #[arg(long)]
        username: String,
        #[arg(long, env = "ADMINBOARD_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long, default_value = "/")]
        redirect: String,
    },
    Logout,
    /// Show the signed-in identity and roles.
    Whoami,
    /// Print the accessible route menu as JSON.
    Routes,
    /// Navigate to a location through the route guard.
    Navigate { location: String },
    Menu(MenuCommand),
    Parameter(ParameterCommand),
}

#[derive(Args, Debug)]
struct MenuCommand {
    #[command(subcommand)]
    command: MenuSubcommand,
}

#[derive(Subcommand, Debug)]
enum MenuSubcommand {
    Create {
        #[arg(long, default_value_t = 0)]
        parent_id: i64,
        #[arg(long)]
        path: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "Layout")]
        component: String,
        #[arg(long)]
        redirect: Option<String>,
        #[arg(long, default_value_t = 0)]
        sort: i32,
        #[arg(long, default_value_t = 1)]
        status: i8,
        #[arg(long)]
        remark: Option<String>,
    },
    Delete {
        id: i64,
    },
    Update {
        id: i64,
        #[arg(long)]
        parent_id: Option<i64>,
        #[arg(long)]
        path: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        component: Option<String>,
        #[arg(long)]
        redirect: Option<String>,
        #[arg(long)]
        sort: Option<i32>,
        #[arg(long)]
        status: Option<i8>,
        #[arg(long)]
        remark: Option<String>,
    },
    Query {
        #[arg(long, help = "Only menus whose name contains this text")]
        name: Option<String>,
    },
    Info {
        id: i64,
    },
}

#[derive(Args, Debug)]
struct ParameterCommand {
    #[command(subcommand)]
    command: ParameterSubcommand,
}

#[derive(Subcommand, Debug)]
enum ParameterSubcommand {
    Create {
        #[arg(long)]
        data: String,
    },
    Delete {
        id: i64,
    },
    Update {
        #[arg(long)]
        data: String,
    },
    Query {
        #[arg(long, default_value_t = 1)]
        page: u64,
        #[arg(long, default_value_t = 20)]
        size: u64,
    },
    Info {
        id: i64,
    },
}

/// Everything a command needs, wired the way the browser shell wires it.
struct Console {
    http: HttpClient,
    session: Arc<SessionStore>,
    navigator: Navigator,
    notifier: Arc<RecordingNotifier>,
}

impl Console {
    fn new(config: &ConsoleConfig) -> Result<Self, ConsoleError> {
        let tokens = Arc::new(FileTokenStore::new(&config.token_file, &config.token_key));
        let notifier = Arc::new(RecordingNotifier::new());
        let http = HttpClient::new(config, tokens.clone(), notifier.clone())?;

        let tables = RouteTables::default();
        let router = RouterHandle::new(tables.public.clone());
        let auth = Arc::new(HttpAuthService::new(http.clone()));
        let session = Arc::new(SessionStore::new(auth, tokens.clone(), Arc::new(router.clone()), tables));
        let guard = NavigationGuard::new(
            session.clone(),
            tokens,
            router.clone(),
            notifier.clone(),
            Arc::new(TracingProgress),
        );
        let navigator = Navigator::new(guard, router, config.default_title.clone());
        Ok(Self { http, session, navigator, notifier })
    }

    fn flush_notifications(&self) {
        for notification in self.notifier.drain() {
            eprintln!("[{:?}] {}", notification.kind, notification.message);
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = ConsoleConfig::from_env()?;
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url.trim_end_matches('/').to_owned();
    }
    if let Some(token_file) = cli.token_file {
        config.token_file = token_file;
    }

    let console = Console::new(&config)?;
    let result = run(&console, cli.command).await;
    console.flush_notifications();
    if let Err(CliError::Console(e)) = &result {
        tracing::debug!(code = e.error_code(), retryable = e.retryable(), "command failed");
    }
    result
}

async fn run(console: &Console, command: Command) -> Result<(), CliError> {
    match command {
        Command::Login { username, password, redirect } => {
            console.session.login(&Credentials { username, password }).await?;
            let outcome = console.navigator.navigate(&redirect).await?;
            print_outcome(&outcome);
            Ok(())
        }
        Command::Logout => {
            if let Err(e) = console.session.logout().await {
                eprintln!("server-side logout failed ({e}); local session cleared");
            }
            println!("signed out");
            Ok(())
        }
        Command::Whoami => {
            let outcome = console.navigator.navigate("/").await?;
            let session = console.session.snapshot().await;
            if session.roles.is_empty() {
                println!("not signed in (landed on {})", outcome.full_path);
                return Ok(());
            }
            print_json(&serde_json::json!({
                "name": session.name,
                "avatar": session.avatar,
                "introduction": session.introduction,
                "roles": session.roles,
            }))
        }
        Command::Routes => {
            console.navigator.navigate("/").await?;
            let session = console.session.snapshot().await;
            print_json(&serde_json::to_value(&session.routes)?)
        }
        Command::Navigate { location } => {
            let outcome = console.navigator.navigate(&location).await?;
            print_outcome(&outcome);
            Ok(())
        }
        Command::Menu(menu) => run_menu(console, menu).await,
        Command::Parameter(parameter) => run_parameter(console, parameter).await,
    }
}

async fn run_menu(console: &Console, menu: MenuCommand) -> Result<(), CliError> {
    let api = MenuApi::new(console.http.clone());
    match menu.command {
        MenuSubcommand::Create { parent_id, path, name, component, redirect, sort, status, remark } => {
            let id = api
                .create(&NewMenu { parent_id, path, name, component, redirect, sort, status, remark })
                .await?;
            println!("created menu {id}");
            Ok(())
        }
        MenuSubcommand::Delete { id } => {
            let affected = api.delete(id).await?;
            println!("deleted {affected} menu(s)");
            Ok(())
        }
        MenuSubcommand::Update { id, parent_id, path, name, component, redirect, sort, status, remark } => {
            let patch = MenuPatch { id, parent_id, path, name, component, redirect, sort, status, remark };
            if patch == (MenuPatch { id, ..MenuPatch::default() }) {
                return Err(CliError::EmptyPatch);
            }
            let updated = api.update(&patch).await?;
            print_json(&serde_json::to_value(updated)?)
        }
        MenuSubcommand::Query { name } => {
            let mut query = QueryRequest::default();
            if let Some(name) = name {
                query = query.filter("name", CompareOp::Like, vec![name]);
            }
            let tree = api.query(&query).await?;
            for node in &tree {
                print_menu_node(node, 0);
            }
            Ok(())
        }
        MenuSubcommand::Info { id } => {
            let menu = api.info(id).await?.ok_or(CliError::MenuNotFound(id))?;
            print_json(&serde_json::to_value(menu)?)
        }
    }
}

async fn run_parameter(console: &Console, parameter: ParameterCommand) -> Result<(), CliError> {
    let api = ParameterApi::new(console.http.clone());
    let json = match parameter.command {
        ParameterSubcommand::Create { data } => api.create(&serde_json::from_str::<Value>(&data)?).await?,
        ParameterSubcommand::Delete { id } => api.delete(id).await?,
        ParameterSubcommand::Update { data } => api.update(&serde_json::from_str::<Value>(&data)?).await?,
        ParameterSubcommand::Query { page, size } => api.query(&QueryRequest::default().page(page, size)).await?,
        ParameterSubcommand::Info { id } => api.info(id).await?,
    };
    print_json(&json)
}

fn print_outcome(outcome: &NavigationOutcome) {
    for hop in &outcome.hops {
        println!("-> {hop}");
    }
    println!("{} [{}]", outcome.full_path, outcome.title);
}

fn print_menu_node(node: &MenuNode, depth: usize) {
    println!(
        "{}- [{}] {} {} ({})",
        "  ".repeat(depth),
        node.id,
        node.label,
        node.menu.path,
        enum_to_label(MENU_STATUS, &node.menu.status)
    );
    for child in &node.children {
        print_menu_node(child, depth + 1);
    }
}

fn print_json(value: &Value) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
