use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use clap::{Parser, Subcommand};
use relayadmin_client::{
    AdminClient, AdminClientBuilder, JsonFileStore, LoginHint, Session, TokenStore, bootstrap,
    config::{
        DEFAULT_SERVER_URL, DEFAULT_USERNAME, SavedAdminConfig, config_dir, config_path_in,
        load_saved_config_from, save_saved_config_to, session_path_in,
    },
    render::{render_active_connections, render_history_page},
};
use relayadmin_core::{LoginRequest, SortType, StatisticQuery};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt::MakeWriter};

#[derive(Parser, Debug)]
#[command(name = "relayadmin", version, about = "Inspect and manage relay connections")]
struct AdminArgs {
    /// Relay admin server, e.g. http://127.0.0.1:16780. Defaults to the saved one.
    #[arg(long, global = true, env = "RELAYADMIN_SERVER_URL")]
    server_url: Option<String>,

    #[arg(long, global = true, env = "RELAYADMIN_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Append logs to this file instead of stderr.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Print raw JSON instead of tables.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in and remember the token for later commands.
    Login {
        #[arg(long)]
        username: Option<String>,
        #[arg(long, env = "RELAYADMIN_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the stored token.
    Logout,
    /// List active connections.
    Status,
    /// Page through per-connection relay history.
    History {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 20)]
        page_size: u32,
        /// totalRelayCount, totalRelayMs, totalRelayBytes, ...
        #[arg(long)]
        sort_by: Option<String>,
        #[arg(long)]
        sort_type: Option<SortType>,
    },
    /// Close an active connection.
    Close { id: String },
    /// Give a connection a custom name.
    Rename { id: String, name: String },
}

#[derive(Clone)]
struct FileMakeWriter {
    file: Arc<Mutex<File>>,
}

struct FileWriterGuard {
    file: Arc<Mutex<File>>,
}

impl Write for FileWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut locked = self
            .file
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))?;
        locked.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut locked = self
            .file
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))?;
        locked.flush()
    }
}

impl<'a> MakeWriter<'a> for FileMakeWriter {
    type Writer = FileWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        FileWriterGuard {
            file: Arc::clone(&self.file),
        }
    }
}

fn init_logging(log_file: Option<&Path>) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let Some(log_path) = log_file else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(io::stderr)
            .init();
        return;
    };

    let file = match OpenOptions::new().create(true).append(true).open(log_path) {
        Ok(file) => file,
        Err(err) => {
            eprintln!("failed to open log file {}: {err}", log_path.display());
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(io::stderr)
                .init();
            return;
        }
    };

    let make_writer = FileMakeWriter {
        file: Arc::new(Mutex::new(file)),
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_ansi(false)
        .with_writer(make_writer)
        .init();
}

#[tokio::main]
async fn main() {
    let args = AdminArgs::parse();
    init_logging(args.log_file.as_deref());

    if let Err(err) = run(args).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run(args: AdminArgs) -> Result<(), String> {
    let dir = config_dir(args.config_dir.as_deref());
    let config_path = config_path_in(&dir);
    let saved = match load_saved_config_from(&config_path) {
        Ok(saved) => saved,
        Err(err) => {
            warn!("saved config invalid, using defaults: {err}");
            None
        }
    };

    let server_url = args
        .server_url
        .clone()
        .or_else(|| saved.as_ref().map(|cfg| cfg.server_url.clone()))
        .unwrap_or_else(|| DEFAULT_SERVER_URL.to_owned());
    info!(server_url = %server_url, config_dir = %dir.display(), "starting");

    let mut builder = AdminClientBuilder::new(&server_url).require_token(true);
    if let Some(secs) = args.timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }

    let store = Arc::new(TokenStore::new(JsonFileStore::new(session_path_in(&dir))));
    let hint = Arc::new(LoginHint::default());
    let client = bootstrap(builder, store, hint.clone()).map_err(|err| err.to_string())?;

    let after_login = matches!(args.command, Command::Login { .. });

    let result = run_command(
        &client,
        args.command,
        args.json,
        &config_path,
        &server_url,
        saved.as_ref(),
    )
    .await;

    if let Some(message) = hint.message(after_login) {
        eprintln!("{message}");
    }
    result
}

async fn run_command(
    client: &AdminClient<Session>,
    command: Command,
    json: bool,
    config_path: &Path,
    server_url: &str,
    saved: Option<&SavedAdminConfig>,
) -> Result<(), String> {
    match command {
        Command::Login { username, password } => {
            let username = username
                .or_else(|| saved.map(|cfg| cfg.username.clone()))
                .unwrap_or_else(|| DEFAULT_USERNAME.to_owned());
            login(client, config_path, server_url, username, &password).await
        }
        Command::Logout => {
            client.set_auth_token(None);
            println!("logged out");
            Ok(())
        }
        Command::Status => {
            let connections = client
                .get_connection_status()
                .await
                .map_err(|err| err.to_string())?;
            print_output(json, &connections, || {
                render_active_connections(&connections)
            })
        }
        Command::History {
            page,
            page_size,
            sort_by,
            sort_type,
        } => {
            let query = StatisticQuery::new(page, page_size)
                .sorted(sort_by.unwrap_or_default(), sort_type);
            let history = client
                .get_connection_statistic(&query)
                .await
                .map_err(|err| err.to_string())?;
            print_output(json, &history, || render_history_page(&history))
        }
        Command::Close { id } => {
            client
                .close_connection(&id)
                .await
                .map_err(|err| err.to_string())?;
            println!("closed {id}");
            Ok(())
        }
        Command::Rename { id, name } => {
            client
                .update_connection_name(&id, &name)
                .await
                .map_err(|err| err.to_string())?;
            println!("renamed {id} to {name:?}");
            Ok(())
        }
    }
}

async fn login(
    client: &AdminClient<Session>,
    config_path: &Path,
    server_url: &str,
    username: String,
    password: &str,
) -> Result<(), String> {
    let request = LoginRequest::with_hashed_password(username, password);
    let response = client.login(&request).await.map_err(|err| err.to_string())?;
    if response.token.as_deref().filter(|t| !t.is_empty()).is_none() {
        return Err("server accepted the login but returned no token".to_owned());
    }

    let cfg = SavedAdminConfig {
        server_url: server_url.to_owned(),
        username: request.username,
    };
    if let Err(err) = save_saved_config_to(config_path, &cfg) {
        warn!("failed to save config: {err}");
    }
    println!("logged in as {}", cfg.username);
    Ok(())
}

fn print_output<T: Serialize>(
    json: bool,
    value: &T,
    render: impl FnOnce() -> String,
) -> Result<(), String> {
    if json {
        let payload = serde_json::to_string_pretty(value).map_err(|err| err.to_string())?;
        println!("{payload}");
    } else {
        print!("{}", render());
    }
    Ok(())
}
