//! keyscope CLI
//!
//! Entry point for the keyscope console. Provides:
//! - Default: interactive console (search, paging, key edits, plugins)
//! - Subcommands for one-shot key operations and configuration

mod console;
mod render;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use keyscope_client::ApiClient;
use keyscope_core::config::{Config, Directories};
use keyscope_core::{
    BrowserUpdate, CountPoller, CountReading, EventBus, FileStorage, KeyBrowser, KeyOperations,
    SearchHistory, SessionStorage, Subscription, Toast, ToastLevel, events,
};
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Source name for events the CLI itself emits
const CLI_SOURCE: &str = "cli";

/// keyscope console CLI
#[derive(Parser)]
#[command(name = "keyscope")]
#[command(about = "keyscope - browse and edit keys through a key-value admin backend")]
#[command(version)]
#[command(after_help = "\
Examples:
  keyscope                          Start the interactive console
  keyscope --env prod               Start the console on the prod environment
  keyscope keys 'user:*'            List keys matching a pattern
  keyscope keys --all               List every key, following all pages
  keyscope get session:42           Show a key's type, TTL and value
  keyscope ttl session:42 3600      Expire a key in one hour
  keyscope ttl session:42 -1        Remove a key's expiry
  keyscope copy user:1 staging      Copy a key to another environment
  keyscope zadd board 1.5:alice 3:bob
  keyscope watch-count --interval 5 Print the key count every 5 seconds
  keyscope config init              Write a default config file
")]
struct Cli {
    /// Backend base URL (overrides connection.baseUrl)
    #[arg(long, global = true)]
    url: Option<String>,

    /// Environment to operate on (defaults to defaultEnvironment)
    #[arg(long, short, global = true)]
    env: Option<String>,

    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the interactive console (default)
    Browse,

    /// List keys matching a pattern
    Keys {
        /// Glob pattern; blank lists everything, no wildcard looks up one key
        #[arg(default_value = "")]
        pattern: String,

        /// Keep loading pages until the scan is exhausted
        #[arg(long)]
        all: bool,

        /// Keys requested per page (overrides search.pageSize)
        #[arg(long)]
        page_size: Option<usize>,
    },

    /// Show a key's type, TTL and value
    Get { key: String },

    /// Print the number of keys in the environment
    Count,

    /// Delete a key
    Delete { key: String },

    /// Set a key's TTL in seconds (-1 removes the expiry)
    Ttl {
        key: String,
        #[arg(allow_hyphen_values = true)]
        seconds: String,
    },

    /// Rename a key
    Rename { key: String, new_key: String },

    /// Copy a key into another environment
    Copy {
        key: String,
        target_env: String,

        /// Name in the target environment (defaults to the same name)
        #[arg(long)]
        target_key: Option<String>,
    },

    /// Create or overwrite a key
    Set {
        key: String,
        value: String,

        /// Parse the value as JSON instead of storing it as a string
        #[arg(long)]
        json: bool,

        /// Expiry in seconds
        #[arg(long)]
        expiry: Option<i64>,
    },

    /// Add members to a sorted set, each written as score:value
    Zadd {
        key: String,
        #[arg(required = true, allow_hyphen_values = true)]
        members: Vec<String>,

        /// Expiry in seconds
        #[arg(long)]
        expiry: Option<i64>,
    },

    /// Poll the key count until interrupted
    #[command(name = "watch-count")]
    WatchCount {
        /// Seconds between refreshes (overrides stats.refreshIntervalSecs)
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Show or clear the persisted search history
    History {
        #[arg(long)]
        clear: bool,
    },

    /// Configuration file commands
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// List configured environments
    Envs,
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration
    Show,

    /// Print the config file location
    Path,

    /// Write a default config file if none exists
    Init,
}

/// Loaded configuration plus the client built from it
struct App {
    config: Config,
    dirs: Directories,
    env: String,
    client: Arc<ApiClient>,
}

impl App {
    fn load(cli: &Cli) -> Result<Self> {
        let dirs = Directories::new()?;
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| dirs.config_file.clone());
        let config = Config::load(&config_path)
            .with_context(|| format!("Failed to load {}", config_path.display()))?;
        let env = config.resolve_environment(cli.env.as_deref())?;

        let base_url = cli
            .url
            .clone()
            .unwrap_or_else(|| config.connection.base_url.clone());
        let mut builder = ApiClient::builder().base_url(&base_url);
        if let Some(timeout) = config.connection.timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .with_context(|| format!("Invalid backend URL: {base_url}"))?;
        debug!("Using backend {base_url}, environment {env}");

        Ok(Self {
            config,
            dirs,
            env,
            client: Arc::new(client),
        })
    }

    fn history(&self) -> SearchHistory {
        if self.config.history.persist {
            SearchHistory::load(Box::new(FileStorage::new(&self.dirs.history_dir)))
        } else {
            SearchHistory::load(Box::new(SessionStorage::new()))
        }
    }

    fn operations(&self, bus: &EventBus) -> KeyOperations<ApiClient> {
        KeyOperations::new(Arc::clone(&self.client), &self.env, bus.clone())
    }
}

/// Print toasts to stderr. With `all` false only success and info toasts
/// print; the failing command reports warnings and errors itself.
fn print_toasts(bus: &EventBus, all: bool) -> Subscription {
    bus.on(events::TOAST_SHOW, move |event| {
        if let Ok(toast) = event.payload_as::<Toast>()
            && (all || matches!(toast.level, ToastLevel::Success | ToastLevel::Info))
        {
            eprintln!("{}", render::toast_line(&toast));
        }
    })
}

fn setup_logging() {
    let default_level = if cfg!(debug_assertions) {
        "debug"
    } else {
        "warn"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "keyscope={default_level},keyscope_core={default_level},keyscope_client={default_level}"
        ))
    });

    // The console owns the terminal, so debug builds log to a file only.
    if cfg!(debug_assertions) {
        let temp_dir = std::env::temp_dir();
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let log_filename = format!("keyscope-{timestamp}.log");
        let log_path = temp_dir.join(&log_filename);

        #[cfg(unix)]
        {
            let symlink_path = temp_dir.join("keyscope.log");
            let _ = std::fs::remove_file(&symlink_path);
            let _ = std::os::unix::fs::symlink(&log_path, &symlink_path);
        }

        let file_appender = tracing_appender::rolling::never(&temp_dir, &log_filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        std::mem::forget(guard);

        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .with_target(true)
                    .with_line_number(true),
            )
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging();

    match &cli.command {
        None | Some(Commands::Browse) => {
            let app = App::load(&cli)?;
            console::run(app).await
        }
        Some(Commands::Config { command }) => run_config_command(&cli, command),
        Some(Commands::Envs) => {
            let app = App::load(&cli)?;
            for env in &app.config.environments {
                let marker = if env.name == app.config.default_environment {
                    "*"
                } else {
                    " "
                };
                match &env.label {
                    Some(label) => println!("{marker} {} ({label})", env.name),
                    None => println!("{marker} {}", env.name),
                }
            }
            Ok(())
        }
        Some(Commands::History { clear }) => {
            let app = App::load(&cli)?;
            if !app.config.history.persist {
                eprintln!("History persistence is disabled (history.persist = false)");
                return Ok(());
            }
            let mut history = app.history();
            if *clear {
                history.clear();
                println!("Search history cleared");
            } else {
                for (i, pattern) in history.entries().iter().enumerate() {
                    println!("{:>2}  {pattern}", i + 1);
                }
            }
            Ok(())
        }
        Some(command) => {
            let app = App::load(&cli)?;
            run_key_command(&app, command).await
        }
    }
}

fn run_config_command(cli: &Cli, command: &ConfigCommand) -> Result<()> {
    let dirs = Directories::new()?;
    let path = cli.config.clone().unwrap_or_else(|| dirs.config_file.clone());
    match command {
        ConfigCommand::Path => println!("{}", path.display()),
        ConfigCommand::Show => {
            let config = Config::load(&path)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigCommand::Init => {
            init_config(&dirs, &path)?;
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}

/// Create the config and data directories and write a default config to
/// `path`. An existing file is left alone.
fn init_config(dirs: &Directories, path: &Path) -> Result<()> {
    if path.exists() {
        bail!("Config file already exists: {}", path.display());
    }
    dirs.ensure_exists()
        .with_context(|| format!("Failed to create {}", dirs.data.display()))?;
    Config::default().save(path)?;
    Ok(())
}

async fn run_key_command(app: &App, command: &Commands) -> Result<()> {
    let bus = EventBus::new();
    let _printer = print_toasts(&bus, false);
    let mut ops = app.operations(&bus);

    match command {
        Commands::Keys {
            pattern,
            all,
            page_size,
        } => {
            let page_size = page_size.unwrap_or(app.config.search.page_size);
            list_keys(app, &bus, pattern, *all, page_size).await?;
        }
        Commands::Get { key } => {
            let details = ops
                .key_details(key)
                .await
                .with_context(|| format!("Key not found: {key}"))?;
            println!("{}", render::details(&details));
        }
        Commands::Count => println!("{}", ops.count().await?),
        Commands::Delete { key } => ops.delete(key).await?,
        Commands::Ttl { key, seconds } => ops.set_ttl(key, seconds).await?,
        Commands::Rename { key, new_key } => ops.rename(key, new_key).await?,
        Commands::Copy {
            key,
            target_env,
            target_key,
        } => {
            let target_env = app.config.resolve_environment(Some(target_env))?;
            ops.copy_to(key, target_key.as_deref().unwrap_or(""), &target_env)
                .await?;
        }
        Commands::Set {
            key,
            value,
            json,
            expiry,
        } => {
            let value = if *json {
                serde_json::from_str(value).context("Value is not valid JSON")?
            } else {
                serde_json::Value::String(value.clone())
            };
            ops.save(key, value, *expiry).await?;
        }
        Commands::Zadd {
            key,
            members,
            expiry,
        } => ops.add_sorted_set_members(key, members, *expiry).await?,
        Commands::WatchCount { interval } => {
            let interval = interval.map_or_else(
                || app.config.stats.refresh_interval(),
                Duration::from_secs,
            );
            watch_count(app, interval).await;
        }
        Commands::Browse
        | Commands::Config { .. }
        | Commands::Envs
        | Commands::History { .. } => bail!("not a key command"),
    }
    Ok(())
}

async fn list_keys(
    app: &App,
    bus: &EventBus,
    pattern: &str,
    all: bool,
    page_size: usize,
) -> Result<()> {
    let mut browser = KeyBrowser::new(Arc::clone(&app.client), &app.env, bus.clone(), app.history())
        .with_page_size(page_size);
    browser.set_pattern(pattern);
    browser.trigger_search();

    loop {
        match browser.settle().await {
            Some(BrowserUpdate::Failed { message }) => bail!("Error loading keys: {message}"),
            Some(BrowserUpdate::NotFound { key }) => bail!("Key not found: {key}"),
            _ => {}
        }
        if !all || !browser.can_load_more() {
            break;
        }
        browser.load_more()?;
    }

    for key in browser.keys() {
        println!("{key}");
    }
    if browser.can_load_more() {
        eprintln!(
            "{} keys shown, more available (use --all)",
            browser.keys().len()
        );
    }
    Ok(())
}

async fn watch_count(app: &App, interval: Duration) {
    let mut poller = CountPoller::spawn(Arc::clone(&app.client), &app.env, interval);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            reading = poller.changed() => {
                let Some(reading) = reading else { break };
                let now = chrono::Local::now().format("%H:%M:%S");
                match reading {
                    CountReading::Failed(message) => eprintln!("{now}  error: {message}"),
                    other => println!("{now}  {}", render::count(&other)),
                }
            }
        }
    }
    poller.stop();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_ttl_accepts_negative_seconds() {
        let cli = Cli::try_parse_from(["keyscope", "ttl", "session:1", "-1"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Ttl { ref seconds, .. }) if seconds == "-1"
        ));
    }

    #[test]
    fn test_global_env_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["keyscope", "count", "--env", "prod"]).unwrap();
        assert_eq!(cli.env.as_deref(), Some("prod"));
        assert!(matches!(cli.command, Some(Commands::Count)));
    }

    #[test]
    fn test_no_subcommand_starts_console() {
        let cli = Cli::try_parse_from(["keyscope"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_init_config_creates_directories_once() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dirs = Directories::with_base(temp_dir.path().join("keyscope"));

        init_config(&dirs, &dirs.config_file).unwrap();

        assert!(dirs.history_dir.is_dir());
        let config = Config::load(&dirs.config_file).unwrap();
        assert_eq!(config.default_environment, "default");

        let err = init_config(&dirs, &dirs.config_file).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_zadd_requires_members() {
        assert!(Cli::try_parse_from(["keyscope", "zadd", "board"]).is_err());
    }
}
