//! Interactive console: a line editor driving the key browser, key
//! operations, the count poller and the plugin host.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use keyscope_client::ApiClient;
use keyscope_core::plugin::{ActivityLog, SelectionTracker, ToastLog};
use keyscope_core::{
    BrowserUpdate, CountPoller, EventBus, KeyBrowser, KeyOperations, KeysSelected, PluginHost,
    Subscription, events,
};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{App, CLI_SOURCE, print_toasts, render};

const HELP: &str = "\
Search
  search [pattern]       Run a search (blank = all keys, no wildcard = exact key)
  more                   Load the next page
  all                    Scan every key
  list                   Show the current results
  history                Show recent searches
  h <n>                  Re-run history entry n
Keys
  select <n>...          Select results by number
  get [key]              Show a key (defaults to the selection)
  del [key]              Delete a key (defaults to the selection)
  ttl <key> <seconds>    Set TTL, -1 removes the expiry
  rename <key> <new>     Rename a key
  copy <key> <env> [new] Copy a key into another environment
  set <key> <value>      Store a string value
  set <key> --json <v>   Store a JSON value
  zadd <key> <s:v>...    Add sorted set members
Console
  count                  Refresh and show the key count
  stats                  Pause or resume count polling
  use <env>              Switch environment
  envs                   List environments
  plugins                Render plugin panels
  press <plugin>         Press a plugin's panel button
  help                   Show this help
  quit                   Leave the console";

/// One parsed console line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Empty,
    Search(String),
    More,
    All,
    List,
    History,
    HistoryPick(usize),
    Select(Vec<usize>),
    Get(Option<String>),
    Delete(Option<String>),
    Ttl { key: String, seconds: String },
    Rename { key: String, new_key: String },
    Copy {
        key: String,
        target_env: String,
        target_key: Option<String>,
    },
    Set { key: String, value: Value },
    Zadd { key: String, members: Vec<String> },
    Count,
    Stats,
    Use(String),
    Envs,
    Plugins,
    Press(String),
    Help,
    Quit,
}

impl Command {
    /// Parse one input line. Arguments are whitespace separated; `search`
    /// and `set` take the rest of the line verbatim.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        let (word, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(w, r)| (w, r.trim_start()));
        let args: Vec<&str> = rest.split_whitespace().collect();

        let command = match word {
            "" => Self::Empty,
            "search" | "s" => Self::Search(rest.to_string()),
            "more" | "m" => Self::More,
            "all" => Self::All,
            "list" | "ls" => Self::List,
            "history" => Self::History,
            "h" => Self::HistoryPick(index_arg(&args, "h <n>")?),
            "select" | "sel" => {
                if args.is_empty() {
                    bail!("usage: select <n>...");
                }
                Self::Select(
                    args.iter()
                        .map(|a| parse_index(a))
                        .collect::<Result<Vec<_>>>()?,
                )
            }
            "get" => Self::Get(optional_arg(&args, "get [key]")?),
            "del" | "delete" => Self::Delete(optional_arg(&args, "del [key]")?),
            "ttl" => match args.as_slice() {
                [key, seconds] => Self::Ttl {
                    key: (*key).to_string(),
                    seconds: (*seconds).to_string(),
                },
                _ => bail!("usage: ttl <key> <seconds>"),
            },
            "rename" | "mv" => match args.as_slice() {
                [key, new_key] => Self::Rename {
                    key: (*key).to_string(),
                    new_key: (*new_key).to_string(),
                },
                _ => bail!("usage: rename <key> <new>"),
            },
            "copy" | "cp" => match args.as_slice() {
                [key, target_env] => Self::Copy {
                    key: (*key).to_string(),
                    target_env: (*target_env).to_string(),
                    target_key: None,
                },
                [key, target_env, target_key] => Self::Copy {
                    key: (*key).to_string(),
                    target_env: (*target_env).to_string(),
                    target_key: Some((*target_key).to_string()),
                },
                _ => bail!("usage: copy <key> <env> [new]"),
            },
            "set" => parse_set(rest)?,
            "zadd" => match args.split_first() {
                Some((key, members)) if !members.is_empty() => Self::Zadd {
                    key: (*key).to_string(),
                    members: members.iter().map(ToString::to_string).collect(),
                },
                _ => bail!("usage: zadd <key> <score:value>..."),
            },
            "count" => Self::Count,
            "stats" => Self::Stats,
            "use" => match args.as_slice() {
                [env] => Self::Use((*env).to_string()),
                _ => bail!("usage: use <env>"),
            },
            "envs" => Self::Envs,
            "plugins" | "p" => Self::Plugins,
            "press" => match args.as_slice() {
                [id] => Self::Press((*id).to_string()),
                _ => bail!("usage: press <plugin>"),
            },
            "help" | "?" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            other => bail!("unknown command: {other} (try help)"),
        };
        Ok(command)
    }
}

/// 1-based index as typed, 0-based as returned
fn parse_index(arg: &str) -> Result<usize> {
    match arg.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n - 1),
        _ => bail!("not a result number: {arg}"),
    }
}

fn index_arg(args: &[&str], usage: &str) -> Result<usize> {
    match args {
        [n] => parse_index(n),
        _ => bail!("usage: {usage}"),
    }
}

fn optional_arg(args: &[&str], usage: &str) -> Result<Option<String>> {
    match args {
        [] => Ok(None),
        [key] => Ok(Some((*key).to_string())),
        _ => bail!("usage: {usage}"),
    }
}

fn parse_set(rest: &str) -> Result<Command> {
    let Some((key, value)) = rest.split_once(char::is_whitespace) else {
        bail!("usage: set <key> <value>");
    };
    let value = value.trim_start();
    let value = match value.strip_prefix("--json") {
        Some(raw) => serde_json::from_str(raw.trim()).context("value is not valid JSON")?,
        None => Value::String(value.to_string()),
    };
    Ok(Command::Set {
        key: key.to_string(),
        value,
    })
}

/// Console state for one environment
struct Console {
    app: App,
    bus: EventBus,
    host: PluginHost,
    browser: KeyBrowser<ApiClient>,
    ops: KeyOperations<ApiClient>,
    poller: CountPoller,
    _printer: Subscription,
}

impl Console {
    fn new(app: App) -> Result<Self> {
        let bus = EventBus::new();
        let printer = print_toasts(&bus, true);

        let mut host = PluginHost::new(bus.clone(), &app.env);
        host.register(Box::new(ToastLog::new()))?;
        host.register(Box::new(SelectionTracker::new()))?;
        host.register(Box::new(ActivityLog::new()))?;
        let report = host.mount_all();
        for (id, message) in &report.failed {
            warn!("Plugin {id} failed to mount: {message}");
        }

        let browser = KeyBrowser::new(
            Arc::clone(&app.client),
            &app.env,
            bus.clone(),
            app.history(),
        )
        .with_page_size(app.config.search.page_size);
        let ops = app.operations(&bus);
        let poller = CountPoller::spawn(
            Arc::clone(&app.client),
            &app.env,
            app.config.stats.refresh_interval(),
        );

        Ok(Self {
            app,
            bus,
            host,
            browser,
            ops,
            poller,
            _printer: printer,
        })
    }

    fn prompt(&self) -> String {
        let paused = if self.poller.is_paused() { ", paused" } else { "" };
        format!(
            "{} [{}{paused}]> ",
            self.app.env,
            render::count(&self.poller.latest())
        )
    }

    /// Move the console to another environment. Results, selection and the
    /// poller are rebuilt; history carries over.
    fn into_environment(self, env: String) -> Self {
        let Self {
            mut app,
            bus,
            host,
            browser,
            mut ops,
            poller,
            _printer,
        } = self;
        poller.stop();

        host.set_environment(&env);
        ops.set_environment(&env);
        let browser = browser.switch_environment(&env);
        let poller = CountPoller::spawn(
            Arc::clone(&app.client),
            &env,
            app.config.stats.refresh_interval(),
        );
        app.env = env;

        Self {
            app,
            bus,
            host,
            browser,
            ops,
            poller,
            _printer,
        }
    }

    fn select(&self, keys: Vec<String>) {
        self.bus
            .publish(events::KEYS_SELECTED, &KeysSelected { keys }, CLI_SOURCE);
    }

    fn selected_or(&self, key: Option<String>) -> Result<String> {
        if let Some(key) = key {
            return Ok(key);
        }
        match self.host.context().selected_keys.as_slice() {
            [key] => Ok(key.clone()),
            [] => bail!("no key given and nothing selected"),
            _ => bail!("more than one key selected; name the key"),
        }
    }

    fn print_results(&self) {
        let keys = self.browser.keys();
        if keys.is_empty() {
            println!("(no keys)");
            return;
        }
        println!("{}", render::key_list(keys));
        if let Some(total) = self.browser.session().total() {
            println!("{} of {total} loaded", keys.len());
        }
        if self.browser.has_more() {
            println!("more available (more)");
        }
    }

    async fn settle_search(&mut self) {
        match self.browser.settle().await {
            Some(BrowserUpdate::Results { .. }) => self.print_results(),
            Some(BrowserUpdate::Found { details, .. }) => println!("{}", render::details(&details)),
            // toasts already reported these
            Some(BrowserUpdate::NotFound { .. } | BrowserUpdate::Failed { .. }) => {}
            Some(BrowserUpdate::Discarded) | None => debug!("Search settled without changes"),
        }
    }

    /// Run one command. Errors are printed by the caller and never end the
    /// session.
    async fn execute(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Empty | Command::Quit => {}
            Command::Help => println!("{HELP}"),
            Command::Search(pattern) => {
                self.browser.set_pattern(pattern);
                self.browser.trigger_search();
                self.settle_search().await;
            }
            Command::More => {
                self.browser.load_more()?;
                self.settle_search().await;
            }
            Command::All => {
                self.browser.show_all();
                self.settle_search().await;
            }
            Command::List => self.print_results(),
            Command::History => {
                let entries = self.browser.history().entries();
                if entries.is_empty() {
                    println!("(no history)");
                }
                for (i, pattern) in entries.iter().enumerate() {
                    println!("{:>2}  {pattern}", i + 1);
                }
            }
            Command::HistoryPick(index) => {
                let Some(pattern) = self.browser.history().entries().get(index).cloned() else {
                    bail!("no history entry {}", index + 1);
                };
                self.browser.handle_history_select(&pattern);
                self.settle_search().await;
            }
            Command::Select(indexes) => {
                let keys = self.browser.keys();
                let selected = indexes
                    .iter()
                    .map(|&i| {
                        keys.get(i)
                            .cloned()
                            .with_context(|| format!("no result {}", i + 1))
                    })
                    .collect::<Result<Vec<_>>>()?;
                self.select(selected);
            }
            Command::Get(key) => {
                let key = self.selected_or(key)?;
                match self.ops.key_details(&key).await {
                    Ok(details) => println!("{}", render::details(&details)),
                    Err(e) => {
                        debug!("Lookup of {key} failed: {e}");
                        bail!("Key not found: {key}");
                    }
                }
            }
            Command::Delete(key) => {
                let key = self.selected_or(key)?;
                if self.ops.delete(&key).await.is_ok() {
                    self.browser.forget_keys(&[key]);
                }
            }
            Command::Ttl { key, seconds } => {
                let _ = self.ops.set_ttl(&key, &seconds).await;
            }
            Command::Rename { key, new_key } => {
                let _ = self.ops.rename(&key, &new_key).await;
            }
            Command::Copy {
                key,
                target_env,
                target_key,
            } => {
                let target_env = self.app.config.resolve_environment(Some(&target_env))?;
                let _ = self
                    .ops
                    .copy_to(&key, target_key.as_deref().unwrap_or(""), &target_env)
                    .await;
            }
            Command::Set { key, value } => {
                let _ = self.ops.save(&key, value, None).await;
            }
            Command::Zadd { key, members } => {
                let _ = self.ops.add_sorted_set_members(&key, &members, None).await;
            }
            Command::Count => println!("{} keys", self.ops.count().await?),
            Command::Stats => {
                let paused = self.poller.toggle_pause();
                println!(
                    "Count polling {}",
                    if paused { "paused" } else { "resumed" }
                );
            }
            Command::Envs => {
                for env in &self.app.config.environments {
                    let marker = if env.name == self.app.env { "*" } else { " " };
                    println!("{marker} {}", env.display_name());
                }
            }
            Command::Plugins => {
                for rendered in self.host.render_all() {
                    println!("{}", render::plugin(&rendered));
                }
                let buttons = self.host.panel_buttons();
                if !buttons.is_empty() {
                    println!();
                    for (id, button) in buttons {
                        println!("[{}] press {id}", button.label);
                    }
                }
            }
            Command::Press(id) => {
                self.host.press_button(&id)?;
            }
            Command::Use(_) => bail!("use is handled by the console loop"),
        }
        Ok(())
    }
}

/// Run the console until `quit` or end of input.
pub async fn run(app: App) -> Result<()> {
    let mut editor = DefaultEditor::new().context("Failed to initialise line editor")?;
    let mut console = Console::new(app)?;
    println!("keyscope console on {} (help for commands)", console.app.env);

    loop {
        let prompt = console.prompt();
        let line = match tokio::task::block_in_place(|| editor.readline(&prompt)) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e).context("Failed to read input"),
        };
        if !line.trim().is_empty() {
            let _ = editor.add_history_entry(line.as_str());
        }

        let command = match Command::parse(&line) {
            Ok(command) => command,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };

        match command {
            Command::Quit => break,
            Command::Use(env) => match console.app.config.resolve_environment(Some(&env)) {
                Ok(env) => {
                    console = console.into_environment(env);
                    println!("Switched to {}", console.app.env);
                }
                Err(e) => eprintln!("{e}"),
            },
            command => {
                if let Err(e) = console.execute(command).await {
                    eprintln!("{e:#}");
                }
            }
        }
    }

    console.host.unmount_all();
    console.poller.stop();
    Ok(())
}
