use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use async_trait::async_trait;
use clap::Parser;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use switchboard::stream::{ConnectionHandle, TransportConnection};
use switchboard::tools::host::spawn_echo_host;
use switchboard::{
    util, ChannelExecutor, Config, Context, ContextId, ContextKind, EventSourceTransport,
    InMemoryUnreadStore, SessionCoordinator, StreamTransport, StreamUpdate, TabId,
    TransportError,
};

#[derive(Parser)]
#[command(name = "switchboard")]
#[command(about = "Line console for context-scoped tabs, streams and tool calls")]
struct Cli {
    /// Custom data directory (defaults to ~/.switchboard)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Config file to load instead of <data-dir>/config.toml
    #[arg(long)]
    config: Option<PathBuf>,

    /// Server-sent events root, overrides stream.base_url
    #[arg(long)]
    base_url: Option<String>,

    /// Answer tool calls in-process by echoing their arguments
    #[arg(long)]
    echo_host: bool,
}

/// Transport used when no stream endpoint is configured
struct OfflineTransport;

#[async_trait]
impl StreamTransport for OfflineTransport {
    async fn open(&self, _context_id: &ContextId) -> Result<TransportConnection, TransportError> {
        Err(TransportError::Unavailable(
            "no stream.base_url configured".to_string(),
        ))
    }

    fn close(&self, _handle: ConnectionHandle) {}
}

const HELP: &str = "\
commands:
  open <kind> <id> [name]          open a tab (kind: room, dm, workspace, agent)
  sub <tab> <kind> <id> [name]     open a sub-view of <tab>
  activate <tab> | close <tab>     <tab> is a 1-based index or a tab id
  next | prev | tabs
  watch <context> | unwatch <context>
  invoke <server> <tool> [json]
  unread <context>
  quit";

struct Console {
    session: Arc<SessionCoordinator>,
    watchers: HashMap<ContextId, JoinHandle<()>>,
}

impl Console {
    fn new(session: Arc<SessionCoordinator>) -> Self {
        Self {
            session,
            watchers: HashMap::new(),
        }
    }

    fn resolve_tab(&self, reference: &str) -> Result<TabId> {
        if let Ok(index) = reference.parse::<usize>() {
            let tabs = self.session.tabs();
            return match index.checked_sub(1).and_then(|i| tabs.get(i)) {
                Some(tab) => Ok(tab.id()),
                None => bail!("no tab at index {index}"),
            };
        }
        TabId::parse(reference).with_context(|| format!("not a tab reference: {reference}"))
    }

    fn parse_context(args: &[&str]) -> Result<Context> {
        let [kind, id, name @ ..] = args else {
            bail!("expected <kind> <id> [name]");
        };
        let kind = ContextKind::parse(kind).with_context(|| format!("unknown kind: {kind}"))?;
        Ok(Context::new(kind, *id, name.join(" ")))
    }

    fn print_tabs(&self) {
        let tabs = self.session.tabs();
        if tabs.is_empty() {
            println!("no tabs");
            return;
        }
        let active = self.session.active_tab_id();
        for (index, tab) in tabs.iter().enumerate() {
            let marker = if Some(tab.id()) == active { '*' } else { ' ' };
            let indent = if tab.is_sub_view() { "  " } else { "" };
            println!(
                "{marker} {} {indent}{} [{}] {}",
                index + 1,
                tab.context().title(),
                tab.context(),
                tab.id()
            );
        }
    }

    fn print_selection(&self) {
        match self.session.selected_context() {
            Some(context) => println!("selected {context}"),
            None => println!("selected none"),
        }
    }

    fn watch(&mut self, context_id: ContextId) {
        if self.watchers.contains_key(&context_id) {
            println!("already watching {context_id}");
            return;
        }
        let mut handle = self.session.ensure_connected(&context_id);
        let label = context_id.clone();
        let task = tokio::spawn(async move {
            while let Some(update) = handle.recv().await {
                match update {
                    StreamUpdate::State(state) => println!("[{label}] {state}"),
                    StreamUpdate::Event { payload } => println!("[{label}] {payload}"),
                }
            }
        });
        self.watchers.insert(context_id.clone(), task);
        println!("watching {context_id}");
    }

    fn unwatch(&mut self, context_id: &ContextId) {
        match self.watchers.remove(context_id) {
            Some(task) => {
                task.abort();
                println!("unwatched {context_id}");
            }
            None => println!("not watching {context_id}"),
        }
    }

    /// Run one command line. Returns false when the console should exit.
    async fn handle_line(&mut self, line: &str) -> Result<bool> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((command, args)) = words.split_first() else {
            return Ok(true);
        };

        match (*command, args) {
            ("quit" | "exit", _) => return Ok(false),
            ("help", _) => println!("{HELP}"),
            ("open", args) => {
                let id = self.session.open_tab(Self::parse_context(args)?)?;
                println!("opened {id}");
            }
            ("sub", [parent, rest @ ..]) => {
                let parent = self.resolve_tab(parent)?;
                let id = self
                    .session
                    .open_sub_view(Self::parse_context(rest)?, parent)?;
                println!("opened {id}");
            }
            ("activate", [tab]) => {
                self.session.activate(self.resolve_tab(tab)?)?;
                self.print_selection();
            }
            ("close", [tab]) => {
                let removed = self.session.close_tab(self.resolve_tab(tab)?)?;
                println!("closed {} tab(s)", removed.len());
                self.print_selection();
            }
            ("next", []) => {
                self.session.next_tab();
                self.print_selection();
            }
            ("prev", []) => {
                self.session.prev_tab();
                self.print_selection();
            }
            ("tabs", []) => self.print_tabs(),
            ("watch", [context]) => self.watch(ContextId::from(*context)),
            ("unwatch", [context]) => self.unwatch(&ContextId::from(*context)),
            ("unread", [context]) => {
                println!("{}", self.session.unread(&ContextId::from(*context)));
            }
            ("invoke", [server, tool, json @ ..]) => {
                let args = if json.is_empty() {
                    Value::Object(Default::default())
                } else {
                    serde_json::from_str(&json.join(" ")).context("invalid JSON arguments")?
                };
                let result = self.session.invoke(server, tool, args, None).await?;
                println!("result {result}");
            }
            _ => bail!("unrecognized command: {line} (try help)"),
        }
        Ok(true)
    }

    async fn run(&mut self) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            match self.handle_line(line.trim()).await {
                Ok(true) => {}
                Ok(false) => break,
                Err(err) => println!("error: {err:#}"),
            }
        }
        Ok(())
    }
}

impl Drop for Console {
    fn drop(&mut self) {
        for (_, task) in self.watchers.drain() {
            task.abort();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    util::init_data_dir(cli.data_dir.clone());

    // Initialize logging to file (<data-dir>/logs/switchboard.log)
    fs::create_dir_all(util::logs_dir())?;

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(util::log_file_path())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(log_file)
        .with_ansi(false) // Disable ANSI colors in log file
        .init();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::load(),
    };
    if let Some(base_url) = cli.base_url {
        config = config.with_base_url(base_url);
        config.validate()?;
    }

    let transport: Arc<dyn StreamTransport> = match &config.stream.base_url {
        Some(base_url) => Arc::new(EventSourceTransport::new(base_url.clone())),
        None => Arc::new(OfflineTransport),
    };

    let (executor, requests) = ChannelExecutor::channel(64);
    let session = Arc::new(SessionCoordinator::new(
        &config,
        transport,
        Arc::new(executor),
        Arc::new(InMemoryUnreadStore::new()),
    ));

    let mut background = Vec::new();
    if cli.echo_host {
        let (responses_tx, responses_rx) = mpsc::channel(64);
        background.push(spawn_echo_host(requests, responses_tx));
        background.push(session.spawn_tool_responses(responses_rx));
    } else {
        // No host: tool calls fail with ExecutorUnavailable
        drop(requests);
    }

    println!("switchboard ready (type help)");
    let mut console = Console::new(Arc::clone(&session));
    let result = console.run().await;
    drop(console);

    session.shutdown();
    for task in background {
        task.abort();
    }
    result
}
