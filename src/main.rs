mod agent;
mod app;
mod client;
mod config;
mod error;
mod executor;
mod server;
mod store;
mod theme;
mod tracker;
mod ui;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agent::{Agent, Backend};
use app::{App, Popup};
use client::LogsClient;
use config::AppConfig;

const DEFAULT_REPORTING_API: &str = "http://localhost/report";
const DEFAULT_CHECK_FREQUENCY: u64 = 10;

#[derive(Parser, Debug)]
#[command(name = "filetrack")]
#[command(version = "0.1.0")]
#[command(about = "Track file changes in a directory and browse them from the terminal")]
struct Args {
    /// Run the agent without the TUI until Ctrl-C
    #[arg(short, long)]
    daemon: bool,

    /// Print the newest log entries from a running agent as JSON
    #[arg(short, long, value_name = "N", num_args = 0..=1, default_missing_value = "2")]
    logs: Option<u32>,

    /// Print a running agent's worker and timer liveness as JSON
    #[arg(long)]
    health: bool,

    /// Queue a command on a running agent (only touch and mkdir are allowed)
    #[arg(short, long, value_name = "CMD")]
    exec: Vec<String>,

    /// Write a new config file tracking DIRECTORY
    #[arg(long, value_name = "DIRECTORY")]
    init: Option<String>,

    /// Config file (defaults to the user config directory)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Keep log entries in memory only
    #[arg(long)]
    ephemeral: bool,
}

impl Args {
    fn is_interactive(&self) -> bool {
        !self.daemon && self.logs.is_none() && !self.health && self.exec.is_empty() && self.init.is_none()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(args.is_interactive())?;

    if let Some(ref directory) = args.init {
        return init_config(directory, args.config.as_deref());
    }

    if let Some(limit) = args.logs {
        return print_logs(args.config.as_deref(), limit).await;
    }

    if args.health {
        return print_health(args.config.as_deref()).await;
    }

    if !args.exec.is_empty() {
        return submit_commands(args.config.as_deref(), args.exec).await;
    }

    if args.daemon {
        // Fail fast on a bad config instead of reloading it later
        let config = AppConfig::load(args.config.as_deref())?;
        return run_daemon(Agent::with_config(config).ephemeral(args.ephemeral)).await;
    }

    let agent = Agent::new(args.config.clone()).ephemeral(args.ephemeral);
    run_tui(agent, args.config.as_deref()).await
}

/// Log to stderr, or to a file while the TUI owns the terminal
fn init_tracing(to_file: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env();

    if to_file {
        let dir = AppConfig::data_dir();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating {}", dir.display()))?;
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("filetrack.log"))?;

        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
            .with(filter)
            .init();
    }

    Ok(())
}

fn init_config(directory: &str, path: Option<&std::path::Path>) -> Result<()> {
    let mut config = AppConfig {
        directory: directory.to_string(),
        check_frequency: DEFAULT_CHECK_FREQUENCY,
        reporting_api: DEFAULT_REPORTING_API.to_string(),
        ..AppConfig::default()
    };
    config.validate()?;
    config.save(path)?;

    let written = match path {
        Some(p) => p.to_path_buf(),
        None => AppConfig::config_path()?,
    };
    println!("Wrote {}", written.display());
    Ok(())
}

fn client_for(path: Option<&std::path::Path>) -> Result<LogsClient> {
    let config = AppConfig::load_or_default(path);
    Ok(LogsClient::new(config.api_base_url())?)
}

async fn print_logs(path: Option<&std::path::Path>, limit: u32) -> Result<()> {
    let entries = client_for(path)?.fetch_logs(limit).await?;
    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}

async fn print_health(path: Option<&std::path::Path>) -> Result<()> {
    let health = client_for(path)?.health().await?;
    println!("{}", serde_json::to_string(&health)?);
    Ok(())
}

async fn submit_commands(path: Option<&std::path::Path>, commands: Vec<String>) -> Result<()> {
    let message = client_for(path)?.submit_commands(commands).await?;
    println!("{}", message);
    Ok(())
}

async fn run_daemon(agent: Agent) -> Result<()> {
    tracing::info!("Starting filetrack daemon");
    agent.start().await?;
    if let Some(addr) = agent.local_addr().await {
        tracing::info!("Logs API listening on {}", addr);
    }

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down");
    agent.stop().await?;
    Ok(())
}

async fn run_tui(agent: Agent, config_path: Option<&std::path::Path>) -> Result<()> {
    let config = AppConfig::load_or_default(config_path);
    let client = LogsClient::new(config.api_base_url())?;
    let mut app = App::new(Arc::new(agent), client, config.fetch_limit);

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &mut app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    app.shutdown().await;

    result
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> Result<()> {
    loop {
        terminal.draw(|f| ui::draw(f, app))?;

        if event::poll(std::time::Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') if app.popup == Popup::None => return Ok(()),
                        KeyCode::Char('c') if key.modifiers.contains(event::KeyModifiers::CONTROL) => {
                            return Ok(())
                        }
                        _ => app.handle_key(key),
                    }
                }
            }
        }

        // Pick up finished start/stop/fetch calls
        app.tick();
    }
}
