//! Agent lifecycle: the backend the UI starts and stops
//!
//! `Start` brings up the log store, command executor, file tracker and HTTP
//! API; `Stop` tears them down in reverse. A failed start never leaves
//! components running.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::error::AgentError;
use crate::executor::CommandExecutor;
use crate::server::{self, HttpServer};
use crate::store::{FileLogStore, LogStore, MemoryLogStore};
use crate::tracker::source::DirectoryScanner;
use crate::tracker::FileChangesTracker;

/// What the UI controller talks to
#[async_trait]
pub trait Backend: Send + Sync {
    async fn start(&self) -> Result<(), AgentError>;

    async fn stop(&self) -> Result<(), AgentError>;

    async fn is_running(&self) -> bool;
}

/// Where the agent gets its configuration on each start
#[derive(Debug, Clone)]
enum ConfigSource {
    File(Option<PathBuf>),
    Fixed(AppConfig),
}

struct Running {
    token: CancellationToken,
    server: HttpServer,
    executor: Arc<CommandExecutor>,
    tracker: Arc<FileChangesTracker>,
    store: Arc<dyn LogStore>,
}

pub struct Agent {
    config: ConfigSource,
    ephemeral: bool,
    running: Mutex<Option<Running>>,
}

impl Agent {
    /// Agent that reloads `config_path` (or the default config) on every start
    pub fn new(config_path: Option<PathBuf>) -> Self {
        Self {
            config: ConfigSource::File(config_path),
            ephemeral: false,
            running: Mutex::new(None),
        }
    }

    /// Agent with a fixed, already loaded config
    pub fn with_config(config: AppConfig) -> Self {
        Self {
            config: ConfigSource::Fixed(config),
            ephemeral: false,
            running: Mutex::new(None),
        }
    }

    /// Keep log entries in memory instead of the store file
    pub fn ephemeral(mut self, ephemeral: bool) -> Self {
        self.ephemeral = ephemeral;
        self
    }

    /// Address the HTTP API is listening on, when running
    pub async fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.running.lock().await.as_ref().map(|r| r.server.local_addr())
    }

    fn load_config(&self) -> Result<AppConfig, AgentError> {
        match &self.config {
            ConfigSource::File(path) => Ok(AppConfig::load(path.as_deref())?),
            ConfigSource::Fixed(config) => {
                let mut config = config.clone();
                config.validate()?;
                Ok(config)
            }
        }
    }

    async fn open_store(&self, config: &AppConfig) -> Result<Arc<dyn LogStore>, AgentError> {
        if self.ephemeral {
            return Ok(Arc::new(MemoryLogStore::new()));
        }
        Ok(Arc::new(FileLogStore::open(config.store_path()).await?))
    }
}

#[async_trait]
impl Backend for Agent {
    async fn start(&self) -> Result<(), AgentError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(AgentError::AlreadyRunning);
        }

        let config = self.load_config()?;
        let store = self.open_store(&config).await?;
        let token = CancellationToken::new();

        let executor = Arc::new(CommandExecutor::new());
        executor.start(&token);

        let scanner = DirectoryScanner::new();
        if let Err(e) = scanner.prime(&config.directory).await {
            tracing::warn!("Could not index {} before tracking: {}", config.directory, e);
        }

        let tracker = Arc::new(FileChangesTracker::new(
            config.directory.clone(),
            Duration::from_secs(config.check_frequency),
            Arc::new(scanner),
            Arc::clone(&store),
        ));
        tracker.start(&token);

        tracing::info!("started-tracker-on-directory directory={}", config.directory);

        let router = server::router(Arc::clone(&tracker), Arc::clone(&executor));
        let server = match HttpServer::start(config.http_addr(), router).await {
            Ok(server) => server,
            Err(e) => {
                tracing::error!("Failed to start http server: {}", e);
                token.cancel();
                tracker.stop().await;
                let _ = executor.stop().await;
                let _ = store.close().await;
                return Err(e.into());
            }
        };

        *running = Some(Running {
            token,
            server,
            executor,
            tracker,
            store,
        });
        Ok(())
    }

    async fn stop(&self) -> Result<(), AgentError> {
        let mut running = self.running.lock().await;
        let Some(components) = running.take() else {
            return Err(AgentError::NotRunning);
        };

        let server_result = components.server.stop().await;
        let executor_result = components.executor.stop().await;
        components.tracker.stop().await;
        let store_result = components.store.close().await;
        components.token.cancel();

        tracing::info!("app stopped!");

        server_result?;
        executor_result?;
        store_result.map_err(AgentError::StoreClose)?;
        Ok(())
    }

    async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }
}
