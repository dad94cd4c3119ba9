use crossterm::event::{KeyCode, KeyEvent};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::agent::Backend;
use crate::client::{LogsClient, RemoteLogEntry};
use crate::error::{AgentError, ClientError};

pub const START_OK: &str = "App started successfully!";
pub const STOP_OK: &str = "App stopped successfully!";

/// Lifecycle of the backend as the UI sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Which controls accept input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Controls {
    pub start: bool,
    pub stop: bool,
    pub fetch_logs: bool,
}

impl ServiceState {
    pub fn controls(self) -> Controls {
        match self {
            ServiceState::Stopped => Controls { start: true, stop: false, fetch_logs: false },
            ServiceState::Running => Controls { start: false, stop: true, fetch_logs: true },
            ServiceState::Starting | ServiceState::Stopping => {
                Controls { start: false, stop: false, fetch_logs: false }
            }
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ServiceState::Stopped => "Stopped",
            ServiceState::Starting => "Starting…",
            ServiceState::Running => "Running",
            ServiceState::Stopping => "Stopping…",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Popup {
    None,
    Help,
}

/// One rendered row of the logs table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRow {
    pub id: String,
    pub details: String,
    pub log_time: String,
}

impl LogRow {
    fn from_entry(entry: &RemoteLogEntry) -> Self {
        let id = match &entry.id {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let details = serde_json::to_string_pretty(&entry.details)
            .unwrap_or_else(|_| entry.details.to_string());

        Self {
            id,
            details,
            log_time: entry.log_time.clone(),
        }
    }
}

/// Completion of a call started by a control
#[derive(Debug)]
pub enum Outcome {
    Started(Result<(), AgentError>),
    Stopped {
        result: Result<(), AgentError>,
        still_running: bool,
    },
    LogsFetched(Result<Vec<RemoteLogEntry>, ClientError>),
}

pub struct App {
    pub state: ServiceState,
    pub popup: Popup,

    // Single feedback line; kept until the next action replaces it
    pub status_message: Option<String>,

    pub rows: Vec<LogRow>,
    pub selected_row: usize,
    pub fetch_in_flight: bool,

    backend: Arc<dyn Backend>,
    client: Arc<LogsClient>,
    fetch_limit: u32,

    outcome_tx: mpsc::UnboundedSender<Outcome>,
    outcome_rx: mpsc::UnboundedReceiver<Outcome>,
}

impl App {
    pub fn new(backend: Arc<dyn Backend>, client: LogsClient, fetch_limit: u32) -> Self {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        Self {
            state: ServiceState::Stopped,
            popup: Popup::None,
            status_message: None,
            rows: Vec::new(),
            selected_row: 0,
            fetch_in_flight: false,
            backend,
            client: Arc::new(client),
            fetch_limit,
            outcome_tx,
            outcome_rx,
        }
    }

    pub fn controls(&self) -> Controls {
        let mut controls = self.state.controls();
        controls.fetch_logs &= !self.fetch_in_flight;
        controls
    }

    pub fn fetch_limit(&self) -> u32 {
        self.fetch_limit
    }

    fn set_status(&mut self, msg: impl Into<String>) {
        self.status_message = Some(msg.into());
    }

    pub fn on_start_click(&mut self) {
        if !self.controls().start {
            return;
        }
        self.state = ServiceState::Starting;

        let backend = Arc::clone(&self.backend);
        let tx = self.outcome_tx.clone();
        tokio::spawn(async move {
            let result = backend.start().await;
            let _ = tx.send(Outcome::Started(result));
        });
    }

    pub fn on_stop_click(&mut self) {
        if !self.controls().stop {
            return;
        }
        self.state = ServiceState::Stopping;

        let backend = Arc::clone(&self.backend);
        let tx = self.outcome_tx.clone();
        tokio::spawn(async move {
            let result = backend.stop().await;
            let still_running = result.is_err() && backend.is_running().await;
            let _ = tx.send(Outcome::Stopped { result, still_running });
        });
    }

    pub fn on_fetch_logs_click(&mut self) {
        if !self.controls().fetch_logs {
            return;
        }
        self.fetch_in_flight = true;

        let client = Arc::clone(&self.client);
        let limit = self.fetch_limit;
        let tx = self.outcome_tx.clone();
        tokio::spawn(async move {
            let result = client.fetch_logs(limit).await;
            let _ = tx.send(Outcome::LogsFetched(result));
        });
    }

    /// Apply a finished call to the UI state
    pub fn apply(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Started(Ok(())) => {
                self.set_status(START_OK);
                self.state = ServiceState::Running;
            }
            Outcome::Started(Err(e)) => {
                self.set_status(format!("Error: {}", e));
                // Start tears down partial work, so Stopped is the safe state
                self.state = ServiceState::Stopped;
            }
            Outcome::Stopped { result: Ok(()), .. } => {
                self.set_status(STOP_OK);
                self.state = ServiceState::Stopped;
            }
            Outcome::Stopped { result: Err(e), still_running } => {
                self.set_status(format!("Error: {}", e));
                self.state = if still_running {
                    ServiceState::Running
                } else {
                    ServiceState::Stopped
                };
            }
            Outcome::LogsFetched(Ok(entries)) => {
                self.fetch_in_flight = false;
                tracing::debug!("Fetched logs: {:?}", entries);
                self.render_logs(&entries);
            }
            Outcome::LogsFetched(Err(e)) => {
                self.fetch_in_flight = false;
                self.set_status(format!("Error fetching logs: {}", e));
            }
        }
    }

    /// Replace the table with one row per entry, in received order
    pub fn render_logs(&mut self, entries: &[RemoteLogEntry]) {
        self.rows.clear();
        self.rows.extend(entries.iter().map(LogRow::from_entry));
        self.selected_row = 0;
    }

    /// Apply every call that finished since the last frame
    pub fn tick(&mut self) {
        while let Ok(outcome) = self.outcome_rx.try_recv() {
            self.apply(outcome);
        }
    }

    /// Stop the backend before quitting if it is up
    pub async fn shutdown(&mut self) {
        if self.backend.is_running().await {
            if let Err(e) = self.backend.stop().await {
                tracing::error!("Failed to stop agent on exit: {}", e);
            }
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if self.popup == Popup::Help {
            if matches!(key.code, KeyCode::Esc | KeyCode::Char('?') | KeyCode::Char('h') | KeyCode::Enter) {
                self.popup = Popup::None;
            }
            return;
        }

        match key.code {
            KeyCode::Char('s') => self.on_start_click(),
            KeyCode::Char('x') => self.on_stop_click(),
            KeyCode::Char('f') => self.on_fetch_logs_click(),

            KeyCode::Char('j') | KeyCode::Down => {
                if self.selected_row + 1 < self.rows.len() {
                    self.selected_row += 1;
                }
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.selected_row = self.selected_row.saturating_sub(1);
            }

            KeyCode::Char('?') | KeyCode::Char('h') => self.popup = Popup::Help,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Backend whose start/stop succeed or fail on demand
    #[derive(Default)]
    struct FakeBackend {
        fail_start: bool,
        fail_stop: bool,
        running: AtomicBool,
    }

    #[async_trait]
    impl Backend for FakeBackend {
        async fn start(&self) -> Result<(), AgentError> {
            if self.fail_start {
                return Err(AgentError::AlreadyRunning);
            }
            self.running.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn stop(&self) -> Result<(), AgentError> {
            if self.fail_stop {
                return Err(AgentError::NotRunning);
            }
            self.running.store(false, Ordering::SeqCst);
            Ok(())
        }

        async fn is_running(&self) -> bool {
            self.running.load(Ordering::SeqCst)
        }
    }

    fn app_with(backend: FakeBackend) -> App {
        let client = LogsClient::new("http://127.0.0.1:9").unwrap();
        App::new(Arc::new(backend), client, 2)
    }

    async fn settle(app: &mut App) {
        let outcome = app.outcome_rx.recv().await.unwrap();
        app.apply(outcome);
    }

    fn entries(value: serde_json::Value) -> Vec<RemoteLogEntry> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_start_and_stop_never_both_enabled() {
        for state in [
            ServiceState::Stopped,
            ServiceState::Starting,
            ServiceState::Running,
            ServiceState::Stopping,
        ] {
            let c = state.controls();
            assert!(!(c.start && c.stop), "{state:?}");
        }
    }

    #[tokio::test]
    async fn test_successful_start_enables_stop_and_fetch() {
        let mut app = app_with(FakeBackend::default());
        assert_eq!(app.controls(), Controls { start: true, stop: false, fetch_logs: false });

        app.on_start_click();
        assert_eq!(app.state, ServiceState::Starting);
        assert_eq!(app.controls(), Controls { start: false, stop: false, fetch_logs: false });

        settle(&mut app).await;
        assert_eq!(app.state, ServiceState::Running);
        assert_eq!(app.controls(), Controls { start: false, stop: true, fetch_logs: true });
        assert_eq!(app.status_message.as_deref(), Some(START_OK));
    }

    #[tokio::test]
    async fn test_successful_stop_restores_start() {
        let mut app = app_with(FakeBackend::default());
        app.on_start_click();
        settle(&mut app).await;

        app.on_stop_click();
        assert_eq!(app.state, ServiceState::Stopping);
        settle(&mut app).await;

        assert_eq!(app.controls(), Controls { start: true, stop: false, fetch_logs: false });
        assert_eq!(app.status_message.as_deref(), Some(STOP_OK));
    }

    #[tokio::test]
    async fn test_failed_start_shows_error_and_resets() {
        let mut app = app_with(FakeBackend {
            fail_start: true,
            ..FakeBackend::default()
        });

        app.on_start_click();
        settle(&mut app).await;

        assert_eq!(app.status_message.as_deref(), Some("Error: agent is already running"));
        assert_eq!(app.state, ServiceState::Stopped);
        assert_eq!(app.controls(), Controls { start: true, stop: false, fetch_logs: false });
    }

    #[tokio::test]
    async fn test_failed_stop_requeries_backend() {
        let mut app = app_with(FakeBackend {
            fail_stop: true,
            ..FakeBackend::default()
        });
        app.on_start_click();
        settle(&mut app).await;

        app.on_stop_click();
        settle(&mut app).await;

        assert_eq!(app.status_message.as_deref(), Some("Error: agent is not running"));
        // The fake is still up, so the controls stay in the running layout
        assert_eq!(app.state, ServiceState::Running);
    }

    #[tokio::test]
    async fn test_clicks_while_in_flight_are_ignored() {
        let mut app = app_with(FakeBackend::default());
        app.on_start_click();
        app.on_start_click();
        app.on_stop_click();

        settle(&mut app).await;
        assert_eq!(app.state, ServiceState::Running);
        assert!(app.outcome_rx.try_recv().is_err());
    }

    #[test]
    fn test_render_logs_rows_in_order() {
        let mut app = app_with(FakeBackend::default());
        app.render_logs(&entries(json!([
            {"id": 1, "details": {"a": 1}, "logTime": "t1"},
            {"id": 2, "details": {"b": 2}, "logTime": "t2"}
        ])));

        assert_eq!(app.rows.len(), 2);
        assert_eq!(
            app.rows[0],
            LogRow {
                id: "1".to_string(),
                details: "{\n  \"a\": 1\n}".to_string(),
                log_time: "t1".to_string(),
            }
        );
        assert_eq!(app.rows[1].id, "2");
        assert_eq!(app.rows[1].log_time, "t2");
    }

    #[test]
    fn test_render_logs_replaces_previous_rows() {
        let mut app = app_with(FakeBackend::default());
        app.render_logs(&entries(json!([
            {"id": "a", "details": {}, "logTime": "t1"},
            {"id": "b", "details": {}, "logTime": "t2"}
        ])));
        app.render_logs(&entries(json!([
            {"id": "c", "details": {"x": [1, 2]}, "logTime": "t3"}
        ])));

        assert_eq!(app.rows.len(), 1);
        assert_eq!(app.rows[0].id, "c");
    }

    #[test]
    fn test_render_empty_logs() {
        let mut app = app_with(FakeBackend::default());
        app.render_logs(&entries(json!([{"id": 1, "details": {}, "logTime": "t"}])));
        app.render_logs(&[]);
        assert!(app.rows.is_empty());
    }

    #[test]
    fn test_fetch_failure_sets_status() {
        let mut app = app_with(FakeBackend::default());
        app.state = ServiceState::Running;
        app.fetch_in_flight = true;
        assert!(!app.controls().fetch_logs);

        app.apply(Outcome::LogsFetched(Err(ClientError::Decode(
            "expected value at line 1 column 1".to_string(),
        ))));

        assert_eq!(
            app.status_message.as_deref(),
            Some("Error fetching logs: invalid response body: expected value at line 1 column 1")
        );
        assert!(app.controls().fetch_logs);
    }

    #[tokio::test]
    async fn test_fetch_click_renders_rows_and_reenables_fetch() {
        use axum::routing::get;
        use axum::{Json, Router};

        let router = Router::new().route(
            "/v1/logs",
            get(|| async {
                Json(json!([
                    {"id": 1, "details": {"a": 1}, "logTime": "t1"},
                    {"id": 2, "details": {"b": 2}, "logTime": "t2"}
                ]))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let client = LogsClient::new(format!("http://{}", addr)).unwrap();
        let mut app = App::new(Arc::new(FakeBackend::default()), client, 2);
        app.state = ServiceState::Running;

        app.on_fetch_logs_click();
        assert!(app.fetch_in_flight);
        assert!(!app.controls().fetch_logs);

        settle(&mut app).await;

        assert!(!app.fetch_in_flight);
        assert!(app.controls().fetch_logs);
        assert_eq!(app.rows.len(), 2);
        assert_eq!(app.rows[0].id, "1");
        assert_eq!(app.rows[0].details, "{\n  \"a\": 1\n}");
        assert_eq!(app.rows[0].log_time, "t1");
        assert_eq!(app.rows[1].id, "2");
        assert_eq!(app.rows[1].log_time, "t2");
        assert!(app.status_message.is_none());

        server.abort();
    }

    #[tokio::test]
    async fn test_fetch_ignored_until_running() {
        let mut app = app_with(FakeBackend::default());
        app.on_fetch_logs_click();
        assert!(!app.fetch_in_flight);
        assert!(app.outcome_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_key_bindings_drive_controls() {
        use crossterm::event::KeyModifiers;

        let mut app = app_with(FakeBackend::default());
        app.handle_key(KeyEvent::new(KeyCode::Char('s'), KeyModifiers::NONE));
        settle(&mut app).await;
        assert_eq!(app.state, ServiceState::Running);

        app.handle_key(KeyEvent::new(KeyCode::Char('?'), KeyModifiers::NONE));
        assert_eq!(app.popup, Popup::Help);
        // Controls are inert behind the help popup
        app.handle_key(KeyEvent::new(KeyCode::Char('x'), KeyModifiers::NONE));
        assert_eq!(app.state, ServiceState::Running);
        app.handle_key(KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE));
        assert_eq!(app.popup, Popup::None);

        app.handle_key(KeyEvent::new(KeyCode::Char('x'), KeyModifiers::NONE));
        settle(&mut app).await;
        assert_eq!(app.state, ServiceState::Stopped);
    }
}
