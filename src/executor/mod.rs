//! Queued command execution
//!
//! Commands arrive over the HTTP API and run one at a time on a worker task.
//! Only whitelisted programs run; a leading `sudo` is stripped, never honored.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::ExecutorError;

pub const QUEUE_CAPACITY: usize = 100;
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
const HEARTBEAT_DEADLINE: Duration = Duration::from_secs(120);

const COMMAND_WHITELIST: &[&str] = &["touch", "mkdir"];

pub struct CommandExecutor {
    sender: mpsc::Sender<String>,
    receiver: Mutex<Option<mpsc::Receiver<String>>>,
    heartbeat: Arc<Mutex<Option<Instant>>>,
    task: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl Default for CommandExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandExecutor {
    pub fn new() -> Self {
        Self::with_capacity(QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
            heartbeat: Arc::new(Mutex::new(None)),
            task: Mutex::new(None),
        }
    }

    /// Spawn the worker task. Calling it twice is a no-op.
    pub fn start(&self, parent: &CancellationToken) {
        let Some(receiver) = self.receiver.lock().ok().and_then(|mut r| r.take()) else {
            tracing::warn!("Command executor already started");
            return;
        };

        let token = parent.child_token();
        let handle = tokio::spawn(worker(receiver, token.clone(), Arc::clone(&self.heartbeat)));

        if let Ok(mut task) = self.task.lock() {
            *task = Some((token, handle));
        }
    }

    /// Stop the worker after it drains whatever is still queued
    pub async fn stop(&self) -> Result<(), ExecutorError> {
        let task = self.task.lock().ok().and_then(|mut t| t.take());
        if let Some((token, handle)) = task {
            token.cancel();
            handle
                .await
                .map_err(|e| ExecutorError::Execution(format!("worker task failed: {}", e)))?;
        }
        Ok(())
    }

    pub fn is_worker_thread_alive(&self) -> bool {
        self.heartbeat
            .lock()
            .ok()
            .and_then(|h| *h)
            .map(|beat| beat.elapsed() < HEARTBEAT_DEADLINE)
            .unwrap_or(false)
    }

    #[cfg(test)]
    pub(crate) fn receiver_for_test(&self) -> std::sync::MutexGuard<'_, Option<mpsc::Receiver<String>>> {
        self.receiver.lock().unwrap()
    }

    /// Queue commands in order, waiting for room when the queue is full
    pub async fn add_commands(&self, commands: Vec<String>) -> Result<(), ExecutorError> {
        for command in commands {
            self.sender
                .send(command)
                .await
                .map_err(|_| ExecutorError::QueueClosed)?;
        }
        Ok(())
    }
}

async fn worker(
    mut receiver: mpsc::Receiver<String>,
    token: CancellationToken,
    heartbeat: Arc<Mutex<Option<Instant>>>,
) {
    let beat = || {
        if let Ok(mut beat) = heartbeat.lock() {
            *beat = Some(Instant::now());
        }
    };
    beat();

    let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                tracing::info!("command-executor-shutdown");
                break;
            }
            _ = ticker.tick() => beat(),
            command = receiver.recv() => match command {
                Some(command) => run_logged(&command).await,
                None => break,
            },
        }
    }

    // Process everything queued before shutdown, then refuse new work
    receiver.close();
    while let Some(command) = receiver.recv().await {
        run_logged(&command).await;
    }
}

async fn run_logged(input: &str) {
    match execute_command(input).await {
        Ok(()) => tracing::info!("Executed command: {}", input),
        Err(e) => tracing::error!("error-executing-command: {}", e),
    }
}

fn is_command_whitelisted(command: &str) -> bool {
    COMMAND_WHITELIST.contains(&command)
}

/// Split `input` into program and arguments, dropping a leading `sudo`
fn parse_command(input: &str) -> Result<(String, Vec<String>), ExecutorError> {
    let mut tokens = input.split_whitespace();
    let mut command = tokens.next().ok_or(ExecutorError::NoCommand)?;

    if command.eq_ignore_ascii_case("sudo") {
        command = tokens.next().ok_or(ExecutorError::NoCommandAfterSudo)?;
    }

    Ok((command.to_string(), tokens.map(str::to_string).collect()))
}

async fn execute_command(input: &str) -> Result<(), ExecutorError> {
    let (command, args) = parse_command(input)?;

    if !is_command_whitelisted(&command) {
        return Err(ExecutorError::NotWhitelisted(command));
    }

    let status = tokio::process::Command::new(&command)
        .args(&args)
        .status()
        .await
        .map_err(|e| ExecutorError::Execution(e.to_string()))?;

    if !status.success() {
        return Err(ExecutorError::Execution(format!("{} exited with {}", command, status)));
    }

    Ok(())
}
