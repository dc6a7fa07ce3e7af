// Command session: the single entry point above the core.
//
// A session owns one bridge client, one state cache and the event task that
// keeps it current. Light commands go through the executor; introspection
// commands are answered from the cache without contacting the bridge.

mod format;

use crate::config::HueConfig;
use crate::executor::{CommandExecutor, ExecutionStatus};
use crate::interpreter::{Action, Interpreter, ListKind, HELP_TEXT};
use crate::rate_limit::RateGovernor;
use crate::resolver::{Resolver, Target};
use crate::state::{CacheSummary, MetricsSnapshot, StateCache};
use crate::transport::BridgeClient;
use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Shown once the bridge has rejected the application key.
pub const REPAIR_MESSAGE: &str = "The bridge rejected the application key. \
Press the link button on the bridge and pair again, then restart huectl.";

/// Result of one command line.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CommandResponse {
    pub message: String,
    pub status: ExecutionStatus,
    /// Lights (or resources, for introspection) the response is about
    pub targets: Vec<String>,
}

impl CommandResponse {
    fn success(message: impl Into<String>, targets: Vec<String>) -> Self {
        Self {
            message: message.into(),
            status: ExecutionStatus::Success,
            targets,
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: ExecutionStatus::Failure,
            targets: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }
}

/// Event stream state as seen by the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    Disabled,
    Connected,
    Reconnecting,
    /// Stopped after the bridge rejected the application key
    Rejected,
}

/// Connectivity and cache overview, read without contacting the bridge.
#[derive(Clone, Debug, Serialize)]
pub struct StatusReport {
    pub bridge: String,
    pub stream: StreamStatus,
    pub auth_failed: bool,
    pub cache: CacheSummary,
    pub metrics: MetricsSnapshot,
}

pub struct Session {
    config: HueConfig,
    client: Arc<BridgeClient>,
    cache: Arc<StateCache>,
    interpreter: Interpreter,
    executor: CommandExecutor,
    auth_failed: AtomicBool,
    subscriber: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Build every component and load the initial state from the bridge.
    pub async fn connect(config: HueConfig) -> Result<Self> {
        let governor = Arc::new(RateGovernor::new(config.rate_limit.clone()));
        let client = BridgeClient::new(&config.bridge, config.events.clone(), governor)
            .context("Failed to create bridge client")?;
        let client = Arc::new(client);

        info!(bridge = %client.base_url(), "Connecting to bridge");

        let cache = Arc::new(StateCache::new());
        let generation = cache
            .sync(&client)
            .await
            .with_context(|| format!("Initial sync with {} failed", client.base_url()))?;

        let summary = cache.snapshot().summary();
        info!(
            generation = generation,
            lights = summary.lights,
            rooms = summary.rooms,
            zones = summary.zones,
            scenes = summary.scenes,
            "Bridge state loaded"
        );

        let interpreter = Interpreter::new(config.executor.interpreter_config());
        let executor = CommandExecutor::new(
            Arc::clone(&cache),
            Resolver::new(config.resolver.clone()),
            Arc::clone(&client),
            config.executor.clone(),
        );

        Ok(Self {
            config,
            client,
            cache,
            interpreter,
            executor,
            auth_failed: AtomicBool::new(false),
            subscriber: Mutex::new(None),
        })
    }

    /// Start the event stream task, if enabled. Calling it twice is a no-op.
    pub fn start(&self) {
        if !self.config.events.enabled {
            info!("Event stream disabled, cache refreshes only on demand");
            return;
        }

        let mut slot = self.subscriber.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        let subscription = self.client.subscribe_events();
        let cache = Arc::clone(&self.cache);
        *slot = Some(tokio::spawn(cache.run_subscriber(subscription)));
    }

    /// Stop the event stream task and close its connection.
    pub fn shutdown(&self) {
        let handle = self
            .subscriber
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            // Aborting drops the subscription, which aborts the stream task
            handle.abort();
            info!("Event stream stopped");
        }
    }

    pub fn cache(&self) -> &Arc<StateCache> {
        &self.cache
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }

    pub fn executor(&self) -> &CommandExecutor {
        &self.executor
    }

    /// True once a command, a refresh or the event stream was refused for
    /// bad credentials.
    pub fn auth_failed(&self) -> bool {
        if self.auth_failed.load(Ordering::SeqCst) {
            return true;
        }
        if self.cache.metrics().is_stream_rejected() {
            self.latch_auth_failure();
            return true;
        }
        false
    }

    /// Interpret and carry out one line of free text.
    pub async fn handle_line(&self, line: &str) -> CommandResponse {
        let intent = match self.interpreter.parse(line) {
            Ok(intent) => intent,
            Err(failure) => return CommandResponse::failure(failure.to_string()),
        };

        match &intent.action {
            Action::Help => CommandResponse::success(HELP_TEXT, Vec::new()),
            Action::List { kind } => self.list(*kind),
            Action::Status => self.status(&intent.target),
            Action::Refresh => match self.refresh().await {
                Ok(_) => {
                    let summary = self.cache.snapshot().summary();
                    CommandResponse::success(
                        format!("Refreshed: {}", format::summary_line(&summary)),
                        Vec::new(),
                    )
                }
                Err(e) => CommandResponse::failure(format!("{:#}", e)),
            },
            _ => {
                if self.auth_failed() {
                    return CommandResponse::failure(REPAIR_MESSAGE);
                }
                match self.executor.execute(&intent).await {
                    Ok(report) => {
                        if report.has_auth_failure() {
                            self.latch_auth_failure();
                        }
                        CommandResponse {
                            message: report.message,
                            status: report.status,
                            targets: report.affected,
                        }
                    }
                    Err(e) => CommandResponse::failure(e.to_string()),
                }
            }
        }
    }

    /// Re-run a full sync. Refused after an auth failure.
    pub async fn refresh(&self) -> Result<u64> {
        if self.auth_failed() {
            anyhow::bail!(REPAIR_MESSAGE);
        }
        match self.cache.sync(&self.client).await {
            Ok(generation) => Ok(generation),
            Err(e) if e.is_auth() => {
                self.latch_auth_failure();
                anyhow::bail!(REPAIR_MESSAGE)
            }
            Err(e) => Err(anyhow::Error::new(e).context("Refresh failed")),
        }
    }

    /// Connectivity and cache overview from local state only.
    pub fn introspect(&self) -> StatusReport {
        let metrics = self.cache.metrics().snapshot();
        let stream = if !self.config.events.enabled {
            StreamStatus::Disabled
        } else if metrics.stream_rejected {
            StreamStatus::Rejected
        } else if metrics.stream_connected {
            StreamStatus::Connected
        } else {
            StreamStatus::Reconnecting
        };
        StatusReport {
            bridge: self.client.base_url().to_string(),
            stream,
            auth_failed: self.auth_failed(),
            cache: self.cache.snapshot().summary(),
            metrics,
        }
    }

    fn latch_auth_failure(&self) {
        if !self.auth_failed.swap(true, Ordering::SeqCst) {
            error!("Bridge rejected the application key, refusing further commands");
        }
    }

    fn list(&self, kind: ListKind) -> CommandResponse {
        let arena = self.cache.snapshot();
        let (title, lines): (&str, Vec<String>) = match kind {
            ListKind::Lights => ("Lights", arena.lights().into_iter().map(format::light_line).collect()),
            ListKind::Rooms => (
                "Rooms",
                arena.rooms().into_iter().map(|g| format::group_line(&arena, g)).collect(),
            ),
            ListKind::Zones => (
                "Zones",
                arena.zones().into_iter().map(|g| format::group_line(&arena, g)).collect(),
            ),
            ListKind::Scenes => (
                "Scenes",
                arena.scenes().into_iter().map(|s| format::scene_line(&arena, s)).collect(),
            ),
        };
        CommandResponse::success(format::listing(title, &lines), Vec::new())
    }

    fn status(&self, phrase: &str) -> CommandResponse {
        if phrase.is_empty() {
            return CommandResponse::success(format::status_report(&self.introspect()), Vec::new());
        }

        let arena = self.cache.snapshot();
        let target = match self.executor.resolve(&arena, phrase) {
            Ok(target) => target,
            Err(e) => return CommandResponse::failure(e.to_string()),
        };
        let lights = arena.lights_for(&target);
        let names: Vec<String> = lights.iter().map(|l| l.name.clone()).collect();

        let message = match &target {
            Target::Light { .. } => lights
                .first()
                .map(|l| format::light_line(l))
                .unwrap_or_else(|| format!("{} is not in the cache", target.name())),
            _ => {
                let on = lights.iter().filter(|l| l.on).count();
                let header = format!("{}: {} of {} lights on", target, on, lights.len());
                let lines: Vec<String> = lights.iter().map(|l| format::light_line(l)).collect();
                format::listing(&header, &lines)
            }
        };
        CommandResponse::success(message, names)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}
