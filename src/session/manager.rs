//! Session manager: owns the transport, the input pump, and the set of
//! output routers, and drives the lifecycle state machine.
//!
//! States move monotonically: `Idle -> Connecting -> Streaming ->
//! Draining -> Stopped`, with `Errored` reachable from any non-terminal
//! state. `start()` is not reentrant; `stop()` is idempotent and always
//! returns the same terminal outcome.

use super::governor::QueueGovernor;
use super::pump::{InputPump, PumpEnd};
use super::router::{router_channel, Dispatcher, OutputRouter};
use super::stats::{Diagnostics, SessionOutcome, SessionStats};
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::lang::LanguageCode;
use crate::message::ClientMessage;
use crate::transport::{NetConnector, Transport, TransportConnector};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Streaming,
    Draining,
    Stopped,
    Errored,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Idle => "Idle",
            SessionState::Connecting => "Connecting",
            SessionState::Streaming => "Streaming",
            SessionState::Draining => "Draining",
            SessionState::Stopped => "Stopped",
            SessionState::Errored => "Errored",
        };
        f.write_str(name)
    }
}

/// Which engine component raised an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    InputPump,
    OutputRouter,
    Dispatcher,
    Transport,
}

/// A component-local failure reported to the session's aggregation point.
#[derive(Debug, Clone)]
pub struct ComponentError {
    pub component: Component,
    /// Set when the failure is scoped to one target language
    pub target: Option<LanguageCode>,
    pub message: String,
}

struct Running {
    transport: Arc<dyn Transport>,
    pump: JoinHandle<PumpEnd>,
    dispatcher: JoinHandle<()>,
    routers: Vec<(LanguageCode, JoinHandle<()>)>,
    errors: mpsc::UnboundedReceiver<ComponentError>,
    drain_timeout: Duration,
    fail_fast: bool,
}

/// One run of the engine: a single source stream translated into one or
/// more target streams.
pub struct Session {
    session_id: String,
    config: Option<SessionConfig>,
    connector: Box<dyn TransportConnector>,
    state: SessionState,
    started_at: DateTime<Utc>,
    diagnostics: Arc<Diagnostics>,
    stop_tx: watch::Sender<bool>,
    running: Option<Running>,
    outcome: Option<SessionOutcome>,
}

impl Session {
    /// Create a session that will connect per the config's transport.
    pub fn new(config: SessionConfig) -> Self {
        let connector = Box::new(NetConnector::new(config.transport.clone(), config.format));
        Self::with_connector(config, connector)
    }

    /// Create a session with a caller-supplied connector (used by tests
    /// and embedders with bespoke transports).
    pub fn with_connector(config: SessionConfig, connector: Box<dyn TransportConnector>) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            session_id: config.session_id.clone(),
            config: Some(config),
            connector,
            state: SessionState::Idle,
            started_at: Utc::now(),
            diagnostics: Arc::new(Diagnostics::default()),
            stop_tx,
            running: None,
            outcome: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> SessionStats {
        self.diagnostics.snapshot(self.started_at)
    }

    /// Validate configuration, open the transport, and start streaming.
    ///
    /// Fails without starting anything on configuration errors, and with
    /// nothing but the connect attempt made on connect errors.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::NotIdle {
                state: self.state.to_string(),
            });
        }
        let Some(mut config) = self.config.take() else {
            return Err(SessionError::NotIdle {
                state: self.state.to_string(),
            });
        };

        self.started_at = Utc::now();
        info!("Starting session {}", self.session_id);

        if let Err(e) = config.validate() {
            error!("Configuration invalid: {}", e);
            self.fail(e.to_string());
            return Err(e.into());
        }

        self.state = SessionState::Connecting;
        let mut transport = match self.connector.connect().await {
            Ok(transport) => transport,
            Err(e) => {
                error!("Transport connect failed: {}", e);
                self.fail(e.to_string());
                return Err(e.into());
            }
        };

        let Some(events) = transport.take_events() else {
            let message = "transport produced no event stream".to_string();
            transport.close().await;
            self.fail(message.clone());
            return Err(SessionError::Transport(message));
        };
        let transport: Arc<dyn Transport> = Arc::from(transport);

        // Describe the pipeline before any audio flows.
        let set_task = ClientMessage::SetTask(config.to_pipeline_json());
        if let Err(e) = transport.send_control(set_task).await {
            error!("Failed to send pipeline configuration: {}", e);
            transport.close().await;
            self.fail(e.to_string());
            return Err(SessionError::Transport(e.to_string()));
        }

        let (error_tx, error_rx) = mpsc::unbounded_channel();
        let drain_timeout = config.drain_timeout;
        let fail_fast = config.fail_fast;
        let format = config.format;
        let chunk_bytes = config.chunk_bytes();
        let chunk_duration = Duration::from_millis(config.chunk_duration_ms as u64);
        let global_queue = config.queue.clone();

        // One router task and queue governor per target.
        let mut routes = HashMap::new();
        let mut routers = Vec::new();
        for mut target in std::mem::take(&mut config.targets) {
            let queue = target.queue.clone().unwrap_or_else(|| global_queue.clone());
            let (route_tx, route_rx) = router_channel();
            routes.insert(target.lang.clone(), route_tx);

            let router = OutputRouter {
                lang: target.lang.clone(),
                items: route_rx,
                writer: target.writer.take(),
                callback: target.on_transcription.take(),
                governor: QueueGovernor::new(target.lang.clone(), queue, format),
                transport: Arc::clone(&transport),
                diagnostics: Arc::clone(&self.diagnostics),
                errors: error_tx.clone(),
            };
            routers.push((target.lang.clone(), tokio::spawn(router.run())));
        }

        // Inbound dispatch task demultiplexes the event stream by tag.
        let dispatcher = Dispatcher {
            events,
            routes,
            source_lang: config.source.lang.clone(),
            source_callback: config.source.on_transcription.take(),
            diagnostics: Arc::clone(&self.diagnostics),
        };
        let dispatcher = tokio::spawn(dispatcher.run());

        // Input pump, started last so nothing flows into a half-built set
        // of routers.
        let pump = InputPump {
            reader: config.source.reader,
            transport: Arc::clone(&transport),
            format,
            chunk_bytes,
            chunk_duration,
            stop_rx: self.stop_tx.subscribe(),
            diagnostics: Arc::clone(&self.diagnostics),
            errors: error_tx,
        };
        let pump = tokio::spawn(pump.run());

        self.running = Some(Running {
            transport,
            pump,
            dispatcher,
            routers,
            errors: error_rx,
            drain_timeout,
            fail_fast,
        });
        self.state = SessionState::Streaming;
        info!("Session {} streaming", self.session_id);
        Ok(())
    }

    /// Drive the session to completion and return its outcome.
    pub async fn wait(&mut self) -> SessionOutcome {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }
        let Some(mut running) = self.running.take() else {
            // Never started; terminal by definition.
            return self.finish(SessionState::Stopped, Vec::new(), None);
        };

        let mut collected: Vec<ComponentError> = Vec::new();

        // Streaming phase: ends when the pump finishes (source exhausted,
        // stop signal, or pump failure).
        let pump_end = loop {
            tokio::select! {
                end = &mut running.pump => {
                    break end.unwrap_or_else(|e| {
                        error!("Input pump panicked: {}", e);
                        PumpEnd::Failed
                    });
                }
                Some(err) = running.errors.recv() => {
                    self.note_error(&err, running.fail_fast, &mut collected);
                }
            }
        };

        // Draining phase: in-flight inbound keeps routing until the remote
        // signals completion or the drain timeout forces the transport shut.
        self.state = SessionState::Draining;
        debug!("Session {} draining (pump end: {:?})", self.session_id, pump_end);

        let routers = std::mem::take(&mut running.routers);
        let dispatcher = running.dispatcher;
        let mut drain = Box::pin(async move {
            if let Err(e) = dispatcher.await {
                error!("Dispatch task panicked: {}", e);
            }
            for (lang, handle) in routers {
                if let Err(e) = handle.await {
                    error!("Router for {} panicked: {}", lang, e);
                }
            }
        });

        let deadline = Instant::now() + running.drain_timeout;
        let mut timed_out = false;
        loop {
            tokio::select! {
                _ = &mut drain => break,
                Some(err) = running.errors.recv() => {
                    self.note_error(&err, running.fail_fast, &mut collected);
                }
                _ = tokio::time::sleep_until(deadline), if !timed_out => {
                    warn!("Drain timeout for session {}, closing transport", self.session_id);
                    timed_out = true;
                    // Ends the event stream; dispatcher and routers unwind.
                    running.transport.close().await;
                }
            }
        }

        running.transport.close().await;
        while let Ok(err) = running.errors.try_recv() {
            collected.push(err);
        }

        let mut failed_targets: Vec<LanguageCode> = Vec::new();
        for err in &collected {
            if let Some(lang) = &err.target {
                if !failed_targets.contains(lang) {
                    failed_targets.push(lang.clone());
                }
            }
        }
        // A pump failure is contained to the input side; the session still
        // drains and stops, and the cause is carried in the outcome.
        let session_error = collected
            .iter()
            .find(|e| e.target.is_none())
            .map(|e| e.message.clone());

        self.finish(SessionState::Stopped, failed_targets, session_error)
    }

    /// Request an orderly stop and wait for the terminal outcome.
    ///
    /// Safe to call at any time and from any state; repeated calls return
    /// the same outcome.
    pub async fn stop(&mut self) -> SessionOutcome {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }
        let _ = self.stop_tx.send(true);
        self.wait().await
    }

    /// Convenience: start, then run to completion.
    pub async fn run(&mut self) -> Result<SessionOutcome, SessionError> {
        self.start().await?;
        Ok(self.wait().await)
    }

    fn note_error(
        &self,
        err: &ComponentError,
        fail_fast: bool,
        collected: &mut Vec<ComponentError>,
    ) {
        warn!(
            "Component error from {:?}{}: {}",
            err.component,
            err.target
                .as_ref()
                .map(|l| format!(" ({l})"))
                .unwrap_or_default(),
            err.message
        );
        collected.push(err.clone());
        if fail_fast {
            info!("Fail-fast enabled, stopping session {}", self.session_id);
            let _ = self.stop_tx.send(true);
        }
    }

    fn fail(&mut self, message: String) -> SessionOutcome {
        let outcome = SessionOutcome {
            state: SessionState::Errored,
            failed_targets: Vec::new(),
            error: Some(message),
            stats: self.diagnostics.snapshot(self.started_at),
        };
        self.state = SessionState::Errored;
        self.outcome = Some(outcome.clone());
        outcome
    }

    fn finish(
        &mut self,
        state: SessionState,
        failed_targets: Vec<LanguageCode>,
        error: Option<String>,
    ) -> SessionOutcome {
        let stats = self.diagnostics.snapshot(self.started_at);
        info!(
            "Session {} {}: {} frames sent, {} frames routed, {} events, \
             {} unroutable, {} gaps",
            self.session_id,
            state,
            stats.frames_sent,
            stats.frames_routed,
            stats.events_dispatched,
            stats.unroutable_messages,
            stats.sequence_gaps,
        );
        let outcome = SessionOutcome {
            state,
            failed_targets,
            error,
            stats,
        };
        self.state = state;
        self.outcome = Some(outcome.clone());
        outcome
    }
}
