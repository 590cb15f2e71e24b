//! Inbound routing: one dispatch task demultiplexes the transport's event
//! stream by language tag; one router task per target delivers audio to
//! its writer and transcription events to its callback.

use super::governor::{QueueGovernor, TempoDirective};
use super::manager::{Component, ComponentError};
use super::stats::Diagnostics;
use crate::adapter::Writer;
use crate::config::TranscriptionCallback;
use crate::lang::LanguageCode;
use crate::message::{AudioFrame, ClientMessage, ServerMessage, TranscriptionEvent};
use crate::transport::{Transport, TransportEvent};
use crate::util::CappedSet;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Per-target channel capacity between dispatcher and router.
const ROUTER_BUFFER: usize = 64;

/// Recent-event window for duplicate suppression.
const DEDUP_CAPACITY: usize = 512;

/// Work items handed from the dispatcher to a target's router.
pub(crate) enum RouterItem {
    Frame(AudioFrame),
    Event(TranscriptionEvent),
    QueueStatus(u32),
    /// Remote drain marker; the router finishes after this
    Complete,
}

/// Demultiplexes transport events to per-target routers.
///
/// Runs until the remote signals stream completion or the transport's
/// event stream ends (transport closed). Unroutable or duplicate inbound
/// data is counted, never silently swallowed.
pub(crate) struct Dispatcher {
    pub events: mpsc::Receiver<TransportEvent>,
    pub routes: HashMap<LanguageCode, mpsc::Sender<RouterItem>>,
    pub source_lang: LanguageCode,
    pub source_callback: Option<TranscriptionCallback>,
    pub diagnostics: Arc<Diagnostics>,
}

impl Dispatcher {
    pub(crate) async fn run(mut self) {
        let mut dedup: CappedSet<String> = CappedSet::new(DEDUP_CAPACITY);

        while let Some(event) = self.events.recv().await {
            match event {
                TransportEvent::Media(frame) => self.route_frame(frame).await,
                TransportEvent::Control(msg) => {
                    if self.handle_control(msg, &mut dedup).await {
                        break;
                    }
                }
            }
        }

        // Let every router finish: explicit marker, then channel close.
        for (lang, route) in &self.routes {
            if route.send(RouterItem::Complete).await.is_err() {
                debug!("Router for {} already gone at completion", lang);
            }
        }
        debug!("Inbound dispatch task stopped");
    }

    async fn route_frame(&mut self, frame: AudioFrame) {
        let lang = match &frame.source {
            crate::message::SourceTag::Target(lang) => lang.clone(),
            crate::message::SourceTag::Input => {
                warn!("Dropping inbound frame tagged as input");
                self.diagnostics.record_unroutable();
                return;
            }
        };
        match self.routes.get(&lang) {
            Some(route) => {
                if route.send(RouterItem::Frame(frame)).await.is_err() {
                    self.diagnostics.record_unroutable();
                }
            }
            None => {
                warn!("Dropping frame for unconfigured target {}", lang);
                self.diagnostics.record_unroutable();
            }
        }
    }

    /// Returns true when dispatch should stop.
    async fn handle_control(
        &mut self,
        msg: ServerMessage,
        dedup: &mut CappedSet<String>,
    ) -> bool {
        match msg {
            ServerMessage::Transcription(event) => {
                if !dedup.insert(event.dedup_key()) {
                    self.diagnostics.record_duplicate_event();
                    return false;
                }
                self.route_event(event).await;
                false
            }
            ServerMessage::QueueStatus(status) => {
                match self.routes.get(&status.language) {
                    Some(route) => {
                        let item = RouterItem::QueueStatus(status.current_queue_level_ms);
                        if route.send(item).await.is_err() {
                            self.diagnostics.record_unroutable();
                        }
                    }
                    None => {
                        warn!("Queue status for unconfigured target {}", status.language);
                        self.diagnostics.record_unroutable();
                    }
                }
                false
            }
            ServerMessage::StreamComplete => {
                info!("Remote signaled stream complete");
                true
            }
            ServerMessage::CurrentTask(_) => {
                debug!("Received current task configuration");
                false
            }
            ServerMessage::OutputAudioData { .. } => {
                // Only reaches here untagged; tagged audio arrives as Media.
                warn!("Dropping untagged output audio");
                self.diagnostics.record_unroutable();
                false
            }
            ServerMessage::Unknown { message_type } => {
                debug!("Ignoring unknown message type {:?}", message_type);
                self.diagnostics.record_unroutable();
                false
            }
        }
    }

    async fn route_event(&mut self, event: TranscriptionEvent) {
        // Source-side or untagged events go to the source callback;
        // everything else must match a configured target.
        let target = match &event.language {
            Some(lang) if !event.is_source_side() && lang != &self.source_lang => {
                Some(lang.clone())
            }
            _ => None,
        };
        let Some(lang) = target else {
            if let Some(callback) = &self.source_callback {
                invoke_callback(callback, event, &self.diagnostics);
            }
            return;
        };

        match self.routes.get(&lang) {
            Some(route) => {
                if route.send(RouterItem::Event(event)).await.is_err() {
                    self.diagnostics.record_unroutable();
                }
            }
            None => {
                warn!(
                    "Dropping {} event for unconfigured target {}",
                    event.kind.as_str(),
                    lang
                );
                self.diagnostics.record_unroutable();
            }
        }
    }
}

/// Open a dispatcher route for one target.
pub(crate) fn router_channel() -> (mpsc::Sender<RouterItem>, mpsc::Receiver<RouterItem>) {
    mpsc::channel(ROUTER_BUFFER)
}

/// Per-target output pipeline: writer delivery, callback dispatch, and
/// queue accounting for one language.
pub(crate) struct OutputRouter {
    pub lang: LanguageCode,
    pub items: mpsc::Receiver<RouterItem>,
    pub writer: Option<Box<dyn Writer>>,
    pub callback: Option<TranscriptionCallback>,
    pub governor: QueueGovernor,
    pub transport: Arc<dyn Transport>,
    pub diagnostics: Arc<Diagnostics>,
    pub errors: mpsc::UnboundedSender<ComponentError>,
}

impl OutputRouter {
    /// Consume until completion, then close the writer.
    pub(crate) async fn run(mut self) {
        let mut last_sequence: Option<u64> = None;
        let mut frames_delivered: u64 = 0;

        while let Some(item) = self.items.recv().await {
            match item {
                RouterItem::Frame(frame) => {
                    if !self.check_sequence(&mut last_sequence, frame.sequence) {
                        continue;
                    }
                    if let Some(directive) = self.governor.on_frame_bytes(frame.pcm.len()) {
                        self.send_tempo(directive).await;
                    }
                    if self.write_frame(&frame).await {
                        frames_delivered += 1;
                    }
                }
                RouterItem::Event(event) => {
                    if let Some(callback) = &self.callback {
                        invoke_callback(callback, event, &self.diagnostics);
                    }
                }
                RouterItem::QueueStatus(current_ms) => {
                    if let Some(directive) = self.governor.on_queue_status(current_ms) {
                        self.send_tempo(directive).await;
                    }
                }
                RouterItem::Complete => break,
            }
        }

        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writer.close().await {
                warn!("Closing writer for {} failed: {}", self.lang, e);
            }
        }
        debug!(
            "Router for {} stopped after {} frames",
            self.lang, frames_delivered
        );
    }

    /// Enforce per-target ordering: duplicates dropped, gaps skipped but
    /// never allowed to stall delivery.
    fn check_sequence(&mut self, last: &mut Option<u64>, sequence: u64) -> bool {
        match *last {
            Some(prev) if sequence <= prev => {
                warn!(
                    "Duplicate or out-of-order frame for {}: {} after {}",
                    self.lang, sequence, prev
                );
                self.diagnostics.record_duplicate_frame();
                false
            }
            Some(prev) => {
                if sequence > prev + 1 {
                    let missing = sequence - prev - 1;
                    warn!(
                        "Sequence gap for {}: {} frame(s) missing before {}",
                        self.lang, missing, sequence
                    );
                    self.diagnostics.record_sequence_gap(missing);
                }
                *last = Some(sequence);
                true
            }
            None => {
                *last = Some(sequence);
                true
            }
        }
    }

    /// Returns true when the frame reached the writer.
    async fn write_frame(&mut self, frame: &AudioFrame) -> bool {
        let Some(writer) = self.writer.as_mut() else {
            return false; // no writer configured, or it already failed
        };
        match writer.write(&frame.pcm).await {
            Ok(()) => {
                self.diagnostics.record_frame_routed();
                self.diagnostics.record_bytes_written(frame.pcm.len() as u64);
                true
            }
            Err(e) => {
                warn!("Writer for {} failed: {}", self.lang, e);
                let _ = self.errors.send(ComponentError {
                    component: Component::OutputRouter,
                    target: Some(self.lang.clone()),
                    message: e.to_string(),
                });
                // Keep consuming so other targets and the input side are
                // unaffected, but stop writing to the dead sink.
                self.writer = None;
                false
            }
        }
    }

    async fn send_tempo(&self, directive: TempoDirective) {
        let tempo = match directive {
            TempoDirective::SlowDown(tempo) => tempo,
            TempoDirective::Resume => 1.0,
        };
        let msg = ClientMessage::SetSpeechTempo {
            target_language: self.lang.clone(),
            tempo,
        };
        if let Err(e) = self.transport.send_control(msg).await {
            warn!("Tempo directive for {} not sent: {}", self.lang, e);
        }
    }
}

/// Dispatch one event to a callback without letting the callback take the
/// router down or stall it unboundedly: blocking callbacks run inline
/// (documented not to block on I/O), scheduled callbacks are spawned and
/// never awaited.
pub(crate) fn invoke_callback(
    callback: &TranscriptionCallback,
    event: TranscriptionEvent,
    diagnostics: &Arc<Diagnostics>,
) {
    match callback {
        TranscriptionCallback::Blocking(f) => {
            let f = f.clone();
            if catch_unwind(AssertUnwindSafe(|| f(event))).is_err() {
                warn!("Transcription callback panicked");
                diagnostics.record_callback_failure();
            } else {
                diagnostics.record_event_dispatched();
            }
        }
        TranscriptionCallback::Scheduled(f) => {
            let future = f(event);
            tokio::spawn(future);
            diagnostics.record_event_dispatched();
        }
    }
}
