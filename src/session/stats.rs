//! Session diagnostics.
//!
//! Nothing dropped by the engine is silent: routing misses, sequence gaps,
//! duplicates and callback failures are all counted here and surfaced in
//! the final [`SessionOutcome`].

use super::manager::SessionState;
use crate::lang::LanguageCode;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared atomic counters, written by the pump/dispatcher/routers and
/// snapshotted on demand.
#[derive(Debug, Default)]
pub struct Diagnostics {
    frames_sent: AtomicU64,
    frames_routed: AtomicU64,
    bytes_written: AtomicU64,
    duplicate_frames: AtomicU64,
    sequence_gaps: AtomicU64,
    unroutable_messages: AtomicU64,
    duplicate_events: AtomicU64,
    events_dispatched: AtomicU64,
    callback_failures: AtomicU64,
}

impl Diagnostics {
    pub fn record_frame_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_routed(&self) {
        self.frames_routed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bytes_written(&self, bytes: u64) {
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_duplicate_frame(&self) {
        self.duplicate_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sequence_gap(&self, missing: u64) {
        self.sequence_gaps.fetch_add(missing, Ordering::Relaxed);
    }

    pub fn record_unroutable(&self) {
        self.unroutable_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate_event(&self) {
        self.duplicate_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_dispatched(&self) {
        self.events_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_callback_failure(&self) {
        self.callback_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, started_at: DateTime<Utc>) -> SessionStats {
        let duration = Utc::now().signed_duration_since(started_at);
        SessionStats {
            started_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_routed: self.frames_routed.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            duplicate_frames: self.duplicate_frames.load(Ordering::Relaxed),
            sequence_gaps: self.sequence_gaps.load(Ordering::Relaxed),
            unroutable_messages: self.unroutable_messages.load(Ordering::Relaxed),
            duplicate_events: self.duplicate_events.load(Ordering::Relaxed),
            events_dispatched: self.events_dispatched.load(Ordering::Relaxed),
            callback_failures: self.callback_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time counters for one session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    /// Media frames pushed to the transport
    pub frames_sent: u64,
    /// Translated frames delivered to writers
    pub frames_routed: u64,
    pub bytes_written: u64,
    /// Inbound frames dropped as duplicate/out-of-order
    pub duplicate_frames: u64,
    /// Frames known missing from sequence gaps
    pub sequence_gaps: u64,
    /// Inbound messages whose tag matched no target
    pub unroutable_messages: u64,
    /// Transcription events dropped by dedup
    pub duplicate_events: u64,
    pub events_dispatched: u64,
    pub callback_failures: u64,
}

/// The single observable result of a session run.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    /// Terminal lifecycle state (`Stopped` or `Errored`)
    pub state: SessionState,
    /// Targets that failed while the rest of the session continued
    pub failed_targets: Vec<LanguageCode>,
    /// Cause, when the whole session failed
    pub error: Option<String>,
    pub stats: SessionStats,
}

impl SessionOutcome {
    pub fn is_success(&self) -> bool {
        self.state == SessionState::Stopped
            && self.failed_targets.is_empty()
            && self.error.is_none()
    }
}
