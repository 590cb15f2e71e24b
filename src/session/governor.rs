//! Queue governor: tracks buffered-but-unplayed audio per target and
//! decides when to ask the remote synthesis stage to change tempo.

use crate::config::QueueConfig;
use crate::lang::LanguageCode;
use crate::message::AudioFormat;
use std::time::Instant;
use tracing::debug;

/// Which side of the configured thresholds the estimate currently sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueBand {
    BelowDesired,
    WithinBand,
    AboveMax,
}

/// Tempo directive produced by the governor, sent as a
/// `set_speech_tempo` control message by its driver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TempoDirective {
    SlowDown(f64),
    Resume,
}

/// Buffered-audio accounting for one target. Owned by that target's
/// router task; read-only everywhere else.
#[derive(Debug, Clone)]
pub struct QueueState {
    pub estimate_ms: f64,
    pub band: QueueBand,
    pub last_directive: Option<TempoDirective>,
}

/// Per-target queue governor.
///
/// Bytes received are converted to playback milliseconds and drained at
/// real time; a `queue_status` report from the remote replaces the local
/// estimate. Signaling is debounced: after a slow-down, the estimate must
/// fall back through the desired threshold before the governor may signal
/// again.
pub struct QueueGovernor {
    lang: LanguageCode,
    config: QueueConfig,
    format: AudioFormat,
    estimate_ms: f64,
    last_update: Instant,
    band: QueueBand,
    last_directive: Option<TempoDirective>,
    /// A slow-down was sent and not yet resumed
    slowdown_active: bool,
    /// May signal a slow-down on the next crossing of max
    armed: bool,
}

impl QueueGovernor {
    pub fn new(lang: LanguageCode, config: QueueConfig, format: AudioFormat) -> Self {
        Self {
            lang,
            config,
            format,
            estimate_ms: 0.0,
            last_update: Instant::now(),
            band: QueueBand::BelowDesired,
            last_directive: None,
            slowdown_active: false,
            armed: true,
        }
    }

    pub fn state(&self) -> QueueState {
        QueueState {
            estimate_ms: self.estimate_ms,
            band: self.band,
            last_directive: self.last_directive,
        }
    }

    /// Account one received frame of `bytes` PCM.
    pub fn on_frame_bytes(&mut self, bytes: usize) -> Option<TempoDirective> {
        self.drain_elapsed();
        let bytes_per_ms = self.format.bytes_per_ms();
        if bytes_per_ms > 0 {
            self.estimate_ms += bytes as f64 / bytes_per_ms as f64;
        }
        self.evaluate()
    }

    /// Adopt the remote's own report of its buffered level.
    pub fn on_queue_status(&mut self, current_ms: u32) -> Option<TempoDirective> {
        self.estimate_ms = current_ms as f64;
        self.last_update = Instant::now();
        self.evaluate()
    }

    /// Model playback: buffered audio drains at 1x real time.
    fn drain_elapsed(&mut self) {
        let now = Instant::now();
        let elapsed_ms = now.duration_since(self.last_update).as_secs_f64() * 1000.0;
        self.last_update = now;
        self.estimate_ms = (self.estimate_ms - elapsed_ms).max(0.0);
    }

    fn evaluate(&mut self) -> Option<TempoDirective> {
        let desired = self.config.desired_queue_level_ms as f64;
        let max = self.config.max_queue_level_ms as f64;

        self.band = if self.estimate_ms < desired {
            QueueBand::BelowDesired
        } else if self.estimate_ms > max {
            QueueBand::AboveMax
        } else {
            QueueBand::WithinBand
        };

        if !self.config.auto_tempo {
            return None;
        }

        match self.band {
            QueueBand::AboveMax if self.armed && !self.slowdown_active => {
                self.slowdown_active = true;
                self.armed = false;
                let directive = TempoDirective::SlowDown(self.config.slowdown_tempo);
                self.last_directive = Some(directive);
                debug!(
                    "Queue for {} at {:.0} ms (max {:.0}), requesting slower tempo",
                    self.lang, self.estimate_ms, max
                );
                Some(directive)
            }
            QueueBand::BelowDesired => {
                self.armed = true;
                if self.slowdown_active {
                    self.slowdown_active = false;
                    let directive = TempoDirective::Resume;
                    self.last_directive = Some(directive);
                    debug!(
                        "Queue for {} back to {:.0} ms, resuming normal tempo",
                        self.lang, self.estimate_ms
                    );
                    Some(directive)
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn governor(auto_tempo: bool) -> QueueGovernor {
        QueueGovernor::new(
            LanguageCode::es(),
            QueueConfig {
                desired_queue_level_ms: 5000,
                max_queue_level_ms: 20000,
                auto_tempo,
                slowdown_tempo: 0.8,
            },
            AudioFormat::default(),
        )
    }

    #[test]
    fn never_signals_without_auto_tempo() {
        let mut gov = governor(false);
        assert_eq!(gov.on_queue_status(50_000), None);
        assert_eq!(gov.on_queue_status(100_000), None);
        assert_eq!(gov.state().band, QueueBand::AboveMax);
        assert_eq!(gov.state().last_directive, None);
    }

    #[test]
    fn one_slowdown_per_crossing() {
        let mut gov = governor(true);
        assert_eq!(
            gov.on_queue_status(25_000),
            Some(TempoDirective::SlowDown(0.8))
        );
        // Still above max: no repeat
        assert_eq!(gov.on_queue_status(30_000), None);
        // Back into the band: still nothing, must cross desired first
        assert_eq!(gov.on_queue_status(10_000), None);
        // Above max again without dipping below desired: still debounced
        assert_eq!(gov.on_queue_status(26_000), None);
        // Below desired: exactly one resume
        assert_eq!(gov.on_queue_status(1_000), Some(TempoDirective::Resume));
        assert_eq!(gov.on_queue_status(500), None);
        // Re-armed: next crossing signals again
        assert_eq!(
            gov.on_queue_status(21_000),
            Some(TempoDirective::SlowDown(0.8))
        );
    }

    #[test]
    fn frame_accounting_accumulates_duration() {
        let mut gov = governor(true);
        // 16 kHz mono PCM16 = 32 bytes/ms; one second of audio per frame
        for _ in 0..21 {
            gov.on_frame_bytes(32_000);
        }
        // 21s buffered (minus sub-ms decay) crosses the 20s max
        assert_eq!(
            gov.state().last_directive,
            Some(TempoDirective::SlowDown(0.8))
        );
    }

    #[test]
    fn no_resume_without_prior_slowdown() {
        let mut gov = governor(true);
        assert_eq!(gov.on_queue_status(10_000), None);
        assert_eq!(gov.on_queue_status(1_000), None);
    }
}
