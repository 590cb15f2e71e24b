//! Input pump: drains the source reader at the media channel's cadence
//! and forwards fixed-duration frames to the transport.

use super::manager::{Component, ComponentError};
use super::stats::Diagnostics;
use crate::adapter::Reader;
use crate::message::{AudioFormat, AudioFrame, ClientMessage, SourceTag};
use crate::transport::Transport;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// How an input pump run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PumpEnd {
    /// Source exhausted; `end_task` was sent. The normal termination path.
    Eof,
    /// Stop signal observed before the source ended
    Stopped,
    /// Reader or transport failure; reported through the error channel
    Failed,
}

pub(crate) struct InputPump {
    pub reader: Box<dyn Reader>,
    pub transport: Arc<dyn Transport>,
    pub format: AudioFormat,
    pub chunk_bytes: usize,
    pub chunk_duration: Duration,
    pub stop_rx: watch::Receiver<bool>,
    pub diagnostics: Arc<Diagnostics>,
    pub errors: mpsc::UnboundedSender<ComponentError>,
}

impl InputPump {
    /// Run until the source ends, the stop signal fires, or a send fails.
    ///
    /// Only a small carry buffer sits between the reader and the
    /// transport; the pump suspends on reads, on transport backpressure,
    /// and on its own pacing sleep.
    pub(crate) async fn run(mut self) -> PumpEnd {
        let mut sequence: u64 = 0;
        let mut carry: Vec<u8> = Vec::with_capacity(self.chunk_bytes * 2);

        loop {
            let read = tokio::select! {
                _ = self.stop_rx.changed() => {
                    debug!("Input pump observed stop signal");
                    return PumpEnd::Stopped;
                }
                read = self.reader.read(self.chunk_bytes) => read,
            };

            match read {
                Err(e) => {
                    warn!("Reader failed: {}", e);
                    let _ = self.errors.send(ComponentError {
                        component: Component::InputPump,
                        target: None,
                        message: e.to_string(),
                    });
                    return PumpEnd::Failed;
                }
                Ok(None) => {
                    // Flush a short trailing chunk, zero-padded to frame size.
                    if !carry.is_empty() {
                        carry.resize(self.chunk_bytes, 0);
                        if let Err(end) = self.send_frame(&mut sequence, std::mem::take(&mut carry)).await {
                            return end;
                        }
                    }
                    info!("Source audio complete after {} frames", sequence);
                    if let Err(e) = self.transport.send_control(ClientMessage::EndTask).await {
                        warn!("Failed to send input-complete marker: {}", e);
                    }
                    return PumpEnd::Eof;
                }
                Ok(Some(bytes)) => {
                    if bytes.is_empty() {
                        continue;
                    }
                    carry.extend_from_slice(&bytes);
                    while carry.len() >= self.chunk_bytes {
                        let rest = carry.split_off(self.chunk_bytes);
                        let chunk = std::mem::replace(&mut carry, rest);
                        if let Err(end) = self.send_frame(&mut sequence, chunk).await {
                            return end;
                        }
                        // Pace at the frame cadence so the service receives
                        // audio at real time.
                        tokio::select! {
                            _ = self.stop_rx.changed() => return PumpEnd::Stopped,
                            _ = tokio::time::sleep(self.chunk_duration) => {}
                        }
                    }
                }
            }
        }
    }

    async fn send_frame(&self, sequence: &mut u64, pcm: Vec<u8>) -> Result<(), PumpEnd> {
        let frame = AudioFrame {
            pcm,
            sample_rate: self.format.sample_rate,
            channels: self.format.channels,
            sequence: *sequence,
            source: SourceTag::Input,
        };
        match self.transport.send_media(frame).await {
            Ok(()) => {
                *sequence += 1;
                self.diagnostics.record_frame_sent();
                Ok(())
            }
            Err(e) => {
                warn!("Media send failed at frame {}: {}", sequence, e);
                let _ = self.errors.send(ComponentError {
                    component: Component::InputPump,
                    target: None,
                    message: e.to_string(),
                });
                Err(PumpEnd::Failed)
            }
        }
    }
}
