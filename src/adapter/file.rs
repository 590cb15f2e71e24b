//! File adapters: decode any supported container to session PCM on the way
//! in, write a WAV on the way out.

use super::{Reader, Writer};
use crate::error::{ReaderError, WriteError};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{info, warn};

/// Reads an audio file (M4A, MP3, WAV, FLAC, OGG, ...) and serves it as
/// mono PCM16 at the session sample rate.
///
/// The whole file is decoded up front; `read` then hands out chunks until
/// the data is exhausted.
pub struct FileReader {
    pcm: Vec<u8>,
    position: usize,
    eof: bool,
}

impl FileReader {
    /// Open and decode `path`, converting to mono PCM16 at `target_sample_rate`.
    pub fn open(path: impl AsRef<Path>, target_sample_rate: u32) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let (samples, source_rate, channels) = decode_to_pcm16(path)?;
        let mono = downmix_to_mono(samples, channels);
        let resampled = decimate(mono, source_rate, target_sample_rate);

        let duration_secs = resampled.len() as f64 / target_sample_rate as f64;
        info!(
            "Audio file loaded: {:.1}s at {} Hz mono ({} samples)",
            duration_secs,
            target_sample_rate,
            resampled.len()
        );

        let mut pcm = Vec::with_capacity(resampled.len() * 2);
        for sample in resampled {
            pcm.extend_from_slice(&sample.to_le_bytes());
        }

        Ok(Self {
            pcm,
            position: 0,
            eof: false,
        })
    }

    /// Total PCM bytes this reader will serve.
    pub fn len_bytes(&self) -> usize {
        self.pcm.len()
    }
}

#[async_trait::async_trait]
impl Reader for FileReader {
    async fn read(&mut self, max_bytes: usize) -> Result<Option<Vec<u8>>, ReaderError> {
        if self.eof || self.position >= self.pcm.len() {
            self.eof = true;
            return Ok(None);
        }
        let end = (self.position + max_bytes).min(self.pcm.len());
        let chunk = self.pcm[self.position..end].to_vec();
        self.position = end;
        Ok(Some(chunk))
    }
}

fn decode_to_pcm16(path: &Path) -> Result<(Vec<i16>, u32, u16)> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .context("Unsupported or corrupt audio container")?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .context("No decodable audio track found")?;
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Failed to create decoder")?;

    let mut samples: Vec<i16> = Vec::new();
    let mut sample_rate = 0u32;
    let mut channels = 1u16;
    let mut sample_buf: Option<SampleBuffer<i16>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e).context("Failed to read packet"),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                channels = spec.channels.count() as u16;
                let buf = sample_buf.get_or_insert_with(|| {
                    SampleBuffer::<i16>::new(decoded.capacity() as u64, spec)
                });
                buf.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buf.samples());
            }
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("Skipping undecodable packet: {}", e);
            }
            Err(e) => return Err(e).context("Decode failed"),
        }
    }

    if samples.is_empty() || sample_rate == 0 {
        anyhow::bail!("No audio decoded from {}", path.display());
    }
    Ok((samples, sample_rate, channels))
}

/// Sum channels into mono, clamping to the i16 range.
fn downmix_to_mono(samples: Vec<i16>, channels: u16) -> Vec<i16> {
    if channels <= 1 {
        return samples;
    }
    let channels = channels as usize;
    let mut mono = Vec::with_capacity(samples.len() / channels);
    for chunk in samples.chunks_exact(channels) {
        let sum: i32 = chunk.iter().map(|&s| s as i32).sum();
        mono.push(sum.clamp(i16::MIN as i32, i16::MAX as i32) as i16);
    }
    mono
}

/// Downsample by decimation. Upsampling is not attempted; the input rate
/// must be a multiple of the target rate to change anything.
fn decimate(samples: Vec<i16>, source_rate: u32, target_rate: u32) -> Vec<i16> {
    if source_rate == target_rate || target_rate == 0 {
        return samples;
    }
    let ratio = source_rate / target_rate;
    if ratio <= 1 {
        warn!(
            "Cannot resample {} Hz to {} Hz, keeping source rate",
            source_rate, target_rate
        );
        return samples;
    }
    samples.into_iter().step_by(ratio as usize).collect()
}

/// Writes PCM16 frames to a WAV file, finalized on `close`.
pub struct FileWriter {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    path: std::path::PathBuf,
    bytes_written: usize,
}

impl FileWriter {
    pub fn create(
        path: impl AsRef<Path>,
        sample_rate: u32,
        channels: u16,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(&path, spec)
            .with_context(|| format!("Failed to create WAV file: {}", path.display()))?;

        Ok(Self {
            writer: Some(writer),
            path,
            bytes_written: 0,
        })
    }
}

#[async_trait::async_trait]
impl Writer for FileWriter {
    async fn write(&mut self, pcm: &[u8]) -> Result<(), WriteError> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| WriteError::new("writer already closed"))?;
        for pair in pcm.chunks_exact(2) {
            let sample = i16::from_le_bytes([pair[0], pair[1]]);
            writer
                .write_sample(sample)
                .map_err(|e| WriteError::new(e.to_string()))?;
        }
        self.bytes_written += pcm.len();
        Ok(())
    }

    async fn close(&mut self) -> Result<(), WriteError> {
        if let Some(writer) = self.writer.take() {
            writer
                .finalize()
                .map_err(|e| WriteError::new(e.to_string()))?;
            info!(
                "Saved {} bytes of PCM to {}",
                self.bytes_written,
                self.path.display()
            );
        }
        Ok(())
    }
}

impl Drop for FileWriter {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                warn!("Failed to finalize WAV writer on drop: {}", e);
            }
        }
    }
}
