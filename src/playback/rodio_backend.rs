//! Audio output using rodio
//!
//! The decoding context opens the default output device on a dedicated
//! thread (the stream itself must stay on the thread that created it) and
//! keeps a handle for creating sinks. Every playback is one [`Sink`] fed by a
//! [`GainSource`] that reads the shared gain level per sample and reports
//! how it ended through a oneshot channel.

use super::engine::{
    ActiveOutput, AudioBackend, DecodedAudio, DecodingContext, GainNode, OutputHandle,
    PlaybackEnd,
};
use crate::{MemoirError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Backend that plays through the default output device
#[derive(Debug, Clone, Copy, Default)]
pub struct RodioBackend;

#[async_trait]
impl AudioBackend for RodioBackend {
    type Context = RodioContext;

    async fn create_context(&self) -> Result<RodioContext> {
        // Opening waits on the stream thread; keep that off the runtime workers.
        tokio::task::spawn_blocking(RodioContext::open)
            .await
            .map_err(|e| MemoirError::audio_device(format!("Audio open task failed: {}", e)))?
    }
}

/// Decoding context bound to the default output device
pub struct RodioContext {
    handle: OutputStreamHandle,
    /// Dropping the sender lets the stream thread exit and close the device
    _shutdown: Mutex<mpsc::Sender<()>>,
}

impl RodioContext {
    /// Open the default output device
    pub fn open() -> Result<Self> {
        let (ready_tx, ready_rx) = mpsc::channel::<std::result::Result<OutputStreamHandle, String>>();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        std::thread::Builder::new()
            .name("memoir-audio-out".into())
            .spawn(move || match OutputStream::try_default() {
                Ok((stream, handle)) => {
                    if ready_tx.send(Ok(handle)).is_err() {
                        return;
                    }
                    // Blocks until the context is dropped.
                    let _ = shutdown_rx.recv();
                    drop(stream);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e.to_string()));
                }
            })
            .map_err(|e| MemoirError::audio_device(format!("Failed to spawn audio thread: {}", e)))?;

        let handle = ready_rx
            .recv()
            .map_err(|_| MemoirError::audio_device("Audio thread exited before opening a stream"))?
            .map_err(|e| MemoirError::audio_device(format!("Failed to create audio stream: {}", e)))?;

        Ok(Self {
            handle,
            _shutdown: Mutex::new(shutdown_tx),
        })
    }
}

#[async_trait]
impl DecodingContext for RodioContext {
    fn is_suspended(&self) -> bool {
        // A rodio stream runs from the moment it is opened.
        false
    }

    async fn resume(&self) -> Result<()> {
        Ok(())
    }

    async fn decode(&self, payload: Vec<u8>) -> Result<DecodedAudio> {
        tokio::task::spawn_blocking(move || decode_payload(payload))
            .await
            .map_err(|e| MemoirError::decode(format!("Decode task failed: {}", e)))?
    }

    fn start(&self, audio: DecodedAudio, gain: &GainNode) -> Result<OutputHandle> {
        let sink = Sink::try_new(&self.handle)
            .map_err(|e| MemoirError::audio_device(format!("Failed to create audio sink: {}", e)))?;
        let (ended_tx, ended_rx) = oneshot::channel();
        let done = Arc::new(AtomicBool::new(false));

        sink.append(GainSource::new(audio, gain.clone(), Arc::clone(&done), ended_tx));
        sink.play();

        Ok(OutputHandle::new(Box::new(RodioOutput { sink, done }), ended_rx))
    }
}

/// Decode a WAV/MP3/FLAC/Vorbis payload into interleaved f32 samples
pub fn decode_payload(payload: Vec<u8>) -> Result<DecodedAudio> {
    if payload.is_empty() {
        return Err(MemoirError::decode("Empty audio payload"));
    }
    let decoder = Decoder::new(Cursor::new(payload))
        .map_err(|e| MemoirError::decode(format!("Unsupported audio payload: {}", e)))?;
    let channels = decoder.channels();
    let sample_rate = decoder.sample_rate();
    let samples: Vec<f32> = decoder.convert_samples::<f32>().collect();
    if samples.is_empty() || channels == 0 {
        return Err(MemoirError::decode("Audio payload contains no samples"));
    }
    Ok(DecodedAudio::new(samples, sample_rate, channels))
}

/// The active sink for one playback
struct RodioOutput {
    sink: Sink,
    done: Arc<AtomicBool>,
}

impl ActiveOutput for RodioOutput {
    fn halt(&mut self) -> Result<()> {
        let already = self.done.swap(true, Ordering::AcqRel);
        self.sink.stop();
        if already {
            return Err(MemoirError::playback("Output already finished"));
        }
        Ok(())
    }
}

/// Source over decoded samples that applies the shared gain
struct GainSource {
    samples: Arc<[f32]>,
    pos: usize,
    sample_rate: u32,
    channels: u16,
    gain: GainNode,
    done: Arc<AtomicBool>,
    ended: Option<oneshot::Sender<PlaybackEnd>>,
}

impl GainSource {
    fn new(
        audio: DecodedAudio,
        gain: GainNode,
        done: Arc<AtomicBool>,
        ended: oneshot::Sender<PlaybackEnd>,
    ) -> Self {
        GainSource {
            samples: audio.samples,
            pos: 0,
            sample_rate: audio.sample_rate,
            channels: audio.channels,
            gain,
            done,
            ended: Some(ended),
        }
    }

    fn signal(&mut self, end: PlaybackEnd) {
        if let Some(tx) = self.ended.take() {
            let _ = tx.send(end);
        }
    }
}

impl Iterator for GainSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.ended.is_none() {
            return None;
        }
        if self.done.load(Ordering::Acquire) {
            self.signal(PlaybackEnd::Halted);
            return None;
        }
        match self.samples.get(self.pos) {
            Some(&sample) => {
                self.pos += 1;
                Some(self.gain.apply(sample))
            }
            None => {
                self.done.store(true, Ordering::Release);
                self.signal(PlaybackEnd::Completed);
                None
            }
        }
    }
}

impl Source for GainSource {
    fn current_frame_len(&self) -> Option<usize> {
        Some(self.samples.len().saturating_sub(self.pos))
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        let frames = self.samples.len() / self.channels.max(1) as usize;
        Some(Duration::from_secs_f64(
            frames as f64 / self.sample_rate.max(1) as f64,
        ))
    }
}

impl Drop for GainSource {
    fn drop(&mut self) {
        // Dropped by the sink before reaching the end.
        self.signal(PlaybackEnd::Halted);
    }
}
