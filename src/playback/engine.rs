//! Audio engine seams
//!
//! The controller never talks to an audio API directly. It asks an
//! [`AudioBackend`] for a single [`DecodingContext`], decodes payloads with it
//! and starts outputs that route through a persistent [`GainNode`].

use crate::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Gain applied while muted
pub const MUTED_GAIN: f32 = 0.0;
/// Gain applied normally
pub const UNITY_GAIN: f32 = 1.0;

/// Decoded, interleaved PCM ready to be played
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Interleaved samples in `[-1.0, 1.0]`
    pub samples: Arc<[f32]>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Channel count
    pub channels: u16,
}

impl DecodedAudio {
    /// Wrap decoded samples
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
            channels,
        }
    }

    /// Number of frames (samples per channel)
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    /// Playing time
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }
}

/// Persistent volume stage between decoded audio and the output.
///
/// Clones share the same level; outputs read it on every sample, so a change
/// is audible immediately and survives across playbacks.
#[derive(Debug, Clone)]
pub struct GainNode {
    level: Arc<AtomicU32>,
}

impl GainNode {
    /// Gain node at `level`
    pub fn new(level: f32) -> Self {
        Self {
            level: Arc::new(AtomicU32::new(level.to_bits())),
        }
    }

    /// Current level
    pub fn level(&self) -> f32 {
        f32::from_bits(self.level.load(Ordering::Relaxed))
    }

    /// Set the level (clamped to `0.0..=1.0`)
    pub fn set_level(&self, level: f32) {
        let level = if level.is_finite() {
            level.clamp(MUTED_GAIN, UNITY_GAIN)
        } else {
            MUTED_GAIN
        };
        self.level.store(level.to_bits(), Ordering::Relaxed);
    }

    /// Whether the level is zero
    pub fn is_muted(&self) -> bool {
        self.level() == MUTED_GAIN
    }

    /// Scale one sample
    #[inline]
    pub fn apply(&self, sample: f32) -> f32 {
        sample * self.level()
    }
}

impl Default for GainNode {
    fn default() -> Self {
        Self::new(UNITY_GAIN)
    }
}

/// How an output finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEnd {
    /// Played to the end
    Completed,
    /// Halted before the end
    Halted,
    /// Engine error after start
    Failed(String),
}

/// A started output the controller owns
pub trait ActiveOutput: Send + 'static {
    /// Stop producing sound.
    ///
    /// May fail when the engine already halted on its own; callers treat that
    /// as success.
    fn halt(&mut self) -> Result<()>;
}

/// Ownership handle for one started output and its completion signal
pub struct OutputHandle {
    output: Box<dyn ActiveOutput>,
    ended: oneshot::Receiver<PlaybackEnd>,
}

impl OutputHandle {
    /// Pair an output with the receiver its engine resolves on completion
    pub fn new(output: Box<dyn ActiveOutput>, ended: oneshot::Receiver<PlaybackEnd>) -> Self {
        Self { output, ended }
    }

    /// Split into the output and its completion signal
    pub fn into_parts(self) -> (Box<dyn ActiveOutput>, oneshot::Receiver<PlaybackEnd>) {
        (self.output, self.ended)
    }
}

/// Engine instance that decodes payloads and starts outputs
#[async_trait]
pub trait DecodingContext: Send + Sync + 'static {
    /// Whether the context is suspended (e.g. by an autoplay policy)
    fn is_suspended(&self) -> bool;

    /// Resume a suspended context
    async fn resume(&self) -> Result<()>;

    /// Decode an encoded payload
    async fn decode(&self, payload: Vec<u8>) -> Result<DecodedAudio>;

    /// Connect `audio` through `gain` to the output and start it
    fn start(&self, audio: DecodedAudio, gain: &GainNode) -> Result<OutputHandle>;
}

/// Factory for the decoding context
#[async_trait]
pub trait AudioBackend: Send + Sync + 'static {
    /// Context type produced
    type Context: DecodingContext;

    /// Create the context; the controller calls this at most once.
    ///
    /// Opening a device may block, so implementations move that work off the
    /// async runtime.
    async fn create_context(&self) -> Result<Self::Context>;
}
