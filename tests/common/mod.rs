//! Fakes shared by the integration tests
//!
//! A scripted page (`FakeHost`), a scripted generation service
//! (`FakeService`) and an in-memory audio engine (`FakeBackend`) whose
//! outputs can be inspected and finished by hand.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use map_memoir::maps::{LoaderSettings, ScriptEvent, ScriptHost, ScriptTag, SdkObjects};
use map_memoir::playback::{
    ActiveOutput, AudioBackend, DecodedAudio, DecodingContext, GainNode, OutputHandle,
    PlaybackEnd,
};
use map_memoir::{MemoirError, Place, Result, StoryService, Theme};
use parking_lot::Mutex;
use tokio::sync::{oneshot, Notify};

/// A credential that is neither missing nor a placeholder
pub const TEST_KEY: &str = "AIzaTestKey0123456789";

/// Yield to spawned tasks until `condition` holds
pub async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..1_000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached while yielding to spawned tasks");
}

/// Loader settings pointing at a fake vendor host
pub fn loader_settings() -> LoaderSettings {
    LoaderSettings {
        script_url: "https://maps.example.test/maps/api/js".into(),
        script_host: "maps.example.test".into(),
        libraries: vec!["places".into()],
        timeout: Duration::from_secs(10),
        poll_interval: Duration::from_millis(100),
    }
}

/// Minimal payload the fake decoder accepts
pub fn riff_payload() -> Vec<u8> {
    b"RIFF\x24\x00\x00\x00WAVEfmt ".to_vec()
}

// ---------------------------------------------------------------------------
// Script host
// ---------------------------------------------------------------------------

/// Page whose SDK objects and script callbacks are driven by the test
#[derive(Default)]
pub struct FakeHost {
    objects: Mutex<SdkObjects>,
    tags: Mutex<Vec<ScriptTag>>,
    /// Tags injected and not removed yet
    live_tags: AtomicUsize,
    removed: AtomicUsize,
    pending: Mutex<Option<oneshot::Sender<ScriptEvent>>>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of script injections so far
    pub fn injections(&self) -> usize {
        self.tags.lock().len()
    }

    /// Stale tags removed so far
    pub fn removed(&self) -> usize {
        self.removed.load(Ordering::SeqCst)
    }

    pub fn last_tag(&self) -> Option<ScriptTag> {
        self.tags.lock().last().cloned()
    }

    /// Replace the set of attached SDK objects
    pub fn attach(&self, objects: SdkObjects) {
        *self.objects.lock() = objects;
    }

    /// Resolve the most recent injection
    pub fn fire(&self, event: ScriptEvent) {
        let sender = self
            .pending
            .lock()
            .take()
            .expect("no injected script is waiting for an event");
        let _ = sender.send(event);
    }
}

impl ScriptHost for FakeHost {
    fn available_objects(&self) -> SdkObjects {
        *self.objects.lock()
    }

    fn remove_scripts_from(&self, _host: &str) -> usize {
        let count = self.live_tags.swap(0, Ordering::SeqCst);
        self.removed.fetch_add(count, Ordering::SeqCst);
        count
    }

    fn inject_script(&self, tag: &ScriptTag) -> Result<oneshot::Receiver<ScriptEvent>> {
        let (tx, rx) = oneshot::channel();
        self.tags.lock().push(tag.clone());
        self.live_tags.fetch_add(1, Ordering::SeqCst);
        *self.pending.lock() = Some(tx);
        Ok(rx)
    }
}

// ---------------------------------------------------------------------------
// Generation service
// ---------------------------------------------------------------------------

/// How the fake service answers `generate_audio`
#[derive(Clone)]
pub enum FakeReply {
    Audio(Vec<u8>),
    NetworkDown,
    Rejected(u16, String),
}

pub struct FakeService {
    reply: Mutex<FakeReply>,
    gate: Option<Arc<Notify>>,
    audio_calls: AtomicUsize,
}

impl FakeService {
    /// Answers every audio request with `payload`
    pub fn audio(payload: Vec<u8>) -> Self {
        Self::with_reply(FakeReply::Audio(payload))
    }

    pub fn with_reply(reply: FakeReply) -> Self {
        Self {
            reply: Mutex::new(reply),
            gate: None,
            audio_calls: AtomicUsize::new(0),
        }
    }

    /// Audio requests block until `gate` is notified
    pub fn gated(payload: Vec<u8>, gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::audio(payload)
        }
    }

    pub fn set_reply(&self, reply: FakeReply) {
        *self.reply.lock() = reply;
    }

    pub fn audio_calls(&self) -> usize {
        self.audio_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoryService for FakeService {
    async fn generate_script(&self, place: &Place, theme: Theme) -> Result<String> {
        Ok(format!("A {} story about {}.", theme, place.name))
    }

    async fn generate_audio(&self, _script: &str, _theme: Theme) -> Result<Vec<u8>> {
        self.audio_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let reply = self.reply.lock().clone();
        match reply {
            FakeReply::Audio(bytes) => Ok(bytes),
            FakeReply::NetworkDown => Err(MemoirError::Network("connection refused".into())),
            FakeReply::Rejected(status, message) => Err(MemoirError::api(status, message)),
        }
    }

    async fn health(&self) -> Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Audio engine
// ---------------------------------------------------------------------------

/// One started output as seen by the engine
pub struct Probe {
    pub gain: GainNode,
    pub frames: usize,
    halted: AtomicBool,
    ended: Mutex<Option<oneshot::Sender<PlaybackEnd>>>,
}

impl Probe {
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Finish the output the way the engine would
    pub fn finish(&self, end: PlaybackEnd) {
        if let Some(tx) = self.ended.lock().take() {
            let _ = tx.send(end);
        }
    }
}

/// Engine state shared between the test and the controller's context
#[derive(Default)]
pub struct FakeAudio {
    contexts: AtomicUsize,
    refuse_context: AtomicBool,
    suspended: AtomicBool,
    resumes: AtomicUsize,
    outputs: Mutex<Vec<Arc<Probe>>>,
}

impl FakeAudio {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn contexts_created(&self) -> usize {
        self.contexts.load(Ordering::SeqCst)
    }

    /// Make context creation fail (no output device)
    pub fn refuse_context(&self, refuse: bool) {
        self.refuse_context.store(refuse, Ordering::SeqCst);
    }

    /// Start new contexts suspended, as an autoplay policy would
    pub fn suspend(&self) {
        self.suspended.store(true, Ordering::SeqCst);
    }

    pub fn resumes(&self) -> usize {
        self.resumes.load(Ordering::SeqCst)
    }

    pub fn output_count(&self) -> usize {
        self.outputs.lock().len()
    }

    pub fn output(&self, index: usize) -> Arc<Probe> {
        Arc::clone(&self.outputs.lock()[index])
    }
}

pub struct FakeBackend {
    audio: Arc<FakeAudio>,
}

impl FakeBackend {
    pub fn new(audio: &Arc<FakeAudio>) -> Self {
        Self {
            audio: Arc::clone(audio),
        }
    }
}

#[async_trait]
impl AudioBackend for FakeBackend {
    type Context = FakeContext;

    async fn create_context(&self) -> Result<FakeContext> {
        if self.audio.refuse_context.load(Ordering::SeqCst) {
            return Err(MemoirError::audio_device("no output device"));
        }
        self.audio.contexts.fetch_add(1, Ordering::SeqCst);
        Ok(FakeContext {
            audio: Arc::clone(&self.audio),
        })
    }
}

pub struct FakeContext {
    audio: Arc<FakeAudio>,
}

#[async_trait]
impl DecodingContext for FakeContext {
    fn is_suspended(&self) -> bool {
        self.audio.suspended.load(Ordering::SeqCst)
    }

    async fn resume(&self) -> Result<()> {
        self.audio.resumes.fetch_add(1, Ordering::SeqCst);
        self.audio.suspended.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn decode(&self, payload: Vec<u8>) -> Result<DecodedAudio> {
        if !payload.starts_with(b"RIFF") {
            return Err(MemoirError::decode("unrecognised audio container"));
        }
        Ok(DecodedAudio::new(vec![0.25; 800], 8_000, 1))
    }

    fn start(&self, audio: DecodedAudio, gain: &GainNode) -> Result<OutputHandle> {
        let (tx, rx) = oneshot::channel();
        let probe = Arc::new(Probe {
            gain: gain.clone(),
            frames: audio.frames(),
            halted: AtomicBool::new(false),
            ended: Mutex::new(Some(tx)),
        });
        self.audio.outputs.lock().push(Arc::clone(&probe));
        Ok(OutputHandle::new(Box::new(FakeOutput { probe }), rx))
    }
}

struct FakeOutput {
    probe: Arc<Probe>,
}

impl ActiveOutput for FakeOutput {
    fn halt(&mut self) -> Result<()> {
        if self.probe.halted.swap(true, Ordering::SeqCst) {
            return Err(MemoirError::playback("already halted"));
        }
        self.probe.finish(PlaybackEnd::Halted);
        Ok(())
    }
}
