//! Playback controller
//!
//! Owns the single playback slot. At most one output is active; the decoding
//! context and the gain node are created on first use and kept for the
//! controller's lifetime.

use super::engine::{ActiveOutput, AudioBackend, DecodingContext, GainNode, PlaybackEnd};
use super::engine::{MUTED_GAIN, UNITY_GAIN};
use super::{Notification, PlayOutcome, PlaybackSnapshot, PlaybackStatus};
use crate::story::{StoryService, Theme};
use crate::{MemoirError, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, oneshot, watch};

const NOTIFICATION_CAPACITY: usize = 16;

struct Session {
    status: PlaybackStatus,
    /// Bumped when a load starts and when a non-idle slot is stopped;
    /// results tagged with an older value are discarded.
    generation: u64,
    /// Present exactly while `status == Playing`
    active: Option<Box<dyn ActiveOutput>>,
    /// Created with the first started output
    gain: Option<GainNode>,
    muted: bool,
}

impl Session {
    fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            status: self.status,
            muted: self.muted,
        }
    }

    fn is_current(&self, generation: u64, status: PlaybackStatus) -> bool {
        self.generation == generation && self.status == status
    }
}

struct Inner<S, B: AudioBackend> {
    service: S,
    backend: B,
    /// Async lock so a slow device open is never raced by a second one
    context: tokio::sync::Mutex<Option<Arc<B::Context>>>,
    session: Mutex<Session>,
    state_tx: watch::Sender<PlaybackSnapshot>,
    notices: broadcast::Sender<Notification>,
}

/// Toggle-style playback controller.
///
/// Cheap to clone; clones drive the same slot.
pub struct PlaybackController<S: StoryService, B: AudioBackend> {
    inner: Arc<Inner<S, B>>,
}

impl<S: StoryService, B: AudioBackend> Clone for PlaybackController<S, B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: StoryService, B: AudioBackend> PlaybackController<S, B> {
    /// Create an idle, unmuted controller
    pub fn new(service: S, backend: B) -> Self {
        let (state_tx, _) = watch::channel(PlaybackSnapshot::default());
        let (notices, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                service,
                backend,
                context: tokio::sync::Mutex::new(None),
                session: Mutex::new(Session {
                    status: PlaybackStatus::Idle,
                    generation: 0,
                    active: None,
                    gain: None,
                    muted: false,
                }),
                state_tx,
                notices,
            }),
        }
    }

    /// Play `text` narrated in `theme`, or stop if already playing.
    ///
    /// While a previous call is still loading, the request is ignored.
    pub async fn play(&self, text: &str, theme: Theme) -> PlayOutcome {
        let generation = {
            let mut session = self.inner.session.lock();
            match session.status {
                PlaybackStatus::Playing => {
                    self.inner.stop_locked(&mut session);
                    return PlayOutcome::Stopped;
                }
                PlaybackStatus::Loading => {
                    tracing::debug!("play ignored: audio already loading");
                    return PlayOutcome::AlreadyLoading;
                }
                PlaybackStatus::Idle => {}
            }
            session.generation += 1;
            session.status = PlaybackStatus::Loading;
            self.inner.publish(&session);
            session.generation
        };
        let _loading = LoadingGuard {
            inner: &*self.inner,
            generation,
        };

        tracing::info!(%theme, chars = text.len(), generation, "narration requested");
        match self.inner.load_and_start(text, theme, generation).await {
            Ok(Some(ended)) => {
                self.inner.watch_completion(generation, ended);
                PlayOutcome::Started
            }
            Ok(None) => {
                tracing::debug!(generation, "narration superseded while loading");
                PlayOutcome::Superseded
            }
            Err(err) => self.inner.fail_loading(generation, err),
        }
    }

    /// Stop the active output, if any (no-op when idle)
    pub fn stop(&self) {
        let mut session = self.inner.session.lock();
        self.inner.stop_locked(&mut session);
    }

    /// Silence output; sticks for later playbacks until [`unmute`](Self::unmute)
    pub fn mute(&self) {
        self.inner.set_muted(true);
    }

    /// Restore normal gain
    pub fn unmute(&self) {
        self.inner.set_muted(false);
    }

    /// Flip the mute flag; returns the new value
    pub fn toggle_mute(&self) -> bool {
        let muted = !self.is_muted();
        self.inner.set_muted(muted);
        muted
    }

    /// Current slot status
    pub fn status(&self) -> PlaybackStatus {
        self.inner.session.lock().status
    }

    /// Whether mute is in effect
    pub fn is_muted(&self) -> bool {
        self.inner.session.lock().muted
    }

    /// Status and mute flag together
    pub fn snapshot(&self) -> PlaybackSnapshot {
        self.inner.session.lock().snapshot()
    }

    /// Receive every state change
    pub fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot> {
        self.inner.state_tx.subscribe()
    }

    /// Receive user-visible failure notifications
    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.inner.notices.subscribe()
    }

    /// The generation service this controller fetches from
    pub fn service(&self) -> &S {
        &self.inner.service
    }

    /// Current gain level, once a gain node exists
    pub fn gain_level(&self) -> Option<f32> {
        self.inner.session.lock().gain.as_ref().map(GainNode::level)
    }
}

impl<S: StoryService, B: AudioBackend> Inner<S, B> {
    fn publish(&self, session: &Session) {
        self.state_tx.send_replace(session.snapshot());
    }

    fn notify(&self, notice: Notification) {
        // No subscribers is fine; the outcome still carries the notice.
        let _ = self.notices.send(notice);
    }

    /// Shared decoding context, created on first use
    async fn context(&self) -> Result<Arc<B::Context>> {
        let mut slot = self.context.lock().await;
        if let Some(context) = slot.as_ref() {
            return Ok(Arc::clone(context));
        }
        let context = Arc::new(self.backend.create_context().await?);
        tracing::info!("decoding context created");
        *slot = Some(Arc::clone(&context));
        Ok(context)
    }

    /// Fetch, decode and start. `Ok(None)` means the session moved on meanwhile.
    async fn load_and_start(
        &self,
        text: &str,
        theme: Theme,
        generation: u64,
    ) -> Result<Option<oneshot::Receiver<PlaybackEnd>>> {
        let started = Instant::now();
        let payload = self.service.generate_audio(text, theme).await?;
        if !self.session.lock().is_current(generation, PlaybackStatus::Loading) {
            return Ok(None);
        }

        let context = self.context().await?;
        if context.is_suspended() {
            tracing::debug!("resuming suspended decoding context");
            context.resume().await?;
        }
        let audio = context.decode(payload).await?;

        let mut session = self.session.lock();
        if !session.is_current(generation, PlaybackStatus::Loading) {
            return Ok(None);
        }
        if let Some(previous) = session.active.take() {
            halt_quietly(previous);
        }
        let muted = session.muted;
        let gain = session
            .gain
            .get_or_insert_with(|| GainNode::new(if muted { MUTED_GAIN } else { UNITY_GAIN }))
            .clone();
        let (output, ended) = context.start(audio.clone(), &gain)?.into_parts();
        session.active = Some(output);
        session.status = PlaybackStatus::Playing;
        self.publish(&session);

        tracing::info!(
            generation,
            duration_ms = audio.duration().as_millis() as u64,
            sample_rate = audio.sample_rate,
            channels = audio.channels,
            load_ms = started.elapsed().as_millis() as u64,
            muted,
            "narration playing"
        );
        Ok(Some(ended))
    }

    fn fail_loading(&self, generation: u64, err: MemoirError) -> PlayOutcome {
        {
            let mut session = self.session.lock();
            if !session.is_current(generation, PlaybackStatus::Loading) {
                tracing::debug!(generation, error = %err, "late failure for a stopped load");
                return PlayOutcome::Superseded;
            }
            session.status = PlaybackStatus::Idle;
            self.publish(&session);
        }
        tracing::warn!(generation, error = %err, "narration failed");
        let notice = Notification::from_error(&err);
        self.notify(notice.clone());
        PlayOutcome::Failed(notice)
    }

    /// Returns whether anything was stopped
    fn stop_locked(&self, session: &mut Session) -> bool {
        if session.status == PlaybackStatus::Idle {
            return false;
        }
        if let Some(output) = session.active.take() {
            halt_quietly(output);
        }
        let was = session.status;
        session.status = PlaybackStatus::Idle;
        session.generation += 1;
        self.publish(session);
        tracing::info!(from = %was, "playback stopped");
        true
    }

    /// Return a load abandoned by its caller to idle, without a notification
    fn abandon_loading(&self, generation: u64) {
        let mut session = self.session.lock();
        if !session.is_current(generation, PlaybackStatus::Loading) {
            return;
        }
        session.status = PlaybackStatus::Idle;
        session.generation += 1;
        self.publish(&session);
        tracing::debug!(generation, "narration request dropped while loading");
    }

    fn set_muted(&self, muted: bool) {
        let mut session = self.session.lock();
        session.muted = muted;
        if let Some(gain) = &session.gain {
            gain.set_level(if muted { MUTED_GAIN } else { UNITY_GAIN });
        }
        self.publish(&session);
        tracing::debug!(muted, "mute changed");
    }

    fn finish(&self, generation: u64, end: PlaybackEnd) {
        {
            let mut session = self.session.lock();
            if !session.is_current(generation, PlaybackStatus::Playing) {
                return;
            }
            // The engine is done with it; release without halting.
            session.active = None;
            session.status = PlaybackStatus::Idle;
            self.publish(&session);
        }
        match end {
            PlaybackEnd::Completed => tracing::info!(generation, "narration finished"),
            PlaybackEnd::Halted => tracing::debug!(generation, "output halted by the engine"),
            PlaybackEnd::Failed(message) => {
                tracing::warn!(generation, %message, "playback failed after start");
                self.notify(Notification::from_error(&MemoirError::Playback(message)));
            }
        }
    }
}

impl<S: StoryService, B: AudioBackend> Inner<S, B> {
    fn watch_completion(self: &Arc<Self>, generation: u64, ended: oneshot::Receiver<PlaybackEnd>) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            // A dropped sender means the engine discarded the output.
            let end = ended.await.unwrap_or(PlaybackEnd::Halted);
            inner.finish(generation, end);
        });
    }
}

/// Resets the slot if a `play` future is dropped mid-load
struct LoadingGuard<'a, S: StoryService, B: AudioBackend> {
    inner: &'a Inner<S, B>,
    generation: u64,
}

impl<S: StoryService, B: AudioBackend> Drop for LoadingGuard<'_, S, B> {
    fn drop(&mut self) {
        // No-op once the load settled into Playing or Idle.
        self.inner.abandon_loading(self.generation);
    }
}

fn halt_quietly(mut output: Box<dyn ActiveOutput>) {
    if let Err(err) = output.halt() {
        tracing::debug!(error = %err, "output already halted");
    }
}
