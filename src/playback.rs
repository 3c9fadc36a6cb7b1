//! The playback state machine.
//!
//! A [`PlaybackController`] owns the current playlist, the step index and
//! whether a session is running. In voice mode each session gets a fresh
//! [`RealtimeConnection`]; narrated utterances come back through it, are
//! logged, and any directive they carry moves the playlist. In prerecorded
//! mode a per-locale narration track plays alongside each clip instead.

use crate::client::{ConnectionEvent, ConnectionState, EventRx, RealtimeConnection};
use crate::command::{self, Directive};
use crate::error::{PlaybackError, StartError, UserFacing};
use crate::host::{MediaElement, RealtimeHost};
use crate::session::SessionSource;
use crate::transcript::{Role, TranscriptEntry, TranscriptLog};
use induction_realtime_types::{Playlist, PlaylistStep};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaybackState {
    pub current_index: usize,
    pub session_active: bool,
}

pub enum PlaybackMode {
    /// A live narrator reads each step's line.
    Voice {
        sessions: Arc<dyn SessionSource>,
        host: RealtimeHost,
    },
    /// Narration is a recorded track per step: `<narration_root>/<locale>/<step id>.mp3`.
    Prerecorded { narration_root: String },
}

/// The elements the controller keeps in step.
pub struct MediaTracks {
    pub video: Arc<dyn MediaElement>,
    pub narration: Arc<dyn MediaElement>,
}

/// A step index as of one session generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cue {
    index: usize,
    generation: u64,
}

enum MoveOutcome {
    Inactive,
    /// Already there; carries the step's description.
    Unchanged(String),
    Moved(String),
}

#[derive(Default)]
struct Inner {
    playlist: Option<Playlist>,
    index: usize,
    active: bool,
    starting: bool,
    /// Bumped by every start and stop; work belonging to an older value is stale.
    generation: u64,
    connection: Option<Arc<RealtimeConnection>>,
    pump: Option<JoinHandle<()>>,
    transcript: TranscriptLog,
}

impl Inner {
    fn state(&self) -> PlaybackState {
        PlaybackState {
            current_index: self.index,
            session_active: self.active,
        }
    }

    fn describe(&self, index: usize) -> String {
        match self.playlist.as_ref().and_then(|p| p.step(index).map(|s| (p.len(), s))) {
            Some((len, step)) => format!("step {} of {} ({})", index + 1, len, step.id()),
            None => format!("step {}", index + 1),
        }
    }
}

struct Shared {
    mode: PlaybackMode,
    media: MediaTracks,
    inner: Mutex<Inner>,
}

/// Cloneable handle to one playback session's state.
#[derive(Clone)]
pub struct PlaybackController {
    shared: Arc<Shared>,
}

impl PlaybackController {
    pub fn new(mode: PlaybackMode, media: MediaTracks) -> Self {
        Self {
            shared: Arc::new(Shared {
                mode,
                media,
                inner: Mutex::new(Inner::default()),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.shared.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> PlaybackState {
        self.lock().state()
    }

    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    pub fn current_step(&self) -> Option<PlaylistStep> {
        let inner = self.lock();
        inner.playlist.as_ref()?.step(inner.index).cloned()
    }

    pub fn transcript(&self) -> Vec<TranscriptEntry> {
        self.lock().transcript.entries().to_vec()
    }

    /// State of the current session's connection, if there is one.
    pub fn connection_state(&self) -> Option<ConnectionState> {
        self.lock().connection.as_ref().map(|c| c.state())
    }

    fn status(&self, text: &str) {
        tracing::info!("{}", text);
        self.lock().transcript.append(Role::System, text);
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lock().generation == generation
    }

    /// Stops any running session, then replaces the playlist wholesale.
    pub fn load_playlist(&self, playlist: Playlist) {
        self.stop();
        tracing::info!(
            "playlist for {} ({}) loaded with {} step(s)",
            playlist.site(),
            playlist.locale(),
            playlist.len()
        );
        let mut inner = self.lock();
        inner.playlist = Some(playlist);
        inner.index = 0;
    }

    /// Starts a session at the first step.
    ///
    /// Ignored without a playlist or while a session is running or starting.
    /// A `stop` issued before this finishes makes it return `Cancelled`.
    pub async fn start(&self) -> Result<(), StartError> {
        let (generation, playlist) = {
            let mut inner = self.lock();
            let Some(playlist) = inner.playlist.clone() else {
                tracing::debug!("start ignored: no playlist loaded");
                return Ok(());
            };
            if inner.active || inner.starting {
                tracing::debug!("start ignored: session already running");
                return Ok(());
            }
            inner.starting = true;
            inner.generation += 1;
            inner.index = 0;
            (inner.generation, playlist)
        };

        let result = match &self.shared.mode {
            PlaybackMode::Voice { sessions, host } => {
                self.start_voice(generation, &playlist, sessions.as_ref(), host)
                    .await
            }
            PlaybackMode::Prerecorded { .. } => self.activate(generation, "Session started."),
        };

        match result {
            Ok(()) => {
                self.present(Cue { index: 0, generation }).await;
                Ok(())
            }
            Err(_) if !self.is_current(generation) => Err(StartError::Cancelled),
            Err(e) => {
                self.abort_start(generation, &e);
                Err(e)
            }
        }
    }

    async fn start_voice(
        &self,
        generation: u64,
        playlist: &Playlist,
        sessions: &dyn SessionSource,
        host: &RealtimeHost,
    ) -> Result<(), StartError> {
        let descriptor = sessions.open_session(playlist).await?;

        let connection = Arc::new(RealtimeConnection::new(host.clone()));
        let events = connection.subscribe();
        {
            let mut inner = self.lock();
            if inner.generation != generation {
                return Err(StartError::Cancelled);
            }
            inner.connection = Some(connection.clone());
        }

        connection.connect(&descriptor).await?;

        let pump = tokio::spawn(pump_connection_events(self.clone(), generation, events));
        {
            let mut inner = self.lock();
            if inner.generation != generation {
                pump.abort();
                return Err(StartError::Cancelled);
            }
            inner.pump = Some(pump);
        }
        self.activate(
            generation,
            &format!("Session started with {}.", descriptor.model_id()),
        )
    }

    fn activate(&self, generation: u64, message: &str) -> Result<(), StartError> {
        {
            let mut inner = self.lock();
            if inner.generation != generation {
                return Err(StartError::Cancelled);
            }
            inner.starting = false;
            inner.active = true;
            inner.index = 0;
        }
        self.status(message);
        Ok(())
    }

    fn abort_start(&self, generation: u64, error: &StartError) {
        let (connection, pump) = {
            let mut inner = self.lock();
            if inner.generation != generation {
                return;
            }
            inner.starting = false;
            inner.active = false;
            inner.index = 0;
            (inner.connection.take(), inner.pump.take())
        };
        if let Some(pump) = pump {
            pump.abort();
        }
        if let Some(connection) = connection {
            connection.close();
        }
        tracing::error!("failed to start session: {}", error);
        self.status(&error.summary());
    }

    /// Ends the session: closes the connection, pauses and rewinds all media,
    /// clears the transcript and returns to the first step. No-op when idle.
    pub fn stop(&self) {
        let (connection, pump) = {
            let mut inner = self.lock();
            if !inner.active && !inner.starting {
                inner.index = 0;
                return;
            }
            inner.generation += 1;
            inner.active = false;
            inner.starting = false;
            inner.index = 0;
            inner.transcript.clear();
            (inner.connection.take(), inner.pump.take())
        };

        if let Some(pump) = pump {
            pump.abort();
        }
        if let Some(connection) = connection {
            connection.close();
        }
        for media in [&self.shared.media.video, &self.shared.media.narration] {
            media.pause();
            media.rewind();
        }
        tracing::info!("session stopped");
    }

    /// Whether `cue` still names the active session's current step.
    fn is_cued(&self, cue: Cue) -> bool {
        let inner = self.lock();
        inner.active && inner.generation == cue.generation && inner.index == cue.index
    }

    /// Moves the index to `target(current)`, clamped to the playlist. Acts only
    /// while a session is active.
    async fn move_with(&self, target: impl FnOnce(usize) -> usize) -> MoveOutcome {
        let (outcome, cue) = {
            let mut inner = self.lock();
            let len = inner.playlist.as_ref().map(Playlist::len).unwrap_or(0);
            if !inner.active || len == 0 {
                return MoveOutcome::Inactive;
            }
            let next = target(inner.index).min(len - 1);
            if next == inner.index {
                (MoveOutcome::Unchanged(inner.describe(next)), None)
            } else {
                inner.index = next;
                let cue = Cue {
                    index: next,
                    generation: inner.generation,
                };
                (MoveOutcome::Moved(inner.describe(next)), Some(cue))
            }
        };
        if let Some(cue) = cue {
            self.present(cue).await;
        }
        outcome
    }

    /// Advances one step; returns whether the index changed.
    pub async fn next(&self) -> bool {
        matches!(self.move_with(|index| index + 1).await, MoveOutcome::Moved(_))
    }

    pub async fn prev(&self) -> bool {
        matches!(
            self.move_with(|index| index.saturating_sub(1)).await,
            MoveOutcome::Moved(_)
        )
    }

    /// Loads the cued step's media from the start and narrates its line.
    /// Stops as soon as a newer move or a stop supersedes the cue.
    async fn present(&self, cue: Cue) {
        let (step, locale, connection) = {
            let inner = self.lock();
            if !(inner.active && inner.generation == cue.generation && inner.index == cue.index) {
                return;
            }
            let Some(playlist) = inner.playlist.as_ref() else {
                return;
            };
            let Some(step) = playlist.step(cue.index).cloned() else {
                return;
            };
            (step, playlist.locale().to_string(), inner.connection.clone())
        };

        let media = &self.shared.media;
        media.video.load(step.media_ref());
        media.video.rewind();

        match &self.shared.mode {
            PlaybackMode::Voice { .. } => {
                self.report_playback(media.video.play().await);
                if !self.is_cued(cue) {
                    tracing::debug!("step {} superseded before narration", cue.index + 1);
                    return;
                }
                self.narrate(connection, step.line()).await;
            }
            PlaybackMode::Prerecorded { narration_root } => {
                media
                    .narration
                    .load(&narration_src(narration_root, &locale, step.id()));
                media.narration.rewind();
                self.play_in_step().await;
            }
        }
    }

    /// Rewinds the current clip. While a session is active the line is
    /// narrated again, or the narration track restarts.
    pub async fn replay(&self) {
        self.replay_current().await;
    }

    /// Replays and returns a description of the replayed step.
    async fn replay_current(&self) -> Option<String> {
        let (cue, active, connection, line, description) = {
            let inner = self.lock();
            let step = inner.playlist.as_ref().and_then(|p| p.step(inner.index))?;
            let cue = Cue {
                index: inner.index,
                generation: inner.generation,
            };
            (
                cue,
                inner.active,
                inner.connection.clone(),
                step.line().to_string(),
                inner.describe(inner.index),
            )
        };

        let media = &self.shared.media;
        media.video.rewind();
        if !active {
            return Some(description);
        }
        match &self.shared.mode {
            PlaybackMode::Voice { .. } => {
                self.report_playback(media.video.play().await);
                if self.is_cued(cue) {
                    self.narrate(connection, &line).await;
                }
            }
            PlaybackMode::Prerecorded { .. } => {
                media.narration.rewind();
                self.play_in_step().await;
            }
        }
        Some(description)
    }

    async fn play_in_step(&self) {
        let media = &self.shared.media;
        let (video, narration) = tokio::join!(media.video.play(), media.narration.play());
        self.report_playback(video);
        self.report_playback(narration);
    }

    async fn narrate(&self, connection: Option<Arc<RealtimeConnection>>, line: &str) {
        let Some(connection) = connection else {
            return;
        };
        if let Err(e) = connection.speak(line).await {
            tracing::warn!("narration request failed: {}", e);
        }
    }

    fn report_playback(&self, result: Result<(), PlaybackError>) {
        if let Err(e) = result {
            tracing::warn!("playback problem: {}", e);
            self.status(&e.summary());
        }
    }

    pub async fn apply_directive(&self, directive: Directive) {
        match directive {
            Directive::Next => match self.move_with(|index| index + 1).await {
                MoveOutcome::Inactive => tracing::debug!("next ignored: no active session"),
                MoveOutcome::Unchanged(_) => self.status("Already at the final step."),
                MoveOutcome::Moved(step) => self.status(&format!("Advanced to {}.", step)),
            },
            Directive::Replay => match self.replay_current().await {
                Some(step) => self.status(&format!("Replaying {}.", step)),
                None => tracing::debug!("replay ignored: no playlist loaded"),
            },
            Directive::ShowById(id) => {
                if !self.is_active() {
                    tracing::debug!("show {} ignored: no active session", id);
                    return;
                }
                let target = self
                    .lock()
                    .playlist
                    .as_ref()
                    .and_then(|p| p.position_of(&id));
                let Some(index) = target else {
                    self.status(&format!("No step with id '{}'.", id));
                    return;
                };
                match self.move_with(|_| index).await {
                    MoveOutcome::Inactive => tracing::debug!("show {} ignored: session ended", id),
                    MoveOutcome::Unchanged(step) | MoveOutcome::Moved(step) => {
                        self.status(&format!("Showing {}.", step))
                    }
                }
            }
        }
    }

    /// Logs a completed narrated utterance, then applies the directive it carries.
    pub async fn handle_text(&self, text: &str) {
        let spoken = command::strip_markers(text);
        if !spoken.is_empty() {
            self.lock().transcript.append(Role::Trainer, &spoken);
        }
        if let Some(directive) = command::parse(text) {
            tracing::debug!("directive {:?}", directive);
            self.apply_directive(directive).await;
        }
    }

    /// The clip finished on its own.
    pub async fn on_media_ended(&self) {
        if self.is_active() {
            self.next().await;
        }
    }
}

pub fn narration_src(root: &str, locale: &str, step_id: &str) -> String {
    format!("{}/{}/{}.mp3", root.trim_end_matches('/'), locale, step_id)
}

async fn pump_connection_events(controller: PlaybackController, generation: u64, mut events: EventRx) {
    loop {
        match events.recv().await {
            Ok(ConnectionEvent::Text { text, .. }) => controller.handle_text(&text).await,
            Ok(ConnectionEvent::PlaybackBlocked(detail)) => {
                controller.report_playback(Err(PlaybackError::Blocked(detail)));
            }
            Ok(ConnectionEvent::StateChanged(ConnectionState::Closed)) => {
                if controller.is_current(generation) {
                    controller.status("The narrator disconnected.");
                }
                break;
            }
            Ok(ConnectionEvent::StateChanged(_)) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!("narration consumer lagged, {} event(s) skipped", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
}
