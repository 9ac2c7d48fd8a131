//! Session controller tying inputs, alignment, editing and playback together.
//!
//! A [`SyncController`] owns exactly one [`LrcDocument`]. It moves through
//! [`SessionPhase::Idle`] (waiting for inputs), [`SessionPhase::Processing`]
//! (alignment running in a background task) and [`SessionPhase::Editing`].
//! Only [`SyncController::reset`] leaves `Editing`.

use crate::alignment::{
    lines_from_alignment, manual_lines, AlignmentRequest, LyricsAligner, DEFAULT_REVIEW_THRESHOLD,
};
use crate::error::{CoreError, Result};
use crate::lrc::{LrcDocument, LrcMetadata, DEFAULT_ATTRIBUTION};
use crate::playback::PlaybackState;
use crate::source::SourceFile;
use crate::store::{LineId, LinePatch, LineStore, LyricLine};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const LOG_TARGET: &str = "lyricsync::sync";

/// Largest audio file sent for alignment (25 MiB)
pub const DEFAULT_MAX_AUDIO_BYTES: u64 = 25 * 1024 * 1024;

/// Tunables for a session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    /// Aligned lines under this confidence are flagged for review
    pub review_threshold: f64,
    /// Audio files larger than this are rejected before alignment
    pub max_audio_bytes: u64,
    /// Default `[by:]` value for new documents
    pub attribution: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            review_threshold: DEFAULT_REVIEW_THRESHOLD,
            max_audio_bytes: DEFAULT_MAX_AUDIO_BYTES,
            attribution: DEFAULT_ATTRIBUTION.to_string(),
        }
    }
}

/// Where the session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Waiting for audio and lyrics
    Idle,
    /// Alignment in progress
    Processing,
    /// Document ready for editing
    Editing,
}

impl SessionPhase {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Processing => "processing",
            Self::Editing => "editing",
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events emitted by the controller
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// The session moved to a new phase
    PhaseChanged { phase: SessionPhase },
    /// Lines or metadata changed
    DocumentChanged,
    /// The highlighted line changed
    ActiveLineChanged { index: Option<usize> },
    /// The player should seek to this position
    SeekRequested { position: Duration },
    /// Something the user should be told about
    Notice { message: String },
}

struct SyncControllerInner {
    phase: SessionPhase,
    audio: Option<SourceFile>,
    lyrics: Option<SourceFile>,
    document: LrcDocument,
    playback: PlaybackState,
    active_index: Option<usize>,
    /// Bumped on every start and reset so stale task results can be dropped
    generation: u64,
    cancel_token: CancellationToken,
}

/// Controller for a single-document editing session
pub struct SyncController {
    inner: RwLock<SyncControllerInner>,
    aligner: Arc<dyn LyricsAligner>,
    settings: SessionSettings,
    event_tx: broadcast::Sender<SyncEvent>,
}

impl SyncController {
    /// Create a new controller with an empty document
    #[must_use]
    pub fn new(aligner: Arc<dyn LyricsAligner>, settings: SessionSettings) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(64);
        let document = Self::empty_document(&settings);

        Arc::new(Self {
            inner: RwLock::new(SyncControllerInner {
                phase: SessionPhase::Idle,
                audio: None,
                lyrics: None,
                document,
                playback: PlaybackState::default(),
                active_index: None,
                generation: 0,
                cancel_token: CancellationToken::new(),
            }),
            aligner,
            settings,
            event_tx,
        })
    }

    fn empty_document(settings: &SessionSettings) -> LrcDocument {
        LrcDocument::new(
            LrcMetadata {
                attribution: settings.attribution.clone(),
                ..LrcMetadata::default()
            },
            LineStore::new(),
        )
    }

    /// Subscribe to controller events
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.event_tx.subscribe()
    }

    fn emit(&self, event: SyncEvent) {
        let _ = self.event_tx.send(event);
    }

    fn emit_notice(&self, message: String) {
        self.emit(SyncEvent::Notice { message });
    }

    /// Provide the audio recording.
    ///
    /// Oversized files are rejected up front and the session stays where it
    /// was. When lyrics are already loaded, alignment starts and the handle
    /// of the background task is returned.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::AudioTooLarge`] for files above the size limit,
    /// an IO error if the size cannot be determined, and
    /// [`CoreError::InputsLocked`] outside the idle phase.
    pub async fn load_audio(self: &Arc<Self>, audio: SourceFile) -> Result<Option<JoinHandle<()>>> {
        let size = match audio.size().await {
            Ok(size) => size,
            Err(e) => {
                warn!(target: LOG_TARGET, "Cannot read size of {}: {}", audio.name(), e);
                self.emit_notice(format!("Could not open {}: {e}", audio.name()));
                return Err(e);
            }
        };

        if size > self.settings.max_audio_bytes {
            let err = CoreError::AudioTooLarge {
                name: audio.name(),
                size,
                limit: self.settings.max_audio_bytes,
            };
            warn!(target: LOG_TARGET, "Rejected audio before alignment: {}", err);
            self.emit_notice(err.to_string());
            return Err(err);
        }

        let mut inner = self.inner.write().await;
        Self::ensure_idle(&inner)?;
        info!(target: LOG_TARGET, "Loaded audio {} ({} bytes)", audio.name(), size);
        inner.audio = Some(audio);
        Ok(self.maybe_start(&mut inner))
    }

    /// Provide the raw lyrics text file.
    ///
    /// When audio is already loaded, alignment starts and the handle of the
    /// background task is returned.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InputsLocked`] outside the idle phase.
    pub async fn load_lyrics(self: &Arc<Self>, lyrics: SourceFile) -> Result<Option<JoinHandle<()>>> {
        let mut inner = self.inner.write().await;
        Self::ensure_idle(&inner)?;
        info!(target: LOG_TARGET, "Loaded lyrics {}", lyrics.name());
        inner.lyrics = Some(lyrics);
        Ok(self.maybe_start(&mut inner))
    }

    fn ensure_idle(inner: &SyncControllerInner) -> Result<()> {
        if inner.phase == SessionPhase::Idle {
            Ok(())
        } else {
            Err(CoreError::InputsLocked {
                phase: inner.phase.as_str(),
            })
        }
    }

    /// Enter `Processing` and spawn the alignment task once both inputs exist.
    ///
    /// The phase change is recorded and broadcast before the task is spawned,
    /// so observers always see `Processing` ahead of any slow work.
    fn maybe_start(self: &Arc<Self>, inner: &mut SyncControllerInner) -> Option<JoinHandle<()>> {
        if inner.phase != SessionPhase::Idle {
            return None;
        }
        let (Some(audio), Some(lyrics)) = (inner.audio.clone(), inner.lyrics.clone()) else {
            return None;
        };

        inner.phase = SessionPhase::Processing;
        inner.generation += 1;
        inner.cancel_token = CancellationToken::new();
        let generation = inner.generation;
        let cancel_token = inner.cancel_token.clone();

        info!(
            target: LOG_TARGET,
            "Starting alignment with {} for {} + {}",
            self.aligner.name(),
            audio.name(),
            lyrics.name()
        );
        self.emit(SyncEvent::PhaseChanged {
            phase: SessionPhase::Processing,
        });

        let this = Arc::clone(self);
        Some(tokio::spawn(async move {
            this.process(generation, audio, lyrics, cancel_token).await;
        }))
    }

    /// Background half of a run: align, or fall back to manual lines
    async fn process(
        &self,
        generation: u64,
        audio: SourceFile,
        lyrics: SourceFile,
        cancel_token: CancellationToken,
    ) {
        let outcome = tokio::select! {
            () = cancel_token.cancelled() => {
                info!(target: LOG_TARGET, "Alignment run {} cancelled", generation);
                return;
            }
            outcome = self.align(&audio, &lyrics) => outcome,
        };

        let lines = match outcome {
            Ok(lines) => {
                let flagged = lines.iter().filter(|l| l.needs_review).count();
                info!(
                    target: LOG_TARGET,
                    "Aligned {} lines ({} need review)",
                    lines.len(),
                    flagged
                );
                lines
            }
            Err(e) => {
                warn!(target: LOG_TARGET, "Alignment failed, using manual timing: {}", e);
                self.emit_notice(format!(
                    "Automatic alignment failed ({e}). Lines were loaded without timing."
                ));
                match lyrics.read_text().await {
                    Ok(text) => manual_lines(&text),
                    Err(read_err) => {
                        error!(
                            target: LOG_TARGET,
                            "Cannot read lyrics for manual fallback: {}", read_err
                        );
                        self.emit_notice(format!("Could not read {}: {read_err}", lyrics.name()));
                        self.finish(generation, None).await;
                        return;
                    }
                }
            }
        };

        self.finish(generation, Some(lines)).await;
    }

    async fn align(&self, audio: &SourceFile, lyrics: &SourceFile) -> Result<Vec<LyricLine>> {
        let lyrics_text = lyrics.read_text().await?;
        let bytes = audio.read().await?;

        debug!(target: LOG_TARGET, "Encoding {} bytes of audio", bytes.len());
        let audio_base64 = tokio::task::spawn_blocking(move || STANDARD.encode(bytes))
            .await
            .map_err(|e| CoreError::TaskFailed {
                reason: e.to_string(),
            })?;

        let request = AlignmentRequest {
            audio_base64,
            media_type: audio.media_type().to_string(),
            lyrics: lyrics_text,
        };
        let expected = request.lyric_lines().count();

        let entries = self.aligner.align(&request).await?;
        for entry in &entries {
            entry.validate()?;
        }

        if entries.is_empty() && expected > 0 {
            return Err(CoreError::MalformedAlignment {
                reason: format!("{} returned no lines for {expected} lyric lines", self.aligner.name()),
            });
        }
        if entries.len() != expected {
            warn!(
                target: LOG_TARGET,
                "{} returned {} lines for {} lyric lines",
                self.aligner.name(),
                entries.len(),
                expected
            );
        }

        Ok(lines_from_alignment(entries, self.settings.review_threshold))
    }

    /// Apply the outcome of run `generation` unless a reset superseded it
    async fn finish(&self, generation: u64, lines: Option<Vec<LyricLine>>) {
        let mut inner = self.inner.write().await;
        if inner.generation != generation || inner.phase != SessionPhase::Processing {
            debug!(target: LOG_TARGET, "Discarding result of stale run {}", generation);
            return;
        }

        if let Some(lines) = lines {
            inner.document.lines = LineStore::from_lines(lines);
            inner.phase = SessionPhase::Editing;
            self.emit(SyncEvent::PhaseChanged {
                phase: SessionPhase::Editing,
            });
            self.emit(SyncEvent::DocumentChanged);
            self.refresh_active_index(&mut inner);
        } else {
            inner.phase = SessionPhase::Idle;
            inner.audio = None;
            inner.lyrics = None;
            self.emit(SyncEvent::PhaseChanged {
                phase: SessionPhase::Idle,
            });
        }
    }

    /// Return to `Idle` with an empty document.
    ///
    /// A run still in progress is cancelled and its result discarded.
    pub async fn reset(&self) {
        let mut inner = self.inner.write().await;
        if inner.phase == SessionPhase::Processing {
            info!(target: LOG_TARGET, "Reset while processing, cancelling alignment");
        }
        inner.cancel_token.cancel();
        inner.generation += 1;
        inner.phase = SessionPhase::Idle;
        inner.audio = None;
        inner.lyrics = None;
        inner.document = Self::empty_document(&self.settings);

        self.emit(SyncEvent::PhaseChanged {
            phase: SessionPhase::Idle,
        });
        self.emit(SyncEvent::DocumentChanged);
        self.refresh_active_index(&mut inner);
    }

    /// Resolve against the same interpolated position that edits anchor to
    fn refresh_active_index(&self, inner: &mut SyncControllerInner) {
        let position = inner.playback.interpolated_position();
        let index = inner.document.lines.active_index_at(position);
        if index != inner.active_index {
            inner.active_index = index;
            self.emit(SyncEvent::ActiveLineChanged { index });
        }
    }

    /// Record a playback report and update the active line
    pub async fn update_playback(&self, state: PlaybackState) {
        let mut inner = self.inner.write().await;
        inner.playback = state;
        self.refresh_active_index(&mut inner);
    }

    /// Ask the player to seek to the start of a line
    pub async fn seek_to_line(&self, id: LineId) -> Option<Duration> {
        let position = self.inner.read().await.document.lines.get(id)?.timestamp;
        self.emit(SyncEvent::SeekRequested { position });
        Some(position)
    }

    /// Apply `f` to the document, reporting a change when `applied` says so
    async fn mutate<R>(
        &self,
        f: impl FnOnce(&mut LrcDocument, Duration) -> R,
        applied: impl FnOnce(&R) -> bool,
    ) -> Result<R> {
        let mut inner = self.inner.write().await;
        if inner.phase == SessionPhase::Processing {
            return Err(CoreError::SessionBusy);
        }

        let playback = inner.playback.interpolated_position();
        let result = f(&mut inner.document, playback);
        if applied(&result) {
            self.emit(SyncEvent::DocumentChanged);
            self.refresh_active_index(&mut inner);
        }
        Ok(result)
    }

    /// Run an arbitrary edit against the document
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SessionBusy`] while processing.
    pub async fn edit<R>(&self, f: impl FnOnce(&mut LrcDocument) -> R) -> Result<R> {
        self.mutate(|doc, _| f(doc), |_| true).await
    }

    /// Merge fields into a line
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SessionBusy`] while processing.
    pub async fn update_line(&self, id: LineId, patch: LinePatch) -> Result<bool> {
        self.mutate(|doc, _| doc.lines.update_line(id, patch), |applied| *applied)
            .await
    }

    /// Delete a line
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SessionBusy`] while processing.
    pub async fn delete_line(&self, id: LineId) -> Result<Option<LyricLine>> {
        self.mutate(|doc, _| doc.lines.delete_line(id), Option::is_some)
            .await
    }

    /// Insert an empty line after display index `index`, timed from playback
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SessionBusy`] while processing.
    pub async fn insert_line_after(&self, index: usize) -> Result<Option<LineId>> {
        self.mutate(
            |doc, playback| doc.lines.insert_after(index, playback),
            Option::is_some,
        )
        .await
    }

    /// Append an empty line at the current playback position
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SessionBusy`] while processing.
    pub async fn append_line(&self) -> Result<LineId> {
        self.mutate(|doc, playback| doc.lines.append_line(playback), |_| true)
            .await
    }

    /// Anchor a line to the current playback position
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SessionBusy`] while processing.
    pub async fn sync_line(&self, id: LineId) -> Result<bool> {
        self.mutate(
            |doc, playback| doc.lines.sync_to_playback(id, playback),
            |applied| *applied,
        )
        .await
    }

    /// Shift a line by a signed number of seconds
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SessionBusy`] while processing.
    pub async fn nudge_line(&self, id: LineId, delta_secs: f64) -> Result<bool> {
        self.mutate(|doc, _| doc.lines.nudge(id, delta_secs), |applied| *applied)
            .await
    }

    /// Replace the document metadata
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::SessionBusy`] while processing.
    pub async fn set_metadata(&self, metadata: LrcMetadata) -> Result<()> {
        self.mutate(|doc, _| doc.metadata = metadata, |()| true).await
    }

    /// Current phase
    pub async fn phase(&self) -> SessionPhase {
        self.inner.read().await.phase
    }

    /// Snapshot of the document
    pub async fn document(&self) -> LrcDocument {
        self.inner.read().await.document.clone()
    }

    /// Render the live document as LRC text
    pub async fn export(&self) -> String {
        self.inner.read().await.document.render()
    }

    /// Display index of the active line
    pub async fn active_index(&self) -> Option<usize> {
        self.inner.read().await.active_index
    }

    /// Last playback report
    pub async fn playback(&self) -> PlaybackState {
        self.inner.read().await.playback.clone()
    }
}
