//! The editable collection of lyric lines.
//!
//! Lines are kept in display order: the order they were created or inserted.
//! Nothing here sorts by time; export sorting lives in [`crate::lrc`].
//! Every mutation targets a line by its [`LineId`] (or a display index for
//! insertion) and is either applied completely or not at all. Unknown ids
//! are silent no-ops.

use crate::resolver::{active_line_index, active_line_index_at};
use crate::time::DurationExt;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Gap used for an inserted line when playback has not moved past its anchor.
pub const INSERT_GAP: Duration = Duration::from_secs(2);

/// Opaque identifier of a lyric line, stable for the line's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineId(Uuid);

impl LineId {
    /// Generate a fresh random identifier
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One line of lyrics anchored to a point in the audio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LyricLine {
    pub id: LineId,
    pub timestamp: Duration,
    pub text: String,
    /// Set when the timestamp is an unverified guess
    pub needs_review: bool,
}

impl LyricLine {
    /// Create a line with a freshly generated id
    pub fn new(timestamp: Duration, text: impl Into<String>, needs_review: bool) -> Self {
        Self {
            id: LineId::generate(),
            timestamp,
            text: text.into(),
            needs_review,
        }
    }

    /// Timestamp in real seconds
    #[must_use]
    pub fn timestamp_secs(&self) -> f64 {
        self.timestamp.as_secs_f64()
    }
}

/// Partial update for [`LineStore::update_line`]. `None` fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinePatch {
    pub text: Option<String>,
    pub timestamp: Option<Duration>,
    pub needs_review: Option<bool>,
}

impl LinePatch {
    /// Patch that replaces only the text
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Patch that replaces only the timestamp
    #[must_use]
    pub fn timestamp(timestamp: Duration) -> Self {
        Self {
            timestamp: Some(timestamp),
            ..Self::default()
        }
    }

    /// Also set the review flag
    #[must_use]
    pub const fn with_needs_review(mut self, needs_review: bool) -> Self {
        self.needs_review = Some(needs_review);
        self
    }
}

/// Ordered lyric lines in display order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineStore {
    lines: Vec<LyricLine>,
}

impl LineStore {
    #[must_use]
    pub const fn new() -> Self {
        Self { lines: Vec::new() }
    }

    /// Build a store from lines already in display order.
    ///
    /// Lines must come from [`LyricLine::new`] so their ids are distinct.
    #[must_use]
    pub const fn from_lines(lines: Vec<LyricLine>) -> Self {
        Self { lines }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Lines in display order
    pub fn iter(&self) -> std::slice::Iter<'_, LyricLine> {
        self.lines.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[LyricLine] {
        &self.lines
    }

    #[must_use]
    pub fn get(&self, id: LineId) -> Option<&LyricLine> {
        self.lines.iter().find(|line| line.id == id)
    }

    /// Display index of a line
    #[must_use]
    pub fn position(&self, id: LineId) -> Option<usize> {
        self.lines.iter().position(|line| line.id == id)
    }

    fn get_mut(&mut self, id: LineId) -> Option<&mut LyricLine> {
        self.lines.iter_mut().find(|line| line.id == id)
    }

    /// Merge `patch` into the matching line. Returns `false` if `id` is unknown.
    pub fn update_line(&mut self, id: LineId, patch: LinePatch) -> bool {
        let Some(line) = self.get_mut(id) else {
            return false;
        };
        if let Some(text) = patch.text {
            line.text = text;
        }
        if let Some(timestamp) = patch.timestamp {
            line.timestamp = timestamp;
        }
        if let Some(needs_review) = patch.needs_review {
            line.needs_review = needs_review;
        }
        true
    }

    /// Remove the matching line, returning it
    pub fn delete_line(&mut self, id: LineId) -> Option<LyricLine> {
        let index = self.position(id)?;
        Some(self.lines.remove(index))
    }

    /// Insert an empty line right after display index `index`.
    ///
    /// The new line starts at `playback` when playback has moved past the
    /// anchor line, otherwise [`INSERT_GAP`] after it. Returns `None` when
    /// `index` is out of range.
    pub fn insert_after(&mut self, index: usize, playback: Duration) -> Option<LineId> {
        let anchor = self.lines.get(index)?.timestamp;
        let timestamp = if playback > anchor {
            playback
        } else {
            anchor.saturating_add(INSERT_GAP)
        };

        let line = LyricLine::new(timestamp, String::new(), false);
        let id = line.id;
        self.lines.insert(index + 1, line);
        Some(id)
    }

    /// Append an empty line at the end of display order
    pub fn append_line(&mut self, playback: Duration) -> LineId {
        let line = LyricLine::new(playback, String::new(), false);
        let id = line.id;
        self.lines.push(line);
        id
    }

    /// Anchor a line to the playback position and mark it reviewed
    pub fn sync_to_playback(&mut self, id: LineId, playback: Duration) -> bool {
        let Some(line) = self.get_mut(id) else {
            return false;
        };
        line.timestamp = playback;
        line.needs_review = false;
        true
    }

    /// Shift a line's timestamp by a signed number of seconds, clamped at zero
    pub fn nudge(&mut self, id: LineId, delta_secs: f64) -> bool {
        let Some(line) = self.get_mut(id) else {
            return false;
        };
        line.timestamp = line.timestamp.offset_by_secs(delta_secs);
        true
    }

    /// Display index of the active line at `position_secs`
    #[must_use]
    pub fn active_index(&self, position_secs: f64) -> Option<usize> {
        active_line_index(&self.lines, position_secs)
    }

    /// Display index of the active line at `position`
    #[must_use]
    pub fn active_index_at(&self, position: Duration) -> Option<usize> {
        active_line_index_at(&self.lines, position)
    }

    /// Lines stably sorted by timestamp, ties kept in display order
    #[must_use]
    pub fn time_sorted(&self) -> Vec<&LyricLine> {
        let mut sorted: Vec<&LyricLine> = self.lines.iter().collect();
        sorted.sort_by_key(|line| line.timestamp);
        sorted
    }
}

impl<'a> IntoIterator for &'a LineStore {
    type Item = &'a LyricLine;
    type IntoIter = std::slice::Iter<'a, LyricLine>;

    fn into_iter(self) -> Self::IntoIter {
        self.lines.iter()
    }
}
