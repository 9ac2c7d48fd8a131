//! LRC document model: metadata header plus a [`LineStore`] body.

use crate::store::{LineStore, LyricLine};
use crate::time::{format_timestamp, parse_timestamp};
use std::fmt::Write;
use std::time::Duration;

/// Attribution written to `[by:]` unless the user overrides it
pub const DEFAULT_ATTRIBUTION: &str = "LyricSync";

/// Extension used for exported files
pub const LRC_EXTENSION: &str = "lrc";

/// File stem used when the title is blank
const FALLBACK_FILE_STEM: &str = "lyrics";

/// LRC metadata from ID tags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LrcMetadata {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub attribution: String,
}

impl Default for LrcMetadata {
    fn default() -> Self {
        Self {
            title: String::new(),
            artist: String::new(),
            album: String::new(),
            attribution: DEFAULT_ATTRIBUTION.to_string(),
        }
    }
}

impl LrcMetadata {
    /// Header tags in export order
    #[must_use]
    pub fn tags(&self) -> [(&'static str, &str); 4] {
        [
            ("ti", self.title.as_str()),
            ("ar", self.artist.as_str()),
            ("al", self.album.as_str()),
            ("by", self.attribution.as_str()),
        ]
    }
}

/// A lyrics document being edited: metadata and lines in display order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LrcDocument {
    pub metadata: LrcMetadata,
    pub lines: LineStore,
}

impl LrcDocument {
    #[must_use]
    pub fn new(metadata: LrcMetadata, lines: LineStore) -> Self {
        Self { metadata, lines }
    }

    /// Render the exportable LRC text.
    ///
    /// The four header tags come first, each on its own line, followed by the
    /// body sorted by timestamp. Body lines are joined with `\n` and carry no
    /// trailing newline.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (tag, value) in self.metadata.tags() {
            let _ = writeln!(out, "[{tag}:{value}]");
        }

        let body = self
            .lines
            .time_sorted()
            .into_iter()
            .map(|line| format!("{}{}", format_timestamp(line.timestamp), line.text))
            .collect::<Vec<_>>()
            .join("\n");
        out.push_str(&body);
        out
    }

    /// Default file name for the export, derived from the title
    #[must_use]
    pub fn export_file_name(&self) -> String {
        let title = self.metadata.title.trim();
        let stem = if title.is_empty() {
            FALLBACK_FILE_STEM.to_string()
        } else {
            title.replace(['/', '\\'], "_")
        };
        format!("{stem}.{LRC_EXTENSION}")
    }

    /// Parse LRC text back into a document.
    ///
    /// Never fails: lines that are neither ID tags nor timestamped lyrics are
    /// skipped. Imported lines are considered reviewed.
    #[must_use]
    pub fn parse_lrc(input: &str) -> Self {
        let mut metadata = LrcMetadata::default();
        let mut author: Option<String> = None;
        let mut has_by_tag = false;
        let mut offset_ms: i64 = 0;
        let mut lines = Vec::new();

        for raw in input.lines() {
            let line = raw.trim_start();
            if line.trim().is_empty() {
                continue;
            }

            // Try to parse as ID tag first
            if let Some((tag, value)) = parse_id_tag(line) {
                match tag.to_lowercase().as_str() {
                    "ti" => metadata.title = value,
                    "ar" => metadata.artist = value,
                    "al" => metadata.album = value,
                    "by" => {
                        metadata.attribution = value;
                        has_by_tag = true;
                    }
                    "au" => author = Some(value),
                    "offset" => {
                        if let Ok(offset) = value.parse::<i64>() {
                            offset_ms = offset;
                        }
                    }
                    _ => {} // Ignore unknown tags
                }
                continue;
            }

            if let Some(parsed) = parse_lyric_line(line) {
                lines.extend(parsed);
            }
        }

        if !has_by_tag {
            if let Some(author) = author {
                metadata.attribution = author;
            }
        }

        if offset_ms != 0 {
            for line in &mut lines {
                line.timestamp = apply_offset(line.timestamp, offset_ms);
            }
        }

        lines.sort_by_key(|l| l.timestamp);

        Self {
            metadata,
            lines: LineStore::from_lines(lines),
        }
    }
}

/// Parse an ID tag like [ti:Title] or [ar:Artist]
fn parse_id_tag(line: &str) -> Option<(String, String)> {
    if !line.starts_with('[') || !line.contains(':') {
        return None;
    }

    let end = line.find(']')?;
    let content = &line[1..end];

    let first_colon = content.find(':')?;
    let tag = &content[..first_colon];

    // A numeric tag part is a timestamp, not an ID tag
    if tag.is_empty() || tag.trim().chars().all(|c| c.is_ascii_digit() || c == '-') {
        return None;
    }

    let value = content[first_colon + 1..].trim().to_string();
    Some((tag.trim().to_string(), value))
}

/// Parse a lyric line like [00:12.34]Hello world or [00:12.34][00:15.67]Same lyrics
fn parse_lyric_line(line: &str) -> Option<Vec<LyricLine>> {
    let mut remaining = line;
    let mut timestamps = Vec::new();

    while remaining.starts_with('[') {
        let Some(end) = remaining.find(']') else {
            break;
        };
        match parse_timestamp(&remaining[1..end]) {
            Some(time) => {
                timestamps.push(time);
                remaining = &remaining[end + 1..];
            }
            None => break,
        }
    }

    if timestamps.is_empty() {
        return None;
    }

    Some(
        timestamps
            .into_iter()
            .map(|timestamp| LyricLine::new(timestamp, remaining, false))
            .collect(),
    )
}

/// Apply a millisecond offset to a duration (can be negative)
fn apply_offset(duration: Duration, offset_ms: i64) -> Duration {
    let magnitude = Duration::from_millis(offset_ms.unsigned_abs());
    if offset_ms >= 0 {
        duration.saturating_add(magnitude)
    } else {
        duration.saturating_sub(magnitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::parse_timestamp_lossy;

    fn document(lines: Vec<LyricLine>) -> LrcDocument {
        LrcDocument::new(
            LrcMetadata {
                title: "Song".to_string(),
                artist: "Artist".to_string(),
                album: "Album".to_string(),
                ..LrcMetadata::default()
            },
            LineStore::from_lines(lines),
        )
    }

    #[test]
    fn test_render_header_and_body() {
        let doc = document(vec![
            LyricLine::new(Duration::from_millis(5_000), "hello", false),
            LyricLine::new(Duration::from_millis(10_500), "world", true),
        ]);
        assert_eq!(
            doc.render(),
            "[ti:Song]\n[ar:Artist]\n[al:Album]\n[by:LyricSync]\n[00:05.00]hello\n[00:10.50]world"
        );
    }

    #[test]
    fn test_render_sorts_by_timestamp() {
        let doc = document(vec![
            LyricLine::new(Duration::from_secs(10), "b", false),
            LyricLine::new(Duration::from_secs(2), "a", false),
        ]);
        let rendered = doc.render();
        let body: Vec<_> = rendered.lines().skip(4).collect();
        assert_eq!(body, vec!["[00:02.00]a", "[00:10.00]b"]);
        // The store itself keeps display order
        assert_eq!(doc.lines.as_slice()[0].text, "b");
    }

    #[test]
    fn test_render_empty_document() {
        let doc = LrcDocument::default();
        assert_eq!(doc.render(), "[ti:]\n[ar:]\n[al:]\n[by:LyricSync]\n");
    }

    #[test]
    fn test_render_keeps_text_verbatim() {
        let doc = document(vec![LyricLine::new(Duration::ZERO, "  [x] <y> 你好 ", false)]);
        assert!(doc.render().ends_with("[00:00.00]  [x] <y> 你好 "));
    }

    #[test]
    fn test_exported_timestamps_round_trip() {
        let times = [0, 1_230, 59_990, 61_010, 754_320];
        let doc = document(
            times
                .iter()
                .map(|&ms| LyricLine::new(Duration::from_millis(ms), "x", false))
                .collect(),
        );

        let parsed: Vec<Duration> = doc
            .render()
            .lines()
            .skip(4)
            .map(|line| parse_timestamp_lossy(&line[..line.find(']').unwrap() + 1]))
            .collect();
        let expected: Vec<Duration> = times.iter().map(|&ms| Duration::from_millis(ms)).collect();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_export_file_name() {
        let mut doc = LrcDocument::default();
        assert_eq!(doc.export_file_name(), "lyrics.lrc");

        doc.metadata.title = "  ".to_string();
        assert_eq!(doc.export_file_name(), "lyrics.lrc");

        doc.metadata.title = "AC/DC Live".to_string();
        assert_eq!(doc.export_file_name(), "AC_DC Live.lrc");
    }

    #[test]
    fn test_parse_simple_lrc() {
        let doc = LrcDocument::parse_lrc("[00:12.34]Hello world");
        assert_eq!(doc.lines.len(), 1);
        let line = &doc.lines.as_slice()[0];
        assert_eq!(line.timestamp, Duration::from_millis(12_340));
        assert_eq!(line.text, "Hello world");
        assert!(!line.needs_review);
    }

    #[test]
    fn test_parse_id_tags() {
        let input = r"
[ti:Song Title]
[ar:Artist Name]
[al:Album Name]
[by:Someone]
[00:05.00]Lyrics here
";
        let doc = LrcDocument::parse_lrc(input);
        assert_eq!(doc.metadata.title, "Song Title");
        assert_eq!(doc.metadata.artist, "Artist Name");
        assert_eq!(doc.metadata.album, "Album Name");
        assert_eq!(doc.metadata.attribution, "Someone");
    }

    #[test]
    fn test_parse_author_alias() {
        let doc = LrcDocument::parse_lrc("[au:Writer]\n[00:01.00]x");
        assert_eq!(doc.metadata.attribution, "Writer");

        let doc = LrcDocument::parse_lrc("[by:Editor]\n[au:Writer]\n[00:01.00]x");
        assert_eq!(doc.metadata.attribution, "Editor");
    }

    #[test]
    fn test_parse_offset() {
        let doc = LrcDocument::parse_lrc("[offset:500]\n[00:10.00]Test");
        assert_eq!(doc.lines.as_slice()[0].timestamp, Duration::from_millis(10_500));

        let doc = LrcDocument::parse_lrc("[offset:-500]\n[00:10.00]Test\n[00:00.20]Early");
        let times: Vec<_> = doc.lines.iter().map(|l| l.timestamp).collect();
        assert_eq!(times, vec![Duration::ZERO, Duration::from_millis(9_500)]);
    }

    #[test]
    fn test_parse_multi_timestamp_line() {
        let doc = LrcDocument::parse_lrc("[00:05.00][00:15.00]Repeated lyric");
        assert_eq!(doc.lines.len(), 2);
        let lines = doc.lines.as_slice();
        assert_eq!(lines[0].text, "Repeated lyric");
        assert_eq!(lines[1].text, "Repeated lyric");
        assert_eq!(lines[0].timestamp, Duration::from_secs(5));
        assert_eq!(lines[1].timestamp, Duration::from_secs(15));
        assert_ne!(lines[0].id, lines[1].id);
    }

    #[test]
    fn test_parse_sorts_and_skips_garbage() {
        let input = "[00:10.00]Second\nnot a lyric\n[xx:yy]junk\n\n[00:05.00]First\n";
        let doc = LrcDocument::parse_lrc(input);
        let texts: Vec<_> = doc.lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["First", "Second"]);
    }

    #[test]
    fn test_parse_keeps_bracketed_text() {
        let doc = LrcDocument::parse_lrc("[00:01.00][Chorus] la la");
        assert_eq!(doc.lines.as_slice()[0].text, "[Chorus] la la");
    }

    #[test]
    fn test_parse_windows_line_endings() {
        let doc = LrcDocument::parse_lrc("[ti:T]\r\n[00:01.00]one\r\n[00:02.00]two\r\n");
        assert_eq!(doc.metadata.title, "T");
        let texts: Vec<_> = doc.lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two"]);
    }

    #[test]
    fn test_render_then_parse() {
        let doc = document(vec![
            LyricLine::new(Duration::from_millis(65_430), "late", false),
            LyricLine::new(Duration::from_millis(1_000), "early", false),
            LyricLine::new(Duration::from_millis(2_000), "", false),
        ]);
        let reparsed = LrcDocument::parse_lrc(&doc.render());

        assert_eq!(reparsed.metadata, doc.metadata);
        let got: Vec<_> = reparsed.lines.iter().map(|l| (l.timestamp, l.text.clone())).collect();
        let want: Vec<_> = doc
            .lines
            .time_sorted()
            .into_iter()
            .map(|l| (l.timestamp, l.text.clone()))
            .collect();
        assert_eq!(got, want);
    }
}
