use crate::error::CoreError;
use crate::store::LyricLine;
use crate::time::parse_timestamp;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Confidence below which an aligned line is flagged for review
pub const DEFAULT_REVIEW_THRESHOLD: f64 = 0.7;

/// Input for an alignment request
#[derive(Debug, Clone)]
pub struct AlignmentRequest {
    /// Audio payload, base64 encoded
    pub audio_base64: String,
    /// Media type of the audio, e.g. `audio/mpeg`
    pub media_type: String,
    /// Raw lyrics text as supplied by the user
    pub lyrics: String,
}

impl AlignmentRequest {
    /// Non-blank lyric lines in the order the aligner should return them
    pub fn lyric_lines(&self) -> impl Iterator<Item = &str> {
        self.lyrics.lines().map(str::trim).filter(|line| !line.is_empty())
    }
}

/// One entry returned by an aligner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedLine {
    /// Start time in `[mm:ss.xx]`-compatible notation
    pub time: String,
    pub text: String,
    /// Confidence in `[0, 1]`
    pub confidence: f64,
}

impl AlignedLine {
    /// Check the entry against the response schema
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MalformedAlignment`] if the confidence is not a
    /// finite number in `[0, 1]`.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(CoreError::MalformedAlignment {
                reason: format!(
                    "confidence {} for {:?} is outside [0, 1]",
                    self.confidence, self.text
                ),
            });
        }
        Ok(())
    }
}

/// Parse and validate a JSON array of aligned lines.
///
/// Any deviation from the `[{time, text, confidence}]` shape fails the whole
/// response; there is no partial recovery.
///
/// # Errors
///
/// Returns an error if the JSON is malformed or any entry fails validation.
pub fn parse_alignment_json(json: &str) -> Result<Vec<AlignedLine>, CoreError> {
    let entries: Vec<AlignedLine> =
        serde_json::from_str(json.trim()).map_err(|e| CoreError::MalformedAlignment {
            reason: e.to_string(),
        })?;
    for entry in &entries {
        entry.validate()?;
    }
    Ok(entries)
}

/// Turn validated aligner output into lyric lines.
///
/// A time that cannot be parsed falls back to zero and the line is flagged
/// for review, as is any line whose confidence is under `review_threshold`.
#[must_use]
pub fn lines_from_alignment(entries: Vec<AlignedLine>, review_threshold: f64) -> Vec<LyricLine> {
    entries
        .into_iter()
        .map(|entry| {
            let parsed = parse_timestamp(&entry.time);
            let needs_review = parsed.is_none() || entry.confidence < review_threshold;
            LyricLine::new(parsed.unwrap_or_default(), entry.text, needs_review)
        })
        .collect()
}

/// Build unaligned lines from raw lyrics: one per non-blank line, all at zero
/// and flagged for review. Line text is kept verbatim apart from the line
/// terminator.
#[must_use]
pub fn manual_lines(raw_lyrics: &str) -> Vec<LyricLine> {
    raw_lyrics
        .lines()
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !line.trim().is_empty())
        .map(|line| LyricLine::new(Duration::ZERO, line, true))
        .collect()
}

/// Trait for the external service that estimates line start times
#[async_trait]
pub trait LyricsAligner: Send + Sync {
    /// Get the aligner name
    fn name(&self) -> &'static str;

    /// Estimate a start time for every lyric line in the request
    async fn align(&self, request: &AlignmentRequest) -> Result<Vec<AlignedLine>, CoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_from_alignment() {
        let entries = vec![
            AlignedLine {
                time: "[00:05.00]".to_string(),
                text: "hello".to_string(),
                confidence: 0.9,
            },
            AlignedLine {
                time: "[00:10.50]".to_string(),
                text: "world".to_string(),
                confidence: 0.4,
            },
        ];

        let lines = lines_from_alignment(entries, DEFAULT_REVIEW_THRESHOLD);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].timestamp, Duration::from_secs(5));
        assert_eq!(lines[0].text, "hello");
        assert!(!lines[0].needs_review);
        assert_eq!(lines[1].timestamp, Duration::from_millis(10_500));
        assert_eq!(lines[1].text, "world");
        assert!(lines[1].needs_review);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let entries = vec![AlignedLine {
            time: "00:01.00".to_string(),
            text: "edge".to_string(),
            confidence: 0.7,
        }];
        let lines = lines_from_alignment(entries, 0.7);
        assert!(!lines[0].needs_review);
    }

    #[test]
    fn test_unparseable_time_flags_review() {
        let entries = vec![AlignedLine {
            time: "soon".to_string(),
            text: "x".to_string(),
            confidence: 1.0,
        }];
        let lines = lines_from_alignment(entries, DEFAULT_REVIEW_THRESHOLD);
        assert_eq!(lines[0].timestamp, Duration::ZERO);
        assert!(lines[0].needs_review);
    }

    #[test]
    fn test_manual_lines_skip_blank() {
        let lines = manual_lines("line one\nline two\n\nline three");
        assert_eq!(lines.len(), 3);
        assert!(lines.iter().all(|l| l.timestamp == Duration::ZERO && l.needs_review));
        let texts: Vec<_> = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["line one", "line two", "line three"]);
    }

    #[test]
    fn test_manual_lines_whitespace_and_crlf() {
        let lines = manual_lines("  first  \r\n   \r\nsecond\r\n\tthird\r");
        let texts: Vec<_> = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["  first  ", "second", "\tthird"]);
    }

    #[test]
    fn test_parse_alignment_json() {
        let json = r#"[{"time":"[00:05.00]","text":"hello","confidence":0.9}]"#;
        let entries = parse_alignment_json(json).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].text, "hello");
    }

    #[test]
    fn test_parse_alignment_json_rejects_bad_shape() {
        for json in [
            "not json",
            r#"{"time":"[00:05.00]","text":"x","confidence":0.9}"#,
            r#"[{"time":"[00:05.00]","text":"x"}]"#,
            r#"[{"time":5,"text":"x","confidence":0.9}]"#,
            r#"[{"time":"[00:05.00]","text":"x","confidence":1.5}]"#,
            r#"[{"time":"[00:05.00]","text":"x","confidence":-0.1}]"#,
        ] {
            assert!(
                matches!(parse_alignment_json(json), Err(CoreError::MalformedAlignment { .. })),
                "accepted {json}"
            );
        }
    }

    #[test]
    fn test_request_lyric_lines() {
        let request = AlignmentRequest {
            audio_base64: String::new(),
            media_type: "audio/mpeg".to_string(),
            lyrics: "a\n\n b \n".to_string(),
        };
        assert_eq!(request.lyric_lines().collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
