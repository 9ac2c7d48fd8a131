use crate::store::LyricLine;
use crate::time::duration_from_secs;
use std::time::Duration;

/// Find the active line for a playback position given in real seconds.
///
/// Scans `lines` in display order and returns the index of the last line
/// whose timestamp is at or before `position_secs`, stopping at the first
/// line that starts later. Lines created out of chronological order can
/// therefore end the scan early. Returns `None` when no line qualifies,
/// including for negative or NaN positions.
#[must_use]
pub fn active_line_index(lines: &[LyricLine], position_secs: f64) -> Option<usize> {
    if position_secs.is_nan() || position_secs < 0.0 {
        return None;
    }
    // Compare as Duration: a line stored at 1.14s must be active at 1.14
    active_line_index_at(lines, duration_from_secs(position_secs))
}

/// [`active_line_index`] for a position already held as a [`Duration`]
#[must_use]
pub fn active_line_index_at(lines: &[LyricLine], position: Duration) -> Option<usize> {
    lines
        .iter()
        .take_while(|line| line.timestamp <= position)
        .count()
        .checked_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(times_ms: &[u64]) -> Vec<LyricLine> {
        times_ms
            .iter()
            .map(|&ms| LyricLine::new(Duration::from_millis(ms), "", false))
            .collect()
    }

    #[test]
    fn test_active_line_index() {
        let lines = lines(&[0, 10_000, 20_000]);

        assert_eq!(active_line_index(&lines, -1.0), None);
        assert_eq!(active_line_index(&lines, 0.0), Some(0));
        assert_eq!(active_line_index(&lines, 9.99), Some(0));
        assert_eq!(active_line_index(&lines, 10.0), Some(1));
        assert_eq!(active_line_index(&lines, 25.0), Some(2));
    }

    #[test]
    fn test_line_active_at_its_own_timestamp() {
        let misses: Vec<u64> = (0..60_000u64)
            .filter(|&centis| {
                let line = LyricLine::new(Duration::from_millis(centis * 10), "", false);
                let position: f64 = format!("{}.{:02}", centis / 100, centis % 100)
                    .parse()
                    .unwrap();
                active_line_index(std::slice::from_ref(&line), position) != Some(0)
            })
            .collect();
        assert!(misses.is_empty(), "lines not active at their timestamp: {misses:?}");
    }

    #[test]
    fn test_just_before_line_is_not_active() {
        let lines = lines(&[0, 1_140]);
        assert_eq!(active_line_index(&lines, 1.139_999), Some(0));
        assert_eq!(active_line_index(&lines, 1.14), Some(1));
    }

    #[test]
    fn test_empty_lines() {
        assert_eq!(active_line_index(&[], 5.0), None);
    }

    #[test]
    fn test_before_first_line() {
        let lines = lines(&[5_000, 10_000]);
        assert_eq!(active_line_index(&lines, 4.0), None);
    }

    #[test]
    fn test_out_of_order_lines_stop_scan() {
        // Display order 0s, 30s, 10s: at 15s the scan stops at the 30s line
        let lines = lines(&[0, 30_000, 10_000]);
        assert_eq!(active_line_index(&lines, 15.0), Some(0));
        assert_eq!(active_line_index(&lines, 35.0), Some(2));
    }

    #[test]
    fn test_nan_position() {
        let lines = lines(&[0]);
        assert_eq!(active_line_index(&lines, f64::NAN), None);
    }
}
