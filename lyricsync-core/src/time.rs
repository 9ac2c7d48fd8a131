//! Timestamp codec for the `[mm:ss.xx]` notation used by LRC files.
//!
//! Timestamps are held as [`Duration`] so they can never go negative. Values
//! coming from the outside world as real seconds (playback positions, nudges)
//! are clamped on the way in. Formatting truncates to hundredths of a second
//! with integer arithmetic and parsing reads decimal digits exactly, so a
//! centisecond-precision duration survives `parse(format(d))` unchanged.

use std::time::Duration;

const NANOS_PER_SEC: i128 = 1_000_000_000;
const FRACTION_DIGITS: usize = 9;

/// Extension trait for timestamp arithmetic on [`Duration`].
pub trait DurationExt {
    /// Whole hundredths of a second, truncated, saturating at `u64::MAX`.
    fn as_centis_u64(&self) -> u64;

    /// Shift by a signed number of seconds, clamping at zero.
    ///
    /// A non-finite delta leaves the duration unchanged.
    #[must_use]
    fn offset_by_secs(&self, delta_secs: f64) -> Duration;
}

impl DurationExt for Duration {
    fn as_centis_u64(&self) -> u64 {
        u64::try_from(self.as_millis() / 10).unwrap_or(u64::MAX)
    }

    fn offset_by_secs(&self, delta_secs: f64) -> Duration {
        if !delta_secs.is_finite() {
            return *self;
        }
        if delta_secs >= 0.0 {
            self.saturating_add(duration_from_secs(delta_secs))
        } else {
            self.saturating_sub(duration_from_secs(-delta_secs))
        }
    }
}

/// Convert real seconds into a [`Duration`], clamping negatives and NaN to zero.
#[must_use]
pub fn duration_from_secs(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

/// Format a timestamp as `[MM:SS.CC]`.
///
/// Minutes are zero-padded to two digits but not capped, so an hour-long
/// position renders as `[60:00.00]`.
#[must_use]
pub fn format_timestamp(time: Duration) -> String {
    let centis = time.as_centis_u64();
    let minutes = centis / 6000;
    let seconds = (centis / 100) % 60;
    let hundredths = centis % 100;
    format!("[{minutes:02}:{seconds:02}.{hundredths:02}]")
}

/// Parse a `mm:ss.xx` timestamp, with or without surrounding brackets.
///
/// Every `[` and `]` is stripped first, then the remainder must split on `:`
/// into exactly two decimal numbers. Returns `None` for anything else.
/// A negative total clamps to zero.
#[must_use]
pub fn parse_timestamp(text: &str) -> Option<Duration> {
    let cleaned: String = text.chars().filter(|c| !matches!(c, '[' | ']')).collect();

    let parts: Vec<&str> = cleaned.split(':').collect();
    if parts.len() != 2 {
        return None;
    }

    let minutes = parse_decimal_nanos(parts[0])?;
    let seconds = parse_decimal_nanos(parts[1])?;
    let total = minutes.checked_mul(60)?.checked_add(seconds)?;

    if total <= 0 {
        return Some(Duration::ZERO);
    }

    let secs = u64::try_from(total / NANOS_PER_SEC).ok()?;
    let nanos = u32::try_from(total % NANOS_PER_SEC).ok()?;
    Some(Duration::new(secs, nanos))
}

/// Best-effort parse: malformed input yields zero instead of failing.
#[must_use]
pub fn parse_timestamp_lossy(text: &str) -> Duration {
    parse_timestamp(text).unwrap_or_default()
}

/// Parse an optionally signed decimal like `12`, `12.34` or `.5` into nanoseconds.
/// Digits past the ninth fractional place are truncated.
fn parse_decimal_nanos(s: &str) -> Option<i128> {
    let s = s.trim();
    let (negative, unsigned) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let (whole, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let mut value: i128 = 0;
    for digit in whole.bytes() {
        value = value.checked_mul(10)?.checked_add(i128::from(digit - b'0'))?;
    }
    value = value.checked_mul(NANOS_PER_SEC)?;

    let mut scale = NANOS_PER_SEC / 10;
    for digit in fraction.bytes().take(FRACTION_DIGITS) {
        value += i128::from(digit - b'0') * scale;
        scale /= 10;
    }

    Some(if negative { -value } else { value })
}
