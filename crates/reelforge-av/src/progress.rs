//! Percentage progress from ffmpeg diagnostic output.
//!
//! ffmpeg prints the input duration once (`Duration: 00:01:02.50, ...`) and
//! then a status line per update (`frame=.. time=00:00:10.00 ..`).
//! [`ProgressParser`] is a reducer over those lines: feed it one line at a
//! time and it returns a percentage whenever the integer value changes.

/// Parse an `HH:MM:SS.frac` timestamp into seconds.
///
/// Returns `None` for anything else, including `N/A` and negative times.
pub fn parse_timestamp(s: &str) -> Option<f64> {
    let mut parts = s.trim().split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Some(hours as f64 * 3600.0 + minutes as f64 * 60.0 + seconds)
}

/// Extract the `Duration:` value from a line, if present.
fn duration_marker(line: &str) -> Option<f64> {
    let rest = &line[line.find("Duration:")? + "Duration:".len()..];
    let value = rest
        .trim_start()
        .split(|c: char| c == ',' || c.is_whitespace())
        .next()?;
    parse_timestamp(value)
}

/// Extract the `time=` value from a line, if present.
fn position_marker(line: &str) -> Option<f64> {
    let mut search = line;
    while let Some(idx) = search.find("time=") {
        let preceded_by_word = search[..idx]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_alphanumeric() || c == '_');
        let rest = &search[idx + "time=".len()..];
        if !preceded_by_word {
            let value = rest.split_whitespace().next()?;
            return parse_timestamp(value);
        }
        search = rest;
    }
    None
}

/// Reducer turning diagnostic lines into de-duplicated percentages.
///
/// State is `{duration, last}`; nothing is shared between instances.
#[derive(Debug, Clone, Default)]
pub struct ProgressParser {
    duration: Option<f64>,
    last: Option<u8>,
}

impl ProgressParser {
    /// Create a parser with no duration seen yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total duration in seconds, once seen.
    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    /// The last percentage emitted.
    pub fn last(&self) -> Option<u8> {
        self.last
    }

    /// Consume one line, returning a percentage if it differs from the last
    /// one emitted.
    ///
    /// Only the first valid duration marker is recorded. A position that goes
    /// backwards is passed through as-is.
    pub fn feed(&mut self, line: &str) -> Option<u8> {
        if self.duration.is_none() {
            if let Some(total) = duration_marker(line) {
                if total > 0.0 {
                    self.duration = Some(total);
                }
                return None;
            }
        }

        let total = self.duration?;
        let current = position_marker(line)?;
        let pct = ((current / total) * 100.0).floor().clamp(0.0, 100.0) as u8;

        if self.last == Some(pct) {
            return None;
        }
        self.last = Some(pct);
        Some(pct)
    }

    /// Report completion after a successful exit.
    ///
    /// Returns `Some(100)` unless 100 was already emitted.
    pub fn finish(&mut self) -> Option<u8> {
        if self.last == Some(100) {
            return None;
        }
        self.last = Some(100);
        Some(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(secs: f64) -> String {
        let h = (secs / 3600.0).floor();
        let m = ((secs - h * 3600.0) / 60.0).floor();
        let s = secs - h * 3600.0 - m * 60.0;
        format!("frame=  120 fps= 30 q=28.0 size=  512kB time={h:02}:{m:02}:{s:05.2} bitrate=1000.0kbits/s speed=1.0x")
    }

    fn run(parser: &mut ProgressParser, lines: &[String]) -> Vec<u8> {
        lines.iter().filter_map(|l| parser.feed(l)).collect()
    }

    #[test]
    fn timestamp_parsing() {
        assert_eq!(parse_timestamp("00:00:10.50"), Some(10.5));
        assert_eq!(parse_timestamp("01:02:03.25"), Some(3723.25));
        assert_eq!(parse_timestamp("N/A"), None);
        assert_eq!(parse_timestamp("-00:00:00.02"), None);
        assert_eq!(parse_timestamp("00:10"), None);
    }

    #[test]
    fn duration_line_is_recorded_once() {
        let mut parser = ProgressParser::new();
        assert_eq!(
            parser.feed("  Duration: 00:01:40.00, start: 0.000000, bitrate: 2000 kb/s"),
            None
        );
        assert_eq!(parser.duration(), Some(100.0));
        parser.feed("  Duration: 00:00:05.00, start: 0.000000");
        assert_eq!(parser.duration(), Some(100.0));
    }

    #[test]
    fn increasing_positions_give_monotonic_distinct_percentages() {
        for total in [7.0_f64, 59.9, 100.0, 3725.5] {
            let mut lines = vec![format!("  Duration: {}, start: 0.0", fmt_ts(total))];
            let mut t = 0.0;
            while t < total {
                lines.push(status(t));
                t += total / 37.0;
            }
            let mut parser = ProgressParser::new();
            let emitted = run(&mut parser, &lines);
            assert!(!emitted.is_empty());
            assert!(emitted.iter().all(|&p| p <= 100));
            assert!(
                emitted.windows(2).all(|w| w[0] < w[1]),
                "total {total}: {emitted:?}"
            );
        }
    }

    fn fmt_ts(secs: f64) -> String {
        let h = (secs / 3600.0).floor();
        let m = ((secs - h * 3600.0) / 60.0).floor();
        let s = secs - h * 3600.0 - m * 60.0;
        format!("{h:02}:{m:02}:{s:05.2}")
    }

    #[test]
    fn no_duration_means_no_percentages() {
        let mut parser = ProgressParser::new();
        let lines: Vec<String> = (0..20).map(|i| status(i as f64)).collect();
        assert!(run(&mut parser, &lines).is_empty());
        assert!(parser.last().is_none());
    }

    #[test]
    fn na_duration_is_ignored() {
        let mut parser = ProgressParser::new();
        parser.feed("  Duration: N/A, start: 0.000000, bitrate: N/A");
        assert_eq!(parser.feed(&status(3.0)), None);
        parser.feed("  Duration: 00:00:10.00, start: 0.000000");
        assert_eq!(parser.feed(&status(3.0)), Some(30));
    }

    #[test]
    fn repeated_value_is_suppressed_and_regression_passes_through() {
        let mut parser = ProgressParser::new();
        parser.feed("Duration: 00:00:10.00,");
        assert_eq!(parser.feed(&status(5.0)), Some(50));
        assert_eq!(parser.feed(&status(5.05)), None);
        assert_eq!(parser.feed(&status(4.0)), Some(40));
    }

    #[test]
    fn positions_past_the_end_clamp_to_100() {
        let mut parser = ProgressParser::new();
        parser.feed("Duration: 00:00:10.00,");
        assert_eq!(parser.feed(&status(12.0)), Some(100));
        assert_eq!(parser.finish(), None);
    }

    #[test]
    fn finish_reports_completion_once() {
        let mut parser = ProgressParser::new();
        assert_eq!(parser.finish(), Some(100));
        assert_eq!(parser.finish(), None);
    }

    #[test]
    fn word_suffixed_time_keys_are_not_positions() {
        let mut parser = ProgressParser::new();
        parser.feed("Duration: 00:00:10.00,");
        assert_eq!(parser.feed("start_time=00:00:05.00"), None);
        assert_eq!(parser.feed("frame=1 time=00:00:05.00"), Some(50));
    }
}
