//! Progress line parser
//!
//! The extraction tool is told to print progress as
//! `<downloaded> of <total|NA> / <estimated total|NA> eta <seconds|NA>`.
//! The exact total is preferred; the estimate (which the tool prints as a decimal) is
//! truncated to whole bytes when the exact total is unknown.

use crate::types::Progress;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

#[allow(clippy::expect_used)]
static PROGRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+) of ([\dNA]+) / ([\d.NA]+) eta (\d+|NA)").expect("progress regex is valid")
});

/// The tool's `--progress-template` that produces lines understood by [`parse_progress`]
pub const PROGRESS_TEMPLATE: &str = "%(progress.downloaded_bytes)s of %(progress.total_bytes)s / %(progress.total_bytes_estimate)s eta %(progress.eta)s";

/// Parse one output line
///
/// Returns `None` for lines that do not match the grammar and for lines whose total is
/// unknown or zero, so callers never see a NaN or infinite percentage.
pub fn parse_progress(line: &str) -> Option<Progress> {
    let caps = PROGRESS_RE.captures(line)?;

    let downloaded: i64 = caps[1].parse().ok()?;
    let total = match &caps[2] {
        "NA" => {
            let estimate: f64 = caps[3].parse().ok()?;
            if !estimate.is_finite() {
                return None;
            }
            estimate as i64
        }
        exact => exact.parse::<i64>().ok()?,
    };
    if total <= 0 {
        return None;
    }

    let eta = caps[4].parse::<u64>().map(Duration::from_secs).unwrap_or_default();
    let pct = (downloaded as f64 / total as f64 * 100.0).clamp(0.0, 100.0) as f32;

    Some(Progress {
        pct,
        file_size: total,
        eta,
    })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_total() {
        let p = parse_progress("50 of 100 / NA eta 10").unwrap();
        assert_eq!(p.pct, 50.0);
        assert_eq!(p.file_size, 100);
        assert_eq!(p.eta, Duration::from_secs(10));
    }

    #[test]
    fn estimated_total_is_truncated() {
        let p = parse_progress("25 of NA / 100.9 eta 3").unwrap();
        assert_eq!(p.file_size, 100);
        assert_eq!(p.pct, 25.0);
    }

    #[test]
    fn exact_total_preferred_over_estimate() {
        let p = parse_progress("10 of 200 / 100.0 eta 1").unwrap();
        assert_eq!(p.file_size, 200);
        assert_eq!(p.pct, 5.0);
    }

    #[test]
    fn unknown_totals_are_not_progress() {
        assert!(parse_progress("10 of NA / NA eta 5").is_none());
        assert!(parse_progress("10 of 0 / NA eta 5").is_none());
        assert!(parse_progress("10 of NA / 0.4 eta 5").is_none());
        assert!(parse_progress("10 of NA / 1.2.3 eta 5").is_none());
    }

    #[test]
    fn unknown_eta_is_zero() {
        let p = parse_progress("1 of 4 / NA eta NA").unwrap();
        assert_eq!(p.eta, Duration::ZERO);
        assert_eq!(p.pct, 25.0);
    }

    #[test]
    fn percent_is_clamped() {
        let p = parse_progress("150 of 100 / NA eta 0").unwrap();
        assert_eq!(p.pct, 100.0);
    }

    #[test]
    fn other_lines_are_ignored() {
        assert!(parse_progress("[youtube] abc: Downloading webpage").is_none());
        assert!(parse_progress("").is_none());
        assert!(parse_progress("[download] 73.2% of 6.25MiB ETA 00:01").is_none());
    }

    #[test]
    fn huge_numbers_do_not_panic() {
        assert!(parse_progress("99999999999999999999999 of 100 / NA eta 0").is_none());
        let p = parse_progress("1 of NA / 99999999999999999999999999.0 eta 0");
        // saturating cast yields i64::MAX
        assert_eq!(p.unwrap().file_size, i64::MAX);
    }

    #[test]
    fn pct_always_in_range() {
        for downloaded in [0_i64, 1, 33, 99, 100, 101, 5000] {
            for total in ["1", "3", "100", "NA"] {
                let line = format!("{downloaded} of {total} / 7.5 eta 2");
                if let Some(p) = parse_progress(&line) {
                    assert!((0.0..=100.0).contains(&p.pct), "{line} -> {}", p.pct);
                }
            }
        }
    }
}
