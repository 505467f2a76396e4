use crate::config;
use crate::levels::LevelKind;
use crate::report::ParsedReport;
use std::collections::HashMap;
use std::fmt;

/// Per-level agreement with a reference value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStatus {
    Match,
    Close,
    Off,
}

impl RowStatus {
    pub fn from_diff(diff: f64) -> Self {
        let abs = diff.abs();
        if abs <= config::COMPARE_EXCELLENT_DIFF {
            Self::Match
        } else if abs <= config::COMPARE_GOOD_DIFF {
            Self::Close
        } else {
            Self::Off
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Match => "✅",
            Self::Close => "⚠️",
            Self::Off => "❌",
        }
    }
}

/// Overall grade from the average absolute difference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accuracy {
    Excellent,
    Good,
    NeedsWork,
}

impl Accuracy {
    pub fn from_average(avg_diff: f64) -> Self {
        if avg_diff <= config::COMPARE_EXCELLENT_DIFF {
            Self::Excellent
        } else if avg_diff <= config::COMPARE_GOOD_DIFF {
            Self::Good
        } else {
            Self::NeedsWork
        }
    }
}

impl fmt::Display for Accuracy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Excellent => write!(f, "EXCELLENT"),
            Self::Good => write!(f, "GOOD"),
            Self::NeedsWork => write!(f, "NEEDS WORK"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonRow {
    pub kind: LevelKind,
    pub ours: f64,
    pub reference: f64,
    /// ours - reference, in underlying dollars
    pub diff: f64,
    /// diff expressed in futures points
    pub diff_points: f64,
    pub status: RowStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub rows: Vec<ComparisonRow>,
    pub average_diff: Option<f64>,
    pub average_diff_points: Option<f64>,
    pub accuracy: Option<Accuracy>,
}

/// Compare levels that appear both in the report and in the reference set,
/// in level order
pub fn compare_levels(
    report: &ParsedReport,
    reference: &HashMap<LevelKind, f64>,
    ratio: f64,
) -> Comparison {
    let rows: Vec<ComparisonRow> = LevelKind::ALL
        .into_iter()
        .filter_map(|kind| {
            let ours = report.levels.get(&kind)?.strike;
            let reference = *reference.get(&kind)?;
            let diff = ours - reference;
            Some(ComparisonRow {
                kind,
                ours,
                reference,
                diff,
                diff_points: diff * ratio,
                status: RowStatus::from_diff(diff),
            })
        })
        .collect();

    if rows.is_empty() {
        return Comparison {
            rows,
            average_diff: None,
            average_diff_points: None,
            accuracy: None,
        };
    }

    let count = rows.len() as f64;
    let average_diff = rows.iter().map(|r| r.diff.abs()).sum::<f64>() / count;
    let average_diff_points = rows.iter().map(|r| r.diff_points.abs()).sum::<f64>() / count;

    Comparison {
        rows,
        average_diff: Some(average_diff),
        average_diff_points: Some(average_diff_points),
        accuracy: Some(Accuracy::from_average(average_diff)),
    }
}

/// Blank or unparsable input skips the level
pub fn parse_reference_input(input: &str) -> Option<f64> {
    input
        .trim()
        .trim_start_matches('$')
        .replace(',', "")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::ReportedLevel;

    fn report(levels: &[(LevelKind, f64)]) -> ParsedReport {
        let mut parsed = ParsedReport::default();
        for &(kind, strike) in levels {
            parsed.levels.insert(kind, ReportedLevel { strike, futures_level: 0 });
        }
        parsed
    }

    #[test]
    fn test_row_status_thresholds() {
        assert_eq!(RowStatus::from_diff(0.0), RowStatus::Match);
        assert_eq!(RowStatus::from_diff(-1.0), RowStatus::Match);
        assert_eq!(RowStatus::from_diff(1.5), RowStatus::Close);
        assert_eq!(RowStatus::from_diff(-2.0), RowStatus::Close);
        assert_eq!(RowStatus::from_diff(2.5), RowStatus::Off);
    }

    #[test]
    fn test_compare_only_shared_levels() {
        let ours = report(&[
            (LevelKind::CallOi, 620.0),
            (LevelKind::PutOi, 600.0),
            (LevelKind::PosGex, 615.0),
        ]);
        let reference = HashMap::from([
            (LevelKind::CallOi, 619.0),
            (LevelKind::PutOi, 603.0),
            (LevelKind::NegGex, 605.0),
        ]);

        let cmp = compare_levels(&ours, &reference, 41.35);
        assert_eq!(cmp.rows.len(), 2);
        assert_eq!(cmp.rows[0].kind, LevelKind::CallOi);
        assert_eq!(cmp.rows[0].diff, 1.0);
        assert_eq!(cmp.rows[0].status, RowStatus::Match);
        assert_eq!(cmp.rows[1].kind, LevelKind::PutOi);
        assert_eq!(cmp.rows[1].diff, -3.0);
        assert_eq!(cmp.rows[1].status, RowStatus::Off);

        assert_eq!(cmp.average_diff, Some(2.0));
        assert_eq!(cmp.accuracy, Some(Accuracy::Good));
        assert!((cmp.average_diff_points.unwrap() - 82.7).abs() < 1e-9);
    }

    #[test]
    fn test_compare_nothing_shared() {
        let cmp = compare_levels(&report(&[(LevelKind::CallOi, 620.0)]), &HashMap::new(), 41.35);
        assert!(cmp.rows.is_empty());
        assert_eq!(cmp.accuracy, None);
    }

    #[test]
    fn test_parse_reference_input() {
        assert_eq!(parse_reference_input(" 612.5 "), Some(612.5));
        assert_eq!(parse_reference_input("$1,020"), Some(1020.0));
        assert_eq!(parse_reference_input(""), None);
        assert_eq!(parse_reference_input("n/a"), None);
    }
}
