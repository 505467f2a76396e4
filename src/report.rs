use crate::conversion::ConvertedLevels;
use crate::levels::{GexLevels, LevelKind};
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::path::Path;

const RULE_WIDTH: usize = 60;

/// Symbols printed in the report header
#[derive(Debug, Clone)]
pub struct ReportLabels {
    pub underlying: String,
    pub futures: String,
}

/// Render the plain-text results file
pub fn render_report(
    levels: &GexLevels,
    converted: &ConvertedLevels,
    labels: &ReportLabels,
    generated_at: NaiveDateTime,
) -> String {
    let heavy = "=".repeat(RULE_WIDTH);
    let light = "-".repeat(RULE_WIDTH);
    let ratio = &converted.ratio;

    let mut lines = vec![
        heavy.clone(),
        "GEX LEVELS OUTPUT".to_string(),
        heavy.clone(),
        format!("Generated: {}", generated_at.format("%Y-%m-%d %H:%M:%S")),
        format!("{} Price: ${:.2}", labels.underlying, levels.underlying_price),
        format!(
            "{} Price: {} ({})",
            labels.futures,
            format_thousands(ratio.futures_price, 2),
            ratio.source
        ),
        format!("Dynamic Ratio: {:.2} ({})", ratio.ratio, ratio.source),
        format!("Net GEX: {}K", format_thousands(levels.net_gex, 0)),
        String::new(),
        format!("{} STRIKES → {} LEVELS", labels.underlying, labels.futures),
        light,
    ];

    for level in &converted.levels {
        let label = format!("{}:", level.kind.label());
        let mut line = format!(
            "{:<13}${:.2}  →  {}",
            label,
            level.strike,
            format_thousands(level.futures_level as f64, 0)
        );
        if level.kind == LevelKind::PosGex {
            line.push_str("  ⭐");
        }
        lines.push(line);
    }

    lines.push(heavy);
    lines.join("\n")
}

pub fn save_report(path: &Path, text: &str) -> Result<()> {
    std::fs::write(path, text)
        .with_context(|| format!("Failed to write results to {}", path.display()))
}

/// One level line read back from a results file
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReportedLevel {
    pub strike: f64,
    pub futures_level: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedReport {
    pub levels: HashMap<LevelKind, ReportedLevel>,
    /// Net GEX exactly as printed, e.g. "1,234K"
    pub net_gex: Option<String>,
}

/// Read the level lines and the Net GEX line of a results file; unrecognised
/// lines are ignored
pub fn parse_report(text: &str) -> ParsedReport {
    let mut parsed = ParsedReport::default();

    for line in text.lines() {
        let line = line.trim();

        if let Some(rest) = line.strip_prefix("Net GEX:") {
            parsed.net_gex = Some(rest.trim().to_string());
            continue;
        }

        let Some((left, right)) = line.split_once('→') else {
            continue;
        };

        let Some(kind) = LevelKind::ALL
            .into_iter()
            .find(|kind| left.starts_with(&format!("{}:", kind.label())))
        else {
            continue;
        };

        if let Some(level) = parse_level_sides(left, right) {
            parsed.levels.insert(kind, level);
        }
    }

    parsed
}

fn parse_level_sides(left: &str, right: &str) -> Option<ReportedLevel> {
    let strike = left
        .split_once('$')?
        .1
        .split_whitespace()
        .next()?
        .replace(',', "")
        .parse::<f64>()
        .ok()?;

    let futures_level = right
        .split_whitespace()
        .next()?
        .replace(',', "")
        .parse::<i64>()
        .ok()?;

    Some(ReportedLevel { strike, futures_level })
}

/// Format with a fixed number of decimals and comma thousands separators
pub fn format_thousands(value: f64, decimals: usize) -> String {
    let formatted = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (formatted.as_str(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    // "-0" after rounding is printed as "0"
    let is_negative = value < 0.0 && formatted.chars().any(|c| c.is_ascii_digit() && c != '0');
    let sign = if is_negative { "-" } else { "" };

    match frac_part {
        Some(frac) => format!("{}{}.{}", sign, grouped, frac),
        None => format!("{}{}", sign, grouped),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_thousands() {
        assert_eq!(format_thousands(0.0, 0), "0");
        assert_eq!(format_thousands(999.0, 0), "999");
        assert_eq!(format_thousands(1000.0, 0), "1,000");
        assert_eq!(format_thousands(25_650.0, 0), "25,650");
        assert_eq!(format_thousands(1_234_567.891, 2), "1,234,567.89");
        assert_eq!(format_thousands(-45_678.4, 1), "-45,678.4");
        assert_eq!(format_thousands(-0.2, 0), "0");
    }

    #[test]
    fn test_parse_ignores_unrelated_lines() {
        let text = "QQQ STRIKES → NQ LEVELS\nCall OI:     $abc  →  25,650\nrandom";
        let parsed = parse_report(text);
        assert!(parsed.levels.is_empty());
        assert!(parsed.net_gex.is_none());
    }
}
