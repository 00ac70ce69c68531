//! Parsers for tool output.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use cadence_core::types::{MusicalAnalysis, ProbeInfo};

use crate::error::ToolError;

/// `Input Integrated: -14.3 LUFS` from `loudnorm=print_format=summary`.
static SUMMARY_INTEGRATED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Input Integrated:\s*([-+]?\d+(?:\.\d+)?)\s*LUFS").expect("valid regex")
});

/// `"input_i" : "-14.30"` from `loudnorm=print_format=json`.
static JSON_INPUT_I: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""?input_i"?\s*[:=]\s*"?([-+]?\d+(?:\.\d+)?)"#).expect("valid regex")
});

/// Parse `key=value` lines printed by
/// `ffprobe -show_entries format=duration,format_name,bit_rate -of default=noprint_wrappers=1`.
pub fn parse_probe(stdout: &str) -> Result<ProbeInfo, ToolError> {
    let mut duration = None;
    let mut format_name = None;
    let mut bit_rate = None;

    for line in stdout.lines() {
        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "duration" => duration = value.parse::<f64>().ok(),
            "format_name" if !value.is_empty() => format_name = Some(value.to_string()),
            "bit_rate" => bit_rate = value.parse::<i64>().ok(),
            _ => {}
        }
    }

    let duration_seconds =
        duration.ok_or_else(|| ToolError::parse("ffprobe", "no duration reported"))?;
    if !duration_seconds.is_finite() || duration_seconds < 0.0 {
        return Err(ToolError::parse(
            "ffprobe",
            format!("invalid duration {duration_seconds}"),
        ));
    }

    Ok(ProbeInfo {
        duration_seconds,
        format_name: format_name.unwrap_or_default(),
        bit_rate,
    })
}

/// Extract integrated loudness (LUFS) from ffmpeg's `loudnorm` report on stderr.
pub fn parse_loudness(stderr: &str) -> Result<f64, ToolError> {
    let captured = SUMMARY_INTEGRATED
        .captures(stderr)
        .or_else(|| JSON_INPUT_I.captures(stderr))
        .and_then(|caps| caps.get(1))
        .ok_or_else(|| ToolError::parse("ffmpeg", "no integrated loudness in loudnorm output"))?;

    captured
        .as_str()
        .parse::<f64>()
        .map_err(|e| ToolError::parse("ffmpeg", format!("bad loudness value: {e}")))
}

#[derive(Debug, Deserialize)]
struct AnalyzerReply {
    bpm: Option<f64>,
    key: Option<String>,
    error: Option<String>,
}

/// Parse the analyzer's JSON line: `{"bpm": 120.0, "key": "Am"}` or `{"error": "..."}`.
///
/// Libraries used by the analyzer may print warnings first, so the last
/// non-empty line is taken as the reply.
pub fn parse_analysis(stdout: &str) -> Result<MusicalAnalysis, ToolError> {
    let line = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| ToolError::parse("analyzer", "empty output"))?;

    let reply: AnalyzerReply = serde_json::from_str(line)
        .map_err(|e| ToolError::parse("analyzer", format!("invalid JSON: {e}")))?;

    if let Some(error) = reply.error {
        return Err(ToolError::parse("analyzer", error));
    }

    match (reply.bpm, reply.key) {
        (Some(bpm), Some(key)) => Ok(MusicalAnalysis { bpm, key }),
        _ => Err(ToolError::parse("analyzer", "reply lacks bpm or key")),
    }
}
