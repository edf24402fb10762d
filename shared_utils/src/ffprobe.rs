//! FFprobe wrapper module
//!
//! Reports container and stream facts (duration, resolution, codec, frame
//! rate, bit rate, audio presence) as a typed struct.

use crate::errors::{Result, ToolError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FFprobeResult {
    pub format_name: String,
    pub duration: f64,
    pub size: u64,
    pub bit_rate: u64,
    pub video_codec: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub pix_fmt: String,
    pub has_audio: bool,
    pub audio_codec: Option<String>,
    pub audio_sample_rate: Option<u32>,
}

/// Run `ffprobe` on `path` and parse its JSON report.
pub fn probe_video(ffprobe: &Path, path: &Path) -> Result<FFprobeResult> {
    if !path.exists() {
        return Err(ToolError::InputNotFound(path.to_path_buf()));
    }

    if !path.is_file() {
        return Err(ToolError::FFprobeError(format!(
            "Not a file (is it a directory?): {}",
            path.display()
        )));
    }

    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
            "--",
        ])
        .arg(path)
        .output()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let error_msg = if stderr.trim().is_empty() {
            format!(
                "ffprobe failed to analyze file: {} (exit code: {:?})",
                path.display(),
                output.status.code()
            )
        } else {
            format!("ffprobe error for '{}': {}", path.display(), stderr.trim())
        };
        return Err(ToolError::FFprobeError(error_msg));
    }

    let result = parse_probe_json(&String::from_utf8_lossy(&output.stdout))?;
    debug!(
        path = %path.display(),
        duration = result.duration,
        width = result.width,
        height = result.height,
        codec = %result.video_codec,
        "Probed video"
    );
    Ok(result)
}

/// Parse the `-print_format json -show_format -show_streams` document.
pub fn parse_probe_json(json_str: &str) -> Result<FFprobeResult> {
    let json: serde_json::Value = serde_json::from_str(json_str)?;

    let format = &json["format"];
    let format_name = format["format_name"]
        .as_str()
        .unwrap_or("unknown")
        .to_string();
    let duration = number_field(&format["duration"]).unwrap_or(0.0);
    let size = number_field(&format["size"]).map(|v| v as u64).unwrap_or(0);
    let bit_rate = number_field(&format["bit_rate"])
        .map(|v| v as u64)
        .unwrap_or(0);

    let streams = json["streams"]
        .as_array()
        .ok_or_else(|| ToolError::FFprobeError("No streams found".to_string()))?;

    let video_stream = streams
        .iter()
        .find(|s| s["codec_type"].as_str() == Some("video"))
        .ok_or_else(|| ToolError::FFprobeError("No video stream found".to_string()))?;

    let video_codec = video_stream["codec_name"]
        .as_str()
        .unwrap_or("unknown")
        .to_string();
    let width = video_stream["width"].as_u64().unwrap_or(0) as u32;
    let height = video_stream["height"].as_u64().unwrap_or(0) as u32;
    let frame_rate = parse_frame_rate(video_stream["r_frame_rate"].as_str().unwrap_or("0/1"));
    let pix_fmt = video_stream["pix_fmt"]
        .as_str()
        .unwrap_or("unknown")
        .to_string();

    let audio_stream = streams
        .iter()
        .find(|s| s["codec_type"].as_str() == Some("audio"));
    let audio_codec = audio_stream
        .and_then(|s| s["codec_name"].as_str())
        .map(|s| s.to_string());
    let audio_sample_rate = audio_stream
        .and_then(|s| number_field(&s["sample_rate"]))
        .map(|v| v as u32);

    Ok(FFprobeResult {
        format_name,
        duration,
        size,
        bit_rate,
        video_codec,
        width,
        height,
        frame_rate,
        pix_fmt,
        has_audio: audio_stream.is_some(),
        audio_codec,
        audio_sample_rate,
    })
}

// ffprobe prints most numbers as JSON strings
fn number_field(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::String(s) => s.parse::<f64>().ok(),
        serde_json::Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

const FALLBACK_FRAME_RATE: f64 = 30.0;

pub fn parse_frame_rate(s: &str) -> f64 {
    if let Some((num, den)) = s.split_once('/') {
        if !den.contains('/') {
            let num = num.parse::<f64>().unwrap_or(0.0);
            let den = den.parse::<f64>().unwrap_or(0.0);
            if den > 0.0 && num / den > 0.0 {
                return num / den;
            }
        }
    }
    match s.parse::<f64>() {
        Ok(v) if v > 0.0 => v,
        _ => {
            if !s.is_empty() && s != "0" && s != "0/1" {
                warn!(
                    raw = s,
                    fallback = FALLBACK_FRAME_RATE,
                    "Failed to parse frame rate, using fallback"
                );
            }
            FALLBACK_FRAME_RATE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "streams": [
            {"codec_type": "video", "codec_name": "h264", "width": 1080, "height": 1920,
             "r_frame_rate": "30000/1001", "pix_fmt": "yuv420p"},
            {"codec_type": "audio", "codec_name": "aac", "sample_rate": "44100"}
        ],
        "format": {"format_name": "mov,mp4,m4a,3gp,3g2,mj2", "duration": "42.500000",
                   "size": "5242880", "bit_rate": "986895"}
    }"#;

    #[test]
    fn test_parse_probe_json() {
        let result = parse_probe_json(SAMPLE).unwrap();
        assert_eq!(result.video_codec, "h264");
        assert_eq!((result.width, result.height), (1080, 1920));
        assert!((result.duration - 42.5).abs() < 1e-9);
        assert_eq!(result.size, 5_242_880);
        assert_eq!(result.bit_rate, 986_895);
        assert!((result.frame_rate - 29.97).abs() < 0.01);
        assert!(result.has_audio);
        assert_eq!(result.audio_codec.as_deref(), Some("aac"));
        assert_eq!(result.audio_sample_rate, Some(44100));
    }

    #[test]
    fn test_parse_probe_json_without_audio() {
        let json = r#"{"streams": [{"codec_type": "video", "codec_name": "vp9",
            "width": 640, "height": 360, "r_frame_rate": "25/1"}],
            "format": {"duration": "3.0"}}"#;
        let result = parse_probe_json(json).unwrap();
        assert!(!result.has_audio);
        assert_eq!(result.audio_codec, None);
        assert_eq!(result.bit_rate, 0);
        assert_eq!(result.format_name, "unknown");
    }

    #[test]
    fn test_parse_probe_json_requires_video_stream() {
        let json = r#"{"streams": [{"codec_type": "audio"}], "format": {}}"#;
        assert!(matches!(
            parse_probe_json(json),
            Err(ToolError::FFprobeError(_))
        ));
    }

    #[test]
    fn test_parse_probe_json_rejects_garbage() {
        assert!(matches!(
            parse_probe_json("not json"),
            Err(ToolError::ParseError(_))
        ));
    }

    #[test]
    fn test_probe_missing_file() {
        let err = probe_video(Path::new("ffprobe"), Path::new("/no/such/video.mp4")).unwrap_err();
        assert!(matches!(err, ToolError::InputNotFound(_)));
    }

    #[test]
    fn test_parse_frame_rate() {
        let cases: &[(&str, f64, f64)] = &[
            ("30/1", 30.0, 0.001),
            ("25/1", 25.0, 0.001),
            ("30000/1001", 30000.0 / 1001.0, 0.0001),
            ("24000/1001", 24000.0 / 1001.0, 0.0001),
            ("29.97", 29.97, 0.01),
            ("60", 60.0, 0.001),
        ];

        for (input, expected, tolerance) in cases {
            let result = parse_frame_rate(input);
            assert!(
                (result - expected).abs() < *tolerance,
                "parse_frame_rate({:?}): expected {}, got {}",
                input,
                expected,
                result
            );
        }
    }

    #[test]
    fn test_parse_frame_rate_edge_cases() {
        assert_eq!(parse_frame_rate("30/0"), FALLBACK_FRAME_RATE);
        assert_eq!(parse_frame_rate("invalid"), FALLBACK_FRAME_RATE);
        assert_eq!(parse_frame_rate(""), FALLBACK_FRAME_RATE);
        assert_eq!(parse_frame_rate("30/1/extra"), FALLBACK_FRAME_RATE);
    }
}
