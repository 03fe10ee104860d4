//! Stream parameters via ffprobe.
//!
//! Shells out to `ffprobe -v error -print_format json -show_format -show_streams`
//! and keeps only what the pipeline compares: the first video stream's codec,
//! geometry, frame rate and pixel format, and the first audio stream's layout.

use std::path::Path;

use reelforge_common::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::command::ToolCommand;
use crate::process::ProcessRunner;
use crate::tools::{Tool, ToolRegistry};

/// Parameters that must agree for stream-copy concatenation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamParams {
    pub video_codec: String,
    pub width: u32,
    pub height: u32,
    /// Rational frame rate as reported (`30/1`, `30000/1001`).
    pub frame_rate: String,
    pub pix_fmt: Option<String>,
    /// `None` when the file has no audio stream.
    pub audio_codec: Option<String>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u32>,
    /// Container duration in seconds.
    pub duration: Option<f64>,
}

impl StreamParams {
    /// Frame dimensions as `(width, height)`.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Whether an audio stream is present.
    pub fn has_audio(&self) -> bool {
        self.audio_codec.is_some()
    }

    /// Frame rate as a number, if the rational is well formed.
    pub fn fps(&self) -> Option<f64> {
        parse_frame_rate(&self.frame_rate)
    }

    /// Human-readable differences between `self` and `other`.
    ///
    /// Duration is ignored. An empty result means the two files can be
    /// concatenated without re-encoding.
    pub fn mismatches(&self, other: &StreamParams) -> Vec<String> {
        let mut out = Vec::new();

        if self.video_codec != other.video_codec {
            out.push(format!(
                "video codec {} vs {}",
                self.video_codec, other.video_codec
            ));
        }
        if self.dimensions() != other.dimensions() {
            out.push(format!(
                "resolution {}x{} vs {}x{}",
                self.width, self.height, other.width, other.height
            ));
        }
        let same_rate = match (self.fps(), other.fps()) {
            (Some(a), Some(b)) => (a - b).abs() < 0.001,
            _ => self.frame_rate == other.frame_rate,
        };
        if !same_rate {
            out.push(format!(
                "frame rate {} vs {}",
                self.frame_rate, other.frame_rate
            ));
        }
        if self.pix_fmt != other.pix_fmt {
            out.push(format!(
                "pixel format {} vs {}",
                opt(&self.pix_fmt),
                opt(&other.pix_fmt)
            ));
        }
        if self.audio_codec != other.audio_codec {
            out.push(format!(
                "audio codec {} vs {}",
                opt(&self.audio_codec),
                opt(&other.audio_codec)
            ));
        }
        if self.sample_rate != other.sample_rate {
            out.push(format!(
                "sample rate {} vs {}",
                opt(&self.sample_rate),
                opt(&other.sample_rate)
            ));
        }
        if self.channels != other.channels {
            out.push(format!(
                "channels {} vs {}",
                opt(&self.channels),
                opt(&other.channels)
            ));
        }

        out
    }
}

fn opt<T: ToString>(v: &Option<T>) -> String {
    v.as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "none".into())
}

/// Probe `path` with ffprobe.
pub async fn probe(runner: &ProcessRunner, tools: &ToolRegistry, path: &Path) -> Result<StreamParams> {
    let mut cmd = ToolCommand::new(tools.require(Tool::Ffprobe)?);
    cmd.args([
        "-v",
        "error",
        "-print_format",
        "json",
        "-show_format",
        "-show_streams",
    ]);
    cmd.path_arg(path);

    let output = runner.output(&cmd).await?;
    parse_probe_json(path, &output.stdout)
}

// ---------------------------------------------------------------------------
// JSON structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    pix_fmt: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u32>,
}

/// Map ffprobe JSON output to [`StreamParams`].
pub fn parse_probe_json(path: &Path, json: &str) -> Result<StreamParams> {
    let ff: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| Error::probe(path, format!("ffprobe JSON parse error: {e}")))?;

    let video = ff
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| Error::probe(path, "no video stream"))?;
    let audio = ff
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"));

    let (width, height) = match (video.width, video.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(Error::probe(path, "video stream has no dimensions")),
    };

    Ok(StreamParams {
        video_codec: video.codec_name.clone().unwrap_or_default(),
        width,
        height,
        frame_rate: video.r_frame_rate.clone().unwrap_or_default(),
        pix_fmt: video.pix_fmt.clone(),
        audio_codec: audio.and_then(|a| a.codec_name.clone()),
        sample_rate: audio
            .and_then(|a| a.sample_rate.as_deref())
            .and_then(|s| s.parse().ok()),
        channels: audio.and_then(|a| a.channels),
        duration: ff
            .format
            .and_then(|f| f.duration)
            .and_then(|d| d.parse().ok()),
    })
}

/// Parse a rational frame rate like `30000/1001` or a plain number.
pub fn parse_frame_rate(s: &str) -> Option<f64> {
    match s.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            (den != 0.0 && num > 0.0).then(|| num / den)
        }
        None => s.trim().parse().ok().filter(|v: &f64| *v > 0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "streams": [
            {"index": 0, "codec_type": "video", "codec_name": "h264", "width": 1920,
             "height": 1080, "r_frame_rate": "30/1", "pix_fmt": "yuv420p"},
            {"index": 1, "codec_type": "audio", "codec_name": "aac",
             "sample_rate": "48000", "channels": 2}
        ],
        "format": {"duration": "12.500000", "format_name": "mov,mp4,m4a,3gp,3g2,mj2"}
    }"#;

    #[test]
    fn parses_video_and_audio() {
        let params = parse_probe_json(Path::new("01-a.mp4"), SAMPLE).unwrap();
        assert_eq!(params.video_codec, "h264");
        assert_eq!(params.dimensions(), (1920, 1080));
        assert_eq!(params.fps(), Some(30.0));
        assert_eq!(params.audio_codec.as_deref(), Some("aac"));
        assert_eq!(params.sample_rate, Some(48_000));
        assert_eq!(params.channels, Some(2));
        assert_eq!(params.duration, Some(12.5));
    }

    #[test]
    fn missing_audio_is_none() {
        let json = r#"{"streams": [{"codec_type": "video", "codec_name": "prores",
            "width": 1280, "height": 720, "r_frame_rate": "25/1"}]}"#;
        let params = parse_probe_json(Path::new("02.mov"), json).unwrap();
        assert!(!params.has_audio());
        assert!(params.duration.is_none());
    }

    #[test]
    fn no_video_stream_is_probe_error() {
        let json = r#"{"streams": [{"codec_type": "audio", "codec_name": "aac"}]}"#;
        let err = parse_probe_json(Path::new("a.wav"), json).unwrap_err();
        assert!(matches!(err, Error::Probe { .. }));
    }

    #[test]
    fn frame_rates() {
        assert_eq!(parse_frame_rate("25/1"), Some(25.0));
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("24"), Some(24.0));
    }

    #[test]
    fn mismatches_report_each_field() {
        let a = parse_probe_json(Path::new("a"), SAMPLE).unwrap();
        assert!(a.mismatches(&a).is_empty());

        let mut b = a.clone();
        b.width = 1280;
        b.height = 720;
        b.sample_rate = Some(44_100);
        b.duration = Some(3.0);
        let diffs = b.mismatches(&a);
        assert_eq!(diffs.len(), 2, "{diffs:?}");
        assert!(diffs[0].contains("1280x720 vs 1920x1080"));
        assert!(diffs[1].contains("44100 vs 48000"));
    }

    #[test]
    fn equivalent_frame_rate_spellings_match() {
        let a = parse_probe_json(Path::new("a"), SAMPLE).unwrap();
        let mut b = a.clone();
        b.frame_rate = "60/2".into();
        assert!(a.mismatches(&b).is_empty());
    }
}
