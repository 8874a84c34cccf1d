use serde_json::{Map, Value};
use url::Url;

use crate::error::PipelineError;

/// Guards against absurd tempo chains only; a factor of 1e6 needs about
/// twenty atempo stages.
pub const MIN_SPEED: f64 = 1e-6;
pub const MAX_SPEED: f64 = 1e6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Trim,
    Merge,
    ExtractAudio,
    ChangeSpeed,
    AddMusic,
}

/// What the client receives once a job succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFile {
    pub file_name: &'static str,
    pub content_type: &'static str,
}

impl JobKind {
    pub fn workspace_prefix(self) -> &'static str {
        match self {
            JobKind::Trim => "yt-clip-",
            JobKind::Merge => "yt-merge-",
            JobKind::ExtractAudio => "yt-audio-",
            JobKind::ChangeSpeed => "yt-speed-",
            JobKind::AddMusic => "yt-music-",
        }
    }

    pub fn output(self) -> OutputFile {
        let (file_name, content_type) = match self {
            JobKind::Trim => ("trimmed.mp4", "video/mp4"),
            JobKind::Merge => ("merged.mp4", "video/mp4"),
            JobKind::ExtractAudio => ("audio.mp3", "audio/mpeg"),
            JobKind::ChangeSpeed => ("speed.mp4", "video/mp4"),
            JobKind::AddMusic => ("music.mp4", "video/mp4"),
        };
        OutputFile { file_name, content_type }
    }
}

/// A validated job. Built only through [`JobRequest::parse`].
#[derive(Debug, Clone, PartialEq)]
pub enum JobRequest {
    Trim { url: Url, start: f64, end: f64 },
    Merge { first: Url, second: Url },
    ExtractAudio { url: Url },
    ChangeSpeed { url: Url, speed: f64 },
    AddMusic { video_url: Url, music_url: Url },
}

impl JobRequest {
    /// Validates a raw request body for the given job kind.
    pub fn parse(kind: JobKind, body: &[u8]) -> Result<Self, PipelineError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| PipelineError::invalid(format!("Request body must be JSON: {e}")))?;
        let Value::Object(fields) = value else {
            return Err(PipelineError::invalid("Request body must be a JSON object"));
        };
        Self::from_fields(kind, &fields)
    }

    pub fn from_fields(kind: JobKind, fields: &Map<String, Value>) -> Result<Self, PipelineError> {
        match kind {
            JobKind::Trim => {
                const MISSING: &str = "Missing url, start, or end";
                let (Some(url), Some(start), Some(end)) = (
                    text_field(fields, "url"),
                    present_field(fields, "start"),
                    present_field(fields, "end"),
                ) else {
                    return Err(PipelineError::invalid(MISSING));
                };
                let start = parse_time(start)?;
                let end = parse_time(end)?;
                if end <= start {
                    return Err(PipelineError::invalid("End time must be greater than start time"));
                }
                Ok(JobRequest::Trim { url: parse_url(url)?, start, end })
            }
            JobKind::Merge => {
                let (Some(first), Some(second)) = (text_field(fields, "url1"), text_field(fields, "url2")) else {
                    return Err(PipelineError::invalid("Missing url1 or url2"));
                };
                Ok(JobRequest::Merge {
                    first: parse_url(first)?,
                    second: parse_url(second)?,
                })
            }
            JobKind::ExtractAudio => {
                let url = text_field(fields, "url").ok_or_else(|| PipelineError::invalid("Missing url"))?;
                Ok(JobRequest::ExtractAudio { url: parse_url(url)? })
            }
            JobKind::ChangeSpeed => {
                let url = text_field(fields, "url");
                let speed = fields.get("speed").and_then(Value::as_f64);
                match (url, speed) {
                    (Some(url), Some(speed)) if speed.is_finite() && speed > 0.0 => {
                        if !(MIN_SPEED..=MAX_SPEED).contains(&speed) {
                            return Err(PipelineError::invalid(format!(
                                "Speed must be between {MIN_SPEED} and {MAX_SPEED}"
                            )));
                        }
                        Ok(JobRequest::ChangeSpeed { url: parse_url(url)?, speed })
                    }
                    _ => Err(PipelineError::invalid("Missing or invalid url/speed")),
                }
            }
            JobKind::AddMusic => {
                let (Some(video), Some(music)) = (text_field(fields, "url"), text_field(fields, "musicUrl")) else {
                    return Err(PipelineError::invalid("Missing url or musicUrl"));
                };
                Ok(JobRequest::AddMusic {
                    video_url: parse_url(video)?,
                    music_url: parse_url(music)?,
                })
            }
        }
    }

    pub fn kind(&self) -> JobKind {
        match self {
            JobRequest::Trim { .. } => JobKind::Trim,
            JobRequest::Merge { .. } => JobKind::Merge,
            JobRequest::ExtractAudio { .. } => JobKind::ExtractAudio,
            JobRequest::ChangeSpeed { .. } => JobKind::ChangeSpeed,
            JobRequest::AddMusic { .. } => JobKind::AddMusic,
        }
    }
}

fn text_field<'a>(fields: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn present_field<'a>(fields: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    fields.get(key).filter(|v| !v.is_null())
}

fn parse_url(raw: &str) -> Result<Url, PipelineError> {
    let url = Url::parse(raw).map_err(|e| PipelineError::invalid(format!("Invalid url {raw:?}: {e}")))?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        _ => Err(PipelineError::invalid(format!("Invalid url {raw:?}: only http(s) links are supported"))),
    }
}

/// Parses a time given as seconds or as `H:MM:SS`, `MM:SS` or `SS` text.
pub fn parse_time(value: &Value) -> Result<f64, PipelineError> {
    let seconds = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(text) => parse_clock(text.trim()),
        _ => None,
    };
    match seconds {
        Some(s) if s.is_finite() && s >= 0.0 => Ok(s),
        _ => Err(PipelineError::invalid(format!("Invalid time value: {value}"))),
    }
}

fn parse_clock(text: &str) -> Option<f64> {
    let parts = text
        .split(':')
        .map(|part| part.trim().parse::<f64>().ok().filter(|n| n.is_finite() && *n >= 0.0))
        .collect::<Option<Vec<f64>>>()?;
    match parts.as_slice() {
        [s] => Some(*s),
        [m, s] => Some(m * 60.0 + s),
        [h, m, s] => Some(h * 3600.0 + m * 60.0 + s),
        _ => None,
    }
}
