// server configuration
use anyhow::Context;
use std::env;
use std::path::PathBuf;
use tracing::{info, Level};

const DEV_PORT: u16 = 5000;
const PROD_PORT: u16 = 3000;
const DEFAULT_OUTPUT_LIMIT: usize = 64 * 1024;
const DEFAULT_SOCKET_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RETRIES: u32 = 3;
const YTDLP_RELEASE_URL: &str = "https://github.com/yt-dlp/yt-dlp/releases/latest/download/yt-dlp";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Dev,
    Prod,
}

impl Mode {
    /// Anything other than `prod` (any case) is development.
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some(mode) if mode.trim().eq_ignore_ascii_case("prod") => Mode::Prod,
            _ => Mode::Dev,
        }
    }

    pub fn from_env() -> Self {
        Self::parse(env::var("MODE").ok().as_deref())
    }

    /// Log level used when `RUST_LOG` is not set.
    pub fn default_log_level(self) -> Level {
        match self {
            Mode::Dev => Level::DEBUG,
            Mode::Prod => Level::INFO,
        }
    }
}

/// Flags forwarded to the retrieval binary on every download.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalOptions {
    pub socket_timeout_secs: u64,
    pub retries: u32,
    pub user_agent: Option<String>,
    pub no_check_certificates: bool,
    /// `Name:value` pairs, each sent as one `--add-header`.
    pub headers: Vec<String>,
    pub extra_args: Vec<String>,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            socket_timeout_secs: DEFAULT_SOCKET_TIMEOUT_SECS,
            retries: DEFAULT_RETRIES,
            user_agent: None,
            no_check_certificates: false,
            headers: Vec::new(),
            extra_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub mode: Mode,
    pub port: u16,
    pub backend_url: String,
    pub ytdlp_path: PathBuf,
    pub ffmpeg_path: PathBuf,
    pub workspace_root: PathBuf,
    pub output_limit: usize,
    pub retrieval: RetrievalOptions,
    pub ytdlp_auto_install: bool,
    pub ytdlp_download_url: String,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup. Empty values
    /// count as unset.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mode = Mode::parse(get("MODE").as_deref());

        let port = match get("PORT") {
            Some(port) => port
                .parse::<u16>()
                .with_context(|| format!("PORT must be a port number, got {port:?}"))?,
            None => match mode {
                Mode::Dev => DEV_PORT,
                Mode::Prod => PROD_PORT,
            },
        };
        let backend_url = get("BACKEND_URL").unwrap_or_else(|| format!("http://localhost:{port}"));

        let retrieval = RetrievalOptions {
            socket_timeout_secs: parse_or(get("YTDLP_SOCKET_TIMEOUT"), "YTDLP_SOCKET_TIMEOUT", DEFAULT_SOCKET_TIMEOUT_SECS)?,
            retries: parse_or(get("YTDLP_RETRIES"), "YTDLP_RETRIES", DEFAULT_RETRIES)?,
            user_agent: get("YTDLP_USER_AGENT"),
            no_check_certificates: parse_flag(get("YTDLP_NO_CHECK_CERTIFICATES"), "YTDLP_NO_CHECK_CERTIFICATES")?,
            headers: parse_headers(get("YTDLP_HEADERS"))?,
            extra_args: match get("YTDLP_EXTRA_ARGS") {
                Some(raw) => shlex::split(&raw)
                    .with_context(|| format!("YTDLP_EXTRA_ARGS has unbalanced quoting: {raw:?}"))?,
                None => Vec::new(),
            },
        };

        let config = ServerConfig {
            mode,
            port,
            backend_url,
            ytdlp_path: tool_path(get("YTDLP_PATH"), "yt-dlp"),
            ffmpeg_path: tool_path(get("FFMPEG_PATH"), "ffmpeg"),
            workspace_root: get("WORKSPACE_ROOT").map(PathBuf::from).unwrap_or_else(env::temp_dir),
            output_limit: parse_or(get("TOOL_OUTPUT_LIMIT"), "TOOL_OUTPUT_LIMIT", DEFAULT_OUTPUT_LIMIT)?,
            retrieval,
            ytdlp_auto_install: parse_flag(get("YTDLP_AUTO_INSTALL"), "YTDLP_AUTO_INSTALL")?,
            ytdlp_download_url: get("YTDLP_DOWNLOAD_URL").unwrap_or_else(|| YTDLP_RELEASE_URL.to_string()),
        };

        // Log which keys were supplied (NOT their values!)
        let configured: Vec<&str> = CONFIG_KEYS.iter().copied().filter(|key| get(*key).is_some()).collect();
        info!("Configuration keys set: {:?}", configured);

        Ok(config)
    }
}

const CONFIG_KEYS: &[&str] = &[
    "MODE",
    "PORT",
    "BACKEND_URL",
    "YTDLP_PATH",
    "FFMPEG_PATH",
    "WORKSPACE_ROOT",
    "TOOL_OUTPUT_LIMIT",
    "YTDLP_SOCKET_TIMEOUT",
    "YTDLP_RETRIES",
    "YTDLP_USER_AGENT",
    "YTDLP_NO_CHECK_CERTIFICATES",
    "YTDLP_HEADERS",
    "YTDLP_EXTRA_ARGS",
    "YTDLP_AUTO_INSTALL",
    "YTDLP_DOWNLOAD_URL",
];

/// Bare names stay as-is for PATH lookup; relative paths are anchored to the
/// current directory since tools run inside their workspace.
fn tool_path(value: Option<String>, default: &str) -> PathBuf {
    let path = PathBuf::from(value.unwrap_or_else(|| default.to_string()));
    if path.components().count() > 1 && path.is_relative() {
        std::path::absolute(&path).unwrap_or(path)
    } else {
        path
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value: {raw:?}")),
        None => Ok(default),
    }
}

/// One header per line; header values may contain spaces, commas and `;`.
fn parse_headers(value: Option<String>) -> anyhow::Result<Vec<String>> {
    let Some(raw) = value else {
        return Ok(Vec::new());
    };
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| match line.split_once(':') {
            Some((name, _)) if !name.trim().is_empty() => Ok(line.to_string()),
            _ => Err(anyhow::anyhow!("YTDLP_HEADERS entries must look like Name:value, got {line:?}")),
        })
        .collect()
}

fn parse_flag(value: Option<String>, key: &str) -> anyhow::Result<bool> {
    match value.as_deref().map(str::to_lowercase).as_deref() {
        None => Ok(false),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(anyhow::anyhow!("{key} must be a boolean, got {other:?}")),
    }
}
