// Transform stage: ffmpeg recipes
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::process;
use crate::error::PipelineError;

/// atempo only accepts factors in this range.
const TEMPO_MIN: f64 = 0.5;
const TEMPO_MAX: f64 = 2.0;
const MUSIC_GAIN: f64 = 0.3;
const AUDIO_BITRATE: &str = "192k";
const CONCAT_MANIFEST: &str = "concat.txt";

#[derive(Debug, Clone, PartialEq)]
pub enum Recipe {
    Trim { start: f64, duration: f64 },
    Concat,
    ExtractAudio,
    ChangeSpeed { speed: f64 },
    MixMusic,
}

/// Splits `speed` into atempo factors, each within [0.5, 2.0], whose
/// product is `speed`.
pub fn tempo_chain(speed: f64) -> Vec<f64> {
    let mut chain = Vec::new();
    let mut tempo = speed;
    while tempo > TEMPO_MAX {
        chain.push(TEMPO_MAX);
        tempo /= 2.0;
    }
    while tempo < TEMPO_MIN {
        chain.push(TEMPO_MIN);
        tempo *= 2.0;
    }
    chain.push(tempo);
    chain
}

pub fn atempo_filter(speed: f64) -> String {
    tempo_chain(speed)
        .iter()
        .map(|factor| format!("atempo={factor}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Content of a concat demuxer list for `inputs`.
pub fn concat_manifest(inputs: &[PathBuf]) -> String {
    inputs
        .iter()
        .map(|path| format!("file '{}'\n", path.to_string_lossy().replace('\'', r"'\''")))
        .collect()
}

impl Recipe {
    /// Full ffmpeg argument vector. `inputs` are the retrieved files in
    /// retrieval order; `manifest` is only used by [`Recipe::Concat`].
    pub fn args(&self, inputs: &[PathBuf], manifest: &Path, output: &Path) -> Vec<OsString> {
        let mut args = Vec::new();
        extend(&mut args, &["-hide_banner", "-nostdin", "-y", "-loglevel", "error"]);

        match self {
            Recipe::Trim { start, duration } => {
                let start = start.to_string();
                let duration = duration.to_string();
                extend(&mut args, &["-ss", start.as_str()]);
                push_inputs(&mut args, inputs);
                extend(&mut args, &["-t", duration.as_str()]);
                extend(&mut args, &["-c:v", "libx264", "-c:a", "aac", "-movflags", "+faststart"]);
            }
            Recipe::Concat => {
                extend(&mut args, &["-f", "concat", "-safe", "0", "-i"]);
                args.push(manifest.into());
                extend(&mut args, &["-c", "copy"]);
            }
            Recipe::ExtractAudio => {
                push_inputs(&mut args, inputs);
                extend(&mut args, &["-vn", "-c:a", "libmp3lame", "-b:a", AUDIO_BITRATE]);
            }
            Recipe::ChangeSpeed { speed } => {
                let video = format!("setpts={}*PTS", 1.0 / speed);
                let audio = atempo_filter(*speed);
                push_inputs(&mut args, inputs);
                extend(&mut args, &["-filter:v", video.as_str(), "-filter:a", audio.as_str()]);
            }
            Recipe::MixMusic => {
                let graph = format!(
                    "[1:a]volume={MUSIC_GAIN}[a1];[0:a][a1]amix=inputs=2:duration=shortest[aout]"
                );
                push_inputs(&mut args, inputs);
                extend(&mut args, &["-filter_complex", graph.as_str()]);
                extend(&mut args, &["-map", "0:v", "-map", "[aout]", "-c:v", "copy"]);
            }
        }
        args.push(output.into());
        args
    }
}

fn extend(args: &mut Vec<OsString>, items: &[&str]) {
    args.extend(items.iter().map(OsString::from));
}

fn push_inputs(args: &mut Vec<OsString>, inputs: &[PathBuf]) {
    for input in inputs {
        args.push("-i".into());
        args.push(input.into());
    }
}

pub struct Transformer<'a> {
    pub ffmpeg: &'a Path,
    pub output_limit: usize,
}

impl Transformer<'_> {
    /// Runs `recipe` inside `workspace` and returns the output path.
    pub async fn apply(
        &self,
        recipe: &Recipe,
        inputs: &[PathBuf],
        workspace: &Path,
        output_name: &str,
    ) -> Result<PathBuf, PipelineError> {
        let output = workspace.join(output_name);
        let manifest = workspace.join(CONCAT_MANIFEST);
        if *recipe == Recipe::Concat {
            tokio::fs::write(&manifest, concat_manifest(inputs))
                .await
                .map_err(|source| PipelineError::Workspace {
                    path: manifest.clone(),
                    source,
                })?;
        }

        let args = recipe.args(inputs, &manifest, &output);
        info!("Transforming into {}", output.display());
        debug!("ffmpeg args: {:?}", args);

        let result = process::run(self.ffmpeg, &args, workspace, self.output_limit)
            .await
            .map_err(|source| PipelineError::ToolLaunch { tool: "ffmpeg", source })?;

        if !result.success() {
            warn!("ffmpeg failed: {}", result.stderr.trim());
            return Err(PipelineError::Transform {
                exit_code: result.exit_code,
                stderr: result.stderr.trim().to_string(),
            });
        }
        if !tokio::fs::try_exists(&output).await.unwrap_or(false) {
            return Err(PipelineError::ToolOutputMissing { tool: "ffmpeg", path: output });
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    fn product(chain: &[f64]) -> f64 {
        chain.iter().product()
    }

    #[test]
    fn tempo_chain_in_range_is_single_stage() {
        assert_eq!(tempo_chain(1.5), vec![1.5]);
        assert_eq!(tempo_chain(0.5), vec![0.5]);
        assert_eq!(tempo_chain(2.0), vec![2.0]);
    }

    #[test]
    fn tempo_chain_decomposes_fast_and_slow_factors() {
        assert_eq!(tempo_chain(4.0), vec![2.0, 2.0]);
        assert_eq!(tempo_chain(0.25), vec![0.5, 0.5]);
        assert_eq!(tempo_chain(5.0), vec![2.0, 2.0, 1.25]);
        for speed in [0.01, 0.3, 3.0, 7.5, 100.0] {
            let chain = tempo_chain(speed);
            assert!(chain.iter().all(|f| (TEMPO_MIN..=TEMPO_MAX).contains(f)), "{chain:?}");
            assert!((product(&chain) - speed).abs() < 1e-9 * speed.max(1.0), "{speed}: {chain:?}");
        }
    }

    #[test]
    fn extreme_speeds_stay_short() {
        assert_eq!(tempo_chain(200.0), vec![2.0, 2.0, 2.0, 2.0, 2.0, 2.0, 2.0, 1.5625]);
        assert!(tempo_chain(1e6).len() <= 21);
        assert!(tempo_chain(1e-6).len() <= 21);
    }

    #[test]
    fn atempo_filter_joins_stages() {
        assert_eq!(atempo_filter(4.0), "atempo=2,atempo=2");
        assert_eq!(atempo_filter(0.75), "atempo=0.75");
    }

    #[test]
    fn concat_manifest_escapes_quotes() {
        let manifest = concat_manifest(&[PathBuf::from("/tmp/a/video1.mp4"), PathBuf::from("/tmp/it's/video2.mp4")]);
        assert_eq!(manifest, "file '/tmp/a/video1.mp4'\nfile '/tmp/it'\\''s/video2.mp4'\n");
    }

    #[test]
    fn trim_seeks_then_limits_duration() {
        let args = strings(Recipe::Trim { start: 10.0, duration: 5.5 }.args(
            &[PathBuf::from("in.mp4")],
            Path::new("concat.txt"),
            Path::new("out.mp4"),
        ));
        assert_eq!(
            args,
            vec![
                "-hide_banner", "-nostdin", "-y", "-loglevel", "error", "-ss", "10", "-i", "in.mp4", "-t", "5.5",
                "-c:v", "libx264", "-c:a", "aac", "-movflags", "+faststart", "out.mp4",
            ]
        );
    }

    #[test]
    fn concat_reads_manifest_and_copies_streams() {
        let args = strings(Recipe::Concat.args(
            &[PathBuf::from("a.mp4"), PathBuf::from("b.mp4")],
            Path::new("/ws/concat.txt"),
            Path::new("/ws/merged.mp4"),
        ));
        assert_eq!(
            &args[5..],
            &["-f", "concat", "-safe", "0", "-i", "/ws/concat.txt", "-c", "copy", "/ws/merged.mp4"]
        );
    }

    #[test]
    fn extract_audio_drops_video() {
        let args = strings(Recipe::ExtractAudio.args(&[PathBuf::from("v.mp4")], Path::new("m"), Path::new("audio.mp3")));
        assert_eq!(&args[5..], &["-i", "v.mp4", "-vn", "-c:a", "libmp3lame", "-b:a", "192k", "audio.mp3"]);
    }

    #[test]
    fn speed_scales_video_and_chains_audio() {
        let args = strings(Recipe::ChangeSpeed { speed: 4.0 }.args(&[PathBuf::from("v.mp4")], Path::new("m"), Path::new("o.mp4")));
        assert_eq!(
            &args[5..],
            &["-i", "v.mp4", "-filter:v", "setpts=0.25*PTS", "-filter:a", "atempo=2,atempo=2", "o.mp4"]
        );
    }

    #[test]
    fn mix_music_attenuates_and_keeps_video() {
        let args = strings(Recipe::MixMusic.args(
            &[PathBuf::from("video.mp4"), PathBuf::from("music.m4a")],
            Path::new("m"),
            Path::new("o.mp4"),
        ));
        assert_eq!(
            &args[5..],
            &[
                "-i", "video.mp4", "-i", "music.m4a", "-filter_complex",
                "[1:a]volume=0.3[a1];[0:a][a1]amix=inputs=2:duration=shortest[aout]",
                "-map", "0:v", "-map", "[aout]", "-c:v", "copy", "o.mp4",
            ]
        );
    }
}
