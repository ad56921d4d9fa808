//! Fallback composition with a local ffmpeg binary.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use bytes::Bytes;
use common::error::AppError;
use tokio::process::Command;
use tracing::debug;

use crate::pipeline::{ComposedMedia, CompositionRequest};

const FRAME_RATE: u32 = 30;
const PRODUCT_WIDTH_PERCENT: u32 = 70;
const SHADOW_OFFSET_X: u32 = 18;
const SHADOW_OFFSET_Y: u32 = 24;

/// Builder for ffmpeg invocations with any number of inputs.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    inputs: Vec<(Vec<String>, String)>,
    output_args: Vec<String>,
    output: PathBuf,
    log_level: String,
}

impl FfmpegCommand {
    pub fn new(output: impl AsRef<Path>) -> Self {
        Self {
            inputs: Vec::new(),
            output_args: Vec::new(),
            output: output.as_ref().to_path_buf(),
            log_level: "error".to_string(),
        }
    }

    /// Add an input with its own leading arguments (placed before its `-i`).
    pub fn input<I, S>(mut self, args: I, source: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs
            .push((args.into_iter().map(Into::into).collect(), source.into()));
        self
    }

    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    pub fn filter_complex(self, filter: impl Into<String>) -> Self {
        self.output_arg("-filter_complex").output_arg(filter)
    }

    pub fn map(self, label: impl Into<String>) -> Self {
        self.output_arg("-map").output_arg(label)
    }

    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    pub fn single_frame(self) -> Self {
        self.output_arg("-frames:v").output_arg("1")
    }

    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec!["-y".to_string(), "-v".to_string(), self.log_level.clone()];
        for (input_args, source) in &self.inputs {
            args.extend(input_args.iter().cloned());
            args.push("-i".to_string());
            args.push(source.clone());
        }
        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().to_string());
        args
    }
}

/// Composes a still product cutout over a solid background with a soft drop shadow.
pub struct FfmpegCompositor {
    ffmpeg_path: String,
}

impl FfmpegCompositor {
    pub fn new(ffmpeg_path: &str) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.to_string(),
        }
    }

    pub async fn compose(&self, request: &CompositionRequest) -> Result<ComposedMedia, AppError> {
        let workdir = tempfile::tempdir()?;
        let cutout_path = workdir.path().join("cutout.png");
        let video_path = workdir.path().join("fallback.mp4");
        let thumbnail_path = workdir.path().join("fallback.jpg");

        tokio::fs::write(&cutout_path, &request.cutout_png).await?;

        self.run(&composition_command(request, &cutout_path, &video_path))
            .await?;
        self.run(&thumbnail_command(&video_path, &thumbnail_path))
            .await?;

        let video = Bytes::from(tokio::fs::read(&video_path).await?);
        let thumbnail = Bytes::from(tokio::fs::read(&thumbnail_path).await?);
        if video.is_empty() {
            return Err(AppError::Provider("ffmpeg produced an empty video".into()));
        }

        Ok(ComposedMedia { video, thumbnail })
    }

    async fn run(&self, command: &FfmpegCommand) -> Result<(), AppError> {
        let args = command.build_args();
        debug!(ffmpeg = %self.ffmpeg_path, args = ?args, "running ffmpeg");

        let output = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| AppError::Provider(format!("failed to launch ffmpeg: {e}")))?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let excerpt: String = stderr.chars().take(400).collect();
        Err(AppError::Provider(format!(
            "ffmpeg exited with {}: {excerpt}",
            output.status
        )))
    }
}

fn hex_color(rgb: [u8; 3]) -> String {
    format!("0x{:02X}{:02X}{:02X}", rgb[0], rgb[1], rgb[2])
}

fn product_width(frame_width: u32) -> u32 {
    let scaled = frame_width
        .saturating_mul(PRODUCT_WIDTH_PERCENT)
        .saturating_add(50)
        / 100;
    // keep even for yuv420p
    scaled & !1
}

fn composition_filter(request: &CompositionRequest) -> String {
    let product_w = product_width(request.width);
    format!(
        "[1:v]scale={product_w}:-2,format=rgba,split[prod][sh];\
         [sh]colorchannelmixer=rr=0:gg=0:bb=0:aa=0.45,boxblur=12:2[shadow];\
         [0:v][shadow]overlay=x=(W-w)/2+{SHADOW_OFFSET_X}:y=(H-h)/2+{SHADOW_OFFSET_Y}[bg];\
         [bg][prod]overlay=x=(W-w)/2:y=(H-h)/2,format=yuv420p[v]"
    )
}

fn composition_command(
    request: &CompositionRequest,
    cutout_path: &Path,
    video_path: &Path,
) -> FfmpegCommand {
    let duration = request.duration_seconds.to_string();
    let background = format!(
        "color=c={}:s={}x{}:d={}:r={FRAME_RATE}",
        hex_color(request.background_rgb),
        request.width,
        request.height,
        request.duration_seconds
    );

    FfmpegCommand::new(video_path)
        .input(["-f", "lavfi"], background)
        .input(
            ["-loop".to_string(), "1".to_string(), "-t".to_string(), duration.clone()],
            cutout_path.to_string_lossy().to_string(),
        )
        .filter_complex(composition_filter(request))
        .map("[v]")
        .video_codec("libx264")
        .output_arg("-pix_fmt")
        .output_arg("yuv420p")
        .output_arg("-t")
        .output_arg(duration)
        .output_arg("-movflags")
        .output_arg("+faststart")
}

fn thumbnail_command(video_path: &Path, thumbnail_path: &Path) -> FfmpegCommand {
    FfmpegCommand::new(thumbnail_path)
        .input(["-ss", "0.5"], video_path.to_string_lossy().to_string())
        .single_frame()
        .output_arg("-q:v")
        .output_arg("3")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CompositionRequest {
        CompositionRequest {
            cutout_png: Bytes::from_static(b"png"),
            background_rgb: [0xF4, 0xEF, 0xE6],
            duration_seconds: 6,
            width: 1080,
            height: 1920,
        }
    }

    #[test]
    fn composition_args_have_both_inputs_and_output_last() {
        let command = composition_command(
            &request(),
            Path::new("/tmp/work/cutout.png"),
            Path::new("/tmp/work/fallback.mp4"),
        );
        let args = command.build_args();

        assert_eq!(args.first().map(String::as_str), Some("-y"));
        assert_eq!(args.last().map(String::as_str), Some("/tmp/work/fallback.mp4"));
        assert_eq!(args.iter().filter(|a| a.as_str() == "-i").count(), 2);
        assert!(args
            .iter()
            .any(|a| a == "color=c=0xF4EFE6:s=1080x1920:d=6:r=30"));
        assert!(args.iter().any(|a| a == "/tmp/work/cutout.png"));
    }

    #[test]
    fn filter_scales_product_and_adds_shadow() {
        let filter = composition_filter(&request());
        assert!(filter.starts_with("[1:v]scale=756:-2"));
        assert!(filter.contains("boxblur"));
        assert!(filter.ends_with("format=yuv420p[v]"));
    }

    #[test]
    fn product_width_is_even() {
        assert_eq!(product_width(1080), 756);
        assert_eq!(product_width(721), 504);
        assert_eq!(product_width(0), 0);
        assert_eq!(product_width(u32::MAX) % 2, 0);
    }

    #[test]
    fn thumbnail_grabs_one_frame() {
        let args = thumbnail_command(Path::new("/tmp/in.mp4"), Path::new("/tmp/out.jpg")).build_args();
        let joined = args.join(" ");
        assert!(joined.contains("-ss 0.5 -i /tmp/in.mp4"));
        assert!(joined.contains("-frames:v 1"));
        assert!(joined.ends_with("/tmp/out.jpg"));
    }
}
