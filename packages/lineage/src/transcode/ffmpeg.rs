use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument};

use super::error::TranscodeError;
use super::{TranscodeJob, TranscodeOp, Transcoder};
use crate::config::TranscodeConfig;

/// Drives the `ffmpeg` and `ffprobe` binaries.
///
/// Children are spawned with `kill_on_drop`, so cancelling a call (for
/// example through `tokio::time::timeout`) also stops the process.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    ffmpeg_bin: String,
    ffprobe_bin: String,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg_bin: impl Into<String>, ffprobe_bin: impl Into<String>) -> Self {
        Self {
            ffmpeg_bin: ffmpeg_bin.into(),
            ffprobe_bin: ffprobe_bin.into(),
        }
    }

    pub fn from_config(config: &TranscodeConfig) -> Self {
        Self::new(&config.ffmpeg_bin, &config.ffprobe_bin)
    }

    async fn run(&self, bin: &str, args: Vec<OsString>) -> Result<Vec<u8>, TranscodeError> {
        let output = Command::new(bin)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| TranscodeError::Launch(format!("failed to execute {bin}: {err}")))?;

        if !output.status.success() {
            return Err(TranscodeError::Execution(format!(
                "{bin} exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    #[instrument(skip(self, job), fields(op = ?job.op, dest = %dest.display()))]
    async fn transcode(&self, job: &TranscodeJob, dest: &Path) -> Result<(), TranscodeError> {
        let args = build_args(job, dest)?;
        debug!(?args, "Running ffmpeg");
        self.run(&self.ffmpeg_bin, args).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn probe_duration(&self, path: &Path) -> Result<f64, TranscodeError> {
        let args: Vec<OsString> = vec![
            "-v".into(),
            "error".into(),
            "-show_entries".into(),
            "format=duration".into(),
            "-of".into(),
            "default=noprint_wrappers=1:nokey=1".into(),
            path.as_os_str().to_owned(),
        ];
        let stdout = self
            .run(&self.ffprobe_bin, args)
            .await
            .map_err(|err| TranscodeError::Probe(err.to_string()))?;
        parse_probe_output(&String::from_utf8_lossy(&stdout))
    }
}

/// Parses `ffprobe` duration output, rounded to hundredths of a second.
pub fn parse_probe_output(stdout: &str) -> Result<f64, TranscodeError> {
    let text = stdout.trim();
    let seconds: f64 = text
        .parse()
        .map_err(|_| TranscodeError::Probe(format!("unexpected ffprobe output: {text:?}")))?;
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(TranscodeError::Probe(format!(
            "non-positive duration: {seconds}"
        )));
    }
    Ok((seconds * 100.0).round() / 100.0)
}

fn secs(value: f64) -> String {
    format!("{value:.3}")
}

/// Command line for `job`, excluding the binary itself.
pub fn build_args(job: &TranscodeJob, dest: &Path) -> Result<Vec<OsString>, TranscodeError> {
    let mut args: Vec<OsString> = ["-hide_banner", "-nostdin", "-loglevel", "error", "-y"]
        .into_iter()
        .map(OsString::from)
        .collect();

    let input = |args: &mut Vec<OsString>, index: usize| -> Result<(), TranscodeError> {
        let source = job.sources.get(index).ok_or_else(|| {
            TranscodeError::InvalidJob(format!("missing input #{index}"))
        })?;
        args.push("-i".into());
        args.push(source.as_os_str().to_owned());
        Ok(())
    };

    match &job.op {
        TranscodeOp::Trim { start, end } => {
            args.push("-ss".into());
            args.push(secs(*start).into());
            args.push("-t".into());
            args.push(secs(end - start).into());
            input(&mut args, 0)?;
        }
        TranscodeOp::Extend { start, end } => {
            input(&mut args, 0)?;
            args.push("-filter_complex".into());
            args.push(
                format!(
                    "[0:a]asplit=2[full][dup];\
                     [dup]atrim=start={}:end={},asetpts=PTS-STARTPTS[seg];\
                     [full][seg]concat=n=2:v=0:a=1[out]",
                    secs(*start),
                    secs(*end)
                )
                .into(),
            );
            args.push("-map".into());
            args.push("[out]".into());
        }
        TranscodeOp::Shorten {
            start,
            end,
            source_duration,
        } => {
            input(&mut args, 0)?;
            if *start <= 0.0 {
                args.push("-af".into());
                args.push(format!("atrim=start={},asetpts=PTS-STARTPTS", secs(*end)).into());
            } else if *end >= *source_duration {
                args.push("-af".into());
                args.push(format!("atrim=end={},asetpts=PTS-STARTPTS", secs(*start)).into());
            } else {
                args.push("-filter_complex".into());
                args.push(
                    format!(
                        "[0:a]asplit=2[a][b];\
                         [a]atrim=end={},asetpts=PTS-STARTPTS[head];\
                         [b]atrim=start={},asetpts=PTS-STARTPTS[tail];\
                         [head][tail]concat=n=2:v=0:a=1[out]",
                        secs(*start),
                        secs(*end)
                    )
                    .into(),
                );
                args.push("-map".into());
                args.push("[out]".into());
            }
        }
        TranscodeOp::Mix => {
            input(&mut args, 0)?;
            input(&mut args, 1)?;
            args.push("-filter_complex".into());
            args.push("[0:a][1:a]amix=inputs=2:duration=longest[out]".into());
            args.push("-map".into());
            args.push("[out]".into());
        }
        TranscodeOp::Echo(params) => {
            input(&mut args, 0)?;
            args.push("-af".into());
            args.push(
                format!(
                    "aecho={}:{}:{}:{}",
                    params.in_gain, params.out_gain, params.delay_ms, params.decay
                )
                .into(),
            );
        }
    }

    args.push("-vn".into());
    args.push(dest.as_os_str().to_owned());
    Ok(args)
}
