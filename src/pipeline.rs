//! Media pipeline construction and launch.
//!
//! The core only needs a descriptor string per device and a start/stop
//! lifecycle; [`MediaPipelineFactory`] is that capability. [`GstLaunchFactory`]
//! produces GStreamer launch lines suitable for an RTSP media factory and can
//! hand them to an external launcher process.

use std::process::Stdio;

use thiserror::Error;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::config::Settings;

/// Coarse camera class, derived from the logical name only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraClass {
    Generic,
    /// Side-by-side stereo/depth camera; only the left image is streamed.
    Stereo,
}

impl CameraClass {
    pub fn from_name(name: &str) -> Self {
        if name.to_lowercase().contains("zed") {
            Self::Stereo
        } else {
            Self::Generic
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("cannot build a pipeline for device '{0}'")]
    UnsupportedDevice(String),
    #[error("failed to launch pipeline: {0}")]
    Launch(String),
    #[error("failed to stop pipeline: {0}")]
    Stop(String),
}

pub trait MediaPipelineFactory: Send {
    type Handle: Send;

    fn build_descriptor(&self, device_path: &str, class: CameraClass)
    -> Result<String, PipelineError>;

    fn start(
        &mut self,
        name: &str,
        mount_path: &str,
        descriptor: &str,
    ) -> Result<Self::Handle, PipelineError>;

    fn stop(&mut self, handle: Self::Handle) -> Result<(), PipelineError>;

    /// Whether the pipeline behind `handle` is still serving.
    fn is_running(&mut self, _handle: &mut Self::Handle) -> bool {
        true
    }
}

/// Running pipeline owned by a mount.
#[derive(Debug)]
pub enum PipelineHandle {
    /// No launcher configured; the mount exists only in the table.
    Tracked,
    Process(Child),
}

#[derive(Debug, Clone)]
pub struct GstLaunchFactory {
    bitrate_kbps: u32,
    stereo_crop_right: u32,
    stream_port: u16,
    launcher: Option<Vec<String>>,
}

impl GstLaunchFactory {
    pub fn new(settings: &Settings) -> Self {
        Self {
            bitrate_kbps: settings.bitrate_kbps,
            stereo_crop_right: settings.stereo_crop_right,
            stream_port: settings.stream_port,
            launcher: settings.launcher.clone(),
        }
    }

    fn launcher_args(&self, template: &[String], name: &str, mount_path: &str, descriptor: &str) -> Vec<String> {
        let port = self.stream_port.to_string();
        template
            .iter()
            .map(|arg| {
                arg.replace("{name}", name)
                    .replace("{mount}", mount_path)
                    .replace("{port}", &port)
                    .replace("{descriptor}", descriptor)
            })
            .collect()
    }
}

impl MediaPipelineFactory for GstLaunchFactory {
    type Handle = PipelineHandle;

    fn build_descriptor(
        &self,
        device_path: &str,
        class: CameraClass,
    ) -> Result<String, PipelineError> {
        // The path is spliced into a launch line; reject anything that could
        // change its structure.
        if device_path.is_empty()
            || device_path
                .chars()
                .any(|c| c.is_whitespace() || matches!(c, '!' | '(' | ')' | '"' | '\''))
        {
            return Err(PipelineError::UnsupportedDevice(device_path.to_string()));
        }

        let crop = match class {
            CameraClass::Generic => String::new(),
            CameraClass::Stereo => format!(
                "videocrop right={} ! videoconvert ! ",
                self.stereo_crop_right
            ),
        };

        Ok(format!(
            "( v4l2src device={device_path} ! videoconvert ! {crop}x264enc tune=zerolatency bitrate={} speed-preset=superfast ! h264parse ! rtph264pay config-interval=10 name=pay0 pt=96 )",
            self.bitrate_kbps
        ))
    }

    fn start(
        &mut self,
        name: &str,
        mount_path: &str,
        descriptor: &str,
    ) -> Result<PipelineHandle, PipelineError> {
        let Some(template) = &self.launcher else {
            debug!("No launcher configured, tracking {mount_path} only");
            return Ok(PipelineHandle::Tracked);
        };

        let args = self.launcher_args(template, name, mount_path, descriptor);
        let Some((program, rest)) = args.split_first() else {
            return Err(PipelineError::Launch("launcher command is empty".to_string()));
        };

        let child = Command::new(program)
            .args(rest)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PipelineError::Launch(format!("{program}: {e}")))?;

        info!(
            "Launched {program} for {mount_path} (pid {})",
            child.id().unwrap_or_default()
        );
        Ok(PipelineHandle::Process(child))
    }

    fn stop(&mut self, handle: PipelineHandle) -> Result<(), PipelineError> {
        match handle {
            PipelineHandle::Tracked => Ok(()),
            PipelineHandle::Process(mut child) => {
                if let Ok(Some(status)) = child.try_wait() {
                    debug!("Launcher already exited with {status}");
                    return Ok(());
                }
                child
                    .start_kill()
                    .map_err(|e| PipelineError::Stop(e.to_string()))
            }
        }
    }

    fn is_running(&mut self, handle: &mut PipelineHandle) -> bool {
        match handle {
            PipelineHandle::Tracked => true,
            PipelineHandle::Process(child) => match child.try_wait() {
                Ok(None) => true,
                Ok(Some(status)) => {
                    warn!("Launcher exited with {status}");
                    false
                }
                Err(e) => {
                    warn!("Failed to poll launcher: {e}");
                    false
                }
            },
        }
    }
}
