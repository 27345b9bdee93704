//! Device probing against the local V4L2 device nodes.
//!
//! [`DeviceProbe`] is the seam between enumeration and hardware. The system
//! implementation checks `/dev/video*`, asks udev for identity and trial-opens
//! the device with the `v4l` crate.

use std::path::Path;
use std::process::Command;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use v4l::Device;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;

use crate::error::{IdentityLookupFailure, ProbeError};
use crate::naming::DeviceIdentity;

/// Identity record for one physical device, built fresh on every pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraDevice {
    pub slot_id: u32,
    pub device_path: String,
    pub vendor_id: Option<String>,
    pub product_id: Option<String>,
    pub derived_name: String,
    pub streamable: bool,
}

/// Device node path for a slot.
pub fn device_path(slot_id: u32) -> String {
    format!("/dev/video{slot_id}")
}

/// Hardware access used by the enumerator.
pub trait DeviceProbe: Send + Sync {
    fn device_exists(&self, slot_id: u32) -> bool;

    fn read_identity(&self, slot_id: u32) -> Result<DeviceIdentity, IdentityLookupFailure>;

    /// Trial-open the device and wait for one frame, at most `timeout`. Every
    /// handle acquired here must be released before returning.
    fn probe(&self, device_path: &str, timeout: Duration) -> Result<(), ProbeError>;
}

/// Probe backed by the real device nodes, udev and V4L2.
#[derive(Debug, Clone, Default)]
pub struct SystemProbe;

impl SystemProbe {
    pub fn new() -> Self {
        Self
    }
}

impl DeviceProbe for SystemProbe {
    fn device_exists(&self, slot_id: u32) -> bool {
        Path::new(&device_path(slot_id)).exists()
    }

    fn read_identity(&self, slot_id: u32) -> Result<DeviceIdentity, IdentityLookupFailure> {
        let path = device_path(slot_id);
        let failure = |reason: String| IdentityLookupFailure {
            device_path: path.clone(),
            reason,
        };

        let output = Command::new("udevadm")
            .args(["info", "--query=property", "--name", &path])
            .output()
            .map_err(|e| failure(format!("failed to run udevadm: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(failure(format!("udevadm exited with {}: {}", output.status, stderr.trim())));
        }

        parse_udev_properties(&String::from_utf8_lossy(&output.stdout))
            .ok_or_else(|| failure("no vendor, product or serial properties".to_string()))
    }

    fn probe(&self, device_path: &str, timeout: Duration) -> Result<(), ProbeError> {
        let failed = |reason: String| ProbeError::Failed {
            device_path: device_path.to_string(),
            reason,
        };

        let device = Device::with_path(device_path).map_err(|e| failed(e.to_string()))?;
        let caps = device.query_caps().map_err(|e| failed(e.to_string()))?;
        if !caps
            .capabilities
            .contains(v4l::capability::Flags::VIDEO_CAPTURE)
        {
            return Err(failed("not a video capture node".to_string()));
        }
        // Buffer allocation fails with EBUSY when another process is already
        // streaming from this node.
        let mut stream = Stream::with_buffers(&device, Type::VideoCapture, 2)
            .map_err(|e| failed(e.to_string()))?;
        stream.set_timeout(timeout);

        let result = match stream.next() {
            Ok((_, meta)) => {
                debug!("Probe of {device_path} got frame {} ({} bytes)", meta.sequence, meta.bytesused);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Err(ProbeError::Timeout {
                device_path: device_path.to_string(),
                timeout,
            }),
            Err(e) => Err(failed(e.to_string())),
        };

        // The stream borrows the device; release both before reporting.
        drop(stream);
        drop(device);
        result
    }
}

static UDEV_PROPERTY: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"(?m)^(?:E: )?([A-Z_]+)=(.*)$"));

/// Extract identity from `udevadm info --query=property` output.
///
/// `ID_SERIAL` is preferred as the descriptor; the `/dev/v4l/by-id` link from
/// `DEVLINKS` is used when there is no serial.
pub fn parse_udev_properties(output: &str) -> Option<DeviceIdentity> {
    let line = UDEV_PROPERTY.as_ref().ok()?;

    let mut identity = DeviceIdentity::default();
    let mut by_id = None;
    for captures in line.captures_iter(output) {
        let (Some(key), Some(value)) = (captures.get(1), captures.get(2)) else {
            continue;
        };
        let value = value.as_str().trim().to_string();
        if value.is_empty() {
            continue;
        }
        match key.as_str() {
            "ID_VENDOR_ID" => identity.vendor_id = Some(value),
            "ID_MODEL_ID" => identity.product_id = Some(value),
            "ID_SERIAL" => identity.descriptor = Some(value),
            "DEVLINKS" => {
                by_id = value
                    .split_whitespace()
                    .find(|link| link.starts_with("/dev/v4l/by-id/"))
                    .map(str::to_string);
            }
            _ => {}
        }
    }

    if identity.descriptor.is_none() {
        identity.descriptor = by_id;
    }

    (identity != DeviceIdentity::default()).then_some(identity)
}

#[cfg(test)]
mod tests {
    use super::*;

    const C920: &str = "DEVPATH=/devices/pci0000:00/0000:00:14.0/usb1/1-2/1-2:1.0/video4linux/video0
DEVNAME=/dev/video0
SUBSYSTEM=video4linux
ID_V4L_PRODUCT=HD Pro Webcam C920
ID_VENDOR_ID=046d
ID_MODEL_ID=082d
ID_SERIAL=046d_HD_Pro_Webcam_C920_1A2B3C4D
DEVLINKS=/dev/v4l/by-path/pci-0000:00:14.0-usb-0:2:1.0-video-index0 /dev/v4l/by-id/usb-046d_HD_Pro_Webcam_C920_1A2B3C4D-video-index0
";

    #[test]
    fn test_parse_udev_properties() {
        let identity = parse_udev_properties(C920).unwrap();
        assert_eq!(identity.vendor_id.as_deref(), Some("046d"));
        assert_eq!(identity.product_id.as_deref(), Some("082d"));
        assert_eq!(
            identity.descriptor.as_deref(),
            Some("046d_HD_Pro_Webcam_C920_1A2B3C4D")
        );
    }

    #[test]
    fn test_parse_udev_falls_back_to_by_id_link() {
        let output = "E: ID_VENDOR_ID=2b03\nE: DEVLINKS=/dev/v4l/by-path/platform-video-index0 /dev/v4l/by-id/usb-Stereolabs_ZED_2i-video-index0\n";
        let identity = parse_udev_properties(output).unwrap();
        assert_eq!(identity.vendor_id.as_deref(), Some("2b03"));
        assert!(identity.product_id.is_none());
        assert_eq!(
            identity.descriptor.as_deref(),
            Some("/dev/v4l/by-id/usb-Stereolabs_ZED_2i-video-index0")
        );
    }

    #[test]
    fn test_parse_udev_without_identity() {
        let output = "DEVNAME=/dev/video9\nSUBSYSTEM=video4linux\nID_VENDOR_ID=\n";
        assert!(parse_udev_properties(output).is_none());
    }

    #[test]
    fn test_udev_pattern_is_shared_across_calls() {
        assert!(UDEV_PROPERTY.is_ok());
        for _ in 0..3 {
            let identity = parse_udev_properties(C920).unwrap();
            assert_eq!(identity.product_id.as_deref(), Some("082d"));
        }
    }

    #[test]
    fn test_device_path() {
        assert_eq!(device_path(0), "/dev/video0");
        assert_eq!(device_path(9), "/dev/video9");
    }
}
