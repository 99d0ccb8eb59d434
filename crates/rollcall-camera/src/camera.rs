//! V4L2 camera capture via the `v4l` crate.

use std::path::Path;

use image::RgbImage;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

use crate::frame;

const CAPTURE_WIDTH: u32 = 640;
const CAPTURE_HEIGHT: u32 = 480;
const STREAM_BUFFERS: u32 = 4;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("streaming not supported")]
    StreamingNotSupported,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
}

/// Negotiated capture format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaptureFormat {
    /// Motion-JPEG; each buffer is a JPEG image.
    Mjpg,
    /// Packed YUYV 4:2:2.
    Yuyv,
}

/// V4L2 camera device handle.
pub struct Camera {
    device: Device,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    format: CaptureFormat,
}

impl Camera {
    /// Open a camera by path (e.g. "/dev/video0"), preferring MJPG.
    pub fn open(device_path: &str) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| {
            if e.to_string().contains("busy") || e.to_string().contains("EBUSY") {
                CameraError::DeviceBusy
            } else {
                CameraError::DeviceNotFound(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device
            .query_caps()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to query capabilities: {e}")))?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported);
        }

        let mut fmt = device.format().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;
        fmt.width = CAPTURE_WIDTH;
        fmt.height = CAPTURE_HEIGHT;

        // Try MJPG first (cheap to ship off-device), fall back to YUYV.
        let mut negotiated = None;
        for (fourcc, format) in [
            (FourCC::new(b"MJPG"), CaptureFormat::Mjpg),
            (FourCC::new(b"YUYV"), CaptureFormat::Yuyv),
        ] {
            fmt.fourcc = fourcc;
            let got = device.set_format(&fmt).map_err(|e| {
                CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
            })?;
            if got.fourcc == fourcc {
                negotiated = Some((got, format));
                break;
            }
        }

        let Some((got, format)) = negotiated else {
            return Err(CameraError::FormatNegotiationFailed(
                "device offers neither MJPG nor YUYV".to_string(),
            ));
        };

        tracing::info!(
            device = device_path,
            card = %caps.card,
            width = got.width,
            height = got.height,
            fourcc = ?got.fourcc,
            "camera opened"
        );

        Ok(Self {
            device,
            width: got.width,
            height: got.height,
            device_path: device_path.to_string(),
            format,
        })
    }

    /// Capture a single frame as RGB.
    pub fn capture(&self) -> Result<RgbImage, CameraError> {
        let mut stream = MmapStream::with_buffers(&self.device, BufType::VideoCapture, STREAM_BUFFERS)
            .map_err(|e| CameraError::CaptureFailed(format!("failed to create mmap stream: {e}")))?;

        let (buf, _meta) = stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;

        match self.format {
            CaptureFormat::Mjpg => {
                let decoded =
                    image::load_from_memory_with_format(buf, image::ImageFormat::Jpeg)
                        .map_err(|e| {
                            CameraError::CaptureFailed(format!("MJPG decode failed: {e}"))
                        })?;
                Ok(decoded.to_rgb8())
            }
            CaptureFormat::Yuyv => frame::yuyv_to_rgb(buf, self.width, self.height)
                .map_err(|e| CameraError::CaptureFailed(format!("YUYV conversion failed: {e}"))),
        }
    }
}
