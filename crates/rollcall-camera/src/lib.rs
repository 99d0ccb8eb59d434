//! rollcall-camera — V4L2 camera access for the desktop attendance loop.
//!
//! Negotiates MJPG (decoded via the `image` crate) or YUYV (converted in
//! software) and hands the pipeline plain RGB frames.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError};
pub use frame::yuyv_to_rgb;

use image::RgbImage;

/// Anything that can produce a stream of RGB frames.
///
/// The desktop loop is written against this trait so tests can script frame
/// sequences without hardware.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<RgbImage, CameraError>;
}

impl FrameSource for Camera {
    fn next_frame(&mut self) -> Result<RgbImage, CameraError> {
        self.capture()
    }
}
