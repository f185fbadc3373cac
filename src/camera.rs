// thin wrapper around openpnp_capture
use std::ffi::CStr;

use image::{DynamicImage, ImageBuffer};
use openpnp_sys::{CapContext, CapFormatInfo, CapStream};

use openpnp_capture_sys as openpnp_sys;

use crate::config::CameraConfig;
use crate::error::{Error, Result};

/// A video frame together with the presentation timestamp it was delivered at.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: DynamicImage,
    pub timestamp: u64,
}

/// Anything that delivers video frames to the inference driver.
pub trait FrameSource {
    /// Timestamp of the newest frame available. Unchanged while no new frame arrived.
    fn timestamp(&mut self) -> Result<u64>;

    /// Copies out the newest frame.
    fn grab(&mut self) -> Result<Frame>;
}

pub struct Camera {
    ctx: CapContext,
    stream: CapStream,
    width: u32,
    height: u32,
    buffer: Vec<u8>,
}

impl Camera {
    /// Opens the configured device with the format closest to the requested resolution.
    pub fn open(config: &CameraConfig) -> Result<Camera> {
        let ctx = unsafe { openpnp_sys::Cap_createContext() };
        if ctx.is_null() {
            return Err(Error::Camera("failed to create capture context".into()));
        }

        let devices = device_names(ctx);
        log::info!("There are {} available cameras: {:?}", devices.len(), devices);

        if config.device as usize >= devices.len() {
            unsafe { openpnp_sys::Cap_releaseContext(ctx) };
            return Err(Error::Camera(format!(
                "camera {} not found ({} available)",
                config.device,
                devices.len()
            )));
        }

        let (format_id, format) = match pick_format(ctx, config) {
            Some(found) => found,
            None => {
                unsafe { openpnp_sys::Cap_releaseContext(ctx) };
                return Err(Error::Camera(format!(
                    "camera {} reports no capture formats",
                    config.device
                )));
            }
        };

        if (format.width, format.height) != (config.width, config.height) {
            log::warn!(
                "camera does not offer {}x{}, using {}x{}",
                config.width,
                config.height,
                format.width,
                format.height
            );
        }

        log::info!(
            "Opening camera {} with format {}x{} @ {} fps",
            config.device,
            format.width,
            format.height,
            format.fps
        );

        let stream = unsafe { openpnp_sys::Cap_openStream(ctx, config.device, format_id) };
        if stream < 0 {
            unsafe { openpnp_sys::Cap_releaseContext(ctx) };
            return Err(Error::Camera(format!("failed to open stream on camera {}", config.device)));
        }

        Ok(Camera {
            ctx,
            stream,
            width: format.width,
            height: format.height,
            buffer: vec![0u8; (format.width * format.height * 3) as usize],
        })
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl FrameSource for Camera {
    fn timestamp(&mut self) -> Result<u64> {
        let count = unsafe { openpnp_sys::Cap_getStreamFrameCount(self.ctx, self.stream) };
        Ok(count as u64)
    }

    fn grab(&mut self) -> Result<Frame> {
        let res = unsafe {
            openpnp_sys::Cap_captureFrame(
                self.ctx,
                self.stream,
                self.buffer.as_mut_ptr() as *mut _,
                self.buffer.len() as u32,
            )
        };
        if res != openpnp_sys::CAPRESULT_OK {
            return Err(Error::Camera(format!("capture failed with result {}", res)));
        }
        // counter of the frame just copied out
        let timestamp = self.timestamp()?;

        let image_buffer = ImageBuffer::from_vec(self.width, self.height, self.buffer.clone())
            .ok_or_else(|| Error::Camera("frame buffer does not match resolution".into()))?;

        Ok(Frame {
            image: DynamicImage::ImageRgb8(image_buffer),
            timestamp,
        })
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        unsafe {
            openpnp_sys::Cap_closeStream(self.ctx, self.stream);
            openpnp_sys::Cap_releaseContext(self.ctx);
        }
    }
}

fn device_names(ctx: CapContext) -> Vec<String> {
    let count = unsafe { openpnp_sys::Cap_getDeviceCount(ctx) };
    (0..count)
        .map(|i| {
            let name = unsafe { openpnp_sys::Cap_getDeviceName(ctx, i) };
            if name.is_null() {
                format!("camera {}", i)
            } else {
                unsafe { CStr::from_ptr(name) }.to_string_lossy().into_owned()
            }
        })
        .collect()
}

fn read_formats(ctx: CapContext, device: u32) -> Vec<(u32, CapFormatInfo)> {
    let count = unsafe { openpnp_sys::Cap_getNumFormats(ctx, device) };
    (0..count.max(0) as u32)
        .filter_map(|id| {
            let mut info: CapFormatInfo = unsafe { std::mem::zeroed() };
            let res = unsafe { openpnp_sys::Cap_getFormatInfo(ctx, device, id, &mut info) };
            (res == openpnp_sys::CAPRESULT_OK).then_some((id, info))
        })
        .collect()
}

fn pick_format(ctx: CapContext, config: &CameraConfig) -> Option<(u32, CapFormatInfo)> {
    let formats = read_formats(ctx, config.device);
    let candidates: Vec<FormatCandidate> = formats
        .iter()
        .map(|(id, info)| FormatCandidate {
            id: *id,
            width: info.width,
            height: info.height,
            fps: info.fps,
        })
        .collect();
    let chosen = choose_format(&candidates, config.width, config.height)?;
    formats.into_iter().find(|(id, _)| *id == chosen)
}

#[derive(Debug, Clone, Copy)]
struct FormatCandidate {
    id: u32,
    width: u32,
    height: u32,
    fps: u32,
}

// exact resolution at the highest frame rate, otherwise the closest pixel count
fn choose_format(candidates: &[FormatCandidate], width: u32, height: u32) -> Option<u32> {
    let exact = candidates
        .iter()
        .filter(|c| c.width == width && c.height == height)
        .max_by_key(|c| c.fps);
    if let Some(c) = exact {
        return Some(c.id);
    }

    let wanted = width as i64 * height as i64;
    candidates
        .iter()
        .min_by_key(|c| ((c.width as i64 * c.height as i64) - wanted).abs())
        .map(|c| c.id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: u32, width: u32, height: u32, fps: u32) -> FormatCandidate {
        FormatCandidate { id, width, height, fps }
    }

    #[test]
    fn prefers_exact_resolution_with_highest_fps() {
        let formats = [
            candidate(0, 640, 480, 30),
            candidate(1, 1280, 720, 15),
            candidate(2, 1280, 720, 30),
            candidate(3, 1920, 1080, 60),
        ];
        assert_eq!(choose_format(&formats, 1280, 720), Some(2));
    }

    #[test]
    fn falls_back_to_closest_pixel_count() {
        let formats = [candidate(0, 640, 480, 30), candidate(1, 1920, 1080, 30)];
        assert_eq!(choose_format(&formats, 1280, 720), Some(0));
        assert_eq!(choose_format(&[], 1280, 720), None);
    }
}
