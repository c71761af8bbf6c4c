//! Screen capture and audio control.

use base64::{Engine, engine::general_purpose::STANDARD};
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};
use serde_json::json;
use tracing::debug;
use xcap::Monitor;

use super::{OPERATIONS_TARGET, unavailable};
use crate::operation::{OperationError, ParamLookup, ParamMap, ResultMap, into_result};
use crate::registry::OperationRegistry;

const AUDIO: &str = "audio control";
const SCREEN: &str = "screen capture";

pub(super) fn register(registry: &mut OperationRegistry) {
    registry.register("screenshot", |_: ParamMap| screenshot());
    registry.register("get_volume", unavailable(AUDIO));
    registry.register("set_volume", set_volume);
}

/// Captures the primary display as a base64 PNG.
fn screenshot() -> Result<ResultMap, OperationError> {
    let capture = primary_monitor()
        .and_then(|monitor| monitor.capture_image())
        .map_err(|error| {
            debug!(target: OPERATIONS_TARGET, %error, "screen capture failed");
            OperationError::unavailable(SCREEN)
        })?;
    let (width, height) = (capture.width(), capture.height());
    let image = encode_png(capture.as_raw(), width, height)?;
    Ok(into_result(json!({
        "image": image,
        "width": width,
        "height": height,
        "format": "png",
    })))
}

/// The primary display is the one containing the desktop origin.
fn primary_monitor() -> xcap::XCapResult<Monitor> {
    Monitor::from_point(0, 0).or_else(|error| {
        Monitor::all()?.into_iter().next().ok_or(error)
    })
}

/// Encodes RGBA pixels as PNG and wraps them in standard base64.
fn encode_png(rgba: &[u8], width: u32, height: u32) -> Result<String, OperationError> {
    let expected = u64::from(width) * u64::from(height) * 4;
    if u64::try_from(rgba.len()).ok() != Some(expected) {
        return Err(OperationError::failed(format!(
            "screenshot holds {} bytes, expected {expected} for {width}x{height}",
            rgba.len()
        )));
    }
    let mut png = Vec::new();
    PngEncoder::new(&mut png)
        .write_image(rgba, width, height, ExtendedColorType::Rgba8)
        .map_err(|error| OperationError::failed(format!("failed to encode screenshot: {error}")))?;
    Ok(STANDARD.encode(png))
}

/// Validated `set_volume` request. Either field may be omitted.
#[derive(Debug, Clone, Copy, PartialEq)]
struct VolumeRequest {
    level: Option<f64>,
    muted: Option<bool>,
}

impl VolumeRequest {
    /// Levels outside 0..=100 are clamped.
    fn from_params(params: &ParamMap) -> Result<Self, OperationError> {
        Ok(Self {
            level: params
                .optional_f64("level")?
                .map(|level| level.clamp(0.0, 100.0)),
            muted: params.optional_bool("muted")?,
        })
    }
}

fn set_volume(params: ParamMap) -> Result<ResultMap, OperationError> {
    let request = VolumeRequest::from_params(&params)?;
    debug!(
        target: OPERATIONS_TARGET,
        level = ?request.level,
        muted = ?request.muted,
        "volume change requested without an audio backend"
    );
    Err(OperationError::unavailable(AUDIO))
}
