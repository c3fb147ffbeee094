//! Request validation for scene generation.
//!
//! Scene images are 360° equirectangular panoramas, so only 2:1 sizes from a
//! fixed allow-list are accepted.

use crate::config::SceneImageConfig;
use crate::error::SceneImageError;

pub const VALID_SIZES: &[&str] = &["1024x512", "2048x1024", "4096x2048"];

/// Largest allow-listed size; inline payloads are never requested for it.
pub const LARGE_SIZE: &str = "4096x2048";
const LARGE_WIDTH_MARKER: &str = "4096";

const TARGET_RATIO: f64 = 2.0;
const RATIO_TOLERANCE: f64 = 0.01;

/// Checks the fragment and returns it trimmed.
pub fn validate_text<'a>(
    text: &'a str,
    config: &SceneImageConfig,
) -> Result<&'a str, SceneImageError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(SceneImageError::invalid_argument("text blank"));
    }
    let length = trimmed.chars().count();
    if length < config.min_text_length {
        return Err(SceneImageError::invalid_argument(format!(
            "text must be at least {} characters long (got {length})",
            config.min_text_length
        )));
    }
    if length > config.max_text_length {
        return Err(SceneImageError::invalid_argument(format!(
            "text must not exceed {} characters (got {length})",
            config.max_text_length
        )));
    }
    Ok(trimmed)
}

pub fn validate_size(size: &str) -> Result<(), SceneImageError> {
    if !VALID_SIZES.contains(&size) {
        return Err(SceneImageError::invalid_size(format!(
            "unsupported size {size}; supported sizes for 360° images: {}",
            VALID_SIZES.join(", ")
        )));
    }
    if !has_panoramic_ratio(size) {
        return Err(SceneImageError::invalid_size(format!(
            "size {size} must have a 2:1 aspect ratio for equirectangular images"
        )));
    }
    Ok(())
}

pub fn parse_size(size: &str) -> Option<(u32, u32)> {
    let (width, height) = size.split_once('x')?;
    let width = width.parse::<u32>().ok()?;
    let height = height.parse::<u32>().ok()?;
    Some((width, height))
}

fn has_panoramic_ratio(size: &str) -> bool {
    match parse_size(size) {
        Some((width, height)) if height > 0 => {
            let ratio = f64::from(width) / f64::from(height);
            (ratio - TARGET_RATIO).abs() < RATIO_TOLERANCE
        }
        _ => false,
    }
}

pub fn is_large_size(size: &str) -> bool {
    size == LARGE_SIZE || size.contains(LARGE_WIDTH_MARKER)
}
