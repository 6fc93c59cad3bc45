//! Downsampled RGB previews
//!
//! Each band is read already averaged down to the preview size, stretched
//! between its 2nd and 98th percentiles and interleaved into 8-bit RGB.
//! Previews are best effort: any failure yields `None` and a warning.

use std::io::Cursor;
use std::path::Path;

use geoscout_algorithms::stretch::{display_percentile_range, stretch_u8};
use geoscout_core::{RasterHandle, Window};
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CogError, Result};

/// Which source bands (1-based) feed the red, green and blue channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandMapping(pub [usize; 3]);

impl BandMapping {
    /// First three bands, or the first band replicated for 1-2 band sources.
    pub fn default_for(band_count: usize) -> Self {
        if band_count >= 3 {
            BandMapping([1, 2, 3])
        } else {
            BandMapping([1, 1, 1])
        }
    }
}

/// Preview size limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewOptions {
    pub max_width: usize,
    pub max_height: usize,
    /// Allow the preview to exceed the source size
    pub allow_upscale: bool,
}

impl PreviewOptions {
    /// Small thumbnail bounded to 400x400.
    pub fn thumbnail() -> Self {
        Self {
            max_width: 400,
            max_height: 400,
            allow_upscale: true,
        }
    }

    /// Map overlay bounded to 2048x2048, never larger than the source.
    pub fn overlay() -> Self {
        Self {
            max_width: 2048,
            max_height: 2048,
            allow_upscale: false,
        }
    }

    /// Largest size with the source aspect ratio that fits the limits.
    pub fn target_size(&self, width: usize, height: usize) -> (usize, usize) {
        if width == 0 || height == 0 {
            return (0, 0);
        }
        let mut scale = (self.max_width as f64 / width as f64).min(self.max_height as f64 / height as f64);
        if !self.allow_upscale {
            scale = scale.min(1.0);
        }
        // tolerate rounding in the ratio so exact fits are not shaved by one
        let w = ((width as f64 * scale + 1e-6).floor() as usize).max(1);
        let h = ((height as f64 * scale + 1e-6).floor() as usize).max(1);
        (w, h)
    }
}

impl Default for PreviewOptions {
    fn default() -> Self {
        Self::thumbnail()
    }
}

/// Interleaved 8-bit RGB preview.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewImage {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u8>,
}

impl PreviewImage {
    pub fn to_rgb_image(&self) -> Result<RgbImage> {
        RgbImage::from_raw(self.width as u32, self.height as u32, self.pixels.clone()).ok_or_else(|| {
            CogError::InvalidOption {
                name: "pixels",
                reason: format!("buffer does not match {}x{} RGB", self.width, self.height),
            }
        })
    }

    /// Encode as baseline JPEG.
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        let img = self.to_rgb_image()?;
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100)).encode_image(&img)?;
        Ok(out)
    }

    /// Encode as PNG.
    pub fn encode_png(&self) -> Result<Vec<u8>> {
        let img = self.to_rgb_image()?;
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png)?;
        Ok(out.into_inner())
    }

    /// Encode by the extension of `path` (`.jpg`/`.jpeg` or `.png`) and write it.
    pub fn save(&self, path: impl AsRef<Path>, jpeg_quality: u8) -> Result<()> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        let bytes = match ext.as_str() {
            "jpg" | "jpeg" => self.encode_jpeg(jpeg_quality)?,
            "png" => self.encode_png()?,
            other => {
                return Err(CogError::InvalidOption {
                    name: "format",
                    reason: format!("unsupported preview extension '{}'", other),
                })
            }
        };
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

/// Build a preview of `handle`, or `None` if it cannot be produced.
pub fn build_preview(handle: &RasterHandle, options: &PreviewOptions, bands: Option<BandMapping>) -> Option<PreviewImage> {
    match try_build_preview(handle, options, bands) {
        Ok(image) => Some(image),
        Err(e) => {
            warn!(path = %handle.path().display(), error = %e, "preview not created");
            None
        }
    }
}

fn try_build_preview(handle: &RasterHandle, options: &PreviewOptions, bands: Option<BandMapping>) -> Result<PreviewImage> {
    let mapping = bands.unwrap_or_else(|| BandMapping::default_for(handle.band_count()));
    if let Some(&bad) = mapping.0.iter().find(|&&b| b == 0 || b > handle.band_count()) {
        return Err(CogError::InvalidOption {
            name: "bands",
            reason: format!("band {} not in 1..={}", bad, handle.band_count()),
        });
    }

    let (width, height) = options.target_size(handle.width(), handle.height());
    let full = Window::full(handle.width(), handle.height());
    let mut channels = Vec::with_capacity(3);
    for (i, &band) in mapping.0.iter().enumerate() {
        // replicated bands are read and stretched once
        if let Some(j) = mapping.0[..i].iter().position(|&b| b == band) {
            let copy = channels
                .get(j)
                .cloned()
                .ok_or_else(|| geoscout_core::Error::Other("missing channel".into()))?;
            channels.push(copy);
            continue;
        }
        let data = handle.read_window_resampled(&full, band, width, height)?.into_array();
        let range = display_percentile_range(data.iter().copied(), 2.0, 98.0)
            .ok_or_else(|| geoscout_core::Error::Algorithm(format!("band {} has no finite samples", band)))?;
        channels.push(stretch_u8(&data, &range)?);
    }

    let mut pixels = Vec::with_capacity(width * height * 3);
    for r in 0..height {
        for c in 0..width {
            for ch in &channels {
                pixels.push(ch[(r, c)]);
            }
        }
    }
    debug!(width, height, bands = ?mapping.0, "preview built");
    Ok(PreviewImage { width, height, pixels })
}
