//! Stitching slices into one surface under a hard height cap

use crate::capture::{CapturedPage, Slice};
use crate::{Error, Result};
use image::{imageops, RgbaImage};
use log::{debug, info};

/// Tagged stitch result: the capped surface plus the slices that did not fit
#[derive(Debug, Clone)]
pub struct Stitched {
    pub surface: RgbaImage,
    /// Slices entirely below the cap, untouched and in original order
    pub residual: Vec<Slice>,
    /// Device pixels per CSS pixel
    pub pixel_ratio: f64,
}

impl Stitched {
    /// Height of the surface plus every residual slice
    pub fn composite_height(&self) -> u64 {
        u64::from(self.surface.height()) + self.residual.iter().map(|s| u64::from(s.height())).sum::<u64>()
    }
}

/// Stitch a captured page
pub fn stitch_page(page: CapturedPage, max_surface_height: u32) -> Result<Stitched> {
    stitch(page.slices, page.width, page.height, max_surface_height)
}

/// Concatenate `slices` top to bottom.
///
/// `logical_width` and `total_height_hint` are in CSS pixels; the pixel ratio
/// is the first slice's pixel width over `logical_width`. When the scaled
/// height exceeds `max_surface_height` the surface is capped: the slice
/// straddling the cap loses its top rows so that its bottom edge lands on the
/// surface's bottom edge, and slices starting at or below the cap are
/// returned as residual.
pub fn stitch(
    slices: Vec<Slice>,
    logical_width: u32,
    total_height_hint: u32,
    max_surface_height: u32,
) -> Result<Stitched> {
    let first = slices
        .first()
        .ok_or_else(|| Error::Capture("no slices to stitch".into()))?;
    let width = first.width();
    let pixel_ratio = if logical_width > 0 {
        f64::from(width) / f64::from(logical_width)
    } else {
        1.0
    };

    let full_height = (f64::from(total_height_hint) * pixel_ratio).round() as u64;
    let capped = full_height > u64::from(max_surface_height);
    let height = full_height.min(u64::from(max_surface_height)) as u32;
    if width == 0 || height == 0 {
        return Err(Error::Capture(format!("cannot stitch a {}x{} surface", width, height)));
    }

    let mut surface = RgbaImage::new(width, height);
    let mut residual = Vec::new();

    for slice in slices {
        let y = (f64::from(slice.vertical_offset) * pixel_ratio).round() as u64;
        if y >= u64::from(height) {
            residual.push(slice);
            continue;
        }
        let y = y as u32;
        let remaining = height - y;

        if capped && slice.height() > remaining {
            let skipped = slice.height() - remaining;
            debug!("cropping {} rows off the top of slice at y={} to fit the cap", skipped, y);
            let bottom = imageops::crop_imm(&slice.image, 0, skipped, slice.width(), remaining);
            imageops::replace(&mut surface, &bottom.to_image(), 0, i64::from(y));
        } else {
            imageops::replace(&mut surface, &slice.image, 0, i64::from(y));
        }
    }

    info!(
        "stitched {}x{} surface (ratio {:.2}, {} residual slices)",
        width,
        height,
        pixel_ratio,
        residual.len()
    );

    Ok(Stitched {
        surface,
        residual,
        pixel_ratio,
    })
}
