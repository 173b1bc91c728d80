//! Greyscale frame to metadata objects.
//!
//! Backends without a platform metadata output (the still-frame camera, for
//! one) run this on their capture thread to produce what a native metadata
//! output would report: one [`MetadataObject`] per located symbol, searched
//! only inside the rect of interest.

use image::GrayImage;
use rqrr::PreparedImage;

use crate::models::{MachineReadableCode, MetadataObject, Symbology};
use crate::services::region::Rect;

#[derive(Debug, Clone, Copy, Default)]
pub struct QrDetector;

impl QrDetector {
    pub fn new() -> Self {
        Self
    }

    /// Locate and decode QR symbols inside `rect_of_interest` (normalized).
    ///
    /// Located symbols whose payload cannot be decoded are reported with no
    /// string value.
    pub fn detect(&self, frame: &GrayImage, rect_of_interest: &Rect) -> Vec<MetadataObject> {
        let (width, height) = frame.dimensions();
        let (x0, y0, w, h) = rect_of_interest.clamped_to(&Rect::unit()).to_pixels(width, height);
        if w == 0 || h == 0 {
            return Vec::new();
        }

        let mut prepared = PreparedImage::prepare_from_greyscale(w as usize, h as usize, |x, y| {
            frame.get_pixel(x0 + x as u32, y0 + y as u32)[0]
        });
        let grids = prepared.detect_grids();
        tracing::trace!("Found {} candidate grids in {}x{} window", grids.len(), w, h);

        grids
            .iter()
            .map(|grid| {
                let bounds = normalized_bounds(&grid.bounds, (x0, y0), (width, height));
                let string_value = match grid.decode() {
                    Ok((_, content)) => Some(content),
                    Err(e) => {
                        tracing::debug!("Located QR grid could not be decoded: {:?}", e);
                        None
                    }
                };
                MetadataObject::MachineReadableCode(MachineReadableCode {
                    symbology: Symbology::Qr,
                    string_value,
                    bounds: Some(bounds),
                })
            })
            .collect()
    }
}

/// Bounding box of a grid's corners, in normalized full-frame coordinates.
fn normalized_bounds(corners: &[rqrr::Point; 4], offset: (u32, u32), frame: (u32, u32)) -> Rect {
    let xs = corners.iter().map(|p| f64::from(p.x));
    let ys = corners.iter().map(|p| f64::from(p.y));
    let min_x = xs.clone().fold(f64::INFINITY, f64::min);
    let max_x = xs.fold(f64::NEG_INFINITY, f64::max);
    let min_y = ys.clone().fold(f64::INFINITY, f64::min);
    let max_y = ys.fold(f64::NEG_INFINITY, f64::max);

    let (fw, fh) = (f64::from(frame.0.max(1)), f64::from(frame.1.max(1)));
    let (ox, oy) = (f64::from(offset.0), f64::from(offset.1));
    Rect::new(
        (min_x + ox) / fw,
        (min_y + oy) / fh,
        (max_x - min_x) / fw,
        (max_y - min_y) / fh,
    )
    .clamped_to(&Rect::unit())
}
