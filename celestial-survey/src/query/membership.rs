//! Disc and pixel membership for individual objects.
//!
//! [`fast_disc_membership`] avoids an exact distance for most objects by
//! first classifying their pixels. It returns exactly what a brute-force
//! `distance < radius` test returns, provided every object's pixel id is
//! the pixel containing its position.

use super::Positions;
use crate::error::{Result, SurveyError};
use crate::grid::sphere::SkyPoint;
use crate::grid::PixelGrid;
use crate::table::{Column, Table};

/// Inner disc radius, as a fraction of the query radius, inside which whole
/// pixels are accepted without a distance test.
const INNER_DISC_FRACTION: f64 = 0.8;

/// Pixels coarser than this fraction of the radius take the coarse path.
const COARSE_PIXEL_FRACTION: f64 = 0.1;

fn check_lengths(ra: &[f64], dec: &[f64], pixels: &[u64]) -> Result<()> {
    if ra.len() != dec.len() || ra.len() != pixels.len() {
        return Err(SurveyError::integrity(format!(
            "membership inputs differ in length: {} ra, {} dec, {} pixels",
            ra.len(),
            dec.len(),
            pixels.len()
        )));
    }
    Ok(())
}

/// For each object, whether it lies strictly within `radius_deg` of the
/// centre.
///
/// With pixels coarser than a tenth of the radius, only objects in a pixel
/// of the inclusive disc get an exact distance. With finer pixels, objects in
/// the non-inclusive disc of `0.8 × radius` are accepted outright and only
/// the shell between it and the inclusive outer disc is measured.
pub fn fast_disc_membership(
    ra_deg: &[f64],
    dec_deg: &[f64],
    pixels: &[u64],
    grid: &PixelGrid,
    ra_centre: f64,
    dec_centre: f64,
    radius_deg: f64,
) -> Result<Vec<bool>> {
    check_lengths(ra_deg, dec_deg, pixels)?;
    let centre = SkyPoint::new(ra_centre, dec_centre);
    let inside = |i: usize| centre.distance_deg(ra_deg[i], dec_deg[i]) < radius_deg;
    let outer = grid.disc_pixels(ra_centre, dec_centre, radius_deg, true);

    if grid.pixel_size_deg() > COARSE_PIXEL_FRACTION * radius_deg {
        return Ok(pixels
            .iter()
            .enumerate()
            .map(|(i, p)| outer.binary_search(p).is_ok() && inside(i))
            .collect());
    }

    let inner = grid.disc_pixels(
        ra_centre,
        dec_centre,
        INNER_DISC_FRACTION * radius_deg,
        false,
    );
    Ok(pixels
        .iter()
        .enumerate()
        .map(|(i, p)| {
            if inner.binary_search(p).is_ok() {
                true
            } else {
                outer.binary_search(p).is_ok() && inside(i)
            }
        })
        .collect())
}

/// Whether each pixel's centre lies within `radius_deg`.
pub fn strict_disc_membership(
    pixels: &[u64],
    grid: &PixelGrid,
    ra_centre: f64,
    dec_centre: f64,
    radius_deg: f64,
) -> Vec<bool> {
    let disc = grid.disc_pixels(ra_centre, dec_centre, radius_deg, false);
    pixels
        .iter()
        .map(|p| disc.binary_search(p).is_ok())
        .collect()
}

/// Rows whose position falls in pixel `hpix` of `grid`.
pub fn rows_in_pixel(
    table: &Table,
    positions: &Positions<'_>,
    grid: &PixelGrid,
    hpix: u64,
) -> Result<Table> {
    let (ra, dec) = positions.resolve(table)?;
    let mask: Vec<bool> = ra
        .iter()
        .zip(&dec)
        .map(|(&r, &d)| grid.ang2pix(r, d) == hpix)
        .collect();
    table.filter(&mask)
}

/// Rows within `radius_deg` of `(ra, dec)`, boundary included.
pub fn rows_in_disc(
    table: &Table,
    positions: &Positions<'_>,
    ra_centre: f64,
    dec_centre: f64,
    radius_deg: f64,
) -> Result<Table> {
    let (ra, dec) = positions.resolve(table)?;
    let centre = SkyPoint::new(ra_centre, dec_centre);
    let mask: Vec<bool> = ra
        .iter()
        .zip(&dec)
        .map(|(&r, &d)| centre.distance_deg(r, d) <= radius_deg)
        .collect();
    table.filter(&mask)
}

/// Copy of `table` with an integer column `key` holding each row's pixel.
pub fn tag_pixels(
    table: &Table,
    positions: &Positions<'_>,
    grid: &PixelGrid,
    key: &str,
) -> Result<Table> {
    let (ra, dec) = positions.resolve(table)?;
    let pixels = grid.angles_to_pixels(&ra, &dec)?;
    let mut tagged = table.clone();
    tagged.push_column(key, Column::Int(pixels.into_iter().map(|p| p as i64).collect()))?;
    Ok(tagged)
}
