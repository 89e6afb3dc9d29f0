//! Pairwise tile alignment: a physical-coordinate-prior-driven search window
//! inside the template tile, matched by normalized cross-correlation against
//! the full second tile. Grounded on `spm_stitching.hpp`'s
//! `calcImageOffsetInfo` and `spm_algorithm.hpp`'s `calcMatchTemplate`.

use crate::error::{Error, Result};
use crate::math::Vec2;
use crate::tile::Tile;

/// Linearly rescales `real` to 8-bit greyscale over its own min/max, the way
/// `cv::normalize(..., NORM_MINMAX, CV_8U)` does before template matching.
fn normalize_to_grey(real: &[Vec<f64>]) -> Vec<Vec<u8>> {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;

    for row in real {
        for &value in row {
            if value < min { min = value; }
            if value > max { max = value; }
        }
    }

    let range = max - min;

    real.iter()
        .map(|row| row.iter().map(|&value| {
            if range == 0.0 { 0 }
            else { (((value - min) / range) * 255.0).round() as u8 }
        }).collect())
        .collect()
}

/// A pixel-space rectangle: inclusive start, exclusive end.
#[derive(Debug, Clone, Copy)]
struct Window {
    x_start: i64,
    width: i64,
    y_start: i64,
    height: i64,
}

/// Computes the search window to crop out of `tile_t`, sized against
/// `tile_o`'s dimensions and scan size (matching the original's own choice
/// of which tile's geometry drives the window, even though in practice both
/// tiles in a mosaic share the same sensor geometry).
fn search_window(tile_o: &Tile, x_diff: f64, y_diff: f64) -> Window {
    let cols = tile_o.cols() as f64;
    let rows = tile_o.rows() as f64;
    let scan_size = tile_o.head.scan_size_nm as f64;

    let (x_start, width) = if x_diff >= 0.0 {
        let x_start = 0.1 * cols;
        let width = (1.0 - x_diff / scan_size - 0.2) * cols;
        (x_start, width)
    } else {
        let x_start = (-x_diff / scan_size + 0.1) * cols;
        let width = cols - x_start - 0.1 * cols;
        (x_start, width)
    };

    let (y_start, height) = if y_diff >= 0.0 {
        let y_start = (y_diff / scan_size + 0.1) * rows;
        let height = rows - y_start - 0.1 * rows;
        (y_start, height)
    } else {
        let y_start = 0.1 * rows;
        let height = (1.0 + y_diff / scan_size - 0.2) * rows;
        (y_start, height)
    };

    Window {
        x_start: x_start.trunc() as i64,
        width: width.trunc() as i64,
        y_start: y_start.trunc() as i64,
        height: height.trunc() as i64,
    }
}

fn crop(image: &[Vec<u8>], window: Window) -> Result<Vec<Vec<u8>>> {
    if window.width <= 0 || window.height <= 0 {
        return Err(Error::alignment_input("search window collapsed to an empty rectangle"));
    }

    let (x0, y0, w, h) = (window.x_start as usize, window.y_start as usize, window.width as usize, window.height as usize);

    if image.is_empty() || y0 + h > image.len() || x0 + w > image[0].len() {
        return Err(Error::alignment_input("search window extends outside the tile"));
    }

    Ok(image[y0 .. y0 + h].iter()
        .map(|row| row[x0 .. x0 + w].to_vec())
        .collect())
}

/// `TM_CCOEFF_NORMED`-style normalized cross-correlation template match of
/// `template` against every window of `search` it fits in. Returns the
/// top-left coordinate of the best-scoring window.
fn match_template(template: &[Vec<u8>], search: &[Vec<u8>]) -> Result<Vec2<i64>> {
    if template.is_empty() || template[0].is_empty() {
        return Err(Error::alignment_input("template is empty"));
    }
    if search.is_empty() || search[0].is_empty() {
        return Err(Error::alignment_input("search image is empty"));
    }

    let (th, tw) = (template.len(), template[0].len());
    let (sh, sw) = (search.len(), search[0].len());

    if th > sh || tw > sw {
        return Err(Error::alignment_input("template is larger than the search image"));
    }

    let template_mean: f64 = template.iter().flatten().map(|&v| v as f64).sum::<f64>() / (th * tw) as f64;
    let template_centered: Vec<Vec<f64>> = template.iter()
        .map(|row| row.iter().map(|&v| v as f64 - template_mean).collect())
        .collect();
    let template_energy: f64 = template_centered.iter().flatten().map(|&v| v * v).sum();

    let mut best_score = f64::NEG_INFINITY;
    let mut best = Vec2(0_i64, 0_i64);

    for y in 0 ..= (sh - th) {
        for x in 0 ..= (sw - tw) {
            let window_mean: f64 = (0 .. th)
                .flat_map(|i| (0 .. tw).map(move |j| (i, j)))
                .map(|(i, j)| search[y + i][x + j] as f64)
                .sum::<f64>() / (th * tw) as f64;

            let mut num = 0.0;
            let mut window_energy = 0.0;

            for i in 0 .. th {
                for j in 0 .. tw {
                    let window_centered = search[y + i][x + j] as f64 - window_mean;
                    num += template_centered[i][j] * window_centered;
                    window_energy += window_centered * window_centered;
                }
            }

            let denom = (template_energy * window_energy).sqrt();
            let score = if denom == 0.0 { 0.0 } else { num / denom };

            if score > best_score {
                best_score = score;
                best = Vec2(x as i64, y as i64);
            }
        }
    }

    Ok(best)
}

/// Returns the displacement to add to `tile_t`'s placement to obtain
/// `tile_o`'s placement on a shared canvas.
pub fn align(tile_t: &Tile, tile_o: &Tile) -> Result<Vec2<i64>> {
    let grey_t = normalize_to_grey(&tile_t.real);
    let grey_o = normalize_to_grey(&tile_o.real);

    let x_diff = (tile_o.head.engage_x_nm + tile_o.head.x_offset_nm)
        - (tile_t.head.engage_x_nm + tile_t.head.x_offset_nm);
    let y_diff = (tile_o.head.engage_y_nm + tile_o.head.y_offset_nm)
        - (tile_t.head.engage_y_nm + tile_t.head.y_offset_nm);

    let window = search_window(tile_o, x_diff, y_diff);
    let template = crop(&grey_t, window)?;

    let best = match_template(&template, &grey_o)?;

    Ok(Vec2(window.x_start - best.x(), window.y_start - best.y()))
}
