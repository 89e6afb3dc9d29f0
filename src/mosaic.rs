//! The composited mosaic matrix, and the encoder that rescales it back into
//! the tile format's fixed-point raw range with a headroom factor.
//! Grounded on `spm_stitching.hpp`'s `calcNewZScale`/`calcRawDataToByteData`.

use crate::error::{Error, Result};
use crate::io as spm_io;
use crate::tile::{RawWidth, Tile, WriteFields};

/// A dense `H x W` matrix of doubles plus a parallel occupancy mask, so that
/// a legitimate sample of exactly `0.0` is never mistaken for an unwritten
/// pixel (the source used `0.0` itself as the "unwritten" sentinel).
#[derive(Debug, Clone)]
pub struct Mosaic {
    pub width: usize,
    pub height: usize,
    pub values: Vec<f64>,
    written: Vec<bool>,
}

impl Mosaic {
    pub(crate) fn new(width: usize, height: usize) -> Self {
        Mosaic {
            width,
            height,
            values: vec![0.0; width * height],
            written: vec![false; width * height],
        }
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        let index = row * self.width + col;
        if self.written[index] { Some(self.values[index]) } else { None }
    }

    pub fn is_written(&self, row: usize, col: usize) -> bool {
        self.written[row * self.width + col]
    }

    pub(crate) fn write_if_unwritten(&mut self, row: usize, col: usize, value: f64) {
        let index = row * self.width + col;
        if !self.written[index] {
            self.values[index] = value;
            self.written[index] = true;
        }
    }

    fn min_max(&self) -> (f64, f64) {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;

        for &value in &self.values {
            if value < min { min = value; }
            if value > max { max = value; }
        }

        (min, max)
    }
}

/// How much headroom is reserved above the raw range that an exact-fit
/// z-scale would produce, to avoid clipping from later rounding.
const HEADROOM_FACTOR: f64 = 1.5;

/// Computes the new z-scale for `mosaic`, given the template tile's pixel
/// width and sensitivity. Returns [`Error::DegenerateRange`] when the mosaic
/// is flat (`max == min`), since no meaningful scale can be derived from it.
fn compute_z_scale(mosaic: &Mosaic, bytes_per_pixel: RawWidth, z_scale_sens_v: f64) -> Result<f64> {
    let (min_v, max_v) = mosaic.min_max();

    if max_v == min_v {
        return Err(Error::DegenerateRange);
    }

    let scale = ((max_v - min_v) * bytes_per_pixel.scale_divisor())
        / (bytes_per_pixel.max_raw() * z_scale_sens_v)
        * HEADROOM_FACTOR;

    // Round to seven decimal digits, plus one ULP, to avoid rounding-down clipping.
    Ok(((scale * 1.0e7).round() + 1.0) / 1.0e7)
}

/// Quantizes `mosaic` back to the on-disk raw integer width using `z_scale`,
/// reverses the row order (top-to-bottom back to the disk's bottom-to-top
/// convention), and packs the samples little-endian.
fn quantize_and_pack(mosaic: &Mosaic, bytes_per_pixel: RawWidth, z_scale_sens_v: f64, z_scale: f64) -> Vec<u8> {
    let divisor = bytes_per_pixel.scale_divisor();

    let mut raw = Vec::with_capacity(mosaic.width * mosaic.height);

    // Reverse rows: mosaic row 0 is the top of the image, disk row 0 is the bottom.
    for row in (0 .. mosaic.height).rev() {
        for col in 0 .. mosaic.width {
            let value = mosaic.get(row, col).unwrap_or(0.0);
            let sample = (value / z_scale_sens_v / z_scale * divisor).trunc();
            raw.push(sample as i32);
        }
    }

    let mut bytes = Vec::new();
    spm_io::write_raw_samples_narrowed(&mut bytes, bytes_per_pixel.bytes(), &raw)
        .expect("writing into an in-memory Vec<u8> cannot fail");
    bytes
}

/// Encodes `mosaic` against `template`'s pixel width and sensitivity,
/// returning the fields to splice into the output header plus the packed
/// raster bytes ready to append.
pub fn encode(mosaic: &Mosaic, template: &Tile) -> Result<(WriteFields, Vec<u8>)> {
    let bytes_per_pixel = template.header.bytes_per_pixel;
    let z_scale_sens_v = template.header.z_scale_sens_v;

    let z_scale = compute_z_scale(mosaic, bytes_per_pixel, z_scale_sens_v)?;
    let raster = quantize_and_pack(mosaic, bytes_per_pixel, z_scale_sens_v, z_scale);

    let nm_per_pixel = template.head.scan_size_nm as f64 / template.cols() as f64;
    let scan_size_nm = (mosaic.width as f64 * nm_per_pixel).round() as i64;

    let fields = WriteFields {
        data_length: raster.len() as u64,
        z_scale_value: z_scale,
        samps_per_line: mosaic.width,
        number_of_lines: mosaic.height,
        scan_size_nm,
    };

    Ok((fields, raster))
}
