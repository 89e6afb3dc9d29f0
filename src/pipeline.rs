//! The orchestrator API consumed by the GUI collaborator: load, flatten,
//! preview, and save. Grounded on `spm_stitching.hpp`'s
//! `execStitchingPreview`/`execStitching`, which this module's `preview`/`save`
//! mirror one-to-one.

use std::path::Path;

use crate::align;
use crate::canvas::{self, CanvasPlan};
use crate::compositor;
use crate::error::{Error, Result};
use crate::mosaic::{self, Mosaic};
use crate::tile::{self, Tile};

/// Loads the image channel labeled `label` out of the SPM file at `path`.
pub fn load_tile(path: &Path, label: &str) -> Result<Tile> {
    tile::load_tile(path, label)
}

/// Removes per-row baseline tilt from `tile`, in place. Intended to run
/// exactly once per tile, before alignment.
pub fn flatten(tile: &mut Tile) {
    crate::flatten::flatten(tile)
}

fn align_chain(tiles: &[Tile]) -> Result<CanvasPlan> {
    if tiles.is_empty() {
        return Err(Error::EmptyInput);
    }

    let mut displacements = Vec::with_capacity(tiles.len().saturating_sub(1));
    for pair in tiles.windows(2) {
        let displacement = align::align(&pair[0], &pair[1])?;
        displacements.push(displacement);
    }

    let first = &tiles[0];
    Ok(canvas::plan(first.cols() as i64, first.rows() as i64, &displacements))
}

/// Runs the aligner, canvas planner, and compositor over `tiles` (already
/// flattened) and returns the composed mosaic. Does not write a file.
pub fn preview(tiles: &[Tile]) -> Result<Mosaic> {
    let plan = align_chain(tiles)?;
    let reals: Vec<Vec<Vec<f64>>> = tiles.iter().map(|tile| tile.real.clone()).collect();

    log::debug!(
        "composited {} tile(s) into a {}x{} mosaic",
        tiles.len(), plan.width(), plan.height()
    );

    Ok(compositor::composite(&plan, &reals))
}

/// Runs `preview`, then rescales the result back into the template tile's
/// raw range and writes `output_path` as a copy of `template_path` with the
/// selected channel's fields and raster replaced.
pub fn save(tiles: &[Tile], template_path: &Path, output_path: &Path, label: &str) -> Result<()> {
    let mosaic = preview(tiles)?;

    let template = tiles.iter().find(|tile| tile.header.label == label)
        .or_else(|| tiles.first())
        .ok_or(Error::EmptyInput)?;

    let (fields, raster) = mosaic::encode(&mosaic, template).map_err(|error| {
        log::error!("failed to encode mosaic for {}: {}", label, error);
        error
    })?;

    tile::write_tile(template_path, output_path, label, &fields, &raster).map_err(|error| {
        log::error!("failed to write {}: {}", output_path.display(), error);
        error
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs::File;
    use std::io::Write as _;

    fn sample_header(label: &str, data_offset: u64, scan_size_nm: i64, engage_x_nm: i64) -> String {
        format!(
            "\\Scan Size: {scan_size_nm} nm\r\n\
             \\Engage X Pos: {engage_x_nm} nm\r\n\
             \\Engage Y Pos: 0 nm\r\n\
             \\X Offset: 0 nm\r\n\
             \\Y Offset: 0 nm\r\n\
             \\@Sens. ZsensSens: V 1.0 nm/V\r\n\
             \\*Ciao image list\r\n\
             \\Data length: 32\r\n\
             \\Data offset: {data_offset}\r\n\
             \\Bytes/pixel: 2\r\n\
             \\Samps/line: 4\r\n\
             \\Number of lines: 4\r\n\
             \\Frame direction: Up\r\n\
             \\Capture start line: 0\r\n\
             \\Color Table Index: 0\r\n\
             \\Relative frame time: 0.0\r\n\
             \\@2:Z scale: V [Sens. ZsensSens] (0.9999) 1.0 V\r\n\
             \\@2:Image Data: S [HeightTrace] \"{label}\"\r\n\
             \\*File list end\r\n",
        )
    }

    fn write_fixture(dir: &tempfile::TempDir, name: &str, scan_size_nm: i64, engage_x_nm: i64, raw_rows: &[[i16; 4]]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = File::create(&path).unwrap();

        let header_text = sample_header("HeightTrace", 1024, scan_size_nm, engage_x_nm);
        file.write_all(header_text.as_bytes()).unwrap();

        let current = header_text.as_bytes().len() as u64;
        file.write_all(&[0x1A]).unwrap();
        file.write_all(&vec![0_u8; (1024 - current - 1) as usize]).unwrap();

        let mut raster_bytes = Vec::new();
        for row in raw_rows {
            for sample in row {
                raster_bytes.extend_from_slice(&sample.to_le_bytes());
            }
        }
        file.write_all(&raster_bytes).unwrap();

        path
    }

    #[test]
    fn single_tile_passthrough_preview_matches_flattened_input() {
        let dir = tempfile::tempdir().unwrap();
        let raw_rows = [[1, 1, 1, 1], [2, 2, 2, 2], [3, 3, 3, 3], [4, 4, 4, 4]];
        let path = write_fixture(&dir, "tile.spm", 1000, 0, &raw_rows);

        let mut tile = load_tile(&path, "HeightTrace").unwrap();
        flatten(&mut tile);

        let mosaic = preview(std::slice::from_ref(&tile)).unwrap();
        // a 4x4 tile pads up to the smallest square multiple of 64.
        assert_eq!(mosaic.width, 64);
        assert_eq!(mosaic.height, 64);

        for r in 0 .. 4 {
            for c in 0 .. 4 {
                assert_eq!(mosaic.get(r, c), Some(tile.real[r][c]));
            }
        }
    }

    #[test]
    fn save_writes_output_file_with_expected_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        // Quadratic-in-column rows so a linear per-row detilt leaves nonzero
        // residual (an affine row would flatten to all zeros, which would make
        // the mosaic degenerate and fail to encode).
        let raw_rows = [[0, 10, 40, 90], [0, 10, 40, 90], [0, 10, 40, 90], [0, 10, 40, 90]];
        let path = write_fixture(&dir, "tile.spm", 1000, 0, &raw_rows);

        let mut tile = load_tile(&path, "HeightTrace").unwrap();
        flatten(&mut tile);

        let output_path = dir.path().join("out.spm");
        save(std::slice::from_ref(&tile), &path, &output_path, "HeightTrace").unwrap();

        let written = load_tile(&output_path, "HeightTrace").unwrap();
        // a 4x4 tile pads up to the smallest square multiple of 64.
        assert_eq!(written.cols(), 64);
        assert_eq!(written.rows(), 64);
    }

    #[test]
    fn preview_rejects_empty_tile_list() {
        let result = preview(&[]);
        assert!(matches!(result, Err(Error::EmptyInput)));
    }
}
