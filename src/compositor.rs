//! Paints tile pixel matrices onto the shared canvas using the placements
//! from the Canvas Planner. Grounded on `spm_stitching.hpp`'s
//! `stitchingImage`, redesigned to use an explicit occupancy mask instead of
//! treating `0.0` as "not yet written" (see DESIGN.md).

use crate::canvas::{CanvasPlan, Placement};
use crate::mosaic::Mosaic;

/// Composites `tiles` (each a `real`-valued `rows x cols` matrix, the same
/// order as `plan.placements`) onto a fresh canvas. First writer wins: once a
/// pixel is written by an earlier tile, later tiles may not overwrite it.
pub fn composite(plan: &CanvasPlan, tiles: &[Vec<Vec<f64>>]) -> Mosaic {
    let width = plan.width() as usize;
    let height = plan.height() as usize;
    let mut mosaic = Mosaic::new(width, height);

    for (tile, placement) in tiles.iter().zip(plan.placements.iter()) {
        paint_tile(&mut mosaic, tile, *placement, plan.bounds);
    }

    mosaic
}

fn paint_tile(mosaic: &mut Mosaic, tile: &[Vec<f64>], placement: Placement, bounds: Placement) {
    for (r, row) in tile.iter().enumerate() {
        for (c, &value) in row.iter().enumerate() {
            let target_r = placement.y_start - bounds.y_start + r as i64;
            let target_c = placement.x_start - bounds.x_start + c as i64;

            mosaic.write_if_unwritten(target_r as usize, target_c as usize, value);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::canvas::plan;
    use crate::math::Vec2;

    #[test]
    fn single_tile_fills_entire_canvas() {
        let canvas_plan = plan(2, 2, &[]);
        let tile = vec![vec![1.0, 2.0], vec![3.0, 4.0]];

        let mosaic = composite(&canvas_plan, &[tile]);
        assert_eq!(mosaic.get(0, 0), Some(1.0));
        assert_eq!(mosaic.get(1, 1), Some(4.0));
    }

    #[test]
    fn first_writer_wins_on_overlap() {
        let canvas_plan = plan(4, 4, &[Vec2(2, 0)]);
        let first = vec![vec![1.0; 4]; 4];
        let second = vec![vec![9.0; 4]; 4];

        let mosaic = composite(&canvas_plan, &[first, second]);

        // columns 2..4 of the first tile's placement overlap the second tile's start.
        assert_eq!(mosaic.get(0, 2), Some(1.0));
        assert_eq!(mosaic.get(0, 3), Some(1.0));
    }

    #[test]
    fn pixels_never_written_report_unwritten() {
        let canvas_plan = plan(2, 2, &[]);
        let tile = vec![vec![0.0, 0.0], vec![0.0, 0.0]];
        let mosaic = composite(&canvas_plan, &[tile]);

        // a legitimate zero value is still reported as written, unlike the sentinel convention.
        assert!(mosaic.is_written(0, 0));
        assert_eq!(mosaic.get(0, 0), Some(0.0));
    }
}
