//! Canvas planning: accumulates pairwise displacements into per-tile
//! placements, then pads the overall bounding box to a 64-aligned square.
//! Grounded on `spm_stitching.hpp`'s `calcImagePosInfo`.

use crate::math::{self, Vec2};

/// A tile's rectangle on the shared canvas, in canvas pixel coordinates.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Placement {
    pub x_start: i64,
    pub x_end: i64,
    pub y_start: i64,
    pub y_end: i64,
}

impl Placement {
    fn translated(self, d: Vec2<i64>) -> Self {
        Placement {
            x_start: self.x_start + d.x(),
            x_end: self.x_end + d.x(),
            y_start: self.y_start + d.y(),
            y_end: self.y_end + d.y(),
        }
    }
}

/// The result of planning: the bounding box (already padded to a 64-aligned
/// square) plus one placement per input tile, in the same order.
#[derive(Debug, Clone)]
pub struct CanvasPlan {
    pub bounds: Placement,
    pub placements: Vec<Placement>,
}

impl CanvasPlan {
    pub fn width(&self) -> i64 { self.bounds.x_end - self.bounds.x_start }
    pub fn height(&self) -> i64 { self.bounds.y_end - self.bounds.y_start }
}

/// `displacements[i]` is the displacement of tile `i+1` relative to tile `i`,
/// as produced by [`crate::align::align`].
pub fn plan(tile_width: i64, tile_height: i64, displacements: &[Vec2<i64>]) -> CanvasPlan {
    let first = Placement { x_start: 0, x_end: tile_width, y_start: 0, y_end: tile_height };
    let mut placements = vec![first];

    let mut min_x = first.x_start;
    let mut max_x = first.x_end;
    let mut min_y = first.y_start;
    let mut max_y = first.y_end;

    for &d in displacements {
        let next = placements.last().copied().unwrap().translated(d);

        min_x = min_x.min(next.x_start);
        max_x = max_x.max(next.x_end);
        min_y = min_y.min(next.y_start);
        max_y = max_y.max(next.y_end);

        placements.push(next);
    }

    let mut bounds = Placement { x_start: min_x, x_end: max_x, y_start: min_y, y_end: max_y };
    pad_to_square(&mut bounds);

    CanvasPlan { bounds, placements }
}

/// Extends `bounds` so the resulting rectangle is square and both sides are
/// multiples of 64, using the corrected (non-off-by-one) alignment padding.
fn pad_to_square(bounds: &mut Placement) {
    let width = bounds.x_end - bounds.x_start;
    let height = bounds.y_end - bounds.y_start;

    if height < width {
        bounds.x_end += math::padding_to_multiple(width, 64);
        let new_width = bounds.x_end - bounds.x_start;
        bounds.y_end += new_width - height;
    } else {
        bounds.y_end += math::padding_to_multiple(height, 64);
        let new_height = bounds.y_end - bounds.y_start;
        bounds.x_end += new_height - width;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn single_tile_pads_to_square_multiple_of_64() {
        let plan = plan(256, 256, &[]);
        assert_eq!(plan.width(), 256);
        assert_eq!(plan.height(), 256);
        assert_eq!(plan.placements.len(), 1);
        assert_eq!(plan.placements[0], Placement { x_start: 0, x_end: 256, y_start: 0, y_end: 256 });
    }

    #[test]
    fn odd_sized_tile_pads_up_to_next_multiple_of_64() {
        let plan = plan(100, 100, &[]);
        assert_eq!(plan.width() % 64, 0);
        assert_eq!(plan.height() % 64, 0);
        assert_eq!(plan.width(), plan.height());
        assert_eq!(plan.width(), 128);
    }

    #[test]
    fn accumulates_chained_displacements() {
        let plan = plan(100, 100, &[Vec2(50, 0)]);
        assert_eq!(plan.placements[0], Placement { x_start: 0, x_end: 100, y_start: 0, y_end: 100 });
        assert_eq!(plan.placements[1], Placement { x_start: 50, x_end: 150, y_start: 0, y_end: 100 });

        for placement in &plan.placements {
            assert!(placement.x_start >= 0 && placement.x_end <= plan.width());
            assert!(placement.y_start >= 0 && placement.y_end <= plan.height());
        }
    }

    #[test]
    fn negative_displacement_placements_fit_once_shifted_by_bounds_origin() {
        let plan = plan(64, 64, &[Vec2(-32, -32)]);
        for placement in &plan.placements {
            let x_start = placement.x_start - plan.bounds.x_start;
            let y_start = placement.y_start - plan.bounds.y_start;
            let x_end = placement.x_end - plan.bounds.x_start;
            let y_end = placement.y_end - plan.bounds.y_start;

            assert!(x_start >= 0 && y_start >= 0);
            assert!(x_end <= plan.width() && y_end <= plan.height());
        }
    }
}
