//! First-order per-row detilt of a tile's real-valued image.
//!
//! Each scanline is assumed to carry its own baseline drift, independent of
//! its neighbors, so the fit is row-by-row rather than a single plane fit
//! across the whole image — the same independence assumption as
//! `spm_algorithm.hpp`'s `flattenFirst`.

use crate::tile::Tile;

/// Subtracts a per-row ordinary-least-squares line fit `z = m*c + b` from
/// every row of `tile.real`, in place.
pub fn flatten(tile: &mut Tile) {
    let cols = tile.cols();
    if cols == 0 {
        return;
    }

    let x_mean = (cols - 1) as f64 / 2.0;

    let sum_mu_sq: f64 = (0 .. cols)
        .map(|c| {
            let mu = c as f64 - x_mean;
            mu * mu
        })
        .sum();

    for row in tile.real.iter_mut() {
        flatten_row(row, x_mean, sum_mu_sq);
    }
}

fn flatten_row(row: &mut [f64], x_mean: f64, sum_mu_sq: f64) {
    let cols = row.len();
    if cols == 0 {
        return;
    }

    let row_mean: f64 = row.iter().sum::<f64>() / cols as f64;

    let sum_mu_z: f64 = row.iter().enumerate()
        .map(|(c, &z)| (c as f64 - x_mean) * (z - row_mean))
        .sum();

    let slope = if sum_mu_sq != 0.0 { sum_mu_z / sum_mu_sq } else { 0.0 };
    let intercept = row_mean - slope * x_mean;

    for (c, z) in row.iter_mut().enumerate() {
        *z -= slope * c as f64 + intercept;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn flatten_rows(mut rows: Vec<Vec<f64>>) -> Vec<Vec<f64>> {
        let cols = rows[0].len();
        let x_mean = (cols - 1) as f64 / 2.0;
        let sum_mu_sq: f64 = (0 .. cols).map(|c| {
            let mu = c as f64 - x_mean;
            mu * mu
        }).sum();

        for row in rows.iter_mut() {
            flatten_row(row, x_mean, sum_mu_sq);
        }

        rows
    }

    #[test]
    fn flattens_affine_rows_to_zero() {
        let row: Vec<f64> = (0 .. 10).map(|c| 2.0 * c as f64 + 5.0).collect();
        let flattened = flatten_rows(vec![row]);

        for &value in &flattened[0] {
            assert_abs_diff_eq!(value, 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn preserves_row_mean_near_zero() {
        let row = vec![1.0, 3.0, 2.0, 9.0, -4.0, 7.0];
        let cols = row.len();
        let flattened = flatten_rows(vec![row]);

        let mean: f64 = flattened[0].iter().sum::<f64>() / cols as f64;
        assert_abs_diff_eq!(mean, 0.0, epsilon = 1e-12 * cols as f64);
    }

    #[test]
    fn constant_row_stays_zero() {
        let row = vec![4.0; 8];
        let flattened = flatten_rows(vec![row]);
        for &value in &flattened[0] {
            assert_abs_diff_eq!(value, 0.0, epsilon = 1e-9);
        }
    }
}
