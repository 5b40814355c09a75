//! Local outlier factor.
//!
//! Density-based and transductive only: the factor of a point is defined
//! relative to the other points of the same batch, so there is no separate
//! predict step. `fit_predict` scores a batch and flags its top
//! `contamination` fraction.

use crate::analysis::stats;
use serde::{Deserialize, Serialize};

const DENSITY_EPSILON: f64 = 1e-10;

/// LOF carries configuration only; nothing is learned across batches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocalOutlierFactor {
    pub n_neighbors: usize,
    pub contamination: f64,
}

fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f64>().sqrt()
}

impl LocalOutlierFactor {
    pub fn new(n_neighbors: usize, contamination: f64) -> Self {
        LocalOutlierFactor {
            n_neighbors,
            contamination,
        }
    }

    /// Outlier factor per row. Values near 1 are inliers.
    ///
    /// Uses `k = min(n_neighbors, n - 1)`; fewer than two rows yield no
    /// factors.
    pub fn factors(&self, data: &[Vec<f64>]) -> Vec<f64> {
        let n = data.len();
        if n < 2 {
            return Vec::new();
        }
        let k = self.n_neighbors.min(n - 1).max(1);

        // k nearest neighbors (index, distance) per point, ties by index.
        let neighbors: Vec<Vec<(usize, f64)>> = (0..n)
            .map(|i| {
                let mut dists: Vec<(usize, f64)> = (0..n)
                    .filter(|&j| j != i)
                    .map(|j| (j, euclidean(&data[i], &data[j])))
                    .collect();
                dists.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
                dists.truncate(k);
                dists
            })
            .collect();

        let k_distance: Vec<f64> = neighbors.iter().map(|nb| nb[nb.len() - 1].1).collect();

        let lrd: Vec<f64> = neighbors
            .iter()
            .map(|nb| {
                let reach: f64 = nb.iter().map(|&(j, d)| d.max(k_distance[j])).sum::<f64>() / nb.len() as f64;
                1.0 / (reach + DENSITY_EPSILON)
            })
            .collect();

        neighbors
            .iter()
            .enumerate()
            .map(|(i, nb)| {
                let neighbor_lrd: f64 = nb.iter().map(|&(j, _)| lrd[j]).sum::<f64>() / nb.len() as f64;
                neighbor_lrd / lrd[i]
            })
            .collect()
    }

    /// Flags the rows whose factor exceeds the `(1 - contamination)` quantile.
    pub fn fit_predict(&self, data: &[Vec<f64>]) -> Vec<bool> {
        let factors = self.factors(data);
        if factors.is_empty() {
            return vec![false; data.len()];
        }
        let mut sorted = factors.clone();
        sorted.sort_by(f64::total_cmp);
        let threshold = stats::percentile_sorted(&sorted, 1.0 - self.contamination).unwrap_or(f64::INFINITY);
        factors.iter().map(|f| *f > threshold).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_grid_factors_near_one() {
        let data: Vec<Vec<f64>> = (0..25).map(|i| vec![(i % 5) as f64, (i / 5) as f64]).collect();
        let lof = LocalOutlierFactor::new(4, 0.1);
        let factors = lof.factors(&data);
        // Centre of the grid.
        assert!((factors[12] - 1.0).abs() < 0.2, "got {}", factors[12]);
    }

    #[test]
    fn test_distant_point_is_flagged() {
        let mut data: Vec<Vec<f64>> = (0..30).map(|i| vec![(i % 6) as f64 * 0.5, (i / 6) as f64 * 0.5]).collect();
        data.push(vec![40.0, 40.0]);
        let lof = LocalOutlierFactor::new(20, 0.05);
        let flags = lof.fit_predict(&data);
        assert!(flags[30], "the far point must be an outlier");
        assert!(flags.iter().filter(|f| **f).count() <= 2);
    }

    #[test]
    fn test_single_row_has_no_outliers() {
        let lof = LocalOutlierFactor::new(20, 0.1);
        assert_eq!(lof.fit_predict(&[vec![1.0, 2.0]]), vec![false]);
    }
}
