//! Isolation forest.
//!
//! Each tree isolates points with random axis-aligned splits on a random
//! subsample. Short average path lengths mean easy isolation, hence outliers.
//! Scores follow `s(x) = 2^(-E[h(x)] / c(psi))`; the decision threshold is the
//! `(1 - contamination)` quantile of the training scores.

use crate::analysis::stats;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Split {
        feature: usize,
        value: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        size: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct IsolationTree {
    nodes: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    sample_size: usize,
    pub threshold: f64,
}

/// Average path length of an unsuccessful BST search over `n` points.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

impl IsolationTree {
    fn grow(data: &[Vec<f64>], indices: Vec<usize>, max_depth: usize, rng: &mut StdRng) -> Self {
        let mut tree = IsolationTree { nodes: Vec::new() };
        tree.build(data, indices, 0, max_depth, rng);
        tree
    }

    fn build(&mut self, data: &[Vec<f64>], indices: Vec<usize>, depth: usize, max_depth: usize, rng: &mut StdRng) -> usize {
        let slot = self.nodes.len();
        self.nodes.push(Node::Leaf { size: indices.len() });
        if depth >= max_depth || indices.len() <= 1 {
            return slot;
        }

        // Only features that still vary within this node can split it.
        let n_features = data[indices[0]].len();
        let candidates: Vec<(usize, f64, f64)> = (0..n_features)
            .filter_map(|f| {
                let (lo, hi) = indices.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                    (lo.min(data[i][f]), hi.max(data[i][f]))
                });
                (hi > lo).then_some((f, lo, hi))
            })
            .collect();
        if candidates.is_empty() {
            return slot;
        }

        let (feature, lo, hi) = candidates[rng.gen_range(0..candidates.len())];
        let value = rng.gen_range(lo..hi);
        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) =
            indices.into_iter().partition(|&i| data[i][feature] < value);

        let left = self.build(data, left_idx, depth + 1, max_depth, rng);
        let right = self.build(data, right_idx, depth + 1, max_depth, rng);
        self.nodes[slot] = Node::Split { feature, value, left, right };
        slot
    }

    fn path_length(&self, x: &[f64]) -> f64 {
        let mut node = 0;
        let mut depth = 0.0;
        loop {
            match &self.nodes[node] {
                Node::Leaf { size } => return depth + average_path_length(*size),
                Node::Split { feature, value, left, right } => {
                    node = if x[*feature] < *value { *left } else { *right };
                    depth += 1.0;
                }
            }
        }
    }
}

impl IsolationForest {
    /// Fits `n_estimators` trees on subsamples of `min(max_samples, n)` rows.
    pub fn fit(data: &[Vec<f64>], n_estimators: usize, max_samples: usize, contamination: f64, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let sample_size = max_samples.min(data.len()).max(1);
        let max_depth = (sample_size as f64).log2().ceil().max(0.0) as usize;

        let trees = (0..n_estimators)
            .map(|_| {
                let indices = sample(&mut rng, data.len(), sample_size).into_vec();
                IsolationTree::grow(data, indices, max_depth, &mut rng)
            })
            .collect();

        let mut forest = IsolationForest {
            trees,
            sample_size,
            threshold: f64::INFINITY,
        };
        let mut scores: Vec<f64> = data.iter().map(|x| forest.score(x)).collect();
        scores.sort_by(f64::total_cmp);
        forest.threshold = stats::percentile_sorted(&scores, 1.0 - contamination).unwrap_or(f64::INFINITY);
        forest
    }

    /// Anomaly score in `(0, 1]`; higher is more anomalous.
    pub fn score(&self, x: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let mean_path = self.trees.iter().map(|t| t.path_length(x)).sum::<f64>() / self.trees.len() as f64;
        let c = average_path_length(self.sample_size);
        if c == 0.0 {
            return 0.5;
        }
        2f64.powf(-mean_path / c)
    }

    pub fn is_outlier(&self, x: &[f64]) -> bool {
        self.score(x) > self.threshold
    }
}
