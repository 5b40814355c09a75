//! One-class SVM with an RBF kernel.
//!
//! Solves the ν-formulation dual
//!
//! ```text
//! min  ½ αᵀQα   s.t.  0 ≤ αᵢ ≤ 1,  Σαᵢ = ν·l
//! ```
//!
//! by sequential minimal optimisation over the maximal violating pair.
//! Kernel columns are computed on demand and kept in a bounded LRU cache.
//! A point is an outlier when `Σ αᵢ K(xᵢ, x) − ρ < 0`.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

const TAU: f64 = 1e-12;

/// Memory budget for cached kernel columns.
const KERNEL_CACHE_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneClassSvm {
    pub gamma: f64,
    pub rho: f64,
    support_vectors: Vec<Vec<f64>>,
    coefficients: Vec<f64>,
    pub iterations: usize,
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

fn rbf(gamma: f64, a: &[f64], b: &[f64]) -> f64 {
    (-gamma * squared_distance(a, b)).exp()
}

// ---------------------------------------------------------------------------
// Kernel column cache
// ---------------------------------------------------------------------------

/// Least-recently-used cache of columns of the kernel matrix `Q`.
struct KernelCache<'a> {
    data: &'a [Vec<f64>],
    gamma: f64,
    capacity: usize,
    columns: HashMap<usize, Rc<[f64]>>,
    recency: VecDeque<usize>,
    computed: usize,
}

impl<'a> KernelCache<'a> {
    fn new(data: &'a [Vec<f64>], gamma: f64, budget_bytes: usize) -> Self {
        let column_bytes = data.len().max(1) * std::mem::size_of::<f64>();
        KernelCache {
            data,
            gamma,
            capacity: (budget_bytes / column_bytes).max(2),
            columns: HashMap::new(),
            recency: VecDeque::new(),
            computed: 0,
        }
    }

    fn column(&mut self, i: usize) -> Rc<[f64]> {
        if let Some(column) = self.columns.get(&i).cloned() {
            if let Some(pos) = self.recency.iter().position(|&t| t == i) {
                self.recency.remove(pos);
            }
            self.recency.push_back(i);
            return column;
        }

        let column: Rc<[f64]> = self.data.iter().map(|x| rbf(self.gamma, &self.data[i], x)).collect();
        self.computed += 1;
        if self.columns.len() >= self.capacity {
            if let Some(oldest) = self.recency.pop_front() {
                self.columns.remove(&oldest);
            }
        }
        self.columns.insert(i, Rc::clone(&column));
        self.recency.push_back(i);
        column
    }
}

/// `1 / (n_features · Var(X))` over every entry of the matrix.
pub fn scale_gamma(data: &[Vec<f64>]) -> f64 {
    let n_features = data.first().map(Vec::len).unwrap_or(0);
    let values: Vec<f64> = data.iter().flatten().copied().collect();
    if values.is_empty() || n_features == 0 {
        return 1.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    if var > 0.0 { 1.0 / (n_features as f64 * var) } else { 1.0 }
}

impl OneClassSvm {
    pub fn fit(data: &[Vec<f64>], nu: f64, tolerance: f64, max_iterations: usize) -> Self {
        let l = data.len();
        let gamma = scale_gamma(data);
        let mut cache = KernelCache::new(data, gamma, KERNEL_CACHE_BYTES);

        // Feasible start: the first ⌊ν·l⌋ multipliers at the upper bound.
        let total = nu * l as f64;
        let mut alpha = vec![0.0; l];
        let n_full = (total.floor() as usize).min(l);
        for a in alpha.iter_mut().take(n_full) {
            *a = 1.0;
        }
        if n_full < l {
            alpha[n_full] = total - n_full as f64;
        }

        // G = Qα
        let mut gradient = vec![0.0; l];
        for (i, &a) in alpha.iter().enumerate() {
            if a > 0.0 {
                for (g, q) in gradient.iter_mut().zip(cache.column(i).iter()) {
                    *g += a * q;
                }
            }
        }

        let mut iterations = 0;
        while iterations < max_iterations {
            // i: most negative gradient among multipliers that can grow;
            // j: most positive gradient among multipliers that can shrink.
            let mut i = None;
            let mut g_max = f64::NEG_INFINITY;
            let mut j = None;
            let mut g_min = f64::INFINITY;
            for t in 0..l {
                if alpha[t] < 1.0 && -gradient[t] > g_max {
                    g_max = -gradient[t];
                    i = Some(t);
                }
                if alpha[t] > 0.0 && -gradient[t] < g_min {
                    g_min = -gradient[t];
                    j = Some(t);
                }
            }
            let (Some(i), Some(j)) = (i, j) else { break };
            if g_max - g_min < tolerance || i == j {
                break;
            }

            let q_i = cache.column(i);
            let q_j = cache.column(j);
            let quad = (q_i[i] + q_j[j] - 2.0 * q_i[j]).max(TAU);
            let step = ((gradient[j] - gradient[i]) / quad)
                .min(1.0 - alpha[i])
                .min(alpha[j])
                .max(0.0);
            if step == 0.0 {
                break;
            }
            alpha[i] = (alpha[i] + step).min(1.0);
            alpha[j] = (alpha[j] - step).max(0.0);
            for t in 0..l {
                gradient[t] += step * (q_i[t] - q_j[t]);
            }
            iterations += 1;
        }

        let rho = compute_rho(&alpha, &gradient);
        let (support_vectors, coefficients): (Vec<Vec<f64>>, Vec<f64>) = alpha
            .iter()
            .enumerate()
            .filter(|(_, a)| **a > 0.0)
            .map(|(t, a)| (data[t].clone(), *a))
            .unzip();

        OneClassSvm {
            gamma,
            rho,
            support_vectors,
            coefficients,
            iterations,
        }
    }

    pub fn decision_function(&self, x: &[f64]) -> f64 {
        self.support_vectors
            .iter()
            .zip(&self.coefficients)
            .map(|(sv, a)| a * rbf(self.gamma, sv, x))
            .sum::<f64>()
            - self.rho
    }

    pub fn is_outlier(&self, x: &[f64]) -> bool {
        self.decision_function(x) < 0.0
    }

    pub fn support_vector_count(&self) -> usize {
        self.support_vectors.len()
    }
}

/// ρ from the free multipliers, or the midpoint of the bound-derived
/// interval when every multiplier sits at a bound.
fn compute_rho(alpha: &[f64], gradient: &[f64]) -> f64 {
    let mut upper = f64::INFINITY;
    let mut lower = f64::NEG_INFINITY;
    let mut free_sum = 0.0;
    let mut free_count = 0;
    for (a, g) in alpha.iter().zip(gradient) {
        if *a >= 1.0 {
            lower = lower.max(*g);
        } else if *a <= 0.0 {
            upper = upper.min(*g);
        } else {
            free_sum += g;
            free_count += 1;
        }
    }
    if free_count > 0 {
        free_sum / free_count as f64
    } else if upper.is_finite() && lower.is_finite() {
        (upper + lower) / 2.0
    } else if upper.is_finite() {
        upper
    } else {
        lower
    }
}
