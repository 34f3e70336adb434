//! Full-volume score accumulator
//!
//! Window predictions are folded in window-index order into `f64` buffers,
//! so repeated identical values average back to the exact same `f32`.

use contracts::CombinationRule;
use ndarray::{s, Array3, Array4, ArrayView4, Zip};

use crate::window::Window;

/// Floor for gaussian importance weights, keeps window edges contributing
const MIN_IMPORTANCE: f64 = 1e-3;

/// Accumulates per-class scores over overlapping windows
#[derive(Debug)]
pub struct Accumulator {
    rule: CombinationRule,
    /// `(K, X, Y, Z)` running sums (or maxima)
    scores: Array4<f64>,
    /// Total weight (or hit count) per voxel
    weights: Array3<f64>,
    windows: usize,
}

impl Accumulator {
    pub fn new(rule: CombinationRule, num_classes: usize, shape: [usize; 3]) -> Self {
        let [nx, ny, nz] = shape;
        let init = match rule {
            CombinationRule::Max => f64::NEG_INFINITY,
            _ => 0.0,
        };
        Self {
            rule,
            scores: Array4::from_elem((num_classes, nx, ny, nz), init),
            weights: Array3::zeros((nx, ny, nz)),
            windows: 0,
        }
    }

    /// Windows folded in so far
    pub fn windows(&self) -> usize {
        self.windows
    }

    /// Fold in one window's scores, already cropped to `window.extent`
    pub fn add(&mut self, window: &Window, scores: ArrayView4<'_, f32>) {
        let [ox, oy, oz] = window.origin;
        let [ex, ey, ez] = window.extent;
        let mut target = self
            .scores
            .slice_mut(s![.., ox..ox + ex, oy..oy + ey, oz..oz + ez]);
        let mut weight = self
            .weights
            .slice_mut(s![ox..ox + ex, oy..oy + ey, oz..oz + ez]);

        match self.rule {
            CombinationRule::Average => {
                Zip::from(&mut target)
                    .and(&scores)
                    .for_each(|acc, &v| *acc += f64::from(v));
                weight += 1.0;
            }
            CombinationRule::Max => {
                Zip::from(&mut target)
                    .and(&scores)
                    .for_each(|acc, &v| *acc = acc.max(f64::from(v)));
                weight += 1.0;
            }
            CombinationRule::Gaussian { sigma_scale } => {
                let importance = importance_map(window.size, sigma_scale);
                let importance = importance.slice(s![0..ex, 0..ey, 0..ez]);
                for (mut class_target, class_scores) in
                    target.outer_iter_mut().zip(scores.outer_iter())
                {
                    Zip::from(&mut class_target)
                        .and(&class_scores)
                        .and(&importance)
                        .for_each(|acc, &v, &w| *acc += w * f64::from(v));
                }
                weight += &importance;
            }
        }
        self.windows += 1;
    }

    /// Final `(K, X, Y, Z)` scores; uncovered voxels score 0
    pub fn finish(self) -> Array4<f32> {
        let Self {
            rule,
            mut scores,
            weights,
            ..
        } = self;

        for mut class_scores in scores.outer_iter_mut() {
            Zip::from(&mut class_scores)
                .and(&weights)
                .for_each(|acc, &w| {
                    *acc = if w <= 0.0 {
                        0.0
                    } else {
                        match rule {
                            CombinationRule::Max => *acc,
                            _ => *acc / w,
                        }
                    };
                });
        }
        scores.mapv(|v| v as f32)
    }
}

/// Separable centre-weighted map over a window, peak 1
fn importance_map(size: [usize; 3], sigma_scale: f64) -> Array3<f64> {
    let profiles: Vec<Vec<f64>> = size
        .iter()
        .map(|&n| {
            let center = (n as f64 - 1.0) / 2.0;
            let sigma = (sigma_scale * n as f64).max(f64::EPSILON);
            (0..n)
                .map(|i| {
                    let d = i as f64 - center;
                    (-(d * d) / (2.0 * sigma * sigma)).exp()
                })
                .collect()
        })
        .collect();

    Array3::from_shape_fn((size[0], size[1], size[2]), |(x, y, z)| {
        (profiles[0][x] * profiles[1][y] * profiles[2][z]).max(MIN_IMPORTANCE)
    })
}
