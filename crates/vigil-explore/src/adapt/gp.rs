//! Zero-mean Gaussian process with an RBF kernel, used as the Bayesian
//! optimization surrogate.

use nalgebra::{Cholesky, DMatrix, DVector, Dyn};

/// Jitter added to the kernel diagonal when the first factorization fails.
const FALLBACK_JITTER: f64 = 1e-6;

pub struct GaussianProcess {
    xs: Vec<Vec<f64>>,
    chol: Cholesky<f64, Dyn>,
    alpha: DVector<f64>,
    length_scale: f64,
    y_mean: f64,
    y_std: f64,
}

impl GaussianProcess {
    /// Fit on `(xs, ys)`. Targets are standardized internally.
    ///
    /// Returns `None` when the kernel matrix cannot be factored even with jitter.
    pub fn fit(xs: &[Vec<f64>], ys: &[f64], length_scale: f64, noise: f64) -> Option<Self> {
        if xs.is_empty() || xs.len() != ys.len() {
            return None;
        }
        let n = xs.len();
        let y_mean = ys.iter().sum::<f64>() / n as f64;
        let var = ys.iter().map(|y| (y - y_mean).powi(2)).sum::<f64>() / n as f64;
        let y_std = if var > 0.0 { var.sqrt() } else { 1.0 };
        let targets = DVector::from_iterator(n, ys.iter().map(|y| (y - y_mean) / y_std));

        let kernel = DMatrix::from_fn(n, n, |i, j| {
            let k = rbf(&xs[i], &xs[j], length_scale);
            if i == j {
                k + noise
            } else {
                k
            }
        });
        let chol = match Cholesky::new(kernel.clone()) {
            Some(c) => c,
            None => {
                let jittered = kernel + DMatrix::identity(n, n) * FALLBACK_JITTER;
                Cholesky::new(jittered)?
            }
        };
        let alpha = chol.solve(&targets);
        Some(Self {
            xs: xs.to_vec(),
            chol,
            alpha,
            length_scale,
            y_mean,
            y_std,
        })
    }

    /// Posterior mean and standard deviation at `x`, in the original target scale.
    pub fn predict(&self, x: &[f64]) -> (f64, f64) {
        let k_star = DVector::from_iterator(
            self.xs.len(),
            self.xs.iter().map(|xi| rbf(xi, x, self.length_scale)),
        );
        let mean = k_star.dot(&self.alpha);
        let v = self
            .chol
            .l()
            .solve_lower_triangular(&k_star)
            .unwrap_or_else(|| DVector::zeros(self.xs.len()));
        let var = (1.0 - v.dot(&v)).max(0.0);
        (
            self.y_mean + mean * self.y_std,
            var.sqrt() * self.y_std,
        )
    }

    /// Standardized mean and deviation, on the scale the model was fit in.
    pub(crate) fn predict_standardized(&self, x: &[f64]) -> (f64, f64) {
        let (m, s) = self.predict(x);
        ((m - self.y_mean) / self.y_std, s / self.y_std)
    }

    pub(crate) fn standardize_target(&self, y: f64) -> f64 {
        (y - self.y_mean) / self.y_std
    }
}

fn rbf(a: &[f64], b: &[f64], length_scale: f64) -> f64 {
    let d2: f64 = a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum();
    (-0.5 * d2 / (length_scale * length_scale)).exp()
}

/// Standard normal CDF.
pub fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + libm::erf(z / std::f64::consts::SQRT_2))
}

/// Standard normal PDF.
pub fn normal_pdf(z: f64) -> f64 {
    (-0.5 * z * z).exp() / (2.0 * std::f64::consts::PI).sqrt()
}

/// Expected improvement below `best` for a minimization problem.
pub fn expected_improvement(mean: f64, std: f64, best: f64, xi: f64) -> f64 {
    let gain = best - mean - xi;
    if std < 1e-12 {
        return gain.max(0.0);
    }
    let z = gain / std;
    gain * normal_cdf(z) + std * normal_pdf(z)
}
