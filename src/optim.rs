//! Optimizer strategies.
//!
//! An optimizer converts a gradient into a weight-update delta. One
//! stateful instance is attached to each layer; whatever the algorithm
//! needs to remember between epochs (velocity, squared-gradient
//! accumulators, moment estimates, an iteration counter) lives inside the
//! instance. The delta is ADDED to the weights by the driver, so descent
//! updates come out negative.
//!
//! State buffers are shaped lazily against the first gradient seen, the
//! same way layer buffers are.

use ndarray::{azip, Array2};

use crate::error::{MlpError, MlpResult};

/// Weight-update strategy, one instance per layer.
pub trait Optimizer: Send + Sync {
    /// Write the update delta for `grad` into `update`.
    fn compute_update(&mut self, update: &mut Array2<f64>, grad: &Array2<f64>);

    /// Registry name, also used by checkpoints to reconstruct the config.
    fn name(&self) -> &'static str;
}

/// Named solver, resolvable from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverKind {
    /// Plain gradient descent.
    Sgd,
    /// Accelerated (Nesterov momentum) gradient descent.
    Agd,
    /// Accumulated squared-gradient scaling.
    AdaGrad,
    /// Exponentially decayed squared-gradient scaling.
    RmsProp,
    /// RMS-scaled updates with a unit-free step size.
    AdaDelta,
    /// Bias-corrected adaptive moment estimation.
    Adam,
}

impl SolverKind {
    /// Resolve a registry name.
    ///
    /// # Errors
    ///
    /// `UnknownOptimizer` for a name not in the registry.
    pub fn from_name(name: &str) -> MlpResult<Self> {
        match name {
            "sgd" => Ok(SolverKind::Sgd),
            "agd" => Ok(SolverKind::Agd),
            "adagrad" => Ok(SolverKind::AdaGrad),
            "rmsprop" => Ok(SolverKind::RmsProp),
            "adadelta" => Ok(SolverKind::AdaDelta),
            "adam" => Ok(SolverKind::Adam),
            _ => Err(MlpError::UnknownOptimizer(name.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SolverKind::Sgd => "sgd",
            SolverKind::Agd => "agd",
            SolverKind::AdaGrad => "adagrad",
            SolverKind::RmsProp => "rmsprop",
            SolverKind::AdaDelta => "adadelta",
            SolverKind::Adam => "adam",
        }
    }

    /// Create one optimizer instance with this kind's default
    /// hyperparameters and the given learning rate (ignored by AdaDelta,
    /// which is unit-free).
    pub fn create(self, learning_rate: f64) -> Box<dyn Optimizer> {
        match self {
            SolverKind::Sgd => Box::new(Sgd::new(learning_rate)),
            SolverKind::Agd => Box::new(Sgd::with_momentum(learning_rate, 0.9, true)),
            SolverKind::AdaGrad => Box::new(AdaGrad::new(learning_rate)),
            SolverKind::RmsProp => Box::new(RmsProp::new(learning_rate)),
            SolverKind::AdaDelta => Box::new(AdaDelta::new()),
            SolverKind::Adam => Box::new(Adam::new(learning_rate)),
        }
    }
}

/// Resolve a solver name and create one instance.
///
/// # Errors
///
/// `UnknownOptimizer` for an unrecognized name, `InvalidConfig` for a
/// non-finite or non-positive learning rate.
pub fn optimizer_from_name(name: &str, learning_rate: f64) -> MlpResult<Box<dyn Optimizer>> {
    if !(learning_rate.is_finite() && learning_rate > 0.0) {
        return Err(MlpError::InvalidConfig(format!(
            "learning rate must be finite and > 0, got {learning_rate}"
        )));
    }
    Ok(SolverKind::from_name(name)?.create(learning_rate))
}

fn ensure_shape(buf: &mut Array2<f64>, dim: (usize, usize)) {
    if buf.dim() != dim {
        *buf = Array2::zeros(dim);
    }
}

/// Gradient descent, optionally with (Nesterov) momentum.
///
/// With `momentum = 0` this is plain SGD: `update = -lr·g`.
pub struct Sgd {
    pub learning_rate: f64,
    pub momentum: f64,
    pub nesterov: bool,
    velocity: Array2<f64>,
}

impl Sgd {
    pub fn new(learning_rate: f64) -> Self {
        Self::with_momentum(learning_rate, 0.0, false)
    }

    pub fn with_momentum(learning_rate: f64, momentum: f64, nesterov: bool) -> Self {
        Self {
            learning_rate,
            momentum,
            nesterov,
            velocity: Array2::zeros((0, 0)),
        }
    }
}

impl Optimizer for Sgd {
    fn compute_update(&mut self, update: &mut Array2<f64>, grad: &Array2<f64>) {
        let lr = self.learning_rate;
        if self.momentum == 0.0 {
            azip!((u in update, &g in grad) *u = -lr * g);
            return;
        }

        ensure_shape(&mut self.velocity, grad.dim());
        let mom = self.momentum;
        azip!((v in &mut self.velocity, &g in grad) *v = mom * *v - lr * g);
        if self.nesterov {
            azip!((u in update, &v in &self.velocity, &g in grad) *u = mom * v - lr * g);
        } else {
            update.assign(&self.velocity);
        }
    }

    fn name(&self) -> &'static str {
        if self.momentum == 0.0 {
            "sgd"
        } else {
            "agd"
        }
    }
}

/// AdaGrad: per-weight accumulated squared-gradient scaling.
pub struct AdaGrad {
    pub learning_rate: f64,
    pub epsilon: f64,
    acc: Array2<f64>,
}

impl AdaGrad {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            epsilon: 1e-8,
            acc: Array2::zeros((0, 0)),
        }
    }
}

impl Optimizer for AdaGrad {
    fn compute_update(&mut self, update: &mut Array2<f64>, grad: &Array2<f64>) {
        ensure_shape(&mut self.acc, grad.dim());
        let lr = self.learning_rate;
        let eps = self.epsilon;
        azip!((u in update, a in &mut self.acc, &g in grad) {
            *a += g * g;
            *u = -lr * g / (a.sqrt() + eps);
        });
    }

    fn name(&self) -> &'static str {
        "adagrad"
    }
}

/// RMSProp: exponentially decayed squared-gradient scaling.
pub struct RmsProp {
    pub learning_rate: f64,
    pub rho: f64,
    pub epsilon: f64,
    acc: Array2<f64>,
}

impl RmsProp {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            rho: 0.9,
            epsilon: 1e-8,
            acc: Array2::zeros((0, 0)),
        }
    }
}

impl Optimizer for RmsProp {
    fn compute_update(&mut self, update: &mut Array2<f64>, grad: &Array2<f64>) {
        ensure_shape(&mut self.acc, grad.dim());
        let lr = self.learning_rate;
        let rho = self.rho;
        let eps = self.epsilon;
        azip!((u in update, a in &mut self.acc, &g in grad) {
            *a = rho * *a + (1.0 - rho) * g * g;
            *u = -lr * g / (a.sqrt() + eps);
        });
    }

    fn name(&self) -> &'static str {
        "rmsprop"
    }
}

/// AdaDelta: RMS-scaled updates with a unit-free step size (no learning
/// rate hyperparameter).
pub struct AdaDelta {
    pub rho: f64,
    pub epsilon: f64,
    acc_grad: Array2<f64>,
    acc_update: Array2<f64>,
}

impl AdaDelta {
    pub fn new() -> Self {
        Self {
            rho: 0.95,
            epsilon: 1e-6,
            acc_grad: Array2::zeros((0, 0)),
            acc_update: Array2::zeros((0, 0)),
        }
    }
}

impl Default for AdaDelta {
    fn default() -> Self {
        Self::new()
    }
}

impl Optimizer for AdaDelta {
    fn compute_update(&mut self, update: &mut Array2<f64>, grad: &Array2<f64>) {
        ensure_shape(&mut self.acc_grad, grad.dim());
        ensure_shape(&mut self.acc_update, grad.dim());
        let rho = self.rho;
        let eps = self.epsilon;
        azip!((u in update, ag in &mut self.acc_grad, au in &mut self.acc_update, &g in grad) {
            *ag = rho * *ag + (1.0 - rho) * g * g;
            let dx = -((*au + eps).sqrt() / (*ag + eps).sqrt()) * g;
            *au = rho * *au + (1.0 - rho) * dx * dx;
            *u = dx;
        });
    }

    fn name(&self) -> &'static str {
        "adadelta"
    }
}

/// Adam: bias-corrected first/second moment estimation.
pub struct Adam {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    t: u64,
    beta1_pow: f64,
    beta2_pow: f64,
    m: Array2<f64>,
    v: Array2<f64>,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            t: 0,
            beta1_pow: 1.0,
            beta2_pow: 1.0,
            m: Array2::zeros((0, 0)),
            v: Array2::zeros((0, 0)),
        }
    }
}

impl Optimizer for Adam {
    fn compute_update(&mut self, update: &mut Array2<f64>, grad: &Array2<f64>) {
        ensure_shape(&mut self.m, grad.dim());
        ensure_shape(&mut self.v, grad.dim());

        self.t += 1;
        self.beta1_pow *= self.beta1;
        self.beta2_pow *= self.beta2;

        let lr = self.learning_rate;
        let b1 = self.beta1;
        let b2 = self.beta2;
        let eps = self.epsilon;
        let corr1 = 1.0 - self.beta1_pow;
        let corr2 = 1.0 - self.beta2_pow;

        azip!((u in update, m in &mut self.m, v in &mut self.v, &g in grad) {
            *m = b1 * *m + (1.0 - b1) * g;
            *v = b2 * *v + (1.0 - b2) * g * g;
            let m_hat = *m / corr1;
            let v_hat = *v / corr2;
            *u = -lr * m_hat / (v_hat.sqrt() + eps);
        });
    }

    fn name(&self) -> &'static str {
        "adam"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::arr2;

    #[test]
    fn plain_sgd_scales_the_gradient() {
        let mut opt = Sgd::new(0.1);
        let grad = arr2(&[[1.0, -2.0]]);
        let mut update = Array2::zeros((1, 2));
        opt.compute_update(&mut update, &grad);
        assert_abs_diff_eq!(update[[0, 0]], -0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(update[[0, 1]], 0.2, epsilon = 1e-12);
    }

    #[test]
    fn momentum_accumulates_velocity() {
        let mut opt = Sgd::with_momentum(0.1, 0.9, false);
        let grad = arr2(&[[1.0]]);
        let mut update = Array2::zeros((1, 1));

        opt.compute_update(&mut update, &grad);
        assert_abs_diff_eq!(update[[0, 0]], -0.1, epsilon = 1e-12);

        // Second step: v = 0.9·(-0.1) - 0.1 = -0.19
        opt.compute_update(&mut update, &grad);
        assert_abs_diff_eq!(update[[0, 0]], -0.19, epsilon = 1e-12);
    }

    #[test]
    fn adam_first_step_is_learning_rate_sized() {
        // With bias correction, the first step for any nonzero gradient is
        // -lr · g/|g| up to epsilon.
        let mut opt = Adam::new(0.01);
        let grad = arr2(&[[0.5]]);
        let mut update = Array2::zeros((1, 1));
        opt.compute_update(&mut update, &grad);
        assert_abs_diff_eq!(update[[0, 0]], -0.01, epsilon = 1e-6);
    }

    #[test]
    fn adagrad_shrinks_repeated_steps() {
        let mut opt = AdaGrad::new(0.1);
        let grad = arr2(&[[2.0]]);
        let mut update = Array2::zeros((1, 1));

        opt.compute_update(&mut update, &grad);
        let first = update[[0, 0]];
        opt.compute_update(&mut update, &grad);
        let second = update[[0, 0]];
        assert!(first < 0.0 && second < 0.0);
        assert!(second.abs() < first.abs());
    }

    #[test]
    fn adadelta_needs_no_learning_rate() {
        let mut opt = AdaDelta::new();
        let grad = arr2(&[[1.0]]);
        let mut update = Array2::zeros((1, 1));
        opt.compute_update(&mut update, &grad);
        assert!(update[[0, 0]] < 0.0);
        assert!(update[[0, 0]].is_finite());
    }

    #[test]
    fn state_reshapes_with_the_gradient() {
        let mut opt = Adam::new(0.01);
        let mut update = Array2::zeros((1, 1));
        opt.compute_update(&mut update, &arr2(&[[1.0]]));

        let mut update = Array2::zeros((2, 3));
        opt.compute_update(&mut update, &Array2::ones((2, 3)));
        assert_eq!(update.dim(), (2, 3));
    }

    #[test]
    fn registry_resolves_known_names() {
        for name in ["sgd", "agd", "adagrad", "rmsprop", "adadelta", "adam"] {
            assert!(SolverKind::from_name(name).is_ok());
        }
        assert!(SolverKind::from_name("lbfgs").is_err());
        assert!(optimizer_from_name("adam", 0.0).is_err());
        assert!(optimizer_from_name("adam", f64::NAN).is_err());
    }
}
