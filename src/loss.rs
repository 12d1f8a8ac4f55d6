//! Loss strategies.
//!
//! A loss is a single compute function invoked once per layer during the
//! backward pass. It receives the layer's targets (true labels at the
//! output layer, reconstructed pseudo-targets everywhere else), the
//! bias-augmented layer input, the weights, and the prediction buffer. It
//! refreshes `ydiff = ypred - ytrue`, fills `grad`, and returns the scalar
//! loss. Regularization (an elastic-net mix of L1 and L2 weight decay) is
//! applied here, not by the driver, and never touches the bias row.

use ndarray::Array2;

use crate::activation::Activation;
use crate::error::{MlpError, MlpResult};
use crate::matrix::{mat_mul_into, sub_into, MatrixRef, TransposedRef};

/// Probabilities are kept this far away from 0 and 1 before taking logs.
const LOG_EPS: f64 = 1e-10;

/// Loss/regularization strategy.
///
/// The gradient of every variant here is `Xᵀ·ydiff / m` plus the penalty
/// gradient; the layer's activation is passed through for variants whose
/// gradient depends on the output nonlinearity.
pub trait Loss: Send + Sync {
    /// Compute the scalar loss and fill `grad`.
    ///
    /// `x` is the bias-augmented layer input, shape `(m, 1 + inputs)`;
    /// `theta` and `grad` have shape `(1 + inputs, outputs)`; `ytrue`,
    /// `ypred`, and `ydiff` have shape `(m, outputs)`. `n_samples` is the
    /// row count the loss and gradient are averaged over.
    #[allow(clippy::too_many_arguments)]
    fn compute(
        &self,
        ytrue: &Array2<f64>,
        x: &dyn MatrixRef,
        theta: &Array2<f64>,
        ypred: &Array2<f64>,
        ydiff: &mut Array2<f64>,
        grad: &mut Array2<f64>,
        alpha: f64,
        l1_ratio: f64,
        n_samples: usize,
        activation: &dyn Activation,
    ) -> f64;

    /// Registry name, also used by checkpoints to reconstruct the strategy.
    fn name(&self) -> &'static str;
}

/// Squared error: J = Σ ydiff² / (2m).
#[derive(Debug, Clone, Copy)]
pub struct SquareLoss;

impl Loss for SquareLoss {
    fn compute(
        &self,
        ytrue: &Array2<f64>,
        x: &dyn MatrixRef,
        theta: &Array2<f64>,
        ypred: &Array2<f64>,
        ydiff: &mut Array2<f64>,
        grad: &mut Array2<f64>,
        alpha: f64,
        l1_ratio: f64,
        n_samples: usize,
        _activation: &dyn Activation,
    ) -> f64 {
        sub_into(ydiff, ypred, ytrue);

        let m = n_samples as f64;
        let mut j = 0.0;
        for &d in ydiff.iter() {
            j += d * d;
        }
        j /= 2.0 * m;

        fill_grad(grad, x, ydiff, m);
        j + elastic_net(grad, theta, alpha, l1_ratio, m)
    }

    fn name(&self) -> &'static str {
        "square"
    }
}

/// Binomial log loss: J = Σ [-y·ln(p) - (1-y)·ln(1-p)] / m.
///
/// Expects predictions in (0, 1), i.e. a logistic output layer.
#[derive(Debug, Clone, Copy)]
pub struct LogLoss;

impl Loss for LogLoss {
    fn compute(
        &self,
        ytrue: &Array2<f64>,
        x: &dyn MatrixRef,
        theta: &Array2<f64>,
        ypred: &Array2<f64>,
        ydiff: &mut Array2<f64>,
        grad: &mut Array2<f64>,
        alpha: f64,
        l1_ratio: f64,
        n_samples: usize,
        _activation: &dyn Activation,
    ) -> f64 {
        sub_into(ydiff, ypred, ytrue);

        let m = n_samples as f64;
        let mut j = 0.0;
        for (&y, &p) in ytrue.iter().zip(ypred.iter()) {
            let p = p.clamp(LOG_EPS, 1.0 - LOG_EPS);
            j += -y * p.ln() - (1.0 - y) * (1.0 - p).ln();
        }
        j /= m;

        fill_grad(grad, x, ydiff, m);
        j + elastic_net(grad, theta, alpha, l1_ratio, m)
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Multinomial cross-entropy: J = Σ [-y·ln(p)] / m.
#[derive(Debug, Clone, Copy)]
pub struct CrossEntropyLoss;

impl Loss for CrossEntropyLoss {
    fn compute(
        &self,
        ytrue: &Array2<f64>,
        x: &dyn MatrixRef,
        theta: &Array2<f64>,
        ypred: &Array2<f64>,
        ydiff: &mut Array2<f64>,
        grad: &mut Array2<f64>,
        alpha: f64,
        l1_ratio: f64,
        n_samples: usize,
        _activation: &dyn Activation,
    ) -> f64 {
        sub_into(ydiff, ypred, ytrue);

        let m = n_samples as f64;
        let mut j = 0.0;
        for (&y, &p) in ytrue.iter().zip(ypred.iter()) {
            if y != 0.0 {
                let p = p.clamp(LOG_EPS, 1.0 - LOG_EPS);
                j -= y * p.ln();
            }
        }
        j /= m;

        fill_grad(grad, x, ydiff, m);
        j + elastic_net(grad, theta, alpha, l1_ratio, m)
    }

    fn name(&self) -> &'static str {
        "cross-entropy"
    }
}

/// `grad = Xᵀ·ydiff / m`.
fn fill_grad(grad: &mut Array2<f64>, x: &dyn MatrixRef, ydiff: &Array2<f64>, m: f64) {
    mat_mul_into(grad, &TransposedRef(x), ydiff);
    let inv_m = 1.0 / m;
    grad.mapv_inplace(|g| g * inv_m);
}

/// Add the elastic-net penalty gradient to `grad` and return the penalty
/// term for the loss. The bias row (row 0) carries no penalty.
fn elastic_net(grad: &mut Array2<f64>, theta: &Array2<f64>, alpha: f64, l1_ratio: f64, m: f64) -> f64 {
    if alpha <= 0.0 {
        return 0.0;
    }

    let mut l1 = 0.0;
    let mut l2 = 0.0;
    for j in 1..theta.nrows() {
        for o in 0..theta.ncols() {
            let w = theta[[j, o]];
            l1 += w.abs();
            l2 += w * w;
            grad[[j, o]] += alpha * (l1_ratio * w.signum() + (1.0 - l1_ratio) * w) / m;
        }
    }
    alpha * (l1_ratio * l1 + (1.0 - l1_ratio) * l2 / 2.0) / m
}

/// Look up a loss by registry name.
///
/// # Errors
///
/// `UnknownLoss` for a name not in the registry.
pub fn loss_from_name(name: &str) -> MlpResult<Box<dyn Loss>> {
    match name {
        "square" => Ok(Box::new(SquareLoss)),
        "log" => Ok(Box::new(LogLoss)),
        "cross-entropy" => Ok(Box::new(CrossEntropyLoss)),
        _ => Err(MlpError::UnknownLoss(name.to_string())),
    }
}
