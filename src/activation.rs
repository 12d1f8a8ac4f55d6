//! Activation strategies.
//!
//! An activation is a stateless pair of scalar functions: the forward map
//! `f` and its derivative `f_prime`. The derivative is expressed in terms
//! of the FORWARD OUTPUT `y = f(x)`, not the raw input: the backward
//! recursion only keeps predictions around, so derivatives must be
//! recoverable from them.

use std::sync::Arc;

use crate::error::{MlpError, MlpResult};

/// Activation function pair for a layer.
pub trait Activation: Send + Sync {
    /// Forward map `f(x)`.
    fn f(&self, x: f64) -> f64;

    /// Derivative at `x`, expressed via the forward output `y = f(x)`.
    fn f_prime(&self, y: f64) -> f64;

    /// Registry name, also used by checkpoints to reconstruct the strategy.
    fn name(&self) -> &'static str;
}

/// Identity: f(x) = x, f'(y) = 1.
#[derive(Debug, Clone, Copy)]
pub struct Identity;

impl Activation for Identity {
    #[inline]
    fn f(&self, x: f64) -> f64 {
        x
    }

    #[inline]
    fn f_prime(&self, _y: f64) -> f64 {
        1.0
    }

    fn name(&self) -> &'static str {
        "identity"
    }
}

/// Logistic sigmoid: f(x) = 1 / (1 + e^(-x)), f'(y) = y * (1 - y).
#[derive(Debug, Clone, Copy)]
pub struct Logistic;

impl Activation for Logistic {
    #[inline]
    fn f(&self, x: f64) -> f64 {
        // Split on sign so the exponential never overflows.
        if x >= 0.0 {
            let z = (-x).exp();
            1.0 / (1.0 + z)
        } else {
            let z = x.exp();
            z / (1.0 + z)
        }
    }

    #[inline]
    fn f_prime(&self, y: f64) -> f64 {
        y * (1.0 - y)
    }

    fn name(&self) -> &'static str {
        "logistic"
    }
}

/// Hyperbolic tangent: f(x) = tanh(x), f'(y) = 1 - y².
#[derive(Debug, Clone, Copy)]
pub struct Tanh;

impl Activation for Tanh {
    #[inline]
    fn f(&self, x: f64) -> f64 {
        x.tanh()
    }

    #[inline]
    fn f_prime(&self, y: f64) -> f64 {
        1.0 - y * y
    }

    fn name(&self) -> &'static str {
        "tanh"
    }
}

/// Rectified linear unit: f(x) = max(0, x), f'(y) = 1 if y > 0 else 0.
#[derive(Debug, Clone, Copy)]
pub struct Relu;

impl Activation for Relu {
    #[inline]
    fn f(&self, x: f64) -> f64 {
        if x > 0.0 {
            x
        } else {
            0.0
        }
    }

    #[inline]
    fn f_prime(&self, y: f64) -> f64 {
        if y > 0.0 {
            1.0
        } else {
            0.0
        }
    }

    fn name(&self) -> &'static str {
        "relu"
    }
}

/// Look up an activation by registry name.
///
/// Activations are stateless and shared across layers via `Arc`.
///
/// # Errors
///
/// `UnknownActivation` for a name not in the registry.
pub fn activation_from_name(name: &str) -> MlpResult<Arc<dyn Activation>> {
    match name {
        "identity" => Ok(Arc::new(Identity)),
        "logistic" | "sigmoid" => Ok(Arc::new(Logistic)),
        "tanh" => Ok(Arc::new(Tanh)),
        "relu" => Ok(Arc::new(Relu)),
        _ => Err(MlpError::UnknownActivation(name.to_string())),
    }
}
