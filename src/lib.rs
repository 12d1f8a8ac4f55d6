//! # mlp
//!
//! A from-scratch multilayer perceptron trainer.
//!
//! ## Overview
//!
//! Given a matrix of input samples and a matrix of targets, [`Mlp`]
//! builds a stack of fully-connected [`Layer`]s, runs forward propagation
//! to produce predictions, backpropagates a configurable loss to get
//! per-layer gradients, and applies a pluggable optimization rule to each
//! layer's weights, iterating for a fixed number of epochs.
//!
//! Activation, loss, and optimizer are strategy objects selected by name
//! from small registries, so the driver never changes when a variant is
//! added. The passes run over lazy matrix views (bias augmentation,
//! elementwise mapping, bias-trimmed transpose) instead of materialized
//! temporaries, and every layer owns fixed-shape scratch buffers that are
//! reallocated only when the batch size or layer shape changes; after
//! warmup, an epoch allocates nothing.
//!
//! ## Structure
//!
//! - [`core`] — the [`Layer`] entity and the [`Mlp`] driver
//! - [`matrix`] — matrix capability surface and the lazy views
//! - [`activation`] / [`loss`] / [`optim`] — the strategy registries
//! - [`checkpoint`] — JSON save/load of trained parameters
//!
//! ## Quick start
//!
//! ```no_run
//! use ndarray::arr2;
//!
//! # fn main() -> mlp::MlpResult<()> {
//! let x = arr2(&[[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]]);
//! let y = arr2(&[[0.0], [1.0], [1.0], [0.0]]);
//!
//! let mut net = mlp::Mlp::classifier(vec![8], "tanh", "adam", 1e-4)?;
//! net.learning_rate = 0.05;
//! net.epochs = 500;
//! net.seed = Some(0);
//! net.fit(&x, &y)?;
//!
//! let probabilities = net.predict(&x)?;
//! # let _ = probabilities;
//! # Ok(())
//! # }
//! ```

pub mod activation;
pub mod checkpoint;
pub mod core;
pub mod error;
pub mod loss;
pub mod matrix;
pub mod optim;

pub use crate::activation::{activation_from_name, Activation};
pub use crate::checkpoint::{export, load_checkpoint, save_checkpoint, CheckpointData};
pub use crate::core::{Layer, Mlp, OptimCreator, DEFAULT_EPOCHS};
pub use crate::error::{MlpError, MlpResult};
pub use crate::loss::{loss_from_name, Loss};
pub use crate::matrix::MatrixRef;
pub use crate::optim::{optimizer_from_name, Optimizer, SolverKind};
