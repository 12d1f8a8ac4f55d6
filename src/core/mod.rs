//! Core MLP structures and the training driver.
//!
//! This module provides the fundamental entities and operations:
//! - [`Layer`] — one fully-connected stage: weights (bias row folded in),
//!   per-batch scratch buffers, an activation, and an attached optimizer
//! - forward propagation through the layer stack
//! - the backward recursion that reconstructs pseudo-targets for hidden
//!   layers so one loss/gradient routine serves every layer
//! - the epoch loop with paired shuffling, warm starts, and automatic
//!   shape adaptation
//!
//! ## Backward recursion
//!
//! Layers are processed output-to-input, once per epoch, after a full
//! forward pass:
//! ```text
//! output layer:   Ydiff = Ypred - Y,            Ytrue = Y
//! interior layer: Ydiff = (Ydiff⁺ × trim(Θ⁺ᵀ)) ⊙ F'(Ypred)
//!                 Ytrue = Ypred - Ydiff
//! ```
//! where `⁺` marks the next (already-processed) layer and `trim` drops the
//! bias row. Each layer's weights are then stepped in place by its
//! optimizer before the loop moves one layer down. The strict order
//! matters: a layer's `Ydiff` must be complete before the layer below
//! reads it.

use std::fmt;
use std::sync::Arc;

use ndarray::{s, Array2, ArrayView2};
use ndarray_rand::RandomExt;
use rand::distributions::Uniform;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::activation::{activation_from_name, Activation, Logistic};
use crate::error::{MlpError, MlpResult};
use crate::loss::{loss_from_name, Loss};
use crate::matrix::{
    mat_mul_into, mul_elem_assign, sub_into, Applied, BiasTrimmedT, MatrixRef, OnesAdded,
};
use crate::optim::{Optimizer, SolverKind};

/// Epoch count used when the caller leaves `epochs` unset.
pub const DEFAULT_EPOCHS: usize = 100;

/// Per-layer optimizer factory.
pub type OptimCreator = Box<dyn Fn() -> Box<dyn Optimizer> + Send + Sync>;

/// One fully-connected stage of the network.
///
/// `theta` has shape `(1 + inputs, outputs)`; row 0 holds the bias
/// weights, so a multiply against the bias-augmented input covers the
/// affine transform in one pass. The batch buffers (`ytrue`, `ypred`,
/// `ydiff`) and the gradient buffers (`grad`, `update`) are allocated
/// lazily on first use and reallocated only when the batch size or the
/// layer shape changes.
pub struct Layer {
    pub theta: Array2<f64>,
    pub ytrue: Array2<f64>,
    pub ypred: Array2<f64>,
    pub ydiff: Array2<f64>,
    pub grad: Array2<f64>,
    pub update: Array2<f64>,
    pub activation: Arc<dyn Activation>,
    pub optimizer: Box<dyn Optimizer>,
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layer")
            .field("inputs", &self.inputs())
            .field("outputs", &self.outputs())
            .field("activation", &self.activation.name())
            .field("optimizer", &self.optimizer.name())
            .finish()
    }
}

impl Layer {
    /// Create a layer with small-magnitude uniform random weights in
    /// `[0, 0.01)`.
    pub fn new<R: Rng + ?Sized>(
        inputs: usize,
        outputs: usize,
        activation: Arc<dyn Activation>,
        optimizer: Box<dyn Optimizer>,
        rng: &mut R,
    ) -> Self {
        let theta = Array2::random_using((1 + inputs, outputs), Uniform::new(0.0, 0.01), rng);
        Self {
            theta,
            ytrue: Array2::zeros((0, 0)),
            ypred: Array2::zeros((0, 0)),
            ydiff: Array2::zeros((0, 0)),
            grad: Array2::zeros((0, 0)),
            update: Array2::zeros((0, 0)),
            activation,
            optimizer,
        }
    }

    /// Input width, excluding the bias row.
    #[inline]
    pub fn inputs(&self) -> usize {
        self.theta.nrows() - 1
    }

    /// Output width.
    #[inline]
    pub fn outputs(&self) -> usize {
        self.theta.ncols()
    }

    /// Size the scratch buffers for a batch of `samples` rows.
    ///
    /// A no-op while shapes are unchanged, so repeated passes with the
    /// same batch size never allocate.
    pub fn ensure_batch(&mut self, samples: usize) {
        let outputs = self.outputs();
        if self.ypred.dim() != (samples, outputs) {
            self.ypred = Array2::zeros((samples, outputs));
            self.ytrue = Array2::zeros((samples, outputs));
            self.ydiff = Array2::zeros((samples, outputs));
        }
        let grad_dim = (self.theta.nrows(), outputs);
        if self.grad.dim() != grad_dim {
            self.grad = Array2::zeros(grad_dim);
            self.update = Array2::zeros(grad_dim);
        }
    }
}

/// Multilayer perceptron driver.
///
/// Owns the ordered layer stack and the training configuration, and runs
/// the epoch loop: shuffle, forward pass low-to-high, backward pass
/// high-to-low with in-place optimizer updates.
///
/// Configuration fields are public and may be adjusted between fits; the
/// strategy objects (activation, loss, solver) are resolved from their
/// registries at construction, so unknown names fail before any epoch
/// runs.
pub struct Mlp {
    /// Widths of the hidden layers, input-to-output. The output layer is
    /// appended automatically, sized to the target matrix.
    pub hidden_layer_sizes: Vec<usize>,
    /// Activation for hidden layers (and the output layer, unless the
    /// loss forces a logistic output).
    pub activation: Arc<dyn Activation>,
    /// Loss strategy driving every layer's gradient.
    pub loss: Box<dyn Loss>,
    /// Named solver used when creating layer optimizers.
    pub solver: SolverKind,
    /// Learning rate handed to named solvers.
    pub learning_rate: f64,
    /// Regularization weight (0 disables regularization).
    pub alpha: f64,
    /// L1 share of the elastic-net penalty, in `[0, 1]`.
    pub l1_ratio: f64,
    /// Number of epochs per fit call; 0 means [`DEFAULT_EPOCHS`].
    pub epochs: usize,
    /// Rows per mini-batch; 0 means full-batch epochs.
    pub batch_size: usize,
    /// Shuffle samples (a correlated row permutation of inputs and
    /// targets) before each epoch.
    pub shuffle: bool,
    /// Continue training existing layers on the next fit call instead of
    /// reinitializing them.
    pub warm_start: bool,
    /// RNG seed for weight init and shuffling; `None` draws from entropy.
    pub seed: Option<u64>,

    /// The layer stack, input-to-output.
    pub layers: Vec<Layer>,
    /// Output-layer loss of the most recent epoch.
    pub final_loss: f64,
    /// Output-layer loss of the first epoch of the most recent fit call,
    /// kept for convergence diagnostics.
    pub initial_loss: f64,
    /// Number of layers replaced by shape adaptation over this network's
    /// lifetime. A nonzero value means learned weights were discarded.
    pub adapted_layers: usize,

    custom_optimizer: Option<OptimCreator>,
}

impl fmt::Debug for Mlp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mlp")
            .field("hidden_layer_sizes", &self.hidden_layer_sizes)
            .field("activation", &self.activation.name())
            .field("loss", &self.loss.name())
            .field("solver", &self.solver.as_str())
            .field("layers", &self.layers)
            .field("final_loss", &self.final_loss)
            .finish()
    }
}

impl Mlp {
    /// Create a regressor with the `square` loss.
    ///
    /// Empty `activation`/`solver` names select the defaults (`relu`,
    /// `adam`). `alpha` is the regularization weight.
    ///
    /// # Errors
    ///
    /// Configuration errors for unknown registry names.
    pub fn regressor(
        hidden_layer_sizes: Vec<usize>,
        activation: &str,
        solver: &str,
        alpha: f64,
    ) -> MlpResult<Self> {
        let activation = if activation.is_empty() { "relu" } else { activation };
        let solver = if solver.is_empty() { "adam" } else { solver };
        Ok(Self {
            hidden_layer_sizes,
            activation: activation_from_name(activation)?,
            loss: loss_from_name("square")?,
            solver: SolverKind::from_name(solver)?,
            learning_rate: 1e-3,
            alpha,
            l1_ratio: 0.0,
            epochs: 0,
            batch_size: 0,
            shuffle: true,
            warm_start: false,
            seed: None,
            layers: Vec::new(),
            final_loss: f64::INFINITY,
            initial_loss: f64::INFINITY,
            adapted_layers: 0,
            custom_optimizer: None,
        })
    }

    /// Create a classifier: same defaults as [`Mlp::regressor`] but with
    /// the `log` loss, which also forces a logistic output layer.
    pub fn classifier(
        hidden_layer_sizes: Vec<usize>,
        activation: &str,
        solver: &str,
        alpha: f64,
    ) -> MlpResult<Self> {
        let mut mlp = Self::regressor(hidden_layer_sizes, activation, solver, alpha)?;
        mlp.loss = loss_from_name("log")?;
        Ok(mlp)
    }

    /// Replace the loss strategy by registry name.
    pub fn set_loss(&mut self, name: &str) -> MlpResult<()> {
        self.loss = loss_from_name(name)?;
        Ok(())
    }

    /// Replace the optimizer factory; with `change_layers`, existing
    /// layers get fresh instances immediately (their accumulated
    /// optimizer state is dropped).
    pub fn set_optimizer<F>(&mut self, factory: F, change_layers: bool)
    where
        F: Fn() -> Box<dyn Optimizer> + Send + Sync + 'static,
    {
        let factory: OptimCreator = Box::new(factory);
        if change_layers {
            for layer in &mut self.layers {
                layer.optimizer = factory();
            }
        }
        self.custom_optimizer = Some(factory);
    }

    fn make_optimizer(&self) -> Box<dyn Optimizer> {
        match &self.custom_optimizer {
            Some(factory) => factory(),
            None => self.solver.create(self.learning_rate),
        }
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    /// Build the layer stack for the given data widths: the configured
    /// hidden widths plus one output layer. Any existing layers are
    /// discarded.
    ///
    /// Called implicitly by [`Mlp::fit`]; exposed for callers that set up
    /// weights by hand before training.
    pub fn initialize(&mut self, n_features: usize, n_outputs: usize) {
        let mut rng = self.rng();
        self.build_layers(n_features, n_outputs, &mut rng);
    }

    fn build_layers<R: Rng + ?Sized>(&mut self, n_features: usize, n_outputs: usize, rng: &mut R) {
        let hidden = self.hidden_layer_sizes.clone();
        self.layers.clear();

        let mut prev = n_features;
        for width in hidden {
            let optimizer = self.make_optimizer();
            self.layers
                .push(Layer::new(prev, width, self.activation.clone(), optimizer, rng));
            prev = width;
        }

        // A probabilistic loss expects probabilities out of the network,
        // whatever the interior layers run.
        let out_activation: Arc<dyn Activation> = match self.loss.name() {
            "log" | "cross-entropy" => Arc::new(Logistic),
            _ => self.activation.clone(),
        };
        let optimizer = self.make_optimizer();
        self.layers
            .push(Layer::new(prev, n_outputs, out_activation, optimizer, rng));
    }

    /// Replace boundary layers whose shape disagrees with the incoming
    /// data. The replacement starts from fresh random weights; whatever
    /// the old layer had learned is gone, hence the warning.
    fn adapt_shapes<R: Rng + ?Sized>(&mut self, n_features: usize, n_outputs: usize, rng: &mut R) {
        if self.layers[0].inputs() != n_features {
            eprintln!(
                "mlp: input width changed from {} to {n_features}; \
                 reinitializing first layer (learned weights discarded)",
                self.layers[0].inputs()
            );
            let outputs = self.layers[0].outputs();
            let activation = self.layers[0].activation.clone();
            let optimizer = self.make_optimizer();
            self.layers[0] = Layer::new(n_features, outputs, activation, optimizer, rng);
            self.adapted_layers += 1;
        }

        let out = self.layers.len() - 1;
        if self.layers[out].outputs() != n_outputs {
            eprintln!(
                "mlp: target width changed from {} to {n_outputs}; \
                 reinitializing output layer (learned weights discarded)",
                self.layers[out].outputs()
            );
            let inputs = self.layers[out].inputs();
            let activation = self.layers[out].activation.clone();
            let optimizer = self.make_optimizer();
            self.layers[out] = Layer::new(inputs, n_outputs, activation, optimizer, rng);
            self.adapted_layers += 1;
        }
    }

    /// Train on `x` (samples × features) against `y` (samples × outputs).
    ///
    /// First call (or any call with `warm_start` off) builds the layer
    /// stack from scratch; with `warm_start` on, training continues from
    /// the existing weights, and a boundary layer whose shape disagrees
    /// with the data is replaced rather than reported as an error.
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` if `x` and `y` disagree on row count,
    /// `InvalidConfig` for unusable hyperparameters, `NonFinite` if a
    /// pass diverges (the fit call aborts; weights keep whatever state
    /// the last completed step left).
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array2<f64>) -> MlpResult<()> {
        let (n_samples, n_features) = x.dim();
        let (y_rows, n_outputs) = y.dim();
        if n_samples != y_rows {
            return Err(MlpError::ShapeMismatch(format!(
                "x has {n_samples} rows, y has {y_rows}"
            )));
        }
        if n_samples == 0 || n_features == 0 || n_outputs == 0 {
            return Err(MlpError::InvalidConfig(
                "x and y must be non-empty".to_string(),
            ));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(MlpError::InvalidConfig(format!(
                "learning rate must be finite and > 0, got {}",
                self.learning_rate
            )));
        }
        if !(0.0..=1.0).contains(&self.l1_ratio) {
            return Err(MlpError::InvalidConfig(format!(
                "l1_ratio must be in [0, 1], got {}",
                self.l1_ratio
            )));
        }

        let mut rng = self.rng();
        if !self.warm_start || self.layers.is_empty() {
            self.build_layers(n_features, n_outputs, &mut rng);
        } else {
            self.adapt_shapes(n_features, n_outputs, &mut rng);
        }

        // Working copies so per-epoch shuffling never mutates caller data.
        let mut xw = x.to_owned();
        let mut yw = y.to_owned();

        let epochs = if self.epochs == 0 { DEFAULT_EPOCHS } else { self.epochs };
        let batch = if self.batch_size == 0 || self.batch_size > n_samples {
            n_samples
        } else {
            self.batch_size
        };

        for epoch in 0..epochs {
            if self.shuffle {
                shuffle_rows(&mut xw, &mut yw, &mut rng);
            }

            let mut epoch_loss = 0.0;
            let mut n_batches = 0usize;
            let mut start = 0;
            while start < n_samples {
                let end = usize::min(start + batch, n_samples);
                let xb = xw.slice(s![start..end, ..]);
                let yb = yw.slice(s![start..end, ..]);

                forward_layers(&mut self.layers, &xb)?;
                let j = backward_layers(
                    &mut self.layers,
                    &*self.loss,
                    &xb,
                    &yb,
                    self.alpha,
                    self.l1_ratio,
                )?;

                epoch_loss += j;
                n_batches += 1;
                start = end;
            }

            self.final_loss = epoch_loss / n_batches as f64;
            if epoch == 0 {
                self.initial_loss = self.final_loss;
            }
        }
        Ok(())
    }

    /// Forward pass: returns the output layer's predictions for `x`.
    ///
    /// Prediction alone mutates nothing but the scratch buffers; repeated
    /// calls with the same input and weights produce identical output.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` before the network has layers, `ShapeMismatch` if
    /// `x` is the wrong width, `NonFinite` on numerical divergence.
    pub fn predict(&mut self, x: &Array2<f64>) -> MlpResult<Array2<f64>> {
        if self.layers.is_empty() {
            return Err(MlpError::InvalidConfig(
                "network has no layers; call fit or initialize first".to_string(),
            ));
        }
        forward_layers(&mut self.layers, x)?;
        Ok(self
            .layers
            .last()
            .expect("network must have at least one layer")
            .ypred
            .clone())
    }

    /// Output width of the network, once initialized.
    pub fn output_dim(&self) -> Option<usize> {
        self.layers.last().map(Layer::outputs)
    }
}

/// Forward propagation over the layer stack.
///
/// Layer 0 reads the external input; layer l > 0 reads layer l-1's
/// prediction buffer. Each step computes
/// `ypred = F(OnesAdded(input) × theta)`, applying the activation as each
/// element is written, and fails on the first non-finite value.
fn forward_layers(layers: &mut [Layer], input: &dyn MatrixRef) -> MlpResult<()> {
    for l in 0..layers.len() {
        let (head, tail) = layers.split_at_mut(l);
        let layer = &mut tail[0];
        let xl: &dyn MatrixRef = if l == 0 { input } else { &head[l - 1].ypred };

        if xl.cols() != layer.inputs() {
            return Err(MlpError::ShapeMismatch(format!(
                "layer {l} expects {} inputs, got {}",
                layer.inputs(),
                xl.cols()
            )));
        }

        layer.ensure_batch(xl.rows());
        mat_mul_into(&mut layer.ypred, &OnesAdded(xl), &layer.theta);

        let activation = &layer.activation;
        for v in layer.ypred.iter_mut() {
            let a = activation.f(*v);
            if !a.is_finite() {
                return Err(MlpError::NonFinite { layer: l });
            }
            *v = a;
        }
    }
    Ok(())
}

/// Backward propagation and in-place weight updates, output layer first.
///
/// Returns the output layer's loss. The processing order is mandatory:
/// each interior layer consumes the diff its successor computed earlier
/// in this same call.
fn backward_layers(
    layers: &mut [Layer],
    loss: &dyn Loss,
    input: &dyn MatrixRef,
    y: &ArrayView2<'_, f64>,
    alpha: f64,
    l1_ratio: f64,
) -> MlpResult<f64> {
    let out = layers.len() - 1;
    let n_samples = y.nrows();
    let mut j_out = 0.0;

    for l in (0..layers.len()).rev() {
        let (head, tail) = layers.split_at_mut(l + 1);
        let (head, cur) = head.split_at_mut(l);
        let layer = &mut cur[0];

        if l == out {
            layer.ytrue.assign(y);
            sub_into(&mut layer.ydiff, &layer.ypred, &layer.ytrue);
        } else {
            // Pseudo-targets for a layer without labels: project the next
            // layer's diff back through its weights (bias row dropped),
            // gate by the local activation slope, and subtract.
            let next = &tail[0];
            mat_mul_into(&mut layer.ydiff, &next.ydiff, &BiasTrimmedT(&next.theta));
            let activation = &layer.activation;
            mul_elem_assign(
                &mut layer.ydiff,
                &Applied::new(&layer.ypred, |yv| activation.f_prime(yv)),
            );
            sub_into(&mut layer.ytrue, &layer.ypred, &layer.ydiff);
        }

        if !layer.ydiff.iter().all(|v| v.is_finite()) {
            return Err(MlpError::NonFinite { layer: l });
        }

        let xl: &dyn MatrixRef = if l == 0 { input } else { &head[l - 1].ypred };
        let j = loss.compute(
            &layer.ytrue,
            &OnesAdded(xl),
            &layer.theta,
            &layer.ypred,
            &mut layer.ydiff,
            &mut layer.grad,
            alpha,
            l1_ratio,
            n_samples,
            &*layer.activation,
        );
        if !j.is_finite() {
            return Err(MlpError::NonFinite { layer: l });
        }

        layer.optimizer.compute_update(&mut layer.update, &layer.grad);
        layer.theta += &layer.update;

        if l == out {
            j_out = j;
        }
    }
    Ok(j_out)
}

/// Correlated Fisher-Yates row permutation of `x` and `y`.
fn shuffle_rows<R: Rng + ?Sized>(x: &mut Array2<f64>, y: &mut Array2<f64>, rng: &mut R) {
    let n = x.nrows();
    for i in (1..n).rev() {
        let j = rng.gen_range(0..=i);
        if i != j {
            for c in 0..x.ncols() {
                x.swap([i, c], [j, c]);
            }
            for c in 0..y.ncols() {
                y.swap([i, c], [j, c]);
            }
        }
    }
}
