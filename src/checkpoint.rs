//! Checkpoint save/load for trained networks.
//!
//! Serializes per-layer weights (bias row included) plus the
//! configuration needed to rebuild layer shapes to JSON. Strategy objects
//! (`Arc<dyn Activation>`, `Box<dyn Loss>`) cannot be serialized
//! directly, so their registry names are stored and the strategies are
//! reconstructed on load. Optimizer state (momentum, moment estimates) is
//! not part of a checkpoint; a reloaded network resumes with fresh
//! optimizer instances.

use std::path::Path;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::activation::activation_from_name;
use crate::core::{Layer, Mlp};
use crate::error::{MlpError, MlpResult};

/// Serializable snapshot of a network's parameters and configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointData {
    /// Hidden layer widths, input-to-output.
    pub hidden_layer_sizes: Vec<usize>,
    /// Network-wide activation name.
    pub activation_name: String,
    /// Named solver used for layer optimizers.
    pub solver_name: String,
    /// Loss name.
    pub loss_name: String,
    /// Regularization weight.
    pub alpha: f64,
    /// L1 share of the elastic-net penalty.
    pub l1_ratio: f64,
    /// Learning rate for reconstructed optimizers.
    pub learning_rate: f64,
    /// Per-layer activation names (the output layer's may differ from
    /// `activation_name` when the loss forces a logistic output).
    pub layer_activations: Vec<String>,
    /// Per-layer weight matrices as nested rows, shape
    /// `(1 + inputs, outputs)` each; row 0 is the bias row.
    pub weights: Vec<Vec<Vec<f64>>>,
}

fn array2_to_vecs(arr: &Array2<f64>) -> Vec<Vec<f64>> {
    arr.rows().into_iter().map(|row| row.to_vec()).collect()
}

fn vecs_to_array2(vecs: &[Vec<f64>]) -> MlpResult<Array2<f64>> {
    let nrows = vecs.len();
    let ncols = vecs.first().map_or(0, Vec::len);
    if nrows < 2 || ncols == 0 {
        return Err(MlpError::ShapeMismatch(
            "stored weight matrix must have a bias row, at least one input row, \
             and at least one column"
                .to_string(),
        ));
    }
    let mut flat = Vec::with_capacity(nrows * ncols);
    for row in vecs {
        if row.len() != ncols {
            return Err(MlpError::ShapeMismatch(format!(
                "stored weight matrix is ragged: expected {ncols} columns, found {}",
                row.len()
            )));
        }
        flat.extend_from_slice(row);
    }
    Array2::from_shape_vec((nrows, ncols), flat)
        .map_err(|e| MlpError::ShapeMismatch(format!("stored weight matrix: {e}")))
}

/// Snapshot a network's parameters and configuration.
pub fn export(mlp: &Mlp) -> CheckpointData {
    CheckpointData {
        hidden_layer_sizes: mlp.hidden_layer_sizes.clone(),
        activation_name: mlp.activation.name().to_string(),
        solver_name: mlp.solver.as_str().to_string(),
        loss_name: mlp.loss.name().to_string(),
        alpha: mlp.alpha,
        l1_ratio: mlp.l1_ratio,
        learning_rate: mlp.learning_rate,
        layer_activations: mlp
            .layers
            .iter()
            .map(|l| l.activation.name().to_string())
            .collect(),
        weights: mlp.layers.iter().map(|l| array2_to_vecs(&l.theta)).collect(),
    }
}

impl CheckpointData {
    /// Rebuild a network from this snapshot.
    ///
    /// The reconstructed network reproduces the exporter's predictions
    /// exactly: layer shapes come from the stored weight matrices, not
    /// from re-randomized initialization.
    ///
    /// # Errors
    ///
    /// Configuration errors for unknown stored strategy names,
    /// `ShapeMismatch` for ragged or empty weight matrices.
    pub fn to_mlp(&self) -> MlpResult<Mlp> {
        if self.weights.len() != self.layer_activations.len() {
            return Err(MlpError::ShapeMismatch(format!(
                "{} weight matrices but {} layer activations",
                self.weights.len(),
                self.layer_activations.len()
            )));
        }
        if self.weights.is_empty() {
            return Err(MlpError::ShapeMismatch(
                "checkpoint holds no layers".to_string(),
            ));
        }

        let mut mlp = Mlp::regressor(
            self.hidden_layer_sizes.clone(),
            &self.activation_name,
            &self.solver_name,
            self.alpha,
        )?;
        mlp.set_loss(&self.loss_name)?;
        mlp.l1_ratio = self.l1_ratio;
        mlp.learning_rate = self.learning_rate;

        let mut layers = Vec::with_capacity(self.weights.len());
        for (rows, name) in self.weights.iter().zip(&self.layer_activations) {
            let theta = vecs_to_array2(rows)?;
            layers.push(Layer {
                theta,
                ytrue: Array2::zeros((0, 0)),
                ypred: Array2::zeros((0, 0)),
                ydiff: Array2::zeros((0, 0)),
                grad: Array2::zeros((0, 0)),
                update: Array2::zeros((0, 0)),
                activation: activation_from_name(name)?,
                optimizer: mlp.solver.create(mlp.learning_rate),
            });
        }
        // Layer chain invariant: each layer feeds the next, bias row aside.
        for w in layers.windows(2) {
            if w[0].outputs() != w[1].inputs() {
                return Err(MlpError::ShapeMismatch(format!(
                    "stored layers do not chain: {} outputs feed a layer expecting {} inputs",
                    w[0].outputs(),
                    w[1].inputs()
                )));
            }
        }
        mlp.layers = layers;
        Ok(mlp)
    }
}

/// Save a checkpoint to a JSON file, creating parent directories as
/// needed.
///
/// # Errors
///
/// I/O or serialization failures.
pub fn save_checkpoint(mlp: &Mlp, path: &Path) -> MlpResult<()> {
    let json = serde_json::to_string_pretty(&export(mlp))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, json)?;
    Ok(())
}

/// Load a network from a JSON checkpoint file.
///
/// # Errors
///
/// I/O, parse, or reconstruction failures.
pub fn load_checkpoint(path: &Path) -> MlpResult<Mlp> {
    let json = std::fs::read_to_string(path)?;
    let data: CheckpointData = serde_json::from_str(&json)?;
    data.to_mlp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    fn trained_mlp() -> Mlp {
        let x = arr2(&[
            [0.0, 0.0],
            [0.0, 1.0],
            [1.0, 0.0],
            [1.0, 1.0],
        ]);
        let y = arr2(&[[0.0], [1.0], [1.0], [0.0]]);
        let mut mlp = Mlp::classifier(vec![3], "tanh", "adam", 0.0).unwrap();
        mlp.seed = Some(11);
        mlp.epochs = 5;
        mlp.learning_rate = 0.05;
        mlp.fit(&x, &y).expect("fit");
        mlp
    }

    #[test]
    fn in_memory_round_trip_reproduces_predictions() {
        let mut mlp = trained_mlp();
        let x = arr2(&[[0.3, 0.7], [0.9, 0.1]]);
        let before = mlp.predict(&x).unwrap();

        let data = export(&mlp);
        let mut reloaded = data.to_mlp().expect("reconstruct");
        let after = reloaded.predict(&x).unwrap();

        for (a, b) in before.iter().zip(after.iter()) {
            assert!((a - b).abs() < 1e-12, "prediction drifted: {a} vs {b}");
        }
    }

    #[test]
    fn file_round_trip() {
        let mlp = trained_mlp();
        let dir = std::env::temp_dir().join("mlp_test_checkpoint");
        let path = dir.join("nested").join("model.json");

        save_checkpoint(&mlp, &path).expect("save");
        assert!(path.exists());

        let reloaded = load_checkpoint(&path).expect("load");
        assert_eq!(reloaded.layers.len(), mlp.layers.len());
        for (a, b) in mlp.layers.iter().zip(reloaded.layers.iter()) {
            assert_eq!(a.theta, b.theta);
            assert_eq!(a.activation.name(), b.activation.name());
        }

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn unknown_stored_names_fail_at_load() {
        let mut data = export(&trained_mlp());
        data.loss_name = "hinge".to_string();
        assert!(data.to_mlp().is_err());

        let mut data = export(&trained_mlp());
        data.layer_activations[0] = "softplus".to_string();
        assert!(data.to_mlp().is_err());
    }

    #[test]
    fn ragged_weights_fail_at_load() {
        let mut data = export(&trained_mlp());
        data.weights[0][1].pop();
        assert!(data.to_mlp().is_err());
    }

    #[test]
    fn load_nonexistent_path_is_an_error() {
        assert!(load_checkpoint(Path::new("/nonexistent/model.json")).is_err());
    }
}
