//! End-to-end training tests.
//!
//! These verify the driver-level contracts:
//! - prediction shape and idempotence
//! - convergence on a separable two-class problem
//! - checkpoint round trips
//! - automatic shape adaptation on re-fit
//! - divergence surfacing as an error rather than silent garbage

use mlp::{load_checkpoint, save_checkpoint, Mlp, MlpError};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Two separable Gaussian-ish blobs with a wide margin.
fn blobs(samples_per_class: usize, features: usize, seed: u64) -> (Array2<f64>, Array2<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let n = 2 * samples_per_class;
    let mut x = Array2::zeros((n, features));
    let mut y = Array2::zeros((n, 1));
    for i in 0..n {
        let class = i % 2;
        let center = if class == 1 { 2.0 } else { -2.0 };
        for f in 0..features {
            x[[i, f]] = center + rng.gen_range(-1.0..1.0);
        }
        y[[i, 0]] = class as f64;
    }
    (x, y)
}

fn accuracy(pred: &Array2<f64>, y: &Array2<f64>) -> f64 {
    let hits = pred
        .iter()
        .zip(y.iter())
        .filter(|(p, t)| (p.round() - **t).abs() < 0.5)
        .count();
    hits as f64 / y.nrows() as f64
}

#[test]
fn forward_output_width_matches_output_layer() {
    let (x, y) = blobs(20, 4, 0);
    let y2 = ndarray::concatenate(ndarray::Axis(1), &[y.view(), y.view()]).expect("stack targets");

    let mut net = Mlp::classifier(vec![5, 3], "tanh", "adam", 0.0).expect("config");
    net.seed = Some(0);
    net.epochs = 2;
    net.fit(&x, &y2).expect("fit");

    for rows in [1, 7, 40] {
        let input = Array2::zeros((rows, 4));
        let out = net.predict(&input).expect("predict");
        assert_eq!(out.dim(), (rows, 2));
    }
}

#[test]
fn prediction_is_idempotent() {
    let (x, y) = blobs(20, 2, 1);
    let mut net = Mlp::classifier(vec![4], "tanh", "adam", 0.0).expect("config");
    net.seed = Some(1);
    net.epochs = 5;
    net.fit(&x, &y).expect("fit");

    let first = net.predict(&x).expect("predict");
    let second = net.predict(&x).expect("predict");
    assert_eq!(first, second);
}

#[test]
fn converges_on_separable_two_class_data() {
    let (x, y) = blobs(100, 2, 7);

    let mut net = Mlp::classifier(vec![4], "tanh", "adam", 0.0).expect("config");
    net.learning_rate = 0.05;
    net.epochs = 500;
    net.seed = Some(7);

    net.fit(&x, &y).expect("fit");
    assert!(net.final_loss.is_finite(), "loss diverged: {}", net.final_loss);
    assert!(net.initial_loss.is_finite());
    assert!(
        net.final_loss < net.initial_loss,
        "loss did not improve: {} -> {}",
        net.initial_loss,
        net.final_loss
    );

    let pred = net.predict(&x).expect("predict");
    let acc = accuracy(&pred, &y);
    assert!(acc >= 0.83, "accuracy {acc} below threshold");
}

#[test]
fn all_solvers_survive_training() {
    let (x, y) = blobs(30, 2, 3);
    for solver in ["sgd", "agd", "adagrad", "rmsprop", "adadelta", "adam"] {
        let mut net = Mlp::classifier(vec![4], "tanh", solver, 0.0).expect("config");
        net.learning_rate = 0.02;
        net.epochs = 30;
        net.seed = Some(3);
        net.fit(&x, &y).unwrap_or_else(|e| panic!("{solver}: {e}"));
        assert!(net.final_loss.is_finite(), "{solver} diverged");
    }
}

#[test]
fn regularization_shrinks_weights() {
    let (x, y) = blobs(50, 2, 5);

    let weight_norm = |net: &Mlp| -> f64 {
        net.layers
            .iter()
            .map(|l| l.theta.iter().map(|w| w * w).sum::<f64>())
            .sum()
    };

    let mut plain = Mlp::classifier(vec![], "logistic", "sgd", 0.0).expect("config");
    plain.learning_rate = 0.5;
    plain.epochs = 200;
    plain.shuffle = false;
    plain.seed = Some(5);
    plain.fit(&x, &y).expect("fit");

    let mut decayed = Mlp::classifier(vec![], "logistic", "sgd", 5.0).expect("config");
    decayed.learning_rate = 0.5;
    decayed.epochs = 200;
    decayed.shuffle = false;
    decayed.seed = Some(5);
    decayed.fit(&x, &y).expect("fit");

    assert!(
        weight_norm(&decayed) < weight_norm(&plain),
        "penalty did not shrink weights"
    );
}

#[test]
fn checkpoint_round_trip_reproduces_predictions() {
    let (x, y) = blobs(30, 3, 9);
    let mut net = Mlp::classifier(vec![6], "tanh", "adam", 1e-4).expect("config");
    net.learning_rate = 0.05;
    net.epochs = 50;
    net.seed = Some(9);
    net.fit(&x, &y).expect("fit");

    let (held_out, _) = blobs(10, 3, 10);
    let before = net.predict(&held_out).expect("predict");

    let dir = std::env::temp_dir().join("mlp_round_trip_test");
    let path = dir.join("model.json");
    save_checkpoint(&net, &path).expect("save");
    let mut reloaded = load_checkpoint(&path).expect("load");
    let _ = std::fs::remove_dir_all(&dir);

    let after = reloaded.predict(&held_out).expect("predict");
    assert_eq!(before.dim(), after.dim());
    for (a, b) in before.iter().zip(after.iter()) {
        assert!((a - b).abs() < 1e-12, "prediction drifted: {a} vs {b}");
    }
}

#[test]
fn refitting_adapts_to_new_feature_width() {
    let (x3, y) = blobs(25, 3, 11);
    let mut net = Mlp::classifier(vec![4], "tanh", "adam", 0.0).expect("config");
    net.learning_rate = 0.05;
    net.epochs = 20;
    net.seed = Some(11);
    net.fit(&x3, &y).expect("fit");
    assert_eq!(net.layers[0].inputs(), 3);

    // Hidden weights should survive the adaptation; only the first layer
    // is rebuilt.
    let hidden_before = net.layers[1].theta.clone();

    let (x5, y5) = blobs(25, 5, 12);
    net.warm_start = true;
    net.epochs = 1;
    net.fit(&x5, &y5).expect("re-fit with new width");

    assert_eq!(net.layers[0].inputs(), 5);
    assert_eq!(net.adapted_layers, 1);
    assert_ne!(net.layers[1].theta, hidden_before); // trained, but same shape
    assert_eq!(net.layers[1].theta.dim(), hidden_before.dim());

    let out = net.predict(&x5).expect("predict after adaptation");
    assert_eq!(out.dim(), (x5.nrows(), 1));
}

#[test]
fn divergence_is_an_error_not_garbage() {
    let (x, y) = blobs(20, 2, 13);
    let mut net = Mlp::regressor(vec![4], "identity", "sgd", 0.0).expect("config");
    net.learning_rate = 1e12;
    net.epochs = 100;
    net.seed = Some(13);

    match net.fit(&x, &y) {
        Err(MlpError::NonFinite { .. }) => {}
        other => panic!("expected NonFinite, got {other:?}"),
    }
}
