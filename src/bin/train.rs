//! MLP training demo binary.
//!
//! Trains a classifier on a synthetic two-class dataset (two Gaussian
//! blobs), reporting the loss per reporting interval and the final
//! training accuracy. Optionally saves the trained network as a JSON
//! checkpoint.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use mlp::{save_checkpoint, Mlp};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Parser, Debug)]
#[command(name = "mlp-train", about = "Train an MLP classifier on synthetic blobs")]
struct Args {
    /// Hidden layer widths, input-to-output
    #[arg(long, value_delimiter = ',', default_value = "8")]
    hidden: Vec<usize>,

    /// Activation for hidden layers (identity, logistic, tanh, relu)
    #[arg(long, default_value = "tanh")]
    activation: String,

    /// Solver (sgd, agd, adagrad, rmsprop, adadelta, adam)
    #[arg(long, default_value = "adam")]
    solver: String,

    /// Loss (square, log, cross-entropy)
    #[arg(long, default_value = "log")]
    loss: String,

    /// Regularization weight
    #[arg(long, default_value_t = 0.0)]
    alpha: f64,

    /// L1 share of the elastic-net penalty
    #[arg(long, default_value_t = 0.0)]
    l1_ratio: f64,

    /// Learning rate
    #[arg(long, default_value_t = 0.05)]
    learning_rate: f64,

    /// Number of training epochs
    #[arg(long, default_value_t = 200)]
    epochs: usize,

    /// Mini-batch size (0 = full batch)
    #[arg(long, default_value_t = 0)]
    batch_size: usize,

    /// Samples per class
    #[arg(long, default_value_t = 200)]
    samples: usize,

    /// Number of input features
    #[arg(long, default_value_t = 2)]
    features: usize,

    /// RNG seed for data generation, weight init, and shuffling
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Report loss every N epochs
    #[arg(long, default_value_t = 20)]
    report_every: usize,

    /// Save the trained network to this JSON file
    #[arg(long)]
    checkpoint: Option<PathBuf>,
}

/// Two Gaussian blobs at ±1.5 per coordinate, labels 0/1.
fn make_blobs(samples_per_class: usize, features: usize, rng: &mut StdRng) -> (Array2<f64>, Array2<f64>) {
    let n = 2 * samples_per_class;
    let mut x = Array2::zeros((n, features));
    let mut y = Array2::zeros((n, 1));
    for i in 0..n {
        let class = i % 2;
        let center = if class == 1 { 1.5 } else { -1.5 };
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

fn run(args: &Args) -> mlp::MlpResult<()> {
    let mut rng = StdRng::seed_from_u64(args.seed);
    let (x, y) = make_blobs(args.samples, args.features, &mut rng);

    let mut net = Mlp::classifier(args.hidden.clone(), &args.activation, &args.solver, args.alpha)?;
    net.set_loss(&args.loss)?;
    net.l1_ratio = args.l1_ratio;
    net.learning_rate = args.learning_rate;
    net.batch_size = args.batch_size;
    net.seed = Some(args.seed);

    println!(
        "training {}-feature classifier, hidden {:?}, {} epochs ({} samples)",
        args.features,
        args.hidden,
        args.epochs,
        x.nrows()
    );

    // One reporting interval per fit call; warm start carries the weights
    // across calls.
    net.epochs = args.report_every.max(1);
    let mut trained = 0;
    while trained < args.epochs {
        net.epochs = net.epochs.min(args.epochs - trained);
        net.fit(&x, &y)?;
        trained += net.epochs;
        net.warm_start = true;
        println!("epoch {trained:>5}  loss {:.6}", net.final_loss);
    }

    let pred = net.predict(&x)?;
    println!("training accuracy: {:.3}", accuracy(&pred, &y));

    if let Some(path) = &args.checkpoint {
        save_checkpoint(&net, path)?;
        println!("checkpoint written to {}", path.display());
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("mlp-train: {err}");
            ExitCode::FAILURE
        }
    }
}
