//! Full-batch training of the classifier with binary cross-entropy and Adam.

use ndarray::{Array1, Array2, Axis};

use super::{relu, sigmoid, Adam, Classifier, Moments};
use crate::db::TrainingExample;
use crate::error::{Error, Result};

/// Clamp for probabilities inside the logarithms.
const EPS: f32 = 1e-7;

/// Summary of one training run
#[derive(Debug, Clone)]
pub struct FitReport {
    pub examples: usize,
    pub epochs: usize,
    /// Loss before each epoch's update.
    pub losses: Vec<f32>,
    /// Loss of the returned weights.
    pub final_loss: f32,
}

struct Activations {
    z1: Array2<f32>,
    h1: Array2<f32>,
    z2: Array2<f32>,
    h2: Array2<f32>,
    p: Array1<f32>,
}

struct Gradients {
    w1: Array2<f32>,
    b1: Array1<f32>,
    w2: Array2<f32>,
    b2: Array1<f32>,
    w3: Array1<f32>,
    b3: Array1<f32>,
}

struct OptimizerState {
    adam: Adam,
    w1: Moments<ndarray::Ix2>,
    b1: Moments<ndarray::Ix1>,
    w2: Moments<ndarray::Ix2>,
    b2: Moments<ndarray::Ix1>,
    w3: Moments<ndarray::Ix1>,
    b3: Moments<ndarray::Ix1>,
}

/// Train `classifier` on every example at once for `epochs` steps.
///
/// Fails with [`Error::Training`] on malformed input (wrong dimension,
/// non-finite values) or when the loss or weights stop being finite. The
/// input classifier is consumed either way; callers keep their own copy of
/// any model that must survive a failure.
pub fn fit(
    mut classifier: Classifier,
    examples: &[TrainingExample],
    epochs: usize,
    learning_rate: f32,
) -> Result<(Classifier, FitReport)> {
    let (x, y) = build_batch(classifier.dimension(), examples)?;

    let mut state = OptimizerState {
        adam: Adam::new(learning_rate),
        w1: Moments::zeros_like(&classifier.w1),
        b1: Moments::zeros_like(&classifier.b1),
        w2: Moments::zeros_like(&classifier.w2),
        b2: Moments::zeros_like(&classifier.b2),
        w3: Moments::zeros_like(&classifier.w3),
        b3: Moments::zeros_like(&classifier.b3),
    };

    let mut losses = Vec::with_capacity(epochs);
    for epoch in 0..epochs {
        let acts = forward(&classifier, &x);
        let loss = bce(&acts.p, &y);
        if !loss.is_finite() {
            return Err(Error::Training(format!("loss diverged at epoch {}", epoch)));
        }
        losses.push(loss);

        let grads = backward(&classifier, &x, &y, &acts);
        state.adam.begin_step();
        state.adam.update(&mut classifier.w1, &grads.w1, &mut state.w1)?;
        state.adam.update(&mut classifier.b1, &grads.b1, &mut state.b1)?;
        state.adam.update(&mut classifier.w2, &grads.w2, &mut state.w2)?;
        state.adam.update(&mut classifier.b2, &grads.b2, &mut state.b2)?;
        state.adam.update(&mut classifier.w3, &grads.w3, &mut state.w3)?;
        state.adam.update(&mut classifier.b3, &grads.b3, &mut state.b3)?;
    }

    let final_loss = bce(&forward(&classifier, &x).p, &y);
    if !final_loss.is_finite() || !classifier.all_finite() {
        return Err(Error::Training("weights diverged".to_string()));
    }

    Ok((
        classifier,
        FitReport {
            examples: examples.len(),
            epochs,
            losses,
            final_loss,
        },
    ))
}

fn build_batch(dimension: usize, examples: &[TrainingExample]) -> Result<(Array2<f32>, Array1<f32>)> {
    if examples.is_empty() {
        return Err(Error::Training("no training examples".to_string()));
    }

    let mut x = Array2::<f32>::zeros((examples.len(), 2 * dimension));
    let mut y = Array1::<f32>::zeros(examples.len());

    for (i, example) in examples.iter().enumerate() {
        let (a, b) = (example.a.as_slice(), example.b.as_slice());
        if a.len() != dimension || b.len() != dimension {
            return Err(Error::Training(format!(
                "example {} has dimensions ({}, {}), expected {}",
                i,
                a.len(),
                b.len(),
                dimension
            )));
        }
        if a.iter().chain(b).any(|v| !v.is_finite()) {
            return Err(Error::Training(format!("example {} has non-finite values", i)));
        }

        let mut row = x.row_mut(i);
        row.iter_mut()
            .zip(a.iter().chain(b))
            .for_each(|(dst, &src)| *dst = src);
        y[i] = if example.is_similar { 1.0 } else { 0.0 };
    }

    Ok((x, y))
}

fn forward(model: &Classifier, x: &Array2<f32>) -> Activations {
    let z1 = x.dot(&model.w1.t()) + &model.b1;
    let h1 = z1.mapv(relu);
    let z2 = h1.dot(&model.w2.t()) + &model.b2;
    let h2 = z2.mapv(relu);
    let p = (h2.dot(&model.w3) + model.b3[0]).mapv(sigmoid);
    Activations { z1, h1, z2, h2, p }
}

/// Mean binary cross-entropy
fn bce(p: &Array1<f32>, y: &Array1<f32>) -> f32 {
    let n = p.len().max(1) as f32;
    p.iter()
        .zip(y.iter())
        .map(|(&p, &y)| {
            let p = p.clamp(EPS, 1.0 - EPS);
            -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
        })
        .sum::<f32>()
        / n
}

fn backward(model: &Classifier, x: &Array2<f32>, y: &Array1<f32>, acts: &Activations) -> Gradients {
    let n = y.len() as f32;
    let relu_grad = |z: f32| if z > 0.0 { 1.0 } else { 0.0 };

    // Sigmoid followed by BCE: dL/dz = (p - y) / n
    let dz3 = (&acts.p - y) / n;
    let w3 = acts.h2.t().dot(&dz3);
    let b3 = Array1::from_elem(1, dz3.sum());

    let dh2 = dz3
        .view()
        .insert_axis(Axis(1))
        .dot(&model.w3.view().insert_axis(Axis(0)));
    let dz2 = dh2 * acts.z2.mapv(relu_grad);
    let w2 = dz2.t().dot(&acts.h1);
    let b2 = dz2.sum_axis(Axis(0));

    let dh1 = dz2.dot(&model.w2);
    let dz1 = dh1 * acts.z1.mapv(relu_grad);
    let w1 = dz1.t().dot(x);
    let b1 = dz1.sum_axis(Axis(0));

    Gradients { w1, b1, w2, b2, w3, b3 }
}
