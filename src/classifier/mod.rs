//! Pairwise similarity classifier.
//!
//! A small feed-forward network over the concatenation `a ‖ b` of two image
//! embeddings:
//!
//! ```text
//! [a ‖ b] (2·dim) -> dense(h1) -> ReLU -> dense(h2) -> ReLU -> dense(1) -> sigmoid
//! ```
//!
//! The first dense layer is stored as one matrix but applied as two blocks,
//! `W1 · [a ‖ b] = W1_left · a + W1_right · b`, so a directory scan can project
//! every image once with [`Classifier::prepare`] and score each pair with
//! only the small remaining layers. [`Classifier::score`] goes through the
//! same path, which keeps both entry points bit-identical.
//!
//! Weights never change after construction; retraining builds a new value.

mod fit;
mod optimizer;

use ndarray::{s, Array1, Array2, ArrayView1};
use rand::Rng;

use crate::error::{Error, Result};

pub use fit::{fit, FitReport};
pub use optimizer::{Adam, Moments};

#[derive(Debug, Clone)]
pub struct Classifier {
    dimension: usize,
    /// (h1, 2·dim)
    w1: Array2<f32>,
    b1: Array1<f32>,
    /// (h2, h1)
    w2: Array2<f32>,
    b2: Array1<f32>,
    /// (h2)
    w3: Array1<f32>,
    /// (1)
    b3: Array1<f32>,
}

/// One image projected through both halves of the first layer.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    as_left: Array1<f32>,
    as_right: Array1<f32>,
}

impl Classifier {
    /// Freshly initialized (untrained) network: Glorot-uniform weights, zero biases.
    pub fn new<R: Rng + ?Sized>(dimension: usize, hidden: [usize; 2], rng: &mut R) -> Self {
        let [h1, h2] = hidden;
        Self {
            dimension,
            w1: glorot(h1, 2 * dimension, rng),
            b1: Array1::zeros(h1),
            w2: glorot(h2, h1, rng),
            b2: Array1::zeros(h2),
            w3: glorot(1, h2, rng).row(0).to_owned(),
            b3: Array1::zeros(1),
        }
    }

    /// Embedding length this network was built for.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn hidden_units(&self) -> [usize; 2] {
        [self.b1.len(), self.b2.len()]
    }

    pub fn prepare(&self, embedding: &[f32]) -> Result<PreparedImage> {
        if embedding.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }

        let x = ArrayView1::from(embedding);
        Ok(PreparedImage {
            as_left: self.w1.slice(s![.., ..self.dimension]).dot(&x),
            as_right: self.w1.slice(s![.., self.dimension..]).dot(&x),
        })
    }

    /// Similarity score in `[0, 1]` for `a` shown on the left and `b` on the right.
    pub fn score(&self, a: &[f32], b: &[f32]) -> Result<f32> {
        Ok(self.score_prepared(&self.prepare(a)?, &self.prepare(b)?))
    }

    pub fn score_prepared(&self, a: &PreparedImage, b: &PreparedImage) -> f32 {
        let h1 = (&a.as_left + &b.as_right + &self.b1).mapv(relu);
        let h2 = (self.w2.dot(&h1) + &self.b2).mapv(relu);
        sigmoid(self.w3.dot(&h2) + self.b3[0])
    }

    /// Every weight as little-endian f32, layer by layer in row-major order.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.parameters()
            .flat_map(|v| v.to_le_bytes())
            .collect()
    }

    /// Rebuild a network written by [`Classifier::to_le_bytes`].
    ///
    /// Fails with [`Error::Decode`] unless `bytes` holds exactly the weights
    /// of a `dimension`/`hidden` network.
    pub fn from_le_bytes(dimension: usize, hidden: [usize; 2], bytes: &[u8]) -> Result<Self> {
        let [h1, h2] = hidden;
        let expected = h1 * 2 * dimension + h1 + h2 * h1 + h2 + h2 + 1;
        if bytes.len() != expected * 4 {
            return Err(Error::Decode {
                len: bytes.len(),
                expected,
            });
        }

        let values: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        let mut rest = values.as_slice();
        let mut take = |n: usize| {
            let (head, tail) = rest.split_at(n);
            rest = tail;
            head.to_vec()
        };
        let shape_error = |_: ndarray::ShapeError| Error::Decode {
            len: bytes.len(),
            expected,
        };

        Ok(Self {
            dimension,
            w1: Array2::from_shape_vec((h1, 2 * dimension), take(h1 * 2 * dimension))
                .map_err(shape_error)?,
            b1: Array1::from(take(h1)),
            w2: Array2::from_shape_vec((h2, h1), take(h2 * h1)).map_err(shape_error)?,
            b2: Array1::from(take(h2)),
            w3: Array1::from(take(h2)),
            b3: Array1::from(take(1)),
        })
    }

    fn parameters(&self) -> impl Iterator<Item = f32> + '_ {
        self.w1
            .iter()
            .chain(self.b1.iter())
            .chain(self.w2.iter())
            .chain(self.b2.iter())
            .chain(self.w3.iter())
            .chain(self.b3.iter())
            .copied()
    }

    fn all_finite(&self) -> bool {
        self.parameters().all(f32::is_finite)
    }
}

fn glorot<R: Rng + ?Sized>(rows: usize, cols: usize, rng: &mut R) -> Array2<f32> {
    let limit = (6.0 / (rows + cols) as f32).sqrt();
    Array2::from_shape_fn((rows, cols), |_| rng.gen_range(-limit..limit))
}

pub(crate) fn relu(x: f32) -> f32 {
    x.max(0.0)
}

pub(crate) fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn classifier(seed: u64) -> Classifier {
        Classifier::new(4, [8, 4], &mut StdRng::seed_from_u64(seed))
    }

    #[test]
    fn test_score_is_a_probability() {
        let model = classifier(1);
        let score = model.score(&[0.1, 0.2, 0.3, 1.0], &[0.9, -0.4, 0.0, 1.0]).unwrap();
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn test_prepared_path_matches_score() {
        let model = classifier(2);
        let a = [0.5, 0.25, -1.0, 1.0];
        let b = [-0.75, 0.0, 0.5, 1.0];

        let direct = model.score(&a, &b).unwrap();
        let prepared = model.score_prepared(&model.prepare(&a).unwrap(), &model.prepare(&b).unwrap());
        assert_eq!(direct.to_bits(), prepared.to_bits());
    }

    #[test]
    fn test_same_seed_same_weights() {
        let a = [0.5, 0.25, -1.0, 1.0];
        let b = [-0.75, 0.0, 0.5, 1.0];
        assert_eq!(
            classifier(9).score(&a, &b).unwrap(),
            classifier(9).score(&a, &b).unwrap()
        );
    }

    #[test]
    fn test_dimension_mismatch() {
        let model = classifier(3);
        let result = model.score(&[1.0, 2.0], &[1.0, 2.0, 3.0, 4.0]);
        assert!(matches!(
            result,
            Err(Error::DimensionMismatch { expected: 4, actual: 2 })
        ));
    }

    #[test]
    fn test_weights_survive_byte_encoding() {
        let model = classifier(4);
        let bytes = model.to_le_bytes();
        let restored = Classifier::from_le_bytes(4, [8, 4], &bytes).unwrap();

        assert_eq!(restored.hidden_units(), [8, 4]);
        let a = [0.5, 0.25, -1.0, 1.0];
        let b = [-0.75, 0.0, 0.5, 1.0];
        assert_eq!(
            model.score(&a, &b).unwrap().to_bits(),
            restored.score(&a, &b).unwrap().to_bits()
        );
    }

    #[test]
    fn test_weight_blob_for_other_shape_is_rejected() {
        let bytes = classifier(4).to_le_bytes();
        assert!(matches!(
            Classifier::from_le_bytes(4, [8, 2], &bytes),
            Err(Error::Decode { .. })
        ));
        assert!(matches!(
            Classifier::from_le_bytes(4, [8, 4], &bytes[4..]),
            Err(Error::Decode { .. })
        ));
    }

    #[test]
    fn test_sigmoid_is_stable() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(-1000.0) >= 0.0);
        assert!(sigmoid(1000.0) <= 1.0);
        assert!(sigmoid(-1000.0).is_finite());
    }
}
