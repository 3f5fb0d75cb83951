//! Time-bounded search for the next pair to show the labeler.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::annotations::AnnotationSet;
use crate::classifier::{Classifier, PreparedImage};
use crate::db::Image;
use crate::error::Result;

/// Anything that can rank an image pair. Higher is shown first.
pub trait PairScorer {
    fn score(&self, a: &Image, b: &Image) -> f32;
}

/// Scores pairs with a fixed classifier, projecting each image only once.
pub struct ClassifierScorer {
    classifier: Arc<Classifier>,
    prepared: HashMap<i64, PreparedImage>,
}

impl ClassifierScorer {
    pub fn new(classifier: Arc<Classifier>, images: &[Image]) -> Result<Self> {
        let prepared = images
            .iter()
            .map(|image| Ok((image.id, classifier.prepare(image.embedding.as_slice())?)))
            .collect::<Result<HashMap<_, _>>>()?;
        Ok(Self {
            classifier,
            prepared,
        })
    }
}

impl PairScorer for ClassifierScorer {
    fn score(&self, a: &Image, b: &Image) -> f32 {
        match (self.prepared.get(&a.id), self.prepared.get(&b.id)) {
            (Some(pa), Some(pb)) => self.classifier.score_prepared(pa, pb),
            _ => f32::NAN,
        }
    }
}

/// Best pair found by one scan.
#[derive(Debug, Clone)]
pub struct PairCandidate {
    /// Lower id of the pair.
    pub a: Image,
    pub b: Image,
    pub score: f32,
    pub pairs_scored: usize,
    /// Whether every pair was visited before the budget ran out.
    pub exhausted: bool,
}

/// Highest-scoring unannotated pair among `images`.
///
/// Pairs are visited as `(i, j)` with `i < j` over the images in id order.
/// Ties keep the pair visited first. Time is checked after each completed
/// row; once `budget` has elapsed the best pair so far is returned, so a
/// larger budget never yields a worse score.
pub fn select_next_pair<S: PairScorer + ?Sized>(
    images: &[Image],
    annotations: &AnnotationSet,
    scorer: &S,
    budget: Duration,
) -> Option<PairCandidate> {
    let started = Instant::now();

    let mut ordered: Vec<&Image> = images.iter().collect();
    ordered.sort_by_key(|image| image.id);
    let n = ordered.len();

    let mut best: Option<(usize, usize, f32)> = None;
    let mut pairs_scored = 0;
    let mut exhausted = true;

    for i in 0..n {
        for j in (i + 1)..n {
            let (a, b) = (ordered[i], ordered[j]);
            if annotations.contains(a.id, b.id) {
                continue;
            }

            let score = scorer.score(a, b);
            pairs_scored += 1;
            if score.is_nan() {
                continue;
            }
            if best.map_or(true, |(_, _, top)| score > top) {
                best = Some((i, j, score));
            }
        }

        // The last row with pairs is i = n - 2; past it nothing is left to cut.
        if i + 2 < n && started.elapsed() >= budget {
            exhausted = false;
            tracing::debug!(
                rows = i + 1,
                images = n,
                pairs_scored,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Pair scan stopped at time budget"
            );
            break;
        }
    }

    best.map(|(i, j, score)| PairCandidate {
        a: ordered[i].clone(),
        b: ordered[j].clone(),
        score,
        pairs_scored,
        exhausted,
    })
}
