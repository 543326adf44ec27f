use image::{
    imageops::{self, FilterType},
    GrayImage, Luma,
};
use serde::Deserialize;

use super::normalize::equalize;

/// How two normalised faces are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Normalised cross-correlation of the equalised pixels.
    Template,
    /// Correlation of the two 256-bin intensity histograms.
    Histogram,
}

impl Strategy {
    pub fn default_threshold(self) -> f32 {
        match self {
            Self::Template => 0.65,
            Self::Histogram => 0.45,
        }
    }

    /// Similarity in [-1, 1].
    pub fn score(self, reference: &GrayImage, candidate: &GrayImage) -> f32 {
        match self {
            Self::Template => template_score(reference, candidate),
            Self::Histogram => histogram_score(reference, candidate),
        }
    }

    /// Template scores pass at the threshold; histogram scores must exceed it.
    pub fn passes(self, score: f32, threshold: f32) -> bool {
        match self {
            Self::Template => score >= threshold,
            Self::Histogram => score > threshold,
        }
    }
}

/// Result of one comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    pub score: f32,
    pub pass: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct Scorer {
    pub strategy: Strategy,
    pub threshold: f32,
}

impl Scorer {
    pub fn compare(&self, reference: &GrayImage, candidate: &GrayImage) -> Verdict {
        let score = self.strategy.score(reference, candidate);
        Verdict {
            score,
            pass: self.strategy.passes(score, self.threshold),
        }
    }
}

fn template_score(reference: &GrayImage, candidate: &GrayImage) -> f32 {
    let (width, height) = reference.dimensions();
    let resized;
    let candidate = if candidate.dimensions() == (width, height) {
        candidate
    } else {
        resized = imageops::resize(candidate, width, height, FilterType::Triangle);
        &resized
    };
    let reference = equalize(reference);
    let candidate = equalize(candidate);

    let levels = |image: &GrayImage| {
        image
            .pixels()
            .map(|Luma([level])| f64::from(*level))
            .collect::<Vec<_>>()
    };
    // A flat image correlates with nothing.
    correlation(&levels(&reference), &levels(&candidate)).unwrap_or(0.0) as f32
}

fn histogram_score(reference: &GrayImage, candidate: &GrayImage) -> f32 {
    // Two flat histograms are identical as far as correlation can tell.
    correlation(&histogram(reference), &histogram(candidate)).unwrap_or(1.0) as f32
}

fn histogram(image: &GrayImage) -> Vec<f64> {
    let mut bins = vec![0.0; 256];
    for Luma([level]) in image.pixels() {
        bins[usize::from(*level)] += 1.0;
    }
    bins
}

/// Pearson correlation coefficient, or `None` if either side has no variance.
fn correlation(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len().min(ys.len());
    if n == 0 {
        return None;
    }
    let mean_x = xs[..n].iter().sum::<f64>() / n as f64;
    let mean_y = ys[..n].iter().sum::<f64>() / n as f64;

    let (mut covariance, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (x, y) in xs[..n].iter().zip(&ys[..n]) {
        let (dx, dy) = (x - mean_x, y - mean_y);
        covariance += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    let denominator = (var_x * var_y).sqrt();
    if denominator <= f64::EPSILON {
        return None;
    }
    Some((covariance / denominator).clamp(-1.0, 1.0))
}
