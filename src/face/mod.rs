//! Face detection, normalisation and matching against enrolled references.

use std::sync::Arc;

use image::GrayImage;
use log::{debug, info};

use crate::{
    config::FaceConfig,
    error::{Error, Rejection, Result},
};

mod detect;
mod normalize;
mod reference;
mod score;

#[cfg(feature = "seeta")]
pub use detect::SeetaDetector;
pub use detect::{BoundingBox, FaceDetector};
pub use normalize::{Normalizer, Selection, FACE_SIZE};
pub use reference::{InvalidKey, ReferenceKey, ReferenceStore, StagedFace};
pub use score::{Scorer, Strategy, Verdict};

/// A successful biometric step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BiometricMatch {
    /// No reference existed; the submitted face is now the reference.
    Enrolled,
    /// The submitted face matched the stored reference.
    Verified { score: f32 },
}

/// The complete face pipeline, shared between requests. All work is blocking
/// and should be run off the async executor.
#[derive(Clone)]
pub struct FacePipeline {
    inner: Arc<Inner>,
}

struct Inner {
    detector: Box<dyn FaceDetector>,
    normalizer: Normalizer,
    scorer: Scorer,
    references: ReferenceStore,
}

impl FacePipeline {
    pub fn new(detector: impl FaceDetector + 'static, config: &FaceConfig) -> Result<Self> {
        let strategy = config.face_strategy;
        let inner = Inner {
            detector: Box::new(detector),
            normalizer: Normalizer {
                selection: config.face_selection,
                blur: config.face_blur,
                equalize: config.face_equalize,
            },
            scorer: Scorer {
                strategy,
                threshold: config
                    .face_threshold
                    .unwrap_or_else(|| strategy.default_threshold()),
            },
            references: ReferenceStore::open(config.face_dir())?,
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// One-line summary for the launch log.
    pub fn describe(&self) -> String {
        let Inner {
            normalizer, scorer, ..
        } = &*self.inner;
        format!(
            "{:?} matching at threshold {:.2}, {:?} face wins, blur {:?}, equalize {}",
            scorer.strategy, scorer.threshold, normalizer.selection, normalizer.blur, normalizer.equalize,
        )
    }

    /// Decode a frame, find the faces in it and normalise the selected one.
    pub fn detect_and_normalize(&self, frame: &[u8]) -> Result<Option<GrayImage>> {
        let frame = image::load_from_memory(frame)
            .map_err(|e| Rejection::MalformedImage(e.to_string()))?
            .into_luma8();
        let faces = self.inner.detector.detect(&frame)?;
        debug!("Detected {} face(s) in {}x{} frame", faces.len(), frame.width(), frame.height());
        Ok(self.inner.normalizer.normalize(&frame, &faces))
    }

    /// Enroll the face in `frame` as the reference for `key` if there is none
    /// yet, otherwise compare it against the stored reference.
    ///
    /// A frame without a face never touches the reference store.
    pub fn enroll_or_verify(&self, key: &ReferenceKey, frame: &[u8]) -> Result<BiometricMatch> {
        let face = self
            .detect_and_normalize(frame)?
            .ok_or(Rejection::NoFaceDetected)?;
        let references = &self.inner.references;

        let reference = match references.load(key)? {
            Some(reference) => reference,
            None => {
                let staged = references.stage(&face)?;
                if references.enroll(key, staged)? {
                    info!("Enrolled face reference for {key}");
                    return Ok(BiometricMatch::Enrolled);
                }
                // Lost the race to a concurrent enrollment; verify against it.
                references
                    .load(key)?
                    .ok_or_else(|| Error::Corrupt(format!("face reference {key} disappeared")))?
            }
        };

        let Verdict { score, pass } = self.inner.scorer.compare(&reference, &face);
        debug!("Face score for {key}: {score:.3}");
        if pass {
            Ok(BiometricMatch::Verified { score })
        } else {
            Err(Rejection::FaceMismatch { score }.into())
        }
    }
}

/// Detector and frames for tests. Faces are drawn as dark blocks on a white
/// background, and the detector reports the bounding box of all dark ink.
#[cfg(test)]
pub mod examples {
    use std::path::Path;

    use image::{codecs::png::PngEncoder, ColorType, ImageEncoder, Luma};

    use super::*;

    pub struct InkDetector;

    impl FaceDetector for InkDetector {
        fn detect(&self, image: &GrayImage) -> Result<Vec<BoundingBox>> {
            let ink = image.enumerate_pixels().filter(|(_, _, Luma([v]))| *v < 128);
            let bounds = ink.fold(None, |acc: Option<(u32, u32, u32, u32)>, (x, y, _)| {
                Some(match acc {
                    None => (x, y, x, y),
                    Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
                })
            });
            Ok(bounds
                .map(|(x0, y0, x1, y1)| BoundingBox {
                    x: x0 as i32,
                    y: y0 as i32,
                    width: x1 - x0 + 1,
                    height: y1 - y0 + 1,
                })
                .into_iter()
                .collect())
        }
    }

    impl FacePipeline {
        pub fn example(face_dir: &Path) -> Self {
            Self::new(InkDetector, &FaceConfig::example(face_dir)).unwrap()
        }
    }

    const FRAME_WIDTH: u32 = 320;
    const FRAME_HEIGHT: u32 = 240;

    fn frame_with(x: u32, y: u32, size: u32, ink: impl Fn(u32, u32) -> u8) -> Vec<u8> {
        let frame = GrayImage::from_fn(FRAME_WIDTH, FRAME_HEIGHT, |px, py| {
            if (x..x + size).contains(&px) && (y..y + size).contains(&py) {
                Luma([ink(px - x, py - y)])
            } else {
                Luma([255])
            }
        });
        encode_png(&frame)
    }

    pub fn encode_png(image: &GrayImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        PngEncoder::new(&mut bytes)
            .write_image(image.as_raw(), image.width(), image.height(), ColorType::L8)
            .unwrap();
        bytes
    }

    fn ramp(i: u32, size: u32) -> u8 {
        (i * 120 / (size - 1)) as u8
    }

    /// A face shaded dark to light from left to right.
    pub fn face_a() -> Vec<u8> {
        frame_with(60, 40, 120, |i, _| ramp(i, 120))
    }

    /// The same face, smaller and elsewhere in the frame.
    pub fn face_a_moved() -> Vec<u8> {
        frame_with(180, 100, 100, |i, _| ramp(i, 100))
    }

    /// A face shaded top to bottom.
    pub fn face_b() -> Vec<u8> {
        frame_with(60, 40, 120, |_, j| ramp(j, 120))
    }

    /// A face with two flat shades in a checkerboard.
    pub fn face_checkered() -> Vec<u8> {
        frame_with(60, 40, 120, |i, j| if (i / 10 + j / 10) % 2 == 0 { 20 } else { 100 })
    }

    /// Nothing in view.
    pub fn empty_frame() -> Vec<u8> {
        encode_png(&GrayImage::from_pixel(FRAME_WIDTH, FRAME_HEIGHT, Luma([255])))
    }
}
