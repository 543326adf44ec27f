use image::{
    imageops::{self, FilterType},
    GrayImage, Luma,
};
use serde::Deserialize;

use super::BoundingBox;

/// Side length of a normalised face.
pub const FACE_SIZE: u32 = 200;

/// Which detection wins when a frame holds more than one face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Selection {
    /// The face with the largest area; the earliest on a tie.
    Largest,
    /// Whichever the detector reported first.
    First,
}

impl Selection {
    pub fn pick(self, faces: &[BoundingBox]) -> Option<BoundingBox> {
        match self {
            Self::First => faces.first().copied(),
            Self::Largest => faces.iter().fold(None, |best: Option<BoundingBox>, face| match best {
                Some(best) if best.area() >= face.area() => Some(best),
                _ => Some(*face),
            }),
        }
    }
}

/// Turns one detected face into the canonical form references are stored in.
#[derive(Debug, Clone)]
pub struct Normalizer {
    pub selection: Selection,
    /// Gaussian blur sigma.
    pub blur: Option<f32>,
    pub equalize: bool,
}

impl Normalizer {
    /// Crop the selected face out of the frame and bring it to
    /// `FACE_SIZE`x`FACE_SIZE`. `None` if there is no face in view.
    pub fn normalize(&self, frame: &GrayImage, faces: &[BoundingBox]) -> Option<GrayImage> {
        let face = self.selection.pick(faces)?;
        let (width, height) = frame.dimensions();
        let (x, y, w, h) = face.clamp(width, height)?;

        let crop = imageops::crop_imm(frame, x, y, w, h).to_image();
        let mut face = imageops::resize(&crop, FACE_SIZE, FACE_SIZE, FilterType::Triangle);
        if let Some(sigma) = self.blur {
            face = imageops::blur(&face, sigma);
        }
        if self.equalize {
            face = equalize(&face);
        }
        Some(face)
    }
}

/// Histogram equalisation. The darkest level present maps to 0 and the
/// cumulative distribution is stretched over the rest of the range; an image
/// with a single level is left as it is.
pub fn equalize(image: &GrayImage) -> GrayImage {
    let mut histogram = [0_u64; 256];
    for Luma([level]) in image.pixels() {
        histogram[usize::from(*level)] += 1;
    }
    let total: u64 = histogram.iter().sum();
    let Some(lowest) = histogram.iter().position(|count| *count > 0) else {
        return image.clone();
    };
    if histogram[lowest] == total {
        return image.clone();
    }

    let scale = 255.0 / (total - histogram[lowest]) as f64;
    let mut lut = [0_u8; 256];
    let mut cumulative = 0;
    for level in (lowest + 1)..256 {
        cumulative += histogram[level];
        lut[level] = (cumulative as f64 * scale).round().min(255.0) as u8;
    }

    let mut equalized = image.clone();
    for Luma([level]) in equalized.pixels_mut() {
        *level = lut[usize::from(*level)];
    }
    equalized
}
