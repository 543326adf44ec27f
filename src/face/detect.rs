use image::GrayImage;

use crate::error::Result;

/// A detected face, in pixel coordinates of the frame. The box may poke out
/// past the frame edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Intersect with a `width`x`height` frame, returning `(x, y, width,
    /// height)` of the visible part, if any.
    pub fn clamp(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let x0 = i64::from(self.x).max(0);
        let y0 = i64::from(self.y).max(0);
        let x1 = (i64::from(self.x) + i64::from(self.width)).min(i64::from(width));
        let y1 = (i64::from(self.y) + i64::from(self.height)).min(i64::from(height));
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        // All four values now lie within [0, u32::MAX].
        Some((x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32))
    }
}

/// Finds faces in a grayscale frame.
pub trait FaceDetector: Send + Sync {
    fn detect(&self, image: &GrayImage) -> Result<Vec<BoundingBox>>;
}

impl<T: FaceDetector + ?Sized> FaceDetector for Box<T> {
    fn detect(&self, image: &GrayImage) -> Result<Vec<BoundingBox>> {
        (**self).detect(image)
    }
}

#[cfg(feature = "seeta")]
pub use seeta::SeetaDetector;

#[cfg(feature = "seeta")]
mod seeta {
    use std::fs::File;
    use std::io::{self, BufReader};
    use std::path::Path;
    use std::sync::mpsc;
    use std::thread;

    use image::GrayImage;
    use log::{debug, error};
    use rustface::ImageData;

    use super::{BoundingBox, FaceDetector};
    use crate::error::{Error, Result};

    type Job = (GrayImage, mpsc::SyncSender<Vec<BoundingBox>>);

    /// SeetaFace frontal cascade. The model is owned by one dedicated thread
    /// and frames are queued to it.
    pub struct SeetaDetector {
        jobs: mpsc::Sender<Job>,
    }

    impl SeetaDetector {
        /// Load the model and start the detector thread.
        pub fn spawn(model_path: &Path, min_face_size: u32) -> Result<Self> {
            let path = model_path.to_path_buf();
            let (jobs, queue) = mpsc::channel::<Job>();
            let (ready_tx, ready_rx) = mpsc::sync_channel::<io::Result<()>>(1);

            thread::Builder::new()
                .name("face-detector".to_string())
                .spawn(move || {
                    let model = match File::open(&path)
                        .and_then(|file| rustface::read_model(BufReader::new(file)))
                    {
                        Ok(model) => model,
                        Err(e) => {
                            // Nobody to tell if the spawner has gone away.
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };
                    let mut detector = rustface::create_detector_with_model(model);
                    detector.set_min_face_size(min_face_size);
                    detector.set_score_thresh(2.0);
                    detector.set_pyramid_scale_factor(0.8);
                    detector.set_slide_window_step(4, 4);
                    let _ = ready_tx.send(Ok(()));
                    debug!("Face detector ready");

                    for (image, reply) in queue {
                        let (width, height) = image.dimensions();
                        let faces = detector
                            .detect(&mut ImageData::new(image.as_raw(), width, height))
                            .iter()
                            .map(|face| {
                                let bbox = face.bbox();
                                BoundingBox {
                                    x: bbox.x(),
                                    y: bbox.y(),
                                    width: bbox.width(),
                                    height: bbox.height(),
                                }
                            })
                            .collect();
                        if reply.send(faces).is_err() {
                            error!("Face detection result dropped by requester");
                        }
                    }
                    debug!("Face detector stopped");
                })?;

            match ready_rx.recv() {
                Ok(Ok(())) => Ok(Self { jobs }),
                Ok(Err(e)) => Err(e.into()),
                Err(_) => Err(detector_gone()),
            }
        }
    }

    impl FaceDetector for SeetaDetector {
        fn detect(&self, image: &GrayImage) -> Result<Vec<BoundingBox>> {
            let (reply, result) = mpsc::sync_channel(1);
            self.jobs
                .send((image.clone(), reply))
                .map_err(|_| detector_gone())?;
            result.recv().map_err(|_| detector_gone())
        }
    }

    fn detector_gone() -> Error {
        io::Error::new(io::ErrorKind::BrokenPipe, "face detector thread has stopped").into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shareable<T: Send + Sync>() {}

    #[test]
    fn detectors_are_shareable() {
        shareable::<Box<dyn FaceDetector>>();
        #[cfg(feature = "seeta")]
        shareable::<SeetaDetector>();
    }

    #[test]
    fn clamp_to_frame() {
        let inside = BoundingBox {
            x: 10,
            y: 20,
            width: 30,
            height: 40,
        };
        assert_eq!(inside.clamp(100, 100), Some((10, 20, 30, 40)));

        let overhanging = BoundingBox {
            x: -5,
            y: 90,
            width: 30,
            height: 40,
        };
        assert_eq!(overhanging.clamp(100, 100), Some((0, 90, 25, 10)));

        let outside = BoundingBox {
            x: 120,
            y: 0,
            width: 30,
            height: 40,
        };
        assert_eq!(outside.clamp(100, 100), None);
        assert_eq!(outside.area(), 1200);
    }
}
