//! Detection engine thread.
//!
//! Frame decode, face extraction and matching are CPU-bound, so they run on a
//! dedicated OS thread that owns the extractor; async handlers talk to it
//! through a bounded request channel and oneshot replies. One request runs to
//! completion before the next is taken — a slow frame delays the next, nothing
//! is cancelled mid-pipeline.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use rollcall_core::{pipeline, FeatureExtractor, FeatureVector, FrameAnalysis, GallerySnapshot};
use rollcall_core::pipeline::PipelineError;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from handlers to the engine thread.
enum EngineRequest {
    Analyze {
        image: Vec<u8>,
        gallery: Arc<GallerySnapshot>,
        tolerance: f32,
        divisor: u32,
        reply: oneshot::Sender<Result<FrameAnalysis, EngineError>>,
    },
    Encode {
        image: Vec<u8>,
        reply: oneshot::Sender<Result<FeatureVector, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Decode a transport-encoded frame and match every face in it.
    pub async fn analyze(
        &self,
        image: Vec<u8>,
        gallery: Arc<GallerySnapshot>,
        tolerance: f32,
        divisor: u32,
    ) -> Result<FrameAnalysis, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Analyze {
                image,
                gallery,
                tolerance,
                divisor,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Decode an enrollment photo and extract its single face's vector.
    pub async fn encode(&self, image: Vec<u8>) -> Result<FeatureVector, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Encode {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread owning the extractor.
pub fn spawn_engine(extractor: Box<dyn FeatureExtractor + Send>) -> EngineHandle {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            let mut extractor = extractor;
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Analyze {
                        image,
                        gallery,
                        tolerance,
                        divisor,
                        reply,
                    } => {
                        let result =
                            run_analyze(extractor.as_mut(), &image, &gallery, tolerance, divisor);
                        let _ = reply.send(result);
                    }
                    EngineRequest::Encode { image, reply } => {
                        let result = run_encode(extractor.as_mut(), &image);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    EngineHandle { tx }
}

fn run_analyze(
    extractor: &mut dyn FeatureExtractor,
    image: &[u8],
    gallery: &GallerySnapshot,
    tolerance: f32,
    divisor: u32,
) -> Result<FrameAnalysis, EngineError> {
    let frame = pipeline::decode_frame(image)?;
    Ok(pipeline::analyze_frame(
        extractor, &frame, gallery, tolerance, divisor,
    )?)
}

fn run_encode(
    extractor: &mut dyn FeatureExtractor,
    image: &[u8],
) -> Result<FeatureVector, EngineError> {
    let frame = pipeline::decode_frame(image)?;
    Ok(pipeline::encode_single_face(extractor, &frame)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::extractor::{DetectedFace, ExtractorError};
    use rollcall_core::{FaceRegion, GalleryEntry};

    struct FixedExtractor {
        vector: Vec<f32>,
    }

    impl FeatureExtractor for FixedExtractor {
        fn extract(
            &mut self,
            _frame: &image::RgbImage,
        ) -> Result<Vec<DetectedFace>, ExtractorError> {
            Ok(vec![DetectedFace {
                region: FaceRegion::new(1, 4, 3, 2),
                vector: FeatureVector::new(self.vector.clone()),
            }])
        }
    }

    fn png_bytes() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(16, 16, image::Rgb([100, 100, 100]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[tokio::test]
    async fn test_analyze_roundtrip_through_engine() {
        let engine = spawn_engine(Box::new(FixedExtractor {
            vector: vec![0.0, 0.0],
        }));
        let gallery = Arc::new(
            GallerySnapshot::new(
                vec![FeatureVector::new(vec![0.1, 0.0])],
                vec![GalleryEntry {
                    student_id: 1,
                    name: "Ada Lovelace".into(),
                }],
            )
            .unwrap(),
        );

        let analysis = engine.analyze(png_bytes(), gallery, 0.5, 4).await.unwrap();
        assert_eq!(analysis.matches.len(), 1);
        assert_eq!(analysis.matches[0].student_id, 1);
        assert_eq!(analysis.matches[0].region, FaceRegion::new(4, 16, 12, 8));
    }

    #[tokio::test]
    async fn test_analyze_reports_decode_error() {
        let engine = spawn_engine(Box::new(FixedExtractor { vector: vec![0.0] }));
        let err = engine
            .analyze(b"not an image".to_vec(), Arc::new(GallerySnapshot::empty()), 0.5, 4)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Pipeline(PipelineError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_encode_single_face() {
        let engine = spawn_engine(Box::new(FixedExtractor {
            vector: vec![0.5, 0.25],
        }));
        let vector = engine.encode(png_bytes()).await.unwrap();
        assert_eq!(vector.values, vec![0.5, 0.25]);
    }
}
