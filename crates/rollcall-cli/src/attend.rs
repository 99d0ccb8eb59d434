//! Desktop attendance loop (sampling mode).
//!
//! Strictly sequential: capture, periodically detect-and-mark, periodically
//! refresh the overlay, one iteration per frame. Marking and overlay refresh
//! run on independent counters; neither is coupled to the other.

use std::collections::HashSet;

use tokio::sync::watch;

use rollcall_camera::FrameSource;
use rollcall_core::{pipeline, FeatureExtractor, FrameAnalysis, GallerySnapshot};
use rollcall_store::{AttendanceStore, SessionStats, StoreError};

pub struct AttendOptions {
    /// Mark attendance once every this many captured frames.
    pub detect_interval: u32,
    /// Refresh the overlay once every this many captured frames.
    pub display_interval: u32,
    pub tolerance: f32,
    pub downscale_divisor: u32,
}

impl Default for AttendOptions {
    fn default() -> Self {
        Self {
            detect_interval: 30,
            display_interval: 5,
            tolerance: rollcall_core::DEFAULT_TOLERANCE,
            downscale_divisor: rollcall_core::DEFAULT_DOWNSCALE_DIVISOR,
        }
    }
}

/// Run a live attendance session until the stop flag flips or the frame
/// source ends, then close the ledger session and return its stats.
pub async fn run_session<S: FrameSource>(
    source: &mut S,
    extractor: &mut dyn FeatureExtractor,
    store: &AttendanceStore,
    gallery: &GallerySnapshot,
    session_id: i64,
    options: &AttendOptions,
    stop: &watch::Receiver<bool>,
) -> Result<SessionStats, StoreError> {
    let detect_every = u64::from(options.detect_interval.max(1));
    let display_every = u64::from(options.display_interval.max(1));

    let mut marked: HashSet<i64> = HashSet::new();
    let mut frame_count: u64 = 0;

    loop {
        if *stop.borrow() {
            break;
        }
        let frame = match source.next_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "frame capture failed, ending session");
                break;
            }
        };
        frame_count += 1;

        if frame_count % detect_every == 0 {
            match pipeline::analyze_frame(
                extractor,
                &frame,
                gallery,
                options.tolerance,
                options.downscale_divisor,
            ) {
                Ok(analysis) => mark_matches(store, session_id, &analysis, &mut marked).await,
                Err(e) => tracing::warn!(error = %e, "detection pass failed"),
            }
        }

        if frame_count % display_every == 0 {
            match pipeline::analyze_frame(
                extractor,
                &frame,
                gallery,
                options.tolerance,
                options.downscale_divisor,
            ) {
                Ok(analysis) => print_overlay(&analysis, &marked),
                Err(e) => tracing::warn!(error = %e, "overlay pass failed"),
            }
        }
    }

    let stats = store.session_stats(session_id).await?;
    store.end_session(session_id).await?;
    Ok(stats)
}

async fn mark_matches(
    store: &AttendanceStore,
    session_id: i64,
    analysis: &FrameAnalysis,
    marked: &mut HashSet<i64>,
) {
    for face in &analysis.matches {
        if marked.contains(&face.student_id) {
            continue;
        }
        match store.mark_attendance(session_id, face.student_id).await {
            Ok(outcome) => {
                if outcome.newly_marked {
                    marked.insert(face.student_id);
                    println!("+ {} present ({:.1}%)", face.name, face.confidence);
                }
            }
            Err(e) => {
                tracing::warn!(student = face.student_id, error = %e, "failed to record attendance");
            }
        }
    }
}

fn print_overlay(analysis: &FrameAnalysis, marked: &HashSet<i64>) {
    for face in &analysis.matches {
        let tag = if marked.contains(&face.student_id) {
            "present"
        } else {
            "pending"
        };
        let r = face.region;
        println!(
            "  [{tag}] {} ({:.1}%) at ({},{},{},{})",
            face.name, face.confidence, r.top, r.right, r.bottom, r.left
        );
    }
    println!("present: {}", marked.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use image::RgbImage;

    use rollcall_camera::CameraError;
    use rollcall_core::extractor::{DetectedFace, ExtractorError};
    use rollcall_core::{FaceRegion, FeatureVector};
    use rollcall_store::NewStudent;

    /// Produces a fixed frame `remaining` times, then fails like a closed
    /// camera.
    struct ScriptedSource {
        remaining: u32,
        frame: RgbImage,
    }

    impl FrameSource for ScriptedSource {
        fn next_frame(&mut self) -> Result<RgbImage, CameraError> {
            if self.remaining == 0 {
                return Err(CameraError::CaptureFailed("end of stream".into()));
            }
            self.remaining -= 1;
            Ok(self.frame.clone())
        }
    }

    struct CountingExtractor {
        vector: Vec<f32>,
        calls: Arc<AtomicUsize>,
    }

    impl FeatureExtractor for CountingExtractor {
        fn extract(&mut self, _frame: &RgbImage) -> Result<Vec<DetectedFace>, ExtractorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![DetectedFace {
                region: FaceRegion::new(2, 8, 6, 4),
                vector: FeatureVector::new(self.vector.clone()),
            }])
        }
    }

    async fn store_with_student(vector: Vec<f32>) -> (AttendanceStore, i64) {
        let store = AttendanceStore::open_in_memory().await.unwrap();
        let id = store
            .add_student(NewStudent {
                first_name: "Ada".into(),
                last_name: "Lovelace".into(),
                email: "ada@example.com".into(),
                photo_path: None,
                vector: Some(FeatureVector::new(vector)),
            })
            .await
            .unwrap();
        (store, id)
    }

    #[tokio::test]
    async fn test_sampling_cadence_counters_are_independent() {
        let (store, _) = store_with_student(vec![0.1, 0.0]).await;
        let gallery = store.load_gallery().await.unwrap();
        let session = store.create_session(None, "algebra", None).await.unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let mut extractor = CountingExtractor {
            vector: vec![0.0, 0.0],
            calls: calls.clone(),
        };
        let mut source = ScriptedSource {
            remaining: 64,
            frame: RgbImage::from_pixel(32, 32, image::Rgb([120, 120, 120])),
        };
        let (_tx, rx) = watch::channel(false);

        let stats = run_session(
            &mut source,
            &mut extractor,
            &store,
            &gallery,
            session,
            &AttendOptions::default(),
            &rx,
        )
        .await
        .unwrap();

        // 64 frames: overlay at every 5th (12 passes), detection at every
        // 30th (2 passes) — independent counters, 14 extractions total.
        assert_eq!(calls.load(Ordering::SeqCst), 14);
        assert_eq!(stats.present, 1);
        assert_eq!(stats.total, 1);
    }

    #[tokio::test]
    async fn test_marks_each_student_once_per_session() {
        let (store, student) = store_with_student(vec![0.1, 0.0]).await;
        let gallery = store.load_gallery().await.unwrap();
        let session = store.create_session(None, "algebra", None).await.unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let mut extractor = CountingExtractor {
            vector: vec![0.0, 0.0],
            calls,
        };
        // Enough frames for three detection passes.
        let mut source = ScriptedSource {
            remaining: 95,
            frame: RgbImage::from_pixel(32, 32, image::Rgb([120, 120, 120])),
        };
        let (_tx, rx) = watch::channel(false);

        run_session(
            &mut source,
            &mut extractor,
            &store,
            &gallery,
            session,
            &AttendOptions::default(),
            &rx,
        )
        .await
        .unwrap();

        let rows = store.session_attendance(session).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].student_id, student);
        // Session was closed on exit.
        assert!(store.session(session).await.unwrap().end_time.is_some());
    }

    #[tokio::test]
    async fn test_stop_flag_ends_loop_immediately() {
        let (store, _) = store_with_student(vec![0.1, 0.0]).await;
        let gallery = store.load_gallery().await.unwrap();
        let session = store.create_session(None, "algebra", None).await.unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let mut extractor = CountingExtractor {
            vector: vec![0.0, 0.0],
            calls: calls.clone(),
        };
        let mut source = ScriptedSource {
            remaining: 1000,
            frame: RgbImage::from_pixel(32, 32, image::Rgb([120, 120, 120])),
        };
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let stats = run_session(
            &mut source,
            &mut extractor,
            &store,
            &gallery,
            session,
            &AttendOptions::default(),
            &rx,
        )
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(stats.present, 0);
    }
}
