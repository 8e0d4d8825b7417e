//! Snapshot-triggered detection pipeline.
//!
//! State machine:
//!
//! ```text
//! Idle --trigger--> AwaitingDetection --batch--> Ready
//!                         ^                        |
//!                         +--------trigger---------+
//! ```
//!
//! One mutex guards the state, the current snapshot and the completed
//! result; a condition variable wakes blocked queries on the move to
//! `Ready`. Mask reconstruction and compositing run outside the lock and
//! are committed only if no newer trigger superseded their snapshot.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::circle::{run_circle_path, BlobDetector, BlobParams};
use crate::compose::{composite, label_text, PaletteSource};
use crate::detect::{reconstruct, DetectionBatch};
use crate::error::{PipelineError, Result};
use crate::frame::{ColorFrame, DepthFrame, FrameBuffer, Snapshot};
use crate::ingest::{decode_color, decode_depth, RawImage};
use crate::select::{build_results, select_closest, DepthPolicy, DepthPose, DetectionResult, ObjectSummary};
use crate::transport::{CycleStatus, PipelineSink};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    AwaitingDetection,
    Ready,
}

#[derive(Clone, Debug, Default)]
pub struct PipelineSettings {
    pub depth_policy: DepthPolicy,
    pub palette: PaletteSource,
    /// Run the auxiliary circle path on every color frame.
    pub circle: Option<BlobParams>,
}

/// Outcome of one finished detection cycle.
#[derive(Debug)]
pub struct CompletedCycle {
    /// Trigger count that produced this cycle.
    pub generation: u64,
    pub results: DetectionResult,
    pub composite: Arc<ColorFrame>,
}

struct Cycle {
    state: PipelineState,
    generation: u64,
    snapshot: Option<Snapshot>,
    completed: Option<Arc<CompletedCycle>>,
}

pub struct DetectionPipeline {
    frames: FrameBuffer,
    cycle: Mutex<Cycle>,
    ready: Condvar,
    sink: Arc<dyn PipelineSink>,
    depth_policy: DepthPolicy,
    palette: PaletteSource,
    circle: Option<BlobDetector>,
}

impl DetectionPipeline {
    pub fn new(settings: PipelineSettings, sink: Arc<dyn PipelineSink>) -> Self {
        Self {
            frames: FrameBuffer::new(),
            cycle: Mutex::new(Cycle {
                state: PipelineState::Idle,
                generation: 0,
                snapshot: None,
                completed: None,
            }),
            ready: Condvar::new(),
            sink,
            depth_policy: settings.depth_policy,
            palette: settings.palette,
            circle: settings.circle.map(BlobDetector::new),
        }
    }

    pub fn frames(&self) -> &FrameBuffer {
        &self.frames
    }

    pub fn state(&self) -> PipelineState {
        self.lock().state
    }

    // ------------------------------------------------------------------
    // Frame feeds
    // ------------------------------------------------------------------

    /// Decode and store a color message. A bad message leaves the previous frame in place.
    pub fn on_color_image(&self, msg: &RawImage) -> anyhow::Result<()> {
        let frame = decode_color(msg)?;
        self.update_color(frame);
        Ok(())
    }

    /// Decode and store a depth message. A bad message leaves the previous frame in place.
    pub fn on_depth_image(&self, msg: &RawImage) -> anyhow::Result<()> {
        let frame = decode_depth(msg)?;
        self.update_depth(frame);
        Ok(())
    }

    pub fn update_color(&self, frame: ColorFrame) {
        if let Some(detector) = &self.circle {
            let depth = self.frames.latest_depth();
            let outcome = run_circle_path(detector, &frame, depth.as_deref());
            if let Some(pose) = outcome.pose {
                self.sink.circle_pose(pose);
            }
            self.sink.circle_result(Arc::new(outcome.image));
        }
        self.frames.update_color(frame);
    }

    pub fn update_depth(&self, frame: DepthFrame) {
        self.frames.update_depth(frame);
    }

    // ------------------------------------------------------------------
    // Cycle
    // ------------------------------------------------------------------

    /// Freeze a snapshot and hand its color frame to the detector.
    ///
    /// Returns the new cycle's generation. Any previous result is discarded.
    pub fn trigger(&self) -> Result<u64> {
        let snapshot = self.frames.snapshot()?;
        let (cw, ch) = snapshot.dimensions();
        let (dw, dh) = (snapshot.depth().width(), snapshot.depth().height());
        if (cw, ch) != (dw, dh) {
            log::warn!(
                "snapshot color {}x{} and depth {}x{} differ; depth outside the overlap is treated as missing",
                cw,
                ch,
                dw,
                dh
            );
        }

        let detector_input = snapshot.color_handle();
        let generation = {
            let mut cycle = self.lock();
            cycle.generation += 1;
            cycle.state = PipelineState::AwaitingDetection;
            cycle.snapshot = Some(snapshot);
            cycle.completed = None;
            cycle.generation
        };
        log::info!("snapshot #{} taken ({}x{})", generation, cw, ch);

        self.sink.detector_input(generation, detector_input);
        self.sink.cycle_status(CycleStatus::Searching);
        log::info!("  published color image to detector");
        Ok(generation)
    }

    /// Consume a detector batch for the pending snapshot.
    ///
    /// Ignored (with a warning) when no cycle is pending. A malformed batch
    /// aborts processing and leaves the cycle waiting for a valid one.
    pub fn on_detection_batch(&self, batch: &DetectionBatch) -> Result<()> {
        self.handle_batch(None, batch)
    }

    /// Like `on_detection_batch`, for a batch answering cycle `generation`.
    ///
    /// A batch for any other cycle is discarded, so a late answer to an
    /// earlier trigger is never applied to the current snapshot.
    pub fn on_detection_batch_for(&self, generation: u64, batch: &DetectionBatch) -> Result<()> {
        self.handle_batch(Some(generation), batch)
    }

    fn handle_batch(&self, answering: Option<u64>, batch: &DetectionBatch) -> Result<()> {
        let (generation, snapshot) = {
            let cycle = self.lock();
            if let Some(answering) = answering.filter(|g| *g != cycle.generation) {
                log::warn!(
                    "detection batch for snapshot #{} discarded: current is #{}",
                    answering,
                    cycle.generation
                );
                return Ok(());
            }
            match (cycle.state, &cycle.snapshot) {
                (PipelineState::AwaitingDetection, Some(snapshot)) => {
                    (cycle.generation, snapshot.clone())
                }
                (PipelineState::Ready, _) => {
                    log::warn!(
                        "detection batch ignored: cycle #{} already completed",
                        cycle.generation
                    );
                    return Ok(());
                }
                _ => {
                    log::warn!("detection batch ignored: no snapshot pending");
                    return Ok(());
                }
            }
        };

        log::info!(
            "detection batch for snapshot #{}: {} objects",
            generation,
            batch.len()
        );
        let completed = match self.process(generation, &snapshot, batch) {
            Ok(completed) => completed,
            Err(err) => {
                log::warn!("detection batch rejected: {}", err);
                self.sink.cycle_status(CycleStatus::Rejected);
                return Err(err);
            }
        };

        let completed = Arc::new(completed);
        {
            let mut cycle = self.lock();
            if cycle.generation != generation || cycle.state != PipelineState::AwaitingDetection {
                log::debug!(
                    "result for snapshot #{} superseded by #{}",
                    generation,
                    cycle.generation
                );
                return Ok(());
            }
            cycle.completed = Some(Arc::clone(&completed));
            cycle.state = PipelineState::Ready;
        }
        self.ready.notify_all();

        let status = match completed.results.len() {
            0 => CycleStatus::NoResult,
            n => CycleStatus::Found(n),
        };
        self.sink.masked_result(Arc::clone(&completed.composite));
        self.sink.cycle_status(status);
        Ok(())
    }

    fn process(
        &self,
        generation: u64,
        snapshot: &Snapshot,
        batch: &DetectionBatch,
    ) -> Result<CompletedCycle> {
        let (width, height) = snapshot.dimensions();
        let masks = reconstruct(batch, width, height)?;

        if masks.is_empty() {
            log::info!("  nothing found");
            return Ok(CompletedCycle {
                generation,
                results: Vec::new(),
                composite: snapshot.color_handle(),
            });
        }

        let palette = self.palette.palette(masks.len());
        let image = composite(snapshot.color(), &masks, &batch.objects, &palette);
        let results = build_results(&masks, snapshot.depth(), &batch.objects, self.depth_policy);
        for (i, object) in batch.objects.iter().enumerate() {
            log::info!("  {}", label_text(i, object));
        }

        Ok(CompletedCycle {
            generation,
            results,
            composite: Arc::new(image),
        })
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Closest object of the current cycle, waiting up to `timeout` for it to complete.
    ///
    /// Does not change state: repeated queries on one `Ready` cycle agree.
    pub fn query(&self, timeout: Duration) -> Result<ObjectSummary> {
        let completed = self.wait_ready(timeout)?;
        let closest = select_closest(&completed.results)?.clone();
        log::info!(
            "closest object: #{} (type: '{}', depth: {})",
            closest.id,
            closest.name,
            closest.depth
        );
        Ok(closest)
    }

    /// Completed cycle, waiting up to `timeout` if one is pending.
    pub fn wait_ready(&self, timeout: Duration) -> Result<Arc<CompletedCycle>> {
        let cycle = self.lock();
        if cycle.state == PipelineState::Idle {
            return Err(PipelineError::NotTriggered);
        }
        if cycle.state == PipelineState::AwaitingDetection {
            log::debug!("waiting up to {:?} for cycle #{}", timeout, cycle.generation);
        }
        let (cycle, _) = self
            .ready
            .wait_timeout_while(cycle, timeout, |c| {
                c.state == PipelineState::AwaitingDetection
            })
            .unwrap_or_else(PoisonError::into_inner);

        match (&cycle.state, &cycle.completed) {
            (PipelineState::Ready, Some(completed)) => Ok(Arc::clone(completed)),
            _ => Err(PipelineError::Timeout(timeout)),
        }
    }

    /// Completed cycle, if the pipeline is `Ready`.
    pub fn latest_cycle(&self) -> Option<Arc<CompletedCycle>> {
        let cycle = self.lock();
        match cycle.state {
            PipelineState::Ready => cycle.completed.clone(),
            _ => None,
        }
    }

    /// Publish the pose of object `id` (1-based) from the current result set.
    pub fn publish_object(&self, id: usize) -> Result<DepthPose> {
        let completed = {
            let cycle = self.lock();
            match cycle.state {
                PipelineState::Idle => return Err(PipelineError::NotTriggered),
                PipelineState::AwaitingDetection => None,
                PipelineState::Ready => cycle.completed.clone(),
            }
        };
        let results = completed.as_ref().map(|c| c.results.as_slice()).unwrap_or(&[]);
        let summary = id
            .checked_sub(1)
            .and_then(|i| results.get(i))
            .ok_or(PipelineError::UnknownObject {
                id,
                max: results.len(),
            })?;

        let pose = summary.pose();
        self.sink.object_pose(pose);
        log::info!("published object #{} ({})", summary.id, summary.name);
        Ok(pose)
    }

    fn lock(&self) -> MutexGuard<'_, Cycle> {
        // State is only written in whole transitions under the lock.
        self.cycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, DetectedObject};
    use crate::transport::{ChannelSink, NullSink, PipelineOutput};

    fn pipeline() -> DetectionPipeline {
        DetectionPipeline::new(PipelineSettings::default(), Arc::new(NullSink))
    }

    fn feed(p: &DetectionPipeline, w: u32, h: u32) {
        p.update_color(ColorFrame::filled(w, h, [50, 50, 50]));
        p.update_depth(DepthFrame::filled(w, h, 2.0));
    }

    fn single_object(w: u32, h: u32) -> DetectionBatch {
        DetectionBatch::new(
            vec![DetectedObject {
                name: "cup".into(),
                likelihood: 0.8,
                bbox: BoundingBox::from_corners(0, 0, 2, 2),
            }],
            vec![1; (w * h) as usize],
        )
    }

    #[test]
    fn starts_idle_and_moves_through_states() {
        let p = pipeline();
        assert_eq!(p.state(), PipelineState::Idle);
        feed(&p, 4, 4);
        assert_eq!(p.trigger().unwrap(), 1);
        assert_eq!(p.state(), PipelineState::AwaitingDetection);
        p.on_detection_batch(&single_object(4, 4)).unwrap();
        assert_eq!(p.state(), PipelineState::Ready);
        assert_eq!(p.trigger().unwrap(), 2);
        assert_eq!(p.state(), PipelineState::AwaitingDetection);
        assert!(p.latest_cycle().is_none());
    }

    #[test]
    fn batch_while_idle_is_ignored() {
        let p = pipeline();
        feed(&p, 4, 4);
        p.on_detection_batch(&single_object(4, 4)).unwrap();
        assert_eq!(p.state(), PipelineState::Idle);
    }

    #[test]
    fn duplicate_batch_does_not_replace_ready_result() {
        let p = pipeline();
        feed(&p, 4, 4);
        p.trigger().unwrap();
        p.on_detection_batch(&single_object(4, 4)).unwrap();
        let first = p.latest_cycle().unwrap();

        p.on_detection_batch(&DetectionBatch::empty()).unwrap();
        let second = p.latest_cycle().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn late_batch_for_earlier_trigger_is_discarded() {
        let p = pipeline();
        feed(&p, 4, 4);
        let first = p.trigger().unwrap();
        let second = p.trigger().unwrap();

        p.on_detection_batch_for(first, &single_object(4, 4)).unwrap();
        assert_eq!(p.state(), PipelineState::AwaitingDetection);

        p.on_detection_batch_for(second, &single_object(4, 4)).unwrap();
        assert_eq!(p.state(), PipelineState::Ready);
        assert_eq!(p.latest_cycle().unwrap().generation, second);
    }

    #[test]
    fn malformed_batch_keeps_cycle_waiting() {
        let p = pipeline();
        feed(&p, 4, 4);
        p.trigger().unwrap();
        let mut bad = single_object(4, 4);
        bad.labels.pop();
        assert!(matches!(
            p.on_detection_batch(&bad),
            Err(PipelineError::MalformedBatch(_))
        ));
        assert_eq!(p.state(), PipelineState::AwaitingDetection);

        p.on_detection_batch(&single_object(4, 4)).unwrap();
        assert_eq!(p.query(Duration::from_millis(10)).unwrap().name, "cup");
    }

    #[test]
    fn publish_object_checks_ids() {
        let (sink, rx) = ChannelSink::new();
        let p = DetectionPipeline::new(PipelineSettings::default(), Arc::new(sink));
        assert_eq!(p.publish_object(1).unwrap_err(), PipelineError::NotTriggered);

        feed(&p, 4, 4);
        p.trigger().unwrap();
        assert_eq!(
            p.publish_object(1).unwrap_err(),
            PipelineError::UnknownObject { id: 1, max: 0 }
        );

        p.on_detection_batch(&single_object(4, 4)).unwrap();
        let pose = p.publish_object(1).unwrap();
        assert_eq!((pose.x, pose.y, pose.depth), (1, 1, 2.0));
        assert_eq!(
            p.publish_object(2).unwrap_err(),
            PipelineError::UnknownObject { id: 2, max: 1 }
        );
        assert_eq!(
            p.publish_object(0).unwrap_err(),
            PipelineError::UnknownObject { id: 0, max: 1 }
        );

        let poses: Vec<_> = rx
            .try_iter()
            .filter_map(|out| match out {
                PipelineOutput::ObjectPose(pose) => Some(pose),
                _ => None,
            })
            .collect();
        assert_eq!(poses, vec![pose]);
    }

    #[test]
    fn circle_path_runs_only_when_enabled() {
        let (sink, rx) = ChannelSink::new();
        let settings = PipelineSettings {
            circle: Some(BlobParams::default()),
            ..PipelineSettings::default()
        };
        let p = DetectionPipeline::new(settings, Arc::new(sink));
        feed(&p, 16, 16);
        assert!(rx
            .try_iter()
            .any(|out| matches!(out, PipelineOutput::CircleResult(_))));

        let (sink, rx) = ChannelSink::new();
        let p = DetectionPipeline::new(PipelineSettings::default(), Arc::new(sink));
        feed(&p, 16, 16);
        assert_eq!(rx.try_iter().count(), 0);
    }
}
