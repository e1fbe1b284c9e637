use std::fmt::{Display, Formatter};
use std::time::Duration;

use crate::cv::detector::Detection;
use crate::error::{CaptureError, SerialError};
use crate::link::Dispatch;
use crate::target::{extract, ClassFilter, Target, TargetQueue};
use crate::wire::Command;

pub trait FrameSource {
    type Frame;

    fn capture_one_frame(&mut self) -> Result<Self::Frame, CaptureError>;
}

pub trait Detector {
    type Frame;

    fn detect(&mut self, frame: &Self::Frame) -> crate::Result<Vec<Detection>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Queue empty: trigger, capture, detect, refill.
    Acquire,
    /// Queue non-empty: send one target per tick.
    Dispatch,
}

/// What the last tick did, in the words the status box shows the operator.
#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    Ready,
    NotConnected,
    TriggerFailed(String),
    FrameEmpty,
    CaptureFailed(String),
    DetectFailed(String),
    NoTargets,
    Refilled { total: usize },
    Sent(Target),
    Dropped { target: Target, reason: String },
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Ready => write!(f, "Ready"),
            Status::NotConnected => write!(f, "ESP is not connected"),
            Status::TriggerFailed(reason) => write!(f, "Trigger failed: {reason}"),
            Status::FrameEmpty => write!(f, "Captured frame is empty"),
            Status::CaptureFailed(reason) => write!(f, "Capture failed: {reason}"),
            Status::DetectFailed(reason) => write!(f, "Detection failed: {reason}"),
            Status::NoTargets => write!(f, "No targets detected"),
            Status::Refilled { total } => write!(f, "Queued {total} targets"),
            Status::Sent(target) => write!(f, "Sent coordinates: {target}"),
            Status::Dropped { target, reason } => {
                write!(f, "Dropped target {target}: {reason}")
            }
        }
    }
}

/// Drives the acquire/dispatch cycle: one tick either refills the queue from
/// a fresh frame or sends exactly one queued target. Per-tick failures land
/// in `status` and never abort the loop; queue misuse is a bug and does.
pub struct ControlLoop<S: FrameSource, D, L> {
    source: S,
    detector: D,
    link: L,
    queue: TargetQueue,
    filter: ClassFilter,
    tick_interval: Duration,
    state: State,
    status: Status,
    cycle_total: usize,
    last_capture: Option<(S::Frame, Vec<Detection>)>,
}

impl<S, D, L> ControlLoop<S, D, L>
where
    S: FrameSource,
    D: Detector<Frame = S::Frame>,
    L: Dispatch,
{
    pub fn new(source: S, detector: D, link: L, filter: ClassFilter, tick_interval: Duration) -> Self {
        Self {
            source,
            detector,
            link,
            queue: TargetQueue::default(),
            filter,
            tick_interval,
            state: State::Acquire,
            status: Status::Ready,
            cycle_total: 0,
            last_capture: None,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Targets queued by the current cycle's refill, for progress display.
    pub fn cycle_total(&self) -> usize {
        self.cycle_total
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    pub fn set_tick_interval(&mut self, interval: Duration) {
        self.tick_interval = interval;
    }

    pub fn set_filter(&mut self, filter: ClassFilter) {
        self.filter = filter;
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Hands the most recent frame and its detections to the caller, for
    /// overlay drawing and label export.
    pub fn take_capture(&mut self) -> Option<(S::Frame, Vec<Detection>)> {
        self.last_capture.take()
    }

    pub fn tick(&mut self) -> crate::Result<&Status> {
        match self.state {
            State::Acquire => self.acquire()?,
            State::Dispatch => self.dispatch()?,
        }
        Ok(&self.status)
    }

    fn acquire(&mut self) -> crate::Result<()> {
        // The reposition trigger goes out before the capture, once per cycle.
        if let Err(err) = self.link.send(&Command::Trigger) {
            tracing::warn!(%err, "trigger not sent");
            self.status = match err {
                SerialError::NotConnected => Status::NotConnected,
                other => Status::TriggerFailed(other.to_string()),
            };
            return Ok(());
        }

        let frame = match self.source.capture_one_frame() {
            Ok(frame) => frame,
            Err(CaptureError::EmptyFrame) => {
                tracing::warn!("captured frame is empty");
                self.status = Status::FrameEmpty;
                return Ok(());
            }
            Err(err) => {
                tracing::warn!(%err, "capture failed");
                self.status = Status::CaptureFailed(err.to_string());
                return Ok(());
            }
        };

        let detections = match self.detector.detect(&frame) {
            Ok(detections) => detections,
            Err(err) => {
                tracing::warn!(%err, "inference failed");
                self.status = Status::DetectFailed(err.to_string());
                return Ok(());
            }
        };

        let targets = extract(&detections, self.filter);
        self.last_capture = Some((frame, detections));

        if targets.is_empty() {
            self.status = Status::NoTargets;
            return Ok(());
        }

        let total = targets.len();
        self.queue.refill(targets)?;
        self.cycle_total = total;
        self.state = State::Dispatch;
        self.status = Status::Refilled { total };
        Ok(())
    }

    fn dispatch(&mut self) -> crate::Result<()> {
        let target = self.queue.pop_next()?;

        // no retry, a failed send drops the target
        match self.link.send(&Command::Coordinate(target)) {
            Ok(()) => {
                self.status = Status::Sent(target);
            }
            Err(err) => {
                tracing::warn!(%err, %target, "target dropped");
                self.status = Status::Dropped {
                    target,
                    reason: err.to_string(),
                };
            }
        }

        if self.queue.is_empty() {
            self.state = State::Acquire;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    struct TestFrame;

    #[derive(Default)]
    struct StubCamera {
        frames: VecDeque<Result<TestFrame, CaptureError>>,
        calls: usize,
    }

    impl FrameSource for StubCamera {
        type Frame = TestFrame;

        fn capture_one_frame(&mut self) -> Result<TestFrame, CaptureError> {
            self.calls += 1;
            self.frames.pop_front().unwrap_or(Err(CaptureError::EmptyFrame))
        }
    }

    #[derive(Default)]
    struct StubDetector {
        results: VecDeque<Vec<Detection>>,
    }

    impl Detector for StubDetector {
        type Frame = TestFrame;

        fn detect(&mut self, _frame: &TestFrame) -> crate::Result<Vec<Detection>> {
            Ok(self.results.pop_front().unwrap_or_default())
        }
    }

    #[derive(Default)]
    struct RecordingLink {
        sent: Vec<String>,
        down: bool,
    }

    impl Dispatch for RecordingLink {
        fn send(&mut self, command: &Command) -> Result<(), SerialError> {
            if self.down {
                return Err(SerialError::NotConnected);
            }
            self.sent.push(command.encode());
            Ok(())
        }
    }

    fn det(x1: i32, y1: i32, x2: i32, y2: i32, confidence: f32, class_id: i32) -> Detection {
        Detection {
            x1,
            y1,
            x2,
            y2,
            confidence,
            class_id,
            label: String::new(),
        }
    }

    fn spray_loop(
        frames: Vec<Result<TestFrame, CaptureError>>,
        results: Vec<Vec<Detection>>,
        filter: ClassFilter,
    ) -> ControlLoop<StubCamera, StubDetector, RecordingLink> {
        ControlLoop::new(
            StubCamera {
                frames: frames.into(),
                calls: 0,
            },
            StubDetector {
                results: results.into(),
            },
            RecordingLink::default(),
            filter,
            Duration::from_millis(10),
        )
    }

    #[test]
    fn full_cycle_dispatches_most_recent_target_first() {
        let detections = vec![det(10, 10, 30, 30, 0.9, 0), det(100, 100, 140, 180, 0.8, 1)];
        let mut spray = spray_loop(vec![Ok(TestFrame)], vec![detections], ClassFilter::All);

        spray.tick().unwrap();
        assert_eq!(spray.state(), State::Dispatch);
        assert_eq!(spray.queue_len(), 2);
        assert_eq!(*spray.status(), Status::Refilled { total: 2 });
        assert_eq!(spray.link().sent, vec!["runesp2\n"]);

        spray.tick().unwrap();
        assert_eq!(
            *spray.status(),
            Status::Sent(Target {
                x: 120,
                y: 140,
                class_id: 1
            })
        );
        assert_eq!(spray.link().sent[1], "120,140\n");
        assert_eq!(spray.state(), State::Dispatch);

        spray.tick().unwrap();
        assert_eq!(spray.link().sent[2], "20,20\n");
        assert_eq!(spray.queue_len(), 0);
        assert_eq!(spray.state(), State::Acquire);
    }

    #[test]
    fn empty_frame_skips_the_tick() {
        let mut spray = spray_loop(vec![Err(CaptureError::EmptyFrame)], vec![], ClassFilter::All);

        spray.tick().unwrap();

        assert_eq!(spray.state(), State::Acquire);
        assert_eq!(*spray.status(), Status::FrameEmpty);
        assert_eq!(spray.status().to_string(), "Captured frame is empty");
        // the trigger still went out first
        assert_eq!(spray.link().sent, vec!["runesp2\n"]);
    }

    #[test]
    fn disconnected_link_skips_the_capture() {
        let mut spray = spray_loop(vec![Ok(TestFrame)], vec![], ClassFilter::All);
        spray.link_mut().down = true;

        spray.tick().unwrap();

        assert_eq!(*spray.status(), Status::NotConnected);
        assert_eq!(spray.status().to_string(), "ESP is not connected");
        assert_eq!(spray.state(), State::Acquire);
        // trigger precedes capture, so the camera was never touched
        assert_eq!(spray.source_mut().calls, 0);
    }

    #[test]
    fn failed_send_drops_the_target() {
        let detections = vec![det(0, 0, 10, 10, 0.9, 0), det(20, 20, 40, 40, 0.9, 0)];
        let mut spray = spray_loop(vec![Ok(TestFrame)], vec![detections], ClassFilter::All);

        spray.tick().unwrap();
        assert_eq!(spray.queue_len(), 2);

        spray.link_mut().down = true;
        spray.tick().unwrap();

        // consumed, not restored
        assert_eq!(spray.queue_len(), 1);
        let expected = Target {
            x: 30,
            y: 30,
            class_id: 0,
        };
        assert!(matches!(spray.status(), Status::Dropped { target, .. } if *target == expected));

        spray.tick().unwrap();
        assert_eq!(spray.queue_len(), 0);
        assert_eq!(spray.state(), State::Acquire);
    }

    #[test]
    fn no_detections_stays_in_acquire() {
        let mut spray = spray_loop(vec![Ok(TestFrame)], vec![vec![]], ClassFilter::All);

        spray.tick().unwrap();

        assert_eq!(spray.state(), State::Acquire);
        assert_eq!(*spray.status(), Status::NoTargets);
        assert_eq!(spray.queue_len(), 0);
    }

    #[test]
    fn class_filter_limits_the_refill() {
        let detections = vec![det(0, 0, 10, 10, 0.9, 0), det(20, 20, 40, 40, 0.9, 1)];
        let mut spray = spray_loop(vec![Ok(TestFrame)], vec![detections], ClassFilter::Only(1));

        spray.tick().unwrap();

        assert_eq!(spray.queue_len(), 1);
        spray.tick().unwrap();
        assert_eq!(spray.link().sent[1], "30,30\n");
    }

    #[test]
    fn one_trigger_per_acquire_cycle() {
        let detections = vec![det(0, 0, 10, 10, 0.9, 0)];
        let mut spray = spray_loop(
            vec![Ok(TestFrame), Ok(TestFrame)],
            vec![detections, vec![]],
            ClassFilter::All,
        );

        spray.tick().unwrap(); // acquire + refill
        spray.tick().unwrap(); // dispatch the single target
        spray.tick().unwrap(); // acquire again

        let triggers = spray
            .link()
            .sent
            .iter()
            .filter(|msg| *msg == "runesp2\n")
            .count();
        assert_eq!(triggers, 2);
    }

    #[test]
    fn capture_surfaces_detections_for_overlay() {
        let detections = vec![det(0, 0, 10, 10, 0.9, 0)];
        let mut spray = spray_loop(vec![Ok(TestFrame)], vec![detections.clone()], ClassFilter::All);

        spray.tick().unwrap();

        let (_, seen) = spray.take_capture().unwrap();
        assert_eq!(seen, detections);
        assert!(spray.take_capture().is_none());
    }
}
