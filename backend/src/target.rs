use std::fmt::{Display, Formatter};

use crate::cv::detector::Detection;
use crate::error::QueueError;

/// A dispatch-ready aim point: the integer midpoint of a detection's box,
/// in the source image's pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub x: i32,
    pub y: i32,
    pub class_id: i32,
}

impl Display for Target {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

impl From<&Detection> for Target {
    fn from(det: &Detection) -> Self {
        Self {
            x: (det.x1 + det.x2) / 2,
            y: (det.y1 + det.y2) / 2,
            class_id: det.class_id,
        }
    }
}

/// Which detection classes get sprayed. The GUI exposes this as the
/// "spray crops" / "spray weeds" choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClassFilter {
    #[default]
    All,
    Only(i32),
}

impl ClassFilter {
    pub fn accepts(&self, class_id: i32) -> bool {
        match self {
            ClassFilter::All => true,
            ClassFilter::Only(id) => *id == class_id,
        }
    }
}

/// Map detections to aim points, preserving input order.
pub fn extract(detections: &[Detection], filter: ClassFilter) -> Vec<Target> {
    detections
        .iter()
        .filter(|det| filter.accepts(det.class_id))
        .map(Target::from)
        .collect()
}

/// Pending aim points awaiting dispatch. Refilled only when empty, drained
/// one target per tick, most recent detection first.
#[derive(Debug, Default)]
pub struct TargetQueue {
    targets: Vec<Target>,
}

impl TargetQueue {
    /// Appends all targets in extractor order. The queue must be empty;
    /// a refill over leftover targets is rejected and leaves it untouched.
    pub fn refill(&mut self, targets: Vec<Target>) -> Result<(), QueueError> {
        if !self.targets.is_empty() {
            return Err(QueueError::NonEmptyRefill);
        }
        self.targets = targets;
        Ok(())
    }

    /// Removes and returns the most recently appended target.
    pub fn pop_next(&mut self) -> Result<Target, QueueError> {
        self.targets.pop().ok_or(QueueError::Empty)
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x1: i32, y1: i32, x2: i32, y2: i32, class_id: i32) -> Detection {
        Detection {
            x1,
            y1,
            x2,
            y2,
            confidence: 0.9,
            class_id,
            label: String::new(),
        }
    }

    #[test]
    fn extract_takes_integer_midpoints_in_order() {
        let detections = [det(10, 10, 30, 30, 0), det(100, 100, 140, 180, 1)];
        let targets = extract(&detections, ClassFilter::All);

        assert_eq!(
            targets,
            vec![
                Target {
                    x: 20,
                    y: 20,
                    class_id: 0
                },
                Target {
                    x: 120,
                    y: 140,
                    class_id: 1
                },
            ]
        );
    }

    #[test]
    fn extract_truncates_odd_midpoints() {
        let targets = extract(&[det(0, 0, 5, 7, 0)], ClassFilter::All);
        assert_eq!(targets[0].x, 2);
        assert_eq!(targets[0].y, 3);
    }

    #[test]
    fn extract_filters_by_class() {
        let detections = [det(0, 0, 10, 10, 0), det(20, 20, 30, 30, 1)];
        let targets = extract(&detections, ClassFilter::Only(1));

        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].class_id, 1);
    }

    #[test]
    fn queue_pops_most_recent_first() {
        let t1 = Target {
            x: 1,
            y: 1,
            class_id: 0,
        };
        let t2 = Target {
            x: 2,
            y: 2,
            class_id: 0,
        };
        let t3 = Target {
            x: 3,
            y: 3,
            class_id: 0,
        };

        let mut queue = TargetQueue::default();
        queue.refill(vec![t1, t2, t3]).unwrap();

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop_next().unwrap(), t3);
        assert_eq!(queue.pop_next().unwrap(), t2);
        assert_eq!(queue.pop_next().unwrap(), t1);
        assert!(queue.is_empty());
    }

    #[test]
    fn refill_on_non_empty_queue_is_rejected() {
        let t = Target {
            x: 5,
            y: 5,
            class_id: 0,
        };

        let mut queue = TargetQueue::default();
        queue.refill(vec![t]).unwrap();

        let err = queue
            .refill(vec![Target {
                x: 9,
                y: 9,
                class_id: 0,
            }])
            .unwrap_err();
        assert!(matches!(err, QueueError::NonEmptyRefill));

        // contents unchanged by the failed call
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop_next().unwrap(), t);
    }

    #[test]
    fn pop_on_empty_queue_is_rejected() {
        let mut queue = TargetQueue::default();
        assert!(matches!(queue.pop_next(), Err(QueueError::Empty)));
    }
}
