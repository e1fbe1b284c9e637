use std::fmt::{Display, Formatter};
use std::str::FromStr;

use thiserror::Error;

use crate::cv::detector::Detection;

/// One bounding box in the label-file format the training tools consume:
/// `"<class_id> <x_center> <y_center> <width> <height>"`, geometry as [0,1]
/// fractions of the image dimensions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelBox {
    pub class_id: i32,
    pub x_center: f32,
    pub y_center: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Error)]
pub enum ParseLabelError {
    #[error("label line needs 5 fields, got {0}")]
    FieldCount(usize),
    #[error("malformed label field: {0}")]
    Field(String),
}

impl LabelBox {
    pub fn from_detection(det: &Detection, img_width: i32, img_height: i32) -> Self {
        let w = img_width as f32;
        let h = img_height as f32;
        Self {
            class_id: det.class_id,
            x_center: (det.x1 + det.x2) as f32 / 2.0 / w,
            y_center: (det.y1 + det.y2) as f32 / 2.0 / h,
            width: (det.x2 - det.x1) as f32 / w,
            height: (det.y2 - det.y1) as f32 / h,
        }
    }
}

impl Display for LabelBox {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {:.6} {:.6} {:.6} {:.6}",
            self.class_id, self.x_center, self.y_center, self.width, self.height
        )
    }
}

impl FromStr for LabelBox {
    type Err = ParseLabelError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(ParseLabelError::FieldCount(fields.len()));
        }

        let num = |s: &str| -> Result<f32, ParseLabelError> {
            s.parse().map_err(|_| ParseLabelError::Field(s.to_string()))
        };

        Ok(Self {
            class_id: fields[0]
                .parse()
                .map_err(|_| ParseLabelError::Field(fields[0].to_string()))?,
            x_center: num(fields[1])?,
            y_center: num(fields[2])?,
            width: num(fields[3])?,
            height: num(fields[4])?,
        })
    }
}

/// Render a frame's detections as label lines, one per box.
pub fn export_labels(detections: &[Detection], img_width: i32, img_height: i32) -> String {
    detections
        .iter()
        .map(|det| format!("{}\n", LabelBox::from_detection(det, img_width, img_height)))
        .collect()
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
            confidence: 0.8,
            class_id,
            label: String::new(),
        }
    }

    #[test]
    fn detection_normalizes_to_image_dimensions() {
        let label = LabelBox::from_detection(&det(160, 120, 480, 360, 1), 640, 480);

        assert_eq!(label.class_id, 1);
        assert!((label.x_center - 0.5).abs() < 1e-6);
        assert!((label.y_center - 0.5).abs() < 1e-6);
        assert!((label.width - 0.5).abs() < 1e-6);
        assert!((label.height - 0.5).abs() < 1e-6);
    }

    #[test]
    fn label_line_parses() {
        let label: LabelBox = "0 0.500000 0.250000 0.100000 0.200000".parse().unwrap();
        assert_eq!(label.class_id, 0);
        assert!((label.x_center - 0.5).abs() < 1e-6);
        assert!((label.height - 0.2).abs() < 1e-6);
    }

    #[test]
    fn short_line_is_rejected() {
        let err = "0 0.5 0.5".parse::<LabelBox>().unwrap_err();
        assert!(matches!(err, ParseLabelError::FieldCount(3)));
    }

    #[test]
    fn export_emits_one_line_per_detection() {
        let out = export_labels(&[det(0, 0, 320, 240, 0), det(320, 240, 640, 480, 1)], 640, 480);
        let lines: Vec<&str> = out.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("0 "));
        assert!(lines[1].starts_with("1 "));
    }
}
