use opencv::core::{convert_scale_abs, Point, Rect, Scalar, Size};
use opencv::imgproc::{
    cvt_color, put_text, rectangle, resize, FONT_HERSHEY_SIMPLEX, INTER_AREA, INTER_LINEAR,
    LINE_8,
};
use opencv::prelude::{Mat, MatTraitConst, MatTraitConstManual, VideoCaptureTrait};
use opencv::videoio;
use opencv::videoio::VideoCapture;

use crate::control::FrameSource;
use crate::cv::detector::Detection;
use crate::error::CaptureError;

pub mod detector;

pub fn to_rgba(frame: &Mat, code: i32) -> crate::Result<Mat> {
    let mut rgba_frame = Mat::default();
    cvt_color(&frame, &mut rgba_frame, code, 0)?;

    Ok(rgba_frame)
}

pub fn mat_size_and_vec(mat: &Mat) -> crate::Result<([usize; 2], Vec<u8>)> {
    assert!(mat.is_continuous());

    Ok((
        [mat.cols() as usize, mat.rows() as usize],
        mat.data_bytes()?.into(),
    ))
}

pub struct Camera {
    pub source: Option<VideoCapture>,
    zoom: i32,
    brightness: i32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            source: None,
            zoom: 1,
            brightness: 50,
        }
    }
}

impl Camera {
    // TODO: enumerate cameras so the UI can offer a picker like the serial ports
    pub fn connect(&mut self, camera_id: i32) -> crate::Result<()> {
        self.source = Some(VideoCapture::new(camera_id, videoio::CAP_ANY)?);

        Ok(())
    }

    pub fn disconnect(&mut self) -> crate::Result<()> {
        if let Some(src) = &mut self.source {
            src.release()?;
        }
        self.source = None;

        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.source.is_some()
    }

    /// Zoom 1-5x, brightness 0-100 with 50 as neutral.
    pub fn set_adjustments(&mut self, zoom: i32, brightness: i32) {
        self.zoom = zoom.clamp(1, 5);
        self.brightness = brightness.clamp(0, 100);
    }

    /// Grabs a single frame, normalized to 640x480 with the current zoom and
    /// brightness applied. An empty grab is a recoverable error, the caller
    /// skips the tick.
    pub fn capture_one_frame(&mut self) -> Result<Mat, CaptureError> {
        let src = self.source.as_mut().ok_or(CaptureError::NotConnected)?;

        let mut frame = Mat::default();
        let grabbed = src.read(&mut frame)?;
        if !grabbed || frame.empty() {
            return Err(CaptureError::EmptyFrame);
        }

        let mut resized = Mat::default();
        resize(&frame, &mut resized, Size::new(640, 480), 0., 0., INTER_AREA)?;

        self.adjust(&resized)
    }

    fn adjust(&self, frame: &Mat) -> Result<Mat, CaptureError> {
        let zoomed = if self.zoom > 1 {
            let width = frame.cols() / self.zoom;
            let height = frame.rows() / self.zoom;
            let x = (frame.cols() - width) / 2;
            let y = (frame.rows() - height) / 2;

            let roi = Mat::roi(frame, Rect::new(x, y, width, height))?;
            let mut out = Mat::default();
            resize(&roi, &mut out, frame.size()?, 0., 0., INTER_LINEAR)?;
            out
        } else {
            frame.clone()
        };

        let beta = f64::from((self.brightness - 50) * 2);
        let mut adjusted = Mat::default();
        convert_scale_abs(&zoomed, &mut adjusted, 1.0, beta)?;

        Ok(adjusted)
    }
}

impl FrameSource for Camera {
    type Frame = Mat;

    fn capture_one_frame(&mut self) -> Result<Mat, CaptureError> {
        Camera::capture_one_frame(self)
    }
}

/// Boxes and labels drawn onto a copy of the frame, crop detections in red,
/// everything else in green.
pub fn draw_detections(frame: &Mat, detections: &[Detection]) -> crate::Result<Mat> {
    let mut out = Mat::clone(frame);

    for det in detections {
        let color = if det.class_id == 0 {
            Scalar::new(0., 0., 255., 0.)
        } else {
            Scalar::new(0., 240., 0., 0.)
        };

        let bbox = Rect::new(det.x1, det.y1, det.x2 - det.x1, det.y2 - det.y1);
        rectangle(&mut out, bbox, color, 2, LINE_8, 0)?;

        let text = format!("{}: {:.2}", det.label, det.confidence);
        put_text(
            &mut out,
            &text,
            Point::new(det.x1, det.y1 - 10),
            FONT_HERSHEY_SIMPLEX,
            0.5,
            color,
            2,
            LINE_8,
            false,
        )?;
    }

    Ok(out)
}
