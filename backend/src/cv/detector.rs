use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use opencv::core::{self, Rect, Scalar, Size, Vector};
use opencv::dnn::{self, Net, NetTrait};
use opencv::prelude::{Mat, MatTraitConst};

use crate::config;
use crate::control::Detector;
use crate::error::ModelLoadError;

/// A single model output: box corners in frame pixels, confidence and class.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
    pub confidence: f32,
    pub class_id: i32,
    pub label: String,
}

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub model_path: PathBuf,
    pub names_path: PathBuf,
    pub input_size: i32,
    pub conf_threshold: f32,
    pub nms_threshold: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(config::MODEL_FILE),
            names_path: PathBuf::from(config::CLASSES_FILE),
            input_size: config::INPUT_SIZE,
            conf_threshold: config::CONF_THRESHOLD,
            nms_threshold: config::NMS_THRESHOLD,
        }
    }
}

/// Wraps the pretrained detection network. Loaded once at startup; a load
/// failure is fatal.
pub struct YoloDetector {
    net: Net,
    classes: Vec<String>,
    input_size: i32,
    conf_threshold: f32,
    nms_threshold: f32,
}

impl YoloDetector {
    pub fn new(config: &DetectorConfig) -> Result<Self, ModelLoadError> {
        let classes = Self::load_classes(&config.names_path)?;

        let mut net = dnn::read_net_from_onnx(&config.model_path.to_string_lossy())
            .map_err(|source| ModelLoadError::Checkpoint {
                path: config.model_path.clone(),
                source,
            })?;
        net.set_preferable_backend(dnn::DNN_BACKEND_OPENCV)
            .map_err(|source| ModelLoadError::Checkpoint {
                path: config.model_path.clone(),
                source,
            })?;
        net.set_preferable_target(dnn::DNN_TARGET_CPU)
            .map_err(|source| ModelLoadError::Checkpoint {
                path: config.model_path.clone(),
                source,
            })?;

        tracing::info!(
            model = %config.model_path.display(),
            classes = classes.len(),
            "detector ready"
        );

        Ok(Self {
            net,
            classes,
            input_size: config.input_size,
            conf_threshold: config.conf_threshold,
            nms_threshold: config.nms_threshold,
        })
    }

    /// Runs one inference pass and returns the retained detections.
    pub fn detect(&mut self, frame: &Mat) -> crate::Result<Vec<Detection>> {
        let blob = dnn::blob_from_image(
            frame,
            1.0 / 255.0,
            Size::new(self.input_size, self.input_size),
            Scalar::default(),
            true,
            false,
            core::CV_32F,
        )?;

        self.net.set_input(&blob, "", 1.0, Scalar::default())?;

        let mut outputs = Vector::<Mat>::new();
        let out_names = self.net.get_unconnected_out_layers_names()?;
        self.net.forward(&mut outputs, &out_names)?;

        self.process_outputs(&outputs, frame)
    }

    /// The exported model emits one `[1, 4 + classes, candidates]` tensor;
    /// transpose so each row is a candidate before scanning.
    fn process_outputs(&self, outputs: &Vector<Mat>, frame: &Mat) -> crate::Result<Vec<Detection>> {
        let mut boxes = Vector::<Rect>::new();
        let mut confidences = Vector::<f32>::new();
        let mut class_ids = Vector::<i32>::new();

        let output = outputs.get(0)?;
        let channels = output.mat_size()[1];
        let mut pred = Mat::default();
        core::transpose(&output.reshape(1, channels)?, &mut pred)?;

        let x_factor = frame.cols() as f32 / self.input_size as f32;
        let y_factor = frame.rows() as f32 / self.input_size as f32;

        for row in 0..pred.rows() {
            let row_data = pred.at_row::<f32>(row)?;
            let (class_id, score) = self.get_best_class(&row_data[4..]);

            if score > self.conf_threshold {
                let bbox = self.calculate_bbox(row_data, x_factor, y_factor);
                boxes.push(bbox);
                confidences.push(score);
                class_ids.push(class_id);
            }
        }

        // Drop overlapping candidates for the same object
        let mut indices = Vector::<i32>::new();
        dnn::nms_boxes(
            &boxes,
            &confidences,
            self.conf_threshold,
            self.nms_threshold,
            &mut indices,
            1.0,
            0,
        )?;

        let mut results = Vec::new();
        for i in indices.iter() {
            let i = i as usize;
            let bbox = boxes.get(i)?;
            let cls_id = class_ids.get(i)?;

            results.push(Detection {
                x1: bbox.x,
                y1: bbox.y,
                x2: bbox.x + bbox.width,
                y2: bbox.y + bbox.height,
                confidence: confidences.get(i)?,
                class_id: cls_id,
                label: self
                    .classes
                    .get(cls_id as usize)
                    .cloned()
                    .unwrap_or_else(|| cls_id.to_string()),
            });
        }
        Ok(results)
    }

    fn get_best_class(&self, scores: &[f32]) -> (i32, f32) {
        let mut max_score = 0.0;
        let mut id = -1;
        for (i, &score) in scores.iter().enumerate() {
            if score > max_score {
                max_score = score;
                id = i as i32;
            }
        }
        (id, max_score)
    }

    fn calculate_bbox(&self, row_data: &[f32], x_factor: f32, y_factor: f32) -> Rect {
        let cx = row_data[0] * x_factor;
        let cy = row_data[1] * y_factor;
        let w = row_data[2] * x_factor;
        let h = row_data[3] * y_factor;
        Rect::new(
            (cx - w / 2.0) as i32,
            (cy - h / 2.0) as i32,
            w as i32,
            h as i32,
        )
    }

    fn load_classes(path: &Path) -> Result<Vec<String>, ModelLoadError> {
        let file = File::open(path).map_err(|source| ModelLoadError::Names {
            path: path.to_owned(),
            source,
        })?;
        let reader = BufReader::new(file);
        reader
            .lines()
            .collect::<Result<Vec<String>, _>>()
            .map_err(|source| ModelLoadError::Names {
                path: path.to_owned(),
                source,
            })
    }
}

impl Detector for YoloDetector {
    type Frame = Mat;

    fn detect(&mut self, frame: &Mat) -> crate::Result<Vec<Detection>> {
        YoloDetector::detect(self, frame)
    }
}
