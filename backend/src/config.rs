use std::time::Duration;

// Files
pub const MODEL_FILE: &str = "novlast.onnx";
pub const CLASSES_FILE: &str = "classes.names";

// Detector thresholds
pub const CONF_THRESHOLD: f32 = 0.0; // accept-all, filtering happens downstream
pub const NMS_THRESHOLD: f32 = 0.4;
pub const INPUT_SIZE: i32 = 640;

// Serial links
pub const COORD_BAUD: u32 = 9_600; // coordinate + drive protocol
pub const SERVO_BAUD: u32 = 115_200; // direct servo-angle protocol

pub const CAMERA_ID: i32 = 0;
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);
