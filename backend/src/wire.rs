use crate::target::Target;

/// Servo angles are capped to the physical range of the sprayer gimbal.
const MAX_ANGLE: u8 = 180;

/// One newline-terminated ASCII message to the microcontroller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `"<x>,<y>\n"`, aim point in source-image pixel coordinates.
    Coordinate(Target),
    /// `"runesp2\n"`, tells the ESP to reposition before a capture.
    Trigger,
    /// `"<pan>,<tilt>\n"` on the 115200-baud link, 0-180 degrees.
    ServoAngles { pan: u8, tilt: u8 },
    /// `"SPEED:<0-255>\n"` on the drive link.
    Speed(u8),
    /// `"DIR:<FORWARD|BACKWARD|STOP>\n"` on the drive link.
    Direction(Direction),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
    Stop,
}

impl Direction {
    fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "FORWARD",
            Direction::Backward => "BACKWARD",
            Direction::Stop => "STOP",
        }
    }
}

impl Command {
    /// Clamps both angles into the servo range.
    pub fn servo(pan: i32, tilt: i32) -> Self {
        Command::ServoAngles {
            pan: pan.clamp(0, MAX_ANGLE as i32) as u8,
            tilt: tilt.clamp(0, MAX_ANGLE as i32) as u8,
        }
    }

    /// Wire bytes, newline terminator included.
    pub fn encode(&self) -> String {
        match self {
            Command::Coordinate(target) => format!("{},{}\n", target.x, target.y),
            Command::Trigger => "runesp2\n".to_string(),
            Command::ServoAngles { pan, tilt } => {
                format!("{},{}\n", pan.min(&MAX_ANGLE), tilt.min(&MAX_ANGLE))
            }
            Command::Speed(value) => format!("SPEED:{value}\n"),
            Command::Direction(dir) => format!("DIR:{}\n", dir.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinate_wire_bytes_are_exact() {
        let cmd = Command::Coordinate(Target {
            x: 120,
            y: 45,
            class_id: 0,
        });
        assert_eq!(cmd.encode().as_bytes(), b"120,45\n");
    }

    #[test]
    fn trigger_is_the_literal_string() {
        assert_eq!(Command::Trigger.encode(), "runesp2\n");
    }

    #[test]
    fn servo_angles_clamp_to_range() {
        assert_eq!(Command::servo(200, 90).encode(), "180,90\n");
        assert_eq!(Command::servo(-5, 0).encode(), "0,0\n");
    }

    #[test]
    fn drive_commands_serialize_exactly() {
        assert_eq!(Command::Speed(128).encode(), "SPEED:128\n");
        assert_eq!(Command::Direction(Direction::Forward).encode(), "DIR:FORWARD\n");
        assert_eq!(
            Command::Direction(Direction::Backward).encode(),
            "DIR:BACKWARD\n"
        );
        assert_eq!(Command::Direction(Direction::Stop).encode(), "DIR:STOP\n");
    }
}
