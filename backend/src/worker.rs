use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use opencv::imgproc::COLOR_BGR2RGBA;
use opencv::prelude::Mat;

use crate::annotation::export_labels;
use crate::config;
use crate::control::ControlLoop;
use crate::cv::detector::{Detection, DetectorConfig, YoloDetector};
use crate::cv::{draw_detections, mat_size_and_vec, to_rgba, Camera};
use crate::link::{Dispatch, SprayerLink};
use crate::target::ClassFilter;
use crate::wire::Command;

pub enum WorkerCommand {
    ConnectSerial { port: PathBuf, baud: u32 },
    DisconnectSerial,
    Start { filter: ClassFilter },
    Stop,
    SetTickInterval(Duration),
    SetCamera { zoom: i32, brightness: i32 },
    /// One-off manual command (drive, servo test). Routed through the worker
    /// so manual sends and timer ticks never interleave on the port.
    Send(Command),
    /// Write the last capture's detections as label lines.
    SaveLabels(PathBuf),
    Shutdown,
}

pub enum WorkerEvent {
    Status(String),
    Progress { total: usize, remaining: usize },
    Frame { size: [usize; 2], rgba: Vec<u8> },
}

/// Handle to the background thread that owns the camera, the model and the
/// serial port. The GUI never touches any of those directly; it sends
/// commands and drains events.
pub struct SprayWorker {
    commands: Sender<WorkerCommand>,
    events: Receiver<WorkerEvent>,
    handle: Option<JoinHandle<()>>,
}

impl SprayWorker {
    /// Loads the model before any thread is spawned; a missing or corrupt
    /// checkpoint aborts startup.
    pub fn spawn(detector_config: &DetectorConfig, camera_id: i32) -> crate::Result<Self> {
        let detector = YoloDetector::new(detector_config)?;
        let spray = ControlLoop::new(
            Camera::default(),
            detector,
            SprayerLink::default(),
            ClassFilter::default(),
            config::TICK_INTERVAL,
        );

        let (command_tx, command_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();

        let handle = thread::Builder::new()
            .name("spray-worker".into())
            .spawn(move || worker_main(spray, camera_id, command_rx, event_tx))?;

        Ok(Self {
            commands: command_tx,
            events: event_rx,
            handle: Some(handle),
        })
    }

    pub fn send(&self, command: WorkerCommand) {
        let _ = self.commands.send(command);
    }

    pub fn poll_events(&self) -> Vec<WorkerEvent> {
        self.events.try_iter().collect()
    }
}

impl Drop for SprayWorker {
    fn drop(&mut self) {
        let _ = self.commands.send(WorkerCommand::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

type SprayLoop = ControlLoop<Camera, YoloDetector, SprayerLink>;

fn worker_main(
    mut spray: SprayLoop,
    camera_id: i32,
    commands: Receiver<WorkerCommand>,
    events: Sender<WorkerEvent>,
) {
    let mut running = false;
    let mut last_detections: Vec<Detection> = Vec::new();
    let mut frame_size = [640usize, 480];

    loop {
        let timeout = if running {
            spray.tick_interval()
        } else {
            Duration::from_millis(100)
        };

        match commands.recv_timeout(timeout) {
            Ok(WorkerCommand::ConnectSerial { port, baud }) => {
                let status = match spray.link_mut().open(&port, baud) {
                    Ok(()) => format!("Connected to {}", port.display()),
                    Err(err) => err.to_string(),
                };
                let _ = events.send(WorkerEvent::Status(status));
            }
            Ok(WorkerCommand::DisconnectSerial) => {
                spray.link_mut().close();
                let _ = events.send(WorkerEvent::Status("Disconnected".into()));
            }
            Ok(WorkerCommand::Start { filter }) => {
                spray.set_filter(filter);
                if !spray.source_mut().is_connected() {
                    if let Err(err) = spray.source_mut().connect(camera_id) {
                        let _ = events.send(WorkerEvent::Status(format!(
                            "Could not open camera: {err}"
                        )));
                        continue;
                    }
                }
                running = true;
                let _ = events.send(WorkerEvent::Status("Spraying started".into()));
            }
            Ok(WorkerCommand::Stop) => {
                running = false;
                let _ = events.send(WorkerEvent::Status("Spraying stopped".into()));
            }
            Ok(WorkerCommand::SetTickInterval(interval)) => {
                spray.set_tick_interval(interval);
            }
            Ok(WorkerCommand::SetCamera { zoom, brightness }) => {
                spray.source_mut().set_adjustments(zoom, brightness);
            }
            Ok(WorkerCommand::Send(command)) => {
                let status = match spray.link_mut().send(&command) {
                    Ok(()) => format!("Sent: {}", command.encode().trim_end()),
                    Err(err) => err.to_string(),
                };
                let _ = events.send(WorkerEvent::Status(status));
            }
            Ok(WorkerCommand::SaveLabels(path)) => {
                let text = export_labels(
                    &last_detections,
                    frame_size[0] as i32,
                    frame_size[1] as i32,
                );
                let status = match std::fs::write(&path, text) {
                    Ok(()) => format!(
                        "Saved {} labels to {}",
                        last_detections.len(),
                        path.display()
                    ),
                    Err(err) => format!("Could not save labels: {err}"),
                };
                let _ = events.send(WorkerEvent::Status(status));
            }
            Ok(WorkerCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                if !running {
                    continue;
                }

                match spray.tick() {
                    Ok(status) => {
                        let _ = events.send(WorkerEvent::Status(status.to_string()));
                    }
                    Err(err) => {
                        // queue misuse is a bug, stop the loop
                        tracing::error!(%err, "control loop fault");
                        let _ = events.send(WorkerEvent::Status(format!("Fatal: {err}")));
                        break;
                    }
                }

                let _ = events.send(WorkerEvent::Progress {
                    total: spray.cycle_total(),
                    remaining: spray.queue_len(),
                });

                if let Some((frame, detections)) = spray.take_capture() {
                    match render_frame(&frame, &detections) {
                        Ok((size, rgba)) => {
                            last_detections = detections;
                            frame_size = size;
                            let _ = events.send(WorkerEvent::Frame { size, rgba });
                        }
                        Err(err) => tracing::warn!(%err, "overlay failed"),
                    }
                }
            }
        }
    }
    // dropping the loop here releases the camera and closes the serial port
}

fn render_frame(frame: &Mat, detections: &[Detection]) -> crate::Result<([usize; 2], Vec<u8>)> {
    let annotated = draw_detections(frame, detections)?;
    let rgba = to_rgba(&annotated, COLOR_BGR2RGBA)?;
    mat_size_and_vec(&rgba)
}
