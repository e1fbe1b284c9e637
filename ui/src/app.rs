use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use backend::target::ClassFilter;
use backend::wire::{Command, Direction};
use backend::worker::{SprayWorker, WorkerCommand, WorkerEvent};
use backend::{config, list_devices};
use eframe::egui::{ImageData, Slider, Ui};
use eframe::{
    egui::{self, Color32, ColorImage, Context, TextureHandle, TextureOptions},
    Frame, Storage,
};

#[derive(serde::Deserialize, serde::Serialize, Clone, Copy, PartialEq, Eq)]
enum SprayTarget {
    Crops,
    Weeds,
    Everything,
}

impl SprayTarget {
    fn filter(self) -> ClassFilter {
        match self {
            SprayTarget::Crops => ClassFilter::Only(0),
            SprayTarget::Weeds => ClassFilter::Only(1),
            SprayTarget::Everything => ClassFilter::All,
        }
    }

    fn label(self) -> &'static str {
        match self {
            SprayTarget::Crops => "Crops",
            SprayTarget::Weeds => "Weeds",
            SprayTarget::Everything => "Everything",
        }
    }
}

#[derive(serde::Deserialize, serde::Serialize)]
struct SpraySettings {
    target: SprayTarget,
    tick_secs: f32,
    zoom: i32,
    brightness: i32,
    baud: u32,
}

impl Default for SpraySettings {
    fn default() -> Self {
        Self {
            target: SprayTarget::Weeds,
            tick_secs: 1.0,
            zoom: 1,
            brightness: 50,
            baud: config::COORD_BAUD,
        }
    }
}

pub(crate) struct App {
    worker: SprayWorker,
    tex_handler: Option<TextureHandle>,
    pending_frame: Option<([usize; 2], Vec<u8>)>,
    port: Option<PathBuf>,

    settings: SpraySettings,
    spraying: bool,

    status: String,
    total: usize,
    remaining: usize,

    speed: u8,
    pan: i32,
    tilt: i32,
    labels_path: String,
}

impl App {
    pub(crate) fn new(cc: &eframe::CreationContext, worker: SprayWorker) -> Self {
        let settings: SpraySettings = cc
            .storage
            .and_then(|s| eframe::get_value(s, "spray-settings"))
            .unwrap_or_default();

        worker.send(WorkerCommand::SetCamera {
            zoom: settings.zoom,
            brightness: settings.brightness,
        });
        worker.send(WorkerCommand::SetTickInterval(Duration::from_secs_f32(
            settings.tick_secs,
        )));

        Self {
            worker,
            tex_handler: None,
            pending_frame: None,
            port: None,
            settings,
            spraying: false,
            status: "Ready".to_string(),
            total: 0,
            remaining: 0,
            speed: 0,
            pan: 90,
            tilt: 90,
            labels_path: "capture_labels.txt".to_string(),
        }
    }

    fn drain_events(&mut self) {
        for event in self.worker.poll_events() {
            match event {
                WorkerEvent::Status(status) => self.status = status,
                WorkerEvent::Progress { total, remaining } => {
                    self.total = total;
                    self.remaining = remaining;
                }
                WorkerEvent::Frame { size, rgba } => self.pending_frame = Some((size, rgba)),
            }
        }
    }

    fn port_picker(&mut self, ui: &mut Ui) {
        egui::ComboBox::from_label("Port")
            .selected_text(
                self.port
                    .as_ref()
                    .map(|v| v.to_string_lossy().to_string())
                    .unwrap_or("None".to_string()),
            )
            .show_ui(ui, |ui| {
                for port in list_devices().unwrap_or_default() {
                    ui.selectable_value(
                        &mut self.port,
                        Some(port.to_owned()),
                        format!("{}", port.display()),
                    );
                }
            });

        egui::ComboBox::from_label("Baud")
            .selected_text(self.settings.baud.to_string())
            .show_ui(ui, |ui| {
                ui.selectable_value(&mut self.settings.baud, config::COORD_BAUD, "9600");
                ui.selectable_value(&mut self.settings.baud, config::SERVO_BAUD, "115200");
            });
    }

    fn top_bar(&mut self, ui: &mut Ui) {
        ui.horizontal(|ui| {
            self.port_picker(ui);

            let connectable = self.port.is_some();
            if ui
                .add_enabled(connectable, egui::Button::new("Connect"))
                .clicked()
            {
                if let Some(port) = self.port.clone() {
                    self.worker.send(WorkerCommand::ConnectSerial {
                        port,
                        baud: self.settings.baud,
                    });
                }
            }
            if ui.button("Disconnect").clicked() {
                self.worker.send(WorkerCommand::DisconnectSerial);
            }
        });
    }

    fn spray_controls(&mut self, ui: &mut Ui) {
        ui.monospace("Target class:");
        for target in [SprayTarget::Crops, SprayTarget::Weeds, SprayTarget::Everything] {
            ui.radio_value(&mut self.settings.target, target, target.label());
        }

        let tick = ui.add(
            Slider::new(&mut self.settings.tick_secs, 0.2..=5.0)
                .step_by(0.1)
                .text("Tick (s)"),
        );
        if tick.changed() {
            self.worker.send(WorkerCommand::SetTickInterval(
                Duration::from_secs_f32(self.settings.tick_secs),
            ));
        }

        ui.horizontal(|ui| {
            if ui
                .add_enabled(!self.spraying, egui::Button::new("Start Spraying"))
                .clicked()
            {
                self.worker.send(WorkerCommand::Start {
                    filter: self.settings.target.filter(),
                });
                self.spraying = true;
            }
            if ui
                .add_enabled(self.spraying, egui::Button::new("Stop Spraying"))
                .clicked()
            {
                self.worker.send(WorkerCommand::Stop);
                self.spraying = false;
            }
        });

        ui.label(format!("Total targets: {}", self.total));
        ui.label(format!("Remaining: {}", self.remaining));

        ui.horizontal(|ui| {
            ui.text_edit_singleline(&mut self.labels_path);
            if ui.button("Save labels").clicked() {
                self.worker
                    .send(WorkerCommand::SaveLabels(PathBuf::from(&self.labels_path)));
            }
        });
    }

    fn camera_controls(&mut self, ui: &mut Ui) {
        ui.monospace("Camera:");
        let zoom = ui.add(Slider::new(&mut self.settings.zoom, 1..=5).text("Zoom"));
        let brightness =
            ui.add(Slider::new(&mut self.settings.brightness, 0..=100).text("Brightness"));

        if zoom.changed() || brightness.changed() {
            self.worker.send(WorkerCommand::SetCamera {
                zoom: self.settings.zoom,
                brightness: self.settings.brightness,
            });
        }
    }

    fn drive_controls(&mut self, ui: &mut Ui) {
        ui.monospace("Drive:");
        let speed = ui.add(Slider::new(&mut self.speed, 0..=255).text("Speed"));
        if speed.changed() {
            self.worker
                .send(WorkerCommand::Send(Command::Speed(self.speed)));
        }

        ui.horizontal(|ui| {
            if ui.button("Forward").clicked() {
                self.worker
                    .send(WorkerCommand::Send(Command::Direction(Direction::Forward)));
            }
            if ui.button("Backward").clicked() {
                self.worker
                    .send(WorkerCommand::Send(Command::Direction(Direction::Backward)));
            }
            if ui.button("Stop").clicked() {
                self.worker
                    .send(WorkerCommand::Send(Command::Direction(Direction::Stop)));
            }
        });
    }

    fn servo_controls(&mut self, ui: &mut Ui) {
        ui.monospace("Servo test:");
        let pan = ui.add(Slider::new(&mut self.pan, 0..=180).text("Pan"));
        let tilt = ui.add(Slider::new(&mut self.tilt, 0..=180).text("Tilt"));

        if pan.changed() || tilt.changed() {
            self.worker
                .send(WorkerCommand::Send(Command::servo(self.pan, self.tilt)));
        }
    }

    fn central_panel(&mut self, ui: &mut Ui) {
        if let Some((size, rgba)) = self.pending_frame.take() {
            let texture = self.tex_handler.get_or_insert_with(|| {
                ui.ctx().load_texture(
                    "camera-frame",
                    ColorImage::new(size, Color32::LIGHT_YELLOW),
                    TextureOptions::default(),
                )
            });
            texture.set(
                ImageData::Color(Arc::new(ColorImage::from_rgba_unmultiplied(size, &rgba))),
                TextureOptions::default(),
            );
        }

        if let Some(texture) = &self.tex_handler {
            ui.image((texture.id(), texture.size_vec2()));
        } else {
            ui.monospace("Start spraying to see the camera feed");
        }

        ui.separator();
        ui.monospace(format!("Status: {}", self.status));
    }
}

impl eframe::App for App {
    fn update(&mut self, ctx: &Context, _frame: &mut Frame) {
        self.drain_events();

        egui::TopBottomPanel::top("top-row").show(ctx, |ui| self.top_bar(ui));

        egui::SidePanel::left("controls").show(ctx, |ui| {
            self.spray_controls(ui);
            ui.separator();
            self.camera_controls(ui);
            ui.separator();
            self.drive_controls(ui);
            ui.separator();
            self.servo_controls(ui);
        });

        egui::CentralPanel::default().show(ctx, |ui| self.central_panel(ui));

        ctx.request_repaint();
    }

    fn save(&mut self, storage: &mut dyn Storage) {
        eframe::set_value(storage, "spray-settings", &self.settings);
    }
}
