use crate::app::App;

use backend::cv::detector::DetectorConfig;
use backend::worker::SprayWorker;
use eframe::egui::ViewportBuilder;

mod app;

const MIN_SIZE: [f32; 2] = [1000.0, 760.0];

fn main() -> Result<(), eframe::Error> {
    tracing_subscriber::fmt::init();

    // Model load failure is fatal, bail before the UI starts.
    let worker = match SprayWorker::spawn(&DetectorConfig::default(), backend::config::CAMERA_ID) {
        Ok(worker) => worker,
        Err(err) => {
            tracing::error!(%err, "startup failed");
            std::process::exit(1);
        }
    };

    let options = eframe::NativeOptions {
        viewport: ViewportBuilder::default().with_min_inner_size(MIN_SIZE),
        ..Default::default()
    };

    eframe::run_native(
        "USR Control Software",
        options,
        Box::new(|cc| Box::new(App::new(cc, worker))),
    )
}
