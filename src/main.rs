use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;

use holohud::app::HoloHudApp;
use holohud::config::Config;
use holohud::driver::spawn_worker;
use holohud::tracking::{lock, new_shared_state};

/// Face and hand driven holographic HUD over a webcam feed.
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// JSON config file, missing fields keep their defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Camera device index
    #[arg(long)]
    device: Option<u32>,

    #[arg(long)]
    face_model: Option<PathBuf>,

    #[arg(long)]
    hand_model: Option<PathBuf>,

    /// Whole-frame face detector used to reacquire a lost face
    #[arg(long)]
    face_detector_model: Option<PathBuf>,

    /// Whole-frame palm detector used to reacquire a lost hand
    #[arg(long)]
    palm_model: Option<PathBuf>,

    /// Draw the detected landmarks onto the camera feed
    #[arg(long)]
    show_landmarks: bool,
}

impl Args {
    fn into_config(self) -> holohud::Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;
        if let Some(device) = self.device {
            config.camera.device = device;
        }
        if let Some(path) = self.face_model {
            config.models.face = path;
        }
        if let Some(path) = self.hand_model {
            config.models.hand = path;
        }
        if let Some(path) = self.face_detector_model {
            config.models.face_detector = Some(path);
        }
        if let Some(path) = self.palm_model {
            config.models.palm_detector = Some(path);
        }
        if self.show_landmarks {
            config.hud.show_landmarks = true;
        }
        Ok(config)
    }
}

fn main() -> eframe::Result<()> {
    env_logger::init(); // Log to stderr (if you run with `RUST_LOG=debug`).

    let config = match Args::parse().into_config() {
        Ok(config) => config,
        Err(err) => {
            log::error!("{}", err);
            std::process::exit(2);
        }
    };

    let shared_state = new_shared_state();
    let stop = Arc::new(AtomicBool::new(false));

    // run the camera and the detectors on their own thread
    let worker = match spawn_worker(config.clone(), Arc::clone(&shared_state), Arc::clone(&stop)) {
        Ok(handle) => Some(handle),
        Err(err) => {
            log::error!("failed to start inference thread: {}", err);
            lock(&shared_state).init_error = Some(format!("failed to start inference thread: {}", err));
            None
        }
    };

    let native_options = eframe::NativeOptions {
        initial_window_size: Some(egui::vec2(
            config.camera.width as f32,
            config.camera.height as f32,
        )),
        ..Default::default()
    };

    let gui_state = Arc::clone(&shared_state);
    let result = eframe::run_native(
        "holohud",
        native_options,
        Box::new(move |cc| Box::new(HoloHudApp::new(cc, gui_state, &config))),
    );

    stop.store(true, Ordering::Relaxed);
    if let Some(worker) = worker {
        if worker.join().is_err() {
            log::error!("inference thread panicked");
        }
    }

    result
}
