pub mod app;
pub mod camera;
pub mod config;
pub mod detector;
pub mod driver;
pub mod error;
pub mod hologram;
pub mod hud;
pub mod landmarks;
pub mod tracking;

pub use error::{Error, Result};
