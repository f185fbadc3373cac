use std::time::Instant;

use egui::{Align2, Color32, FontId, Pos2, RichText, Stroke};
use nalgebra::{Point2, Vector2};

use crate::config::Config;
use crate::hologram::{Hologram, Part};
use crate::hud::{HudPlacement, HudProjector, LinkStatus, LogTicker};
use crate::tracking::{lock, FaceState, HandState, SharedState};

const CYAN: Color32 = Color32::from_rgb(0, 255, 240);
const MAGENTA: Color32 = Color32::from_rgb(255, 60, 200);
const AMBER: Color32 = Color32::from_rgb(255, 180, 40);

// where the panel sits before a face was ever seen
const DEFAULT_PANEL_POS: Pos2 = Pos2::new(24.0, 48.0);

pub struct HoloHudApp {
    shared_state: SharedState,
    hud: HudProjector,
    ticker: LogTicker,
    hologram: Hologram,
    camera_texture: Option<egui::TextureHandle>,
    preview_generation: u64,
}

struct Snapshot {
    face: FaceState,
    hand: HandState,
    fps: Option<f32>,
    resolution: Option<(u32, u32)>,
    init_error: Option<String>,
    preview: Option<image::DynamicImage>,
}

impl HoloHudApp {
    pub fn new(cc: &eframe::CreationContext<'_>, shared_state: SharedState, config: &Config) -> Self {
        cc.egui_ctx.set_visuals(egui::Visuals::dark());

        Self {
            shared_state,
            hud: HudProjector::new(&config.hud),
            ticker: LogTicker::new(config.hud.log_interval()),
            hologram: Hologram::new(&config.hologram),
            camera_texture: None,
            preview_generation: 0,
        }
    }

    // copy what this frame needs and release the lock right away
    fn snapshot(&mut self) -> Snapshot {
        let state = lock(&self.shared_state);

        let preview = if state.preview_generation != self.preview_generation {
            self.preview_generation = state.preview_generation;
            state.preview.clone()
        } else {
            None
        };

        Snapshot {
            face: state.face,
            hand: state.hand,
            fps: state.fps,
            resolution: state.resolution,
            init_error: state.init_error.clone(),
            preview,
        }
    }

    fn upload_preview(&mut self, ctx: &egui::Context, image: image::DynamicImage) {
        let rgb = image.to_rgb8();
        let size = [rgb.width() as usize, rgb.height() as usize];
        let ui_image = egui::ColorImage::from_rgb(size, rgb.as_raw());

        match self.camera_texture.as_mut() {
            Some(texture) => texture.set(ui_image, egui::TextureOptions::LINEAR),
            None => {
                self.camera_texture =
                    Some(ctx.load_texture("camera", ui_image, egui::TextureOptions::LINEAR));
            }
        }
    }
}

impl eframe::App for HoloHudApp {
    /// Called each time the UI needs repainting. Every call is one presentation tick.
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let mut snapshot = self.snapshot();

        if let Some(message) = snapshot.init_error.as_deref() {
            show_init_error(ctx, message);
            return;
        }

        if let Some(image) = snapshot.preview.take() {
            self.upload_preview(ctx, image);
        }

        let screen = ctx.screen_rect();
        let viewport = Vector2::new(screen.width(), screen.height());

        let placement = self.hud.project(&snapshot.face, viewport);
        self.ticker.advance(Instant::now());
        self.hologram.step(&snapshot.hand);

        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(Color32::BLACK))
            .show(ctx, |ui| {
                let painter = ui.painter();
                let rect = ui.max_rect();

                if let Some(texture) = self.camera_texture.as_ref() {
                    let uv = egui::Rect::from_min_max(Pos2::new(0.0, 0.0), Pos2::new(1.0, 1.0));
                    painter.image(texture.id(), rect, uv, Color32::from_gray(160));
                }

                paint_hologram(painter, &self.hologram, rect);

                let fps = snapshot
                    .fps
                    .map(|fps| format!("INFERENCE {:>3.0} FPS", fps))
                    .unwrap_or_else(|| "INFERENCE --- FPS".to_string());
                painter.text(
                    rect.left_top() + egui::vec2(12.0, 12.0),
                    Align2::LEFT_TOP,
                    fps,
                    FontId::monospace(12.0),
                    CYAN,
                );
            });

        show_hud_panel(ctx, &placement, &snapshot, &self.ticker, self.hologram.scale());

        ctx.request_repaint();
    }
}

fn paint_hologram(painter: &egui::Painter, hologram: &Hologram, rect: egui::Rect) {
    if rect.width() <= 0.0 || rect.height() <= 0.0 {
        return;
    }

    let center = rect.center();
    let size = rect.width().min(rect.height()) * 0.18;

    for (part, [a, b]) in hologram.project(Point2::new(center.x, center.y), size) {
        let (color, width) = match part {
            Part::OuterShell => (fade(CYAN, 0.8), 1.5),
            Part::MidShell => (fade(MAGENTA, 0.7), 1.2),
            Part::InnerCore => (Color32::WHITE, 2.0),
        };
        painter.line_segment(
            [Pos2::new(a.x, a.y), Pos2::new(b.x, b.y)],
            Stroke::new(width, color),
        );
    }
}

fn show_hud_panel(
    ctx: &egui::Context,
    placement: &HudPlacement,
    snapshot: &Snapshot,
    ticker: &LogTicker,
    scale: f32,
) {
    let pos = placement
        .position
        .map(|p| Pos2::new(p.x, p.y))
        .unwrap_or(DEFAULT_PANEL_POS);
    let opacity = placement.opacity;

    let status_color = match placement.status {
        LinkStatus::Online => CYAN,
        LinkStatus::Searching => AMBER,
    };

    egui::Area::new("hud_panel")
        .fixed_pos(pos)
        .order(egui::Order::Foreground)
        .show(ctx, |ui| {
            egui::Frame::none()
                .fill(fade(Color32::from_rgb(0, 20, 30), 0.75 * opacity))
                .stroke(Stroke::new(1.0, fade(CYAN, opacity)))
                .inner_margin(egui::style::Margin::same(12.0))
                .rounding(4.0)
                .show(ui, |ui| {
                    ui.label(
                        RichText::new(placement.status.label())
                            .monospace()
                            .strong()
                            .color(fade(status_color, opacity)),
                    );

                    let text = fade(CYAN, opacity);
                    let face = &snapshot.face;
                    ui.label(
                        RichText::new(format!(
                            "NOSE  X {:.3}  Y {:.3}  Z {:+.3}",
                            face.position.x, face.position.y, face.position.z
                        ))
                        .monospace()
                        .color(text),
                    );

                    let hand = &snapshot.hand;
                    let hand_line = if !hand.detected {
                        "HAND  -- NO SIGNAL --".to_string()
                    } else if hand.is_pinching {
                        format!("HAND  PINCH {:.3}", hand.pinch_distance)
                    } else {
                        format!("HAND  OPEN  {:.3}", hand.pinch_distance)
                    };
                    ui.label(RichText::new(hand_line).monospace().color(text));
                    ui.label(
                        RichText::new(format!("CORE  SCALE {:.2}x", scale))
                            .monospace()
                            .color(text),
                    );
                    ui.label(
                        RichText::new(resolution_label(snapshot.resolution))
                            .monospace()
                            .color(text),
                    );

                    ui.separator();
                    for line in ticker.visible(3) {
                        ui.label(
                            RichText::new(line)
                                .monospace()
                                .size(10.0)
                                .color(fade(CYAN, 0.6 * opacity)),
                        );
                    }
                });
        });
}

fn show_init_error(ctx: &egui::Context, message: &str) {
    egui::CentralPanel::default()
        .frame(egui::Frame::none().fill(Color32::BLACK))
        .show(ctx, |_ui| {});

    egui::Window::new("Initialization failed")
        .collapsible(false)
        .resizable(false)
        .anchor(Align2::CENTER_CENTER, [0.0, 0.0])
        .show(ctx, |ui| {
            ui.label(RichText::new(message).color(AMBER));
            ui.label("Check the camera permissions and the model paths, then restart.");
        });
}

fn resolution_label(resolution: Option<(u32, u32)>) -> String {
    match resolution {
        Some((width, height)) => format!("CAM   {}x{}", width, height),
        None => "CAM   ----".to_string(),
    }
}

fn fade(color: Color32, opacity: f32) -> Color32 {
    let alpha = (color.a() as f32 * opacity.clamp(0.0, 1.0)).round() as u8;
    Color32::from_rgba_unmultiplied(color.r(), color.g(), color.b(), alpha)
}
