use std::{io, sync::Arc};

use eframe::egui::{self, Color32, ColorImage, TextureHandle, TextureOptions};
use futures::{future::BoxFuture, FutureExt};
use image::{DynamicImage, GenericImageView, Rgba};
use log::info;

mod native;
mod overlay;

pub use native::run_native;
pub use overlay::{OverlayLayer, OverlaySettings};

use crate::{
    AsyncTask, Config, InteractionController, Phase, Point, PointerButton, PointerPress,
    Predictor, PredictorError, PromptBatch,
};

/// Builds the predictor for a freshly loaded image. Embedding an image can
/// be slow, so construction runs behind an [`AsyncTask`].
pub type PredictorFactory = Box<
    dyn Fn(&Config, Arc<DynamicImage>) -> BoxFuture<'static, Result<Arc<dyn Predictor>, PredictorError>>,
>;

pub struct PromptApp {
    config: Config,
    factory: PredictorFactory,
    batch: Option<PromptBatch>,
    session: SessionState,
    status: Option<String>,
}

#[allow(clippy::large_enum_variant)]
enum SessionState {
    NotLoaded,
    LoadingImage(AsyncTask<io::Result<DynamicImage>>),
    LoadingPredictor {
        texture: TextureHandle,
        image_size: [usize; 2],
        task: AsyncTask<Result<Arc<dyn Predictor>, PredictorError>>,
    },
    Ready(Session),
    Error(String),
}

/// One interactive session on one image. A new image means a new session
/// with a fresh controller; nothing is carried over.
struct Session {
    texture: TextureHandle,
    image_size: [usize; 2],
    controller: InteractionController,
    overlay: OverlayLayer,
}

impl PromptApp {
    pub fn new(
        _cc: &eframe::CreationContext<'_>,
        config: Config,
        batch: Option<PromptBatch>,
        factory: PredictorFactory,
    ) -> Self {
        Self {
            config,
            factory,
            batch,
            session: SessionState::NotLoaded,
            status: None,
        }
    }

    fn advance_session(&mut self, ctx: &egui::Context) {
        match &mut self.session {
            SessionState::NotLoaded => {
                let path = self.config.image.clone();
                self.session = SessionState::LoadingImage(AsyncTask::new(
                    async move { image::open(&path).map_err(io::Error::other) }.boxed(),
                ));
            }
            SessionState::LoadingImage(task) => {
                if let Some(result) = task.data() {
                    self.session = match result {
                        Ok(img) => {
                            let image_size = [img.width() as usize, img.height() as usize];
                            let texture = ctx.load_texture(
                                "base-image",
                                ColorImage {
                                    size: image_size,
                                    pixels: img
                                        .pixels()
                                        .map(|(_, _, Rgba([r, g, b, _]))| Color32::from_rgb(r, g, b))
                                        .collect(),
                                },
                                TextureOptions {
                                    magnification: egui::TextureFilter::Nearest,
                                    ..Default::default()
                                },
                            );
                            let task = AsyncTask::new((self.factory)(&self.config, Arc::new(img)));
                            SessionState::LoadingPredictor {
                                texture,
                                image_size,
                                task,
                            }
                        }
                        Err(e) => SessionState::Error(format!("image load: {e}")),
                    };
                }
            }
            SessionState::LoadingPredictor {
                texture,
                image_size,
                task,
            } => {
                if let Some(result) = task.data() {
                    self.session = match result {
                        Ok(predictor) => {
                            info!("predictor ready, starting session");
                            let mut controller = InteractionController::new(
                                predictor,
                                *image_size,
                                self.config.mask_style,
                            );
                            if let Some(batch) = &self.batch {
                                if let Err(e) = controller.load_prompt_batch(batch.clone()) {
                                    self.status = Some(e.to_string());
                                }
                            }
                            let overlay =
                                OverlayLayer::new(ctx.clone(), *image_size, self.config.overlay);
                            SessionState::Ready(Session {
                                texture: texture.clone(),
                                image_size: *image_size,
                                controller,
                                overlay,
                            })
                        }
                        Err(e) => SessionState::Error(format!("predictor: {e}")),
                    };
                }
            }
            SessionState::Ready(session) => {
                if let Err(e) = session.controller.poll(&mut session.overlay) {
                    self.status = Some(e.to_string());
                }
            }
            SessionState::Error(_) => {}
        }
    }

    fn session_ui(&mut self, ui: &mut egui::Ui) {
        let SessionState::Ready(session) = &mut self.session else {
            return;
        };

        let viewport = ui.available_rect_before_wrap();
        let [width, height] = session.image_size;
        let scale = (viewport.width() / width as f32).min(viewport.height() / height as f32);
        let rendered = egui::vec2(width as f32 * scale, height as f32 * scale);
        let image_rect = egui::Rect::from_min_size(
            viewport.min + (viewport.size() - rendered) * 0.5,
            rendered,
        );

        let to_image = |pos: egui::Pos2| -> Option<Point> {
            image_rect.contains(pos).then(|| Point {
                x: (pos.x - image_rect.min.x) / scale,
                y: (pos.y - image_rect.min.y) / scale,
            })
        };
        let to_screen = |point: &Point| -> egui::Pos2 {
            image_rect.min + egui::vec2(point.x * scale, point.y * scale)
        };

        let response = ui.allocate_rect(viewport, egui::Sense::click());

        let button = if response.clicked() {
            Some(PointerButton::Primary)
        } else if response.secondary_clicked() {
            Some(PointerButton::Secondary)
        } else {
            None
        };
        if let Some(button) = button {
            let pos = response.interact_pointer_pos().and_then(to_image);
            session
                .controller
                .handle_pointer_press(PointerPress { button, pos }, &mut session.overlay);
        }

        let key = ui.ctx().input(|i| {
            if i.key_pressed(egui::Key::Enter) {
                Some("predict")
            } else if i.key_pressed(egui::Key::A) {
                Some("predict-all")
            } else if i.key_pressed(egui::Key::Escape) {
                Some("clear")
            } else {
                None
            }
        });
        if let Some(key) = key {
            match session.controller.handle_key(key, &mut session.overlay) {
                Ok(()) => self.status = None,
                Err(e) => self.status = Some(e.to_string()),
            }
        }

        let uv = egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0));
        let painter = ui.painter().with_clip_rect(viewport);
        painter.image(session.texture.id(), image_rect, uv, Color32::WHITE);
        if let Some(texture) = session.overlay.texture() {
            painter.image(texture.id, image_rect, uv, Color32::WHITE);
        }
        for (point, [r, g, b]) in session.overlay.markers() {
            painter.circle(
                to_screen(point),
                4.0,
                Color32::from_rgb(*r, *g, *b),
                egui::Stroke::new(1.0, Color32::WHITE),
            );
        }
    }
}

impl eframe::App for PromptApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.advance_session(ctx);

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("Prompt overlay");
            ui.label(
                "Left click: foreground · right click: background · \
                 Enter: predict · A: predict batch · Esc: clear",
            );
            match &self.session {
                SessionState::NotLoaded | SessionState::LoadingImage(_) => {
                    ui.label("Loading image…");
                }
                SessionState::LoadingPredictor { .. } => {
                    ui.label("Preparing predictor…");
                }
                SessionState::Ready(session) => {
                    if session.controller.phase() == Phase::Predicting {
                        ui.label("Predicting…");
                    }
                }
                SessionState::Error(e) => {
                    ui.colored_label(ui.visuals().error_fg_color, e);
                }
            }
            if let Some(status) = self.status.clone() {
                ui.colored_label(ui.visuals().warn_fg_color, status);
            }
            self.session_ui(ui);
        });
    }
}
