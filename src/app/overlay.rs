use eframe::egui::{
    self, load::SizedTexture, Color32, ColorImage, TextureHandle, TextureOptions,
};

use crate::{Mask, Point, Surface};

#[derive(Debug, Clone, Copy, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct OverlaySettings {
    /// Alpha of overlay pixels; the base image stays visible underneath.
    pub opacity: u8,
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self { opacity: 128 }
    }
}

/// Retained drawing state for one image session.
///
/// Markers and the overlay texture live here between frames; the app renders
/// them on top of the base image every frame.
pub struct OverlayLayer {
    ctx: egui::Context,
    size: [usize; 2],
    settings: OverlaySettings,
    markers: Vec<(Point, [u8; 3])>,
    mask: Option<Mask>,
    // Rebuilt lazily; the handle must outlive every frame that sampled it.
    texture: Option<TextureHandle>,
    texture_dirty: bool,
}

impl OverlayLayer {
    pub fn new(ctx: egui::Context, size: [usize; 2], settings: OverlaySettings) -> Self {
        Self {
            ctx,
            size,
            settings,
            markers: Vec::new(),
            mask: None,
            texture: None,
            texture_dirty: false,
        }
    }

    pub fn markers(&self) -> &[(Point, [u8; 3])] {
        &self.markers
    }

    /// The overlay texture, rebuilt after the mask changed. `None` while no
    /// mask is displayed.
    pub fn texture(&mut self) -> Option<SizedTexture> {
        if self.texture_dirty {
            self.texture_dirty = false;
            self.texture = self.mask.as_ref().map(|mask| {
                let mut pixels = vec![Color32::TRANSPARENT; self.size[0] * self.size[1]];
                for (dst, &id) in pixels.iter_mut().zip(mask.data()) {
                    if id != 0 {
                        let [r, g, b] = instance_color(id as u16);
                        *dst = Color32::from_rgba_unmultiplied(r, g, b, self.settings.opacity);
                    }
                }
                self.ctx.load_texture(
                    "overlay",
                    ColorImage {
                        size: self.size,
                        pixels,
                    },
                    TextureOptions {
                        magnification: egui::TextureFilter::Nearest,
                        ..Default::default()
                    },
                )
            });
        }
        self.texture.as_ref().map(SizedTexture::from_handle)
    }
}

impl Surface for OverlayLayer {
    fn draw_marker(&mut self, at: Point, color: [u8; 3]) {
        self.markers.push((at, color));
    }

    fn draw_overlay(&mut self, mask: &Mask) {
        self.mask = Some(mask.clone());
        self.texture_dirty = true;
    }

    fn clear_markers(&mut self) {
        self.markers.clear();
    }

    fn clear_overlay(&mut self) {
        if self.mask.take().is_some() {
            self.texture_dirty = true;
        }
    }

    fn request_redraw(&mut self) {
        self.ctx.request_repaint();
    }
}

/// Stable per-instance tint derived from the instance id via HSV.
fn instance_color(seed: u16) -> [u8; 3] {
    fn pseudo_random_permutation(seed: u16) -> f32 {
        let mut num = (seed & 0xFF) as u8;

        for _ in 0..2 {
            num = num.wrapping_mul(197).rotate_left(5) ^ 0x5A;
        }

        num as f32 / (u8::MAX as f32)
    }

    fn hsv_to_rgb(h: f32, s: f32, v: f32) -> [u8; 3] {
        let h_i = (h * 6.0).floor() as u32 % 6;
        let f = h * 6.0 - h_i as f32;
        let p = v * (1.0 - s);
        let q = v * (1.0 - f * s);
        let t = v * (1.0 - (1.0 - f) * s);

        let (r, g, b) = match h_i {
            0 => (v, t, p),
            1 => (q, v, p),
            2 => (p, v, t),
            3 => (p, q, v),
            4 => (t, p, v),
            _ => (v, p, q),
        };

        [(r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8]
    }

    let hue = pseudo_random_permutation(seed);
    hsv_to_rgb(hue, 0.8, 0.9)
}
