use crate::{Mask, Point};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
}

/// A pointer press as reported by the drawable surface.
///
/// `pos` is `None` when the press landed outside the drawable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerPress {
    pub button: PointerButton,
    pub pos: Option<Point>,
}

/// The drawable the controller renders to.
///
/// The controller only ever talks through this contract; it must never reach
/// into a rendering library's internal object model.
pub trait Surface {
    /// Draw a point marker at image coordinates, tinted `color`.
    fn draw_marker(&mut self, at: Point, color: [u8; 3]);

    /// Draw `mask` as a semi-transparent raster overlay aligned to the base
    /// image. Zero-valued pixels must render fully transparent.
    fn draw_overlay(&mut self, mask: &Mask);

    /// Remove all point markers.
    fn clear_markers(&mut self);

    /// Remove the topmost non-base overlay.
    fn clear_overlay(&mut self);

    fn request_redraw(&mut self);
}
