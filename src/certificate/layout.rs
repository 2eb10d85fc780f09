use super::TextElement;

/// Text anchor and font size in pixels for one target display size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    pub font_size: f32,
}

pub fn clamp_percent(value: f32) -> f32 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 100.0)
}

/// Maps the element's percentage anchor onto a `width` x `height` surface.
///
/// `natural_width` is the template's own pixel width, used as the font size
/// reference when the element does not carry one. The font size never
/// exceeds the surface height.
pub fn place(element: &TextElement, width: u32, height: u32, natural_width: u32) -> Placement {
    let reference = element
        .reference_width
        .filter(|w| w.is_finite() && *w > 0.0)
        .unwrap_or(natural_width.max(1) as f32);
    let scale = width as f32 / reference;
    let font_size = element.font_size * scale;
    let font_size = if font_size.is_nan() {
        1.0
    } else {
        font_size.clamp(1.0, height.max(1) as f32)
    };

    Placement {
        x: clamp_percent(element.x) / 100.0 * width as f32,
        y: clamp_percent(element.y) / 100.0 * height as f32,
        font_size,
    }
}

/// Height for `width` keeping the template's aspect ratio.
pub fn scaled_height(natural_width: u32, natural_height: u32, width: u32) -> u32 {
    if natural_width == 0 {
        return natural_height;
    }
    let height = (natural_height as u64 * width as u64 + natural_width as u64 / 2) / natural_width as u64;
    height.max(1) as u32
}
