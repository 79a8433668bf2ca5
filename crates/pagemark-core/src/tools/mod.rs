//! Annotation tools and the stroke state machine.

use kurbo::Point;
use peniko::Color;
use serde::{Deserialize, Serialize};

use crate::surface::{Blend, OverlaySurface};

/// Serializable color representation (RGBA8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializableColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl SerializableColor {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn black() -> Self {
        Self::new(0, 0, 0, 255)
    }

    pub fn red() -> Self {
        Self::new(220, 38, 38, 255)
    }

    /// Parse `#rrggbb` or `#rrggbbaa`.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        if !hex.is_ascii() {
            return None;
        }
        let byte = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        match hex.len() {
            6 => Some(Self::new(byte(0)?, byte(2)?, byte(4)?, 255)),
            8 => Some(Self::new(byte(0)?, byte(2)?, byte(4)?, byte(6)?)),
            _ => None,
        }
    }
}

impl From<Color> for SerializableColor {
    fn from(color: Color) -> Self {
        let rgba = color.to_rgba8();
        Self {
            r: rgba.r,
            g: rgba.g,
            b: rgba.b,
            a: rgba.a,
        }
    }
}

impl From<SerializableColor> for Color {
    fn from(color: SerializableColor) -> Self {
        Color::from_rgba8(color.r, color.g, color.b, color.a)
    }
}

/// What a stroke does to the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToolMode {
    /// Paint the tool color on top of existing marks.
    #[default]
    Mark,
    /// Clear existing marks along the stroke.
    Erase,
}

/// Operator-selected drawing parameters, sampled once per segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToolState {
    pub mode: ToolMode,
    pub color: SerializableColor,
    /// Stroke width in surface pixels.
    pub stroke_width: f64,
}

impl Default for ToolState {
    fn default() -> Self {
        Self {
            mode: ToolMode::Mark,
            color: SerializableColor::red(),
            stroke_width: 3.0,
        }
    }
}

impl ToolState {
    pub fn marker(color: SerializableColor, stroke_width: f64) -> Self {
        Self {
            mode: ToolMode::Mark,
            color,
            stroke_width,
        }
    }

    pub fn eraser(stroke_width: f64) -> Self {
        Self {
            mode: ToolMode::Erase,
            stroke_width,
            ..Self::default()
        }
    }

    fn blend(&self) -> Blend {
        match self.mode {
            ToolMode::Mark => Blend::SourceOver(self.color),
            ToolMode::Erase => Blend::DestinationOut,
        }
    }
}

/// State of the pointer interaction.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum StrokeState {
    /// Waiting for a pointer press.
    #[default]
    Idle,
    /// Pointer is held down; `last` is where the previous segment ended.
    Drawing { last: Point },
}

/// Turns pointer drags into segments on the live overlay surface.
///
/// Individual strokes are not retained; only their effect on the surface.
#[derive(Debug, Clone, Default)]
pub struct StrokeCompositor {
    state: StrokeState,
}

impl StrokeCompositor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> StrokeState {
        self.state
    }

    pub fn is_drawing(&self) -> bool {
        matches!(self.state, StrokeState::Drawing { .. })
    }

    /// Begin a stroke at `point`. Nothing is painted until the pointer moves.
    pub fn pointer_down(&mut self, point: Point) {
        self.state = StrokeState::Drawing { last: point };
    }

    /// Paint a segment from the last position to `point`.
    ///
    /// Returns false (and paints nothing) when no stroke is in progress.
    pub fn pointer_move(&mut self, point: Point, tool: &ToolState, surface: &mut OverlaySurface) -> bool {
        let StrokeState::Drawing { last } = self.state else {
            return false;
        };
        draw_segment(surface, last, point, tool);
        self.state = StrokeState::Drawing { last: point };
        true
    }

    /// End the stroke. Returns true if a stroke was in progress.
    pub fn pointer_up(&mut self) -> bool {
        let was_drawing = self.is_drawing();
        self.state = StrokeState::Idle;
        was_drawing
    }

    /// Abort the stroke; segments already painted stay on the surface.
    pub fn pointer_cancel(&mut self) -> bool {
        self.pointer_up()
    }
}

/// Paint one stroke segment using the tool's mode, color and width.
pub fn draw_segment(surface: &mut OverlaySurface, from: Point, to: Point, tool: &ToolState) {
    surface.stroke_segment(from, to, tool.stroke_width, tool.blend());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::PixelSize;

    fn surface() -> OverlaySurface {
        OverlaySurface::new(PixelSize::new(100, 100))
    }

    #[test]
    fn test_move_while_idle_is_noop() {
        let mut sc = StrokeCompositor::new();
        let mut s = surface();

        assert!(!sc.pointer_move(Point::new(10.0, 10.0), &ToolState::default(), &mut s));
        assert!(s.is_blank());
        assert_eq!(sc.state(), StrokeState::Idle);
    }

    #[test]
    fn test_down_alone_paints_nothing() {
        let mut sc = StrokeCompositor::new();
        let s = surface();

        sc.pointer_down(Point::new(10.0, 10.0));
        assert!(sc.is_drawing());
        assert!(s.is_blank());
    }

    #[test]
    fn test_stroke_lifecycle() {
        let mut sc = StrokeCompositor::new();
        let mut s = surface();
        let tool = ToolState::marker(SerializableColor::black(), 4.0);

        sc.pointer_down(Point::new(10.0, 10.0));
        assert!(sc.pointer_move(Point::new(50.0, 10.0), &tool, &mut s));
        assert!(sc.pointer_move(Point::new(50.0, 50.0), &tool, &mut s));
        assert_eq!(sc.state(), StrokeState::Drawing { last: Point::new(50.0, 50.0) });

        assert!(sc.pointer_up());
        assert!(!sc.pointer_up());
        assert!(!sc.is_drawing());

        // Both legs of the stroke are continuous.
        assert_eq!(s.pixel(30, 10), Some([0, 0, 0, 255]));
        assert_eq!(s.pixel(50, 30), Some([0, 0, 0, 255]));
    }

    #[test]
    fn test_mid_stroke_tool_change_is_not_retroactive() {
        let mut sc = StrokeCompositor::new();
        let mut s = surface();
        let black = ToolState::marker(SerializableColor::black(), 2.0);
        let blue = ToolState::marker(SerializableColor::new(0, 0, 255, 255), 2.0);

        sc.pointer_down(Point::new(10.0, 20.0));
        sc.pointer_move(Point::new(40.0, 20.0), &black, &mut s);
        sc.pointer_move(Point::new(80.0, 20.0), &blue, &mut s);

        assert_eq!(s.pixel(20, 20), Some([0, 0, 0, 255]));
        assert_eq!(s.pixel(70, 20), Some([0, 0, 255, 255]));
    }

    #[test]
    fn test_erase_over_mark_restores_transparency() {
        let mut sc = StrokeCompositor::new();
        let mut s = surface();
        let path = [Point::new(10.0, 10.0), Point::new(60.0, 40.0), Point::new(90.0, 90.0)];

        for tool in [ToolState::marker(SerializableColor::red(), 6.0), ToolState::eraser(6.0)] {
            sc.pointer_down(path[0]);
            for p in &path[1..] {
                sc.pointer_move(*p, &tool, &mut s);
            }
            sc.pointer_up();
        }

        assert!(s.is_blank());
    }

    #[test]
    fn test_cancel_keeps_painted_segments() {
        let mut sc = StrokeCompositor::new();
        let mut s = surface();

        sc.pointer_down(Point::new(10.0, 10.0));
        sc.pointer_move(Point::new(20.0, 10.0), &ToolState::default(), &mut s);
        assert!(sc.pointer_cancel());
        assert!(!s.is_blank());
        assert!(!sc.pointer_move(Point::new(90.0, 90.0), &ToolState::default(), &mut s));
    }

    #[test]
    fn test_color_from_hex() {
        assert_eq!(SerializableColor::from_hex("#ff0000"), Some(SerializableColor::new(255, 0, 0, 255)));
        assert_eq!(SerializableColor::from_hex("00ff0080"), Some(SerializableColor::new(0, 255, 0, 128)));
        assert_eq!(SerializableColor::from_hex("#fff"), None);
        assert_eq!(SerializableColor::from_hex("#zzzzzz"), None);
    }

    #[test]
    fn test_peniko_color_roundtrip() {
        let c = SerializableColor::new(12, 34, 56, 255);
        let color: Color = c.into();
        assert_eq!(SerializableColor::from(color), c);
    }
}
