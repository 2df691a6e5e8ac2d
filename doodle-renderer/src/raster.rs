//! Drawing rasterization.
//!
//! Renders a [`Drawing`] into a fixed-size pixmap using tiny-skia. Strokes are
//! first drawn onto a transparent layer, which is then composited onto an
//! opaque background before being converted to a [`FeatureTensor`]. The
//! classifier only ever sees opaque pixels.
//!
//! ```text
//! strokes ──► transparent ink layer ──► composite over background ──► tensor
//! ```

use doodle_core::{Bounds, Drawing, Stroke};
use tiny_skia as sk;

use crate::error::{RenderError, RenderResult};
use crate::tensor::FeatureTensor;

/// Default classifier input edge length in pixels.
pub const DEFAULT_INPUT_SIZE: u32 = 64;

/// Configuration for drawing rasterization.
#[derive(Debug, Clone)]
pub struct RasterConfig {
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
    /// Background color as RGBA bytes. Alpha is forced to 255.
    pub background: [u8; 4],
    /// Ink color override. `None` keeps each stroke's own color.
    pub ink_color: Option<[u8; 4]>,
    /// Stroke width in output pixels.
    pub line_width: f32,
    /// Scale line width by mean stroke pressure.
    pub use_pressure: bool,
    /// Empty border on each side, as a fraction of the shorter output edge.
    pub margin: f32,
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_INPUT_SIZE,
            height: DEFAULT_INPUT_SIZE,
            background: [255, 255, 255, 255],
            ink_color: Some([0, 0, 0, 255]),
            line_width: 3.0,
            use_pressure: false,
            margin: 0.1,
        }
    }
}

impl RasterConfig {
    /// Default configuration at a given output size.
    #[must_use]
    pub fn with_size(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }
}

/// Maps drawing coordinates into the output raster.
#[derive(Debug, Clone, Copy)]
struct FitTransform {
    scale: f32,
    tx: f32,
    ty: f32,
}

impl FitTransform {
    /// Uniformly scale `bounds` into the output, centered, leaving `margin`.
    #[allow(clippy::cast_precision_loss)]
    fn new(bounds: &Bounds, config: &RasterConfig) -> Self {
        let out_w = config.width as f32;
        let out_h = config.height as f32;
        let available = out_w.min(out_h) * 2.0f32.mul_add(-config.margin.clamp(0.0, 0.45), 1.0);
        let side = bounds.max_side().max(1.0);
        let scale = available / side;
        let (cx, cy) = bounds.center();
        Self {
            scale,
            tx: cx.mul_add(-scale, out_w / 2.0),
            ty: cy.mul_add(-scale, out_h / 2.0),
        }
    }

    fn apply(self, x: f32, y: f32) -> (f32, f32) {
        (x.mul_add(self.scale, self.tx), y.mul_add(self.scale, self.ty))
    }
}

/// Renders drawings into classifier input.
#[derive(Debug, Clone, Default)]
pub struct Rasterizer {
    config: RasterConfig,
}

impl Rasterizer {
    /// Create a rasterizer with the given configuration.
    #[must_use]
    pub fn new(config: RasterConfig) -> Self {
        Self { config }
    }

    /// Current configuration.
    #[must_use]
    pub const fn config(&self) -> &RasterConfig {
        &self.config
    }

    /// Output dimensions (width, height).
    #[must_use]
    pub const fn output_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    /// Featurize a drawing: render, composite onto the background, convert.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::EmptyDrawing`] if no stroke has points, or
    /// [`RenderError::InvalidSize`] for a zero output size.
    pub fn featurize(&self, drawing: &Drawing) -> RenderResult<FeatureTensor> {
        let ink = self.render_ink_layer(drawing)?;
        let composite = self.composite(&ink)?;
        FeatureTensor::from_rgba(composite.width(), composite.height(), composite.data().to_vec())
    }

    /// Render a drawing as PNG bytes over the opaque background.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering or encoding fails.
    pub fn render_png(&self, drawing: &Drawing) -> RenderResult<Vec<u8>> {
        let ink = self.render_ink_layer(drawing)?;
        self.composite(&ink)?
            .encode_png()
            .map_err(|e| RenderError::Encode(format!("PNG encoding failed: {e}")))
    }

    /// Draw every stroke onto a transparent pixmap.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::EmptyDrawing`] if no stroke has points.
    pub fn render_ink_layer(&self, drawing: &Drawing) -> RenderResult<sk::Pixmap> {
        let bounds = drawing.bounds().ok_or(RenderError::EmptyDrawing)?;
        let mut pixmap = self.new_pixmap()?;
        let fit = FitTransform::new(&bounds, &self.config);

        for stroke in drawing.strokes.iter().filter(|s| !s.points.is_empty()) {
            self.draw_stroke(&mut pixmap, stroke, fit);
        }
        Ok(pixmap)
    }

    /// Composite an ink layer over the opaque background.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::InvalidSize`] for a zero output size.
    pub fn composite(&self, ink: &sk::Pixmap) -> RenderResult<sk::Pixmap> {
        let mut out = self.new_pixmap()?;
        let [r, g, b, _] = self.config.background;
        out.fill(sk::Color::from_rgba8(r, g, b, 255));
        out.draw_pixmap(
            0,
            0,
            ink.as_ref(),
            &sk::PixmapPaint::default(),
            sk::Transform::identity(),
            None,
        );
        Ok(out)
    }

    fn new_pixmap(&self) -> RenderResult<sk::Pixmap> {
        let (width, height) = self.output_size();
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidSize { width, height });
        }
        sk::Pixmap::new(width, height)
            .ok_or_else(|| RenderError::Raster(format!("Failed to create {width}x{height} pixmap")))
    }

    fn draw_stroke(&self, pixmap: &mut sk::Pixmap, stroke: &Stroke, fit: FitTransform) {
        let [r, g, b, a] = self.config.ink_color.unwrap_or(stroke.ink.color);
        let mut paint = sk::Paint::default();
        paint.set_color_rgba8(r, g, b, a);
        paint.anti_alias = true;

        let width = if self.config.use_pressure {
            self.config.line_width * stroke.mean_pressure().clamp(0.5, 1.5)
        } else {
            self.config.line_width
        };

        let mut points = stroke.transformed_points().map(|(x, y)| fit.apply(x, y));
        let Some((x0, y0)) = points.next() else {
            return;
        };

        if stroke.points.len() == 1 {
            // A tap leaves a dot.
            if let Some(dot) = sk::PathBuilder::from_circle(x0, y0, (width / 2.0).max(0.5)) {
                pixmap.fill_path(
                    &dot,
                    &paint,
                    sk::FillRule::Winding,
                    sk::Transform::identity(),
                    None,
                );
            }
            return;
        }

        let mut builder = sk::PathBuilder::new();
        builder.move_to(x0, y0);
        for (x, y) in points {
            builder.line_to(x, y);
        }
        let Some(path) = builder.finish() else {
            tracing::debug!("Skipping degenerate stroke path");
            return;
        };

        let style = sk::Stroke {
            width,
            line_cap: sk::LineCap::Round,
            line_join: sk::LineJoin::Round,
            ..sk::Stroke::default()
        };
        pixmap.stroke_path(&path, &paint, &style, sk::Transform::identity(), None);
    }
}
