//! Editor session state: the diagram source, the active theme, the preview viewport and the most
//! recent render outcome.
//!
//! Renders are tracked with generation tickets. Every edit or theme switch bumps the generation;
//! a completion is stored only when its ticket still matches, so a slow render started for an
//! older source can never overwrite the result of a newer one.

use crate::examples;
use crate::export::{ExportArtifact, ExportError, Raster, Rasterizer};
use crate::render::{RenderResult, Renderer, Theme, error_line};
use crate::share::{self, ShareError};

pub const MIN_ZOOM: f32 = 0.5;
pub const MAX_ZOOM: f32 = 3.0;
pub const ZOOM_STEP: f32 = 0.25;
pub const DEFAULT_ZOOM: f32 = 2.0;

/// Preview presentation. The zoom doubles as the PNG export scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    fit_width: bool,
    zoom: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            fit_width: true,
            zoom: DEFAULT_ZOOM,
        }
    }
}

impl Viewport {
    pub fn fit_width(&self) -> bool {
        self.fit_width
    }

    pub fn set_fit_width(&mut self, fit_width: bool) {
        self.fit_width = fit_width;
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    /// Sets the zoom, clamped to `[MIN_ZOOM, MAX_ZOOM]` and snapped to `ZOOM_STEP`. Non-finite
    /// values are ignored. Returns the applied zoom.
    pub fn set_zoom(&mut self, zoom: f32) -> f32 {
        if zoom.is_finite() {
            let snapped = (zoom / ZOOM_STEP).round() * ZOOM_STEP;
            self.zoom = snapped.clamp(MIN_ZOOM, MAX_ZOOM);
        }
        self.zoom
    }

    /// Scale used for PNG export. Fit-width only affects on-screen layout.
    pub fn export_scale(&self) -> f32 {
        self.zoom
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// No render has completed yet.
    Pending,
    Valid,
    Error,
}

/// Inline editor annotation for a failed render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorMarker {
    pub line: u32,
    pub start_column: u32,
    pub end_column: u32,
    pub message: String,
}

impl EditorMarker {
    pub const START_COLUMN: u32 = 1;
    pub const END_COLUMN: u32 = 1000;

    pub fn from_message(message: &str) -> Self {
        Self {
            line: error_line(message),
            start_column: Self::START_COLUMN,
            end_column: Self::END_COLUMN,
            message: message.to_string(),
        }
    }
}

/// Snapshot handed to a renderer. `ticket` identifies the request at completion time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    pub ticket: u64,
    pub source: String,
    pub theme: Theme,
}

#[derive(Debug, Clone)]
pub struct Session {
    source: String,
    theme: Theme,
    viewport: Viewport,
    generation: u64,
    result: Option<RenderResult>,
}

impl Session {
    pub fn new(source: impl Into<String>, theme: Theme) -> Self {
        Self {
            source: source.into(),
            theme,
            viewport: Viewport::default(),
            generation: 0,
            result: None,
        }
    }

    /// Starts from a `#code=` hash, falling back to the default example when the hash is absent
    /// or does not decode.
    pub fn from_share_hash(hash: &str, theme: Theme) -> Self {
        let source = share::fragment_from_hash(hash)
            .and_then(share::decode)
            .unwrap_or_else(|| examples::default_source().to_string());
        Self::new(source, theme)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    /// Replaces the source. Any render in flight becomes stale.
    pub fn set_source(&mut self, source: impl Into<String>) {
        let source = source.into();
        if source != self.source {
            self.source = source;
            self.generation += 1;
        }
    }

    /// Switches theme. Any render in flight becomes stale.
    pub fn set_theme(&mut self, theme: Theme) {
        if theme != self.theme {
            self.theme = theme;
            self.generation += 1;
        }
    }

    /// Loads a built-in example by name. Returns `false` for unknown names.
    pub fn load_example(&mut self, name: &str) -> bool {
        match examples::get(name) {
            Some(source) => {
                self.set_source(source);
                true
            }
            None => false,
        }
    }

    pub fn begin_render(&self) -> RenderRequest {
        RenderRequest {
            ticket: self.generation,
            source: self.source.clone(),
            theme: self.theme,
        }
    }

    /// Stores `result` if `ticket` is still the latest request. Returns whether it was stored.
    pub fn finish_render(&mut self, ticket: u64, result: RenderResult) -> bool {
        if ticket != self.generation {
            tracing::debug!(
                ticket,
                current = self.generation,
                "discarding stale render result"
            );
            return false;
        }
        self.result = Some(result);
        true
    }

    /// Renders the current source and stores the outcome.
    pub async fn render_with(&mut self, renderer: &Renderer) -> &RenderResult {
        let request = self.begin_render();
        let result = renderer.render(&request.source, request.theme).await;
        self.result.insert(result)
    }

    pub fn result(&self) -> Option<&RenderResult> {
        self.result.as_ref()
    }

    pub fn status(&self) -> Status {
        match &self.result {
            None => Status::Pending,
            Some(RenderResult::Rendered { .. }) => Status::Valid,
            Some(RenderResult::Failed { .. }) => Status::Error,
        }
    }

    pub fn svg(&self) -> Option<&str> {
        self.result.as_ref().and_then(RenderResult::svg)
    }

    pub fn error(&self) -> Option<&str> {
        self.result.as_ref().and_then(RenderResult::error)
    }

    pub fn marker(&self) -> Option<EditorMarker> {
        self.error().map(EditorMarker::from_message)
    }

    /// `diagram.svg` for the current render; a failed or pending render has nothing to export.
    pub fn export_svg(&self) -> Result<ExportArtifact, ExportError> {
        let svg = self.svg().ok_or(ExportError::NothingToExport)?;
        Ok(ExportArtifact::svg(svg))
    }

    /// PNG of the current render at the viewport's export scale.
    pub fn export_png(
        &self,
        rasterizer: &Rasterizer,
        background: Option<&str>,
    ) -> Result<Raster, ExportError> {
        let svg = self.svg().ok_or(ExportError::NothingToExport)?;
        rasterizer.export_png(svg, self.viewport.export_scale(), background)
    }

    /// PNG bytes of the current render at its native size, for the clipboard.
    pub fn copy_png_bytes(
        &self,
        rasterizer: &Rasterizer,
        background: Option<&str>,
    ) -> Result<Vec<u8>, ExportError> {
        let svg = self.svg().ok_or(ExportError::NothingToExport)?;
        Ok(rasterizer.clipboard_png(svg, background)?.png)
    }

    pub fn share_url(&self, base: &str) -> Result<String, ShareError> {
        share::share_url(base, &self.source)
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut Viewport {
        &mut self.viewport
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(examples::default_source(), Theme::default())
    }
}
