//! Rendering adapter over the headless `merman` engine.
//!
//! Theme configuration travels with each call instead of living in process-wide engine state, so
//! a theme switch can never leak into a render that is already running.

use merman::MermaidConfig;
use merman::render::HeadlessRenderer;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Instant;

/// Mermaid theme names understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Default,
    #[default]
    Neutral,
    Dark,
    Forest,
    Base,
}

impl Theme {
    pub const ALL: [Theme; 5] = [
        Theme::Default,
        Theme::Neutral,
        Theme::Dark,
        Theme::Forest,
        Theme::Base,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Default => "default",
            Theme::Neutral => "neutral",
            Theme::Dark => "dark",
            Theme::Forest => "forest",
            Theme::Base => "base",
        }
    }

    /// The viewer's light/dark switch.
    pub fn from_dark_mode(dark: bool) -> Self {
        if dark { Theme::Dark } else { Theme::Neutral }
    }
}

impl FromStr for Theme {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        Theme::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or(())
    }
}

impl std::fmt::Display for Theme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of rendering one source text. Exactly one variant holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderResult {
    Rendered { svg: String },
    Failed { message: String },
}

impl RenderResult {
    pub fn svg(&self) -> Option<&str> {
        match self {
            RenderResult::Rendered { svg } => Some(svg),
            RenderResult::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            RenderResult::Rendered { .. } => None,
            RenderResult::Failed { message } => Some(message),
        }
    }

    pub fn is_rendered(&self) -> bool {
        matches!(self, RenderResult::Rendered { .. })
    }

    fn failed(message: impl Into<String>) -> Self {
        RenderResult::Failed {
            message: message.into(),
        }
    }
}

/// Renders Mermaid source to SVG.
///
/// Cloning is cheap enough to hand one renderer to each task; all work is CPU-bound and performs
/// no I/O.
#[derive(Clone, Default)]
pub struct Renderer {
    base: HeadlessRenderer,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    fn for_theme(&self, theme: Theme) -> HeadlessRenderer {
        let mut site = MermaidConfig::empty_object();
        site.set_value("theme", serde_json::json!(theme.as_str()));
        self.base.clone().with_site_config(site)
    }

    /// Renders `source` with `theme`. Failures of any kind come back as [`RenderResult::Failed`]
    /// carrying the engine's diagnostic.
    pub async fn render(&self, source: &str, theme: Theme) -> RenderResult {
        self.render_sync(source, theme)
    }

    /// Synchronous variant of [`Renderer::render`].
    pub fn render_sync(&self, source: &str, theme: Theme) -> RenderResult {
        let id = render_id();
        let headless = self.for_theme(theme);
        let started = Instant::now();

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            headless.render_svg_sync_with_diagram_id(source, &id)
        }));

        let result = match outcome {
            Ok(Ok(Some(svg))) => RenderResult::Rendered { svg },
            Ok(Ok(None)) => RenderResult::failed("No Mermaid diagram detected"),
            Ok(Err(err)) => RenderResult::failed(err.to_string()),
            Err(payload) => RenderResult::failed(panic_message(payload.as_ref())),
        };

        tracing::debug!(
            id = %id,
            theme = %theme,
            ok = result.is_rendered(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "rendered diagram"
        );
        result
    }

    /// Detects the diagram type of `source` without laying it out.
    pub fn detect(&self, source: &str) -> Option<String> {
        let meta = catch_unwind(AssertUnwindSafe(|| self.base.parse_metadata_sync(source)))
            .ok()?
            .ok()??;
        Some(meta.diagram_type)
    }
}

/// A fresh id for the root `<svg>` so rapid re-renders never share marker or style ids.
pub fn render_id() -> String {
    format!("mmd-{}", uuid::Uuid::new_v4().simple())
}

/// 1-based line number mentioned by an engine diagnostic (`... line 3 ...`), defaulting to 1.
pub fn error_line(message: &str) -> u32 {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?i)line\s+(\d+)").unwrap());
    re.captures(message)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .map_or(1, |line| line.max(1))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("Renderer crashed: {detail}")
}
