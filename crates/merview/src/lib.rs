#![forbid(unsafe_code)]

//! `merview` is the headless state/export pipeline of a Mermaid diagram viewer.
//!
//! It keeps diagram source text, rendered SVG and shareable state consistent:
//! - [`share`]: `#code=` share fragments (LZ-string, URI-component alphabet)
//! - [`render`]: async rendering through `merman`, latest-request-wins via [`session`]
//! - [`size`]: pixel size of rendered SVG
//! - [`export`]: export preparation and PNG rasterization (`resvg`)
//! - [`sink`]: clipboard and download delivery

pub mod config;
pub mod examples;
pub mod export;
mod labels;
pub mod prefs;
pub mod render;
pub mod session;
pub mod share;
pub mod sink;
pub mod size;

pub use config::ViewerConfig;
pub use export::{ExportArtifact, ExportError, RasterTarget, Rasterizer};
pub use render::{RenderResult, Renderer, Theme};
pub use session::{Session, Status, Viewport};
pub use sink::{Clipboard, CopyOutcome, Downloads, Sink, SystemClipboard};
pub use size::Size;
