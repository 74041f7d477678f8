//! SVG/PNG export.
//!
//! Raster export never touches the markup that is on display: [`prepare_for_export`] builds a
//! corrected private copy (well-formed void tags, dark label text, no remote font rules) and
//! [`Rasterizer`] composites that copy onto an opaque background at an exact pixel size.

use crate::labels;
use crate::size::{Size, resolve_size, root_svg_tag};
use regex::{Captures, Regex};
use std::sync::{Arc, OnceLock};
use usvg::fontdb;

/// Largest raster edge we attempt to allocate.
pub const MAX_CANVAS_SIZE: u32 = 16384;
/// Label text color baked into exports. Light label text from dark themes is unreadable on the
/// light export background.
pub const EXPORT_LABEL_COLOR: &str = "#000000";
pub const DEFAULT_BACKGROUND: &str = "#ffffff";

pub const SVG_FILENAME: &str = "diagram.svg";
pub const PNG_FILENAME: &str = "diagram.png";
pub const SOURCE_FILENAME: &str = "diagram.mmd";

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Nothing to export: the diagram has no rendered SVG.")]
    NothingToExport,
    #[error("SVG element not found in the preview.")]
    MissingSvgElement,
    #[error(
        "Canvas size too large ({width}x{height}). Try reducing the scale or simplifying the diagram."
    )]
    CanvasTooLarge { width: u32, height: u32 },
    #[error("Canvas size too large ({width}x{height}). Try simplifying the diagram.")]
    ClipboardCanvasTooLarge { width: u32, height: u32 },
    #[error("invalid export scale {0} (expected a positive number)")]
    InvalidScale(f32),
    #[error(
        "invalid background color {0:?} (expected an opaque hex, rgb()/rgba() or white/black color)"
    )]
    Background(String),
    #[error("failed to parse SVG: {0}")]
    SvgParse(#[from] usvg::Error),
    #[error("failed to allocate pixmap for raster rendering")]
    PixmapAlloc,
    #[error("failed to encode PNG")]
    PngEncode,
}

pub type Result<T> = std::result::Result<T, ExportError>;

/// Exact pixel size of a raster export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterTarget {
    pub width: u32,
    pub height: u32,
}

impl RasterTarget {
    /// File exports honor the chosen zoom: `round(base * scale)` per axis.
    pub fn for_export(base: Size, scale: f32) -> Result<Self> {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(ExportError::InvalidScale(scale));
        }
        let scale = f64::from(scale);
        let (width, height) = Self::pixels(base.width * scale, base.height * scale);
        if width > MAX_CANVAS_SIZE || height > MAX_CANVAS_SIZE {
            return Err(ExportError::CanvasTooLarge { width, height });
        }
        Ok(Self { width, height })
    }

    /// Clipboard copies always use the native size, whatever the zoom.
    pub fn for_clipboard(base: Size) -> Result<Self> {
        let (width, height) = Self::pixels(base.width, base.height);
        if width > MAX_CANVAS_SIZE || height > MAX_CANVAS_SIZE {
            return Err(ExportError::ClipboardCanvasTooLarge { width, height });
        }
        Ok(Self { width, height })
    }

    fn pixels(width: f64, height: f64) -> (u32, u32) {
        let px = |v: f64| v.round().max(1.0).min(f64::from(u32::MAX)) as u32;
        (px(width), px(height))
    }
}

/// An encoded PNG and its pixel size.
#[derive(Debug, Clone)]
pub struct Raster {
    pub width: u32,
    pub height: u32,
    pub png: Vec<u8>,
}

/// A payload ready for the download/clipboard sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub filename: &'static str,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

impl ExportArtifact {
    /// `diagram.svg`, with HTML void tags made XML-safe.
    pub fn svg(svg: &str) -> Self {
        Self {
            filename: SVG_FILENAME,
            mime: "image/svg+xml",
            bytes: sanitize_void_tags(svg).into_bytes(),
        }
    }

    pub fn png(raster: Raster) -> Self {
        Self {
            filename: PNG_FILENAME,
            mime: "image/png",
            bytes: raster.png,
        }
    }

    /// `diagram.mmd`: the raw diagram source.
    pub fn source(source: &str) -> Self {
        Self {
            filename: SOURCE_FILENAME,
            mime: "text/plain",
            bytes: source.as_bytes().to_vec(),
        }
    }
}

/// Builds the private export copy of `svg`. The input is left untouched.
pub fn prepare_for_export(svg: &str) -> String {
    let out = sanitize_void_tags(svg);
    let out = force_label_color(&out, EXPORT_LABEL_COLOR);
    strip_font_rules(&out)
}

/// Rewrites HTML void elements (`<br>`, `<img ...>`) as self-closing so the markup parses as XML.
pub fn sanitize_void_tags(svg: &str) -> String {
    static BARE: OnceLock<Regex> = OnceLock::new();
    static WITH_ATTRS: OnceLock<Regex> = OnceLock::new();
    let bare = BARE.get_or_init(|| Regex::new(r"(?i)<(br|hr|wbr)\s*/?>").unwrap());
    let with_attrs = WITH_ATTRS.get_or_init(|| {
        Regex::new(
            r"(?i)<(img|input|area|base|col|embed|link|meta|param|source|track)(\s[^>]*?)?\s*/?>",
        )
        .unwrap()
    });
    let out = bare.replace_all(svg, "<$1/>");
    with_attrs.replace_all(&out, "<${1}${2}/>").into_owned()
}

/// Sets the inline `color` of every `div`, `span` and `p` inside `<foreignObject>` regions.
pub fn force_label_color(svg: &str, color: &str) -> String {
    const OPEN: &str = "<foreignObject";
    const CLOSE: &str = "</foreignObject>";
    static TAG: OnceLock<Regex> = OnceLock::new();
    let tag_re = TAG.get_or_init(|| Regex::new(r"(?i)<(div|span|p)(\s[^>]*?)?(/?)>").unwrap());

    let mut out = String::with_capacity(svg.len() + 64);
    let mut i = 0usize;
    while let Some(rel) = svg[i..].find(OPEN) {
        let start = i + rel;
        let Some(tag_end_rel) = svg[start..].find('>') else {
            break;
        };
        let inner_start = start + tag_end_rel + 1;
        if svg[start..inner_start].ends_with("/>") {
            out.push_str(&svg[i..inner_start]);
            i = inner_start;
            continue;
        }
        let Some(close_rel) = svg[inner_start..].find(CLOSE) else {
            break;
        };
        let inner_end = inner_start + close_rel;

        out.push_str(&svg[i..inner_start]);
        let inner = tag_re.replace_all(&svg[inner_start..inner_end], |c: &Captures<'_>| {
            let attrs = c.get(2).map_or("", |m| m.as_str());
            format!("<{}{}{}>", &c[1], with_color(attrs, color), &c[3])
        });
        out.push_str(&inner);
        i = inner_end;
    }
    out.push_str(&svg[i..]);
    out
}

fn with_color(attrs: &str, color: &str) -> String {
    static STYLE: OnceLock<Regex> = OnceLock::new();
    let style_re = STYLE.get_or_init(|| {
        Regex::new(r#"(?i)(\sstyle\s*=\s*)(?:"([^"]*)"|'([^']*)')"#).unwrap()
    });

    let Some(c) = style_re.captures(attrs) else {
        return format!(r#"{attrs} style="color: {color}""#);
    };
    let whole = c.get(0).map_or(0..0, |m| m.range());
    let existing = c.get(2).or_else(|| c.get(3)).map_or("", |m| m.as_str());
    let mut declarations = existing
        .split(';')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .filter(|d| {
            d.split_once(':')
                .is_none_or(|(prop, _)| !prop.trim().eq_ignore_ascii_case("color"))
        })
        .map(str::to_string)
        .collect::<Vec<_>>();
    declarations.push(format!("color: {color}"));
    format!(
        r#"{}{}"{}"{}"#,
        &attrs[..whole.start],
        &c[1],
        declarations.join("; ").replace('"', "'"),
        &attrs[whole.end..]
    )
}

/// Drops `@import` and `@font-face` rules from embedded style sheets. Exports only use locally
/// installed fonts.
pub fn strip_font_rules(svg: &str) -> String {
    static STYLE: OnceLock<Regex> = OnceLock::new();
    static RULES: OnceLock<Regex> = OnceLock::new();
    let style_re = STYLE.get_or_init(|| Regex::new(r"(?is)(<style[^>]*>)(.*?)(</style>)").unwrap());
    let rules_re = RULES.get_or_init(|| {
        Regex::new(r"(?is)@import\s[^;]*;|@font-face\s*\{[^}]*\}").unwrap()
    });
    style_re
        .replace_all(svg, |c: &Captures<'_>| {
            format!("{}{}{}", &c[1], rules_re.replace_all(&c[2], ""), &c[3])
        })
        .into_owned()
}

/// Converts prepared SVG into PNG with `resvg`.
///
/// Owns the font database; build it once at startup and share it.
#[derive(Clone)]
pub struct Rasterizer {
    fontdb: Arc<fontdb::Database>,
    font_family: String,
}

impl Rasterizer {
    /// Loads the system fonts. This is the expensive part; do it once.
    pub fn with_system_fonts() -> Self {
        let mut db = fontdb::Database::new();
        db.load_system_fonts();
        tracing::debug!(faces = db.len(), "loaded system fonts");
        Self::with_fonts(db)
    }

    pub fn with_fonts(db: fontdb::Database) -> Self {
        Self {
            fontdb: Arc::new(db),
            // Mermaid's baseline assumes a sans-serif stack.
            font_family: "Arial".to_string(),
        }
    }

    /// PNG at the zoom-scaled size of `svg`.
    pub fn export_png(&self, svg: &str, scale: f32, background: Option<&str>) -> Result<Raster> {
        if root_svg_tag(svg).is_none() {
            return Err(ExportError::MissingSvgElement);
        }
        let target = RasterTarget::for_export(resolve_size(svg), scale)?;
        self.rasterize(&prepare_for_export(svg), target, background)
    }

    /// PNG at the native size of `svg`, for clipboard copies.
    pub fn clipboard_png(&self, svg: &str, background: Option<&str>) -> Result<Raster> {
        if root_svg_tag(svg).is_none() {
            return Err(ExportError::MissingSvgElement);
        }
        let target = RasterTarget::for_clipboard(resolve_size(svg))?;
        self.rasterize(&prepare_for_export(svg), target, background)
    }

    /// Rasterizes already-prepared markup to exactly `target` pixels over an opaque background
    /// (`background`, default white).
    pub fn rasterize(
        &self,
        prepared: &str,
        target: RasterTarget,
        background: Option<&str>,
    ) -> Result<Raster> {
        let bg_text = background.unwrap_or(DEFAULT_BACKGROUND);
        let bg = parse_color(bg_text)
            .filter(|c| c.alpha() >= 1.0)
            .ok_or_else(|| ExportError::Background(bg_text.to_string()))?;

        let text = labels::foreign_objects_to_text(prepared);
        let mut opt = usvg::Options::default();
        opt.fontdb = Arc::clone(&self.fontdb);
        opt.font_family = self.font_family.clone();
        let tree = usvg::Tree::from_str(&text, &opt)?;

        let size = tree.size();
        let sx = target.width as f32 / size.width();
        let sy = target.height as f32 / size.height();

        let mut pixmap =
            tiny_skia::Pixmap::new(target.width, target.height).ok_or(ExportError::PixmapAlloc)?;
        pixmap.fill(bg);
        resvg::render(
            &tree,
            tiny_skia::Transform::from_scale(sx, sy),
            &mut pixmap.as_mut(),
        );

        let png = pixmap.encode_png().map_err(|_| ExportError::PngEncode)?;
        tracing::debug!(
            width = target.width,
            height = target.height,
            bytes = png.len(),
            "rasterized diagram"
        );
        Ok(Raster {
            width: target.width,
            height: target.height,
            png,
        })
    }
}

/// Parses `#rgb`, `#rgba`, `#rrggbb`, `#rrggbbaa`, `rgb()`/`rgba()` (comma or space separated,
/// numbers or percentages), `white`, `black` and `transparent`.
pub fn parse_color(text: &str) -> Option<tiny_skia::Color> {
    let s = text.trim().to_ascii_lowercase();
    match s.as_str() {
        "transparent" => return Some(tiny_skia::Color::from_rgba8(0, 0, 0, 0)),
        "white" => return Some(tiny_skia::Color::WHITE),
        "black" => return Some(tiny_skia::Color::BLACK),
        _ => {}
    }
    if let Some(args) = s
        .strip_prefix("rgba(")
        .or_else(|| s.strip_prefix("rgb("))
        .and_then(|rest| rest.strip_suffix(')'))
    {
        return parse_rgb_function(args);
    }

    let hex = s.strip_prefix('#')?;
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let nibble = |i: usize| u8::from_str_radix(&hex[i..=i], 16).ok();
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    let (r, g, b, a) = match hex.len() {
        3 => (nibble(0)? * 17, nibble(1)? * 17, nibble(2)? * 17, 255),
        4 => (
            nibble(0)? * 17,
            nibble(1)? * 17,
            nibble(2)? * 17,
            nibble(3)? * 17,
        ),
        6 => (byte(0)?, byte(2)?, byte(4)?, 255),
        8 => (byte(0)?, byte(2)?, byte(4)?, byte(6)?),
        _ => return None,
    };
    Some(tiny_skia::Color::from_rgba8(r, g, b, a))
}

fn parse_rgb_function(args: &str) -> Option<tiny_skia::Color> {
    let parts = args
        .split(|c: char| c == ',' || c == '/' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>();
    let (channels, alpha) = match parts.as_slice() {
        [r, g, b] => ([*r, *g, *b], None),
        [r, g, b, a] => ([*r, *g, *b], Some(*a)),
        _ => return None,
    };

    let unit = |part: &str, scale: f32| -> Option<f32> {
        let v = match part.strip_suffix('%') {
            Some(pct) => pct.parse::<f32>().ok()? / 100.0,
            None => part.parse::<f32>().ok()? / scale,
        };
        v.is_finite().then_some(v.clamp(0.0, 1.0))
    };
    let [r, g, b] = channels;
    let a = match alpha {
        Some(a) => unit(a, 1.0)?,
        None => 1.0,
    };
    tiny_skia::Color::from_rgba(unit(r, 255.0)?, unit(g, 255.0)?, unit(b, 255.0)?, a)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rasterizer() -> Rasterizer {
        Rasterizer::with_fonts(fontdb::Database::new())
    }

    fn png_info(bytes: &[u8]) -> (u32, u32, Vec<u8>) {
        let decoder = png::Decoder::new(bytes);
        let mut reader = decoder.read_info().expect("png header");
        let mut buf = vec![0; reader.output_buffer_size()];
        let info = reader.next_frame(&mut buf).expect("png frame");
        buf.truncate(info.buffer_size());
        (info.width, info.height, buf)
    }

    const SMALL: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" width="100" height="60" viewBox="0 0 100 60"><rect x="10" y="10" width="20" height="20" fill="red"/></svg>"#;

    #[test]
    fn export_scales_and_clipboard_stays_native() {
        let base = Size::new(100.0, 60.0).unwrap();
        assert_eq!(
            RasterTarget::for_export(base, 2.0).unwrap(),
            RasterTarget { width: 200, height: 120 }
        );
        assert_eq!(
            RasterTarget::for_clipboard(base).unwrap(),
            RasterTarget { width: 100, height: 60 }
        );
        assert_eq!(
            RasterTarget::for_export(Size::new(0.2, 0.4).unwrap(), 1.0).unwrap(),
            RasterTarget { width: 1, height: 1 }
        );
        assert_eq!(
            RasterTarget::for_export(Size::new(33.3, 10.0).unwrap(), 1.5).unwrap(),
            RasterTarget { width: 50, height: 15 }
        );
    }

    #[test]
    fn oversized_targets_are_rejected() {
        let base = Size::new(10_000.0, 600.0).unwrap();
        let err = RasterTarget::for_export(base, 2.0).unwrap_err();
        assert!(matches!(
            err,
            ExportError::CanvasTooLarge { width: 20_000, height: 1_200 }
        ));
        assert!(err.to_string().contains("Canvas size too large (20000x1200)"));

        let err = RasterTarget::for_clipboard(Size::new(600.0, 16_385.0).unwrap()).unwrap_err();
        assert!(matches!(
            err,
            ExportError::ClipboardCanvasTooLarge { width: 600, height: 16_385 }
        ));
        assert_eq!(
            err.to_string(),
            "Canvas size too large (600x16385). Try simplifying the diagram."
        );
        assert!(RasterTarget::for_clipboard(Size::new(16_384.0, 16_384.0).unwrap()).is_ok());
    }

    #[test]
    fn invalid_scales_are_rejected() {
        let base = Size::new(10.0, 10.0).unwrap();
        for scale in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            assert!(matches!(
                RasterTarget::for_export(base, scale),
                Err(ExportError::InvalidScale(_))
            ));
        }
    }

    #[test]
    fn oversized_export_fails_before_rasterizing() {
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" width="9000" height="9000"><this is not parseable"#;
        let err = rasterizer().export_png(svg, 2.0, None).unwrap_err();
        assert!(matches!(err, ExportError::CanvasTooLarge { .. }));
    }

    #[test]
    fn png_export_matches_target_size_on_white() {
        let raster = rasterizer().export_png(SMALL, 2.0, None).unwrap();
        assert_eq!((raster.width, raster.height), (200, 120));
        assert!(raster.png.starts_with(b"\x89PNG\r\n\x1a\n"));

        let (w, h, pixels) = png_info(&raster.png);
        assert_eq!((w, h), (200, 120));
        assert_eq!(&pixels[..4], &[255, 255, 255, 255], "top-left is background");
        let red = ((30 * 200 + 30) * 4) as usize;
        assert_eq!(&pixels[red..red + 4], &[255, 0, 0, 255]);
    }

    #[test]
    fn clipboard_png_ignores_zoom() {
        let raster = rasterizer().clipboard_png(SMALL, Some("#000")).unwrap();
        assert_eq!((raster.width, raster.height), (100, 60));
        let (_, _, pixels) = png_info(&raster.png);
        assert_eq!(&pixels[..4], &[0, 0, 0, 255]);
    }

    #[test]
    fn translucent_background_is_rejected() {
        let err = rasterizer().export_png(SMALL, 1.0, Some("transparent")).unwrap_err();
        assert!(matches!(err, ExportError::Background(_)));
        let err = rasterizer().export_png(SMALL, 1.0, Some("nope")).unwrap_err();
        assert!(matches!(err, ExportError::Background(_)));
    }

    #[test]
    fn markup_without_svg_is_reported() {
        let err = rasterizer().export_png("<div>nope</div>", 1.0, None).unwrap_err();
        assert!(matches!(err, ExportError::MissingSvgElement));
    }

    #[test]
    fn prepare_forces_dark_labels_on_a_copy() {
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg"><foreignObject width="50" height="20"><div xmlns="http://www.w3.org/1999/xhtml" style="display: table-cell; color: #ccc; background-color: #111"><span class="nodeLabel"><p>Start</p></span></div></foreignObject><text style="color: #ccc">outside</text></svg>"#;
        let original = svg.to_string();
        let prepared = prepare_for_export(svg);

        assert_eq!(svg, original);
        assert!(prepared.contains(
            r#"style="display: table-cell; background-color: #111; color: #000000""#
        ));
        assert!(prepared.contains(r#"<span class="nodeLabel" style="color: #000000">"#));
        assert!(prepared.contains(r#"<p style="color: #000000">Start</p>"#));
        assert!(prepared.contains(r#"<text style="color: #ccc">outside</text>"#));
        roxmltree::Document::parse(&prepared).expect("prepared markup is XML");
    }

    #[test]
    fn void_tags_become_self_closing() {
        let html = r#"<p>a<br>b<BR >c<br/></p><img src="x.png"><img src="y.png" /><hr><colgroup></colgroup>"#;
        assert_eq!(
            sanitize_void_tags(html),
            r#"<p>a<br/>b<BR/>c<br/></p><img src="x.png"/><img src="y.png"/><hr/><colgroup></colgroup>"#
        );
    }

    #[test]
    fn font_rules_are_removed_from_styles() {
        let svg = r#"<svg><style>@import url("https://fonts.example/css");@font-face { font-family: X; src: url(x.woff) } #a{fill:red}</style></svg>"#;
        let out = strip_font_rules(svg);
        assert!(!out.contains("@import"));
        assert!(!out.contains("@font-face"));
        assert!(out.contains("#a{fill:red}"));
    }

    #[test]
    fn artifacts_carry_file_names_and_mime_types() {
        let svg = ExportArtifact::svg("<svg><foreignObject><div>a<br>b</div></foreignObject></svg>");
        assert_eq!((svg.filename, svg.mime), ("diagram.svg", "image/svg+xml"));
        assert!(String::from_utf8(svg.bytes).unwrap().contains("a<br/>b"));

        let src = ExportArtifact::source("graph TD\n  A-->B");
        assert_eq!((src.filename, src.mime), ("diagram.mmd", "text/plain"));
        assert_eq!(src.bytes, b"graph TD\n  A-->B");
    }

    #[test]
    fn colors_parse() {
        assert_eq!(parse_color("#fff"), Some(tiny_skia::Color::WHITE));
        assert_eq!(
            parse_color("#11223344"),
            Some(tiny_skia::Color::from_rgba8(0x11, 0x22, 0x33, 0x44))
        );
        assert_eq!(parse_color("#12345"), None);
        assert_eq!(parse_color("#ggg"), None);
        assert_eq!(parse_color("red"), None);
    }

    #[test]
    fn rgb_functions_parse() {
        assert_eq!(parse_color("rgb(255, 255, 255)"), Some(tiny_skia::Color::WHITE));
        assert_eq!(
            parse_color("RGB(17 34 51)"),
            Some(tiny_skia::Color::from_rgba8(17, 34, 51, 255))
        );
        assert_eq!(parse_color("rgb(100%, 0%, 0%)"), Some(tiny_skia::Color::from_rgba8(255, 0, 0, 255)));
        let translucent = parse_color("rgba(0, 0, 0, 0.5)").unwrap();
        assert!((translucent.alpha() - 0.5).abs() < 1e-6);
        let translucent = parse_color("rgb(0 0 0 / 50%)").unwrap();
        assert!((translucent.alpha() - 0.5).abs() < 1e-6);
        assert_eq!(parse_color("rgb(1, 2)"), None);
        assert_eq!(parse_color("rgb(a, b, c)"), None);
        assert_eq!(parse_color("rgb(1, 2, 3"), None);
    }

    #[test]
    fn rgb_background_is_accepted_for_export() {
        let raster = rasterizer()
            .export_png(SMALL, 1.0, Some("rgb(0, 0, 255)"))
            .unwrap();
        let (_, _, pixels) = png_info(&raster.png);
        assert_eq!(&pixels[..4], &[0, 0, 255, 255]);
        assert!(matches!(
            rasterizer().export_png(SMALL, 1.0, Some("rgba(255, 255, 255, 0.4)")),
            Err(ExportError::Background(_))
        ));
    }

    #[test]
    fn self_closing_foreign_object_does_not_swallow_the_next_label() {
        let svg = r#"<svg><foreignObject width="0" height="0"/><div class="legend" style="color: red">k</div><foreignObject width="9" height="9"><div>x</div></foreignObject></svg>"#;
        let out = force_label_color(svg, "#000000");
        assert!(out.contains(r#"<div class="legend" style="color: red">k</div>"#));
        assert!(out.contains(r#"<div style="color: #000000">x</div>"#));
    }
}
