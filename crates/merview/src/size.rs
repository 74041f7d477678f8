//! Pixel size of rendered SVG markup.

use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    /// Used when the root element carries neither usable `width`/`height` nor a `viewBox`.
    pub const DEFAULT: Size = Size {
        width: 1000.0,
        height: 600.0,
    };

    pub fn new(width: f64, height: f64) -> Option<Self> {
        let ok = |v: f64| v.is_finite() && v > 0.0;
        (ok(width) && ok(height)).then_some(Self { width, height })
    }
}

/// Resolves the base size of `svg` from its root element.
///
/// Explicit `width`/`height` win (first number of each value, so `120px` reads as 120), then the
/// third and fourth `viewBox` fields, then [`Size::DEFAULT`]. Never fails.
pub fn resolve_size(svg: &str) -> Size {
    let Some(tag) = root_svg_tag(svg) else {
        return Size::DEFAULT;
    };

    let width = attr(tag, "width").and_then(parse_len);
    let height = attr(tag, "height").and_then(parse_len);
    if let (Some(w), Some(h)) = (width, height) {
        if let Some(size) = Size::new(w, h) {
            return size;
        }
    }

    attr(tag, "viewBox")
        .and_then(parse_viewbox_size)
        .unwrap_or(Size::DEFAULT)
}

fn parse_len(value: &str) -> Option<f64> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"([0-9]*\.?[0-9]+)").unwrap());
    re.captures(value)?.get(1)?.as_str().parse::<f64>().ok()
}

fn parse_viewbox_size(raw: &str) -> Option<Size> {
    let fields = raw
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<f64>().ok())
        .collect::<Option<Vec<_>>>()?;
    let [_, _, w, h] = fields.as_slice() else {
        return None;
    };
    Size::new(*w, *h)
}

/// Returns the root `<svg ...>` start tag, honoring quoted attribute values.
pub(crate) fn root_svg_tag(svg: &str) -> Option<&str> {
    let mut search = 0usize;
    let start = loop {
        let rel = svg[search..].find("<svg")?;
        let at = search + rel;
        let next = svg[at + 4..].chars().next();
        if matches!(next, Some(c) if c.is_whitespace() || c == '>' || c == '/') {
            break at;
        }
        search = at + 4;
    };

    let mut quote: Option<char> = None;
    for (i, ch) in svg[start..].char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, '>') => return Some(&svg[start..=start + i]),
            (None, _) => {}
        }
    }
    None
}

/// Reads attribute `name` from a start tag. Names are matched exactly (`width` does not match
/// `stroke-width`).
pub(crate) fn attr<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r#"\s([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap()
    });
    re.captures_iter(tag)
        .find(|c| c.get(1).is_some_and(|m| m.as_str() == name))
        .and_then(|c| c.get(2).or_else(|| c.get(3)))
        .map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_width_and_height_win() {
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" width="200" height="100" viewBox="0 0 50 40"></svg>"#;
        assert_eq!(resolve_size(svg), Size::new(200.0, 100.0).unwrap());
    }

    #[test]
    fn unit_suffixes_are_ignored() {
        let svg = r#"<svg width="120.5px" height='80pt'/>"#;
        assert_eq!(resolve_size(svg), Size::new(120.5, 80.0).unwrap());
    }

    #[test]
    fn viewbox_is_used_without_explicit_size() {
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 50 40"><rect/></svg>"#;
        assert_eq!(resolve_size(svg), Size::new(50.0, 40.0).unwrap());

        let commas = r#"<svg viewBox="-8,-8, 316.5 , 90"></svg>"#;
        assert_eq!(resolve_size(commas), Size::new(316.5, 90.0).unwrap());
    }

    #[test]
    fn mermaid_percent_width_falls_back_to_viewbox() {
        let svg = r#"<svg id="mmd-1" width="100%" xmlns="http://www.w3.org/2000/svg" style="max-width: 190px;" viewBox="-8 -8 190 174" role="graphics-document document"><g></g></svg>"#;
        assert_eq!(resolve_size(svg), Size::new(190.0, 174.0).unwrap());
    }

    #[test]
    fn missing_sizing_returns_default() {
        assert_eq!(resolve_size(r#"<svg xmlns="http://www.w3.org/2000/svg"></svg>"#), Size::DEFAULT);
        assert_eq!(resolve_size(r#"<svg viewBox="0 0 abc 40"></svg>"#), Size::DEFAULT);
        assert_eq!(resolve_size(r#"<svg viewBox="0 0 50"></svg>"#), Size::DEFAULT);
        assert_eq!(resolve_size(r#"<svg width="0" height="0"></svg>"#), Size::DEFAULT);
        assert_eq!(resolve_size(""), Size::DEFAULT);
        assert_eq!(resolve_size("not markup at all"), Size::DEFAULT);
    }

    #[test]
    fn only_the_root_element_is_consulted() {
        let svg = r#"<?xml version="1.0"?><svgx width="9" height="9"/><svg viewBox="0 0 30 20"><rect stroke-width="4" width="999" height="999"/></svg>"#;
        assert_eq!(resolve_size(svg), Size::new(30.0, 20.0).unwrap());
    }

    #[test]
    fn quoted_gt_does_not_end_the_root_tag() {
        let svg = r#"<svg data-note="a > b" width="10" height="20"></svg>"#;
        assert_eq!(resolve_size(svg), Size::new(10.0, 20.0).unwrap());
    }
}
