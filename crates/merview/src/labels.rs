//! `<foreignObject>` label flattening for raster output.
//!
//! `resvg` does not lay out HTML, so Mermaid's HTML labels would vanish from PNGs. Each
//! `<foreignObject>` is replaced in place by SVG `<text>` lines, keeping it inside the same `<g>`
//! so parent transforms still apply. The label color comes from the first inline `color`
//! declaration of the label markup.

use crate::size::attr;
use regex::Regex;
use std::sync::OnceLock;

pub(crate) const DEFAULT_LABEL_FILL: &str = "#333";
const FONT_SIZE: f64 = 16.0;
const OPEN_TAG: &str = "<foreignObject";
const CLOSE_TAG: &str = "</foreignObject>";

pub(crate) fn foreign_objects_to_text(svg: &str) -> String {
    if !svg.contains(OPEN_TAG) {
        return svg.to_string();
    }

    let mut out = String::with_capacity(svg.len());
    let mut i = 0usize;
    while let Some(rel) = svg[i..].find(OPEN_TAG) {
        let start = i + rel;
        out.push_str(&svg[i..start]);

        let Some(tag_end_rel) = svg[start..].find('>') else {
            out.push_str(&svg[start..]);
            return out;
        };
        let tag_end = start + tag_end_rel;
        let start_tag = &svg[start..=tag_end];
        if start_tag.ends_with("/>") {
            i = tag_end + 1;
            continue;
        }

        let inner_start = tag_end + 1;
        let Some(close_rel) = svg[inner_start..].find(CLOSE_TAG) else {
            out.push_str(&svg[start..]);
            return out;
        };
        let inner = &svg[inner_start..inner_start + close_rel];
        i = inner_start + close_rel + CLOSE_TAG.len();

        push_label(&mut out, start_tag, inner);
    }
    out.push_str(&svg[i..]);
    out
}

fn push_label(out: &mut String, start_tag: &str, inner: &str) {
    let num = |name: &str| attr(start_tag, name).and_then(|v| v.trim().parse::<f64>().ok());
    let (Some(width), Some(height)) = (num("width"), num("height")) else {
        return;
    };
    if width <= 0.0 || height <= 0.0 {
        return;
    }
    let lines = html_text_lines(inner);
    if lines.is_empty() {
        return;
    }

    let x = num("x").unwrap_or(0.0);
    let y = num("y").unwrap_or(0.0);
    let left = inner.to_ascii_lowercase().contains("text-align:left")
        || inner.to_ascii_lowercase().contains("text-align: left");
    let (anchor, text_x) = if left {
        ("start", x)
    } else {
        ("middle", x + width / 2.0)
    };
    let text_y = y + height / 2.0;
    let fill = label_color(inner).unwrap_or(DEFAULT_LABEL_FILL);

    let n = lines.len() as f64;
    for (idx, line) in lines.iter().enumerate() {
        let dy = idx as f64 * FONT_SIZE - FONT_SIZE * (n - 1.0) / 2.0;
        out.push_str(&format!(
            r#"<text x="{text_x}" y="{text_y}" dominant-baseline="central" fill="{fill}" text-anchor="{anchor}" font-size="{FONT_SIZE}"><tspan x="{text_x}" dy="{dy}">{}</tspan></text>"#,
            escape_text(line)
        ));
    }
}

/// First inline `color` declaration (not `background-color`) inside the label markup.
pub(crate) fn label_color(html: &str) -> Option<&str> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r#"(?i)(?:^|[^-\w])color\s*:\s*([^;"'!]+?)\s*(?:!important\s*)?(?:[;"']|$)"#)
            .unwrap()
    });
    re.captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
}

fn html_text_lines(html: &str) -> Vec<String> {
    let mut text = String::with_capacity(html.len());
    let mut rest = html;
    while let Some(lt) = rest.find('<') {
        text.push_str(&rest[..lt]);
        let Some(gt) = rest[lt..].find('>') else {
            rest = "";
            break;
        };
        let tag = rest[lt + 1..lt + gt].trim().to_ascii_lowercase();
        if tag.starts_with("br") || tag.starts_with("/p") || tag.starts_with("/div") {
            text.push('\n');
        }
        rest = &rest[lt + gt + 1..];
    }
    text.push_str(rest);

    htmlize::unescape(&text)
        .split('\n')
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect()
}

fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}
