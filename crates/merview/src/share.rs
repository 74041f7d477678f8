//! Share fragments: diagram source compressed into a URL-safe `#code=` payload.
//!
//! The payload is LZ-string's `compressToEncodedURIComponent` output, so links produced by the
//! browser viewer decode here and vice versa.

use url::Url;

/// Hash prefix carrying the payload (`https://host/#code=<payload>`).
pub const HASH_PREFIX: &str = "#code=";

#[derive(Debug, thiserror::Error)]
pub enum ShareError {
    #[error("invalid share base URL: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),
}

/// Compresses `source` into a fragment that needs no further escaping inside a URL fragment.
pub fn encode(source: &str) -> String {
    lz_str::compress_to_encoded_uri_component(source)
}

/// Inverse of [`encode`].
///
/// Spaces inside the payload are read as `+`, which form decoding turns into spaces.
///
/// Returns `None` for anything that does not decode to a non-empty source: empty input,
/// characters outside the codec alphabet, corrupt payloads and invalid UTF-16.
pub fn decode(fragment: &str) -> Option<String> {
    let fragment = fragment.trim().replace(' ', "+");
    if fragment.is_empty() || !fragment.bytes().all(is_fragment_byte) {
        return None;
    }
    let units = lz_str::decompress_from_encoded_uri_component(&fragment)?;
    let source = String::from_utf16(&units).ok()?;
    if source.is_empty() {
        return None;
    }
    Some(source)
}

fn is_fragment_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'$')
}

/// Extracts the payload of a `#code=<payload>` hash. The leading `#` is optional.
pub fn fragment_from_hash(hash: &str) -> Option<&str> {
    let hash = hash.trim();
    let payload = hash
        .strip_prefix(HASH_PREFIX)
        .or_else(|| hash.strip_prefix(&HASH_PREFIX[1..]))?;
    (!payload.is_empty()).then_some(payload)
}

/// Builds a share URL for `source`.
///
/// An empty `base` yields just the hash (`#code=…`) so callers without a hosted viewer can still
/// hand the fragment around.
pub fn share_url(base: &str, source: &str) -> Result<String, ShareError> {
    let payload = encode(source);
    let base = base.trim();
    if base.is_empty() {
        return Ok(format!("{HASH_PREFIX}{payload}"));
    }
    let mut url = Url::parse(base)?;
    url.set_fragment(Some(&format!("{}{payload}", &HASH_PREFIX[1..])));
    Ok(url.into())
}

/// Recovers diagram source from a full share URL, a bare `#code=` hash, or a raw payload.
pub fn source_from_url(input: &str) -> Option<String> {
    let input = input.trim();
    if let Ok(url) = Url::parse(input) {
        return url.fragment().and_then(fragment_from_hash).and_then(decode);
    }
    match fragment_from_hash(input) {
        Some(payload) => decode(payload),
        None if input.starts_with('#') => None,
        None => decode(input),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_multiline_and_unicode_sources() {
        let sources = [
            "flowchart TD\n  A[Start] --> B{Is it working?}\n  B -- Yes --> C[Ship it]",
            "sequenceDiagram\r\n  Alice->>John: Hello John, how are you?",
            "flowchart LR\n  a[\"Grüße 👋 🦀\"] --> b[\"日本語のラベル\"]",
            "x",
            "%% comment only\n\n\n",
        ];
        for s in sources {
            assert_eq!(decode(&encode(s)).as_deref(), Some(s), "round-trip failed for {s:?}");
        }
    }

    #[test]
    fn encoding_is_deterministic_and_fragment_safe() {
        let source = "pie showData\n  title Pets adopted by year\n  \"Dogs\" : 386";
        let a = encode(source);
        let b = encode(source);
        assert_eq!(a, b);
        assert!(!a.is_empty());
        assert!(a.bytes().all(is_fragment_byte), "unexpected char in {a}");
    }

    #[test]
    fn malformed_fragments_decode_to_none() {
        for bad in ["", "   ", "%%%", "code=abc def", "<svg>", "#"] {
            assert_eq!(decode(bad), None, "expected None for {bad:?}");
        }
    }

    #[test]
    fn form_decoded_plus_signs_still_decode() {
        let (source, payload) = (0..200)
            .map(|i| format!("graph TD\n  A{i} --> B{i}[\"node {i}\"]"))
            .map(|s| {
                let payload = encode(&s);
                (s, payload)
            })
            .find(|(_, p)| p.trim_matches('+').contains('+'))
            .expect("some payload carries an interior '+'");
        let spaced = payload.replace('+', " ");
        assert_eq!(decode(&spaced).as_deref(), Some(source.as_str()));
        assert_eq!(
            source_from_url(&format!("{HASH_PREFIX}{spaced}")).as_deref(),
            Some(source.as_str())
        );
    }

    #[test]
    fn fragment_from_hash_requires_code_prefix() {
        assert_eq!(fragment_from_hash("#code=abc"), Some("abc"));
        assert_eq!(fragment_from_hash("code=abc"), Some("abc"));
        assert_eq!(fragment_from_hash("#code="), None);
        assert_eq!(fragment_from_hash("#other=abc"), None);
        assert_eq!(fragment_from_hash(""), None);
    }

    #[test]
    fn share_url_round_trips_through_source_from_url() {
        let source = "graph TD\n  A --> B";
        let url = share_url("https://viewer.example/app?x=1", source).unwrap();
        assert!(url.starts_with("https://viewer.example/app?x=1#code="));
        assert_eq!(source_from_url(&url).as_deref(), Some(source));

        let bare = share_url("", source).unwrap();
        assert!(bare.starts_with(HASH_PREFIX));
        assert_eq!(source_from_url(&bare).as_deref(), Some(source));

        let payload = encode(source);
        assert_eq!(source_from_url(&payload).as_deref(), Some(source));
    }

    #[test]
    fn share_url_rejects_relative_base() {
        assert!(matches!(
            share_url("not a url", "graph TD"),
            Err(ShareError::InvalidBaseUrl(_))
        ));
    }

    #[test]
    fn urls_without_code_fragment_have_no_source() {
        assert_eq!(source_from_url("https://viewer.example/"), None);
        assert_eq!(source_from_url("https://viewer.example/#theme=dark"), None);
        assert_eq!(source_from_url("#theme=dark"), None);
    }
}
