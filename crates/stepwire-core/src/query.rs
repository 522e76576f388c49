//! Query-string codec for step lists.
//!
//! Steps ride in the query string as ordered `key=value` pairs where the
//! same key may appear any number of times. Form-decoding containers that
//! collapse duplicates or reorder pairs would corrupt a step sequence, so
//! the codec is written out by hand: split on `&`, split each segment on
//! the first `=`, `+` to space, then strict percent-decoding. A segment
//! that fails to decode is reported on its own; the rest of the string is
//! unaffected.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("truncated percent escape")]
    TruncatedEscape,
    #[error("invalid percent escape `%{0}`")]
    BadEscape(String),
    #[error("percent-decoded text is not valid utf-8")]
    NotUtf8,
}

/// Splits a raw query into its `&`-separated segments, tolerating one
/// leading `?`. An empty query yields no segments; empty segments between
/// separators are kept (they decode to empty-key pairs, which replay counts
/// and skips).
pub fn split_segments(query: &str) -> impl Iterator<Item = &str> {
    let trimmed = query.strip_prefix('?').unwrap_or(query);
    trimmed.split('&').filter(move |_| !trimmed.is_empty())
}

/// Decodes one segment into a `(key, value)` pair. The segment splits on
/// the first `=` only; later `=` characters belong to the value. A segment
/// without `=` has an empty value.
pub fn decode_segment(segment: &str) -> Result<(String, String), DecodeError> {
    let (raw_key, raw_value) = match segment.split_once('=') {
        Some((k, v)) => (k, v),
        None => (segment, ""),
    };
    Ok((decode_component(raw_key)?, decode_component(raw_value)?))
}

/// Decodes a whole query, dropping malformed segments. Callers that need
/// to report which segments were dropped walk `split_segments` and
/// `decode_segment` themselves.
pub fn decode_query(query: &str) -> Vec<(String, String)> {
    split_segments(query)
        .filter_map(|segment| decode_segment(segment).ok())
        .collect()
}

fn decode_component(raw: &str) -> Result<String, DecodeError> {
    let input = raw.as_bytes();
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        match input[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' => {
                if input.len() - i < 3 {
                    return Err(DecodeError::TruncatedEscape);
                }
                let hi = hex_val(input[i + 1]);
                let lo = hex_val(input[i + 2]);
                match (hi, lo) {
                    (Some(h), Some(l)) => out.push((h << 4) | l),
                    _ => {
                        let escape: String =
                            raw[i + 1..].chars().take(2).collect();
                        return Err(DecodeError::BadEscape(escape));
                    }
                }
                i += 3;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8(out).map_err(|_| DecodeError::NotUtf8)
}

/// Percent-encodes one key or value. Unreserved bytes pass through;
/// everything else, space and `+` included, becomes `%XX` so the decoder's
/// plus-to-space pass cannot alter the payload.
pub fn encode_component(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for &b in text.as_bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => {
                out.push('%');
                out.push(HEX_UPPER[(b >> 4) as usize] as char);
                out.push(HEX_UPPER[(b & 0x0f) as usize] as char);
            }
        }
    }
    out
}

/// Encodes an ordered pair list into query form (no leading `?`).
pub fn encode_pairs<'a, I>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut out = String::new();
    for (key, value) in pairs {
        if !out.is_empty() {
            out.push('&');
        }
        out.push_str(&encode_component(key));
        out.push('=');
        out.push_str(&encode_component(value));
    }
    out
}

const HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
