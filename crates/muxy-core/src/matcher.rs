//! Protocol matchers — regex and byte-literal, anchored or line-oriented.

use regex::bytes::Regex;

use crate::error::{MatcherCompileError, MatcherCompileResult};

/// Which slice of the buffered bytes a matcher is applied against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// The bytes preceding the first `\n`, with a trailing `\r` stripped.
    /// Only applied once a `\n` has been observed.
    Line,
    /// The entire buffered data, unconditionally.
    Raw,
}

/// A single element of a byte-literal pattern: either a concrete byte
/// value or a wildcard matching any byte at that position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralElement {
    Byte(u8),
    Wildcard,
}

/// A compiled protocol matcher.
///
/// Dispatch is a single match on this tag — no heap allocation, no
/// dynamic dispatch rather than a trait object.
#[derive(Debug, Clone)]
pub enum Matcher {
    Regex {
        target: Target,
        protocol: String,
        pattern: Regex,
    },
    Literal {
        target: Target,
        protocol: String,
        pattern: Vec<LiteralElement>,
    },
}

impl Matcher {
    pub fn target(&self) -> Target {
        match self {
            Matcher::Regex { target, .. } => *target,
            Matcher::Literal { target, .. } => *target,
        }
    }

    pub fn protocol(&self) -> &str {
        match self {
            Matcher::Regex { protocol, .. } => protocol,
            Matcher::Literal { protocol, .. } => protocol,
        }
    }

    /// Apply the matcher to `data`.
    ///
    /// Regex matchers are unanchored. Literal matchers are anchored at
    /// offset 0 and never match if `data` is shorter than the pattern.
    pub fn matches(&self, data: &[u8]) -> bool {
        match self {
            Matcher::Regex { pattern, .. } => pattern.is_match(data),
            Matcher::Literal { pattern, .. } => {
                if data.len() < pattern.len() {
                    return false;
                }
                pattern.iter().zip(data).all(|(elem, byte)| match elem {
                    LiteralElement::Wildcard => true,
                    LiteralElement::Byte(b) => b == byte,
                })
            }
        }
    }

    /// Compile a `regex`-type matcher entry.
    pub fn compile_regex(
        protocol: impl Into<String>,
        target: Target,
        pattern: &str,
    ) -> MatcherCompileResult<Matcher> {
        Ok(Matcher::Regex {
            target,
            protocol: protocol.into(),
            pattern: Regex::new(pattern)?,
        })
    }

    /// Compile a `string`-type matcher entry: every code unit of `value`
    /// becomes a concrete byte, no wildcards. This can never fail.
    pub fn compile_string(protocol: impl Into<String>, target: Target, value: &str) -> Matcher {
        let pattern = value.bytes().map(LiteralElement::Byte).collect();
        Matcher::Literal {
            target,
            protocol: protocol.into(),
            pattern,
        }
    }

    /// Compile a `bytes`-type matcher entry: each element is either a
    /// byte value in `0..=255` or a negative number denoting a wildcard.
    pub fn compile_bytes(
        protocol: impl Into<String>,
        target: Target,
        values: &[i64],
    ) -> MatcherCompileResult<Matcher> {
        let pattern = values
            .iter()
            .map(|&v| match v {
                v if v < 0 => Ok(LiteralElement::Wildcard),
                v if v <= 255 => Ok(LiteralElement::Byte(v as u8)),
                v => Err(MatcherCompileError::ByteOutOfRange(v)),
            })
            .collect::<MatcherCompileResult<Vec<_>>>()?;
        Ok(Matcher::Literal {
            target,
            protocol: protocol.into(),
            pattern,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_anchored_match() {
        let m = Matcher::compile_bytes("tls", Target::Raw, &[0x16, 0x03, -1, -1, -1, 0x01]).unwrap();
        assert!(m.matches(&[0x16, 0x03, 0x01, 0x00, 0x4a, 0x01]));
    }

    #[test]
    fn literal_rejects_short_input() {
        let m = Matcher::compile_bytes("tls", Target::Raw, &[0x16, 0x03, -1]).unwrap();
        assert!(!m.matches(&[0x16, 0x03]));
    }

    #[test]
    fn literal_wildcard_matches_any_byte_at_position() {
        let m = Matcher::compile_bytes("x", Target::Raw, &[-1, -1]).unwrap();
        assert!(m.matches(&[0x00, 0xff]));
        assert!(m.matches(&[0x7f, 0x01]));
    }

    #[test]
    fn literal_empty_pattern_always_matches() {
        let m = Matcher::compile_bytes("x", Target::Line, &[]).unwrap();
        assert!(m.matches(&[]));
        assert!(m.matches(b"anything"));
    }

    #[test]
    fn literal_out_of_range_byte_is_rejected() {
        let err = Matcher::compile_bytes("x", Target::Raw, &[256]).unwrap_err();
        assert!(matches!(err, MatcherCompileError::ByteOutOfRange(256)));
    }

    #[test]
    fn compile_string_has_no_wildcards() {
        let m = Matcher::compile_string("http", Target::Line, "GET ");
        assert!(m.matches(b"GET /index.html HTTP/1.1"));
        assert!(!m.matches(b"POST /"));
    }

    #[test]
    fn regex_matcher_is_unanchored() {
        let m = Matcher::compile_regex(
            "http",
            Target::Line,
            r"^(GET|POST|PUT|DELETE|HEAD) .*HTTP/1\.[01]$",
        )
        .unwrap();
        assert!(m.matches(b"GET / HTTP/1.1"));
        assert!(!m.matches(b"WAT / HTTP/1.1"));
    }

    #[test]
    fn invalid_regex_is_a_compile_error() {
        let err = Matcher::compile_regex("x", Target::Raw, "(unclosed").unwrap_err();
        assert!(matches!(err, MatcherCompileError::InvalidRegex(_)));
    }

    #[test]
    fn protocol_and_target_accessors() {
        let m = Matcher::compile_string("ssh", Target::Raw, "SSH-2.0");
        assert_eq!(m.protocol(), "ssh");
        assert_eq!(m.target(), Target::Raw);
    }
}
