//! Address URL parsing — `proto[+tls][opt1;opt2]://host`.
//!
//! Grammar:
//!
//! ```text
//! url       := protocols [ "[" options "]" ] "://" host  |  host
//! protocols := token ("+" token)*
//! options   := token (";" token)*
//! ```
//!
//! Any `protocols` token equal to `ssl` or `tls` enables TLS; the
//! remaining (non-TLS) token becomes the protocol name. Input that does
//! not match the grammar is kept verbatim as `host`, with
//! `protocol = "tcp"`, `tls = false`, and an empty option set — parsing
//! never fails.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

fn address_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([^\[:]+)(\[[^\]]*\])?://(.+)$").expect("static address URL regex")
    })
}

/// A decoded `proto[+tls][opts]://host` address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressUrl {
    pub host: String,
    pub protocol: String,
    pub tls: bool,
    pub options: BTreeSet<String>,
}

impl AddressUrl {
    /// True if `protocol` names a TCP variant (`tcp`, `tcp4`, `tcp6`).
    pub fn is_tcp(&self) -> bool {
        matches!(self.protocol.as_str(), "tcp" | "tcp4" | "tcp6")
    }

    /// True if `option` is present in the parsed option set.
    pub fn has_option(&self, option: &str) -> bool {
        self.options.contains(option)
    }

    /// Parse an address URL, falling back to a bare-host default on any
    /// grammar mismatch. This function never fails.
    pub fn parse(url: &str) -> Self {
        let Some(captures) = address_url_regex().captures(url) else {
            return Self {
                host: url.to_string(),
                protocol: "tcp".to_string(),
                tls: false,
                options: BTreeSet::new(),
            };
        };

        let host = captures[3].to_string();

        let options = captures
            .get(2)
            .map(|m| {
                let inner = &m.as_str()[1..m.as_str().len() - 1];
                inner
                    .split(';')
                    .filter(|s| !s.is_empty())
                    .map(|s| s.to_string())
                    .collect()
            })
            .unwrap_or_default();

        let mut protocol = "tcp".to_string();
        let mut tls = false;
        for token in captures[1].split('+') {
            if token == "ssl" || token == "tls" {
                tls = true;
            } else {
                protocol = token.to_string();
            }
        }

        Self {
            host,
            protocol,
            tls,
            options,
        }
    }

    /// Re-encode into canonical `proto[+tls][opts]://host` form.
    ///
    /// Round-trips through [`AddressUrl::parse`] to the same structure,
    /// though option order is not guaranteed to match the original input.
    pub fn encode(&self) -> String {
        let mut proto = self.protocol.clone();
        if self.tls {
            proto.push_str("+tls");
        }
        if self.options.is_empty() {
            format!("{proto}://{}", self.host)
        } else {
            let opts = self.options.iter().cloned().collect::<Vec<_>>().join(";");
            format!("{proto}[{opts}]://{}", self.host)
        }
    }
}
