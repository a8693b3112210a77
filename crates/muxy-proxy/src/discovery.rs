//! Protocol-discovery state machine: reads from a fresh connection
//! under an inactivity deadline, classifies the buffered bytes against
//! a listener's matcher list, and returns the matched protocol name
//! (if any) plus the bytes already consumed from the client.

use std::time::Duration;

use muxy_core::matcher::Target;
use muxy_core::{AddressUrl, Matcher};
use tokio::io::AsyncReadExt;

use crate::realip::{self, Strip};

/// Discovery buffer capacity. The design value is 8 KiB; earlier
/// revisions used 128 or 4096 bytes. Must be large enough that a
/// typical HTTP request line and a TLS ClientHello record both fit in
/// one buffer.
pub const DISCOVERY_BUFFER_CAPACITY: usize = 8192;

/// Outcome of running discovery on a connection.
pub struct DiscoveryResult {
    /// The matched protocol name, if any matcher fired before the
    /// buffer filled, a read failed, or EOF was reached.
    pub protocol: Option<String>,
    /// Bytes already read from the client (after any real-IP preamble
    /// was logically stripped), which must reach the backend before
    /// any bytes read afterwards.
    pub head_bytes: Vec<u8>,
    /// The remote IP recovered either from the real-IP preamble or, if
    /// no preamble was found, left untouched by this module (the
    /// caller seeds it from the socket peer address beforehand).
    pub remote_ip_from_preamble: Option<std::net::IpAddr>,
}

/// Run the discovery driver loop against `stream`.
///
/// `send_real_ip_enabled` controls whether a leading real-IP preamble
/// is recognised and stripped; this mirrors the `send_real_ip` listener
/// option, which callers check before invoking this function.
pub async fn discover<R>(
    stream: &mut R,
    matchers: &[Matcher],
    timeout: Duration,
    send_real_ip_enabled: bool,
) -> DiscoveryResult
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut buf = vec![0u8; DISCOVERY_BUFFER_CAPACITY];
    let mut pos = 0usize;
    let mut preamble_consumed = 0usize;
    let mut remote_ip_from_preamble = None;

    loop {
        let read = tokio::time::timeout(timeout, stream.read(&mut buf[pos..])).await;
        let n = match read {
            Ok(Ok(n)) => n,
            Ok(Err(_)) | Err(_) => break,
        };
        if n == 0 {
            break;
        }
        pos += n;

        if let Some(protocol) = classify(
            &buf[..pos],
            matchers,
            send_real_ip_enabled,
            &mut preamble_consumed,
            &mut remote_ip_from_preamble,
        ) {
            return DiscoveryResult {
                protocol: Some(protocol),
                head_bytes: buf[preamble_consumed..pos].to_vec(),
                remote_ip_from_preamble,
            };
        }

        if pos == buf.len() {
            break;
        }
    }

    let protocol = classify(
        &buf[..pos],
        matchers,
        send_real_ip_enabled,
        &mut preamble_consumed,
        &mut remote_ip_from_preamble,
    );

    DiscoveryResult {
        protocol,
        head_bytes: buf[preamble_consumed..pos].to_vec(),
        remote_ip_from_preamble,
    }
}

/// Try to strip a real-IP preamble (once) and then try every matcher in
/// order against the data remaining after the strip. Returns the first
/// matching protocol name.
fn classify(
    data: &[u8],
    matchers: &[Matcher],
    send_real_ip_enabled: bool,
    preamble_consumed: &mut usize,
    remote_ip_from_preamble: &mut Option<std::net::IpAddr>,
) -> Option<String> {
    if send_real_ip_enabled && *preamble_consumed == 0 && data.starts_with(realip::MAGIC) {
        match realip::strip(data) {
            Strip::Stripped { remote_ip, consumed } => {
                *preamble_consumed = consumed;
                *remote_ip_from_preamble = Some(remote_ip);
            }
            Strip::Incomplete => return None,
            Strip::Absent => {}
        }
    }

    let remainder = &data[*preamble_consumed..];
    let has_newline = remainder.contains(&b'\n');

    for matcher in matchers {
        let applies = match matcher.target() {
            Target::Line => has_newline,
            Target::Raw => true,
        };
        if applies && matcher.matches(remainder) {
            return Some(matcher.protocol().to_string());
        }
    }

    None
}

/// Whether `backend` is the `send_real_ip` option enabled on the
/// listener address's sibling backend address. Exposed for the
/// connection handler, which decides whether to pass
/// `send_real_ip_enabled = true` into [`discover`] based on the
/// listener's own address options rather than the backend's, per the
/// configuration grammar (`send_real_ip` is a listen-side option).
pub fn listener_wants_real_ip(listen_address: &AddressUrl) -> bool {
    listen_address.has_option("send_real_ip")
}
