//! HTTP header rewriting for the `http_send_x_forwarded_for` backend
//! option: injects `X-Forwarded-For` and forces `Connection: close`.
//!
//! The `Connection:` replacement intentionally never fires: the
//! case-insensitive prefix check compares a 12-byte slice of the line
//! against the 11-byte literal `"connection:"`, which can never be
//! equal. This reproduces the upstream behaviour verbatim — existing
//! `Connection:` headers are left untouched, and a fresh
//! `Connection: close` line is appended alongside `X-Forwarded-For`.

use std::net::IpAddr;

use tokio::io::AsyncReadExt;

const XFF_PREFIX_LEN: usize = 16; // "X-Forwarded-For:"
const CONNECTION_PREFIX_LEN: usize = 12; // compared against "connection:" (11 bytes)

/// Read from `stream` into `head_bytes` until the buffered data ends
/// with `\r\n\r\n` or `\n\n`, or a read fails/returns EOF.
pub async fn read_headers_to_end<R>(stream: &mut R, head_bytes: &mut Vec<u8>) -> std::io::Result<()>
where
    R: tokio::io::AsyncRead + Unpin,
{
    loop {
        if ends_headers(head_bytes) {
            return Ok(());
        }
        let mut byte = [0u8; 1];
        let n = stream.read(&mut byte).await?;
        if n == 0 {
            return Ok(());
        }
        head_bytes.push(byte[0]);
    }
}

fn ends_headers(data: &[u8]) -> bool {
    data.ends_with(b"\r\n\r\n") || data.ends_with(b"\n\n")
}

/// Rewrite `head_bytes` in place: replace (or append) `X-Forwarded-For`
/// and append `Connection: close`.
pub fn rewrite(head_bytes: &[u8], remote_ip: IpAddr) -> Vec<u8> {
    let text = String::from_utf8_lossy(head_bytes);
    let mut lines: Vec<&str> = text.split('\n').collect();

    // Drop the trailing empty lines from the end-of-headers marker.
    lines.truncate(lines.len().saturating_sub(2));

    let xff_line = format!("X-Forwarded-For: {remote_ip}");
    let connection_line = "Connection: close".to_string();

    let mut found_xff = false;
    let mut found_connection = false;

    let mut rewritten: Vec<String> = lines
        .into_iter()
        .map(|line| {
            let trimmed = line.trim_end_matches('\r');
            if is_prefix_ci(trimmed, XFF_PREFIX_LEN, "x-forwarded-for:") {
                found_xff = true;
                xff_line.clone()
            } else if is_prefix_ci(trimmed, CONNECTION_PREFIX_LEN, "connection:") {
                found_connection = true;
                connection_line.clone()
            } else {
                trimmed.to_string()
            }
        })
        .collect();

    if !found_xff {
        rewritten.push(xff_line);
    }
    if !found_connection {
        rewritten.push(connection_line);
    }

    rewritten.push(String::new());
    rewritten.push(String::new());

    rewritten.join("\n").into_bytes()
}

/// Case-insensitive comparison of the first `prefix_len` bytes of
/// `line` against `expected`. `expected` is shorter than `prefix_len`
/// for the `Connection:` case by design; see the module doc comment.
fn is_prefix_ci(line: &str, prefix_len: usize, expected: &str) -> bool {
    if line.len() < prefix_len {
        return false;
    }
    line[..prefix_len].eq_ignore_ascii_case(expected)
}
