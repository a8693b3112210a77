//! The real-client-IP preamble: a small framed header a cooperating
//! backend can opt into via the `send_real_ip` listener option,
//! carrying the original client address ahead of the relayed bytes.

use std::net::IpAddr;

/// `0xFF 0x09 'M' 'u' 'x' 'y' 'P' 'r' 'o' 'x' 'y'` — 11 bytes.
pub const MAGIC: &[u8] = b"\xFF\x09MuxyProxy";

/// Build the preamble for `ip`: magic, a one-byte length, then the raw
/// address bytes (4 for IPv4, 16 for IPv6; no byte order conversion).
pub fn encode(ip: IpAddr) -> Vec<u8> {
    let mut out = Vec::with_capacity(MAGIC.len() + 1 + 16);
    out.extend_from_slice(MAGIC);
    match ip {
        IpAddr::V4(v4) => {
            out.push(4);
            out.extend_from_slice(&v4.octets());
        }
        IpAddr::V6(v6) => {
            out.push(16);
            out.extend_from_slice(&v6.octets());
        }
    }
    out
}

/// Result of attempting to strip a leading preamble from a discovery
/// buffer.
pub enum Strip {
    /// No preamble present (magic absent or option not enabled).
    Absent,
    /// Magic present but not enough bytes buffered yet to read the
    /// full address; caller should read more before retrying.
    Incomplete,
    /// Preamble stripped; carries the parsed address and the number of
    /// bytes consumed from the front of the buffer.
    Stripped { remote_ip: IpAddr, consumed: usize },
}

/// Attempt to strip a real-IP preamble from the front of `data`.
pub fn strip(data: &[u8]) -> Strip {
    if !data.starts_with(MAGIC) {
        return Strip::Absent;
    }
    let Some(&k) = data.get(MAGIC.len()) else {
        return Strip::Incomplete;
    };
    let k = k as usize;
    let header_len = MAGIC.len() + 1;
    if header_len + k > data.len() {
        return Strip::Incomplete;
    }

    let addr_bytes = &data[header_len..header_len + k];
    let remote_ip = match k {
        4 => {
            let mut octets = [0u8; 4];
            octets.copy_from_slice(addr_bytes);
            IpAddr::from(octets)
        }
        16 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(addr_bytes);
            IpAddr::from(octets)
        }
        0 => return Strip::Stripped {
            remote_ip: IpAddr::from([0, 0, 0, 0]),
            consumed: header_len,
        },
        _ => return Strip::Absent,
    };

    Strip::Stripped {
        remote_ip,
        consumed: header_len + k,
    }
}
