#![forbid(unsafe_code)]

//! Runtime capability probing via device-attribute queries.
//!
//! Environment detection can only see what the launching shell exported;
//! the terminal itself knows more. This module sends DA1/DA2 queries on
//! the tty and parses the responses, refining [`Capabilities`].
//!
//! # Contract
//!
//! - **Bounded**: every probe has a hard timeout (default 150 ms).
//!   Absence of a response means "basic", never an error.
//! - **Fail-open**: unrecognized or malformed responses leave the
//!   corresponding capability unchanged.
//! - **Exclusive**: probing writes to and reads from the tty, so it must
//!   run after raw mode is entered and before the input loop starts.
//!
//! On non-Unix targets probing is a no-op.

use std::time::Duration;

use crate::capabilities::Capabilities;

/// Maximum bytes accepted in a single probe response.
const MAX_RESPONSE_LEN: usize = 256;

/// Default per-probe timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_millis(150);

/// DA1 (Primary Device Attributes) query: `CSI c`.
pub const DA1_QUERY: &[u8] = b"\x1b[c";

/// DA2 (Secondary Device Attributes) query: `CSI > c`.
pub const DA2_QUERY: &[u8] = b"\x1b[>c";

/// Probe configuration.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Timeout per individual query.
    pub timeout: Duration,
    /// Send the DA1 query.
    pub probe_da1: bool,
    /// Send the DA2 query.
    pub probe_da2: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            probe_da1: true,
            probe_da2: true,
        }
    }
}

/// Probe results. `None` fields mean timeout or unparseable response.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    /// DA1 attribute codes (e.g. 4 = Sixel, 22 = ANSI color).
    pub da1_attributes: Option<Vec<u32>>,
    /// DA2 terminal type identifier.
    pub da2_terminal_type: Option<u32>,
    /// DA2 firmware version.
    pub da2_version: Option<u32>,
}

impl ProbeResult {
    /// Fold the probe result into a capability set.
    ///
    /// Strictly additive: probing can confirm a terminal identity and
    /// color support, never remove anything detection granted.
    pub fn refine(&self, caps: &mut Capabilities) {
        if let Some(id) = self.da2_terminal_type {
            let name = da2_id_to_name(id);
            if caps.terminal_id.is_empty() && name != "unknown" {
                caps.terminal_id = name.to_string();
            }
        }
        if let Some(attrs) = &self.da1_attributes {
            if attrs.contains(&22) && caps.color_depth == crate::capabilities::ColorDepth::Mono {
                caps.color_depth = crate::capabilities::ColorDepth::Ansi16;
            }
        }
    }
}

/// Probe the terminal. Requires raw mode; see the module contract.
#[must_use]
pub fn probe_capabilities(config: &ProbeConfig) -> ProbeResult {
    #[cfg(unix)]
    return probe_unix(config);

    #[cfg(not(unix))]
    {
        let _ = config;
        ProbeResult::default()
    }
}

#[cfg(unix)]
fn probe_unix(config: &ProbeConfig) -> ProbeResult {
    let mut result = ProbeResult::default();

    if config.probe_da1 {
        result.da1_attributes =
            send_probe(DA1_QUERY, config.timeout).and_then(|r| parse_da1_response(&r));
    }

    if config.probe_da2 {
        if let Some((term_type, version)) =
            send_probe(DA2_QUERY, config.timeout).and_then(|r| parse_da2_response(&r))
        {
            result.da2_terminal_type = Some(term_type);
            result.da2_version = Some(version);
        }
    }

    tracing::debug!(?result, "capability probe complete");
    result
}

/// Parse a DA1 response: `ESC [ ? Ps ; Ps ; ... c`.
fn parse_da1_response(bytes: &[u8]) -> Option<Vec<u32>> {
    let start = find_subsequence(bytes, b"\x1b[?")?;
    let payload = &bytes[start + 3..];
    let end = payload.iter().position(|&b| b == b'c')?;

    let attrs: Vec<u32> = payload[..end]
        .split(|&b| b == b';')
        .filter_map(|chunk| std::str::from_utf8(chunk).ok()?.trim().parse().ok())
        .collect();

    if attrs.is_empty() {
        None
    } else {
        Some(attrs)
    }
}

/// Parse a DA2 response: `ESC [ > Pp ; Pv ; Pc c` → (type, version).
fn parse_da2_response(bytes: &[u8]) -> Option<(u32, u32)> {
    let start = find_subsequence(bytes, b"\x1b[>")?;
    let payload = &bytes[start + 3..];
    let end = payload.iter().position(|&b| b == b'c')?;

    let parts: Vec<u32> = payload[..end]
        .split(|&b| b == b';')
        .filter_map(|chunk| std::str::from_utf8(chunk).ok()?.trim().parse().ok())
        .collect();

    if parts.len() < 2 {
        None
    } else {
        Some((parts[0], parts[1]))
    }
}

/// Map a DA2 terminal type to a name.
#[must_use]
pub fn da2_id_to_name(id: u32) -> &'static str {
    match id {
        0 => "vt100",
        1 => "vt220",
        2 => "vt240",
        41 => "xterm",
        65 => "vt520",
        77 => "mintty",
        83 => "screen",
        84 => "tmux",
        85 => "rxvt-unicode",
        _ => "unknown",
    }
}

// ── Probe I/O (Unix) ─────────────────────────────────────────────────────

#[cfg(unix)]
fn send_probe(query: &[u8], timeout: Duration) -> Option<Vec<u8>> {
    use std::io::Write;

    let mut tty = std::fs::OpenOptions::new()
        .write(true)
        .open("/dev/tty")
        .ok()?;
    tty.write_all(query).ok()?;
    tty.flush().ok()?;
    drop(tty);

    read_tty_response(timeout)
}

/// Read a response from /dev/tty with a hard timeout.
///
/// A helper thread performs the blocking byte-by-byte read and watches
/// for a response terminator; the caller waits on a channel with the
/// timeout. On timeout the response is abandoned (the thread exits on
/// its own internal guard).
#[cfg(unix)]
fn read_tty_response(timeout: Duration) -> Option<Vec<u8>> {
    use std::io::Read;
    use std::sync::mpsc;
    use std::time::Instant;

    let tty = std::fs::File::open("/dev/tty").ok()?;
    let (tx, rx) = mpsc::sync_channel::<Vec<u8>>(1);
    let guard_timeout = timeout + Duration::from_millis(100);

    std::thread::Builder::new()
        .name("weft-caps-probe".into())
        .spawn(move || {
            let mut reader = std::io::BufReader::new(tty);
            let mut response = Vec::with_capacity(64);
            let mut buf = [0u8; 1];
            let start = Instant::now();

            while response.len() < MAX_RESPONSE_LEN {
                match reader.read(&mut buf) {
                    Ok(1) => {
                        response.push(buf[0]);
                        if is_response_complete(&response) {
                            break;
                        }
                    }
                    _ => break,
                }
                if start.elapsed() > guard_timeout {
                    break;
                }
            }

            let _ = tx.send(response);
        })
        .ok()?;

    match rx.recv_timeout(timeout) {
        Ok(bytes) if !bytes.is_empty() => Some(bytes),
        _ => None,
    }
}

/// Whether `buf` holds a complete CSI or OSC response.
fn is_response_complete(buf: &[u8]) -> bool {
    if buf.len() < 3 {
        return false;
    }

    if buf[0] == 0x1b && buf[1] == b'[' {
        return buf[buf.len() - 1].is_ascii_alphabetic();
    }

    if buf[0] == 0x1b && buf[1] == b']' {
        let last = buf[buf.len() - 1];
        if last == 0x07 {
            return true;
        }
        if buf.len() >= 4 && buf[buf.len() - 2] == 0x1b && last == b'\\' {
            return true;
        }
    }

    false
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::ColorDepth;

    #[test]
    fn da1_response_parses() {
        let attrs = parse_da1_response(b"\x1b[?62;22c").unwrap();
        assert_eq!(attrs, vec![62, 22]);
    }

    #[test]
    fn da1_garbage_prefix_tolerated() {
        // Stale input may precede the response.
        let attrs = parse_da1_response(b"zzz\x1b[?1;2c").unwrap();
        assert_eq!(attrs, vec![1, 2]);
    }

    #[test]
    fn da1_malformed_is_none() {
        assert!(parse_da1_response(b"\x1b[?c").is_none());
        assert!(parse_da1_response(b"nonsense").is_none());
    }

    #[test]
    fn da2_response_parses() {
        let (term_type, version) = parse_da2_response(b"\x1b[>41;354;0c").unwrap();
        assert_eq!(term_type, 41);
        assert_eq!(version, 354);
        assert_eq!(da2_id_to_name(term_type), "xterm");
    }

    #[test]
    fn da2_short_response_is_none() {
        assert!(parse_da2_response(b"\x1b[>41c").is_none());
    }

    #[test]
    fn response_completion_rules() {
        assert!(!is_response_complete(b"\x1b["));
        assert!(!is_response_complete(b"\x1b[?62;22"));
        assert!(is_response_complete(b"\x1b[?62;22c"));
        assert!(is_response_complete(b"\x1b]11;rgb:00/00/00\x07"));
        assert!(is_response_complete(b"\x1b]11;rgb:00/00/00\x1b\\"));
    }

    #[test]
    fn refine_is_additive() {
        let mut caps = Capabilities::dumb();
        let result = ProbeResult {
            da1_attributes: Some(vec![62, 22]),
            da2_terminal_type: Some(41),
            da2_version: Some(354),
        };
        result.refine(&mut caps);
        assert_eq!(caps.color_depth, ColorDepth::Ansi16);

        // A modern detection is never downgraded by an empty probe.
        let mut caps = Capabilities::modern();
        ProbeResult::default().refine(&mut caps);
        assert_eq!(caps, Capabilities::modern());
    }
}
