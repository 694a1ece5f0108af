//! Close-code bookkeeping for the session log.

use phf::phf_map;

/// User-initiated or server "normal closure". Never triggers a reconnect.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Synthetic code for connections that died without a close handshake,
/// matching what a browser reports for the same failure.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Reserved code for close frames that carried no status code.
pub const NO_STATUS: u16 = 1005;

static CLOSE_REASONS: phf::Map<u16, &'static str> = phf_map! {
    1000_u16 => "normal closure",
    1001_u16 => "going away",
    1002_u16 => "protocol error",
    1003_u16 => "unsupported data",
    1006_u16 => "abnormal closure",
    1007_u16 => "invalid payload",
    1008_u16 => "policy violation",
    1009_u16 => "message too big",
    1011_u16 => "server error",
    1015_u16 => "TLS failure",
};

/// Human-readable reason for a WebSocket close code.
#[must_use]
pub fn close_reason(code: u16) -> &'static str {
    CLOSE_REASONS.get(&code).copied().unwrap_or("unknown")
}
