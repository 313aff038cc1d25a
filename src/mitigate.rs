/* Forbidden-Byte Mitigator — the device rejects any payload that places a
 * 0x00 or 0x7C byte at specific recurring wire offsets. This module only
 * knows how to *detect* and *force-patch* violations; the padding search
 * itself is driven by the caller (the page assembler for ZIP payloads, or
 * [`mitigate_raw`] below for opaque ones), because only the caller knows
 * how to rebuild a larger candidate that still means the same thing. */

use tracing::{debug, warn};

use crate::frame::FRAME_SIZE;

/// Safe filler byte used for padding and for the last-resort patch.
pub const SAFE_BYTE: u8 = 0x01;
/// Byte used when force-patching an offending position in place.
pub const PATCH_BYTE: u8 = 0x11;

/// Default cap on the pad-length search before falling back to patching.
pub const DEFAULT_PAD_CAP: usize = FRAME_SIZE;

fn is_forbidden(byte: u8) -> bool {
    byte == 0x00 || byte == 0x7C
}

/// Offsets within `buf` that the device would reject, per the recurring
/// `1024k - 8` rule (k >= 1), i.e. `1016, 2040, 3064, ...` relative to the
/// start of the logical payload (the 8-byte header of the first frame is
/// not part of this buffer).
pub fn offending_offsets(buf: &[u8]) -> Vec<usize> {
    let mut offsets = Vec::new();
    let mut offset = FRAME_SIZE - 8;
    while offset < buf.len() {
        if is_forbidden(buf[offset]) {
            offsets.push(offset);
        }
        offset += FRAME_SIZE;
    }
    offsets
}

/// Does `buf` satisfy the forbidden-byte invariant as-is?
pub fn satisfies_invariant(buf: &[u8]) -> bool {
    offending_offsets(buf).is_empty()
}

/// Overwrite every offending byte in place with [`PATCH_BYTE`]. Returns the
/// number of bytes patched. This is the unconditional last resort: it never
/// fails, but it may visibly corrupt up to a handful of bytes of content.
pub fn force_patch(buf: &mut [u8]) -> usize {
    let offsets = offending_offsets(buf);
    for &off in &offsets {
        buf[off] = PATCH_BYTE;
    }
    if !offsets.is_empty() {
        warn!(
            count = offsets.len(),
            "force-patched forbidden bytes in payload"
        );
    }
    offsets.len()
}

/// Mitigate an opaque (non-ZIP) payload. Used for the small-window/
/// keep-alive, brightness, and label-style commands, whose payload has no
/// internal structure to exploit the way the page assembler exploits the
/// ZIP container.
///
/// Unlike the page assembler's pad search, trailing append cannot move an
/// offending byte that already sits inside the original content — appending
/// only ever creates new, always-safe bytes beyond the payload's current
/// end, it never rewrites what's already there. So there is no pad length
/// worth searching for: either the payload already satisfies the invariant
/// (`pad_used` stays 0), or it doesn't and the only recourse is the
/// unconditional last-resort patch. `cap` and `fast_no_pad` are accepted for
/// symmetry with the page assembler's pad search and so callers can log a
/// consistent `(pad_used, patched_count)` pair regardless of which mitigator
/// ran; `fast_no_pad` short-circuits straight to patching either way.
///
/// Returns `(payload, pad_used, patched_count)`. `patched_count` is nonzero
/// only when a force-patch ran.
pub fn mitigate_raw(payload: &[u8], _cap: usize, fast_no_pad: bool) -> (Vec<u8>, usize, usize) {
    let mut candidate = payload.to_vec();

    if !fast_no_pad && satisfies_invariant(&candidate) {
        debug!("forbidden-byte invariant already satisfied, no padding needed");
        return (candidate, 0, 0);
    }

    let patched = force_patch(&mut candidate);
    (candidate, 0, patched)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_payload_has_no_offending_offsets() {
        let buf = vec![0x00; 100];
        assert!(offending_offsets(&buf).is_empty());
        assert!(satisfies_invariant(&buf));
    }

    #[test]
    fn detects_forbidden_zero_at_first_boundary() {
        let mut buf = vec![0xAAu8; FRAME_SIZE - 8 + 1];
        buf[FRAME_SIZE - 8] = 0x00;
        assert_eq!(offending_offsets(&buf), vec![FRAME_SIZE - 8]);
        assert!(!satisfies_invariant(&buf));
    }

    #[test]
    fn detects_forbidden_header_byte() {
        let mut buf = vec![0xAAu8; FRAME_SIZE - 8 + 1];
        buf[FRAME_SIZE - 8] = 0x7C;
        assert!(!satisfies_invariant(&buf));
    }

    #[test]
    fn detects_multiple_boundaries() {
        let mut buf = vec![0xAAu8; 2 * FRAME_SIZE];
        buf[FRAME_SIZE - 8] = 0x00;
        buf[2 * FRAME_SIZE - 8] = 0x7C;
        let offs = offending_offsets(&buf);
        assert_eq!(offs, vec![FRAME_SIZE - 8, 2 * FRAME_SIZE - 8]);
    }

    #[test]
    fn force_patch_clears_all_offenders() {
        let mut buf = vec![0xAAu8; 2 * FRAME_SIZE];
        buf[FRAME_SIZE - 8] = 0x00;
        buf[2 * FRAME_SIZE - 8] = 0x7C;
        let n = force_patch(&mut buf);
        assert_eq!(n, 2);
        assert!(satisfies_invariant(&buf));
        assert_eq!(buf[FRAME_SIZE - 8], PATCH_BYTE);
    }

    #[test]
    fn mitigate_raw_already_safe_uses_zero_pad() {
        let payload = vec![0xAAu8; 10];
        let (out, pad, patched) = mitigate_raw(&payload, DEFAULT_PAD_CAP, false);
        assert_eq!(pad, 0);
        assert_eq!(patched, 0);
        assert_eq!(out, payload);
    }

    #[test]
    fn mitigate_raw_patches_when_already_violating() {
        let mut payload = vec![0xAAu8; FRAME_SIZE - 8 + 1];
        payload[FRAME_SIZE - 8] = 0x00;
        let (out, pad, patched) = mitigate_raw(&payload, DEFAULT_PAD_CAP, false);
        assert_eq!(pad, 0);
        assert_eq!(patched, 1);
        assert!(satisfies_invariant(&out));
    }

    #[test]
    fn mitigate_raw_fast_no_pad_forces_patch_immediately() {
        let mut payload = vec![0xAAu8; FRAME_SIZE - 8 + 1];
        payload[FRAME_SIZE - 8] = 0x00;
        let (out, pad, patched) = mitigate_raw(&payload, DEFAULT_PAD_CAP, true);
        assert_eq!(pad, 0);
        assert_eq!(patched, 1);
        assert!(satisfies_invariant(&out));
    }
}
