/* Command Sender — sequences a payload as one header frame plus N
 * continuation frames over the HID transport. */

use anyhow::Result;
use tracing::info;

use crate::frame::build_frames;
use crate::hid::DeviceIo;

/// Send `payload` under `command_id` as a header frame followed by however
/// many continuation frames it takes. `pad_used` and `patched` are logged
/// alongside the byte count purely for diagnostics — they come from
/// whichever mitigator ran before the payload reached this sender.
pub fn send(
    io: &DeviceIo,
    command_id: u16,
    payload: &[u8],
    pad_used: usize,
    patched: usize,
) -> Result<()> {
    let frames = build_frames(command_id, payload);
    for frame in &frames {
        io.write_frame(frame)?;
    }

    info!(
        command_id,
        bytes = payload.len(),
        frames = frames.len(),
        pad_used,
        patched,
        "command sent"
    );
    Ok(())
}
