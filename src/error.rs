/* Domain-specific error variants used where the orchestrator needs to match
 * on a concrete kind (e.g. treat `DeviceAbsent` differently from a transient
 * `Io` failure). Call sites that only need to propagate and annotate use
 * `anyhow::Result` with `.context(...)` instead — see `hid.rs` and
 * `page.rs` — mirroring the split the teacher uses between `DriverError`
 * and `anyhow::Context`. */
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("device not present")]
    DeviceAbsent,

    #[error("HID I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),
}

pub type DaemonResult<T> = std::result::Result<T, DaemonError>;
