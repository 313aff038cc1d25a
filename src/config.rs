/* Daemon configuration, resolved once at startup from environment variables.
 * No config file and no persisted state — per the spec's Non-goals, the
 * core keeps nothing on disk beyond what the caller hands it per-command. */
use std::path::PathBuf;

/// Fixed USB vendor id for the target device.
pub const DEFAULT_VENDOR_ID: u16 = 0x0483;
/// Fixed USB product id for the target device.
pub const DEFAULT_PRODUCT_ID: u16 = 0x5750;

const DEFAULT_SOCKET_PATH: &str = "/run/deckd/deckd.sock";

#[derive(Debug, Clone)]
pub struct Config {
    pub socket_path: PathBuf,
    pub debug: bool,
    pub fast_no_pad: bool,
    pub gpu_helper: Option<PathBuf>,
    pub vendor_id: u16,
    pub product_id: u16,
}

impl Config {
    /// Resolve configuration from the process environment.
    pub fn from_env() -> Self {
        let socket_path = std::env::var_os("DECKD_SOCKET_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET_PATH));

        let debug = env_flag("DECKD_DEBUG");
        let fast_no_pad = env_flag("DECKD_FAST_NO_PAD");
        let gpu_helper = std::env::var_os("DECKD_GPU_HELPER").map(PathBuf::from);

        let vendor_id = env_hex_u16("DECKD_VENDOR_ID").unwrap_or(DEFAULT_VENDOR_ID);
        let product_id = env_hex_u16("DECKD_PRODUCT_ID").unwrap_or(DEFAULT_PRODUCT_ID);

        Self {
            socket_path,
            debug,
            fast_no_pad,
            gpu_helper,
            vendor_id,
            product_id,
        }
    }
}

fn env_flag(name: &str) -> bool {
    match std::env::var(name) {
        Ok(v) => !v.is_empty() && v != "0",
        Err(_) => false,
    }
}

fn env_hex_u16(name: &str) -> Option<u16> {
    let v = std::env::var(name).ok()?;
    let v = v.trim_start_matches("0x");
    u16::from_str_radix(v, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_socket_path_is_well_known() {
        assert_eq!(DEFAULT_SOCKET_PATH, "/run/deckd/deckd.sock");
    }
}
