/* Telemetry Sampler — host CPU/memory/GPU percentages folded into the
 * small-window keep-alive payload. Every source tolerates being absent;
 * nothing here ever blocks longer than a process spawn. */

use std::fs;
use std::path::PathBuf;
use std::process::Command as ProcCommand;

use tracing::debug;

fn clamp_pct(value: i64) -> u8 {
    value.clamp(0, 99) as u8
}

/// Samples CPU and GPU usage, carrying the previous `/proc/stat` totals
/// needed to turn cumulative jiffies into a point-in-time percentage.
pub struct Telemetry {
    prev_total: u64,
    prev_idle: u64,
    gpu_helper: Option<PathBuf>,
}

impl Telemetry {
    pub fn new(gpu_helper: Option<PathBuf>) -> Self {
        Self {
            prev_total: 0,
            prev_idle: 0,
            gpu_helper,
        }
    }

    /// CPU load, 0..99. First call always reports 0 — there is no prior
    /// sample to diff against yet.
    pub fn sample_cpu(&mut self) -> u8 {
        let Some((total, idle)) = read_proc_stat() else {
            return 0;
        };

        if self.prev_total == 0 {
            self.prev_total = total;
            self.prev_idle = idle;
            return 0;
        }

        let dtotal = total.saturating_sub(self.prev_total);
        let didle = idle.saturating_sub(self.prev_idle);
        self.prev_total = total;
        self.prev_idle = idle;

        if dtotal == 0 {
            return 0;
        }
        let busy = (dtotal.saturating_sub(didle)) as f64 * 100.0 / dtotal as f64;
        clamp_pct(busy.round() as i64)
    }

    /// Memory usage, 0..99, from `MemTotal`/`MemAvailable`.
    pub fn sample_mem(&self) -> u8 {
        let Some((total, available)) = read_proc_meminfo() else {
            return 0;
        };
        if total == 0 {
            return 0;
        }
        let used = (total.saturating_sub(available)) as f64 * 100.0 / total as f64;
        clamp_pct(used.round() as i64)
    }

    /// GPU usage, 0..99. Prefers the configured external helper; falls
    /// back to per-vendor sysfs/`nvidia-smi` probes; returns 0 if nothing
    /// is available.
    pub fn sample_gpu(&self) -> u8 {
        if let Some(helper) = &self.gpu_helper {
            if let Some(pct) = run_gpu_helper(helper) {
                return clamp_pct(pct);
            }
        }
        if let Some(pct) = sysfs_gpu_busy() {
            return clamp_pct(pct);
        }
        if let Some(pct) = nvidia_smi_gpu_busy() {
            return clamp_pct(pct);
        }
        0
    }
}

fn read_proc_stat() -> Option<(u64, u64)> {
    let contents = fs::read_to_string("/proc/stat").ok()?;
    let line = contents.lines().next()?;
    let mut fields = line.split_whitespace();
    if fields.next()? != "cpu" {
        return None;
    }
    let values: Vec<u64> = fields.filter_map(|f| f.parse().ok()).collect();
    if values.len() < 4 {
        return None;
    }
    let idle = values[3] + values.get(4).copied().unwrap_or(0); // idle + iowait
    let total: u64 = values.iter().sum();
    Some((total, idle))
}

fn read_proc_meminfo() -> Option<(u64, u64)> {
    let contents = fs::read_to_string("/proc/meminfo").ok()?;
    let mut total = None;
    let mut available = None;
    for line in contents.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            total = parse_kb_field(rest);
        } else if let Some(rest) = line.strip_prefix("MemAvailable:") {
            available = parse_kb_field(rest);
        }
    }
    Some((total?, available?))
}

fn parse_kb_field(rest: &str) -> Option<u64> {
    rest.split_whitespace().next()?.parse().ok()
}

fn run_gpu_helper(helper: &std::path::Path) -> Option<i64> {
    let output = ProcCommand::new(helper).output().ok()?;
    if !output.status.success() {
        debug!(?helper, "gpu helper exited non-zero");
        return None;
    }
    let text = String::from_utf8(output.stdout).ok()?;
    let value: i64 = text.trim().parse().ok()?;
    if value <= 0 {
        None
    } else {
        Some(value)
    }
}

/// AMD and Intel both expose a `gpu_busy_percent` file under the DRM card
/// device directory on recent kernels; a generic devfreq load node is
/// tried as a last sysfs resort.
fn sysfs_gpu_busy() -> Option<i64> {
    const CANDIDATES: &[&str] = &[
        "/sys/class/drm/card0/device/gpu_busy_percent",
        "/sys/class/drm/card1/device/gpu_busy_percent",
        "/sys/class/devfreq/devfreq0/load",
    ];
    for path in CANDIDATES {
        if let Ok(text) = fs::read_to_string(path) {
            let digits: String = text.chars().take_while(|c| c.is_ascii_digit()).collect();
            if let Ok(value) = digits.parse::<i64>() {
                return Some(value);
            }
        }
    }
    None
}

fn nvidia_smi_gpu_busy() -> Option<i64> {
    let output = ProcCommand::new("nvidia-smi")
        .args(["--query-gpu=utilization.gpu", "--format=csv,noheader,nounits"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8(output.stdout).ok()?;
    text.lines().next()?.trim().parse().ok()
}
