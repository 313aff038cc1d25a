/* Daemon Orchestrator (C13) plus Keep-Alive & Reconnect (C12). Bundles the
 * device handle, subscriber handle, button state, and small-window state
 * into one owning struct driven by a single-threaded cooperative loop —
 * the same "owning struct instead of globals" shape the teacher uses for
 * `DeviceActor`, just synchronous instead of task-per-device. */

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::command;
use crate::config::Config;
use crate::events::{Decoder, EventStateMachine};
use crate::frame::cmd;
use crate::hid::{DeviceIo, ReadOutcome};
use crate::manifest::IconItem;
use crate::mitigate::mitigate_raw;
use crate::page::{self, Page};
use crate::server::{self, Command, ExplicitIcon};
use crate::telemetry::Telemetry;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(24);
const RECONNECT_BACKOFF: Duration = Duration::from_millis(500);
const HID_READ_TIMEOUT: Duration = Duration::from_millis(50);
const LOOP_SLEEP: Duration = Duration::from_millis(5);
const MAX_LABEL_STYLE_BYTES: u64 = 4096;

const MODE_STATS: u8 = 0;

#[derive(Debug, Clone)]
struct SmallWindowState {
    mode: u8,
    cpu: u8,
    mem: u8,
    gpu: u8,
    time: String,
}

impl Default for SmallWindowState {
    fn default() -> Self {
        Self {
            mode: MODE_STATS,
            cpu: 0,
            mem: 0,
            gpu: 0,
            time: "00:00:00".to_string(),
        }
    }
}

/// Owns every process-singleton the daemon needs: the device handle, the
/// subscriber socket, decoded button state, and small-window state.
pub struct Daemon {
    config: Config,
    listener: UnixListener,
    device: Option<DeviceIo>,
    subscriber: Option<UnixStream>,
    decoder: Decoder,
    state_machine: EventStateMachine,
    telemetry: Telemetry,
    small_window: SmallWindowState,
    last_keep_alive: Instant,
    last_reconnect_attempt: Instant,
    running: Arc<AtomicBool>,
}

impl Daemon {
    pub fn new(config: Config, running: Arc<AtomicBool>) -> Result<Self> {
        let listener = server::bind(&config.socket_path)
            .with_context(|| format!("binding socket at {}", config.socket_path.display()))?;
        let telemetry = Telemetry::new(config.gpu_helper.clone());

        let device = match DeviceIo::open(config.vendor_id, config.product_id) {
            Ok(d) => {
                info!("device present at startup");
                Some(d)
            }
            Err(_) => {
                info!("device absent at startup, will retry in the background");
                None
            }
        };

        Ok(Self {
            config,
            listener,
            device,
            subscriber: None,
            decoder: Decoder::new(),
            state_machine: EventStateMachine::new(),
            telemetry,
            small_window: SmallWindowState::default(),
            last_keep_alive: Instant::now(),
            last_reconnect_attempt: Instant::now(),
            running,
        })
    }

    pub fn run(&mut self) -> Result<()> {
        info!("daemon entering event loop");
        while self.running.load(Ordering::Relaxed) {
            self.tick()?;
        }
        info!("daemon exiting event loop");
        if self.config.socket_path.exists() {
            let _ = std::fs::remove_file(&self.config.socket_path);
        }
        Ok(())
    }

    fn tick(&mut self) -> Result<()> {
        if self.device.is_none() {
            self.try_reconnect();
        }

        self.accept_once();

        if self.subscriber.is_some() && self.device.is_some() {
            self.pump_hid();
        }

        if self.device.is_some() && self.last_keep_alive.elapsed() >= KEEP_ALIVE_INTERVAL {
            self.run_keep_alive();
        }

        std::thread::sleep(LOOP_SLEEP);
        Ok(())
    }

    fn try_reconnect(&mut self) {
        if self.last_reconnect_attempt.elapsed() < RECONNECT_BACKOFF {
            return;
        }
        self.last_reconnect_attempt = Instant::now();

        match DeviceIo::open(self.config.vendor_id, self.config.product_id) {
            Ok(d) => {
                info!("device reconnected");
                self.device = Some(d);
                self.state_machine.reset();
                self.decoder = Decoder::new();
                self.last_keep_alive = Instant::now();
                self.notify_subscriber("evt connected\n");
            }
            Err(_) => {
                debug!("reconnect attempt failed, device still absent");
            }
        }
    }

    fn accept_once(&mut self) {
        match self.listener.accept() {
            Ok((stream, _addr)) => {
                if let Err(e) = self.handle_connection(stream) {
                    warn!(error = %e, "error handling client connection");
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(e) => warn!(error = %e, "accept failed"),
        }
    }

    fn handle_connection(&mut self, mut stream: UnixStream) -> Result<()> {
        let mut reader = BufReader::new(stream.try_clone()?);
        let mut line = String::new();
        let n = reader.read_line(&mut line)?;
        if n == 0 {
            return Ok(());
        }

        let command = match server::parse_command(&line) {
            Ok(c) => c,
            Err(reason) => {
                debug!(reason, "rejected malformed client command");
                return write_response(&mut stream, Outcome::Err);
            }
        };

        if matches!(command, Command::ReadButtons) {
            self.subscriber = Some(stream);
            info!("client subscribed to button events");
            return Ok(());
        }

        let device_present = self.device.is_some();
        if !matches!(command, Command::Ping) && !device_present {
            return write_response(&mut stream, Outcome::NoDevice);
        }

        let outcome = self.dispatch(command);
        write_response(&mut stream, outcome)
    }

    fn dispatch(&mut self, command: Command) -> Outcome {
        match command {
            Command::Ping => {
                if self.device.is_some() {
                    Outcome::Ok
                } else {
                    Outcome::NoDevice
                }
            }
            Command::SetBrightness(n) => self.do_set_brightness(n),
            Command::SetSmallWindow {
                mode,
                cpu,
                mem,
                time,
                gpu,
            } => self.do_set_small_window(mode, cpu, mem, &time, gpu),
            Command::SetLabelStyle(path) => self.do_set_label_style(&path),
            Command::SetButtons(path) => self.do_set_buttons(&path),
            Command::SetButtonsExplicit(icons) => self.do_explicit(icons, cmd::FULL_PAGE, false),
            Command::SetButtonsExplicit14(icons) => self.do_explicit(icons, cmd::FULL_PAGE, true),
            Command::SetPartialExplicit(icons) => self.do_explicit(icons, cmd::PARTIAL_PAGE, false),
            Command::ReadButtons => unreachable!("handled before dispatch"),
        }
    }

    fn do_set_brightness(&mut self, n: i64) -> Outcome {
        let clamped = n.clamp(0, 100);
        let payload = clamped.to_string().into_bytes();
        self.send_raw(cmd::BRIGHTNESS, &payload)
    }

    fn do_set_small_window(&mut self, mode: u8, cpu: u8, mem: u8, time: &str, gpu: u8) -> Outcome {
        self.small_window.mode = mode;
        self.small_window.cpu = cpu;
        self.small_window.mem = mem;
        self.small_window.time = time.to_string();
        self.small_window.gpu = gpu;

        let payload = format!("{mode}|{cpu}|{mem}|{time}|{gpu}").into_bytes();
        self.send_raw(cmd::SMALL_WINDOW, &payload)
    }

    fn do_set_label_style(&mut self, path: &Path) -> Outcome {
        let Ok(meta) = std::fs::metadata(path) else {
            return Outcome::Err;
        };
        if !meta.is_file() || meta.len() > MAX_LABEL_STYLE_BYTES {
            return Outcome::Err;
        }
        let Ok(bytes) = std::fs::read(path) else {
            return Outcome::Err;
        };
        self.send_raw(cmd::LABEL_STYLE, &bytes)
    }

    fn do_set_buttons(&mut self, path: &Path) -> Outcome {
        let Ok(bytes) = std::fs::read(path) else {
            return Outcome::Err;
        };
        match page::repackage(&bytes, page::DEFAULT_PAD_CAP, self.config.fast_no_pad) {
            Ok(built) => self.send_page(cmd::FULL_PAGE, built),
            Err(e) => {
                debug!(error = %e, "set-buttons page re-package failed");
                Outcome::Err
            }
        }
    }

    fn do_explicit(&mut self, icons: Vec<ExplicitIcon>, command_id: u16, allow_index_14: bool) -> Outcome {
        let max_index = if allow_index_14 { 14 } else { 13 };
        let mut items = Vec::with_capacity(icons.len());
        for icon in icons {
            if icon.index == 0 || icon.index > max_index {
                continue;
            }
            let Ok(bytes) = std::fs::read(&icon.path) else {
                continue;
            };
            let file_name = icon
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| format!("btn{}.png", icon.index));
            items.push(IconItem {
                button_index: icon.index - 1,
                file_name,
                label: icon.label,
                icon_bytes: bytes,
            });
        }

        if items.is_empty() {
            return Outcome::Err;
        }

        match page::assemble(&items, page::DEFAULT_PAD_CAP, self.config.fast_no_pad) {
            Ok(built) => self.send_page(command_id, built),
            Err(e) => {
                debug!(error = %e, "explicit page assembly failed");
                Outcome::Err
            }
        }
    }

    fn send_page(&mut self, command_id: u16, page: Page) -> Outcome {
        let Some(io) = &self.device else {
            return Outcome::NoDevice;
        };
        match command::send(io, command_id, &page.buffer, page.pad_used, page.patched) {
            Ok(()) => Outcome::Ok,
            Err(e) => {
                warn!(error = %e, "page send failed, treating as disconnect");
                self.drop_device();
                Outcome::NoDevice
            }
        }
    }

    fn send_raw(&mut self, command_id: u16, payload: &[u8]) -> Outcome {
        let Some(io) = &self.device else {
            return Outcome::NoDevice;
        };
        let (mitigated, pad_used, patched) =
            mitigate_raw(payload, crate::mitigate::DEFAULT_PAD_CAP, self.config.fast_no_pad);
        match command::send(io, command_id, &mitigated, pad_used, patched) {
            Ok(()) => Outcome::Ok,
            Err(e) => {
                warn!(error = %e, "raw command send failed, treating as disconnect");
                self.drop_device();
                Outcome::NoDevice
            }
        }
    }

    fn pump_hid(&mut self) {
        let Some(io) = &self.device else { return };
        let read = io.read_frame(HID_READ_TIMEOUT);

        match read {
            Ok(ReadOutcome::Frame(frame)) => {
                let now = Instant::now();
                if let Some(decoded) = self.decoder.decode(&frame) {
                    if let Some(mode) = decoded.mode_update {
                        self.small_window.mode = mode;
                    }
                    if let Some((index, transition)) = decoded.transition {
                        let lines = self.state_machine.apply(index, transition, now);
                        for line in lines {
                            self.emit(&line);
                        }
                    }
                }
            }
            Ok(ReadOutcome::Timeout) => {
                let lines = self.state_machine.tick(Instant::now());
                for line in lines {
                    self.emit(&line);
                }
            }
            Err(e) => {
                warn!(error = %e, "HID read failed, treating as disconnect");
                self.drop_device();
            }
        }
    }

    fn run_keep_alive(&mut self) {
        self.last_keep_alive = Instant::now();

        if self.small_window.mode == MODE_STATS {
            self.small_window.cpu = self.telemetry.sample_cpu();
            self.small_window.mem = self.telemetry.sample_mem();
            self.small_window.gpu = self.telemetry.sample_gpu();
        }
        self.small_window.time = current_time_hhmmss();

        let payload = format!(
            "{}|{}|{}|{}|{}",
            self.small_window.mode,
            self.small_window.cpu,
            self.small_window.mem,
            self.small_window.time,
            self.small_window.gpu
        )
        .into_bytes();

        let Some(io) = &self.device else { return };
        let (mitigated, pad_used, patched) =
            mitigate_raw(&payload, crate::mitigate::DEFAULT_PAD_CAP, self.config.fast_no_pad);
        if let Err(e) = command::send(io, cmd::SMALL_WINDOW, &mitigated, pad_used, patched) {
            warn!(error = %e, "keep-alive send failed, treating as disconnect");
            self.drop_device();
        }
    }

    fn drop_device(&mut self) {
        self.device = None;
        self.notify_subscriber("evt disconnected\n");
    }

    fn emit(&mut self, line: &str) {
        self.notify_subscriber(line);
    }

    fn notify_subscriber(&mut self, line: &str) {
        let Some(stream) = &mut self.subscriber else {
            return;
        };
        if let Err(e) = stream.write_all(line.as_bytes()) {
            debug!(error = %e, "subscriber write failed, dropping subscription");
            self.subscriber = None;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Ok,
    Err,
    NoDevice,
}

fn write_response(stream: &mut UnixStream, outcome: Outcome) -> Result<()> {
    let line = match outcome {
        Outcome::Ok => "ok\n",
        Outcome::Err => "err\n",
        Outcome::NoDevice => "err no_device\n",
    };
    stream.write_all(line.as_bytes())?;
    Ok(())
}

fn current_time_hhmmss() -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let secs_of_day = now % 86_400;
    let h = secs_of_day / 3600;
    let m = (secs_of_day % 3600) / 60;
    let s = secs_of_day % 60;
    format!("{h:02}:{m:02}:{s:02}")
}
