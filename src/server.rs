/* Local Server — binds the well-known Unix domain socket and turns one
 * line of client text into a [`Command`]. Dispatching a parsed command
 * against live device state is the orchestrator's job; this module only
 * owns the socket and the grammar. */

use std::collections::BTreeMap;
use std::io;
use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};

/// One icon supplied through `--button-N=<path>` (+ optional `--label-N=`).
#[derive(Debug, Clone, PartialEq)]
pub struct ExplicitIcon {
    pub index: u32,
    pub path: PathBuf,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Ping,
    SetBrightness(i64),
    SetSmallWindow {
        mode: u8,
        cpu: u8,
        mem: u8,
        time: String,
        gpu: u8,
    },
    SetLabelStyle(PathBuf),
    SetButtons(PathBuf),
    SetButtonsExplicit(Vec<ExplicitIcon>),
    SetButtonsExplicit14(Vec<ExplicitIcon>),
    SetPartialExplicit(Vec<ExplicitIcon>),
    ReadButtons,
}

/// Bind the daemon's command socket, removing any stale file left behind
/// by a previous run first. Returns a non-blocking listener.
pub fn bind(socket_path: &Path) -> io::Result<UnixListener> {
    if socket_path.exists() {
        std::fs::remove_file(socket_path)?;
    }
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let listener = UnixListener::bind(socket_path)?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

/// Parse one trimmed command line. Returns `Err(reason)` for anything the
/// grammar doesn't recognise or that's missing a required argument; the
/// caller turns that into a plain `err` response.
pub fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim_end_matches(['\r', '\n']);
    let mut parts = line.split_whitespace();
    let verb = parts.next().ok_or("empty command")?;

    match verb {
        "ping" => Ok(Command::Ping),
        "set-brightness" => {
            let n: i64 = parts
                .next()
                .ok_or("missing brightness value")?
                .parse()
                .map_err(|_| "brightness is not a number".to_string())?;
            Ok(Command::SetBrightness(n))
        }
        "set-small-window" => {
            let mode: u8 = parts
                .next()
                .ok_or("missing mode")?
                .parse()
                .map_err(|_| "mode is not a number".to_string())?;
            let cpu: u8 = parts
                .next()
                .ok_or("missing cpu")?
                .parse()
                .map_err(|_| "cpu is not a number".to_string())?;
            let mem: u8 = parts
                .next()
                .ok_or("missing mem")?
                .parse()
                .map_err(|_| "mem is not a number".to_string())?;
            let time = parts.next().ok_or("missing time")?.to_string();
            let gpu: u8 = parts
                .next()
                .ok_or("missing gpu")?
                .parse()
                .map_err(|_| "gpu is not a number".to_string())?;
            Ok(Command::SetSmallWindow {
                mode,
                cpu,
                mem,
                time,
                gpu,
            })
        }
        "set-label-style" => {
            let path = parts.next().ok_or("missing path")?;
            Ok(Command::SetLabelStyle(PathBuf::from(path)))
        }
        "set-buttons" => {
            let path = parts.next().ok_or("missing path")?;
            Ok(Command::SetButtons(PathBuf::from(path)))
        }
        "set-buttons-explicit" => {
            Ok(Command::SetButtonsExplicit(parse_explicit_icons(parts, 1..=13)?))
        }
        "set-buttons-explicit-14" => {
            Ok(Command::SetButtonsExplicit14(parse_explicit_icons(parts, 1..=14)?))
        }
        "set-partial-explicit" => {
            Ok(Command::SetPartialExplicit(parse_explicit_icons(parts, 1..=13)?))
        }
        "read-buttons" => Ok(Command::ReadButtons),
        other => Err(format!("unknown command: {other}")),
    }
}

fn parse_explicit_icons<'a>(
    parts: impl Iterator<Item = &'a str>,
    valid_range: std::ops::RangeInclusive<u32>,
) -> Result<Vec<ExplicitIcon>, String> {
    let mut paths: BTreeMap<u32, PathBuf> = BTreeMap::new();
    let mut labels: BTreeMap<u32, String> = BTreeMap::new();

    for part in parts {
        if let Some(rest) = part.strip_prefix("--button-") {
            let (idx_str, path) = rest.split_once('=').ok_or("malformed --button-N argument")?;
            let idx: u32 = idx_str.parse().map_err(|_| "bad button index".to_string())?;
            if valid_range.contains(&idx) {
                paths.insert(idx, PathBuf::from(path));
            }
        } else if let Some(rest) = part.strip_prefix("--label-") {
            let (idx_str, text) = rest.split_once('=').ok_or("malformed --label-N argument")?;
            let idx: u32 = idx_str.parse().map_err(|_| "bad label index".to_string())?;
            labels.insert(idx, text.to_string());
        }
        // Unrecognised flags are silently ignored, matching the tolerant
        // client-input handling in §7 of the ambient error-handling design.
    }

    let icons = paths
        .into_iter()
        .map(|(idx, path)| ExplicitIcon {
            index: idx,
            path,
            label: labels.get(&idx).cloned(),
        })
        .collect();
    Ok(icons)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ping() {
        assert_eq!(parse_command("ping\n"), Ok(Command::Ping));
    }

    #[test]
    fn parses_set_brightness() {
        assert_eq!(parse_command("set-brightness 42"), Ok(Command::SetBrightness(42)));
    }

    #[test]
    fn rejects_non_numeric_brightness() {
        assert!(parse_command("set-brightness abc").is_err());
    }

    #[test]
    fn parses_set_small_window() {
        let cmd = parse_command("set-small-window 0 12 34 10:20:30 56").unwrap();
        assert_eq!(
            cmd,
            Command::SetSmallWindow {
                mode: 0,
                cpu: 12,
                mem: 34,
                time: "10:20:30".to_string(),
                gpu: 56,
            }
        );
    }

    #[test]
    fn parses_explicit_buttons_with_labels() {
        let cmd = parse_command(
            "set-buttons-explicit --button-1=/tmp/a.png --label-1=Hi --button-2=/tmp/b.png",
        )
        .unwrap();
        let Command::SetButtonsExplicit(icons) = cmd else {
            panic!("wrong variant");
        };
        assert_eq!(icons.len(), 2);
        assert_eq!(icons[0].index, 1);
        assert_eq!(icons[0].label.as_deref(), Some("Hi"));
        assert_eq!(icons[1].label, None);
    }

    #[test]
    fn explicit_buttons_out_of_range_are_dropped() {
        let cmd = parse_command("set-buttons-explicit --button-14=/tmp/a.png").unwrap();
        let Command::SetButtonsExplicit(icons) = cmd else {
            panic!("wrong variant");
        };
        assert!(icons.is_empty());
    }

    #[test]
    fn explicit_14_accepts_index_14() {
        let cmd = parse_command("set-buttons-explicit-14 --button-14=/tmp/status.png").unwrap();
        let Command::SetButtonsExplicit14(icons) = cmd else {
            panic!("wrong variant");
        };
        assert_eq!(icons.len(), 1);
        assert_eq!(icons[0].index, 14);
    }

    #[test]
    fn parses_read_buttons() {
        assert_eq!(parse_command("read-buttons"), Ok(Command::ReadButtons));
    }

    #[test]
    fn unknown_verb_is_an_error() {
        assert!(parse_command("frobnicate").is_err());
    }

    #[test]
    fn empty_line_is_an_error() {
        assert!(parse_command("").is_err());
    }
}
