/* Button Event Decoder (C9) and Event State Machine (C10).
 *
 * Raw HID frames become `(button, pressed|released)` transitions here;
 * transitions become the TAP/HOLD/LONGHOLD/RELEASED lines the subscriber
 * sees. Button 13 — the double-wide status tile — gets special handling at
 * both layers: the decoder turns its "double 0x01" traffic into ordinary
 * transitions, and the state machine never applies hold timing to it. */

use std::time::{Duration, Instant};

use crate::frame::{inbound, FRAME_HEADER};

pub const NUM_BUTTONS: usize = 14;
pub const STATUS_BUTTON_INDEX: u32 = 13;

pub const TAP_THRESHOLD: Duration = Duration::from_millis(20);
pub const HOLD_THRESHOLD: Duration = Duration::from_millis(750);
pub const LONGHOLD_THRESHOLD: Duration = Duration::from_secs(5);

/* ------------------------------------------------------------------ */
/* Decoder (C9)                                                         */
/* ------------------------------------------------------------------ */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Pressed,
    Released,
}

/// What one inbound frame produced: a button transition, a small-window
/// mode update (only ever set for frames about button 13), or both.
#[derive(Debug, Default, Clone, Copy)]
pub struct DecodedFrame {
    pub transition: Option<(u32, Transition)>,
    pub mode_update: Option<u8>,
}

/// Parses raw button-event frames. Owns the latch state needed to turn
/// button 13's alternating "down-like" reports into ordinary
/// pressed/released transitions — see the Open Question in the design
/// notes: the device is not documented to always alternate cleanly, so an
/// unmatched transition is simply dropped rather than asserted on.
#[derive(Default)]
pub struct Decoder {
    status_logically_down: bool,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one inbound HID frame. Returns `None` for anything that
    /// isn't a recognised button-event frame (wrong header or command id).
    pub fn decode(&mut self, frame: &[u8]) -> Option<DecodedFrame> {
        if frame.len() < 12 {
            return None;
        }
        if frame[0..2] != FRAME_HEADER {
            return None;
        }
        let command_id = u16::from_be_bytes([frame[2], frame[3]]);
        if command_id != inbound::BUTTON_EVENT_1 && command_id != inbound::BUTTON_EVENT_2 {
            return None;
        }

        let sub_state = frame[8];
        let index = frame[9] as u32;
        let raw_down = frame[11] == 0x01;

        if index >= NUM_BUTTONS as u32 {
            return None;
        }

        let mode_update = (index == STATUS_BUTTON_INDEX && sub_state <= 2).then_some(sub_state);

        let transition = if index == STATUS_BUTTON_INDEX {
            self.decode_status_tile(raw_down).map(|t| (index, t))
        } else {
            Some((index, if raw_down { Transition::Pressed } else { Transition::Released }))
        };

        Some(DecodedFrame {
            transition,
            mode_update,
        })
    }

    fn decode_status_tile(&mut self, raw_down: bool) -> Option<Transition> {
        if !raw_down {
            // Only 0x01 reports carry an edge for the status tile; anything
            // else produces no edge per §4.9.
            return None;
        }
        if self.status_logically_down {
            self.status_logically_down = false;
            Some(Transition::Released)
        } else {
            self.status_logically_down = true;
            Some(Transition::Pressed)
        }
    }
}

/* ------------------------------------------------------------------ */
/* State machine (C10)                                                  */
/* ------------------------------------------------------------------ */

#[derive(Debug, Default, Clone, Copy)]
struct ButtonState {
    down_since: Option<Instant>,
    hold_emitted: bool,
    longhold_emitted: bool,
}

/// Tracks per-button press timers and renders the line-based event stream.
pub struct EventStateMachine {
    states: [ButtonState; NUM_BUTTONS],
}

impl Default for EventStateMachine {
    fn default() -> Self {
        Self {
            states: [ButtonState::default(); NUM_BUTTONS],
        }
    }
}

impl EventStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all button state — called on reconnect.
    pub fn reset(&mut self) {
        self.states = [ButtonState::default(); NUM_BUTTONS];
    }

    /// Apply a decoded transition, returning the event lines it produces
    /// (already newline-terminated, ready to write to the subscriber).
    pub fn apply(&mut self, index: u32, transition: Transition, now: Instant) -> Vec<String> {
        match transition {
            Transition::Pressed => self.on_pressed(index, now),
            Transition::Released => self.on_released(index, now),
        }
    }

    fn on_pressed(&mut self, index: u32, now: Instant) -> Vec<String> {
        let st = &mut self.states[index as usize];
        if st.down_since.is_some() {
            return Vec::new();
        }
        st.down_since = Some(now);
        st.hold_emitted = false;
        st.longhold_emitted = false;

        if index == STATUS_BUTTON_INDEX {
            vec![format!("button {} TAP\n", index + 1)]
        } else {
            Vec::new()
        }
    }

    fn on_released(&mut self, index: u32, now: Instant) -> Vec<String> {
        let st = &mut self.states[index as usize];
        let Some(down_since) = st.down_since else {
            return Vec::new();
        };
        let held = now.duration_since(down_since);
        self.states[index as usize] = ButtonState::default();

        if index == STATUS_BUTTON_INDEX {
            return vec![format!("button {} RELEASED\n", index + 1)];
        }

        if held < HOLD_THRESHOLD {
            vec![
                format!("button {} TAP\n", index + 1),
                format!("button {} RELEASED\n", index + 1),
            ]
        } else {
            vec![format!("button {} RELEASED\n", index + 1)]
        }
    }

    /// Idle tick: emit HOLD/LONGHOLD for buttons still held down. Runs on
    /// every HID read timeout so a held button is observed even while no
    /// new frames arrive.
    pub fn tick(&mut self, now: Instant) -> Vec<String> {
        let mut out = Vec::new();
        for i in 0..NUM_BUTTONS as u32 {
            if i == STATUS_BUTTON_INDEX {
                // The status tile is a toggle, not a hold gesture.
                continue;
            }
            let st = &mut self.states[i as usize];
            let Some(down_since) = st.down_since else {
                continue;
            };
            let held = now.duration_since(down_since);

            if held >= HOLD_THRESHOLD && !st.hold_emitted {
                out.push(format!("button {} HOLD ({:.2}s)\n", i + 1, held.as_secs_f64()));
                st.hold_emitted = true;
            } else if st.hold_emitted && held >= LONGHOLD_THRESHOLD && !st.longhold_emitted {
                out.push(format!(
                    "button {} LONGHOLD ({:.2}s)\n",
                    i + 1,
                    held.as_secs_f64()
                ));
                st.longhold_emitted = true;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_for(command_id: u16, sub_state: u8, index: u8, raw: u8) -> Vec<u8> {
        let mut f = vec![0u8; 12];
        f[0] = 0x7C;
        f[1] = 0x7C;
        f[2..4].copy_from_slice(&command_id.to_be_bytes());
        f[8] = sub_state;
        f[9] = index;
        f[11] = raw;
        f
    }

    #[test]
    fn decoder_ignores_frames_with_wrong_header() {
        let mut d = Decoder::new();
        let mut f = frame_for(inbound::BUTTON_EVENT_1, 0, 2, 1);
        f[0] = 0x00;
        assert!(d.decode(&f).is_none());
    }

    #[test]
    fn decoder_ignores_unrelated_command_ids() {
        let mut d = Decoder::new();
        let f = frame_for(0x0303, 0, 2, 1);
        assert!(d.decode(&f).is_none());
    }

    #[test]
    fn decoder_reports_press_and_release_for_normal_button() {
        let mut d = Decoder::new();
        let press = d.decode(&frame_for(inbound::BUTTON_EVENT_1, 0, 2, 1)).unwrap();
        assert_eq!(press.transition, Some((2, Transition::Pressed)));

        let release = d.decode(&frame_for(inbound::BUTTON_EVENT_1, 0, 2, 0)).unwrap();
        assert_eq!(release.transition, Some((2, Transition::Released)));
    }

    #[test]
    fn decoder_alternates_status_tile_on_repeated_ones() {
        let mut d = Decoder::new();
        let a = d.decode(&frame_for(inbound::BUTTON_EVENT_1, 0, 13, 1)).unwrap();
        assert_eq!(a.transition, Some((13, Transition::Pressed)));
        let b = d.decode(&frame_for(inbound::BUTTON_EVENT_1, 0, 13, 1)).unwrap();
        assert_eq!(b.transition, Some((13, Transition::Released)));
        let c = d.decode(&frame_for(inbound::BUTTON_EVENT_1, 0, 13, 1)).unwrap();
        assert_eq!(c.transition, Some((13, Transition::Pressed)));
    }

    #[test]
    fn decoder_extracts_small_window_mode_from_status_tile() {
        let mut d = Decoder::new();
        let f = d.decode(&frame_for(inbound::BUTTON_EVENT_1, 1, 13, 1)).unwrap();
        assert_eq!(f.mode_update, Some(1));
    }

    #[test]
    fn decoder_ignores_out_of_range_button_index() {
        let mut d = Decoder::new();
        assert!(d.decode(&frame_for(inbound::BUTTON_EVENT_1, 0, 14, 1)).is_none());
    }

    #[test]
    fn short_tap_emits_tap_then_released() {
        let mut sm = EventStateMachine::new();
        let t0 = Instant::now();
        assert!(sm.apply(2, Transition::Pressed, t0).is_empty());
        let lines = sm.apply(2, Transition::Released, t0 + Duration::from_millis(30));
        assert_eq!(lines, vec!["button 3 TAP\n", "button 3 RELEASED\n"]);
    }

    #[test]
    fn hold_then_release_never_emits_tap() {
        let mut sm = EventStateMachine::new();
        let t0 = Instant::now();
        sm.apply(6, Transition::Pressed, t0);

        let tick_lines = sm.tick(t0 + HOLD_THRESHOLD);
        assert_eq!(tick_lines.len(), 1);
        assert!(tick_lines[0].starts_with("button 7 HOLD"));

        let released = sm.apply(6, Transition::Released, t0 + Duration::from_millis(900));
        assert_eq!(released, vec!["button 7 RELEASED\n"]);
    }

    #[test]
    fn longhold_emits_once_after_hold() {
        let mut sm = EventStateMachine::new();
        let t0 = Instant::now();
        sm.apply(0, Transition::Pressed, t0);
        let hold = sm.tick(t0 + HOLD_THRESHOLD);
        assert_eq!(hold.len(), 1);
        assert!(hold[0].contains("HOLD"));

        let longhold = sm.tick(t0 + LONGHOLD_THRESHOLD);
        assert_eq!(longhold.len(), 1);
        assert!(longhold[0].contains("LONGHOLD"));

        // A further tick produces nothing new; both flags are already set.
        assert!(sm.tick(t0 + LONGHOLD_THRESHOLD + Duration::from_secs(1)).is_empty());

        let released = sm.apply(0, Transition::Released, t0 + LONGHOLD_THRESHOLD + Duration::from_secs(2));
        assert_eq!(released, vec!["button 1 RELEASED\n"]);
    }

    #[test]
    fn status_tile_press_emits_tap_immediately_and_release_emits_released_only() {
        let mut sm = EventStateMachine::new();
        let t0 = Instant::now();
        let pressed = sm.apply(STATUS_BUTTON_INDEX, Transition::Pressed, t0);
        assert_eq!(pressed, vec!["button 14 TAP\n"]);

        // No HOLD/LONGHOLD ever for the status tile, regardless of tick.
        assert!(sm.tick(t0 + LONGHOLD_THRESHOLD * 2).is_empty());

        let released = sm.apply(
            STATUS_BUTTON_INDEX,
            Transition::Released,
            t0 + Duration::from_secs(10),
        );
        assert_eq!(released, vec!["button 14 RELEASED\n"]);
    }

    #[test]
    fn releasing_a_button_that_was_never_pressed_is_a_no_op() {
        let mut sm = EventStateMachine::new();
        assert!(sm.apply(5, Transition::Released, Instant::now()).is_empty());
    }

    #[test]
    fn reset_clears_in_progress_presses() {
        let mut sm = EventStateMachine::new();
        let t0 = Instant::now();
        sm.apply(3, Transition::Pressed, t0);
        sm.reset();
        // After reset, a release with no matching press is a no-op.
        assert!(sm.apply(3, Transition::Released, t0 + Duration::from_millis(5)).is_empty());
    }
}
