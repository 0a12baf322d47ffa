//! DMX frame composition.
//!
//! A frame is built from scratch on every emitter tick from the latest
//! [`FrameInputs`] the session task has published. Composition is pure and
//! allocation-free.

use rdmx_core::types::{DMX_FRAME_LEN, DMX_SLOTS, DMX_START_CODE, DmxFrame, OutputChannel};

/// Everything the periodic emitter needs to build a frame.
///
/// Published by the session task over a `watch` channel whenever any of
/// these values change; the emitter only ever reads a consistent snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameInputs {
    pub global_level: u8,
    pub broadcast: bool,
    pub channels: Vec<OutputChannel>,
    pub start_address: u16,
}

impl Default for FrameInputs {
    fn default() -> Self {
        FrameInputs {
            global_level: 0,
            broadcast: false,
            channels: Vec::new(),
            start_address: 1,
        }
    }
}

impl FrameInputs {
    pub fn compose(&self) -> DmxFrame {
        compose(
            self.global_level,
            self.broadcast,
            &self.channels,
            self.start_address,
        )
    }
}

/// Build a DMX frame.
///
/// With `broadcast` set, every slot starts at `global_level`. Each channel
/// then writes slot `start_address + index - 1`, keeping the higher of the
/// existing value and its own level (highest-takes-precedence). Channels
/// landing outside slots 1..=512 are ignored.
///
/// # Example
///
/// ```
/// use rdmx_core::OutputChannel;
/// use rdmx_session::frame::compose;
///
/// let frame = compose(100, true, &[OutputChannel::new(3, 200)], 10);
/// assert_eq!(frame[0], 0);
/// assert_eq!(frame[12], 200);
/// assert_eq!(frame[13], 100);
/// ```
pub fn compose(
    global_level: u8,
    broadcast: bool,
    channels: &[OutputChannel],
    start_address: u16,
) -> DmxFrame {
    let mut frame = [0u8; DMX_FRAME_LEN];
    frame[0] = DMX_START_CODE;
    if broadcast {
        frame[1..].fill(global_level);
    }
    for channel in channels {
        let slot = i32::from(start_address) + i32::from(channel.index) - 1;
        if (1..=DMX_SLOTS as i32).contains(&slot) {
            let slot = slot as usize;
            frame[slot] = frame[slot].max(channel.level);
        }
    }
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ch(index: u16, level: u8) -> OutputChannel {
        OutputChannel::new(index, level)
    }

    #[test]
    fn empty_frame_is_zero() {
        let frame = compose(255, false, &[], 1);
        assert!(frame.iter().all(|&b| b == 0));
    }

    #[test]
    fn broadcast_fills_all_slots() {
        let frame = compose(100, true, &[], 1);
        assert_eq!(frame[0], 0);
        assert!(frame[1..].iter().all(|&b| b == 100));
    }

    #[test]
    fn override_merges_highest_takes_precedence() {
        let frame = compose(100, true, &[ch(3, 200)], 10);
        assert_eq!(frame[12], 200);
        assert_eq!(frame[11], 100);
        assert_eq!(frame[13], 100);
    }

    #[test]
    fn lower_override_does_not_dim_broadcast() {
        let frame = compose(100, true, &[ch(1, 20)], 1);
        assert_eq!(frame[1], 100);
    }

    #[test]
    fn channel_without_broadcast() {
        let frame = compose(0, false, &[ch(1, 7), ch(2, 8)], 1);
        assert_eq!(&frame[0..4], &[0, 7, 8, 0]);
    }

    #[test]
    fn out_of_range_slots_ignored() {
        // start 510 + index 4 - 1 = 513, past the last slot.
        let frame = compose(0, false, &[ch(3, 9), ch(4, 9)], 510);
        assert_eq!(frame[512], 9);
        assert_eq!(frame.len(), 513);

        // start 0 + index 1 - 1 = slot 0, the start code.
        let frame = compose(0, false, &[ch(1, 9)], 0);
        assert_eq!(frame[0], 0);
    }

    #[test]
    fn inputs_compose_matches_free_function() {
        let inputs = FrameInputs {
            global_level: 5,
            broadcast: true,
            channels: vec![ch(1, 50)],
            start_address: 2,
        };
        assert_eq!(inputs.compose(), compose(5, true, &[ch(1, 50)], 2));
    }
}
