//! Input and output event types.
//!
//! Input events carry an absolute sample timestamp (the learner needs real
//! elapsed time between notes). Output events carry a frame offset within
//! the block being rendered, like any host MIDI buffer. Raw bytes only
//! appear at the edges: host input is parsed with [`InputEvent::from_bytes`]
//! and generated events are encoded with [`MidiEvent::to_bytes`].

use midi_msg::{Channel, ChannelVoiceMsg, ControlChange, MidiMsg};
use serde::{Deserialize, Serialize};

/// Controller number of the "All Notes Off" channel-mode message.
pub const ALL_NOTES_OFF_CC: u8 = 123;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    NoteOn,
    NoteOff,
    ControlChange,
}

/// One live input event, timestamped in absolute samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputEvent {
    pub kind: EventKind,
    /// 0-15.
    pub channel: u8,
    /// Note number or controller number.
    pub key: u8,
    /// Velocity or controller value.
    pub value: u8,
    pub timestamp: u64,
}

impl InputEvent {
    #[inline]
    pub fn note_on(timestamp: u64, channel: u8, note: u8, velocity: u8) -> Self {
        Self {
            kind: EventKind::NoteOn,
            channel,
            key: note,
            value: velocity,
            timestamp,
        }
    }

    #[inline]
    pub fn note_off(timestamp: u64, channel: u8, note: u8) -> Self {
        Self {
            kind: EventKind::NoteOff,
            channel,
            key: note,
            value: 0,
            timestamp,
        }
    }

    #[inline]
    pub fn control_change(timestamp: u64, channel: u8, controller: u8, value: u8) -> Self {
        Self {
            kind: EventKind::ControlChange,
            channel,
            key: controller,
            value,
            timestamp,
        }
    }

    /// Convert a block event into an input event at `block_start + offset`.
    ///
    /// A note-on with zero velocity becomes a note-off.
    pub fn from_midi(event: &MidiEvent, block_start: u64) -> Self {
        let timestamp = block_start + event.frame_offset as u64;
        match event.message {
            Message::NoteOn { note, velocity: 0 } | Message::NoteOff { note } => {
                Self::note_off(timestamp, event.channel, note)
            }
            Message::NoteOn { note, velocity } => Self::note_on(timestamp, event.channel, note, velocity),
            Message::Controller { controller, value } => {
                Self::control_change(timestamp, event.channel, controller, value)
            }
        }
    }

    /// Parse one raw host message.
    ///
    /// Returns `Ok(None)` for well-formed messages the learner has no use
    /// for (pitch bend, aftertouch, system messages).
    pub fn from_bytes(bytes: &[u8], timestamp: u64) -> crate::Result<Option<Self>> {
        let (msg, _len) = MidiMsg::from_midi(bytes)?;
        let MidiMsg::ChannelVoice { channel, msg } = msg else {
            return Ok(None);
        };
        let channel = channel as u8;
        let event = match msg {
            ChannelVoiceMsg::NoteOn { note, velocity: 0 } | ChannelVoiceMsg::NoteOff { note, .. } => {
                Some(Self::note_off(timestamp, channel, note))
            }
            ChannelVoiceMsg::NoteOn { note, velocity } => {
                Some(Self::note_on(timestamp, channel, note, velocity))
            }
            // named controllers are decoded into 14-bit values; the raw
            // status/number/value bytes are what the learner wants
            ChannelVoiceMsg::ControlChange { .. } if bytes.len() >= 3 => {
                Some(Self::control_change(timestamp, channel, bytes[1], bytes[2]))
            }
            _ => None,
        };
        Ok(event)
    }

    /// `channel_filter` 0 accepts every channel; 1-16 accepts one.
    #[inline]
    pub fn matches_channel(&self, channel_filter: u8) -> bool {
        channel_filter == 0 || self.channel + 1 == channel_filter
    }
}

/// What a generated event does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Message {
    NoteOn { note: u8, velocity: u8 },
    NoteOff { note: u8 },
    Controller { controller: u8, value: u8 },
}

/// Generated event at a sample offset inside the current block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MidiEvent {
    /// Offset within the current block (0 = first sample).
    pub frame_offset: usize,
    /// 0-15.
    pub channel: u8,
    pub message: Message,
}

impl MidiEvent {
    #[inline]
    pub fn note_on(frame_offset: usize, channel: u8, note: u8, velocity: u8) -> Self {
        Self {
            frame_offset,
            channel,
            message: Message::NoteOn { note, velocity },
        }
    }

    #[inline]
    pub fn note_off(frame_offset: usize, channel: u8, note: u8) -> Self {
        Self {
            frame_offset,
            channel,
            message: Message::NoteOff { note },
        }
    }

    #[inline]
    pub fn control_change(frame_offset: usize, channel: u8, controller: u8, value: u8) -> Self {
        Self {
            frame_offset,
            channel,
            message: Message::Controller { controller, value },
        }
    }

    #[inline]
    pub fn all_notes_off(frame_offset: usize, channel: u8) -> Self {
        Self::control_change(frame_offset, channel, ALL_NOTES_OFF_CC, 0)
    }

    #[inline]
    pub fn is_note_on(&self) -> bool {
        matches!(self.message, Message::NoteOn { velocity, .. } if velocity > 0)
    }

    /// Note number of a note-on or note-off.
    #[inline]
    pub fn note(&self) -> Option<u8> {
        match self.message {
            Message::NoteOn { note, .. } | Message::NoteOff { note } => Some(note),
            Message::Controller { .. } => None,
        }
    }

    /// Encode as a channel voice message.
    pub fn to_bytes(&self) -> Vec<u8> {
        let msg = match self.message {
            Message::NoteOn { note, velocity } => ChannelVoiceMsg::NoteOn { note, velocity },
            Message::NoteOff { note } => ChannelVoiceMsg::NoteOff { note, velocity: 0 },
            Message::Controller { controller, value } => ChannelVoiceMsg::ControlChange {
                control: ControlChange::CC {
                    control: controller,
                    value,
                },
            },
        };
        MidiMsg::ChannelVoice {
            channel: Channel::from_u8(self.channel),
            msg,
        }
        .to_midi()
    }
}
