//! Command vocabulary carried in the frame's command byte.
//!
//! The set is open: any byte is a valid command on the wire. Nodes relay
//! every command they do not originate, and only apply those they have a
//! handler for.

use serde::{Deserialize, Serialize};

/// The control token. No arguments.
pub const TOKEN: u8 = b'T';

/// A movement event. Arguments: origin signature, then one byte per pressed
/// direction key.
pub const MOVE: u8 = b'M';

/// Known commands, with everything else carried through as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Token,
    Move,
    Other(u8),
}

impl From<u8> for Command {
    fn from(code: u8) -> Self {
        match code {
            TOKEN => Command::Token,
            MOVE => Command::Move,
            other => Command::Other(other),
        }
    }
}

impl From<Command> for u8 {
    fn from(c: Command) -> u8 {
        match c {
            Command::Token => TOKEN,
            Command::Move => MOVE,
            Command::Other(code) => code,
        }
    }
}

// ── Movement ──────────────────────────────────────────────────────────────────

/// A direction key in a MOVE payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Left,
    Down,
    Right,
}

impl Direction {
    /// Payload order. Encoders emit keys in this order.
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Left,
        Direction::Down,
        Direction::Right,
    ];

    pub fn key(self) -> u8 {
        match self {
            Direction::Up => b'w',
            Direction::Left => b'a',
            Direction::Down => b's',
            Direction::Right => b'd',
        }
    }

    pub fn from_key(key: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.key() == key)
    }
}

/// Build a MOVE payload (without signature). Each direction appears at most
/// once no matter how often it is listed.
pub fn encode_directions(pressed: &[Direction]) -> Vec<u8> {
    Direction::ALL
        .into_iter()
        .filter(|d| pressed.contains(d))
        .map(Direction::key)
        .collect()
}

/// A position in the shared world. Screen axes: y grows downward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vector {
    pub x: i64,
    pub y: i64,
}

impl Vector {
    pub const ORIGIN: Vector = Vector { x: 0, y: 0 };

    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    pub fn offset(self, delta: Vector) -> Self {
        Self {
            x: self.x + delta.x,
            y: self.y + delta.y,
        }
    }
}

/// Net displacement described by a MOVE payload.
///
/// Presence matters, not count: repeated keys move once, and opposite keys
/// cancel. Unknown bytes are ignored.
pub fn move_delta(payload: &[u8]) -> Vector {
    let pressed = |d: Direction| i64::from(payload.contains(&d.key()));
    Vector {
        x: pressed(Direction::Right) - pressed(Direction::Left),
        y: pressed(Direction::Down) - pressed(Direction::Up),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_codes_round_trip() {
        for code in [TOKEN, MOVE, b'X', 0x00, 0xff] {
            assert_eq!(u8::from(Command::from(code)), code);
        }
        assert_eq!(Command::from(TOKEN), Command::Token);
        assert_eq!(Command::from(MOVE), Command::Move);
        assert_eq!(Command::from(b'?'), Command::Other(b'?'));
    }

    #[test]
    fn single_keys() {
        assert_eq!(move_delta(b"w"), Vector::new(0, -1));
        assert_eq!(move_delta(b"s"), Vector::new(0, 1));
        assert_eq!(move_delta(b"a"), Vector::new(-1, 0));
        assert_eq!(move_delta(b"d"), Vector::new(1, 0));
    }

    #[test]
    fn duplicates_count_once() {
        assert_eq!(move_delta(b"dddd"), Vector::new(1, 0));
    }

    #[test]
    fn opposite_keys_cancel() {
        assert_eq!(move_delta(b"ad"), Vector::new(0, 0));
        assert_eq!(move_delta(b"wasd"), Vector::ORIGIN);
        assert_eq!(move_delta(b"adw"), Vector::new(0, -1));
    }

    #[test]
    fn unknown_bytes_ignored() {
        assert_eq!(move_delta(b"xyz"), Vector::ORIGIN);
        assert_eq!(move_delta(b""), Vector::ORIGIN);
    }

    #[test]
    fn encode_directions_dedups_in_key_order() {
        let payload = encode_directions(&[Direction::Right, Direction::Up, Direction::Right]);
        assert_eq!(payload, b"wd");
        assert_eq!(Direction::from_key(b's'), Some(Direction::Down));
        assert_eq!(Direction::from_key(b'q'), None);
    }
}
