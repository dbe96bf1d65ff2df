//! Framer (C4): tracks bit position within a minute, detects
//! start-of-minute, and classifies overflow/late markers (spec §4.4).

use crate::types::Marker;

/// Bit positions that are formatting-only second boundaries (space before
/// a new field starts), per spec §4.4. Used by displays, not decoding.
const SPACE_BITS: [u8; 9] = [1, 9, 17, 25, 30, 36, 39, 45, 52];

pub struct Framer {
    bitpos: u8,
    too_long: bool,
}

impl Framer {
    pub fn new() -> Self {
        Self {
            bitpos: 0,
            too_long: false,
        }
    }

    pub fn bitpos(&self) -> u8 {
        self.bitpos
    }

    pub fn is_too_long(&self) -> bool {
        self.too_long
    }

    pub fn is_space_bit(bitpos: u8) -> bool {
        SPACE_BITS.contains(&bitpos)
    }

    /// Advance `bitpos` by one, except after a `skip` record or a `dec_bp`
    /// roll-back. Returns the marker classification for this step.
    pub fn next_bit(&mut self, skip: bool) -> Marker {
        if skip {
            return Marker::None;
        }
        self.bitpos += 1;
        if self.bitpos as usize == crate::types::BIT_BUFFER_LEN {
            self.bitpos = 0;
            self.too_long = true;
            return Marker::TooLong;
        }
        if self.too_long {
            // The buffer fits again: clear the too-long condition.
            self.too_long = false;
        }
        Marker::None
    }

    /// One symbol's worth of look-ahead requested the framer step back one
    /// bit position (the log reader's `dec_bp`, spec §4.7).
    pub fn dec_bp(&mut self) {
        if self.bitpos > 0 {
            self.bitpos -= 1;
        }
    }

    /// A begin-of-minute marker arrived: reset to bitpos 1 and clear any
    /// too-long condition. If overflow had already been reported for this
    /// minute, the marker is `Late` rather than `Minute`, but the caller
    /// should treat `Late` as `Minute` for downstream processing (spec
    /// §4.4: "a `late` becomes `minute` for the purpose of downstream
    /// processing").
    pub fn handle_minute_marker(&mut self) -> Marker {
        let was_too_long = self.too_long;
        self.bitpos = 1;
        self.too_long = false;
        if was_too_long {
            Marker::Late
        } else {
            Marker::Minute
        }
    }
}

impl Default for Framer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_bit_advances_normally() {
        let mut f = Framer::new();
        assert_eq!(f.next_bit(false), Marker::None);
        assert_eq!(f.bitpos(), 1);
    }

    #[test]
    fn next_bit_skip_does_not_advance() {
        let mut f = Framer::new();
        assert_eq!(f.next_bit(true), Marker::None);
        assert_eq!(f.bitpos(), 0);
    }

    #[test]
    fn overflow_reports_too_long_and_resets() {
        let mut f = Framer::new();
        for _ in 0..60 {
            f.next_bit(false);
        }
        assert_eq!(f.bitpos(), 60);
        assert_eq!(f.next_bit(false), Marker::TooLong);
        assert_eq!(f.bitpos(), 0);
        assert!(f.is_too_long());
    }

    #[test]
    fn minute_marker_after_overflow_is_late() {
        let mut f = Framer::new();
        for _ in 0..61 {
            f.next_bit(false);
        }
        assert!(f.is_too_long());
        assert_eq!(f.handle_minute_marker(), Marker::Late);
        assert_eq!(f.bitpos(), 1);
        assert!(!f.is_too_long());
    }

    #[test]
    fn minute_marker_without_overflow_is_minute() {
        let mut f = Framer::new();
        assert_eq!(f.handle_minute_marker(), Marker::Minute);
        assert_eq!(f.bitpos(), 1);
    }

    #[test]
    fn dec_bp_steps_back_one() {
        let mut f = Framer::new();
        f.next_bit(false);
        f.next_bit(false);
        assert_eq!(f.bitpos(), 2);
        f.dec_bp();
        assert_eq!(f.bitpos(), 1);
    }

    #[test]
    fn is_space_bit_matches_formatting_positions() {
        assert!(Framer::is_space_bit(1));
        assert!(Framer::is_space_bit(52));
        assert!(!Framer::is_space_bit(2));
        assert!(!Framer::is_space_bit(60));
    }
}
