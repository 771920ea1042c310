//! Reserved tag bytes of the binary node format.

pub const LIST_EMPTY: u8 = 0;
pub const STREAM_END: u8 = 2;
pub const DICTIONARY_0: u8 = 236;
pub const DICTIONARY_1: u8 = 237;
pub const DICTIONARY_2: u8 = 238;
pub const DICTIONARY_3: u8 = 239;
pub const AD_JID: u8 = 247;
pub const LIST_8: u8 = 248;
pub const LIST_16: u8 = 249;
pub const JID_PAIR: u8 = 250;
pub const HEX_8: u8 = 251;
pub const BINARY_8: u8 = 252;
pub const BINARY_20: u8 = 253;
pub const BINARY_32: u8 = 254;
pub const NIBBLE_8: u8 = 255;

/// Strings whose byte length reaches this bound are never nibble packed.
pub const PACKED_MAX: usize = 128;
/// Upper bound (exclusive) of the 20-bit length class.
pub const BINARY_20_MAX: usize = 1 << 20;

/// Tag of the double-byte dictionary with the given number.
pub fn dictionary_tag(dictionary: usize) -> u8 {
    DICTIONARY_0 + dictionary as u8
}

/// Dictionary number selected by `tag`, if it is a dictionary selector.
pub fn dictionary_of(tag: u8) -> Option<usize> {
    (DICTIONARY_0..=DICTIONARY_3)
        .contains(&tag)
        .then(|| (tag - DICTIONARY_0) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dictionary_selectors() {
        assert_eq!(dictionary_of(236), Some(0));
        assert_eq!(dictionary_of(239), Some(3));
        assert_eq!(dictionary_of(240), None);
        assert_eq!(dictionary_of(235), None);
        assert_eq!(dictionary_tag(2), DICTIONARY_2);
    }
}
