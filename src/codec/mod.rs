//! Packed BCD codec for IMSI identifiers.
//!
//! Each byte carries two digits: the low nibble is the first digit of the
//! pair, the high nibble the second. An odd-length IMSI is padded with a
//! `0xF` filler nibble in the final high nibble.

use thiserror::Error;

/// Filler nibble marking "no digit".
pub const FILLER: u8 = 0x0F;

/// Shortest valid IMSI.
pub const IMSI_MIN_DIGITS: usize = 12;

/// Longest valid IMSI.
pub const IMSI_MAX_DIGITS: usize = 15;

/// Codec errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("IMSI too long: {0} digits (max {})", IMSI_MAX_DIGITS)]
    TooLong(usize),

    #[error("IMSI contains non-digit character {0:?}")]
    NonDigit(char),
}

/// Encode an IMSI into packed BCD.
pub fn encode(imsi: &str) -> Result<Vec<u8>, CodecError> {
    if imsi.len() > IMSI_MAX_DIGITS {
        return Err(CodecError::TooLong(imsi.len()));
    }

    let mut nibbles = Vec::with_capacity(imsi.len() + 1);
    for ch in imsi.chars() {
        let digit = ch.to_digit(10).ok_or(CodecError::NonDigit(ch))?;
        nibbles.push(digit as u8);
    }
    if nibbles.len() % 2 != 0 {
        nibbles.push(FILLER);
    }

    Ok(nibbles
        .chunks_exact(2)
        .map(|pair| (pair[1] << 4) | pair[0])
        .collect())
}

/// Decode packed BCD into an IMSI string.
///
/// Never fails. Filler nibbles are skipped; nibbles `0xA..=0xE` produce a
/// non-digit character, so malformed input yields a malformed identifier
/// that [`is_valid_imsi`] rejects.
pub fn decode(bytes: &[u8]) -> String {
    let mut imsi = String::with_capacity(bytes.len() * 2);

    for byte in bytes {
        for nibble in [byte & 0x0F, (byte >> 4) & 0x0F] {
            if nibble != FILLER {
                imsi.push(char::from(b'0' + nibble));
            }
        }
    }

    imsi
}

/// Check that `imsi` is 12 to 15 ASCII digits.
pub fn is_valid_imsi(imsi: &str) -> bool {
    (IMSI_MIN_DIGITS..=IMSI_MAX_DIGITS).contains(&imsi.len())
        && imsi.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_odd_length_round_trip() {
        let imsi = "123456789012345";
        let bcd = encode(imsi).unwrap();

        assert_eq!(bcd.len(), 8);
        assert_eq!(bcd[7], 0xF5);
        assert_eq!(decode(&bcd), imsi);
    }

    #[test]
    fn test_even_length_round_trip() {
        let imsi = "12345678901234";
        let bcd = encode(imsi).unwrap();

        assert_eq!(bcd.len(), 7);
        assert_eq!(bcd[0], 0x21);
        assert_eq!(decode(&bcd), imsi);
    }

    #[test]
    fn test_round_trip_all_valid_lengths() {
        let digits = "250991234567890";
        for len in IMSI_MIN_DIGITS..=IMSI_MAX_DIGITS {
            let imsi = &digits[..len];
            assert_eq!(decode(&encode(imsi).unwrap()), imsi, "length {}", len);
        }
    }

    #[test]
    fn test_encode_too_long() {
        let result = encode("1234567890123456");
        assert_eq!(result, Err(CodecError::TooLong(16)));
    }

    #[test]
    fn test_encode_non_digit() {
        assert_eq!(encode("25099abc"), Err(CodecError::NonDigit('a')));
    }

    #[test]
    fn test_decode_malformed_nibbles() {
        // 0xA in the low nibble is not a digit
        let imsi = decode(&[0x1A, 0x32]);
        assert_eq!(imsi.len(), 4);
        assert!(!is_valid_imsi(&imsi));
    }

    #[test]
    fn test_decode_empty() {
        assert_eq!(decode(&[]), "");
    }

    #[test]
    fn test_is_valid_imsi() {
        assert!(is_valid_imsi("250991234567"));
        assert!(is_valid_imsi("250991234567890"));
        assert!(!is_valid_imsi("25099123456"));
        assert!(!is_valid_imsi("2509912345678901"));
        assert!(!is_valid_imsi("25099123456x"));
    }
}
