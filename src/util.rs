use std::borrow::Cow;

/// Four byte IFF chunk / usage identifier, e.g. `*b"ZCOD"`
pub type ChunkId = [u8; 4];

/// Reads a big-endian (MSB first) 16 bit value, as used by IFF containers
pub fn read_be_u16(bytes: &[u8]) -> u16 {
    ((bytes[0] as u16) << 8) | (bytes[1] as u16)
}

/// Reads a big-endian (MSB first) 32 bit value, as used by IFF containers
pub fn read_be_u32(bytes: &[u8]) -> u32 {
    ((bytes[0] as u32) << 24)
        | ((bytes[1] as u32) << 16)
        | ((bytes[2] as u32) << 8)
        | (bytes[3] as u32)
}

fn ldexp(mantissa: u32, exponent: i32) -> f64 {
    if mantissa == 0 {
        return 0.0;
    }
    mantissa as f64 * 2f64.powi(exponent)
}

/// Decodes an 80 bit IEEE 754 extended float (AIFF sample rates).
///
/// Infinity and NaN both come back as -1.0 (sign applied afterwards). Callers
/// only need a usable sample rate, so the approximation is kept.
pub fn read_extended(bytes: &[u8; 10]) -> f64 {
    let mut expon = (((bytes[0] & 0x7F) as i32) << 8) | (bytes[1] as i32);
    let hi_mant = read_be_u32(&bytes[2..6]);
    let lo_mant = read_be_u32(&bytes[6..10]);

    let f = if expon == 0 && hi_mant == 0 && lo_mant == 0 {
        0.0
    } else if expon == 0x7FFF {
        -1.0
    } else {
        expon -= 16383;
        ldexp(hi_mant, expon - 31) + ldexp(lo_mant, expon - 63)
    };

    if bytes[0] & 0x80 != 0 {
        -f
    } else {
        f
    }
}

/// Payload length rounded up to the IFF two byte alignment
pub fn padded_len(length: u32) -> u64 {
    length as u64 + (length as u64 & 1)
}

/// Printable form of a chunk id for logs and error messages
pub fn id_str(id: &ChunkId) -> Cow<'_, str> {
    String::from_utf8_lossy(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn big_endian_reads() {
        let bytes = [0x12, 0x34, 0x56, 0x78];
        assert_eq!(read_be_u16(&bytes), 0x1234);
        assert_eq!(read_be_u32(&bytes), 0x1234_5678);
    }

    #[test]
    fn extended_sample_rates() {
        let rate = [0x40, 0x0E, 0xAC, 0x44, 0, 0, 0, 0, 0, 0];
        assert_eq!(read_extended(&rate), 44100.0);

        let rate = [0x40, 0x0B, 0xFA, 0x00, 0, 0, 0, 0, 0, 0];
        assert_eq!(read_extended(&rate), 8000.0);

        let negative = [0xC0, 0x0E, 0xAC, 0x44, 0, 0, 0, 0, 0, 0];
        assert_eq!(read_extended(&negative), -44100.0);
    }

    #[test]
    fn extended_special_values() {
        assert_eq!(read_extended(&[0; 10]), 0.0);

        // Infinity and NaN share the sentinel
        let inf = [0x7F, 0xFF, 0x80, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(read_extended(&inf), -1.0);
        let nan = [0x7F, 0xFF, 0xC0, 0, 0, 0, 0, 0, 0, 1];
        assert_eq!(read_extended(&nan), -1.0);
    }

    #[test]
    fn padding() {
        assert_eq!(padded_len(0), 0);
        assert_eq!(padded_len(7), 8);
        assert_eq!(padded_len(8), 8);
    }
}
