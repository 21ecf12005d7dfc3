//! Wire format for the meter device.
//!
//! The receiving hardware parses two CR-terminated ASCII fields per update:
//! `C<cpu>\r` then `M<mem>\r`, values 0-100 with no leading zeros. The
//! format is fixed; the device sees either well-formed frames or silence.

use crate::monitor::Sample;

/// Encode a sample into the exact byte sequence the meter expects.
///
/// Deterministic and total: every valid sample has an encoding and there is
/// no failure mode.
pub fn encode(sample: Sample) -> Vec<u8> {
    format!("C{}\rM{}\r", sample.cpu_percent, sample.mem_percent).into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_tagged_cr_terminated_fields() {
        let frame = encode(Sample {
            cpu_percent: 42,
            mem_percent: 7,
        });
        assert_eq!(frame, b"C42\rM7\r");
    }

    #[test]
    fn encodes_bounds_without_padding() {
        assert_eq!(
            encode(Sample {
                cpu_percent: 0,
                mem_percent: 100,
            }),
            b"C0\rM100\r"
        );
    }

    #[test]
    fn no_trailing_newline() {
        let frame = encode(Sample {
            cpu_percent: 50,
            mem_percent: 60,
        });
        assert_eq!(frame.last(), Some(&b'\r'));
        assert!(!frame.contains(&b'\n'));
    }
}
