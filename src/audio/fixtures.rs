//! Test audio builders

#![allow(clippy::unwrap_used, clippy::cast_possible_truncation)]

use std::path::Path;

/// Write interleaved 16-bit samples as a single-frame FLAC stream
///
/// Every channel is stored as a VERBATIM subframe, so no prediction or rice
/// coding is involved. The block holds all frames, which must be 16..=65535.
pub fn write_flac(path: &Path, sample_rate: u32, channels: u16, interleaved: &[i16]) {
    let channel_count = usize::from(channels);
    let frames = interleaved.len() / channel_count;
    assert!((16..=65535).contains(&frames), "unsupported block size {frames}");
    assert!(sample_rate <= 65535, "sample rate must fit the 16-bit header field");
    let block = u16::try_from(frames).unwrap();
    let rate = u16::try_from(sample_rate).unwrap();

    let mut out = b"fLaC".to_vec();

    // STREAMINFO, marked as the last metadata block
    out.extend_from_slice(&[0x80, 0x00, 0x00, 34]);
    out.extend_from_slice(&block.to_be_bytes());
    out.extend_from_slice(&block.to_be_bytes());
    out.extend_from_slice(&[0; 6]);
    let packed = (u64::from(sample_rate) << 44)
        | (u64::from(channels - 1) << 41)
        | (15_u64 << 36)
        | frames as u64;
    out.extend_from_slice(&packed.to_be_bytes());
    out.extend_from_slice(&[0; 16]);

    // Fixed blocking; 16-bit block size and 16-bit Hz rate follow the frame number
    let mut frame = vec![
        0xFF,
        0xF8,
        0x7D,
        (u8::try_from(channels - 1).unwrap() << 4) | (0x4 << 1),
        0x00,
    ];
    frame.extend_from_slice(&(block - 1).to_be_bytes());
    frame.extend_from_slice(&rate.to_be_bytes());
    frame.push(crc8(&frame));

    for channel in 0..channel_count {
        frame.push(0x02);
        for sample in interleaved.iter().skip(channel).step_by(channel_count) {
            frame.extend_from_slice(&sample.to_be_bytes());
        }
    }
    let footer = crc16(&frame);
    frame.extend_from_slice(&footer.to_be_bytes());

    out.extend_from_slice(&frame);
    std::fs::write(path, out).unwrap();
}

/// Stereo-safe ramp that stays small and non-negative
pub fn ramp(frames: usize, channels: u16) -> Vec<i16> {
    (0..frames * usize::from(channels))
        .map(|i| i16::try_from(i % 1000).unwrap())
        .collect()
}

fn crc8(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0_u8, |mut crc, &byte| {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 == 0 { crc << 1 } else { (crc << 1) ^ 0x07 };
        }
        crc
    })
}

fn crc16(bytes: &[u8]) -> u16 {
    bytes.iter().fold(0_u16, |mut crc, &byte| {
        crc ^= u16::from(byte) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 == 0 { crc << 1 } else { (crc << 1) ^ 0x8005 };
        }
        crc
    })
}

#[test]
fn test_crc_check_values() {
    assert_eq!(crc8(b"123456789"), 0xF4);
    assert_eq!(crc16(b"123456789"), 0xFEE8);
}
