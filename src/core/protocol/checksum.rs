//! CRC-16/Modbus as used by RTU framing

/// CRC-16/Modbus
/// Polynomial: 0x8005 (reflected 0xA001), Init: 0xFFFF, RefIn: true, RefOut: true
pub fn crc16_modbus(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;

    for &byte in data {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }

    crc
}

/// Append the CRC of `frame` to it, low byte first
pub fn append_crc(frame: &mut Vec<u8>) {
    let crc = crc16_modbus(frame);
    frame.extend_from_slice(&crc.to_le_bytes());
}

/// Check the trailing two CRC bytes of a complete RTU frame
pub fn crc_matches(frame: &[u8]) -> bool {
    if frame.len() < 3 {
        return false;
    }
    let (body, tail) = frame.split_at(frame.len() - 2);
    u16::from_le_bytes([tail[0], tail[1]]) == crc16_modbus(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16_modbus() {
        // Test vector: "123456789" should give 0x4B37
        let data = b"123456789";
        assert_eq!(crc16_modbus(data), 0x4B37);
    }

    #[test]
    fn test_append_and_verify() {
        // Read 1 holding register at 0 from slave 1: 01 03 00 00 00 01 84 0A
        let mut frame = vec![0x01, 0x03, 0x00, 0x00, 0x00, 0x01];
        append_crc(&mut frame);
        assert_eq!(&frame[6..], &[0x84, 0x0A]);
        assert!(crc_matches(&frame));

        frame[3] ^= 0x01;
        assert!(!crc_matches(&frame));
    }

    #[test]
    fn test_short_frame_never_matches() {
        assert!(!crc_matches(&[0x01, 0x02]));
    }
}
