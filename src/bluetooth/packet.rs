/// Accelerometer notification packet decoding
use crate::models::AccelPacket;

/// Size of a conforming accelerometer packet
pub const PACKET_LEN: usize = 8;

/// Decode an accelerometer notification payload
///
/// The payload is four little-endian signed 16-bit integers:
/// - Bytes 0-1: Packet counter
/// - Bytes 2-3: Acceleration X (milli-g)
/// - Bytes 4-5: Acceleration Y (milli-g)
/// - Bytes 6-7: Acceleration Z (milli-g)
///
/// Any other length is rejected with a printable diagnostic: the payload as
/// text if it is valid UTF-8 (firmware debug strings), otherwise the raw bytes.
pub fn decode_accel_packet(data: &[u8]) -> Result<AccelPacket, String> {
    let bytes: &[u8; PACKET_LEN] = match data.try_into() {
        Ok(bytes) => bytes,
        Err(_) => return Err(describe_packet(data)),
    };

    Ok(AccelPacket {
        counter: i16::from_le_bytes([bytes[0], bytes[1]]),
        x_mg: i16::from_le_bytes([bytes[2], bytes[3]]),
        y_mg: i16::from_le_bytes([bytes[4], bytes[5]]),
        z_mg: i16::from_le_bytes([bytes[6], bytes[7]]),
    })
}

fn describe_packet(data: &[u8]) -> String {
    match std::str::from_utf8(data) {
        Ok(text) => format!("Non-8B packet: {} as text: {}", data.len(), text.trim()),
        Err(_) => format!("Non-8B packet: {} raw: {:?}", data.len(), data),
    }
}
