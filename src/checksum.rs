//! Internet checksum (RFC 1071) used by the IPv4 header and UDP.
//!
//! The checksum is the one's complement of the one's complement sum of all
//! 16-bit big-endian words in the input. A trailing odd byte is padded with
//! a zero byte on the right.

/// IP protocol number for UDP.
pub const PROTOCOL_UDP: u8 = 17;

/// Sums 16-bit words and folds carries back into the low 16 bits.
///
/// Returns the folded sum before complementing.
fn fold_sum(data: &[u8], initial: u32) -> u16 {
    let mut sum = initial;

    let mut chunks = data.chunks_exact(2);
    for chunk in &mut chunks {
        sum += u16::from_be_bytes([chunk[0], chunk[1]]) as u32;
    }

    if let Some(&byte) = chunks.remainder().first() {
        sum += (byte as u32) << 8;
    }

    while (sum >> 16) != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    sum as u16
}

fn pseudo_header_sum(src_ip: &[u8; 4], dst_ip: &[u8; 4], protocol: u8, length: u16) -> u32 {
    let mut sum = 0u32;
    sum += u16::from_be_bytes([src_ip[0], src_ip[1]]) as u32;
    sum += u16::from_be_bytes([src_ip[2], src_ip[3]]) as u32;
    sum += u16::from_be_bytes([dst_ip[0], dst_ip[1]]) as u32;
    sum += u16::from_be_bytes([dst_ip[2], dst_ip[3]]) as u32;
    sum += protocol as u32;
    sum += length as u32;
    sum
}

/// Calculates the Internet checksum of `data`.
///
/// The checksum field inside `data`, if any, must be zeroed by the caller.
///
/// # Examples
///
/// ```
/// use rawlease::checksum::internet_checksum;
///
/// let header = [0x45, 0x00, 0x00, 0x1c];
/// assert_eq!(internet_checksum(&header), !0x451cu16);
/// ```
pub fn internet_checksum(data: &[u8]) -> u16 {
    !fold_sum(data, 0)
}

/// Calculates a UDP/TCP checksum including the IPv4 pseudo-header.
///
/// The pseudo-header is source address, destination address, a zero byte,
/// the protocol number and the segment length. `segment` is the whole
/// transport header plus payload with its checksum field zeroed.
pub fn transport_checksum(src_ip: &[u8; 4], dst_ip: &[u8; 4], protocol: u8, segment: &[u8]) -> u16 {
    let initial = pseudo_header_sum(src_ip, dst_ip, protocol, segment.len() as u16);
    !fold_sum(segment, initial)
}

/// Returns true if `data`, which already contains its checksum, verifies.
///
/// A buffer verifies when its folded sum is `0xFFFF`, i.e. its checksum
/// over the stored value is zero.
pub fn verify_checksum(data: &[u8]) -> bool {
    fold_sum(data, 0) == 0xFFFF
}

/// Pseudo-header variant of [`verify_checksum`] for a received segment.
pub fn verify_transport_checksum(
    src_ip: &[u8; 4],
    dst_ip: &[u8; 4],
    protocol: u8,
    segment: &[u8],
) -> bool {
    let initial = pseudo_header_sum(src_ip, dst_ip, protocol, segment.len() as u16);
    fold_sum(segment, initial) == 0xFFFF
}
