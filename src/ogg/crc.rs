// Ogg page checksum
//
// CRC-32 with polynomial 0x04c11db7, no reflection, initial value 0 and no
// final xor. This is not the zlib/IEEE variant, so crc32fast cannot be used.

const POLYNOMIAL: u32 = 0x04c1_1db7;

/// 256-entry lookup table, built at compile time
pub static CRC_TABLE: [u32; 256] = build_table();

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut r = (i as u32) << 24;
        let mut bit = 0;
        while bit < 8 {
            r = if r & 0x8000_0000 != 0 {
                (r << 1) ^ POLYNOMIAL
            } else {
                r << 1
            };
            bit += 1;
        }
        table[i] = r;
        i += 1;
    }
    table
}

/// Continue a running checksum over more bytes
pub fn update(mut crc: u32, data: &[u8]) -> u32 {
    for &byte in data {
        crc = (crc << 8) ^ CRC_TABLE[((crc >> 24) as u8 ^ byte) as usize];
    }
    crc
}

/// Checksum of a byte slice
pub fn checksum(data: &[u8]) -> u32 {
    update(0, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        assert_eq!(checksum(&[]), 0);
    }

    #[test]
    fn test_check_value() {
        // CRC-32/POSIX check value 0x765e7680 without its final xor
        assert_eq!(checksum(b"123456789"), 0x89a1_897f);
    }

    #[test]
    fn test_table_entries() {
        assert_eq!(CRC_TABLE[0], 0);
        assert_eq!(CRC_TABLE[1], POLYNOMIAL);
        assert_eq!(CRC_TABLE[255], 0xb1f7_40b4);
    }

    #[test]
    fn test_incremental_matches_one_shot() {
        let data = b"OggS incremental checksum";
        let (head, tail) = data.split_at(9);
        assert_eq!(update(update(0, head), tail), checksum(data));
    }

    #[test]
    fn test_single_bit_flip_changes_checksum() {
        let mut data = vec![0x5au8; 300];
        let original = checksum(&data);
        data[150] ^= 0x01;
        assert_ne!(checksum(&data), original);
    }
}
