//! Firmware image and per-half transfer cursors.
//!
//! The image is sent as two interleaved halves. Each half is preceded by one
//! "virtual" length byte; together the two length bytes carry the low-half
//! length as a big-endian 16-bit word:
//!
//! ```text
//!   low half:  [len >> 8 ] [ image[0 .. len]     ]
//!   high half: [len & 0xFF] [ image[len .. total] ]
//! ```
//!
//! with `len = total / 2`. For odd images the high half is one byte longer.

use {
    crate::error::{Error, Result},
    byteorder::{BigEndian, ByteOrder},
    std::{fs, path::Path},
};

/// Largest image whose low-half length fits the 16-bit length word.
pub const MAX_FIRMWARE_LEN: usize = 2 * (u16::MAX as usize) + 1;

/// One of the two partitions of the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Half {
    /// First `len / 2` bytes, requested with token `'0'`.
    Low,
    /// Remaining bytes, requested with token `'1'`.
    High,
}

/// Immutable firmware image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareImage {
    data: Vec<u8>,
    length_word: [u8; 2],
}

impl FirmwareImage {
    /// Wrap image bytes, rejecting images the transfer cannot describe.
    pub fn new(data: Vec<u8>) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::InvalidFirmware("image is empty".into()));
        }
        if data.len() > MAX_FIRMWARE_LEN {
            return Err(Error::InvalidFirmware(format!(
                "image is {} bytes, at most {MAX_FIRMWARE_LEN} supported",
                data.len()
            )));
        }

        let low_len = u16::try_from(data.len() / 2).map_err(|_| {
            Error::InvalidFirmware(format!("half length of {} bytes overflows", data.len()))
        })?;
        let mut length_word = [0u8; 2];
        BigEndian::write_u16(&mut length_word, low_len);

        Ok(Self { data, length_word })
    }

    /// Load an image file (`.has`).
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(fs::read(path)?)
    }

    /// Total length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always false; empty images are rejected on construction.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Raw image bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Payload of one half.
    pub fn half(&self, half: Half) -> &[u8] {
        let split = self.data.len() / 2;
        match half {
            Half::Low => &self.data[..split],
            Half::High => &self.data[split..],
        }
    }

    /// Length byte sent before the payload of one half.
    pub fn length_prefix(&self, half: Half) -> u8 {
        match half {
            Half::Low => self.length_word[0],
            Half::High => self.length_word[1],
        }
    }
}

/// Progress through one half.
///
/// The position starts at [`TransferCursor::BEFORE_PREFIX`] and ends at the
/// half's length once the length byte and every payload byte have been sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferCursor {
    position: i64,
    len: usize,
}

impl TransferCursor {
    /// Position before the length byte has been sent.
    pub const BEFORE_PREFIX: i64 = -1;

    /// Cursor for a half of `len` payload bytes.
    pub fn new(len: usize) -> Self {
        Self {
            position: Self::BEFORE_PREFIX,
            len,
        }
    }

    /// Current position.
    pub fn position(&self) -> i64 {
        self.position
    }

    /// Payload length of the half.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the half has no payload (the length byte is still sent).
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the length byte and all payload bytes have been sent.
    pub fn is_complete(&self) -> bool {
        usize::try_from(self.position).is_ok_and(|p| p == self.len)
    }

    /// Byte to send next, or `None` once complete.
    pub fn next_byte(&self, prefix: u8, payload: &[u8]) -> Option<u8> {
        match usize::try_from(self.position) {
            Err(_) => Some(prefix),
            Ok(offset) if offset < self.len => payload.get(offset).copied(),
            Ok(_) => None,
        }
    }

    /// Move past the byte just sent.
    pub fn advance(&mut self) {
        if !self.is_complete() {
            self.position += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_even() {
        let image = FirmwareImage::new((0..10).collect()).unwrap();
        assert_eq!(image.half(Half::Low), &[0, 1, 2, 3, 4]);
        assert_eq!(image.half(Half::High), &[5, 6, 7, 8, 9]);
    }

    #[test]
    fn test_split_lengths_for_any_size() {
        for len in [1usize, 2, 3, 7, 100, 1001, 4096, 65535] {
            let image = FirmwareImage::new(vec![0xA5; len]).unwrap();
            let low = image.half(Half::Low).len();
            let high = image.half(Half::High).len();
            assert_eq!(low, len / 2, "len {len}");
            assert_eq!(high, len - len / 2, "len {len}");
        }
    }

    #[test]
    fn test_length_prefix_is_big_endian_low_half_length() {
        let image = FirmwareImage::new(vec![0; 2 * 0x1234 + 1]).unwrap();
        assert_eq!(image.length_prefix(Half::Low), 0x12);
        assert_eq!(image.length_prefix(Half::High), 0x34);
    }

    #[test]
    fn test_rejects_empty_and_oversized() {
        assert!(matches!(
            FirmwareImage::new(Vec::new()),
            Err(Error::InvalidFirmware(_))
        ));
        assert!(matches!(
            FirmwareImage::new(vec![0; MAX_FIRMWARE_LEN + 1]),
            Err(Error::InvalidFirmware(_))
        ));
        assert!(FirmwareImage::new(vec![0; MAX_FIRMWARE_LEN]).is_ok());
    }

    #[test]
    fn test_cursor_sequence() {
        let payload = [0x10, 0x20];
        let mut cursor = TransferCursor::new(payload.len());
        assert_eq!(cursor.position(), -1);

        let mut sent = Vec::new();
        while let Some(byte) = cursor.next_byte(0xFF, &payload) {
            sent.push(byte);
            cursor.advance();
        }

        assert_eq!(sent, vec![0xFF, 0x10, 0x20]);
        assert!(cursor.is_complete());
        assert_eq!(cursor.position(), 2);
    }

    #[test]
    fn test_empty_half_completes_after_prefix() {
        let mut cursor = TransferCursor::new(0);
        assert!(!cursor.is_complete());
        assert_eq!(cursor.next_byte(7, &[]), Some(7));
        cursor.advance();
        assert!(cursor.is_complete());
        assert_eq!(cursor.next_byte(7, &[]), None);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("firmware.has");
        fs::write(&path, [1u8, 2, 3]).unwrap();

        let image = FirmwareImage::from_file(&path).unwrap();
        assert_eq!(image.len(), 3);
        assert_eq!(image.as_bytes(), &[1, 2, 3]);

        assert!(matches!(
            FirmwareImage::from_file(dir.path().join("missing.has")),
            Err(Error::Io(_))
        ));
    }
}
