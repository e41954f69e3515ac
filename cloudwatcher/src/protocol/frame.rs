//! Response frame codec.
//!
//! Every normal command is answered with a sequence of fixed-size blocks:
//!
//! ```text
//! +----------------+----------------+-----+-------------------------------+
//! |  data frame 1  |  data frame 2  | ... |        handshake frame        |
//! +----------------+----------------+-----+-------------------------------+
//! |    15 bytes    |    15 bytes    |     | 0x21 0x11 + 12 x 0x20 + 0x30  |
//! +----------------+----------------+-----+-------------------------------+
//! ```
//!
//! Data frames start with a short ASCII tag (`!K`, `!E1`, `!hh`, ...) followed
//! by a space-padded ASCII payload.

use {
    crate::{
        error::{Error, Result},
        link::read_up_to,
    },
    log::trace,
    std::io::Read,
};

/// Size of every response block.
pub const FRAME_LEN: usize = 15;

/// Frame terminating every normal response.
pub const HANDSHAKE: [u8; FRAME_LEN] = *b"\x21\x11            \x30";

/// One 15-byte response block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame([u8; FRAME_LEN]);

impl Frame {
    /// Wrap raw frame bytes.
    pub const fn new(bytes: [u8; FRAME_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw frame bytes.
    pub fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.0
    }

    /// Whether this is the handshake sentinel.
    pub fn is_handshake(&self) -> bool {
        self.0 == HANDSHAKE
    }

    /// Whether the frame starts with `prefix`.
    pub fn has_prefix(&self, prefix: &[u8]) -> bool {
        self.0.starts_with(prefix)
    }
}

/// Read `count` data frames followed by the handshake frame.
///
/// A block shorter than [`FRAME_LEN`] (the link timed out) is reported as
/// [`Error::ShortRead`]; a bad terminating block as [`Error::Framing`].
pub fn read_frames<R: Read + ?Sized>(link: &mut R, count: usize) -> Result<Vec<Frame>> {
    let mut frames = Vec::with_capacity(count);
    for _ in 0..count {
        frames.push(read_frame(link)?);
    }

    let handshake = read_frame(link)?;
    if !handshake.is_handshake() {
        return Err(Error::Framing {
            actual: handshake.0.to_vec(),
        });
    }

    Ok(frames)
}

fn read_frame<R: Read + ?Sized>(link: &mut R) -> Result<Frame> {
    let mut buf = [0u8; FRAME_LEN];
    let n = read_up_to(link, &mut buf)?;
    if n < FRAME_LEN {
        return Err(Error::ShortRead {
            expected: FRAME_LEN,
            actual: n,
        });
    }
    trace!("Frame: {:?}", String::from_utf8_lossy(&buf));
    Ok(Frame(buf))
}

/// Payload bytes after `prefix`, untouched.
pub fn extract_bytes<'a>(frame: &'a Frame, prefix: &[u8]) -> Result<&'a [u8]> {
    if !frame.has_prefix(prefix) {
        let actual = &frame.0[..prefix.len().min(FRAME_LEN)];
        return Err(Error::PrefixMismatch {
            expected: String::from_utf8_lossy(prefix).into_owned(),
            actual: String::from_utf8_lossy(actual).into_owned(),
        });
    }
    Ok(&frame.0[prefix.len()..])
}

/// Payload after `prefix`, decoded as trimmed ASCII text.
pub fn extract_string(frame: &Frame, prefix: &[u8]) -> Result<String> {
    let payload = extract_bytes(frame, prefix)?;
    if !payload.is_ascii() {
        return Err(Error::MalformedPayload {
            tag: String::from_utf8_lossy(prefix).into_owned(),
            payload: payload.to_vec(),
        });
    }
    Ok(String::from_utf8_lossy(payload).trim().to_string())
}

/// Payload after `prefix`, parsed as a decimal integer.
pub fn extract_int(frame: &Frame, prefix: &[u8]) -> Result<i64> {
    let text = extract_string(frame, prefix)?;
    text.parse()
        .map_err(|_| Error::MalformedInteger(text))
}

#[cfg(test)]
mod tests {
    use {super::*, crate::link::mock::ScriptedLink};

    fn frame(text: &[u8]) -> [u8; FRAME_LEN] {
        let mut buf = [b' '; FRAME_LEN];
        buf[..text.len()].copy_from_slice(text);
        buf
    }

    #[test]
    fn test_handshake_constant() {
        assert_eq!(HANDSHAKE[0], 0x21);
        assert_eq!(HANDSHAKE[1], 0x11);
        assert!(HANDSHAKE[2..14].iter().all(|b| *b == 0x20));
        assert_eq!(HANDSHAKE[14], 0x30);
    }

    #[test]
    fn test_read_frames_excludes_handshake() {
        let mut link = ScriptedLink::new();
        link.push_bytes(&frame(b"!E1 3"));
        link.push_bytes(&frame(b"!E2 0"));
        link.push_bytes(&HANDSHAKE);

        let frames = read_frames(&mut link, 2).unwrap();
        assert_eq!(frames.len(), 2);
        assert!(frames[0].has_prefix(b"!E1"));
        assert!(frames[1].has_prefix(b"!E2"));
        assert!(frames.iter().all(|f| !f.is_handshake()));
    }

    #[test]
    fn test_read_zero_frames() {
        let mut link = ScriptedLink::new();
        link.push_bytes(&HANDSHAKE);
        assert!(read_frames(&mut link, 0).unwrap().is_empty());
    }

    #[test]
    fn test_read_frames_from_one_burst() {
        let mut burst = frame(b"!N CloudWatcher").to_vec();
        burst.extend_from_slice(&HANDSHAKE);

        let mut link = ScriptedLink::new();
        link.push_bytes(&burst);

        let frames = read_frames(&mut link, 1).unwrap();
        assert_eq!(extract_string(&frames[0], b"!N").unwrap(), "CloudWatcher");
    }

    #[test]
    fn test_any_handshake_corruption_is_framing_fault() {
        for index in 0..FRAME_LEN {
            let mut bad = HANDSHAKE;
            bad[index] ^= 0x01;

            let mut link = ScriptedLink::new();
            link.push_bytes(&frame(b"!V 5.88"));
            link.push_bytes(&bad);

            let err = read_frames(&mut link, 1).unwrap_err();
            assert!(
                matches!(err, Error::Framing { ref actual } if actual == &bad),
                "byte {index}: {err:?}"
            );
        }
    }

    #[test]
    fn test_timeout_is_short_read() {
        let mut link = ScriptedLink::new();
        link.push_bytes(b"!K12");
        link.push_timeout();

        let err = read_frames(&mut link, 1).unwrap_err();
        assert!(matches!(
            err,
            Error::ShortRead {
                expected: FRAME_LEN,
                actual: 4
            }
        ));
    }

    #[test]
    fn test_zero_byte_read_is_not_an_empty_frame() {
        let mut link = ScriptedLink::new();
        let err = read_frames(&mut link, 0).unwrap_err();
        assert!(matches!(err, Error::ShortRead { actual: 0, .. }));
        assert!(err.is_transient());
    }

    #[test]
    fn test_extract_string_trims() {
        let f = Frame::new(frame(b"!K123456"));
        assert_eq!(extract_string(&f, b"!K").unwrap(), "123456");
    }

    #[test]
    fn test_non_ascii_payload_is_not_a_prefix_mismatch() {
        let mut raw = frame(b"!R 12");
        raw[4] = 0xFF;
        let f = Frame::new(raw);

        let err = extract_string(&f, b"!R").unwrap_err();
        assert!(matches!(
            err,
            Error::MalformedPayload { ref tag, ref payload } if tag == "!R" && payload[2] == 0xFF
        ));
        assert!(matches!(
            extract_int(&f, b"!R").unwrap_err(),
            Error::MalformedPayload { .. }
        ));
    }

    #[test]
    fn test_extract_prefix_mismatch() {
        let f = Frame::new(frame(b"!YSwitch Close"));
        let err = extract_string(&f, b"!X").unwrap_err();
        assert!(matches!(
            err,
            Error::PrefixMismatch { ref expected, ref actual } if expected == "!X" && actual == "!Y"
        ));
    }

    #[test]
    fn test_extract_int() {
        let f = Frame::new(frame(b"!1  -1523"));
        assert_eq!(extract_int(&f, b"!1").unwrap(), -1523);

        let f = Frame::new(frame(b"!R 2870"));
        assert_eq!(extract_int(&f, b"!R").unwrap(), 2870);
    }

    #[test]
    fn test_extract_int_malformed() {
        let f = Frame::new(frame(b"!R 28x0"));
        let err = extract_int(&f, b"!R").unwrap_err();
        assert!(matches!(err, Error::MalformedInteger(ref text) if text == "28x0"));

        let f = Frame::new(frame(b"!R"));
        assert!(matches!(
            extract_int(&f, b"!R").unwrap_err(),
            Error::MalformedInteger(_)
        ));
    }

    #[test]
    fn test_extract_bytes_keeps_binary_payload() {
        let mut raw = frame(b"!M");
        raw[2] = 0x00;
        raw[3] = 0x01;
        raw[4] = 0xFF;
        let f = Frame::new(raw);

        let payload = extract_bytes(&f, b"!M").unwrap();
        assert_eq!(payload.len(), FRAME_LEN - 2);
        assert_eq!(&payload[..3], &[0x00, 0x01, 0xFF]);
    }
}
