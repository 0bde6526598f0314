//! eISCP framing (Onkyo/Pioneer/Integra)
//!
//! Frame layout:
//! - 4 bytes: magic `ISCP`
//! - 4 bytes: header size, big endian (always 16 when sending)
//! - 4 bytes: data size, big endian
//! - 1 byte: version (1)
//! - reserved bytes up to the header size
//! - body: `!<model category><3-char code><params>` ended by EOF/CR/LF

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::CodecError;

pub const MAGIC: &[u8; 4] = b"ISCP";
pub const HEADER_SIZE: u32 = 16;
pub const VERSION: u8 = 1;
/// Larger size fields are treated as garbage rather than waited for.
pub const MAX_HEADER_SIZE: u32 = 64;
pub const MAX_DATA_SIZE: u32 = 1024 * 1024;
/// Frames shorter than this are never sent.
pub const MIN_FRAME_SIZE: usize = 22;
pub const START_CHAR: u8 = b'!';
pub const EOF: u8 = 0x1A;
pub const CR: u8 = 0x0D;
pub const LF: u8 = 0x0A;
/// Model category used for every outgoing command.
pub const DEFAULT_CATEGORY: char = '1';
/// Parameter of a status request.
pub const QUERY: &str = "QSTN";

/// One undecoded ISCP message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IscpFrame {
    pub category: char,
    pub code: String,
    pub params: String,
}

impl IscpFrame {
    pub fn new(code: &str, params: impl Into<String>) -> Self {
        Self {
            category: DEFAULT_CATEGORY,
            code: code.to_string(),
            params: params.into(),
        }
    }

    pub fn query(code: &str) -> Self {
        Self::new(code, QUERY)
    }

    pub fn encode(&self) -> Option<Bytes> {
        encode(self.category, &self.code, &self.params)
    }
}

/// Result of one extraction attempt.
pub type Extracted = Option<Result<IscpFrame, CodecError>>;

/// Tries to cut one frame from the front of `buf`.
///
/// Returns the frame (or a framing error for a malformed frame) together with the number of
/// bytes the caller must drop. `(None, n)` means more data is needed; `n` then covers only
/// garbage in front of the next magic.
pub fn try_extract_frame(buf: &[u8]) -> (Extracted, usize) {
    let Some(start) = find_magic(buf) else {
        // Keep a possible partial magic at the tail
        return (None, buf.len().saturating_sub(MAGIC.len() - 1));
    };

    let avail = &buf[start..];
    if avail.len() < HEADER_SIZE as usize {
        return (None, start);
    }

    let header_size = u32::from_be_bytes([avail[4], avail[5], avail[6], avail[7]]);
    let data_size = u32::from_be_bytes([avail[8], avail[9], avail[10], avail[11]]);
    if header_size < 13 {
        // Cannot locate a body; skip this magic and resync on the next one
        return (
            Some(Err(CodecError::InvalidHeaderSize(header_size))),
            start + MAGIC.len(),
        );
    }

    if header_size > MAX_HEADER_SIZE || data_size > MAX_DATA_SIZE {
        return (
            Some(Err(CodecError::FrameTooLarge {
                header: header_size,
                data: data_size,
            })),
            start + MAGIC.len(),
        );
    }

    let total = header_size as usize + data_size as usize;
    if avail.len() < total {
        return (None, start);
    }

    let body = &avail[header_size as usize..total];
    (Some(parse_body(body)), start + total)
}

fn find_magic(buf: &[u8]) -> Option<usize> {
    buf.windows(MAGIC.len()).position(|w| w == MAGIC)
}

fn parse_body(body: &[u8]) -> Result<IscpFrame, CodecError> {
    let mut end = body.len();
    while end > 0 && matches!(body[end - 1], EOF | CR | LF) {
        end -= 1;
    }
    let body = &body[..end];

    if body.first() != Some(&START_CHAR) {
        return Err(CodecError::MissingStartChar(
            String::from_utf8_lossy(body).into_owned(),
        ));
    }
    if body.len() < 5 {
        return Err(CodecError::BodyTooShort(body.len()));
    }

    Ok(IscpFrame {
        category: body[1] as char,
        code: String::from_utf8_lossy(&body[2..5]).into_owned(),
        params: String::from_utf8_lossy(&body[5..]).into_owned(),
    })
}

/// Builds a complete frame; returns `None` if the frame would be shorter than
/// [`MIN_FRAME_SIZE`].
pub fn encode(category: char, code: &str, params: &str) -> Option<Bytes> {
    let mut cat = [0u8; 4];
    let cat = category.encode_utf8(&mut cat).as_bytes();
    // start char + category + code + params + terminator
    let data_size = 1 + cat.len() + code.len() + params.len() + 1;
    let total = HEADER_SIZE as usize + data_size;
    if total < MIN_FRAME_SIZE {
        return None;
    }

    let mut frame = BytesMut::with_capacity(total);
    frame.put_slice(MAGIC);
    frame.put_u32(HEADER_SIZE);
    frame.put_u32(data_size as u32);
    frame.put_u8(VERSION);
    frame.put_bytes(0, 3);
    frame.put_u8(START_CHAR);
    frame.put_slice(cat);
    frame.put_slice(code.as_bytes());
    frame.put_slice(params.as_bytes());
    frame.put_u8(LF);
    Some(frame.freeze())
}

/// Accumulates socket reads and yields complete frames.
#[derive(Debug, Default)]
pub struct IscpDecoder {
    buf: BytesMut,
}

impl IscpDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Next frame in wire order, or `None` if no complete frame is buffered.
    pub fn next_frame(&mut self) -> Option<Result<IscpFrame, CodecError>> {
        let (frame, consumed) = try_extract_frame(&self.buf);
        self.buf.advance(consumed.min(self.buf.len()));
        frame
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames_of(decoder: &mut IscpDecoder) -> Vec<Result<IscpFrame, CodecError>> {
        let mut out = Vec::new();
        while let Some(f) = decoder.next_frame() {
            out.push(f);
        }
        out
    }

    fn stream() -> Vec<u8> {
        let mut data = b"garbage".to_vec();
        for (code, params) in [("PWR", "01"), ("MVL", "2A"), ("NTI", "Song title"), ("NLT", "")] {
            data.extend_from_slice(&encode('1', code, params).unwrap());
        }
        data
    }

    #[test]
    fn test_encode_layout() {
        let frame = encode('1', "PWR", "QSTN").unwrap();
        assert_eq!(&frame[..4], b"ISCP");
        assert_eq!(u32::from_be_bytes(frame[4..8].try_into().unwrap()), 16);
        assert_eq!(u32::from_be_bytes(frame[8..12].try_into().unwrap()), 10);
        assert_eq!(frame[12], VERSION);
        assert_eq!(&frame[16..], b"!1PWRQSTN\n");
    }

    #[test]
    fn test_encode_refuses_tiny_frame() {
        assert!(encode('1', "P", "").is_none());
        assert!(encode('1', "PWR", "").is_some());
    }

    #[test]
    fn test_round_trip() {
        let frame = encode('x', "ECN", "QSTN").unwrap();
        let (parsed, consumed) = try_extract_frame(&frame);
        assert_eq!(consumed, frame.len());
        let parsed = parsed.unwrap().unwrap();
        assert_eq!(parsed.category, 'x');
        assert_eq!(parsed.code, "ECN");
        assert_eq!(parsed.params, "QSTN");
    }

    #[test]
    fn test_need_more_data() {
        let frame = encode('1', "PWR", "01").unwrap();
        let (parsed, consumed) = try_extract_frame(&frame[..frame.len() - 1]);
        assert!(parsed.is_none());
        assert_eq!(consumed, 0);
    }

    #[test]
    fn test_trailing_terminators_trimmed() {
        let mut raw = BytesMut::new();
        let body = b"!1NTIAbc\x1a\r\n";
        raw.put_slice(MAGIC);
        raw.put_u32(16);
        raw.put_u32(body.len() as u32);
        raw.put_u8(1);
        raw.put_bytes(0, 3);
        raw.put_slice(body);
        let (parsed, _) = try_extract_frame(&raw);
        assert_eq!(parsed.unwrap().unwrap().params, "Abc");
    }

    #[test]
    fn test_malformed_body_is_consumed() {
        let mut raw = BytesMut::new();
        let body = b"?1PWR01\n";
        raw.put_slice(MAGIC);
        raw.put_u32(16);
        raw.put_u32(body.len() as u32);
        raw.put_u8(1);
        raw.put_bytes(0, 3);
        raw.put_slice(body);
        raw.put_slice(&encode('1', "PWR", "00").unwrap());

        let mut decoder = IscpDecoder::new();
        decoder.push(&raw);
        let frames = frames_of(&mut decoder);
        assert_eq!(frames.len(), 2);
        assert!(matches!(frames[0], Err(CodecError::MissingStartChar(_))));
        assert_eq!(frames[1].as_ref().unwrap().params, "00");
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_oversized_frame_resyncs() {
        let mut raw = BytesMut::new();
        raw.put_slice(MAGIC);
        raw.put_u32(16);
        raw.put_u32(u32::MAX);
        raw.put_u8(1);
        raw.put_bytes(0, 3);
        raw.put_slice(b"!1PWR01\n");
        raw.put_slice(&encode('1', "AMT", "01").unwrap());

        let mut decoder = IscpDecoder::new();
        decoder.push(&raw);
        let frames = frames_of(&mut decoder);
        assert_eq!(frames.len(), 2);
        assert!(matches!(
            frames[0],
            Err(CodecError::FrameTooLarge { data: u32::MAX, .. })
        ));
        assert_eq!(frames[1].as_ref().unwrap().code, "AMT");
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_chunk_boundary_independence() {
        let data = stream();

        let mut whole = IscpDecoder::new();
        whole.push(&data);
        let expected = frames_of(&mut whole);
        assert_eq!(expected.len(), 4);

        let mut bytewise = IscpDecoder::new();
        let mut got = Vec::new();
        for b in &data {
            bytewise.push(std::slice::from_ref(b));
            got.extend(frames_of(&mut bytewise));
        }
        assert_eq!(got, expected);

        for split in 0..data.len() {
            let mut two = IscpDecoder::new();
            two.push(&data[..split]);
            let mut got = frames_of(&mut two);
            two.push(&data[split..]);
            got.extend(frames_of(&mut two));
            assert_eq!(got, expected, "split at {}", split);
        }
    }

    #[test]
    fn test_partial_magic_kept() {
        let frame = encode('1', "AMT", "01").unwrap();
        let mut decoder = IscpDecoder::new();
        decoder.push(b"zzzzIS");
        assert!(decoder.next_frame().is_none());
        decoder.push(&frame[2..]);
        assert_eq!(decoder.next_frame().unwrap().unwrap().code, "AMT");
    }
}
