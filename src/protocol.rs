//! Wire framing between host and module.
//!
//! ```text
//! request:  OPCODE (1) | LENGTH (2, BE) | PAYLOAD (LENGTH)
//! response: RESULT (1) | LENGTH (2, BE) | PAYLOAD (LENGTH)
//! ```

use std::io::{self, Read, Write};
use thiserror::Error;
use zeroize::Zeroizing;

/// Length of the opcode/result byte plus the length field.
pub const HEADER_LEN: usize = 3;

/// Command opcodes understood by the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Init = 0x01,
    GenerateKey = 0x02,
    Encrypt = 0x03,
    Decrypt = 0x04,
    Sign = 0x05,
    Verify = 0x06,
    Hash = 0x07,
    Random = 0x08,
    Status = 0x09,
    Reset = 0x0A,
}

impl TryFrom<u8> for Opcode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        Ok(match value {
            0x01 => Opcode::Init,
            0x02 => Opcode::GenerateKey,
            0x03 => Opcode::Encrypt,
            0x04 => Opcode::Decrypt,
            0x05 => Opcode::Sign,
            0x06 => Opcode::Verify,
            0x07 => Opcode::Hash,
            0x08 => Opcode::Random,
            0x09 => Opcode::Status,
            0x0A => Opcode::Reset,
            other => return Err(other),
        })
    }
}

impl From<Opcode> for u8 {
    fn from(op: Opcode) -> u8 {
        op as u8
    }
}

/// Result byte of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ResultCode {
    Success = 0x00,
    Error = 0x01,
    InvalidCmd = 0x02,
    InvalidData = 0x03,
    KeyNotFound = 0x04,
    MemoryFull = 0x05,
    AuthFailed = 0x06,
}

impl TryFrom<u8> for ResultCode {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, FrameError> {
        Ok(match value {
            0x00 => ResultCode::Success,
            0x01 => ResultCode::Error,
            0x02 => ResultCode::InvalidCmd,
            0x03 => ResultCode::InvalidData,
            0x04 => ResultCode::KeyNotFound,
            0x05 => ResultCode::MemoryFull,
            0x06 => ResultCode::AuthFailed,
            other => return Err(FrameError::UnknownResult(other)),
        })
    }
}

impl From<ResultCode> for u8 {
    fn from(code: ResultCode) -> u8 {
        code as u8
    }
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("transport error: {0}")]
    Io(#[from] io::Error),

    #[error("frame truncated: expected {expected} payload bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("payload of {len} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("unknown result code 0x{0:02x}")]
    UnknownResult(u8),
}

/// A decoded request. The opcode is kept raw so unknown values can be
/// answered with `INVALID_CMD` instead of dropping the frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    opcode: u8,
    payload: Zeroizing<Vec<u8>>,
}

impl Request {
    pub fn new(opcode: impl Into<u8>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            opcode: opcode.into(),
            payload: Zeroizing::new(payload.into()),
        }
    }

    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        encode_frame(self.opcode, &self.payload)
    }

    /// Parse one request from the front of `data`.
    ///
    /// Returns the request and the number of bytes consumed.
    pub fn decode(data: &[u8], max_payload: usize) -> Result<(Self, usize), FrameError> {
        let (opcode, payload, used) = decode_frame(data, max_payload)?;
        Ok((Self::new(opcode, payload), used))
    }
}

/// A response ready for the wire. The length field is always derived from
/// the payload at encode time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    result: ResultCode,
    payload: Zeroizing<Vec<u8>>,
}

impl Response {
    pub fn new(result: ResultCode, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            result,
            payload: Zeroizing::new(payload.into()),
        }
    }

    pub fn success(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(ResultCode::Success, payload)
    }

    /// Success response around a payload that is already wrapped for wiping.
    pub fn sensitive(payload: Zeroizing<Vec<u8>>) -> Self {
        Self {
            result: ResultCode::Success,
            payload,
        }
    }

    pub fn empty(result: ResultCode) -> Self {
        Self::new(result, Vec::new())
    }

    pub fn result(&self) -> ResultCode {
        self.result
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn is_success(&self) -> bool {
        self.result == ResultCode::Success
    }

    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        encode_frame(self.result.into(), &self.payload)
    }

    pub fn decode(data: &[u8]) -> Result<(Self, usize), FrameError> {
        let (result, payload, used) = decode_frame(data, u16::MAX as usize)?;
        Ok((Self::new(ResultCode::try_from(result)?, payload), used))
    }

    pub fn write_to(&self, writer: &mut impl Write) -> Result<(), FrameError> {
        let frame = Zeroizing::new(self.encode()?);
        writer.write_all(&frame)?;
        writer.flush()?;
        Ok(())
    }

    /// Read one response. Returns `None` on a clean end of stream.
    pub fn read_from(reader: &mut impl Read) -> Result<Option<Self>, FrameError> {
        let Some((result, len)) = read_header(reader)? else {
            return Ok(None);
        };
        let result = ResultCode::try_from(result)?;
        let mut payload = Zeroizing::new(vec![0u8; len]);
        read_payload(reader, &mut payload)?;
        Ok(Some(Self {
            result,
            payload,
        }))
    }
}

/// What the serving loop pulled off the transport.
#[derive(Debug)]
pub enum Incoming {
    Request(Request),
    /// The header announced more than the working buffer holds. The payload
    /// has already been drained from the stream.
    Oversized { opcode: u8, len: usize },
}

/// Read one request from `reader`.
///
/// Returns `None` on a clean end of stream before any header byte.
pub fn read_request(
    reader: &mut impl Read,
    max_payload: usize,
) -> Result<Option<Incoming>, FrameError> {
    let Some((opcode, len)) = read_header(reader)? else {
        return Ok(None);
    };

    if len > max_payload {
        let drained = io::copy(&mut reader.by_ref().take(len as u64), &mut io::sink())? as usize;
        if drained < len {
            return Err(FrameError::Truncated {
                expected: len,
                actual: drained,
            });
        }
        return Ok(Some(Incoming::Oversized { opcode, len }));
    }

    let mut payload = Zeroizing::new(vec![0u8; len]);
    read_payload(reader, &mut payload)?;
    Ok(Some(Incoming::Request(Request { opcode, payload })))
}

fn encode_frame(lead: u8, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    let len = u16::try_from(payload.len()).map_err(|_| FrameError::PayloadTooLarge {
        len: payload.len(),
        max: u16::MAX as usize,
    })?;

    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.push(lead);
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

fn decode_frame(data: &[u8], max_payload: usize) -> Result<(u8, Vec<u8>, usize), FrameError> {
    if data.len() < HEADER_LEN {
        return Err(FrameError::Truncated {
            expected: HEADER_LEN,
            actual: data.len(),
        });
    }

    let lead = data[0];
    let len = u16::from_be_bytes([data[1], data[2]]) as usize;
    if len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            len,
            max: max_payload,
        });
    }

    let body = &data[HEADER_LEN..];
    if body.len() < len {
        return Err(FrameError::Truncated {
            expected: len,
            actual: body.len(),
        });
    }

    Ok((lead, body[..len].to_vec(), HEADER_LEN + len))
}

fn read_header(reader: &mut impl Read) -> Result<Option<(u8, usize)>, FrameError> {
    let mut header = [0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < HEADER_LEN {
        match reader.read(&mut header[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(FrameError::Truncated {
                    expected: HEADER_LEN,
                    actual: filled,
                });
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(Some((header[0], u16::from_be_bytes([header[1], header[2]]) as usize)))
}

fn read_payload(reader: &mut impl Read, buf: &mut [u8]) -> Result<(), FrameError> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => FrameError::Truncated {
            expected: buf.len(),
            actual: 0,
        },
        _ => FrameError::Io(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn opcode_byte_values() {
        assert_eq!(u8::from(Opcode::Init), 0x01);
        assert_eq!(u8::from(Opcode::Reset), 0x0A);
        assert_eq!(Opcode::try_from(0x07), Ok(Opcode::Hash));
        assert_eq!(Opcode::try_from(0x0B), Err(0x0B));
        assert_eq!(Opcode::try_from(0x00), Err(0x00));
    }

    #[test]
    fn result_code_byte_values() {
        assert_eq!(u8::from(ResultCode::Success), 0x00);
        assert_eq!(u8::from(ResultCode::AuthFailed), 0x06);
        assert!(matches!(
            ResultCode::try_from(0x07),
            Err(FrameError::UnknownResult(0x07))
        ));
    }

    #[test]
    fn request_layout_is_big_endian() {
        let bytes = Request::new(Opcode::Hash, vec![0xAB; 0x0102]).encode().unwrap();
        assert_eq!(&bytes[..3], &[0x07, 0x01, 0x02]);
        assert_eq!(bytes.len(), 3 + 0x0102);
    }

    #[test]
    fn response_length_tracks_payload() {
        let bytes = Response::success(vec![1, 2, 3]).encode().unwrap();
        assert_eq!(bytes, vec![0x00, 0x00, 0x03, 1, 2, 3]);

        let bytes = Response::empty(ResultCode::KeyNotFound).encode().unwrap();
        assert_eq!(bytes, vec![0x04, 0x00, 0x00]);
    }

    #[test]
    fn response_payload_over_u16_fails() {
        let response = Response::success(vec![0u8; u16::MAX as usize + 1]);
        assert!(matches!(
            response.encode(),
            Err(FrameError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn decode_reports_consumed_bytes() {
        let mut bytes = Request::new(Opcode::Random, vec![0x00, 0x10]).encode().unwrap();
        bytes.extend_from_slice(&[0x09, 0x00, 0x00]);

        let (first, used) = Request::decode(&bytes, 4096).unwrap();
        assert_eq!(first.opcode(), 0x08);
        assert_eq!(first.payload(), &[0x00, 0x10]);
        assert_eq!(used, 5);

        let (second, used) = Request::decode(&bytes[used..], 4096).unwrap();
        assert_eq!(second.opcode(), 0x09);
        assert!(second.payload().is_empty());
        assert_eq!(used, 3);
    }

    #[test]
    fn decode_short_header_fails() {
        assert!(matches!(
            Request::decode(&[0x01, 0x00], 4096),
            Err(FrameError::Truncated { expected: 3, actual: 2 })
        ));
    }

    #[test]
    fn decode_truncated_payload_fails() {
        assert!(matches!(
            Request::decode(&[0x07, 0x00, 0x05, 1, 2], 4096),
            Err(FrameError::Truncated { expected: 5, actual: 2 })
        ));
    }

    #[test]
    fn read_request_clean_eof_is_none() {
        let mut empty = Cursor::new(Vec::<u8>::new());
        assert!(read_request(&mut empty, 4096).unwrap().is_none());
    }

    #[test]
    fn read_request_mid_header_eof_fails() {
        let mut partial = Cursor::new(vec![0x09]);
        assert!(matches!(
            read_request(&mut partial, 4096),
            Err(FrameError::Truncated { .. })
        ));
    }

    #[test]
    fn oversized_request_is_drained() {
        let mut stream = Request::new(Opcode::Hash, vec![0u8; 20]).encode().unwrap();
        stream.extend_from_slice(&[0x09, 0x00, 0x00]);
        let mut cursor = Cursor::new(stream);

        match read_request(&mut cursor, 16).unwrap() {
            Some(Incoming::Oversized { opcode, len }) => {
                assert_eq!(opcode, 0x07);
                assert_eq!(len, 20);
            }
            other => panic!("expected Oversized, got: {other:?}"),
        }

        match read_request(&mut cursor, 16).unwrap() {
            Some(Incoming::Request(req)) => assert_eq!(req.opcode(), 0x09),
            other => panic!("expected Request, got: {other:?}"),
        }
    }

    #[test]
    fn response_write_then_read() {
        let mut wire = Vec::new();
        Response::success(vec![7u8; 16]).write_to(&mut wire).unwrap();
        Response::empty(ResultCode::AuthFailed).write_to(&mut wire).unwrap();

        let mut cursor = Cursor::new(wire);
        let first = Response::read_from(&mut cursor).unwrap().unwrap();
        assert!(first.is_success());
        assert_eq!(first.payload(), &[7u8; 16]);

        let second = Response::read_from(&mut cursor).unwrap().unwrap();
        assert_eq!(second.result(), ResultCode::AuthFailed);
        assert!(Response::read_from(&mut cursor).unwrap().is_none());
    }
}
