//! Request routing: payload parsing and the opcode table.

use crate::crypto::SIGNATURE_LEN;
use crate::error::HsmError;
use crate::keystore::Permissions;
use crate::protocol::{Opcode, Request, Response, ResultCode};
use crate::Hsm;
use tracing::{debug, trace};

/// A parsed request. Borrowed slices point into the request payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Init { secret: &'a [u8] },
    GenerateKey { id: u32, permissions: Permissions },
    Encrypt { key_id: u32, plaintext: &'a [u8] },
    Decrypt { key_id: u32, sealed: &'a [u8] },
    Sign { key_id: u32, message: &'a [u8] },
    Verify { key_id: u32, message: &'a [u8], signature: &'a [u8] },
    Hash { message: &'a [u8] },
    Random { len: u16 },
    Status,
    Reset,
}

impl<'a> Command<'a> {
    /// Parse a raw opcode and payload.
    ///
    /// Unknown opcodes fail with [`HsmError::InvalidCommand`]; payloads too
    /// short for their opcode fail with [`HsmError::InvalidData`].
    pub fn parse(opcode: u8, payload: &'a [u8]) -> Result<Self, HsmError> {
        let opcode = Opcode::try_from(opcode).map_err(HsmError::InvalidCommand)?;

        Ok(match opcode {
            Opcode::Init => Command::Init { secret: payload },
            Opcode::GenerateKey => {
                let (id, rest) = split_u32(payload)?;
                let (bits, _) = split_u32(rest)?;
                Command::GenerateKey {
                    id,
                    permissions: Permissions::from_bits(bits),
                }
            }
            Opcode::Encrypt => {
                let (key_id, plaintext) = split_u32(payload)?;
                Command::Encrypt { key_id, plaintext }
            }
            Opcode::Decrypt => {
                let (key_id, sealed) = split_u32(payload)?;
                Command::Decrypt { key_id, sealed }
            }
            Opcode::Sign => {
                let (key_id, message) = split_u32(payload)?;
                Command::Sign { key_id, message }
            }
            Opcode::Verify => {
                let (key_id, rest) = split_u32(payload)?;
                let Some(split) = rest.len().checked_sub(SIGNATURE_LEN) else {
                    return Err(HsmError::InvalidData("verify payload lacks a signature"));
                };
                let (message, signature) = rest.split_at(split);
                Command::Verify {
                    key_id,
                    message,
                    signature,
                }
            }
            Opcode::Hash => Command::Hash { message: payload },
            Opcode::Random => {
                let Some((len, _)) = payload.split_first_chunk::<2>() else {
                    return Err(HsmError::InvalidData("random needs a 2-byte length"));
                };
                Command::Random {
                    len: u16::from_be_bytes(*len),
                }
            }
            Opcode::Status => Command::Status,
            Opcode::Reset => Command::Reset,
        })
    }

    pub fn opcode(&self) -> Opcode {
        match self {
            Command::Init { .. } => Opcode::Init,
            Command::GenerateKey { .. } => Opcode::GenerateKey,
            Command::Encrypt { .. } => Opcode::Encrypt,
            Command::Decrypt { .. } => Opcode::Decrypt,
            Command::Sign { .. } => Opcode::Sign,
            Command::Verify { .. } => Opcode::Verify,
            Command::Hash { .. } => Opcode::Hash,
            Command::Random { .. } => Opcode::Random,
            Command::Status => Opcode::Status,
            Command::Reset => Opcode::Reset,
        }
    }

    /// Build the wire request for this command (host side).
    pub fn to_request(&self) -> Request {
        let mut payload = Vec::new();
        match *self {
            Command::Init { secret } => payload.extend_from_slice(secret),
            Command::GenerateKey { id, permissions } => {
                payload.extend_from_slice(&id.to_be_bytes());
                payload.extend_from_slice(&permissions.bits().to_be_bytes());
            }
            Command::Encrypt { key_id, plaintext: data }
            | Command::Decrypt { key_id, sealed: data }
            | Command::Sign { key_id, message: data } => {
                payload.extend_from_slice(&key_id.to_be_bytes());
                payload.extend_from_slice(data);
            }
            Command::Verify {
                key_id,
                message,
                signature,
            } => {
                payload.extend_from_slice(&key_id.to_be_bytes());
                payload.extend_from_slice(message);
                payload.extend_from_slice(signature);
            }
            Command::Hash { message } => payload.extend_from_slice(message),
            Command::Random { len } => payload.extend_from_slice(&len.to_be_bytes()),
            Command::Status | Command::Reset => {}
        }
        Request::new(self.opcode(), payload)
    }
}

fn split_u32(payload: &[u8]) -> Result<(u32, &[u8]), HsmError> {
    payload
        .split_first_chunk::<4>()
        .map(|(head, rest)| (u32::from_be_bytes(*head), rest))
        .ok_or(HsmError::InvalidData("payload shorter than a 4-byte field"))
}

impl Hsm {
    /// Handle one request end to end. Never fails: every error becomes a
    /// result code.
    pub fn process(&mut self, opcode: u8, payload: &[u8]) -> Response {
        if !self.is_initialized() {
            debug!(opcode, "request refused: module not initialized");
            return Response::empty(ResultCode::Error);
        }
        if payload.len() > self.config.max_payload() {
            debug!(opcode, len = payload.len(), "request refused: payload over limit");
            return Response::empty(ResultCode::InvalidData);
        }

        let outcome = Command::parse(opcode, payload).and_then(|command| self.execute(command));
        match outcome {
            Ok(response) => {
                trace!(opcode, len = response.payload().len(), "request served");
                response
            }
            Err(e) => {
                debug!(opcode, code = ?e.result_code(), error = %e, "request failed");
                Response::empty(e.result_code())
            }
        }
    }

    pub fn handle(&mut self, request: &Request) -> Response {
        self.process(request.opcode(), request.payload())
    }

    /// Run a parsed command. Fails with [`HsmError::NotInitialized`] on a
    /// wiped module.
    pub fn execute(&mut self, command: Command<'_>) -> Result<Response, HsmError> {
        self.ensure_initialized()?;
        let ok = || Response::empty(ResultCode::Success);

        match command {
            Command::Init { secret } => self.authenticate(secret).map(|()| ok()),
            Command::GenerateKey { id, permissions } => {
                self.generate_key(id, permissions).map(|()| ok())
            }
            Command::Encrypt { key_id, plaintext } => {
                self.encrypt(key_id, plaintext).map(Response::success)
            }
            Command::Decrypt { key_id, sealed } => {
                self.decrypt(key_id, sealed).map(Response::sensitive)
            }
            Command::Sign { key_id, message } => self.sign(key_id, message).map(Response::success),
            Command::Verify {
                key_id,
                message,
                signature,
            } => self.verify(key_id, message, signature).map(|()| ok()),
            Command::Hash { message } => self.hash(message).map(Response::success),
            Command::Random { len } => self.random(len.into()).map(Response::sensitive),
            Command::Status => Ok(Response::success(self.status().to_bytes())),
            Command::Reset => self.reset().map(|()| ok()),
        }
    }
}
