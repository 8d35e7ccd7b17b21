//! Host-side client speaking the binary frame protocol.

use crate::crypto::{DIGEST_LEN, SIGNATURE_LEN};
use crate::dispatch::Command;
use crate::keystore::Permissions;
use crate::protocol::{FrameError, Opcode, Request, Response, ResultCode};
use crate::status::Status;
use std::io::{Read, Write};
use thiserror::Error;
use zeroize::Zeroizing;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("module closed the stream")]
    Closed,

    #[error("{opcode:?} rejected with {code:?}")]
    Rejected { opcode: Opcode, code: ResultCode },

    #[error("{opcode:?} returned {actual} bytes, expected {expected}")]
    UnexpectedLength {
        opcode: Opcode,
        expected: usize,
        actual: usize,
    },
}

impl ClientError {
    /// Result code carried by a rejection, if this is one.
    pub fn code(&self) -> Option<ResultCode> {
        match self {
            ClientError::Rejected { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Typed wrapper around a transport connected to the module.
#[derive(Debug)]
pub struct HsmClient<T> {
    transport: T,
}

impl<T: Read + Write> HsmClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn get_ref(&self) -> &T {
        &self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Send one raw request and wait for its response, whatever the result
    /// code.
    pub fn call(&mut self, request: &Request) -> Result<Response, ClientError> {
        let frame = Zeroizing::new(request.encode()?);
        self.transport
            .write_all(&frame)
            .and_then(|()| self.transport.flush())
            .map_err(FrameError::from)?;

        Response::read_from(&mut self.transport)?.ok_or(ClientError::Closed)
    }

    /// Send a command and fail on any non-success result.
    pub fn execute(&mut self, command: Command<'_>) -> Result<Response, ClientError> {
        let opcode = command.opcode();
        let response = self.call(&command.to_request())?;
        if response.is_success() {
            Ok(response)
        } else {
            Err(ClientError::Rejected {
                opcode,
                code: response.result(),
            })
        }
    }

    pub fn init(&mut self, secret: &[u8]) -> Result<(), ClientError> {
        self.execute(Command::Init { secret }).map(drop)
    }

    pub fn generate_key(&mut self, id: u32, permissions: Permissions) -> Result<(), ClientError> {
        self.execute(Command::GenerateKey { id, permissions })
            .map(drop)
    }

    /// Returns `nonce || ciphertext || tag`.
    pub fn encrypt(&mut self, key_id: u32, plaintext: &[u8]) -> Result<Vec<u8>, ClientError> {
        let response = self.execute(Command::Encrypt { key_id, plaintext })?;
        Ok(response.payload().to_vec())
    }

    pub fn decrypt(
        &mut self,
        key_id: u32,
        sealed: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, ClientError> {
        let response = self.execute(Command::Decrypt { key_id, sealed })?;
        Ok(Zeroizing::new(response.payload().to_vec()))
    }

    pub fn sign(&mut self, key_id: u32, message: &[u8]) -> Result<[u8; SIGNATURE_LEN], ClientError> {
        let response = self.execute(Command::Sign { key_id, message })?;
        fixed(Opcode::Sign, response.payload())
    }

    /// `Ok(false)` when the module reports the signature as not matching.
    pub fn verify(
        &mut self,
        key_id: u32,
        message: &[u8],
        signature: &[u8],
    ) -> Result<bool, ClientError> {
        match self.execute(Command::Verify {
            key_id,
            message,
            signature,
        }) {
            Ok(_) => Ok(true),
            Err(ClientError::Rejected {
                code: ResultCode::Error,
                ..
            }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn hash(&mut self, message: &[u8]) -> Result<[u8; DIGEST_LEN], ClientError> {
        let response = self.execute(Command::Hash { message })?;
        fixed(Opcode::Hash, response.payload())
    }

    pub fn random(&mut self, len: u16) -> Result<Zeroizing<Vec<u8>>, ClientError> {
        let response = self.execute(Command::Random { len })?;
        Ok(Zeroizing::new(response.payload().to_vec()))
    }

    pub fn status(&mut self) -> Result<Status, ClientError> {
        let response = self.execute(Command::Status)?;
        Status::from_bytes(response.payload()).ok_or(ClientError::UnexpectedLength {
            opcode: Opcode::Status,
            expected: Status::LEN,
            actual: response.payload().len(),
        })
    }

    pub fn reset(&mut self) -> Result<(), ClientError> {
        self.execute(Command::Reset).map(drop)
    }
}

fn fixed<const N: usize>(opcode: Opcode, payload: &[u8]) -> Result<[u8; N], ClientError> {
    payload
        .try_into()
        .map_err(|_| ClientError::UnexpectedLength {
            opcode,
            expected: N,
            actual: payload.len(),
        })
}
