//! Serving loop: one request in, one response out, one maintenance step.

use crate::Hsm;
use crate::protocol::{FrameError, Incoming, Response, ResultCode, read_request};
use std::io::{self, Cursor, Read, Write};
use std::mem;
use tracing::{debug, info, warn};

/// Owns the module and drives it from a byte stream.
#[derive(Debug)]
pub struct Server {
    hsm: Hsm,
}

impl Server {
    pub fn new(hsm: Hsm) -> Self {
        Self { hsm }
    }

    pub fn hsm(&self) -> &Hsm {
        &self.hsm
    }

    pub fn into_inner(self) -> Hsm {
        self.hsm
    }

    /// Serve requests from `reader` until a clean end of stream.
    ///
    /// A frame cut off mid-way ends the session without a response.
    /// Returns the number of responses written.
    pub fn serve<R: Read, W: Write>(
        &mut self,
        reader: &mut R,
        writer: &mut W,
    ) -> Result<u64, FrameError> {
        let max_payload = self.hsm.config().max_payload();
        let mut served = 0u64;

        loop {
            let incoming = match read_request(reader, max_payload) {
                Ok(Some(incoming)) => incoming,
                Ok(None) => break,
                Err(e @ FrameError::Truncated { .. }) => {
                    warn!(error = %e, "session ended mid-frame");
                    break;
                }
                Err(e) => return Err(e),
            };

            let response = match incoming {
                Incoming::Request(request) => self.hsm.handle(&request),
                Incoming::Oversized { opcode, len } => {
                    warn!(opcode, len, max = max_payload, "oversized request rejected");
                    Response::empty(ResultCode::InvalidData)
                }
            };
            response.write_to(writer)?;
            served += 1;

            self.hsm.maintain();
        }

        debug!(served, "session closed");
        Ok(served)
    }

    /// Serve over standard input and output.
    pub fn serve_stdio(&mut self) -> Result<u64, FrameError> {
        let stdin = io::stdin();
        let stdout = io::stdout();
        self.serve(&mut stdin.lock(), &mut stdout.lock())
    }

    /// Bind a Unix-domain socket at `path` and serve one connection at a
    /// time, forever. A stale socket file is replaced.
    #[cfg(unix)]
    pub fn listen(&mut self, path: &std::path::Path) -> io::Result<()> {
        use std::os::unix::net::UnixListener;

        if path.exists() {
            std::fs::remove_file(path)?;
        }
        let listener = UnixListener::bind(path)?;
        info!(socket = %path.display(), "listening");

        for stream in listener.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    continue;
                }
            };
            debug!("connection accepted");

            let (mut reader, mut writer) = (&stream, &stream);
            if let Err(e) = self.serve(&mut reader, &mut writer) {
                warn!(error = %e, "connection dropped");
            }
        }
        Ok(())
    }
}

/// In-process transport: bytes written are served by an owned [`Server`]
/// when the host next reads.
#[derive(Debug)]
pub struct Loopback {
    server: Server,
    inbound: Vec<u8>,
    outbound: Cursor<Vec<u8>>,
}

impl Loopback {
    pub fn new(hsm: Hsm) -> Self {
        Self {
            server: Server::new(hsm),
            inbound: Vec::new(),
            outbound: Cursor::new(Vec::new()),
        }
    }

    pub fn hsm(&self) -> &Hsm {
        self.server.hsm()
    }

    fn drained(&self) -> bool {
        self.outbound.position() as usize >= self.outbound.get_ref().len()
    }
}

impl Write for Loopback {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inbound.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for Loopback {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.drained() && !self.inbound.is_empty() {
            let mut input = Cursor::new(mem::take(&mut self.inbound));
            let mut output = Vec::new();
            self.server
                .serve(&mut input, &mut output)
                .map_err(io::Error::other)?;
            self.outbound = Cursor::new(output);
        }
        self.outbound.read(buf)
    }
}
