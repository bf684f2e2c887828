//! Synchronous line transport to the engine process.

use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::process::{Child, Command, Stdio};

use serde::{de::DeserializeOwned, Serialize};

use super::error::{RpcError, RpcResult};
use super::protocol::{self, methods, NoParams, ResponseEnvelope};
use crate::config::EngineSettings;

/// Capacity the response buffer may keep between calls.
const RETAINED_LINE_CAPACITY: usize = 64 * 1024;

/// The pair of byte streams connected to the engine.
struct Streams {
    reader: Box<dyn BufRead + Send>,
    writer: Box<dyn Write + Send>,
}

/// Line-delimited request/response channel to one engine process.
///
/// Each [`call`](Transport::call) writes exactly one request line and then
/// blocks until exactly one response line has been read. There is no request
/// identifier on the wire, so a transport must never have more than one call
/// in flight; `call` takes `&mut self` and shared users go through a lock.
///
/// Dropping the transport sends the close-environment request, closes both
/// streams and waits for the child. Failures along the way are logged and
/// otherwise ignored.
pub struct Transport {
    streams: Option<Streams>,
    child: Option<Child>,
    booted: bool,
    line: String,
}

impl Transport {
    /// Spawn the engine process described by `settings`.
    ///
    /// The boot handshake is not performed here.
    pub fn spawn(settings: &EngineSettings) -> RpcResult<Self> {
        let path = settings.resolve_path()?;
        tracing::debug!(path = %path.display(), args = ?settings.args, "spawning engine");

        let mut child = Command::new(&path)
            .args(&settings.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(RpcError::SpawnFailed)?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(RpcError::SpawnFailed(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "engine stdio not captured",
                )));
            }
        };

        let mut transport = Self::from_streams(stdout, stdin);
        transport.child = Some(child);
        Ok(transport)
    }

    /// Build a transport over arbitrary streams.
    ///
    /// `reader` carries engine output, `writer` carries engine input.
    pub fn from_streams<R, W>(reader: R, writer: W) -> Self
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        Self {
            streams: Some(Streams {
                reader: Box::new(BufReader::new(reader)),
                writer: Box::new(BufWriter::new(writer)),
            }),
            child: None,
            booted: false,
            line: String::new(),
        }
    }

    /// Read the engine's readiness line.
    ///
    /// A failure flag in that line is fatal and reported as
    /// [`RpcError::BootFailed`]. Calling this again after a successful boot
    /// does nothing.
    pub fn boot(&mut self) -> RpcResult<()> {
        if self.booted {
            return Ok(());
        }

        let envelope = self.read_envelope()?;
        if !envelope.ok {
            let message = envelope
                .err
                .unwrap_or_else(|| "engine reported failure without a message".to_string());
            return Err(RpcError::BootFailed(message));
        }

        self.booted = true;
        tracing::debug!("engine ready");
        Ok(())
    }

    /// Whether the boot handshake has completed.
    pub fn is_booted(&self) -> bool {
        self.booted
    }

    /// Send one request and wait for its response.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The boot handshake has not completed
    /// - Writing the request or reading the response fails
    /// - The engine closes its output
    /// - The engine answers with a failure flag ([`RpcError::Remote`])
    /// - The response does not match the expected shape
    pub fn call<P, R>(&mut self, method: &str, params: P) -> RpcResult<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        if !self.booted {
            return Err(RpcError::NotBooted);
        }

        let request = protocol::encode_request(method, params)?;
        self.write_line(&request)?;
        self.read_envelope()?.into_result()
    }

    fn write_line(&mut self, line: &str) -> RpcResult<()> {
        let streams = self.streams.as_mut().ok_or(RpcError::EngineExited)?;
        tracing::trace!(request = line.trim_end(), "-> engine");
        streams
            .writer
            .write_all(line.as_bytes())
            .map_err(RpcError::WriteFailed)?;
        streams.writer.flush().map_err(RpcError::WriteFailed)
    }

    fn read_envelope(&mut self) -> RpcResult<ResponseEnvelope> {
        let streams = self.streams.as_mut().ok_or(RpcError::EngineExited)?;
        self.line.clear();
        let read = streams
            .reader
            .read_line(&mut self.line)
            .map_err(RpcError::ReadFailed)?;
        if read == 0 {
            return Err(RpcError::EngineExited);
        }
        tracing::trace!(response = self.line.trim_end(), "<- engine");
        let envelope = protocol::decode_response(&self.line);
        if self.line.capacity() > RETAINED_LINE_CAPACITY {
            self.line = String::new();
        }
        envelope
    }

    fn teardown(&mut self) {
        if self.booted && self.streams.is_some() {
            if let Err(err) = self.call::<_, protocol::Ack>(methods::CLOSE_ENVIRONMENT, NoParams {}) {
                tracing::warn!(error = %err, "engine did not acknowledge shutdown");
            }
        }
        self.booted = false;

        // Closing stdin lets the engine observe EOF before we wait on it.
        drop(self.streams.take());

        if let Some(mut child) = self.child.take() {
            if let Err(err) = child.wait() {
                tracing::warn!(error = %err, "failed to wait for engine, killing it");
                let _ = child.kill();
            }
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.teardown();
    }
}
