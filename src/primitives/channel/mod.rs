#![forbid(unsafe_code)]

//! Query/response channel to the external helper process.
//!
//! The helper performs bulk storage and index work on the destination side.
//! This module only knows how to send a query, read an answer, and remember
//! permanently that the peer went away.

use std::io::{self, BufRead, BufReader, ErrorKind, Read, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{BridgeError, Result};

/// A single helper command with its arguments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HelperRequest {
    command: String,
    args: Vec<Vec<u8>>,
}

impl HelperRequest {
    /// Starts a request for `command`.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
        }
    }

    /// Appends an argument.
    pub fn arg(mut self, arg: impl AsRef<[u8]>) -> Self {
        self.args.push(arg.as_ref().to_vec());
        self
    }

    /// Command name.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Arguments in order.
    pub fn args(&self) -> &[Vec<u8>] {
        &self.args
    }

    /// Encodes the request as one protocol line.
    pub fn encode_line(&self) -> Result<Vec<u8>> {
        let mut line = Vec::with_capacity(self.command.len() + 1);
        if self.command.is_empty() || !is_token(self.command.as_bytes()) {
            return Err(BridgeError::InvalidArgument(format!(
                "helper command {:?} is not a single token",
                self.command
            )));
        }
        line.extend_from_slice(self.command.as_bytes());
        for arg in &self.args {
            if !is_token(arg) {
                return Err(BridgeError::InvalidArgument(
                    "helper arguments cannot contain spaces or newlines".into(),
                ));
            }
            line.push(b' ');
            line.extend_from_slice(arg);
        }
        line.push(b'\n');
        Ok(line)
    }
}

fn is_token(bytes: &[u8]) -> bool {
    !bytes.iter().any(|b| matches!(b, b' ' | b'\n' | b'\r'))
}

/// Answer to a [`HelperRequest`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HelperResponse {
    body: Vec<u8>,
}

impl HelperResponse {
    /// Wraps a raw response body.
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self { body: body.into() }
    }

    /// Raw body.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Consumes the response, returning the body.
    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    /// Non-empty newline-separated lines of the body.
    pub fn lines(&self) -> impl Iterator<Item = &[u8]> {
        self.body
            .split(|&b| b == b'\n')
            .filter(|line| !line.is_empty())
    }
}

/// Moves requests to the helper and answers back.
///
/// `Ok(None)` means the peer closed the channel.
pub trait Transport: Send {
    /// Sends one request and waits for its answer.
    fn roundtrip(&mut self, request: &HelperRequest) -> Result<Option<HelperResponse>>;

    /// Releases the underlying connection.
    fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Shared handle on the helper channel.
///
/// Once a close is observed (explicitly, by EOF, or by a broken pipe) the
/// handle stays closed and every later query fails with
/// [`BridgeError::HelperClosed`].
pub struct Helper<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    transport: Mutex<T>,
    closed: AtomicBool,
    queries: AtomicU64,
}

impl<T> Clone for Helper<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport> Helper<T> {
    /// Wraps an open transport.
    pub fn new(transport: T) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport: Mutex::new(transport),
                closed: AtomicBool::new(false),
                queries: AtomicU64::new(0),
            }),
        }
    }

    /// Whether a close has been observed.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Number of queries that reached the transport.
    pub fn queries_sent(&self) -> u64 {
        self.inner.queries.load(Ordering::Relaxed)
    }

    /// Sends `request` and returns the helper's answer.
    pub fn query(&self, request: &HelperRequest) -> Result<HelperResponse> {
        if self.is_closed() {
            return Err(BridgeError::HelperClosed);
        }
        let mut transport = self.inner.transport.lock();
        // A concurrent query may have observed the close while we waited.
        if self.is_closed() {
            return Err(BridgeError::HelperClosed);
        }
        self.inner.queries.fetch_add(1, Ordering::Relaxed);
        match transport.roundtrip(request) {
            Ok(Some(response)) => {
                debug!(
                    command = request.command(),
                    bytes = response.body().len(),
                    "helper.query"
                );
                Ok(response)
            }
            Ok(None) => {
                self.mark_closed("eof");
                Err(BridgeError::HelperClosed)
            }
            Err(BridgeError::Io(err)) if is_disconnect(err.kind()) => {
                self.mark_closed("disconnect");
                Err(BridgeError::HelperClosed)
            }
            Err(err) => Err(err),
        }
    }

    /// Closes the channel. Idempotent.
    pub fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        debug!("helper.close");
        self.inner.transport.lock().shutdown()
    }

    fn mark_closed(&self, reason: &'static str) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            warn!(reason, "helper.closed");
        }
    }
}

fn is_disconnect(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
    )
}

/// Line protocol over a byte stream pair.
///
/// Requests are `command arg...\n`. Responses are `<len>\n` followed by `len`
/// bytes, or `error <message>\n`.
pub struct StreamTransport<R, W> {
    reader: BufReader<R>,
    writer: W,
}

impl<R: Read, W: Write> StreamTransport<R, W> {
    /// Builds a transport reading answers from `reader` and writing requests to `writer`.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    /// Gives back the writer, for inspecting what was sent.
    pub fn into_writer(self) -> W {
        self.writer
    }
}

impl<R: Read + Send, W: Write + Send> Transport for StreamTransport<R, W> {
    fn roundtrip(&mut self, request: &HelperRequest) -> Result<Option<HelperResponse>> {
        let line = request.encode_line()?;
        self.writer.write_all(&line)?;
        self.writer.flush()?;

        let mut header = Vec::new();
        let read = self.reader.read_until(b'\n', &mut header)?;
        if read == 0 || header.last() != Some(&b'\n') {
            return Ok(None);
        }
        header.pop();
        if let Some(message) = header.strip_prefix(b"error ") {
            return Err(BridgeError::HelperProtocol(
                String::from_utf8_lossy(message).into_owned(),
            ));
        }
        let len = std::str::from_utf8(&header)
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .ok_or_else(|| {
                BridgeError::HelperProtocol(format!(
                    "bad length line {:?}",
                    String::from_utf8_lossy(&header)
                ))
            })?;
        // allocation tracks bytes actually read, not the announced length
        let mut body = Vec::with_capacity(len.min(64 * 1024));
        let got = (&mut self.reader).take(len as u64).read_to_end(&mut body)?;
        if got < len {
            return Err(io::Error::new(
                ErrorKind::UnexpectedEof,
                format!("helper answer ended after {got} of {len} bytes"),
            )
            .into());
        }
        Ok(Some(HelperResponse::new(body)))
    }
}

/// Helper running as a child process, spoken to over its stdin/stdout.
pub struct ProcessTransport {
    child: Child,
    stream: StreamTransport<ChildStdout, ChildStdin>,
}

impl ProcessTransport {
    /// Spawns `command` with piped stdin/stdout.
    pub fn spawn(command: &mut Command) -> Result<Self> {
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::new(ErrorKind::BrokenPipe, "helper stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::new(ErrorKind::BrokenPipe, "helper stdout unavailable"))?;
        Ok(Self {
            child,
            stream: StreamTransport::new(stdout, stdin),
        })
    }
}

impl Transport for ProcessTransport {
    fn roundtrip(&mut self, request: &HelperRequest) -> Result<Option<HelperResponse>> {
        self.stream.roundtrip(request)
    }

    fn shutdown(&mut self) -> Result<()> {
        match self.child.kill() {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::InvalidInput => {}
            Err(err) => return Err(err.into()),
        }
        self.child.wait()?;
        Ok(())
    }
}

impl Drop for ProcessTransport {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
