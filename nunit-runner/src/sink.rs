// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery of IDE protocol messages.
//!
//! IDEs either read messages from the runner's standard output, one JSON
//! object per line, or open a loopback port and exchange length-prefixed
//! strings over it. Both are [`TestSink`]s; listeners don't know which one
//! they write to.

use crate::{
    errors::{ProtocolError, WriteEventError},
    model::{Test, TestResult},
    write_str::WriteStr,
};
use nunit_metadata::protocol::{Message, MessageType, RunTestsMessage};
use serde::Serialize;
use std::{
    io::{self, Read, Write},
    net::{Ipv4Addr, SocketAddr, TcpStream},
};
use tracing::debug;

/// A destination for IDE protocol messages.
pub trait TestSink {
    /// Sends one message. The message is fully written and flushed on return.
    fn send_message(&mut self, message: &Message) -> Result<(), WriteEventError>;

    /// Reports a test found during discovery.
    fn send_test_found(&mut self, test: &Test) -> Result<(), WriteEventError> {
        self.send_message(&payload_message(MessageType::TEST_FOUND, test)?)
    }

    /// Reports that discovery has finished.
    fn send_discovery_completed(&mut self) -> Result<(), WriteEventError> {
        self.send_message(&Message::without_payload(MessageType::DISCOVERY_COMPLETED))
    }

    /// Reports that a test started.
    fn send_test_started(&mut self, test: &Test) -> Result<(), WriteEventError> {
        self.send_message(&payload_message(MessageType::TEST_STARTED, test)?)
    }

    /// Reports the result of a test.
    fn send_test_result(&mut self, result: &TestResult) -> Result<(), WriteEventError> {
        self.send_message(&payload_message(MessageType::TEST_RESULT, result)?)
    }

    /// Reports that execution has finished.
    fn send_execution_completed(&mut self) -> Result<(), WriteEventError> {
        self.send_message(&Message::without_payload(MessageType::EXECUTION_COMPLETED))
    }

    /// Tells the IDE the runner is waiting for a command.
    fn send_waiting_command(&mut self) -> Result<(), WriteEventError> {
        self.send_message(&Message::without_payload(MessageType::WAITING_COMMAND))
    }
}

fn payload_message(message_type: &str, payload: &impl Serialize) -> Result<Message, WriteEventError> {
    Message::new(message_type, payload).map_err(WriteEventError::Json)
}

impl<T: TestSink + ?Sized> TestSink for &mut T {
    fn send_message(&mut self, message: &Message) -> Result<(), WriteEventError> {
        (**self).send_message(message)
    }
}

/// Writes one JSON message per line.
#[derive(Debug)]
pub struct StreamingSink<W> {
    writer: W,
}

impl<W: WriteStr> StreamingSink<W> {
    /// Creates a sink writing to `writer`.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Consumes the sink, returning the writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: WriteStr> TestSink for StreamingSink<W> {
    fn send_message(&mut self, message: &Message) -> Result<(), WriteEventError> {
        let mut line = message.to_json().map_err(WriteEventError::Json)?;
        line.push('\n');
        self.writer.write_str(&line).map_err(WriteEventError::Io)?;
        self.writer.write_str_flush().map_err(WriteEventError::Io)
    }
}

/// Exchanges length-prefixed messages with an IDE over a byte stream.
#[derive(Debug)]
pub struct RemoteSink<S> {
    stream: S,
}

impl RemoteSink<TcpStream> {
    /// Connects to an IDE listening on `port` on the loopback interface.
    pub fn connect(port: u16) -> Result<Self, ProtocolError> {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        debug!("connecting to IDE at {addr}");
        let stream = TcpStream::connect(addr)?;
        Ok(Self::new(stream))
    }
}

impl<S> RemoteSink<S> {
    /// Creates a sink over an established stream.
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Consumes the sink, returning the stream.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: Read> RemoteSink<S> {
    /// Reads one message sent by the IDE.
    pub fn receive(&mut self) -> Result<Message, ProtocolError> {
        let json = read_framed(&mut self.stream)?;
        Ok(Message::from_json(&json)?)
    }

    /// Announces that the runner is waiting, then reads the IDE's
    /// `TestRunner.Execute` command and returns the tests it selects.
    pub fn wait_for_tests(&mut self) -> Result<Vec<String>, ProtocolError>
    where
        S: Write,
    {
        self.send_waiting_command().map_err(|error| match error {
            WriteEventError::Io(error) => ProtocolError::Io(error),
            WriteEventError::Json(error) => ProtocolError::Encode(error),
        })?;
        let message = self.receive()?;
        let command: RunTestsMessage = message.decode_payload(MessageType::EXECUTE)?;
        debug!("IDE selected {} tests", command.tests.len());
        Ok(command.tests)
    }
}

impl<S: Write> TestSink for RemoteSink<S> {
    fn send_message(&mut self, message: &Message) -> Result<(), WriteEventError> {
        let json = message.to_json().map_err(WriteEventError::Json)?;
        let mut buf = Vec::with_capacity(json.len() + 5);
        write_framed(&mut buf, &json).map_err(WriteEventError::Io)?;
        self.stream.write_all(&buf).map_err(WriteEventError::Io)?;
        self.stream.flush().map_err(WriteEventError::Io)
    }
}

/// Writes a string prefixed by its UTF-8 length in 7-bit groups, low group
/// first, with the high bit set on all but the last byte.
pub fn write_framed(writer: &mut impl Write, s: &str) -> io::Result<()> {
    let mut len = s.len();
    let mut prefix = Vec::with_capacity(5);
    while len >= 0x80 {
        prefix.push((len as u8 & 0x7f) | 0x80);
        len >>= 7;
    }
    prefix.push(len as u8);
    writer.write_all(&prefix)?;
    writer.write_all(s.as_bytes())
}

/// The largest message [`read_framed`] accepts.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Reads a string written by [`write_framed`].
///
/// Prefixes announcing more than [`MAX_FRAME_LEN`] bytes are rejected before
/// anything is allocated.
pub fn read_framed(reader: &mut impl Read) -> Result<String, ProtocolError> {
    let mut len: usize = 0;
    let mut shift = 0;
    loop {
        if shift >= 35 {
            return Err(ProtocolError::InvalidLength);
        }
        let mut byte = [0u8; 1];
        reader.read_exact(&mut byte)?;
        len |= usize::from(byte[0] & 0x7f) << shift;
        if byte[0] & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(String::from_utf8(buf)?)
}
