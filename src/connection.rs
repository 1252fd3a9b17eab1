// ABOUTME: Provides framed SMPP v3.4 I/O over any async byte stream (TCP in production)
// ABOUTME: Splits into independent reader/writer halves so a read loop and senders can run concurrently

use crate::codec::{CodecError, Encodable, Frame};
use bytes::{Buf, BytesMut};
use std::io::{self, Cursor};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter, ReadHalf, WriteHalf};
use tokio::net::TcpStream;

/// SMPP v3.4 Connection Management
///
/// Handles frame-based communication for an SMPP session. The transport is
/// generic so the same code runs over a `TcpStream` or an in-memory duplex
/// pipe.
///
/// ## Session States (SMPP v3.4 Section 2.1)
///
/// ```text
/// CLOSED → OPEN → BOUND_TX/BOUND_RX/BOUND_TRX → UNBOUND → CLOSED
/// ```
///
/// This type only moves PDUs. It does not track the session state; the
/// client's `Link` performs the bind and decides which PDUs are legal.
///
/// Once bound, a connection is usually turned into a [`FrameReader`] owned by
/// the read loop and a [`FrameWriter`] shared by everyone who sends.
#[derive(Debug)]
pub struct Connection<S = TcpStream> {
    reader: FrameReader<ReadHalf<S>>,
    writer: FrameWriter<WriteHalf<S>>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite,
{
    /// Create a new `Connection`, backed by `socket`. Read and write buffers
    /// are initialized.
    pub fn new(socket: S) -> Connection<S> {
        let (read, write) = tokio::io::split(socket);
        Connection {
            reader: FrameReader::new(read),
            writer: FrameWriter::new(write),
        }
    }

    /// Read a single `Frame` value from the underlying stream.
    ///
    /// Returns `None` when the peer closed the stream on a PDU boundary.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, CodecError> {
        self.reader.read_frame().await
    }

    /// Write a single PDU (or a whole `Frame`) and flush it.
    pub async fn write_frame<P>(&mut self, pdu: &P) -> Result<(), CodecError>
    where
        P: Encodable + ?Sized,
    {
        self.writer.write_frame(pdu).await
    }

    /// Flush and shut down the write direction of the stream.
    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.writer.shutdown().await
    }

    /// Hand the two directions to separate owners.
    pub fn into_split(self) -> (FrameReader<ReadHalf<S>>, FrameWriter<WriteHalf<S>>) {
        (self.reader, self.writer)
    }
}

/// Read direction of a connection.
#[derive(Debug)]
pub struct FrameReader<R> {
    stream: R,

    // The buffer for reading frames.
    buffer: BytesMut,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(stream: R) -> FrameReader<R> {
        FrameReader {
            stream,
            // PDUs exchanged by the gateway are small; 4KB holds many of them.
            buffer: BytesMut::with_capacity(4 * 1024),
        }
    }

    /// Read a single `Frame` value from the underlying stream.
    ///
    /// The function waits until it has retrieved enough data to parse a frame.
    /// Any data remaining in the read buffer after the frame has been parsed is
    /// kept there for the next call to `read_frame`.
    ///
    /// # Returns
    ///
    /// On success, the received frame is returned. If the stream is closed in
    /// a way that doesn't break a frame in half, it returns `None`. Otherwise,
    /// an error is returned.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, CodecError> {
        loop {
            // Attempt to parse a frame from the buffered data. If enough data
            // has been buffered, the frame is returned.
            if let Some(frame) = self.parse_frame()? {
                return Ok(Some(frame));
            }

            // `0` indicates "end of stream".
            if 0 == self.stream.read_buf(&mut self.buffer).await? {
                // The remote closed the connection. For this to be a clean
                // shutdown, there should be no data in the read buffer. If
                // there is, this means that the peer closed the socket while
                // sending a frame.
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(CodecError::Io(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "connection reset by peer",
                )));
            }
        }
    }

    /// Tries to parse a frame from the buffer. If the buffer contains enough
    /// data, the frame is returned and the data removed from the buffer. If not
    /// enough data has been buffered yet, `Ok(None)` is returned. If the
    /// buffered data does not represent a valid frame, `Err` is returned.
    fn parse_frame(&mut self) -> Result<Option<Frame>, CodecError> {
        let mut buf = Cursor::new(&self.buffer[..]);

        // Checking is much cheaper than a full parse and tells us the PDU
        // length up front.
        match Frame::check(&mut buf) {
            Ok(len) => {
                // If the encoded frame representation is invalid, an error is
                // returned. This should terminate the **current** connection
                // but should not impact any other connection.
                let frame = Frame::parse(&mut buf)?;

                // Discard the parsed data from the read buffer.
                self.buffer.advance(len);

                Ok(Some(frame))
            }
            // Not enough data for a whole PDU yet; an expected runtime
            // condition, not an error.
            Err(CodecError::Incomplete) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Write direction of a connection.
#[derive(Debug)]
pub struct FrameWriter<W> {
    // Decorated with a `BufWriter` so each PDU leaves in one write call.
    stream: BufWriter<W>,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(stream: W) -> FrameWriter<W> {
        FrameWriter {
            stream: BufWriter::new(stream),
        }
    }

    /// Write a single PDU value to the underlying stream.
    ///
    /// The PDU is encoded in full before anything is written, so an encoding
    /// error never leaves half a PDU on the wire. Calling `flush` writes the
    /// remaining contents of the buffer to the socket.
    pub async fn write_frame<P>(&mut self, pdu: &P) -> Result<(), CodecError>
    where
        P: Encodable + ?Sized,
    {
        let bytes = pdu.to_bytes()?;
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.stream.shutdown().await
    }
}
