//! TCP connection decorator binding both directions of the record layer.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use shroud_core::{KeySource, ShroudError};
use tracing::debug;

use crate::reader::DecryptingReader;
use crate::writer::EncryptingWriter;

/// Shared shutdown flag: the first close wins, later calls are no-ops.
#[derive(Clone, Default)]
struct CloseGuard(Arc<AtomicBool>);

impl CloseGuard {
    fn close(&self, stream: &TcpStream) -> io::Result<()> {
        if self.0.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        debug!(peer = ?stream.peer_addr().ok(), "shutting down cipher channel");
        stream.shutdown(Shutdown::Both)
    }

    fn is_closed(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Encrypted view of a `TcpStream`.
///
/// Outgoing writes are sealed under the source's write key; incoming bytes
/// are verified and opened under its read key. Peers must hold mirrored
/// keys for traffic to flow.
///
/// The channel owns the stream. [`split`] breaks it into a reader half and
/// a writer half over the same socket, one per thread being the intended
/// shape. [`close`] (on the channel or either half) shuts the socket down
/// in both directions exactly once, which also unblocks a peer half parked
/// in a blocking read.
///
/// Socket configuration (timeouts, `TCP_NODELAY`, TTL) passes straight
/// through to the underlying stream. Nonblocking mode is deliberately not
/// exposed: a partial frame cannot be handed back mid-read, so the record
/// layer only makes sense over blocking sockets.
///
/// [`split`]: Self::split
/// [`close`]: Self::close
pub struct CipherChannel {
    reader: DecryptingReader<TcpStream>,
    writer: EncryptingWriter<TcpStream>,
    guard: CloseGuard,
}

impl CipherChannel {
    /// Wrap a connected stream with the default chunk limit.
    pub fn new<K: KeySource>(stream: TcpStream, keys: &K) -> Result<Self, ShroudError> {
        let read_half = stream.try_clone()?;
        debug!(
            peer = ?stream.peer_addr().ok(),
            write_key = %keys.write_key().fingerprint(),
            read_key = %keys.read_key().fingerprint(),
            "wrapping stream in cipher channel"
        );
        Ok(Self {
            reader: DecryptingReader::new(keys.read_key(), read_half),
            writer: EncryptingWriter::new(keys.write_key(), stream),
            guard: CloseGuard::default(),
        })
    }

    /// Wrap a connected stream, capping outgoing records at `chunk_limit`
    /// plaintext bytes. The limit shapes only this side's frames.
    pub fn with_chunk_limit<K: KeySource>(
        stream: TcpStream,
        keys: &K,
        chunk_limit: usize,
    ) -> Result<Self, ShroudError> {
        let read_half = stream.try_clone()?;
        Ok(Self {
            reader: DecryptingReader::new(keys.read_key(), read_half),
            writer: EncryptingWriter::with_chunk_limit(keys.write_key(), stream, chunk_limit)?,
            guard: CloseGuard::default(),
        })
    }

    /// Break the channel into independently owned halves.
    pub fn split(self) -> (ChannelReader, ChannelWriter) {
        let Self {
            reader,
            writer,
            guard,
        } = self;
        (
            ChannelReader {
                inner: reader,
                guard: guard.clone(),
            },
            ChannelWriter {
                inner: writer,
                guard,
            },
        )
    }

    /// Read a single plaintext byte, `None` at end of stream.
    pub fn read_byte(&mut self) -> io::Result<Option<u8>> {
        self.reader.read_byte()
    }

    /// Shut the connection down in both directions. Safe to call any number
    /// of times; only the first call touches the socket.
    pub fn close(&self) -> io::Result<()> {
        self.guard.close(self.stream())
    }

    pub fn is_closed(&self) -> bool {
        self.guard.is_closed()
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.stream().local_addr()
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream().peer_addr()
    }

    pub fn set_read_timeout(&self, dur: Option<Duration>) -> io::Result<()> {
        self.stream().set_read_timeout(dur)
    }

    pub fn read_timeout(&self) -> io::Result<Option<Duration>> {
        self.stream().read_timeout()
    }

    pub fn set_write_timeout(&self, dur: Option<Duration>) -> io::Result<()> {
        self.stream().set_write_timeout(dur)
    }

    pub fn write_timeout(&self) -> io::Result<Option<Duration>> {
        self.stream().write_timeout()
    }

    pub fn set_nodelay(&self, nodelay: bool) -> io::Result<()> {
        self.stream().set_nodelay(nodelay)
    }

    pub fn nodelay(&self) -> io::Result<bool> {
        self.stream().nodelay()
    }

    pub fn set_ttl(&self, ttl: u32) -> io::Result<()> {
        self.stream().set_ttl(ttl)
    }

    pub fn ttl(&self) -> io::Result<u32> {
        self.stream().ttl()
    }

    fn stream(&self) -> &TcpStream {
        self.reader.get_ref()
    }
}

impl Read for CipherChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl Write for CipherChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Reading half of a split [`CipherChannel`].
pub struct ChannelReader {
    inner: DecryptingReader<TcpStream>,
    guard: CloseGuard,
}

impl ChannelReader {
    pub fn read_byte(&mut self) -> io::Result<Option<u8>> {
        self.inner.read_byte()
    }

    /// Shuts down both directions of the shared socket; see
    /// [`CipherChannel::close`].
    pub fn close(&self) -> io::Result<()> {
        self.guard.close(self.inner.get_ref())
    }

    pub fn is_closed(&self) -> bool {
        self.guard.is_closed()
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.get_ref().local_addr()
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.inner.get_ref().peer_addr()
    }

    pub fn set_read_timeout(&self, dur: Option<Duration>) -> io::Result<()> {
        self.inner.get_ref().set_read_timeout(dur)
    }

    pub fn read_timeout(&self) -> io::Result<Option<Duration>> {
        self.inner.get_ref().read_timeout()
    }

    pub fn set_ttl(&self, ttl: u32) -> io::Result<()> {
        self.inner.get_ref().set_ttl(ttl)
    }

    pub fn ttl(&self) -> io::Result<u32> {
        self.inner.get_ref().ttl()
    }
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

/// Writing half of a split [`CipherChannel`].
pub struct ChannelWriter {
    inner: EncryptingWriter<TcpStream>,
    guard: CloseGuard,
}

impl ChannelWriter {
    /// Shuts down both directions of the shared socket; see
    /// [`CipherChannel::close`].
    pub fn close(&self) -> io::Result<()> {
        self.guard.close(self.inner.get_ref())
    }

    pub fn is_closed(&self) -> bool {
        self.guard.is_closed()
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.get_ref().local_addr()
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.inner.get_ref().peer_addr()
    }

    pub fn set_write_timeout(&self, dur: Option<Duration>) -> io::Result<()> {
        self.inner.get_ref().set_write_timeout(dur)
    }

    pub fn write_timeout(&self) -> io::Result<Option<Duration>> {
        self.inner.get_ref().write_timeout()
    }

    pub fn set_nodelay(&self, nodelay: bool) -> io::Result<()> {
        self.inner.get_ref().set_nodelay(nodelay)
    }

    pub fn nodelay(&self) -> io::Result<bool> {
        self.inner.get_ref().nodelay()
    }

    pub fn set_ttl(&self, ttl: u32) -> io::Result<()> {
        self.inner.get_ref().set_ttl(ttl)
    }

    pub fn ttl(&self) -> io::Result<u32> {
        self.inner.get_ref().ttl()
    }
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
