//! Frame transport used by the ATT client

use async_trait::async_trait;
use std::io;

/// A connected, frame-oriented link to a single peer
///
/// The ATT client owns its transport exclusively; nothing else may read or
/// write frames on the same link.
#[async_trait]
pub trait AttTransport: Send + 'static {
    /// Receive one whole frame
    ///
    /// Must be cancel safe: the client selects over this future and may drop
    /// it before completion without losing a frame.
    async fn read_frame(&mut self) -> io::Result<Vec<u8>>;

    /// Send one whole frame, returning the number of bytes written
    async fn write_frame(&mut self, frame: &[u8]) -> io::Result<usize>;

    /// Shut the link down
    async fn close(&mut self) -> io::Result<()>;
}
