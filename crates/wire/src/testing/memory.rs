//! A transport over in-memory pipes.

use tokio::io::{DuplexStream, duplex};

use crate::transport::Transport;

/// Both ends of a debuggee connection, in memory.
///
/// Bytes written on one end of a [`MemoryTransport::pair`] are read on the
/// other. Dropping an end, or shutting down its write half, reads as EOF on
/// the peer.
///
/// ```
/// use wire::testing::MemoryTransport;
/// use wire::split;
///
/// let (client, debuggee) = MemoryTransport::pair();
/// let (client_reader, client_writer) = split(client);
/// let (debuggee_reader, debuggee_writer) = split(debuggee);
/// ```
#[derive(Debug)]
pub struct MemoryTransport {
    inbound: DuplexStream,
    outbound: DuplexStream,
}

impl MemoryTransport {
    /// A connected pair with 64 KiB buffered in each direction.
    pub fn pair() -> (Self, Self) {
        Self::pair_with_capacity(64 * 1024)
    }

    /// A connected pair buffering at most `capacity` bytes per direction;
    /// writers wait once the peer falls that far behind.
    pub fn pair_with_capacity(capacity: usize) -> (Self, Self) {
        let (client_out, debuggee_in) = duplex(capacity);
        let (debuggee_out, client_in) = duplex(capacity);
        (
            MemoryTransport {
                inbound: client_in,
                outbound: client_out,
            },
            MemoryTransport {
                inbound: debuggee_in,
                outbound: debuggee_out,
            },
        )
    }
}

impl Transport for MemoryTransport {
    type Read = DuplexStream;
    type Write = DuplexStream;

    fn into_split(self) -> (Self::Read, Self::Write) {
        (self.inbound, self.outbound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::ProtocolFrame;
    use crate::split;
    use futures::StreamExt;

    #[tokio::test]
    async fn memory_transport_roundtrip() {
        let (client, debuggee) = MemoryTransport::pair();

        let (mut client_reader, mut client_writer) = split(client);
        let (mut debuggee_reader, mut debuggee_writer) = split(debuggee);

        client_writer
            .send(ProtocolFrame::new(501, 1, "1.1\tLINUX\tID"))
            .await
            .unwrap();
        let frame = debuggee_reader.next().await.unwrap().unwrap();
        assert_eq!(frame.payload(), "1.1\tLINUX\tID");

        debuggee_writer
            .send(ProtocolFrame::new(501, 1, "3.9"))
            .await
            .unwrap();
        let frame = client_reader.next().await.unwrap().unwrap();
        assert_eq!(frame.payload(), "3.9");
    }

    #[tokio::test]
    async fn memory_transport_close_signals_eof() {
        let (client, debuggee) = MemoryTransport::pair();

        let (_client_reader, client_writer) = split(client);
        let (mut debuggee_reader, _debuggee_writer) = split(debuggee);

        drop(client_writer);

        assert!(debuggee_reader.next().await.is_none());
    }
}
