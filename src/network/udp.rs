//! UDP transport: one request per datagram.

use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tokio::sync::watch;

use crate::dispatcher::CommandDispatcher;
use crate::error::RcsResult;
use crate::network::decode_request;

/// Datagram listener: one request per datagram, reply sent to the sender
pub struct UdpServer {
    socket: UdpSocket,
    dispatcher: CommandDispatcher,
    buffer_size: usize,
}

impl UdpServer {
    /// Bind the socket, mapping failures to `RcsError::Transport`
    pub async fn bind(
        addr: &str,
        dispatcher: CommandDispatcher,
        buffer_size: usize,
    ) -> RcsResult<Self> {
        let socket = UdpSocket::bind(addr).await?;
        tracing::info!("UDP server listening on {}", socket.local_addr()?);
        Ok(Self {
            socket,
            dispatcher,
            buffer_size,
        })
    }

    /// Bound address
    pub fn local_addr(&self) -> RcsResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Serve until `shutdown` changes or its sender is dropped
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut buf = vec![0u8; self.buffer_size];

        loop {
            let received = tokio::select! {
                result = self.socket.recv_from(&mut buf) => result,
                _ = shutdown.changed() => {
                    tracing::info!("UDP server shutting down");
                    break;
                }
            };

            let (n, peer) = match received {
                Ok(received) => received,
                Err(e) => {
                    tracing::warn!("UDP receive error: {}", e);
                    continue;
                }
            };

            let request = decode_request(&buf[..n]);
            tracing::debug!(%peer, request = request.as_str(), "UDP request");
            let reply = self.dispatcher.execute(&request).await;

            if let Err(e) = self.socket.send_to(reply.as_bytes(), peer).await {
                tracing::warn!("UDP send to {} failed: {}", peer, e);
            }
        }
    }
}
