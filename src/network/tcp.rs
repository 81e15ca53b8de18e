//! TCP transport: one request per accepted connection.

use std::io::ErrorKind;
use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use crate::dispatcher::CommandDispatcher;
use crate::error::RcsResult;
use crate::network::decode_request;

/// Stream listener: one request per connection, no concurrent clients
pub struct TcpServer {
    listener: TcpListener,
    dispatcher: CommandDispatcher,
    buffer_size: usize,
}

impl TcpServer {
    /// Bind the listener, mapping failures to `RcsError::Transport`
    pub async fn bind(
        addr: &str,
        dispatcher: CommandDispatcher,
        buffer_size: usize,
    ) -> RcsResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("TCP server listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            dispatcher,
            buffer_size,
        })
    }

    /// Bound address
    pub fn local_addr(&self) -> RcsResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until `shutdown` changes or its sender is dropped
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            let accepted = tokio::select! {
                result = self.listener.accept() => result,
                _ = shutdown.changed() => {
                    tracing::info!("TCP server shutting down");
                    break;
                }
            };

            match accepted {
                Ok((stream, peer)) => {
                    if let Err(e) = self.handle_client(stream, peer).await {
                        tracing::warn!("Client {} error: {}", peer, e);
                    }
                }
                Err(e) => tracing::error!("Accept error: {}", e),
            }
        }
    }

    async fn handle_client(&self, mut stream: TcpStream, peer: SocketAddr) -> std::io::Result<()> {
        let request = read_request(&mut stream, self.buffer_size).await?;
        tracing::debug!(%peer, request = request.as_str(), "TCP request");

        let reply = self.dispatcher.execute(&request).await;
        stream.write_all(reply.as_bytes()).await?;
        stream.shutdown().await
    }
}

/// Block for the first chunk, then drain whatever else is already buffered
async fn read_request(stream: &mut TcpStream, buffer_size: usize) -> std::io::Result<String> {
    let mut buf = vec![0u8; buffer_size];
    let mut data = Vec::new();

    let n = stream.read(&mut buf).await?;
    data.extend_from_slice(&buf[..n]);

    if n > 0 {
        loop {
            match stream.try_read(&mut buf) {
                Ok(0) => break,
                Ok(n) => data.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => return Err(e),
            }
        }
    }

    Ok(decode_request(&data))
}
