//! Transport Listener
//!
//! Binds the configured socket and feeds each request to the
//! [`CommandDispatcher`]. UDP and TCP are mutually exclusive modes:
//!
//! - **UDP**: one datagram in, one datagram back to the sender.
//! - **TCP**: one request per connection. Accept, read what the client sent,
//!   reply, close.
//!
//! Requests are serviced strictly one at a time in arrival order. Per-request
//! I/O failures are logged and the loop keeps going; only bind failures are
//! fatal. A `watch` channel stops the loop between requests.

pub mod client;
pub mod tcp;
pub mod udp;

use tokio::sync::watch;

use crate::config::{TransportConfig, TransportMode};
use crate::dispatcher::CommandDispatcher;
use crate::error::RcsResult;

pub use client::send_command;
pub use tcp::TcpServer;
pub use udp::UdpServer;

/// Bind the listener selected by `config.mode` and serve until `shutdown`
/// fires or its sender is dropped.
pub async fn serve(
    config: &TransportConfig,
    dispatcher: CommandDispatcher,
    shutdown: watch::Receiver<bool>,
) -> RcsResult<()> {
    let addr = config.socket_addr();
    match config.mode {
        TransportMode::Udp => {
            UdpServer::bind(&addr, dispatcher, config.buffer_size)
                .await?
                .run(shutdown)
                .await
        }
        TransportMode::Tcp => {
            TcpServer::bind(&addr, dispatcher, config.buffer_size)
                .await?
                .run(shutdown)
                .await
        }
    }
    Ok(())
}

/// Decode a raw request the way every transport does: lossy UTF-8, trimmed
pub(crate) fn decode_request(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_trims_and_replaces_invalid_utf8() {
        assert_eq!(decode_request(b"  GetData\r\n"), "GetData");
        assert_eq!(decode_request(b"Get\xffData"), "Get\u{fffd}Data");
        assert_eq!(decode_request(b""), "");
    }
}
