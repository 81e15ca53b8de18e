//! One-shot client used by the `send` subcommand and the socket tests.

use std::io::{Error, ErrorKind};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;

use crate::config::TransportMode;
use crate::error::{RcsError, RcsResult};

const MAX_REPLY_LEN: usize = 65_507;

/// Send one command to a running server and return its reply line
pub async fn send_command(
    addr: &str,
    mode: TransportMode,
    command: &str,
    wait: Duration,
) -> RcsResult<String> {
    let exchange = async {
        match mode {
            TransportMode::Udp => send_udp(addr, command).await,
            TransportMode::Tcp => send_tcp(addr, command).await,
        }
    };

    match timeout(wait, exchange).await {
        Ok(result) => result.map_err(RcsError::from),
        Err(_) => Err(RcsError::Transport(Error::new(
            ErrorKind::TimedOut,
            format!("no reply from {addr} within {wait:?}"),
        ))),
    }
}

async fn send_udp(addr: &str, command: &str) -> std::io::Result<String> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.connect(addr).await?;
    socket.send(command.as_bytes()).await?;

    let mut buf = vec![0u8; MAX_REPLY_LEN];
    let n = socket.recv(&mut buf).await?;
    Ok(String::from_utf8_lossy(&buf[..n]).into_owned())
}

async fn send_tcp(addr: &str, command: &str) -> std::io::Result<String> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(command.as_bytes()).await?;

    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).await?;
    Ok(String::from_utf8_lossy(&reply).into_owned())
}
