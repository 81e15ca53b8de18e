//! Socket round-trip tests for the UDP and TCP listeners
//!
//! Each test binds an ephemeral port on localhost, serves against the mock
//! instrument, and talks to it through the one-shot client.

use rust_rcs::config::{ServerConfig, TransportMode};
use rust_rcs::context::ServerContext;
use rust_rcs::dispatcher::CommandDispatcher;
use rust_rcs::hardware::mock::{MockInstrument, MockTuneStore};
use rust_rcs::network::{send_command, TcpServer, UdpServer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const WAIT: Duration = Duration::from_secs(5);

fn dispatcher(instrument: &MockInstrument) -> CommandDispatcher {
    let context = ServerContext::new(
        ServerConfig::default(),
        Arc::new(instrument.clone()),
        Arc::new(MockTuneStore::sample()),
    );
    CommandDispatcher::new(Arc::new(context))
}

// =============================================================================
// UDP
// =============================================================================

#[tokio::test]
async fn test_udp_request_reply() {
    let instrument = MockInstrument::argus();
    let server = UdpServer::bind("127.0.0.1:0", dispatcher(&instrument), 1024)
        .await
        .unwrap();
    let addr = server.local_addr().unwrap().to_string();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(server.run(shutdown_rx));

    let reply = send_command(&addr, TransportMode::Udp, "GetTrapVoltage", WAIT)
        .await
        .unwrap();
    assert_eq!(reply, "120.3");

    let reply = send_command(&addr, TransportMode::Udp, "SetTrapVoltage 121\n", WAIT)
        .await
        .unwrap();
    assert_eq!(reply, "OK");
    assert_eq!(instrument.value("Trap Voltage Set"), Some(121.0));

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_udp_keeps_serving_after_invalid_command() {
    let instrument = MockInstrument::argus();
    let server = UdpServer::bind("127.0.0.1:0", dispatcher(&instrument), 1024)
        .await
        .unwrap();
    let addr = server.local_addr().unwrap().to_string();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(server.run(shutdown_rx));

    let reply = send_command(&addr, TransportMode::Udp, "FooBar 1", WAIT)
        .await
        .unwrap();
    assert_eq!(reply, "Error: Invalid Command");

    let reply = send_command(&addr, TransportMode::Udp, "GetMagnetDAC", WAIT)
        .await
        .unwrap();
    assert_eq!(reply, "4.5");

    drop(shutdown_tx);
    handle.await.unwrap();
}

// =============================================================================
// TCP
// =============================================================================

#[tokio::test]
async fn test_tcp_one_request_per_connection() {
    let instrument = MockInstrument::argus();
    let server = TcpServer::bind("127.0.0.1:0", dispatcher(&instrument), 1024)
        .await
        .unwrap();
    let addr = server.local_addr().unwrap().to_string();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(server.run(shutdown_rx));

    let reply = send_command(&addr, TransportMode::Tcp, "GetCupConfigurationList", WAIT)
        .await
        .unwrap();
    assert_eq!(reply, "Argon\rHelium");

    let reply = send_command(&addr, TransportMode::Tcp, "SetSubCupConfiguration Ar36", WAIT)
        .await
        .unwrap();
    assert_eq!(reply, "OK");

    let reply = send_command(&addr, TransportMode::Tcp, "GetActiveSubCupConfiguration", WAIT)
        .await
        .unwrap();
    assert_eq!(reply, "Ar36");

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_bind_conflict_is_transport_error() {
    let instrument = MockInstrument::argus();
    let first = TcpServer::bind("127.0.0.1:0", dispatcher(&instrument), 1024)
        .await
        .unwrap();
    let addr = first.local_addr().unwrap().to_string();

    let second = TcpServer::bind(&addr, dispatcher(&instrument), 1024).await;
    assert!(matches!(
        second,
        Err(rust_rcs::error::RcsError::Transport(_))
    ));
}
