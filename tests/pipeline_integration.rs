//! End-to-end tests driving `Pipeline` over a real loopback TCP socket and
//! `Config` against a file on disk, exercising the same seams the headless
//! binary drives in production rather than poking at individual collaborators.

use std::io::Write as _;
use std::sync::Arc;

use mudcore::connection::ConnectionState;
use mudcore::status::StatusHub;
use mudcore::Pipeline;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

async fn loopback_server() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

#[tokio::test]
async fn connect_pump_and_disconnect_drive_connection_state() {
    let (listener, port) = loopback_server().await;
    let server = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 64];
        let _ = sock.read(&mut buf).await; // drain initial telnet negotiation
        sock.write_all(b"Welcome to the realm!\r\n").await.unwrap();
        // keep the socket open until the client drops it
        let mut idle = [0u8; 1];
        let _ = sock.read(&mut idle).await;
    });

    let status = Arc::new(StatusHub::new());
    let mut state_rx = status.subscribe_connection_state();
    let mut pipeline = Pipeline::new("utf-8", Arc::clone(&status));

    pipeline.connect("127.0.0.1", port).await.unwrap();
    assert_eq!(pipeline.state(), ConnectionState::Connected);
    assert!(state_rx.has_changed().unwrap());
    assert_eq!(*state_rx.borrow_and_update(), ConnectionState::Connected);

    assert!(pipeline.pump().await.unwrap());
    let main = pipeline.tabs().tab("main").unwrap();
    assert!(main.content().iter().any(|l| l.clean.contains("Welcome to the realm!")));
    assert!(main.content().iter().any(|l| l.clean.contains("[connected to 127.0.0.1")));

    pipeline.disconnect();
    assert_eq!(pipeline.state(), ConnectionState::Disconnected);
    assert!(state_rx.has_changed().unwrap());
    assert_eq!(*state_rx.borrow_and_update(), ConnectionState::Disconnected);

    drop(pipeline);
    server.await.unwrap();
}

#[tokio::test]
async fn pump_returns_false_and_disconnects_on_server_eof() {
    let (listener, port) = loopback_server().await;
    let server = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 64];
        let _ = sock.read(&mut buf).await;
        // close immediately, no data
    });

    let status = Arc::new(StatusHub::new());
    let mut pipeline = Pipeline::new("utf-8", status);
    pipeline.connect("127.0.0.1", port).await.unwrap();

    assert!(!pipeline.pump().await.unwrap());
    assert_eq!(pipeline.state(), ConnectionState::Disconnected);
    server.await.unwrap();
}

#[tokio::test]
async fn server_line_fires_trigger_which_sends_a_command_back() {
    let (listener, port) = loopback_server().await;
    let server = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let mut negotiation = [0u8; 64];
        let _ = sock.read(&mut negotiation).await;
        sock.write_all(b"An orc hits you!\r\n").await.unwrap();

        let mut buf = [0u8; 256];
        let n = sock.read(&mut buf).await.unwrap();
        String::from_utf8_lossy(&buf[..n]).to_string()
    });

    let status = Arc::new(StatusHub::new());
    let mut pipeline = Pipeline::new("utf-8", status);
    pipeline.connect("127.0.0.1", port).await.unwrap();

    let mut trigger = mudcore::triggers::Trigger::new(
        1,
        mudcore::pattern::Pattern::new(r"^An (\w+) hits you").unwrap(),
        10,
    );
    trigger.commands.push("flee".to_string());
    pipeline.triggers_mut().add(trigger);

    assert!(pipeline.pump().await.unwrap());
    pipeline.disconnect();

    let received = server.await.unwrap();
    assert!(received.contains("flee"));
}

#[tokio::test]
async fn config_loaded_from_disk_drives_alias_expansion_over_the_wire() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "aliases": [
                {{"id": 1, "pattern": "^k (\\w+)$", "commands": ["kill $1"]}}
            ],
            "variables": {{"greeting": "hello"}}
        }}"#
    )
    .unwrap();

    let (config, errors) = mudcore::config::Config::load_file(file.path()).unwrap();
    assert!(errors.is_empty(), "{errors:?}");

    let (listener, port) = loopback_server().await;
    let server = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let mut negotiation = [0u8; 64];
        let _ = sock.read(&mut negotiation).await;
        let mut buf = [0u8; 256];
        let n = sock.read(&mut buf).await.unwrap();
        String::from_utf8_lossy(&buf[..n]).to_string()
    });

    let status = Arc::new(StatusHub::new());
    let mut pipeline = Pipeline::from_config(config, "utf-8", status);
    pipeline.connect("127.0.0.1", port).await.unwrap();
    assert_eq!(pipeline.vars().get_str("greeting"), Some("hello".to_string()));

    pipeline.send_command("k orc").await.unwrap();
    pipeline.disconnect();

    let received = server.await.unwrap();
    assert!(received.contains("kill orc"));
}
