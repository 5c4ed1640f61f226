//! End-to-end tests over loopback
//!
//! Each test binds a proxy on an ephemeral port, points it at a local origin and talks to
//! it with plain TCP clients.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use conn_proxy::config::ConfigValues;
use conn_proxy::proxy::{Counters, RegistryHandle, CONNECT_ESTABLISHED, DENY_RESPONSE};
use conn_proxy::{Proxy, ProxyConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::task::JoinHandle;

struct Running {
    addr: SocketAddr,
    counters: Arc<Counters>,
    registry: RegistryHandle,
    task: JoinHandle<conn_proxy::Result<()>>,
}

impl Drop for Running {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn start_proxy(values: ConfigValues) -> Running {
    let mut config = ProxyConfig::from_values(ConfigValues {
        host: Some("127.0.0.1".to_string()),
        port: Some(0),
        ..values
    });
    config.set_default_values();

    let proxy = Proxy::bind(Arc::new(config)).await.unwrap();
    Running {
        addr: proxy.local_addr().unwrap(),
        counters: proxy.stats(),
        registry: proxy.registry(),
        task: tokio::spawn(proxy.run()),
    }
}

/// Origin that echoes every byte back on every connection
async fn echo_origin() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = stream.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });
    addr
}

async fn read_exactly(stream: &mut TcpStream, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    tokio::time::timeout(Duration::from_secs(5), stream.read_exact(&mut buf))
        .await
        .expect("timed out reading from proxy")
        .unwrap();
    buf
}

/// Read until the peer closes; a reset counts as closed
async fn read_until_closed(stream: &mut TcpStream) -> Vec<u8> {
    let mut received = Vec::new();
    let _ = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut received))
        .await
        .expect("peer never closed");
    received
}

async fn wait_for_idle(proxy: &Running) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if proxy.counters.in_flight() == 0 && proxy.registry.snapshot().await.is_empty() {
            return;
        }
        assert!(Instant::now() < deadline, "connections were not torn down");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_connect_tunnel() {
    let origin = echo_origin().await;
    let proxy = start_proxy(ConfigValues::default()).await;

    let mut client = TcpStream::connect(proxy.addr).await.unwrap();
    let request = format!("CONNECT {} HTTP/1.1\r\nHost: {}\r\n\r\n", origin, origin);
    client.write_all(request.as_bytes()).await.unwrap();

    let banner = read_exactly(&mut client, CONNECT_ESTABLISHED.len()).await;
    assert_eq!(banner, CONNECT_ESTABLISHED);

    client.write_all(b"\x16\x03\x01tunnel bytes").await.unwrap();
    assert_eq!(read_exactly(&mut client, 15).await, b"\x16\x03\x01tunnel bytes");

    assert_eq!(proxy.counters.total_accepted(), 1);
    assert_eq!(proxy.counters.in_flight(), 1);

    drop(client);
    wait_for_idle(&proxy).await;
}

#[tokio::test]
async fn test_plain_request_forwarded_verbatim() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let origin = listener.local_addr().unwrap();
    let request = format!(
        "GET http://{}/path?q=1 HTTP/1.1\r\nHost: {}\r\nX-Odd-Header:  spaced value \r\n\r\n",
        origin, origin
    );

    let expected = request.clone();
    let origin_task = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut received = vec![0u8; expected.len()];
        stream.read_exact(&mut received).await.unwrap();
        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok")
            .await
            .unwrap();
        stream.shutdown().await.unwrap();
        received
    });

    let proxy = start_proxy(ConfigValues::default()).await;
    let mut client = TcpStream::connect(proxy.addr).await.unwrap();
    client.write_all(request.as_bytes()).await.unwrap();

    let response = read_until_closed(&mut client).await;
    assert!(response.starts_with(b"HTTP/1.1 200 OK"));
    assert!(response.ends_with(b"ok"));

    assert_eq!(origin_task.await.unwrap(), request.as_bytes());
    drop(client);
    wait_for_idle(&proxy).await;
}

#[tokio::test]
async fn test_pass_through_relays_arbitrary_bytes() {
    let origin = echo_origin().await;
    let proxy = start_proxy(ConfigValues {
        pass_proxy: Some(origin.to_string()),
        ..Default::default()
    })
    .await;

    let mut client = TcpStream::connect(proxy.addr).await.unwrap();
    let payload = [0x00u8, 0x01, 0xfe, 0xff, b'\r', b'\n', b'\r', b'\n'];
    client.write_all(&payload).await.unwrap();
    assert_eq!(read_exactly(&mut client, payload.len()).await, payload);

    drop(client);
    wait_for_idle(&proxy).await;
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_disallowed_client_gets_exact_403() {
    let proxy = start_proxy(ConfigValues {
        allow_ip: Some("10.1.1.1".to_string()),
        ..Default::default()
    })
    .await;

    // Any 127/8 address is local on Linux, but only the loopback literals are allowed
    let socket = TcpSocket::new_v4().unwrap();
    socket.bind("127.0.0.2:0".parse().unwrap()).unwrap();
    let mut client = socket.connect(proxy.addr).await.unwrap();

    assert_eq!(read_until_closed(&mut client).await, DENY_RESPONSE);
    assert_eq!(proxy.counters.total_accepted(), 0);
    assert!(proxy.registry.snapshot().await.is_empty());
}

#[tokio::test]
async fn test_saturated_proxy_drops_waiting_arrival() {
    let origin = echo_origin().await;
    let proxy = start_proxy(ConfigValues {
        max_connections: Some(1),
        timeout: Some(2),
        ..Default::default()
    })
    .await;

    // First connection holds the only slot
    let mut first = TcpStream::connect(proxy.addr).await.unwrap();
    let request = format!("CONNECT {} HTTP/1.1\r\n\r\n", origin);
    first.write_all(request.as_bytes()).await.unwrap();
    read_exactly(&mut first, CONNECT_ESTABLISHED.len()).await;

    // Second waits half the timeout for a slot, then is closed without a byte
    let started = Instant::now();
    let mut second = TcpStream::connect(proxy.addr).await.unwrap();
    let _ = second.write_all(request.as_bytes()).await;
    let received = read_until_closed(&mut second).await;
    let waited = started.elapsed();

    assert!(received.is_empty());
    assert!(waited >= Duration::from_millis(800), "closed too early: {:?}", waited);
    assert!(waited < Duration::from_millis(1900), "closed too late: {:?}", waited);
    assert!(proxy.counters.in_flight() <= 1);

    drop(first);
    wait_for_idle(&proxy).await;
}

#[tokio::test]
async fn test_connection_deadline_is_not_extended_by_traffic() {
    let origin = echo_origin().await;
    let proxy = start_proxy(ConfigValues {
        timeout: Some(2),
        ..Default::default()
    })
    .await;

    let mut client = TcpStream::connect(proxy.addr).await.unwrap();
    let request = format!("CONNECT {} HTTP/1.1\r\n\r\n", origin);
    client.write_all(request.as_bytes()).await.unwrap();
    read_exactly(&mut client, CONNECT_ESTABLISHED.len()).await;

    let started = Instant::now();
    let mut buf = [0u8; 4];
    loop {
        if client.write_all(b"tick").await.is_err() {
            break;
        }
        match tokio::time::timeout(Duration::from_secs(3), client.read(&mut buf)).await {
            Ok(Ok(n)) if n > 0 => {}
            _ => break,
        }
        assert!(started.elapsed() < Duration::from_secs(4), "busy tunnel outlived its deadline");
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    assert!(started.elapsed() < Duration::from_secs(4));
    wait_for_idle(&proxy).await;
}

#[tokio::test]
async fn test_malformed_client_does_not_affect_others() {
    let origin = echo_origin().await;
    let proxy = start_proxy(ConfigValues::default()).await;

    let mut bad = TcpStream::connect(proxy.addr).await.unwrap();
    bad.write_all(b"\x16\x03\x01\x00\xa5\x01\x00\x00\xa1\x03\x03\r\n\r\n")
        .await
        .unwrap();
    assert!(read_until_closed(&mut bad).await.is_empty());

    let mut good = TcpStream::connect(proxy.addr).await.unwrap();
    let request = format!("CONNECT {} HTTP/1.1\r\n\r\n", origin);
    good.write_all(request.as_bytes()).await.unwrap();
    assert_eq!(read_exactly(&mut good, CONNECT_ESTABLISHED.len()).await, CONNECT_ESTABLISHED);

    good.write_all(b"still works").await.unwrap();
    assert_eq!(read_exactly(&mut good, 11).await, b"still works");

    drop(good);
    wait_for_idle(&proxy).await;
    assert_eq!(proxy.counters.total_accepted(), 2);
}

#[tokio::test]
async fn test_unreachable_origin_closes_client() {
    // Bind then drop to get a port with nothing listening
    let closed = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();
    let proxy = start_proxy(ConfigValues::default()).await;

    let mut client = TcpStream::connect(proxy.addr).await.unwrap();
    let request = format!("CONNECT {} HTTP/1.1\r\n\r\n", closed);
    client.write_all(request.as_bytes()).await.unwrap();

    assert!(read_until_closed(&mut client).await.is_empty());
    wait_for_idle(&proxy).await;
}

#[tokio::test]
async fn test_many_connections_all_torn_down() {
    let origin = echo_origin().await;
    let proxy = start_proxy(ConfigValues {
        max_connections: Some(4),
        ..Default::default()
    })
    .await;

    let mut clients = Vec::new();
    for i in 0..12u8 {
        let addr = proxy.addr;
        clients.push(tokio::spawn(async move {
            let mut client = TcpStream::connect(addr).await.unwrap();
            let request = format!("CONNECT {} HTTP/1.1\r\n\r\n", origin);
            client.write_all(request.as_bytes()).await.unwrap();
            read_exactly(&mut client, CONNECT_ESTABLISHED.len()).await;
            client.write_all(&[i; 8]).await.unwrap();
            assert_eq!(read_exactly(&mut client, 8).await, [i; 8]);
        }));
    }
    for client in clients {
        client.await.unwrap();
    }

    wait_for_idle(&proxy).await;
    assert_eq!(proxy.counters.total_accepted(), 12);
}
