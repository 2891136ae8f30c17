use chat_relay::{ChatServer, ServerConfig, run_chat_server, session::WELCOME_PROMPT};
use std::{net::SocketAddr, time::Duration};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    time::{sleep, timeout},
};

async fn start_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        run_chat_server(listener).await;
    });

    sleep(Duration::from_millis(100)).await;
    addr
}

async fn read_prompt(stream: &mut TcpStream) {
    let mut prompt = vec![0u8; WELCOME_PROMPT.len()];
    timeout(Duration::from_secs(1), stream.read_exact(&mut prompt))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(prompt, WELCOME_PROMPT.as_bytes());
}

async fn join(addr: SocketAddr, name: &str) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    read_prompt(&mut stream).await;
    stream.write_all(name.as_bytes()).await.unwrap();
    sleep(Duration::from_millis(100)).await;
    stream
}

async fn expect(stream: &mut TcpStream, expected: &str) {
    let mut buffer = vec![0u8; expected.len()];
    timeout(Duration::from_secs(1), stream.read_exact(&mut buffer))
        .await
        .expect("timed out waiting for message")
        .unwrap();
    assert_eq!(String::from_utf8_lossy(&buffer), expected);
}

async fn expect_silence(stream: &mut TcpStream) {
    let mut buffer = [0u8; 256];
    let result = timeout(Duration::from_millis(300), stream.read(&mut buffer)).await;
    assert!(result.is_err(), "unexpected data: {:?}", result);
}

#[tokio::test]
async fn test_server_accepts_connections() {
    let addr = start_server().await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    read_prompt(&mut stream).await;
}

#[tokio::test]
async fn test_message_broadcast() {
    let addr = start_server().await;

    let mut ana = join(addr, "Ana").await;
    let mut leo = join(addr, "Leo").await;
    expect(&mut ana, "Leo joined the chat.\n").await;

    ana.write_all(b"hola\n").await.unwrap();

    expect(&mut leo, "Ana: hola\n").await;
    expect_silence(&mut ana).await;
}

#[tokio::test]
async fn test_sender_does_not_receive_own_message() {
    let addr = start_server().await;

    let mut client = join(addr, "Solo").await;
    client.write_all(b"Self message\n").await.unwrap();

    expect_silence(&mut client).await;
}

#[tokio::test]
async fn test_multiple_clients_receive_messages() {
    let addr = start_server().await;

    let mut sender = join(addr, "Sender").await;
    let mut receiver1 = join(addr, "R1").await;
    let mut receiver2 = join(addr, "R2").await;
    expect(&mut sender, "R1 joined the chat.\n").await;
    expect(&mut sender, "R2 joined the chat.\n").await;
    expect(&mut receiver1, "R2 joined the chat.\n").await;

    sender.write_all(b"Broadcast message\n").await.unwrap();

    expect(&mut receiver1, "Sender: Broadcast message\n").await;
    expect(&mut receiver2, "Sender: Broadcast message\n").await;
    expect_silence(&mut sender).await;
}

#[tokio::test]
async fn test_chunk_without_newline_is_terminated() {
    let addr = start_server().await;

    let mut ana = join(addr, "Ana").await;
    let mut leo = join(addr, "Leo").await;
    expect(&mut ana, "Leo joined the chat.\n").await;

    leo.write_all(b"no newline").await.unwrap();
    expect(&mut ana, "Leo: no newline\n").await;
}

#[tokio::test]
async fn test_invalid_utf8_is_replaced() {
    let addr = start_server().await;

    let mut ana = join(addr, "Ana").await;
    let mut leo = join(addr, "Leo").await;
    expect(&mut ana, "Leo joined the chat.\n").await;

    ana.write_all(b"\xffok\n").await.unwrap();
    expect(&mut leo, "Ana: \u{FFFD}ok\n").await;
}

#[tokio::test]
async fn test_name_is_trimmed() {
    let addr = start_server().await;

    let mut ana = join(addr, "Ana").await;
    let _leo = join(addr, "  Leo \r\n").await;

    expect(&mut ana, "Leo joined the chat.\n").await;
}

#[tokio::test]
async fn test_abrupt_disconnect_sends_one_leave_notice() {
    let addr = start_server().await;

    let ana = join(addr, "Ana").await;
    let mut leo = join(addr, "Leo").await;

    // Zero linger turns the close into a reset.
    ana.set_linger(Some(Duration::ZERO)).unwrap();
    drop(ana);

    expect(&mut leo, "Ana left the chat.\n").await;
    expect_silence(&mut leo).await;
}

#[tokio::test]
async fn test_orderly_disconnect_sends_leave_notice() {
    let addr = start_server().await;

    let mut ana = join(addr, "Ana").await;
    let mut leo = join(addr, "Leo").await;
    expect(&mut ana, "Leo joined the chat.\n").await;

    leo.shutdown().await.unwrap();

    expect(&mut ana, "Leo left the chat.\n").await;
    expect_silence(&mut ana).await;
}

#[tokio::test]
async fn test_empty_name_gets_default_and_stays_active() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = ChatServer::from_listener(listener, ServerConfig::default());
    let registry = server.registry();
    tokio::spawn(server.run());

    let mut anon = join(addr, "   \n").await;
    let names: Vec<String> = registry.snapshot().into_iter().map(|(_, r)| r.name).collect();
    assert_eq!(names, vec!["Anon".to_string()]);

    let mut leo = join(addr, "Leo").await;
    expect(&mut anon, "Leo joined the chat.\n").await;

    anon.write_all(b"hi\n").await.unwrap();
    expect(&mut leo, "Anon: hi\n").await;

    leo.write_all(b"hello\n").await.unwrap();
    expect(&mut anon, "Leo: hello\n").await;
}

#[tokio::test]
async fn test_handshake_timeout_never_registers() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = ServerConfig {
        handshake_timeout_ms: 200,
        ..ServerConfig::default()
    };
    let server = ChatServer::from_listener(listener, config);
    let registry = server.registry();
    tokio::spawn(server.run());

    let mut leo = join(addr, "Leo").await;

    let mut silent = TcpStream::connect(addr).await.unwrap();
    read_prompt(&mut silent).await;

    let mut buffer = [0u8; 64];
    let read = timeout(Duration::from_secs(2), silent.read(&mut buffer))
        .await
        .unwrap()
        .unwrap_or(0);
    assert_eq!(read, 0, "server should close an unnamed connection");

    assert_eq!(registry.len(), 1);
    expect_silence(&mut leo).await;
}

#[tokio::test]
async fn test_close_during_handshake_is_silent() {
    let addr = start_server().await;

    let mut leo = join(addr, "Leo").await;

    {
        let mut stranger = TcpStream::connect(addr).await.unwrap();
        read_prompt(&mut stranger).await;
    }

    expect_silence(&mut leo).await;

    let mut ana = join(addr, "Ana").await;
    expect(&mut leo, "Ana joined the chat.\n").await;
    ana.write_all(b"still here\n").await.unwrap();
    expect(&mut leo, "Ana: still here\n").await;
}

#[tokio::test]
async fn test_messages_from_one_sender_keep_order() {
    let addr = start_server().await;

    let mut sender = join(addr, "S").await;
    let mut receiver = join(addr, "R").await;
    expect(&mut sender, "R joined the chat.\n").await;

    let message_count = 200;
    for i in 0..message_count {
        sender.write_all(format!("{:04}\n", i).as_bytes()).await.unwrap();
    }

    // Several lines may share one relayed chunk, so only the "S: " prefix
    // position varies; the numbers must arrive in order.
    let last = format!("{:04}\n", message_count - 1);
    let mut received = String::new();
    let mut buffer = [0u8; 4096];
    while !received.ends_with(&last) {
        let n = timeout(Duration::from_secs(5), receiver.read(&mut buffer))
            .await
            .expect("timed out waiting for messages")
            .unwrap();
        assert!(n > 0, "connection closed early");
        received.push_str(&String::from_utf8_lossy(&buffer[..n]));
    }

    let numbers: Vec<u32> = received
        .lines()
        .map(|line| line.trim_start_matches("S: ").parse().unwrap())
        .collect();
    assert_eq!(numbers, (0..message_count).collect::<Vec<u32>>());
}
