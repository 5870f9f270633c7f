//! Integration tests for ControlCodec with Tokio streams.
//!
//! These tests verify line framing over real async streams, including
//! lines split across writes and lines that exceed the server limit.

mod common;

use futures::{SinkExt, StreamExt};
use open8055_core::CardId;
use open8055_protocol::{ControlCodec, HidReport, ProtocolError, Reply, Request};
use tokio::io::AsyncWriteExt;
use tokio_util::codec::FramedRead;

#[tokio::test]
async fn test_greeting_roundtrip() {
    let (mut client, mut server) = common::framed_duplex(1024);

    server.send(Reply::hello()).await.unwrap();
    server.send(Reply::salt(0x0123_4567_89ab_cdef)).await.unwrap();

    let hello: Reply = client.next().await.unwrap().unwrap().parse().unwrap();
    let salt: Reply = client.next().await.unwrap().unwrap().parse().unwrap();

    assert_eq!(hello, Reply::hello());
    assert_eq!(salt, Reply::Salt("0123456789abcdef".to_string()));
}

#[tokio::test]
async fn test_request_roundtrip() {
    let (mut client, mut server) = common::framed_duplex(1024);

    let req = Request::open(CardId::new(0).unwrap(), "nobody", "nopass");
    client.send(&req).await.unwrap();
    client.send(Request::Quit).await.unwrap();

    let line = server.next().await.unwrap().unwrap();
    assert_eq!(Request::parse(&line).unwrap(), req);
    let line = server.next().await.unwrap().unwrap();
    assert_eq!(Request::parse(&line).unwrap(), Request::Quit);
}

#[tokio::test]
async fn test_recv_lines_in_order() {
    let (mut client, mut server) = common::framed_duplex(4096);

    let reports = [
        HidReport::Config1(common::power_on_config()),
        HidReport::Output(common::output_bits(85)),
        HidReport::Input(common::input_with(3, [512, 1023])),
    ];
    for report in reports {
        server.send(Reply::Recv(report)).await.unwrap();
    }

    for expected in reports {
        let reply: Reply = client.next().await.unwrap().unwrap().parse().unwrap();
        assert_eq!(reply, Reply::Recv(expected));
    }
}

#[tokio::test]
async fn test_line_split_across_writes() {
    let (mut writer, reader) = tokio::io::duplex(64);
    let mut framed = FramedRead::new(reader, ControlCodec::new());

    writer.write_all(b"LIST no").await.unwrap();
    writer.flush().await.unwrap();
    writer.write_all(b"body nopass\r\n").await.unwrap();

    assert_eq!(framed.next().await.unwrap().unwrap(), "LIST nobody nopass");
}

#[tokio::test]
async fn test_overlong_line_is_fatal() {
    let (mut writer, reader) = tokio::io::duplex(1024);
    let mut framed = FramedRead::new(reader, ControlCodec::new());

    let long = "X".repeat(300);
    writer.write_all(long.as_bytes()).await.unwrap();

    let err = framed.next().await.unwrap().unwrap_err();
    assert!(matches!(err, ProtocolError::LineTooLong { .. }));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_eof_ends_stream() {
    let (mut writer, reader) = tokio::io::duplex(64);
    let mut framed = FramedRead::new(reader, ControlCodec::new());

    writer.write_all(b"QUIT\npartial").await.unwrap();
    drop(writer);

    assert_eq!(framed.next().await.unwrap().unwrap(), "QUIT");
    assert!(framed.next().await.is_none());
}
