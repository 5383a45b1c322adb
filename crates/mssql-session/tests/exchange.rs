//! Exchange engine tests against a scripted in-process server.

use std::str::FromStr;

use bytes::{Bytes, BytesMut};
use futures_util::{stream, SinkExt, StreamExt};
use rust_decimal::Decimal;
use tokio::io::DuplexStream;

use mssql_framing::{split_message, Message, MessageAssembler, PacketStream};
use mssql_session::{ClientMessage, Connection, ConnectionState, Error, TransactionStatus};
use mssql_values::{decode_column, SqlValue, ValueKind};
use tds_wire::batch::SqlBatch;
use tds_wire::collation::Collation;
use tds_wire::packet::PacketType;
use tds_wire::token::{
    ColumnMetadata, Column, DoneStatus, DoneToken, EnvChangeToken, EnvChangeType, EnvChangeValue,
    MessageToken, RowToken, RowValue, Token, TokenType,
};
use tds_wire::types::{LengthStrategy, SqlServerType, TypeInformation};

fn column(index: usize, name: &str, type_info: TypeInformation) -> Column {
    Column {
        index,
        name: name.to_string(),
        type_info,
        table_name: None,
    }
}

fn select_foo_metadata() -> ColumnMetadata {
    let collation = Collation {
        lcid: 0x00D0_0409,
        sort_id: 0x34,
    };

    ColumnMetadata {
        columns: vec![
            column(
                0,
                "employee_id",
                TypeInformation::builder(SqlServerType::TinyInt)
                    .length_strategy(LengthStrategy::ByteLen)
                    .max_length(1)
                    .build(),
            ),
            column(
                1,
                "last_name",
                TypeInformation::builder(SqlServerType::NVarChar)
                    .length_strategy(LengthStrategy::UShortLen)
                    .max_length(100)
                    .collation(collation)
                    .build(),
            ),
            column(
                2,
                "first_name",
                TypeInformation::builder(SqlServerType::VarChar)
                    .length_strategy(LengthStrategy::UShortLen)
                    .max_length(100)
                    .collation(collation)
                    .build(),
            ),
            column(
                3,
                "salary",
                TypeInformation::builder(SqlServerType::Money)
                    .length_strategy(LengthStrategy::ByteLen)
                    .max_length(8)
                    .build(),
            ),
        ],
    }
}

fn utf16_bytes(text: &str) -> Bytes {
    text.encode_utf16()
        .flat_map(|unit| unit.to_le_bytes())
        .collect::<Vec<_>>()
        .into()
}

async fn read_request(
    stream: &mut PacketStream<DuplexStream>,
    assembler: &mut MessageAssembler,
) -> Message {
    loop {
        let packet = stream
            .next()
            .await
            .expect("request packet")
            .expect("framing");
        if let Some(message) = assembler.push(packet).expect("assembly") {
            return message;
        }
    }
}

async fn send_response(stream: &mut PacketStream<DuplexStream>, payload: Bytes) {
    for packet in split_message(PacketType::TabularResult, payload, 4096) {
        stream.feed(packet).await.expect("send packet");
    }
    stream.flush().await.expect("flush");
}

#[tokio::test]
async fn simple_select_exchange() {
    let (client_end, server_end) = tokio::io::duplex(16 * 1024);
    let mut conn = Connection::ready(client_end);

    let server = tokio::spawn(async move {
        let mut stream = PacketStream::new(server_end);
        let mut assembler = MessageAssembler::new();

        let request = read_request(&mut stream, &mut assembler).await;
        assert_eq!(request.packet_type, PacketType::SqlBatch);

        let mut payload = request.payload.clone();
        let (batch, headers) = SqlBatch::decode(&mut payload).expect("batch");
        assert_eq!(batch.sql(), "SELECT * FROM foo");
        assert!(headers.transaction_descriptor.is_empty());
        assert_eq!(headers.outstanding_requests, 1);

        let metadata = select_foo_metadata();
        let row = RowToken {
            values: vec![
                RowValue::new(Bytes::from_static(&[0x01])),
                RowValue::new(utf16_bytes("paluch")),
                RowValue::new(Bytes::from_static(b"mark")),
                RowValue::new(Bytes::from_static(&[
                    0x00, 0x00, 0x00, 0x00, 0x20, 0xA1, 0x07, 0x00,
                ])),
            ],
        };

        let mut response = BytesMut::new();
        metadata.encode(&mut response);
        row.encode(&metadata, &mut response);
        DoneToken::counted(1).encode(TokenType::Done, &mut response);
        send_response(&mut stream, response.freeze()).await;
    });

    let mut responses = conn
        .exchange(stream::iter(vec![ClientMessage::sql_batch(
            "SELECT * FROM foo",
        )]))
        .expect("exchange");

    let Token::ColumnMetadata(metadata) = responses.next().await.unwrap().unwrap() else {
        panic!("expected column metadata first");
    };
    assert_eq!(metadata.column_count(), 4);

    let Token::Row(row) = responses.next().await.unwrap().unwrap() else {
        panic!("expected a row");
    };

    let values: Vec<SqlValue> = row
        .values
        .iter()
        .zip(&metadata.columns)
        .zip([
            ValueKind::TinyInt,
            ValueKind::String,
            ValueKind::String,
            ValueKind::Decimal,
        ])
        .map(|((value, column), kind)| decode_column(value, column, kind).unwrap())
        .collect();

    assert_eq!(values[0], SqlValue::TinyInt(1));
    assert_eq!(values[1], SqlValue::String("paluch".to_string()));
    assert_eq!(values[2], SqlValue::String("mark".to_string()));
    assert_eq!(
        values[3],
        SqlValue::Decimal(Decimal::from_str("50.0000").unwrap())
    );

    let Token::Done(done) = responses.next().await.unwrap().unwrap() else {
        panic!("expected the final done");
    };
    assert_eq!(done.counted_rows(), Some(1));

    assert!(responses.next().await.is_none());
    assert_eq!(conn.state(), ConnectionState::Ready);

    server.await.unwrap();
}

#[tokio::test]
async fn completes_only_on_final_done() {
    let (client_end, server_end) = tokio::io::duplex(16 * 1024);
    let mut conn = Connection::ready(client_end);

    let server = tokio::spawn(async move {
        let mut stream = PacketStream::new(server_end);
        let mut assembler = MessageAssembler::new();
        read_request(&mut stream, &mut assembler).await;

        let mut response = BytesMut::new();
        // First result set completion announces more to come.
        DoneToken {
            status: DoneStatus::MORE | DoneStatus::COUNT,
            cur_cmd: 0,
            row_count: 3,
        }
        .encode(TokenType::Done, &mut response);
        DoneToken::counted(5).encode(TokenType::Done, &mut response);
        send_response(&mut stream, response.freeze()).await;
    });

    let mut responses = conn
        .exchange(stream::iter(vec![ClientMessage::sql_batch("SELECT 1; SELECT 2")]))
        .expect("exchange");

    let Token::Done(first) = responses.next().await.unwrap().unwrap() else {
        panic!("expected first done");
    };
    assert!(!first.is_final());

    let Token::Done(second) = responses.next().await.unwrap().unwrap() else {
        panic!("expected final done");
    };
    assert!(second.is_final());

    assert!(responses.next().await.is_none());
    assert_eq!(conn.state(), ConnectionState::Ready);

    server.await.unwrap();
}

#[tokio::test]
async fn server_error_surfaces_after_drain() {
    let (client_end, server_end) = tokio::io::duplex(16 * 1024);
    let mut conn = Connection::ready(client_end);

    let server = tokio::spawn(async move {
        let mut stream = PacketStream::new(server_end);
        let mut assembler = MessageAssembler::new();
        read_request(&mut stream, &mut assembler).await;

        let mut response = BytesMut::new();
        MessageToken {
            number: 208,
            state: 1,
            class: 16,
            message: "Invalid object name 'foo'.".to_string(),
            server: "scripted".to_string(),
            procedure: String::new(),
            line: 1,
        }
        .encode(TokenType::Error, &mut response);
        DoneToken {
            status: DoneStatus::SRVERROR,
            cur_cmd: 0,
            row_count: 0,
        }
        .encode(TokenType::Done, &mut response);
        send_response(&mut stream, response.freeze()).await;
    });

    let mut responses = conn
        .exchange(stream::iter(vec![ClientMessage::sql_batch(
            "SELECT * FROM foo",
        )]))
        .expect("exchange");

    // The completion token still arrives, then the failure terminates the
    // stream; the connection itself survives.
    let Token::Done(done) = responses.next().await.unwrap().unwrap() else {
        panic!("expected the done token");
    };
    assert!(done.is_final());

    let err = responses.next().await.unwrap().unwrap_err();
    match err {
        Error::Server { number, class, .. } => {
            assert_eq!(number, 208);
            assert_eq!(class, 16);
        }
        other => panic!("expected a server error, got {other:?}"),
    }

    assert!(responses.next().await.is_none());
    assert_eq!(conn.state(), ConnectionState::Ready);

    server.await.unwrap();
}

#[tokio::test]
async fn begin_transaction_env_change_updates_descriptor() {
    let (client_end, server_end) = tokio::io::duplex(16 * 1024);
    let mut conn = Connection::ready(client_end);

    let server = tokio::spawn(async move {
        let mut stream = PacketStream::new(server_end);
        let mut assembler = MessageAssembler::new();
        read_request(&mut stream, &mut assembler).await;

        let mut response = BytesMut::new();
        EnvChangeToken {
            change_type: EnvChangeType::BeginTransaction,
            new_value: EnvChangeValue::Binary(Bytes::from_static(&[1, 2, 3, 4, 5, 6, 7, 8])),
            old_value: EnvChangeValue::Binary(Bytes::new()),
        }
        .encode(&mut response);
        DoneToken::counted(0).encode(TokenType::Done, &mut response);
        send_response(&mut stream, response.freeze()).await;
    });

    assert!(conn.transaction_descriptor().is_empty());

    let mut responses = conn
        .exchange(stream::iter(vec![ClientMessage::sql_batch(
            "BEGIN TRANSACTION",
        )]))
        .expect("exchange");
    while let Some(token) = responses.next().await {
        token.unwrap();
    }

    assert_eq!(
        conn.transaction_descriptor().as_bytes(),
        &[1, 2, 3, 4, 5, 6, 7, 8]
    );
    assert_eq!(conn.transaction_status(), TransactionStatus::Started);
    assert_eq!(conn.state(), ConnectionState::Ready);

    server.await.unwrap();
}

#[tokio::test]
async fn attention_cancels_and_drains() {
    let (client_end, server_end) = tokio::io::duplex(16 * 1024);
    let mut conn = Connection::ready(client_end);

    let server = tokio::spawn(async move {
        let mut stream = PacketStream::new(server_end);
        let mut assembler = MessageAssembler::new();

        let request = read_request(&mut stream, &mut assembler).await;
        assert_eq!(request.packet_type, PacketType::SqlBatch);

        // Hold the response until the attention arrives.
        let attention = read_request(&mut stream, &mut assembler).await;
        assert_eq!(attention.packet_type, PacketType::Attention);
        assert!(attention.payload.is_empty());

        let mut response = BytesMut::new();
        DoneToken {
            status: DoneStatus::ATTN,
            cur_cmd: 0,
            row_count: 0,
        }
        .encode(TokenType::Done, &mut response);
        send_response(&mut stream, response.freeze()).await;
    });

    let handle = conn.attention_handle();
    let mut responses = conn
        .exchange(stream::iter(vec![ClientMessage::sql_batch(
            "WAITFOR DELAY '00:10'",
        )]))
        .expect("exchange");

    let drive = async {
        let mut tokens = Vec::new();
        while let Some(token) = responses.next().await {
            tokens.push(token.unwrap());
        }
        tokens
    };
    let cancel = async {
        handle.cancel().await.unwrap();
    };

    let (tokens, ()) = tokio::join!(drive, cancel);
    assert!(tokens.is_empty());
    assert_eq!(conn.state(), ConnectionState::Ready);
    assert!(!conn.attention_handle().is_cancelling());

    server.await.unwrap();
}

#[tokio::test]
async fn write_failure_closes_the_connection() {
    let (client_end, server_end) = tokio::io::duplex(1024);
    let mut conn = Connection::ready(client_end);
    drop(server_end);

    let mut responses = conn
        .exchange(stream::iter(vec![ClientMessage::sql_batch("SELECT 1")]))
        .expect("exchange");

    let err = responses.next().await.unwrap().unwrap_err();
    assert!(err.is_fatal());
    assert!(responses.next().await.is_none());
    drop(responses);

    assert_eq!(conn.state(), ConnectionState::Closed);
    assert!(matches!(
        conn.exchange(stream::iter(vec![ClientMessage::sql_batch("SELECT 2")])),
        Err(Error::ConnectionClosed)
    ));
}

#[tokio::test]
async fn closed_connection_rejects_exchanges() {
    let (client_end, _server_end) = tokio::io::duplex(1024);
    let mut conn = Connection::ready(client_end);
    conn.close().await.unwrap();

    let err = conn
        .exchange(stream::iter(vec![ClientMessage::sql_batch("SELECT 1")]))
        .unwrap_err();
    assert!(matches!(err, Error::ConnectionClosed));
}

#[tokio::test]
async fn abandoned_exchange_blocks_the_next_one() {
    let (client_end, _server_end) = tokio::io::duplex(1024);
    let mut conn = Connection::ready(client_end);

    let responses = conn
        .exchange(stream::iter(vec![ClientMessage::sql_batch("SELECT 1")]))
        .expect("first exchange");
    drop(responses);

    let err = conn
        .exchange(stream::iter(vec![ClientMessage::sql_batch("SELECT 2")]))
        .unwrap_err();
    assert!(matches!(err, Error::IllegalState(_)));
}
