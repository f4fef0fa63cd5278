//! Opening handshake over a live stream.

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::{Config, Limits};
use crate::connection::{Connection, Role};
use crate::error::{Error, Result};
use crate::protocol::{HandshakeRequest, HandshakeResponse, generate_key};

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Read an HTTP head (request or response) terminated by an empty line.
///
/// Returns the head including the terminator. Bytes read past it stay in
/// `buf` for the caller.
///
/// # Errors
///
/// `Error::HandshakeTooLarge` past the configured limit, `Error::Io` if the
/// peer closes before the head is complete.
pub async fn read_head<T>(io: &mut T, buf: &mut BytesMut, limits: &Limits) -> Result<BytesMut>
where
    T: AsyncRead + Unpin,
{
    let mut scanned: usize = 0;
    loop {
        let start = scanned.saturating_sub(HEAD_TERMINATOR.len() - 1);
        if let Some(pos) = buf[start..]
            .windows(HEAD_TERMINATOR.len())
            .position(|w| w == HEAD_TERMINATOR)
        {
            return Ok(buf.split_to(start + pos + HEAD_TERMINATOR.len()));
        }
        scanned = buf.len();
        limits.check_handshake_size(scanned)?;

        if io.read_buf(buf).await? == 0 {
            return Err(Error::Io("connection closed during handshake".into()));
        }
    }
}

/// Perform the client handshake on `io` and return an open connection.
///
/// `host` is sent verbatim as the Host header.
///
/// # Errors
///
/// `Error::InvalidHandshake` if the server refuses the upgrade or answers
/// with the wrong accept key, plus I/O errors.
pub async fn connect<T>(mut io: T, host: &str, path: &str, config: Config) -> Result<Connection<T>>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let key = generate_key()?;
    let mut request = Vec::new();
    HandshakeRequest::client(host, path, key.as_str()).write(&mut request);
    io.write_all(&request).await?;
    io.flush().await?;

    let mut buf = BytesMut::with_capacity(1024);
    let head = read_head(&mut io, &mut buf, &config.limits).await?;
    HandshakeResponse::parse(&head)?.verify(&key)?;

    Ok(Connection::with_buffered(io, Role::Client, config, buf))
}

/// Answer an already-parsed upgrade request and return the server side.
///
/// # Errors
///
/// `Error::InvalidHandshake` if the request fails validation, plus I/O errors.
pub async fn accept<T>(
    mut io: T,
    request: &HandshakeRequest,
    leftover: BytesMut,
    config: Config,
) -> Result<Connection<T>>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    request.validate()?;
    let mut response = Vec::new();
    HandshakeResponse::from_request(request).write(&mut response);
    io.write_all(&response).await?;
    io.flush().await?;

    Ok(Connection::with_buffered(io, Role::Server, config, leftover))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;

    #[tokio::test]
    async fn test_read_head_keeps_leftover() {
        let (mut a, mut b) = tokio::io::duplex(256);
        b.write_all(b"HTTP/1.1 200 OK\r\nA: b\r\n\r\nbody").await.unwrap();

        let mut buf = BytesMut::new();
        let head = read_head(&mut a, &mut buf, &Limits::default()).await.unwrap();
        assert!(head.ends_with(b"\r\n\r\n"));
        assert_eq!(&buf[..], b"body");
    }

    #[tokio::test]
    async fn test_read_head_terminator_split_across_reads() {
        let (mut a, mut b) = tokio::io::duplex(256);
        let writer = tokio::spawn(async move {
            b.write_all(b"HTTP/1.1 101 Switching Protocols\r\n\r").await.unwrap();
            tokio::task::yield_now().await;
            b.write_all(b"\n\x81").await.unwrap();
            b
        });

        let mut buf = BytesMut::new();
        let head = read_head(&mut a, &mut buf, &Limits::default()).await.unwrap();
        assert!(head.ends_with(b"\r\n\r\n"));
        assert_eq!(&buf[..], &[0x81]);
        drop(writer.await.unwrap());
    }

    #[tokio::test]
    async fn test_read_head_limit() {
        let (mut a, mut b) = tokio::io::duplex(256);
        b.write_all(&[b'a'; 64]).await.unwrap();

        let mut buf = BytesMut::new();
        let limits = Limits::new(1024, 1024, 4, 32);
        let result = read_head(&mut a, &mut buf, &limits).await;
        assert!(matches!(result, Err(Error::HandshakeTooLarge { .. })));
    }

    #[tokio::test]
    async fn test_read_head_eof() {
        let (mut a, mut b) = tokio::io::duplex(256);
        b.write_all(b"HTTP/1.1 101").await.unwrap();
        drop(b);

        let mut buf = BytesMut::new();
        assert!(read_head(&mut a, &mut buf, &Limits::default()).await.is_err());
    }

    #[tokio::test]
    async fn test_connect_and_accept() {
        let (client_io, mut server_io) = tokio::io::duplex(4096);

        let server = tokio::spawn(async move {
            let mut buf = BytesMut::new();
            let head = read_head(&mut server_io, &mut buf, &Limits::default())
                .await
                .unwrap();
            let request = HandshakeRequest::parse(&head).unwrap();
            assert_eq!(request.path, "/path");
            let mut conn = accept(server_io, &request, buf, Config::server())
                .await
                .unwrap();
            conn.send(Message::text(r#"{"x":10,"y":20}"#)).await.unwrap();
            conn
        });

        let mut client = connect(client_io, "localhost:8080", "/path", Config::client())
            .await
            .unwrap();
        let msg = client.recv().await.unwrap();
        assert_eq!(msg, Some(Message::text(r#"{"x":10,"y":20}"#)));
        drop(server.await.unwrap());
    }

    #[tokio::test]
    async fn test_connect_rejects_plain_http() {
        let (client_io, mut server_io) = tokio::io::duplex(4096);
        tokio::spawn(async move {
            let mut buf = BytesMut::new();
            let _ = read_head(&mut server_io, &mut buf, &Limits::default()).await;
            let _ = server_io
                .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n")
                .await;
        });

        let result = connect(client_io, "localhost", "/path", Config::client()).await;
        assert!(matches!(result, Err(Error::InvalidHandshake(_))));
    }
}
