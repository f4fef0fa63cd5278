//! Opening handshake (RFC 6455 Section 4).
//!
//! Probes only ever act as the client. The server half exists so the
//! reference target and the test fixtures can answer upgrades with the same
//! code the probes validate against.

use std::collections::HashMap;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};

/// The WebSocket GUID used in the Sec-WebSocket-Accept calculation (RFC 6455).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Parse HTTP header lines into a map keyed by lowercase header name.
///
/// Stops at the first empty line. When `unique` is given, a repeated header
/// from that list is rejected.
///
/// # Errors
/// Returns `Error::InvalidHandshake` if a header in `unique` is duplicated.
pub(crate) fn parse_headers<'a, I>(
    lines: I,
    unique: Option<&[&str]>,
) -> Result<HashMap<String, String>>
where
    I: Iterator<Item = &'a str>,
{
    let mut headers: HashMap<String, String> = HashMap::new();

    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim().to_lowercase();
            if unique.is_some_and(|u| u.contains(&name.as_str())) && headers.contains_key(&name) {
                return Err(Error::InvalidHandshake(format!("{name} header repeated")));
            }
            headers.insert(name, value.trim().to_string());
        }
    }

    Ok(headers)
}

/// Computes the Sec-WebSocket-Accept value for a Sec-WebSocket-Key.
///
/// ```
/// use wsassess::protocol::handshake::compute_accept_key;
///
/// let accept = compute_accept_key("dGhlIHNhbXBsZSBub25jZQ==");
/// assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Generate a fresh Sec-WebSocket-Key (16 random bytes, base64).
///
/// # Errors
/// Returns `Error::Io` if the OS random source is unavailable.
pub fn generate_key() -> Result<String> {
    let mut bytes = [0u8; 16];
    getrandom::getrandom(&mut bytes).map_err(|e| Error::Io(e.to_string()))?;
    Ok(BASE64.encode(bytes))
}

/// Upgrade request, as sent by a probe or received by a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    pub path: String,
    pub host: String,
    /// Base64 nonce; must decode to 16 bytes.
    pub key: String,
    pub version: u8,
}

impl HandshakeRequest {
    /// Build a client request for `host` and `path` with the given key.
    #[must_use]
    pub fn client(host: impl Into<String>, path: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            host: host.into(),
            key: key.into(),
            version: 13,
        }
    }

    /// Serialize the request head.
    pub fn write(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(format!("GET {} HTTP/1.1\r\n", self.path).as_bytes());
        buf.extend_from_slice(format!("Host: {}\r\n", self.host).as_bytes());
        buf.extend_from_slice(b"Upgrade: websocket\r\n");
        buf.extend_from_slice(b"Connection: Upgrade\r\n");
        buf.extend_from_slice(format!("Sec-WebSocket-Key: {}\r\n", self.key).as_bytes());
        buf.extend_from_slice(format!("Sec-WebSocket-Version: {}\r\n", self.version).as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    /// Parse an upgrade request from raw HTTP data.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] if the request line is not a
    /// `GET ... HTTP/1.1`, or a required upgrade header is missing or wrong.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| Error::InvalidHandshake("request is not UTF-8".into()))?;
        let mut lines = text.lines();

        let path = match lines
            .next()
            .map(|line| line.split_whitespace().collect::<Vec<_>>())
            .as_deref()
        {
            Some(["GET", path, version]) if version.starts_with("HTTP/1.1") => path.to_string(),
            Some([method, _, _]) if *method != "GET" => {
                return Err(Error::InvalidHandshake(format!(
                    "upgrade must use GET, not {method}"
                )));
            }
            Some([_, _, version]) => {
                return Err(Error::InvalidHandshake(format!(
                    "upgrade needs HTTP/1.1, not {version}"
                )));
            }
            _ => return Err(Error::InvalidHandshake("malformed request line".into())),
        };

        const SINGLE: [&str; 5] = [
            "host",
            "upgrade",
            "connection",
            "sec-websocket-key",
            "sec-websocket-version",
        ];
        let mut headers = parse_headers(lines, Some(&SINGLE))?;
        check_upgrade_headers(&headers)?;

        let mut take = |name: &str| {
            headers
                .remove(name)
                .ok_or_else(|| Error::InvalidHandshake(format!("no {name} header")))
        };
        let host = take("host")?;
        let key = take("sec-websocket-key")?;
        let raw_version = take("sec-websocket-version")?;
        let version = raw_version.trim().parse().map_err(|_| {
            Error::InvalidHandshake(format!("unparseable version {raw_version:?}"))
        })?;

        Ok(Self {
            path,
            host,
            key,
            version,
        })
    }

    /// Only version 13 with a 16-byte nonce is accepted.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidHandshake`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        let problem = if self.version != 13 {
            format!("version {} is not supported", self.version)
        } else {
            match BASE64.decode(&self.key).map(|nonce| nonce.len()) {
                Ok(16) => return Ok(()),
                Ok(len) => format!("key decodes to {len} bytes"),
                Err(_) => "key is not base64".to_string(),
            }
        };
        Err(Error::InvalidHandshake(problem))
    }
}

/// Successful `101 Switching Protocols` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// The Sec-WebSocket-Accept value.
    pub accept: String,
}

impl HandshakeResponse {
    /// Create the response that accepts `req`.
    #[must_use]
    pub fn from_request(req: &HandshakeRequest) -> Self {
        Self {
            accept: compute_accept_key(&req.key),
        }
    }

    /// Serialize the response head.
    pub fn write(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(b"HTTP/1.1 101 Switching Protocols\r\n");
        buf.extend_from_slice(b"Upgrade: websocket\r\n");
        buf.extend_from_slice(b"Connection: Upgrade\r\n");
        buf.extend_from_slice(format!("Sec-WebSocket-Accept: {}\r\n", self.accept).as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    /// Parse a handshake response from raw HTTP data.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] if the status is not 101 or a
    /// required upgrade header is missing or wrong.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| Error::InvalidHandshake("response is not UTF-8".into()))?;
        let mut lines = text.lines();

        match lines.next() {
            Some(status) if status.starts_with("HTTP/1.1 101") => {}
            Some(status) => {
                return Err(Error::InvalidHandshake(format!(
                    "target answered {status:?} instead of 101"
                )));
            }
            None => return Err(Error::InvalidHandshake("empty response".into())),
        }

        let mut headers = parse_headers(lines, None)?;
        check_upgrade_headers(&headers)?;

        headers
            .remove("sec-websocket-accept")
            .map(|accept| Self { accept })
            .ok_or_else(|| Error::InvalidHandshake("no Sec-WebSocket-Accept header".into()))
    }

    /// Check that the server derived its accept value from `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] on mismatch.
    pub fn verify(&self, key: &str) -> Result<()> {
        if self.accept == compute_accept_key(key) {
            Ok(())
        } else {
            Err(Error::InvalidHandshake("Sec-WebSocket-Accept does not match key".into()))
        }
    }
}

fn check_upgrade_headers(headers: &HashMap<String, String>) -> Result<()> {
    let upgrade = headers.get("upgrade").map(String::as_str);
    if !upgrade.is_some_and(|v| v.eq_ignore_ascii_case("websocket")) {
        return Err(Error::InvalidHandshake(format!(
            "Upgrade header is {upgrade:?}, want websocket"
        )));
    }
    let connection = headers.get("connection").map(|v| v.to_ascii_lowercase());
    if !connection.as_deref().is_some_and(|v| v.contains("upgrade")) {
        return Err(Error::InvalidHandshake(format!(
            "Connection header is {connection:?}, want upgrade"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_accept_key_rfc_example() {
        assert_eq!(
            compute_accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn test_generated_key_is_valid() {
        let key = generate_key().unwrap();
        let req = HandshakeRequest::client("localhost:8080", "/path", key);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_client_request_is_parseable_by_server() {
        let req = HandshakeRequest::client("localhost:8080", "/path", "dGhlIHNhbXBsZSBub25jZQ==");
        let mut buf = Vec::new();
        req.write(&mut buf);

        let parsed = HandshakeRequest::parse(&buf).unwrap();
        assert_eq!(parsed, req);
    }

    #[test]
    fn test_parse_request_missing_key() {
        let request = b"GET /feed HTTP/1.1\r\n\
            Host: 127.0.0.1:9000\r\n\
            Upgrade: websocket\r\n\
            Connection: Upgrade\r\n\
            Sec-WebSocket-Version: 13\r\n\
            \r\n";

        let err = HandshakeRequest::parse(request).unwrap_err();
        assert!(matches!(err, Error::InvalidHandshake(msg) if msg.contains("sec-websocket-key")));
    }

    #[test]
    fn test_parse_request_rejects_post() {
        let request = b"POST / HTTP/1.1\r\nHost: x\r\n\r\n";
        let err = HandshakeRequest::parse(request).unwrap_err();
        assert!(matches!(err, Error::InvalidHandshake(msg) if msg.contains("GET")));
    }

    #[test]
    fn test_repeated_key_header_rejected() {
        let request = b"GET /feed HTTP/1.1\r\n\
            Host: 127.0.0.1:9000\r\n\
            Upgrade: websocket\r\n\
            Connection: keep-alive, Upgrade\r\n\
            Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
            Sec-WebSocket-Key: AAAAAAAAAAAAAAAAAAAAAA==\r\n\
            Sec-WebSocket-Version: 13\r\n\r\n";

        assert!(matches!(
            HandshakeRequest::parse(request),
            Err(Error::InvalidHandshake(msg)) if msg.contains("repeated")
        ));
    }

    #[test]
    fn test_validate_rejects_old_version() {
        let mut req = HandshakeRequest::client("x", "/", "dGhlIHNhbXBsZSBub25jZQ==");
        req.version = 8;
        assert!(matches!(req.validate(), Err(Error::InvalidHandshake(msg)) if msg.contains("8")));
    }

    #[test]
    fn test_validate_rejects_short_key() {
        let req = HandshakeRequest::client("x", "/", "c2hvcnQ=");
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_response_roundtrip_and_verify() {
        let key = "dGhlIHNhbXBsZSBub25jZQ==";
        let req = HandshakeRequest::client("example.com", "/chat", key);
        let mut buf = Vec::new();
        HandshakeResponse::from_request(&req).write(&mut buf);

        let resp = HandshakeResponse::parse(&buf).unwrap();
        assert_eq!(resp.accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
        assert!(resp.verify(key).is_ok());
        assert!(resp.verify("AAAAAAAAAAAAAAAAAAAAAA==").is_err());
    }

    #[test]
    fn test_response_rejects_plain_http() {
        let response = b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n";
        let err = HandshakeResponse::parse(response).unwrap_err();
        assert!(matches!(err, Error::InvalidHandshake(msg) if msg.contains("101")));
    }

    #[test]
    fn test_response_missing_accept() {
        let response = b"HTTP/1.1 101 Switching Protocols\r\n\
            Upgrade: websocket\r\n\
            Connection: Upgrade\r\n\
            \r\n";

        let err = HandshakeResponse::parse(response).unwrap_err();
        assert!(matches!(err, Error::InvalidHandshake(msg) if msg.contains("Sec-WebSocket-Accept")));
    }
}
