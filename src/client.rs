use std::{collections::HashMap, io, sync::Arc};

use base64::engine::{Engine, general_purpose::STANDARD as BASE64};
use rustls::{ClientConfig, RootCertStore, pki_types::ServerName};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::TcpStream,
};
use tokio_rustls::TlsConnector;
use tracing::Instrument;
use url::{Position, Url};

use crate::{
    error::{Error, Result, UpgradeError},
    settings::ConnectionSettings,
    ws::{BoxedStream, WebSocket},
};

const ACCEPT_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Client connection implementation for WebSocket
impl WebSocket {
    /// Connects to a `ws://` or `wss://` url and upgrades the connection.
    ///
    /// TCP connect, TLS and the HTTP upgrade together are bounded by
    /// [`ConnectionSettings::connect_timeout`].
    pub async fn connect(url: &str, settings: &ConnectionSettings) -> Result<Self> {
        let parsed = Url::parse(url).map_err(|_| Error::InvalidUrl(url.to_owned()))?;
        let secure = match parsed.scheme() {
            "ws" => false,
            "wss" => true,
            _ => return Err(Error::InvalidUrl(url.to_owned())),
        };
        let Some(host) = parsed.host_str() else {
            return Err(Error::InvalidUrl(url.to_owned()));
        };
        // ipv6 literals keep their brackets in host_str
        let host = host.trim_start_matches('[').trim_end_matches(']').to_owned();
        let port = parsed
            .port_or_known_default()
            .unwrap_or(if secure { 443 } else { 80 });

        let attempt = async {
            let tcp = TcpStream::connect((host.as_str(), port))
                .await
                .map_err(|source| UpgradeError::Connect {
                    addr: format!("{host}:{port}"),
                    source,
                })?;
            tcp.set_nodelay(true).ok();

            let stream: BoxedStream = if secure {
                Box::new(tls_connect(tcp, &host).await?)
            } else {
                Box::new(tcp)
            };
            try_upgrade(stream, &parsed, settings).await
        };

        let attempt = attempt.instrument(tracing::info_span!("connect", %url));
        let (stream, leftover) = tokio::time::timeout(settings.connect_timeout, attempt)
            .await
            .map_err(|_| UpgradeError::Timeout(settings.connect_timeout))??;

        tracing::info!(%url, "successfully connected to peer");
        Ok(Self::from_stream(stream, &leftover, settings))
    }
}

async fn tls_connect(
    tcp: TcpStream,
    host: &str,
) -> std::result::Result<tokio_rustls::client::TlsStream<TcpStream>, UpgradeError> {
    let tls_err = |source| UpgradeError::Tls {
        host: host.to_owned(),
        source,
    };

    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    let server_name = ServerName::try_from(host.to_owned())
        .map_err(|e| tls_err(io::Error::new(io::ErrorKind::InvalidInput, e)))?;
    TlsConnector::from(Arc::new(config))
        .connect(server_name, tcp)
        .await
        .map_err(tls_err)
}

/// Performs the HTTP upgrade. Returns the stream and any bytes read past the response.
async fn try_upgrade(
    stream: BoxedStream,
    url: &Url,
    settings: &ConnectionSettings,
) -> std::result::Result<(BoxedStream, Vec<u8>), UpgradeError> {
    let sec_websocket_key = {
        let mut key_bytes = [0u8; 16];
        rand::fill(&mut key_bytes);
        BASE64.encode(key_bytes)
    };

    let host = &url[Position::BeforeHost..Position::AfterPort];
    let path = match &url[Position::BeforePath..Position::AfterQuery] {
        "" => "/",
        p => p,
    };

    let mut req = format!(
        "GET {path} HTTP/1.1\r\n\
        Host: {host}\r\n\
        Upgrade: websocket\r\n\
        Connection: Upgrade\r\n\
        Sec-WebSocket-Key: {sec_websocket_key}\r\n\
        Sec-WebSocket-Version: 13\r\n",
    );
    for (name, value) in &settings.extra_headers {
        req.push_str(&format!("{name}: {value}\r\n"));
    }
    req.push_str("\r\n");

    let mut reader = BufReader::new(stream);
    reader
        .get_mut()
        .write_all(req.as_bytes())
        .await
        .map_err(UpgradeError::Write)?;
    tracing::debug!(%path, %host, "sent upgrade request");

    // get status line and validate status code
    let mut status_line = String::new();
    reader
        .read_line(&mut status_line)
        .await
        .map_err(UpgradeError::Read)?;

    let mut status_parts = status_line.split_whitespace();
    if status_parts.next().is_none() || status_parts.next() != Some("101") {
        return Err(UpgradeError::StatusLine(status_line.trim_end().to_owned()));
    }

    // header names are case-insensitive
    let mut headers = HashMap::new();
    loop {
        let mut line = String::new();
        let n = reader
            .read_line(&mut line)
            .await
            .map_err(UpgradeError::Read)?;
        if n == 0 {
            return Err(UpgradeError::Read(io::ErrorKind::UnexpectedEof.into()));
        }
        let line = line.trim_end(); // remove \r\n
        if line.is_empty() {
            break;
        } // end of headers

        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_lowercase(), value.trim().to_string());
        }
    }

    validate_token(&headers, "Upgrade", "websocket")?;
    validate_token(&headers, "Connection", "upgrade")?;

    let expected_accept = accept_key(&sec_websocket_key);
    match headers.get("sec-websocket-accept") {
        Some(x) if x == &expected_accept => {}
        r => {
            return Err(UpgradeError::Header {
                field: "Sec-WebSocket-Accept",
                expected: expected_accept,
                got: r.cloned(),
            });
        }
    }

    let leftover = reader.buffer().to_vec();
    Ok((reader.into_inner(), leftover))
}

/// The `Sec-WebSocket-Accept` value a server must answer `key` with.
pub(crate) fn accept_key(key: &str) -> String {
    use sha1::{Digest, Sha1};
    let mut hasher = Sha1::new();
    hasher.update(key);
    hasher.update(ACCEPT_GUID);
    BASE64.encode(hasher.finalize())
}

// the header must contain `expected` among its comma separated tokens
fn validate_token(
    headers: &HashMap<String, String>,
    field: &'static str,
    expected: &str,
) -> std::result::Result<(), UpgradeError> {
    let value = headers.get(&field.to_lowercase());
    let found = value.is_some_and(|v| {
        v.split(',')
            .any(|token| token.trim().eq_ignore_ascii_case(expected))
    });
    if found {
        Ok(())
    } else {
        Err(UpgradeError::Header {
            field,
            expected: expected.into(),
            got: value.cloned(),
        })
    }
}
