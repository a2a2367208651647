//! In-process websocket server the integration tests connect to.
#![allow(dead_code)]

use std::collections::HashMap;

use base64::engine::{Engine, general_purpose::STANDARD as BASE64};
use sha1::{Digest, Sha1};
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
};

const ACCEPT_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

#[derive(Debug, Clone, Default)]
pub struct ServerOptions {
    /// Leave pings unanswered.
    pub mute_pings: bool,
    /// Text message sent right after the handshake.
    pub greeting: Option<String>,
}

/// Starts an echo server on a random local port and returns its url.
pub async fn echo_server() -> String { server(ServerOptions::default()).await }

pub async fn server(options: ServerOptions) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(serve(stream, options.clone()));
        }
    });
    format!("ws://{addr}/echo")
}

async fn serve(stream: TcpStream, options: ServerOptions) {
    let mut stream = BufReader::new(stream);

    // request line and headers
    let mut headers = HashMap::new();
    let mut line = String::new();
    stream.read_line(&mut line).await.unwrap();
    loop {
        line.clear();
        stream.read_line(&mut line).await.unwrap();
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_ascii_lowercase(), v.trim().to_owned());
        }
    }

    let mut hasher = Sha1::new();
    hasher.update(&headers["sec-websocket-key"]);
    hasher.update(ACCEPT_GUID);
    let accept = BASE64.encode(hasher.finalize());

    let mut response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept}\r\n\r\n"
    )
    .into_bytes();
    if let Some(greeting) = &options.greeting {
        response.extend(frame(true, 0x1, greeting.as_bytes()));
    }
    stream.get_mut().write_all(&response).await.unwrap();

    while let Some((fin, opcode, payload)) = read_frame(&mut stream).await {
        let reply = match opcode {
            0x9 if options.mute_pings => continue,
            0x9 => frame(true, 0xA, &payload),
            0xA => continue,
            0x8 => {
                let _ = stream.get_mut().write_all(&frame(true, 0x8, &payload)).await;
                break;
            }
            _ => frame(fin, opcode, &payload),
        };
        if stream.get_mut().write_all(&reply).await.is_err() {
            break;
        }
    }
    let _ = stream.get_mut().shutdown().await;
}

// Reads one masked client frame, `None` once the client is gone
async fn read_frame(stream: &mut BufReader<TcpStream>) -> Option<(bool, u8, Vec<u8>)> {
    let mut head = [0; 2];
    stream.read_exact(&mut head).await.ok()?;
    let fin = head[0] & 0x80 != 0;
    let opcode = head[0] & 0x0F;
    assert!(head[1] & 0x80 != 0, "client frames must be masked");

    let len = match head[1] & 0x7F {
        126 => u64::from(stream.read_u16().await.ok()?),
        127 => stream.read_u64().await.ok()?,
        n => u64::from(n),
    };
    let mut key = [0; 4];
    stream.read_exact(&mut key).await.ok()?;
    let mut payload = vec![0; usize::try_from(len).unwrap()];
    stream.read_exact(&mut payload).await.ok()?;
    for (i, b) in payload.iter_mut().enumerate() {
        *b ^= key[i % 4];
    }
    Some((fin, opcode, payload))
}

// Server frames are never masked
fn frame(fin: bool, opcode: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![(u8::from(fin) << 7) | opcode];
    match payload.len() {
        n @ 0..=125 => out.push(u8::try_from(n).unwrap()),
        n @ 126..=0xFFFF => {
            out.push(126);
            out.extend(u16::try_from(n).unwrap().to_be_bytes());
        }
        n => {
            out.push(127);
            out.extend((n as u64).to_be_bytes());
        }
    }
    out.extend_from_slice(payload);
    out
}
