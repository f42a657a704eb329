//! Direct and relay tunnels
//!
//! Both paths end the same way: the client socket and the upstream socket
//! are split, and two independent tasks pump bytes, one per direction.
//! - Direct: bytes pass unmodified.
//! - Relay: after an AES-protected handshake, every byte is XORed with a
//!   per-direction key (our padding length outbound, the relay's inbound).
//!
//! The first task to see a read failure closes the pair; the other task
//! notices on its next poll and exits too.

use bytes::{BufMut, Bytes, BytesMut};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use lightsword_proto::{
    connect_reply_from_request, xor_in_place, HandshakeReply, HandshakeRequest, Socks5Request,
    CLIENT_TAG, MAX_HANDSHAKE_REPLY, MAX_REQUEST_SIZE,
};

use crate::context::Context;
use crate::crypto::IV_LEN;
use crate::error::{Error, Result};
use crate::random::handshake_padding;
use crate::stats::TrafficStats;

/// Per-direction obfuscation bytes; zero leaves the stream untouched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObfuscationKeys {
    /// Applied to client -> upstream bytes
    pub outbound: u8,
    /// Applied to upstream -> client bytes
    pub inbound: u8,
}

/// How far relay setup got, reported when it fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Connecting,
    HandshakeSent,
    HandshakeReplyReceived,
}

/// Result of a completed relay handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayHandshake {
    pub keys: ObfuscationKeys,
    /// SOCKS5 reply from the relay, forwarded verbatim to the client
    pub reply: Bytes,
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    /// client -> upstream, counted as sent
    Outbound,
    /// upstream -> client, counted as received
    Inbound,
}

pub async fn connect_with_timeout(host: &str, port: u16, limit: Duration) -> Result<TcpStream> {
    let addr = format!("{}:{}", host, port);
    match timeout(limit, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(source)) => Err(Error::UpstreamConnect { addr, source }),
        Err(_) => Err(Error::UpstreamConnect {
            addr,
            source: std::io::ErrorKind::TimedOut.into(),
        }),
    }
}

/// Connect straight to the destination and start forwarding.
///
/// On connect failure the client socket is dropped (closed) without a
/// SOCKS5 error reply.
pub async fn connect_direct(
    ctx: &Arc<Context>,
    mut client: TcpStream,
    request: &Socks5Request,
    request_buf: &[u8],
) -> Result<()> {
    let target = connect_with_timeout(&request.host, request.port, ctx.timeout()).await?;
    info!("connected: {}:{} (direct)", request.host, request.port);

    client.write_all(&connect_reply_from_request(request_buf)).await?;

    spawn_forwarding(ctx, client, target, ObfuscationKeys::default());
    Ok(())
}

/// Connect through the relay, run the handshake and start forwarding.
///
/// Any failure drops both sockets. Nothing is retried.
pub async fn connect_relay(
    ctx: &Arc<Context>,
    mut client: TcpStream,
    request: &Socks5Request,
    request_buf: &[u8],
) -> Result<()> {
    let config = ctx.config();
    let mut state = RelayState::Connecting;

    let result = async {
        let mut relay =
            connect_with_timeout(&config.server_addr, config.server_port, ctx.timeout()).await?;

        let handshake = relay_handshake(ctx, &mut relay, request_buf, &mut state).await?;
        client.write_all(&handshake.reply).await?;
        Ok::<_, Error>((relay, handshake.keys))
    }
    .await;

    match result {
        Ok((relay, keys)) => {
            info!("connected: {}:{} (relay)", request.host, request.port);
            debug!(
                "relay session for {}: outbound={:#04x} inbound={:#04x}",
                request.host, keys.outbound, keys.inbound
            );
            spawn_forwarding(ctx, client, relay, keys);
            Ok(())
        }
        Err(e) => {
            debug!("relay session for {} failed in {:?}", request.host, state);
            Err(e)
        }
    }
}

/// Run the encrypted handshake over an already connected relay socket.
///
/// Sends `IV ++ AES([tag][pl][padding][request])`, then reads a single
/// reply `IV ++ AES([padding_len][padding][reply])`.
pub async fn relay_handshake<S>(
    ctx: &Context,
    relay: &mut S,
    request_buf: &[u8],
    state: &mut RelayState,
) -> Result<RelayHandshake>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let frame = HandshakeRequest {
        tag: CLIENT_TAG,
        padding: handshake_padding(ctx.random()).into(),
        request: Bytes::copy_from_slice(request_buf),
    };
    let outbound_key = frame.padding_len();

    let (encryptor, iv) = ctx.cipher().encryptor(ctx.random());
    let mut body = frame.encode()?;
    encryptor.encrypt(&mut body)?;

    let mut wire = BytesMut::with_capacity(IV_LEN + body.len());
    wire.put_slice(&iv);
    wire.put_slice(&body);
    relay.write_all(&wire).await?;
    *state = RelayState::HandshakeSent;

    let mut buf = vec![0u8; MAX_HANDSHAKE_REPLY];
    let n = match timeout(ctx.timeout(), relay.read(&mut buf)).await {
        Ok(Ok(0)) => return Err(Error::UpstreamRead("relay closed before replying".into())),
        Ok(Ok(n)) => n,
        Ok(Err(e)) => return Err(Error::UpstreamRead(e.to_string())),
        Err(_) => return Err(Error::UpstreamRead("timed out waiting for reply".into())),
    };
    if n <= IV_LEN {
        return Err(Error::UpstreamRead(format!("reply truncated ({} bytes)", n)));
    }

    let (reply_iv, body) = buf[..n].split_at_mut(IV_LEN);
    ctx.cipher().decryptor(reply_iv)?.decrypt(body)?;
    let reply = HandshakeReply::decode(body).map_err(|e| Error::UpstreamRead(e.to_string()))?;
    *state = RelayState::HandshakeReplyReceived;

    Ok(RelayHandshake {
        keys: ObfuscationKeys {
            outbound: outbound_key,
            inbound: reply.padding_size,
        },
        reply: reply.reply,
    })
}

/// Split both sockets and spawn one forwarding task per direction.
pub fn spawn_forwarding(
    ctx: &Arc<Context>,
    client: TcpStream,
    upstream: TcpStream,
    keys: ObfuscationKeys,
) {
    let (client_read, client_write) = client.into_split();
    let (upstream_read, upstream_write) = upstream.into_split();
    let closed = CancellationToken::new();

    ctx.runtime().spawn(forward(
        client_read,
        upstream_write,
        keys.outbound,
        Direction::Outbound,
        ctx.stats().clone(),
        ctx.timeout(),
        closed.clone(),
    ));
    ctx.runtime().spawn(forward(
        upstream_read,
        client_write,
        keys.inbound,
        Direction::Inbound,
        ctx.stats().clone(),
        ctx.timeout(),
        closed,
    ));
}

/// Pump one direction until a read fails, times out or hits EOF, or the
/// opposite direction closes the pair.
async fn forward<R, W>(
    mut reader: R,
    mut writer: W,
    key: u8,
    direction: Direction,
    stats: Arc<TrafficStats>,
    read_timeout: Duration,
    closed: CancellationToken,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; MAX_REQUEST_SIZE];

    loop {
        let n = tokio::select! {
            _ = closed.cancelled() => break,
            result = timeout(read_timeout, reader.read(&mut buf)) => match result {
                Ok(Ok(0)) => {
                    debug!("{:?} EOF", direction);
                    break;
                }
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    debug!("{:?} read error: {}", direction, e);
                    break;
                }
                Err(_) => {
                    debug!("{:?} read timed out", direction);
                    break;
                }
            },
        };

        let chunk = &mut buf[..n];
        if key != 0 {
            xor_in_place(chunk, key);
        }

        tokio::select! {
            _ = closed.cancelled() => break,
            result = writer.write_all(chunk) => {
                if let Err(e) = result {
                    debug!("{:?} write error: {}", direction, e);
                    break;
                }
            }
        }

        match direction {
            Direction::Outbound => stats.add_sent(n),
            Direction::Inbound => stats.add_received(n),
        }
    }

    closed.cancel();
    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::crypto::CipherContext;
    use crate::random::SeededRandom;
    use tokio::io::duplex;
    use tokio::runtime::Handle;

    fn context() -> Context {
        Context::new(
            ServerConfig::new("relay.example.net", 8900, "secret"),
            Arc::new(TrafficStats::new()),
            Arc::new(SeededRandom::new(3)),
            Handle::current(),
        )
    }

    #[tokio::test]
    async fn test_forward_counts_and_obfuscates() {
        let stats = Arc::new(TrafficStats::new());
        let (mut src, reader) = duplex(64);
        let (writer, mut dst) = duplex(64);
        let closed = CancellationToken::new();

        let task = tokio::spawn(forward(
            reader,
            writer,
            0x21,
            Direction::Inbound,
            stats.clone(),
            Duration::from_secs(5),
            closed.clone(),
        ));

        src.write_all(b"abc").await.unwrap();
        let mut out = [0u8; 3];
        dst.read_exact(&mut out).await.unwrap();
        assert_eq!(out, [b'a' ^ 0x21, b'b' ^ 0x21, b'c' ^ 0x21]);

        drop(src);
        task.await.unwrap();
        assert!(closed.is_cancelled());
        assert_eq!(stats.received_bytes(), 3);
        assert_eq!(stats.sent_bytes(), 0);
    }

    #[tokio::test]
    async fn test_forward_stops_when_pair_closed() {
        let stats = Arc::new(TrafficStats::new());
        let (_src, reader) = duplex(64);
        let (writer, _dst) = duplex(64);
        let closed = CancellationToken::new();

        let task = tokio::spawn(forward(
            reader,
            writer,
            0,
            Direction::Outbound,
            stats,
            Duration::from_secs(30),
            closed.clone(),
        ));
        closed.cancel();
        timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_relay_handshake_frames() {
        let ctx = context();
        let (mut client_side, mut relay_side) = duplex(4096);
        let request = [0x05, 0x01, 0x00, 0x03, 3, b'a', b'b', b'c', 0, 80];

        let relay = tokio::spawn(async move {
            let peer = CipherContext::new(crate::crypto::CipherKind::Aes256Cfb, "secret");
            let mut buf = vec![0u8; 2048];
            let n = relay_side.read(&mut buf).await.unwrap();
            let (iv, body) = buf[..n].split_at_mut(IV_LEN);
            peer.decryptor(iv).unwrap().decrypt(body).unwrap();
            let frame = HandshakeRequest::decode(body).unwrap();

            let rng = SeededRandom::new(9);
            let plain = HandshakeReply::encode(&[7, 7, 7, 7], &[0x05, 0x00, 0x00, 0x01]).unwrap();
            let (enc, reply_iv) = peer.encryptor(&rng);
            let mut reply = plain.to_vec();
            enc.encrypt(&mut reply).unwrap();
            let mut wire = reply_iv.to_vec();
            wire.extend_from_slice(&reply);
            relay_side.write_all(&wire).await.unwrap();
            frame
        });

        let mut state = RelayState::Connecting;
        let handshake = relay_handshake(&ctx, &mut client_side, &request, &mut state)
            .await
            .unwrap();
        let frame = relay.await.unwrap();

        assert_eq!(state, RelayState::HandshakeReplyReceived);
        assert_eq!(frame.tag, CLIENT_TAG);
        assert_eq!(&frame.request[..], &request[..]);
        assert_eq!(handshake.keys.outbound, frame.padding_len());
        assert_eq!(handshake.keys.inbound, 4);
        assert_eq!(&handshake.reply[..], &[0x05, 0x00, 0x00, 0x01]);
    }

    #[tokio::test]
    async fn test_relay_handshake_truncated_reply() {
        let ctx = context();
        let (mut client_side, mut relay_side) = duplex(4096);

        tokio::spawn(async move {
            let mut buf = vec![0u8; 2048];
            let _ = relay_side.read(&mut buf).await;
            relay_side.write_all(&[0u8; 10]).await.unwrap();
            // keep the pipe open until the client is done reading
            let _ = relay_side.read(&mut buf).await;
        });

        let mut state = RelayState::Connecting;
        let err = relay_handshake(&ctx, &mut client_side, &[0x05, 0x01], &mut state)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UpstreamRead(_)));
        assert_eq!(state, RelayState::HandshakeSent);
    }
}
