//! Tunnel sessions over an accepted WebSocket

use std::sync::Arc;

use anyhow::Result;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use bytes::{Bytes, BytesMut};
use futures_util::{future, SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio_util::compat::FuturesAsyncReadCompatExt;
use uuid::Uuid;
use wisp_mux::{
    extensions::{udp::UdpProtocolExtensionBuilder, AnyProtocolExtensionBuilder},
    generic::{GenericWebSocketRead, GenericWebSocketWrite},
    CloseReason, ConnectPacket, MuxStream, ServerMux, StreamType,
};

use super::WispPolicy;

/// Accept the websocket handshake and run a tunnel session on it
pub fn upgrade(ws: WebSocketUpgrade, policy: Arc<WispPolicy>) -> Response {
    ws.on_upgrade(move |socket| async move {
        let session_id = Uuid::new_v4();
        tracing::debug!(%session_id, "tunnel session opened");

        match run(socket, policy).await {
            Ok(()) => tracing::debug!(%session_id, "tunnel session closed"),
            Err(err) => tracing::debug!(%session_id, %err, "tunnel session ended"),
        }
    })
}

/// Drive the multiplexer over the socket until the client disconnects
async fn run(socket: WebSocket, policy: Arc<WispPolicy>) -> Result<()> {
    let (sink, stream) = socket.split();

    // Tunnel packets travel as binary websocket messages. Ping/pong is
    // answered by axum; a close frame ends the underlying stream.
    let stream = stream.filter_map(|message| {
        future::ready(match message {
            Ok(Message::Binary(data)) => Some(Ok(BytesMut::from(&data[..]))),
            Ok(_) => None,
            Err(err) => Some(Err(err)),
        })
    });
    let sink =
        sink.with(|packet: Bytes| future::ready(Ok::<_, axum::Error>(Message::Binary(packet))));

    let read = GenericWebSocketRead::new(stream);
    let write = GenericWebSocketWrite::new(sink);

    let udp_extension = [AnyProtocolExtensionBuilder::new(UdpProtocolExtensionBuilder)];
    let extensions = policy.allow_udp.then(|| &udp_extension[..]);

    let (mux, driver) = ServerMux::create(read, write, policy.buffer_size, extensions)
        .await?
        .with_no_required_extensions();

    let driver = tokio::spawn(driver);

    while let Some((connect, stream)) = mux.server_new_stream().await {
        let policy = policy.clone();
        tokio::spawn(serve_stream(connect, stream, policy));
    }

    driver.await??;
    Ok(())
}

/// Service one multiplexed stream
async fn serve_stream(connect: ConnectPacket, stream: MuxStream, policy: Arc<WispPolicy>) {
    let host = connect.destination_hostname.clone();
    let port = connect.destination_port;

    // Blocked destinations are refused before any lookup or dial.
    if policy.is_blocked(&host) {
        tracing::debug!(%host, "destination blocked");
        let _ = stream.close(CloseReason::ServerStreamBlockedAddress).await;
        return;
    }

    match connect.stream_type {
        StreamType::Tcp => relay_tcp(stream, &host, port).await,
        StreamType::Udp if policy.allow_udp => relay_udp(stream, &host, port).await,
        _ => {
            let _ = stream.close(CloseReason::ServerStreamInvalidInfo).await;
        }
    }
}

/// Dial TCP and copy bytes both ways until either side closes
async fn relay_tcp(stream: MuxStream, host: &str, port: u16) {
    let mut remote = match TcpStream::connect((host, port)).await {
        Ok(remote) => remote,
        Err(err) => {
            tracing::debug!(%host, port, %err, "tcp dial failed");
            let _ = stream
                .close(CloseReason::ServerStreamConnectionRefused)
                .await;
            return;
        }
    };

    let mut tunnel = stream.into_io().into_asyncrw().compat();

    if let Err(err) = tokio::io::copy_bidirectional(&mut tunnel, &mut remote).await {
        tracing::trace!(%host, port, %err, "tcp relay ended");
    }
}

/// Dial UDP and relay datagrams both ways until either side closes
///
/// Each tunnel packet maps to one datagram, so reads on the tunnel side
/// are forwarded as-is without reframing.
async fn relay_udp(stream: MuxStream, host: &str, port: u16) {
    let socket = match UdpSocket::bind(("0.0.0.0", 0)).await {
        Ok(socket) => socket,
        Err(err) => {
            tracing::debug!(%err, "udp bind failed");
            let _ = stream.close(CloseReason::ServerStreamInvalidInfo).await;
            return;
        }
    };

    if let Err(err) = socket.connect((host, port)).await {
        tracing::debug!(%host, port, %err, "udp dial failed");
        let _ = stream
            .close(CloseReason::ServerStreamConnectionRefused)
            .await;
        return;
    }

    let tunnel = stream.into_io().into_asyncrw().compat();
    let (tunnel_rx, tunnel_tx) = tokio::io::split(tunnel);

    tokio::select! {
        result = datagrams_out(tunnel_rx, &socket) => {
            if let Err(err) = result {
                tracing::trace!(%host, port, %err, "udp relay ended (outbound)");
            }
        }
        result = datagrams_in(tunnel_tx, &socket) => {
            if let Err(err) = result {
                tracing::trace!(%host, port, %err, "udp relay ended (inbound)");
            }
        }
    }
}

/// Forward tunnel packets to the remote socket
async fn datagrams_out<R>(mut tunnel: R, socket: &UdpSocket) -> std::io::Result<()>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut buf = vec![0u8; 65536];
    loop {
        let n = tunnel.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        socket.send(&buf[..n]).await?;
    }
}

/// Forward remote datagrams back into the tunnel
async fn datagrams_in<W>(mut tunnel: W, socket: &UdpSocket) -> std::io::Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; 65536];
    loop {
        let n = socket.recv(&mut buf).await?;
        tunnel.write_all(&buf[..n]).await?;
        tunnel.flush().await?;
    }
}
