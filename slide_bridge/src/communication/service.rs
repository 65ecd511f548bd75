use std::{io, net::SocketAddr};

use anyhow::Context as _;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    net::TcpListener,
    sync::{
        broadcast::{self, error::RecvError},
        mpsc,
    },
};
use tracing::{debug, info, warn};

use crate::{
    communication::{
        RequestEnvelope,
        commands::{envelope, format_change, format_response, parse_command},
    },
    model::server::ChangeNotification,
};

async fn stream_changes<W: AsyncWrite + Unpin>(
    writer: &mut W,
    mut changes: broadcast::Receiver<ChangeNotification>,
) -> io::Result<()> {
    loop {
        match changes.recv().await {
            Ok(change) => writer.write_all(format_change(&change).as_bytes()).await?,
            Err(RecvError::Lagged(missed)) => {
                writer
                    .write_all(format!("Error: {} changes dropped\n", missed).as_bytes())
                    .await?
            }
            Err(RecvError::Closed) => return Ok(()),
        }
    }
}

/// Serves one client until it disconnects. A `subscribe` turns the rest of
/// the connection into a change stream.
pub async fn handle_connection<S>(
    stream: S,
    request_tx: mpsc::Sender<RequestEnvelope>,
    notifier: broadcast::Sender<ChangeNotification>,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let Some(request) = parse_command(&line) else {
            writer
                .write_all(format!("Error: Invalid command '{}'\n", line.trim()).as_bytes())
                .await?;
            continue;
        };

        if request.is_subscribe() {
            return stream_changes(&mut writer, notifier.subscribe()).await;
        }

        let (envelope, response_rx) = envelope(request);
        let reply = if request_tx.send(envelope).await.is_err() {
            "Error: Server loop is not running\n".to_string()
        } else {
            match response_rx.await {
                Ok(result) => format_response(&result),
                Err(_) => "Error: Request was dropped\n".to_string(),
            }
        };
        writer.write_all(reply.as_bytes()).await?;
    }

    Ok(())
}

pub async fn run_communication_layer(
    addr: SocketAddr,
    request_tx: mpsc::Sender<RequestEnvelope>,
    notifier: broadcast::Sender<ChangeNotification>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on {}", addr);

    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(connection) => connection,
            Err(e) => {
                warn!("Failed to accept connection: {}", e);
                continue;
            }
        };
        debug!("Client {} connected", peer);

        let request_tx = request_tx.clone();
        let notifier = notifier.clone();

        tokio::spawn(async move {
            match handle_connection(socket, request_tx, notifier).await {
                Ok(()) => debug!("Client {} disconnected", peer),
                Err(e) => debug!("Client {} dropped: {}", peer, e),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::DuplexStream;

    use super::*;
    use crate::{
        bridge::gateway::CommandStatus,
        communication::{Request, Response},
        model::Variant,
    };

    type Client = (
        tokio::io::Lines<BufReader<tokio::io::ReadHalf<DuplexStream>>>,
        tokio::io::WriteHalf<DuplexStream>,
    );

    /// Answers every request the way a server loop would, without slides.
    fn serve(
        request_tx: mpsc::Sender<RequestEnvelope>,
        notifier: broadcast::Sender<ChangeNotification>,
    ) -> Client {
        let (client, server) = tokio::io::duplex(4096);
        tokio::spawn(handle_connection(server, request_tx, notifier));

        let (reader, writer) = tokio::io::split(client);
        (BufReader::new(reader).lines(), writer)
    }

    fn fake_loop() -> mpsc::Sender<RequestEnvelope> {
        let (request_tx, mut request_rx) = mpsc::channel::<RequestEnvelope>(8);
        tokio::spawn(async move {
            while let Some(RequestEnvelope { request, response }) = request_rx.recv().await {
                let result = match request {
                    Request::Read { .. } => Ok(Response::Value(Variant::Boolean(true))),
                    _ => Ok(Response::Called(CommandStatus::ok())),
                };
                let _ = response.send(result);
            }
        });
        request_tx
    }

    #[tokio::test]
    async fn requests_are_answered_in_order() {
        let (notifier, _) = broadcast::channel(8);
        let (mut lines, mut writer) = serve(fake_loop(), notifier);

        writer
            .write_all(b"read:Cross Slide:busy\nnonsense\ncall:Cross Slide:stop\n")
            .await
            .unwrap();

        assert_eq!(lines.next_line().await.unwrap().unwrap(), "Value: true");
        assert_eq!(
            lines.next_line().await.unwrap().unwrap(),
            "Error: Invalid command 'nonsense'"
        );
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "Good: Ok");
    }

    #[tokio::test]
    async fn stopped_loop_is_reported() {
        let (request_tx, request_rx) = mpsc::channel(1);
        drop(request_rx);
        let (notifier, _) = broadcast::channel(8);
        let (mut lines, mut writer) = serve(request_tx, notifier);

        writer.write_all(b"browse\n").await.unwrap();

        assert_eq!(
            lines.next_line().await.unwrap().unwrap(),
            "Error: Server loop is not running"
        );
    }

    #[tokio::test]
    async fn subscribe_streams_changes() {
        let (notifier, _) = broadcast::channel(8);
        let (mut lines, mut writer) = serve(fake_loop(), notifier.clone());

        writer.write_all(b"subscribe\n").await.unwrap();
        while notifier.receiver_count() == 0 {
            tokio::task::yield_now().await;
        }
        notifier
            .send(ChangeNotification {
                object: "Cross Slide".to_string(),
                variable: "position [mm]".to_string(),
                value: Variant::Double(2.5),
            })
            .unwrap();

        assert_eq!(
            lines.next_line().await.unwrap().unwrap(),
            "Changed: Cross Slide:position [mm]:2.5"
        );
    }
}
