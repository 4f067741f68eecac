//! Connection handler
//!
//! Runs one client's session: reads the preferred name, registers with the
//! ChatServer, then turns each inbound line into a command until `OVER`,
//! end of stream, a transport error, or server shutdown.

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, info, warn};

use crate::codec::{Channel, LineStream};
use crate::error::AppError;
use crate::message::{Command, ServerMessage};
use crate::server::ServerCommand;
use crate::types::ClientId;

/// Handle a new TCP connection
pub async fn handle_connection(
    stream: TcpStream,
    cmd_tx: mpsc::Sender<ServerCommand>,
    shutdown: broadcast::Receiver<()>,
    client_buffer: usize,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);
    run_session(stream, &peer_addr, cmd_tx, shutdown, client_buffer).await
}

/// Drive one session over any bidirectional byte stream
///
/// Returns once the session is over and its stream has been closed (or the
/// peer stopped accepting data).
pub async fn run_session<T>(
    io: T,
    peer: &str,
    cmd_tx: mpsc::Sender<ServerCommand>,
    shutdown: broadcast::Receiver<()>,
    client_buffer: usize,
) -> Result<(), AppError>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let client_id = ClientId::new();
    let (mut sink, stream) = Channel::new(io).split();

    // Create channel for server -> client messages
    let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(client_buffer.max(1));

    // Both tasks are aborted if this session is dropped before they finish
    // Spawn read task (stream -> ServerCommand)
    let cmd_tx_read = cmd_tx.clone();
    let mut read_task = AbortOnDropHandle::new(tokio::spawn(read_loop(
        client_id,
        stream,
        cmd_tx_read,
        msg_tx,
        shutdown,
    )));

    // Spawn write task (ServerMessage -> stream); the only writer of this stream
    let mut write_task = AbortOnDropHandle::new(tokio::spawn(async move {
        while let Some(msg) = msg_rx.recv().await {
            if let Err(e) = sink.send(msg.to_string()).await {
                debug!("Send to client {} failed: {}", client_id, e);
                break;
            }
        }
        debug!("Write task ended for {}", client_id);

        let _ = sink.close().await;
    }));

    // Wait for either task to complete
    let write_done = tokio::select! {
        result = &mut read_task => {
            if let Ok(Err(e)) = result {
                warn!("Session error for {} ({}): {}", client_id, peer, e);
            }
            false
        }
        _ = &mut write_task => {
            read_task.abort();
            true
        }
    };

    // Send disconnect command; the actor drops our sender, which ends the writer
    let _ = cmd_tx.send(ServerCommand::Disconnect { client_id }).await;

    if !write_done {
        let _ = write_task.await;
    }

    info!("Client {} ({}) disconnected", client_id, peer);

    Ok(())
}

/// Registration handshake followed by the command loop
async fn read_loop<T>(
    client_id: ClientId,
    mut stream: LineStream<T>,
    cmd_tx: mpsc::Sender<ServerCommand>,
    msg_tx: mpsc::Sender<ServerMessage>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), AppError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    // The first unit is the preferred name, taken verbatim
    let preferred_name = tokio::select! {
        frame = stream.next() => match frame {
            Some(frame) => frame?,
            None => {
                debug!("Client {} left before registering", client_id);
                return Ok(());
            }
        },
        _ = shutdown.recv() => return Ok(()),
    };

    let (reply_tx, reply_rx) = oneshot::channel();
    cmd_tx
        .send(ServerCommand::Register {
            client_id,
            preferred_name,
            sender: msg_tx,
            reply: reply_tx,
        })
        .await
        .map_err(|_| AppError::ChannelSend)?;

    let name = reply_rx.await.map_err(|_| AppError::ChannelSend)?;
    debug!("Client {} is active as '{}'", client_id, name);

    loop {
        let frame = tokio::select! {
            biased;
            _ = shutdown.recv() => {
                debug!("Shutdown, ending session for {}", client_id);
                break;
            }
            frame = stream.next() => frame,
        };

        let line = match frame {
            Some(Ok(line)) => line,
            Some(Err(e)) => return Err(e),
            None => {
                debug!("Client {} closed the stream", client_id);
                break;
            }
        };

        let cmd = match Command::parse(&line) {
            Ok(Command::Over) => {
                debug!("Client {} sent OVER", client_id);
                break;
            }
            Ok(command) => command_to_server(client_id, command),
            Err(e) => ServerCommand::Reply {
                client_id,
                message: e.into(),
            },
        };

        if cmd_tx.send(cmd).await.is_err() {
            debug!("Server closed, ending read task for {}", client_id);
            break;
        }
    }

    Ok(())
}

/// Convert a parsed Command to a ServerCommand
fn command_to_server(client_id: ClientId, command: Command) -> ServerCommand {
    match command {
        Command::Increment => ServerCommand::Increment { client_id },
        Command::Get => ServerCommand::GetCounter { client_id },
        Command::List => ServerCommand::ListClients { client_id },
        Command::DirectMessage { recipient, content } => ServerCommand::DirectMessage {
            client_id,
            recipient,
            content,
        },
        Command::CreateRoom { room } => ServerCommand::CreateRoom { client_id, room },
        Command::JoinRoom { room } => ServerCommand::JoinRoom { client_id, room },
        Command::LeaveRoom { room } => ServerCommand::LeaveRoom { client_id, room },
        Command::SendToRoom { room, content } => ServerCommand::SendToRoom {
            client_id,
            room,
            content,
        },
        // OVER never reaches the server; it ends the read loop
        Command::Over | Command::Unknown => ServerCommand::Reply {
            client_id,
            message: ServerMessage::Help,
        },
    }
}
