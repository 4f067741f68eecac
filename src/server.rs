//! ChatServer Actor implementation
//!
//! The central actor that owns all shared state: the client registry, the
//! room registry and the counter. Handlers talk to it through an mpsc channel,
//! so every operation is applied atomically and in the order each connection
//! issued it.

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::client::ClientRegistry;
use crate::error::{AppError, SendError};
use crate::message::ServerMessage;
use crate::room::RoomRegistry;
use crate::types::ClientId;

/// Commands sent from handlers to the ChatServer actor
#[derive(Debug)]
pub enum ServerCommand {
    /// Registration handshake; the assigned name is sent back on `reply`
    Register {
        client_id: ClientId,
        preferred_name: String,
        sender: mpsc::Sender<ServerMessage>,
        reply: oneshot::Sender<String>,
    },
    /// Client disconnected
    Disconnect { client_id: ClientId },
    /// Increment the counter and tell everyone
    Increment { client_id: ClientId },
    /// Report the counter value
    GetCounter { client_id: ClientId },
    /// Report connected client names
    ListClients { client_id: ClientId },
    /// Direct message to a named client
    DirectMessage {
        client_id: ClientId,
        recipient: String,
        content: String,
    },
    /// Create a room and join it
    CreateRoom { client_id: ClientId, room: String },
    /// Join an existing room
    JoinRoom { client_id: ClientId, room: String },
    /// Leave a room
    LeaveRoom { client_id: ClientId, room: String },
    /// Broadcast within a room, excluding the sender
    SendToRoom {
        client_id: ClientId,
        room: String,
        content: String,
    },
    /// Send a prepared reply (help text, format errors) in command order
    Reply {
        client_id: ClientId,
        message: ServerMessage,
    },
}

/// The main ChatServer actor
pub struct ChatServer {
    /// Registered clients
    clients: ClientRegistry,
    /// All rooms, including empty ones
    rooms: RoomRegistry,
    /// Shared counter
    counter: i64,
    /// Command receiver channel
    receiver: mpsc::Receiver<ServerCommand>,
}

impl ChatServer {
    /// Create a new ChatServer with the given command receiver
    pub fn new(receiver: mpsc::Receiver<ServerCommand>) -> Self {
        Self {
            clients: ClientRegistry::new(),
            rooms: RoomRegistry::new(),
            counter: 0,
            receiver,
        }
    }

    /// Run the ChatServer event loop
    ///
    /// Continuously receives and processes commands until all senders are dropped.
    pub async fn run(mut self) {
        info!("ChatServer started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!(
            "ChatServer shutting down ({} clients, {} rooms)",
            self.clients.len(),
            self.rooms.len()
        );
    }

    /// Process a single command
    fn handle_command(&mut self, cmd: ServerCommand) {
        match cmd {
            ServerCommand::Register {
                client_id,
                preferred_name,
                sender,
                reply,
            } => {
                self.handle_register(client_id, &preferred_name, sender, reply);
            }
            ServerCommand::Disconnect { client_id } => {
                self.handle_disconnect(client_id);
            }
            ServerCommand::Increment { client_id } => {
                self.handle_increment(client_id);
            }
            ServerCommand::GetCounter { client_id } => {
                self.deliver(client_id, ServerMessage::CounterValue { value: self.counter });
            }
            ServerCommand::ListClients { client_id } => {
                let names = self.clients.list_names();
                self.reply_or_too_long(client_id, ServerMessage::ClientList { names });
            }
            ServerCommand::DirectMessage {
                client_id,
                recipient,
                content,
            } => {
                self.handle_direct_message(client_id, recipient, content);
            }
            ServerCommand::CreateRoom { client_id, room } => {
                self.handle_create_room(client_id, &room);
            }
            ServerCommand::JoinRoom { client_id, room } => {
                self.handle_join_room(client_id, room);
            }
            ServerCommand::LeaveRoom { client_id, room } => {
                self.handle_leave_room(client_id, room);
            }
            ServerCommand::SendToRoom {
                client_id,
                room,
                content,
            } => {
                self.handle_send_to_room(client_id, &room, content);
            }
            ServerCommand::Reply { client_id, message } => {
                self.deliver(client_id, message);
            }
        }
    }

    /// Handle the registration handshake
    fn handle_register(
        &mut self,
        client_id: ClientId,
        preferred_name: &str,
        sender: mpsc::Sender<ServerMessage>,
        reply: oneshot::Sender<String>,
    ) {
        let name = self.clients.register_unique(client_id, preferred_name, sender);
        info!("Client {} registered as '{}'", client_id, name);
        debug!("Total clients: {}", self.clients.len());

        if self.deliver(client_id, ServerMessage::Registered { name: name.clone() }) {
            let _ = reply.send(name);
        }
    }

    /// Handle client disconnection (explicit or after a failed delivery)
    fn handle_disconnect(&mut self, client_id: ClientId) {
        self.rooms.remove_everywhere(client_id);
        if let Some(client) = self.clients.unregister(client_id) {
            info!("Client {} ('{}') disconnected", client_id, client.name);
            debug!(
                "Total clients: {}, Total rooms: {}",
                self.clients.len(),
                self.rooms.len()
            );
        }
    }

    fn handle_increment(&mut self, client_id: ClientId) {
        let Some(name) = self.name_of(client_id) else {
            return;
        };

        self.counter = self.counter.wrapping_add(1);
        debug!("Client {} incremented counter to {}", client_id, self.counter);

        let msg = ServerMessage::CounterIncremented {
            by: name,
            value: self.counter,
        };
        self.deliver_all(self.clients.ids(), msg);
    }

    fn handle_direct_message(&mut self, client_id: ClientId, recipient: String, content: String) {
        let Some(from) = self.name_of(client_id) else {
            return;
        };

        let Some(target) = self.clients.lookup_by_name(&recipient) else {
            self.deliver(client_id, AppError::RecipientNotFound(recipient).into());
            return;
        };

        let msg = ServerMessage::Direct { from, content };
        if !msg.fits_frame() {
            self.deliver(client_id, AppError::MessageTooLong.into());
            return;
        }

        debug!("DM from client {} to '{}'", client_id, recipient);
        self.deliver(target, msg);
    }

    fn handle_create_room(&mut self, client_id: ClientId, room: &str) {
        if !self.clients.contains(client_id) {
            return;
        }

        let reply = match self.rooms.create_room(room, client_id) {
            Ok(room) => {
                info!("Client {} created room '{}'", client_id, room);
                ServerMessage::RoomCreated { room }
            }
            Err(e) => e.into(),
        };
        self.deliver(client_id, reply);
    }

    fn handle_join_room(&mut self, client_id: ClientId, room: String) {
        if !self.clients.contains(client_id) {
            return;
        }

        let reply = match self.rooms.join(&room, client_id) {
            Ok(()) => {
                info!("Client {} joined room '{}'", client_id, room);
                ServerMessage::RoomJoined { room }
            }
            Err(e) => e.into(),
        };
        self.deliver(client_id, reply);
    }

    fn handle_leave_room(&mut self, client_id: ClientId, room: String) {
        if !self.clients.contains(client_id) {
            return;
        }

        let reply = match self.rooms.leave(&room, client_id) {
            Ok(()) => {
                info!("Client {} left room '{}'", client_id, room);
                ServerMessage::RoomLeft { room }
            }
            Err(e) => e.into(),
        };
        self.deliver(client_id, reply);
    }

    fn handle_send_to_room(&mut self, client_id: ClientId, room: &str, content: String) {
        let Some(from) = self.name_of(client_id) else {
            return;
        };

        match self.rooms.recipients(room, client_id) {
            Ok(recipients) => {
                let msg = ServerMessage::Room {
                    room: room.to_string(),
                    from,
                    content,
                };
                if !msg.fits_frame() {
                    self.deliver(client_id, AppError::MessageTooLong.into());
                    return;
                }

                debug!(
                    "Client {} sent to room '{}' ({} recipients)",
                    client_id,
                    room,
                    recipients.len()
                );
                self.deliver_all(recipients, msg);
            }
            Err(e) => {
                self.deliver(client_id, e.into());
            }
        }
    }

    fn name_of(&self, client_id: ClientId) -> Option<String> {
        self.clients.get(client_id).map(|c| c.name.clone())
    }

    /// Send `msg` to the caller, or a too-long error if it cannot be framed
    fn reply_or_too_long(&mut self, client_id: ClientId, msg: ServerMessage) {
        if msg.fits_frame() {
            self.deliver(client_id, msg);
        } else {
            self.deliver(client_id, AppError::MessageTooLong.into());
        }
    }

    /// Queue a message for one client
    ///
    /// A closed queue means the connection is gone. A full queue means the
    /// client has stopped reading for at least `client_buffer` messages;
    /// its connection may still be open, but it is dropped the same way so
    /// one stalled reader can never hold up the actor. Either way the client
    /// is removed from every registry.
    ///
    /// Text that cannot be framed is discarded without touching the client.
    /// Returns whether the message was queued.
    fn deliver(&mut self, client_id: ClientId, msg: ServerMessage) -> bool {
        if !msg.fits_frame() {
            warn!("Dropping oversized message for client {}", client_id);
            return false;
        }

        let result = match self.clients.get(client_id) {
            Some(client) => client.send(msg),
            None => return false,
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                match e {
                    SendError::ChannelClosed => {
                        debug!("Client {} is gone, dropping it", client_id)
                    }
                    SendError::Lagging => {
                        warn!("Client {} is not keeping up, dropping it", client_id)
                    }
                }
                self.handle_disconnect(client_id);
                false
            }
        }
    }

    /// Queue a message for each client, attempting every one
    fn deliver_all(&mut self, targets: Vec<ClientId>, msg: ServerMessage) {
        for target in targets {
            self.deliver(target, msg.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ErrorCode;

    struct TestClient {
        id: ClientId,
        name: String,
        rx: mpsc::Receiver<ServerMessage>,
    }

    impl TestClient {
        async fn recv(&mut self) -> ServerMessage {
            self.rx.recv().await.expect("client channel closed")
        }

        fn assert_idle(&mut self) {
            assert!(self.rx.try_recv().is_err(), "unexpected message for {}", self.name);
        }
    }

    fn spawn_server() -> mpsc::Sender<ServerCommand> {
        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(ChatServer::new(rx).run());
        tx
    }

    async fn register(tx: &mpsc::Sender<ServerCommand>, preferred: &str) -> TestClient {
        let id = ClientId::new();
        let (msg_tx, mut rx) = mpsc::channel(256);
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(ServerCommand::Register {
            client_id: id,
            preferred_name: preferred.to_string(),
            sender: msg_tx,
            reply: reply_tx,
        })
        .await
        .unwrap();

        let name = reply_rx.await.unwrap();
        assert_eq!(
            rx.recv().await.unwrap(),
            ServerMessage::Registered { name: name.clone() }
        );
        TestClient { id, name, rx }
    }

    /// Round trip through the actor so every earlier command is applied
    async fn sync(tx: &mpsc::Sender<ServerCommand>) {
        let marker = register(tx, "__sync").await;
        tx.send(ServerCommand::Disconnect { client_id: marker.id })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_names_get_suffixes() {
        let tx = spawn_server();
        let a = register(&tx, "bob").await;
        let b = register(&tx, "bob").await;
        let c = register(&tx, "bob").await;

        assert_eq!(a.name, "bob");
        assert_eq!(b.name, "bob#1");
        assert_eq!(c.name, "bob#2");
    }

    #[tokio::test]
    async fn test_concurrent_registration_is_unique() {
        let tx = spawn_server();
        let mut tasks = Vec::new();
        for _ in 0..20 {
            let tx = tx.clone();
            tasks.push(tokio::spawn(async move { register(&tx, "n").await }));
        }

        let mut names = Vec::new();
        let mut clients = Vec::new();
        for task in tasks {
            let client = task.await.unwrap();
            names.push(client.name.clone());
            clients.push(client);
        }
        names.sort();

        let mut expected: Vec<String> = (1..20).map(|i| format!("n#{}", i)).collect();
        expected.push("n".to_string());
        expected.sort();
        assert_eq!(names, expected);
    }

    #[tokio::test]
    async fn test_get_before_increment() {
        let tx = spawn_server();
        let mut a = register(&tx, "alice").await;

        tx.send(ServerCommand::GetCounter { client_id: a.id })
            .await
            .unwrap();
        assert_eq!(a.recv().await, ServerMessage::CounterValue { value: 0 });
    }

    #[tokio::test]
    async fn test_increment_broadcasts_to_everyone() {
        let tx = spawn_server();
        let mut a = register(&tx, "alice").await;
        let mut b = register(&tx, "bob").await;

        tx.send(ServerCommand::Increment { client_id: a.id })
            .await
            .unwrap();

        let expected = ServerMessage::CounterIncremented {
            by: "alice".to_string(),
            value: 1,
        };
        assert_eq!(a.recv().await, expected);
        assert_eq!(b.recv().await, expected);
        assert_eq!(expected.to_string(), "alice incremented counter to 1");
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_consecutive() {
        let tx = spawn_server();
        let mut observer = register(&tx, "observer").await;
        let mut workers = Vec::new();
        for i in 0..5 {
            workers.push(register(&tx, &format!("w{}", i)).await);
        }

        let mut tasks = Vec::new();
        for worker in &workers {
            let tx = tx.clone();
            let id = worker.id;
            tasks.push(tokio::spawn(async move {
                for _ in 0..10 {
                    tx.send(ServerCommand::Increment { client_id: id })
                        .await
                        .unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        for expected in 1..=50 {
            match observer.recv().await {
                ServerMessage::CounterIncremented { value, .. } => assert_eq!(value, expected),
                other => panic!("unexpected message: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_list_clients() {
        let tx = spawn_server();
        let mut a = register(&tx, "bob").await;
        let _b = register(&tx, "alice").await;

        tx.send(ServerCommand::ListClients { client_id: a.id })
            .await
            .unwrap();
        assert_eq!(
            a.recv().await.to_string(),
            "Connected Clients:\n - alice\n - bob"
        );
    }

    #[tokio::test]
    async fn test_direct_message() {
        let tx = spawn_server();
        let mut a = register(&tx, "alice").await;
        let mut b = register(&tx, "bob").await;

        tx.send(ServerCommand::DirectMessage {
            client_id: a.id,
            recipient: "bob".to_string(),
            content: "hi".to_string(),
        })
        .await
        .unwrap();
        assert_eq!(b.recv().await.to_string(), "alice: hi");

        tx.send(ServerCommand::DirectMessage {
            client_id: a.id,
            recipient: "carol".to_string(),
            content: "hi".to_string(),
        })
        .await
        .unwrap();
        assert_eq!(a.recv().await.to_string(), "No client with name carol found.");

        sync(&tx).await;
        a.assert_idle();
        b.assert_idle();
    }

    #[tokio::test]
    async fn test_room_scenario() {
        let tx = spawn_server();
        let mut a = register(&tx, "bob").await;
        let mut b = register(&tx, "bob").await;
        assert_eq!(b.name, "bob#1");

        tx.send(ServerCommand::CreateRoom {
            client_id: a.id,
            room: "team".to_string(),
        })
        .await
        .unwrap();
        assert_eq!(
            a.recv().await.to_string(),
            "Room 'team' created successfully. You are now in this room."
        );

        tx.send(ServerCommand::JoinRoom {
            client_id: b.id,
            room: "team".to_string(),
        })
        .await
        .unwrap();
        assert_eq!(b.recv().await.to_string(), "Joined room: team");

        tx.send(ServerCommand::SendToRoom {
            client_id: a.id,
            room: "team".to_string(),
            content: "hello".to_string(),
        })
        .await
        .unwrap();
        assert_eq!(b.recv().await.to_string(), "[Room: team] bob: hello");

        sync(&tx).await;
        a.assert_idle();
    }

    #[tokio::test]
    async fn test_room_errors() {
        let tx = spawn_server();
        let mut a = register(&tx, "alice").await;

        tx.send(ServerCommand::CreateRoom {
            client_id: a.id,
            room: "  ".to_string(),
        })
        .await
        .unwrap();
        assert!(matches!(
            a.recv().await,
            ServerMessage::Error {
                code: ErrorCode::EmptyRoomName,
                ..
            }
        ));

        tx.send(ServerCommand::JoinRoom {
            client_id: a.id,
            room: "ghost".to_string(),
        })
        .await
        .unwrap();
        assert_eq!(a.recv().await.to_string(), "Room 'ghost' does not exist.");

        tx.send(ServerCommand::SendToRoom {
            client_id: a.id,
            room: "ghost".to_string(),
            content: "boo".to_string(),
        })
        .await
        .unwrap();
        assert_eq!(a.recv().await.to_string(), "Room 'ghost' does not exist.");

        tx.send(ServerCommand::CreateRoom {
            client_id: a.id,
            room: "team".to_string(),
        })
        .await
        .unwrap();
        a.recv().await;
        tx.send(ServerCommand::LeaveRoom {
            client_id: a.id,
            room: "team".to_string(),
        })
        .await
        .unwrap();
        assert_eq!(a.recv().await.to_string(), "Left room: team");

        tx.send(ServerCommand::LeaveRoom {
            client_id: a.id,
            room: "team".to_string(),
        })
        .await
        .unwrap();
        assert_eq!(a.recv().await.to_string(), "You are not in room 'team'.");
    }

    #[tokio::test]
    async fn test_room_names_independent_of_client_names() {
        let tx = spawn_server();
        let mut a = register(&tx, "team").await;

        for expected in ["team", "team#1"] {
            tx.send(ServerCommand::CreateRoom {
                client_id: a.id,
                room: "team".to_string(),
            })
            .await
            .unwrap();
            assert_eq!(a.recv().await, ServerMessage::RoomCreated {
                room: expected.to_string()
            });
        }
    }

    #[tokio::test]
    async fn test_broken_member_does_not_block_room_send() {
        let tx = spawn_server();
        let mut a = register(&tx, "alice").await;
        let b = register(&tx, "bob").await;
        let mut c = register(&tx, "carol").await;

        for (client, cmd) in [(a.id, "create"), (b.id, "join"), (c.id, "join")] {
            let room = "team".to_string();
            let cmd = if cmd == "create" {
                ServerCommand::CreateRoom { client_id: client, room }
            } else {
                ServerCommand::JoinRoom { client_id: client, room }
            };
            tx.send(cmd).await.unwrap();
        }
        a.recv().await;
        c.recv().await;

        // bob's connection is gone without a Disconnect
        drop(b);

        tx.send(ServerCommand::SendToRoom {
            client_id: a.id,
            room: "team".to_string(),
            content: "still here?".to_string(),
        })
        .await
        .unwrap();
        assert_eq!(c.recv().await.to_string(), "[Room: team] alice: still here?");

        // bob was dropped from the registry as well
        tx.send(ServerCommand::ListClients { client_id: a.id })
            .await
            .unwrap();
        assert_eq!(
            a.recv().await.to_string(),
            "Connected Clients:\n - alice\n - carol"
        );
    }

    #[tokio::test]
    async fn test_stalled_client_is_dropped() {
        let tx = spawn_server();
        let mut a = register(&tx, "alice").await;

        // A connected client that never reads, with room for one message
        let stalled = ClientId::new();
        let (msg_tx, _stalled_rx) = mpsc::channel(1);
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(ServerCommand::Register {
            client_id: stalled,
            preferred_name: "slow".to_string(),
            sender: msg_tx,
            reply: reply_tx,
        })
        .await
        .unwrap();
        assert_eq!(reply_rx.await.unwrap(), "slow");

        // The registration reply fills its queue, so the broadcast finds it full
        tx.send(ServerCommand::Increment { client_id: a.id })
            .await
            .unwrap();
        assert_eq!(a.recv().await.to_string(), "alice incremented counter to 1");

        tx.send(ServerCommand::ListClients { client_id: a.id })
            .await
            .unwrap();
        assert_eq!(a.recv().await.to_string(), "Connected Clients:\n - alice");
    }

    #[tokio::test]
    async fn test_disconnect_releases_name_and_membership() {
        let tx = spawn_server();
        let a = register(&tx, "alice").await;
        let mut b = register(&tx, "bob").await;

        tx.send(ServerCommand::CreateRoom {
            client_id: b.id,
            room: "team".to_string(),
        })
        .await
        .unwrap();
        b.recv().await;
        tx.send(ServerCommand::JoinRoom {
            client_id: a.id,
            room: "team".to_string(),
        })
        .await
        .unwrap();

        tx.send(ServerCommand::Disconnect { client_id: a.id })
            .await
            .unwrap();
        tx.send(ServerCommand::Disconnect { client_id: a.id })
            .await
            .unwrap();

        let again = register(&tx, "alice").await;
        assert_eq!(again.name, "alice");

        tx.send(ServerCommand::SendToRoom {
            client_id: b.id,
            room: "team".to_string(),
            content: "anyone?".to_string(),
        })
        .await
        .unwrap();
        sync(&tx).await;
        b.assert_idle();
    }
}
