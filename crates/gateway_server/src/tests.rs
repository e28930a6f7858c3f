// End-to-end tests: a real gateway on an ephemeral port, backed by the
// in-memory store and loopback bus, exercised over actual WebSocket
// connections.
#[cfg(test)]
mod tests {
    use crate::auth::{Claims, JwtVerifier};
    use crate::config::GatewayConfig;
    use crate::server::GatewayServer;
    use crate::utils::create_standalone_gateway_with_config;
    use futures::{SinkExt, StreamExt};
    use huddle_room_system::{
        async_trait, Cell, LocalEventBus, MemoryRoomStore, MoveOutcome, OccupantRecord,
        ProcessId, ProximityConfig, RemoveOutcome, RoomId, RoomSpec, RoomStore, SocketId,
        StoreError, UserId,
    };
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::{
        connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream,
    };

    const SECRET: &str = "gateway-e2e-secret";
    const RECV_TIMEOUT: Duration = Duration::from_secs(5);

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    /// Starts a gateway on an ephemeral port and returns it with its address.
    async fn start_gateway(proximity: ProximityConfig) -> (GatewayServer, SocketAddr) {
        let config = GatewayConfig {
            proximity,
            ..Default::default()
        };
        let server = create_standalone_gateway_with_config(config, SECRET);
        let addr = spawn_server(&server).await;
        (server, addr)
    }

    /// Same, but against an injected store, for exercising store failures.
    async fn start_gateway_with_store(store: Arc<dyn RoomStore>) -> (GatewayServer, SocketAddr) {
        let process_id = ProcessId::new();
        let server = GatewayServer::new(
            GatewayConfig::default(),
            store,
            Arc::new(LocalEventBus::new(process_id)),
            Arc::new(JwtVerifier::new(SECRET)),
            process_id,
        );
        let addr = spawn_server(&server).await;
        (server, addr)
    }

    async fn spawn_server(server: &GatewayServer) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind an ephemeral port");
        let addr = listener.local_addr().expect("Listener has no address");
        let serving = server.clone();
        tokio::spawn(async move {
            serving.serve(listener).await.expect("Gateway failed");
        });
        addr
    }

    /// Store whose removals can be severed at will, standing in for a
    /// backend outage; every other operation passes straight through.
    struct OutageStore {
        inner: MemoryRoomStore,
        removals_severed: AtomicBool,
    }

    impl OutageStore {
        fn new() -> Self {
            Self {
                inner: MemoryRoomStore::new(),
                removals_severed: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl RoomStore for OutageStore {
        async fn create_or_join(
            &self,
            spec: &RoomSpec,
            user: &UserId,
            socket: SocketId,
            process: ProcessId,
        ) -> Result<Cell, StoreError> {
            self.inner.create_or_join(spec, user, socket, process).await
        }

        async fn add_occupant(
            &self,
            room: &RoomId,
            user: &UserId,
            socket: SocketId,
            process: ProcessId,
        ) -> Result<Cell, StoreError> {
            self.inner.add_occupant(room, user, socket, process).await
        }

        async fn remove_occupant(
            &self,
            room: &RoomId,
            user: &UserId,
            socket: SocketId,
        ) -> Result<RemoveOutcome, StoreError> {
            if self.removals_severed.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("store request timed out".into()));
            }
            self.inner.remove_occupant(room, user, socket).await
        }

        async fn move_occupant(
            &self,
            room: &RoomId,
            user: &UserId,
            target: Cell,
        ) -> Result<MoveOutcome, StoreError> {
            self.inner.move_occupant(room, user, target).await
        }

        async fn list_occupants(
            &self,
            room: &RoomId,
        ) -> Result<HashMap<UserId, OccupantRecord>, StoreError> {
            self.inner.list_occupants(room).await
        }

        async fn owner_process(&self, socket: SocketId) -> Result<Option<ProcessId>, StoreError> {
            self.inner.owner_process(socket).await
        }
    }

    async fn connect(addr: SocketAddr) -> Client {
        let (client, _) = connect_async(format!("ws://{addr}"))
            .await
            .expect("Failed to connect to the gateway");
        client
    }

    fn token_for(user: &str, space: &str) -> String {
        let claims = Claims {
            user_id: user.to_string(),
            room_id: space.to_string(),
            name: user.to_string(),
            exp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock before epoch")
                .as_secs()
                + 3600,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .expect("Failed to sign test token")
    }

    async fn send(client: &mut Client, frame: Value) {
        client
            .send(Message::Text(frame.to_string().into()))
            .await
            .expect("Failed to send a frame");
    }

    /// Reads frames until one carries the wanted event, skipping the rest.
    async fn recv_event(client: &mut Client, event: &str) -> Value {
        let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
        loop {
            let frame = tokio::time::timeout_at(deadline, client.next())
                .await
                .unwrap_or_else(|_| panic!("Timed out waiting for '{event}'"))
                .unwrap_or_else(|| panic!("Connection closed waiting for '{event}'"))
                .expect("WebSocket error");
            if let Message::Text(text) = frame {
                let value: Value = serde_json::from_str(&text).expect("Frame is not JSON");
                if value["event"] == event {
                    return value;
                }
            }
        }
    }

    async fn create_room(
        client: &mut Client,
        user: &str,
        space: &str,
        width: u32,
        height: u32,
    ) -> Value {
        send(
            client,
            json!({
                "event": "room:create",
                "token": token_for(user, space),
                "name": "e2e",
                "width": width,
                "height": height,
                "spaceId": space,
                "objectsArray": [],
            }),
        )
        .await;
        recv_event(client, "room:created").await
    }

    async fn join_room(client: &mut Client, user: &str, space: &str) -> Value {
        send(
            client,
            json!({
                "event": "room:join",
                "token": token_for(user, space),
                "spaceId": space,
            }),
        )
        .await;
        recv_event(client, "room:joined").await
    }

    async fn move_to(client: &mut Client, x: i64, y: i64) -> Value {
        send(
            client,
            json!({ "event": "player:move", "position": { "x": x, "y": y } }),
        )
        .await;
        recv_event(client, "player:move").await
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn create_then_join_delivers_mutual_near() {
        // 3x1 room, default radius 5: any two spawns are within range.
        let (_server, addr) = start_gateway(ProximityConfig::default()).await;
        let mut alice = connect(addr).await;
        let mut bob = connect(addr).await;

        let created = create_room(&mut alice, "alice", "space-near", 3, 1).await;
        assert_eq!(created["status"], "success");
        assert_eq!(created["playerId"], "alice");
        assert_eq!(created["roomId"], "space-near");

        let joined = join_room(&mut bob, "bob", "space-near").await;
        assert_eq!(joined["status"], "success");
        // The roster handed to the joiner includes everyone, itself included.
        assert!(joined["players"]["alice"].is_object());
        assert!(joined["players"]["bob"].is_object());

        // Both sides learn of each other before any far is possible.
        let near_for_alice = recv_event(&mut alice, "player-near").await;
        assert_eq!(near_for_alice["playerId"], "bob");
        let near_for_bob = recv_event(&mut bob, "player-near").await;
        assert_eq!(near_for_bob["playerId"], "alice");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn joining_a_missing_room_reports_room_not_found() {
        let (_server, addr) = start_gateway(ProximityConfig::default()).await;
        let mut client = connect(addr).await;

        send(
            &mut client,
            json!({
                "event": "room:join",
                "token": token_for("ghost", "no-such-space"),
                "spaceId": "no-such-space",
            }),
        )
        .await;
        let error = recv_event(&mut client, "error").await;
        assert_eq!(error["source"], "room:join");
        assert!(error["message"]
            .as_str()
            .expect("error carries a message")
            .contains("not found"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn moves_are_acked_with_the_authoritative_position() {
        // 1x2 room (cells (1,1) and (1,2)): one cell is the spawn, the
        // other is the only legal step.
        let (_server, addr) = start_gateway(ProximityConfig::default()).await;
        let mut client = connect(addr).await;

        let created = create_room(&mut client, "walker", "space-move", 1, 2).await;
        let spawn_y = created["spawn"]["y"].as_i64().expect("spawn has y");
        let other_y = 3 - spawn_y;

        let accepted = move_to(&mut client, 1, other_y).await;
        assert_eq!(accepted["status"], "success");
        assert_eq!(accepted["position"]["y"], other_y);

        // A wild jump is refused and the ack carries the cell to snap to.
        let rejected = move_to(&mut client, 5, 5).await;
        assert_eq!(rejected["status"], "rejected");
        assert_eq!(rejected["position"]["x"], 1);
        assert_eq!(rejected["position"]["y"], other_y);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn moving_out_of_range_delivers_player_far() {
        // 3x1 corridor with radius 1.2: only adjacent cells are in range.
        let proximity = ProximityConfig {
            radius: 1.2,
            max_peers: 10,
        };
        let (_server, addr) = start_gateway(proximity).await;
        let mut alice = connect(addr).await;
        let mut bob = connect(addr).await;

        let created = create_room(&mut alice, "alice", "space-far", 3, 1).await;
        let alice_x = created["spawn"]["x"].as_i64().expect("spawn has x");
        let joined = join_room(&mut bob, "bob", "space-far").await;
        let bob_x = joined["spawn"]["x"].as_i64().expect("spawn has x");

        // The one remaining free cell of the corridor (cells 1, 2, 3).
        let free_x = 6 - alice_x - bob_x;

        if (alice_x - bob_x).abs() == 1 {
            // Spawned adjacent: near was already exchanged on the join.
            recv_event(&mut alice, "player-near").await;
            recv_event(&mut bob, "player-near").await;
            // The end-adjacent occupant steps away to distance 2.
            if (free_x - bob_x).abs() == 1 {
                let ack = move_to(&mut bob, free_x, 1).await;
                assert_eq!(ack["status"], "success");
            } else {
                let ack = move_to(&mut alice, free_x, 1).await;
                assert_eq!(ack["status"], "success");
            }
        } else {
            // Spawned at the two ends: bob walks into the middle and back
            // out, producing a near and then a far.
            let ack = move_to(&mut bob, free_x, 1).await;
            assert_eq!(ack["status"], "success");
            recv_event(&mut alice, "player-near").await;
            recv_event(&mut bob, "player-near").await;
            let ack = move_to(&mut bob, bob_x, 1).await;
            assert_eq!(ack["status"], "success");
        }

        let far_for_alice = recv_event(&mut alice, "player-far").await;
        assert_eq!(far_for_alice["playerId"], "bob");
        let far_for_bob = recv_event(&mut bob, "player-far").await;
        assert_eq!(far_for_bob["playerId"], "alice");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn signals_are_relayed_with_the_senders_socket() {
        let (_server, addr) = start_gateway(ProximityConfig::default()).await;
        let mut alice = connect(addr).await;
        let mut bob = connect(addr).await;

        create_room(&mut alice, "alice", "space-signal", 3, 1).await;
        let joined = join_room(&mut bob, "bob", "space-signal").await;
        let alice_socket = joined["players"]["alice"]["socketId"]
            .as_str()
            .expect("roster carries socket ids")
            .to_string();
        let bob_socket = joined["players"]["bob"]["socketId"]
            .as_str()
            .expect("roster carries socket ids")
            .to_string();

        send(
            &mut bob,
            json!({
                "event": "webrtc-signal",
                "to": alice_socket,
                "data": { "sdp": "offer" },
            }),
        )
        .await;
        let relayed = recv_event(&mut alice, "webrtc-signal").await;
        assert_eq!(relayed["from"], bob_socket.as_str());
        assert_eq!(relayed["data"]["sdp"], "offer");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn leaving_broadcasts_player_left() {
        let (_server, addr) = start_gateway(ProximityConfig::default()).await;
        let mut alice = connect(addr).await;
        let mut bob = connect(addr).await;

        create_room(&mut alice, "alice", "space-leave", 3, 1).await;
        join_room(&mut bob, "bob", "space-leave").await;

        send(
            &mut bob,
            json!({
                "event": "room:leave",
                "token": token_for("bob", "space-leave"),
                "spaceId": "space-leave",
            }),
        )
        .await;
        let ack = recv_event(&mut bob, "room:leave").await;
        assert_eq!(ack["status"], "success");
        assert_eq!(ack["playerId"], "bob");

        let left = recv_event(&mut alice, "player:left").await;
        assert_eq!(left["playerId"], "bob");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn disconnect_is_handled_as_leave() {
        let (server, addr) = start_gateway(ProximityConfig::default()).await;
        let mut alice = connect(addr).await;
        let mut bob = connect(addr).await;

        create_room(&mut alice, "alice", "space-drop", 3, 1).await;
        join_room(&mut bob, "bob", "space-drop").await;
        recv_event(&mut alice, "player:joined").await;

        bob.close(None).await.expect("Failed to close");

        let left = recv_event(&mut alice, "player:left").await;
        assert_eq!(left["playerId"], "bob");

        // The handler finished its departure path; only alice remains.
        for _ in 0..50 {
            if server.connection_count().await == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(server.connection_count().await, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn tokens_are_rejected_before_any_room_operation() {
        let (server, addr) = start_gateway(ProximityConfig::default()).await;
        let mut client = connect(addr).await;

        // Garbage token.
        send(
            &mut client,
            json!({
                "event": "room:join",
                "token": "not-a-token",
                "spaceId": "space-auth",
            }),
        )
        .await;
        let error = recv_event(&mut client, "error").await;
        assert!(error["message"]
            .as_str()
            .expect("error carries a message")
            .contains("Authentication failed"));

        // Valid token for a different space.
        send(
            &mut client,
            json!({
                "event": "room:join",
                "token": token_for("mallory", "some-other-space"),
                "spaceId": "space-auth",
            }),
        )
        .await;
        recv_event(&mut client, "error").await;

        // Neither attempt created a room on this process.
        assert_eq!(server.room_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn room_tasks_stop_when_their_room_empties() {
        let (server, addr) = start_gateway(ProximityConfig::default()).await;
        let mut client = connect(addr).await;

        create_room(&mut client, "solo", "space-empty", 2, 2).await;
        assert_eq!(server.room_count(), 1);

        send(
            &mut client,
            json!({
                "event": "room:leave",
                "token": token_for("solo", "space-empty"),
                "spaceId": "space-empty",
            }),
        )
        .await;
        recv_event(&mut client, "room:leave").await;

        for _ in 0..50 {
            if server.room_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(server.room_count(), 0);

        // The room was deleted with its last occupant; the same space can
        // be created anew.
        let recreated = create_room(&mut client, "solo", "space-empty", 2, 2).await;
        assert_eq!(recreated["status"], "success");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn room_creation_rejects_out_of_range_geometry() {
        let (_server, addr) = start_gateway(ProximityConfig::default()).await;
        let mut client = connect(addr).await;

        // Zero-area and oversized grids are refused before the store is
        // touched; width times height must never overflow downstream.
        for (width, height) in [(0, 1), (1, 0), (65_536, 65_536)] {
            send(
                &mut client,
                json!({
                    "event": "room:create",
                    "token": token_for("alice", "space-geometry"),
                    "name": "e2e",
                    "width": width,
                    "height": height,
                    "spaceId": "space-geometry",
                    "objectsArray": [5],
                }),
            )
            .await;
            let error = recv_event(&mut client, "error").await;
            assert_eq!(error["source"], "room:create");
            assert_eq!(error["message"], "room dimensions out of range");
        }

        // The connection is intact and a sane geometry still succeeds.
        let created = create_room(&mut client, "alice", "space-geometry", 3, 1).await;
        assert_eq!(created["status"], "success");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn a_failed_leave_keeps_the_session_for_retry() {
        let store = Arc::new(OutageStore::new());
        let (_server, addr) = start_gateway_with_store(store.clone()).await;
        let mut client = connect(addr).await;

        let created = create_room(&mut client, "alice", "space-outage", 2, 2).await;
        assert_eq!(created["status"], "success");

        // The store goes dark; the leave fails but must not eat the session
        // while the occupant record survives in the store.
        store.removals_severed.store(true, Ordering::SeqCst);
        send(
            &mut client,
            json!({
                "event": "room:leave",
                "token": token_for("alice", "space-outage"),
                "spaceId": "space-outage",
            }),
        )
        .await;
        let error = recv_event(&mut client, "error").await;
        assert_eq!(error["source"], "room:leave");

        // Once the store recovers, the retried leave finds the session and
        // actually removes the occupant.
        store.removals_severed.store(false, Ordering::SeqCst);
        send(
            &mut client,
            json!({
                "event": "room:leave",
                "token": token_for("alice", "space-outage"),
                "spaceId": "space-outage",
            }),
        )
        .await;
        let ack = recv_event(&mut client, "room:leave").await;
        assert_eq!(ack["status"], "success");
        assert!(matches!(
            store.list_occupants(&RoomId::from("space-outage")).await,
            Err(StoreError::RoomNotFound(_))
        ));
    }
}
