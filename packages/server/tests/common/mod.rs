//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use futures_util::{SinkExt, StreamExt};
use tokio::{net::TcpStream, sync::oneshot, task::JoinHandle};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use utage_server::{
    config::{CoordinatorConfig, ErrorPolicyConfig, ServerConfig, WorkerConfig},
    domain::MetadataLookup,
    infrastructure::{
        broadcaster::WebSocketRoomBroadcaster,
        metadata::StaticMetadataCatalog,
        repository::{InMemoryQueueItemRepository, InMemoryRoomRepository},
        store::InMemoryStore,
    },
    ui::{AppState, Server},
    usecase::{RoomLockRegistry, RoomSync},
    worker::{MetricsRegistry, ProcessorContext, WorkerFactory, WorkerStores, WorkerSupervisor},
};
use utage_shared::time::{Clock, SystemClock};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Config with short delays so workers react within a test's lifetime
pub fn fast_config() -> ServerConfig {
    ServerConfig {
        coordinator: CoordinatorConfig {
            heartbeat_interval: Duration::from_millis(50),
            heartbeat_timeout: Duration::from_secs(2),
            record_ttl: Duration::from_secs(5),
            reap_interval: Duration::from_millis(50),
        },
        error_policy: ErrorPolicyConfig {
            base_delay: Duration::from_millis(5),
            ..ErrorPolicyConfig::default()
        },
        worker: WorkerConfig {
            count: 1,
            dequeue_timeout: Duration::from_millis(50),
            idle_delay: Duration::from_millis(5),
            backoff_delay: Duration::from_millis(5),
            restart_delay: Duration::from_millis(5),
            max_video_duration_seconds: 600,
        },
        ..ServerConfig::default()
    }
}

/// In-process server bound to an ephemeral port
pub struct TestServer {
    pub addr: SocketAddr,
    pub store: Arc<InMemoryStore>,
    pub rooms: Arc<InMemoryRoomRepository>,
    pub items: Arc<InMemoryQueueItemRepository>,
    pub factory: WorkerFactory,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start(config: ServerConfig, lookup: Arc<dyn MetadataLookup>) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = Arc::new(InMemoryStore::new(clock.clone()));
        let stores = WorkerStores {
            queue: store.clone(),
            registry: store.clone(),
            rate_limits: store.clone(),
            control: store.clone(),
        };
        let rooms = Arc::new(InMemoryRoomRepository::new());
        let items = Arc::new(InMemoryQueueItemRepository::new());
        let broadcaster = Arc::new(WebSocketRoomBroadcaster::new(clock.clone()));
        let room_locks = Arc::new(RoomLockRegistry::new());
        let room_sync = Arc::new(RoomSync::new(items.clone(), broadcaster, clock.clone()));

        let metrics = Arc::new(MetricsRegistry::new().unwrap());
        let state = Arc::new(AppState::new(
            rooms.clone(),
            items.clone(),
            &stores,
            room_locks.clone(),
            room_sync.clone(),
            clock.clone(),
            metrics.clone(),
            &config,
        ));
        let context = ProcessorContext {
            items: items.clone(),
            rooms: rooms.clone(),
            lookup,
            room_locks,
            room_sync,
            max_video_duration_seconds: config.worker.max_video_duration_seconds,
        };
        let factory = WorkerFactory::new(stores, context, clock, config, metrics);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown, signal) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let _ = Server::new(state)
                .serve(listener, async move {
                    let _ = signal.await;
                })
                .await;
        });

        TestServer {
            addr,
            store,
            rooms,
            items,
            factory,
            shutdown: Some(shutdown),
            handle,
        }
    }

    pub fn start_workers(&self, count: usize) -> WorkerSupervisor {
        WorkerSupervisor::start(self.factory.clone(), count, Duration::from_millis(5))
    }

    pub fn http(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn connect(&self, user_id: &str) -> WsClient {
        let url = format!("ws://{}/ws?user_id={}", self.addr, user_id);
        let (ws, _) = connect_async(url).await.unwrap();
        ws
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        self.handle.abort();
    }
}

pub fn catalog() -> Arc<StaticMetadataCatalog> {
    Arc::new(StaticMetadataCatalog::new())
}

/// `POST /api/rooms` as `user_id`; returns the room id
pub async fn create_room(server: &TestServer, user_id: &str, body: serde_json::Value) -> String {
    let response = reqwest::Client::new()
        .post(server.http("/api/rooms"))
        .header("x-user-id", user_id)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::CREATED);
    let room: serde_json::Value = response.json().await.unwrap();
    room["id"].as_str().unwrap().to_string()
}

pub async fn send_event(ws: &mut WsClient, event: serde_json::Value) {
    ws.send(Message::Text(event.to_string().into())).await.unwrap();
}

/// Next JSON frame, failing the test after two seconds
pub async fn next_event(ws: &mut WsClient) -> serde_json::Value {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("connection closed")
            .expect("websocket error");
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Skip frames until one with the given event name arrives
pub async fn wait_for_event(ws: &mut WsClient, name: &str) -> serde_json::Value {
    loop {
        let event = next_event(ws).await;
        if event["event"] == name {
            return event;
        }
    }
}

/// Poll `check` until it returns true, failing after two seconds
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within two seconds");
}
