//! Room synchronization over the public HTTP and WebSocket surfaces.

mod common;

use common::{TestServer, catalog, create_room, next_event, send_event, wait_for_event};
use reqwest::StatusCode;
use serde_json::json;
use utage_server::config::ServerConfig;

#[tokio::test]
async fn test_late_joiner_receives_current_playback_position() {
    // テスト項目: 再生中に参加したクライアントはスナップショットで現在位置を受け取る
    // given (前提条件):
    let server = TestServer::start(ServerConfig::default(), catalog()).await;
    let room_id = create_room(&server, "host", json!({ "name": "Late joiner" })).await;

    let mut host = server.connect("host").await;
    send_event(&mut host, json!({ "event": "join-room", "data": { "roomId": room_id } })).await;
    let snapshot = wait_for_event(&mut host, "room-snapshot").await;
    assert_eq!(snapshot["data"]["player"]["isPlaying"], false);

    send_event(
        &mut host,
        json!({
            "event": "player-command",
            "data": { "roomId": room_id, "command": "play", "time": 15.0 }
        }),
    )
    .await;
    let relayed = wait_for_event(&mut host, "player-command").await;
    assert_eq!(relayed["data"]["command"], "play");

    // when (操作):
    let mut viewer = server.connect("viewer").await;
    send_event(&mut viewer, json!({ "event": "join-room", "data": { "roomId": room_id } })).await;
    let snapshot = wait_for_event(&mut viewer, "room-snapshot").await;

    // then (期待する結果):
    assert_eq!(snapshot["data"]["roomId"], room_id.as_str());
    assert_eq!(snapshot["data"]["player"]["isPlaying"], true);
    let current_time = snapshot["data"]["player"]["currentTime"].as_f64().unwrap();
    assert!(current_time >= 15.0, "currentTime was {current_time}");
}

#[tokio::test]
async fn test_reorder_moves_item_and_broadcasts_full_queue() {
    // テスト項目: 並べ替えで位置が振り直され、全件の queue-updated が配信される
    // given (前提条件):
    let server = TestServer::start(ServerConfig::default(), catalog()).await;
    let room_id = create_room(
        &server,
        "host",
        json!({ "settings": { "allowGuestControl": false, "autoPlay": false } }),
    )
    .await;
    let client = reqwest::Client::new();
    for video_id in ["a", "b", "c"] {
        let response = client
            .post(server.http(&format!("/api/rooms/{room_id}/queue")))
            .header("x-user-id", "host")
            .json(&json!({ "videoId": video_id }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let mut host = server.connect("host").await;
    send_event(&mut host, json!({ "event": "join-room", "data": { "roomId": room_id } })).await;
    wait_for_event(&mut host, "room-snapshot").await;

    // when (操作):
    let response = client
        .post(server.http(&format!("/api/rooms/{room_id}/queue/reorder")))
        .header("x-user-id", "host")
        .json(&json!({ "sourceIndex": 0, "destIndex": 2 }))
        .send()
        .await
        .unwrap();

    // then (期待する結果):
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    let order: Vec<(String, u64)> = body["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| {
            (
                item["videoId"].as_str().unwrap().to_string(),
                item["position"].as_u64().unwrap(),
            )
        })
        .collect();
    assert_eq!(
        order,
        vec![("b".to_string(), 0), ("c".to_string(), 1), ("a".to_string(), 2)]
    );

    let event = wait_for_event(&mut host, "queue-updated").await;
    assert_eq!(event["data"]["type"], "reorder");
    assert_eq!(event["data"]["items"].as_array().unwrap().len(), 3);
    assert_eq!(event["data"]["items"][0]["videoId"], "b");
}

#[tokio::test]
async fn test_viewer_cannot_reorder() {
    // テスト項目: HOST 以外の並べ替えは 403 になる
    // given (前提条件):
    let server = TestServer::start(ServerConfig::default(), catalog()).await;
    let room_id = create_room(&server, "host", json!({})).await;
    let client = reqwest::Client::new();
    let response = client
        .post(server.http(&format!("/api/rooms/{room_id}/join")))
        .header("x-user-id", "viewer")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // when (操作):
    let response = client
        .post(server.http(&format!("/api/rooms/{room_id}/queue/reorder")))
        .header("x-user-id", "viewer")
        .json(&json!({ "sourceIndex": 0, "destIndex": 0 }))
        .send()
        .await
        .unwrap();

    // then (期待する結果):
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_request_without_user_header_is_unauthorized() {
    // テスト項目: x-user-id ヘッダが無いリクエストは 401 になる
    // given (前提条件):
    let server = TestServer::start(ServerConfig::default(), catalog()).await;

    // when (操作):
    let response = reqwest::Client::new()
        .post(server.http("/api/rooms"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();

    // then (期待する結果):
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_invalid_event_gets_error_reply() {
    // テスト項目: 解釈できないイベントには error が返る
    // given (前提条件):
    let server = TestServer::start(ServerConfig::default(), catalog()).await;
    let mut client = server.connect("someone").await;

    // when (操作):
    send_event(&mut client, json!({ "event": "no-such-event", "data": {} })).await;

    // then (期待する結果):
    let event = next_event(&mut client).await;
    assert_eq!(event["event"], "error");
    assert_eq!(event["data"]["message"], "Invalid event");
}

#[tokio::test]
async fn test_health_reports_healthy_with_security_headers() {
    // テスト項目: /health は許可された IP に 200 とセキュリティヘッダを返す
    // given (前提条件):
    let server = TestServer::start(ServerConfig::default(), catalog()).await;

    // when (操作):
    let response = reqwest::get(server.http("/health")).await.unwrap();

    // then (期待する結果):
    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert!(headers.contains_key("content-security-policy"));
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["metrics"]["queueLength"], 0);
}

#[tokio::test]
async fn test_health_reports_backlog_over_threshold() {
    // テスト項目: キュー長が閾値を超えると 503 と理由を返す
    // given (前提条件):
    let mut config = ServerConfig::default();
    config.health.backlog_threshold = 1;
    let server = TestServer::start(config, catalog()).await;
    let room_id = create_room(&server, "host", json!({})).await;
    let client = reqwest::Client::new();
    for video_id in ["a", "b"] {
        client
            .post(server.http(&format!("/api/rooms/{room_id}/queue")))
            .header("x-user-id", "host")
            .json(&json!({ "videoId": video_id }))
            .send()
            .await
            .unwrap();
    }

    // when (操作):
    let response = reqwest::get(server.http("/health")).await.unwrap();

    // then (期待する結果):
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["metrics"]["queueLength"], 2);
    assert!(body["reason"].as_str().unwrap().contains("backlog"));
}

#[tokio::test]
async fn test_health_rejects_ip_outside_allow_list() {
    // テスト項目: 許可リスト外の IP には 403 を返す
    // given (前提条件):
    let mut config = ServerConfig::default();
    config.health.allowed_ips = vec!["10.0.0.1".parse().unwrap()];
    let server = TestServer::start(config, catalog()).await;

    // when (操作):
    let response = reqwest::get(server.http("/health")).await.unwrap();

    // then (期待する結果):
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
