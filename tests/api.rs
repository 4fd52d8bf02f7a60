use serde_json::{json, Value};
use warp::Filter;

use chatnet::api::{self, ApiContext};
use chatnet::auth::UserDirectory;
use chatnet::registry::SessionRegistry;
use chatnet::rooms::RoomStore;
use chatnet::router::ChatRouter;
use chatnet::server::Gateway;

const SECRET: &str = "integration-test-secret";

struct App {
    ctx: ApiContext,
    gateway: Gateway,
}

async fn app() -> App {
    let users = UserDirectory::new();
    users.seed_admin().await;
    let rooms = RoomStore::new();
    rooms.seed_defaults().await;
    let registry = SessionRegistry::new();
    let router = ChatRouter::new(rooms.clone(), registry.clone(), users.clone());
    let gateway = Gateway::new(router.clone(), registry, users.clone());
    App {
        ctx: ApiContext {
            users,
            rooms,
            router,
            jwt_secret: SECRET.to_string(),
            token_ttl_hours: 24,
        },
        gateway,
    }
}

fn rest_routes(
    ctx: ApiContext,
) -> impl Filter<Extract = impl warp::Reply, Error = std::convert::Infallible> + Clone {
    api::routes(ctx).recover(api::handle_rejection)
}

macro_rules! login {
    ($routes:expr, $username:expr, $password:expr) => {{
        let response = warp::test::request()
            .method("POST")
            .path("/api/token")
            .json(&json!({ "username": $username, "password": $password }))
            .reply($routes)
            .await;
        assert_eq!(response.status(), 200);
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        body["access_token"].as_str().unwrap().to_string()
    }};
}

#[tokio::test]
async fn register_login_and_fetch_profile() {
    let app = app().await;
    let routes = rest_routes(app.ctx);

    let created = warp::test::request()
        .method("POST")
        .path("/api/users")
        .json(&json!({
            "username": "alice",
            "email": "alice@example.com",
            "password": "s3cret"
        }))
        .reply(&routes)
        .await;
    assert_eq!(created.status(), 201);

    let duplicate = warp::test::request()
        .method("POST")
        .path("/api/users")
        .json(&json!({
            "username": "alice",
            "email": "other@example.com",
            "password": "pw"
        }))
        .reply(&routes)
        .await;
    assert_eq!(duplicate.status(), 400);
    let body: Value = serde_json::from_slice(duplicate.body()).unwrap();
    assert_eq!(body["detail"], "Username or email already exists");

    let token = login!(&routes, "alice", "s3cret");

    let me = warp::test::request()
        .method("GET")
        .path("/api/users/me")
        .header("authorization", format!("Bearer {token}"))
        .reply(&routes)
        .await;
    assert_eq!(me.status(), 200);
    let profile: Value = serde_json::from_slice(me.body()).unwrap();
    assert_eq!(profile["username"], "alice");
    assert_eq!(profile["email"], "alice@example.com");
    assert_eq!(profile["isOnline"], true);

    // The public view of another user hides the email.
    let public = warp::test::request()
        .method("GET")
        .path("/api/users/admin")
        .header("authorization", format!("Bearer {token}"))
        .reply(&routes)
        .await;
    assert_eq!(public.status(), 200);
    let body: Value = serde_json::from_slice(public.body()).unwrap();
    assert_eq!(body["username"], "admin");
    assert!(body.get("email").is_none());
}

#[tokio::test]
async fn bad_credentials_and_bad_tokens_are_rejected() {
    let app = app().await;
    let routes = rest_routes(app.ctx);

    let response = warp::test::request()
        .method("POST")
        .path("/api/token")
        .json(&json!({ "username": "admin", "password": "wrong" }))
        .reply(&routes)
        .await;
    assert_eq!(response.status(), 401);

    let missing = warp::test::request()
        .method("GET")
        .path("/api/rooms/public")
        .reply(&routes)
        .await;
    assert_eq!(missing.status(), 401);

    let forged = warp::test::request()
        .method("GET")
        .path("/api/rooms/public")
        .header("authorization", "Bearer not-a-token")
        .reply(&routes)
        .await;
    assert_eq!(forged.status(), 403);
}

#[tokio::test]
async fn room_lifecycle_over_rest() {
    let app = app().await;
    let routes = rest_routes(app.ctx);
    let token = login!(&routes, "admin", "admin123");
    let bearer = format!("Bearer {token}");

    let invalid = warp::test::request()
        .method("POST")
        .path("/api/rooms")
        .header("authorization", &bearer)
        .json(&json!({ "name": "", "topic": "t" }))
        .reply(&routes)
        .await;
    assert_eq!(invalid.status(), 400);

    let created = warp::test::request()
        .method("POST")
        .path("/api/rooms")
        .header("authorization", &bearer)
        .json(&json!({
            "name": "Rust Corner",
            "topic": "Ownership and friends",
            "tags": ["rust"],
            "isPublic": true
        }))
        .reply(&routes)
        .await;
    assert_eq!(created.status(), 201);
    let room: Value = serde_json::from_slice(created.body()).unwrap();
    let room_id = room["id"].as_str().unwrap().to_string();
    assert_eq!(room["members"], json!(["admin"]));
    assert_eq!(room["totalUsers"], 1);

    let listed = warp::test::request()
        .method("GET")
        .path("/api/rooms/public")
        .header("authorization", &bearer)
        .reply(&routes)
        .await;
    assert_eq!(listed.status(), 200);
    let rooms: Value = serde_json::from_slice(listed.body()).unwrap();
    let names: Vec<&str> = rooms
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"Rust Corner"));
    // Listings never carry history payloads.
    assert!(rooms[0].get("messages").is_none());

    let fetched = warp::test::request()
        .method("GET")
        .path(&format!("/api/rooms/{room_id}"))
        .header("authorization", &bearer)
        .reply(&routes)
        .await;
    assert_eq!(fetched.status(), 200);
    let body: Value = serde_json::from_slice(fetched.body()).unwrap();
    assert_eq!(body["messages"], json!([]));

    let history = warp::test::request()
        .method("GET")
        .path(&format!("/api/rooms/{room_id}/messages?limit=10"))
        .header("authorization", &bearer)
        .reply(&routes)
        .await;
    assert_eq!(history.status(), 200);
    let messages: Value = serde_json::from_slice(history.body()).unwrap();
    assert_eq!(messages, json!([]));

    let missing = warp::test::request()
        .method("GET")
        .path("/api/rooms/no-such-room")
        .header("authorization", &bearer)
        .reply(&routes)
        .await;
    assert_eq!(missing.status(), 404);
    let body: Value = serde_json::from_slice(missing.body()).unwrap();
    assert_eq!(body["detail"], "Room not found");
}

#[tokio::test]
async fn websocket_requires_a_valid_token() {
    let app = app().await;
    let ws_route = app.gateway.route(SECRET.to_string());

    let result = warp::test::ws()
        .path("/ws?token=not-a-token")
        .handshake(ws_route)
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn websocket_session_joins_a_seeded_room() {
    let app = app().await;
    let rest = rest_routes(app.ctx.clone());
    let admin_token = login!(&rest, "admin", "admin123");

    let ws_route = app.gateway.clone().route(SECRET.to_string());
    let mut admin = warp::test::ws()
        .path(&format!("/ws?token={admin_token}"))
        .handshake(ws_route)
        .await
        .expect("handshake should succeed");

    let hello = admin.recv().await.expect("connection frame");
    let hello: Value = serde_json::from_str(hello.to_str().unwrap()).unwrap();
    assert_eq!(hello["type"], "connection_success");

    // A second account makes the join an actual membership change.
    let created = warp::test::request()
        .method("POST")
        .path("/api/users")
        .json(&json!({
            "username": "bob",
            "email": "bob@example.com",
            "password": "pw"
        }))
        .reply(&rest)
        .await;
    assert_eq!(created.status(), 201);
    let bob_token = login!(&rest, "bob", "pw");

    let ws_route = app.gateway.clone().route(SECRET.to_string());
    let mut bob = warp::test::ws()
        .path(&format!("/ws?token={bob_token}"))
        .handshake(ws_route)
        .await
        .expect("handshake should succeed");
    let frame = bob.recv().await.expect("connection frame");
    let frame: Value = serde_json::from_str(frame.to_str().unwrap()).unwrap();
    assert_eq!(frame["type"], "connection_success");

    bob.send_text(r#"{"type":"join_room","data":{"roomId":"1"}}"#)
        .await;

    // Both the seeded admin session and bob see the arrival.
    for peer in [&mut admin, &mut bob] {
        let joined = peer.recv().await.expect("user_joined frame");
        let joined: Value = serde_json::from_str(joined.to_str().unwrap()).unwrap();
        assert_eq!(joined["type"], "user_joined");
        assert_eq!(joined["data"]["user"]["username"], "bob");

        let notice = peer.recv().await.expect("system notice frame");
        let notice: Value = serde_json::from_str(notice.to_str().unwrap()).unwrap();
        assert_eq!(notice["type"], "chat_message");
        assert_eq!(notice["data"]["text"], "bob has joined the room.");
    }

    // A garbage frame must not kill the connection.
    bob.send_text("{not json").await;
    bob.send_text(r#"{"type":"heartbeat"}"#).await;
    let ack = bob.recv().await.expect("heartbeat ack after bad frame");
    let ack: Value = serde_json::from_str(ack.to_str().unwrap()).unwrap();
    assert_eq!(ack["type"], "heartbeat_ack");
}
