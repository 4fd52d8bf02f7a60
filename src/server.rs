use futures_util::{SinkExt, StreamExt};
use log::{info, warn};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;
use warp::ws::WebSocket;
use warp::{Filter, Rejection, Reply};

use crate::api::ApiError;
use crate::auth::{self, UserDirectory};
use crate::messages::{ClientEvent, ServerEvent, UserRef};
use crate::registry::{SessionHandle, SessionRegistry};
use crate::router::ChatRouter;

#[derive(Debug, Deserialize)]
struct WsQuery {
    token: String,
}

/// Accepts authenticated sockets and pumps frames between the wire and
/// the router.
#[derive(Clone)]
pub struct Gateway {
    router: ChatRouter,
    registry: SessionRegistry,
    users: UserDirectory,
}

impl Gateway {
    pub fn new(router: ChatRouter, registry: SessionRegistry, users: UserDirectory) -> Self {
        Gateway {
            router,
            registry,
            users,
        }
    }

    /// `GET /ws?token=...` — the token is checked before the upgrade, so
    /// the router only ever sees authenticated sessions.
    pub fn route(
        self,
        jwt_secret: String,
    ) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
        warp::path("ws")
            .and(warp::path::end())
            .and(warp::query::<WsQuery>())
            .and(warp::ws())
            .and_then(move |query: WsQuery, ws: warp::ws::Ws| {
                let gateway = self.clone();
                let secret = jwt_secret.clone();
                async move {
                    let user = auth::verify_token(&query.token, &secret)
                        .map_err(|_| warp::reject::custom(ApiError::Unauthorized))?;
                    Ok::<_, Rejection>(ws.on_upgrade(move |socket| async move {
                        gateway.handle_connection(socket, user).await;
                    }))
                }
            })
    }

    pub async fn handle_connection(&self, ws: WebSocket, user: UserRef) {
        let connection_id = Uuid::new_v4().to_string();
        let (mut ws_tx, mut ws_rx) = ws.split();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let handle = SessionHandle::new(connection_id.clone(), tx);
        self.registry.register(&user.id, handle.clone()).await;
        self.users.set_online(&user.id, true).await;
        info!("user connected: {} ({})", user.username, user.id);

        handle.send(&ServerEvent::ConnectionSuccess {
            message: "Successfully connected to WebSocket server".to_string(),
        });

        // Outbound pump: registry channel -> socket.
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if ws_tx.send(message).await.is_err() {
                    break;
                }
            }
        });

        // Inbound pump: one bad frame is logged and skipped, never fatal.
        while let Some(result) = ws_rx.next().await {
            match result {
                Ok(frame) => {
                    let Ok(text) = frame.to_str() else {
                        continue; // pings and binary frames carry no events
                    };
                    match serde_json::from_str::<ClientEvent>(text) {
                        Ok(event) => self.router.dispatch(&user, &handle, event).await,
                        Err(e) => warn!("ignoring malformed frame from {}: {e}", user.username),
                    }
                }
                Err(e) => {
                    warn!("websocket error for {}: {e}", user.username);
                    break;
                }
            }
        }

        self.router.handle_disconnect(&user, &connection_id).await;
    }
}
