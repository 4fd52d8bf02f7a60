use std::convert::Infallible;

use log::info;
use serde::{Deserialize, Serialize};
use serde_json::json;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use crate::auth::{self, AuthError, UserDirectory};
use crate::messages::{ServerEvent, UserRef};
use crate::rooms::{NewRoom, RoomStore, DEFAULT_HISTORY_LIMIT};
use crate::router::ChatRouter;

/// Everything the REST handlers need; cheap to clone into filters.
#[derive(Clone)]
pub struct ApiContext {
    pub users: UserDirectory,
    pub rooms: RoomStore,
    pub router: ChatRouter,
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
}

/// Rejections the recovery handler turns into `{"detail": ...}` bodies.
#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    InvalidToken,
    BadRequest(String),
    NotFound(String),
}

impl warp::reject::Reject for ApiError {}

fn reject(error: ApiError) -> Rejection {
    warp::reject::custom(error)
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    access_token: String,
    token_type: &'static str,
    user: auth::Profile,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

fn with_context(
    ctx: ApiContext,
) -> impl Filter<Extract = (ApiContext,), Error = Infallible> + Clone {
    warp::any().map(move || ctx.clone())
}

/// Bearer-token guard: missing header is 401, a bad token is 403.
fn with_auth(ctx: ApiContext) -> impl Filter<Extract = (UserRef,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization").and_then(move |header: Option<String>| {
        let secret = ctx.jwt_secret.clone();
        async move {
            let header = header.ok_or_else(|| reject(ApiError::Unauthorized))?;
            let token = header
                .strip_prefix("Bearer ")
                .ok_or_else(|| reject(ApiError::Unauthorized))?;
            auth::verify_token(token, &secret).map_err(|_| reject(ApiError::InvalidToken))
        }
    })
}

pub fn routes(ctx: ApiContext) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let health = warp::path!("api")
        .and(warp::get())
        .map(|| warp::reply::json(&json!({ "message": "Chat Network API is running" })));

    let register = warp::path!("api" / "users")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_context(ctx.clone()))
        .and_then(handle_register);

    let login = warp::path!("api" / "token")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_context(ctx.clone()))
        .and_then(handle_login);

    let me = warp::path!("api" / "users" / "me")
        .and(warp::get())
        .and(with_auth(ctx.clone()))
        .and(with_context(ctx.clone()))
        .and_then(handle_me);

    let user_by_id = warp::path!("api" / "users" / String)
        .and(warp::get())
        .and(with_auth(ctx.clone()))
        .and(with_context(ctx.clone()))
        .and_then(handle_user_by_id);

    let logout = warp::path!("api" / "logout")
        .and(warp::post())
        .and(with_auth(ctx.clone()))
        .and(with_context(ctx.clone()))
        .and_then(handle_logout);

    let public_rooms = warp::path!("api" / "rooms" / "public")
        .and(warp::get())
        .and(with_auth(ctx.clone()))
        .and(with_context(ctx.clone()))
        .and_then(handle_public_rooms);

    let create_room = warp::path!("api" / "rooms")
        .and(warp::post())
        .and(with_auth(ctx.clone()))
        .and(warp::body::json())
        .and(with_context(ctx.clone()))
        .and_then(handle_create_room);

    let room_by_id = warp::path!("api" / "rooms" / String)
        .and(warp::get())
        .and(with_auth(ctx.clone()))
        .and(with_context(ctx.clone()))
        .and_then(handle_room_by_id);

    let room_messages = warp::path!("api" / "rooms" / String / "messages")
        .and(warp::get())
        .and(warp::query::<HistoryQuery>())
        .and(with_auth(ctx.clone()))
        .and(with_context(ctx))
        .and_then(handle_room_messages);

    health
        .or(register)
        .or(login)
        .or(me)
        .or(logout)
        .or(public_rooms)
        .or(room_messages)
        .or(create_room)
        .or(room_by_id)
        .or(user_by_id)
}

async fn handle_register(
    body: RegisterRequest,
    ctx: ApiContext,
) -> Result<impl Reply, Rejection> {
    if body.username.trim().is_empty() || body.email.trim().is_empty() || body.password.is_empty() {
        return Err(reject(ApiError::BadRequest(
            "All fields are required".to_string(),
        )));
    }

    match ctx
        .users
        .register(&body.username, &body.email, &body.password)
        .await
    {
        Ok(record) => {
            info!("user registered: {}", record.username);
            Ok(warp::reply::with_status(
                warp::reply::json(&json!({ "message": "User created successfully" })),
                StatusCode::CREATED,
            ))
        }
        Err(AuthError::Duplicate) => Err(reject(ApiError::BadRequest(
            "Username or email already exists".to_string(),
        ))),
        Err(_) => Err(reject(ApiError::BadRequest("Registration failed".to_string()))),
    }
}

async fn handle_login(body: LoginRequest, ctx: ApiContext) -> Result<impl Reply, Rejection> {
    let record = ctx
        .users
        .login(&body.username, &body.password)
        .await
        .map_err(|_| reject(ApiError::Unauthorized))?;

    ctx.users.set_online(&record.id, true).await;
    let token = auth::issue_token(&record, &ctx.jwt_secret, ctx.token_ttl_hours)
        .map_err(|_| reject(ApiError::Unauthorized))?;

    let mut profile = record.profile();
    profile.is_online = true;
    Ok(warp::reply::json(&LoginResponse {
        access_token: token,
        token_type: "bearer",
        user: profile,
    }))
}

async fn handle_me(user: UserRef, ctx: ApiContext) -> Result<impl Reply, Rejection> {
    let record = ctx
        .users
        .by_id(&user.id)
        .await
        .ok_or_else(|| reject(ApiError::NotFound("User not found".to_string())))?;
    Ok(warp::reply::json(&record.profile()))
}

async fn handle_user_by_id(
    key: String,
    _user: UserRef,
    ctx: ApiContext,
) -> Result<impl Reply, Rejection> {
    let record = ctx
        .users
        .by_id_or_username(&key)
        .await
        .ok_or_else(|| reject(ApiError::NotFound("User not found".to_string())))?;
    Ok(warp::reply::json(&record.public_profile()))
}

async fn handle_logout(user: UserRef, ctx: ApiContext) -> Result<impl Reply, Rejection> {
    ctx.users.set_online(&user.id, false).await;
    Ok(warp::reply::json(
        &json!({ "message": "Logged out successfully" }),
    ))
}

async fn handle_public_rooms(_user: UserRef, ctx: ApiContext) -> Result<impl Reply, Rejection> {
    Ok(warp::reply::json(&ctx.rooms.list_public().await))
}

async fn handle_create_room(
    user: UserRef,
    params: NewRoom,
    ctx: ApiContext,
) -> Result<impl Reply, Rejection> {
    let room = ctx
        .rooms
        .create(params, &user.username)
        .await
        .map_err(|e| reject(ApiError::BadRequest(e.to_string())))?;

    info!("room created: {} by {}", room.name, user.username);
    ctx.router
        .announce_room(&ServerEvent::RoomUpdate(room.summary()))
        .await;

    Ok(warp::reply::with_status(
        warp::reply::json(&room),
        StatusCode::CREATED,
    ))
}

async fn handle_room_by_id(
    room_id: String,
    _user: UserRef,
    ctx: ApiContext,
) -> Result<impl Reply, Rejection> {
    let room = ctx
        .rooms
        .find(&room_id, DEFAULT_HISTORY_LIMIT)
        .await
        .ok_or_else(|| reject(ApiError::NotFound("Room not found".to_string())))?;
    Ok(warp::reply::json(&room))
}

async fn handle_room_messages(
    room_id: String,
    query: HistoryQuery,
    _user: UserRef,
    ctx: ApiContext,
) -> Result<impl Reply, Rejection> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    let messages = ctx
        .rooms
        .messages(&room_id, limit)
        .await
        .map_err(|_| reject(ApiError::NotFound("Room not found".to_string())))?;
    Ok(warp::reply::json(&messages))
}

/// Maps rejections onto the `{"detail": ...}` error body every client
/// of this API expects.
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, detail) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string())
    } else if let Some(api_error) = err.find::<ApiError>() {
        match api_error {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            ApiError::InvalidToken => (StatusCode::FORBIDDEN, "Invalid token".to_string()),
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail.clone()),
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, detail.clone()),
        }
    } else if err.find::<warp::filters::body::BodyDeserializeError>().is_some() {
        (StatusCode::BAD_REQUEST, "Invalid request body".to_string())
    } else if err.find::<warp::reject::InvalidQuery>().is_some() {
        (StatusCode::BAD_REQUEST, "Invalid query string".to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "Server error".to_string())
    };

    let body = warp::reply::json(&json!({ "detail": detail }));
    Ok(warp::reply::with_status(body, status))
}
