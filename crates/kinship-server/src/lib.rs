pub mod config;
pub mod logging;

use std::time::Instant;

use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use kinship_core::{KinshipError, NewUser, User, UserGraph};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::net::TcpListener;
use uuid::Uuid;

use crate::config::ServerConfig;

#[derive(Clone)]
struct AppState {
    graph: UserGraph,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct FriendshipInput {
    source_id: String,
    target_id: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct DeleteInput {
    target_id: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct AgeInput {
    new_age: String,
}

#[derive(Serialize)]
struct CreatedOutput {
    id: String,
}

/// Build the HTTP surface over a graph handle.
pub fn app(graph: UserGraph) -> Router {
    let state = AppState { graph };
    Router::new()
        .route("/healthz", get(health))
        .route("/create", post(create_user))
        .route("/make_friends", post(make_friends))
        .route("/user", delete(delete_user))
        .route("/user/:user_id", get(get_user))
        .route("/users", get(list_users))
        .route("/friends/:user_id", get(get_friends))
        .route("/:user_id", put(update_age))
        .layer(middleware::from_fn(access_log))
        .with_state(state)
}

pub async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let _guard = logging::init_tracing(config.log_dir.as_deref())?;

    let graph = UserGraph::with_policy(config.id_policy);
    tracing::info!(policy = ?graph.policy(), "user graph ready");

    let listener = TcpListener::bind(config.listen).await?;
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app(graph))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("ctrl-c handler unavailable: {e}");
        std::future::pending::<()>().await;
    }
}

async fn access_log(req: Request<Body>, next: Next) -> Response {
    let request_id = Uuid::new_v4();
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let start = Instant::now();
    let mut resp = next.run(req).await;
    tracing::info!(
        %request_id,
        %method,
        %path,
        status = resp.status().as_u16(),
        elapsed = ?start.elapsed(),
        "request"
    );
    if let Ok(val) = HeaderValue::from_str(&request_id.to_string()) {
        resp.headers_mut().insert("x-request-id", val);
    }
    resp
}

async fn health() -> &'static str {
    "ok"
}

async fn create_user(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<CreatedOutput>), ApiError> {
    let input: NewUser = decode(&body)?;
    let id = state.graph.create_user(input);
    Ok((StatusCode::CREATED, Json(CreatedOutput { id })))
}

async fn make_friends(State(state): State<AppState>, body: Bytes) -> Result<String, ApiError> {
    let input: FriendshipInput = decode(&body)?;
    let (source, target) = state
        .graph
        .make_friends(&input.source_id, &input.target_id)
        .map_err(|e| match e {
            KinshipError::NotFound(_) => ApiError::BadRequest("One of the users not found".into()),
            other => other.into(),
        })?;
    Ok(format!("{source} и {target} теперь друзья\n"))
}

async fn delete_user(State(state): State<AppState>, body: Bytes) -> Result<String, ApiError> {
    let input: DeleteInput = decode(&body)?;
    let name = state.graph.delete_user(&input.target_id)?;
    Ok(format!("Удалён пользователь: {name}\n"))
}

async fn get_friends(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.graph.friends(&user_id)?))
}

async fn update_age(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    body: Bytes,
) -> Result<&'static str, ApiError> {
    let input: AgeInput = decode(&body)?;
    state.graph.update_age(&user_id, input.new_age)?;
    Ok("Successfully\n")
}

async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.graph.get_user(&user_id)?))
}

async fn list_users(State(state): State<AppState>) -> Json<Vec<User>> {
    Json(state.graph.users())
}

/// Decode the first JSON value of a body. Anything after it is ignored and a
/// `null` value yields the empty input.
fn decode<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, ApiError> {
    let mut values = serde_json::Deserializer::from_slice(body).into_iter::<Option<T>>();
    match values.next() {
        Some(Ok(value)) => Ok(value.unwrap_or_default()),
        Some(Err(e)) => Err(ApiError::BadRequest(e.to_string())),
        None => Err(ApiError::BadRequest("EOF".into())),
    }
}

#[derive(Debug)]
enum ApiError {
    BadRequest(String),
    NotFound(String),
}

impl From<KinshipError> for ApiError {
    fn from(value: KinshipError) -> Self {
        match value {
            KinshipError::NotFound(_) => ApiError::NotFound("User not found".into()),
            KinshipError::Validation(msg) => ApiError::BadRequest(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, msg) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        };
        tracing::debug!(status = status.as_u16(), "api_error" = %msg);
        (status, format!("{msg}\n")).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower::ServiceExt;

    async fn send(app: &Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, String) {
        let body = body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty);
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .body(body)
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    async fn seeded() -> Router {
        let app = app(UserGraph::new());
        send(&app, "POST", "/create", Some(r#"{"name":"Alice","age":"24"}"#)).await;
        send(&app, "POST", "/create", Some(r#"{"name":"Bob","age":"31"}"#)).await;
        app
    }

    #[tokio::test]
    async fn create_returns_id() {
        let app = app(UserGraph::new());
        let (status, body) =
            send(&app, "POST", "/create", Some(r#"{"name":"Alice","age":"24"}"#)).await;
        assert_eq!(status, StatusCode::CREATED);
        let v: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(v["id"], "1");
    }

    #[tokio::test]
    async fn create_rejects_malformed_body() {
        let app = app(UserGraph::new());
        let (status, body) = send(&app, "POST", "/create", Some("{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!body.trim().is_empty());
        let (status, _) = send(&app, "POST", "/create", Some(r#"{"name":"A","age":7}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn friendship_round_trip() {
        let app = seeded().await;
        let (status, body) = send(
            &app,
            "POST",
            "/make_friends",
            Some(r#"{"source_id":"1","target_id":"2"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Alice и Bob теперь друзья\n");

        let (status, body) = send(&app, "GET", "/friends/1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"["2"]"#);
        let (_, body) = send(&app, "GET", "/friends/2", None).await;
        assert_eq!(body, r#"["1"]"#);
    }

    #[tokio::test]
    async fn make_friends_with_unknown_user_is_bad_request() {
        let app = seeded().await;
        let (status, body) = send(
            &app,
            "POST",
            "/make_friends",
            Some(r#"{"source_id":"1","target_id":"9"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "One of the users not found\n");
        let (_, body) = send(&app, "GET", "/friends/1", None).await;
        assert_eq!(body, "[]");
    }

    #[tokio::test]
    async fn make_friends_rejects_malformed_body() {
        let app = seeded().await;
        let (status, body) = send(&app, "POST", "/make_friends", Some("[")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("EOF while parsing"));
        let (status, _) =
            send(&app, "POST", "/make_friends", Some(r#"{"source_id":1,"target_id":"2"}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (_, body) = send(&app, "GET", "/friends/2", None).await;
        assert_eq!(body, "[]");
    }

    #[tokio::test]
    async fn decodes_only_the_first_value() {
        let app = app(UserGraph::new());
        let (status, _) =
            send(&app, "POST", "/create", Some(r#"{"name":"A","age":"1"} {}"#)).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, body) = send(&app, "POST", "/create", Some("null")).await;
        assert_eq!(status, StatusCode::CREATED);
        let v: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(v["id"], "2");

        let (_, body) = send(&app, "GET", "/user/2", None).await;
        let user: User = serde_json::from_str(&body).unwrap();
        assert_eq!(user.name, "");

        let (status, body) = send(&app, "POST", "/create", Some("  ")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "EOF\n");
    }

    #[tokio::test]
    async fn delete_purges_and_reports_name() {
        let app = seeded().await;
        send(
            &app,
            "POST",
            "/make_friends",
            Some(r#"{"source_id":"1","target_id":"2"}"#),
        )
        .await;
        let (status, body) = send(&app, "DELETE", "/user", Some(r#"{"target_id":"1"}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Удалён пользователь: Alice\n");

        let (_, body) = send(&app, "GET", "/friends/2", None).await;
        assert_eq!(body, "[]");
        let (status, body) = send(&app, "GET", "/friends/1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "User not found\n");
    }

    #[tokio::test]
    async fn delete_unknown_user_is_not_found() {
        let app = seeded().await;
        let (status, _) = send(&app, "DELETE", "/user", Some(r#"{"target_id":"7"}"#)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, "DELETE", "/user", Some(r#""7""#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn update_age_is_visible_on_fetch() {
        let app = seeded().await;
        let (status, body) = send(&app, "PUT", "/2", Some(r#"{"new_age":"30"}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Successfully\n");

        let (status, body) = send(&app, "GET", "/user/2", None).await;
        assert_eq!(status, StatusCode::OK);
        let user: User = serde_json::from_str(&body).unwrap();
        assert_eq!(user.age, "30");
        assert_eq!(user.name, "Bob");

        let (status, body) = send(&app, "GET", "/user/9", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "User not found\n");
    }

    #[tokio::test]
    async fn update_age_errors() {
        let app = seeded().await;
        let (status, _) = send(&app, "PUT", "/2", Some("nope")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = send(&app, "PUT", "/5", Some(r#"{"new_age":"1"}"#)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn lists_users_and_health() {
        let app = seeded().await;
        let (status, body) = send(&app, "GET", "/users", None).await;
        assert_eq!(status, StatusCode::OK);
        let users: Vec<User> = serde_json::from_str(&body).unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].name, "Alice");

        let (status, body) = send(&app, "GET", "/healthz", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn responses_carry_request_id() {
        let app = app(UserGraph::new());
        let req = Request::builder()
            .uri("/healthz")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let id = resp.headers().get("x-request-id").unwrap().to_str().unwrap();
        assert!(Uuid::parse_str(id).is_ok());
    }
}
