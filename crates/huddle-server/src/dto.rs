//! Request and response bodies of the HTTP API.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

/// `code` of a successful response.
pub const CODE_SUCCESS: i32 = 1;
/// `code` of a failed response.
pub const CODE_FAILURE: i32 = 0;

/// Response envelope: `{code, msg, data}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub msg: String,
    pub data: Option<T>,
}

/// 200 response carrying `data`.
pub fn ok<T: Serialize>(data: T) -> Response {
    let body = ApiResponse {
        code: CODE_SUCCESS,
        msg: "success".to_string(),
        data: Some(data),
    };
    (StatusCode::OK, Json(body)).into_response()
}

/// 200 response without data.
pub fn ok_empty() -> Response {
    ok(())
}

/// Failure response with the given status.
pub fn fail(status: StatusCode, msg: impl Into<String>) -> Response {
    let body: ApiResponse<()> = ApiResponse {
        code: CODE_FAILURE,
        msg: msg.into(),
        data: None,
    };
    (status, Json(body)).into_response()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub id: String,
    pub username: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    pub name: String,
    #[serde(default)]
    pub password: String,
    /// Owner user id.
    pub user_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomRequest {
    #[serde(default)]
    pub password: String,
    pub user_id: String,
    pub device_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRoomRequest {
    pub user_id: String,
    pub device_id: String,
}

/// Query string of the WebSocket upgrade.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsQuery {
    /// User id issued at login.
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub username: String,
    /// `json` (default) or `msgpack`.
    pub encoding: Option<String>,
}
