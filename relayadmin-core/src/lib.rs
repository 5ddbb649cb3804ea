pub mod format;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub use format::{DEFAULT_DECIMALS, NOT_AVAILABLE, format_bytes, format_duration};

pub const API_BASE_PATH: &str = "/api/";
pub const MIN_PAGE: u32 = 1;
pub const MIN_PAGE_SIZE: u32 = 1;
pub const MAX_PAGE_SIZE: u32 = 100;

pub const SORT_BY_RELAY_COUNT: &str = "totalRelayCount";
pub const SORT_BY_RELAY_MS: &str = "totalRelayMs";
pub const SORT_BY_RELAY_BYTES: &str = "totalRelayBytes";

/// Endpoint paths relative to [`API_BASE_PATH`].
pub mod routes {
    pub const LOGIN: &str = "login";
    pub const CONNECTION_STATISTIC: &str = "conn/statistic";
    pub const CONNECTION_STATUS: &str = "conn/status";
    /// The connection id is appended as one extra path segment.
    pub const CLOSE_CONNECTION: &str = "conn/close/";
    pub const UPDATE_CONNECTION: &str = "conn/update";
}

pub type ConnectionId = String;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct HistoryStatistic {
    pub id: ConnectionId,
    #[serde(default)]
    pub custom_name: String,
    pub created_at: String,
    pub updated_at: String,
    pub total_relay_count: i64,
    pub total_relay_err_count: i64,
    pub total_relay_offline_count: i64,
    pub total_relay_ms: i64,
    pub total_relay_bytes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActiveConnection {
    pub id: ConnectionId,
    #[serde(default)]
    pub custom_name: String,
    pub req_addr: String,
    pub connect_time: String,
    pub last_active: String,
    pub relaying: bool,
    pub history: HistoryStatistic,
}

impl ActiveConnection {
    /// Custom name when one was assigned, the raw id otherwise.
    pub fn display_name(&self) -> &str {
        if self.custom_name.trim().is_empty() {
            &self.id
        } else {
            &self.custom_name
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedData<T> {
    pub list: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
}

pub type RespHistoryStatistic = PaginatedData<HistoryStatistic>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl LoginRequest {
    /// Builds a login form carrying the SHA-256 hex digest of `plain_password`,
    /// which is what the admin server compares against.
    pub fn with_hashed_password(username: impl Into<String>, plain_password: &str) -> Self {
        Self {
            username: username.into(),
            password: sha256_hex(plain_password),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct LoginResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateConnectionRequest {
    pub id: ConnectionId,
    pub custom_name: String,
}

/// `{"message": "..."}` body attached to admin server error responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerMessage {
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortType {
    Asc,
    Desc,
}

impl SortType {
    pub fn as_str(self) -> &'static str {
        match self {
            SortType::Asc => "asc",
            SortType::Desc => "desc",
        }
    }
}

impl std::str::FromStr for SortType {
    type Err = CoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(SortType::Asc),
            "desc" => Ok(SortType::Desc),
            _ => Err(CoreError::InvalidSortType(value.to_owned())),
        }
    }
}

/// Query string of `GET /conn/statistic`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatisticQuery {
    pub page: u32,
    pub page_size: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_type: Option<SortType>,
}

impl StatisticQuery {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page,
            page_size,
            sort_by: None,
            sort_type: None,
        }
    }

    /// An empty `sort_by` means "no sort" and is dropped from the query.
    #[must_use]
    pub fn sorted(mut self, sort_by: impl Into<String>, sort_type: Option<SortType>) -> Self {
        let sort_by = sort_by.into();
        self.sort_by = if sort_by.trim().is_empty() {
            None
        } else {
            Some(sort_by)
        };
        self.sort_type = sort_type;
        self
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.page < MIN_PAGE {
            return Err(CoreError::InvalidPage(self.page));
        }
        if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(CoreError::InvalidPageSize {
                page_size: self.page_size,
                max: MAX_PAGE_SIZE,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("page must be >= 1, got {0}")]
    InvalidPage(u32),
    #[error("page size must be between 1 and {max}, got {page_size}")]
    InvalidPageSize { page_size: u32, max: u32 },
    #[error("sort type must be \"asc\" or \"desc\", got {0:?}")]
    InvalidSortType(String),
    #[error("connection id must not be empty")]
    EmptyConnectionId,
}

pub fn validate_connection_id(id: &str) -> Result<(), CoreError> {
    if id.trim().is_empty() {
        return Err(CoreError::EmptyConnectionId);
    }
    Ok(())
}

/// Lowercase hex SHA-256 of the UTF-8 bytes of `input`.
pub fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// Extracts the `message` field from an error body, falling back to the raw
/// text when the body is not the server's JSON envelope.
pub fn server_message(body: &str) -> String {
    serde_json::from_str::<ServerMessage>(body)
        .map(|parsed| parsed.message)
        .unwrap_or_else(|_| body.trim().to_owned())
}
