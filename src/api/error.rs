use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::external::bilibili::BilibiliError;
use crate::models::validation::ValidationError;
use crate::services::gallery_service::GalleryError;
use crate::services::livestream_service::LivestreamError;
use crate::services::song_service::SongError;
use crate::services::thumbnail::ThumbnailError;

/// 统一的API错误类型
#[derive(Debug)]
pub enum ApiError {
    /// 数据库错误
    Database(sqlx::Error),
    /// 歌曲未找到
    SongNotFound(String),
    /// 未找到资源
    NotFound(String),
    /// 参数无效
    InvalidParameter(String),
    /// 验证错误（可附带字段错误）
    Validation(String, BTreeMap<String, Vec<String>>),
    /// 权限不足
    Forbidden(String),
    /// 冲突错误（如重复创建）
    Conflict(String),
    /// 内部服务器错误
    Internal(String),
    /// 外部服务错误
    ExternalService(String),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation(message.into(), BTreeMap::new())
    }

    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        let mut errors = BTreeMap::new();
        errors.insert(field.to_string(), vec![message.clone()]);
        ApiError::Validation(message, errors)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Database(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::SongNotFound(_) | ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidParameter(_) => StatusCode::BAD_REQUEST,
            ApiError::Validation(..) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::ExternalService(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Database(e) => write!(f, "Database error: {}", e),
            ApiError::SongNotFound(msg) => write!(f, "Song not found: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::InvalidParameter(msg) => write!(f, "Invalid parameter: {}", msg),
            ApiError::Validation(msg, _) => write!(f, "Validation error: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::Internal(msg) => write!(f, "Internal error: {}", msg),
            ApiError::ExternalService(msg) => write!(f, "External service error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

/// 从sqlx::Error转换
impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".to_string()),
            _ => ApiError::Database(err),
        }
    }
}

/// 从anyhow::Error转换
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<sqlx::Error>() {
            Ok(sqlx_err) => ApiError::from(sqlx_err),
            Err(err) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::field(err.field(), err.to_string())
    }
}

impl From<GalleryError> for ApiError {
    fn from(err: GalleryError) -> Self {
        match err {
            GalleryError::NotFound(id) => ApiError::NotFound(format!("图集不存在: {}", id)),
            GalleryError::Cycle { .. } | GalleryError::SelfParent(_) => {
                ApiError::field("parent", err.to_string())
            }
            GalleryError::ProtectedFile(_) | GalleryError::InvalidFilename(_) => {
                ApiError::InvalidParameter(err.to_string())
            }
            GalleryError::AlreadyExists(_) => ApiError::Conflict(err.to_string()),
            GalleryError::NameExhausted(_) => ApiError::Conflict(err.to_string()),
            GalleryError::Io(e) => ApiError::Internal(e.to_string()),
            GalleryError::Database(e) => ApiError::from(e),
        }
    }
}

impl From<SongError> for ApiError {
    fn from(err: SongError) -> Self {
        match err {
            SongError::SongNotFound(id) => ApiError::SongNotFound(format!("歌曲 ID {} 不存在", id)),
            SongError::RecordNotFound(_) => ApiError::NotFound(err.to_string()),
            SongError::InvalidMerge(_) => ApiError::InvalidParameter(err.to_string()),
            SongError::Validation(e) => ApiError::from(e),
            SongError::Database(e) => ApiError::from(e),
        }
    }
}

impl From<LivestreamError> for ApiError {
    fn from(err: LivestreamError) -> Self {
        match err {
            LivestreamError::Validation(e) => ApiError::from(e),
            LivestreamError::NotFound(_) => ApiError::NotFound(err.to_string()),
            LivestreamError::AlreadyExists(_) => ApiError::Conflict(err.to_string()),
            LivestreamError::Database(e) => ApiError::from(e),
        }
    }
}

impl From<ThumbnailError> for ApiError {
    fn from(err: ThumbnailError) -> Self {
        match err {
            ThumbnailError::UnknownModule(_) | ThumbnailError::InvalidPath(_) => {
                ApiError::InvalidParameter(err.to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<BilibiliError> for ApiError {
    fn from(err: BilibiliError) -> Self {
        ApiError::ExternalService(err.to_string())
    }
}

/// 实现IntoResponse，将错误转换为统一的 `{code, message, errors}` 响应
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        let (message, errors) = match self {
            ApiError::Database(ref e) => {
                tracing::error!("Database error: {}", e);
                ("数据库操作失败".to_string(), None)
            }
            ApiError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                ("服务器内部错误".to_string(), None)
            }
            ApiError::ExternalService(ref msg) => {
                tracing::error!("External service error: {}", msg);
                (msg.clone(), None)
            }
            ApiError::Validation(msg, errors) => {
                (msg, if errors.is_empty() { None } else { Some(errors) })
            }
            ApiError::SongNotFound(msg)
            | ApiError::NotFound(msg)
            | ApiError::InvalidParameter(msg)
            | ApiError::Forbidden(msg)
            | ApiError::Conflict(msg) => (msg, None),
        };

        let mut body = Map::new();
        body.insert("code".to_string(), json!(status.as_u16()));
        body.insert("message".to_string(), json!(message));
        if let Some(errors) = errors {
            body.insert("errors".to_string(), json!(errors));
        }

        (status, Json(Value::Object(body))).into_response()
    }
}

/// Result类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ApiError::SongNotFound("歌曲 ID 3 不存在".to_string());
        assert_eq!(error.to_string(), "Song not found: 歌曲 ID 3 不存在");
    }

    #[test]
    fn test_error_conversion() {
        let sqlx_error = sqlx::Error::RowNotFound;
        let api_error: ApiError = sqlx_error.into();
        assert!(matches!(api_error, ApiError::NotFound(_)));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::InvalidParameter("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::validation("x").status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(ApiError::Forbidden("x".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::Internal("x".into()).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_validation_body_carries_field_errors() {
        let response = ApiError::field("parent", "会形成循环").into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], 422);
        assert_eq!(body["errors"]["parent"][0], "会形成循环");
    }
}
