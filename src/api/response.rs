use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// 统一的API响应包装器 `{code, message, data}`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    /// 创建成功响应
    pub fn success(data: T) -> Self {
        Self {
            code: 200,
            message: "success".to_string(),
            data: Some(data),
        }
    }

    /// 创建资源已创建响应
    pub fn created(data: T) -> Self {
        Self {
            code: 201,
            message: "创建成功".to_string(),
            data: Some(data),
        }
    }

    /// 创建成功响应（仅消息）
    pub fn message(message: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            code: 200,
            message: message.into(),
            data: None,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::OK);
        (status, Json(self)).into_response()
    }
}

/// 分页数据 `{total, page, page_size, results}`
#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T: Serialize> {
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub results: Vec<T>,
}

impl<T: Serialize> PaginatedResponse<T> {
    pub fn new(results: Vec<T>, total: i64, page: i64, page_size: i64) -> Self {
        Self {
            total,
            page,
            page_size,
            results,
        }
    }
}

impl<T: Serialize> IntoResponse for PaginatedResponse<T> {
    fn into_response(self) -> Response {
        ApiResponse::success(self).into_response()
    }
}

/// 分页参数（页码越界时钳到有效范围）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: i64,
    pub page_size: i64,
}

impl Page {
    /// 与 Django `Paginator.get_page` 一致：非法页码取第一页，超出取最后一页
    pub fn clamp(page: Option<i64>, page_size: i64, total: i64) -> Self {
        let page_size = page_size.max(1);
        let num_pages = ((total + page_size - 1) / page_size).max(1);
        let page = match page {
            Some(p) if p >= 1 => p.min(num_pages),
            _ => 1,
        };
        Self { page, page_size }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }
}

/// 辅助函数：创建成功响应
pub fn success<T: Serialize>(data: T) -> ApiResponse<T> {
    ApiResponse::success(data)
}

/// 辅助函数：创建201响应
pub fn created<T: Serialize>(data: T) -> ApiResponse<T> {
    ApiResponse::created(data)
}

/// 辅助函数：创建成功消息响应
pub fn success_message(message: impl Into<String>) -> ApiResponse<()> {
    ApiResponse::<()>::message(message)
}

/// 辅助函数：创建分页响应
pub fn paginated<T: Serialize>(
    results: Vec<T>,
    total: i64,
    page: Page,
) -> PaginatedResponse<T> {
    PaginatedResponse::new(results, total, page.page, page.page_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_response() {
        let response = ApiResponse::success("test data");
        assert_eq!(response.code, 200);
        assert_eq!(response.data, Some("test data"));
    }

    #[test]
    fn test_message_response_omits_data() {
        let response = ApiResponse::<()>::message("缓存已清空");
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["code"], 200);
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_paginated_response() {
        let response = PaginatedResponse::new(vec![1, 2, 3], 10, 1, 3);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["total"], 10);
        assert_eq!(json["page_size"], 3);
        assert_eq!(json["results"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_page_clamp() {
        assert_eq!(Page::clamp(None, 20, 100).page, 1);
        assert_eq!(Page::clamp(Some(0), 20, 100).page, 1);
        assert_eq!(Page::clamp(Some(99), 20, 100).page, 5);
        assert_eq!(Page::clamp(Some(3), 20, 0).page, 1);
        assert_eq!(Page::clamp(Some(2), 20, 100).offset(), 20);
    }
}
