use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::validation::{StringValidator, ValidationError, Validator};

/// 粉丝二创合集
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Collection {
    pub id: i64,
    pub name: String,
    pub works_count: i64,
    pub display_order: i64,
    pub position: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 二创作品（查询时连带合集名）
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Work {
    pub id: i64,
    pub collection_id: i64,
    pub collection_name: String,
    pub title: String,
    pub cover_url: Option<String>,
    pub view_url: Option<String>,
    pub author: String,
    pub notes: Option<String>,
    pub display_order: i64,
    pub position: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionRef {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkView {
    pub id: i64,
    pub title: String,
    pub cover_url: Option<String>,
    pub view_url: Option<String>,
    pub author: String,
    pub notes: Option<String>,
    pub position: i64,
    pub display_order: i64,
    pub collection: CollectionRef,
}

impl From<Work> for WorkView {
    fn from(w: Work) -> Self {
        Self {
            id: w.id,
            title: w.title,
            cover_url: w.cover_url,
            view_url: w.view_url,
            author: w.author,
            notes: w.notes,
            position: w.position,
            display_order: w.display_order,
            collection: CollectionRef {
                id: w.collection_id,
                name: w.collection_name,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCollectionRequest {
    pub name: String,
    #[serde(default)]
    pub position: i64,
    #[serde(default)]
    pub display_order: i64,
}

impl Validator for CreateCollectionRequest {
    type Error = ValidationError;

    fn validate(&self) -> Result<(), Self::Error> {
        StringValidator::validate_required("name", &self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateWorkRequest {
    pub collection_id: i64,
    pub title: String,
    pub author: String,
    pub cover_url: Option<String>,
    pub view_url: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub position: i64,
    #[serde(default)]
    pub display_order: i64,
}

impl Validator for CreateWorkRequest {
    type Error = ValidationError;

    fn validate(&self) -> Result<(), Self::Error> {
        StringValidator::validate_title(&self.title)?;
        StringValidator::validate_required("author", &self.author)?;
        StringValidator::validate_url(&self.view_url)?;
        StringValidator::validate_notes(&self.notes)?;
        Ok(())
    }
}

/// 列表查询参数
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub collection: Option<i64>,
}
