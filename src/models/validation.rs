use chrono::NaiveDate;
use thiserror::Error;

/// 验证错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("标题不能为空")]
    EmptyTitle,

    #[error("标题过长（最多 200 个字符）")]
    TitleTooLong,

    #[error("{field} 不能为空")]
    Required { field: &'static str },

    #[error("{field} 不是合法的相对路径: {value}")]
    InvalidPath { field: &'static str, value: String },

    #[error("无效的URL: {0}")]
    InvalidUrl(String),

    #[error("年份 {year} 不在 {min}-{max} 范围内")]
    InvalidYear { year: i32, min: i32, max: i32 },

    #[error("月份 {0} 不在 1-12 范围内")]
    InvalidMonth(u32),

    #[error("日期格式错误: {0}，应为 YYYY-MM-DD")]
    InvalidDate(String),

    #[error("{field} 时间格式错误: {value}，应为 HH:MM[:SS]")]
    InvalidTime { field: &'static str, value: String },

    #[error("备注过长（最多 1000 个字符）")]
    NotesTooLong,

    #[error("{field} 不能为负数")]
    Negative { field: &'static str },

    #[error("无效的BV号: {0}")]
    InvalidBvid(String),
}

impl ValidationError {
    /// 出错的字段名，用于 `errors` 字段
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::EmptyTitle | ValidationError::TitleTooLong => "title",
            ValidationError::Required { field }
            | ValidationError::InvalidPath { field, .. }
            | ValidationError::InvalidTime { field, .. }
            | ValidationError::Negative { field } => field,
            ValidationError::InvalidUrl(_) => "url",
            ValidationError::InvalidYear { .. } => "year",
            ValidationError::InvalidMonth(_) => "month",
            ValidationError::InvalidDate(_) => "date",
            ValidationError::NotesTooLong => "notes",
            ValidationError::InvalidBvid(_) => "bvid",
        }
    }
}

/// 验证器trait
pub trait Validator {
    type Error;

    fn validate(&self) -> Result<(), Self::Error>;
}

/// 字符串验证工具
pub struct StringValidator;

impl StringValidator {
    pub fn validate_title(title: &str) -> Result<(), ValidationError> {
        if title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle);
        }

        if title.chars().count() > 200 {
            return Err(ValidationError::TitleTooLong);
        }

        Ok(())
    }

    pub fn validate_required(field: &'static str, value: &str) -> Result<(), ValidationError> {
        if value.trim().is_empty() {
            return Err(ValidationError::Required { field });
        }
        Ok(())
    }

    pub fn validate_notes(notes: &Option<String>) -> Result<(), ValidationError> {
        if let Some(text) = notes {
            if text.chars().count() > 1000 {
                return Err(ValidationError::NotesTooLong);
            }
        }
        Ok(())
    }

    /// 允许 http(s) 绝对地址或以 `/` 开头的站内路径
    pub fn validate_url(url: &Option<String>) -> Result<(), ValidationError> {
        if let Some(url_str) = url {
            if url_str.is_empty() || url_str.starts_with('/') {
                return Ok(());
            }
            match url::Url::parse(url_str) {
                Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
                _ => return Err(ValidationError::InvalidUrl(url_str.clone())),
            }
        }
        Ok(())
    }

    /// 相对路径不能为空、不能是绝对路径、不能包含 `..`
    pub fn validate_relative_path(field: &'static str, value: &str) -> Result<(), ValidationError> {
        let trimmed = value.trim().trim_matches('/');
        let invalid = trimmed.is_empty()
            || value.starts_with('\\')
            || trimmed.contains('\\')
            || trimmed.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..");
        if invalid {
            return Err(ValidationError::InvalidPath {
                field,
                value: value.to_string(),
            });
        }
        Ok(())
    }

    pub fn validate_bvid(bvid: &str) -> Result<(), ValidationError> {
        lazy_static::lazy_static! {
            static ref BVID: regex::Regex = regex::Regex::new(r"^BV[0-9A-Za-z]{10}$")
                .expect("BV号正则");
        }
        if !BVID.is_match(bvid.trim()) {
            return Err(ValidationError::InvalidBvid(bvid.to_string()));
        }
        Ok(())
    }
}

/// 日期验证工具
pub struct DateValidator;

impl DateValidator {
    pub fn parse_date(value: &str) -> Result<NaiveDate, ValidationError> {
        NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
            .map_err(|_| ValidationError::InvalidDate(value.to_string()))
    }

    pub fn validate_year(year: i32, min: i32, max: i32) -> Result<(), ValidationError> {
        if year < min || year > max {
            return Err(ValidationError::InvalidYear { year, min, max });
        }
        Ok(())
    }

    pub fn validate_month(month: u32) -> Result<(), ValidationError> {
        if !(1..=12).contains(&month) {
            return Err(ValidationError::InvalidMonth(month));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_validation() {
        assert!(StringValidator::validate_title("春日").is_ok());
        assert_eq!(StringValidator::validate_title("  "), Err(ValidationError::EmptyTitle));
    }

    #[test]
    fn test_relative_path_validation() {
        assert!(StringValidator::validate_relative_path("folder", "2024/春日").is_ok());
        assert!(StringValidator::validate_relative_path("folder", "../etc").is_err());
        assert!(StringValidator::validate_relative_path("folder", "a//b").is_err());
        assert!(StringValidator::validate_relative_path("folder", "").is_err());
    }

    #[test]
    fn test_url_validation() {
        assert!(StringValidator::validate_url(&Some("https://b23.tv/x".into())).is_ok());
        assert!(StringValidator::validate_url(&Some("/covers/2024/01/2024-01-01.jpg".into())).is_ok());
        assert!(StringValidator::validate_url(&Some("ftp://x".into())).is_err());
        assert!(StringValidator::validate_url(&None).is_ok());
    }

    #[test]
    fn test_bvid_validation() {
        assert!(StringValidator::validate_bvid("BV1xx411c7mD").is_ok());
        assert!(StringValidator::validate_bvid("av12345").is_err());
    }

    #[test]
    fn test_year_and_month() {
        assert!(DateValidator::validate_year(2024, 2019, 2030).is_ok());
        assert_eq!(DateValidator::validate_year(2018, 2019, 2030).unwrap_err().field(), "year");
        assert!(DateValidator::validate_month(13).is_err());
    }
}
