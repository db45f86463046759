use crate::models::SongListQuery;
use sqlx::{QueryBuilder, Sqlite};

/// 允许排序的字段
pub const SONG_ORDERING_FIELDS: [&str; 4] = ["singer", "last_performed", "perform_count", "first_perform"];

/// 默认排序
pub const DEFAULT_SONG_ORDERING: &str = "-last_performed";

/// 歌曲列表动态查询构建器
///
/// 同一组过滤条件既用于 `COUNT(*)` 也用于分页查询。
pub struct SongQueryBuilder {
    query: QueryBuilder<'static, Sqlite>,
    has_where: bool,
}

impl SongQueryBuilder {
    pub fn select() -> Self {
        Self {
            query: QueryBuilder::new("SELECT songs.* FROM songs"),
            has_where: false,
        }
    }

    pub fn count() -> Self {
        Self {
            query: QueryBuilder::new("SELECT COUNT(*) FROM songs"),
            has_where: false,
        }
    }

    pub fn with_filters(mut self, filters: &SongListQuery) -> Self {
        // 歌名或歌手模糊搜索
        if let Some(ref q) = filters.q {
            let q = q.trim();
            if !q.is_empty() {
                self.add_where_clause();
                self.query.push("(songs.song_name LIKE ");
                self.query.push_bind(format!("%{}%", q));
                self.query.push(" OR songs.singer LIKE ");
                self.query.push_bind(format!("%{}%", q));
                self.query.push(")");
            }
        }

        // 语言过滤（逗号分隔，任一匹配）
        let languages = filters.language_list();
        if !languages.is_empty() {
            self.add_where_clause();
            self.query.push("songs.language IN (");
            let mut separated = self.query.separated(", ");
            for lang in languages {
                separated.push_bind(lang);
            }
            separated.push_unseparated(")");
        }

        // 曲风过滤
        let styles = filters.style_list();
        if !styles.is_empty() {
            self.add_where_clause();
            self.push_exists(
                "SELECT 1 FROM song_styles ss JOIN styles s ON s.id = ss.style_id \
                 WHERE ss.song_id = songs.id AND s.name IN (",
                styles,
            );
        }

        // 标签过滤
        let tags = filters.tag_list();
        if !tags.is_empty() {
            self.add_where_clause();
            self.push_exists(
                "SELECT 1 FROM song_tags st JOIN tags t ON t.id = st.tag_id \
                 WHERE st.song_id = songs.id AND t.name IN (",
                tags,
            );
        }

        self
    }

    /// 排序，字段不在白名单内时使用默认排序
    pub fn with_ordering(mut self, ordering: Option<&str>) -> Self {
        let ordering = ordering
            .map(str::trim)
            .filter(|o| SONG_ORDERING_FIELDS.contains(&o.trim_start_matches('-')))
            .unwrap_or(DEFAULT_SONG_ORDERING);

        let (field, direction) = match ordering.strip_prefix('-') {
            Some(field) => (field, "DESC"),
            None => (ordering, "ASC"),
        };

        self.query.push(" ORDER BY songs.");
        self.query.push(field);
        self.query.push(" ");
        self.query.push(direction);
        self.query.push(", songs.id ASC");
        self
    }

    pub fn with_pagination(mut self, limit: i64, offset: i64) -> Self {
        self.query.push(" LIMIT ");
        self.query.push_bind(limit);
        self.query.push(" OFFSET ");
        self.query.push_bind(offset);
        self
    }

    pub fn build(self) -> QueryBuilder<'static, Sqlite> {
        self.query
    }

    fn push_exists(&mut self, subquery: &str, values: Vec<String>) {
        self.query.push("EXISTS (");
        self.query.push(subquery);
        let mut separated = self.query.separated(", ");
        for value in values {
            separated.push_bind(value);
        }
        separated.push_unseparated("))");
    }

    fn add_where_clause(&mut self) {
        if !self.has_where {
            self.query.push(" WHERE ");
            self.has_where = true;
        } else {
            self.query.push(" AND ");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ordering_when_unknown_field() {
        let builder = SongQueryBuilder::select().with_ordering(Some("-song_name"));
        assert!(builder.build().sql().ends_with("ORDER BY songs.last_performed DESC, songs.id ASC"));
    }

    #[test]
    fn test_filters_are_anded() {
        let query = SongListQuery {
            q: Some("晴天".into()),
            styles: Some("流行".into()),
            tags: Some("经典,热门".into()),
            ..Default::default()
        };
        let sql = SongQueryBuilder::count().with_filters(&query).build().sql().to_string();
        assert!(sql.starts_with("SELECT COUNT(*) FROM songs WHERE (songs.song_name LIKE"));
        assert_eq!(sql.matches(" AND ").count(), 4);
        assert!(sql.contains("t.name IN (?, ?)"));
    }

    #[test]
    fn test_ascending_ordering() {
        let builder = SongQueryBuilder::select().with_ordering(Some("perform_count"));
        assert!(builder.build().sql().contains("ORDER BY songs.perform_count ASC"));
    }
}
