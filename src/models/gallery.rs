use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::{HashMap, HashSet, VecDeque};

use super::validation::{StringValidator, ValidationError, Validator};

/// 图集（与磁盘目录一一对应）
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Gallery {
    pub id: String,
    pub title: String,
    pub description: String,
    pub cover_url: String,
    pub parent_id: Option<String>,
    pub level: i64,
    pub image_count: i64,
    /// 形如 `/gallery/A/B/`，首尾都带斜杠
    pub folder_path: String,
    pub tags: String, // JSON array as string
    pub sort_order: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Gallery {
    pub fn new(id: impl Into<String>, title: impl Into<String>, folder_path: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            cover_url: String::new(),
            parent_id: None,
            level: 0,
            image_count: 0,
            folder_path: folder_path.into(),
            tags: "[]".to_string(),
            sort_order: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn tag_list(&self) -> Vec<String> {
        serde_json::from_str(&self.tags).unwrap_or_default()
    }

    /// 相对 MEDIA_ROOT 的目录
    pub fn relative_dir(&self) -> &str {
        self.folder_path.trim_matches('/')
    }

    /// 由目录相对路径生成 ID：`gallery/A/B` → `gallery-A-B`
    pub fn id_from_relative_path(rel: &str) -> String {
        rel.trim_matches('/').replace(['/', '\\'], "-")
    }

    /// 由目录相对路径生成 folder_path：`gallery/A/B` → `/gallery/A/B/`
    pub fn folder_path_from_relative(rel: &str) -> String {
        format!("/{}/", rel.trim_matches('/').replace('\\', "/"))
    }

    pub fn summary(&self) -> GallerySummary {
        GallerySummary {
            id: self.id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            cover_url: self.cover_url.clone(),
            image_count: self.image_count,
            folder_path: self.folder_path.clone(),
            tags: self.tag_list(),
        }
    }
}

/// 面包屑条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breadcrumb {
    pub id: String,
    pub title: String,
}

/// 图集图片
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GalleryImage {
    pub filename: String,
    pub url: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GallerySummary {
    pub id: String,
    pub title: String,
    pub description: String,
    pub cover_url: String,
    pub image_count: i64,
    pub folder_path: String,
    pub tags: Vec<String>,
}

/// 树接口的节点
#[derive(Debug, Clone, Serialize)]
pub struct GalleryTreeNode {
    pub id: String,
    pub title: String,
    pub description: String,
    pub cover_url: String,
    pub level: i64,
    pub image_count: i64,
    pub folder_path: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<GalleryTreeNode>,
}

impl From<&Gallery> for GalleryTreeNode {
    fn from(g: &Gallery) -> Self {
        Self {
            id: g.id.clone(),
            title: g.title.clone(),
            description: g.description.clone(),
            cover_url: g.cover_url.clone(),
            level: g.level,
            image_count: g.image_count,
            folder_path: g.folder_path.clone(),
            tags: g.tag_list(),
            created_at: g.created_at,
            children: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GalleryChildView {
    pub id: String,
    pub title: String,
    pub description: String,
    pub cover_url: String,
    pub level: i64,
    pub image_count: i64,
    pub folder_path: String,
    pub tags: Vec<String>,
    pub is_leaf: bool,
}

/// 详情接口
#[derive(Debug, Clone, Serialize)]
pub struct GalleryDetail {
    pub id: String,
    pub title: String,
    pub description: String,
    pub cover_url: String,
    pub level: i64,
    pub image_count: i64,
    pub folder_path: String,
    pub tags: Vec<String>,
    pub is_leaf: bool,
    pub breadcrumbs: Vec<Breadcrumb>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<GalleryChildView>,
}

/// 子图集及其图片
#[derive(Debug, Clone, Serialize)]
pub struct ChildImages {
    pub gallery: GallerySummary,
    pub images: Vec<GalleryImage>,
}

/// `children-images` 接口：叶子返回自身图片，父图集按子图集分组
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ChildrenImagesView {
    Leaf {
        gallery: GallerySummary,
        images: Vec<GalleryImage>,
        total: usize,
    },
    Parent {
        children: Vec<ChildImages>,
        total_galleries: usize,
        total_images: usize,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGalleryRequest {
    /// 目录（相对 `gallery/`），如 `2024/春日`
    pub folder: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub parent_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub sort_order: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateGalleryRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    /// `Some(None)` 表示移到根
    #[serde(default, with = "double_option")]
    pub parent_id: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
    pub sort_order: Option<i64>,
    pub is_active: Option<bool>,
}

mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Option<String>>, s: S) -> Result<S::Ok, S::Error> {
        value.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Option<String>>, D::Error> {
        Option::<String>::deserialize(d).map(Some)
    }
}

impl Validator for CreateGalleryRequest {
    type Error = ValidationError;

    fn validate(&self) -> Result<(), Self::Error> {
        StringValidator::validate_title(&self.title)?;
        StringValidator::validate_relative_path("folder", &self.folder)?;
        Ok(())
    }
}

impl Validator for UpdateGalleryRequest {
    type Error = ValidationError;

    fn validate(&self) -> Result<(), Self::Error> {
        if let Some(ref title) = self.title {
            StringValidator::validate_title(title)?;
        }
        Ok(())
    }
}

/// 内存中的图集树（索引竞技场）
///
/// 所有遍历都是迭代实现，带访问集合防止脏数据中的环导致死循环。
#[derive(Debug, Default)]
pub struct GalleryTree {
    nodes: Vec<Gallery>,
    index: HashMap<String, usize>,
    children: Vec<Vec<usize>>,
    roots: Vec<usize>,
}

impl GalleryTree {
    pub fn new(mut galleries: Vec<Gallery>) -> Self {
        galleries.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then_with(|| a.id.cmp(&b.id)));

        let index: HashMap<String, usize> = galleries
            .iter()
            .enumerate()
            .map(|(i, g)| (g.id.clone(), i))
            .collect();

        let mut children = vec![Vec::new(); galleries.len()];
        let mut roots = Vec::new();
        for (i, g) in galleries.iter().enumerate() {
            match g.parent_id.as_ref().and_then(|p| index.get(p)) {
                Some(&parent) if parent != i => children[parent].push(i),
                _ => roots.push(i),
            }
        }

        Self {
            nodes: galleries,
            index,
            children,
            roots,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Gallery> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn roots(&self) -> impl Iterator<Item = &Gallery> {
        self.roots.iter().map(|&i| &self.nodes[i])
    }

    pub fn children(&self, id: &str) -> Vec<&Gallery> {
        match self.index.get(id) {
            Some(&i) => self.children[i].iter().map(|&c| &self.nodes[c]).collect(),
            None => Vec::new(),
        }
    }

    pub fn is_leaf(&self, id: &str) -> bool {
        self.index
            .get(id)
            .map(|&i| self.children[i].is_empty())
            .unwrap_or(true)
    }

    fn parent_index(&self, i: usize) -> Option<usize> {
        self.nodes[i]
            .parent_id
            .as_ref()
            .and_then(|p| self.index.get(p))
            .copied()
    }

    /// 从根到自身的路径
    pub fn breadcrumbs(&self, id: &str) -> Vec<Breadcrumb> {
        let Some(&start) = self.index.get(id) else {
            return Vec::new();
        };

        let mut visited = HashSet::new();
        let mut crumbs = Vec::new();
        let mut current = Some(start);
        while let Some(i) = current {
            if !visited.insert(i) {
                tracing::warn!("图集 {} 的父链存在环", id);
                break;
            }
            crumbs.push(Breadcrumb {
                id: self.nodes[i].id.clone(),
                title: self.nodes[i].title.clone(),
            });
            current = self.parent_index(i);
        }
        crumbs.reverse();
        crumbs
    }

    /// 祖先（父节点在前，根在最后）
    pub fn ancestors(&self, id: &str) -> Vec<&Gallery> {
        let Some(&start) = self.index.get(id) else {
            return Vec::new();
        };

        let mut visited = HashSet::from([start]);
        let mut result = Vec::new();
        let mut current = self.parent_index(start);
        while let Some(i) = current {
            if !visited.insert(i) {
                break;
            }
            result.push(&self.nodes[i]);
            current = self.parent_index(i);
        }
        result
    }

    /// 后代（广度优先，不含自身）
    pub fn descendants(&self, id: &str) -> Vec<&Gallery> {
        self.bfs_indices(id)
            .into_iter()
            .skip(1)
            .map(|i| &self.nodes[i])
            .collect()
    }

    fn bfs_indices(&self, id: &str) -> Vec<usize> {
        let Some(&start) = self.index.get(id) else {
            return Vec::new();
        };

        let mut visited = HashSet::from([start]);
        let mut order = vec![start];
        let mut queue = VecDeque::from([start]);
        while let Some(i) = queue.pop_front() {
            for &c in &self.children[i] {
                if visited.insert(c) {
                    order.push(c);
                    queue.push_back(c);
                }
            }
        }
        order
    }

    /// 把 `id` 的父节点设为 `proposed_parent` 是否会形成环
    ///
    /// 沿候选父节点的祖先链向上走，遇到自身即为环。
    pub fn would_create_cycle(&self, id: &str, proposed_parent: &str) -> bool {
        if id == proposed_parent {
            return true;
        }

        let mut visited = HashSet::new();
        let mut current = self.index.get(proposed_parent).copied();
        while let Some(i) = current {
            if self.nodes[i].id == id {
                return true;
            }
            if !visited.insert(i) {
                // 已有环，保守地拒绝
                return true;
            }
            current = self.parent_index(i);
        }
        false
    }

    /// 子树中每个节点的新层级（重新挂载后调用）
    ///
    /// `root_level` 为子树根的层级。
    pub fn subtree_levels(&self, id: &str, root_level: i64) -> Vec<(String, i64)> {
        let Some(&start) = self.index.get(id) else {
            return Vec::new();
        };

        let mut levels = HashMap::from([(start, root_level)]);
        let mut result = Vec::new();
        for i in self.bfs_indices(id) {
            let level = levels.get(&i).copied().unwrap_or(root_level);
            result.push((self.nodes[i].id.clone(), level));
            for &c in &self.children[i] {
                levels.insert(c, level + 1);
            }
        }
        result
    }

    /// 汇总子树的图片数量
    ///
    /// 显式栈深度优先收集节点，按层级倒序计算：叶子调用 `leaf_count`，
    /// 非叶子为子节点之和。返回的顺序即写库顺序（深层在前）。
    pub fn aggregate_counts<F>(&self, id: &str, mut leaf_count: F) -> Vec<(String, i64)>
    where
        F: FnMut(&Gallery) -> i64,
    {
        let Some(&start) = self.index.get(id) else {
            return Vec::new();
        };

        let mut visited = HashSet::new();
        let mut collected = Vec::new();
        let mut stack = vec![(start, 0usize)];
        while let Some((i, depth)) = stack.pop() {
            if !visited.insert(i) {
                continue;
            }
            collected.push((i, depth));
            for &c in &self.children[i] {
                stack.push((c, depth + 1));
            }
        }

        // 按深度倒序，保证子节点先于父节点计算
        collected.sort_by(|a, b| b.1.cmp(&a.1));

        let mut counts: HashMap<usize, i64> = HashMap::new();
        let mut result = Vec::with_capacity(collected.len());
        for (i, _) in collected {
            let count = if self.children[i].is_empty() {
                leaf_count(&self.nodes[i])
            } else {
                self.children[i]
                    .iter()
                    .map(|c| counts.get(c).copied().unwrap_or(0))
                    .sum()
            };
            counts.insert(i, count);
            result.push((self.nodes[i].id.clone(), count));
        }
        result
    }

    /// 构建嵌套树，只包含启用的节点
    pub fn to_nested(&self) -> Vec<GalleryTreeNode> {
        // 广度优先得到顺序，倒序组装保证子节点先完成
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        let mut queue: VecDeque<usize> = self
            .roots
            .iter()
            .copied()
            .filter(|&i| self.nodes[i].is_active)
            .collect();
        while let Some(i) = queue.pop_front() {
            if !visited.insert(i) {
                continue;
            }
            order.push(i);
            for &c in &self.children[i] {
                if self.nodes[c].is_active {
                    queue.push_back(c);
                }
            }
        }

        let mut built: HashMap<usize, GalleryTreeNode> = HashMap::new();
        for &i in order.iter().rev() {
            let mut node = GalleryTreeNode::from(&self.nodes[i]);
            node.children = self.children[i]
                .iter()
                .filter_map(|c| built.remove(c))
                .collect();
            built.insert(i, node);
        }

        self.roots
            .iter()
            .filter_map(|r| built.remove(r))
            .collect()
    }

    pub fn detail(&self, id: &str) -> Option<GalleryDetail> {
        let g = self.get(id)?;
        let children = self
            .children(id)
            .into_iter()
            .filter(|c| c.is_active)
            .map(|c| GalleryChildView {
                id: c.id.clone(),
                title: c.title.clone(),
                description: c.description.clone(),
                cover_url: c.cover_url.clone(),
                level: c.level,
                image_count: c.image_count,
                folder_path: c.folder_path.clone(),
                tags: c.tag_list(),
                is_leaf: self.is_leaf(&c.id),
            })
            .collect();

        Some(GalleryDetail {
            id: g.id.clone(),
            title: g.title.clone(),
            description: g.description.clone(),
            cover_url: g.cover_url.clone(),
            level: g.level,
            image_count: g.image_count,
            folder_path: g.folder_path.clone(),
            tags: g.tag_list(),
            is_leaf: self.is_leaf(id),
            breadcrumbs: self.breadcrumbs(id),
            created_at: g.created_at,
            children,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, parent: Option<&str>, level: i64) -> Gallery {
        let mut g = Gallery::new(id, id.to_uppercase(), format!("/gallery/{}/", id));
        g.parent_id = parent.map(str::to_string);
        g.level = level;
        g
    }

    fn sample() -> GalleryTree {
        GalleryTree::new(vec![
            node("a", None, 0),
            node("b", Some("a"), 1),
            node("c", Some("b"), 2),
            node("d", Some("a"), 1),
        ])
    }

    #[test]
    fn test_breadcrumbs_root_first() {
        let tree = sample();
        let ids: Vec<_> = tree.breadcrumbs("c").into_iter().map(|b| b.id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_breadcrumbs_stop_on_cycle() {
        let tree = GalleryTree::new(vec![node("x", Some("y"), 0), node("y", Some("x"), 0)]);
        assert_eq!(tree.breadcrumbs("x").len(), 2);
    }

    #[test]
    fn test_descendants_breadth_first() {
        let tree = sample();
        let ids: Vec<_> = tree.descendants("a").into_iter().map(|g| g.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "d", "c"]);
    }

    #[test]
    fn test_ancestors_parent_first() {
        let tree = sample();
        let ids: Vec<_> = tree.ancestors("c").into_iter().map(|g| g.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_cycle_detection() {
        let tree = sample();
        assert!(tree.would_create_cycle("a", "c"));
        assert!(tree.would_create_cycle("b", "b"));
        assert!(!tree.would_create_cycle("d", "c"));
    }

    #[test]
    fn test_aggregate_counts_sums_children() {
        let tree = sample();
        let counts: HashMap<_, _> = tree
            .aggregate_counts("a", |g| if g.id == "c" { 3 } else { 2 })
            .into_iter()
            .collect();
        assert_eq!(counts["c"], 3);
        assert_eq!(counts["b"], 3);
        assert_eq!(counts["d"], 2);
        assert_eq!(counts["a"], 5);
    }

    #[test]
    fn test_subtree_levels() {
        let tree = sample();
        let levels: HashMap<_, _> = tree.subtree_levels("b", 4).into_iter().collect();
        assert_eq!(levels["b"], 4);
        assert_eq!(levels["c"], 5);
        assert!(!levels.contains_key("a"));
    }

    #[test]
    fn test_nested_skips_inactive() {
        let mut hidden = node("d", Some("a"), 1);
        hidden.is_active = false;
        let tree = GalleryTree::new(vec![node("a", None, 0), node("b", Some("a"), 1), hidden]);
        let nested = tree.to_nested();
        assert_eq!(nested.len(), 1);
        assert_eq!(nested[0].children.len(), 1);
        assert_eq!(nested[0].children[0].id, "b");
    }

    #[test]
    fn test_id_and_folder_path_from_relative() {
        assert_eq!(Gallery::id_from_relative_path("gallery/A/B"), "gallery-A-B");
        assert_eq!(Gallery::folder_path_from_relative("gallery/A/B"), "/gallery/A/B/");
    }
}
