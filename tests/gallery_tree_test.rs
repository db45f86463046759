// 图集树集成测试
//
// 覆盖树结构的不变量（proptest）以及服务层在真实目录上的挂载、计数与并发上传。

use std::collections::HashSet;
use std::sync::Arc;

use fans_home_backend::database::Database;
use fans_home_backend::models::{CreateGalleryRequest, Gallery, GalleryTree, UpdateGalleryRequest};
use fans_home_backend::services::{GalleryError, GalleryService, ThumbnailGenerator};
use proptest::prelude::*;
use tempfile::TempDir;

fn tree_from_parents(parents: &[Option<usize>]) -> GalleryTree {
    let galleries = parents
        .iter()
        .enumerate()
        .map(|(i, parent)| {
            let mut g = Gallery::new(format!("g{}", i), format!("图集{}", i), format!("/gallery/g{}/", i));
            g.parent_id = parent.map(|p| format!("g{}", p));
            g
        })
        .collect();
    GalleryTree::new(galleries)
}

/// 父节点总是编号更小的节点，保证生成的是森林
fn forest() -> impl Strategy<Value = Vec<Option<usize>>> {
    (1usize..40).prop_flat_map(|n| {
        (0..n)
            .map(|i| {
                if i == 0 {
                    Just(None::<usize>).boxed()
                } else {
                    prop_oneof![Just(None), (0..i).prop_map(Some)].boxed()
                }
            })
            .collect::<Vec<_>>()
    })
}

proptest! {
    #[test]
    fn breadcrumbs_run_from_root_to_self(parents in forest()) {
        let tree = tree_from_parents(&parents);
        for i in 0..parents.len() {
            let id = format!("g{}", i);
            let crumbs = tree.breadcrumbs(&id);
            prop_assert_eq!(crumbs.last().map(|c| c.id.as_str()), Some(id.as_str()));
            prop_assert!(tree.get(&crumbs[0].id).unwrap().parent_id.is_none());
            prop_assert_eq!(crumbs.len(), tree.ancestors(&id).len() + 1);
        }
    }

    #[test]
    fn descendants_are_exactly_the_cycle_forming_parents(parents in forest()) {
        let tree = tree_from_parents(&parents);
        for i in 0..parents.len() {
            let id = format!("g{}", i);
            let descendants: HashSet<String> = tree.descendants(&id).into_iter().map(|g| g.id.clone()).collect();
            prop_assert!(!descendants.contains(&id));
            for j in 0..parents.len() {
                let other = format!("g{}", j);
                let forms_cycle = other == id || descendants.contains(&other);
                prop_assert_eq!(tree.would_create_cycle(&id, &other), forms_cycle);
            }
        }
    }

    #[test]
    fn aggregated_count_is_sum_of_leaves(parents in forest(), weights in prop::collection::vec(0i64..50, 40)) {
        let tree = tree_from_parents(&parents);
        let leaf_weight = |g: &Gallery| weights[g.id[1..].parse::<usize>().unwrap()];

        for root in tree.roots() {
            let counts = tree.aggregate_counts(&root.id, leaf_weight);
            let root_count = counts.iter().find(|(id, _)| *id == root.id).unwrap().1;

            let expected: i64 = std::iter::once(root)
                .chain(tree.descendants(&root.id))
                .filter(|g| tree.is_leaf(&g.id))
                .map(leaf_weight)
                .sum();
            prop_assert_eq!(root_count, expected);
            // 写库顺序：根最后
            prop_assert_eq!(&counts.last().unwrap().0, &root.id);
        }
    }
}

async fn setup() -> (TempDir, GalleryService) {
    let dir = TempDir::new().unwrap();
    let db = Database::in_memory().await.unwrap();
    let service = GalleryService::new(
        db.pool().clone(),
        dir.path().to_path_buf(),
        ThumbnailGenerator::new(dir.path()),
    );
    (dir, service)
}

fn create_req(folder: &str, parent: Option<&str>) -> CreateGalleryRequest {
    CreateGalleryRequest {
        folder: folder.to_string(),
        title: folder.rsplit('/').next().unwrap_or(folder).to_string(),
        description: String::new(),
        parent_id: parent.map(str::to_string),
        tags: Vec::new(),
        sort_order: 0,
    }
}

#[tokio::test]
async fn test_nested_creation_and_counts_propagate() {
    let (_dir, service) = setup().await;

    let a = service.create_gallery(&create_req("A", None)).await.unwrap();
    let b = service.create_gallery(&create_req("A/B", Some(a.id.as_str()))).await.unwrap();
    let c = service.create_gallery(&create_req("A/B/C", Some(b.id.as_str()))).await.unwrap();
    assert_eq!(c.id, "gallery-A-B-C");
    assert_eq!(c.folder_path, "/gallery/A/B/C/");
    assert_eq!(c.level, 2);

    service.add_image(&c.id, b"img", "photo.JPG", None).await.unwrap();
    service.add_image(&c.id, b"img", "photo.png", None).await.unwrap();

    for id in [&a.id, &b.id, &c.id] {
        assert_eq!(service.detail(id).await.unwrap().image_count, 2, "{}", id);
    }

    let images = service.images(&c.id).await.unwrap();
    let names: Vec<&str> = images.iter().map(|i| i.filename.as_str()).collect();
    assert_eq!(names, vec!["001.jpg", "002.png"]);

    assert!(service.delete_image(&c.id, "001.jpg").await.unwrap());
    assert_eq!(service.detail(&a.id).await.unwrap().image_count, 1);
}

#[tokio::test]
async fn test_breadcrumbs_five_levels_deep() {
    let (_dir, service) = setup().await;

    let mut parent: Option<String> = None;
    let mut folder = String::new();
    for name in ["L1", "L2", "L3", "L4", "L5"] {
        folder = if folder.is_empty() { name.to_string() } else { format!("{}/{}", folder, name) };
        let g = service.create_gallery(&create_req(&folder, parent.as_deref())).await.unwrap();
        parent = Some(g.id);
    }

    let detail = service.detail("gallery-L1-L2-L3-L4-L5").await.unwrap();
    let crumbs: Vec<&str> = detail.breadcrumbs.iter().map(|b| b.title.as_str()).collect();
    assert_eq!(crumbs, vec!["L1", "L2", "L3", "L4", "L5"]);
    assert_eq!(detail.level, 4);
    assert!(detail.is_leaf);
}

#[tokio::test]
async fn test_reparent_rejects_cycles_and_updates_levels() {
    let (_dir, service) = setup().await;
    let a = service.create_gallery(&create_req("A", None)).await.unwrap();
    let b = service.create_gallery(&create_req("A/B", Some(a.id.as_str()))).await.unwrap();
    let c = service.create_gallery(&create_req("A/B/C", Some(b.id.as_str()))).await.unwrap();

    let err = service.set_parent(&a.id, Some(c.id.as_str())).await.unwrap_err();
    assert!(matches!(err, GalleryError::Cycle { .. }));
    let err = service.set_parent(&a.id, Some(a.id.as_str())).await.unwrap_err();
    assert!(matches!(err, GalleryError::SelfParent(_) | GalleryError::Cycle { .. }));

    // B 移到根后，C 的层级随之变化
    let update = UpdateGalleryRequest {
        parent_id: Some(None),
        ..Default::default()
    };
    service.update_gallery(&b.id, &update).await.unwrap();
    assert_eq!(service.detail(&b.id).await.unwrap().level, 0);
    assert_eq!(service.detail(&c.id).await.unwrap().level, 1);
    assert_eq!(service.detail(&c.id).await.unwrap().breadcrumbs.len(), 2);
}

#[tokio::test]
async fn test_concurrent_uploads_get_unique_names() {
    let (dir, service) = setup().await;
    let service = Arc::new(service);
    let g = service.create_gallery(&create_req("burst", None)).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..8u8 {
        let service = service.clone();
        let id = g.id.clone();
        handles.push(tokio::spawn(async move {
            service.add_image(&id, &[i; 4], "upload.jpg", None).await.unwrap()
        }));
    }

    let mut names = HashSet::new();
    for handle in handles {
        assert!(names.insert(handle.await.unwrap()));
    }
    assert_eq!(names.len(), 8);
    assert!(names.contains("001.jpg") && names.contains("008.jpg"));

    let on_disk = std::fs::read_dir(dir.path().join("gallery/burst")).unwrap().count();
    assert_eq!(on_disk, 8);
    assert_eq!(service.detail(&g.id).await.unwrap().image_count, 8);
}

#[tokio::test]
async fn test_sync_from_folder_builds_hierarchy() {
    let (dir, service) = setup().await;
    let leaf = dir.path().join("gallery/2024/春日");
    std::fs::create_dir_all(&leaf).unwrap();
    std::fs::write(leaf.join("001.jpg"), b"x").unwrap();
    std::fs::write(leaf.join("notes.txt"), b"x").unwrap();

    let report = service.sync_from_folder().await.unwrap();
    assert_eq!(report.created, 2);

    let detail = service.detail("gallery-2024-春日").await.unwrap();
    assert_eq!(detail.image_count, 1);
    assert_eq!(detail.breadcrumbs[0].id, "gallery-2024");
    assert_eq!(service.detail("gallery-2024").await.unwrap().image_count, 1);

    let again = service.sync_from_folder().await.unwrap();
    assert_eq!(again.created, 0);
    assert_eq!(again.updated, 2);
}

#[tokio::test]
async fn test_cover_file_is_protected() {
    let (dir, service) = setup().await;
    let g = service.create_gallery(&create_req("cover", None)).await.unwrap();
    let cover = dir.path().join("gallery/cover/cover.jpg");
    std::fs::create_dir_all(cover.parent().unwrap()).unwrap();
    std::fs::write(&cover, b"cover").unwrap();

    let err = service.delete_image(&g.id, "cover.jpg").await.unwrap_err();
    assert!(matches!(err, GalleryError::ProtectedFile(ref name) if name == "cover.jpg"));
    assert!(cover.exists());

    // 显式文件名也不能写入封面
    let err = service.add_image(&g.id, b"img", "x.jpg", Some("cover.jpg")).await.unwrap_err();
    assert!(matches!(err, GalleryError::ProtectedFile(_)));
    assert_eq!(std::fs::read(&cover).unwrap(), b"cover");
    assert!(service.detail(&g.id).await.unwrap().cover_url.is_empty());
}

#[tokio::test]
async fn test_update_cover_writes_file_and_url() {
    let (dir, service) = setup().await;
    let g = service.create_gallery(&create_req("2024/夏", None)).await.unwrap();

    let cover_url = service.update_cover(&g.id, b"first").await.unwrap();
    assert_eq!(cover_url, "/gallery/2024/夏/cover.jpg");
    let cover_url = service.update_cover(&g.id, b"second").await.unwrap();
    assert_eq!(cover_url, format!("{}cover.jpg", g.folder_path));

    let folder = dir.path().join("gallery/2024/夏");
    assert_eq!(std::fs::read(folder.join("cover.jpg")).unwrap(), b"second");
    // 临时文件不残留，封面不计入图片
    assert_eq!(std::fs::read_dir(&folder).unwrap().count(), 1);
    let detail = service.detail(&g.id).await.unwrap();
    assert_eq!(detail.cover_url, cover_url);
    assert!(service.images(&g.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_name_allocation_gives_up_after_bounded_attempts() {
    let (dir, service) = setup().await;
    let g = service.create_gallery(&create_req("full", None)).await.unwrap();
    // 与候选文件名同名的目录会让每次独占创建都失败
    let folder = dir.path().join("gallery/full");
    for n in 1..=100 {
        std::fs::create_dir_all(folder.join(format!("{:03}.jpg", n))).unwrap();
    }

    let err = service.add_image(&g.id, b"img", "x.jpg", None).await.unwrap_err();
    assert!(matches!(err, GalleryError::NameExhausted(ref id) if id == &g.id));
    assert!(!folder.join("101.jpg").exists());
}

#[tokio::test]
async fn test_name_allocation_at_numeric_limit() {
    let (dir, service) = setup().await;
    let g = service.create_gallery(&create_req("big", None)).await.unwrap();
    let folder = dir.path().join("gallery/big");
    std::fs::create_dir_all(&folder).unwrap();
    std::fs::write(folder.join("4294967295.jpg"), b"x").unwrap();

    let err = service.add_image(&g.id, b"img", "x.jpg", None).await.unwrap_err();
    assert!(matches!(err, GalleryError::NameExhausted(_)));
    assert!(!folder.join("000.jpg").exists());

    // 超出 u32 的编号不参与分配
    std::fs::remove_file(folder.join("4294967295.jpg")).unwrap();
    std::fs::write(folder.join("99999999999.jpg"), b"x").unwrap();
    assert_eq!(service.add_image(&g.id, b"img", "x.jpg", None).await.unwrap(), "001.jpg");
}

#[tokio::test]
async fn test_refresh_detail_works_for_inactive_gallery() {
    let (dir, service) = setup().await;
    let g = service.create_gallery(&create_req("hidden", None)).await.unwrap();
    let update = UpdateGalleryRequest {
        is_active: Some(false),
        ..Default::default()
    };
    service.update_gallery(&g.id, &update).await.unwrap();
    std::fs::write(dir.path().join("gallery/hidden/001.jpg"), b"x").unwrap();

    assert!(matches!(service.detail(&g.id).await, Err(GalleryError::NotFound(_))));
    let detail = service.refresh_detail(&g.id).await.unwrap();
    assert_eq!(detail.image_count, 1);
}
