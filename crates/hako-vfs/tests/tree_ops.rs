//! Whole-tree behavior of file handles over the memory backend.

use std::sync::Arc;

use futures::{StreamExt, TryStreamExt};
use hako_vfs::path;
use hako_vfs::{MemoryBackend, VfsFile};

fn memory_root() -> VfsFile {
    VfsFile::new(Arc::new(MemoryBackend::new()), "")
}

/// src/
///   .hidden/f.txt
///   a.txt
///   b/c.txt
///   b/d/e.txt
async fn build_tree(root: &VfsFile) -> VfsFile {
    let src = root.get("src");
    for (file, body) in [
        (".hidden/f.txt", "f"),
        ("a.txt", "a"),
        ("b/c.txt", "c"),
        ("b/d/e.txt", "e"),
    ] {
        let file = src.get(file);
        file.ensure_parents().await.unwrap();
        file.write_string(body).await.unwrap();
    }
    src
}

fn rel(file: &VfsFile) -> String {
    path::relative(file.path())
}

#[tokio::test]
async fn test_round_trip_sizes() {
    let root = memory_root();
    let big: Vec<u8> = (0..4 * 1024 * 1024 + 17).map(|i| (i % 251) as u8).collect();

    for payload in [Vec::new(), vec![0x42], big] {
        let file = root.get("blob.bin");
        file.write(&payload).await.unwrap();
        assert_eq!(file.read().await.unwrap(), payload);
        assert_eq!(file.size().await.unwrap(), payload.len() as u64);
    }
}

#[tokio::test]
async fn test_list_is_one_level() {
    let root = memory_root();
    let src = build_tree(&root).await;

    let names: Vec<String> = src
        .list()
        .await
        .unwrap()
        .map_ok(|f| f.basename().to_string())
        .try_collect()
        .await
        .unwrap();
    assert_eq!(names, vec![".hidden", "a.txt", "b"]);
}

#[tokio::test]
async fn test_list_recursive_pre_order() {
    let root = memory_root();
    let src = build_tree(&root).await;

    let all: Vec<String> = src
        .list_recursive(|_| true)
        .map_ok(|f| rel(&f))
        .try_collect()
        .await
        .unwrap();
    assert_eq!(
        all,
        vec![
            "src/.hidden",
            "src/.hidden/f.txt",
            "src/a.txt",
            "src/b",
            "src/b/c.txt",
            "src/b/d",
            "src/b/d/e.txt",
        ]
    );
}

#[tokio::test]
async fn test_list_recursive_filter_prunes() {
    let root = memory_root();
    let src = build_tree(&root).await;

    let visible: Vec<String> = src
        .list_recursive(|f| !f.basename().starts_with('.') && f.basename() != "d")
        .map_ok(|f| rel(&f))
        .try_collect()
        .await
        .unwrap();
    assert_eq!(visible, vec!["src/a.txt", "src/b", "src/b/c.txt"]);
}

#[tokio::test]
async fn test_list_recursive_missing_dir_errors_once() {
    let root = memory_root();
    let results: Vec<_> = root.get("nope").list_recursive(|_| true).collect().await;
    assert_eq!(results.len(), 1);
    assert!(results[0].is_err());
}

#[tokio::test]
async fn test_copy_to_tree_fidelity() {
    let root = memory_root();
    let src = build_tree(&root).await;
    let dst = root.get("dst");

    let mut seen = Vec::new();
    let mut record = |from: &VfsFile, to: &VfsFile| {
        seen.push((rel(from), rel(to)));
    };
    src.copy_to_tree(&dst, &mut record).await.unwrap();

    assert_eq!(
        seen,
        vec![
            ("src".to_string(), "dst".to_string()),
            ("src/.hidden".into(), "dst/.hidden".into()),
            ("src/.hidden/f.txt".into(), "dst/.hidden/f.txt".into()),
            ("src/a.txt".into(), "dst/a.txt".into()),
            ("src/b".into(), "dst/b".into()),
            ("src/b/c.txt".into(), "dst/b/c.txt".into()),
            ("src/b/d".into(), "dst/b/d".into()),
            ("src/b/d/e.txt".into(), "dst/b/d/e.txt".into()),
        ]
    );

    let copied: Vec<String> = dst
        .list_recursive(|_| true)
        .map_ok(|f| rel(&f).replacen("dst", "src", 1))
        .try_collect()
        .await
        .unwrap();
    let original: Vec<String> = src
        .list_recursive(|_| true)
        .map_ok(|f| rel(&f))
        .try_collect()
        .await
        .unwrap();
    assert_eq!(copied, original);
    assert_eq!(dst.get("b/d/e.txt").read_string().await.unwrap(), "e");
    assert!(dst.get("b/d").is_directory().await);
}

#[tokio::test]
async fn test_copy_to_tree_notify_precedes_action() {
    let root = memory_root();
    let src = build_tree(&root).await;
    let dst = root.get("dst");

    // Memory stat never waits on the runtime, so it can be polled to
    // completion inside the synchronous callback.
    let mut already_there = Vec::new();
    let mut check = |_: &VfsFile, to: &VfsFile| {
        if futures::executor::block_on(to.exists()) {
            already_there.push(rel(to));
        }
    };
    src.copy_to_tree(&dst, &mut check).await.unwrap();

    assert!(already_there.is_empty(), "notified after acting: {already_there:?}");
    assert!(dst.get("b/d/e.txt").exists().await);
}

#[tokio::test]
async fn test_copy_single_file_across_backends() {
    let a = memory_root();
    let b = memory_root();
    a.get("x.txt").write_string("payload").await.unwrap();

    let mut count = 0;
    let mut counter = |_: &VfsFile, _: &VfsFile| count += 1;
    a.get("x.txt").copy_to_tree(&b.get("y.txt"), &mut counter).await.unwrap();

    assert_eq!(count, 1);
    assert_eq!(b.get("y.txt").read_string().await.unwrap(), "payload");
    assert!(!b.get("x.txt").exists().await);
}
