//! Dataset discovery and post-run artifact relocation.

#![cfg(unix)]

use mapflow::workflow::{discover_pack_folders, relocate_map_output};
use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn touch(path: &Path) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("parent dir");
    }
    fs::write(path, b"x").expect("file");
}

#[test]
fn root_with_direct_packs_is_the_single_dataset() {
    let root = TempDir::new().expect("temp dir");
    touch(&root.path().join("IMU#_0.pack"));
    touch(&root.path().join("sub/ODO#_1.pack"));

    let folders = discover_pack_folders(root.path()).expect("discover");
    assert_eq!(folders, vec![root.path().to_path_buf()]);
}

#[test]
fn subfolders_are_discovered_in_lexicographic_order() {
    let root = TempDir::new().expect("temp dir");
    touch(&root.path().join("b/session.pack"));
    touch(&root.path().join("a/session.pack"));
    // no direct pack file in the root itself

    let folders = discover_pack_folders(root.path()).expect("discover");
    assert_eq!(
        folders,
        vec![root.path().join("a"), root.path().join("b")]
    );
}

#[test]
fn folders_without_packs_are_skipped() {
    let root = TempDir::new().expect("temp dir");
    touch(&root.path().join("a/session.pack"));
    fs::create_dir_all(root.path().join("empty")).expect("dir");
    touch(&root.path().join("notes/readme.txt"));
    touch(&root.path().join("nested/deep/session.pack"));

    let folders = discover_pack_folders(root.path()).expect("discover");
    assert_eq!(
        folders,
        vec![root.path().join("a"), root.path().join("nested/deep")]
    );
}

#[test]
fn failed_map_wins_post_processing() {
    let root = TempDir::new().expect("temp dir");
    let mapping_work = root.path().join("mapping");
    let loc_work = root.path().join("loc");
    let log_folder = root.path().join("log/run1");
    fs::create_dir_all(&log_folder).expect("log folder");
    fs::create_dir_all(&loc_work).expect("loc work");
    touch(&mapping_work.join("map/failed/park.ndm"));
    touch(&mapping_work.join("map/partial.ndm"));

    relocate_map_output(&log_folder, &mapping_work, &loc_work).expect("relocate");

    assert!(log_folder.join("failed/park.ndm").is_file());
    assert!(!log_folder.join("map").exists());
    // the stale map folder is removed together with its leftovers
    assert!(!mapping_work.join("map").exists());
}

#[test]
fn successful_map_is_moved_with_contents() {
    let root = TempDir::new().expect("temp dir");
    let mapping_work = root.path().join("output/mapping");
    let loc_work = root.path().join("loc");
    let log_folder = root.path().join("log/run1");
    fs::create_dir_all(&log_folder).expect("log folder");
    fs::create_dir_all(&loc_work).expect("loc work");
    fs::create_dir_all(&mapping_work).expect("mapping work");
    touch(&mapping_work.join("map/park.ndm"));
    touch(&mapping_work.join("map/tiles/0.ndm"));

    relocate_map_output(&log_folder, &mapping_work, &loc_work).expect("relocate");

    assert!(log_folder.join("map/park.ndm").is_file());
    assert!(log_folder.join("map/tiles/0.ndm").is_file());
    assert!(!mapping_work.join("map").exists());
    assert!(!log_folder.join("failed").exists());
}

#[test]
fn map_beside_the_mapping_folder_is_preferred() {
    let root = TempDir::new().expect("temp dir");
    let output = root.path().join("output");
    let mapping_work = output.join("mapping");
    let loc_work = root.path().join("loc");
    let log_folder = root.path().join("log/run1");
    fs::create_dir_all(&log_folder).expect("log folder");
    fs::create_dir_all(&loc_work).expect("loc work");
    fs::create_dir_all(&mapping_work).expect("mapping work");
    touch(&output.join("map/outer.ndm"));
    touch(&mapping_work.join("map/inner.ndm"));

    relocate_map_output(&log_folder, &mapping_work, &loc_work).expect("relocate");

    // the folder next to the mapping work folder is the first candidate
    assert!(log_folder.join("map/outer.ndm").is_file());
    assert!(mapping_work.join("map/inner.ndm").is_file());
}
