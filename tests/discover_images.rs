use std::path::PathBuf;
use vision_describe::discover::collect_images;

fn touch(p: &std::path::Path) {
    std::fs::write(p, b"x").unwrap();
}

#[test]
fn expands_directories_sorted_and_deduplicated() {
    let dir = tempfile::tempdir().unwrap();
    touch(&dir.path().join("b.jpg"));
    touch(&dir.path().join("a.PNG"));
    touch(&dir.path().join("notes.txt"));
    std::fs::create_dir(dir.path().join("nested")).unwrap();
    touch(&dir.path().join("nested").join("c.webp"));

    let inputs = vec![dir.path().to_path_buf(), dir.path().join("b.jpg")];
    let found = collect_images(&inputs, false).unwrap();

    let names: Vec<String> = found
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["a.PNG", "b.jpg"]);
}

#[test]
fn recursive_scan_descends() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("x").join("y")).unwrap();
    touch(&dir.path().join("x").join("y").join("deep.jpeg"));

    let found = collect_images(&[dir.path().to_path_buf()], true).unwrap();
    assert_eq!(found, vec![dir.path().join("x").join("y").join("deep.jpeg")]);
}

#[test]
fn unsupported_files_are_skipped_and_missing_paths_error() {
    let dir = tempfile::tempdir().unwrap();
    let doc = dir.path().join("readme.md");
    touch(&doc);
    assert!(collect_images(&[doc], false).unwrap().is_empty());
    assert!(collect_images(&[PathBuf::from("/no/such/place.jpg")], false).is_err());
}
