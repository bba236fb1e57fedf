use vision_describe::{
    config::Prompt,
    prompt::{load_prompt, resolve_prompt, DEFAULT_PROMPT},
};

#[test]
fn load_trims_and_rejects_empty() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("p.txt");
    std::fs::write(&good, "\n  Describe the scene for an archive.  \n").unwrap();
    assert_eq!(load_prompt(&good).unwrap(), "Describe the scene for an archive.");

    let empty = dir.path().join("empty.txt");
    std::fs::write(&empty, " \n\t\n").unwrap();
    assert!(load_prompt(&empty).is_err());
}

#[test]
fn preset_is_read_from_prompts_dir() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("photoprism.txt"),
        "Write a caption and keywords for a photo library.",
    )
    .unwrap();
    let cfg = Prompt {
        file: String::new(),
        prompts_dir: dir.path().display().to_string(),
        preset: "photoprism".into(),
    };
    assert_eq!(
        resolve_prompt(&cfg).unwrap(),
        "Write a caption and keywords for a photo library."
    );
}

#[test]
fn falls_back_to_built_in_prompt() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = Prompt {
        file: dir.path().join("absent.txt").display().to_string(),
        ..Prompt::default()
    };
    assert_eq!(resolve_prompt(&cfg).unwrap(), DEFAULT_PROMPT);
    assert_eq!(resolve_prompt(&Prompt::default()).unwrap(), DEFAULT_PROMPT);
}

#[test]
fn too_short_prompt_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let short = dir.path().join("short.txt");
    std::fs::write(&short, "hi").unwrap();
    let cfg = Prompt {
        file: short.display().to_string(),
        ..Prompt::default()
    };
    assert!(resolve_prompt(&cfg).is_err());
}
