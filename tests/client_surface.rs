use std::path::Path;
use std::time::Duration;
use vision_describe::client::{
    filter_vision_models, is_supported_image,
    types::{ChatResponse, TagsResponse},
    AnalysisOutcome, AnalysisRequest, OllamaClient, VisionClient,
};

#[test]
fn vision_models_are_preferred() {
    let all = vec![
        "llama3:8b".to_string(),
        "llava:13b".to_string(),
        "moondream:latest".to_string(),
    ];
    assert_eq!(filter_vision_models(all), vec!["llava:13b", "moondream:latest"]);
}

#[test]
fn every_model_is_listed_when_none_look_vision_capable() {
    let all = vec!["llama3:8b".to_string(), "qwen2:7b".to_string()];
    assert_eq!(filter_vision_models(all.clone()), all);
}

#[test]
fn supported_extensions_ignore_case() {
    assert!(is_supported_image(Path::new("a/b/photo.JPG")));
    assert!(is_supported_image(Path::new("scan.tiff")));
    assert!(!is_supported_image(Path::new("notes.txt")));
    assert!(!is_supported_image(Path::new("no_extension")));
}

#[test]
fn chat_response_carries_metrics() {
    let raw = r#"{
        "model": "llava",
        "message": {"role": "assistant", "content": "A harbor at dawn."},
        "done": true,
        "total_duration": 3000000000,
        "load_duration": 500000000,
        "prompt_eval_count": 620,
        "prompt_eval_duration": 400000000,
        "eval_count": 90,
        "eval_duration": 2000000000
    }"#;
    let resp: ChatResponse = serde_json::from_str(raw).unwrap();
    let m = resp.metrics();
    assert_eq!(m.tokens_per_second(), Some(45.0));
    assert_eq!(m.total_seconds(), Some(3.0));
    assert_eq!(resp.message.unwrap().content, "A harbor at dawn.");
}

#[test]
fn tags_response_uses_model_or_name() {
    let raw = r#"{"models": [{"name": "llava:latest", "model": "llava:latest"}, {"name": "bakllava"}]}"#;
    let tags: TagsResponse = serde_json::from_str(raw).unwrap();
    let ids: Vec<&str> = tags.models.iter().map(|m| m.id()).collect();
    assert_eq!(ids, vec!["llava:latest", "bakllava"]);
}

#[test]
fn missing_image_fails_before_any_request() {
    let client = OllamaClient::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
    let req = AnalysisRequest::new(
        "/definitely/not/here.jpg",
        "Describe this image.",
        "llava",
        client.host(),
        Duration::from_secs(1),
    );
    match client.analyze(&req) {
        AnalysisOutcome::Failure { reason } => assert!(reason.contains("not found")),
        other => panic!("unexpected outcome: {other:?}"),
    }
}
