use vision_describe::config::Config;

#[test]
fn parse_example_config() {
    let raw = include_str!("../vision-describe.example.toml");
    let cfg: Config = toml::from_str(raw).expect("parse TOML");
    assert_eq!(cfg.server.model, "llava");
    assert_eq!(cfg.server.timeout_seconds, 300);
    assert!(cfg.output.overwrite);
    assert_eq!(cfg.validation.min_chars, 20);
    assert_eq!(cfg.validation.max_words, 10_000);
    assert_eq!(cfg.validation.min_alpha_ratio, 0.4);
}

#[test]
fn missing_sections_fall_back_to_defaults() {
    let cfg: Config = toml::from_str("[server]\nmodel = \"moondream\"\n").expect("parse TOML");
    assert_eq!(cfg.server.model, "moondream");
    assert_eq!(cfg.server.host, "http://localhost:11434");
    assert_eq!(cfg.logging.level, "info");
    assert!(!cfg.batch.retry_failed);
}

#[test]
fn effective_config_round_trips() {
    let mut cfg = Config::default();
    cfg.output.write_yaml = true;
    let raw = cfg.to_toml().expect("serialize");
    let back: Config = toml::from_str(&raw).expect("parse TOML");
    assert!(back.output.write_yaml);
    assert_eq!(back.server.host, cfg.server.host);
}
