use edit_audit::config::{Config, Pairing};

#[test]
fn parse_example_config() {
    let raw = include_str!("../edit-audit.example.toml");
    let cfg: Config = toml::from_str(raw).expect("parse TOML");
    assert_eq!(cfg.dataset.pairing, Pairing::Positional);
    assert_eq!(cfg.dataset.max_count(), None);
    assert_eq!(cfg.size_filter.max_pixels, 2048 * 2048);
    assert_eq!(cfg.engine.max_new_tokens, 256);
    assert_eq!(cfg.scoring.flag, "ROP");
    assert_eq!(cfg.workers.rank, None);
    assert!(!cfg.paths.out_dir.is_empty());
}

#[test]
fn missing_sections_fall_back_to_defaults() {
    let cfg: Config = toml::from_str("[workers]\nworld_size = 4\nrank = 0\n").expect("parse TOML");
    assert_eq!(cfg.workers.world_size, 4);
    assert_eq!(cfg.workers.rank, Some(0));
    assert_eq!(cfg.dataset.extension, "png");
    assert_eq!(cfg.dataset.prompt, "Has this picture edited properly?");
}

#[test]
fn fingerprint_ignores_sharding_and_output() {
    let base = Config::default();
    let mut sharded = base.clone();
    sharded.workers.world_size = 4;
    sharded.workers.rank = Some(3);
    sharded.paths.out_dir = "elsewhere".into();
    sharded.dataset.resume_logs = vec!["old.jsonl".into()];
    assert_eq!(base.run_fingerprint(), sharded.run_fingerprint());

    let mut other = base.clone();
    other.dataset.max_count = 10;
    assert_ne!(base.run_fingerprint(), other.run_fingerprint());
}
