// tests/config_load.rs
use content_aggregator::config::{AggregationConfig, ENV_CONFIG_PATH, ENV_NEWSAPI_KEY};
use std::{env, fs};

#[test]
fn load_toml_and_json_files() {
    let dir = tempfile::tempdir().unwrap();

    let p_toml = dir.path().join("aggregation.toml");
    fs::write(
        &p_toml,
        r#"
[schedule]
daily_at = "07:30"
utc_offset_hours = 1

[run]
log_retention = 5
title_similarity = 0.9

[[newsapi]]
api_key = "plain-key"
query = "harbor"
page_size = 500
"#,
    )
    .unwrap();
    let c = AggregationConfig::load_from(&p_toml).unwrap();
    assert_eq!(c.schedule.daily_at, "07:30");
    assert_eq!(c.schedule.offset().local_minus_utc(), 3600);
    assert_eq!(c.run.log_retention, 5);
    assert_eq!(c.run.title_similarity, Some(0.9));
    assert_eq!(c.newsapi[0].name, "newsapi");
    assert_eq!(c.newsapi[0].api_key, "plain-key");
    assert_eq!(c.newsapi[0].page_size, 100, "clamped to API maximum");

    let p_json = dir.path().join("aggregation.json");
    fs::write(
        &p_json,
        r#"{"rss":[{"name":"wire","url":"https://wire.example/rss"}],"schedule":{"enabled":false}}"#,
    )
    .unwrap();
    let cj = AggregationConfig::load_from(&p_json).unwrap();
    assert!(!cj.schedule.enabled);
    assert_eq!(cj.rss[0].name, "wire");
    assert_eq!(cj.extractor.page_timeout_secs, 8);
}

#[test]
fn repeated_connector_names_are_made_unique() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("aggregation.toml");
    fs::write(
        &p,
        r#"
[[youtube]]
api_key = "k1"
channel_id = "UC-harbor"

[[youtube]]
api_key = "k2"
query = "ferries"

[[rss]]
name = "wire"
url = "https://wire.example/a.xml"

[[rss]]
name = "wire"
url = "https://wire.example/b.xml"
"#,
    )
    .unwrap();
    let c = AggregationConfig::load_from(&p).unwrap();
    let yt: Vec<&str> = c.youtube.iter().map(|y| y.name.as_str()).collect();
    assert_eq!(yt, vec!["youtube", "youtube#2"]);
    let rss: Vec<&str> = c.rss.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(rss, vec!["wire", "wire#2"]);
}

#[test]
fn broken_file_names_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("aggregation.toml");
    fs::write(&p, "[run\nlog_retention = ").unwrap();
    let err = format!("{:#}", AggregationConfig::load_from(&p).unwrap_err());
    assert!(err.contains("aggregation.toml"), "{err}");
}

#[serial_test::serial]
#[test]
fn default_uses_env_then_fallbacks() {
    // Isolate CWD so the repo's own config/ is not picked up.
    let old = env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    env::set_current_dir(tmp.path()).unwrap();
    env::remove_var(ENV_CONFIG_PATH);

    // 1) nothing on disk → defaults
    let c = AggregationConfig::load_default().unwrap();
    assert!(c.youtube.is_empty());
    assert_eq!(c.schedule.daily_at, "06:00");

    // 2) ./config/aggregation.toml fallback, with an ENV key
    env::set_var(ENV_NEWSAPI_KEY, "from-env");
    let cfg_dir = tmp.path().join("config");
    fs::create_dir_all(&cfg_dir).unwrap();
    fs::write(
        cfg_dir.join("aggregation.toml"),
        "[[newsapi]]\napi_key = \"ENV\"\nquery = \"ports\"\n",
    )
    .unwrap();
    let ct = AggregationConfig::load_default().unwrap();
    assert_eq!(ct.newsapi[0].api_key, "from-env");

    // 3) explicit path wins
    let p_env = tmp.path().join("custom.json");
    fs::write(&p_env, r#"{"web":{"urls":["https://x.example/"]}}"#).unwrap();
    env::set_var(ENV_CONFIG_PATH, p_env.display().to_string());
    let ce = AggregationConfig::load_default().unwrap();
    assert_eq!(ce.web.urls, vec!["https://x.example/".to_string()]);
    assert!(ce.newsapi.is_empty());

    // 4) explicit path that does not exist is an error, not a silent default
    env::set_var(ENV_CONFIG_PATH, tmp.path().join("missing.toml").display().to_string());
    assert!(AggregationConfig::load_default().is_err());

    env::remove_var(ENV_CONFIG_PATH);
    env::remove_var(ENV_NEWSAPI_KEY);
    env::set_current_dir(&old).unwrap();
}
