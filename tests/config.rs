use league_feed::config::{API_BASE_URL_KEY, ClientConfig, normalize_base_url, upsert_env_line};

#[test]
fn base_url_is_trimmed_and_checked() {
    assert_eq!(
        normalize_base_url(" http://192.168.1.20:8000/ ").expect("valid url"),
        "http://192.168.1.20:8000"
    );
    assert_eq!(
        normalize_base_url("https://league.example.org/api").expect("valid url"),
        "https://league.example.org/api"
    );
    assert!(normalize_base_url("").is_err());
    assert!(normalize_base_url("ftp://league.example.org").is_err());
    assert!(normalize_base_url("localhost").is_err());
}

#[test]
fn args_override_config() {
    let base = ClientConfig::default();
    assert!(!base.offline);

    let config = base
        .clone()
        .apply_args(["--api-url", "http://10.0.0.5:8000/", "--offline"])
        .expect("args should apply");
    assert_eq!(config.api_base_url, "http://10.0.0.5:8000");
    assert!(config.offline);

    let config = base
        .clone()
        .apply_args(["--api-url=https://league.example.org"])
        .expect("args should apply");
    assert_eq!(config.api_base_url, "https://league.example.org");

    assert!(base.clone().apply_args(["--api-url"]).is_err());
    assert!(base.apply_args(["--api-url=nope"]).is_err());
}

#[test]
fn env_line_is_replaced_in_place() {
    let contents = "# local overrides\nLEAGUE_API_BASE_URL=http://old:8000\nLEAGUE_POLL_SECS=30\n";
    let updated = upsert_env_line(contents, API_BASE_URL_KEY, "http://new:8000");
    assert_eq!(
        updated,
        "# local overrides\nLEAGUE_API_BASE_URL=http://new:8000\nLEAGUE_POLL_SECS=30\n"
    );
}

#[test]
fn env_line_is_appended_and_duplicates_collapse() {
    let updated = upsert_env_line("LEAGUE_POLL_SECS=30", API_BASE_URL_KEY, "http://new:8000");
    assert_eq!(updated, "LEAGUE_POLL_SECS=30\nLEAGUE_API_BASE_URL=http://new:8000\n");

    let contents = "export LEAGUE_API_BASE_URL=http://a\nLEAGUE_API_BASE_URL = http://b\n";
    let updated = upsert_env_line(contents, API_BASE_URL_KEY, "http://c");
    assert_eq!(updated, "LEAGUE_API_BASE_URL=http://c\n");

    assert_eq!(
        upsert_env_line("", API_BASE_URL_KEY, "http://c"),
        "LEAGUE_API_BASE_URL=http://c\n"
    );
}
