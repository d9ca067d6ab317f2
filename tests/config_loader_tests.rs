use newsrank::config::{ClusteringAlgorithm, ConfigLoader};
use std::{
    env, fs,
    path::PathBuf,
    sync::{Mutex, MutexGuard, OnceLock},
};
use tempfile::TempDir;

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

fn env_guard() -> MutexGuard<'static, ()> {
    env_lock()
        .lock()
        .unwrap_or_else(|poison| poison.into_inner())
}

fn clear_env() {
    unsafe {
        env::remove_var("NEWSRANK_PROFILE");
        env::remove_var("NEWSRANK_API_BIND_ADDR");
        env::remove_var("NEWSRANK_LOG_LEVEL");
        env::remove_var("NEWSRANK_ML_SERVICE_URL");
        env::remove_var("NEWSRANK_MMR_LAMBDA");
        env::remove_var("NEWSRANK_CLUSTERING_ALGORITHM");
        env::remove_var("NEWSRANK_RSS_COLLECTION_ENABLED");
    }
}

fn write_env_file(dir: &TempDir, name: &str, contents: &str) {
    let path = dir.path().join(name);
    fs::write(path, contents).unwrap();
}

#[test]
fn loads_defaults_when_no_env_present() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads with defaults");

    assert_eq!(cfg.profile, "local");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:8080");
    assert_eq!(cfg.ingest.interval_seconds, 600);
    assert_eq!(cfg.clustering.algorithm, ClusteringAlgorithm::Cosine);
    assert!((cfg.ranking.mmr_lambda - 0.7).abs() < f64::EPSILON);
    cfg.bind_addr().expect("default bind addr parses");
    clear_env();
}

#[test]
fn layered_env_files_apply_in_order() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(&temp_dir, ".env", "NEWSRANK_API_BIND_ADDR=127.0.0.1:3000\n");
    write_env_file(
        &temp_dir,
        ".env.test",
        "NEWSRANK_API_BIND_ADDR=192.168.0.10:5000\n",
    );
    write_env_file(
        &temp_dir,
        ".env.test.local",
        "NEWSRANK_API_BIND_ADDR=10.0.0.5:6000\n",
    );

    // Select profile via .env.local before profile-specific files load.
    write_env_file(
        &temp_dir,
        ".env.local",
        "NEWSRANK_PROFILE=test\nNEWSRANK_API_BIND_ADDR=127.0.0.1:4000\n",
    );

    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads with layered env files");

    assert_eq!(cfg.profile, "test");
    assert_eq!(cfg.api_bind_addr, "10.0.0.5:6000");
    clear_env();
}

#[test]
fn os_environment_has_highest_precedence() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(&temp_dir, ".env", "NEWSRANK_API_BIND_ADDR=127.0.0.1:3000\n");

    unsafe {
        env::set_var("NEWSRANK_API_BIND_ADDR", "127.0.0.1:9999");
    }

    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads");

    assert_eq!(cfg.api_bind_addr, "127.0.0.1:9999");
    clear_env();
}

#[test]
fn spec_environment_keys_are_honored() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        "NEWSRANK_ML_SERVICE_URL=http://ml.internal:9000\n\
         NEWSRANK_RSS_COLLECTION_ENABLED=false\n\
         NEWSRANK_TOPIC_CLUSTERING_ENABLED=false\n\
         NEWSRANK_CLUSTERING_ALGORITHM=hdbscan\n\
         NEWSRANK_MMR_LAMBDA=0.5\n",
    );

    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads");

    assert_eq!(cfg.ml.service_url, "http://ml.internal:9000");
    assert!(!cfg.ingest.enabled);
    assert!(!cfg.clustering.enabled);
    assert_eq!(cfg.clustering.algorithm, ClusteringAlgorithm::Hdbscan);
    assert!((cfg.ranking.mmr_lambda - 0.5).abs() < f64::EPSILON);
    clear_env();
}

#[test]
fn invalid_mmr_lambda_is_rejected() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(&temp_dir, ".env", "NEWSRANK_MMR_LAMBDA=1.5\n");

    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    assert!(loader.load().is_err());
    clear_env();
}

#[test]
fn invalid_clustering_algorithm_is_rejected() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(&temp_dir, ".env", "NEWSRANK_CLUSTERING_ALGORITHM=spectral\n");

    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    assert!(loader.load().is_err());
    clear_env();
}

#[test]
fn invalid_bind_addr_is_rejected() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(&temp_dir, ".env", "NEWSRANK_API_BIND_ADDR=not-an-addr\n");

    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    assert!(loader.load().is_err());
    clear_env();
}

#[test]
fn rss_sources_parse_from_json() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        r#"NEWSRANK_RSS_SOURCES=[{"name":"custom","url":"https://feed.example/rss","weight":0.6}]
"#,
    );

    let loader = ConfigLoader::with_base_dir(PathBuf::from(temp_dir.path()));
    let cfg = loader.load().expect("config loads");

    assert_eq!(cfg.ingest.sources.len(), 1);
    assert_eq!(cfg.ingest.sources[0].name, "custom");
    assert_eq!(cfg.ingest.sources[0].weight, Some(0.6));
    assert_eq!(cfg.ingest.sources[0].timeout_seconds, 10);
    clear_env();
}
