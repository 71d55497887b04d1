use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub bind_addr: String,
    pub database_url: String,
    /// Root directory of the `public` disk.
    pub storage_root: String,
    /// Base URL under which the `public` disk is served.
    pub public_url: String,
    pub jwt_secret: String,
    pub jwt_ttl_seconds: i64,
    pub cache_ttl_seconds: u64,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".into(),
            database_url: "sqlite://./data/cms.db".into(),
            storage_root: "./data/public".into(),
            public_url: "http://127.0.0.1:8080/storage".into(),
            jwt_secret: "dev-secret-change-me".into(),
            jwt_ttl_seconds: 3600,
            cache_ttl_seconds: 3600,
            log_filter: "info".into(),
        }
    }
}

pub fn load_settings() -> Settings {
    let file_cfg = fs::read_to_string("server.toml")
        .ok()
        .and_then(|raw| toml::from_str::<HashMap<String, String>>(&raw).ok())
        .unwrap_or_default();
    let env: HashMap<String, String> = std::env::vars().collect();
    resolve_settings(&file_cfg, &env)
}

/// Layers `server.toml` keys and then environment variables over the defaults.
/// `APP__` variables win over their plain counterparts.
pub fn resolve_settings(
    file_cfg: &HashMap<String, String>,
    env: &HashMap<String, String>,
) -> Settings {
    let mut settings = Settings::default();

    if let Some(v) = file_cfg.get("bind_addr") {
        settings.bind_addr = v.clone();
    }
    if let Some(v) = file_cfg.get("database_url") {
        settings.database_url = v.clone();
    }
    if let Some(v) = file_cfg.get("storage_root") {
        settings.storage_root = v.clone();
    }
    if let Some(v) = file_cfg.get("public_url") {
        settings.public_url = v.clone();
    }
    if let Some(v) = file_cfg.get("jwt_secret") {
        settings.jwt_secret = v.clone();
    }
    if let Some(v) = file_cfg.get("jwt_ttl_seconds").and_then(|v| v.parse().ok()) {
        settings.jwt_ttl_seconds = v;
    }
    if let Some(v) = file_cfg.get("cache_ttl_seconds").and_then(|v| v.parse().ok()) {
        settings.cache_ttl_seconds = v;
    }
    if let Some(v) = file_cfg.get("log_filter") {
        settings.log_filter = v.clone();
    }

    let var = |plain: Option<&str>, prefixed: &str| {
        env.get(prefixed)
            .or_else(|| plain.and_then(|key| env.get(key)))
            .cloned()
    };

    if let Some(v) = var(Some("SERVER_BIND"), "APP__BIND_ADDR") {
        settings.bind_addr = v;
    }
    if let Some(v) = var(Some("DATABASE_URL"), "APP__DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = var(Some("STORAGE_ROOT"), "APP__STORAGE_ROOT") {
        settings.storage_root = v;
    }
    if let Some(v) = var(Some("PUBLIC_URL"), "APP__PUBLIC_URL") {
        settings.public_url = v;
    }
    if let Some(v) = var(Some("JWT_SECRET"), "APP__JWT_SECRET") {
        settings.jwt_secret = v;
    }
    if let Some(v) = var(None, "APP__JWT_TTL_SECONDS").and_then(|v| v.parse().ok()) {
        settings.jwt_ttl_seconds = v;
    }
    if let Some(v) = var(None, "APP__CACHE_TTL_SECONDS").and_then(|v| v.parse().ok()) {
        settings.cache_ttl_seconds = v;
    }
    if let Some(v) = var(None, "APP__LOG_FILTER") {
        settings.log_filter = v;
    }

    settings
}

pub fn prepare_database_url(raw_database_url: &str) -> anyhow::Result<String> {
    let database_url = normalize_database_url(raw_database_url);
    ensure_parent_dir_exists(&database_url)?;
    Ok(database_url)
}

fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:") || raw_database_url.contains("://") {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        return format!("sqlite://{}", path.replace('\\', "/"));
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

fn ensure_parent_dir_exists(database_url: &str) -> anyhow::Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };
    let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
