use std::path::{Path, PathBuf};

use super::types::AppConfig;

/// Get the default pagestate data directory: ~/.pagestate
pub fn get_data_dir() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(PathBuf::from(home).join(".pagestate"))
}

pub fn load_default() -> anyhow::Result<AppConfig> {
    // Priority 1: ~/.pagestate/config.toml
    let data_dir = get_data_dir()?;
    let user_config = data_dir.join("config.toml");

    // Priority 2: ./config.toml (current directory)
    let local_config = Path::new("config.toml");

    let cfg = if user_config.exists() {
        load_from_path(&user_config)?
    } else if local_config.exists() {
        load_from_path(local_config)?
    } else {
        AppConfig::default()
    };

    Ok(finalize(cfg, &data_dir))
}

pub fn load_from_path(path: &Path) -> anyhow::Result<AppConfig> {
    let s = std::fs::read_to_string(path)?;
    Ok(toml::from_str::<AppConfig>(&s)?)
}

/// Fill unset directories under `data_dir` and apply environment overrides.
pub fn finalize(mut cfg: AppConfig, data_dir: &Path) -> AppConfig {
    if is_blank(cfg.persistence.directory.as_deref()) {
        cfg.persistence.directory = Some(data_dir.join("storage").to_string_lossy().to_string());
    }

    if is_blank(cfg.logging.directory.as_deref()) {
        cfg.logging.directory = Some(data_dir.join("logs").to_string_lossy().to_string());
    }

    // Environment variable overrides (Priority 0: highest)
    if let Some(v) = env_value("PAGESTATE_STORAGE_BACKEND") {
        match v.parse() {
            Ok(kind) => cfg.persistence.backend = kind,
            Err(e) => tracing::warn!("ignoring PAGESTATE_STORAGE_BACKEND: {}", e),
        }
    }
    if let Some(v) = env_value("PAGESTATE_STORAGE_KEY") {
        cfg.persistence.key = v;
    }
    if let Some(v) = env_value("PAGESTATE_DEBUG") {
        cfg.debug.enabled = v.eq_ignore_ascii_case("true") || v == "1";
    }
    if let Some(v) = env_value("PAGESTATE_ENVIRONMENT") {
        cfg.app.environment = v;
    }

    cfg
}

fn is_blank(v: Option<&str>) -> bool {
    v.map(|s| s.trim().is_empty()).unwrap_or(true)
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finalize_fills_directories_under_data_dir() {
        let data_dir = Path::new("/tmp/pagestate-test");
        let cfg = finalize(AppConfig::default(), data_dir);
        assert_eq!(
            cfg.persistence.directory.as_deref(),
            Some("/tmp/pagestate-test/storage")
        );
        assert_eq!(cfg.logging.directory.as_deref(), Some("/tmp/pagestate-test/logs"));
    }

    #[test]
    fn finalize_keeps_explicit_directory() {
        let mut cfg = AppConfig::default();
        cfg.persistence.directory = Some("/srv/state".into());
        let cfg = finalize(cfg, Path::new("/tmp/x"));
        assert_eq!(cfg.persistence.directory.as_deref(), Some("/srv/state"));
    }

    #[test]
    fn load_from_path_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[debug]\nenabled = true\nmax_history_size = 5\n").unwrap();
        let cfg = load_from_path(&path).unwrap();
        assert!(cfg.debug.enabled);
        assert_eq!(cfg.debug.max_history_size, 5);
    }
}
