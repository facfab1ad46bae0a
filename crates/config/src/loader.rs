use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::schema::GatewayConfig;

const CONFIG_FILENAME: &str = "whisper.toml";

/// Load config from an explicit path. Unreadable or malformed files are an
/// error; boot treats them as fatal rather than silently running with
/// defaults the operator did not ask for.
pub fn load_config(path: &Path) -> anyhow::Result<GatewayConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let mut cfg: GatewayConfig = toml::from_str(&raw)
        .map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", path.display()))?;
    apply_env_overrides(&mut cfg, std::env::vars());
    Ok(cfg)
}

/// Discover `./whisper.toml`; fall back to defaults when absent. Environment
/// overrides apply either way.
pub fn discover_and_load() -> anyhow::Result<GatewayConfig> {
    let path = PathBuf::from(CONFIG_FILENAME);
    if path.exists() {
        debug!(path = %path.display(), "loading config");
        return load_config(&path);
    }
    debug!("no config file found, using defaults");
    let mut cfg = GatewayConfig::default();
    apply_env_overrides(&mut cfg, std::env::vars());
    Ok(cfg)
}

/// Apply `WHISPER_*` environment overrides onto a loaded config.
/// Unparseable numeric values are logged and skipped.
fn apply_env_overrides(cfg: &mut GatewayConfig, vars: impl Iterator<Item = (String, String)>) {
    for (key, value) in vars {
        match key.as_str() {
            "WHISPER_LISTEN_ADDR" => cfg.listen_addr = value,
            "WHISPER_SERVER_NAME" => cfg.server_name = value,
            "WHISPER_BUS_URL" => cfg.bus_url = value,
            "WHISPER_KV_ADDR" => cfg.kv_addr = value,
            "WHISPER_WORKER_POOL_SIZE" => set_usize(&key, &value, &mut cfg.worker_pool_size),
            "WHISPER_MAX_CONNECTIONS" => set_usize(&key, &value, &mut cfg.max_connections),
            "WHISPER_READ_TIMEOUT_SECS" => set_u64(&key, &value, &mut cfg.read_timeout_secs),
            "WHISPER_WRITE_TIMEOUT_SECS" => set_u64(&key, &value, &mut cfg.write_timeout_secs),
            "WHISPER_PING_INTERVAL_SECS" => set_u64(&key, &value, &mut cfg.ping_interval_secs),
            "WHISPER_SHUTDOWN_GRACE_SECS" => set_u64(&key, &value, &mut cfg.shutdown_grace_secs),
            _ => {},
        }
    }
}

fn set_usize(key: &str, value: &str, slot: &mut usize) {
    match value.parse() {
        Ok(v) => *slot = v,
        Err(_) => warn!(%key, %value, "ignoring unparseable env override"),
    }
}

fn set_u64(key: &str, value: &str, slot: &mut u64) {
    match value.parse() {
        Ok(v) => *slot = v,
        Err(_) => warn!(%key, %value, "ignoring unparseable env override"),
    }
}
