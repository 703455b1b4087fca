use std::env;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    profiled_env_opt(profile, key)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

fn profiled_env_usize(profile: &str, key: &str, default: usize) -> usize {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub engine: EngineConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `TRIPWIRE_PROFILE`. When set (e.g. `PROD`), every
    /// key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("TRIPWIRE_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        Self {
            engine: EngineConfig::from_env_profiled(&p),
            profile: p,
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  engine:  dialect={}, strict_macros={}, parallel={}, recursion_limit={}",
            self.engine.default_dialect,
            self.engine.strict_macros,
            self.engine.parallel,
            self.engine.recursion_limit
        );
    }
}

// ── Engine ────────────────────────────────────────────────────

/// Knobs shared by the SQL engines and the plan executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Abort `prepare_request` when a macro expands to unparseable SQL.
    pub strict_macros: bool,
    /// Run independent plan branches on a thread pool.
    pub parallel: bool,
    /// Worker threads for parallel execution (0 = rayon default).
    pub max_parallelism: usize,
    /// Base dialect used when a datasource does not name one.
    pub default_dialect: String,
    /// Maximum SQL parser nesting depth.
    pub recursion_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strict_macros: false,
            parallel: false,
            max_parallelism: 0,
            default_dialect: "ansi".to_string(),
            recursion_limit: 50,
        }
    }
}

impl EngineConfig {
    fn from_env_profiled(p: &str) -> Self {
        let d = Self::default();
        Self {
            strict_macros: profiled_env_bool(p, "TRIPWIRE_STRICT_MACROS", d.strict_macros),
            parallel: profiled_env_bool(p, "TRIPWIRE_PARALLEL", d.parallel),
            max_parallelism: profiled_env_usize(p, "TRIPWIRE_MAX_PARALLELISM", d.max_parallelism),
            default_dialect: profiled_env_or(p, "TRIPWIRE_DEFAULT_DIALECT", &d.default_dialect),
            recursion_limit: profiled_env_usize(p, "TRIPWIRE_RECURSION_LIMIT", d.recursion_limit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_prefixed_keys_win() {
        env::set_var("CFGTEST_TRIPWIRE_STRICT_MACROS", "true");
        env::set_var("CFGTEST_TRIPWIRE_RECURSION_LIMIT", "12");
        let cfg = Config::for_profile("cfgtest");
        assert_eq!(cfg.profile, "CFGTEST");
        assert!(cfg.engine.strict_macros);
        assert_eq!(cfg.engine.recursion_limit, 12);
        env::remove_var("CFGTEST_TRIPWIRE_STRICT_MACROS");
        env::remove_var("CFGTEST_TRIPWIRE_RECURSION_LIMIT");
    }

    #[test]
    fn unparseable_numbers_fall_back_to_default() {
        env::set_var("BADNUM_TRIPWIRE_MAX_PARALLELISM", "lots");
        let cfg = Config::for_profile("badnum");
        assert_eq!(cfg.engine.max_parallelism, 0);
        env::remove_var("BADNUM_TRIPWIRE_MAX_PARALLELISM");
    }
}
