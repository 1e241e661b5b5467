use std::env;

/// Env var naming the active profile (e.g. `PROD`).
pub const PROFILE_VAR: &str = "BQ2CSV_PROFILE";

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

pub fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Active profile from `BQ2CSV_PROFILE`, uppercased. Empty when unset.
pub fn active_profile() -> String {
    env_opt(PROFILE_VAR)
        .map(|s| s.to_uppercase())
        .unwrap_or_default()
}

/// Read a profiled env var: tries `{PROFILE}_{KEY}` first, falls back to `{KEY}`.
pub fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

pub fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
