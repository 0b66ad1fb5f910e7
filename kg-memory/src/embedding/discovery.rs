//! Model cache discovery
//!
//! Finds the directory embedding models are downloaded to and loaded from.

use std::path::{Path, PathBuf};

/// Environment variable overriding the model cache directory
pub const MODELS_PATH_ENV: &str = "KG_MEMORY_MODELS_PATH";

/// Resolve the model cache directory with priority:
/// 1. Explicit path (command line)
/// 2. KG_MEMORY_MODELS_PATH environment variable
/// 3. User home directory (~/.kg-memory/models)
/// 4. `.kg-memory/models` under the working directory
pub fn find_models_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        log::info!("Using models path: {}", path.display());
        return path.to_path_buf();
    }

    if let Ok(models_path) = std::env::var(MODELS_PATH_ENV) {
        if !models_path.trim().is_empty() {
            log::info!("Using {}: {}", MODELS_PATH_ENV, models_path);
            return PathBuf::from(models_path);
        }
        log::warn!("{} is set but empty, ignoring", MODELS_PATH_ENV);
    }

    if let Some(home) = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
        let user_path = PathBuf::from(home).join(".kg-memory").join("models");
        log::info!("Using user models path: {}", user_path.display());
        return user_path;
    }

    PathBuf::from(".kg-memory").join("models")
}
