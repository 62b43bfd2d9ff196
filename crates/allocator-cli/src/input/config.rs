use allocator_core::config::AllocatorConfig;

use super::file::read_text;

/// Load solver settings from JSON or YAML, chosen by file extension.
pub fn load_config(path: &str) -> Result<AllocatorConfig, Box<dyn std::error::Error>> {
    let (canonical, contents) = read_text(path)?;
    let is_yaml = canonical
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
        .unwrap_or(false);

    let config: AllocatorConfig = if is_yaml {
        serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse '{}': {}", canonical.display(), e))?
    } else {
        serde_json::from_str(&contents)
            .map_err(|e| format!("Failed to parse '{}': {}", canonical.display(), e))?
    };
    config.validate()?;
    tracing::debug!(path = %canonical.display(), "loaded configuration");
    Ok(config)
}
