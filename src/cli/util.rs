//! CLI utility helpers

use meshspec::{MeshConfig, Result, Spec};
use serde::Serialize;
use std::path::Path;

/// Configuration for the project containing `spec_path`, or defaults
pub fn load_config(spec_path: &Path) -> Result<MeshConfig> {
    let start = match spec_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => std::env::current_dir()?,
    };

    match MeshConfig::find_and_load(&start)? {
        Some((root, config)) => {
            tracing::debug!(root = %root.display(), "using project config");
            Ok(config)
        }
        None => Ok(MeshConfig::default()),
    }
}

/// Load a spec and its project config, compiling formulas with the
/// configured depth limit
pub fn load_spec(spec_path: &Path) -> Result<(Spec, MeshConfig)> {
    let config = load_config(spec_path)?;
    let spec = Spec::load(spec_path, config.validation.max_formula_depth)?;
    Ok((spec, config))
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
