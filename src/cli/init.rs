//! Project scaffolding: a config file and one sample component.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::config::{CONFIG_FILE, TemplarConfig};
use crate::log;

const SAMPLE_CONFIG: &str = "\
server:
  host: localhost
  port: 8080

build:
  command: templ generate

components:
  scan_paths:
    - ./components

development:
  hot_reload: true
";

const SAMPLE_COMPONENT: &str = "\
package components

templ Button(text string, disabled bool = false) {
\t<button class=\"btn\" disabled?={ disabled }>{ text }</button>
}
";

/// Create a new project skeleton. Never overwrites existing files.
pub fn new_project(config: &TemplarConfig, name: Option<&Path>) -> Result<()> {
    let root = match name {
        Some(name) => std::env::current_dir()?.join(name),
        None => std::env::current_dir()?,
    };
    fs::create_dir_all(&root)
        .with_context(|| format!("cannot create {}", root.display()))?;

    let config_name = config
        .config_path
        .file_name()
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|| std::path::PathBuf::from(CONFIG_FILE));
    let config_path = root.join(config_name);

    write_if_absent(&config_path, SAMPLE_CONFIG)?;
    fs::create_dir_all(root.join("components"))?;
    write_if_absent(&root.join("components/button.templ"), SAMPLE_COMPONENT)?;
    fs::create_dir_all(root.join("static"))?;

    log!("init"; "project ready at {}", root.display());
    log!("init"; "next: cd into the project and run `templar serve`");
    Ok(())
}

fn write_if_absent(path: &Path, content: &str) -> Result<()> {
    if path.exists() {
        log!("init"; "keeping existing {}", path.display());
        return Ok(());
    }
    fs::write(path, content).with_context(|| format!("cannot write {}", path.display()))?;
    log!("init"; "created {}", path.display());
    Ok(())
}
