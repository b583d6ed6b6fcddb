use crate::cli::GlobalArgs;
use crate::support::{fail, print_json, yes_no};
use costgraph_cascade::{CostgraphConfig, DEFAULT_CONFIG_FILE};
use costgraph_memory::MemoryStore;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct InitOutcome {
    pub store_path: PathBuf,
    pub created_store_dir: bool,
    pub created_store_file: bool,
    pub config_path: Option<PathBuf>,
    pub created_config: bool,
}

pub fn init_store(store_path: &Path) -> Result<(bool, bool), String> {
    let mut created_store_dir = false;
    if let Some(parent) = store_path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent)
            .map_err(|e| format!("failed to create store directory {}: {e}", parent.display()))?;
        created_store_dir = true;
    }

    if store_path.exists() {
        if !store_path.is_file() {
            return Err(format!(
                "store path exists but is not a file: {}",
                store_path.display()
            ));
        }
        return Ok((created_store_dir, false));
    }

    MemoryStore::default()
        .save_jsonl(store_path)
        .map_err(|e| format!("failed to initialize {}: {e}", store_path.display()))?;
    Ok((created_store_dir, true))
}

fn write_default_config(path: &Path, config: &CostgraphConfig) -> Result<bool, String> {
    if path.exists() {
        return Ok(false);
    }
    let raw = toml::to_string_pretty(config)
        .map_err(|e| format!("failed to render config: {e}"))?;
    fs::write(path, raw).map_err(|e| format!("failed to write {}: {e}", path.display()))?;
    Ok(true)
}

pub fn run(global: &GlobalArgs, config: &CostgraphConfig, write_config: bool, json_output: bool) {
    let (created_store_dir, created_store_file) =
        init_store(&config.store.path).unwrap_or_else(|e| fail(e));

    let (config_path, created_config) = if write_config {
        let path = global
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        let created = write_default_config(&path, config).unwrap_or_else(|e| fail(e));
        (Some(path), created)
    } else {
        (None, false)
    };

    let outcome = InitOutcome {
        store_path: config.store.path.clone(),
        created_store_dir,
        created_store_file,
        config_path,
        created_config,
    };

    if json_output {
        print_json(&json!({
            "action": "init",
            "storePath": outcome.store_path.display().to_string(),
            "createdStoreDir": outcome.created_store_dir,
            "createdStoreFile": outcome.created_store_file,
            "configPath": outcome.config_path.as_ref().map(|p| p.display().to_string()),
            "createdConfig": outcome.created_config,
        }));
        return;
    }

    println!("costgraph init");
    println!();
    println!("  store path: {}", outcome.store_path.display());
    println!("  created store dir: {}", yes_no(outcome.created_store_dir));
    println!("  created store file: {}", yes_no(outcome.created_store_file));
    if let Some(path) = &outcome.config_path {
        println!("  config path: {}", path.display());
        println!("  created config: {}", yes_no(outcome.created_config));
    }
}
