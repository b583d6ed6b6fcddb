use crate::support::{fail, print_json, to_value};
use costgraph_memory::{Dependency, DependencyDiff, diff};
use costgraph_units::UnitRegistry;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};

/// Accepts a bare dependency array or a composition object.
pub fn read_dependencies(path: &Path) -> Result<Vec<Dependency>, String> {
    let bytes =
        fs::read(path).map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    let value: serde_json::Value = serde_json::from_slice(&bytes)
        .map_err(|e| format!("failed to parse {}: {e}", path.display()))?;
    let list = match value {
        serde_json::Value::Object(mut object) => object
            .remove("dependencies")
            .unwrap_or_else(|| serde_json::Value::Array(Vec::new())),
        other => other,
    };
    serde_json::from_value(list)
        .map_err(|e| format!("invalid dependency list in {}: {e}", path.display()))
}

fn print_section(label: &str, deps: &[Dependency]) {
    println!("  {label}: {}", deps.len());
    for dep in deps {
        println!("    - {} x {}", dep.of, dep.quantity);
    }
}

pub fn run(old: PathBuf, new: PathBuf, json_output: bool) {
    let old_deps = read_dependencies(&old).unwrap_or_else(|e| fail(e));
    let new_deps = read_dependencies(&new).unwrap_or_else(|e| fail(e));
    let registry = UnitRegistry::standard();
    let DependencyDiff {
        removed,
        unchanged,
        added,
    } = diff(&old_deps, &new_deps, &registry);

    if json_output {
        print_json(&json!({
            "action": "diff",
            "removed": to_value(&removed),
            "unchanged": to_value(&unchanged),
            "added": to_value(&added),
        }));
        return;
    }

    println!("costgraph diff");
    print_section("removed", &removed);
    print_section("unchanged", &unchanged);
    print_section("added", &added);
}
