use crate::support::{Engine, or_exit, print_composition, print_json, to_value};
use costgraph_cascade::CostgraphConfig;
use serde_json::json;

pub fn run_show(config: &CostgraphConfig, id: String, json_output: bool) {
    let engine = Engine::open_or_exit(config);
    let composition = or_exit(engine.block_on(engine.service().get(&id)));
    engine.close();

    if json_output {
        print_json(&json!({
            "action": "show",
            "composition": to_value(&composition),
        }));
    } else {
        println!("costgraph show {id}");
        print_composition(&composition);
    }
}

pub fn run_list(config: &CostgraphConfig, include_disabled: bool, json_output: bool) {
    let engine = Engine::open_or_exit(config);
    let compositions = or_exit(engine.block_on(engine.service().list(include_disabled)));
    let store_path = engine.store_path().display().to_string();
    engine.close();

    if json_output {
        print_json(&json!({
            "action": "list",
            "storePath": store_path,
            "count": compositions.len(),
            "compositions": to_value(&compositions),
        }));
        return;
    }

    println!("costgraph list ({} compositions)", compositions.len());
    for composition in &compositions {
        print_composition(composition);
    }
}
