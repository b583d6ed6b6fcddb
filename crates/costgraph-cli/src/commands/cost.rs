use crate::support::Engine;
use costgraph_cascade::CostgraphConfig;

pub fn run_set(config: &CostgraphConfig, id: String, cost: f64, json_output: bool) {
    let engine = Engine::open_or_exit(config);
    let outcome = engine.mutate(engine.service().set_cost(&id, cost));
    outcome.print("set-cost", engine.store_path(), json_output);
    engine.close();
}

pub fn run_autoupdate(config: &CostgraphConfig, id: String, enabled: bool, json_output: bool) {
    let engine = Engine::open_or_exit(config);
    let outcome = engine.mutate(engine.service().set_autoupdate_cost(&id, enabled));
    outcome.print("autoupdate", engine.store_path(), json_output);
    engine.close();
}
