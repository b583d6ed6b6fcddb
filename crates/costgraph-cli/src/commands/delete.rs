use crate::support::Engine;
use costgraph_cascade::CostgraphConfig;

pub fn run(config: &CostgraphConfig, id: String, json_output: bool) {
    let engine = Engine::open_or_exit(config);
    let outcome = engine.mutate(engine.service().delete(&id));
    outcome.print("delete", engine.store_path(), json_output);
    engine.close();
}
