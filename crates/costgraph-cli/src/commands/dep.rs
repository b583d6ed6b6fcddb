use crate::cli::DepCommands;
use crate::support::{Engine, fail};
use costgraph_cascade::CostgraphConfig;
use costgraph_memory::Dependency;
use costgraph_units::Quantity;

pub fn run(config: &CostgraphConfig, command: DepCommands) {
    match command {
        DepCommands::Add {
            id,
            of,
            quantity,
            json,
        } => run_add(config, id, of, quantity, json),
        DepCommands::Rm { id, of, json } => run_rm(config, id, of, json),
    }
}

fn run_add(config: &CostgraphConfig, id: String, of: String, quantity: String, json_output: bool) {
    let quantity: Quantity = quantity.parse().unwrap_or_else(|e| fail(e));
    let engine = Engine::open_or_exit(config);
    let outcome = engine.mutate(
        engine
            .service()
            .upsert_dependency(&id, Dependency::new(of, quantity)),
    );
    outcome.print("dep.add", engine.store_path(), json_output);
    engine.close();
}

fn run_rm(config: &CostgraphConfig, id: String, of: String, json_output: bool) {
    let engine = Engine::open_or_exit(config);
    let outcome = engine.mutate(engine.service().remove_dependency(&id, &of));
    outcome.print("dep.rm", engine.store_path(), json_output);
    engine.close();
}
