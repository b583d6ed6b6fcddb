use crate::support::print_json;
use costgraph_units::{Dimension, UnitRegistry};
use serde_json::json;

pub fn run(dimension: Option<Dimension>, json_output: bool) {
    let registry = UnitRegistry::standard();
    let dimensions = match dimension {
        Some(dimension) => vec![dimension],
        None => registry.dimensions(),
    };

    if json_output {
        let groups: Vec<_> = dimensions
            .iter()
            .map(|dimension| {
                let units: Vec<_> = registry
                    .by_dimension(*dimension)
                    .into_iter()
                    .map(|unit| json!({ "name": unit.name, "modifier": unit.modifier }))
                    .collect();
                json!({ "dimension": dimension.as_str(), "units": units })
            })
            .collect();
        print_json(&json!({ "action": "units", "dimensions": groups }));
        return;
    }

    println!("costgraph units");
    for dimension in dimensions {
        println!();
        println!("  {dimension}");
        for unit in registry.by_dimension(dimension) {
            println!("    {:<6} x{}", unit.name, unit.modifier);
        }
    }
}
