use crate::support::{Engine, fail};
use costgraph_cascade::{CostgraphConfig, NewComposition};
use costgraph_units::Quantity;

pub struct Args {
    pub id: Option<String>,
    pub name: String,
    pub unit: String,
    pub stock: Option<String>,
    pub cost: f64,
    pub deps: Vec<String>,
    pub manual_cost: bool,
}

/// Parse `OF=QUANTITY`.
pub fn parse_dep(raw: &str) -> Result<(String, Quantity), String> {
    let (of, quantity) = raw
        .split_once('=')
        .ok_or_else(|| format!("dependency must look like OF=QUANTITY, got {raw:?}"))?;
    let of = of.trim();
    if of.is_empty() {
        return Err(format!("dependency is missing its composition id: {raw:?}"));
    }
    let quantity: Quantity = quantity.parse().map_err(|e| format!("{e}"))?;
    Ok((of.to_string(), quantity))
}

fn draft(args: Args) -> Result<NewComposition, String> {
    let unit: Quantity = args.unit.parse().map_err(|e| format!("--unit: {e}"))?;
    let mut draft = NewComposition::new(unit)
        .with_name(args.name)
        .with_cost(args.cost)
        .with_autoupdate_cost(!args.manual_cost);
    if let Some(id) = args.id {
        draft = draft.with_id(id);
    }
    if let Some(stock) = args.stock {
        draft = draft.with_stock(stock.parse().map_err(|e| format!("--stock: {e}"))?);
    }
    for raw in &args.deps {
        let (of, quantity) = parse_dep(raw).map_err(|e| format!("--dep: {e}"))?;
        draft = draft.with_dependency(of, quantity);
    }
    Ok(draft)
}

pub fn run(config: &CostgraphConfig, args: Args, json_output: bool) {
    let draft = draft(args).unwrap_or_else(|e| fail(e));
    let engine = Engine::open_or_exit(config);
    let outcome = engine.mutate(engine.service().create(draft));
    outcome.print("add", engine.store_path(), json_output);
    engine.close();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_dep_splits_id_and_quantity() {
        assert_eq!(
            parse_dep("flour=200g"),
            Ok(("flour".to_string(), Quantity::new(200.0, "g")))
        );
        assert_eq!(
            parse_dep(" oil = 1.5 l"),
            Ok(("oil".to_string(), Quantity::new(1.5, "l")))
        );
        assert!(parse_dep("flour").is_err());
        assert!(parse_dep("=200g").is_err());
        assert!(parse_dep("flour=lots").is_err());
    }

    #[test]
    fn manual_cost_flag_disables_autoupdate() {
        let draft = draft(Args {
            id: Some("bread".into()),
            name: "Bread".into(),
            unit: "1u".into(),
            stock: None,
            cost: 3.5,
            deps: vec!["flour=500g".into()],
            manual_cost: true,
        })
        .expect("valid args");
        assert!(!draft.autoupdate_cost);
        assert_eq!(draft.cost, 3.5);
        assert_eq!(draft.dependencies.len(), 1);
        assert_eq!(draft.stock, Quantity::new(0.0, "u"));
    }
}
