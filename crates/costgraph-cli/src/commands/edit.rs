use crate::support::{Engine, fail};
use costgraph_cascade::{CompositionPatch, CostgraphConfig};
use costgraph_units::Quantity;

pub struct Fields {
    pub name: Option<String>,
    pub unit: Option<String>,
    pub stock: Option<String>,
}

fn patch(fields: Fields) -> Result<CompositionPatch, String> {
    if fields.name.is_none() && fields.unit.is_none() && fields.stock.is_none() {
        return Err("nothing to edit: pass --name, --unit or --stock".to_string());
    }
    let unit = fields
        .unit
        .map(|raw| raw.parse::<Quantity>().map_err(|e| format!("--unit: {e}")))
        .transpose()?;
    let stock = fields
        .stock
        .map(|raw| raw.parse::<Quantity>().map_err(|e| format!("--stock: {e}")))
        .transpose()?;
    Ok(CompositionPatch {
        name: fields.name,
        unit,
        stock,
        ..CompositionPatch::default()
    })
}

pub fn run(config: &CostgraphConfig, id: String, fields: Fields, json_output: bool) {
    let patch = patch(fields).unwrap_or_else(|e| fail(e));
    let engine = Engine::open_or_exit(config);
    let outcome = engine.mutate(engine.service().update(&id, patch));
    outcome.print("edit", engine.store_path(), json_output);
    engine.close();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_carries_only_given_fields() {
        let patch = patch(Fields {
            name: None,
            unit: Some("1kg".into()),
            stock: None,
        })
        .expect("unit only");
        assert_eq!(patch.unit, Some(Quantity::new(1.0, "kg")));
        assert_eq!(patch.name, None);
        assert_eq!(patch.stock, None);
        assert_eq!(patch.cost, None);
    }

    #[test]
    fn empty_or_unparsable_edit_is_refused() {
        let empty = patch(Fields {
            name: None,
            unit: None,
            stock: None,
        });
        assert!(empty.is_err());

        let bad = patch(Fields {
            name: None,
            unit: None,
            stock: Some("plenty".into()),
        });
        assert!(bad.expect_err("bad stock").starts_with("--stock"));
    }
}
