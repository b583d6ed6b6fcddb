//! Wire payloads announcing composition changes.
//!
//! Every payload is a JSON object tagged by `type`:
//! `{"type": "CompositionUpdatedManually", "composition": {...}}`, or, for
//! the batch variant, `{"type": "CompositionsUpdatedAutomatically",
//! "compositions": [...]}`.

use serde::{Deserialize, Serialize};

use crate::composition::Composition;

pub const EVENT_COMPOSITION_CREATED: &str = "CompositionCreated";
pub const EVENT_COMPOSITION_UPDATED_MANUALLY: &str = "CompositionUpdatedManually";
pub const EVENT_COMPOSITION_DELETED: &str = "CompositionDeleted";
pub const EVENT_COMPOSITIONS_UPDATED_AUTOMATICALLY: &str = "CompositionsUpdatedAutomatically";
pub const EVENT_COMPOSITION_USES_UPDATED: &str = "CompositionUsesUpdatedSinceLastChange";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CompositionEvent {
    CompositionCreated { composition: Composition },
    CompositionUpdatedManually { composition: Composition },
    CompositionDeleted { composition: Composition },
    CompositionsUpdatedAutomatically { compositions: Vec<Composition> },
    CompositionUsesUpdatedSinceLastChange { composition: Composition },
}

impl CompositionEvent {
    /// The `type` discriminator as it appears on the wire.
    pub fn type_name(&self) -> &'static str {
        match self {
            CompositionEvent::CompositionCreated { .. } => EVENT_COMPOSITION_CREATED,
            CompositionEvent::CompositionUpdatedManually { .. } => {
                EVENT_COMPOSITION_UPDATED_MANUALLY
            }
            CompositionEvent::CompositionDeleted { .. } => EVENT_COMPOSITION_DELETED,
            CompositionEvent::CompositionsUpdatedAutomatically { .. } => {
                EVENT_COMPOSITIONS_UPDATED_AUTOMATICALLY
            }
            CompositionEvent::CompositionUsesUpdatedSinceLastChange { .. } => {
                EVENT_COMPOSITION_USES_UPDATED
            }
        }
    }

    /// Whether this event names compositions whose uses must be recomputed.
    pub fn triggers_cascade(&self) -> bool {
        !matches!(
            self,
            CompositionEvent::CompositionUsesUpdatedSinceLastChange { .. }
        )
    }

    /// Compositions carried by the payload, in payload order.
    pub fn compositions(&self) -> Vec<&Composition> {
        match self {
            CompositionEvent::CompositionCreated { composition }
            | CompositionEvent::CompositionUpdatedManually { composition }
            | CompositionEvent::CompositionDeleted { composition }
            | CompositionEvent::CompositionUsesUpdatedSinceLastChange { composition } => {
                vec![composition]
            }
            CompositionEvent::CompositionsUpdatedAutomatically { compositions } => {
                compositions.iter().collect()
            }
        }
    }

    pub fn composition_ids(&self) -> Vec<String> {
        self.compositions()
            .into_iter()
            .map(|composition| composition.id.clone())
            .collect()
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_json_bytes(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use crate::dependency::Dependency;
    use costgraph_units::Quantity;

    fn fixed(id: &str) -> Composition {
        let at = Utc
            .with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
            .single()
            .expect("valid timestamp");
        let mut composition =
            Composition::new(id, Quantity::new(2.5, "kg"), Quantity::new(10.5, "kg"));
        let mut salt = Dependency::new("c-salt", Quantity::new(0.5, "kg"));
        salt.subvalue = 31.25;
        composition.dependencies.push(salt);
        composition.cost = 31.25;
        composition.created_at = at;
        composition.updated_at = at;
        composition
    }

    #[test]
    fn single_event_wire_shape() {
        let event = CompositionEvent::CompositionUpdatedManually {
            composition: fixed("c-flour"),
        };
        insta::assert_json_snapshot!(event, @r#"
        {
          "type": "CompositionUpdatedManually",
          "composition": {
            "id": "c-flour",
            "cost": 31.25,
            "unit": {
              "value": 2.5,
              "unit": "kg"
            },
            "stock": {
              "value": 10.5,
              "unit": "kg"
            },
            "dependencies": [
              {
                "of": "c-salt",
                "quantity": {
                  "value": 0.5,
                  "unit": "kg"
                },
                "subvalue": 31.25
              }
            ],
            "autoupdateCost": true,
            "enabled": true,
            "needsUsesRecompute": false,
            "createdAt": "2024-05-01T12:00:00Z",
            "updatedAt": "2024-05-01T12:00:00Z"
          }
        }
        "#);
    }

    #[test]
    fn batch_event_roundtrips_through_bytes() {
        let event = CompositionEvent::CompositionsUpdatedAutomatically {
            compositions: vec![fixed("c-a"), fixed("c-b")],
        };
        let bytes = event.to_json_bytes().expect("serialize");
        let value: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(value["type"], "CompositionsUpdatedAutomatically");
        assert_eq!(value["compositions"].as_array().map(Vec::len), Some(2));

        let back = CompositionEvent::from_json_bytes(&bytes).expect("deserialize");
        assert_eq!(back.composition_ids(), vec!["c-a", "c-b"]);
        assert_eq!(back.type_name(), EVENT_COMPOSITIONS_UPDATED_AUTOMATICALLY);
    }

    #[test]
    fn uses_updated_does_not_trigger_cascade() {
        let event = CompositionEvent::CompositionUsesUpdatedSinceLastChange {
            composition: fixed("c-a"),
        };
        assert!(!event.triggers_cascade());
        assert!(
            CompositionEvent::CompositionDeleted {
                composition: fixed("c-a")
            }
            .triggers_cascade()
        );
    }
}
