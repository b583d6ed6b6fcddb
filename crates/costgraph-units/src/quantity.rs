//! Quantities: a numeric value paired with a unit name.
//!
//! Arithmetic is gated by dimension: two quantities combine only when their
//! units share a dimension. Results are expressed in the left operand's unit.

use serde::{Deserialize, Serialize};

use crate::error::CostError;
use crate::registry::{Unit, UnitRegistry};

/// Relative tolerance used when comparing base-normalized values.
pub const EQUALITY_TOLERANCE: f64 = 1e-9;

/// A `(value, unit)` pair.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Quantity {
    pub value: f64,
    pub unit: String,
}

impl Quantity {
    pub fn new(value: f64, unit: impl Into<String>) -> Self {
        Self {
            value,
            unit: unit.into(),
        }
    }

    /// The distinguished empty quantity: zero with no unit.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.value == 0.0 && self.unit.is_empty()
    }

    /// Value expressed in the base unit of its dimension.
    pub fn normalize(&self, registry: &UnitRegistry) -> Result<f64, CostError> {
        let unit = registry.require(&self.unit)?;
        Ok(self.value * unit.modifier)
    }

    /// Whether both units are known and share a dimension.
    pub fn compatible(&self, other: &Quantity, registry: &UnitRegistry) -> bool {
        match (registry.by_name(&self.unit), registry.by_name(&other.unit)) {
            (Some(left), Some(right)) => left.dimension == right.dimension,
            _ => false,
        }
    }

    pub fn add(&self, other: &Quantity, registry: &UnitRegistry) -> Result<Quantity, CostError> {
        self.combine(other, registry, |left, right| left + right)
    }

    pub fn subtract(
        &self,
        other: &Quantity,
        registry: &UnitRegistry,
    ) -> Result<Quantity, CostError> {
        self.combine(other, registry, |left, right| left - right)
    }

    /// Compatible and numerically equal once normalized.
    ///
    /// Unknown units never compare equal.
    pub fn equals(&self, other: &Quantity, registry: &UnitRegistry) -> bool {
        let (Some(left), Some(right)) = (registry.by_name(&self.unit), registry.by_name(&other.unit))
        else {
            return false;
        };
        if left.dimension != right.dimension {
            return false;
        }
        approx_eq(self.value * left.modifier, other.value * right.modifier)
    }

    /// Known unit and non-negative finite value.
    pub fn is_valid(&self, registry: &UnitRegistry) -> bool {
        registry.exists(&self.unit) && self.value.is_finite() && self.value >= 0.0
    }

    /// Like [`Quantity::is_valid`], but reports which rule failed for `field`.
    pub fn validate(&self, field: &str, registry: &UnitRegistry) -> Result<(), CostError> {
        if self.unit.is_empty() {
            return Err(CostError::validation(field, "unit must not be empty"));
        }
        if !registry.exists(&self.unit) {
            return Err(CostError::validation(
                field,
                format!("unknown unit {:?}", self.unit),
            ));
        }
        if !self.value.is_finite() || self.value < 0.0 {
            return Err(CostError::validation(
                field,
                format!("value must be non-negative, got {}", self.value),
            ));
        }
        Ok(())
    }

    /// Re-express this quantity in another unit of the same dimension.
    pub fn convert_to(&self, unit: &str, registry: &UnitRegistry) -> Result<Quantity, CostError> {
        let (source, target) = resolve_pair(&self.unit, unit, registry)?;
        Ok(Quantity::new(
            self.value * source.modifier / target.modifier,
            unit,
        ))
    }

    fn combine(
        &self,
        other: &Quantity,
        registry: &UnitRegistry,
        op: impl Fn(f64, f64) -> f64,
    ) -> Result<Quantity, CostError> {
        let (left, right) = resolve_pair(&self.unit, &other.unit, registry)?;
        let combined = op(self.value * left.modifier, other.value * right.modifier);
        Ok(Quantity::new(combined / left.modifier, self.unit.clone()))
    }
}

impl std::fmt::Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}

/// Parses `"<value><unit>"` with optional whitespace, e.g. `0.2kg`,
/// `250 g` or `1e3 g`. An `e`/`E` is read as an exponent only when digits
/// follow it. The unit is not checked against a registry.
impl std::str::FromStr for Quantity {
    type Err = CostError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        let split = amount_len(raw);
        let (value, unit) = raw.split_at(split);
        let unit = unit.trim();
        if unit.is_empty() {
            return Err(CostError::validation(
                "quantity",
                format!("missing unit in {raw:?}"),
            ));
        }
        if !unit.starts_with(|c: char| c.is_alphabetic()) {
            return Err(CostError::validation(
                "quantity",
                format!("invalid unit {unit:?} in {raw:?}"),
            ));
        }
        let value: f64 = value.trim().parse().map_err(|_| {
            CostError::validation("quantity", format!("invalid amount in {raw:?}"))
        })?;
        Ok(Quantity::new(value, unit))
    }
}

/// Byte length of the leading numeric literal of `raw`.
fn amount_len(raw: &str) -> usize {
    let bytes = raw.as_bytes();
    let mut end = 0;
    while end < bytes.len() && matches!(bytes[end], b'0'..=b'9' | b'.' | b'+' | b'-') {
        end += 1;
    }
    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp = end + 1;
        if exp < bytes.len() && matches!(bytes[exp], b'+' | b'-') {
            exp += 1;
        }
        let digits = bytes[exp..].iter().take_while(|b| b.is_ascii_digit()).count();
        if digits > 0 {
            end = exp + digits;
        }
    }
    end
}

/// Resolve two unit names and require a shared dimension.
pub fn resolve_pair<'r>(
    left: &str,
    right: &str,
    registry: &'r UnitRegistry,
) -> Result<(&'r Unit, &'r Unit), CostError> {
    let left_unit = registry.require(left)?;
    let right_unit = registry.require(right)?;
    if left_unit.dimension != right_unit.dimension {
        return Err(CostError::IncompatibleUnits {
            left: left.to_string(),
            right: right.to_string(),
            left_dimension: left_unit.dimension.to_string(),
            right_dimension: right_unit.dimension.to_string(),
        });
    }
    Ok((left_unit, right_unit))
}

/// Relative float comparison with an absolute floor near zero.
pub fn approx_eq(left: f64, right: f64) -> bool {
    let scale = left.abs().max(right.abs()).max(1.0);
    (left - right).abs() <= EQUALITY_TOLERANCE * scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CostErrorKind;

    fn registry() -> UnitRegistry {
        UnitRegistry::standard()
    }

    #[test]
    fn add_and_subtract_keep_left_unit() {
        let reg = registry();
        let two_kg = Quantity::new(2.0, "kg");
        let half_kg = Quantity::new(500.0, "g");

        let sum = two_kg.add(&half_kg, &reg).expect("compatible add");
        assert_eq!(sum, Quantity::new(2.5, "kg"));

        let diff = two_kg.subtract(&half_kg, &reg).expect("compatible subtract");
        assert_eq!(diff, Quantity::new(1.5, "kg"));
    }

    #[test]
    fn arithmetic_across_dimensions_fails() {
        let reg = registry();
        let two_kg = Quantity::new(2.0, "kg");
        let three_km = Quantity::new(3.0, "km");

        let err = two_kg.add(&three_km, &reg).expect_err("mass + length");
        assert_eq!(err.kind(), CostErrorKind::IncompatibleUnits);
        let err = two_kg.subtract(&three_km, &reg).expect_err("mass - length");
        assert_eq!(err.kind(), CostErrorKind::IncompatibleUnits);
    }

    #[test]
    fn arithmetic_with_unknown_unit_fails() {
        let reg = registry();
        let err = Quantity::new(1.0, "kg")
            .add(&Quantity::new(1.0, "stone"), &reg)
            .expect_err("unknown right unit");
        assert_eq!(err, CostError::unknown_unit("stone"));
    }

    #[test]
    fn normalize_propagates_unknown_unit() {
        let reg = registry();
        assert_eq!(Quantity::new(3.0, "kg").normalize(&reg), Ok(3000.0));
        assert!(Quantity::new(3.0, "bushel").normalize(&reg).is_err());
    }

    #[test]
    fn equals_compares_normalized_values() {
        let reg = registry();
        assert!(Quantity::new(0.2, "kg").equals(&Quantity::new(200.0, "g"), &reg));
        assert!(!Quantity::new(0.2, "kg").equals(&Quantity::new(201.0, "g"), &reg));
        assert!(!Quantity::new(1.0, "l").equals(&Quantity::new(1.0, "kg"), &reg));
        assert!(!Quantity::new(1.0, "x").equals(&Quantity::new(1.0, "x"), &reg));
    }

    #[test]
    fn validity_requires_known_unit_and_non_negative_value() {
        let reg = registry();
        assert!(Quantity::new(0.0, "g").is_valid(&reg));
        assert!(!Quantity::new(-1.0, "g").is_valid(&reg));
        assert!(!Quantity::new(1.0, "").is_valid(&reg));
        assert!(Quantity::empty().is_empty());

        let err = Quantity::new(-1.0, "g")
            .validate("stock", &reg)
            .expect_err("negative must fail");
        assert!(matches!(err, CostError::ValidationFailure { field, .. } if field == "stock"));
    }

    #[test]
    fn convert_to_rescales_value() {
        let reg = registry();
        let grams = Quantity::new(1.5, "kg")
            .convert_to("g", &reg)
            .expect("kg to g");
        assert_eq!(grams, Quantity::new(1500.0, "g"));
        assert!(Quantity::new(1.0, "kg").convert_to("ml", &reg).is_err());
    }

    #[test]
    fn parses_from_text() {
        assert_eq!("0.2kg".parse::<Quantity>(), Ok(Quantity::new(0.2, "kg")));
        assert_eq!(" 250 g ".parse::<Quantity>(), Ok(Quantity::new(250.0, "g")));
        assert_eq!("1.5 m3".parse::<Quantity>(), Ok(Quantity::new(1.5, "m3")));
        assert!("kg".parse::<Quantity>().is_err());
        assert!("12".parse::<Quantity>().is_err());
    }

    #[test]
    fn parses_exponent_amounts() {
        assert_eq!("1e3kg".parse::<Quantity>(), Ok(Quantity::new(1000.0, "kg")));
        assert_eq!("2.5E-1 l".parse::<Quantity>(), Ok(Quantity::new(0.25, "l")));
        // No digits after `e`, so it starts the unit.
        assert_eq!("1each".parse::<Quantity>(), Ok(Quantity::new(1.0, "each")));

        let err = "1e3".parse::<Quantity>().expect_err("no unit");
        assert_eq!(err.kind(), CostErrorKind::ValidationFailure);
        assert!("1.2.3kg".parse::<Quantity>().is_err());
    }

    #[test]
    fn quantity_wire_shape() {
        let q: Quantity =
            serde_json::from_str(r#"{"value":2.5,"unit":"kg"}"#).expect("quantity parses");
        assert_eq!(q, Quantity::new(2.5, "kg"));
    }
}
