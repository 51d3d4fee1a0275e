//! Per-row apex component sums.

use crate::model::{Apex, AxisSpec, Dataset, TernaryPoint};
use crate::molar::MolarConversion;
use crate::Result;

/// Column lookups and multipliers resolved once per trace.
///
/// Each apex term is `value × factor`, where the factor is the column's
/// scale, divided by its molar mass when a molar conversion is active.
#[derive(Debug, Clone)]
pub struct ComponentResolver {
    terms: [Vec<(usize, f64)>; 3],
}

impl ComponentResolver {
    pub fn new(dataset: &Dataset, axes: &AxisSpec, molar: Option<&MolarConversion>) -> Result<Self> {
        axes.validate(dataset)?;
        let resolve = |apex: Apex| -> Result<Vec<(usize, f64)>> {
            axes.members(apex)
                .iter()
                .map(|m| {
                    let col = dataset.require_numeric(&m.column)?;
                    let factor = match molar {
                        Some(conv) => m.scale * conv.factor(&m.column)?,
                        None => m.scale,
                    };
                    Ok((col, factor))
                })
                .collect()
        };
        Ok(Self { terms: [resolve(Apex::Top)?, resolve(Apex::Left)?, resolve(Apex::Right)?] })
    }

    /// Raw (un-normalized) components of `row`, and whether any
    /// contributing value was missing. Missing values count as zero.
    pub fn resolve(&self, dataset: &Dataset, row: usize) -> (TernaryPoint, bool) {
        let mut missing = false;
        let mut sum = |terms: &[(usize, f64)]| -> f64 {
            terms
                .iter()
                .map(|&(col, factor)| match dataset.numeric(row, col) {
                    Some(v) => v * factor,
                    None => {
                        missing = true;
                        0.0
                    }
                })
                .sum()
        };
        let top = sum(&self.terms[0]);
        let left = sum(&self.terms[1]);
        let right = sum(&self.terms[2]);
        (TernaryPoint::new(top, left, right), missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Value;

    #[test]
    fn test_scaled_sum_with_missing() {
        let ds = Dataset::from_records(
            &["A", "B", "C", "D"],
            vec![
                vec![Value::from(1.0), Value::from(2.0), Value::from(3.0), Value::from(4.0)],
                vec![Value::from(1.0), Value::Null, Value::from(3.0), Value::from(4.0)],
            ],
        )
        .unwrap();
        let axes = AxisSpec::custom(["A"], ["B", "C"], ["D"]).unwrap().with_scale(Apex::Left, "C", 10.0).unwrap();
        let resolver = ComponentResolver::new(&ds, &axes, None).unwrap();
        assert_eq!(resolver.resolve(&ds, 0), (TernaryPoint::new(1.0, 32.0, 4.0), false));
        assert_eq!(resolver.resolve(&ds, 1), (TernaryPoint::new(1.0, 30.0, 4.0), true));
    }

    #[test]
    fn test_molar_factors() {
        let ds = Dataset::from_records(&["SiO2", "MgO", "CaO"], vec![vec![Value::from(60.083), Value::from(40.304), Value::from(0.0)]]).unwrap();
        let axes = AxisSpec::custom(["SiO2"], ["MgO"], ["CaO"]).unwrap();
        let resolver = ComponentResolver::new(&ds, &axes, Some(&MolarConversion::new())).unwrap();
        let (p, _) = resolver.resolve(&ds, 0);
        assert!((p.top - 1.0).abs() < 1e-4);
        assert!((p.left - 1.0).abs() < 1e-4);
    }
}
