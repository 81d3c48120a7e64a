use serde::Serialize;

use crate::domain::fact::BrandRef;
use crate::domain::territory::TerritoryRef;
use crate::metrics::aggregation::AggregationRow;
use crate::metrics::ordered::OrderedIndex;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HeatmapCell {
    pub territory: TerritoryRef,
    pub brand: BrandRef,
    pub value: f64,
}

impl From<&AggregationRow> for HeatmapCell {
    fn from(row: &AggregationRow) -> Self {
        Self { territory: row.territory.clone(), brand: row.brand.clone(), value: row.percent }
    }
}

/// Brand x territory matrix, `matrix[brand][territory]`.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Heatmap {
    pub brands: Vec<BrandRef>,
    pub territories: Vec<TerritoryRef>,
    pub matrix: Vec<Vec<f64>>,
}

impl Heatmap {
    pub fn value(&self, brand: &BrandRef, territory: &TerritoryRef) -> Option<f64> {
        let row = self.brands.iter().position(|candidate| candidate == brand)?;
        let column = self.territories.iter().position(|candidate| candidate == territory)?;
        self.matrix.get(row)?.get(column).copied()
    }
}

/// Indexes brands and territories in first-seen order and fills every
/// missing pair with 0, so the matrix is always rectangular.
pub fn pivot(cells: &[HeatmapCell]) -> Heatmap {
    let brands: OrderedIndex<BrandRef> = cells.iter().map(|cell| cell.brand.clone()).collect();
    let territories: OrderedIndex<TerritoryRef> =
        cells.iter().map(|cell| cell.territory.clone()).collect();

    let mut matrix = vec![vec![0.0; territories.len()]; brands.len()];
    for cell in cells {
        if let (Some(row), Some(column)) = (brands.get(&cell.brand), territories.get(&cell.territory)) {
            matrix[row][column] = cell.value;
        }
    }

    Heatmap { brands: brands.into_keys(), territories: territories.into_keys(), matrix }
}

#[cfg(test)]
mod tests {
    use super::{pivot, HeatmapCell};
    use crate::domain::fact::BrandRef;
    use crate::domain::territory::{TerritoryLevel, TerritoryRef};
    use crate::metrics::aggregation::aggregate_facts;
    use crate::metrics::registry::MetricFamily;
    use crate::testing::{fact, BRAND_X, BRAND_Y, BRAND_Z, GOMBE, LEMBA};

    fn cell(territory: (i64, &str), brand: (i64, &str), value: f64) -> HeatmapCell {
        HeatmapCell {
            territory: TerritoryRef::new(territory.0, territory.1, TerritoryLevel::Commune),
            brand: BrandRef::new(brand.0, brand.1),
            value,
        }
    }

    #[test]
    fn every_input_cell_is_recovered_and_gaps_are_zero() {
        let cells = vec![
            cell(GOMBE, BRAND_Y, 70.0),
            cell(GOMBE, BRAND_X, 40.0),
            cell(LEMBA, BRAND_Z, 12.5),
        ];
        let heatmap = pivot(&cells);

        for input in &cells {
            assert_eq!(heatmap.value(&input.brand, &input.territory), Some(input.value));
        }
        assert_eq!(heatmap.value(&cells[0].brand, &cells[2].territory), Some(0.0));
        assert_eq!(heatmap.matrix.len(), 3);
        assert!(heatmap.matrix.iter().all(|row| row.len() == 2));
    }

    #[test]
    fn indices_follow_first_appearance() {
        let heatmap = pivot(&[
            cell(LEMBA, BRAND_Z, 1.0),
            cell(GOMBE, BRAND_X, 2.0),
            cell(LEMBA, BRAND_X, 3.0),
        ]);
        let brands: Vec<_> = heatmap.brands.iter().map(|brand| brand.name.as_str()).collect();
        let territories: Vec<_> = heatmap.territories.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(brands, vec!["Zenith", "Xanto"]);
        assert_eq!(territories, vec!["Lemba", "Gombe"]);
        assert_eq!(heatmap.matrix, vec![vec![1.0, 0.0], vec![3.0, 2.0]]);
    }

    #[test]
    fn aggregation_rows_pivot_in_engine_order() {
        let facts = vec![
            fact(1, 1, LEMBA, BRAND_Y, 1.0, 1, 0.0),
            fact(2, 2, GOMBE, BRAND_X, 1.0, 1, 0.0),
        ];
        let rows = aggregate_facts(&facts, TerritoryLevel::Commune, MetricFamily::Nd, None);
        let cells: Vec<HeatmapCell> = rows.iter().map(HeatmapCell::from).collect();

        let heatmap = pivot(&cells);
        assert_eq!(heatmap.territories[0].name, "Gombe");
        assert_eq!(heatmap.brands[0].name, "Xanto");
        assert_eq!(heatmap.matrix, vec![vec![100.0, 0.0], vec![0.0, 100.0]]);
    }

    #[test]
    fn empty_input_gives_empty_matrix() {
        let heatmap = pivot(&[]);
        assert!(heatmap.brands.is_empty());
        assert!(heatmap.matrix.is_empty());
    }
}
