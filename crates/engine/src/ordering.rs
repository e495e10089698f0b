//! Sort keys for feature results
//!
//! Both backends order results identically: the caller's sort keys first,
//! then ascending feature id as a final tie-break. Names compare with ASCII
//! case folding and missing names first, matching SQLite's `NOCASE`
//! collation. Missing geometry sorts last by distance.

use std::cmp::Ordering;

use featuredb_core::geometry::distance_to_geometry;
use featuredb_core::{Feature, FeatureId, Order};

/// Precomputed comparison key of one result row
#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    /// Feature id
    pub id: FeatureId,
    /// Feature name
    pub name: Option<String>,
    /// One distance per `Order::Distance` entry, in order
    pub distances: Vec<f64>,
    /// Effective maximum level of detail
    pub max_lod: i32,
}

impl SortKey {
    /// Build the key of a materialized feature
    pub fn for_feature(orders: &[Order], feature: &Feature, max_lod: i32) -> Self {
        let distances = orders
            .iter()
            .filter_map(|o| match o {
                Order::Distance(point) => Some(
                    feature
                        .geometry
                        .as_ref()
                        .map_or(f64::INFINITY, |g| distance_to_geometry(*point, g)),
                ),
                _ => None,
            })
            .collect();
        Self {
            id: feature.id,
            name: feature.name.clone(),
            distances,
            max_lod,
        }
    }

    /// Compare two keys under `orders`
    pub fn compare(&self, other: &SortKey, orders: &[Order]) -> Ordering {
        let mut distance_idx = 0;
        for order in orders {
            let ord = match order {
                Order::FeatureId => self.id.cmp(&other.id),
                Order::FeatureName => compare_names(self.name.as_deref(), other.name.as_deref()),
                Order::Distance(_) => {
                    let a = self.distances.get(distance_idx).copied().unwrap_or(f64::INFINITY);
                    let b = other.distances.get(distance_idx).copied().unwrap_or(f64::INFINITY);
                    distance_idx += 1;
                    a.total_cmp(&b)
                }
                Order::Resolution => other.max_lod.cmp(&self.max_lod),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        self.id.cmp(&other.id)
    }
}

/// `NOCASE`-compatible name comparison; `None` sorts first
pub fn compare_names(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => a
            .bytes()
            .map(|c| c.to_ascii_lowercase())
            .cmp(b.bytes().map(|c| c.to_ascii_lowercase())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(id: FeatureId, name: Option<&str>, max_lod: i32) -> SortKey {
        SortKey {
            id,
            name: name.map(str::to_string),
            distances: vec![],
            max_lod,
        }
    }

    #[test]
    fn test_name_order_is_case_insensitive() {
        let a = key(2, Some("alpha"), 0);
        let b = key(1, Some("Beta"), 0);
        assert_eq!(a.compare(&b, &[Order::FeatureName]), Ordering::Less);
    }

    #[test]
    fn test_missing_name_first() {
        let a = key(5, None, 0);
        let b = key(1, Some("a"), 0);
        assert_eq!(a.compare(&b, &[Order::FeatureName]), Ordering::Less);
    }

    #[test]
    fn test_tie_breaks_on_id() {
        let a = key(5, Some("same"), 0);
        let b = key(3, Some("SAME"), 0);
        assert_eq!(a.compare(&b, &[Order::FeatureName]), Ordering::Greater);
        assert_eq!(a.compare(&b, &[]), Ordering::Greater);
    }

    #[test]
    fn test_resolution_is_descending() {
        let fine = key(1, None, 18);
        let coarse = key(2, None, 4);
        assert_eq!(fine.compare(&coarse, &[Order::Resolution]), Ordering::Less);
    }
}
