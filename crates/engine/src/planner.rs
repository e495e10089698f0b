//! Cost-based index selection
//!
//! The planner looks at every filter dimension a query supplies, asks the
//! backend for a cheap candidate-count estimate per dimension, and picks the
//! smallest as the *driver*: the one index the backend materializes. Every
//! other supplied dimension becomes a *residual* predicate applied to the
//! driver's candidates.
//!
//! ## Design
//!
//! The algorithm is shared; only estimation is backend-specific
//! ([`SelectivityEstimator`]). Estimates influence performance only. A
//! backend must produce the same rows whichever dimension drives, which is
//! why the planner can be biased ([`QueryPlanner::forced`],
//! [`QueryPlanner::perturbed`]) to exercise every path in tests.
//!
//! # Example
//!
//! ```ignore
//! let plan = QueryPlanner::new().plan(&params, &estimator);
//! match plan.driver {
//!     Some(Dimension::Spatial) => { /* probe the quadtree */ }
//!     None => { /* full scan */ }
//!     _ => { /* ... */ }
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use featuredb_core::FeatureQueryParameters;
use tracing::debug;

/// A filter dimension that has an index in every backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dimension {
    /// Explicit feature ids
    FeatureIds,
    /// Owning feature set filter
    FeatureSets,
    /// Spatial filter
    Spatial,
    /// Visible-only flag
    Visibility,
    /// Geometry type set
    GeometryTypes,
    /// Name patterns
    Names,
}

impl Dimension {
    /// Every dimension, in tie-break order
    pub const ALL: [Dimension; 6] = [
        Dimension::FeatureIds,
        Dimension::FeatureSets,
        Dimension::Spatial,
        Dimension::Visibility,
        Dimension::GeometryTypes,
        Dimension::Names,
    ];

    /// Check whether `params` constrains this dimension
    pub fn applies(self, params: &FeatureQueryParameters) -> bool {
        match self {
            Dimension::FeatureIds => params.ids.is_some(),
            Dimension::FeatureSets => params.feature_sets.is_some(),
            Dimension::Spatial => params.spatial_filter.is_some(),
            Dimension::Visibility => params.visible_only,
            Dimension::GeometryTypes => params.geometry_types.is_some(),
            Dimension::Names => params.names.is_some(),
        }
    }
}

/// Backend-specific candidate-count estimation
///
/// Implementations must answer from index metadata only (bucket sizes,
/// per-set counts, node counts); they must not materialize results.
pub trait SelectivityEstimator {
    /// Total number of features, the cost of a full scan
    fn total(&self) -> usize;

    /// Approximate candidate count when `dimension` drives the query
    fn estimate(&self, dimension: Dimension, params: &FeatureQueryParameters) -> usize;
}

/// The planner's decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    /// Dimension to materialize first; `None` for a full scan
    pub driver: Option<Dimension>,
    /// Dimensions to check as predicates over the candidates
    pub residual: Vec<Dimension>,
    /// Estimate per applicable dimension, after bias
    pub estimates: Vec<(Dimension, usize)>,
}

impl QueryPlan {
    /// Check whether the driver is a full scan
    pub fn is_full_scan(&self) -> bool {
        self.driver.is_none()
    }

    /// Check whether `dimension` must be evaluated as a predicate
    pub fn is_residual(&self, dimension: Dimension) -> bool {
        self.residual.contains(&dimension)
    }
}

type Perturbation = Arc<dyn Fn(Dimension, usize) -> usize + Send + Sync>;

#[derive(Clone, Default)]
enum Bias {
    #[default]
    None,
    Forced(Option<Dimension>),
    Perturbed(Perturbation),
}

/// Index-selection strategy shared by all backends
#[derive(Clone, Default)]
pub struct QueryPlanner {
    bias: Bias,
}

impl QueryPlanner {
    /// Planner that trusts the estimates
    pub fn new() -> Self {
        Self::default()
    }

    /// Planner that always drives with `dimension` when it applies;
    /// `None` forces a full scan
    pub fn forced(dimension: Option<Dimension>) -> Self {
        Self {
            bias: Bias::Forced(dimension),
        }
    }

    /// Planner that rewrites every estimate through `f`
    pub fn perturbed<F>(f: F) -> Self
    where
        F: Fn(Dimension, usize) -> usize + Send + Sync + 'static,
    {
        Self {
            bias: Bias::Perturbed(Arc::new(f)),
        }
    }

    /// Pick a driver for `params`
    pub fn plan(
        &self,
        params: &FeatureQueryParameters,
        estimator: &dyn SelectivityEstimator,
    ) -> QueryPlan {
        let applicable: Vec<Dimension> = Dimension::ALL
            .iter()
            .copied()
            .filter(|d| d.applies(params))
            .collect();

        let estimates: Vec<(Dimension, usize)> = applicable
            .iter()
            .map(|&d| {
                let raw = estimator.estimate(d, params);
                let adjusted = match &self.bias {
                    Bias::Perturbed(f) => f(d, raw),
                    _ => raw,
                };
                (d, adjusted)
            })
            .collect();

        let driver = match &self.bias {
            Bias::Forced(forced) => (*forced).filter(|d| applicable.contains(d)),
            _ => {
                let total = estimator.total();
                estimates
                    .iter()
                    .min_by_key(|(_, estimate)| *estimate)
                    .filter(|(_, estimate)| *estimate < total || total == 0)
                    .map(|(d, _)| *d)
            }
        };

        let residual = applicable
            .iter()
            .copied()
            .filter(|d| Some(*d) != driver)
            .collect();

        let plan = QueryPlan {
            driver,
            residual,
            estimates,
        };
        debug!(target: "featuredb::planner", driver = ?plan.driver, residual = ?plan.residual, estimates = ?plan.estimates, "query plan");
        plan
    }
}

impl fmt::Debug for QueryPlanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bias = match &self.bias {
            Bias::None => "none".to_string(),
            Bias::Forced(d) => format!("forced({:?})", d),
            Bias::Perturbed(_) => "perturbed".to_string(),
        };
        f.debug_struct("QueryPlanner").field("bias", &bias).finish()
    }
}
