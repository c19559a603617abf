//! Turns percentage distributions into a concrete query list.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::Rng;

use loadbench_core::{BenchmarkConfig, Complexity, QueryCatalog, QueryDefinition, QueryType};

/// Number of slots a pair with weight 1.0 receives.
pub const WORKLOAD_SCALE: f64 = 20.0;

/// Builds the workload a run cycles through.
///
/// Every `(type, complexity)` pair with at least one matching catalog query
/// contributes `max(1, round(weight * 20))` entries, drawn with replacement
/// from the matching queries. The composition sets the long-run mix; the
/// order only affects short-term interleaving.
#[derive(Debug, Clone)]
pub struct WorkloadSelector {
    query_distribution: BTreeMap<QueryType, f64>,
    complexity_distribution: BTreeMap<Complexity, f64>,
}

impl WorkloadSelector {
    pub fn new(
        query_distribution: BTreeMap<QueryType, f64>,
        complexity_distribution: BTreeMap<Complexity, f64>,
    ) -> Self {
        Self {
            query_distribution,
            complexity_distribution,
        }
    }

    pub fn from_config(config: &BenchmarkConfig) -> Self {
        Self::new(
            config.query_distribution.clone(),
            config.complexity_distribution.clone(),
        )
    }

    /// Select a workload using the thread-local RNG.
    pub fn select(&self, catalog: &QueryCatalog) -> Vec<QueryDefinition> {
        self.select_with_rng(catalog, &mut rand::thread_rng())
    }

    /// Select a workload drawing from `rng`.
    pub fn select_with_rng<R: Rng + ?Sized>(
        &self,
        catalog: &QueryCatalog,
        rng: &mut R,
    ) -> Vec<QueryDefinition> {
        let type_total: f64 = self.query_distribution.values().sum();
        let complexity_total: f64 = self.complexity_distribution.values().sum();
        if type_total <= 0.0 || complexity_total <= 0.0 {
            tracing::warn!("Distribution weights sum to zero, workload is empty");
            return Vec::new();
        }

        let mut selected = Vec::new();
        for (query_type, type_pct) in &self.query_distribution {
            for (complexity, complexity_pct) in &self.complexity_distribution {
                let matching = catalog.by_type_and_complexity(*query_type, *complexity);
                if matching.is_empty() {
                    continue;
                }

                let weight = (type_pct / type_total) * (complexity_pct / complexity_total);
                let slots = ((weight * WORKLOAD_SCALE).round() as usize).max(1);
                for _ in 0..slots {
                    if let Some(definition) = matching.choose(rng) {
                        selected.push((*definition).clone());
                    }
                }
            }
        }

        tracing::info!(selected = selected.len(), "Selected queries based on distribution");
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadbench_core::handler_fn;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn catalog() -> QueryCatalog {
        let mut catalog = QueryCatalog::new();
        for qt in QueryType::ALL {
            for cx in Complexity::ALL {
                for n in 0..2 {
                    catalog
                        .register(QueryDefinition::new(
                            format!("{qt}_{cx}_{n}"),
                            format!("{qt} {cx} #{n}"),
                            qt,
                            cx,
                            handler_fn(|_| async { Ok(None) }),
                        ))
                        .unwrap();
                }
            }
        }
        catalog
    }

    #[test]
    fn test_single_pair_distribution() {
        let selector = WorkloadSelector::new(
            BTreeMap::from([(QueryType::Select, 100.0)]),
            BTreeMap::from([(Complexity::Simple, 100.0)]),
        );
        let workload = selector.select(&catalog());

        assert_eq!(workload.len(), 20);
        assert!(workload
            .iter()
            .all(|q| q.query_type == QueryType::Select && q.complexity == Complexity::Simple));
    }

    #[test]
    fn test_small_weights_get_one_slot() {
        let selector = WorkloadSelector::new(
            BTreeMap::from([(QueryType::Select, 99.0), (QueryType::Delete, 1.0)]),
            BTreeMap::from([(Complexity::Simple, 100.0)]),
        );
        let mut rng = StdRng::seed_from_u64(7);
        let workload = selector.select_with_rng(&catalog(), &mut rng);

        let deletes = workload
            .iter()
            .filter(|q| q.query_type == QueryType::Delete)
            .count();
        // round(0.99 * 20) = 20 selects, max(1, round(0.2)) = 1 delete
        assert_eq!(deletes, 1);
        assert_eq!(workload.len(), 21);
    }

    #[test]
    fn test_default_mix_composition() {
        let selector = WorkloadSelector::from_config(&BenchmarkConfig::default());
        let workload = selector.select(&catalog());

        // select 40%: simple 4, medium 3 (2.8), complex 1 (1.2)
        let selects = workload
            .iter()
            .filter(|q| q.query_type == QueryType::Select)
            .count();
        assert_eq!(selects, 8);
        // insert/update 25%: 3 (2.5) + 2 (1.75) + 1 (0.75); delete 10%: 1 + 1 + 1
        assert_eq!(workload.len(), 8 + 6 + 6 + 3);
    }

    #[test]
    fn test_pairs_without_queries_contribute_nothing() {
        let mut catalog = QueryCatalog::new();
        catalog
            .register(QueryDefinition::new(
                "only",
                "only query",
                QueryType::Insert,
                Complexity::Medium,
                handler_fn(|_| async { Ok(None) }),
            ))
            .unwrap();

        let selector = WorkloadSelector::from_config(&BenchmarkConfig::default());
        let workload = selector.select(&catalog);

        // insert 25% * medium 35% * 20 = 1.75 -> 2
        assert_eq!(workload.len(), 2);
        assert!(workload.iter().all(|q| q.query_id == "only"));

        assert!(selector.select(&QueryCatalog::new()).is_empty());
    }
}
