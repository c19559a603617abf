//! Registry of benchmark query definitions.

use std::collections::{BTreeMap, HashMap};

use crate::error::{CoreError, CoreResult};
use crate::query::{Complexity, QueryDefinition, QueryType};

/// Central registry of benchmark queries, kept in registration order.
#[derive(Debug, Clone, Default)]
pub struct QueryCatalog {
    queries: Vec<QueryDefinition>,
    index: HashMap<String, usize>,
}

impl QueryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a query. Identifiers must be unique.
    pub fn register(&mut self, definition: QueryDefinition) -> CoreResult<()> {
        if self.index.contains_key(&definition.query_id) {
            return Err(CoreError::configuration(format!(
                "query `{}` is already registered",
                definition.query_id
            )));
        }
        self.index
            .insert(definition.query_id.clone(), self.queries.len());
        self.queries.push(definition);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, query_id: &str) -> Option<&QueryDefinition> {
        self.index.get(query_id).map(|&i| &self.queries[i])
    }

    #[must_use]
    pub fn all(&self) -> &[QueryDefinition] {
        &self.queries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    #[must_use]
    pub fn by_type(&self, query_type: QueryType) -> Vec<&QueryDefinition> {
        self.queries
            .iter()
            .filter(|q| q.query_type == query_type)
            .collect()
    }

    #[must_use]
    pub fn by_type_and_complexity(
        &self,
        query_type: QueryType,
        complexity: Complexity,
    ) -> Vec<&QueryDefinition> {
        self.queries
            .iter()
            .filter(|q| q.query_type == query_type && q.complexity == complexity)
            .collect()
    }

    #[must_use]
    pub fn count_by_type(&self) -> BTreeMap<QueryType, usize> {
        let mut counts = BTreeMap::new();
        for query in &self.queries {
            *counts.entry(query.query_type).or_insert(0) += 1;
        }
        counts
    }

    #[must_use]
    pub fn count_by_complexity(&self) -> BTreeMap<Complexity, usize> {
        let mut counts = BTreeMap::new();
        for query in &self.queries {
            *counts.entry(query.complexity).or_insert(0) += 1;
        }
        counts
    }
}

impl FromIterator<QueryDefinition> for QueryCatalog {
    /// Later definitions with a duplicate identifier are dropped.
    fn from_iter<I: IntoIterator<Item = QueryDefinition>>(iter: I) -> Self {
        let mut catalog = Self::new();
        for definition in iter {
            if let Err(err) = catalog.register(definition) {
                tracing::warn!(error = %err, "Skipping duplicate query definition");
            }
        }
        catalog
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::handler_fn;

    fn definition(id: &str, query_type: QueryType, complexity: Complexity) -> QueryDefinition {
        QueryDefinition::new(
            id,
            format!("query {id}"),
            query_type,
            complexity,
            handler_fn(|_| async { Ok(None) }),
        )
    }

    #[test]
    fn test_register_and_lookup() {
        let mut catalog = QueryCatalog::new();
        catalog
            .register(definition("S1", QueryType::Select, Complexity::Simple))
            .unwrap();
        catalog
            .register(definition("I1", QueryType::Insert, Complexity::Medium))
            .unwrap();

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("I1").unwrap().complexity, Complexity::Medium);
        assert!(catalog.get("D9").is_none());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut catalog = QueryCatalog::new();
        catalog
            .register(definition("S1", QueryType::Select, Complexity::Simple))
            .unwrap();
        let err = catalog
            .register(definition("S1", QueryType::Delete, Complexity::Complex))
            .unwrap_err();
        assert!(matches!(err, CoreError::Configuration(_)));
    }

    #[test]
    fn test_filters_and_counts() {
        let catalog: QueryCatalog = vec![
            definition("S1", QueryType::Select, Complexity::Simple),
            definition("S2", QueryType::Select, Complexity::Complex),
            definition("U1", QueryType::Update, Complexity::Simple),
        ]
        .into_iter()
        .collect();

        assert_eq!(catalog.by_type(QueryType::Select).len(), 2);
        assert_eq!(
            catalog
                .by_type_and_complexity(QueryType::Select, Complexity::Simple)
                .len(),
            1
        );
        assert_eq!(catalog.count_by_type()[&QueryType::Update], 1);
        assert_eq!(catalog.count_by_complexity()[&Complexity::Simple], 2);
        assert!(!catalog.count_by_type().contains_key(&QueryType::Delete));
    }
}
