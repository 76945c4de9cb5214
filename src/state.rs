use std::sync::Arc;
use std::time::{Instant, SystemTime};

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::db::TopicStore;
use crate::services::domain_classifier::DomainTaxonomies;
use crate::services::topic_aggregator::AggregationOptions;

#[derive(Clone)]
pub struct AppState {
    started_at: Instant,
    started_at_system: SystemTime,
    store: Arc<dyn TopicStore>,
    taxonomies: Arc<DomainTaxonomies>,
    aggregation: AggregationOptions,
    selection_seed: Option<u64>,
}

impl AppState {
    pub fn new(store: Arc<dyn TopicStore>, taxonomies: Arc<DomainTaxonomies>) -> Self {
        Self {
            started_at: Instant::now(),
            started_at_system: SystemTime::now(),
            store,
            taxonomies,
            aggregation: AggregationOptions::default(),
            selection_seed: None,
        }
    }

    pub fn with_aggregation(mut self, options: AggregationOptions) -> Self {
        self.aggregation = options;
        self
    }

    pub fn with_selection_seed(mut self, seed: Option<u64>) -> Self {
        self.selection_seed = seed;
        self
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn started_at_system(&self) -> SystemTime {
        self.started_at_system
    }

    pub fn store(&self) -> Arc<dyn TopicStore> {
        Arc::clone(&self.store)
    }

    pub fn taxonomies(&self) -> Arc<DomainTaxonomies> {
        Arc::clone(&self.taxonomies)
    }

    pub fn aggregation(&self) -> &AggregationOptions {
        &self.aggregation
    }

    /// Random source for one selection request.
    pub fn selection_rng(&self) -> StdRng {
        match self.selection_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        }
    }
}
