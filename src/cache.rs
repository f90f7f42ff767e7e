use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;

use crate::schema::XsdSchema;

/// In-memory cache for schemas compiled from discovered locations
///
/// Keys combine the document base with the hinted location, so the same
/// relative hint in documents from different directories stays distinct.
#[derive(Clone)]
pub struct ParsedSchemaCache {
    cache: Cache<String, Arc<XsdSchema>>,
}

impl ParsedSchemaCache {
    pub fn new(max_capacity: u64, time_to_live: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(time_to_live)
            .build();

        Self { cache }
    }

    pub fn key(base: Option<&url::Url>, location: &str) -> String {
        match base {
            Some(base) => format!("{}|{}", base, location),
            None => format!("|{}", location),
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<XsdSchema>> {
        self.cache.get(key)
    }

    pub fn insert(&self, key: String, schema: Arc<XsdSchema>) {
        self.cache.insert(key, schema);
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }
}

impl std::fmt::Debug for ParsedSchemaCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParsedSchemaCache")
            .field("entry_count", &self.cache.entry_count())
            .finish()
    }
}
