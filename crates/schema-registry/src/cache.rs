// Copyright (c) 2026 kafscope developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::OnceCell;
use tracing::{debug, trace};

use kafscope_types::{MessageSchemaInfo, SchemaId, SchemaInfo};

use crate::{RegistryError, SchemaResolver};

type Lookup = Arc<OnceCell<Option<Arc<SchemaInfo>>>>;

/// Write-once cache in front of a [`SchemaResolver`].
///
/// Resolved schemas stay cached for the lifetime of the cache. Concurrent misses for the
/// same id share a single lookup. Unknown ids and failed lookups are not cached, so they
/// are retried on the next request.
pub struct SchemaCache {
    resolver: Arc<dyn SchemaResolver>,
    entries: RwLock<HashMap<SchemaId, Arc<SchemaInfo>>>,
    in_flight: Mutex<HashMap<SchemaId, Lookup>>,
}

impl SchemaCache {
    pub fn new(resolver: impl SchemaResolver) -> Self {
        Self::from_arc(Arc::new(resolver))
    }

    pub fn from_arc(resolver: Arc<dyn SchemaResolver>) -> Self {
        Self {
            resolver,
            entries: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub async fn get(&self, id: SchemaId) -> Result<Option<Arc<SchemaInfo>>, RegistryError> {
        if let Some(schema) = self.entries.read().get(&id) {
            trace!(schema_id = id, "Schema cache hit");
            return Ok(Some(Arc::clone(schema)));
        }

        let lookup = Arc::clone(self.in_flight.lock().entry(id).or_default());
        let result = lookup
            .get_or_try_init(|| async {
                // a lookup that finished while we were queueing for the lock
                if let Some(schema) = self.entries.read().get(&id) {
                    return Ok(Some(Arc::clone(schema)));
                }
                debug!(schema_id = id, "Resolving schema");
                let schema = self.resolver.resolve(id).await?.map(Arc::new);
                if let Some(schema) = &schema {
                    self.entries
                        .write()
                        .entry(id)
                        .or_insert_with(|| Arc::clone(schema));
                }
                Ok(schema)
            })
            .await
            .cloned();

        // done, successful or not; later callers either hit the map or retry
        let mut in_flight = self.in_flight.lock();
        if in_flight.get(&id).is_some_and(|l| Arc::ptr_eq(l, &lookup)) {
            in_flight.remove(&id);
        }
        drop(in_flight);

        result
    }

    /// Resolves the schemas of a message's key and value.
    ///
    /// Returns `None` when no id is given or neither id resolves. A lookup failure is only
    /// reported when no side could be resolved.
    pub async fn message_schema_info(
        &self,
        key_id: Option<SchemaId>,
        value_id: Option<SchemaId>,
    ) -> Result<Option<MessageSchemaInfo>, RegistryError> {
        let resolve = |id: Option<SchemaId>| async move {
            match id {
                Some(id) => self.get(id).await,
                None => Ok(None),
            }
        };
        let (key, value) = tokio::join!(resolve(key_id), resolve(value_id));

        match (key, value) {
            (Ok(key), Ok(value)) => Ok(MessageSchemaInfo::new(key, value)),
            (Ok(Some(key)), Err(err)) => {
                debug!(%err, "Ignoring value schema lookup failure");
                Ok(MessageSchemaInfo::new(Some(key), None))
            }
            (Err(err), Ok(Some(value))) => {
                debug!(%err, "Ignoring key schema lookup failure");
                Ok(MessageSchemaInfo::new(None, Some(value)))
            }
            (Err(err), _) | (_, Err(err)) => Err(err),
        }
    }
}
