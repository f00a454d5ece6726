use crate::error::ClientError;
use crate::instance::Instance;
use crate::parser::credential::Credential;
use crate::parser::workflow::Workflow;
use crate::providers::{ResourceKind, WorkflowSource};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Clone)]
enum Payload {
    Workflows(Vec<Workflow>),
    Credentials(Vec<Credential>),
}

struct Entry {
    stored_at: Instant,
    payload: Payload,
}

type Key = (String, ResourceKind);

/// Short-lived response cache in front of another source.
///
/// Entries are keyed on (instance id, resource kind) and expire after `ttl`.
/// Failed fetches are never cached. Call [`CachedSource::invalidate_instance`]
/// before a user-requested rescan.
pub struct CachedSource<S> {
    inner: S,
    ttl: Duration,
    entries: Mutex<HashMap<Key, Entry>>,
}

impl<S: WorkflowSource> CachedSource<S> {
    pub fn new(inner: S, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<Key, Entry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn get(&self, instance_id: &str, kind: ResourceKind) -> Option<Payload> {
        let mut entries = self.entries();
        let key = (instance_id.to_string(), kind);
        match entries.get(&key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => {
                debug!(instance = instance_id, %kind, "cache hit");
                Some(entry.payload.clone())
            }
            Some(_) => {
                entries.remove(&key);
                None
            }
            None => None,
        }
    }

    fn put(&self, instance_id: &str, kind: ResourceKind, payload: Payload) {
        if self.ttl.is_zero() {
            return;
        }
        self.entries().insert(
            (instance_id.to_string(), kind),
            Entry {
                stored_at: Instant::now(),
                payload,
            },
        );
    }

    /// Drop every cached resource of one instance.
    pub fn invalidate_instance(&self, instance_id: &str) {
        self.entries().retain(|(id, _), _| id != instance_id);
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl<S: WorkflowSource> WorkflowSource for CachedSource<S> {
    async fn list_workflows(&self, instance: &Instance) -> Result<Vec<Workflow>, ClientError> {
        if let Some(Payload::Workflows(workflows)) = self.get(&instance.id, ResourceKind::Workflows) {
            return Ok(workflows);
        }
        let workflows = self.inner.list_workflows(instance).await?;
        self.put(&instance.id, ResourceKind::Workflows, Payload::Workflows(workflows.clone()));
        Ok(workflows)
    }

    async fn list_credentials(&self, instance: &Instance) -> Result<Vec<Credential>, ClientError> {
        if let Some(Payload::Credentials(credentials)) =
            self.get(&instance.id, ResourceKind::Credentials)
        {
            return Ok(credentials);
        }
        let credentials = self.inner.list_credentials(instance).await?;
        self.put(
            &instance.id,
            ResourceKind::Credentials,
            Payload::Credentials(credentials.clone()),
        );
        Ok(credentials)
    }
}
