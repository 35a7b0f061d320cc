//! In-memory doubles for the control plane
//!
//! [`FakeCloud`] implements [`ClientFactory`] over a map of resources and
//! records every call it receives, so tests can assert on ordering and on
//! what was never sent. [`ScriptedOperation`] plays back a fixed sequence of
//! statuses.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};

use crate::client::{AuthError, ClientFactory, ResourceClient, ResourceKind, check_scope};
use crate::config::AzureCredentials;
use crate::error::{CoreError, Result};
use crate::operation::{OperationHandle, OperationStatus, ProviderError};

/// Kubeconfig served by [`FakeCloud`] for `listClusterAdminCredential`
pub const FAKE_KUBECONFIG: &str = "apiVersion: v1\nkind: Config\nclusters: []\n";

/// Credentials that pass validation
pub fn fake_credentials() -> AzureCredentials {
    AzureCredentials::new("app-id", "client-secret", "sub-123").with_tenant("tenant-id")
}

// =============================================================================
// ScriptedOperation
// =============================================================================

/// Shared count of `poll()` calls
#[derive(Debug, Clone, Default)]
pub struct PollCounter(Arc<AtomicUsize>);

impl PollCounter {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Operation that returns a scripted sequence of statuses
pub struct ScriptedOperation {
    description: String,
    pending: usize,
    script: VecDeque<OperationStatus>,
    polls: PollCounter,
}

impl ScriptedOperation {
    /// Play back `script` in order; the last status repeats
    pub fn new(description: &str, script: Vec<OperationStatus>) -> (Self, PollCounter) {
        let polls = PollCounter::default();
        let op = Self {
            description: description.to_string(),
            pending: 0,
            script: script.into(),
            polls: polls.clone(),
        };
        (op, polls)
    }

    /// Report in-progress `pending` times, then `last`
    pub fn in_progress_then(
        description: &str,
        pending: usize,
        last: OperationStatus,
    ) -> (Self, PollCounter) {
        let (mut op, polls) = Self::new(description, vec![last]);
        op.pending = pending;
        (op, polls)
    }
}

#[async_trait]
impl OperationHandle for ScriptedOperation {
    fn describe(&self) -> &str {
        &self.description
    }

    async fn poll(&mut self) -> Result<OperationStatus> {
        self.polls.0.fetch_add(1, Ordering::SeqCst);
        if self.pending > 0 {
            self.pending -= 1;
            return Ok(OperationStatus::in_progress());
        }
        let status = if self.script.len() > 1 {
            self.script.pop_front()
        } else {
            self.script.front().cloned()
        };
        Ok(status.unwrap_or(OperationStatus::Succeeded(None)))
    }
}

// =============================================================================
// FakeCloud
// =============================================================================

/// A call observed by [`FakeCloud`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ClientFor {
        kind: ResourceKind,
        scope: Option<String>,
    },
    CreateOrUpdate {
        kind: ResourceKind,
        name: String,
    },
    /// A create, update or delete operation reported success
    OperationCompleted {
        kind: ResourceKind,
        name: String,
    },
    Get {
        kind: ResourceKind,
        name: String,
    },
    Delete {
        kind: ResourceKind,
        name: String,
    },
    Action {
        kind: ResourceKind,
        name: String,
        action: String,
    },
}

impl Call {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Call::ClientFor { kind, .. }
            | Call::CreateOrUpdate { kind, .. }
            | Call::OperationCompleted { kind, .. }
            | Call::Get { kind, .. }
            | Call::Delete { kind, .. }
            | Call::Action { kind, .. } => *kind,
        }
    }

    /// True for calls that reach the provider (everything but client construction)
    pub fn is_remote(&self) -> bool {
        !matches!(self, Call::ClientFor { .. } | Call::OperationCompleted { .. })
    }
}

type ResourceKey = (ResourceKind, Option<String>, String);

#[derive(Default)]
struct FakeState {
    calls: Vec<Call>,
    resources: HashMap<ResourceKey, Value>,
    reject_credentials: bool,
    failures: HashMap<ResourceKind, ProviderError>,
    pending_polls: usize,
    empty_kubeconfigs: bool,
    omit_ids: Vec<ResourceKind>,
}

/// In-memory control plane
#[derive(Clone, Default)]
pub struct FakeCloud {
    state: Arc<Mutex<FakeState>>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every operation reports in-progress `polls` times before finishing
    #[must_use]
    pub fn with_pending_polls(self, polls: usize) -> Self {
        self.lock().pending_polls = polls;
        self
    }

    /// Operations on `kind` end in `error`
    #[must_use]
    pub fn failing(self, kind: ResourceKind, error: ProviderError) -> Self {
        self.lock().failures.insert(kind, error);
        self
    }

    /// Client construction fails as if the identity provider refused the secret
    #[must_use]
    pub fn rejecting_credentials(self) -> Self {
        self.lock().reject_credentials = true;
        self
    }

    /// `listClusterAdminCredential` returns an empty list
    #[must_use]
    pub fn with_empty_kubeconfigs(self) -> Self {
        self.lock().empty_kubeconfigs = true;
        self
    }

    /// Successful creates of `kind` return a payload without an id
    #[must_use]
    pub fn omitting_ids_for(self, kind: ResourceKind) -> Self {
        self.lock().omit_ids.push(kind);
        self
    }

    /// Store a resource directly, bypassing the call log
    pub fn seed(&self, kind: ResourceKind, scope: Option<&str>, name: &str, value: Value) {
        self.lock()
            .resources
            .insert((kind, scope.map(str::to_string), name.to_string()), value);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Calls that reached the provider
    pub fn remote_calls(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_remote).collect()
    }

    pub fn resource(&self, kind: ResourceKind, scope: Option<&str>, name: &str) -> Option<Value> {
        self.lock()
            .resources
            .get(&(kind, scope.map(str::to_string), name.to_string()))
            .cloned()
    }

    pub fn resource_count(&self) -> usize {
        self.lock().resources.len()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        // A panicking test thread poisons the lock; the data is still usable
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, call: Call) {
        self.lock().calls.push(call);
    }
}

#[async_trait]
impl ClientFactory for FakeCloud {
    async fn client_for(
        &self,
        kind: ResourceKind,
        credentials: &AzureCredentials,
        scope: Option<&str>,
    ) -> Result<Arc<dyn ResourceClient>> {
        self.record(Call::ClientFor {
            kind,
            scope: scope.map(str::to_string),
        });
        let principal = credentials.validated()?;
        check_scope(kind, scope).map_err(|source| CoreError::ClientConstruction { kind, source })?;
        if self.lock().reject_credentials {
            return Err(CoreError::ClientConstruction {
                kind,
                source: AuthError::Rejected(format!(
                    "AADSTS7000215: Invalid client secret provided for '{}'",
                    principal.client_id
                )),
            });
        }
        Ok(Arc::new(FakeClient {
            cloud: self.clone(),
            kind,
            scope: scope.map(str::to_string),
            subscription: principal.subscription_id.to_string(),
        }))
    }
}

struct FakeClient {
    cloud: FakeCloud,
    kind: ResourceKind,
    scope: Option<String>,
    subscription: String,
}

impl FakeClient {
    fn key(&self, name: &str) -> ResourceKey {
        (self.kind, self.scope.clone(), name.to_string())
    }

    fn id_for(&self, name: &str) -> String {
        match (self.kind.provider_path(), &self.scope) {
            (Some(path), Some(group)) => format!(
                "/subscriptions/{}/resourceGroups/{}/providers/{}/{}",
                self.subscription, group, path, name
            ),
            _ => format!("/subscriptions/{}/resourceGroups/{}", self.subscription, name),
        }
    }

    fn describe(&self, verb: &str, name: &str) -> String {
        format!("{} {} '{}'", verb, self.kind, name)
    }

    fn not_found(&self, name: &str) -> CoreError {
        CoreError::NotFound {
            resource: format!("{} '{}'", self.kind, name),
        }
    }

    fn operation(&self, description: String, effect: Effect) -> Box<dyn OperationHandle> {
        let state = self.cloud.lock();
        let outcome = match state.failures.get(&self.kind) {
            Some(error) => Outcome::Fail(error.clone()),
            None => Outcome::Apply(effect),
        };
        Box::new(FakeOperation {
            cloud: self.cloud.clone(),
            kind: self.kind,
            description,
            pending: state.pending_polls,
            outcome: Some(outcome),
        })
    }
}

#[async_trait]
impl ResourceClient for FakeClient {
    fn kind(&self) -> ResourceKind {
        self.kind
    }

    async fn create_or_update(
        &self,
        name: &str,
        properties: Value,
    ) -> Result<Box<dyn OperationHandle>> {
        self.cloud.record(Call::CreateOrUpdate {
            kind: self.kind,
            name: name.to_string(),
        });

        let mut resource = match properties {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        resource.insert("name".to_string(), json!(name));
        if !self.cloud.lock().omit_ids.contains(&self.kind) {
            resource.insert("id".to_string(), json!(self.id_for(name)));
        }

        Ok(self.operation(
            self.describe("create", name),
            Effect::Store(self.key(name), Value::Object(resource)),
        ))
    }

    async fn get(&self, name: &str) -> Result<Value> {
        self.cloud.record(Call::Get {
            kind: self.kind,
            name: name.to_string(),
        });
        self.cloud
            .lock()
            .resources
            .get(&self.key(name))
            .cloned()
            .ok_or_else(|| self.not_found(name))
    }

    async fn delete(&self, name: &str) -> Result<Box<dyn OperationHandle>> {
        self.cloud.record(Call::Delete {
            kind: self.kind,
            name: name.to_string(),
        });
        if !self.cloud.lock().resources.contains_key(&self.key(name)) {
            return Err(self.not_found(name));
        }
        Ok(self.operation(self.describe("delete", name), Effect::Remove(self.key(name))))
    }

    async fn action(&self, name: &str, action: &str) -> Result<Value> {
        self.cloud.record(Call::Action {
            kind: self.kind,
            name: name.to_string(),
            action: action.to_string(),
        });
        let state = self.cloud.lock();
        if !state.resources.contains_key(&self.key(name)) {
            return Err(self.not_found(name));
        }
        match action {
            "listClusterAdminCredential" if state.empty_kubeconfigs => Ok(json!({ "kubeconfigs": [] })),
            "listClusterAdminCredential" => Ok(json!({
                "kubeconfigs": [
                    { "name": "clusterAdmin", "value": STANDARD.encode(FAKE_KUBECONFIG) }
                ]
            })),
            other => Err(CoreError::ProviderOperation {
                operation: format!("{} on {}", other, self.describe("action", name)),
                source: ProviderError::new("InvalidAction", format!("unknown action '{}'", other)),
            }),
        }
    }
}

enum Effect {
    Store(ResourceKey, Value),
    Remove(ResourceKey),
}

enum Outcome {
    Apply(Effect),
    Fail(ProviderError),
}

struct FakeOperation {
    cloud: FakeCloud,
    kind: ResourceKind,
    description: String,
    pending: usize,
    outcome: Option<Outcome>,
}

#[async_trait]
impl OperationHandle for FakeOperation {
    fn describe(&self) -> &str {
        &self.description
    }

    async fn poll(&mut self) -> Result<OperationStatus> {
        if self.pending > 0 {
            self.pending -= 1;
            return Ok(OperationStatus::InProgress(Some("Creating".to_string())));
        }

        let status = match self.outcome.take() {
            Some(Outcome::Fail(error)) => OperationStatus::Failed(error),
            Some(Outcome::Apply(effect)) => {
                let (name, payload) = self.apply(effect);
                self.cloud.record(Call::OperationCompleted {
                    kind: self.kind,
                    name,
                });
                OperationStatus::Succeeded(payload)
            }
            None => OperationStatus::Succeeded(None),
        };
        Ok(status)
    }
}

impl FakeOperation {
    fn apply(&self, effect: Effect) -> (String, Option<Value>) {
        let mut state = self.cloud.lock();
        match effect {
            Effect::Store(key, value) => {
                let name = key.2.clone();
                state.resources.insert(key, value.clone());
                (name, Some(value))
            }
            Effect::Remove(key) => {
                // Deleting a group takes everything scoped to it
                if key.0 == ResourceKind::ResourceGroup {
                    let group = key.2.clone();
                    state
                        .resources
                        .retain(|(_, scope, _), _| scope.as_deref() != Some(group.as_str()));
                }
                let name = key.2.clone();
                state.resources.remove(&key);
                (name, None)
            }
        }
    }
}
