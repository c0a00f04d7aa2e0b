// src/handler.rs
// Handler signatures, action outcomes and the records handed to subscribers.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::{ActionContext, GettersView};

/// Boxed error carried out of action handlers and subscriber hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Mutation handler: receives the module's own state slice and the payload.
///
/// Mutations run synchronously under the state write lock and must not
/// suspend or re-enter the store.
pub type MutationFn = dyn Fn(&mut Value, Option<Value>) + Send + Sync;

/// Action handler: receives the namespace-scoped [`ActionContext`] and the
/// payload, and yields an [`ActionOutcome`].
pub type ActionFn = dyn Fn(ActionContext, Option<Value>) -> ActionOutcome + Send + Sync;

/// Getter: `(local_state, local_getters, root_state, root_getters)` to a
/// derived value, re-evaluated on every access.
pub type GetterFn = dyn Fn(&Value, &GettersView, &Value, &GettersView) -> Value + Send + Sync;

/// Mutation subscriber, notified after every commit with the mutation record
/// and the current root state.
pub type SubscriberFn = dyn Fn(&MutationRecord, &Value) + Send + Sync;

/// Action subscriber hook (`before` or `after`). Hook failures are logged at
/// the call site and never abort the dispatch in progress.
pub type ActionHookFn = dyn Fn(&ActionRecord, &Value) -> Result<(), BoxError> + Send + Sync;

/// Result of an action handler: an immediate value or a deferred computation.
///
/// Every outcome is normalized to the deferred variant before the dispatch
/// combinator sees it, so dispatch only ever deals with one case.
pub enum ActionOutcome {
    /// The handler finished synchronously with this value.
    Value(Value),
    /// The handler produced deferred work to drive on the runtime.
    Future(BoxFuture<'static, Result<Value, BoxError>>),
}

impl ActionOutcome {
    /// Wrap deferred work as an outcome.
    pub fn future<F>(fut: F) -> Self
    where
        F: std::future::Future<Output = Result<Value, BoxError>> + Send + 'static,
    {
        ActionOutcome::Future(Box::pin(fut))
    }

    /// An immediate failure.
    pub fn error(err: impl Into<BoxError>) -> Self {
        let err = err.into();
        ActionOutcome::Future(Box::pin(futures::future::ready(Err(err))))
    }

    pub(crate) fn into_future(self) -> BoxFuture<'static, Result<Value, BoxError>> {
        match self {
            ActionOutcome::Value(value) => Box::pin(futures::future::ready(Ok(value))),
            ActionOutcome::Future(fut) => fut,
        }
    }
}

impl From<Value> for ActionOutcome {
    fn from(value: Value) -> Self {
        ActionOutcome::Value(value)
    }
}

impl From<()> for ActionOutcome {
    fn from(_: ()) -> Self {
        ActionOutcome::Value(Value::Null)
    }
}

/// Record handed to mutation subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationRecord {
    pub mutation_type: String,
    pub payload: Option<Value>,
}

/// Record handed to action subscriber hooks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub action_type: String,
    pub payload: Option<Value>,
}

/// Failure of a dispatched action, delivered through the dispatch future.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The original handler failure, propagated unchanged.
    #[error("{0}")]
    Handler(BoxError),

    /// A spawned handler task died before settling (panic or shutdown).
    #[error("action handler task failed: {0}")]
    Join(String),
}

/// Future returned by `dispatch`: settles once every handler for the
/// dispatched type has settled.
pub type DispatchFuture = BoxFuture<'static, Result<Value, DispatchError>>;
