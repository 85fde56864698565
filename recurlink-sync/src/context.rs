//! Request-scoped state threaded through one inbound request.
//!
//! Nothing here outlives the request: the cache is dropped with the context,
//! so a long-lived process never serves one request's lookups to the next.

use recurlink_core::types::EventType;
use recurlink_core::Settings;

use crate::listeners::Listeners;
use crate::ports::ExternalRecordClient;

/// Caller-supplied switches for a reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Hard-delete unmatched records instead of disabling and orphaning them.
    pub delete_unused: bool,
    /// Event type used when the sequence has none the CRM offers.
    pub default_event_type: Option<u64>,
}

impl From<&Settings> for ReconcileOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            delete_unused: settings.delete_unused,
            default_event_type: settings.default_event_type,
        }
    }
}

/// Memoized CRM lookups for the lifetime of one request.
#[derive(Debug, Default)]
pub struct RequestCache {
    event_types: Option<Vec<EventType>>,
}

impl RequestCache {
    /// Event types offered by the CRM, fetched at most once per request.
    /// A failed fetch is logged and not cached.
    pub fn event_types<C: ExternalRecordClient>(&mut self, client: &C) -> &[EventType] {
        if self.event_types.is_none() {
            match client.event_types() {
                Ok(types) => self.event_types = Some(types),
                Err(err) => {
                    tracing::warn!("could not load event types: {err}");
                    return &[];
                }
            }
        }
        self.event_types.as_deref().unwrap_or(&[])
    }
}

#[derive(Debug, Default)]
pub struct RequestContext {
    pub options: ReconcileOptions,
    pub listeners: Listeners,
    pub cache: RequestCache,
}

impl RequestContext {
    pub fn new(options: ReconcileOptions) -> Self {
        Self {
            options,
            listeners: Listeners::new(),
            cache: RequestCache::default(),
        }
    }

    /// Context sharing an existing listener registry, e.g. one the host
    /// dispatcher also consults.
    pub fn with_listeners(options: ReconcileOptions, listeners: Listeners) -> Self {
        Self {
            options,
            listeners,
            cache: RequestCache::default(),
        }
    }
}
