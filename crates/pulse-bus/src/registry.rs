use crate::{Handler, HandlerToken, topic};
use std::collections::HashMap;

/// Outcome of removing a single handler from a filter.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Removal {
    NotFound,
    Removed,
    RemovedLast,
}

/// Handler registrations shared by every transport implementation.
#[derive(Default)]
pub(crate) struct Registry {
    next_token: u64,
    filters: HashMap<String, Vec<(HandlerToken, Handler)>>,
}

impl Registry {
    /// Returns the token plus whether this was the first handler on the
    /// filter (the transport only needs one subscription per filter).
    pub fn add(&mut self, filter: &str, handler: Handler) -> (HandlerToken, bool) {
        self.next_token += 1;
        let token = HandlerToken::new(self.next_token);
        let handlers = self.filters.entry(filter.to_string()).or_default();
        let first = handlers.is_empty();
        handlers.push((token, handler));
        (token, first)
    }

    pub fn remove_filter(&mut self, filter: &str) -> bool {
        self.filters.remove(filter).is_some()
    }

    pub fn remove_handler(&mut self, filter: &str, token: HandlerToken) -> Removal {
        let Some(handlers) = self.filters.get_mut(filter) else {
            return Removal::NotFound;
        };
        let before = handlers.len();
        handlers.retain(|(candidate, _)| *candidate != token);
        if handlers.len() == before {
            return Removal::NotFound;
        }
        if handlers.is_empty() {
            self.filters.remove(filter);
            return Removal::RemovedLast;
        }
        Removal::Removed
    }

    /// Every handler whose filter matches `topic`, in registration order per
    /// filter. Overlapping filters each contribute their handlers.
    pub fn matching(&self, topic: &str) -> Vec<Handler> {
        let mut handlers = Vec::new();
        for (filter, registered) in &self.filters {
            if topic::matches(filter, topic) {
                handlers.extend(registered.iter().map(|(_, handler)| handler.clone()));
            }
        }
        handlers
    }

    pub fn filters(&self) -> Vec<String> {
        self.filters.keys().cloned().collect()
    }
}
