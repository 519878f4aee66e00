//! The handler registry (§4.2 step 4, §9): a mapping from `type` string to
//! a handler capability. The processor is generic over handlers — it never
//! matches on event type itself.

use std::collections::HashMap;
use std::sync::Arc;

use crate::envelope::EventType;
use crate::handlers::Handler;

#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, event_type: EventType, handler: Arc<dyn Handler>) {
        self.handlers.insert(event_type.as_str().to_string(), handler);
    }

    pub fn get(&self, event_type_raw: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(event_type_raw).cloned()
    }
}
