//! Message categories and the per-service queue naming convention.

use crate::codec::BusMessage;
use serde::{Deserialize, Serialize};
use std::fmt;
use storage_queue::{QueueName, QueueRequestOptions};

#[cfg(test)]
#[path = "category_tests.rs"]
mod tests;

/// The four message roles of the bus taxonomy
///
/// Every category maps to exactly one queue per configured endpoint. Servers
/// consume requests and commands and publish events and responses; clients
/// do the mirror image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageCategory {
    Command,
    Event,
    Request,
    Response,
}

impl MessageCategory {
    /// All categories, in the order endpoints report their bindings
    pub const ALL: [MessageCategory; 4] = [
        MessageCategory::Request,
        MessageCategory::Command,
        MessageCategory::Event,
        MessageCategory::Response,
    ];

    /// Suffix appended to the service name when no queue is bound explicitly
    ///
    /// Clients and servers deployed independently locate each other through
    /// these names, so they must never change.
    pub fn queue_suffix(&self) -> &'static str {
        match self {
            Self::Command => "commands",
            Self::Event => "events",
            Self::Request => "requests",
            Self::Response => "responses",
        }
    }

    /// Queue name used when no explicit binding exists: `{service}-{suffix}`
    pub fn default_queue_name(&self, service_name: &str) -> String {
        format!("{}-{}", service_name, self.queue_suffix())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::Event => "event",
            Self::Request => "request",
            Self::Response => "response",
        }
    }
}

impl fmt::Display for MessageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A category resolved to the queue that carries it and the transport
/// options in effect for that queue
#[derive(Debug, Clone, PartialEq)]
pub struct QueueBinding {
    pub category: MessageCategory,
    pub queue: QueueName,
    pub options: Option<QueueRequestOptions>,
}

impl QueueBinding {
    pub fn new(category: MessageCategory, queue: QueueName) -> Self {
        Self {
            category,
            queue,
            options: None,
        }
    }

    pub fn with_options(mut self, options: Option<QueueRequestOptions>) -> Self {
        self.options = options;
        self
    }
}

impl fmt::Display for QueueBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.category, self.queue)
    }
}

/// Message types a service exchanges, one per category
///
/// Implemented by a marker type per service, e.g.
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use storage_queue_bus::MessageTaxonomy;
///
/// #[derive(Serialize, Deserialize)]
/// enum OrderCommand { Place { id: u32 } }
/// #[derive(Serialize, Deserialize)]
/// enum OrderEvent { Placed { id: u32 } }
///
/// struct Orders;
///
/// impl MessageTaxonomy for Orders {
///     type Command = OrderCommand;
///     type Event = OrderEvent;
///     type Request = ();
///     type Response = ();
/// }
/// ```
pub trait MessageTaxonomy: Send + Sync + 'static {
    type Command: BusMessage;
    type Event: BusMessage;
    type Request: BusMessage;
    type Response: BusMessage;
}
