//! Deferred restart requests for one pass

/// Pending restarts, deduplicated by service name
///
/// Names drain in the order they were first enqueued. A restart performed
/// during the pass satisfies every request queued before it; later requests
/// queue the service again.
#[derive(Debug, Default)]
pub struct NotificationQueue {
    pending: Vec<(String, Vec<String>)>,
}

impl NotificationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a restart of `service` requested by `rule_id`.
    ///
    /// Returns `true` if the service was not queued yet.
    pub fn enqueue(&mut self, service: &str, rule_id: &str) -> bool {
        if let Some((_, requested_by)) = self.pending.iter_mut().find(|(s, _)| s == service) {
            requested_by.push(rule_id.to_string());
            return false;
        }
        self.pending
            .push((service.to_string(), vec![rule_id.to_string()]));
        true
    }

    /// Record that `service` was just restarted, dropping earlier requests
    pub fn mark_restarted(&mut self, service: &str) {
        self.pending.retain(|(s, _)| s != service);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Consume the queue, yielding `(service, requested_by)` still to restart
    pub fn drain(self) -> impl Iterator<Item = (String, Vec<String>)> {
        self.pending.into_iter()
    }
}
