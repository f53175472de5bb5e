use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic id source with a fixed prefix, e.g. `notification-1`, `notification-2`.
#[derive(Debug)]
pub struct SequentialIds {
    prefix: &'static str,
    next: AtomicU64,
}

impl SequentialIds {
    pub const fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            next: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.prefix, n)
    }
}

/// Sequence number plus a short random suffix: unique across manager instances.
pub fn random_suffixed_id(prefix: &str, seq: u64) -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", prefix, seq, &uuid[..8])
}
