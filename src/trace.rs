// =============================================================================
// Decision trace ids — 128-bit hex identifiers propagated via thread-local
// =============================================================================
//
// A trace id is established at request start and visible to every log line
// emitted on that thread until the guard drops. The id also rides on a
// tracing span so structured subscribers see it without consulting the
// thread-local.
// =============================================================================

use std::cell::RefCell;

/// 128-bit trace identifier rendered as 32 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceId(String);

impl TraceId {
    /// Generate a fresh random trace id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

thread_local! {
    static CURRENT: RefCell<Option<TraceId>> = const { RefCell::new(None) };
}

/// The trace id currently bound to this thread, if any.
pub fn current() -> Option<TraceId> {
    CURRENT.with(|c| c.borrow().clone())
}

/// Bind `id` to this thread for the lifetime of the returned guard.
///
/// Nested scopes restore the previous id on drop, so a worker that handles
/// a decision inside another traced operation does not lose the outer id.
pub fn scope(id: TraceId) -> TraceScope {
    let previous = CURRENT.with(|c| c.borrow_mut().replace(id));
    TraceScope { previous }
}

/// RAII guard restoring the previously bound trace id on drop.
pub struct TraceScope {
    previous: Option<TraceId>,
}

impl Drop for TraceScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|c| *c.borrow_mut() = previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_32_hex_chars() {
        let id = TraceId::generate();
        assert_eq!(id.as_str().len(), 32);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(TraceId::generate(), TraceId::generate());
    }

    #[test]
    fn scope_binds_and_restores() {
        assert!(current().is_none());
        let outer = TraceId::generate();
        {
            let _g = scope(outer.clone());
            assert_eq!(current(), Some(outer.clone()));

            let inner = TraceId::generate();
            {
                let _g2 = scope(inner.clone());
                assert_eq!(current(), Some(inner));
            }
            // Inner scope dropped — outer id restored.
            assert_eq!(current(), Some(outer.clone()));
        }
        assert!(current().is_none());
    }

    #[test]
    fn scopes_are_thread_independent() {
        let _g = scope(TraceId::generate());
        let handle = std::thread::spawn(|| current().is_none());
        assert!(handle.join().unwrap());
    }
}
