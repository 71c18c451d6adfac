/// A generic RAII scope guard running a closure on drop
pub struct ScopeGuard<T, F: FnOnce(T)>(Option<ScopeGuardInner<T, F>>);

struct ScopeGuardInner<T, F: FnOnce(T)> {
    value: T,
    on_drop_fn: F,
}

impl<T, F: FnOnce(T)> ScopeGuard<T, F> {
    pub fn new(value: T, on_drop_fn: F) -> Self {
        Self(Some(ScopeGuardInner { value, on_drop_fn }))
    }

    /// Disarms the guard, returning the value without running the closure.
    pub fn defuse(mut self) -> T {
        self.0.take().expect("always Some").value
    }
}

impl<T, F: FnOnce(T)> AsRef<T> for ScopeGuard<T, F> {
    fn as_ref(&self) -> &T {
        &self.0.as_ref().expect("always Some").value
    }
}

impl<T, F: FnOnce(T)> Drop for ScopeGuard<T, F> {
    fn drop(&mut self) {
        if let Some(inner) = self.0.take() {
            (inner.on_drop_fn)(inner.value)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn runs_on_drop() {
        let released = Cell::new(None);

        {
            let guard = ScopeGuard::new(7, |value| released.set(Some(value)));
            assert_eq!(*guard.as_ref(), 7);
            assert_eq!(released.get(), None);
        }

        assert_eq!(released.get(), Some(7));
    }

    #[test]
    fn defused_guard_does_not_run() {
        let released = Cell::new(false);

        let guard = ScopeGuard::new((), |()| released.set(true));
        guard.defuse();

        assert!(!released.get());
    }
}
