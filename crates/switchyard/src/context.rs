//! Scoped, per-thread backend override.
//!
//! Within [`with_backend`], new parsers and automatic language loads use the
//! given backend as if it had been requested explicitly. Scopes nest; the
//! innermost wins. Other threads are unaffected.

use std::cell::RefCell;
use std::marker::PhantomData;

use crate::types::BackendKind;

thread_local! {
    static STACK: RefCell<Vec<BackendKind>> = const { RefCell::new(Vec::new()) };
}

/// Run `f` with `kind` as the current thread's backend.
pub fn with_backend<R, F>(kind: BackendKind, f: F) -> R
where
    F: FnOnce() -> R,
{
    let _scope = ScopedBackend::enter(kind);
    f()
}

/// The innermost scoped backend on this thread.
#[must_use]
pub fn current_backend() -> Option<BackendKind> {
    STACK.with(|stack| stack.borrow().last().cloned())
}

/// Guard that keeps a backend override active until dropped.
///
/// Not `Send`: the override belongs to the thread that entered it.
#[derive(Debug)]
pub struct ScopedBackend {
    _thread_bound: PhantomData<*const ()>,
}

impl ScopedBackend {
    /// Push `kind` onto this thread's override stack.
    #[must_use = "the override ends when the guard is dropped"]
    pub fn enter(kind: BackendKind) -> Self {
        STACK.with(|stack| stack.borrow_mut().push(kind));
        Self {
            _thread_bound: PhantomData,
        }
    }
}

impl Drop for ScopedBackend {
    fn drop(&mut self) {
        STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scopes_nest_and_unwind() {
        assert_eq!(current_backend(), None);

        with_backend(BackendKind::TREE_SITTER, || {
            assert_eq!(current_backend(), Some(BackendKind::TREE_SITTER));
            with_backend(BackendKind::GRAMMAR, || {
                assert_eq!(current_backend(), Some(BackendKind::GRAMMAR));
            });
            assert_eq!(current_backend(), Some(BackendKind::TREE_SITTER));
        });

        assert_eq!(current_backend(), None);
    }

    #[test]
    fn override_is_thread_local() {
        with_backend(BackendKind::GRAMMAR, || {
            let seen = std::thread::spawn(current_backend)
                .join()
                .expect("thread should not panic");
            assert_eq!(seen, None);
        });
    }

    #[test]
    fn guard_pops_on_panic() {
        let result = std::panic::catch_unwind(|| {
            with_backend::<(), _>(BackendKind::GRAMMAR, || panic!("boom"));
        });

        assert!(result.is_err());
        assert_eq!(current_backend(), None);
    }
}
