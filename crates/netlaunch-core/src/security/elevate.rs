//! Running code under an explicit capability set.
//!
//! [`with_capability`] pushes a permission set for the duration of a closure
//! on the current thread; [`check`] consults the innermost one. A thread
//! with no active set is host code and passes every check.

use std::cell::RefCell;
use std::sync::Arc;

use thiserror::Error;

use super::{Permission, PermissionSet};

thread_local! {
    static ACTIVE: RefCell<Vec<Arc<PermissionSet>>> = const { RefCell::new(Vec::new()) };
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("access denied: {0}")]
pub struct AccessDenied(pub Permission);

/// Pops the set on drop, so a panicking closure still unwinds the stack.
struct Frame;

impl Drop for Frame {
    fn drop(&mut self) {
        ACTIVE.with(|a| {
            a.borrow_mut().pop();
        });
    }
}

/// Runs `f` with `set` as the active capability set on this thread.
pub fn with_capability<R>(set: Arc<PermissionSet>, f: impl FnOnce() -> R) -> R {
    ACTIVE.with(|a| a.borrow_mut().push(set));
    let _frame = Frame;
    f()
}

/// Innermost active set, if any.
pub fn current() -> Option<Arc<PermissionSet>> {
    ACTIVE.with(|a| a.borrow().last().cloned())
}

pub fn check(perm: &Permission) -> Result<(), AccessDenied> {
    match current() {
        Some(set) if !set.implies(perm) => Err(AccessDenied(perm.clone())),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_code_is_unrestricted() {
        assert!(current().is_none());
        assert!(check(&Permission::read_file("/etc/passwd")).is_ok());
    }

    #[test]
    fn innermost_set_applies_and_unwinds() {
        let sandbox = Arc::new(PermissionSet::sandbox(Some("a.example.com")));
        let all = Arc::new(PermissionSet::all());
        with_capability(sandbox, || {
            assert!(check(&Permission::connect("a.example.com")).is_ok());
            let denied = check(&Permission::connect("b.example.com")).unwrap_err();
            assert_eq!(denied.0, Permission::connect("b.example.com"));
            with_capability(all, || {
                assert!(check(&Permission::connect("b.example.com")).is_ok());
            });
            assert!(check(&Permission::connect("b.example.com")).is_err());
        });
        assert!(current().is_none());
    }

    #[test]
    fn panic_inside_closure_pops_the_set() {
        let set = Arc::new(PermissionSet::new());
        let r = std::panic::catch_unwind(|| with_capability(set, || panic!("boom")));
        assert!(r.is_err());
        assert!(current().is_none());
    }
}
