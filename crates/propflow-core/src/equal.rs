//! Reference and shallow structural equality.
//!
//! The binding layer answers "did this input change" by identity wherever
//! possible and by one-level shallow comparison where a fresh map is built
//! each call. Nothing here recurses into values.

use std::rc::Rc;

use crate::props::{PropValue, Props};

/// Thin-pointer identity for `Rc` handles, including trait objects.
///
/// Only the data pointer is compared. `Rc::ptr_eq` on `dyn` types also
/// compares vtable pointers, which are not unique across codegen units.
#[inline]
#[must_use]
pub fn same_rc<T: ?Sized>(a: &Rc<T>, b: &Rc<T>) -> bool {
    std::ptr::eq(Rc::as_ptr(a).cast::<()>(), Rc::as_ptr(b).cast::<()>())
}

/// One-level shallow equality over two props handles.
///
/// True when the handles are identical, or when both maps carry the same
/// key set and every value pair is reference-identical. Nested structures
/// are compared by reference only.
#[must_use]
pub fn shallow_equal(a: &Props, b: &Props) -> bool {
    if Props::same(a, b) {
        return true;
    }
    if a.len() != b.len() {
        return false;
    }
    a.iter().all(|(key, value)| {
        b.get(key)
            .is_some_and(|other| PropValue::same(value, other))
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
