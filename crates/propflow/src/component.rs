//! Minimal contract with the UI engine.
//!
//! The binding layer does not render anything itself; it produces wrapper
//! components that any host implementing this contract can mount. The
//! contract is deliberately small: a spec that can be instantiated, a
//! mounted instance with lifecycle hooks, identity-comparable elements so a
//! host can bail out of unchanged subtrees, and an opaque instance handle
//! for ref forwarding.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use propflow_core::equal::same_rc;
use propflow_core::error::Result;
use propflow_core::{PropMap, Props};

use crate::scope::Scope;

/// Opaque handle to a mounted instance, forwarded through wrappers.
pub type InstanceHandle = Rc<dyn Any>;

/// Slot a host fills with the mounted instance's handle (when it exposes
/// one) and clears on detach.
pub type RefSlot = Rc<RefCell<Option<InstanceHandle>>>;

/// Allocate an empty ref slot.
#[must_use]
pub fn ref_slot() -> RefSlot {
    Rc::new(RefCell::new(None))
}

/// Host-provided request to re-render the node's subtree. Safe to call at
/// any time after mount; calls after detach are no-ops.
pub type Invalidate = Rc<dyn Fn()>;

/// A component spec plus the props for one use of it.
#[derive(Clone)]
pub struct Element {
    pub spec: Rc<dyn ComponentSpec>,
    pub props: Props,
    pub ref_slot: Option<RefSlot>,
}

impl Element {
    #[must_use]
    pub fn new(spec: Rc<dyn ComponentSpec>, props: impl Into<Props>) -> Self {
        Self {
            spec,
            props: props.into(),
            ref_slot: None,
        }
    }

    #[must_use]
    pub fn with_ref(mut self, slot: RefSlot) -> Self {
        self.ref_slot = Some(slot);
        self
    }

    /// Identity equality: same spec, same props handle, same ref slot.
    /// Hosts may skip the whole subtree for an identical element.
    #[must_use]
    pub fn same(a: &Self, b: &Self) -> bool {
        if !same_spec(&a.spec, &b.spec) || !Props::same(&a.props, &b.props) {
            return false;
        }
        match (&a.ref_slot, &b.ref_slot) {
            (None, None) => true,
            (Some(x), Some(y)) => Rc::ptr_eq(x, y),
            _ => false,
        }
    }
}

impl std::fmt::Debug for Element {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Element")
            .field("spec", &self.spec.display_name())
            .field("props", &self.props.len())
            .finish()
    }
}

/// Spec identity (thin-pointer comparison).
#[inline]
#[must_use]
pub fn same_spec(a: &Rc<dyn ComponentSpec>, b: &Rc<dyn ComponentSpec>) -> bool {
    same_rc(a, b)
}

/// What one render pass produced: at most one child element, optionally
/// under an extended scope (producers extend, everyone else inherits).
pub struct Rendered {
    pub child: Option<Element>,
    pub child_scope: Option<Rc<Scope>>,
}

impl Rendered {
    /// A leaf: nothing below this node.
    #[must_use]
    pub fn leaf() -> Self {
        Self {
            child: None,
            child_scope: None,
        }
    }

    /// A single child under the inherited scope.
    #[must_use]
    pub fn child(element: Element) -> Self {
        Self {
            child: Some(element),
            child_scope: None,
        }
    }

    /// A single child under an extended scope.
    #[must_use]
    pub fn child_in_scope(element: Element, scope: Rc<Scope>) -> Self {
        Self {
            child: Some(element),
            child_scope: Some(scope),
        }
    }
}

/// A component type: how to name it, what static attributes it carries, and
/// how to create a mounted instance.
pub trait ComponentSpec {
    /// Name used in diagnostics and error messages.
    fn display_name(&self) -> &str;

    /// Non-standard static attributes carried by the component type, for
    /// downstream tooling. Wrappers copy these from the wrapped component.
    fn statics(&self) -> Option<&PropMap> {
        None
    }

    /// Create a mounted instance. Configuration errors (for example a
    /// missing provider) surface here, during the first render pass.
    fn mount(
        &self,
        props: Props,
        scope: Rc<Scope>,
        invalidate: Invalidate,
        ref_slot: Option<RefSlot>,
    ) -> Result<Box<dyn Mounted>>;
}

/// A live instance in the tree.
pub trait Mounted {
    /// Called once, after this node and its whole subtree mounted.
    fn attach(&mut self) {}

    /// New props arrived from the parent. The host renders again afterwards.
    fn update(&mut self, next_props: Props);

    /// Produce the child for the current inputs.
    fn render(&mut self) -> Result<Rendered>;

    /// Called before the subtree is torn down. Must leave the instance
    /// inert: notifications arriving afterwards are no-ops.
    fn detach(&mut self) {}

    /// Opaque handle exposed to ref slots, if any.
    fn handle(&self) -> Option<InstanceHandle> {
        None
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use propflow_core::props;

    struct Null;

    impl ComponentSpec for Null {
        fn display_name(&self) -> &str {
            "Null"
        }
        fn mount(
            &self,
            _props: Props,
            _scope: Rc<Scope>,
            _invalidate: Invalidate,
            _ref_slot: Option<RefSlot>,
        ) -> Result<Box<dyn Mounted>> {
            Ok(Box::new(NullInstance))
        }
    }

    struct NullInstance;

    impl Mounted for NullInstance {
        fn update(&mut self, _next_props: Props) {}
        fn render(&mut self) -> Result<Rendered> {
            Ok(Rendered::leaf())
        }
    }

    #[test]
    fn element_identity_requires_spec_and_props() {
        let spec: Rc<dyn ComponentSpec> = Rc::new(Null);
        let props = props! { "x" => 1u32 }.freeze();

        let a = Element::new(spec.clone(), props.clone());
        let b = Element::new(spec.clone(), props.clone());
        assert!(Element::same(&a, &b));

        let other_props = Element::new(spec.clone(), props! { "x" => 1u32 });
        assert!(!Element::same(&a, &other_props));

        let other_spec: Rc<dyn ComponentSpec> = Rc::new(Null);
        let c = Element::new(other_spec, props);
        assert!(!Element::same(&a, &c));
    }

    #[test]
    fn ref_slot_participates_in_identity() {
        let spec: Rc<dyn ComponentSpec> = Rc::new(Null);
        let props = props! {}.freeze();
        let slot = ref_slot();

        let plain = Element::new(spec.clone(), props.clone());
        let with_slot = Element::new(spec.clone(), props.clone()).with_ref(slot.clone());
        let with_same_slot = Element::new(spec, props).with_ref(slot);

        assert!(!Element::same(&plain, &with_slot));
        assert!(Element::same(&with_slot, &with_same_slot));
    }
}
