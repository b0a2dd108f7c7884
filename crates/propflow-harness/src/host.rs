//! A miniature retained component tree over the component contract.
//!
//! # Design
//!
//! Each node pairs an element with its mounted instance, its scope, and a
//! dirty flag the node's invalidate hook sets. `mount` renders depth-first
//! and attaches children before their parent; `update` reconciles by spec
//! identity (identical element: bail out; same spec: `update` and
//! re-render; different spec: detach and remount); `flush` re-renders every
//! dirty node; detach runs parent-first.
//!
//! Ref slots are filled after mount for instances that expose a handle and
//! cleared on detach; instances without a handle leave the slot alone, so a
//! wrapper can forward its slot to a descendant.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use propflow::component::{ComponentSpec as _, Element, Invalidate, Mounted, same_spec};
use propflow::scope::Scope;
use propflow_core::error::Result;

type NodeRef = Rc<RefCell<TreeNode>>;

struct TreeNode {
    element: Element,
    instance: Box<dyn Mounted>,
    scope: Rc<Scope>,
    child: Option<NodeRef>,
    dirty: Rc<Cell<bool>>,
    filled_ref: bool,
}

/// The retained tree: one root, single-child nodes all the way down.
pub struct TreeHost {
    scope: Rc<Scope>,
    root: Option<NodeRef>,
}

impl TreeHost {
    #[must_use]
    pub fn new() -> Self {
        Self {
            scope: Scope::root(),
            root: None,
        }
    }

    /// Mount `element` as the root, replacing any current tree.
    pub fn mount(&mut self, element: Element) -> Result<()> {
        self.unmount();
        self.root = Some(mount_node(element, Rc::clone(&self.scope))?);
        Ok(())
    }

    /// Reconcile the root against a new element.
    pub fn update(&mut self, element: Element) -> Result<()> {
        let Some(root) = self.root.clone() else {
            return self.mount(element);
        };
        let (same_element, same_root_spec) = {
            let node = root.borrow();
            (
                Element::same(&node.element, &element),
                same_spec(&node.element.spec, &element.spec),
            )
        };
        if same_element {
            return Ok(());
        }
        if same_root_spec {
            apply_props(&root, element);
            rerender(&root)
        } else {
            self.unmount();
            self.mount(element)
        }
    }

    /// Re-render every node whose invalidate hook fired since the last pass.
    pub fn flush(&mut self) -> Result<()> {
        match &self.root {
            Some(root) => flush_node(&Rc::clone(root)),
            None => Ok(()),
        }
    }

    /// Tear the tree down, parent-first.
    pub fn unmount(&mut self) {
        if let Some(root) = self.root.take() {
            detach_subtree(&root);
        }
    }

    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.root.is_some()
    }
}

impl Default for TreeHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TreeHost {
    fn drop(&mut self) {
        self.unmount();
    }
}

fn mount_node(element: Element, scope: Rc<Scope>) -> Result<NodeRef> {
    let dirty = Rc::new(Cell::new(false));
    let invalidate: Invalidate = {
        let flag = Rc::clone(&dirty);
        Rc::new(move || flag.set(true))
    };
    let mut instance = element.spec.mount(
        element.props.clone(),
        Rc::clone(&scope),
        invalidate,
        element.ref_slot.clone(),
    )?;
    let rendered = instance.render()?;
    let node = Rc::new(RefCell::new(TreeNode {
        element,
        instance,
        scope: Rc::clone(&scope),
        child: None,
        dirty,
        filled_ref: false,
    }));
    if let Some(child_element) = rendered.child {
        let child_scope = rendered.child_scope.unwrap_or(scope);
        let child = mount_node(child_element, child_scope)?;
        node.borrow_mut().child = Some(child);
    }
    {
        let mut inner = node.borrow_mut();
        fill_ref(&mut inner);
        // The whole subtree below is mounted and attached by now.
        inner.instance.attach();
    }
    Ok(node)
}

fn fill_ref(node: &mut TreeNode) {
    if let (Some(slot), Some(handle)) = (&node.element.ref_slot, node.instance.handle()) {
        *slot.borrow_mut() = Some(handle);
        node.filled_ref = true;
    }
}

fn apply_props(node: &NodeRef, next: Element) {
    let mut inner = node.borrow_mut();
    let slot_changed = match (&inner.element.ref_slot, &next.ref_slot) {
        (Some(a), Some(b)) => !Rc::ptr_eq(a, b),
        (None, None) => false,
        _ => true,
    };
    if slot_changed
        && inner.filled_ref
        && let Some(slot) = &inner.element.ref_slot
    {
        *slot.borrow_mut() = None;
        inner.filled_ref = false;
    }
    inner.instance.update(next.props.clone());
    inner.element = next;
    if slot_changed {
        fill_ref(&mut inner);
    }
}

fn rerender(node: &NodeRef) -> Result<()> {
    let (rendered, scope) = {
        let mut inner = node.borrow_mut();
        inner.dirty.set(false);
        let rendered = inner.instance.render()?;
        (rendered, Rc::clone(&inner.scope))
    };
    let child_scope = rendered.child_scope.unwrap_or(scope);
    let existing = node.borrow_mut().child.take();
    let child = reconcile_child(existing, rendered.child, child_scope)?;
    node.borrow_mut().child = child;
    Ok(())
}

fn reconcile_child(
    existing: Option<NodeRef>,
    next: Option<Element>,
    scope: Rc<Scope>,
) -> Result<Option<NodeRef>> {
    match (existing, next) {
        (None, None) => Ok(None),
        (Some(child), None) => {
            detach_subtree(&child);
            Ok(None)
        }
        (None, Some(element)) => Ok(Some(mount_node(element, scope)?)),
        (Some(child), Some(element)) => {
            let (same_element, same_child_spec) = {
                let inner = child.borrow();
                (
                    Element::same(&inner.element, &element),
                    same_spec(&inner.element.spec, &element.spec),
                )
            };
            if same_element {
                // Identical element: skip the subtree. Dirty descendants
                // are the flush pass's job.
                Ok(Some(child))
            } else if same_child_spec {
                apply_props(&child, element);
                rerender(&child)?;
                Ok(Some(child))
            } else {
                detach_subtree(&child);
                Ok(Some(mount_node(element, scope)?))
            }
        }
    }
}

fn flush_node(node: &NodeRef) -> Result<()> {
    if node.borrow().dirty.get() {
        tracing::trace!(target: "propflow::harness", "re-rendering invalidated node");
        rerender(node)?;
    }
    let child = node.borrow().child.clone();
    if let Some(child) = child {
        flush_node(&child)?;
    }
    Ok(())
}

fn detach_subtree(node: &NodeRef) {
    let child = {
        let mut inner = node.borrow_mut();
        if inner.filled_ref
            && let Some(slot) = &inner.element.ref_slot
        {
            *slot.borrow_mut() = None;
        }
        inner.filled_ref = false;
        inner.instance.detach();
        inner.child.take()
    };
    if let Some(child) = child {
        detach_subtree(&child);
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
