//! Probe leaf components: render counters, last-seen props, instance
//! handles, optional static attributes.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use propflow::component::{
    ComponentSpec, InstanceHandle, Invalidate, Mounted, RefSlot, Rendered,
};
use propflow::scope::Scope;
use propflow_core::error::Result;
use propflow_core::{PropMap, Props};

/// Shared observation record for one probe spec. All instances of the spec
/// write into the same record; tests keep one probe per spec.
#[derive(Default)]
pub struct ProbeState {
    pub renders: Cell<u32>,
    pub updates: Cell<u32>,
    pub attaches: Cell<u32>,
    pub detaches: Cell<u32>,
    pub last_props: RefCell<Option<Props>>,
}

impl ProbeState {
    /// The most recent props the probe saw (mount or update).
    #[must_use]
    pub fn props(&self) -> Option<Props> {
        self.last_props.borrow().clone()
    }
}

/// The handle a mounted probe exposes through ref slots.
pub struct ProbeHandle {
    pub name: String,
}

/// A leaf component spec recording everything that happens to it.
pub struct Probe {
    name: String,
    statics: Option<PropMap>,
    state: Rc<ProbeState>,
}

impl Probe {
    pub fn new(name: impl Into<String>) -> (Rc<Self>, Rc<ProbeState>) {
        let state = Rc::new(ProbeState::default());
        let probe = Rc::new(Self {
            name: name.into(),
            statics: None,
            state: Rc::clone(&state),
        });
        (probe, state)
    }

    /// A probe carrying non-standard static attributes, for hoisting tests.
    pub fn with_statics(name: impl Into<String>, statics: PropMap) -> (Rc<Self>, Rc<ProbeState>) {
        let state = Rc::new(ProbeState::default());
        let probe = Rc::new(Self {
            name: name.into(),
            statics: Some(statics),
            state: Rc::clone(&state),
        });
        (probe, state)
    }
}

impl ComponentSpec for Probe {
    fn display_name(&self) -> &str {
        &self.name
    }

    fn statics(&self) -> Option<&PropMap> {
        self.statics.as_ref()
    }

    fn mount(
        &self,
        props: Props,
        _scope: Rc<Scope>,
        _invalidate: Invalidate,
        _ref_slot: Option<RefSlot>,
    ) -> Result<Box<dyn Mounted>> {
        *self.state.last_props.borrow_mut() = Some(props);
        Ok(Box::new(ProbeInstance {
            state: Rc::clone(&self.state),
            handle: Rc::new(ProbeHandle {
                name: self.name.clone(),
            }),
        }))
    }
}

struct ProbeInstance {
    state: Rc<ProbeState>,
    handle: Rc<ProbeHandle>,
}

impl Mounted for ProbeInstance {
    fn attach(&mut self) {
        self.state.attaches.set(self.state.attaches.get() + 1);
    }

    fn update(&mut self, next_props: Props) {
        self.state.updates.set(self.state.updates.get() + 1);
        *self.state.last_props.borrow_mut() = Some(next_props);
    }

    fn render(&mut self) -> Result<Rendered> {
        self.state.renders.set(self.state.renders.get() + 1);
        Ok(Rendered::leaf())
    }

    fn detach(&mut self) {
        self.state.detaches.set(self.state.detaches.get() + 1);
    }

    fn handle(&self) -> Option<InstanceHandle> {
        Some(Rc::clone(&self.handle) as InstanceHandle)
    }
}
