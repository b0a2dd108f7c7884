//! Provider placement, channels, refs, statics, and teardown behavior.

use std::rc::Rc;

use propflow::component::{ComponentSpec, Element, ref_slot};
use propflow::connect::{ConnectOptions, connect};
use propflow::provider::Provider;
use propflow::scope::Channel;
use propflow::wrap::{MapDispatch, StateProjection};
use propflow_core::store::snapshot;
use propflow_core::{BindError, PropMap, Store, props};
use propflow_harness::{MemoryStore, Probe, ProbeHandle, TreeHost};

fn counter_store(initial: u32) -> Rc<MemoryStore> {
    MemoryStore::new(snapshot(initial), |state, action| {
        let n = *state.downcast_ref::<u32>().unwrap();
        match action.downcast_ref::<&str>() {
            Some(&"inc") => snapshot(n + 1),
            _ => Rc::clone(state),
        }
    })
}

fn count_projection() -> StateProjection {
    StateProjection::from_state(|state| {
        props! { "count" => *state.downcast_ref::<u32>().unwrap() }
    })
}

fn default_connector() -> propflow::connect::Connector {
    connect(
        Some(count_projection()),
        None::<MapDispatch>,
        None,
        ConnectOptions::default(),
    )
    .unwrap()
}

fn probe_count(state: &propflow_harness::ProbeState) -> u32 {
    *state.props().unwrap().get_data::<u32>("count").unwrap()
}

#[test]
fn consumer_without_provider_fails_to_mount() {
    let (probe, _state) = Probe::new("Orphan");
    let connected = default_connector().wrap(probe);

    let mut host = TreeHost::new();
    let err = host
        .mount(Element::new(connected, PropMap::new()))
        .unwrap_err();

    assert!(
        matches!(err, BindError::NoProvider { display_name } if display_name == "Connect(Orphan)")
    );
    assert!(!host.is_mounted());
}

#[test]
fn nested_providers_nearest_wins() {
    let outer_store = counter_store(1);
    let inner_store = counter_store(2);
    let (probe, state) = Probe::new("Leaf");
    let connected = default_connector().wrap(probe);

    let outer = Provider::new();
    let inner = Provider::new();
    let tree = outer.element(
        outer_store.handle(),
        inner.element(
            inner_store.handle(),
            Element::new(connected, PropMap::new()),
        ),
    );

    let mut host = TreeHost::new();
    host.mount(tree).unwrap();
    assert_eq!(probe_count(&state), 2);

    // Only the inner store reaches the leaf.
    outer_store.dispatch(Box::new("inc"));
    host.flush().unwrap();
    assert_eq!(probe_count(&state), 2);

    inner_store.dispatch(Box::new("inc"));
    host.flush().unwrap();
    assert_eq!(probe_count(&state), 3);
}

#[test]
fn custom_channel_end_to_end() {
    let store = counter_store(5);
    let channel = Channel::new();
    let (probe, state) = Probe::new("Leaf");
    let connector = connect(
        Some(count_projection()),
        None::<MapDispatch>,
        None,
        ConnectOptions {
            context: Some(channel),
            ..ConnectOptions::default()
        },
    )
    .unwrap();
    let connected = connector.wrap(probe);

    let mut host = TreeHost::new();
    host.mount(
        Provider::with_channel(channel)
            .element(store.handle(), Element::new(connected, PropMap::new())),
    )
    .unwrap();
    assert_eq!(probe_count(&state), 5);

    store.dispatch(Box::new("inc"));
    host.flush().unwrap();
    assert_eq!(probe_count(&state), 6);
}

#[test]
fn consumer_on_custom_channel_ignores_default_provider() {
    let store = counter_store(0);
    let channel = Channel::new();
    let (probe, _state) = Probe::new("Leaf");
    let connector = connect(
        Some(count_projection()),
        None::<MapDispatch>,
        None,
        ConnectOptions {
            context: Some(channel),
            ..ConnectOptions::default()
        },
    )
    .unwrap();
    let connected = connector.wrap(probe);

    // Default-channel provider, custom-channel consumer: no producer in
    // scope for the consumer's channel.
    let mut host = TreeHost::new();
    let err = host
        .mount(Provider::new().element(store.handle(), Element::new(connected, PropMap::new())))
        .unwrap_err();
    assert!(matches!(err, BindError::NoProvider { .. }));
}

#[test]
fn forward_ref_delivers_the_wrapped_handle() {
    let store = counter_store(0);
    let (probe, _state) = Probe::new("Leaf");
    let connector = connect(
        Some(count_projection()),
        None::<MapDispatch>,
        None,
        ConnectOptions {
            forward_ref: true,
            ..ConnectOptions::default()
        },
    )
    .unwrap();
    let connected = connector.wrap(probe);

    let slot = ref_slot();
    let mut host = TreeHost::new();
    host.mount(Provider::new().element(
        store.handle(),
        Element::new(connected, PropMap::new()).with_ref(slot.clone()),
    ))
    .unwrap();

    {
        let filled = slot.borrow();
        let handle = filled.as_ref().expect("slot is filled after mount");
        let probe_handle = handle
            .downcast_ref::<ProbeHandle>()
            .expect("slot holds the wrapped instance's handle");
        assert_eq!(probe_handle.name, "Leaf");
    }

    host.unmount();
    assert!(slot.borrow().is_none());
}

#[test]
fn without_forward_ref_the_slot_stays_empty() {
    let store = counter_store(0);
    let (probe, _state) = Probe::new("Leaf");
    let connected = default_connector().wrap(probe);

    let slot = ref_slot();
    let mut host = TreeHost::new();
    host.mount(Provider::new().element(
        store.handle(),
        Element::new(connected, PropMap::new()).with_ref(slot.clone()),
    ))
    .unwrap();

    assert!(slot.borrow().is_none());
}

#[test]
fn statics_are_hoisted_onto_the_wrapper() {
    let (probe, _state) = Probe::with_statics("Leaf", props! { "kind" => "probe" });
    let connected = default_connector().wrap(probe);

    assert_eq!(connected.display_name(), "Connect(Leaf)");
    let statics = connected.statics().unwrap();
    assert_eq!(*statics.get_data::<&str>("kind").unwrap(), "probe");
}

#[test]
fn unmounted_tree_ignores_late_notifications() {
    let store = counter_store(0);
    let (probe, state) = Probe::new("Leaf");
    let connected = default_connector().wrap(probe);

    let mut host = TreeHost::new();
    host.mount(
        Provider::new().element(store.handle(), Element::new(connected, PropMap::new())),
    )
    .unwrap();
    assert_eq!(store.listener_count(), 1);

    host.unmount();
    assert_eq!(state.detaches.get(), 1);
    assert_eq!(store.listener_count(), 0);

    // No listener, no publish, no panic.
    store.dispatch(Box::new("inc"));
    host.flush().unwrap();
    assert_eq!(state.renders.get(), 1);
}
