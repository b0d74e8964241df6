//! Unit tests for the store.
//! Deferred work is driven explicitly with `flush`, so these never depend on a runtime's timing.

#![allow(clippy::panic, clippy::unwrap_used)]


use std::{cell::RefCell, rc::Rc};

use serde_json::{Map, Value, json};

use crate::{JsonStore, Store, StoreError};

/// Collects every value a listener sees.
fn recorder<V: Clone + 'static>() -> (Rc<RefCell<Vec<V>>>, impl FnMut(&V) + 'static) {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&seen);
    (seen, move |value: &V| log.borrow_mut().push(value.clone()))
}

fn json_store(initial: Value) -> JsonStore {
    JsonStore::from_json(initial).unwrap()
}

#[test]
fn initial_value_is_delivered_on_the_next_turn() {
    let store = Store::new(5);
    let (seen, listener) = recorder::<i32>();

    let _listening = store.listen(listener);
    assert!(seen.borrow().is_empty());
    assert_eq!(store.pending_tasks(), 1);

    store.flush();
    assert_eq!(*seen.borrow(), vec![5]);
}

#[test]
fn each_changing_update_is_observed_once_in_order() {
    let store = Store::new(0);
    let (seen, listener) = recorder::<i32>();
    let _listening = store.listen(listener);
    store.flush();

    for next in [1, 2, 2, 3] {
        store.update(next).unwrap();
    }

    assert_eq!(*seen.borrow(), vec![0, 1, 2, 3]);
}

#[test]
fn two_listeners_see_one_update_with_the_same_value() {
    let store = json_store(json!({ "a": 1, "b": 2 }));
    let (first, listener_a) = recorder::<Map<String, Value>>();
    let (second, listener_b) = recorder::<Map<String, Value>>();
    let _a = store.listen(listener_a);
    let _b = store.listen(listener_b);
    store.flush();
    first.borrow_mut().clear();
    second.borrow_mut().clear();

    store.update(json!({ "a": 2 })).unwrap();

    assert_eq!(first.borrow().len(), 1);
    assert_eq!(second.borrow().len(), 1);
    assert_eq!(first.borrow()[0], second.borrow()[0]);
    assert_eq!(Value::Object(first.borrow()[0].clone()), json!({ "a": 2, "b": 2 }));
}

#[test]
fn listeners_receive_the_same_allocation() {
    let store = Store::new(String::from("shared"));
    let pointers = Rc::new(RefCell::new(Vec::new()));
    let mut handles = Vec::new();
    for _ in 0..2 {
        let log = Rc::clone(&pointers);
        handles.push(store.listen(move |value: &String| log.borrow_mut().push(value.as_ptr())));
    }
    store.flush();
    pointers.borrow_mut().clear();

    store.update(String::from("next")).unwrap();

    let pointers = pointers.borrow();
    assert_eq!(pointers.len(), 2);
    assert_eq!(pointers[0], pointers[1]);
    assert_eq!(pointers[0], store.value().as_ptr());
}

#[test]
fn reentrant_update_causes_exactly_one_deferred_cycle() {
    let store = json_store(Value::Null);
    let calls = Rc::new(RefCell::new(0));

    let inner = store.clone();
    let count = Rc::clone(&calls);
    let _listening = store.listen(move |_: &Map<String, Value>| {
        let call = {
            let mut count = count.borrow_mut();
            *count += 1;
            *count
        };
        if call == 1 {
            inner.update(json!({ "a": 1 })).unwrap();
        }
    });

    store.flush();

    assert_eq!(*calls.borrow(), 2);
    assert_eq!(store.read(|value| value["a"].clone()), json!(1));
    assert_eq!(store.pending_tasks(), 0);
}

#[test]
fn reentrant_updates_coalesce_into_one_dispatch() {
    let store = Store::new(0);
    let (seen, listener) = recorder::<i32>();
    let _observer = store.listen(listener);

    let inner = store.clone();
    let _writer = store.listen(move |value: &i32| {
        if *value == 0 {
            for next in 1..=5 {
                inner.update(next).unwrap();
            }
        }
    });

    store.flush();

    // Initial deliveries saw 0, then the five nested updates became one dispatch.
    assert_eq!(*seen.borrow(), vec![0, 5]);
    assert_eq!(*store.value(), 5);
}

#[test]
fn nested_update_during_synchronous_fan_out_is_deferred() {
    let store = Store::new(0);
    let (seen, listener) = recorder::<i32>();

    let inner = store.clone();
    let _writer = store.listen(move |value: &i32| {
        if *value == 1 {
            inner.update(2).unwrap();
        }
    });
    let _observer = store.listen(listener);
    store.flush();

    store.update(1).unwrap();
    // Later listeners in the same pass still see the value the pass started with.
    assert_eq!(*seen.borrow(), vec![0, 1]);
    assert_eq!(*store.value(), 2);
    assert_eq!(store.pending_tasks(), 1);

    store.flush();
    assert_eq!(*seen.borrow(), vec![0, 1, 2]);
}

#[test]
fn unchanged_patch_produces_no_notification() {
    let store = json_store(json!({ "a": 1 }));
    let (seen, listener) = recorder::<Map<String, Value>>();
    let _listening = store.listen(listener);
    store.flush();

    assert!(!store.update(json!({ "a": 1 })).unwrap());
    assert!(!store.update(Value::Null).unwrap());

    assert_eq!(seen.borrow().len(), 1);
}

#[test]
fn identity_update_is_a_no_op() {
    let store = Store::new(vec![1, 2, 3]);
    let (seen, listener) = recorder::<Vec<i32>>();
    let _listening = store.listen(listener);
    store.flush();
    let before = store.value();

    let changed = store.update_with(|value| Some(value.clone())).unwrap();

    assert!(!changed);
    assert_eq!(seen.borrow().len(), 1);
    assert!(Rc::ptr_eq(&before, &store.value()));
}

#[test]
fn update_with_none_is_a_no_op() {
    let store = Store::new(1);
    assert!(!store.update_with(|_| None).unwrap());
    assert_eq!(*store.value(), 1);
}

#[test]
fn update_with_computes_from_current_value() {
    let store = json_store(json!({ "a": 3, "b": 2, "c": 4 }));

    store
        .update_with(|value| {
            let a = value["a"].as_i64().unwrap_or_default();
            Some(json!({ "a": a + 1 }))
        })
        .unwrap();

    assert_eq!(Value::Object(store.get()), json!({ "a": 4, "b": 2, "c": 4 }));
}

#[test]
fn modify_always_notifies() {
    let store = Store::new(vec![1]);
    let (seen, listener) = recorder::<Vec<i32>>();
    let _listening = store.listen(listener);
    store.flush();

    store.modify(|value| value.push(2));
    store.modify(|_| {});

    assert_eq!(*seen.borrow(), vec![vec![1], vec![1, 2], vec![1, 2]]);
}

#[test]
fn delivered_values_are_not_changed_by_later_updates() {
    let store = json_store(json!({ "a": 1 }));
    let held = store.value();

    store.update(json!({ "a": 2 })).unwrap();

    assert_eq!(held["a"], json!(1));
    assert_eq!(store.value()["a"], json!(2));
}

#[test]
fn construction_rejects_non_object_json() {
    let error = JsonStore::from_json(json!(42)).unwrap_err();
    assert!(matches!(error, StoreError::InvalidArgument { .. }));

    let empty = JsonStore::from_json(Value::Null).unwrap();
    assert!(empty.value().is_empty());
}

#[test]
fn construction_copies_the_initial_object() {
    let mut initial = json!({ "a": 1 });
    let store = json_store(initial.clone());

    initial["a"] = json!(99);

    assert_eq!(store.value()["a"], json!(1));
}

#[test]
fn invalid_patch_leaves_state_and_listeners_untouched() {
    let store = json_store(json!({ "a": 1 }));
    let (seen, listener) = recorder::<Map<String, Value>>();
    let _listening = store.listen(listener);
    store.flush();

    let error = store.update(json!("not an object")).unwrap_err();

    assert!(matches!(error, StoreError::InvalidArgument { .. }));
    assert_eq!(Value::Object(store.get()), json!({ "a": 1 }));
    assert_eq!(seen.borrow().len(), 1);
}

#[test]
fn cancelled_listener_receives_nothing_more() {
    let store = Store::new(0);
    let (seen, listener) = recorder::<i32>();
    let listening = store.listen(listener);
    store.flush();

    listening.cancel();
    store.update(1).unwrap();

    assert_eq!(*seen.borrow(), vec![0]);
    assert!(!listening.is_active());
}

#[test]
fn listener_cancelled_before_first_delivery_gets_nothing() {
    let store = Store::new(0);
    let (seen, listener) = recorder::<i32>();

    let listening = store.listen(listener);
    drop(listening);
    store.flush();

    assert!(seen.borrow().is_empty());
}

#[test]
fn listener_removed_mid_dispatch_is_skipped() {
    let store = Store::new(0);
    let (seen, listener) = recorder::<i32>();
    let victim: Rc<RefCell<Option<crate::Listening>>> = Rc::new(RefCell::new(None));

    let target = Rc::clone(&victim);
    let _canceller = store.listen(move |value: &i32| {
        if *value == 1 {
            if let Some(handle) = target.borrow_mut().take() {
                handle.cancel();
            }
        }
    });
    *victim.borrow_mut() = Some(store.listen(listener));
    store.flush();

    store.update(1).unwrap();

    assert_eq!(*seen.borrow(), vec![0]);
}

#[test]
fn listener_added_during_dispatch_is_not_double_notified() {
    let store = Store::new(0);
    let (seen, listener) = recorder::<i32>();
    let late = Rc::new(RefCell::new(Some(listener)));
    let handles = Rc::new(RefCell::new(Vec::new()));

    let inner = store.clone();
    let kept = Rc::clone(&handles);
    let _registrar = store.listen(move |value: &i32| {
        if *value == 1 {
            if let Some(listener) = late.borrow_mut().take() {
                kept.borrow_mut().push(inner.listen(listener));
            }
        }
    });
    store.flush();

    store.update(1).unwrap();
    assert!(seen.borrow().is_empty());

    store.flush();
    assert_eq!(*seen.borrow(), vec![1]);
}

#[test]
fn listener_added_then_updated_during_dispatch_sees_the_value_once() {
    let store = Store::new(0);
    let (seen, listener) = recorder::<i32>();
    let late = Rc::new(RefCell::new(Some(listener)));
    let handles = Rc::new(RefCell::new(Vec::new()));

    let inner = store.clone();
    let kept = Rc::clone(&handles);
    let _registrar = store.listen(move |value: &i32| {
        if *value == 1 {
            if let Some(listener) = late.borrow_mut().take() {
                kept.borrow_mut().push(inner.listen(listener));
            }
            inner.update(2).unwrap();
        }
    });
    store.flush();

    store.update(1).unwrap();
    store.flush();

    // The initial delivery already carries 2; the deferred fan-out must not repeat it.
    assert_eq!(*seen.borrow(), vec![2]);
    assert_eq!(store.pending_tasks(), 0);
}

#[test]
fn queued_fan_out_does_not_repeat_a_value_already_dispatched() {
    let store = Store::new(0);
    let (seen, listener) = recorder::<i32>();

    let inner = store.clone();
    let _writer = store.listen(move |value: &i32| {
        if *value == 1 {
            inner.update(2).unwrap();
        }
    });
    let _observer = store.listen(listener);
    store.flush();

    store.update(1).unwrap();
    // The follow-up for 2 is still queued when 3 fans out synchronously.
    store.update(3).unwrap();
    store.flush();

    assert_eq!(*seen.borrow(), vec![0, 1, 3]);
}

#[test]
fn panicking_listener_does_not_block_others() {
    let store = Store::new(0);
    let (seen, listener) = recorder::<i32>();
    let _bad = store.listen(|value: &i32| {
        if *value == 1 {
            panic!("listener exploded");
        }
    });
    let _good = store.listen(listener);
    store.flush();

    store.update(1).unwrap();

    assert_eq!(*seen.borrow(), vec![0, 1]);
    // The failure report waits for the next turn.
    assert_eq!(store.pending_tasks(), 1);
    store.flush();
    assert_eq!(store.pending_tasks(), 0);
}

#[test]
fn detached_listener_outlives_its_handle() {
    let store = Store::new(0);
    let (seen, listener) = recorder::<i32>();

    store.listen(listener).detach();
    store.flush();
    store.update(1).unwrap();

    assert_eq!(*seen.borrow(), vec![0, 1]);
    assert_eq!(store.listener_count(), 1);
}

#[test]
fn flush_inside_a_listener_runs_nothing() {
    let store = Store::new(0);
    let flushed = Rc::new(RefCell::new(Vec::new()));

    let inner = store.clone();
    let log = Rc::clone(&flushed);
    let _listening = store.listen(move |_: &i32| log.borrow_mut().push(inner.flush()));
    let _other = store.listen(|_: &i32| {});

    store.flush();

    assert_eq!(*flushed.borrow(), vec![0]);
}

#[test]
fn default_store_starts_from_default_value() {
    let store: Store<Vec<u8>> = Store::default();
    assert!(store.get().is_empty());
    assert!(!store.is_observed());
}

#[test]
fn weak_store_does_not_keep_the_store_alive() {
    let store = Store::new(1);
    let weak = store.downgrade();

    assert_eq!(weak.upgrade().map(|store| *store.value()), Some(1));
    drop(store);
    assert!(weak.upgrade().is_none());
}

#[test]
fn handle_outliving_the_store_cancels_quietly() {
    let store = Store::new(1);
    let listening = store.listen(|_: &i32| {});
    drop(store);

    assert!(!listening.is_active());
    listening.cancel();
}
