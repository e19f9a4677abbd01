//! Integration tests for deep copies of derived schemas.

use stacked_config::prelude::*;
use stacked_config::{Handle, deep_copy};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default, Clone, PartialEq, Stackable)]
struct Node {
    pub label: String,
    #[stack(skip)]
    pub next: Option<Shared<Node>>,
}

#[derive(Debug, Clone, Stackable)]
struct Wiring {
    pub primary: Arc<Vec<String>>,
    pub mirror: Arc<Vec<String>>,
    pub hosts: Arc<[String]>,
    pub hosts_again: Arc<[String]>,
    pub table: HashMap<String, Shared<Node>>,
    pub on_change: Handle<dyn Fn(&str) -> usize + Send + Sync>,
    pub hook: fn(u32) -> u32,
    notes: Vec<String>,
}

impl Default for Wiring {
    fn default() -> Self {
        wiring()
    }
}

fn double(x: u32) -> u32 {
    x * 2
}

fn wiring() -> Wiring {
    let primary = Arc::new(vec!["a".to_string()]);
    let hosts: Arc<[String]> = Arc::from(vec!["h1".to_string(), "h2".to_string()]);
    let shared = Shared::new(Node {
        label: "shared".into(),
        next: None,
    });
    Wiring {
        primary: Arc::clone(&primary),
        mirror: primary,
        hosts: Arc::clone(&hosts),
        hosts_again: hosts,
        table: HashMap::from([
            ("x".to_string(), shared.clone()),
            ("y".to_string(), shared),
        ]),
        on_change: Handle::from_arc(Arc::new(|s: &str| s.len())),
        hook: double,
        notes: vec!["private".into()],
    }
}

#[test]
fn test_copy_is_structurally_equal() {
    let original = wiring();
    let copy = deep_copy(&original);

    assert_eq!(copy.primary, original.primary);
    assert_eq!(copy.hosts, original.hosts);
    assert_eq!(*copy.table["x"].read(), *original.table["x"].read());
    assert_eq!(copy.notes, original.notes);
    assert_eq!((copy.hook)(4), 8);
}

#[test]
fn test_copy_shares_nothing_with_original() {
    let original = wiring();
    let copy = deep_copy(&original);

    assert!(!Arc::ptr_eq(&copy.primary, &original.primary));
    assert!(!Arc::ptr_eq(&copy.hosts, &original.hosts));
    assert!(!Shared::ptr_eq(&copy.table["x"], &original.table["x"]));

    copy.table["x"].write().label = "changed".into();
    assert_eq!(original.table["x"].read().label, "shared");
}

#[test]
fn test_aliases_stay_aliased() {
    let copy = deep_copy(&wiring());

    assert!(Arc::ptr_eq(&copy.primary, &copy.mirror));
    assert!(Arc::ptr_eq(&copy.hosts, &copy.hosts_again));
    assert!(Shared::ptr_eq(&copy.table["x"], &copy.table["y"]));

    copy.table["x"].write().label = "both".into();
    assert_eq!(copy.table["y"].read().label, "both");
}

#[test]
fn test_functions_keep_identity() {
    let original = wiring();
    let copy = deep_copy(&original);

    assert!(Handle::ptr_eq(&copy.on_change, &original.on_change));
    assert_eq!((*copy.on_change)("four"), 4);
    assert!(std::ptr::fn_addr_eq(copy.hook, original.hook));
}

#[test]
fn test_cycles_terminate_and_are_preserved() {
    let first = Shared::new(Node {
        label: "first".into(),
        next: None,
    });
    let second = Shared::new(Node {
        label: "second".into(),
        next: Some(first.clone()),
    });
    first.write().next = Some(second.clone());

    let copy = deep_copy(&first);
    let copied_second = copy.read().next.clone().unwrap();
    let back = copied_second.read().next.clone().unwrap();

    assert_eq!(copied_second.read().label, "second");
    assert!(Shared::ptr_eq(&back, &copy));
    assert!(!Shared::ptr_eq(&copy, &first));

    // Break the cycles so both graphs can be freed.
    first.write().next = None;
    copy.write().next = None;
}

#[test]
fn test_shadow_of_detaches_from_value() {
    let original = wiring();
    let mut shadow = shadow_of_wiring(&original);
    shadow.primary.as_mut().unwrap().push("b".into());
    assert_eq!(*original.primary, vec!["a".to_string()]);
    assert_eq!(shadow.hosts.as_deref().map(<[String]>::len), Some(2));
}

fn shadow_of_wiring(value: &Wiring) -> WiringShadow {
    stacked_config::shadow_of(value).unwrap()
}
