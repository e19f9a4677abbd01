//! Integration tests for the shapes `#[derive(Stackable)]` accepts.

use stacked_config::prelude::*;
use stacked_config::{FieldKind, deep_copy, stack};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default, Clone, PartialEq, Stackable)]
struct Ports(pub u16, u16, pub u16);

#[test]
fn test_tuple_struct_renumbers_shadow() {
    let defaults = Ports(80, 81, 443);
    let merged = stack(&defaults, &[Some(PortsShadow(None, Some(8443)))]).unwrap();
    assert_eq!(merged, Ports(80, 81, 8443));

    let names: Vec<_> = Ports::FIELDS.iter().map(|f| f.name).collect();
    assert_eq!(names, ["0", "2"]);
}

#[derive(Debug, Default, Clone, PartialEq, Stackable)]
struct Slot<T> {
    pub primary: T,
    pub fallback: Option<T>,
}

#[test]
fn test_generic_struct_overlays_through_parameter() {
    let defaults = Slot {
        primary: 1u32,
        fallback: None,
    };
    let merged = stack(
        &defaults,
        &[Some(SlotShadow {
            primary: None,
            fallback: Some(7),
        })],
    )
    .unwrap();
    assert_eq!(merged.primary, 1);
    assert_eq!(merged.fallback, Some(7));
}

#[derive(Debug, Clone, PartialEq, Stackable)]
#[stack(atomic)]
struct Endpoint {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Default, Clone, PartialEq, Stackable)]
struct Tls {
    pub cert: String,
    pub verify_peer: bool,
}

#[derive(Debug, Default, Clone, Stackable)]
#[stack(shadow = "UpstreamPartial")]
struct Upstream {
    pub endpoint: Option<Endpoint>,
    pub tls: Option<Tls>,
    #[stack(by_ref)]
    pub pool: Arc<Mutex<Vec<u32>>>,
    pub retries: u8,
}

#[test]
fn test_atomic_struct_is_replaced_whole() {
    assert_eq!(Upstream::field("endpoint").unwrap().kind, FieldKind::Pointer);
    assert_eq!(<Endpoint as Stackable>::KIND, FieldKind::Atomic);

    let defaults = Upstream {
        endpoint: Some(Endpoint {
            host: "localhost".into(),
            port: 80,
        }),
        ..Default::default()
    };
    let replacement = Endpoint {
        host: "backend".into(),
        port: 8080,
    };
    let merged = stack(
        &defaults,
        &[Some(UpstreamPartial {
            endpoint: Some(replacement.clone()),
            ..Default::default()
        })],
    )
    .unwrap();
    assert_eq!(merged.endpoint, Some(replacement));
}

#[test]
fn test_missing_struct_is_materialized_from_default() {
    let merged = stack(
        &Upstream::default(),
        &[Some(UpstreamPartial {
            tls: Some(TlsShadow {
                cert: Some("/etc/cert.pem".into()),
                verify_peer: None,
            }),
            ..Default::default()
        })],
    )
    .unwrap();
    assert_eq!(
        merged.tls,
        Some(Tls {
            cert: "/etc/cert.pem".into(),
            verify_peer: false,
        })
    );
}

#[test]
fn test_by_ref_field_is_shared_and_not_overlaid() {
    assert!(Upstream::field("pool").is_none());

    let original = Upstream::default();
    original.pool.lock().unwrap().push(1);
    let copy = deep_copy(&original);
    assert!(Arc::ptr_eq(&copy.pool, &original.pool));

    let merged = stack(
        &original,
        &[Some(UpstreamPartial {
            retries: Some(5),
            ..Default::default()
        })],
    )
    .unwrap();
    assert!(Arc::ptr_eq(&merged.pool, &original.pool));
    assert_eq!(merged.retries, 5);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Stackable)]
enum Mode {
    Fast,
    Careful { retries: u8 },
}

#[derive(Debug, Clone, PartialEq, Stackable)]
struct Tuning {
    pub mode: Mode,
}

impl Default for Tuning {
    fn default() -> Self {
        Self { mode: Mode::Fast }
    }
}

#[test]
fn test_enum_fields_replace_whole() {
    assert_eq!(Tuning::field("mode").unwrap().kind, FieldKind::Atomic);
    let merged = stack(
        &Tuning::default(),
        &[Some(TuningShadow {
            mode: Some(Mode::Careful { retries: 3 }),
        })],
    )
    .unwrap();
    assert_eq!(merged.mode, Mode::Careful { retries: 3 });
    assert_eq!(deep_copy(&merged.mode), merged.mode);
}
