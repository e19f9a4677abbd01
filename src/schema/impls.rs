//! `Stackable` implementations for std types.

use super::{FieldKind, FieldPath, Stackable};
use crate::copy::{DeepCopy, deep_copy};
use crate::error::OverlayError;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::ffi::OsString;
use std::fmt::Debug;
use std::hash::{BuildHasher, Hash};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Leaf types: the shadow is the value itself and a present value replaces
/// the base.
macro_rules! leaf {
    ($kind:ident => $($ty:ty),* $(,)?) => {
        $(
            impl Stackable for $ty {
                type Present = $ty;
                const KIND: FieldKind = FieldKind::$kind;

                #[inline]
                fn into_shadow(self) -> Option<Self> {
                    Some(self)
                }

                #[inline]
                fn overlay(
                    &mut self,
                    shadow: Option<Self>,
                    _path: &mut FieldPath,
                ) -> Result<(), OverlayError> {
                    if let Some(value) = shadow {
                        *self = value;
                    }
                    Ok(())
                }

                #[inline]
                fn materialize(present: Self, _path: &mut FieldPath) -> Result<Self, OverlayError> {
                    Ok(present)
                }
            }
        )*
    };
}

leaf!(Scalar =>
    bool, char,
    i8, i16, i32, i64, i128, isize,
    u8, u16, u32, u64, u128, usize,
    f32, f64,
    String, &'static str, Duration,
);

leaf!(Atomic =>
    OsString, PathBuf, SystemTime,
    IpAddr, Ipv4Addr, Ipv6Addr,
    SocketAddr, SocketAddrV4, SocketAddrV6,
);

/// Generic whole-value replacement, shared by collections and arrays.
macro_rules! replace_whole {
    ($kind:ident) => {
        type Present = Self;
        const KIND: FieldKind = FieldKind::$kind;

        fn into_shadow(self) -> Option<Self> {
            Some(self)
        }

        fn overlay(&mut self, shadow: Option<Self>, _path: &mut FieldPath) -> Result<(), OverlayError> {
            if let Some(value) = shadow {
                *self = value;
            }
            Ok(())
        }

        fn materialize(present: Self, _path: &mut FieldPath) -> Result<Self, OverlayError> {
            Ok(present)
        }
    };
}

impl<T> Stackable for Vec<T>
where
    T: DeepCopy + Debug + Send + Sync + 'static,
{
    replace_whole!(Collection);
}

impl<T> Stackable for VecDeque<T>
where
    T: DeepCopy + Debug + Send + Sync + 'static,
{
    replace_whole!(Collection);
}

impl<K, V, S> Stackable for HashMap<K, V, S>
where
    K: DeepCopy + Debug + Eq + Hash + Send + Sync + 'static,
    V: DeepCopy + Debug + Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    replace_whole!(Collection);
}

impl<T, S> Stackable for HashSet<T, S>
where
    T: DeepCopy + Debug + Eq + Hash + Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    replace_whole!(Collection);
}

impl<K, V> Stackable for BTreeMap<K, V>
where
    K: DeepCopy + Debug + Ord + Send + Sync + 'static,
    V: DeepCopy + Debug + Send + Sync + 'static,
{
    replace_whole!(Collection);
}

impl<T> Stackable for BTreeSet<T>
where
    T: DeepCopy + Debug + Ord + Send + Sync + 'static,
{
    replace_whole!(Collection);
}

impl<T> Stackable for Arc<[T]>
where
    T: DeepCopy + Debug + Send + Sync + 'static,
{
    replace_whole!(Collection);
}

impl Stackable for Arc<str> {
    replace_whole!(Atomic);
}

impl<T, const N: usize> Stackable for [T; N]
where
    T: DeepCopy + Debug + Send + Sync + 'static,
{
    replace_whole!(Array);
}

// Pointers shadow as their pointee: an absent pointer and a pointer whose
// pointee reports nothing are the same "no opinion".

impl<T: Stackable> Stackable for Option<T> {
    type Present = T::Present;
    const KIND: FieldKind = FieldKind::Pointer;

    fn into_shadow(self) -> Option<T::Present> {
        self.and_then(T::into_shadow)
    }

    fn overlay(&mut self, shadow: Option<T::Present>, path: &mut FieldPath) -> Result<(), OverlayError> {
        let Some(present) = shadow else {
            return Ok(());
        };
        if let Some(target) = self.as_mut() {
            return target.overlay(Some(present), path);
        }
        *self = Some(T::materialize(present, path)?);
        Ok(())
    }

    fn materialize(present: T::Present, path: &mut FieldPath) -> Result<Self, OverlayError> {
        T::materialize(present, path).map(Some)
    }
}

impl<T: Stackable> Stackable for Box<T> {
    type Present = T::Present;
    const KIND: FieldKind = FieldKind::Pointer;

    fn into_shadow(self) -> Option<T::Present> {
        (*self).into_shadow()
    }

    fn overlay(&mut self, shadow: Option<T::Present>, path: &mut FieldPath) -> Result<(), OverlayError> {
        (**self).overlay(shadow, path)
    }

    fn materialize(present: T::Present, path: &mut FieldPath) -> Result<Self, OverlayError> {
        T::materialize(present, path).map(Box::new)
    }
}

/// `Arc` pointees are immutable, so overlaying one that is still shared
/// first detaches it with a deep copy. Other holders of the old pointee
/// never observe the write.
impl<T: Stackable> Stackable for Arc<T> {
    type Present = T::Present;
    const KIND: FieldKind = FieldKind::Pointer;

    fn into_shadow(self) -> Option<T::Present> {
        match Arc::try_unwrap(self) {
            Ok(value) => value.into_shadow(),
            Err(shared) => deep_copy(&*shared).into_shadow(),
        }
    }

    fn overlay(&mut self, shadow: Option<T::Present>, path: &mut FieldPath) -> Result<(), OverlayError> {
        let Some(present) = shadow else {
            return Ok(());
        };
        let mut detached = match Arc::get_mut(self) {
            Some(target) => return target.overlay(Some(present), path),
            None => deep_copy(&**self),
        };
        detached.overlay(Some(present), path)?;
        *self = Arc::new(detached);
        Ok(())
    }

    fn materialize(present: T::Present, path: &mut FieldPath) -> Result<Self, OverlayError> {
        T::materialize(present, path).map(Arc::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Shadow;

    fn apply<T: Stackable>(base: &mut T, shadow: Shadow<T>) {
        base.overlay(shadow, &mut FieldPath::root()).unwrap();
    }

    #[test]
    fn test_scalar_absent_keeps_base() {
        let mut port = 8080u16;
        apply(&mut port, None);
        assert_eq!(port, 8080);

        // A present zero value is still a value.
        apply(&mut port, Some(0));
        assert_eq!(port, 0);
    }

    #[test]
    fn test_collections_replace_whole() {
        let mut tags = vec!["a".to_string(), "b".to_string()];
        apply(&mut tags, Some(vec!["c".to_string()]));
        assert_eq!(tags, ["c"]);

        let mut limits = BTreeMap::from([("x", 1), ("y", 2)]);
        apply(&mut limits, Some(BTreeMap::from([("z", 3)])));
        assert_eq!(limits, BTreeMap::from([("z", 3)]));

        // An empty present collection clears the base.
        apply(&mut tags, Some(Vec::new()));
        assert!(tags.is_empty());
    }

    #[test]
    fn test_arrays_replace_whole() {
        let mut weights = [1u8, 2, 3];
        apply(&mut weights, Some([0, 0, 9]));
        assert_eq!(weights, [0, 0, 9]);
    }

    #[test]
    fn test_option_of_scalar() {
        let mut timeout: Option<u64> = None;
        apply(&mut timeout, None);
        assert_eq!(timeout, None);

        apply(&mut timeout, Some(30));
        assert_eq!(timeout, Some(30));

        // `Some(None)` is not expressible: the shadow of `Option<u64>` is
        // `Option<u64>`, so a source cannot unset an optional scalar.
        assert_eq!(Some(30u64).into_shadow(), Some(30));
        assert_eq!(None::<u64>.into_shadow(), None);
    }

    #[test]
    fn test_arc_detaches_shared_pointee() {
        let other = Arc::new(5u32);
        let mut field = Arc::clone(&other);

        apply(&mut field, Some(6));
        assert_eq!(*field, 6);
        assert_eq!(*other, 5);
        assert!(!Arc::ptr_eq(&field, &other));
    }

    #[test]
    fn test_arc_unique_is_written_in_place() {
        let mut field = Arc::new(String::from("a"));
        let before = Arc::as_ptr(&field);
        apply(&mut field, Some("b".to_string()));
        assert_eq!(*field, "b");
        assert_eq!(Arc::as_ptr(&field), before);
    }

    #[test]
    fn test_kinds() {
        assert_eq!(<u16 as Stackable>::KIND, FieldKind::Scalar);
        assert_eq!(<PathBuf as Stackable>::KIND, FieldKind::Atomic);
        assert_eq!(<Vec<u8> as Stackable>::KIND, FieldKind::Collection);
        assert_eq!(<[u8; 4] as Stackable>::KIND, FieldKind::Array);
        assert_eq!(<Option<String> as Stackable>::KIND, FieldKind::Pointer);
    }
}
