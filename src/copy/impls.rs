//! `DeepCopy` implementations for std and channel types.

use super::{CopyContext, DeepCopy};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::ffi::OsString;
use std::hash::{BuildHasher, Hash};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Types whose clone already owns everything it refers to.
macro_rules! by_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl DeepCopy for $ty {
                #[inline]
                fn deep_copy_in(&self, _ctx: &mut CopyContext) -> Self {
                    self.clone()
                }
            }
        )*
    };
}

by_value!(
    (),
    bool,
    char,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    f32,
    f64,
    String,
    &'static str,
    OsString,
    PathBuf,
    Duration,
    SystemTime,
    IpAddr,
    Ipv4Addr,
    Ipv6Addr,
    SocketAddr,
    SocketAddrV4,
    SocketAddrV6,
);

impl<T: DeepCopy> DeepCopy for Option<T> {
    fn deep_copy_in(&self, ctx: &mut CopyContext) -> Self {
        self.as_ref().map(|value| value.deep_copy_in(ctx))
    }
}

impl<T: DeepCopy> DeepCopy for Box<T> {
    fn deep_copy_in(&self, ctx: &mut CopyContext) -> Self {
        Box::new((**self).deep_copy_in(ctx))
    }
}

impl<T: DeepCopy> DeepCopy for Vec<T> {
    fn deep_copy_in(&self, ctx: &mut CopyContext) -> Self {
        // Spare capacity is part of what the copy reproduces.
        let mut out = Vec::with_capacity(self.capacity());
        out.extend(self.iter().map(|value| value.deep_copy_in(ctx)));
        out
    }
}

impl<T: DeepCopy> DeepCopy for VecDeque<T> {
    fn deep_copy_in(&self, ctx: &mut CopyContext) -> Self {
        let mut out = VecDeque::with_capacity(self.capacity());
        out.extend(self.iter().map(|value| value.deep_copy_in(ctx)));
        out
    }
}

impl<T: DeepCopy, const N: usize> DeepCopy for [T; N] {
    fn deep_copy_in(&self, ctx: &mut CopyContext) -> Self {
        std::array::from_fn(|i| self[i].deep_copy_in(ctx))
    }
}

impl<K, V, S> DeepCopy for HashMap<K, V, S>
where
    K: DeepCopy + Eq + Hash,
    V: DeepCopy,
    S: BuildHasher + Clone,
{
    fn deep_copy_in(&self, ctx: &mut CopyContext) -> Self {
        let mut out = HashMap::with_capacity_and_hasher(self.len(), self.hasher().clone());
        for (key, value) in self {
            out.insert(key.deep_copy_in(ctx), value.deep_copy_in(ctx));
        }
        out
    }
}

impl<T, S> DeepCopy for HashSet<T, S>
where
    T: DeepCopy + Eq + Hash,
    S: BuildHasher + Clone,
{
    fn deep_copy_in(&self, ctx: &mut CopyContext) -> Self {
        let mut out = HashSet::with_capacity_and_hasher(self.len(), self.hasher().clone());
        out.extend(self.iter().map(|value| value.deep_copy_in(ctx)));
        out
    }
}

impl<K: DeepCopy + Ord, V: DeepCopy> DeepCopy for BTreeMap<K, V> {
    fn deep_copy_in(&self, ctx: &mut CopyContext) -> Self {
        self.iter()
            .map(|(key, value)| (key.deep_copy_in(ctx), value.deep_copy_in(ctx)))
            .collect()
    }
}

impl<T: DeepCopy + Ord> DeepCopy for BTreeSet<T> {
    fn deep_copy_in(&self, ctx: &mut CopyContext) -> Self {
        self.iter().map(|value| value.deep_copy_in(ctx)).collect()
    }
}

impl<T: DeepCopy + 'static> DeepCopy for Arc<T> {
    fn deep_copy_in(&self, ctx: &mut CopyContext) -> Self {
        let addr = Arc::as_ptr(self).cast::<()>();
        if let Some(copy) = ctx.lookup::<Arc<T>>(addr) {
            return copy;
        }
        // An `Arc` alone cannot form a cycle, so copying before recording is
        // safe here. `Shared` is the cycle-capable pointer.
        let copy = Arc::new((**self).deep_copy_in(ctx));
        ctx.remember(addr, &copy);
        copy
    }
}

impl<T: DeepCopy + 'static> DeepCopy for Arc<[T]> {
    fn deep_copy_in(&self, ctx: &mut CopyContext) -> Self {
        let addr = Arc::as_ptr(self).cast::<()>();
        if let Some(copy) = ctx.lookup::<Arc<[T]>>(addr) {
            return copy;
        }
        let copy: Arc<[T]> = self.iter().map(|value| value.deep_copy_in(ctx)).collect();
        ctx.remember(addr, &copy);
        copy
    }
}

impl DeepCopy for Arc<str> {
    fn deep_copy_in(&self, ctx: &mut CopyContext) -> Self {
        let addr = Arc::as_ptr(self).cast::<()>();
        if let Some(copy) = ctx.lookup::<Arc<str>>(addr) {
            return copy;
        }
        let copy: Arc<str> = Arc::from(&**self);
        ctx.remember(addr, &copy);
        copy
    }
}

macro_rules! tuples {
    ($(($($name:ident . $idx:tt),+)),* $(,)?) => {
        $(
            impl<$($name: DeepCopy),+> DeepCopy for ($($name,)+) {
                fn deep_copy_in(&self, ctx: &mut CopyContext) -> Self {
                    ($(self.$idx.deep_copy_in(ctx),)+)
                }
            }
        )*
    };
}

tuples!(
    (A.0),
    (A.0, B.1),
    (A.0, B.1, C.2),
    (A.0, B.1, C.2, D.3),
);

// Functions and channels are copied by reference.

macro_rules! fn_pointers {
    ($(($($arg:ident),*)),* $(,)?) => {
        $(
            impl<R, $($arg),*> DeepCopy for fn($($arg),*) -> R {
                #[inline]
                fn deep_copy_in(&self, _ctx: &mut CopyContext) -> Self {
                    *self
                }
            }
        )*
    };
}

fn_pointers!((), (A), (A, B), (A, B, C), (A, B, C, D));

impl<T> DeepCopy for std::sync::mpsc::Sender<T> {
    fn deep_copy_in(&self, _ctx: &mut CopyContext) -> Self {
        self.clone()
    }
}

impl<T> DeepCopy for std::sync::mpsc::SyncSender<T> {
    fn deep_copy_in(&self, _ctx: &mut CopyContext) -> Self {
        self.clone()
    }
}

impl<T> DeepCopy for tokio::sync::mpsc::Sender<T> {
    fn deep_copy_in(&self, _ctx: &mut CopyContext) -> Self {
        self.clone()
    }
}

impl<T> DeepCopy for tokio::sync::mpsc::UnboundedSender<T> {
    fn deep_copy_in(&self, _ctx: &mut CopyContext) -> Self {
        self.clone()
    }
}

impl<T> DeepCopy for tokio::sync::broadcast::Sender<T> {
    fn deep_copy_in(&self, _ctx: &mut CopyContext) -> Self {
        self.clone()
    }
}
