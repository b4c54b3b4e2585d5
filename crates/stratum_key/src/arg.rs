// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;

use serde_json::Value;

use crate::identity::{arc_token, ref_key};
use crate::key::{FALSE_KEY, NULL_KEY, TRUE_KEY, UNDEFINED_KEY};
use crate::{CacheKey, Identity};

/// A single argument that contributes to a cache key.
///
/// The implementation decides how the argument is classified: primitives return themselves,
/// plain data returns its structural serialization and identity-bearing values return a
/// surrogate reference token.
///
/// Implement this trait for your own types by delegating to one of the built-in
/// classifications, typically [`Identity`] or [`Plain`](crate::Plain).
pub trait KeyArg {
    /// Returns the key for this single argument.
    fn cache_key(&self) -> CacheKey;
}

/// An ordered list of arguments that derives one [`CacheKey`].
///
/// Implemented for tuples of up to eight [`KeyArg`] values, for slices of `&dyn KeyArg`, and
/// for the built-in single-argument types, which derive the same key as their one-element
/// tuple.
pub trait KeyArgs {
    /// Derives the key for the whole argument list.
    fn derive(&self) -> CacheKey;
}

/// Derives the cache key for an argument list.
///
/// - no arguments yield the constant key `0`;
/// - a single argument yields that argument's own key;
/// - several arguments yield the JSON array of their individual keys.
///
/// # Examples
///
/// ```
/// use stratum_key::{CacheKey, derive_key};
///
/// assert_eq!(derive_key(&()), CacheKey::Int(0));
/// assert_eq!(derive_key(&("foo",)), CacheKey::from("foo"));
/// assert_eq!(derive_key(&(1, 2, 3)), CacheKey::from("[1,2,3]"));
/// assert_eq!(derive_key(&(None::<i32>,)), CacheKey::from("__null"));
/// ```
pub fn derive_key<A: KeyArgs + ?Sized>(args: &A) -> CacheKey {
    args.derive()
}

fn composite(keys: impl IntoIterator<Item = CacheKey>) -> CacheKey {
    let parts = keys.into_iter().map(|key| key.to_json()).collect();
    CacheKey::Text(Value::Array(parts).to_string())
}

impl<T: KeyArg + ?Sized> KeyArg for &T {
    fn cache_key(&self) -> CacheKey {
        (**self).cache_key()
    }
}

impl KeyArg for CacheKey {
    fn cache_key(&self) -> CacheKey {
        self.clone()
    }
}

impl KeyArg for str {
    fn cache_key(&self) -> CacheKey {
        CacheKey::Text(self.to_owned())
    }
}

impl KeyArg for String {
    fn cache_key(&self) -> CacheKey {
        CacheKey::Text(self.clone())
    }
}

impl KeyArg for char {
    fn cache_key(&self) -> CacheKey {
        CacheKey::Text(self.to_string())
    }
}

impl KeyArg for bool {
    fn cache_key(&self) -> CacheKey {
        CacheKey::from(if *self { TRUE_KEY } else { FALSE_KEY })
    }
}

impl KeyArg for () {
    fn cache_key(&self) -> CacheKey {
        CacheKey::from(UNDEFINED_KEY)
    }
}

impl<T: KeyArg> KeyArg for Option<T> {
    fn cache_key(&self) -> CacheKey {
        self.as_ref().map_or_else(|| CacheKey::from(NULL_KEY), KeyArg::cache_key)
    }
}

macro_rules! small_int_key_arg {
    ($($ty:ty),*) => {
        $(
            impl KeyArg for $ty {
                fn cache_key(&self) -> CacheKey {
                    CacheKey::Int(i64::from(*self))
                }
            }
        )*
    };
}

small_int_key_arg!(i8, i16, i32, i64, u8, u16, u32);

macro_rules! wide_int_key_arg {
    ($($ty:ty),*) => {
        $(
            impl KeyArg for $ty {
                #[expect(clippy::cast_precision_loss, reason = "out-of-range values degrade to float keys")]
                fn cache_key(&self) -> CacheKey {
                    i64::try_from(*self).map_or_else(|_| CacheKey::from_f64(*self as f64), CacheKey::Int)
                }
            }
        )*
    };
}

wide_int_key_arg!(i128, u64, u128, isize, usize);

impl KeyArg for f32 {
    fn cache_key(&self) -> CacheKey {
        CacheKey::from_f64(f64::from(*self))
    }
}

impl KeyArg for f64 {
    fn cache_key(&self) -> CacheKey {
        CacheKey::from_f64(*self)
    }
}

impl KeyArg for Value {
    fn cache_key(&self) -> CacheKey {
        match self {
            Self::Null => CacheKey::from(NULL_KEY),
            Self::Bool(flag) => flag.cache_key(),
            Self::Number(number) => number
                .as_i64()
                .map_or_else(|| CacheKey::from_f64(number.as_f64().unwrap_or(f64::NAN)), CacheKey::Int),
            Self::String(text) => CacheKey::Text(text.clone()),
            Self::Array(_) | Self::Object(_) => CacheKey::prefixed(self),
        }
    }
}

impl KeyArg for Identity {
    fn cache_key(&self) -> CacheKey {
        self.key()
    }
}

impl<T: ?Sized + Send + Sync + 'static> KeyArg for Arc<T> {
    fn cache_key(&self) -> CacheKey {
        ref_key(arc_token(self))
    }
}

impl<T: KeyArgs + ?Sized> KeyArgs for &T {
    fn derive(&self) -> CacheKey {
        (**self).derive()
    }
}

impl KeyArgs for () {
    fn derive(&self) -> CacheKey {
        CacheKey::Int(0)
    }
}

impl<A: KeyArg> KeyArgs for (A,) {
    fn derive(&self) -> CacheKey {
        self.0.cache_key()
    }
}

macro_rules! tuple_key_args {
    ($($name:ident),+) => {
        impl<$($name: KeyArg),+> KeyArgs for ($($name,)+) {
            #[expect(non_snake_case, reason = "bindings reuse the generic parameter names")]
            fn derive(&self) -> CacheKey {
                let ($($name,)+) = self;
                composite([$($name.cache_key()),+])
            }
        }
    };
}

tuple_key_args!(A, B);
tuple_key_args!(A, B, C);
tuple_key_args!(A, B, C, D);
tuple_key_args!(A, B, C, D, E);
tuple_key_args!(A, B, C, D, E, F);
tuple_key_args!(A, B, C, D, E, F, G);
tuple_key_args!(A, B, C, D, E, F, G, H);

impl KeyArgs for [&dyn KeyArg] {
    fn derive(&self) -> CacheKey {
        match self {
            [] => CacheKey::Int(0),
            [single] => single.cache_key(),
            many => composite(many.iter().map(|arg| arg.cache_key())),
        }
    }
}

macro_rules! single_key_args {
    ($($ty:ty),*) => {
        $(
            impl KeyArgs for $ty {
                fn derive(&self) -> CacheKey {
                    self.cache_key()
                }
            }
        )*
    };
}

single_key_args!(
    CacheKey, str, String, char, bool, i8, i16, i32, i64, u8, u16, u32, i128, u64, u128, isize, usize, f32, f64, Value, Identity
);

impl<T: KeyArg> KeyArgs for Option<T> {
    fn derive(&self) -> CacheKey {
        self.cache_key()
    }
}

impl<T: ?Sized + Send + Sync + 'static> KeyArgs for Arc<T> {
    fn derive(&self) -> CacheKey {
        self.cache_key()
    }
}
