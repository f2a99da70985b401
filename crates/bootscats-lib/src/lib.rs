use std::fmt::{Debug, Display};

use serde::{Deserialize, Serialize};

pub mod net;
pub mod rules;

// Newtype ids, displayed in hex so log lines and wire payloads line up
macro_rules! decl_id {
    ($name:ident) => {
        #[derive(Copy, Clone, PartialEq, Eq, Deserialize, Serialize, Hash)]
        pub struct $name(pub u32);

        impl Debug for $name {
            #[inline]
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                <Self as Display>::fmt(self, f)
            }
        }
        impl Display for $name {
            #[inline]
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{:#X}", self.0)
            }
        }

        impl From<u32> for $name {
            #[inline]
            fn from(v: u32) -> Self {
                Self(v)
            }
        }
        impl From<$name> for u32 {
            #[inline]
            fn from(v: $name) -> Self {
                v.0
            }
        }

        impl PartialEq<u32> for $name {
            #[inline]
            fn eq(&self, other: &u32) -> bool {
                self.0 == *other
            }
        }
    };
}

decl_id!(PlayerId);
decl_id!(SessionId);
