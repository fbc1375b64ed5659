//! Identifier newtypes for switch entities.
//!
//! These are deliberately distinct types so a physical port can never be
//! confused with an aggregate (logical) port or a routed interface.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident, $repr:ty) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub $repr);

        impl $name {
            /// Returns the raw identifier value.
            pub const fn raw(self) -> $repr {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$repr> for $name {
            fn from(raw: $repr) -> Self {
                $name(raw)
            }
        }

        impl From<$name> for $repr {
            fn from(id: $name) -> $repr {
                id.0
            }
        }
    };
}

entity_id!(
    /// Identifier of a physical switch port.
    PortId,
    u16
);

entity_id!(
    /// Identifier of an aggregate (link-aggregation) port.
    ///
    /// Aggregate port IDs double as the local actor key in LACP exchanges.
    AggregatePortId,
    u16
);

entity_id!(
    /// Identifier of a routed (L3) interface.
    InterfaceId,
    u32
);
