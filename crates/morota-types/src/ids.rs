//! Type-safe identifier wrappers around `u32`.
//!
//! Every entity in a scenario has a strongly-typed ID so identifiers cannot
//! be mixed at compile time. IDs are plain integers taken from the scenario
//! (never generated from the clock), which keeps tick logs byte-identical
//! across runs with the same inputs.

use serde::{Deserialize, Serialize};

/// Generates a newtype wrapper around `u32` with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            /// Create an identifier from its raw value.
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            /// Return the inner `u32` value.
            pub const fn into_inner(self) -> u32 {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u32> for $name {
            fn from(id: u32) -> Self {
                Self(id)
            }
        }

        impl From<$name> for u32 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for a physical module in the inventory.
    ModuleId
}

define_id! {
    /// Unique identifier for a robot bay in the fleet.
    ///
    /// A bay exists for the whole run; the robot occupying it may be built,
    /// rebuilt, or dismantled by the optimizer between epochs.
    RobotId
}

define_id! {
    /// Unique identifier for a spatial task.
    TaskId
}
