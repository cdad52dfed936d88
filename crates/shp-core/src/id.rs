// SPDX-License-Identifier: MIT

//! Stable identifier types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Define a newtype ID wrapper around [`Uuid`].
///
/// Unlike a nanoid-prefixed scheme, experiment identity here must be a
/// genuine UUID4 (spec.md §3: "id (stable UUID)") so it round-trips through
/// the HTTP API and the store unchanged.
macro_rules! define_uuid_id {
    ($(#[$meta:meta])* pub struct $name:ident;) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_uuid_id! {
    /// Unique identifier of a [`crate::model::WebExperiment`].
    pub struct ExperimentId;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_uuid() {
        let id = ExperimentId::new();
        let raw: Uuid = id.into();
        assert_eq!(ExperimentId::from(raw), id);
    }
}
