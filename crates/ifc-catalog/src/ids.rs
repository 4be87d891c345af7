//! Typed identifiers for the two first-class entities in the catalogue.
//!
//! Kept as newtypes over `Uuid` rather than passing bare `Uuid`s around, so a
//! `BuildingId` can never be accidentally swapped for an `IfcFileId` at a call site.

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};
use sqlx::Type;
use uuid::Uuid;

macro_rules! typed_uuid {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, Display, From, Serialize, Deserialize, Type,
        )]
        #[sqlx(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            #[must_use]
            pub fn into_uuid(self) -> Uuid {
                self.0
            }

            #[must_use]
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

typed_uuid!(IfcFileId);
typed_uuid!(BuildingId);
typed_uuid!(TaskId);
