//! Opaque identifiers

use rand::Rng;

/// Generate a random id with the given prefix, e.g. `seg-4f1c9a0b2d7e6c13`
pub(crate) fn generate(prefix: &str) -> String {
    let value: u64 = rand::thread_rng().gen();
    format!("{prefix}-{value:016x}")
}

/// Declare a string newtype used as an opaque identifier.
macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord,
            serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Fresh random id for an entity created on this client
            pub fn generate() -> Self {
                Self($crate::ids::generate($prefix))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

pub(crate) use opaque_id;
