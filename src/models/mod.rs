//! Database row types and the text-backed enums stored in them

/// Declare an enum persisted as lowercase text.
///
/// Generates `as_str`, `Display`, `FromStr` and `TryFrom<String>` (the latter
/// is what `#[sqlx(try_from = "String")]` needs on row fields).
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::error::ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    other => Err($crate::error::ParseEnumError::new($kind, other)),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = $crate::error::ParseEnumError;

            fn try_from(value: String) -> Result<Self, $crate::error::ParseEnumError> {
                value.parse()
            }
        }
    };
}

pub(crate) use text_enum;

pub mod audit;
pub mod entity;
pub mod user;

pub use audit::{AuditAction, NewAuditLog};
pub use entity::{
    BatchStatus, Entity, EntityBatch, EntityOwnership, EntityResolution, EntityType,
    ResolutionStatus,
};
pub use user::{User, UserProfile};
