//! Domain newtypes with validation
//!
//! Strongly-typed wrappers for the opaque identifiers exchanged between the
//! local tree, the metadata store and the remote repository. Every wrapper
//! rejects empty input at construction time.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Declares an opaque, non-empty string newtype.
///
/// The generated type is serialized transparently and validated through
/// `TryFrom<String>`, so deserializing an empty value fails the same way
/// `new` does.
macro_rules! opaque_string_newtype {
    ($(#[$meta:meta])* $name:ident, $err:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            #[doc = concat!("Create a new ", stringify!($name))]
            ///
            /// # Errors
            /// Returns an error if the value is empty
            pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
                let value = value.into();
                if value.is_empty() {
                    return Err(DomainError::$err(concat!($label, " cannot be empty").to_string()));
                }
                Ok(Self(value))
            }

            /// Get the inner string reference
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = DomainError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::new(s)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

opaque_string_newtype!(
    /// Server-assigned identifier of a remote object (unique per repository)
    RemoteId,
    InvalidRemoteId,
    "Remote ID"
);

opaque_string_newtype!(
    /// Opaque per-object token that changes whenever the remote object changes
    ChangeToken,
    InvalidChangeToken,
    "Change token"
);

opaque_string_newtype!(
    /// Resume marker for the repository change log
    ///
    /// Persisted after every consumed page so polling can continue where it
    /// stopped.
    ChangeLogToken,
    InvalidChangeToken,
    "Change log token"
);

opaque_string_newtype!(
    /// Stable identity of a local file or folder
    ///
    /// Survives renames and moves of the same underlying object, which is
    /// what makes rename detection possible without an explicit rename
    /// notification.
    LocalIdentity,
    InvalidIdentity,
    "Local identity"
);

// ============================================================================
// Checksum
// ============================================================================

/// Content checksum together with the algorithm that produced it
///
/// Two checksums are only comparable when their algorithms match; use
/// [`Checksum::same_content`] rather than `==` when the algorithms may differ.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum {
    algorithm: String,
    value: String,
}

impl Checksum {
    /// Algorithm name used by the local filesystem adapter
    pub const SHA256: &'static str = "sha-256";

    /// Create a new Checksum
    ///
    /// The algorithm name is normalized to lowercase and the value to
    /// lowercase hex/base64 as given.
    ///
    /// # Errors
    /// Returns an error if either part is empty
    pub fn new(algorithm: impl Into<String>, value: impl Into<String>) -> Result<Self, DomainError> {
        let algorithm = algorithm.into().trim().to_ascii_lowercase();
        let value = value.into().trim().to_string();
        if algorithm.is_empty() {
            return Err(DomainError::InvalidChecksum(
                "Checksum algorithm cannot be empty".to_string(),
            ));
        }
        if value.is_empty() {
            return Err(DomainError::InvalidChecksum(
                "Checksum value cannot be empty".to_string(),
            ));
        }
        Ok(Self { algorithm, value })
    }

    /// Create a SHA-256 checksum from a hex digest
    ///
    /// # Errors
    /// Returns an error if the digest is empty
    pub fn sha256(hex: impl Into<String>) -> Result<Self, DomainError> {
        Self::new(Self::SHA256, hex)
    }

    /// Name of the hashing algorithm
    #[must_use]
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// Digest value
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Compares two checksums
    ///
    /// Returns `Some(true)`/`Some(false)` when both were produced by the same
    /// algorithm, `None` when they cannot be compared.
    #[must_use]
    pub fn same_content(&self, other: &Checksum) -> Option<bool> {
        if self.algorithm == other.algorithm {
            Some(self.value.eq_ignore_ascii_case(&other.value))
        } else {
            None
        }
    }
}

impl Display for Checksum {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.value)
    }
}
