//! Identifier types for cascade.
//!
//! All identifiers originate in user-authored documents (manifests,
//! pipelines, the trusted-signers registry), so they are validated
//! string newtypes rather than generated ids. The shared lexical rule —
//! a lowercase identifier, `[a-z][a-z0-9_]*` — keeps `slot.output`
//! wiring references unambiguous to split.
//!
//! # Example
//!
//! ```
//! use cascade_types::{QualifiedTopic, SlotId};
//!
//! let slot: SlotId = "crawler".parse().unwrap();
//! let topic = QualifiedTopic::new(slot.clone(), "urls");
//! assert_eq!(topic.as_str(), "crawler.urls");
//! assert!("Not-Valid".parse::<SlotId>().is_err());
//! ```

use crate::{ErrorCode, Severity};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error produced when parsing an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    /// The string is not a lowercase identifier.
    #[error("invalid identifier '{0}': expected [a-z][a-z0-9_]*")]
    Invalid(String),

    /// The string is empty.
    #[error("empty identifier")]
    Empty,
}

impl ErrorCode for IdError {
    fn code(&self) -> &'static str {
        match self {
            Self::Invalid(_) => "TYPE_ID_INVALID",
            Self::Empty => "TYPE_ID_EMPTY",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }

    fn severity(&self) -> Severity {
        Severity::Config
    }
}

fn validate_ident(s: &str) -> Result<(), IdError> {
    if s.is_empty() {
        return Err(IdError::Empty);
    }
    let mut chars = s.chars();
    let first_ok = chars.next().is_some_and(|c| c.is_ascii_lowercase());
    let rest_ok = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if first_ok && rest_ok {
        Ok(())
    } else {
        Err(IdError::Invalid(s.to_string()))
    }
}

macro_rules! ident_newtype {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Parses and validates the identifier.
            ///
            /// # Errors
            ///
            /// Returns [`IdError`] when the string is not a lowercase
            /// identifier.
            pub fn new(s: impl Into<String>) -> Result<Self, IdError> {
                let s = s.into();
                validate_ident(&s)?;
                Ok(Self(s))
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::new(s)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

ident_newtype! {
    /// Identifier of one module slot within a pipeline.
    ///
    /// Slot ids are chosen by the pipeline author and are unique within
    /// one pipeline document. They qualify topic names on the bus
    /// (`<slot>.<output>`) and label every diagnostic the runtime emits.
    SlotId
}

ident_newtype! {
    /// Name of a module as declared in its manifest.
    ///
    /// Module names are unique across all configured module roots and
    /// resolve to an on-disk module directory via the registry.
    ModuleName
}

ident_newtype! {
    /// Identifier of a trusted signer in the signer registry.
    SignerId
}

/// A fully qualified bus topic: `<producer slot id>.<output name>`.
///
/// The bus keys its topic table on this form; local input names are
/// mapped to qualified topics through the pipeline's wiring and never
/// matched by wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QualifiedTopic {
    slot: SlotId,
    output: String,
}

impl TryFrom<String> for QualifiedTopic {
    type Error = IdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<QualifiedTopic> for String {
    fn from(t: QualifiedTopic) -> String {
        t.as_str()
    }
}

impl QualifiedTopic {
    /// Creates a qualified topic from a slot id and output name.
    #[must_use]
    pub fn new(slot: SlotId, output: impl Into<String>) -> Self {
        Self {
            slot,
            output: output.into(),
        }
    }

    /// Parses a `slot.output` reference as written in pipeline wiring.
    ///
    /// # Errors
    ///
    /// Returns [`IdError`] if the string does not contain exactly one
    /// dot or the slot part is not a valid identifier.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        let (slot, output) = s.split_once('.').ok_or_else(|| IdError::Invalid(s.into()))?;
        if output.is_empty() || output.contains('.') {
            return Err(IdError::Invalid(s.into()));
        }
        Ok(Self {
            slot: SlotId::new(slot)?,
            output: output.to_string(),
        })
    }

    /// Returns the producing slot id.
    #[must_use]
    pub fn slot(&self) -> &SlotId {
        &self.slot
    }

    /// Returns the output name on the producing slot.
    #[must_use]
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Returns the canonical `slot.output` string form.
    #[must_use]
    pub fn as_str(&self) -> String {
        format!("{}.{}", self.slot, self.output)
    }
}

impl fmt::Display for QualifiedTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.slot, self.output)
    }
}
