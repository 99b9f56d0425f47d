//! Newtypes for provider-assigned identifiers to avoid stringly-typed code.

use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps a provider-assigned identifier.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub const fn as_str(&self) -> &str {
                self.0.as_str()
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &Self::Target {
                self.as_str()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

identifier!(
    /// Opaque flavor (instance size) identifier.
    FlavorId
);
identifier!(
    /// Machine image identifier.
    ImageId
);
identifier!(
    /// Compute instance (server) identifier.
    InstanceId
);
identifier!(
    /// Block storage volume identifier.
    VolumeId
);
identifier!(
    /// Floating IP allocation identifier.
    FloatingIpId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_serialise_as_bare_strings() {
        let id = InstanceId::from("abc-123");
        let json = serde_json::to_string(&id).unwrap_or_else(|err| panic!("serialise: {err}"));
        assert_eq!(json, r#""abc-123""#);
    }

    #[test]
    fn identifiers_display_their_value() {
        assert_eq!(VolumeId::new("vol-1").to_string(), "vol-1");
    }
}
