//! Macros for defining typed guid references.

/// Macro to define a typed guid scoped to a domain.
///
/// This generates a newtype wrapper around `String` with:
/// - `generate()` to mint a fresh guid suffixed with the domain token
/// - `new()` to wrap an arbitrary string (no validation)
/// - `validate()` to check the guid grammar
/// - `Display`, `From<&str>`, `AsRef<str>`, and transparent serde
///
/// # Example
///
/// ```ignore
/// define_guid!(TaskGuid);
///
/// let domain = Domain::generate("converge")?;
/// let guid = TaskGuid::generate(&domain);
/// assert!(guid.validate().is_ok());
/// ```
#[macro_export]
macro_rules! define_guid {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps an arbitrary string without validating it.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Mints a fresh guid suffixed with the domain token.
            #[must_use]
            pub fn generate(domain: &$crate::Domain) -> Self {
                let ulid = $crate::Ulid::new().to_string().to_ascii_lowercase();
                Self(format!("{ulid}-{domain}"))
            }

            /// Checks the guid against the remote grammar.
            pub fn validate(&self) -> Result<(), $crate::IdError> {
                $crate::validate_guid(&self.0)
            }

            /// Returns the guid as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consumes the guid, returning the inner string.
            pub fn into_inner(self) -> String {
                self.0
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

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }
    };
}
