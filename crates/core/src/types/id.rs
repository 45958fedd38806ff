//! Newtype IDs for type-safe entity references.
//!
//! Products are keyed by free-form text ids (the catalog ships ids such as
//! `p1`), while accounts, orders and notifications use UUIDs issued by the
//! hosted store. Two macros cover both shapes so the wrappers cannot be mixed.

/// Define a text-backed ID wrapper.
///
/// The generated type is `#[serde(transparent)]`, orderable and hashable, and
/// converts from `&str` and `String`.
///
/// # Example
///
/// ```rust
/// # use oja_core::define_text_id;
/// define_text_id!(SkuId);
///
/// let sku = SkuId::from("ank-001");
/// assert_eq!(sku.as_str(), "ank-001");
/// ```
#[macro_export]
macro_rules! define_text_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new ID from any string-like value.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the underlying string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

/// Define a UUID-backed ID wrapper.
///
/// The generated type is `#[serde(transparent)]` and implements `FromStr`
/// so ids read from the command line or a URL can be parsed directly.
#[macro_export]
macro_rules! define_uuid_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(::uuid::Uuid);

        impl $name {
            /// Wrap an existing UUID.
            #[must_use]
            pub const fn new(id: ::uuid::Uuid) -> Self {
                Self(id)
            }

            /// Generate a fresh random id.
            #[must_use]
            pub fn random() -> Self {
                Self(::uuid::Uuid::new_v4())
            }

            /// Get the underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> ::uuid::Uuid {
                self.0
            }

            /// First eight hex characters, used in buyer-facing messages.
            #[must_use]
            pub fn short(&self) -> String {
                self.0.simple().to_string().chars().take(8).collect()
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = ::uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                ::uuid::Uuid::parse_str(s).map(Self)
            }
        }

        impl From<::uuid::Uuid> for $name {
            fn from(id: ::uuid::Uuid) -> Self {
                Self(id)
            }
        }
    };
}

define_text_id!(ProductId);
define_uuid_id!(UserId);
define_uuid_id!(OrderId);
define_uuid_id!(NotificationId);

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_product_id_is_transparent() {
        let id = ProductId::from("p1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"p1\"");
        assert_eq!(id.to_string(), "p1");
    }

    #[test]
    fn test_uuid_id_parse_and_short() {
        let id: OrderId = "6f1c2a9e-0000-4000-8000-000000000000".parse().unwrap();
        assert_eq!(id.short(), "6f1c2a9e");
        assert!("not-a-uuid".parse::<OrderId>().is_err());
    }
}
