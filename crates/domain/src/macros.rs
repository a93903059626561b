//! Macro for implementing Display and FromStr for domain enums
//!
//! Lifecycle phases and provider kinds travel through logs, events and config
//! files as lowercase strings; this macro keeps both directions of that
//! mapping in one place.
//!
//! # Example
//!
//! ```rust
//! use socialauth_domain::impl_domain_enum_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum Prompt {
//!     Page,
//!     Popup,
//! }
//!
//! impl_domain_enum_conversions!(Prompt {
//!     Page => "page",
//!     Popup => "popup",
//! });
//!
//! assert_eq!("POPUP".parse::<Prompt>(), Ok(Prompt::Popup));
//! ```

/// Implements Display and FromStr traits for domain enums
///
/// - Display writes the mapped string verbatim
/// - FromStr matches case-insensitively after trimming surrounding whitespace
#[macro_export]
macro_rules! impl_domain_enum_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl ::core::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                match self {
                    $(Self::$variant => f.write_str($str),)+
                }
            }
        }

        impl ::core::str::FromStr for $enum_name {
            type Err = ::std::string::String;

            fn from_str(s: &str) -> ::core::result::Result<Self, Self::Err> {
                let needle = s.trim();
                $(
                    if needle.eq_ignore_ascii_case($str) {
                        return ::core::result::Result::Ok(Self::$variant);
                    }
                )+
                ::core::result::Result::Err(::std::format!(
                    "Invalid {}: {}",
                    ::core::stringify!($enum_name),
                    s
                ))
            }
        }
    };
}
