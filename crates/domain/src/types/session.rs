//! Session lifecycle phases

use serde::{Deserialize, Serialize};

use crate::impl_domain_enum_conversions;

/// Where a provider's login lifecycle currently stands
///
/// `Idle` is the initial phase. There is no terminal phase: `Failed` and
/// `Expired` are left by calling `login()` again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Idle,
    Authorizing,
    Exchanging,
    Authenticated,
    Refreshing,
    Failed,
    Expired,
}

impl_domain_enum_conversions!(SessionPhase {
    Idle => "idle",
    Authorizing => "authorizing",
    Exchanging => "exchanging",
    Authenticated => "authenticated",
    Refreshing => "refreshing",
    Failed => "failed",
    Expired => "expired",
});

impl SessionPhase {
    /// An authorization request is outstanding (waiting for, or processing,
    /// its callback).
    #[must_use]
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::Authorizing | Self::Exchanging)
    }

    /// A network call is suspended on behalf of this session.
    #[must_use]
    pub const fn is_in_flight(self) -> bool {
        matches!(self, Self::Exchanging | Self::Refreshing)
    }

    /// The session holds a usable token.
    #[must_use]
    pub const fn holds_token(self) -> bool {
        matches!(self, Self::Authenticated | Self::Refreshing)
    }
}
