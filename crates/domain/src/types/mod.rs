//! Domain value types

pub mod authorization;
pub mod provider;
pub mod session;
pub mod token;

pub use authorization::{AuthorizationRequest, CallbackPayload};
pub use provider::{ProviderConfig, ProviderId};
pub use session::SessionPhase;
pub use token::{Token, TokenBuilder};
