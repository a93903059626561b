//! Per-provider session state machine
//!
//! ```text
//! Idle ──Begin──▶ Authorizing ──CallbackAccepted──▶ Exchanging ──ExchangeSucceeded──▶ Authenticated
//!                  │    ▲                              │                                 │   ▲
//!   CallbackRejected    └──────ExchangeInterrupted─────┤                    RefreshStarted   │
//!                  ▼                                   ▼                                 ▼   │
//!                Failed ◀──────ExchangeFailed──────────┘                          Refreshing ┘
//!                                                                                        │
//!                                                                      RefreshFailed ──▶ Expired
//! ```
//!
//! `TokenLapsed` also moves `Authenticated` to `Expired` once a token without
//! a refresh credential runs out.
//!
//! `Begin` is accepted from `Idle`, `Failed`, `Expired` and `Authenticated`.
//! `Cancel` leaves `Authorizing`/`Exchanging` for `Idle`; `Reset` leaves any
//! phase for `Idle`. Anything else is an [`AuthError::InvalidTransition`].

use chrono::{DateTime, Utc};
use socialauth_domain::{AuthError, AuthorizationRequest, Result, SessionPhase, Token};
use uuid::Uuid;

/// Event fed into [`SessionState::apply`]
#[derive(Debug, Clone)]
pub enum SessionInput {
    /// A login started; carries the correlation token and PKCE verifier.
    Begin(AuthorizationRequest),
    /// The callback passed validation; the code exchange is about to run.
    CallbackAccepted { attempt: Uuid },
    /// The callback was unusable or the provider denied the login.
    CallbackRejected(AuthError),
    ExchangeSucceeded(Token),
    ExchangeFailed(AuthError),
    /// The exchange hit a transient failure; the same callback may be retried.
    ExchangeInterrupted(AuthError),
    RefreshStarted { attempt: Uuid },
    RefreshSucceeded(Token),
    /// The refresh credential was rejected for good.
    RefreshFailed(AuthError),
    /// The refresh hit a transient failure; the old token stays usable.
    RefreshInterrupted(AuthError),
    /// The token expired and has no refresh credential.
    TokenLapsed(AuthError),
    Cancel,
    Reset,
}

impl SessionInput {
    /// Stable label for logs and [`AuthError::InvalidTransition`].
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Begin(_) => "begin",
            Self::CallbackAccepted { .. } => "callback_accepted",
            Self::CallbackRejected(_) => "callback_rejected",
            Self::ExchangeSucceeded(_) => "exchange_succeeded",
            Self::ExchangeFailed(_) => "exchange_failed",
            Self::ExchangeInterrupted(_) => "exchange_interrupted",
            Self::RefreshStarted { .. } => "refresh_started",
            Self::RefreshSucceeded(_) => "refresh_succeeded",
            Self::RefreshFailed(_) => "refresh_failed",
            Self::RefreshInterrupted(_) => "refresh_interrupted",
            Self::TokenLapsed(_) => "token_lapsed",
            Self::Cancel => "cancel",
            Self::Reset => "reset",
        }
    }
}

/// Phase change produced by a successful [`SessionState::apply`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: SessionPhase,
    pub to: SessionPhase,
}

/// Lifecycle of one provider's login
///
/// Mutated only through [`apply`](Self::apply), which either performs a
/// listed transition or rejects the input and leaves the state untouched.
#[derive(Debug, Clone)]
pub struct SessionState {
    phase: SessionPhase,
    token: Option<Token>,
    last_error: Option<AuthError>,
    correlation: Option<String>,
    pkce_verifier: Option<String>,
    attempt: Option<Uuid>,
    updated_at: DateTime<Utc>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::Idle,
            token: None,
            last_error: None,
            correlation: None,
            pkce_verifier: None,
            attempt: None,
            updated_at: Utc::now(),
        }
    }

    #[must_use]
    pub const fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// The usable token; `None` outside `Authenticated`/`Refreshing`.
    #[must_use]
    pub fn token(&self) -> Option<&Token> {
        if self.phase.holds_token() {
            self.token.as_ref()
        } else {
            None
        }
    }

    #[must_use]
    pub const fn last_error(&self) -> Option<&AuthError> {
        self.last_error.as_ref()
    }

    /// Correlation token of the outstanding authorization request.
    #[must_use]
    pub fn correlation(&self) -> Option<&str> {
        self.correlation.as_deref()
    }

    #[must_use]
    pub fn pkce_verifier(&self) -> Option<&str> {
        self.pkce_verifier.as_deref()
    }

    /// Whether `attempt` is the network call this session is waiting on.
    #[must_use]
    pub fn is_current_attempt(&self, attempt: Uuid) -> bool {
        self.phase.is_in_flight() && self.attempt == Some(attempt)
    }

    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Record a failure that does not move the session (e.g. a spoofed
    /// callback against a pending login).
    pub fn record_error(&mut self, error: AuthError) {
        self.last_error = Some(error);
        self.updated_at = Utc::now();
    }

    /// Apply one input
    ///
    /// # Errors
    /// Returns [`AuthError::InvalidTransition`] if `input` is not accepted in
    /// the current phase. The state is left unchanged in that case.
    pub fn apply(&mut self, input: SessionInput) -> Result<Transition> {
        use SessionInput as In;
        use SessionPhase as P;

        let from = self.phase;
        let to = match (from, input) {
            (P::Idle | P::Failed | P::Expired | P::Authenticated, In::Begin(request)) => {
                self.token = None;
                self.last_error = None;
                self.attempt = None;
                self.correlation = Some(request.correlation().to_string());
                self.pkce_verifier = request.pkce_verifier().map(str::to_string);
                P::Authorizing
            }
            (P::Authorizing, In::CallbackAccepted { attempt }) => {
                self.attempt = Some(attempt);
                P::Exchanging
            }
            (P::Authorizing, In::CallbackRejected(error)) => {
                self.clear_pending();
                self.last_error = Some(error);
                P::Failed
            }
            (P::Exchanging, In::ExchangeSucceeded(token)) => {
                self.clear_pending();
                self.token = Some(token);
                self.last_error = None;
                P::Authenticated
            }
            (P::Exchanging, In::ExchangeFailed(error)) => {
                self.clear_pending();
                self.last_error = Some(error);
                P::Failed
            }
            (P::Exchanging, In::ExchangeInterrupted(error)) => {
                // Correlation and verifier survive so the callback can be replayed
                self.attempt = None;
                self.last_error = Some(error);
                P::Authorizing
            }
            (P::Authenticated, In::RefreshStarted { attempt }) => {
                self.attempt = Some(attempt);
                P::Refreshing
            }
            (P::Refreshing, In::RefreshSucceeded(token)) => {
                self.attempt = None;
                self.token = Some(token);
                self.last_error = None;
                P::Authenticated
            }
            (P::Refreshing, In::RefreshFailed(error)) => {
                self.attempt = None;
                self.token = None;
                self.last_error = Some(error);
                P::Expired
            }
            (P::Refreshing, In::RefreshInterrupted(error)) => {
                self.attempt = None;
                self.last_error = Some(error);
                P::Authenticated
            }
            (P::Authenticated, In::TokenLapsed(error)) => {
                self.token = None;
                self.last_error = Some(error);
                P::Expired
            }
            (P::Authorizing | P::Exchanging, In::Cancel) => {
                self.clear_pending();
                self.token = None;
                P::Idle
            }
            (_, In::Reset) => {
                *self = Self::new();
                P::Idle
            }
            (from, input) => {
                return Err(AuthError::InvalidTransition { from, input: input.name().to_string() })
            }
        };

        self.phase = to;
        self.updated_at = Utc::now();
        Ok(Transition { from, to })
    }

    /// Read-only copy for hosts.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            token: self.token().cloned(),
            last_error: self.last_error.clone(),
            awaiting_callback: self.phase == SessionPhase::Authorizing,
            updated_at: self.updated_at,
        }
    }

    fn clear_pending(&mut self) {
        self.correlation = None;
        self.pkce_verifier = None;
        self.attempt = None;
    }
}

/// Point-in-time view of a session
///
/// Holds no correlation token or PKCE verifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub token: Option<Token>,
    pub last_error: Option<AuthError>,
    pub awaiting_callback: bool,
    pub updated_at: DateTime<Utc>,
}
