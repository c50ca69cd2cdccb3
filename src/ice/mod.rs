pub mod agent;
pub mod candidate;
pub mod turn;

pub use agent::{Agent, AgentEvent, Credentials, IceConnectionState, IceRole, Transmit};
pub use candidate::{pair_priority, Candidate, CandidateType};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum IceError {
    #[error("candidate gathering timed out")]
    GatheringTimeout,
    #[error("no candidate pair could be validated")]
    NoValidPair,
    #[error("consent freshness expired on the selected pair")]
    ConsentFailed,
    #[error("role conflict could not be resolved")]
    RoleConflictUnresolved,
    #[error("remote credentials are not set")]
    MissingRemoteCredentials,
    #[error("malformed remote candidate: {0}")]
    BadRemoteCandidate(String),
    #[error("agent is closed")]
    Closed,
}
