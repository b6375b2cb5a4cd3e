//! Collaborators the ledger consumes
//!
//! Each collaborator is a trait with an in-memory reference implementation.
//! Calls are synchronous request/response; a failed call aborts the ledger
//! operation that made it.

pub mod attestation;
pub mod clock;
pub mod custody;
pub mod oracle;
pub mod rate_model;

pub use attestation::{AttestationError, CreditAttestation, InMemoryAttestation};
pub use clock::{Clock, ManualClock, SystemClock};
pub use custody::{settle, CustodyError, InMemoryCustody, TokenCustody, TransferLeg};
pub use oracle::{OracleDirectory, OracleError, PriceOracle, StaticOracle};
pub use rate_model::{FixedRate, KinkedRate, RateModel, RateModelConfig, RateModelError};
