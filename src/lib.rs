//! # rapid-verify
//!
//! Domain ownership verification engine.
//!
//! A developer claims a domain, receives a random token and setup
//! instructions, publishes the token out of band, and asks the engine to
//! verify. The engine fetches the published evidence, compares it to the
//! stored token and drives the proof through a small state machine:
//!
//! ```text
//!                 initiate
//!                    │
//!                    ▼
//!              ┌───────────┐  check fails, retries left
//!              │  PENDING  │◄──────────────┐
//!              └─────┬─────┘───────────────┘
//!        ┌───────────┼────────────────┐
//!   check passes   expiresAt      retries exhausted
//!        │          passed            │
//!        ▼           ▼                ▼
//!   ┌──────────┐ ┌─────────┐     ┌────────┐
//!   │ VERIFIED │ │ EXPIRED │     │ FAILED │
//!   └──────────┘ └─────────┘     └────────┘
//! ```
//!
//! Supported evidence:
//!
//! - **DNS TXT**: a TXT record at `_rapid-verify.<domain>`
//! - **Meta tag**: `<meta name="rapid-verify" content="...">` on the homepage
//! - **Hosted file**: `https://<domain>/rapid-verify.txt`
//! - **Manual review**: no automated check, parked for a human
//!
//! Developer/app bookkeeping and admin notification are collaborators
//! behind the traits in [`directory`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod config;
pub mod directory;
pub mod error;
pub mod event;
pub mod nullables;
pub mod orchestrator;
pub mod proof;
pub mod store;
pub mod strategy;

pub use clock::{Clock, SystemClock};
pub use config::{EngineConfig, VerifierConfig};
pub use directory::{AdminNotifier, AppDirectory, DeveloperDirectory, InMemoryDirectory};
pub use error::{Error, Result};
pub use event::VerificationEvent;
pub use orchestrator::{
    InitiateRequest, Initiated, Orchestrator, OrchestratorBuilder, VerifyOutcome,
};
pub use proof::{ProofId, ProofView, VerificationProof, VerificationStatus, VerificationType};
pub use store::{FileProofStore, MemoryProofStore, ProofStore};
