//! # Dodgeball client engine
//!
//! Tracks remote verifications to completion, loading the integrations
//! each step asks for and running every step at most once.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         apps/dodgeball                           │
//! │                                                                  │
//! │  ┌─────────────┐   ┌──────────────────┐   ┌──────────────────┐   │
//! │  │  Dodgeball  │──►│ VerificationEngine│──►│ IntegrationLoader│   │
//! │  │  (context)  │   │ (poll + dispatch) │   │ (cache by name)  │   │
//! │  └──────┬──────┘   └────────┬─────────┘   └────────┬─────────┘   │
//! │         │ IdentityResolver  │ VerificationService  │ Registry +  │
//! │         ▼                   ▼ (reqwest)            ▼ ModuleFetcher│
//! │                    ┌────────────────┐                            │
//! │                    │ dodgeball-core │                            │
//! │                    │  (THE MODEL)   │                            │
//! │                    └────────────────┘                            │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

pub mod cli;
pub mod client;
pub mod config;
pub mod context;
pub mod engine;
pub mod identity;
pub mod integration;
pub mod loader;
pub mod store;

pub use client::{DodgeballClient, StepSubmission, VerificationService};
pub use context::{Dodgeball, DodgeballBuilder};
pub use engine::{Resolution, VerificationEngine, VerificationHandler};
pub use identity::{DeviceIdentifier, IdentityHandle, IdentityResolver};
pub use integration::{
    HttpModuleFetcher, Integration, IntegrationConfig, IntegrationFactory, IntegrationRegistry,
    ModuleFetcher, ModuleOrigin, ModuleSource, SharedIntegration, StepContext, StepResponder,
    filter_by_purpose,
};
pub use loader::IntegrationLoader;
pub use store::{FileSourceIdStore, MemorySourceIdStore, SourceIdStore};
