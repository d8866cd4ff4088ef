//! Gatekeeper: resolves public keys to member profiles, creating records on
//! first sight and merging per-user overrides onto system defaults.

mod record;
mod store;

pub use record::{EffectiveProfile, IdentityRecord, UserOverrides};
pub use store::{IdentityService, SharedIdentityService};
