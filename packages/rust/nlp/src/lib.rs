//! Spanish question understanding for aulabot.
//!
//! Two independent, stateless components:
//! - [`IntentClassifier`] maps a question to one [`aulabot_shared::Intent`]
//!   by counting trigger phrases.
//! - [`EntityExtractor`] pulls courses, specialties, subjects, shifts,
//!   person names, report topics, and numbers out of the same text.
//!
//! Neither ever fails; unknown input yields `Intent::Ambiguous` and an empty
//! entity set.

mod classifier;
mod extractor;

pub use classifier::IntentClassifier;
pub use extractor::EntityExtractor;
