//! External collaborators.
//!
//! Everything the pipeline reaches outside its process for lives behind a
//! trait here: embeddings ([`Embedder`]), claim verification
//! ([`ClaimVerifier`]), crisis-module handoff ([`CrisisModule`]), human
//! notification ([`HumanNotifier`]), and transcript storage
//! ([`TranscriptStore`]). HTTP implementations retry with exponential
//! backoff; a provider failure degrades the caller, it never aborts a turn.

mod crisis;
mod embedding;
mod transcript;
mod verify;

pub use crisis::*;
pub use embedding::*;
pub use transcript::*;
pub use verify::*;
