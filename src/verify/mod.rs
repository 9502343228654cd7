//! Equivalence checking against the base design
//!
//! Each check is a wrapper module, a prover script and one prover run.

pub mod prover;
pub mod script;
pub mod wrapper;

pub use prover::{DEFAULT_PROVER_COMMAND, ProofJob, ProofOutcome, Prover, ScriptProver, Verdict};
pub use script::render_script;
pub use wrapper::{Wrapper, render_wrapper, wrapper_name};
