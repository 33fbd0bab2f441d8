//! Domain model for the status synchronization engine.
//!
//! One observed job is one [`JobState`]: a pure in-memory projection built by
//! folding canonical operations ([`SyncOp`]) through an idempotent, monotone
//! reduction. The model has no I/O and no knowledge of which channel an
//! update came from.
//!
//! - **Types** (`types.rs`): identifiers and the ranked enumerations.
//! - **State** (`state.rs`): the aggregate and its derived accessors.
//! - **Ops** (`ops.rs`): the canonical operation set and emitted change facts.
//! - **Reducer** (`reducer.rs`): `JobState::apply`, the only mutation path.

pub mod ops;
pub mod state;
pub mod types;

mod reducer;

pub use ops::{StateChange, SyncOp, TeamSnapshot};
pub use state::{JobSeed, JobState, TeamSeed};
pub use types::{JobId, Phase, TeamId, TeamStatus, Thought, ThoughtId};
