//! The core agent loop for Toolwright.
//!
//! A turn follows an **ask → act → observe** cycle:
//!
//! 1. **Receive** a human message for a session
//! 2. **Ask** the model (via [`ModelGateway`]) for its next step
//! 3. **If tool calls**: optionally wait for approval, run them through the
//!    [`ToolExecutor`], append the results, loop back to step 2
//! 4. **If text**: append it and return it to the caller
//!
//! The loop continues until the model answers with text, the iteration cap
//! is reached, or the model fails (which yields a fixed apology).

pub mod executor;
pub mod loop_runner;
pub mod model;

#[cfg(test)]
mod test_helpers;

pub use executor::ToolExecutor;
pub use loop_runner::{
    AgentLoop, Approval, ITERATION_LIMIT_MESSAGE, LoopState, MODEL_FAILURE_MESSAGE, TurnOutcome,
};
pub use model::{ChunkObserver, ModelGateway};
