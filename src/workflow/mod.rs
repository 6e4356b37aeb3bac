//! The composite-tool workflow engine: template expansion, DAG-ordered
//! step execution, and structured output assembly.

pub mod dag;
pub mod executor;
pub mod output;
pub mod template;

pub use executor::{CompositeToolResult, ElicitationOutcome, StepExecutor, StepRecord, WorkflowEngine, WorkflowError};
