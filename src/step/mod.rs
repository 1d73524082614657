//! Steps: typed units of work extracted from model responses.

pub mod parser;
pub mod types;

pub use parser::{ArtifactInfo, ParsedResponse, parse, parse_response};
pub use types::{Step, StepAction, StepId, StepKind, StepStatus};
