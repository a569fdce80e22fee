pub mod workflow;

pub use workflow::{Connection, Connector, Node, Workflow, WorkflowSummary};
