pub mod alembic;
pub mod docker;
pub mod pipeline;

pub use alembic::{AlembicCli, MigrationTool};
pub use docker::{ContainerRuntime, DockerService};
pub use pipeline::{Pipeline, RunOptions, RunOutcome};
