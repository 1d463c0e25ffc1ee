pub mod condition;
pub mod env;
pub mod model;
pub mod sln;

mod aggregate;
mod handlers;
mod line;

pub use env::{Environment, EnvironmentContext, LoadedProject, XmlEnvironment};
pub use model::{
    ConfigurationPlatform, GlobalProperties, ProjectConfigPlatform, ProjectDependencies,
    ProjectItem, ProjectItemConfig, ProjectKind, SolutionHeader,
};
pub use sln::{Sln, SlnBuilder, SlnError, SlnItems};
