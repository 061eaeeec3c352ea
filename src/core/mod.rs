//! Core command pipeline
//!
//! Registry, builder, executor and health-check gate.

pub mod arguments;
pub mod builder;
pub mod executor;
pub mod health;
pub mod invocation;
pub mod registry;

pub use arguments::{Action, ArgumentDecl, ArgumentSpec, Nargs};
pub use builder::{BuiltCommand, CommandBuilder, ExecutableUnit};
pub use executor::Executor;
pub use health::{HealthCheck, HealthGate};
pub use invocation::{Invocation, KwValue, Kwargs};
pub use registry::{CommandEntry, CommandKind, ParserOptions, Registry};
