//! Provisioning module - the install-time steps and the pipeline that
//! sequences them.

pub mod build;
pub mod database;
pub mod deps;
pub mod pipeline;
pub mod render;
pub mod workspace;

pub use build::{BuildArtifact, BuildDriver, BuildTarget, TARGETS};
pub use database::{DatabaseInitializer, StatementOutcome};
pub use deps::{Dependency, DependencyProber, PackageSource, ProbeResult, Version};
pub use pipeline::{InstallPipeline, InstallState, InstallStep, InstallSummary, UpdateSummary};
pub use render::{ConfigMaterializer, EnvironmentConfig, NetworkParams, ResolverSettings};
pub use workspace::WorkspaceManager;
