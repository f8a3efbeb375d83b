mod chains;
mod flows;
mod frames;
mod lifecycle;
pub mod modules;
mod registry;
mod scheduler;
mod settings;

pub use chains::{admits, BoundOutput, BoundTransform, TaskChain};
pub use flows::{Flow, NamedModule};
pub use frames::{apply_modifiers, build_frame, FrameError};
pub use registry::{
    InputModule, Lifecycle, Module, OutputModule, Registry, RegistryError, TransformError,
    TransformModule,
};
pub use scheduler::{dispatch, serve};
pub use settings::{ExecutionPool, Settings, SettingsBuilder, SettingsLayer};
