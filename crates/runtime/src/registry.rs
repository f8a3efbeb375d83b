use async_trait::async_trait;
use models::{Metric, MetricFrame, ModuleVariant, Records};
use serde_json::Value;
use sources::{ModuleSchemas, SchemaSource};
use std::collections::BTreeMap;
use std::sync::Arc;
use validation::Schema;

/// Lifecycle hooks shared by every module variant. All hooks default to
/// no-ops.
#[async_trait]
pub trait Lifecycle: Send + Sync {
    /// Runs once at startup in registration order. A failure here aborts
    /// startup.
    async fn on_connect(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs at shutdown on every module before connections close;
    /// typically used to flush.
    async fn on_pre_shutdown(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs last, in reverse registration order. Must close resources;
    /// failures are logged and do not block further shutdown.
    async fn on_shutdown(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// An input produces records when a task fires. The task's parameters are
/// passed on every invocation.
#[async_trait]
pub trait InputModule: Lifecycle {
    async fn run(&self, params: &Value) -> anyhow::Result<Records>;
}

/// A transform mutates a frame's metrics in place. The slice length is
/// fixed: transforms cannot add or remove metrics.
#[async_trait]
pub trait TransformModule: Lifecycle {
    async fn apply(&self, metrics: &mut [Metric]) -> Result<(), TransformError>;
}

/// An output emits a finished frame to an external sink, read-only.
#[async_trait]
pub trait OutputModule: Lifecycle {
    async fn emit(&self, frame: &MetricFrame) -> anyhow::Result<()>;
}

/// TransformError distinguishes recoverable failures (the chain continues
/// with the next transform) from terminal ones (the chain aborts and
/// outputs are skipped).
#[derive(thiserror::Error, Debug)]
pub enum TransformError {
    #[error(transparent)]
    Failed(anyhow::Error),
    #[error(transparent)]
    Terminal(anyhow::Error),
}

/// Module is an instantiated module of any variant.
#[derive(Clone)]
pub enum Module {
    Input(Arc<dyn InputModule>),
    Transform(Arc<dyn TransformModule>),
    Output(Arc<dyn OutputModule>),
}

impl Module {
    pub fn variant(&self) -> ModuleVariant {
        match self {
            Module::Input(_) => ModuleVariant::Input,
            Module::Transform(_) => ModuleVariant::Transform,
            Module::Output(_) => ModuleVariant::Output,
        }
    }

    pub async fn on_connect(&self) -> anyhow::Result<()> {
        match self {
            Module::Input(m) => m.on_connect().await,
            Module::Transform(m) => m.on_connect().await,
            Module::Output(m) => m.on_connect().await,
        }
    }

    pub async fn on_pre_shutdown(&self) -> anyhow::Result<()> {
        match self {
            Module::Input(m) => m.on_pre_shutdown().await,
            Module::Transform(m) => m.on_pre_shutdown().await,
            Module::Output(m) => m.on_pre_shutdown().await,
        }
    }

    pub async fn on_shutdown(&self) -> anyhow::Result<()> {
        match self {
            Module::Input(m) => m.on_shutdown().await,
            Module::Transform(m) => m.on_shutdown().await,
            Module::Output(m) => m.on_shutdown().await,
        }
    }

    pub fn as_input(&self) -> Option<Arc<dyn InputModule>> {
        match self {
            Module::Input(m) => Some(m.clone()),
            _ => None,
        }
    }

    pub fn as_transform(&self) -> Option<Arc<dyn TransformModule>> {
        match self {
            Module::Transform(m) => Some(m.clone()),
            _ => None,
        }
    }

    pub fn as_output(&self) -> Option<Arc<dyn OutputModule>> {
        match self {
            Module::Output(m) => Some(m.clone()),
            _ => None,
        }
    }
}

/// Constructor builds a module instance from its validated connection and
/// module-level parameters (inputs receive task parameters per fire, not
/// here).
type Constructor = Box<dyn Fn(&Value, &Value) -> anyhow::Result<Module> + Send + Sync>;

struct RegistryEntry {
    variant: ModuleVariant,
    connection: Schema,
    params: Schema,
    construct: Constructor,
}

#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    #[error("a module of type {type_:?} is already registered")]
    Duplicate { type_: String },
    #[error("{type_:?} is not a registered module type")]
    Unknown { type_: String },
}

/// Registry maps module `type` strings to their variant, schemas, and
/// constructor. Registration is an explicit table: there is no implicit
/// discovery and no inheritance of registrations.
#[derive(Default)]
pub struct Registry {
    entries: BTreeMap<String, RegistryEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in modules.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        super::modules::register_builtins(&mut registry)
            .unwrap_or_else(|err| panic!("registering builtin modules: {err}"));
        registry
    }

    pub fn register(
        &mut self,
        type_: impl Into<String>,
        variant: ModuleVariant,
        connection: Schema,
        params: Schema,
        construct: impl Fn(&Value, &Value) -> anyhow::Result<Module> + Send + Sync + 'static,
    ) -> Result<(), RegistryError> {
        let type_ = type_.into();
        if self.entries.contains_key(&type_) {
            return Err(RegistryError::Duplicate { type_ });
        }
        self.entries.insert(
            type_,
            RegistryEntry {
                variant,
                connection,
                params,
                construct: Box::new(construct),
            },
        );
        Ok(())
    }

    pub fn construct(
        &self,
        type_: &str,
        connection: &Value,
        params: &Value,
    ) -> anyhow::Result<Module> {
        let entry = self.entries.get(type_).ok_or_else(|| RegistryError::Unknown {
            type_: type_.to_string(),
        })?;
        (entry.construct)(connection, params)
    }

    pub fn contains(&self, type_: &str) -> bool {
        self.entries.contains_key(type_)
    }
}

impl SchemaSource for Registry {
    fn lookup(&self, type_: &str) -> Option<ModuleSchemas<'_>> {
        self.entries.get(type_).map(|entry| ModuleSchemas {
            variant: entry.variant,
            connection: &entry.connection,
            params: &entry.params,
        })
    }

    fn known_types(&self, variant: ModuleVariant) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.variant == variant)
            .map(|(type_, _)| type_.as_str())
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let mut registry = Registry::with_builtins();
        let err = registry
            .register(
                "constant",
                ModuleVariant::Input,
                Schema::empty_object(),
                Schema::empty_object(),
                |_, _| unreachable!(),
            )
            .unwrap_err();
        assert!(matches!(err, RegistryError::Duplicate { .. }));
    }

    #[test]
    fn test_known_types_by_variant() {
        let registry = Registry::with_builtins();
        assert_eq!(registry.known_types(ModuleVariant::Input), vec!["constant"]);
        assert_eq!(
            registry.known_types(ModuleVariant::Transform),
            vec!["scale"]
        );
        assert_eq!(registry.known_types(ModuleVariant::Output), vec!["log"]);
    }
}
