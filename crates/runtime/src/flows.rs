use super::{admits, BoundOutput, BoundTransform, Module, Registry, Settings, TaskChain};
use super::{lifecycle, scheduler};
use anyhow::Context;
use itertools::Itertools;
use models::FlowSpec;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;

/// A constructed module instance with its resolved display name.
pub struct NamedModule {
    pub name: String,
    pub type_: String,
    pub module: Module,
}

/// Flow is the top-level application instance: it owns the constructed
/// modules, the compiled task chains, and the resolved settings. All of it
/// is read-only once built.
pub struct Flow {
    pub settings: Arc<Settings>,
    /// Modules in registration order (inputs, transforms, outputs, each in
    /// declaration order); the lifecycle hooks walk this sequence.
    pub modules: Vec<NamedModule>,
    pub chains: Vec<Arc<TaskChain>>,
}

impl Flow {
    /// Construct every enabled module and compile each enabled task's
    /// chain.
    pub fn build(spec: &FlowSpec, registry: &Registry, settings: Settings) -> anyhow::Result<Flow> {
        let mut modules = Vec::new();

        let mut inputs = Vec::new();
        for def in spec.inputs.iter().filter(|def| def.enabled) {
            let module = registry
                .construct(def.type_.as_str(), &def.connection, &Value::Null)
                .with_context(|| format!("constructing input {:?}", def.display_name()))?;
            let input = module
                .as_input()
                .with_context(|| format!("module type {:?} is not an input", def.type_))?;
            modules.push(NamedModule {
                name: def.display_name().to_string(),
                type_: def.type_.to_string(),
                module,
            });
            inputs.push((def, input));
        }

        let mut transforms = Vec::new();
        for def in spec.transforms.iter().filter(|def| def.enabled) {
            let module = registry
                .construct(def.type_.as_str(), &def.connection, &def.params)
                .with_context(|| format!("constructing transform {:?}", def.display_name()))?;
            let transform = module
                .as_transform()
                .with_context(|| format!("module type {:?} is not a transform", def.type_))?;
            modules.push(NamedModule {
                name: def.display_name().to_string(),
                type_: def.type_.to_string(),
                module,
            });
            transforms.push((def, transform));
        }

        let mut outputs = Vec::new();
        for def in spec.outputs.iter().filter(|def| def.enabled) {
            let module = registry
                .construct(def.type_.as_str(), &def.connection, &def.params)
                .with_context(|| format!("constructing output {:?}", def.display_name()))?;
            let output = module
                .as_output()
                .with_context(|| format!("module type {:?} is not an output", def.type_))?;
            modules.push(NamedModule {
                name: def.display_name().to_string(),
                type_: def.type_.to_string(),
                module,
            });
            outputs.push((def, output));
        }

        let mut chains = Vec::new();
        for (input_def, input) in &inputs {
            let input_name = input_def.display_name();

            for task in input_def.tasks.iter().filter(|task| task.enabled) {
                let mut bound_transforms: Vec<BoundTransform> = transforms
                    .iter()
                    .filter(|(def, _)| admits(&def.filters, task.name.as_str(), input_name))
                    .map(|(def, module)| BoundTransform {
                        name: def.display_name().to_string(),
                        priority: def.priority,
                        module: module.clone(),
                    })
                    .collect();
                TaskChain::sort_transforms(&mut bound_transforms);

                let bound_outputs: Vec<BoundOutput> = outputs
                    .iter()
                    .filter(|(def, _)| admits(&def.filters, task.name.as_str(), input_name))
                    .map(|(def, module)| BoundOutput {
                        name: def.display_name().to_string(),
                        module: module.clone(),
                    })
                    .collect();

                chains.push(Arc::new(TaskChain {
                    input_name: input_name.to_string(),
                    input: input.clone(),
                    task: task.clone(),
                    transforms: bound_transforms,
                    outputs: bound_outputs,
                }));
            }
        }

        Ok(Flow {
            settings: Arc::new(settings),
            modules,
            chains,
        })
    }

    /// Render every compiled chain, for `--only-validate` output.
    pub fn render_chains(&self) -> String {
        self.chains.iter().map(|chain| chain.render()).join("\n")
    }

    /// Run startup hooks; any failure aborts startup.
    pub async fn connect(&self) -> anyhow::Result<()> {
        lifecycle::connect(&self.modules).await
    }

    /// Serve the scheduler until `shutdown` is signaled.
    pub async fn serve(&self, shutdown: watch::Receiver<bool>) {
        scheduler::serve(self, shutdown).await
    }

    /// Run the shutdown hook sequence.
    pub async fn shutdown(&self) {
        lifecycle::shutdown(&self.modules).await
    }
}
