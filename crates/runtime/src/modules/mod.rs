//! Built-in modules. Heavyweight connectors (SQL, search, HTTP, queues)
//! live out of tree; these small modules make a flow runnable end to end.

mod constant;
mod log;
mod scale;

pub use constant::ConstantInput;
pub use log::LogOutput;
pub use scale::ScaleTransform;

use super::{Module, Registry, RegistryError};
use models::ModuleVariant;
use std::sync::Arc;
use validation::{Property, Schema};

pub fn register_builtins(registry: &mut Registry) -> Result<(), RegistryError> {
    registry.register(
        "constant",
        ModuleVariant::Input,
        Schema::empty_object(),
        Schema::object(vec![Property::required("records", Schema::Any)]),
        |_connection, _params| Ok(Module::Input(Arc::new(ConstantInput))),
    )?;

    registry.register(
        "scale",
        ModuleVariant::Transform,
        Schema::empty_object(),
        Schema::object(vec![Property::with_default(
            "factor",
            Schema::Float,
            serde_json::json!(1.0),
        )]),
        |_connection, params| {
            Ok(Module::Transform(Arc::new(ScaleTransform::from_params(
                params,
            )?)))
        },
    )?;

    registry.register(
        "log",
        ModuleVariant::Output,
        Schema::empty_object(),
        Schema::empty_object(),
        |_connection, _params| Ok(Module::Output(Arc::new(LogOutput))),
    )?;

    Ok(())
}
