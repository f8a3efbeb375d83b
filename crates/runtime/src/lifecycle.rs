use super::NamedModule;
use anyhow::Context;

/// Run `on_connect` for every module in registration order. Any failure
/// aborts startup.
pub async fn connect(modules: &[NamedModule]) -> anyhow::Result<()> {
    for entry in modules {
        entry
            .module
            .on_connect()
            .await
            .with_context(|| format!("connecting module {:?} (type {})", entry.name, entry.type_))?;
        tracing::debug!(module = %entry.name, type_ = %entry.type_, "module connected");
    }
    Ok(())
}

/// Run the shutdown sequence: `on_pre_shutdown` on every module (modules
/// may still flush work), then `on_shutdown` in reverse registration order.
/// Failures are logged and never block further shutdown.
pub async fn shutdown(modules: &[NamedModule]) {
    for entry in modules {
        if let Err(err) = entry.module.on_pre_shutdown().await {
            tracing::error!(module = %entry.name, error = %err, "pre-shutdown hook failed");
        }
    }
    for entry in modules.iter().rev() {
        if let Err(err) = entry.module.on_shutdown().await {
            tracing::error!(module = %entry.name, error = %err, "shutdown hook failed");
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{InputModule, Lifecycle, Module};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail_connect: bool,
    }

    #[async_trait]
    impl Lifecycle for Recorder {
        async fn on_connect(&self) -> anyhow::Result<()> {
            self.log.lock().unwrap().push(format!("connect {}", self.name));
            if self.fail_connect {
                anyhow::bail!("refused");
            }
            Ok(())
        }

        async fn on_pre_shutdown(&self) -> anyhow::Result<()> {
            self.log.lock().unwrap().push(format!("pre {}", self.name));
            Ok(())
        }

        async fn on_shutdown(&self) -> anyhow::Result<()> {
            self.log.lock().unwrap().push(format!("down {}", self.name));
            Ok(())
        }
    }

    #[async_trait]
    impl InputModule for Recorder {
        async fn run(&self, _params: &serde_json::Value) -> anyhow::Result<models::Records> {
            unreachable!("lifecycle tests never fire")
        }
    }

    fn named(
        name: &'static str,
        log: &Arc<Mutex<Vec<String>>>,
        fail_connect: bool,
    ) -> NamedModule {
        NamedModule {
            name: name.to_string(),
            type_: "recorder".to_string(),
            module: Module::Input(Arc::new(Recorder {
                name,
                log: log.clone(),
                fail_connect,
            })),
        }
    }

    #[tokio::test]
    async fn test_connect_order_and_shutdown_reversal() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let modules = vec![named("a", &log, false), named("b", &log, false)];

        connect(&modules).await.unwrap();
        shutdown(&modules).await;

        assert_eq!(
            *log.lock().unwrap(),
            vec!["connect a", "connect b", "pre a", "pre b", "down b", "down a"]
        );
    }

    #[tokio::test]
    async fn test_connect_failure_aborts() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let modules = vec![named("a", &log, true), named("b", &log, false)];

        let err = connect(&modules).await.unwrap_err();
        assert!(err.to_string().contains("\"a\""));
        // The second module is never reached.
        assert_eq!(*log.lock().unwrap(), vec!["connect a"]);
    }
}
