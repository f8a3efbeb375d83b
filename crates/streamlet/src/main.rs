mod cli;
mod logging;

use anyhow::Context;
use clap::Parser;
use runtime::{Flow, Registry, SettingsBuilder, SettingsLayer};
use serde_json::json;
use std::process::ExitCode;
use tokio::sync::watch;

fn main() -> ExitCode {
    let cli = cli::Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("streamlet: {err:#}");
            ExitCode::FAILURE
        }
    }
}

#[tokio::main]
async fn run(cli: cli::Cli) -> anyhow::Result<ExitCode> {
    // Settings which gate loading and validation are resolved from the
    // command line and environment first; `flow.settings` joins once the
    // document exists and cannot override them.
    let mut builder = SettingsBuilder::new();
    for (name, value) in cli.settings.entries() {
        builder.apply(name, &value, SettingsLayer::CommandLine);
    }
    if cli.only_validate {
        builder.apply("only_validate", &json!(true), SettingsLayer::CommandLine);
    }
    builder.apply_env();

    logging::init(builder.current().log_level);

    let registry = Registry::with_builtins();
    let options = sources::BuildOptions {
        disable_default: builder.current().disable_default,
        skip_disabled_validation: builder.current().skip_disabled_validation,
        allow_none_metric: builder.current().allow_none_metric,
    };

    let (root, extra) = cli
        .config
        .split_first()
        .context("at least one --config path is required")?;
    let (spec, normalized, mut errors) = sources::build(root, extra, &registry, &options)?;

    if let Some(spec) = &spec {
        builder.apply_config(&spec.flow.settings);
    }
    let (settings, settings_errors) = builder.finish();
    errors.extend(settings_errors);

    if settings.print_config {
        println!("{}", serde_yaml::to_string(&normalized)?);
    }

    if !errors.is_empty() {
        eprint!("{errors}");
        tracing::error!(count = errors.len(), "configuration is invalid");
        return Ok(ExitCode::FAILURE);
    }
    let Some(spec) = spec else {
        return Ok(ExitCode::FAILURE);
    };

    let flow = Flow::build(&spec, &registry, settings.clone())?;

    if settings.only_validate {
        println!("{}", flow.render_chains());
        return Ok(ExitCode::SUCCESS);
    }
    if settings.disable_readiness_probe {
        tracing::debug!("readiness probe disabled");
    }

    flow.connect().await.context("startup hook failed")?;

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("shutdown signal received");
        let _ = stop_tx.send(true);
    });

    flow.serve(stop_rx).await;
    flow.shutdown().await;

    Ok(ExitCode::SUCCESS)
}

/// Resolves on SIGINT or, on unix, SIGTERM.
async fn wait_for_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = ctrl_c => (),
                    _ = term.recv() => (),
                }
            }
            Err(_) => {
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
