use clap::Parser;
use serde_json::{json, Value};
use std::path::PathBuf;

/// streamlet executes configurable data-pipeline flows: periodic tasks
/// fetch records from inputs, project them into metric frames, and
/// dispatch the frames through per-task transform and output chains.
#[derive(Debug, Parser)]
#[clap(name = "streamlet", version)]
pub struct Cli {
    /// Path to a flow configuration document. May be repeated: the first
    /// path is the root, and later paths merge beneath it like
    /// flow.extends entries.
    #[clap(long = "config", required = true)]
    pub config: Vec<PathBuf>,

    /// Validate the configuration, print the compiled chains, and exit.
    #[clap(long)]
    pub only_validate: bool,

    #[clap(flatten)]
    pub settings: SettingArgs,
}

/// One long flag per recognized setting. Boolean settings accept the bare
/// flag form. Values given here win over STREAMLET_* environment variables,
/// which in turn win over `flow.settings`.
#[derive(Debug, clap::Args)]
pub struct SettingArgs {
    /// Log verbosity: 0=off, 1=error, 2=warn, 3=info, 4=debug, 5=trace.
    #[clap(long)]
    pub log_level: Option<i64>,

    /// Fire each task exactly once after startup, then quiesce.
    #[clap(long, num_args = 0..=1, default_missing_value = "true")]
    pub run_once: Option<bool>,

    /// Print the normalized configuration document after composition.
    #[clap(long, num_args = 0..=1, default_missing_value = "true")]
    pub print_config: Option<bool>,

    /// Include error chains when logging failures.
    #[clap(long, num_args = 0..=1, default_missing_value = "true")]
    pub print_traceback: Option<bool>,

    /// Skip the output stage of every fire.
    #[clap(long, num_args = 0..=1, default_missing_value = "true")]
    pub disable_outputs: Option<bool>,

    /// Modules and tasks default to disabled until explicitly enabled.
    #[clap(long, num_args = 0..=1, default_missing_value = "true")]
    pub disable_default: Option<bool>,

    /// Execution pool: "parallel" or "serial".
    #[clap(long)]
    pub execution_pool: Option<String>,

    /// Do not expose the readiness probe.
    #[clap(long, num_args = 0..=1, default_missing_value = "true")]
    pub disable_readiness_probe: Option<bool>,

    /// Do not apply parameter schemas to disabled modules and tasks.
    #[clap(long, num_args = 0..=1, default_missing_value = "true")]
    pub skip_disabled_validation: Option<bool>,

    /// Permit tasks which select no metric fields at all.
    #[clap(long, num_args = 0..=1, default_missing_value = "true")]
    pub allow_none_metric: Option<bool>,

    /// Separator used to flatten nested record fields.
    #[clap(long)]
    pub nested_attr_seperator: Option<String>,

    /// IANA timezone for cron scheduling and metric timestamps.
    #[clap(long)]
    pub timezone: Option<String>,
}

impl SettingArgs {
    /// The command-line layer's (setting, value) pairs.
    pub fn entries(&self) -> Vec<(&'static str, Value)> {
        let mut out = Vec::new();

        if let Some(v) = self.log_level {
            out.push(("log_level", json!(v)));
        }
        for (name, value) in [
            ("run_once", self.run_once),
            ("print_config", self.print_config),
            ("print_traceback", self.print_traceback),
            ("disable_outputs", self.disable_outputs),
            ("disable_default", self.disable_default),
            ("disable_readiness_probe", self.disable_readiness_probe),
            ("skip_disabled_validation", self.skip_disabled_validation),
            ("allow_none_metric", self.allow_none_metric),
        ] {
            if let Some(v) = value {
                out.push((name, json!(v)));
            }
        }
        for (name, value) in [
            ("execution_pool", &self.execution_pool),
            ("nested_attr_seperator", &self.nested_attr_seperator),
            ("timezone", &self.timezone),
        ] {
            if let Some(v) = value {
                out.push((name, json!(v)));
            }
        }
        out
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parses_flags_and_bare_booleans() {
        let cli = Cli::parse_from([
            "streamlet",
            "--config",
            "flow.yaml",
            "--config",
            "extra.yaml",
            "--only-validate",
            "--run-once",
            "--log-level",
            "4",
            "--execution-pool",
            "serial",
        ]);

        assert_eq!(cli.config.len(), 2);
        assert!(cli.only_validate);

        let entries = cli.settings.entries();
        assert!(entries.contains(&("run_once", serde_json::json!(true))));
        assert!(entries.contains(&("log_level", serde_json::json!(4))));
        assert!(entries.contains(&("execution_pool", serde_json::json!("serial"))));
    }

    #[test]
    fn test_boolean_flags_accept_explicit_values() {
        let cli = Cli::parse_from(["streamlet", "--config", "f.yaml", "--run-once", "false"]);
        assert_eq!(cli.settings.run_once, Some(false));
    }
}
