use super::{ExecutionPool, Flow, Settings, TaskChain, TransformError};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};

/// Upper bound of concurrent fires in the parallel pool.
const MAX_PARALLEL_FIRES: usize = 1024;

/// How long in-flight fires may run after shutdown is signaled.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Serve the flow's cron triggers until `shutdown` is signaled.
///
/// One trigger loop runs per compiled chain. The parallel pool lets
/// distinct tasks (and distinct fires of one task) overlap; the serial
/// pool funnels every fire through a single permit. With `run_once` each
/// task fires exactly once after startup; the parallel pool then exits on
/// its own, while the serial pool quiesces until signaled.
pub async fn serve(flow: &Flow, mut shutdown: watch::Receiver<bool>) {
    let settings = flow.settings.clone();
    let permits = match settings.execution_pool {
        ExecutionPool::Parallel => MAX_PARALLEL_FIRES,
        ExecutionPool::Serial => 1,
    };
    let semaphore = Arc::new(Semaphore::new(permits));

    let mut triggers = Vec::with_capacity(flow.chains.len());
    for chain in &flow.chains {
        triggers.push(tokio::spawn(trigger_loop(
            chain.clone(),
            settings.clone(),
            semaphore.clone(),
            shutdown.clone(),
        )));
    }
    tracing::info!(tasks = triggers.len(), pool = %settings.execution_pool, "scheduler started");

    if settings.run_once && settings.execution_pool == ExecutionPool::Parallel {
        // Every trigger fires once; exit once the fires drain.
        for trigger in triggers {
            let _ = trigger.await;
        }
        let _ = semaphore.acquire_many(permits as u32).await;
        tracing::info!("run_once complete");
        return;
    }

    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            break;
        }
    }
    tracing::info!("scheduler signaled to stop; draining in-flight fires");

    for trigger in triggers {
        let _ = trigger.await;
    }
    if tokio::time::timeout(SHUTDOWN_GRACE, semaphore.acquire_many(permits as u32))
        .await
        .is_err()
    {
        tracing::warn!(grace_secs = SHUTDOWN_GRACE.as_secs(), "fires still running after grace period");
    }
}

/// Translate one task's cron expression into fire instants, dispatching a
/// fire per instant. Trigger emission is independent of fire execution:
/// fires run on their own tokio task, bounded by the pool's permits.
async fn trigger_loop(
    chain: Arc<TaskChain>,
    settings: Arc<Settings>,
    semaphore: Arc<Semaphore>,
    mut shutdown: watch::Receiver<bool>,
) {
    let schedule = match chain.task.cron.schedule() {
        Ok(schedule) => schedule,
        Err(err) => {
            // Unreachable after validation, but never worth a panic.
            tracing::error!(task = %chain.task.name, error = %err, "invalid cron expression");
            return;
        }
    };
    let timezone = settings.timezone;

    loop {
        if *shutdown.borrow() {
            return;
        }

        if !settings.run_once {
            let Some(next) = schedule.upcoming(timezone).next() else {
                tracing::warn!(task = %chain.task.name, "cron schedule has no upcoming fire instants");
                return;
            };
            let wait = (next - Utc::now().with_timezone(&timezone))
                .to_std()
                .unwrap_or(Duration::ZERO);
            tokio::select! {
                _ = shutdown.changed() => return,
                _ = tokio::time::sleep(wait) => (),
            }
        }

        let permit = tokio::select! {
            _ = shutdown.changed() => return,
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
        };

        let chain = chain.clone();
        let settings_for_task = settings.clone();
        tokio::spawn(async move {
            let _permit = permit;
            dispatch(&chain, &settings_for_task).await;
        });

        if settings.run_once {
            return;
        }
    }
}

/// Dispatch one fire of a task through its compiled chain. Every step is
/// its own failure boundary; all failures are isolated to this fire.
pub async fn dispatch(chain: &TaskChain, settings: &Settings) {
    let task = &chain.task;
    let fired_at = Utc::now();
    let started = tokio::time::Instant::now();

    // Invoke the input, retrying per the task's policy. Only this step
    // retries.
    let mut attempt = 0u32;
    let records = loop {
        match chain.input.run(&task.params).await {
            Ok(records) => break records,
            Err(err) => {
                attempt += 1;
                if attempt > task.max_retries {
                    tracing::error!(
                        task = %task.name,
                        input = %chain.input_name,
                        attempts = attempt,
                        error = %render_error(&err, settings),
                        "input failed after all retries; dropping this fire"
                    );
                    return;
                }
                tracing::warn!(
                    task = %task.name,
                    input = %chain.input_name,
                    attempt,
                    error = %render_error(&err, settings),
                    "input failed; retrying"
                );
                tokio::time::sleep(task.retry_delay.to_std()).await;
            }
        }
    };

    // Project records into a frame. Violations here are configuration
    // level: not retryable, the fire is dropped.
    let mut frame = match super::build_frame(
        task,
        &settings.nested_attr_seperator,
        settings.allow_none_metric,
        records.into_vec(),
        fired_at,
    ) {
        Ok(frame) => frame,
        Err(err) => {
            tracing::error!(
                task = %task.name,
                input = %chain.input_name,
                error = %err,
                "failed to build metric frame; dropping this fire"
            );
            return;
        }
    };

    // Walk the transform chain in compiled order. Failures continue to the
    // next transform unless the transform signals a terminal error.
    for transform in &chain.transforms {
        match transform.module.apply(frame.metrics_mut()).await {
            Ok(()) => (),
            Err(TransformError::Failed(err)) => {
                tracing::error!(
                    task = %task.name,
                    transform = %transform.name,
                    error = %render_error(&err, settings),
                    "transform failed; continuing the chain"
                );
            }
            Err(TransformError::Terminal(err)) => {
                tracing::error!(
                    task = %task.name,
                    transform = %transform.name,
                    error = %render_error(&err, settings),
                    "transform aborted the chain; outputs skipped"
                );
                return;
            }
        }
    }

    // Walk the output chain. An output failure never blocks its siblings.
    if settings.disable_outputs {
        tracing::debug!(task = %task.name, "outputs disabled; dropping frame");
        return;
    }
    for output in &chain.outputs {
        if let Err(err) = output.module.emit(&frame).await {
            tracing::error!(
                task = %task.name,
                output = %output.name,
                error = %render_error(&err, settings),
                "output failed"
            );
        }
    }

    tracing::debug!(
        task = %task.name,
        input = %chain.input_name,
        metrics = frame.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "fire complete"
    );
}

fn render_error(err: &anyhow::Error, settings: &Settings) -> String {
    if settings.print_traceback {
        format!("{err:?}")
    } else {
        format!("{err}")
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        BoundOutput, BoundTransform, InputModule, Lifecycle, NamedModule, OutputModule,
        TransformModule,
    };
    use async_trait::async_trait;
    use models::{Metric, MetricFrame, Records, TaskDef};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct FlakyInput {
        failures: u32,
        calls: AtomicU32,
        records: Value,
    }

    impl FlakyInput {
        fn failing_forever() -> Self {
            Self {
                failures: u32::MAX,
                calls: AtomicU32::new(0),
                records: json!([]),
            }
        }

        fn failing(failures: u32, records: Value) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                records,
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Lifecycle for FlakyInput {}

    #[async_trait]
    impl InputModule for FlakyInput {
        async fn run(&self, _params: &Value) -> anyhow::Result<Records> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                anyhow::bail!("transient failure {call}");
            }
            Ok(serde_json::from_value(self.records.clone())?)
        }
    }

    #[derive(Default)]
    struct RecordingOutput {
        frames: Mutex<Vec<MetricFrame>>,
    }

    impl Lifecycle for RecordingOutput {}

    #[async_trait]
    impl OutputModule for RecordingOutput {
        async fn emit(&self, frame: &MetricFrame) -> anyhow::Result<()> {
            self.frames.lock().unwrap().push(frame.clone());
            Ok(())
        }
    }

    struct FailingTransform {
        terminal: bool,
    }

    impl Lifecycle for FailingTransform {}

    #[async_trait]
    impl TransformModule for FailingTransform {
        async fn apply(&self, _metrics: &mut [Metric]) -> Result<(), TransformError> {
            let err = anyhow::anyhow!("refused");
            Err(if self.terminal {
                TransformError::Terminal(err)
            } else {
                TransformError::Failed(err)
            })
        }
    }

    fn task(json: Value) -> TaskDef {
        serde_json::from_value(json).unwrap()
    }

    fn chain(
        input: Arc<dyn InputModule>,
        task_def: TaskDef,
        transforms: Vec<BoundTransform>,
        output: &Arc<RecordingOutput>,
    ) -> TaskChain {
        TaskChain {
            input_name: "test-input".to_string(),
            input,
            task: task_def,
            transforms,
            outputs: vec![BoundOutput {
                name: "recorder".to_string(),
                module: output.clone(),
            }],
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion() {
        let input = Arc::new(FlakyInput::failing_forever());
        let output = Arc::new(RecordingOutput::default());
        let chain = chain(
            input.clone(),
            task(json!({
                "name": "t1",
                "cron": "0 0 * * *",
                "max_retries": 2,
                "retry_delay": "1s",
            })),
            Vec::new(),
            &output,
        );

        let before = tokio::time::Instant::now();
        dispatch(&chain, &Settings::default()).await;

        // Three total attempts, one second apart, zero frames delivered.
        assert_eq!(input.calls(), 3);
        assert_eq!(before.elapsed(), Duration::from_secs(2));
        assert!(output.frames.lock().unwrap().is_empty());

        // The scheduler still accepts the next fire: dispatch again.
        dispatch(&chain, &Settings::default()).await;
        assert_eq!(input.calls(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_then_success() {
        let input = Arc::new(FlakyInput::failing(2, json!({"metric": 7})));
        let output = Arc::new(RecordingOutput::default());
        let chain = chain(
            input.clone(),
            task(json!({
                "name": "t1",
                "cron": "0 0 * * *",
                "max_retries": 2,
                "retry_delay": "1s",
            })),
            Vec::new(),
            &output,
        );

        dispatch(&chain, &Settings::default()).await;

        assert_eq!(input.calls(), 3);
        let frames = output.frames.lock().unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].metrics()[0].value, Some(models::Scalar::Int(7)));
    }

    #[tokio::test]
    async fn test_terminal_transform_skips_outputs() {
        let input = Arc::new(FlakyInput::failing(0, json!({"metric": 1})));
        let output = Arc::new(RecordingOutput::default());

        let failed = chain(
            input.clone(),
            task(json!({"name": "t1", "cron": "0 0 * * *"})),
            vec![BoundTransform {
                name: "failing".to_string(),
                priority: 0,
                module: Arc::new(FailingTransform { terminal: false }),
            }],
            &output,
        );
        dispatch(&failed, &Settings::default()).await;
        // A non-terminal failure still reaches the outputs.
        assert_eq!(output.frames.lock().unwrap().len(), 1);

        let terminal = chain(
            input,
            task(json!({"name": "t2", "cron": "0 0 * * *"})),
            vec![BoundTransform {
                name: "terminal".to_string(),
                priority: 0,
                module: Arc::new(FailingTransform { terminal: true }),
            }],
            &output,
        );
        dispatch(&terminal, &Settings::default()).await;
        assert_eq!(output.frames.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_disable_outputs_drops_frames() {
        let input = Arc::new(FlakyInput::failing(0, json!({"metric": 1})));
        let output = Arc::new(RecordingOutput::default());
        let chain = chain(
            input,
            task(json!({"name": "t1", "cron": "0 0 * * *"})),
            Vec::new(),
            &output,
        );

        let settings = Settings {
            disable_outputs: true,
            ..Settings::default()
        };
        dispatch(&chain, &settings).await;
        assert!(output.frames.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_once_parallel_fires_each_task_once_and_exits() {
        let output = Arc::new(RecordingOutput::default());
        let mut chains = Vec::new();
        for name in ["t1", "t2"] {
            chains.push(Arc::new(chain(
                Arc::new(FlakyInput::failing(0, json!({"metric": 1}))),
                task(json!({"name": name, "cron": "0 0 * * *"})),
                Vec::new(),
                &output,
            )));
        }
        let flow = Flow {
            settings: Arc::new(Settings {
                run_once: true,
                ..Settings::default()
            }),
            modules: Vec::<NamedModule>::new(),
            chains,
        };

        let (_tx, rx) = watch::channel(false);
        serve(&flow, rx).await;

        assert_eq!(output.frames.lock().unwrap().len(), 2);
    }
}
