//! Submission dispatcher.
//!
//! Executes one submission at a time against the backend and emits exactly one
//! `Completed` event per accepted submission, whatever happens to the worker.

use crate::engine::{Backend, ExecError, ModuleRunner, PlayError};
use crate::model::{
    Failure, InfoEvent, Operation, Outcome, PlayEvent, Submission,
};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

/// Commands emitted by UI layers.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    Submit(Submission),
    Quit,
}

/// Internal handle for the in-flight submission.
struct RunCtx {
    id: u64,
    handle: Option<tokio::task::JoinHandle<Outcome>>,
}

fn failure_from(operation: Operation, err: PlayError) -> Failure {
    match err {
        PlayError::Transport(e) => Failure::Transport(e.to_string()),
        PlayError::Malformed(msg) => Failure::Transport(format!("malformed response: {msg}")),
        PlayError::Application { status, body } => {
            tracing::debug!(status, operation = operation.name(), "backend rejected request");
            Failure::Application {
                operation,
                message: body,
            }
        }
    }
}

/// Send `submission` to the backend and, for executable compile targets, run the result.
pub(crate) async fn execute_submission(
    backend: Arc<dyn Backend>,
    runner: Arc<dyn ModuleRunner>,
    submission: Submission,
    event_tx: UnboundedSender<PlayEvent>,
) -> Outcome {
    let Submission {
        id,
        operation,
        source,
        ..
    } = submission;

    match operation {
        Operation::Run => match backend.run(&source).await {
            Ok(resp) => Outcome::Ran(resp),
            Err(e) => Outcome::Failed(failure_from(operation, e)),
        },
        Operation::Format => match backend.format(&source).await {
            Ok(text) => Outcome::Formatted(text),
            Err(e) => Outcome::Failed(failure_from(operation, e)),
        },
        Operation::Compile(target) => {
            let wasm = match backend.compile(&source, target).await {
                Ok(bytes) => bytes,
                Err(e) => return Outcome::Failed(failure_from(operation, e)),
            };
            if !target.is_executable() {
                tracing::info!(id, target = target.as_query_str(), "module not executable here");
                return Outcome::NeedsRuntime(target);
            }

            let stage_tx = event_tx.clone();
            let joined = tokio::task::spawn_blocking(move || {
                runner.execute(&wasm, &|message: &str| {
                    let _ = stage_tx.send(PlayEvent::Stage {
                        id,
                        message: message.to_string(),
                    });
                })
            })
            .await;

            match joined {
                Ok(Ok(execution)) => Outcome::Executed(execution),
                Ok(Err(ExecError::Instantiate(e))) => {
                    Outcome::Failed(Failure::Instantiation(format!("{e:#}")))
                }
                Ok(Err(ExecError::Runtime(e))) => {
                    Outcome::Failed(Failure::Runtime(format!("{e:#}")))
                }
                Err(e) => Outcome::Failed(Failure::Runtime(format!("execution task failed: {e}"))),
            }
        }
    }
}

fn start_submission(
    backend: &Arc<dyn Backend>,
    runner: &Arc<dyn ModuleRunner>,
    submission: Submission,
    event_tx: &UnboundedSender<PlayEvent>,
) -> RunCtx {
    let id = submission.id;
    let handle = tokio::spawn(execute_submission(
        backend.clone(),
        runner.clone(),
        submission,
        event_tx.clone(),
    ));
    RunCtx {
        id,
        handle: Some(handle),
    }
}

/// Execute submissions from UI commands and emit events back to presentation layers.
pub(crate) async fn run_controller(
    backend: Arc<dyn Backend>,
    runner: Arc<dyn ModuleRunner>,
    event_tx: UnboundedSender<PlayEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    let mut run_ctx: Option<RunCtx> = None;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(UiCommand::Submit(submission)) => {
                        if run_ctx.is_some() {
                            // The UI disables its controls while busy; this only guards
                            // against a submit racing the completion event.
                            let _ = event_tx.send(PlayEvent::Info(InfoEvent::Busy {
                                rejected: submission.operation,
                            }));
                            continue;
                        }
                        run_ctx = Some(start_submission(&backend, &runner, submission, &event_tx));
                    }
                    Some(UiCommand::Quit) | None => {
                        if let Some(mut ctx) = run_ctx.take() {
                            if let Some(h) = ctx.handle.take() {
                                h.abort();
                            }
                            // Aborting the task does not stop a module already running on
                            // a blocking thread, and runtime shutdown waits for it.
                            runner.interrupt();
                        }
                        break Ok(());
                    }
                }
            }
            // Do not take the JoinHandle before this branch wins; otherwise it can be dropped
            // if another select branch is chosen, and we'll never observe completion.
            maybe_done = async {
                if let Some(ctx) = &mut run_ctx {
                    if let Some(h) = ctx.handle.as_mut() {
                        return Some(h.await);
                    }
                }
                futures::future::pending().await
            } => {
                if let Some(join_res) = maybe_done {
                    let Some(ctx) = run_ctx.take() else { continue };
                    let outcome = match join_res {
                        Ok(outcome) => outcome,
                        Err(e) => Outcome::Failed(Failure::Transport(format!("request task failed: {e}"))),
                    };
                    let _ = event_tx.send(PlayEvent::Completed { id: ctx.id, outcome });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::WasmRunner;
    use crate::model::{Execution, RunResponse, SubmissionStatus, Target};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc as std_mpsc, Mutex};
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct FakeBackend {
        calls: AtomicUsize,
        delay: Duration,
        fail_format: bool,
        /// Compile response; a header-only module when unset.
        module: Option<Vec<u8>>,
        panic_on_run: bool,
    }

    #[async_trait]
    impl Backend for FakeBackend {
        async fn run(&self, source: &str) -> Result<RunResponse, PlayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.panic_on_run {
                panic!("backend blew up");
            }
            tokio::time::sleep(self.delay).await;
            Ok(RunResponse {
                output: format!("{} bytes\n", source.len()),
                error: String::new(),
            })
        }

        async fn format(&self, source: &str) -> Result<String, PlayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_format {
                return Err(PlayError::Application {
                    status: 400,
                    body: "unexpected token".into(),
                });
            }
            Ok(source.trim().to_string() + "\n")
        }

        async fn compile(&self, _source: &str, _target: Target) -> Result<Bytes, PlayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(match &self.module {
                Some(wasm) => Bytes::from(wasm.clone()),
                None => Bytes::from_static(b"\0asm\x01\0\0\0"),
            })
        }
    }

    #[derive(Default)]
    struct CountingRunner {
        executions: AtomicUsize,
    }

    impl ModuleRunner for CountingRunner {
        fn execute(&self, _wasm: &[u8], on_stage: &dyn Fn(&str)) -> Result<Execution, ExecError> {
            self.executions.fetch_add(1, Ordering::SeqCst);
            on_stage("Instantiating WASM...");
            Ok(Execution::NoEntryPoint)
        }
    }

    struct TrappingRunner;

    impl ModuleRunner for TrappingRunner {
        fn execute(&self, _wasm: &[u8], _on_stage: &dyn Fn(&str)) -> Result<Execution, ExecError> {
            Err(ExecError::Runtime(anyhow::anyhow!("wasm trap: unreachable")))
        }
    }

    /// Real runner that reports whether each execution ended in an error.
    struct ReportingRunner {
        inner: WasmRunner,
        done: Mutex<std_mpsc::Sender<bool>>,
    }

    impl ModuleRunner for ReportingRunner {
        fn execute(&self, wasm: &[u8], on_stage: &dyn Fn(&str)) -> Result<Execution, ExecError> {
            let res = self.inner.execute(wasm, on_stage);
            let _ = self.done.lock().unwrap().send(res.is_err());
            res
        }

        fn interrupt(&self) {
            self.inner.interrupt();
        }
    }

    fn submission(id: u64, operation: Operation, source: &str) -> Submission {
        Submission {
            id,
            operation,
            source: source.into(),
            status: SubmissionStatus::Pending,
        }
    }

    async fn execute(
        backend: Arc<dyn Backend>,
        runner: Arc<dyn ModuleRunner>,
        operation: Operation,
    ) -> (Outcome, Vec<PlayEvent>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let outcome =
            execute_submission(backend, runner, submission(1, operation, "package main"), tx).await;
        let mut events = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            events.push(ev);
        }
        (outcome, events)
    }

    #[tokio::test]
    async fn wasi_compile_never_reaches_the_runner() {
        let runner = Arc::new(CountingRunner::default());
        let (outcome, _) = execute(
            Arc::new(FakeBackend::default()),
            runner.clone(),
            Operation::Compile(Target::Wasi),
        )
        .await;
        assert_eq!(outcome, Outcome::NeedsRuntime(Target::Wasi));
        assert_eq!(runner.executions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn wasm_compile_executes_and_reports_stages() {
        let runner = Arc::new(CountingRunner::default());
        let (outcome, events) = execute(
            Arc::new(FakeBackend::default()),
            runner.clone(),
            Operation::Compile(Target::Wasm),
        )
        .await;
        assert_eq!(outcome, Outcome::Executed(Execution::NoEntryPoint));
        assert_eq!(runner.executions.load(Ordering::SeqCst), 1);
        assert!(matches!(
            &events[..],
            [PlayEvent::Stage { id: 1, message }] if message == "Instantiating WASM..."
        ));
    }

    #[tokio::test]
    async fn runtime_trap_is_not_a_compile_error() {
        let (outcome, _) = execute(
            Arc::new(FakeBackend::default()),
            Arc::new(TrappingRunner),
            Operation::Compile(Target::Wasm),
        )
        .await;
        assert!(matches!(outcome, Outcome::Failed(Failure::Runtime(ref m)) if m.contains("unreachable")));
    }

    #[tokio::test]
    async fn format_rejection_becomes_application_failure() {
        let backend = FakeBackend {
            fail_format: true,
            ..Default::default()
        };
        let (outcome, _) = execute(
            Arc::new(backend),
            Arc::new(CountingRunner::default()),
            Operation::Format,
        )
        .await;
        assert_eq!(
            outcome,
            Outcome::Failed(Failure::Application {
                operation: Operation::Format,
                message: "unexpected token".into()
            })
        );
    }

    #[tokio::test]
    async fn second_submit_while_pending_sends_no_request() {
        let backend = Arc::new(FakeBackend {
            delay: Duration::from_millis(100),
            ..Default::default()
        });
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let controller = tokio::spawn(run_controller(
            backend.clone(),
            Arc::new(CountingRunner::default()),
            event_tx,
            cmd_rx,
        ));

        cmd_tx
            .send(UiCommand::Submit(submission(1, Operation::Run, "abc")))
            .unwrap();
        cmd_tx
            .send(UiCommand::Submit(submission(2, Operation::Run, "abc")))
            .unwrap();

        let mut busy_notices = 0;
        let completed = loop {
            match event_rx.recv().await.unwrap() {
                PlayEvent::Info(InfoEvent::Busy { .. }) => busy_notices += 1,
                PlayEvent::Completed { id, outcome } => break (id, outcome),
                PlayEvent::Stage { .. } | PlayEvent::Info(_) => {}
            }
        };

        assert_eq!(busy_notices, 1);
        assert_eq!(completed.0, 1);
        assert_eq!(
            completed.1,
            Outcome::Ran(RunResponse {
                output: "3 bytes\n".into(),
                error: String::new()
            })
        );
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);

        cmd_tx.send(UiCommand::Quit).unwrap();
        controller.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn controller_accepts_new_work_after_completion() {
        let backend = Arc::new(FakeBackend::default());
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let controller = tokio::spawn(run_controller(
            backend.clone(),
            Arc::new(CountingRunner::default()),
            event_tx,
            cmd_rx,
        ));

        for id in 1..=2 {
            cmd_tx
                .send(UiCommand::Submit(submission(id, Operation::Format, " x ")))
                .unwrap();
            loop {
                if let PlayEvent::Completed { id: done, .. } = event_rx.recv().await.unwrap() {
                    assert_eq!(done, id);
                    break;
                }
            }
        }
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);

        drop(cmd_tx);
        controller.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn panicking_worker_still_completes_and_frees_the_session() {
        let backend = Arc::new(FakeBackend {
            panic_on_run: true,
            ..Default::default()
        });
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let controller = tokio::spawn(run_controller(
            backend.clone(),
            Arc::new(CountingRunner::default()),
            event_tx,
            cmd_rx,
        ));

        cmd_tx
            .send(UiCommand::Submit(submission(1, Operation::Run, "x")))
            .unwrap();
        match event_rx.recv().await.unwrap() {
            PlayEvent::Completed { id, outcome } => {
                assert_eq!(id, 1);
                assert!(matches!(outcome, Outcome::Failed(Failure::Transport(_))));
            }
            other => panic!("unexpected event {other:?}"),
        }

        cmd_tx
            .send(UiCommand::Submit(submission(2, Operation::Format, " x ")))
            .unwrap();
        match event_rx.recv().await.unwrap() {
            PlayEvent::Completed { id, outcome } => {
                assert_eq!(id, 2);
                assert_eq!(outcome, Outcome::Formatted("x\n".into()));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);

        cmd_tx.send(UiCommand::Quit).unwrap();
        controller.await.unwrap().unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn quit_stops_a_module_that_never_returns() {
        let backend = Arc::new(FakeBackend {
            module: Some(
                wat::parse_str(r#"(module (func (export "_start") (loop br 0)))"#).unwrap(),
            ),
            ..Default::default()
        });
        let (done_tx, done_rx) = std_mpsc::channel();
        let runner = Arc::new(ReportingRunner {
            inner: WasmRunner::new().unwrap(),
            done: Mutex::new(done_tx),
        });
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let controller = tokio::spawn(run_controller(backend, runner, event_tx, cmd_rx));

        cmd_tx
            .send(UiCommand::Submit(submission(
                1,
                Operation::Compile(Target::Wasm),
                "package main",
            )))
            .unwrap();
        loop {
            if let PlayEvent::Stage { message, .. } = event_rx.recv().await.unwrap() {
                if message == "Executing..." {
                    break;
                }
            }
        }

        cmd_tx.send(UiCommand::Quit).unwrap();
        controller.await.unwrap().unwrap();

        // The blocking thread must come back, or runtime shutdown would wait forever.
        let errored = tokio::task::spawn_blocking(move || {
            done_rx.recv_timeout(Duration::from_secs(10))
        })
        .await
        .unwrap()
        .unwrap();
        assert!(errored);
    }
}
