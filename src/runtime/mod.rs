//! # Execution Controller
//!
//! Play/stop/restart lifecycle for compiled graph programs.
//!
//! A run dispatches the program once with event `start`, then once per
//! scheduler tick with event `tick`, until it is stopped or reaches the
//! configured tick limit. Each dispatch runs on tokio's blocking pool so a
//! long script never stalls the async runtime; stopping flips a cancel flag
//! that the script engine polls between operations.
//!
//! Everything observable about a run arrives as a [`RuntimeEvent`] on the
//! channel returned by [`ExecutionController::new`].

mod script_host;

pub use script_host::{DispatchError, ScriptHost};

use crate::codegen::node_handlers::{START_EVENT, TICK_EVENT};
use crate::config::RuntimeConfig;
use crate::error::ExecutionError;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Opaque binding to the host scene. Scripts only see it as a `Scene` value.
#[derive(Clone)]
pub struct SceneHandle(Arc<dyn Any + Send + Sync>);

impl SceneHandle {
    pub fn new<T: Any + Send + Sync>(scene: T) -> Self {
        Self(Arc::new(scene))
    }
}

impl fmt::Debug for SceneHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SceneHandle(..)")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// `scene` is unit inside the script
    Standalone,
    /// `scene` is bound to the controller's [`SceneHandle`]
    Scene,
}

impl ExecutionMode {
    pub fn from_standalone(standalone: bool) -> Self {
        if standalone {
            ExecutionMode::Standalone
        } else {
            ExecutionMode::Scene
        }
    }
}

/// Externally visible controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Running(ExecutionMode),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEvent {
    Started { mode: ExecutionMode },
    /// Text printed by the script
    Output(String),
    /// The script raised an error; the run is over but the controller stays
    /// running until stopped
    Fault(String),
    /// Tick limit reached
    Finished,
    Stopped,
}

struct ActiveRun {
    mode: ExecutionMode,
    cancel: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl ActiveRun {
    fn cancel(self) {
        self.cancel.store(true, Ordering::SeqCst);
        self.task.abort();
    }
}

enum RunState {
    Idle,
    Running(ActiveRun),
}

pub struct ExecutionController {
    scene: SceneHandle,
    config: RuntimeConfig,
    program: Option<String>,
    state: RunState,
    events: UnboundedSender<RuntimeEvent>,
}

impl ExecutionController {
    pub fn new(scene: SceneHandle, config: RuntimeConfig) -> (Self, UnboundedReceiver<RuntimeEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let controller = Self {
            scene,
            config,
            program: None,
            state: RunState::Idle,
            events,
        };
        (controller, receiver)
    }

    pub fn state(&self) -> ControllerState {
        match &self.state {
            RunState::Idle => ControllerState::Idle,
            RunState::Running(run) => ControllerState::Running(run.mode),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, RunState::Running(_))
    }

    /// Whether `start` would be accepted (drives the play button).
    pub fn can_start(&self) -> bool {
        !self.is_running() && self.program.is_some()
    }

    pub fn can_stop(&self) -> bool {
        self.is_running()
    }

    /// Replace the program used by the next `start`. A running program is
    /// not affected.
    pub fn load_program(&mut self, code: impl Into<String>) {
        self.program = Some(code.into());
    }

    pub fn program(&self) -> Option<&str> {
        self.program.as_deref()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Begin a run. Only legal from idle with a program loaded.
    pub fn start(&mut self, standalone: bool) -> Result<(), ExecutionError> {
        if self.is_running() {
            return Err(ExecutionError::AlreadyRunning);
        }
        let code = self.program.as_deref().ok_or(ExecutionError::NoProgram)?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ExecutionError::NoRuntime)?;

        let mode = ExecutionMode::from_standalone(standalone);
        let scene = match mode {
            ExecutionMode::Standalone => None,
            ExecutionMode::Scene => Some(self.scene.clone()),
        };

        let cancel = Arc::new(AtomicBool::new(false));
        let host = ScriptHost::new(
            code,
            scene,
            self.config.max_operations,
            Arc::clone(&cancel),
            self.events.clone(),
        )?;

        tracing::info!("[NGC:runtime] Starting run ({:?})", mode);
        let _ = self.events.send(RuntimeEvent::Started { mode });

        let task = runtime.spawn(run_loop(
            host,
            self.config.clone(),
            Arc::clone(&cancel),
            self.events.clone(),
        ));

        self.state = RunState::Running(ActiveRun { mode, cancel, task });
        Ok(())
    }

    /// End the current run. A no-op when idle.
    pub fn stop(&mut self) {
        match std::mem::replace(&mut self.state, RunState::Idle) {
            RunState::Idle => {
                tracing::debug!("[NGC:runtime] Stop requested while idle");
            }
            RunState::Running(run) => {
                tracing::info!("[NGC:runtime] Stopping run ({:?})", run.mode);
                run.cancel();
                let _ = self.events.send(RuntimeEvent::Stopped);
            }
        }
    }

    /// Exactly `stop()` followed by `start(standalone)`.
    pub fn restart(&mut self, standalone: bool) -> Result<(), ExecutionError> {
        self.stop();
        self.start(standalone)
    }
}

impl Drop for ExecutionController {
    fn drop(&mut self) {
        if let RunState::Running(run) = std::mem::replace(&mut self.state, RunState::Idle) {
            run.cancel();
        }
    }
}

async fn run_loop(
    mut host: ScriptHost,
    config: RuntimeConfig,
    cancel: Arc<AtomicBool>,
    events: UnboundedSender<RuntimeEvent>,
) {
    let interval = Duration::from_millis(config.tick_interval_ms);
    let mut event = START_EVENT;
    let mut dt = 0.0;
    let mut ticks: u64 = 0;
    let mut last = Instant::now();

    loop {
        if cancel.load(Ordering::SeqCst) {
            return;
        }

        let dispatch = tokio::task::spawn_blocking(move || {
            let outcome = host.dispatch(event, dt);
            (host, outcome)
        });
        let outcome = match dispatch.await {
            Ok((returned, outcome)) => {
                host = returned;
                outcome
            }
            Err(err) => {
                tracing::error!("[NGC:runtime] Dispatch task failed: {}", err);
                let _ = events.send(RuntimeEvent::Fault(format!("dispatch task failed: {}", err)));
                return;
            }
        };

        match outcome {
            Ok(()) => {}
            Err(DispatchError::Cancelled) => {
                tracing::debug!("[NGC:runtime] Dispatch cancelled");
                return;
            }
            Err(DispatchError::Fault(message)) => {
                tracing::warn!("[NGC:runtime] Runtime fault during '{}': {}", event, message);
                let _ = events.send(RuntimeEvent::Fault(message));
                return;
            }
        }

        if config.max_ticks.is_some_and(|max| ticks >= max) {
            tracing::info!("[NGC:runtime] Run finished after {} tick(s)", ticks);
            let _ = events.send(RuntimeEvent::Finished);
            return;
        }

        tokio::time::sleep(interval).await;
        let now = Instant::now();
        dt = now.duration_since(last).as_secs_f64();
        last = now;
        event = TICK_EVENT;
        ticks += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile_graph;
    use crate::graph::{GraphDescription, Link, PropertyValue};
    use crate::registry::NodeRegistry;
    use tokio::time::timeout;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    fn config(max_ticks: Option<u64>) -> RuntimeConfig {
        RuntimeConfig {
            tick_interval_ms: 1,
            max_operations: 100_000,
            max_ticks,
        }
    }

    fn controller(max_ticks: Option<u64>) -> (ExecutionController, UnboundedReceiver<RuntimeEvent>) {
        ExecutionController::new(SceneHandle::new("scene"), config(max_ticks))
    }

    async fn next(rx: &mut UnboundedReceiver<RuntimeEvent>) -> RuntimeEvent {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for runtime event")
            .expect("event channel closed")
    }

    fn registry() -> NodeRegistry {
        let mut registry = NodeRegistry::new();
        registry.init();
        registry
    }

    /// start event -> log(message node output)
    fn log_on_start(registry: &NodeRegistry, producer: &str) -> String {
        let mut graph = GraphDescription::new("log");
        let start = graph.add_node("event/start", registry).unwrap();
        let value = graph.add_node(producer, registry).unwrap();
        let log = graph.add_node("debug/log", registry).unwrap();
        graph.add_link(Link::new(start, "exec", log, "exec")).unwrap();
        graph.add_link(Link::new(value, "out", log, "message")).unwrap();
        compile_graph(&graph, registry).code().unwrap().to_string()
    }

    #[test]
    fn test_start_requires_runtime() {
        let (mut controller, _rx) = controller(None);
        controller.load_program("print(1);");

        assert_eq!(controller.start(true), Err(ExecutionError::NoRuntime));
        assert_eq!(controller.state(), ControllerState::Idle);
    }

    #[tokio::test]
    async fn test_start_requires_program() {
        let (mut controller, _rx) = controller(None);
        assert!(!controller.can_start());
        assert_eq!(controller.start(true), Err(ExecutionError::NoProgram));
        assert_eq!(controller.state(), ControllerState::Idle);
    }

    #[tokio::test]
    async fn test_state_machine() {
        init_tracing();
        let (mut controller, mut rx) = controller(None);
        controller.load_program("let x = 1;");
        assert!(controller.can_start());
        assert!(!controller.can_stop());

        controller.start(true).unwrap();
        assert_eq!(controller.state(), ControllerState::Running(ExecutionMode::Standalone));
        assert!(!controller.can_start());
        assert!(controller.can_stop());

        assert_eq!(controller.start(false), Err(ExecutionError::AlreadyRunning));
        assert_eq!(controller.state(), ControllerState::Running(ExecutionMode::Standalone));

        controller.stop();
        assert_eq!(controller.state(), ControllerState::Idle);
        controller.stop();
        assert_eq!(controller.state(), ControllerState::Idle);

        assert_eq!(next(&mut rx).await, RuntimeEvent::Started { mode: ExecutionMode::Standalone });
        assert_eq!(next(&mut rx).await, RuntimeEvent::Stopped);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_restart_is_stop_then_start() {
        let (mut controller, mut rx) = controller(None);
        controller.load_program("let x = 1;");
        controller.start(true).unwrap();

        controller.restart(false).unwrap();

        assert_eq!(controller.state(), ControllerState::Running(ExecutionMode::Scene));
        assert_eq!(next(&mut rx).await, RuntimeEvent::Started { mode: ExecutionMode::Standalone });
        assert_eq!(next(&mut rx).await, RuntimeEvent::Stopped);
        assert_eq!(next(&mut rx).await, RuntimeEvent::Started { mode: ExecutionMode::Scene });

        // From idle, restart is just start.
        controller.stop();
        controller.restart(true).unwrap();
        assert_eq!(controller.state(), ControllerState::Running(ExecutionMode::Standalone));
    }

    #[tokio::test]
    async fn test_output_and_finish() {
        init_tracing();
        let registry = registry();
        let (mut controller, mut rx) = controller(Some(0));
        controller.load_program(log_on_start(&registry, "constant/string"));

        controller.start(true).unwrap();

        assert!(matches!(next(&mut rx).await, RuntimeEvent::Started { .. }));
        assert_eq!(next(&mut rx).await, RuntimeEvent::Output(String::new()));
        assert_eq!(next(&mut rx).await, RuntimeEvent::Finished);
        // The run ended on its own; the controller still needs a stop.
        assert!(controller.is_running());
    }

    #[tokio::test]
    async fn test_standalone_has_no_scene() {
        let registry = registry();
        let code = log_on_start(&registry, "scene/attached");

        for (standalone, expected) in [(true, "false"), (false, "true")] {
            let (mut controller, mut rx) = controller(Some(0));
            controller.load_program(code.clone());
            controller.start(standalone).unwrap();

            assert!(matches!(next(&mut rx).await, RuntimeEvent::Started { .. }));
            assert_eq!(next(&mut rx).await, RuntimeEvent::Output(expected.to_string()));
        }
    }

    #[tokio::test]
    async fn test_variables_persist_across_ticks() {
        let registry = registry();
        let mut graph = GraphDescription::new("counter");
        graph.declare_variable("count", PropertyValue::Number(0.0));
        let tick = graph.add_node("event/tick", &registry).unwrap();
        let get = graph.add_node("variable/get", &registry).unwrap();
        let add = graph.add_node("math/add", &registry).unwrap();
        let set = graph.add_node("variable/set", &registry).unwrap();
        let log = graph.add_node("debug/log", &registry).unwrap();
        for node in [get, set] {
            graph
                .set_property(node, "name", PropertyValue::String("count".into()))
                .unwrap();
        }
        graph.set_property(add, "b", PropertyValue::Number(1.0)).unwrap();
        graph.add_link(Link::new(get, "value", add, "a")).unwrap();
        graph.add_link(Link::new(tick, "exec", set, "exec")).unwrap();
        graph.add_link(Link::new(add, "out", set, "value")).unwrap();
        graph.add_link(Link::new(set, "exec", log, "exec")).unwrap();
        graph.add_link(Link::new(add, "out", log, "message")).unwrap();

        let (mut controller, mut rx) = controller(Some(3));
        controller.load_program(compile_graph(&graph, &registry).code().unwrap());
        controller.start(true).unwrap();

        assert!(matches!(next(&mut rx).await, RuntimeEvent::Started { .. }));
        for expected in ["1.0", "2.0", "3.0"] {
            assert_eq!(next(&mut rx).await, RuntimeEvent::Output(expected.to_string()));
        }
        assert_eq!(next(&mut rx).await, RuntimeEvent::Finished);
    }

    #[tokio::test]
    async fn test_runtime_fault_is_an_event() {
        let registry = registry();
        let mut graph = GraphDescription::new("fault");
        graph.declare_variable("flag", PropertyValue::Number(1.0));
        let get = graph.add_node("variable/get", &registry).unwrap();
        let not = graph.add_node("logic/not", &registry).unwrap();
        graph
            .set_property(get, "name", PropertyValue::String("flag".into()))
            .unwrap();
        graph.add_link(Link::new(get, "value", not, "value")).unwrap();

        let (mut controller, mut rx) = controller(None);
        controller.load_program(compile_graph(&graph, &registry).code().unwrap());
        controller.start(true).unwrap();

        assert!(matches!(next(&mut rx).await, RuntimeEvent::Started { .. }));
        assert!(matches!(next(&mut rx).await, RuntimeEvent::Fault(_)));
        assert_eq!(controller.state(), ControllerState::Running(ExecutionMode::Standalone));

        controller.stop();
        assert_eq!(next(&mut rx).await, RuntimeEvent::Stopped);
    }

    #[tokio::test]
    async fn test_stop_interrupts_running_script() {
        let (mut controller, mut rx) = ExecutionController::new(
            SceneHandle::new(()),
            RuntimeConfig {
                max_operations: 0,
                ..config(None)
            },
        );
        controller.load_program("loop {}");
        controller.start(true).unwrap();
        assert!(matches!(next(&mut rx).await, RuntimeEvent::Started { .. }));

        tokio::time::sleep(Duration::from_millis(20)).await;
        controller.stop();

        assert_eq!(controller.state(), ControllerState::Idle);
        assert_eq!(next(&mut rx).await, RuntimeEvent::Stopped);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_parse_failure_keeps_idle() {
        let (mut controller, _rx) = controller(None);
        controller.load_program("let = ;");
        assert!(matches!(controller.start(true), Err(ExecutionError::Script(_))));
        assert_eq!(controller.state(), ControllerState::Idle);
    }
}
