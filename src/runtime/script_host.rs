//! Rhai host for one run of a compiled program.

use super::{RuntimeEvent, SceneHandle};
use crate::codegen::node_handlers::{DELTA_VARIABLE, EVENT_VARIABLE, SCENE_VARIABLE, VARIABLES_MAP};
use crate::error::ExecutionError;
use rhai::{Dynamic, Engine, EvalAltResult, Map, Scope, AST};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

/// How a single dispatch ended early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The run was stopped while the script was executing
    Cancelled,
    /// The script raised an error
    Fault(String),
}

/// Engine, compiled program and persistent scope for one run.
///
/// The scope keeps `scene`, `graph_event`, `graph_dt` and `graph_vars` across
/// dispatches; everything a dispatch declares is rewound afterwards.
pub struct ScriptHost {
    engine: Engine,
    ast: AST,
    scope: Scope<'static>,
    base: usize,
    cancel: Arc<AtomicBool>,
}

impl ScriptHost {
    pub fn new(
        code: &str,
        scene: Option<SceneHandle>,
        max_operations: u64,
        cancel: Arc<AtomicBool>,
        events: UnboundedSender<RuntimeEvent>,
    ) -> Result<Self, ExecutionError> {
        let mut engine = Engine::new();
        engine.register_type_with_name::<SceneHandle>("Scene");

        let progress_cancel = Arc::clone(&cancel);
        engine.on_progress(move |count| {
            if progress_cancel.load(Ordering::SeqCst) {
                Some("run cancelled".into())
            } else if max_operations > 0 && count > max_operations {
                Some(format!("Safety limit exceeded: maximum {} operations", max_operations).into())
            } else {
                None
            }
        });

        engine.on_print(move |text| {
            tracing::info!(target: "ngc::script", "{}", text);
            let _ = events.send(RuntimeEvent::Output(text.to_string()));
        });

        let ast = engine
            .compile(code)
            .map_err(|e| ExecutionError::Script(e.to_string()))?;

        let scene = match scene {
            Some(handle) => Dynamic::from(handle),
            None => Dynamic::UNIT,
        };

        let mut scope = Scope::new();
        scope.push_constant_dynamic(SCENE_VARIABLE, scene);
        scope.push(EVENT_VARIABLE, String::new());
        scope.push(DELTA_VARIABLE, 0.0_f64);
        scope.push(VARIABLES_MAP, Map::new());
        let base = scope.len();

        Ok(Self {
            engine,
            ast,
            scope,
            base,
            cancel,
        })
    }

    /// Run the program once for `event`.
    pub fn dispatch(&mut self, event: &str, dt: f64) -> Result<(), DispatchError> {
        self.scope.set_value(EVENT_VARIABLE, event.to_string());
        self.scope.set_value(DELTA_VARIABLE, dt);

        let result = self.engine.run_ast_with_scope(&mut self.scope, &self.ast);
        self.scope.rewind(self.base);

        match result {
            Ok(()) => Ok(()),
            Err(err) => match *err {
                EvalAltResult::ErrorTerminated(..) if self.cancel.load(Ordering::SeqCst) => {
                    Err(DispatchError::Cancelled)
                }
                other => Err(DispatchError::Fault(other.to_string())),
            },
        }
    }

    /// Current value of a graph variable.
    pub fn variable(&self, name: &str) -> Option<Dynamic> {
        self.scope
            .get_value::<Map>(VARIABLES_MAP)
            .and_then(|vars| vars.get(name).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn host(code: &str, scene: Option<SceneHandle>, limit: u64) -> (ScriptHost, mpsc::UnboundedReceiver<RuntimeEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let host = ScriptHost::new(code, scene, limit, Arc::new(AtomicBool::new(false)), tx).unwrap();
        (host, rx)
    }

    #[test]
    fn test_event_and_locals_per_dispatch() {
        let (mut host, mut rx) = host("let seen = graph_event; print(seen);", None, 0);

        host.dispatch("start", 0.0).unwrap();
        host.dispatch("tick", 0.016).unwrap();

        assert_eq!(rx.try_recv().unwrap(), RuntimeEvent::Output("start".to_string()));
        assert_eq!(rx.try_recv().unwrap(), RuntimeEvent::Output("tick".to_string()));
    }

    #[test]
    fn test_graph_variables_persist() {
        let code = "if !graph_vars.contains(\"n\") { graph_vars[\"n\"] = 0.0; }\ngraph_vars[\"n\"] = graph_vars[\"n\"] + 1.0;";
        let (mut host, _rx) = host(code, None, 0);

        for _ in 0..3 {
            host.dispatch("tick", 0.0).unwrap();
        }

        assert_eq!(host.variable("n").and_then(|v| v.as_float().ok()), Some(3.0));
    }

    #[test]
    fn test_scene_binding() {
        let (mut standalone, mut rx) = host("print(type_of(scene));", None, 0);
        standalone.dispatch("start", 0.0).unwrap();
        assert_eq!(rx.try_recv().unwrap(), RuntimeEvent::Output("()".to_string()));

        let (mut attached, mut rx) = host("print(type_of(scene));", Some(SceneHandle::new(7_u32)), 0);
        attached.dispatch("start", 0.0).unwrap();
        assert_eq!(rx.try_recv().unwrap(), RuntimeEvent::Output("Scene".to_string()));
    }

    #[test]
    fn test_operation_limit_is_a_fault() {
        let (mut host, _rx) = host("loop {}", None, 1_000);
        assert!(matches!(host.dispatch("start", 0.0), Err(DispatchError::Fault(_))));
    }

    #[test]
    fn test_parse_error_is_reported() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = ScriptHost::new("let = ;", None, 0, Arc::new(AtomicBool::new(false)), tx);
        assert!(matches!(result, Err(ExecutionError::Script(_))));
    }
}
