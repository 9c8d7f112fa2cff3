//! # Editor Session
//!
//! One open graph document: the registry, the graph, its latest validation
//! pass and the execution controller.
//!
//! Every mutation goes through the session, which records it as a
//! [`GraphEdit`] for the undo/redo collaborator, re-validates the graph and
//! hands the fresh colors to the rendering collaborator.

use crate::compiler::{compile_graph, CompilationResult};
use crate::config::EditorConfig;
use crate::error::{ExecutionError, GraphError, SessionError};
use crate::graph::{read_document, write_document, GraphDescription, Link, NodeId, NodeInstance, PropertyValue};
use crate::registry::NodeRegistry;
use crate::runtime::{ControllerState, ExecutionController, RuntimeEvent, SceneHandle};
use crate::validation::colorizer::{colorize, NodeColors};
use crate::validation::{validate, ValidationReport};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::UnboundedReceiver;

/// A single reversible graph mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphEdit {
    AddNode {
        node: NodeInstance,
    },
    RemoveNode {
        node: NodeInstance,
        links: Vec<Link>,
    },
    AddLink {
        link: Link,
        replaced: Option<Link>,
    },
    RemoveLink {
        link: Link,
    },
    ChangeProperty {
        node: NodeId,
        name: String,
        old: Option<PropertyValue>,
        new: PropertyValue,
    },
}

impl GraphEdit {
    /// Redo this edit on `graph`.
    pub fn apply(&self, graph: &mut GraphDescription) -> Result<(), GraphError> {
        match self {
            GraphEdit::AddNode { node } => graph.insert_node(node.clone()),
            GraphEdit::RemoveNode { node, .. } => graph.remove_node(node.id()).map(|_| ()),
            GraphEdit::AddLink { link, .. } => graph.add_link(link.clone()).map(|_| ()),
            GraphEdit::RemoveLink { link } => graph
                .remove_link(link.to_node, &link.to_pin)
                .map(|_| ())
                .ok_or_else(|| GraphError::PinNotFound {
                    node: link.to_node,
                    pin: link.to_pin.clone(),
                }),
            GraphEdit::ChangeProperty { node, name, new, .. } => {
                graph.set_property(*node, name, new.clone()).map(|_| ())
            }
        }
    }

    /// Undo this edit on `graph`.
    pub fn revert(&self, graph: &mut GraphDescription) -> Result<(), GraphError> {
        match self {
            GraphEdit::AddNode { node } => graph.remove_node(node.id()).map(|_| ()),
            GraphEdit::RemoveNode { node, links } => {
                graph.insert_node(node.clone())?;
                for link in links {
                    graph.push_link_unchecked(link.clone());
                }
                Ok(())
            }
            GraphEdit::AddLink { link, replaced } => {
                graph.remove_link(link.to_node, &link.to_pin);
                if let Some(previous) = replaced {
                    graph.push_link_unchecked(previous.clone());
                }
                Ok(())
            }
            GraphEdit::RemoveLink { link } => {
                graph.push_link_unchecked(link.clone());
                Ok(())
            }
            GraphEdit::ChangeProperty { node, name, old, .. } => match old {
                Some(value) => graph.set_property(*node, name, value.clone()).map(|_| ()),
                None => graph.remove_property(*node, name).map(|_| ()),
            },
        }
    }
}

/// Undo/redo collaborator.
pub trait EditRecorder: Send {
    fn record(&mut self, edit: &GraphEdit);
}

impl EditRecorder for Vec<GraphEdit> {
    fn record(&mut self, edit: &GraphEdit) {
        self.push(edit.clone());
    }
}

/// Rendering collaborator, handed the graph after every check.
pub trait RenderTarget: Send {
    fn present(&mut self, graph: &GraphDescription, colors: &NodeColors);
}

pub struct EditorSession {
    path: PathBuf,
    config: EditorConfig,
    registry: NodeRegistry,
    graph: GraphDescription,
    report: ValidationReport,
    colors: NodeColors,
    controller: ExecutionController,
    recorder: Option<Box<dyn EditRecorder>>,
    renderer: Option<Box<dyn RenderTarget>>,
}

impl EditorSession {
    /// Mount a graph document.
    ///
    /// Registry initialization and the document read run concurrently; the
    /// graph is built once both are done and checked right away.
    pub async fn mount(
        path: impl AsRef<Path>,
        scene: SceneHandle,
        config: EditorConfig,
    ) -> Result<(Self, UnboundedReceiver<RuntimeEvent>), SessionError> {
        config.validate().map_err(SessionError::Config)?;
        let path = path.as_ref().to_path_buf();
        tracing::info!("[NGC] Mounting graph '{}'", path.display());

        let (registry, document) = tokio::join!(NodeRegistry::initialize(), read_document(&path));
        let mut graph = GraphDescription::from_document(document?, &registry)?;
        graph.config_mut().align_to_grid = config.align_to_grid;

        let (controller, events) = ExecutionController::new(scene, config.runtime.clone());
        let mut session = Self {
            path,
            config,
            registry,
            graph,
            report: ValidationReport::default(),
            colors: NodeColors::new(),
            controller,
            recorder: None,
            renderer: None,
        };
        session.check();

        tracing::info!(
            "[NGC] Mounted '{}' ({} nodes, {} errors)",
            session.graph.name(),
            session.graph.nodes().len(),
            session.report.errors().len()
        );
        Ok((session, events))
    }

    pub fn set_recorder(&mut self, recorder: Box<dyn EditRecorder>) {
        self.recorder = Some(recorder);
    }

    /// Attach the renderer and present the current state to it.
    pub fn set_render_target(&mut self, mut renderer: Box<dyn RenderTarget>) {
        renderer.present(&self.graph, &self.colors);
        self.renderer = Some(renderer);
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn graph(&self) -> &GraphDescription {
        &self.graph
    }

    pub fn report(&self) -> &ValidationReport {
        &self.report
    }

    pub fn colors(&self) -> &NodeColors {
        &self.colors
    }

    pub fn controller_state(&self) -> ControllerState {
        self.controller.state()
    }

    pub fn can_play(&self) -> bool {
        !self.controller.is_running() && self.report.is_valid()
    }

    pub fn can_stop(&self) -> bool {
        self.controller.can_stop()
    }

    /// Validate, annotate and recolor, then present.
    pub fn check(&mut self) -> &ValidationReport {
        self.report = validate(&self.graph, &self.registry);
        self.graph.annotate(&self.report);
        self.colors = colorize(&self.graph, &self.registry, &self.report);
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.present(&self.graph, &self.colors);
        }
        &self.report
    }

    fn commit(&mut self, edit: GraphEdit) {
        tracing::debug!("[NGC] Edit: {:?}", edit);
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.record(&edit);
        }
        self.check();
    }

    pub fn add_node(&mut self, node_type: &str) -> Result<NodeId, SessionError> {
        let id = self.graph.add_node(node_type, &self.registry)?;
        if let Some(node) = self.graph.node(id) {
            let edit = GraphEdit::AddNode { node: node.clone() };
            self.commit(edit);
        }
        Ok(id)
    }

    pub fn remove_node(&mut self, id: NodeId) -> Result<(), SessionError> {
        let (node, links) = self.graph.remove_node(id)?;
        self.commit(GraphEdit::RemoveNode { node, links });
        Ok(())
    }

    pub fn add_link(&mut self, link: Link) -> Result<(), SessionError> {
        let replaced = self.graph.add_link(link.clone())?;
        self.commit(GraphEdit::AddLink { link, replaced });
        Ok(())
    }

    /// Disconnect `to_node.to_pin`. Returns false when nothing was connected.
    pub fn remove_link(&mut self, to_node: NodeId, to_pin: &str) -> bool {
        match self.graph.remove_link(to_node, to_pin) {
            Some(link) => {
                self.commit(GraphEdit::RemoveLink { link });
                true
            }
            None => false,
        }
    }

    pub fn set_property(&mut self, node: NodeId, name: &str, value: PropertyValue) -> Result<(), SessionError> {
        let old = self.graph.set_property(node, name, value.clone())?;
        self.commit(GraphEdit::ChangeProperty {
            node,
            name: name.to_string(),
            old,
            new: value,
        });
        Ok(())
    }

    pub fn declare_variable(&mut self, name: &str, initial: PropertyValue) {
        self.graph.declare_variable(name, initial);
        self.check();
    }

    /// Redo an edit handed back by the undo/redo collaborator. Not recorded.
    pub fn apply_edit(&mut self, edit: &GraphEdit) -> Result<(), SessionError> {
        edit.apply(&mut self.graph)?;
        self.check();
        Ok(())
    }

    /// Undo an edit handed back by the undo/redo collaborator. Not recorded.
    pub fn revert_edit(&mut self, edit: &GraphEdit) -> Result<(), SessionError> {
        edit.revert(&mut self.graph)?;
        self.check();
        Ok(())
    }

    /// Compile the current graph. Always fresh.
    pub fn compile(&self) -> CompilationResult {
        compile_graph(&self.graph, &self.registry)
    }

    /// Compile and start a run.
    pub fn play(&mut self, standalone: bool) -> Result<(), SessionError> {
        if self.controller.is_running() {
            return Err(ExecutionError::AlreadyRunning.into());
        }

        match self.compile() {
            CompilationResult::Success { code } => {
                self.controller.load_program(code);
                self.controller.start(standalone)?;
                Ok(())
            }
            CompilationResult::Failure { error_node, message } => {
                tracing::warn!("[NGC] Cannot play: node {} failed: {}", error_node, message);
                Err(SessionError::Compile {
                    node: error_node,
                    message,
                })
            }
        }
    }

    pub fn stop(&mut self) {
        self.controller.stop();
    }

    /// `stop()` then `play(standalone)`, recompiling the current graph.
    pub fn restart(&mut self, standalone: bool) -> Result<(), SessionError> {
        self.stop();
        self.play(standalone)
    }

    pub async fn save(&self) -> Result<(), SessionError> {
        self.save_to(&self.path).await
    }

    /// Write to `path` and make it the session's document path.
    pub async fn save_as(&mut self, path: impl AsRef<Path>) -> Result<(), SessionError> {
        let path = path.as_ref().to_path_buf();
        self.save_to(&path).await?;
        self.path = path;
        Ok(())
    }

    async fn save_to(&self, path: &Path) -> Result<(), SessionError> {
        write_document(path, &self.graph.to_document()).await?;
        tracing::info!("[NGC] Saved '{}' to {}", self.graph.name(), path.display());
        Ok(())
    }
}
