#![allow(dead_code)]

use agentic_eval::config::ToolSettings;
use agentic_eval::model::{ComplexityBlock, EvaluationTarget, ToolFinding, ToolResult};
use agentic_eval::profile::{CSharpProfile, ProfileRegistry, PythonProfile};
use agentic_eval::reasoning::ReasoningClient;
use agentic_eval::tools::Tool;
use agentic_eval::ReasoningError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const CLEAN_VERDICT: &str = r#"{"verified_violations": [], "analysis_summary": "No issues."}"#;

/// Which request a prompt belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Detective,
    Judge,
    Repair,
}

impl Role {
    pub fn of(system: &str) -> Self {
        if system.contains("JSON repair assistant") {
            Role::Repair
        } else if system.contains("SAFE HARBOR") {
            Role::Judge
        } else {
            Role::Detective
        }
    }
}

type Handler = dyn Fn(Role, &str) -> Result<String, ReasoningError> + Send + Sync;

/// Answers every request through a closure and records what it was sent.
pub struct FnClient {
    handler: Box<Handler>,
    calls: AtomicUsize,
    requests: Mutex<Vec<(Role, String)>>,
}

impl FnClient {
    pub fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(Role, &str) -> Result<String, ReasoningError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            handler: Box::new(handler),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// No candidates, clean verdict.
    pub fn clean() -> Arc<Self> {
        Self::new(|role, _| match role {
            Role::Detective => Ok("[]".to_string()),
            _ => Ok(CLEAN_VERDICT.to_string()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self, role: Role) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _)| *r == role)
            .map(|(_, user)| user.clone())
            .collect()
    }
}

#[async_trait]
impl ReasoningClient for FnClient {
    async fn send(&self, system: &str, user: &str) -> Result<String, ReasoningError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let role = Role::of(system);
        self.requests.lock().unwrap().push((role, user.to_string()));
        (self.handler)(role, user)
    }
}

/// Analyzer returning a fixed result.
pub struct StubTool {
    pub name: &'static str,
    pub result: ToolResult,
}

impl StubTool {
    pub fn clean(name: &'static str) -> Box<dyn Tool> {
        Box::new(Self {
            name,
            result: ToolResult::new(name),
        })
    }

    pub fn findings(name: &'static str, findings: Vec<ToolFinding>) -> Box<dyn Tool> {
        Box::new(Self {
            name,
            result: ToolResult::new(name).with_findings(findings),
        })
    }

    pub fn failing(name: &'static str, error: &str) -> Box<dyn Tool> {
        Box::new(Self {
            name,
            result: ToolResult::failed(name, error),
        })
    }

    /// Complexity tool reporting one block of `complexity`.
    pub fn complexity(name: &'static str, complexity: u32) -> Box<dyn Tool> {
        Box::new(Self {
            name,
            result: ToolResult::new(name).with_complexity(vec![ComplexityBlock {
                name: "handle".into(),
                kind: "function".into(),
                complexity,
                line: 1,
            }]),
        })
    }
}

impl Tool for StubTool {
    fn name(&self) -> &'static str {
        self.name
    }

    fn run(&self, _target: &EvaluationTarget, _settings: &ToolSettings) -> ToolResult {
        self.result.clone()
    }
}

/// Registry whose Python profile runs `tools` and whose C# profile runs a
/// single clean stub.
pub fn registry(tools: Vec<Box<dyn Tool>>) -> Arc<ProfileRegistry> {
    let mut registry = ProfileRegistry::new();
    registry.register(Arc::new(PythonProfile::with_tools(tools)));
    registry.register(Arc::new(CSharpProfile::with_tools(vec![StubTool::clean(
        "build",
    )])));
    Arc::new(registry)
}

pub fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}
