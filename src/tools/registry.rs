//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters / execute），由 ToolRegistry 按名注册工厂，
//! 任务开始时 resolve 出本任务的 ToolSet；ToolExecutor 在调用时加超时并把错误转为 ToolResult。

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::core::AgentError;
use crate::llm::ToolArguments;
use crate::tools::{BashTool, EditTool, SequentialThinkingTool, TaskDoneTool};

/// 未指定工具列表时使用的默认工具集（bash 在首位）
pub const DEFAULT_TOOLS: [&str; 4] = [
    "bash",
    "str_replace_based_edit_tool",
    "sequentialthinking",
    "task_done",
];

/// 工具参数描述（供模型生成正确的参数）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: String,
    pub description: String,
    pub required: bool,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Value>,
}

/// 工具自身返回的执行结果；output 与 error 可同时存在
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolExecResult {
    pub output: Option<String>,
    pub error: Option<String>,
    pub status: i32,
}

impl ToolExecResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            output: Some(output.into()),
            error: None,
            status: 0,
        }
    }

    pub fn failed(error: impl Into<String>, status: i32) -> Self {
        Self {
            output: None,
            error: Some(error.into()),
            status,
        }
    }
}

/// 一次工具调用的结果；call_id 与 ToolCall.id 对应，success 等价于 status == 0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub name: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub status: i32,
}

impl ToolResult {
    pub fn from_exec(call_id: impl Into<String>, name: impl Into<String>, exec: ToolExecResult) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            success: exec.status == 0,
            output: exec.output,
            error: exec.error,
            status: exec.status,
        }
    }

    pub fn success(call_id: impl Into<String>, name: impl Into<String>, output: impl Into<String>) -> Self {
        Self::from_exec(call_id, name, ToolExecResult::ok(output))
    }

    /// 分发器层面的失败（未知工具、超时、panic、参数错误），status 固定为 -1
    pub fn failure(call_id: impl Into<String>, name: impl Into<String>, error: impl Into<String>) -> Self {
        Self::from_exec(call_id, name, ToolExecResult::failed(error, -1))
    }

    /// 回传给模型的文本
    pub fn content_for_model(&self) -> String {
        let output = self.output.as_deref().filter(|s| !s.is_empty());
        let error = self.error.as_deref().filter(|s| !s.is_empty());
        match (output, error) {
            (Some(out), Some(err)) => format!("{out}\nError: {err}"),
            (Some(out), None) => out.to_string(),
            (None, Some(err)) => format!("Error: {err}"),
            (None, None) if self.success => "(no output)".to_string(),
            (None, None) => format!("Tool '{}' failed with status {}", self.name, self.status),
        }
    }
}

/// 工具内部错误；在分发器边界转为 ToolResult
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("{0}")]
    Execution(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// 工具构造上下文：工作区根目录与单次调用超时
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub workspace_root: PathBuf,
    pub timeout: Duration,
}

impl ToolContext {
    pub fn new(workspace_root: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            timeout,
        }
    }
}

/// 工具 trait：名称、描述（供 LLM 理解）、参数列表、异步执行
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（模型在 tool call 中使用）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数列表，通常由 schemars 从参数结构体生成
    fn parameters(&self) -> Vec<ToolParameter>;

    /// 是否可以与同批其它调用并发执行
    fn parallel_safe(&self) -> bool {
        false
    }

    /// 成功执行即表示模型声明任务完成
    fn signals_completion(&self) -> bool {
        false
    }

    async fn execute(&self, args: &ToolArguments) -> Result<ToolExecResult, ToolError>;

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

/// 发给模型的工具定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ToolParameter>,
}

impl ToolSchema {
    /// 渲染为 JSON Schema 对象（type / properties / required）
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for p in &self.parameters {
            let mut prop = json!({
                "type": p.param_type,
                "description": p.description,
            });
            if let Some(values) = &p.enum_values {
                prop["enum"] = Value::Array(values.clone());
            }
            if let Some(items) = &p.items {
                prop["items"] = items.clone();
            }
            properties.insert(p.name.clone(), prop);
            if p.required {
                required.push(Value::String(p.name.clone()));
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

type ToolFactory = Arc<dyn Fn(&ToolContext) -> Arc<dyn Tool> + Send + Sync>;

/// 工具注册表：按名称存储工厂，resolve 时按上下文实例化
#[derive(Clone, Default)]
pub struct ToolRegistry {
    factories: BTreeMap<String, ToolFactory>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 内置工具：bash / str_replace_based_edit_tool / sequentialthinking / task_done
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("bash", |ctx| Arc::new(BashTool::new(ctx)) as Arc<dyn Tool>);
        registry.register("str_replace_based_edit_tool", |ctx| {
            Arc::new(EditTool::new(ctx)) as Arc<dyn Tool>
        });
        registry.register("sequentialthinking", |_| {
            Arc::new(SequentialThinkingTool::new()) as Arc<dyn Tool>
        });
        registry.register("task_done", |_| Arc::new(TaskDoneTool) as Arc<dyn Tool>);
        registry
    }

    /// 注册（或替换）一个工具工厂
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&ToolContext) -> Arc<dyn Tool> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// 已注册工具名（字典序）
    pub fn names(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    /// 将工具名列表解析为工具实例；None 或空列表解析为 DEFAULT_TOOLS，保持请求顺序
    pub fn resolve(&self, names: Option<&[String]>, ctx: &ToolContext) -> Result<ToolSet, AgentError> {
        let requested: Vec<String> = match names {
            Some(list) if !list.is_empty() => list.to_vec(),
            _ => DEFAULT_TOOLS.iter().map(|s| s.to_string()).collect(),
        };
        let mut tools = Vec::with_capacity(requested.len());
        for name in &requested {
            let factory = self.factories.get(name).ok_or_else(|| AgentError::UnknownTool {
                name: name.clone(),
                available: self.names().join(", "),
            })?;
            tools.push(factory(ctx));
        }
        Ok(ToolSet { tools })
    }
}

/// 一个任务解析出的工具集合（有序）
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: Vec<Arc<dyn Tool>>,
}

impl fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl ToolSet {
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        Self { tools }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.iter().map(|t| t.schema()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ToolContext {
        ToolContext::new(std::env::temp_dir(), Duration::from_secs(5))
    }

    #[test]
    fn test_resolve_defaults() {
        let registry = ToolRegistry::with_builtin();
        let set = registry.resolve(None, &ctx()).unwrap();
        assert_eq!(set.len(), 4);
        assert_eq!(set.names(), DEFAULT_TOOLS.to_vec());
        let empty: Vec<String> = vec![];
        assert_eq!(registry.resolve(Some(&empty), &ctx()).unwrap().len(), 4);
    }

    #[test]
    fn test_resolve_preserves_order() {
        let registry = ToolRegistry::with_builtin();
        let names = vec!["bash".to_string(), "task_done".to_string()];
        let set = registry.resolve(Some(&names), &ctx()).unwrap();
        assert_eq!(set.names(), names);
    }

    #[test]
    fn test_resolve_unknown_tool() {
        let registry = ToolRegistry::with_builtin();
        let names = vec!["bash".to_string(), "browser".to_string()];
        match registry.resolve(Some(&names), &ctx()) {
            Err(AgentError::UnknownTool { name, available }) => {
                assert_eq!(name, "browser");
                assert!(available.contains("bash"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_input_schema_rendering() {
        let schema = ToolSchema {
            name: "demo".into(),
            description: "demo tool".into(),
            parameters: vec![
                ToolParameter {
                    name: "command".into(),
                    param_type: "string".into(),
                    description: "what to do".into(),
                    required: true,
                    enum_values: Some(vec![json!("a"), json!("b")]),
                    items: None,
                },
                ToolParameter {
                    name: "lines".into(),
                    param_type: "array".into(),
                    description: "".into(),
                    required: false,
                    enum_values: None,
                    items: Some(json!({"type": "integer"})),
                },
            ],
        };
        let v = schema.input_schema();
        assert_eq!(v["required"], json!(["command"]));
        assert_eq!(v["properties"]["command"]["enum"], json!(["a", "b"]));
        assert_eq!(v["properties"]["lines"]["items"]["type"], "integer");
    }

    #[test]
    fn test_content_for_model() {
        let both = ToolResult::from_exec(
            "1",
            "bash",
            ToolExecResult {
                output: Some("partial".into()),
                error: Some("warn".into()),
                status: 1,
            },
        );
        assert!(!both.success);
        assert_eq!(both.content_for_model(), "partial\nError: warn");
        assert_eq!(ToolResult::success("2", "x", "").content_for_model(), "(no output)");
    }
}
