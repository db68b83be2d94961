use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use noetic_config::{ExecutorConfig, RetryConfig};
use noetic_core::Result;
use noetic_dag::{CodeRunner, Executor, MergeStrategy, NodeKind, ToolCaller, Workflow, WorkflowNode};
use serde_json::Value;

struct RecordingTool {
    calls: std::sync::Mutex<Vec<String>>,
}

#[async_trait]
impl ToolCaller for RecordingTool {
    async fn call_tool(&self, name: &str, args: Value) -> Result<Value> {
        self.calls.lock().unwrap().push(name.to_string());
        Ok(serde_json::json!({ "name": name, "echo": args }))
    }
}

struct PassthroughCode;
#[async_trait]
impl CodeRunner for PassthroughCode {
    async fn run_code(&self, _source: &str, context: &Value) -> Result<Value> {
        Ok(context.clone())
    }
}

#[tokio::test]
async fn three_phase_workflow_merges_parallel_branch_outputs() {
    let tool = Arc::new(RecordingTool { calls: std::sync::Mutex::new(Vec::new()) });
    let executor = Executor::new(
        tool.clone(),
        Arc::new(PassthroughCode),
        None,
        Arc::new(ExecutorConfig::default()),
        Arc::new(RetryConfig::default()),
    );

    let workflow = Workflow {
        nodes: vec![
            WorkflowNode {
                id: "search_web".to_string(),
                phase: 0,
                kind: NodeKind::Tool {
                    name: "web_search".to_string(),
                    args: serde_json::json!({"q": "rust async"}),
                    input_mapping: HashMap::new(),
                    output_artifact: None,
                },
                depends_on: vec![],
                timeout_secs: None,
                retries: None,
            },
            WorkflowNode {
                id: "search_docs".to_string(),
                phase: 0,
                kind: NodeKind::Tool {
                    name: "doc_search".to_string(),
                    args: serde_json::json!({"q": "rust async"}),
                    input_mapping: HashMap::new(),
                    output_artifact: None,
                },
                depends_on: vec![],
                timeout_secs: None,
                retries: None,
            },
            WorkflowNode {
                id: "merge_results".to_string(),
                phase: 1,
                kind: NodeKind::Merge {
                    merge_inputs: vec!["search_web".to_string(), "search_docs".to_string()],
                    merge_strategy: MergeStrategy::Concat,
                },
                depends_on: vec!["search_web".to_string(), "search_docs".to_string()],
                timeout_secs: None,
                retries: None,
            },
            WorkflowNode {
                id: "summarize".to_string(),
                phase: 2,
                kind: NodeKind::Code { source: "summarize merged results".to_string(), input_mapping: HashMap::new(), output_artifact: None },
                depends_on: vec!["merge_results".to_string()],
                timeout_secs: None,
                retries: None,
            },
        ],
    };

    let report = executor.run(workflow).await.unwrap();

    let mut called = tool.calls.lock().unwrap().clone();
    called.sort();
    assert_eq!(called, vec!["doc_search".to_string(), "web_search".to_string()]);

    let merged = &report.outputs["merge_results"]["merged"];
    assert_eq!(merged.as_array().unwrap().len(), 2);

    let summarized = &report.outputs["summarize"]["merge_results"];
    assert!(summarized.is_object());
}

#[tokio::test]
async fn dict_merge_strategy_keys_by_producing_node() {
    let tool = Arc::new(RecordingTool { calls: std::sync::Mutex::new(Vec::new()) });
    let executor = Executor::new(
        tool,
        Arc::new(PassthroughCode),
        None,
        Arc::new(ExecutorConfig::default()),
        Arc::new(RetryConfig::default()),
    );

    let workflow = Workflow {
        nodes: vec![
            WorkflowNode {
                id: "a".to_string(),
                phase: 0,
                kind: NodeKind::Tool { name: "a_tool".to_string(), args: Value::Null, input_mapping: HashMap::new(), output_artifact: None },
                depends_on: vec![],
                timeout_secs: None,
                retries: None,
            },
            WorkflowNode {
                id: "merged".to_string(),
                phase: 1,
                kind: NodeKind::Merge { merge_inputs: vec!["a".to_string()], merge_strategy: MergeStrategy::Dict },
                depends_on: vec!["a".to_string()],
                timeout_secs: None,
                retries: None,
            },
        ],
    };

    let report = executor.run(workflow).await.unwrap();
    assert!(report.outputs["merged"]["merged"]["a"].is_object());
}
