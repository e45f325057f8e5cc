//! 能力接口
//!
//! 步骤只通过 Services 访问外部协作者：四个决策服务（规划、澄清、查重、回答）与四个持久化工具。
//! 每个方法对应一次远程调用，失败以 RemoteError 返回，由调用步骤自行决定降级方式。

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::core::{ItemKind, RemoteError};
use crate::services::types::{NewProject, NewTask, Plan, ProjectQuery, TaskQuery};

#[async_trait]
pub trait Services: Send + Sync {
    /// 规划：把清洗后的问题解释为 {tool_name, parameters}
    async fn plan(&self, question: &str) -> Result<Plan, RemoteError>;

    /// 澄清：为缺失字段生成追问文本
    async fn clarify(&self, missing_fields: &[String], original_question: &str) -> Result<String, RemoteError>;

    /// 查重：新实体与已有实体是否重复
    async fn analyze_duplicate(
        &self,
        new_item: &Map<String, Value>,
        existing_items: &[Value],
        kind: ItemKind,
    ) -> Result<bool, RemoteError>;

    /// 回答：把 (question, tool_result, previous_node) 组织成自然语言
    async fn compose(&self, question: &str, tool_result: &str, previous_node: &str) -> Result<String, RemoteError>;

    async fn create_project(&self, project: &NewProject) -> Result<Value, RemoteError>;

    async fn create_task(&self, task: &NewTask) -> Result<Value, RemoteError>;

    async fn query_projects(&self, query: &ProjectQuery) -> Result<Vec<Value>, RemoteError>;

    async fn query_tasks(&self, query: &TaskQuery) -> Result<Vec<Value>, RemoteError>;
}
