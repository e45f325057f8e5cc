//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `TRACKBOT__*` 覆盖（双下划线表示嵌套，如 `TRACKBOT__APP__MAX_QUESTION_HISTORY=6`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub mcp: McpSection,
    #[serde(default)]
    pub tools: ToolsSection,
    #[serde(default)]
    pub guardrail: GuardrailSection,
    #[serde(default)]
    pub checkpoint: CheckpointSection,
    #[serde(default)]
    pub web: WebSection,
}

/// [app] 段：应用名、默认用户、问题历史上限、输入长度上限
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    /// 启动横幅与日志中显示的名称
    pub name: Option<String>,
    /// REPL 未指定用户时使用的 user_id（同时作为 thread_id）
    #[serde(default = "default_user_id")]
    pub default_user_id: String,
    /// question_history 保留条数（N）
    #[serde(default = "default_max_question_history")]
    pub max_question_history: usize,
    /// 单条输入最大字符数
    #[serde(default = "default_max_input_length")]
    pub max_input_length: usize,
}

impl AppSection {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().filter(|n| !n.trim().is_empty()).unwrap_or("trackbot")
    }
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            default_user_id: default_user_id(),
            max_question_history: default_max_question_history(),
            max_input_length: default_max_input_length(),
        }
    }
}

fn default_user_id() -> String {
    "user".to_string()
}

fn default_max_question_history() -> usize {
    4
}

fn default_max_input_length() -> usize {
    2048
}

/// [mcp] 段：工具服务器列表与协议参数
#[derive(Debug, Clone, Deserialize)]
pub struct McpSection {
    /// 工具服务器；为空时回退到环境变量 MCP_SERVER_URL
    #[serde(default)]
    pub servers: Vec<McpServerSection>,
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
    #[serde(default = "default_client_name")]
    pub client_name: String,
    /// 单次 HTTP 往返超时（秒）
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for McpSection {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            protocol_version: default_protocol_version(),
            client_name: default_client_name(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl McpSection {
    /// 实际要连接的服务器：配置优先，其次 MCP_SERVER_URL
    pub fn effective_servers(&self) -> Vec<McpServerSection> {
        if !self.servers.is_empty() {
            return self.servers.clone();
        }
        std::env::var("MCP_SERVER_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .map(|url| {
                vec![McpServerSection {
                    name: "default".to_string(),
                    url,
                }]
            })
            .unwrap_or_default()
    }
}

/// 单个工具服务器
#[derive(Debug, Clone, Deserialize)]
pub struct McpServerSection {
    pub name: String,
    pub url: String,
}

fn default_protocol_version() -> String {
    "2024-11-05".to_string()
}

fn default_client_name() -> String {
    "trackbot".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

/// [tools] 段：工具调用超时与各能力对应的远程工具名
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    #[serde(default)]
    pub names: ToolNamesSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
            names: ToolNamesSection::default(),
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    60
}

/// [tools.names] 段：能力 -> 远程工具名
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolNamesSection {
    pub planner: String,
    pub clarifier: String,
    pub duplicate_analyzer: String,
    pub composer: String,
    pub create_project: String,
    pub create_task: String,
    pub query_projects: String,
    pub query_tasks: String,
}

impl Default for ToolNamesSection {
    fn default() -> Self {
        Self {
            planner: "gemini_planner".into(),
            clarifier: "gemini_clarify".into(),
            duplicate_analyzer: "gemini_duplicate_analyzer".into(),
            composer: "gemini_answer".into(),
            create_project: "create_project".into(),
            create_task: "create_task".into(),
            query_projects: "query_projects".into(),
            query_tasks: "query_tasks".into(),
        }
    }
}

impl ToolNamesSection {
    pub fn all(&self) -> [&str; 8] {
        [
            &self.planner,
            &self.clarifier,
            &self.duplicate_analyzer,
            &self.composer,
            &self.create_project,
            &self.create_task,
            &self.query_projects,
            &self.query_tasks,
        ]
    }
}

/// [guardrail] 段：输出过滤的禁用词
#[derive(Debug, Clone, Deserialize)]
pub struct GuardrailSection {
    #[serde(default = "default_forbidden_terms")]
    pub forbidden_terms: Vec<String>,
}

impl Default for GuardrailSection {
    fn default() -> Self {
        Self {
            forbidden_terms: default_forbidden_terms(),
        }
    }
}

fn default_forbidden_terms() -> Vec<String> {
    vec![
        "password".into(),
        "credit card".into(),
        "attack".into(),
        "hack".into(),
        "api key".into(),
        "access token".into(),
    ]
}

/// [checkpoint] 段：SQLite 路径（需 async-sqlite feature）与内存检查点过期时间
#[derive(Debug, Clone, Deserialize)]
pub struct CheckpointSection {
    pub db_path: Option<PathBuf>,
    #[serde(default = "default_checkpoint_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CheckpointSection {
    fn default() -> Self {
        Self {
            db_path: None,
            ttl_secs: default_checkpoint_ttl_secs(),
        }
    }
}

fn default_checkpoint_ttl_secs() -> u64 {
    86_400
}

/// [web] 段
#[derive(Debug, Clone, Deserialize)]
pub struct WebSection {
    #[serde(default = "default_web_port")]
    pub port: u16,
}

impl Default for WebSection {
    fn default() -> Self {
        Self {
            port: default_web_port(),
        }
    }
}

fn default_web_port() -> u16 {
    8080
}

/// 从 config 目录加载配置，环境变量 TRACKBOT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 TRACKBOT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("TRACKBOT")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
