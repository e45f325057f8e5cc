//! 步骤处理函数：每个步骤一个模块，签名统一为对 AgentState 的原地修改

pub mod act;
pub mod analyze;
pub mod answer;
pub mod check_exists;
pub mod clarify;
pub mod plan;
pub mod preprocess;

pub use act::act;
pub use analyze::analyze_duplicate;
pub use answer::answer;
pub use check_exists::check_exists;
pub use clarify::clarify;
pub use plan::plan;
pub use preprocess::preprocess;

pub const RATE_LIMIT_MESSAGE: &str =
    "The assistant is receiving too many requests right now. Please try again in a moment.";
pub const GENERIC_FAILURE_MESSAGE: &str = "Sorry, I couldn't generate an answer right now. Please try again.";
pub const HARD_ERROR_MESSAGE: &str = "Sorry, something went wrong while processing your request. Please try again.";

/// 含糊确认回复时加在原提示前的格式提醒
pub const CONFIRM_REMINDER: &str = "Please reply with 'yes' or 'no'.\n\n";
pub const DEFAULT_CONFIRM_PROMPT: &str = "Found a possible duplicate. Create anyway? (yes/no)";

pub const PLANNER_FALLBACK_SUMMARY: &str =
    "summary: Cannot determine tools, no result. User should rephrase question.";
