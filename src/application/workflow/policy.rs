//! Workflow Policies
//!
//! 观察到的后端变体在这些行为上互相矛盾，因此作为显式配置暴露

use serde::Deserialize;

/// 修改内容合并到哪些场景
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefinementScope {
    /// 所有场景
    #[default]
    AllScenes,
    /// 只有第一个场景
    LeadScene,
}

/// 不支持的画风如何处理
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtStylePolicy {
    /// 拒绝提交（ValidationError）
    #[default]
    Reject,
    /// 替换为默认画风并记录警告
    Substitute,
}

/// 修改合并策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefinementPolicy {
    pub scope: RefinementScope,
    /// 文本型修改结果截取的字符数
    pub excerpt_chars: usize,
}

impl Default for RefinementPolicy {
    fn default() -> Self {
        Self {
            scope: RefinementScope::AllScenes,
            excerpt_chars: 100,
        }
    }
}
