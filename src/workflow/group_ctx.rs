//! 问题组处理上下文
//!
//! 封装"我正在处理第几个组、它是谁"这一信息，只用于日志显示。

use std::fmt::Display;

/// 问题组处理上下文
#[derive(Debug, Clone)]
pub struct GroupCtx {
    /// 组在本次运行中的序号（从 1 开始，仅用于日志显示）
    pub group_index: usize,
    /// 本次运行的组总数
    pub total_groups: usize,
    /// 组的存储键
    pub key: String,
}

impl GroupCtx {
    pub fn new(group_index: usize, total_groups: usize, key: String) -> Self {
        Self {
            group_index,
            total_groups,
            key,
        }
    }
}

impl Display for GroupCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[组 {}/{} #{}]", self.group_index, self.total_groups, self.key)
    }
}
