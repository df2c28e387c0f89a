//! 访问控制协作方
//!
//! 每次任务提交前询问一次：该 actor 以当前角色能否提交编排工作。

use std::collections::HashSet;

/// 访问控制 trait：同步布尔判定，拒绝即同步失败不入队
pub trait AccessControl: Send + Sync {
    fn can_submit(&self, actor_id: &str, role: &str) -> bool;
}

/// 放行所有请求（测试与单租户场景）
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessControl for AllowAll {
    fn can_submit(&self, _actor_id: &str, _role: &str) -> bool {
        true
    }
}

/// 角色白名单：仅列出的角色可提交
#[derive(Debug, Clone)]
pub struct RoleList {
    allowed: HashSet<String>,
}

impl RoleList {
    pub fn new(roles: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            allowed: roles.into_iter().map(Into::into).collect(),
        }
    }
}

impl AccessControl for RoleList {
    fn can_submit(&self, _actor_id: &str, role: &str) -> bool {
        self.allowed.contains(role)
    }
}
