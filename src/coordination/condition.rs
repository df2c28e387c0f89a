//! 守卫条件评估
//!
//! 对 Conditional 模式已产出的任务结果求值；字段路径 "任务ID.路径"，
//! 特殊路径 "status" 映射为 "ok" / "error"。任一守卫不满足即跳过任务。

use std::collections::HashMap;

use crate::coordination::types::{ConditionOperator, GuardCondition};
use crate::scheduler::task::{TaskId, TaskResult};

/// 解析字段路径并从先前结果中取值；任务未执行或路径不存在返回 None
fn resolve(field: &str, prior: &HashMap<TaskId, TaskResult>) -> Option<serde_json::Value> {
    let mut parts = field.splitn(2, '.');
    let task_id = parts.next()?;
    let rest = parts.next().unwrap_or("");

    let result = prior.get(task_id)?;

    if rest == "status" {
        let status = if result.success { "ok" } else { "error" };
        return Some(serde_json::Value::String(status.to_string()));
    }
    if rest.is_empty() {
        return result.output.clone();
    }

    let mut current = result.output.as_ref()?;
    for key in rest.split('.') {
        current = current.get(key)?;
    }
    Some(current.clone())
}

/// 单个守卫是否满足
pub fn guard_holds(guard: &GuardCondition, prior: &HashMap<TaskId, TaskResult>) -> bool {
    let actual = resolve(&guard.field, prior);
    match guard.operator {
        ConditionOperator::Exists => actual.is_some(),
        ConditionOperator::NotExists => actual.is_none(),
        ConditionOperator::Equals => actual.map(|v| v == guard.value).unwrap_or(false),
        ConditionOperator::NotEquals => actual.map(|v| v != guard.value).unwrap_or(false),
        ConditionOperator::GreaterThan => compare(actual, &guard.value)
            .map(|ord| ord == std::cmp::Ordering::Greater)
            .unwrap_or(false),
        ConditionOperator::LessThan => compare(actual, &guard.value)
            .map(|ord| ord == std::cmp::Ordering::Less)
            .unwrap_or(false),
    }
}

/// 全部守卫是否满足（空守卫恒为真）
pub fn guards_hold(guards: &[GuardCondition], prior: &HashMap<TaskId, TaskResult>) -> bool {
    guards.iter().all(|g| guard_holds(g, prior))
}

/// 数值比较；任一侧不是数字则无法比较
fn compare(
    actual: Option<serde_json::Value>,
    expected: &serde_json::Value,
) -> Option<std::cmp::Ordering> {
    let a = actual?.as_f64()?;
    let b = expected.as_f64()?;
    a.partial_cmp(&b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::types::ConditionOperator as Op;

    fn prior() -> HashMap<TaskId, TaskResult> {
        let mut map = HashMap::new();
        map.insert(
            "task1".to_string(),
            TaskResult::ok(
                "task1",
                serde_json::json!({"count": 5, "nested": {"flag": true}}),
                10,
                0.9,
            ),
        );
        map.insert(
            "task2".to_string(),
            TaskResult::fail("task2", "boom", 3),
        );
        map
    }

    #[test]
    fn test_status_field_resolves_ok_and_error() {
        let prior = prior();
        let ok = GuardCondition::new("task1.status", Op::Equals, serde_json::json!("ok"));
        assert!(guard_holds(&ok, &prior));

        let err = GuardCondition::new("task2.status", Op::Equals, serde_json::json!("ok"));
        assert!(!guard_holds(&err, &prior));
    }

    #[test]
    fn test_numeric_comparison() {
        let prior = prior();
        let gt = GuardCondition::new("task1.count", Op::GreaterThan, serde_json::json!(3));
        assert!(guard_holds(&gt, &prior));

        let lt = GuardCondition::new("task1.count", Op::LessThan, serde_json::json!(3));
        assert!(!guard_holds(&lt, &prior));
    }

    #[test]
    fn test_nested_path_and_exists() {
        let prior = prior();
        let exists = GuardCondition::new("task1.nested.flag", Op::Exists, serde_json::Value::Null);
        assert!(guard_holds(&exists, &prior));

        let missing =
            GuardCondition::new("task1.nested.nope", Op::NotExists, serde_json::Value::Null);
        assert!(guard_holds(&missing, &prior));
    }

    #[test]
    fn test_unexecuted_task_field_does_not_exist() {
        let prior = prior();
        let guard = GuardCondition::new("ghost.status", Op::Exists, serde_json::Value::Null);
        assert!(!guard_holds(&guard, &prior));
    }

    #[test]
    fn test_empty_guard_list_always_holds() {
        assert!(guards_hold(&[], &prior()));
    }
}
