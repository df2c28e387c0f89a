//! 工作流依赖图
//!
//! 由各任务声明的前置列表构建 DAG，DFS 后序遍历得到拓扑序；
//! 遇到环或未知依赖 ID 时整个请求被拒绝，任何任务都不会执行。

use std::collections::HashMap;

use crate::coordination::types::{CoordinatedTask, CoordinationError};
use crate::scheduler::task::TaskId;

/// DFS 着色标记
#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    /// 未访问
    Unvisited,
    /// 在当前 DFS 栈上（再次遇到即成环）
    InProgress,
    /// 已完成
    Done,
}

/// 校验依赖声明并返回拓扑序（依赖在前）
///
/// 遍历根按任务声明顺序取，依赖按声明顺序深入，保证同一请求的
/// 拓扑序是确定性的。
pub fn topological_order(tasks: &[CoordinatedTask]) -> Result<Vec<TaskId>, CoordinationError> {
    let mut deps: HashMap<&str, &[TaskId]> = HashMap::new();
    for task in tasks {
        let id = task.request.id.as_str();
        if deps.insert(id, &task.request.depends_on).is_some() {
            return Err(CoordinationError::DuplicateTaskId(id.to_string()));
        }
    }

    for task in tasks {
        for dep in &task.request.depends_on {
            if !deps.contains_key(dep.as_str()) {
                return Err(CoordinationError::UnknownDependency(
                    task.request.id.clone(),
                    dep.clone(),
                ));
            }
        }
    }

    let mut marks: HashMap<&str, Mark> = deps.keys().map(|id| (*id, Mark::Unvisited)).collect();
    let mut order = Vec::with_capacity(tasks.len());

    for task in tasks {
        visit(task.request.id.as_str(), &deps, &mut marks, &mut order)?;
    }

    Ok(order)
}

/// 后序访问：先所有依赖，再自身
fn visit<'a>(
    id: &'a str,
    deps: &HashMap<&'a str, &'a [TaskId]>,
    marks: &mut HashMap<&'a str, Mark>,
    order: &mut Vec<TaskId>,
) -> Result<(), CoordinationError> {
    match marks.get(id).copied() {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::InProgress) => {
            return Err(CoordinationError::CyclicDependency(id.to_string()));
        }
        _ => {}
    }

    marks.insert(id, Mark::InProgress);

    if let Some(dep_list) = deps.get(id) {
        for dep in dep_list.iter() {
            visit(dep.as_str(), deps, marks, order)?;
        }
    }

    marks.insert(id, Mark::Done);
    order.push(id.to_string());
    Ok(())
}
