//! 编排层错误类型
//!
//! 只收录同步失败（提交被拒、句柄失效等）；任务执行期的失败一律落入
//! TaskResult / CoordinationResult 的错误槽，不走这里。

use thiserror::Error;

/// 调度与提交过程中的同步错误
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// 访问控制拒绝：在入队前同步抛出
    #[error("Permission denied for actor '{0}'")]
    PermissionDenied(String),

    /// 等待了一个从未提交过的任务 ID
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// 调度器已停止，结果不会再产生
    #[error("Scheduler stopped")]
    SchedulerStopped,

    #[error("Store error: {0}")]
    StoreError(String),
}
