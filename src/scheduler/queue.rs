//! 优先级任务队列
//!
//! 二叉堆按（优先级降序，截止时间升序，提交序号升序）出队；
//! 同优先级且无截止时间的任务保持 FIFO。队列是共享临界区，用互斥锁保护。

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Mutex;

use crate::scheduler::task::TaskRequest;

/// 入队包装：携带单调递增序号以保证同优先级 FIFO
struct QueuedTask {
    request: TaskRequest,
    seq: u64,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap 取最大值：优先级高者大；其次截止时间早者大；最后序号小者大
        self.request
            .priority
            .cmp(&other.request.priority)
            .then_with(|| {
                let a = self.request.deadline.unwrap_or(i64::MAX);
                let b = other.request.deadline.unwrap_or(i64::MAX);
                b.cmp(&a)
            })
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// 优先级任务队列
pub struct TaskQueue {
    heap: Mutex<BinaryHeap<QueuedTask>>,
    next_seq: AtomicU64,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            next_seq: AtomicU64::new(0),
        }
    }

    /// 入队；重新入队（无可用 Agent）也走这里，会取得新序号
    pub fn push(&self, request: TaskRequest) {
        let seq = self.next_seq.fetch_add(1, AtomicOrdering::Relaxed);
        let mut heap = self.heap.lock().unwrap_or_else(|e| e.into_inner());
        heap.push(QueuedTask { request, seq });
    }

    /// 弹出当前最高优先级任务
    pub fn pop(&self) -> Option<TaskRequest> {
        let mut heap = self.heap.lock().unwrap_or_else(|e| e.into_inner());
        heap.pop().map(|q| q.request)
    }

    pub fn len(&self) -> usize {
        self.heap.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::task::TaskPriority;

    fn task(priority: TaskPriority) -> TaskRequest {
        TaskRequest::new("echo", serde_json::json!({})).with_priority(priority)
    }

    #[test]
    fn test_pop_order_by_priority() {
        let queue = TaskQueue::new();
        queue.push(task(TaskPriority::Low));
        queue.push(task(TaskPriority::Critical));
        queue.push(task(TaskPriority::Medium));

        assert_eq!(queue.pop().unwrap().priority, TaskPriority::Critical);
        assert_eq!(queue.pop().unwrap().priority, TaskPriority::Medium);
        assert_eq!(queue.pop().unwrap().priority, TaskPriority::Low);
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_earlier_deadline_wins_within_priority() {
        let queue = TaskQueue::new();
        let late = task(TaskPriority::High).with_deadline(2_000).with_id("late");
        let soon = task(TaskPriority::High).with_deadline(1_000).with_id("soon");
        queue.push(late);
        queue.push(soon);

        assert_eq!(queue.pop().unwrap().id, "soon");
        assert_eq!(queue.pop().unwrap().id, "late");
    }

    #[test]
    fn test_fifo_within_equal_priority() {
        let queue = TaskQueue::new();
        queue.push(task(TaskPriority::Medium).with_id("first"));
        queue.push(task(TaskPriority::Medium).with_id("second"));

        assert_eq!(queue.pop().unwrap().id, "first");
        assert_eq!(queue.pop().unwrap().id, "second");
    }
}
