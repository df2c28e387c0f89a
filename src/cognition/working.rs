//! 工作记忆：有界、按新近度排序
//!
//! 插入超出容量时淘汰最旧条目并交还给调用方，由引擎决定晋升长期记忆
//! 还是丢弃——这是整个系统唯一的记忆回收策略。

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::cognition::state::MemoryEntry;

/// 有界工作记忆（队尾最新）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingMemory {
    entries: VecDeque<MemoryEntry>,
    capacity: usize,
}

impl WorkingMemory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// 插入新条目；若超出容量，返回被淘汰的最旧条目
    pub fn insert(&mut self, entry: MemoryEntry) -> Option<MemoryEntry> {
        self.entries.push_back(entry);
        if self.entries.len() > self.capacity {
            self.entries.pop_front()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 从新到旧迭代
    pub fn iter_recent(&self) -> impl Iterator<Item = &MemoryEntry> {
        self.entries.iter().rev()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bound_is_never_exceeded() {
        let mut wm = WorkingMemory::new(3);
        for i in 0..10 {
            wm.insert(MemoryEntry::new(format!("entry {i}"), 0.5));
            assert!(wm.len() <= 3);
        }
        assert_eq!(wm.len(), 3);
    }

    #[test]
    fn test_eviction_returns_oldest() {
        let mut wm = WorkingMemory::new(2);
        assert!(wm.insert(MemoryEntry::new("first", 0.5)).is_none());
        assert!(wm.insert(MemoryEntry::new("second", 0.5)).is_none());

        let evicted = wm.insert(MemoryEntry::new("third", 0.5)).unwrap();
        assert_eq!(evicted.content, "first");
    }

    #[test]
    fn test_recency_order() {
        let mut wm = WorkingMemory::new(3);
        wm.insert(MemoryEntry::new("old", 0.5));
        wm.insert(MemoryEntry::new("new", 0.5));

        let newest = wm.iter_recent().next().unwrap();
        assert_eq!(newest.content, "new");
    }
}
