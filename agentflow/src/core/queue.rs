//! Per-workflow task queue: FIFO pending work, one current slot, and an
//! append-only history of completed tasks.

use std::collections::VecDeque;

use thiserror::Error;

use crate::core::task::{Task, TaskError};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("task `{0}` is still current; complete it before dequeuing the next one")]
    CurrentOccupied(String),
    #[error(transparent)]
    Task(#[from] TaskError),
}

/// Queue owned by exactly one workflow invocation.
///
/// Tasks run in the order they were admitted; there is no reordering,
/// deduplication or priority.
#[derive(Debug, Default, Clone)]
pub struct TaskQueue {
    pending: VecDeque<Task>,
    current: Option<Task>,
    completed: Vec<Task>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a batch of tasks for `owner`, preserving their order.
    ///
    /// Nothing is admitted if any task already has an owner.
    pub fn enqueue_many(
        &mut self,
        owner: &str,
        tasks: impl IntoIterator<Item = Task>,
    ) -> Result<(), QueueError> {
        let mut admitted = Vec::new();
        for mut task in tasks {
            task.assign_owner(owner)?;
            admitted.push(task);
        }
        self.pending.extend(admitted);
        Ok(())
    }

    /// Move the front pending task into the current slot and return a copy.
    ///
    /// Returns `Ok(None)` when nothing is pending.
    pub fn dequeue_next(&mut self) -> Result<Option<Task>, QueueError> {
        if let Some(current) = &self.current {
            return Err(QueueError::CurrentOccupied(current.title().to_string()));
        }
        let Some(task) = self.pending.pop_front() else {
            return Ok(None);
        };
        self.current = Some(task.clone());
        Ok(Some(task))
    }

    /// Move the current task to the completed history. No-op when empty.
    pub fn complete_current(&mut self) {
        if let Some(task) = self.current.take() {
            self.completed.push(task);
        }
    }

    /// Drop every pending task, returning how many were discarded.
    pub fn clear_pending(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn current(&self) -> Option<&Task> {
        self.current.as_ref()
    }

    pub fn completed(&self) -> &[Task] {
        &self.completed
    }

    pub fn into_completed(self) -> Vec<Task> {
        self.completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn tasks() -> Vec<Task> {
        vec![
            Task::tool("A", "first", "ls", Map::new()).expect("a"),
            Task::agent("B", "second", "helper", "summarize the first file").expect("b"),
            Task::completion("C", "third", "finished").expect("c"),
        ]
    }

    fn titles(tasks: &[Task]) -> Vec<&str> {
        tasks.iter().map(Task::title).collect()
    }

    #[test]
    fn drains_in_fifo_order_regardless_of_type() {
        let mut queue = TaskQueue::new();
        queue.enqueue_many("planner", tasks()).expect("enqueue");

        while let Some(task) = queue.dequeue_next().expect("dequeue") {
            assert_eq!(queue.current().map(Task::title), Some(task.title()));
            queue.complete_current();
        }

        assert_eq!(titles(queue.completed()), vec!["A", "B", "C"]);
        assert!(!queue.has_pending());
        assert!(queue.current().is_none());
    }

    #[test]
    fn enqueue_assigns_owner() {
        let mut queue = TaskQueue::new();
        queue.enqueue_many("planner", tasks()).expect("enqueue");
        let task = queue.dequeue_next().expect("dequeue").expect("task");
        assert_eq!(task.owner_agent(), Some("planner"));
    }

    #[test]
    fn enqueue_rejects_already_owned_tasks() {
        let mut owned = Task::completion("Done", "desc", "ok").expect("task");
        owned.assign_owner("first").expect("owner");

        let mut queue = TaskQueue::new();
        let err = queue
            .enqueue_many("second", vec![tasks().remove(0), owned])
            .unwrap_err();
        assert!(matches!(
            err,
            QueueError::Task(TaskError::OwnerAlreadyAssigned { .. })
        ));
        assert_eq!(queue.pending_len(), 0);
    }

    #[test]
    fn dequeue_while_current_is_an_error() {
        let mut queue = TaskQueue::new();
        queue.enqueue_many("planner", tasks()).expect("enqueue");
        queue.dequeue_next().expect("first");

        let err = queue.dequeue_next().unwrap_err();
        assert_eq!(err, QueueError::CurrentOccupied("A".to_string()));
    }

    #[test]
    fn dequeue_on_empty_returns_none() {
        let mut queue = TaskQueue::new();
        assert_eq!(queue.dequeue_next(), Ok(None));
    }

    #[test]
    fn complete_current_is_idempotent() {
        let mut queue = TaskQueue::new();
        queue.enqueue_many("planner", tasks()).expect("enqueue");
        queue.dequeue_next().expect("dequeue");
        queue.complete_current();
        queue.complete_current();
        assert_eq!(queue.completed().len(), 1);
    }

    #[test]
    fn clear_pending_keeps_history() {
        let mut queue = TaskQueue::new();
        queue.enqueue_many("planner", tasks()).expect("enqueue");
        queue.dequeue_next().expect("dequeue");
        queue.complete_current();

        assert_eq!(queue.clear_pending(), 2);
        assert!(!queue.has_pending());
        assert_eq!(titles(queue.completed()), vec!["A"]);
    }
}
