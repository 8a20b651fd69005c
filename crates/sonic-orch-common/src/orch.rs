//! Base Orch trait.

use async_trait::async_trait;

/// Base trait for orchestration agents.
///
/// The daemon loop calls `do_task()` whenever any consumer of the Orch has
/// pending entries. Entries the Orch cannot complete stay in its consumers
/// and are presented again on the next call.
#[async_trait]
pub trait Orch: Send + Sync {
    /// Returns the name of this Orch (for logging and debugging).
    fn name(&self) -> &str;

    /// Processes pending entries from all consumers.
    async fn do_task(&mut self);

    /// Prepares for warm boot. Returns `true` if preparation was successful.
    fn bake(&mut self) -> bool {
        true
    }

    /// Lower values are processed first.
    fn priority(&self) -> i32 {
        0
    }

    fn has_pending_tasks(&self) -> bool {
        false
    }

    /// Human-readable pending entries, one per line.
    fn dump_pending_tasks(&self) -> Vec<String> {
        vec![]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingOrch {
        name: String,
        task_count: usize,
    }

    #[async_trait]
    impl Orch for CountingOrch {
        fn name(&self) -> &str {
            &self.name
        }

        async fn do_task(&mut self) {
            self.task_count += 1;
        }

        fn has_pending_tasks(&self) -> bool {
            self.task_count < 2
        }
    }

    #[tokio::test]
    async fn test_orch_trait_defaults() {
        let mut orch = CountingOrch {
            name: "counting".to_string(),
            task_count: 0,
        };

        assert_eq!(orch.name(), "counting");
        assert_eq!(orch.priority(), 0);
        assert!(orch.bake());
        assert!(orch.dump_pending_tasks().is_empty());

        while orch.has_pending_tasks() {
            orch.do_task().await;
        }
        assert_eq!(orch.task_count, 2);
    }
}
