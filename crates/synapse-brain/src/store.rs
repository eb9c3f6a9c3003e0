use crate::types::Task;
use async_trait::async_trait;
use std::collections::HashMap;
use synapse_core::{SynapseError, SynapseResult};
use tokio::sync::RwLock;

/// Repository for tasks owned by one engine instance.
///
/// Tasks are never deleted; they are inserted at plan time and replaced
/// wholesale as execution progresses.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn insert(&self, task: Task) -> SynapseResult<()>;
    async fn get(&self, id: &str) -> SynapseResult<Option<Task>>;
    async fn update(&self, task: &Task) -> SynapseResult<()>;
    async fn list(&self) -> SynapseResult<Vec<String>>;
}

/// Process-lifetime task store. Nothing survives a restart.
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<String, Task>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert(&self, task: Task) -> SynapseResult<()> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&task.id) {
            return Err(SynapseError::Store(format!(
                "Task {} already exists",
                task.id
            )));
        }
        tasks.insert(task.id.clone(), task);
        Ok(())
    }

    async fn get(&self, id: &str) -> SynapseResult<Option<Task>> {
        Ok(self.tasks.read().await.get(id).cloned())
    }

    async fn update(&self, task: &Task) -> SynapseResult<()> {
        let mut tasks = self.tasks.write().await;
        match tasks.get_mut(&task.id) {
            Some(slot) => {
                *slot = task.clone();
                Ok(())
            }
            None => Err(SynapseError::TaskNotFound(task.id.clone())),
        }
    }

    async fn list(&self) -> SynapseResult<Vec<String>> {
        let tasks = self.tasks.read().await;
        let mut entries: Vec<(&String, &Task)> = tasks.iter().collect();
        entries.sort_by_key(|(_, t)| t.created_at);
        Ok(entries.into_iter().map(|(id, _)| id.clone()).collect())
    }
}
