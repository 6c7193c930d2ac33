use crate::crd::Workflow;
use kube::ResourceExt;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// In-memory index of the latest known [`Workflow`] per name.
///
/// Written by the workflow watch and read by the activity watch, so every
/// access goes through the lock. Readers receive `Arc` snapshots and never
/// hold the lock while evaluating.
#[derive(Debug, Default)]
pub struct WorkflowDirectory {
    entries: RwLock<HashMap<String, Arc<Workflow>>>,
}

impl WorkflowDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry with the same name.
    pub fn upsert(&self, workflow: Workflow) -> Arc<Workflow> {
        let name = workflow.name_any();
        let workflow = Arc::new(workflow);
        self.write().insert(name, Arc::clone(&workflow));
        workflow
    }

    /// Insert `workflow` unless an entry with its name already exists, and
    /// return whichever entry ends up in the directory.
    pub fn insert_if_absent(&self, workflow: Workflow) -> Arc<Workflow> {
        let name = workflow.name_any();
        let mut entries = self.write();
        Arc::clone(
            entries
                .entry(name)
                .or_insert_with(|| Arc::new(workflow)),
        )
    }

    pub fn remove(&self, name: &str) -> Option<Arc<Workflow>> {
        self.write().remove(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Workflow>> {
        self.read().get(name).cloned()
    }

    /// Replace the whole directory with a fresh listing.
    pub fn replace_all(&self, workflows: impl IntoIterator<Item = Workflow>) {
        let fresh: HashMap<String, Arc<Workflow>> = workflows
            .into_iter()
            .map(|w| (w.name_any(), Arc::new(w)))
            .collect();
        *self.write() = fresh;
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Sorted names of every known workflow.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<Workflow>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<Workflow>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}
