use dashmap::DashMap;
use std::sync::Arc;

use super::project_record::ProjectRecord;

#[derive(Clone)]
pub struct ProjectStore {
    projects: Arc<DashMap<String, ProjectRecord>>,
}

impl Default for ProjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectStore {
    pub fn new() -> Self {
        Self {
            projects: Arc::new(DashMap::new()),
        }
    }

    pub fn insert(&self, record: ProjectRecord) {
        self.projects.insert(record.id.clone(), record);
    }

    pub fn get(&self, id: &str) -> Option<ProjectRecord> {
        self.projects.get(id).map(|r| r.clone())
    }

    pub fn list(&self) -> Vec<ProjectRecord> {
        self.projects.iter().map(|r| r.value().clone()).collect()
    }

    pub fn update(&self, record: ProjectRecord) -> bool {
        if self.projects.contains_key(&record.id) {
            self.projects.insert(record.id.clone(), record);
            true
        } else {
            false
        }
    }

    pub fn delete(&self, id: &str) -> bool {
        self.projects.remove(id).is_some()
    }

    pub fn count(&self) -> usize {
        self.projects.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_project() -> ProjectRecord {
        ProjectRecord {
            id: "p-1".into(),
            tenant_id: Some("t-1".into()),
            name: "Roadmap".into(),
            description: "Q3 planning".into(),
            status: "active".into(),
            created_at_ms: 1000,
            updated_at_ms: 1000,
        }
    }

    #[test]
    fn insert_and_get() {
        let store = ProjectStore::new();
        store.insert(sample_project());
        let p = store.get("p-1").unwrap();
        assert_eq!(p.name, "Roadmap");
    }

    #[test]
    fn list_returns_all() {
        let store = ProjectStore::new();
        store.insert(sample_project());
        assert_eq!(store.list().len(), 1);
    }

    #[test]
    fn update_existing() {
        let store = ProjectStore::new();
        store.insert(sample_project());
        let mut updated = sample_project();
        updated.status = "archived".into();
        assert!(store.update(updated));
        assert_eq!(store.get("p-1").unwrap().status, "archived");
    }

    #[test]
    fn update_missing_returns_false() {
        let store = ProjectStore::new();
        assert!(!store.update(sample_project()));
    }

    #[test]
    fn delete_existing() {
        let store = ProjectStore::new();
        store.insert(sample_project());
        assert!(store.delete("p-1"));
        assert!(store.get("p-1").is_none());
    }

    #[test]
    fn delete_missing_returns_false() {
        let store = ProjectStore::new();
        assert!(!store.delete("nope"));
    }
}
