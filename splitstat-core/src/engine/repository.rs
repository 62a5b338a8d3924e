//! Storage for tests and cached results.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::TestResults;
use crate::model::Test;

/// A stored test. All reads and writes of one test go through its mutex.
pub type SharedTest = Arc<Mutex<Test>>;

/// Where the engine keeps its tests.
///
/// Tests live in an active set until they complete or are cancelled, then move to a
/// completed set. Implementations must never hold a collection lock while a caller
/// could be waiting on a test's mutex.
pub trait TestRepository: Send + Sync {
    /// Store a new test in the active set.
    fn insert(&self, test: Test) -> SharedTest;

    fn active(&self, test_id: &str) -> Option<SharedTest>;

    fn completed(&self, test_id: &str) -> Option<SharedTest>;

    /// Move a test from the active set to the completed set.
    ///
    /// Returns `false` if the test was not active.
    fn complete(&self, test_id: &str) -> bool;

    fn list_active(&self) -> Vec<SharedTest>;

    fn list_completed(&self) -> Vec<SharedTest>;

    fn cache_results(&self, results: TestResults);

    fn cached_results(&self, test_id: &str) -> Option<TestResults>;
}

/// Process-local repository backed by hash maps.
#[derive(Default)]
pub struct InMemoryRepository {
    active: RwLock<HashMap<String, SharedTest>>,
    completed: RwLock<HashMap<String, SharedTest>>,
    results: RwLock<HashMap<String, TestResults>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TestRepository for InMemoryRepository {
    fn insert(&self, test: Test) -> SharedTest {
        let id = test.test_id.clone();
        let shared = Arc::new(Mutex::new(test));
        self.active.write().insert(id, Arc::clone(&shared));
        shared
    }

    fn active(&self, test_id: &str) -> Option<SharedTest> {
        self.active.read().get(test_id).cloned()
    }

    fn completed(&self, test_id: &str) -> Option<SharedTest> {
        self.completed.read().get(test_id).cloned()
    }

    fn complete(&self, test_id: &str) -> bool {
        // Lock order: active, then completed.
        let mut active = self.active.write();
        match active.remove(test_id) {
            Some(test) => {
                self.completed.write().insert(test_id.to_string(), test);
                true
            }
            None => false,
        }
    }

    fn list_active(&self) -> Vec<SharedTest> {
        self.active.read().values().cloned().collect()
    }

    fn list_completed(&self) -> Vec<SharedTest> {
        self.completed.read().values().cloned().collect()
    }

    fn cache_results(&self, results: TestResults) {
        self.results.write().insert(results.test_id.clone(), results);
    }

    fn cached_results(&self, test_id: &str) -> Option<TestResults> {
        self.results.read().get(test_id).cloned()
    }
}
