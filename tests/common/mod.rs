//! Shared helpers for the Tether integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use tether::{Failure, TestFn};

/// Records the order in which hooks and bodies ran.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    fn push(&self, label: &str) {
        self.0.lock().unwrap().push(label.to_string());
    }

    /// A function that records `label` and passes.
    pub fn step(&self, label: &str) -> TestFn {
        let journal = self.clone();
        let label = label.to_string();
        TestFn::sync(move |_| {
            journal.push(&label);
            Ok(())
        })
    }

    /// A function that records `label`, yields to the runtime, then passes.
    pub fn async_step(&self, label: &str) -> TestFn {
        let journal = self.clone();
        let label = label.to_string();
        TestFn::new(move |_| {
            let journal = journal.clone();
            let label = label.clone();
            async move {
                tokio::task::yield_now().await;
                journal.push(&label);
                Ok(())
            }
        })
    }

    /// A function that records `label` and fails with `"<label> failed"`.
    pub fn failing(&self, label: &str) -> TestFn {
        let journal = self.clone();
        let label = label.to_string();
        TestFn::sync(move |_| {
            journal.push(&label);
            Err(Failure::new(format!("{label} failed")))
        })
    }

    /// A function that records `label` and panics.
    pub fn panicking(&self, label: &str) -> TestFn {
        let journal = self.clone();
        let label = label.to_string();
        TestFn::sync(move |_| {
            journal.push(&label);
            panic!("{label} exploded");
        })
    }
}

pub fn pass() -> TestFn {
    TestFn::sync(|_| Ok(()))
}
