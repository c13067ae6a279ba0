//! Process-wide set of host-registration URLs that have already been
//! confirmed during this process's lifetime (spec.md §3 `RegistrationSet`).
//!
//! The source models this as a class-level Python list shared by every
//! `Connector` instance in the process; here it is an explicitly shared
//! `Arc<Mutex<HashSet<String>>>` so ownership is visible at the type level
//! instead of being an implicit global (DESIGN NOTES).

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Default)]
pub struct RegistrationSet(Arc<Mutex<HashSet<String>>>);

impl RegistrationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `url` as registered if it wasn't already. Returns `true` if this
    /// call is the one that added it (i.e. the caller should register now).
    pub fn mark_if_absent(&self, url: &str) -> bool {
        let mut set = self.0.lock().expect("registration set lock poisoned");
        if set.contains(url) {
            false
        } else {
            set.insert(url.to_string());
            true
        }
    }

    pub fn contains(&self, url: &str) -> bool {
        self.0.lock().expect("registration set lock poisoned").contains(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn registers_url_at_most_once() {
        let set = RegistrationSet::new();
        assert!(set.mark_if_absent("http://h/api/extractors"));
        assert!(!set.mark_if_absent("http://h/api/extractors"));
        assert!(set.contains("http://h/api/extractors"));
    }

    #[test]
    fn concurrent_mark_only_lets_one_thread_through() {
        let set = RegistrationSet::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let set = set.clone();
                thread::spawn(move || set.mark_if_absent("http://h/api/extractors"))
            })
            .collect();
        let winners: usize = handles.into_iter().map(|h| h.join().unwrap() as usize).sum();
        assert_eq!(winners, 1);
    }
}
