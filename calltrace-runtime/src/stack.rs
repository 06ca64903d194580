//! Per-thread display stacks.
//!
//! Each thread gets its own LIFO of `(module, function)` identities. The depth
//! of that stack drives indentation and nothing else: it is a presentation
//! structure, not a record of the traced program's real state. Calls filtered
//! out by the event source mean pushes and pops don't always pair up, so a pop
//! only happens when the returning identity is on top.
//!
//! A registry is owned by a tracing session and shared by its actions through
//! an `Arc`; `reset()` marks session boundaries.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::event::ThreadKey;

/// Default bound on a single thread's stack.
pub const DEFAULT_STACK_LIMIT: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ident {
    pub module: String,
    pub function: String,
}

impl Ident {
    pub fn new(module: impl Into<String>, function: impl Into<String>) -> Self {
        Ident {
            module: module.into(),
            function: function.into(),
        }
    }
}

#[derive(Debug)]
pub struct StackRegistry {
    stacks: Mutex<HashMap<ThreadKey, Vec<Ident>>>,
    limit: usize,
}

impl Default for StackRegistry {
    fn default() -> Self {
        Self::with_capacity_limit(DEFAULT_STACK_LIMIT)
    }
}

impl StackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry whose per-thread stacks never exceed `limit` entries.
    ///
    /// Returns whose matching call was filtered out leave entries behind; once
    /// a stack is full the oldest entry is evicted to make room.
    pub fn with_capacity_limit(limit: usize) -> Self {
        StackRegistry {
            stacks: Mutex::new(HashMap::new()),
            limit: limit.max(1),
        }
    }

    /// Push `ident` and return the new depth.
    pub fn push(&self, thread: ThreadKey, ident: Ident) -> usize {
        let mut stacks = self.stacks.lock().unwrap_or_else(|e| e.into_inner());
        let stack = stacks.entry(thread).or_default();
        if stack.len() >= self.limit {
            let evicted = stack.remove(0);
            log::debug!(
                "calltrace: stack for thread {} full ({} entries), evicting {}.{}",
                thread.0,
                self.limit,
                evicted.module,
                evicted.function
            );
        }
        stack.push(ident);
        stack.len()
    }

    pub fn depth(&self, thread: ThreadKey) -> usize {
        self.stacks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&thread)
            .map_or(0, Vec::len)
    }

    /// Pop the top of `thread`'s stack if it is `ident`. Returns whether it popped.
    ///
    /// A stack emptied by the pop is removed, so finished threads don't
    /// accumulate in the registry.
    pub fn pop_if_top(&self, thread: ThreadKey, ident: &Ident) -> bool {
        let mut stacks = self.stacks.lock().unwrap_or_else(|e| e.into_inner());
        let Some(stack) = stacks.get_mut(&thread) else {
            return false;
        };
        if stack.last() != Some(ident) {
            return false;
        }
        stack.pop();
        if stack.is_empty() {
            stacks.remove(&thread);
        }
        true
    }

    /// Drop every thread's stack.
    pub fn reset(&self) {
        self.stacks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Threads that currently have a stack, in key order.
    pub fn threads(&self) -> Vec<ThreadKey> {
        let stacks = self.stacks.lock().unwrap_or_else(|e| e.into_inner());
        let mut keys: Vec<ThreadKey> = stacks.keys().copied().collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T1: ThreadKey = ThreadKey(1);
    const T2: ThreadKey = ThreadKey(2);

    #[test]
    fn push_and_pop_track_depth() {
        let reg = StackRegistry::new();
        assert_eq!(reg.push(T1, Ident::new("m", "a")), 1);
        assert_eq!(reg.push(T1, Ident::new("m", "b")), 2);
        assert!(reg.pop_if_top(T1, &Ident::new("m", "b")));
        assert_eq!(reg.depth(T1), 1);
    }

    #[test]
    fn pop_requires_matching_top() {
        let reg = StackRegistry::new();
        reg.push(T1, Ident::new("m", "a"));
        reg.push(T1, Ident::new("m", "b"));
        assert!(!reg.pop_if_top(T1, &Ident::new("m", "a")));
        assert_eq!(reg.depth(T1), 2);
        assert!(!reg.pop_if_top(T2, &Ident::new("m", "a")));
    }

    #[test]
    fn threads_are_partitioned() {
        let reg = StackRegistry::new();
        reg.push(T1, Ident::new("m", "a"));
        reg.push(T2, Ident::new("m", "a"));
        reg.push(T2, Ident::new("m", "b"));
        assert_eq!(reg.depth(T1), 1);
        assert_eq!(reg.depth(T2), 2);
        assert_eq!(reg.threads(), [T1, T2]);
    }

    #[test]
    fn emptied_stacks_are_dropped() {
        let reg = StackRegistry::new();
        reg.push(T1, Ident::new("m", "a"));
        reg.push(T2, Ident::new("m", "a"));
        reg.push(T2, Ident::new("m", "b"));
        assert!(reg.pop_if_top(T1, &Ident::new("m", "a")));
        assert!(reg.pop_if_top(T2, &Ident::new("m", "b")));
        assert_eq!(reg.threads(), [T2]);
        assert!(reg.pop_if_top(T2, &Ident::new("m", "a")));
        assert!(reg.threads().is_empty());
        assert_eq!(reg.depth(T1), 0);
    }

    #[test]
    fn reset_is_idempotent() {
        let reg = StackRegistry::new();
        reg.push(T1, Ident::new("m", "a"));
        reg.reset();
        reg.reset();
        assert_eq!(reg.depth(T1), 0);
        assert_eq!(reg.push(T1, Ident::new("m", "a")), 1);
    }

    #[test]
    fn full_stack_evicts_oldest() {
        let reg = StackRegistry::with_capacity_limit(3);
        for name in ["a", "b", "c", "d"] {
            reg.push(T1, Ident::new("m", name));
        }
        assert_eq!(reg.depth(T1), 3);
        assert!(reg.pop_if_top(T1, &Ident::new("m", "d")));
        assert!(reg.pop_if_top(T1, &Ident::new("m", "c")));
        assert!(reg.pop_if_top(T1, &Ident::new("m", "b")));
        assert_eq!(reg.depth(T1), 0);
    }
}
