//! # Handler Registry
//!
//! Per-event-type buckets of handlers, always kept in descending priority
//! order with ties in registration order.
//!
//! Buckets are copy-on-write: every mutation builds a new `Vec` and swaps the
//! `Arc`, so a publish that grabbed a snapshot keeps iterating exactly what it
//! saw, even if a handler registers or unregisters mid-dispatch. Buckets live
//! in a [`DashMap`], so different event types never contend on one lock.

use crate::handler::{Handler, UnregisterKey};
use dashmap::DashMap;
use std::any::TypeId;
use std::mem;
use std::sync::Arc;

/// Immutable view of one bucket, as handed to a publish.
pub(crate) type Snapshot = Arc<Vec<Arc<Handler>>>;

struct Bucket {
    event_name: &'static str,
    handlers: Snapshot,
}

#[derive(Default)]
pub(crate) struct HandlerRegistry {
    buckets: DashMap<TypeId, Bucket>,
}

impl HandlerRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Appends `handler` to the bucket for `event_type` and restores priority
    /// order. Returns the new bucket length.
    pub(crate) fn insert(
        &self,
        event_type: TypeId,
        event_name: &'static str,
        handler: Arc<Handler>,
    ) -> usize {
        let mut bucket = self.buckets.entry(event_type).or_insert_with(|| Bucket {
            event_name,
            handlers: Arc::new(Vec::new()),
        });

        let mut handlers = Vec::with_capacity(bucket.handlers.len() + 1);
        handlers.extend(bucket.handlers.iter().cloned());
        handlers.push(handler);
        restore_priority_order(&mut handlers, |h| h.priority());

        let len = handlers.len();
        let retired = mem::replace(&mut bucket.handlers, Arc::new(handlers));
        drop(bucket);
        drop(retired);
        len
    }

    /// Current snapshot of a bucket, or `None` if the event type was never
    /// registered. Does not allocate.
    pub(crate) fn snapshot(&self, event_type: &TypeId) -> Option<Snapshot> {
        self.buckets
            .get(event_type)
            .map(|bucket| Arc::clone(&bucket.handlers))
    }

    /// Removes every handler matching `key` from every bucket. Returns the
    /// number removed. Emptied buckets are kept.
    pub(crate) fn remove(&self, key: &UnregisterKey) -> usize {
        let mut removed = 0;
        // old snapshots may hold the last reference to a handler's captures,
        // so they are dropped only after every shard guard is released
        let mut retired = Vec::new();
        for mut bucket in self.buckets.iter_mut() {
            if !bucket.handlers.iter().any(|h| h.matches(key)) {
                continue;
            }
            let kept: Vec<Arc<Handler>> = bucket
                .handlers
                .iter()
                .filter(|h| !h.matches(key))
                .cloned()
                .collect();
            removed += bucket.handlers.len() - kept.len();
            retired.push(mem::replace(&mut bucket.handlers, Arc::new(kept)));
        }
        drop(retired);
        removed
    }

    pub(crate) fn len(&self) -> usize {
        self.buckets.iter().map(|bucket| bucket.handlers.len()).sum()
    }

    pub(crate) fn len_for(&self, event_type: &TypeId) -> usize {
        self.buckets
            .get(event_type)
            .map_or(0, |bucket| bucket.handlers.len())
    }

    /// Names of event types that currently have at least one handler.
    pub(crate) fn event_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self
            .buckets
            .iter()
            .filter(|bucket| !bucket.handlers.is_empty())
            .map(|bucket| bucket.event_name)
            .collect();
        names.sort_unstable();
        names
    }

    pub(crate) fn clear(&self) -> usize {
        let keys: Vec<TypeId> = self.buckets.iter().map(|bucket| *bucket.key()).collect();
        keys.iter()
            .filter_map(|key| self.buckets.remove(key))
            .map(|(_, bucket)| bucket.handlers.len())
            .sum()
    }
}

/// Restores descending priority order after a single push at the tail.
///
/// Everything before the last element must already be ordered. If the new
/// element ties with its predecessor nothing moves; otherwise it is shifted
/// left until it sits just after the last element whose priority is greater
/// than or equal to its own, which keeps ties in insertion order.
pub(crate) fn restore_priority_order<T>(items: &mut [T], priority: impl Fn(&T) -> i32) {
    let len = items.len();
    if len < 2 {
        return;
    }

    let new_priority = priority(&items[len - 1]);
    if priority(&items[len - 2]) == new_priority {
        return;
    }

    let mut index = len - 1;
    while index > 0 && priority(&items[index - 1]) < new_priority {
        items.swap(index - 1, index);
        index -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{EventFn, HandlerOptions, Tag};
    use crate::Event;

    #[derive(Debug, Clone)]
    struct Ping;
    impl Event for Ping {}

    #[derive(Debug, Clone)]
    struct Pong;
    impl Event for Pong {}

    fn noop<E: Event>() -> EventFn<E> {
        Arc::new(|_: &mut E| -> anyhow::Result<()> { Ok(()) })
    }

    fn handler(priority: i32) -> Arc<Handler> {
        Arc::new(Handler::new(
            noop::<Ping>(),
            HandlerOptions::default().priority(priority),
        ))
    }

    fn push(items: &mut Vec<(i32, usize)>, priority: i32) {
        let seq = items.len();
        items.push((priority, seq));
        restore_priority_order(items, |(p, _)| *p);
    }

    #[test]
    fn ordering_is_descending_and_stable() {
        let mut items = Vec::new();
        for p in [5, 20, 5, 10, 20, -3, 10, 5] {
            push(&mut items, p);
        }
        let priorities: Vec<i32> = items.iter().map(|(p, _)| *p).collect();
        assert_eq!(priorities, vec![20, 20, 10, 10, 5, 5, 5, -3]);

        // ties keep registration order
        let fives: Vec<usize> = items.iter().filter(|(p, _)| *p == 5).map(|(_, s)| *s).collect();
        assert_eq!(fives, vec![0, 2, 7]);
        let twenties: Vec<usize> = items.iter().filter(|(p, _)| *p == 20).map(|(_, s)| *s).collect();
        assert_eq!(twenties, vec![1, 4]);
    }

    #[test]
    fn equal_tail_priority_is_a_no_op() {
        let mut items = vec![(10, 0), (3, 1), (3, 2)];
        restore_priority_order(&mut items, |(p, _)| *p);
        assert_eq!(items, vec![(10, 0), (3, 1), (3, 2)]);
    }

    #[test]
    fn lower_priority_stays_at_the_tail() {
        let mut items = vec![(10, 0), (3, 1), (1, 2)];
        restore_priority_order(&mut items, |(p, _)| *p);
        assert_eq!(items, vec![(10, 0), (3, 1), (1, 2)]);
    }

    #[test]
    fn buckets_are_sorted_after_every_insert() {
        let registry = HandlerRegistry::new();
        let ping = TypeId::of::<Ping>();
        for p in [0, 50, -10, 50, 100] {
            registry.insert(ping, "Ping", handler(p));
            let snapshot = registry.snapshot(&ping).unwrap();
            assert!(snapshot.windows(2).all(|w| w[0].priority() >= w[1].priority()));
        }
        assert_eq!(registry.len_for(&ping), 5);
        assert_eq!(registry.len_for(&TypeId::of::<Pong>()), 0);
    }

    #[test]
    fn snapshots_are_unaffected_by_later_mutation() {
        let registry = HandlerRegistry::new();
        let ping = TypeId::of::<Ping>();
        let first = handler(0);
        registry.insert(ping, "Ping", Arc::clone(&first));

        let before = registry.snapshot(&ping).unwrap();
        registry.insert(ping, "Ping", handler(10));
        registry.remove(&UnregisterKey::from(&first));

        assert_eq!(before.len(), 1);
        assert_eq!(before[0].function_id(), first.function_id());
        let after = registry.snapshot(&ping).unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].priority(), 10);
    }

    #[test]
    fn remove_by_tag_spans_buckets_and_keeps_empty_buckets() {
        let registry = HandlerRegistry::new();
        let tag = Tag::new();
        let tagged = HandlerOptions::default().unregister_tag(tag);
        registry.insert(
            TypeId::of::<Ping>(),
            "Ping",
            Arc::new(Handler::new(noop::<Ping>(), tagged.clone())),
        );
        registry.insert(
            TypeId::of::<Pong>(),
            "Pong",
            Arc::new(Handler::new(noop::<Pong>(), tagged)),
        );
        registry.insert(
            TypeId::of::<Pong>(),
            "Pong",
            Arc::new(Handler::new(noop::<Pong>(), HandlerOptions::default())),
        );

        assert_eq!(registry.remove(&tag.into()), 2);
        assert_eq!(registry.remove(&tag.into()), 0);
        assert_eq!(registry.len(), 1);
        assert!(registry.snapshot(&TypeId::of::<Ping>()).unwrap().is_empty());
        assert_eq!(registry.event_names(), vec!["Pong"]);
    }

    #[test]
    fn unknown_type_has_no_snapshot() {
        let registry = HandlerRegistry::new();
        assert!(registry.snapshot(&TypeId::of::<Ping>()).is_none());
        assert_eq!(registry.clear(), 0);
    }
}
