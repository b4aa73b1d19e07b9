use std::collections::BTreeMap;
use std::fmt;

use super::entity::EntityId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

struct Subscriber<P> {
    id: SubscriptionId,
    owner: EntityId,
    callback: Box<dyn FnMut(&P)>,
}

/// Event kind -> subscribers, fired in subscription order.
pub struct ObserverRegistry<K, P> {
    next_id: u64,
    by_kind: BTreeMap<K, Vec<Subscriber<P>>>,
}

impl<K, P> Default for ObserverRegistry<K, P> {
    fn default() -> Self {
        Self {
            next_id: 0,
            by_kind: BTreeMap::new(),
        }
    }
}

impl<K: fmt::Debug, P> fmt::Debug for ObserverRegistry<K, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (kind, subscribers) in &self.by_kind {
            map.entry(kind, &subscribers.len());
        }
        map.finish()
    }
}

impl<K: Ord + Copy, P> ObserverRegistry<K, P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &mut self,
        kind: K,
        owner: EntityId,
        callback: impl FnMut(&P) + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        self.by_kind.entry(kind).or_default().push(Subscriber {
            id,
            owner,
            callback: Box::new(callback),
        });
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let mut removed = false;
        for subscribers in self.by_kind.values_mut() {
            let before = subscribers.len();
            subscribers.retain(|subscriber| subscriber.id != id);
            removed |= subscribers.len() != before;
        }
        self.by_kind.retain(|_, subscribers| !subscribers.is_empty());
        removed
    }

    /// Drops every subscription registered on behalf of `owner`.
    pub fn unsubscribe_owner(&mut self, owner: EntityId) -> usize {
        let mut removed = 0;
        for subscribers in self.by_kind.values_mut() {
            let before = subscribers.len();
            subscribers.retain(|subscriber| subscriber.owner != owner);
            removed += before - subscribers.len();
        }
        self.by_kind.retain(|_, subscribers| !subscribers.is_empty());
        removed
    }

    pub fn notify(&mut self, kind: K, payload: &P) -> usize {
        let Some(subscribers) = self.by_kind.get_mut(&kind) else {
            return 0;
        };
        for subscriber in subscribers.iter_mut() {
            (subscriber.callback)(payload);
        }
        subscribers.len()
    }

    pub fn subscriber_count(&self, kind: K) -> usize {
        self.by_kind.get(&kind).map_or(0, Vec::len)
    }

    pub fn len(&self) -> usize {
        self.by_kind.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_kind.is_empty()
    }
}
