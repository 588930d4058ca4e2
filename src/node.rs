use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

/// A slot inside a bucket: either a plain value or a nested bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Node {
    Value(Vec<u8>),
    Bucket(Arc<BucketData>),
}

impl Node {
    pub(crate) fn is_bucket(&self) -> bool {
        matches!(self, Node::Bucket(_))
    }

    /// Bytes yielded by cursors; nested buckets surface with an empty value.
    pub(crate) fn cursor_value(&self) -> Vec<u8> {
        match self {
            Node::Value(v) => v.clone(),
            Node::Bucket(_) => Vec::new(),
        }
    }
}

/// Ordered contents of one bucket.
///
/// Trees are shared between the committed state and every open transaction;
/// writers clone only the buckets they touch (`Arc::make_mut`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct BucketData {
    pub(crate) entries: BTreeMap<Vec<u8>, Node>,
}

impl BucketData {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn get(&self, key: &[u8]) -> Option<&Node> {
        self.entries.get(key)
    }

    pub(crate) fn child(&self, name: &[u8]) -> Option<&Arc<BucketData>> {
        match self.entries.get(name)? {
            Node::Bucket(b) => Some(b),
            Node::Value(_) => None,
        }
    }

    /// Walk `path` down from this bucket.
    pub(crate) fn resolve(&self, path: &[Vec<u8>]) -> Option<&BucketData> {
        let mut data = self;
        for name in path {
            data = data.child(name)?;
        }
        Some(data)
    }

    pub(crate) fn first(&self) -> Option<(&Vec<u8>, &Node)> {
        self.entries.iter().next()
    }

    pub(crate) fn last(&self) -> Option<(&Vec<u8>, &Node)> {
        self.entries.iter().next_back()
    }

    /// First entry with key >= `key`.
    pub(crate) fn seek(&self, key: &[u8]) -> Option<(&Vec<u8>, &Node)> {
        self.entries
            .range::<[u8], _>((Bound::Included(key), Bound::Unbounded))
            .next()
    }

    /// First entry with key > `key`.
    pub(crate) fn after(&self, key: &[u8]) -> Option<(&Vec<u8>, &Node)> {
        self.entries
            .range::<[u8], _>((Bound::Excluded(key), Bound::Unbounded))
            .next()
    }

    /// Last entry with key < `key`.
    pub(crate) fn before(&self, key: &[u8]) -> Option<(&Vec<u8>, &Node)> {
        self.entries
            .range::<[u8], _>((Bound::Unbounded, Bound::Excluded(key)))
            .next_back()
    }
}

/// Walk `path` down from `root`, detaching every bucket on the way from
/// snapshots that still share it.
pub(crate) fn resolve_mut<'a>(
    mut data: &'a mut Arc<BucketData>,
    path: &[Vec<u8>],
) -> Option<&'a mut BucketData> {
    for name in path {
        match Arc::make_mut(data).entries.get_mut(name.as_slice())? {
            Node::Bucket(child) => data = child,
            Node::Value(_) => return None,
        }
    }
    Some(Arc::make_mut(data))
}
