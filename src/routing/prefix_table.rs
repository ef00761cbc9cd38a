//! URI prefix index.
//!
//! # Responsibilities
//! - Map a normalized address prefix to one bucket value
//! - Longest-prefix lookup over path segments
//! - Separate indices for exact-host and wildcard-host comparison
//!
//! # Design Decisions
//! - Nodes are shared through `Arc` and copied on write, so cloning the
//!   whole index is cheap and a clone is an independent snapshot
//! - Path segments are compared case-insensitively, host names are lowercased
//!   by the address parser
//! - Matching is segment-aligned: `/a` is a prefix of `/a/b`, not of `/ab`

use std::collections::HashMap;
use std::sync::Arc;

use crate::routing::address::{EndpointAddress, HostComparisonMode};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct AuthorityKey {
    scheme: String,
    host: Option<String>,
    port: Option<u16>,
}

impl AuthorityKey {
    fn new(address: &EndpointAddress, mode: HostComparisonMode) -> Self {
        match mode {
            HostComparisonMode::Exact => Self {
                scheme: address.scheme().to_string(),
                host: Some(address.host().to_string()),
                port: address.port(),
            },
            HostComparisonMode::StrongWildcard => Self {
                scheme: address.scheme().to_string(),
                host: None,
                port: None,
            },
        }
    }
}

#[derive(Debug, Clone)]
struct Node<T> {
    bucket: Option<T>,
    children: HashMap<String, Arc<Node<T>>>,
}

impl<T> Default for Node<T> {
    fn default() -> Self {
        Self {
            bucket: None,
            children: HashMap::new(),
        }
    }
}

impl<T: Clone> Node<T> {
    fn is_empty(&self) -> bool {
        self.bucket.is_none() && self.children.is_empty()
    }

    fn get(&self, segments: &[String]) -> Option<&T> {
        match segments.split_first() {
            None => self.bucket.as_ref(),
            Some((head, rest)) => self.children.get(head)?.get(rest),
        }
    }

    fn longest(&self, segments: &[String]) -> Option<&T> {
        let deeper = match segments.split_first() {
            Some((head, rest)) => self.children.get(head).and_then(|child| child.longest(rest)),
            None => None,
        };
        deeper.or(self.bucket.as_ref())
    }
}

fn slot<'a, T: Clone>(node: &'a mut Arc<Node<T>>, segments: &[String]) -> &'a mut Option<T> {
    let node = Arc::make_mut(node);
    match segments.split_first() {
        None => &mut node.bucket,
        Some((head, rest)) => slot(node.children.entry(head.clone()).or_default(), rest),
    }
}

fn remove_at<T: Clone>(node: &mut Arc<Node<T>>, segments: &[String]) -> Option<T> {
    match segments.split_first() {
        None => {
            node.bucket.as_ref()?;
            Arc::make_mut(node).bucket.take()
        }
        Some((head, rest)) => {
            if !node.children.contains_key(head) {
                return None;
            }
            let inner = Arc::make_mut(node);
            let child = inner.children.get_mut(head)?;
            let removed = remove_at(child, rest);
            if child.is_empty() {
                inner.children.remove(head);
            }
            removed
        }
    }
}

fn normalize(address: &EndpointAddress) -> Vec<String> {
    address.segments().map(str::to_ascii_uppercase).collect()
}

type Tree<T> = HashMap<AuthorityKey, Arc<Node<T>>>;

/// Prefix index keyed on authority plus path segments.
#[derive(Debug, Clone)]
pub struct UriPrefixIndex<T> {
    exact: Tree<T>,
    wildcard: Tree<T>,
    len: usize,
}

impl<T> Default for UriPrefixIndex<T> {
    fn default() -> Self {
        Self {
            exact: HashMap::new(),
            wildcard: HashMap::new(),
            len: 0,
        }
    }
}

impl<T: Clone> UriPrefixIndex<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn tree(&self, mode: HostComparisonMode) -> &Tree<T> {
        match mode {
            HostComparisonMode::Exact => &self.exact,
            HostComparisonMode::StrongWildcard => &self.wildcard,
        }
    }

    fn tree_mut(&mut self, mode: HostComparisonMode) -> &mut Tree<T> {
        match mode {
            HostComparisonMode::Exact => &mut self.exact,
            HostComparisonMode::StrongWildcard => &mut self.wildcard,
        }
    }

    /// Register `bucket` under `address`. If the address is already
    /// registered the existing bucket is kept and `false` is returned.
    pub fn register(&mut self, address: &EndpointAddress, mode: HostComparisonMode, bucket: T) -> bool {
        if self.get(address, mode).is_some() {
            return false;
        }
        self.insert(address, mode, bucket);
        true
    }

    /// Store `bucket` under `address`, returning the bucket it replaced.
    pub fn insert(
        &mut self,
        address: &EndpointAddress,
        mode: HostComparisonMode,
        bucket: T,
    ) -> Option<T> {
        let key = AuthorityKey::new(address, mode);
        let segments = normalize(address);
        let root = self.tree_mut(mode).entry(key).or_default();
        let previous = slot(root, &segments).replace(bucket);
        if previous.is_none() {
            self.len += 1;
        }
        previous
    }

    /// Bucket registered under exactly this address.
    pub fn get(&self, address: &EndpointAddress, mode: HostComparisonMode) -> Option<&T> {
        let key = AuthorityKey::new(address, mode);
        self.tree(mode).get(&key)?.get(&normalize(address))
    }

    /// Bucket of the longest registered prefix of `uri`.
    pub fn lookup(&self, uri: &EndpointAddress, mode: HostComparisonMode) -> Option<&T> {
        let key = AuthorityKey::new(uri, mode);
        self.tree(mode).get(&key)?.longest(&normalize(uri))
    }

    /// Remove the bucket registered under exactly this address.
    pub fn unregister(&mut self, address: &EndpointAddress, mode: HostComparisonMode) -> Option<T> {
        let key = AuthorityKey::new(address, mode);
        let segments = normalize(address);
        let tree = self.tree_mut(mode);
        let root = tree.get_mut(&key)?;
        let removed = remove_at(root, &segments);
        if root.is_empty() {
            tree.remove(&key);
        }
        if removed.is_some() {
            self.len -= 1;
        }
        removed
    }

    /// Number of registered buckets across both indices.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(uri: &str) -> EndpointAddress {
        EndpointAddress::parse(uri).unwrap()
    }

    const EXACT: HostComparisonMode = HostComparisonMode::Exact;
    const ANY: HostComparisonMode = HostComparisonMode::StrongWildcard;

    #[test]
    fn test_longest_prefix_wins() {
        let mut index = UriPrefixIndex::new();
        index.register(&addr("http://host/a/b"), EXACT, "ab");
        index.register(&addr("http://host/a"), EXACT, "a");

        assert_eq!(index.lookup(&addr("http://host/a/b/c"), EXACT), Some(&"ab"));
        assert_eq!(index.lookup(&addr("http://host/a/x"), EXACT), Some(&"a"));
        assert_eq!(index.lookup(&addr("http://host/a"), EXACT), Some(&"a"));
        assert_eq!(index.lookup(&addr("http://host/other"), EXACT), None);
    }

    #[test]
    fn test_segment_boundary() {
        let mut index = UriPrefixIndex::new();
        index.register(&addr("http://host/api"), EXACT, 1);
        assert_eq!(index.lookup(&addr("http://host/api-v2"), EXACT), None);
        assert_eq!(index.lookup(&addr("http://host/api/"), EXACT), Some(&1));
    }

    #[test]
    fn test_path_case_insensitive() {
        let mut index = UriPrefixIndex::new();
        index.register(&addr("http://host/Service"), EXACT, 1);
        assert_eq!(index.lookup(&addr("http://HOST/service/op"), EXACT), Some(&1));
    }

    #[test]
    fn test_exact_mode_compares_authority() {
        let mut index = UriPrefixIndex::new();
        index.register(&addr("http://host:8080/svc"), EXACT, 1);
        assert_eq!(index.lookup(&addr("http://host:8080/svc"), EXACT), Some(&1));
        assert_eq!(index.lookup(&addr("http://host:9090/svc"), EXACT), None);
        assert_eq!(index.lookup(&addr("http://other:8080/svc"), EXACT), None);
        assert_eq!(index.lookup(&addr("https://host:8080/svc"), EXACT), None);
        // Exact registrations are invisible to the wildcard index.
        assert_eq!(index.lookup(&addr("http://host:8080/svc"), ANY), None);
    }

    #[test]
    fn test_wildcard_mode_ignores_host() {
        let mut index = UriPrefixIndex::new();
        index.register(&addr("http://localhost/svc"), ANY, 7);
        assert_eq!(index.lookup(&addr("http://machine.example.com:81/svc"), ANY), Some(&7));
        assert_eq!(index.lookup(&addr("https://localhost/svc"), ANY), None);
    }

    #[test]
    fn test_register_reuses_existing_bucket() {
        let mut index = UriPrefixIndex::new();
        assert!(index.register(&addr("http://host/svc"), EXACT, 1));
        assert!(!index.register(&addr("http://host/svc/"), EXACT, 2));
        assert_eq!(index.get(&addr("http://host/svc"), EXACT), Some(&1));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_unregister_prunes_and_reports_missing() {
        let mut index = UriPrefixIndex::new();
        index.register(&addr("http://host/a"), EXACT, 1);
        index.register(&addr("http://host/a/b/c"), EXACT, 2);

        assert_eq!(index.unregister(&addr("http://host/a/b"), EXACT), None);
        assert_eq!(index.unregister(&addr("http://host/a/b/c"), EXACT), Some(2));
        assert_eq!(index.lookup(&addr("http://host/a/b/c"), EXACT), Some(&1));
        assert_eq!(index.unregister(&addr("http://host/a"), EXACT), Some(1));
        assert!(index.is_empty());
        assert!(index.exact.is_empty());
        assert_eq!(index.unregister(&addr("http://host/a"), EXACT), None);
    }

    #[test]
    fn test_clone_is_independent_snapshot() {
        let mut index = UriPrefixIndex::new();
        index.register(&addr("http://host/a"), EXACT, 1);
        let snapshot = index.clone();

        index.insert(&addr("http://host/a"), EXACT, 10);
        index.register(&addr("http://host/a/b"), EXACT, 2);

        assert_eq!(snapshot.lookup(&addr("http://host/a/b"), EXACT), Some(&1));
        assert_eq!(index.lookup(&addr("http://host/a/b"), EXACT), Some(&2));
        assert_eq!(index.get(&addr("http://host/a"), EXACT), Some(&10));
    }

    #[test]
    fn test_root_registration() {
        let mut index = UriPrefixIndex::new();
        index.register(&addr("http://host/"), EXACT, 0);
        assert_eq!(index.lookup(&addr("http://host/anything/deep"), EXACT), Some(&0));
    }
}
