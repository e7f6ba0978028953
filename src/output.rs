//! Deferred, single-assignment values for resource wiring.
//!
//! An [`Output`] represents a value that a cloud resource will produce at
//! some future point. Outputs are cheap to clone, resolve exactly once
//! (every holder observes the same result), and compose lazily through
//! [`Output::map`], [`Output::then`] and [`Output::zip`].
//!
//! Two pieces of metadata ride along with every output:
//!
//! - a **sensitivity flag**, which propagates through every derivation so
//!   that secrets are never silently unmarked, and
//! - a **dependency set** of [`NodeId`]s naming the resources the value
//!   derives from, which is how the graph builder discovers edges without
//!   an explicit adjacency list.

use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};

use crate::error::OutputError;

/// Identifier of a registered resource node.
///
/// Outputs are tagged with the set of nodes they derive from; the graph
/// builder turns those tags into dependency edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Returns the underlying index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Shared future yielding the resolved value.
type SharedResult<T> = Shared<BoxFuture<'static, Result<T, OutputError>>>;

/// A deferred, single-assignment value resolved asynchronously.
///
/// `Output<T>` wraps a memoized future: the underlying computation runs at
/// most once and every clone observes the identical result. Derivations
/// (`map`, `then`, `zip`) are lazy and do not poll the source.
pub struct Output<T>
where
    T: Clone + Send + Sync + 'static,
{
    future: SharedResult<T>,
    sensitive: bool,
    deps: BTreeSet<NodeId>,
}

impl<T> Clone for Output<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            future: self.future.clone(),
            sensitive: self.sensitive,
            deps: self.deps.clone(),
        }
    }
}

impl<T> fmt::Debug for Output<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Output")
            .field("sensitive", &self.sensitive)
            .field("deps", &self.deps)
            .finish_non_exhaustive()
    }
}

impl<T> Output<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates an already-resolved output from a literal value.
    #[must_use]
    pub fn literal(value: T) -> Self {
        Self::from_future(async move { Ok(value) }, BTreeSet::new())
    }

    /// Creates an already-resolved output carrying the sensitive mark.
    #[must_use]
    pub fn secret(value: T) -> Self {
        Self::literal(value).sensitive()
    }

    /// Wraps an arbitrary future as an output with the given dependency set.
    pub(crate) fn from_future<F>(future: F, deps: BTreeSet<NodeId>) -> Self
    where
        F: Future<Output = Result<T, OutputError>> + Send + 'static,
    {
        Self {
            future: future.boxed().shared(),
            sensitive: false,
            deps,
        }
    }

    /// Marks this output as sensitive.
    #[must_use]
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Returns whether this output carries the sensitive mark.
    #[must_use]
    pub const fn is_sensitive(&self) -> bool {
        self.sensitive
    }

    /// Returns the set of resource nodes this value derives from.
    #[must_use]
    pub const fn deps(&self) -> &BTreeSet<NodeId> {
        &self.deps
    }

    /// Resolves the output, waiting for the producing resource if needed.
    ///
    /// # Errors
    ///
    /// Returns the resolution error of the producing resource (failed,
    /// skipped, cancelled) or of any transformation along the chain.
    pub async fn get(&self) -> Result<T, OutputError> {
        self.future.clone().await
    }

    /// Lazily transforms the resolved value.
    ///
    /// The transformation runs once, after the source resolves; the derived
    /// output inherits the sensitivity mark and dependency set.
    #[must_use]
    pub fn map<U, F>(self, f: F) -> Output<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let source = self.future;
        let mut derived =
            Output::from_future(async move { source.await.map(f) }, self.deps);
        derived.sensitive = self.sensitive;
        derived
    }

    /// Lazily applies an asynchronous, fallible transformation.
    ///
    /// This is the escape hatch for derivations that must themselves wait
    /// (settling delays, ambient lookups). Failures surface as
    /// [`OutputError::Apply`] unless the closure maps them itself.
    #[must_use]
    pub fn then<U, F, Fut>(self, f: F) -> Output<U>
    where
        U: Clone + Send + Sync + 'static,
        F: FnOnce(T) -> Fut + Send + 'static,
        Fut: Future<Output = Result<U, OutputError>> + Send + 'static,
    {
        let source = self.future;
        let mut derived = Output::from_future(
            async move {
                let value = source.await?;
                f(value).await
            },
            self.deps,
        );
        derived.sensitive = self.sensitive;
        derived
    }

    /// Combines two outputs into one that resolves once both have resolved.
    ///
    /// The combined output is sensitive if either input is, and depends on
    /// the union of both dependency sets.
    #[must_use]
    pub fn zip<B>(self, other: Output<B>) -> Output<(T, B)>
    where
        B: Clone + Send + Sync + 'static,
    {
        let left = self.future;
        let right = other.future;
        let mut deps = self.deps;
        deps.extend(other.deps);
        let mut derived = Output::from_future(
            async move { futures::try_join!(left, right) },
            deps,
        );
        derived.sensitive = self.sensitive || other.sensitive;
        derived
    }
}

/// Combines three outputs into one that resolves once all have resolved.
///
/// Sensitivity and dependencies combine exactly as for [`Output::zip`].
#[must_use]
pub fn zip3<A, B, C>(a: Output<A>, b: Output<B>, c: Output<C>) -> Output<(A, B, C)>
where
    A: Clone + Send + Sync + 'static,
    B: Clone + Send + Sync + 'static,
    C: Clone + Send + Sync + 'static,
{
    a.zip(b)
        .zip(c)
        .map(|((first, second), third)| (first, second, third))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn literal_resolves_immediately() {
        let out = Output::literal(42u32);
        assert_eq!(out.get().await, Ok(42));
        assert!(!out.is_sensitive());
        assert!(out.deps().is_empty());
    }

    #[tokio::test]
    async fn clones_observe_the_same_resolution() {
        let counter = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
        let inner = counter.clone();
        let out = Output::from_future(
            async move {
                inner.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok(String::from("once"))
            },
            BTreeSet::new(),
        );

        let a = out.clone();
        let b = out.clone();
        assert_eq!(a.get().await.unwrap(), "once");
        assert_eq!(b.get().await.unwrap(), "once");
        assert_eq!(out.get().await.unwrap(), "once");
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn map_transforms_and_keeps_deps() {
        let mut deps = BTreeSet::new();
        deps.insert(NodeId(3));
        let out = Output::from_future(async { Ok(10u32) }, deps);

        let doubled = out.map(|v| v * 2);
        assert_eq!(doubled.get().await, Ok(20));
        assert!(doubled.deps().contains(&NodeId(3)));
    }

    #[tokio::test]
    async fn sensitivity_propagates_through_deep_chains() {
        let secret = Output::secret(String::from("hunter2"));
        let hashed = secret
            .map(|s| s.len())
            .map(|n| n * 2)
            .map(|n| format!("len:{n}"));
        assert!(hashed.is_sensitive());
        assert_eq!(hashed.get().await.unwrap(), "len:14");
    }

    #[tokio::test]
    async fn zip_unions_deps_and_sensitivity() {
        let mut left_deps = BTreeSet::new();
        left_deps.insert(NodeId(0));
        let left = Output::from_future(async { Ok(1u32) }, left_deps);

        let mut right_deps = BTreeSet::new();
        right_deps.insert(NodeId(1));
        let right = Output::from_future(async { Ok(2u32) }, right_deps).sensitive();

        let both = left.zip(right);
        assert!(both.is_sensitive());
        assert_eq!(both.deps().len(), 2);
        assert_eq!(both.get().await, Ok((1, 2)));
    }

    #[tokio::test]
    async fn zip3_combines_three_values() {
        let combined = zip3(
            Output::literal(1u8),
            Output::secret(String::from("x")),
            Output::literal(true),
        );
        assert!(combined.is_sensitive());
        assert_eq!(combined.get().await.unwrap(), (1, String::from("x"), true));
    }

    #[tokio::test]
    async fn then_supports_async_transforms_and_errors() {
        let out = Output::literal(5u32).then(|v| async move {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            Ok(v + 1)
        });
        assert_eq!(out.get().await, Ok(6));

        let failing: Output<u32> = Output::literal(5u32)
            .then(|_| async { Err(OutputError::apply("lookup refused")) });
        assert!(matches!(
            failing.get().await,
            Err(OutputError::Apply { .. })
        ));
    }

    #[tokio::test]
    async fn errors_propagate_through_derivations() {
        let source: Output<u32> = Output::from_future(
            async {
                Err(OutputError::ResourceFailed {
                    node: String::from("storage-account"),
                    message: String::from("quota"),
                })
            },
            BTreeSet::new(),
        );
        let derived = source.map(|v| v + 1);
        assert!(matches!(
            derived.get().await,
            Err(OutputError::ResourceFailed { .. })
        ));
    }
}
