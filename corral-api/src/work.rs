//! # Work Items
//!
//! A work item is the only thing a producer ever hands to a pool. It has no
//! identity beyond its closure: it is queued, picked up by exactly one worker,
//! executed once and dropped.
//!
//! Any `FnOnce() -> anyhow::Result<()>` closure is a [`Work`]. Types that want
//! a readable name in logs implement the trait directly or wrap a closure in
//! [`NamedWork`].

use std::fmt;

/// A one-shot unit of executable work.
///
/// `do_work` consumes the item, so the executing worker cannot run it twice
/// and the item's captured state is released as soon as it returns.
pub trait Work: Send + 'static {
    /// Runs the work. An `Err` is reported by the pool and otherwise ignored;
    /// there is no return channel to the producer.
    fn do_work(self: Box<Self>) -> anyhow::Result<()>;

    /// Name used when the pool logs this item.
    fn name(&self) -> &str {
        "anonymous"
    }
}

/// Boxed work item as stored in a queue.
pub type BoxedWork = Box<dyn Work>;

impl<F> Work for F
where
    F: FnOnce() -> anyhow::Result<()> + Send + 'static,
{
    fn do_work(self: Box<Self>) -> anyhow::Result<()> {
        (*self)()
    }
}

/// A closure with a name attached.
pub struct NamedWork<F> {
    name: String,
    body: F,
}

impl<F> NamedWork<F>
where
    F: FnOnce() -> anyhow::Result<()> + Send + 'static,
{
    pub fn new(name: impl Into<String>, body: F) -> Self {
        Self {
            name: name.into(),
            body,
        }
    }
}

impl<F> Work for NamedWork<F>
where
    F: FnOnce() -> anyhow::Result<()> + Send + 'static,
{
    fn do_work(self: Box<Self>) -> anyhow::Result<()> {
        (self.body)()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<F> fmt::Debug for NamedWork<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedWork").field("name", &self.name).finish()
    }
}
