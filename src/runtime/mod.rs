//! Runtime plumbing shared by the reactor and the task layer.

pub(crate) mod context;
pub(crate) mod queue;
pub(crate) mod waker;
