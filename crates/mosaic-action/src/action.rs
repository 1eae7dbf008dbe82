//! The [`Action`] trait.

use mosaic_core::SetupError;

/// One setup step acting on a target (normally the problem being built).
///
/// # Contract
///
/// - [`name`](Self::name) is unique within a pipeline.
/// - [`tasks`](Self::tasks), [`before`](Self::before), and
///   [`after`](Self::after) are fixed for the action's lifetime.
/// - [`mutate`](Self::mutate) is called exactly once for each task the
///   action belongs to, in task order.
pub trait Action<T> {
    /// Unique action name.
    fn name(&self) -> &str;

    /// Tasks this action participates in.
    fn tasks(&self) -> Vec<String>;

    /// Actions of the same task that must run after this one.
    fn before(&self) -> Vec<String> {
        Vec::new()
    }

    /// Actions of the same task that must run before this one.
    fn after(&self) -> Vec<String> {
        Vec::new()
    }

    /// Perform this action's part of `task`.
    fn mutate(&mut self, task: &str, target: &mut T) -> Result<(), SetupError>;
}
