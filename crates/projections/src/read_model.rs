//! Query access to projected state.

use async_trait::async_trait;

/// A queryable view kept current by a [`crate::Projection`].
#[async_trait]
pub trait ReadModel: Send + Sync {
    /// Returns the name of this read model.
    fn name(&self) -> &'static str;

    /// Number of rows the view currently holds.
    async fn count(&self) -> usize;
}
