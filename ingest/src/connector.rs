use crate::error::Result;
use crate::types::{DataSource, ListOptions};
use async_trait::async_trait;
use timeline::CommonItem;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Connector interface for remote record sources.
///
/// A connector lists records from one provider, normalizes them into
/// [`CommonItem`]s and streams them to the host. Connectors hold no state
/// between invocations: every call performs a fresh, window-bounded listing.
///
/// # Lifecycle
/// 1. Host builds the connector with an authenticated transport
/// 2. Host registers it in a [`SourceRegistry`](crate::registry::SourceRegistry)
/// 3. Host calls `list_items()` with a bounded channel
/// 4. Connector streams items, then closes the channel exactly once
/// 5. Host treats channel closure as "ingestion finished"
///
/// # Example
/// ```no_run
/// use timeline_ingest::{Connector, DataSource, ListOptions};
/// use timeline_ingest::error::Result;
/// use timeline::CommonItem;
/// use async_trait::async_trait;
/// use tokio::sync::mpsc;
/// use tokio_util::sync::CancellationToken;
///
/// struct EmptyConnector {
///     source: DataSource,
/// }
///
/// #[async_trait]
/// impl Connector for EmptyConnector {
///     fn data_source(&self) -> &DataSource {
///         &self.source
///     }
///
///     async fn list_items(
///         &self,
///         _cancel: CancellationToken,
///         items: mpsc::Sender<CommonItem>,
///         _options: ListOptions,
///     ) -> Result<()> {
///         drop(items); // nothing to list
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Connector: Send + Sync {
    /// Returns the registration metadata for this connector.
    ///
    /// Declares the stable source id, display name, OAuth scopes and the
    /// request budget.
    fn data_source(&self) -> &DataSource;

    /// Returns the unique identifier for this connector.
    fn name(&self) -> &str {
        &self.data_source().id
    }

    /// Lists items and streams them onto `items`.
    ///
    /// # Arguments
    /// * `cancel` - Observed at every suspension point (rate-limit wait,
    ///   network call, channel send)
    /// * `items` - Output channel; closed by the callee on every path
    /// * `options` - Time window, and an optional import file which remote-only
    ///   connectors reject as a configuration error
    ///
    /// # Returns
    /// * `Ok(())` - Every listing task finished
    /// * `Err(...)` - Configuration error, cancellation, or the aggregated
    ///   failures of the listing tasks. Items already sent remain valid.
    async fn list_items(
        &self,
        cancel: CancellationToken,
        items: mpsc::Sender<CommonItem>,
        options: ListOptions,
    ) -> Result<()>;
}
