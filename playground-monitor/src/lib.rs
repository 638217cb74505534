//! Live project registry over a directory tree.
//!
//! [`ProjectMonitor`] scans a root for project directories (those holding a
//! manifest such as `package.json`) down to a bounded depth, keeps an
//! identity → record registry, and optionally keeps it current from
//! filesystem events until closed.
//!
//! ```no_run
//! # async fn demo() -> Result<(), playground_monitor::MonitorError> {
//! use playground_monitor::{MonitorConfig, ProjectMonitor};
//!
//! let monitor = ProjectMonitor::new(MonitorConfig::new("/home/me/playground"))?;
//! monitor.refresh().await?;
//! for name in monitor.list_projects().await {
//!     println!("{name}");
//! }
//! monitor.close().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
mod error;
pub mod events;
mod logging;
mod monitor;
pub mod reconciler;
pub mod watch_set;

pub use config::MonitorConfig;
pub use error::MonitorError;
pub use events::{translate, FsEvent};
pub use logging::init_tracing;
pub use monitor::{ProjectMonitor, RefreshSummary};
pub use reconciler::{ChangeReconciler, Reconciled};
pub use watch_set::{PathWatcher, WatchSetManager};

pub use playground_core::{ProjectName, ProjectRecord, Registry, TreeLayout};
pub use playground_scanner::ScanError;
