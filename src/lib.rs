pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod generate;
pub mod graph;
pub mod mirror;
pub mod schema;
pub mod store;
pub mod sync;
pub mod ui;

pub use cli::{Cli, Commands};
pub use context::RunContext;
pub use error::{MirrorError, MirrorResult};
pub use sync::{GraphSynchronizer, SyncMode, SyncReport, SyncState};
pub use ui::{LogUi, Phase, SilentUi, Ui, UiApp};
