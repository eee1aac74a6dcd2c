//! 核心层：错误类型与进程生命周期（关闭信号、清理任务）

pub mod error;
pub mod shutdown;

pub use error::{IdentityError, RelayError, Result};
pub use shutdown::{
    CleanupReport, ConversationCleanup, ShutdownCleanup, ShutdownCoordinator, ShutdownManager,
    ShutdownReason,
};
