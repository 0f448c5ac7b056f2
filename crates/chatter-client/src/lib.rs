pub mod auth;
pub mod calls;
pub mod channels;
pub mod messages;
pub mod storage;

pub use auth::{AuthConfig, AuthGateway};
pub use calls::{CallBackend, CallCredentials, CallInvocation, CallKind, CallLauncher};
pub use channels::{ChannelDirectory, ChannelFeed};
pub use messages::{MessageFeed, MessagePipeline};
pub use storage::{ImageBucket, StorageConfig};
