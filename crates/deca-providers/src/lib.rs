pub mod cli;
pub mod native;
pub mod router;
pub mod types;

pub use cli::{AppleScriptProvider, CliProvider};
pub use native::NativeProvider;
pub use router::ProviderRouter;
pub use types::{
    Capabilities, ExecRequest, ExecResult, FallbackInfo, Isolation, Provider,
};
