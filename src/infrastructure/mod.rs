pub mod core;
pub mod marginfi;
pub mod mock;
pub mod observability;

pub use marginfi::RpcAccountSource;
pub use mock::MockAccountSource;
