pub mod dial;
pub mod pool;
pub mod stream;

pub use dial::{Destination, Dialer, NetDialer, Scheme};
pub use pool::{ConnectionPool, PooledConn};
pub use stream::{BoxedStream, Transport};
