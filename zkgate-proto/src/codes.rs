//! ZooKeeper protocol error codes.
//!
//! The reply header's `err` field carries one of these signed 32-bit
//! values. Only the subset the bridge actually produces is listed; the
//! full taxonomy lives in ZooKeeper's `KeeperException.Code`.

/// Everything is OK.
pub const OK: i32 = 0;

/// Generic system error.
pub const SYSTEM_ERROR: i32 = -1;

/// Connection to the server has been lost.
pub const CONNECTION_LOSS: i32 = -4;

/// Error while marshalling or unmarshalling data.
pub const MARSHALLING_ERROR: i32 = -5;

/// Operation is unimplemented.
pub const UNIMPLEMENTED: i32 = -6;

/// Operation timeout.
pub const OPERATION_TIMEOUT: i32 = -7;

/// Invalid arguments (in particular: an invalid path).
pub const BAD_ARGUMENTS: i32 = -8;

/// Generic API error.
pub const API_ERROR: i32 = -100;

/// Node does not exist.
pub const NO_NODE: i32 = -101;

/// Version conflict.
pub const BAD_VERSION: i32 = -103;

/// The node already exists.
pub const NODE_EXISTS: i32 = -110;

/// The node has children.
pub const NOT_EMPTY: i32 = -111;

/// The session has been expired by the server.
pub const SESSION_EXPIRED: i32 = -112;
