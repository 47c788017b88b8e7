//! ZooKeeper client wire protocol.
//!
//! This crate implements the subset of the ZooKeeper binary protocol that
//! the bridge speaks to clients: length-prefixed frames, the primitive
//! field codec, path validation, and the request/reply record catalog.
//!
//! # Wire Format
//!
//! ```text
//! Frame:
//! ┌─────────────────┬────────────────────────────────────────────────┐
//! │  Length (4B)    │                  Payload                       │
//! │   big-endian    │  RequestHeader + RequestBody                   │
//! └─────────────────┴────────────────────────────────────────────────┘
//! ```
//!
//! The first frame of a connection carries a bare `ConnectRequest` (no
//! request header); every subsequent frame is a `RequestHeader` followed by
//! the opcode-specific body. All integers are big-endian; strings are
//! u32-length-prefixed UTF-8; byte arrays are i32-length-prefixed with `-1`
//! denoting a null array.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod codes;
pub mod error;
pub mod frame;
pub mod path;
pub mod record;
pub mod records;

pub use error::{WireError, WireResult};
pub use frame::{read_frame, write_frame, MAX_FRAME_SIZE};
pub use path::Path;
pub use records::{
    Acl, CheckVersionRequest, ConnectRequest, ConnectResponse, CreateRequest, DeleteRequest,
    GetAclRequest, Id, OpCode, PathWatchRequest, Request, RequestHeader, Response, ResponseBody,
    ResponseHeader, SetAclRequest, SetAuthRequest, SetDataRequest, SetWatchesRequest, Stat,
    SyncRequest, PING_XID,
};
