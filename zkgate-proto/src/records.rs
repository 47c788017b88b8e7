//! Request and reply record catalog.
//!
//! One struct per wire shape, encoded and decoded by hand in declaration
//! order; static per-record code keeps the opcode table exhaustive at
//! compile time. [`Request`] is the tagged union over all request
//! bodies, decoded by a single `match` on the opcode.
//!
//! The handshake is special: the first frame of a session carries a bare
//! [`ConnectRequest`] with no [`RequestHeader`] in front of it.

use bytes::BytesMut;

use crate::error::WireResult;
use crate::path::Path;
use crate::record::{
    get_bool, get_buffer, get_i32, get_i64, get_string, get_string_vec, put_bool, put_buffer,
    put_i32, put_i64, put_string, put_string_vec,
};

/// Operation codes, as sent in the request header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum OpCode {
    /// Create a node.
    Create = 1,
    /// Delete a node.
    Delete = 2,
    /// Check a node's existence.
    Exists = 3,
    /// Read a node's data.
    GetData = 4,
    /// Write a node's data.
    SetData = 5,
    /// Read a node's ACL (unimplemented here).
    GetAcl = 6,
    /// Write a node's ACL (unimplemented here).
    SetAcl = 7,
    /// List a node's children.
    GetChildren = 8,
    /// Flush leader channel (echoes the path back).
    Sync = 9,
    /// Session heartbeat.
    Ping = 11,
    /// List children, with a Stat.
    GetChildren2 = 12,
    /// Compare a node's version.
    Check = 13,
    /// Multi-op transaction (unimplemented here).
    Multi = 14,
    /// Create a node, replying with a Stat.
    Create2 = 15,
    /// Close the session.
    Close = -11,
    /// Add authentication info (unimplemented here).
    SetAuth = 100,
    /// Re-register watches (unimplemented here).
    SetWatches = 101,
}

impl OpCode {
    /// Maps a raw header value to an opcode.
    #[must_use]
    pub const fn from_i32(raw: i32) -> Option<Self> {
        match raw {
            1 => Some(Self::Create),
            2 => Some(Self::Delete),
            3 => Some(Self::Exists),
            4 => Some(Self::GetData),
            5 => Some(Self::SetData),
            6 => Some(Self::GetAcl),
            7 => Some(Self::SetAcl),
            8 => Some(Self::GetChildren),
            9 => Some(Self::Sync),
            11 => Some(Self::Ping),
            12 => Some(Self::GetChildren2),
            13 => Some(Self::Check),
            14 => Some(Self::Multi),
            15 => Some(Self::Create2),
            -11 => Some(Self::Close),
            100 => Some(Self::SetAuth),
            101 => Some(Self::SetWatches),
            _ => None,
        }
    }

    /// Human-readable name for logging.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Create => "Create",
            Self::Delete => "Delete",
            Self::Exists => "Exists",
            Self::GetData => "GetData",
            Self::SetData => "SetData",
            Self::GetAcl => "GetAcl",
            Self::SetAcl => "SetAcl",
            Self::GetChildren => "GetChildren",
            Self::Sync => "Sync",
            Self::Ping => "Ping",
            Self::GetChildren2 => "GetChildren2",
            Self::Check => "Check",
            Self::Multi => "Multi",
            Self::Create2 => "Create2",
            Self::Close => "Close",
            Self::SetAuth => "SetAuth",
            Self::SetWatches => "SetWatches",
        }
    }
}

/// The xid used on every Ping reply, regardless of the request's xid.
pub const PING_XID: i32 = -2;

/// Header preceding every post-handshake request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    /// Client correlation id, echoed in the reply.
    pub xid: i32,
    /// Raw operation code.
    pub opcode: i32,
}

impl RequestHeader {
    /// Decodes a request header.
    ///
    /// # Errors
    /// Returns `ShortBuffer` if the frame is exhausted.
    pub fn decode(buf: &mut &[u8]) -> WireResult<Self> {
        Ok(Self {
            xid: get_i32(buf)?,
            opcode: get_i32(buf)?,
        })
    }

    /// Encodes a request header.
    pub fn encode(&self, buf: &mut BytesMut) {
        put_i32(buf, self.xid);
        put_i32(buf, self.opcode);
    }
}

/// Header preceding every reply body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    /// Echo of the request's xid (or [`PING_XID`] for pings).
    pub xid: i32,
    /// Transaction id; always 0, this bridge synthesizes no ordering.
    pub zxid: i64,
    /// ZooKeeper error code, 0 on success.
    pub err: i32,
}

impl ResponseHeader {
    /// Decodes a reply header.
    ///
    /// # Errors
    /// Returns `ShortBuffer` if the frame is exhausted.
    pub fn decode(buf: &mut &[u8]) -> WireResult<Self> {
        Ok(Self {
            xid: get_i32(buf)?,
            zxid: get_i64(buf)?,
            err: get_i32(buf)?,
        })
    }

    /// Encodes a reply header.
    pub fn encode(&self, buf: &mut BytesMut) {
        put_i32(buf, self.xid);
        put_i64(buf, self.zxid);
        put_i32(buf, self.err);
    }
}

/// Znode metadata, returned with several replies.
///
/// When synthesized from a KV node, `created_zxid`/`modified_zxid` mirror
/// the backend indices, `version` is the modified index saturated to i32
/// (large indices clamp at `i32::MAX` instead of wrapping), `data_length`
/// is the value's byte length, and every other field is 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stat {
    /// Zxid of the change that created this znode.
    pub created_zxid: i64,
    /// Zxid of the change that last modified this znode.
    pub modified_zxid: i64,
    /// Creation time, milliseconds from epoch.
    pub created_time: i64,
    /// Last-modified time, milliseconds from epoch.
    pub modified_time: i64,
    /// Number of changes to the data of this znode.
    pub version: i32,
    /// Number of changes to the children of this znode.
    pub children_version: i32,
    /// Number of changes to the ACL of this znode.
    pub acl_version: i32,
    /// Owning session if ephemeral, else 0.
    pub ephemeral_owner: i64,
    /// Length of the data field.
    pub data_length: i32,
    /// Number of children.
    pub num_children: i32,
    /// Zxid of the change that last modified this znode's children.
    pub pzxid: i64,
}

impl Stat {
    /// Decodes a Stat.
    ///
    /// # Errors
    /// Returns `ShortBuffer` if the frame is exhausted.
    pub fn decode(buf: &mut &[u8]) -> WireResult<Self> {
        Ok(Self {
            created_zxid: get_i64(buf)?,
            modified_zxid: get_i64(buf)?,
            created_time: get_i64(buf)?,
            modified_time: get_i64(buf)?,
            version: get_i32(buf)?,
            children_version: get_i32(buf)?,
            acl_version: get_i32(buf)?,
            ephemeral_owner: get_i64(buf)?,
            data_length: get_i32(buf)?,
            num_children: get_i32(buf)?,
            pzxid: get_i64(buf)?,
        })
    }

    /// Encodes a Stat.
    pub fn encode(&self, buf: &mut BytesMut) {
        put_i64(buf, self.created_zxid);
        put_i64(buf, self.modified_zxid);
        put_i64(buf, self.created_time);
        put_i64(buf, self.modified_time);
        put_i32(buf, self.version);
        put_i32(buf, self.children_version);
        put_i32(buf, self.acl_version);
        put_i64(buf, self.ephemeral_owner);
        put_i32(buf, self.data_length);
        put_i32(buf, self.num_children);
        put_i64(buf, self.pzxid);
    }
}

/// An ACL identity: scheme plus scheme-specific id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Id {
    /// Authentication scheme ("world", "digest", ...).
    pub scheme: String,
    /// Identity within the scheme.
    pub id: String,
}

/// A single ACL entry. Parsed but ignored: ACLs are out of scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acl {
    /// Permission bits.
    pub perms: i32,
    /// The identity the permissions apply to.
    pub id: Id,
}

impl Acl {
    fn decode(buf: &mut &[u8]) -> WireResult<Self> {
        Ok(Self {
            perms: get_i32(buf)?,
            id: Id {
                scheme: get_string(buf)?,
                id: get_string(buf)?,
            },
        })
    }

    fn encode(&self, buf: &mut BytesMut) {
        put_i32(buf, self.perms);
        put_string(buf, &self.id.scheme);
        put_string(buf, &self.id.id);
    }
}

fn decode_acls(buf: &mut &[u8]) -> WireResult<Vec<Acl>> {
    let count = get_i32(buf)?.max(0) as usize;

    // Each entry is at least 12 bytes (perms + two length prefixes).
    let mut acls = Vec::with_capacity(count.min(buf.len() / 12));
    for _ in 0..count {
        acls.push(Acl::decode(buf)?);
    }
    Ok(acls)
}

fn encode_acls(acls: &[Acl], buf: &mut BytesMut) {
    // Safe cast: counts are bounded by the frame size.
    #[allow(clippy::cast_possible_truncation)]
    put_i32(buf, acls.len() as i32);
    for acl in acls {
        acl.encode(buf);
    }
}

/// Handshake request; the first (headerless) frame of every session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Protocol version proposed by the client.
    pub protocol_version: i32,
    /// Highest zxid the client has seen.
    pub last_zxid_seen: i64,
    /// Requested session timeout, milliseconds.
    pub timeout: i32,
    /// Session id to resume, 0 for a new session.
    pub session_id: i64,
    /// Session password.
    pub passwd: Vec<u8>,
    /// Whether the client accepts a read-only server.
    pub read_only: bool,
}

impl ConnectRequest {
    /// Decodes a connect request.
    ///
    /// # Errors
    /// Returns `ShortBuffer` if the frame is exhausted.
    pub fn decode(buf: &mut &[u8]) -> WireResult<Self> {
        Ok(Self {
            protocol_version: get_i32(buf)?,
            last_zxid_seen: get_i64(buf)?,
            timeout: get_i32(buf)?,
            session_id: get_i64(buf)?,
            passwd: get_buffer(buf)?,
            read_only: get_bool(buf)?,
        })
    }

    /// Encodes a connect request.
    pub fn encode(&self, buf: &mut BytesMut) {
        put_i32(buf, self.protocol_version);
        put_i64(buf, self.last_zxid_seen);
        put_i32(buf, self.timeout);
        put_i64(buf, self.session_id);
        put_buffer(buf, &self.passwd);
        put_bool(buf, self.read_only);
    }
}

/// Handshake reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectResponse {
    /// Echo of the client's protocol version.
    pub protocol_version: i32,
    /// Granted session timeout, milliseconds.
    pub timeout: i32,
    /// Assigned session id. This bridge keeps no session state and always
    /// assigns 1; ZooKeeper's session semantics are not honored.
    pub session_id: i64,
    /// Echo of the client's password.
    pub passwd: Vec<u8>,
}

impl ConnectResponse {
    /// Decodes a connect reply.
    ///
    /// # Errors
    /// Returns `ShortBuffer` if the frame is exhausted.
    pub fn decode(buf: &mut &[u8]) -> WireResult<Self> {
        Ok(Self {
            protocol_version: get_i32(buf)?,
            timeout: get_i32(buf)?,
            session_id: get_i64(buf)?,
            passwd: get_buffer(buf)?,
        })
    }

    /// Encodes a connect reply.
    pub fn encode(&self, buf: &mut BytesMut) {
        put_i32(buf, self.protocol_version);
        put_i32(buf, self.timeout);
        put_i64(buf, self.session_id);
        put_buffer(buf, &self.passwd);
    }
}

/// Body of Create and Create2 requests (identical on the wire).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRequest {
    /// Node to create.
    pub path: Path,
    /// Initial data.
    pub data: Vec<u8>,
    /// Requested ACLs; parsed and ignored.
    pub acls: Vec<Acl>,
    /// Create mode flags (ephemeral/sequential); parsed and ignored.
    pub flags: i32,
}

impl CreateRequest {
    /// Decodes a create request body.
    ///
    /// # Errors
    /// Returns `ShortBuffer` or `InvalidString` from the field decoders.
    pub fn decode(buf: &mut &[u8]) -> WireResult<Self> {
        Ok(Self {
            path: Path::decode(buf)?,
            data: get_buffer(buf)?,
            acls: decode_acls(buf)?,
            flags: get_i32(buf)?,
        })
    }

    /// Encodes a create request body.
    pub fn encode(&self, buf: &mut BytesMut) {
        self.path.encode(buf);
        put_buffer(buf, &self.data);
        encode_acls(&self.acls, buf);
        put_i32(buf, self.flags);
    }
}

/// Body of a Delete request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRequest {
    /// Node to delete.
    pub path: Path,
    /// Expected version, -1 for unconditional.
    pub version: i32,
}

impl DeleteRequest {
    /// Decodes a delete request body.
    ///
    /// # Errors
    /// Returns `ShortBuffer` or `InvalidString` from the field decoders.
    pub fn decode(buf: &mut &[u8]) -> WireResult<Self> {
        Ok(Self {
            path: Path::decode(buf)?,
            version: get_i32(buf)?,
        })
    }

    /// Encodes a delete request body.
    pub fn encode(&self, buf: &mut BytesMut) {
        self.path.encode(buf);
        put_i32(buf, self.version);
    }
}

/// Body of Exists, GetData, GetChildren and GetChildren2 requests, which
/// all carry a path and a watch flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathWatchRequest {
    /// Target node.
    pub path: Path,
    /// Watch registration flag; parsed and ignored (watches are out of
    /// scope).
    pub watch: bool,
}

impl PathWatchRequest {
    /// Decodes a path-plus-watch request body.
    ///
    /// # Errors
    /// Returns `ShortBuffer` or `InvalidString` from the field decoders.
    pub fn decode(buf: &mut &[u8]) -> WireResult<Self> {
        Ok(Self {
            path: Path::decode(buf)?,
            watch: get_bool(buf)?,
        })
    }

    /// Encodes a path-plus-watch request body.
    pub fn encode(&self, buf: &mut BytesMut) {
        self.path.encode(buf);
        put_bool(buf, self.watch);
    }
}

/// Body of a SetData request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetDataRequest {
    /// Target node.
    pub path: Path,
    /// Replacement data.
    pub data: Vec<u8>,
    /// Expected version, -1 for unconditional.
    pub version: i32,
}

impl SetDataRequest {
    /// Decodes a set-data request body.
    ///
    /// # Errors
    /// Returns `ShortBuffer` or `InvalidString` from the field decoders.
    pub fn decode(buf: &mut &[u8]) -> WireResult<Self> {
        Ok(Self {
            path: Path::decode(buf)?,
            data: get_buffer(buf)?,
            version: get_i32(buf)?,
        })
    }

    /// Encodes a set-data request body.
    pub fn encode(&self, buf: &mut BytesMut) {
        self.path.encode(buf);
        put_buffer(buf, &self.data);
        put_i32(buf, self.version);
    }
}

/// Body of a GetAcl request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetAclRequest {
    /// Target node.
    pub path: Path,
}

impl GetAclRequest {
    /// Decodes a get-acl request body.
    ///
    /// # Errors
    /// Returns `ShortBuffer` or `InvalidString` from the field decoders.
    pub fn decode(buf: &mut &[u8]) -> WireResult<Self> {
        Ok(Self {
            path: Path::decode(buf)?,
        })
    }

    /// Encodes a get-acl request body.
    pub fn encode(&self, buf: &mut BytesMut) {
        self.path.encode(buf);
    }
}

/// Body of a SetAcl request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetAclRequest {
    /// Target node.
    pub path: Path,
    /// Replacement ACLs.
    pub acls: Vec<Acl>,
    /// Expected ACL version.
    pub version: i32,
}

impl SetAclRequest {
    /// Decodes a set-acl request body.
    ///
    /// # Errors
    /// Returns `ShortBuffer` or `InvalidString` from the field decoders.
    pub fn decode(buf: &mut &[u8]) -> WireResult<Self> {
        Ok(Self {
            path: Path::decode(buf)?,
            acls: decode_acls(buf)?,
            version: get_i32(buf)?,
        })
    }

    /// Encodes a set-acl request body.
    pub fn encode(&self, buf: &mut BytesMut) {
        self.path.encode(buf);
        encode_acls(&self.acls, buf);
        put_i32(buf, self.version);
    }
}

/// Body of a Sync request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    /// Path to sync; echoed back in the reply.
    pub path: Path,
}

impl SyncRequest {
    /// Decodes a sync request body.
    ///
    /// # Errors
    /// Returns `ShortBuffer` or `InvalidString` from the field decoders.
    pub fn decode(buf: &mut &[u8]) -> WireResult<Self> {
        Ok(Self {
            path: Path::decode(buf)?,
        })
    }

    /// Encodes a sync request body.
    pub fn encode(&self, buf: &mut BytesMut) {
        self.path.encode(buf);
    }
}

/// Body of a Check (version) request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckVersionRequest {
    /// Target node.
    pub path: Path,
    /// Version to compare against the node's modified index.
    pub version: i32,
}

impl CheckVersionRequest {
    /// Decodes a check-version request body.
    ///
    /// # Errors
    /// Returns `ShortBuffer` or `InvalidString` from the field decoders.
    pub fn decode(buf: &mut &[u8]) -> WireResult<Self> {
        Ok(Self {
            path: Path::decode(buf)?,
            version: get_i32(buf)?,
        })
    }

    /// Encodes a check-version request body.
    pub fn encode(&self, buf: &mut BytesMut) {
        self.path.encode(buf);
        put_i32(buf, self.version);
    }
}

/// Body of a SetAuth request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetAuthRequest {
    /// Auth type.
    pub auth_type: i32,
    /// Authentication scheme.
    pub scheme: String,
    /// Scheme-specific credentials.
    pub auth: Vec<u8>,
}

impl SetAuthRequest {
    /// Decodes a set-auth request body.
    ///
    /// # Errors
    /// Returns `ShortBuffer` or `InvalidString` from the field decoders.
    pub fn decode(buf: &mut &[u8]) -> WireResult<Self> {
        Ok(Self {
            auth_type: get_i32(buf)?,
            scheme: get_string(buf)?,
            auth: get_buffer(buf)?,
        })
    }

    /// Encodes a set-auth request body.
    pub fn encode(&self, buf: &mut BytesMut) {
        put_i32(buf, self.auth_type);
        put_string(buf, &self.scheme);
        put_buffer(buf, &self.auth);
    }
}

/// Body of a SetWatches request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetWatchesRequest {
    /// Zxid the watches are relative to.
    pub relative_zxid: i64,
    /// Data watch paths.
    pub data_watches: Vec<String>,
    /// Existence watch paths.
    pub exist_watches: Vec<String>,
    /// Child watch paths.
    pub child_watches: Vec<String>,
}

impl SetWatchesRequest {
    /// Decodes a set-watches request body.
    ///
    /// # Errors
    /// Returns `ShortBuffer` or `InvalidString` from the field decoders.
    pub fn decode(buf: &mut &[u8]) -> WireResult<Self> {
        Ok(Self {
            relative_zxid: get_i64(buf)?,
            data_watches: get_string_vec(buf)?,
            exist_watches: get_string_vec(buf)?,
            child_watches: get_string_vec(buf)?,
        })
    }

    /// Encodes a set-watches request body.
    pub fn encode(&self, buf: &mut BytesMut) {
        put_i64(buf, self.relative_zxid);
        put_string_vec(buf, &self.data_watches);
        put_string_vec(buf, &self.exist_watches);
        put_string_vec(buf, &self.child_watches);
    }
}

/// Tagged union over every post-handshake request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Create a node.
    Create(CreateRequest),
    /// Delete a node.
    Delete(DeleteRequest),
    /// Check a node's existence.
    Exists(PathWatchRequest),
    /// Read a node's data.
    GetData(PathWatchRequest),
    /// Write a node's data.
    SetData(SetDataRequest),
    /// Read a node's ACL.
    GetAcl(GetAclRequest),
    /// Write a node's ACL.
    SetAcl(SetAclRequest),
    /// List a node's children.
    GetChildren(PathWatchRequest),
    /// Echo the path back.
    Sync(SyncRequest),
    /// Session heartbeat.
    Ping,
    /// List children, with a Stat in the reply.
    GetChildren2(PathWatchRequest),
    /// Compare a node's version.
    Check(CheckVersionRequest),
    /// Multi-op transaction. The body is opaque to this bridge: the op
    /// always answers Unimplemented, so the payload is skipped unread.
    Multi,
    /// Create a node, replying with a Stat.
    Create2(CreateRequest),
    /// Close the session.
    Close,
    /// Add authentication info.
    SetAuth(SetAuthRequest),
    /// Re-register watches.
    SetWatches(SetWatchesRequest),
}

impl Request {
    /// Decodes the request body for `opcode`.
    ///
    /// # Errors
    /// Returns `ShortBuffer` or `InvalidString` from the field decoders.
    pub fn decode(opcode: OpCode, buf: &mut &[u8]) -> WireResult<Self> {
        Ok(match opcode {
            OpCode::Create => Self::Create(CreateRequest::decode(buf)?),
            OpCode::Delete => Self::Delete(DeleteRequest::decode(buf)?),
            OpCode::Exists => Self::Exists(PathWatchRequest::decode(buf)?),
            OpCode::GetData => Self::GetData(PathWatchRequest::decode(buf)?),
            OpCode::SetData => Self::SetData(SetDataRequest::decode(buf)?),
            OpCode::GetAcl => Self::GetAcl(GetAclRequest::decode(buf)?),
            OpCode::SetAcl => Self::SetAcl(SetAclRequest::decode(buf)?),
            OpCode::GetChildren => Self::GetChildren(PathWatchRequest::decode(buf)?),
            OpCode::Sync => Self::Sync(SyncRequest::decode(buf)?),
            OpCode::Ping => Self::Ping,
            OpCode::GetChildren2 => Self::GetChildren2(PathWatchRequest::decode(buf)?),
            OpCode::Check => Self::Check(CheckVersionRequest::decode(buf)?),
            OpCode::Multi => Self::Multi,
            OpCode::Create2 => Self::Create2(CreateRequest::decode(buf)?),
            OpCode::Close => Self::Close,
            OpCode::SetAuth => Self::SetAuth(SetAuthRequest::decode(buf)?),
            OpCode::SetWatches => Self::SetWatches(SetWatchesRequest::decode(buf)?),
        })
    }

    /// The opcode this body belongs to.
    #[must_use]
    pub const fn opcode(&self) -> OpCode {
        match self {
            Self::Create(_) => OpCode::Create,
            Self::Delete(_) => OpCode::Delete,
            Self::Exists(_) => OpCode::Exists,
            Self::GetData(_) => OpCode::GetData,
            Self::SetData(_) => OpCode::SetData,
            Self::GetAcl(_) => OpCode::GetAcl,
            Self::SetAcl(_) => OpCode::SetAcl,
            Self::GetChildren(_) => OpCode::GetChildren,
            Self::Sync(_) => OpCode::Sync,
            Self::Ping => OpCode::Ping,
            Self::GetChildren2(_) => OpCode::GetChildren2,
            Self::Check(_) => OpCode::Check,
            Self::Multi => OpCode::Multi,
            Self::Create2(_) => OpCode::Create2,
            Self::Close => OpCode::Close,
            Self::SetAuth(_) => OpCode::SetAuth,
            Self::SetWatches(_) => OpCode::SetWatches,
        }
    }
}

/// Reply body shapes. Error replies, Ping, Check, Close and Delete all
/// carry an empty body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    /// Zero-byte body.
    Empty,
    /// Create reply: the created path.
    Create {
        /// Path that was created.
        path: String,
    },
    /// Create2 reply: path plus Stat.
    Create2 {
        /// Path that was created.
        path: String,
        /// Metadata of the new node.
        stat: Stat,
    },
    /// Exists reply.
    Exists {
        /// Metadata of the node.
        stat: Stat,
    },
    /// GetData reply.
    GetData {
        /// The node's value.
        data: Vec<u8>,
        /// Metadata synthesized from the backend node.
        stat: Stat,
    },
    /// SetData reply.
    SetData {
        /// Metadata of the node.
        stat: Stat,
    },
    /// GetChildren reply.
    GetChildren {
        /// Immediate child names.
        children: Vec<String>,
    },
    /// GetChildren2 reply.
    GetChildren2 {
        /// Immediate child names.
        children: Vec<String>,
        /// Metadata of the parent.
        stat: Stat,
    },
    /// Sync reply: the echoed path.
    Sync {
        /// Path from the request.
        path: String,
    },
}

impl ResponseBody {
    /// Encodes the reply body.
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            Self::Empty => {}
            Self::Create { path } | Self::Sync { path } => put_string(buf, path),
            Self::Create2 { path, stat } => {
                put_string(buf, path);
                stat.encode(buf);
            }
            Self::Exists { stat } | Self::SetData { stat } => stat.encode(buf),
            Self::GetData { data, stat } => {
                put_buffer(buf, data);
                stat.encode(buf);
            }
            Self::GetChildren { children } => put_string_vec(buf, children),
            Self::GetChildren2 { children, stat } => {
                put_string_vec(buf, children);
                stat.encode(buf);
            }
        }
    }
}

/// A complete reply: header plus body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// The reply header.
    pub header: ResponseHeader,
    /// The reply body.
    pub body: ResponseBody,
}

impl Response {
    /// Builds a success reply.
    #[must_use]
    pub const fn ok(xid: i32, body: ResponseBody) -> Self {
        Self {
            header: ResponseHeader {
                xid,
                zxid: 0,
                err: crate::codes::OK,
            },
            body,
        }
    }

    /// Builds an error reply with an empty body.
    #[must_use]
    pub const fn error(xid: i32, err: i32) -> Self {
        Self {
            header: ResponseHeader { xid, zxid: 0, err },
            body: ResponseBody::Empty,
        }
    }

    /// Encodes header and body.
    pub fn encode(&self, buf: &mut BytesMut) {
        self.header.encode(buf);
        self.body.encode(buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WireError;

    #[test]
    fn test_opcode_values_round_trip() {
        for (raw, op) in [
            (1, OpCode::Create),
            (2, OpCode::Delete),
            (3, OpCode::Exists),
            (4, OpCode::GetData),
            (5, OpCode::SetData),
            (6, OpCode::GetAcl),
            (7, OpCode::SetAcl),
            (8, OpCode::GetChildren),
            (9, OpCode::Sync),
            (11, OpCode::Ping),
            (12, OpCode::GetChildren2),
            (13, OpCode::Check),
            (14, OpCode::Multi),
            (15, OpCode::Create2),
            (-11, OpCode::Close),
            (100, OpCode::SetAuth),
            (101, OpCode::SetWatches),
        ] {
            assert_eq!(OpCode::from_i32(raw), Some(op));
            assert_eq!(op as i32, raw);
        }
        assert_eq!(OpCode::from_i32(10), None);
        assert_eq!(OpCode::from_i32(0), None);
    }

    #[test]
    fn test_connect_request_round_trip() {
        let req = ConnectRequest {
            protocol_version: 0,
            last_zxid_seen: 0,
            timeout: 30_000,
            session_id: 0,
            passwd: vec![0; 16],
            read_only: false,
        };

        let mut buf = BytesMut::new();
        req.encode(&mut buf);
        // 4 + 8 + 4 + 8 + (4 + 16) + 1.
        assert_eq!(buf.len(), 45);

        let mut cursor = &buf[..];
        assert_eq!(ConnectRequest::decode(&mut cursor).unwrap(), req);
        assert!(cursor.is_empty());
    }

    #[test]
    fn test_create_request_round_trip() {
        let req = CreateRequest {
            path: Path::new("/a"),
            data: b"hi".to_vec(),
            acls: vec![Acl {
                perms: 31,
                id: Id {
                    scheme: "world".to_owned(),
                    id: "anyone".to_owned(),
                },
            }],
            flags: 0,
        };

        let mut buf = BytesMut::new();
        req.encode(&mut buf);

        let mut cursor = &buf[..];
        let decoded = Request::decode(OpCode::Create, &mut cursor).unwrap();
        assert_eq!(decoded, Request::Create(req));
        assert!(cursor.is_empty());
    }

    #[test]
    fn test_request_header_layout() {
        let hdr = RequestHeader { xid: 2, opcode: 1 };
        let mut buf = BytesMut::new();
        hdr.encode(&mut buf);
        assert_eq!(&buf[..], &[0, 0, 0, 2, 0, 0, 0, 1]);
    }

    #[test]
    fn test_response_header_layout() {
        let hdr = ResponseHeader {
            xid: -2,
            zxid: 0,
            err: 0,
        };
        let mut buf = BytesMut::new();
        hdr.encode(&mut buf);
        assert_eq!(
            &buf[..],
            &[0xff, 0xff, 0xff, 0xfe, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_stat_is_80_bytes() {
        let mut buf = BytesMut::new();
        Stat::default().encode(&mut buf);
        assert_eq!(buf.len(), 80);
    }

    #[test]
    fn test_empty_body_encodes_nothing() {
        let rep = Response::error(7, crate::codes::UNIMPLEMENTED);
        let mut buf = BytesMut::new();
        rep.encode(&mut buf);
        // Header only: xid + zxid + err.
        assert_eq!(buf.len(), 16);
    }

    #[test]
    fn test_multi_body_is_skipped() {
        let raw = [1u8, 2, 3, 4, 5];
        let mut cursor = &raw[..];
        assert_eq!(
            Request::decode(OpCode::Multi, &mut cursor).unwrap(),
            Request::Multi
        );
    }

    #[test]
    fn test_set_watches_round_trip() {
        let req = SetWatchesRequest {
            relative_zxid: 42,
            data_watches: vec!["/a".to_owned()],
            exist_watches: vec![],
            child_watches: vec!["/b".to_owned(), "/c".to_owned()],
        };

        let mut buf = BytesMut::new();
        req.encode(&mut buf);

        let mut cursor = &buf[..];
        assert_eq!(
            Request::decode(OpCode::SetWatches, &mut cursor).unwrap(),
            Request::SetWatches(req)
        );
    }

    #[test]
    fn test_truncated_body_is_short_buffer() {
        let req = SetDataRequest {
            path: Path::new("/a"),
            data: b"xyz".to_vec(),
            version: 3,
        };
        let mut buf = BytesMut::new();
        req.encode(&mut buf);

        let mut cursor = &buf[..buf.len() - 1];
        assert!(matches!(
            Request::decode(OpCode::SetData, &mut cursor),
            Err(WireError::ShortBuffer { .. })
        ));
    }
}
