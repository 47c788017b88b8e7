//! Operation dispatcher.
//!
//! Maps every decoded request onto zero or one backend call and builds
//! the reply. Handler contract, in order: gate on the request path's
//! validity (invalid paths answer `BAD_ARGUMENTS` and never reach the
//! backend), run the backend operation, translate a backend failure
//! through [`zk_error_code`], and shape the success reply.
//!
//! Replies always carry zxid 0: the bridge synthesizes no transaction
//! ordering.

use std::sync::Arc;

use tracing::debug;

use zkgate_backend::{ErrorKind, KvClient, Node};
use zkgate_proto::codes;
use zkgate_proto::records::{
    CheckVersionRequest, CreateRequest, DeleteRequest, PathWatchRequest, Request, RequestHeader,
    Response, ResponseBody, SetDataRequest, Stat, SyncRequest, PING_XID,
};
use zkgate_proto::Path;

/// A parsed request together with its header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    /// The request header.
    pub header: RequestHeader,
    /// The decoded body.
    pub request: Request,
}

/// Translates a normalized backend failure into a ZooKeeper error code.
#[must_use]
pub const fn zk_error_code(kind: ErrorKind) -> i32 {
    match kind {
        // The taxonomy is closed, so there is no unmapped fallthrough;
        // anything an adapter could not classify arrives as Unknown.
        ErrorKind::Unknown | ErrorKind::Unreachable => codes::SYSTEM_ERROR,
        ErrorKind::Unimplemented => codes::UNIMPLEMENTED,
        ErrorKind::KeyNotFound => codes::NO_NODE,
        ErrorKind::KeyExists => codes::NODE_EXISTS,
        ErrorKind::BadVersion => codes::BAD_VERSION,
    }
}

/// Narrows a backend index to the wire's i32 version, saturating at
/// `i32::MAX` rather than wrapping.
fn saturate_version(index: u64) -> i32 {
    i32::try_from(index).unwrap_or(i32::MAX)
}

/// Synthesizes a Stat from a backend node: zxids mirror the backend
/// indices, version is the saturated modified index, everything else 0.
fn stat_from_node(node: &Node) -> Stat {
    Stat {
        created_zxid: i64::try_from(node.created_index).unwrap_or(i64::MAX),
        modified_zxid: i64::try_from(node.modified_index).unwrap_or(i64::MAX),
        version: saturate_version(node.modified_index),
        data_length: i32::try_from(node.value.len()).unwrap_or(i32::MAX),
        ..Stat::default()
    }
}

/// Per-session dispatcher over a shared backend client.
pub struct Dispatcher {
    client: Arc<dyn KvClient>,
}

impl Dispatcher {
    /// Creates a dispatcher bound to a backend.
    #[must_use]
    pub fn new(client: Arc<dyn KvClient>) -> Self {
        Self { client }
    }

    /// Runs one operation to completion and returns its reply.
    pub async fn dispatch(&self, op: Operation) -> Response {
        let xid = op.header.xid;
        match op.request {
            Request::Create(req) => self.create(xid, req, false).await,
            Request::Create2(req) => self.create(xid, req, true).await,
            Request::Delete(req) => self.delete(xid, req).await,
            Request::Exists(req) => self.exists(xid, req).await,
            Request::GetData(req) => self.get_data(xid, req).await,
            Request::SetData(req) => self.set_data(xid, req).await,
            Request::GetChildren(req) => self.get_children(xid, req, false).await,
            Request::GetChildren2(req) => self.get_children(xid, req, true).await,
            Request::Sync(req) => sync(xid, &req),
            // Protocol convention: pings answer with xid -2, not the
            // request's xid.
            Request::Ping => Response::ok(PING_XID, ResponseBody::Empty),
            Request::Check(req) => self.check(xid, req).await,
            // The success reply must go out before the session unwinds;
            // the processor tears down after enqueueing it.
            Request::Close => Response::ok(xid, ResponseBody::Empty),
            Request::GetAcl(_)
            | Request::SetAcl(_)
            | Request::Multi
            | Request::SetAuth(_)
            | Request::SetWatches(_) => {
                debug!(xid, "unimplemented operation");
                Response::error(xid, codes::UNIMPLEMENTED)
            }
        }
    }

    async fn create(&self, xid: i32, req: CreateRequest, with_stat: bool) -> Response {
        if let Some(rejected) = reject_invalid_path(xid, &req.path) {
            return rejected;
        }

        // Acls and flags are parsed but ignored: ACLs and
        // ephemeral/sequential modes are out of scope.
        match self.client.create(req.path.as_str(), &req.data).await {
            Ok(()) => {
                let path = req.path.as_str().to_owned();
                let body = if with_stat {
                    ResponseBody::Create2 {
                        path,
                        stat: Stat::default(),
                    }
                } else {
                    ResponseBody::Create { path }
                };
                Response::ok(xid, body)
            }
            Err(e) => backend_error(xid, &e),
        }
    }

    async fn delete(&self, xid: i32, req: DeleteRequest) -> Response {
        if let Some(rejected) = reject_invalid_path(xid, &req.path) {
            return rejected;
        }

        match self.client.delete(req.path.as_str(), req.version).await {
            Ok(()) => Response::ok(xid, ResponseBody::Empty),
            Err(e) => backend_error(xid, &e),
        }
    }

    async fn exists(&self, xid: i32, req: PathWatchRequest) -> Response {
        if let Some(rejected) = reject_invalid_path(xid, &req.path) {
            return rejected;
        }

        match self.client.exists(req.path.as_str()).await {
            Ok(()) => Response::ok(
                xid,
                ResponseBody::Exists {
                    stat: Stat::default(),
                },
            ),
            Err(e) => backend_error(xid, &e),
        }
    }

    async fn get_data(&self, xid: i32, req: PathWatchRequest) -> Response {
        if let Some(rejected) = reject_invalid_path(xid, &req.path) {
            return rejected;
        }

        match self.client.get_data(req.path.as_str()).await {
            Ok(node) => {
                let stat = stat_from_node(&node);
                Response::ok(
                    xid,
                    ResponseBody::GetData {
                        data: node.value,
                        stat,
                    },
                )
            }
            Err(e) => backend_error(xid, &e),
        }
    }

    async fn set_data(&self, xid: i32, req: SetDataRequest) -> Response {
        if let Some(rejected) = reject_invalid_path(xid, &req.path) {
            return rejected;
        }

        match self
            .client
            .set_data(req.path.as_str(), &req.data, req.version)
            .await
        {
            Ok(()) => Response::ok(
                xid,
                ResponseBody::SetData {
                    stat: Stat::default(),
                },
            ),
            Err(e) => backend_error(xid, &e),
        }
    }

    async fn get_children(&self, xid: i32, req: PathWatchRequest, with_stat: bool) -> Response {
        if let Some(rejected) = reject_invalid_path(xid, &req.path) {
            return rejected;
        }

        match self.client.get_children(req.path.as_str()).await {
            Ok(children) => {
                let body = if with_stat {
                    ResponseBody::GetChildren2 {
                        children,
                        stat: Stat::default(),
                    }
                } else {
                    ResponseBody::GetChildren { children }
                };
                Response::ok(xid, body)
            }
            Err(e) => backend_error(xid, &e),
        }
    }

    async fn check(&self, xid: i32, req: CheckVersionRequest) -> Response {
        if let Some(rejected) = reject_invalid_path(xid, &req.path) {
            return rejected;
        }

        match self.client.get_data(req.path.as_str()).await {
            Ok(node) => {
                if saturate_version(node.modified_index) == req.version {
                    Response::ok(xid, ResponseBody::Empty)
                } else {
                    Response::error(xid, codes::BAD_VERSION)
                }
            }
            Err(e) => backend_error(xid, &e),
        }
    }
}

/// Sync makes no backend call; it echoes the path back.
fn sync(xid: i32, req: &SyncRequest) -> Response {
    if let Some(rejected) = reject_invalid_path(xid, &req.path) {
        return rejected;
    }
    Response::ok(
        xid,
        ResponseBody::Sync {
            path: req.path.as_str().to_owned(),
        },
    )
}

/// The path gate shared by every handler with a path field.
fn reject_invalid_path(xid: i32, path: &Path) -> Option<Response> {
    if path.is_valid() {
        None
    } else {
        debug!(xid, path = %path, "invalid path");
        Some(Response::error(xid, codes::BAD_ARGUMENTS))
    }
}

fn backend_error(xid: i32, err: &zkgate_backend::BackendError) -> Response {
    let code = zk_error_code(err.kind());
    debug!(xid, code, error = %err, "backend error");
    Response::error(xid, code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use zkgate_backend::{BackendError, BackendResult, MemoryClient};
    use zkgate_proto::records::OpCode;

    /// A backend that fails every operation with one configured kind.
    struct FailingClient {
        kind: ErrorKind,
    }

    impl FailingClient {
        fn err<T>(&self) -> BackendResult<T> {
            Err(BackendError::from_kind(self.kind))
        }
    }

    #[async_trait]
    impl KvClient for FailingClient {
        async fn create(&self, _path: &str, _data: &[u8]) -> BackendResult<()> {
            self.err()
        }
        async fn delete(&self, _path: &str, _version: i32) -> BackendResult<()> {
            self.err()
        }
        async fn exists(&self, _path: &str) -> BackendResult<()> {
            self.err()
        }
        async fn get_data(&self, _path: &str) -> BackendResult<Node> {
            self.err()
        }
        async fn set_data(&self, _path: &str, _data: &[u8], _version: i32) -> BackendResult<()> {
            self.err()
        }
        async fn get_children(&self, _path: &str) -> BackendResult<Vec<String>> {
            self.err()
        }
    }

    fn op(xid: i32, request: Request) -> Operation {
        let opcode = request.opcode() as i32;
        Operation {
            header: RequestHeader { xid, opcode },
            request,
        }
    }

    fn get_data_req(path: &str) -> Request {
        Request::GetData(PathWatchRequest {
            path: Path::new(path),
            watch: false,
        })
    }

    fn memory_dispatcher() -> Dispatcher {
        Dispatcher::new(Arc::new(MemoryClient::new()))
    }

    #[test]
    fn test_backend_error_mapping_table() {
        assert_eq!(zk_error_code(ErrorKind::Unknown), codes::SYSTEM_ERROR);
        assert_eq!(zk_error_code(ErrorKind::Unimplemented), codes::UNIMPLEMENTED);
        assert_eq!(zk_error_code(ErrorKind::Unreachable), codes::SYSTEM_ERROR);
        assert_eq!(zk_error_code(ErrorKind::KeyNotFound), codes::NO_NODE);
        assert_eq!(zk_error_code(ErrorKind::KeyExists), codes::NODE_EXISTS);
        assert_eq!(zk_error_code(ErrorKind::BadVersion), codes::BAD_VERSION);
    }

    #[tokio::test]
    async fn test_each_backend_failure_maps_onto_the_wire() {
        for kind in [
            ErrorKind::Unknown,
            ErrorKind::Unimplemented,
            ErrorKind::Unreachable,
            ErrorKind::KeyNotFound,
            ErrorKind::KeyExists,
            ErrorKind::BadVersion,
        ] {
            let dispatcher = Dispatcher::new(Arc::new(FailingClient { kind }));
            let reply = dispatcher.dispatch(op(9, get_data_req("/a"))).await;
            assert_eq!(reply.header.xid, 9);
            assert_eq!(reply.header.err, zk_error_code(kind));
            assert_eq!(reply.body, ResponseBody::Empty);
        }
    }

    #[tokio::test]
    async fn test_create_then_duplicate() {
        let dispatcher = memory_dispatcher();
        let create = Request::Create(CreateRequest {
            path: Path::new("/a"),
            data: b"hi".to_vec(),
            acls: vec![],
            flags: 0,
        });

        let reply = dispatcher.dispatch(op(2, create.clone())).await;
        assert_eq!(reply.header.xid, 2);
        assert_eq!(reply.header.err, codes::OK);
        assert_eq!(
            reply.body,
            ResponseBody::Create {
                path: "/a".to_owned()
            }
        );

        let reply = dispatcher.dispatch(op(3, create)).await;
        assert_eq!(reply.header.err, codes::NODE_EXISTS);
        assert_eq!(reply.body, ResponseBody::Empty);
    }

    #[tokio::test]
    async fn test_delete_success_missing_and_mismatch() {
        let dispatcher = memory_dispatcher();
        dispatcher
            .dispatch(op(
                2,
                Request::Create(CreateRequest {
                    path: Path::new("/a"),
                    data: b"hi".to_vec(),
                    acls: vec![],
                    flags: 0,
                }),
            ))
            .await;

        let mismatched = dispatcher
            .dispatch(op(
                3,
                Request::Delete(DeleteRequest {
                    path: Path::new("/a"),
                    version: 999,
                }),
            ))
            .await;
        assert_eq!(mismatched.header.xid, 3);
        assert_eq!(mismatched.header.err, codes::BAD_VERSION);
        assert_eq!(mismatched.body, ResponseBody::Empty);

        let deleted = dispatcher
            .dispatch(op(
                4,
                Request::Delete(DeleteRequest {
                    path: Path::new("/a"),
                    version: -1,
                }),
            ))
            .await;
        assert_eq!(deleted.header.xid, 4);
        assert_eq!(deleted.header.err, codes::OK);
        assert_eq!(deleted.body, ResponseBody::Empty);

        let missing = dispatcher
            .dispatch(op(
                5,
                Request::Delete(DeleteRequest {
                    path: Path::new("/a"),
                    version: -1,
                }),
            ))
            .await;
        assert_eq!(missing.header.err, codes::NO_NODE);
        assert_eq!(missing.body, ResponseBody::Empty);
    }

    #[tokio::test]
    async fn test_get_data_synthesizes_stat() {
        let dispatcher = memory_dispatcher();
        dispatcher
            .dispatch(op(
                2,
                Request::Create(CreateRequest {
                    path: Path::new("/a"),
                    data: b"hi".to_vec(),
                    acls: vec![],
                    flags: 0,
                }),
            ))
            .await;

        let reply = dispatcher.dispatch(op(4, get_data_req("/a"))).await;
        assert_eq!(reply.header.err, codes::OK);
        let ResponseBody::GetData { data, stat } = reply.body else {
            panic!("expected GetData body");
        };
        assert_eq!(data, b"hi");
        assert_eq!(stat.data_length, 2);
        assert!(stat.created_zxid > 0);
        assert_eq!(stat.created_zxid, stat.modified_zxid);
        assert_eq!(i64::from(stat.version), stat.modified_zxid);
        assert_eq!(stat.created_time, 0);
        assert_eq!(stat.num_children, 0);
    }

    #[tokio::test]
    async fn test_set_data_version_mismatch() {
        let dispatcher = memory_dispatcher();
        dispatcher
            .dispatch(op(
                2,
                Request::Create(CreateRequest {
                    path: Path::new("/a"),
                    data: b"hi".to_vec(),
                    acls: vec![],
                    flags: 0,
                }),
            ))
            .await;

        let reply = dispatcher
            .dispatch(op(
                5,
                Request::SetData(SetDataRequest {
                    path: Path::new("/a"),
                    data: b"bye".to_vec(),
                    version: 999,
                }),
            ))
            .await;
        assert_eq!(reply.header.xid, 5);
        assert_eq!(reply.header.err, codes::BAD_VERSION);
    }

    #[tokio::test]
    async fn test_invalid_path_never_reaches_backend() {
        // A failing backend would surface SYSTEM_ERROR if called; the
        // gate must answer BAD_ARGUMENTS first.
        let dispatcher = Dispatcher::new(Arc::new(FailingClient {
            kind: ErrorKind::Unknown,
        }));

        let reply = dispatcher.dispatch(op(6, get_data_req("/a//b"))).await;
        assert_eq!(reply.header.err, codes::BAD_ARGUMENTS);
    }

    #[tokio::test]
    async fn test_ping_overrides_xid() {
        let dispatcher = memory_dispatcher();
        let reply = dispatcher.dispatch(op(1234, Request::Ping)).await;
        assert_eq!(reply.header.xid, PING_XID);
        assert_eq!(reply.header.zxid, 0);
        assert_eq!(reply.header.err, codes::OK);
        assert_eq!(reply.body, ResponseBody::Empty);
    }

    #[tokio::test]
    async fn test_sync_echoes_path() {
        let dispatcher = memory_dispatcher();
        let reply = dispatcher
            .dispatch(op(
                8,
                Request::Sync(SyncRequest {
                    path: Path::new("/a"),
                }),
            ))
            .await;
        assert_eq!(
            reply.body,
            ResponseBody::Sync {
                path: "/a".to_owned()
            }
        );
    }

    #[tokio::test]
    async fn test_check_version() {
        let dispatcher = memory_dispatcher();
        dispatcher
            .dispatch(op(
                2,
                Request::Create(CreateRequest {
                    path: Path::new("/a"),
                    data: b"x".to_vec(),
                    acls: vec![],
                    flags: 0,
                }),
            ))
            .await;

        let ResponseBody::GetData { stat, .. } =
            dispatcher.dispatch(op(3, get_data_req("/a"))).await.body
        else {
            panic!("expected GetData body");
        };

        let matching = dispatcher
            .dispatch(op(
                4,
                Request::Check(CheckVersionRequest {
                    path: Path::new("/a"),
                    version: stat.version,
                }),
            ))
            .await;
        assert_eq!(matching.header.err, codes::OK);
        assert_eq!(matching.body, ResponseBody::Empty);

        let mismatched = dispatcher
            .dispatch(op(
                5,
                Request::Check(CheckVersionRequest {
                    path: Path::new("/a"),
                    version: stat.version + 1,
                }),
            ))
            .await;
        assert_eq!(mismatched.header.err, codes::BAD_VERSION);
    }

    #[tokio::test]
    async fn test_unimplemented_operations() {
        let dispatcher = memory_dispatcher();
        for request in [
            Request::GetAcl(zkgate_proto::records::GetAclRequest {
                path: Path::new("/a"),
            }),
            Request::SetAcl(zkgate_proto::records::SetAclRequest {
                path: Path::new("/a"),
                acls: vec![],
                version: 0,
            }),
            Request::Multi,
            Request::SetAuth(zkgate_proto::records::SetAuthRequest {
                auth_type: 0,
                scheme: "digest".to_owned(),
                auth: vec![],
            }),
            Request::SetWatches(zkgate_proto::records::SetWatchesRequest {
                relative_zxid: 0,
                data_watches: vec![],
                exist_watches: vec![],
                child_watches: vec![],
            }),
        ] {
            let opcode = request.opcode();
            let reply = dispatcher.dispatch(op(77, request)).await;
            assert_eq!(reply.header.xid, 77, "{}", opcode.name());
            assert_eq!(reply.header.err, codes::UNIMPLEMENTED, "{}", opcode.name());
            assert_eq!(reply.body, ResponseBody::Empty, "{}", opcode.name());
        }
    }

    #[tokio::test]
    async fn test_get_children_variants() {
        let dispatcher = memory_dispatcher();
        for (xid, path) in [(2, "/a/x"), (3, "/a/y")] {
            dispatcher
                .dispatch(op(
                    xid,
                    Request::Create(CreateRequest {
                        path: Path::new(path),
                        data: vec![],
                        acls: vec![],
                        flags: 0,
                    }),
                ))
                .await;
        }

        let plain = dispatcher
            .dispatch(op(
                4,
                Request::GetChildren(PathWatchRequest {
                    path: Path::new("/a"),
                    watch: false,
                }),
            ))
            .await;
        assert_eq!(
            plain.body,
            ResponseBody::GetChildren {
                children: vec!["x".to_owned(), "y".to_owned()]
            }
        );

        let with_stat = dispatcher
            .dispatch(op(
                5,
                Request::GetChildren2(PathWatchRequest {
                    path: Path::new("/a"),
                    watch: false,
                }),
            ))
            .await;
        assert_eq!(
            with_stat.body,
            ResponseBody::GetChildren2 {
                children: vec!["x".to_owned(), "y".to_owned()],
                stat: Stat::default()
            }
        );
    }

    #[test]
    fn test_version_saturates_instead_of_wrapping() {
        assert_eq!(saturate_version(7), 7);
        assert_eq!(saturate_version(u64::from(u32::MAX)), i32::MAX);
        assert_eq!(saturate_version(u64::MAX), i32::MAX);
    }

    #[test]
    fn test_stat_from_large_index() {
        let node = Node {
            path: "/a".to_owned(),
            value: b"abc".to_vec(),
            created_index: u64::MAX,
            modified_index: u64::MAX,
        };
        let stat = stat_from_node(&node);
        assert_eq!(stat.version, i32::MAX);
        assert_eq!(stat.created_zxid, i64::MAX);
        assert_eq!(stat.data_length, 3);
    }

    #[test]
    fn test_operation_opcode_helper() {
        let operation = op(1, Request::Ping);
        assert_eq!(operation.header.opcode, OpCode::Ping as i32);
    }
}
