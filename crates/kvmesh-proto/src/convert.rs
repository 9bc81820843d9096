use kvmesh_types::{ErrorKind, KvError};
use tonic::metadata::{MetadataMap, MetadataValue};
use tonic::Status;

pub const ERROR_KIND_HEADER: &str = "kvmesh-error-kind";
pub const NEXT_VERSION_HEADER: &str = "kvmesh-next-version";
pub const NODE_HEADER: &str = "kvmesh-node";
pub const OWNER_HEADER: &str = "kvmesh-owner";

pub fn kv_error_to_status(err: KvError) -> Status {
    let mut status = match &err {
        KvError::VersionConflict { .. } => Status::aborted(err.to_string()),
        KvError::NotFound { .. } => Status::not_found(err.to_string()),
        KvError::TargetNotFound { .. } | KvError::NotOwner { .. } => {
            Status::failed_precondition(err.to_string())
        }
        KvError::ForwardFailed { .. } => Status::unavailable(err.to_string()),
        KvError::InvalidArgument(_) => Status::invalid_argument(err.to_string()),
        KvError::Transport(_) => Status::unknown(err.to_string()),
    };

    let md = status.metadata_mut();
    md.insert(ERROR_KIND_HEADER, MetadataValue::from_static(err.kind().as_str()));
    match &err {
        KvError::VersionConflict { next_version } => {
            insert_ascii(md, NEXT_VERSION_HEADER, &next_version.to_string());
        }
        KvError::TargetNotFound { node } | KvError::ForwardFailed { node, .. } => {
            insert_ascii(md, NODE_HEADER, node);
        }
        KvError::NotOwner { node, owner } => {
            insert_ascii(md, NODE_HEADER, node);
            insert_ascii(md, OWNER_HEADER, owner);
        }
        _ => {}
    }
    status
}

/// Recover a classified error from a status produced by [`kv_error_to_status`].
///
/// Returns `None` when the status carries no classification, i.e. the call
/// failed below the service (connect error, deadline, codec). `key` is the
/// key of the request that produced `status`.
pub fn status_to_kv_error(status: &Status, key: &str) -> Option<KvError> {
    let md = status.metadata();
    let kind = header(md, ERROR_KIND_HEADER)?.parse::<ErrorKind>().ok()?;
    let node = || header(md, NODE_HEADER).unwrap_or_default();

    Some(match kind {
        ErrorKind::VersionConflict => KvError::VersionConflict {
            next_version: header(md, NEXT_VERSION_HEADER)?.parse().ok()?,
        },
        ErrorKind::NotFound => KvError::not_found(key),
        ErrorKind::TargetNotFound => KvError::TargetNotFound { node: node() },
        ErrorKind::ForwardFailed => KvError::ForwardFailed {
            node: node(),
            reason: status.message().to_string(),
        },
        ErrorKind::NotOwner => KvError::NotOwner {
            node: node(),
            owner: header(md, OWNER_HEADER).unwrap_or_default(),
        },
        ErrorKind::InvalidArgument => KvError::InvalidArgument(status.message().to_string()),
        ErrorKind::Transport => KvError::Transport(status.message().to_string()),
    })
}

fn insert_ascii(md: &mut MetadataMap, header: &'static str, value: &str) {
    if let Ok(val) = MetadataValue::try_from(value) {
        md.insert(header, val);
    }
}

fn header(md: &MetadataMap, header: &str) -> Option<String> {
    md.get(header)?.to_str().ok().map(str::to_string)
}
