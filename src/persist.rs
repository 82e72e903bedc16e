//! Versioned binary layout of a queue.
//!
//! A payload is a `u32` format version followed by the body:
//!
//! - version 1: tick counter, then `(reference, tick)` pairs where each
//!   reference is encoded as the object's own serde representation. On load an
//!   entry is bound to the registry's live object with the same id, and only
//!   objects the registry does not know are rebuilt from their payload;
//! - version 0: tick counter, then `(handle, tick)` pairs holding raw registry
//!   handles, which must be resolved against the registry on load.
//!
//! Only version 1 is ever written. A body must be consumed exactly; trailing
//! bytes are rejected.
//!
//! 队列的版本化二进制布局。只写出版本 1；版本 0 在加载时通过注册表解析句柄。

use crate::error::PersistError;
use crate::object::{Handle, ManagedObject};
use crate::queue::Entry;
use crate::registry::ObjectRegistry;
use crate::sync::Arc;
use crate::time::TimePoint;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

/// Version written by [`ReleaseQueue::save`](crate::ReleaseQueue::save).
pub const FORMAT_VERSION: u32 = 1;

/// The layout that stored raw handles instead of references.
pub const LEGACY_FORMAT_VERSION: u32 = 0;

#[derive(Serialize)]
struct SnapshotRef<'a, T: ManagedObject> {
    tick_counter: TimePoint,
    entries: &'a VecDeque<Entry<T>>,
}

/// Version-1 body as read back: object payloads not yet bound to live objects.
#[derive(Deserialize)]
pub(crate) struct Snapshot<T> {
    tick_counter: TimePoint,
    entries: Vec<(T, TimePoint)>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct LegacySnapshot {
    pub(crate) tick_counter: TimePoint,
    pub(crate) entries: Vec<(Handle, TimePoint)>,
}

/// A payload decoded according to its version tag.
pub(crate) enum Decoded<T> {
    Current(Snapshot<T>),
    Legacy(LegacySnapshot),
}

/// Queue contents bound to live objects, whatever layout they came from.
///
/// No share has been taken yet; the queue retains each object only once the
/// contents are accepted.
pub(crate) struct Restored<T> {
    pub(crate) tick_counter: TimePoint,
    pub(crate) entries: Vec<(Arc<T>, TimePoint)>,
}

pub(crate) fn encode<T>(
    tick_counter: TimePoint,
    entries: &VecDeque<Entry<T>>,
) -> Result<Vec<u8>, PersistError>
where
    T: ManagedObject + Serialize,
{
    let body = SnapshotRef {
        tick_counter,
        entries,
    };
    Ok(postcard::to_allocvec(&(FORMAT_VERSION, body))?)
}

pub(crate) fn decode<T>(bytes: &[u8]) -> Result<Decoded<T>, PersistError>
where
    T: ManagedObject + DeserializeOwned,
{
    let (version, body) = postcard::take_from_bytes::<u32>(bytes)?;
    match version {
        FORMAT_VERSION => Ok(Decoded::Current(decode_body(body)?)),
        LEGACY_FORMAT_VERSION => Ok(Decoded::Legacy(decode_body(body)?)),
        other => Err(PersistError::UnsupportedVersion(other)),
    }
}

fn decode_body<B: DeserializeOwned>(body: &[u8]) -> Result<B, PersistError> {
    let (decoded, rest) = postcard::take_from_bytes(body)?;
    if !rest.is_empty() {
        return Err(PersistError::TrailingBytes(rest.len()));
    }
    Ok(decoded)
}

impl<T: ManagedObject> Decoded<T> {
    /// Bind either layout to live objects.
    ///
    /// A version-1 entry resolves to the registry's object with the same id so
    /// the queue's share lands on that object; a payload the registry does not
    /// know becomes a fresh object. Legacy handles that no longer resolve
    /// belong to objects that are already gone, so their entries are dropped.
    ///
    /// 把两种布局都绑定到存活对象上。
    pub(crate) fn normalize<R>(self, registry: &R) -> Restored<T>
    where
        R: ObjectRegistry<T> + ?Sized,
    {
        match self {
            Decoded::Current(snapshot) => {
                let mut rebuilt = 0usize;
                let entries = snapshot
                    .entries
                    .into_iter()
                    .map(|(payload, stamp)| {
                        let object = registry.resolve(payload.uid()).unwrap_or_else(|| {
                            rebuilt += 1;
                            Arc::new(payload)
                        });
                        (object, stamp)
                    })
                    .collect();

                if rebuilt > 0 {
                    debug!(rebuilt, "aqueue: objects rebuilt from payload");
                }

                Restored {
                    tick_counter: snapshot.tick_counter,
                    entries,
                }
            }
            Decoded::Legacy(snapshot) => {
                let stored = snapshot.entries.len();
                let entries: Vec<_> = snapshot
                    .entries
                    .into_iter()
                    .filter_map(|(handle, stamp)| {
                        registry.resolve(handle).map(|object| (object, stamp))
                    })
                    .collect();

                let dropped = stored - entries.len();
                if dropped > 0 {
                    debug!(dropped, "aqueue: legacy handles no longer resolve");
                }

                Restored {
                    tick_counter: snapshot.tick_counter,
                    entries,
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) fn encode_legacy(snapshot: &LegacySnapshot) -> Result<Vec<u8>, PersistError> {
    Ok(postcard::to_allocvec(&(LEGACY_FORMAT_VERSION, snapshot))?)
}
