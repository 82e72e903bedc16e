use crate::object::Handle;
use crate::sync::Arc;

/// The object registry a queue is bound to.
///
/// The queue only reads from it, and only while decoding the legacy format, to
/// turn a stored raw handle back into a live reference.
///
/// 队列所绑定的对象注册表。
/// 队列只在解码旧格式时读取它，把原始句柄解析为存活引用。
pub trait ObjectRegistry<T>: Send + Sync + 'static {
    /// Resolve `handle` to a live object, or `None` if it no longer denotes one.
    fn resolve(&self, handle: Handle) -> Option<Arc<T>>;
}
