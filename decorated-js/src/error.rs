/// Errors produced by the heap and the decorated-object machinery.
#[derive(Debug, Clone, thiserror::Error)]
pub enum VmError {
  /// The heap has exceeded its configured memory limit, even after attempting
  /// a GC cycle. Never swallowed internally: a failed allocation leaves no
  /// partially constructed cell reachable.
  #[error("out of memory")]
  OutOfMemory,

  /// A GC handle was used after the underlying allocation was freed (or the
  /// handle is otherwise malformed).
  #[error("invalid handle")]
  InvalidHandle,

  /// The prototype passed to a creation operation is not a live object.
  ///
  /// Defensive precondition; not expected under correct usage.
  #[error("invalid prototype")]
  InvalidPrototype,

  /// An attempted prototype mutation would introduce a cycle in the
  /// prototype chain.
  #[error("prototype cycle")]
  PrototypeCycle,

  /// A prototype chain traversal exceeded a hard upper bound.
  #[error("prototype chain too deep")]
  PrototypeChainTooDeep,

  /// A cell kind id that is not present in the registry.
  #[error("unknown cell kind")]
  UnknownKind,

  /// An internal-slot access was out of the cell's reserved-slot range.
  #[error("slot index out of range")]
  SlotOutOfRange,

  /// A snapshot document is inconsistent with the current kind registry
  /// (unknown kind tag, impossible slot count, dangling cell reference).
  #[error("corrupt snapshot: {0}")]
  CorruptSnapshot(&'static str),

  /// The cell's kind registered no snapshot hooks.
  #[error("cell kind does not support snapshotting")]
  SnapshotUnsupported,
}
