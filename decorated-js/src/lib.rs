//! A GC-managed object heap with decorated cells: objects that own exactly one
//! externally-allocated native payload (a [`Decoration`]) alongside ordinary
//! traced property slots.
//!
//! The heap is a non-moving mark/sweep collector over generation-checked
//! handles. Cell behavior is table-driven: every cell carries a
//! [`CellKindId`] into a frozen [`KindRegistry`] of [`CellDescriptor`]s, each
//! bundling the kind's slot layout constants, finalizer, external-size
//! accountant, GC metadata builder, indexed-element protocol, and optional
//! snapshot hooks.
//!
//! ```
//! use decorated_js::{
//!   register_decorated_kind, Decoration, HandleFree, Heap, HeapLimits, KindRegistry, Value,
//! };
//!
//! struct Connection {
//!   buffer: Vec<u8>,
//! }
//! // Safety: holds no GC handles.
//! unsafe impl HandleFree for Connection {}
//! impl Decoration for Connection {
//!   fn external_size(&self) -> usize {
//!     self.buffer.capacity()
//!   }
//! }
//!
//! # fn main() -> Result<(), decorated_js::VmError> {
//! let mut builder = KindRegistry::builder();
//! let connection_kind = register_decorated_kind(&mut builder);
//! let mut heap = Heap::new(HeapLimits::new(1 << 20, 1 << 19), builder.build());
//!
//! let mut scope = heap.scope();
//! let payload = Box::new(Connection { buffer: vec![0; 4096] });
//! let obj = scope.create_decorated(connection_kind, None, payload, 2)?;
//! scope.push_root(Value::Object(obj));
//!
//! scope.heap_mut().set_additional_slot(obj, 0, Value::Number(42.0))?;
//! assert_eq!(scope.heap().cell_external_size(obj)?, 4096);
//! # Ok(())
//! # }
//! ```

mod decorated;
mod decoration;
mod error;
mod handle;
mod heap;
mod hidden_class;
mod indexed;
mod kind;
mod meta;
mod property;
mod snapshot;
mod value;

pub use decorated::decorated_build_meta;
pub use decorated::decorated_descriptor;
pub use decorated::decorated_finalize;
pub use decorated::decoration_external_size;
pub use decorated::register_decorated_kind;
pub use decorated::DECORATED_ANONYMOUS_SLOTS;
pub use decorated::DECORATED_KIND_NAME;
pub use decorated::DECORATED_OVERLAP_SLOTS;
pub use decoration::Decoration;
pub use decoration::HandleFree;
pub use error::VmError;
pub use handle::GcObject;
pub use handle::GcString;
pub use handle::HeapId;
pub use handle::RootId;
pub use heap::object_finalize;
pub use heap::Heap;
pub use heap::HeapLimits;
pub use heap::ObjectCell;
pub use heap::PersistentRoot;
pub use heap::Scope;
pub use indexed::IndexedCheck;
pub use indexed::IndexedFlags;
pub use indexed::IndexedProtocol;
pub use indexed::OBJECT_INDEXED;
pub use kind::BuildMetaFn;
pub use kind::CellDescriptor;
pub use kind::CellKindId;
pub use kind::ExternalSizeFn;
pub use kind::FinalizeFn;
pub use kind::KindRegistry;
pub use kind::KindRegistryBuilder;
pub use kind::SnapshotHooks;
pub use meta::object_build_meta;
pub use meta::MetadataBuilder;
pub use property::PROTOTYPE_CHAIN_LIMIT;
pub use snapshot::object_deserialize_cell;
pub use snapshot::object_serialize_cell;
pub use snapshot::CellRecord;
pub use snapshot::HeapSnapshot;
pub use snapshot::ValueRecord;
pub use snapshot::OBJECT_SNAPSHOT;
pub use value::Value;
