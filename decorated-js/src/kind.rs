use core::fmt;
use std::sync::Arc;

use ahash::AHashMap;

use crate::heap::ObjectCell;
use crate::indexed::IndexedProtocol;
use crate::meta::MetadataBuilder;
use crate::snapshot::CellRecord;
use crate::{GcObject, Heap, Scope, VmError};

/// Identifies one registered cell kind.
///
/// Kind ids are minted by [`KindRegistryBuilder::register`] and index into the
/// registry that minted them.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(transparent)]
pub struct CellKindId(pub(crate) u32);

impl CellKindId {
  /// The underlying registry index.
  #[inline]
  pub fn index(self) -> u32 {
    self.0
  }
}

/// Runs a dying cell's destruction logic.
///
/// Invoked by the collector exactly once per cell, during sweep, when the cell
/// is unreachable (or when the heap itself is dropped). Must not allocate and
/// must not fail; payload-level cleanup errors must be absorbed here, never
/// propagated into the collector. The only cell state guaranteed valid is the
/// cell's own storage.
pub type FinalizeFn = fn(&mut ObjectCell);

/// Reports a live cell's external (non-managed-heap) footprint in bytes.
///
/// Called by the collector any number of times while the cell is alive, to
/// feed heap-growth heuristics. Must be side-effect-free and allocation-free.
pub type ExternalSizeFn = fn(&ObjectCell) -> usize;

/// Declares which of a cell's slots hold managed references.
///
/// Invoked by the collector's scanner at any collection pause. Must declare
/// the kind's static overlap slots and then delegate to
/// [`object_build_meta`](crate::meta::object_build_meta) for the remaining
/// per-instance slots; must not inspect the decoration. Allocation-free.
pub type BuildMetaFn = fn(&ObjectCell, &mut MetadataBuilder);

/// Optional snapshot capability for a kind.
///
/// A kind registered without hooks cannot be written to or restored from a
/// heap snapshot ([`VmError::SnapshotUnsupported`]). The hooks cover only the
/// cell's scripting-visible state; decorations are excluded by contract and
/// must be re-derived by kind-specific logic after a restore.
#[derive(Clone, Copy)]
pub struct SnapshotHooks {
  /// Fills the kind-owned fields of a [`CellRecord`] for a live cell.
  pub serialize: fn(&Heap, GcObject, &mut CellRecord) -> Result<(), VmError>,
  /// Allocates a fresh cell of this kind from a record, with an absent
  /// decoration. Prototype and slot values are patched by the reader
  /// afterwards.
  pub deserialize: fn(&mut Scope<'_>, CellKindId, &CellRecord) -> Result<GcObject, VmError>,
}

/// Per-kind dispatch table: layout counts, finalizer, size accounting,
/// metadata building, and the indexed-element protocol.
///
/// One descriptor exists per kind, created at registration and immutable for
/// the registry's lifetime; every cell of the kind shares it.
pub struct CellDescriptor {
  /// Kind tag, also used by the snapshot codec. Unique within a registry.
  pub name: &'static str,
  /// Slots of the base object layer overlapped by this kind's own fields.
  pub overlap_slots: u32,
  /// Fixed count of anonymous property slots every instance reserves.
  pub anonymous_slots: u32,
  pub finalizer: FinalizeFn,
  pub external_size: ExternalSizeFn,
  pub build_meta: BuildMetaFn,
  pub indexed: IndexedProtocol,
  pub snapshot: Option<SnapshotHooks>,
}

impl CellDescriptor {
  /// Total reserved (anonymous) slots for an instance created with
  /// `additional_slots` extra slots.
  ///
  /// This formula is shared by the creation protocol, the metadata builder,
  /// and the snapshot reader; it must never be duplicated per call site.
  #[inline]
  pub fn reserved_slots(&self, additional_slots: u32) -> u32 {
    self
      .overlap_slots
      .saturating_add(self.anonymous_slots)
      .saturating_add(additional_slots)
  }

  /// Fixed managed-heap size of a fresh cell of this kind, in bytes.
  #[inline]
  pub fn cell_size(&self, additional_slots: u32) -> usize {
    ObjectCell::heap_size_bytes_for_slot_count(self.reserved_slots(additional_slots) as usize)
  }
}

impl fmt::Debug for CellDescriptor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CellDescriptor")
      .field("name", &self.name)
      .field("overlap_slots", &self.overlap_slots)
      .field("anonymous_slots", &self.anonymous_slots)
      .field("snapshot", &self.snapshot.is_some())
      .finish()
  }
}

/// The process-lifetime table of registered cell kinds.
///
/// Built once via [`KindRegistryBuilder`], then frozen: descriptors are
/// shared, read-only state for every heap created against the registry.
pub struct KindRegistry {
  kinds: Box<[CellDescriptor]>,
  by_name: AHashMap<&'static str, CellKindId>,
}

impl KindRegistry {
  /// The base scripting-object kind, pre-registered in every registry.
  pub const OBJECT_KIND: CellKindId = CellKindId(0);

  /// Starts building a registry. The base object kind is pre-registered.
  pub fn builder() -> KindRegistryBuilder {
    let mut builder = KindRegistryBuilder {
      kinds: Vec::new(),
      by_name: AHashMap::new(),
    };
    let id = builder.register(crate::heap::object_descriptor());
    debug_assert_eq!(id, Self::OBJECT_KIND);
    builder
  }

  /// Looks up a descriptor, rejecting ids from a different registry.
  pub fn get(&self, kind: CellKindId) -> Result<&CellDescriptor, VmError> {
    self.kinds.get(kind.0 as usize).ok_or(VmError::UnknownKind)
  }

  /// Resolves a kind by its tag name.
  pub fn lookup(&self, name: &str) -> Option<CellKindId> {
    self.by_name.get(name).copied()
  }

  /// Number of registered kinds.
  pub fn len(&self) -> usize {
    self.kinds.len()
  }

  pub fn is_empty(&self) -> bool {
    self.kinds.is_empty()
  }

  /// Infallible descriptor access for ids minted by this registry.
  ///
  /// Cells only ever carry ids their heap's registry minted, so this holds by
  /// construction on every collector path.
  #[inline]
  pub(crate) fn descriptor(&self, kind: CellKindId) -> &CellDescriptor {
    &self.kinds[kind.0 as usize]
  }
}

/// Builder for a [`KindRegistry`].
///
/// Kind registration happens once, at process or module initialization;
/// after [`build`](KindRegistryBuilder::build) the registry is immutable.
pub struct KindRegistryBuilder {
  kinds: Vec<CellDescriptor>,
  by_name: AHashMap<&'static str, CellKindId>,
}

impl KindRegistryBuilder {
  /// Registers a kind and mints its id.
  ///
  /// Panics if `descriptor.name` is already taken: duplicate registration is
  /// a startup-time programming error, not a runtime condition.
  pub fn register(&mut self, descriptor: CellDescriptor) -> CellKindId {
    assert!(
      !self.by_name.contains_key(descriptor.name),
      "cell kind {:?} registered twice",
      descriptor.name
    );
    let id = CellKindId(self.kinds.len() as u32);
    self.by_name.insert(descriptor.name, id);
    self.kinds.push(descriptor);
    id
  }

  /// Freezes the registry.
  pub fn build(self) -> Arc<KindRegistry> {
    tracing::debug!(kinds = self.kinds.len(), "kind registry frozen");
    Arc::new(KindRegistry {
      kinds: self.kinds.into_boxed_slice(),
      by_name: self.by_name,
    })
  }
}
