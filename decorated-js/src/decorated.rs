use crate::decoration::Decoration;
use crate::heap::ObjectCell;
use crate::kind::{CellDescriptor, CellKindId, KindRegistryBuilder};
use crate::meta::{object_build_meta, MetadataBuilder};
use crate::{GcObject, Heap, Scope, VmError};

/// Base-object slots a decorated cell's own header overlaps.
pub const DECORATED_OVERLAP_SLOTS: u32 = 1;

/// Anonymous property slots every decorated cell reserves beyond the overlap
/// region.
pub const DECORATED_ANONYMOUS_SLOTS: u32 = 1;

/// Kind tag of the stock decorated-object kind.
pub const DECORATED_KIND_NAME: &str = "DecoratedObject";

/// Registers the stock decorated-object kind and returns its id.
///
/// Hosts that need several native payload flavors with distinct tags or slot
/// layouts can instead register their own descriptors built from the same
/// hooks ([`decorated_build_meta`], [`decoration_external_size`],
/// [`decorated_finalize`]).
pub fn register_decorated_kind(builder: &mut KindRegistryBuilder) -> CellKindId {
  builder.register(decorated_descriptor())
}

/// Descriptor for the stock decorated-object kind.
pub fn decorated_descriptor() -> CellDescriptor {
  CellDescriptor {
    name: DECORATED_KIND_NAME,
    overlap_slots: DECORATED_OVERLAP_SLOTS,
    anonymous_slots: DECORATED_ANONYMOUS_SLOTS,
    finalizer: decorated_finalize,
    external_size: decoration_external_size,
    build_meta: decorated_build_meta,
    // Decorated cells own no indexed storage of their own.
    indexed: crate::indexed::OBJECT_INDEXED,
    snapshot: Some(crate::snapshot::OBJECT_SNAPSHOT),
  }
}

/// Finalizer for decorated kinds: destroys the owned payload.
pub fn decorated_finalize(cell: &mut ObjectCell) {
  drop(cell.take_decoration());
}

/// Size accountant shared by decoration-bearing kinds: the attached payload's
/// reported footprint, or zero when none is attached.
pub fn decoration_external_size(cell: &ObjectCell) -> usize {
  cell.decoration().map(|d| d.external_size()).unwrap_or(0)
}

/// Metadata builder for decorated kinds: declares the kind's overlap region,
/// then delegates the remaining per-instance slots to the base object. The
/// payload is opaque to the scanner and contributes nothing here.
pub fn decorated_build_meta(cell: &ObjectCell, mb: &mut MetadataBuilder) {
  mb.add_overlap_slots(DECORATED_OVERLAP_SLOTS);
  object_build_meta(cell, mb);
}

impl<'a> Scope<'a> {
  /// Creates a cell of a decoration-bearing `kind`, transferring `decoration`
  /// ownership into it.
  ///
  /// Thin wrapper over [`Scope::create_cell`] for the common case of a
  /// payload present from birth.
  pub fn create_decorated(
    &mut self,
    kind: CellKindId,
    prototype: Option<GcObject>,
    decoration: Box<dyn Decoration>,
    additional_slots: u32,
  ) -> Result<GcObject, VmError> {
    self.create_cell(kind, prototype, Some(decoration), additional_slots)
  }
}

impl Heap {
  /// Borrows the cell's attached decoration, if any.
  pub fn decoration(&self, obj: GcObject) -> Result<Option<&dyn Decoration>, VmError> {
    Ok(self.expect_object(obj)?.decoration())
  }

  /// Borrows the cell's decoration downcast to a concrete `T`.
  ///
  /// `Ok(None)` covers both an absent decoration and one of a different
  /// concrete type.
  pub fn decoration_as<T: Decoration>(&self, obj: GcObject) -> Result<Option<&T>, VmError> {
    Ok(
      self
        .expect_object(obj)?
        .decoration()
        .and_then(|d| d.downcast_ref::<T>()),
    )
  }

  /// Mutates the cell's decoration in place and re-syncs the heap's external
  /// byte accounting around the mutation.
  ///
  /// The closure receives `None` when no decoration is attached; it cannot
  /// attach, detach, or replace the payload (use [`Heap::set_decoration`] and
  /// [`Heap::clear_decoration`] for ownership changes).
  pub fn update_decoration<R>(
    &mut self,
    obj: GcObject,
    f: impl FnOnce(Option<&mut (dyn Decoration + 'static)>) -> R,
  ) -> Result<R, VmError> {
    let cell = self.expect_object_mut(obj)?;
    let old = cell.decoration().map(|d| d.external_size()).unwrap_or(0);
    let result = f(cell.decoration_mut());
    let new = cell.decoration().map(|d| d.external_size()).unwrap_or(0);
    self.adjust_external_bytes(old, new);
    Ok(result)
  }

  /// Attaches `decoration` to the cell, taking ownership.
  ///
  /// Any payload already attached is destroyed first; its cleanup runs here,
  /// once, exactly as it would have at finalization. External byte accounting
  /// is adjusted for both payloads. Works on any kind, not just
  /// decoration-bearing ones.
  pub fn set_decoration(
    &mut self,
    obj: GcObject,
    decoration: Box<dyn Decoration>,
  ) -> Result<(), VmError> {
    let new = decoration.external_size();
    let cell = self.expect_object_mut(obj)?;

    let old = cell.decoration().map(|d| d.external_size()).unwrap_or(0);
    drop(cell.take_decoration());
    cell.decoration = Some(decoration);

    self.adjust_external_bytes(old, new);
    Ok(())
  }

  /// Detaches the cell's decoration, returning ownership to the caller.
  ///
  /// The cell stays alive and undecorated; the caller is now responsible for
  /// the payload's destruction. External byte accounting is released.
  pub fn clear_decoration(
    &mut self,
    obj: GcObject,
  ) -> Result<Option<Box<dyn Decoration>>, VmError> {
    let cell = self.expect_object_mut(obj)?;
    let taken = cell.take_decoration();
    let old = taken.as_ref().map(|d| d.external_size()).unwrap_or(0);
    self.adjust_external_bytes(old, 0);
    Ok(taken)
  }
}
