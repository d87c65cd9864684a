use core::mem;
use std::sync::Arc;

use crate::decoration::Decoration;
use crate::hidden_class::{ClassTable, HiddenClassId};
use crate::kind::{CellDescriptor, CellKindId, KindRegistry};
use crate::meta::MetadataBuilder;
use crate::{GcObject, GcString, HeapId, RootId, Value, VmError};

/// Heap configuration and memory limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeapLimits {
  /// Hard memory limit for live managed allocations, in bytes.
  pub max_bytes: usize,
  /// When an allocation would push `used_bytes + external_bytes` past this
  /// threshold, the heap triggers a GC cycle before attempting the
  /// allocation. External bytes count toward the trigger (they represent
  /// memory a collection could release via finalizers) but not toward the
  /// hard limit.
  pub gc_threshold: usize,
}

impl HeapLimits {
  /// Creates a new set of heap limits.
  pub fn new(max_bytes: usize, gc_threshold: usize) -> Self {
    Self {
      max_bytes,
      gc_threshold,
    }
  }
}

/// One managed object cell: kind header, hidden class, prototype link,
/// property-slot region, and at most one owned [`Decoration`].
///
/// The slot region is `reserved + named` values: the leading reserved slots
/// (kind overlap + anonymous + creation-requested additional slots) are
/// addressed by index, the rest by name through the hidden class. The
/// decoration, when present, is exclusively owned by the cell and excluded
/// from tracing; it is dropped exactly once, by the kind's finalizer.
pub struct ObjectCell {
  kind: CellKindId,
  pub(crate) class: HiddenClassId,
  pub(crate) prototype: Option<GcObject>,
  pub(crate) slots: Box<[Value]>,
  pub(crate) decoration: Option<Box<dyn Decoration>>,
}

impl ObjectCell {
  /// The cell's kind.
  #[inline]
  pub fn kind(&self) -> CellKindId {
    self.kind
  }

  /// The cell's prototype link.
  #[inline]
  pub fn prototype(&self) -> Option<GcObject> {
    self.prototype
  }

  /// The cell's property-slot region.
  #[inline]
  pub fn slots(&self) -> &[Value] {
    &self.slots
  }

  /// Borrows the attached decoration, if any.
  #[inline]
  pub fn decoration(&self) -> Option<&dyn Decoration> {
    self.decoration.as_deref()
  }

  /// Borrows the attached decoration mutably, if any.
  #[inline]
  pub fn decoration_mut(&mut self) -> Option<&mut (dyn Decoration + 'static)> {
    self.decoration.as_deref_mut()
  }

  /// Removes and returns the decoration. Finalizers use this to destroy the
  /// payload before the cell's storage is reclaimed.
  #[inline]
  pub fn take_decoration(&mut self) -> Option<Box<dyn Decoration>> {
    self.decoration.take()
  }

  /// Managed bytes for a cell with `count` slots.
  ///
  /// Shared by the creation protocol, property growth, and the kind
  /// descriptors' `cell_size`.
  pub(crate) fn heap_size_bytes_for_slot_count(count: usize) -> usize {
    count
      .checked_mul(mem::size_of::<Value>())
      .and_then(|b| b.checked_add(mem::size_of::<Self>()))
      .unwrap_or(usize::MAX)
  }

  pub(crate) fn heap_size_bytes(&self) -> usize {
    Self::heap_size_bytes_for_slot_count(self.slots.len())
  }
}

/// Base object finalizer: destroys the owned decoration, if any.
pub fn object_finalize(cell: &mut ObjectCell) {
  drop(cell.take_decoration());
}

/// Descriptor for the base scripting-object kind.
pub(crate) fn object_descriptor() -> CellDescriptor {
  CellDescriptor {
    name: "Object",
    overlap_slots: 0,
    anonymous_slots: 0,
    finalizer: object_finalize,
    external_size: crate::decorated::decoration_external_size,
    build_meta: crate::meta::object_build_meta,
    indexed: crate::indexed::OBJECT_INDEXED,
    snapshot: Some(crate::snapshot::OBJECT_SNAPSHOT),
  }
}

struct Slot {
  generation: u32,
  value: Option<HeapCell>,
  bytes: usize,
}

impl Slot {
  fn new() -> Self {
    Self {
      generation: 0,
      value: None,
      bytes: 0,
    }
  }
}

enum HeapCell {
  String(Box<str>),
  Object(ObjectCell),
}

/// A non-moving mark/sweep GC heap of object and string cells.
///
/// Cells are stored in a `Vec` of slots. GC handles store the slot `index`
/// and a per-slot `generation`, which makes handles stable across `Vec`
/// reallocations and allows detection of stale handles when slots are reused.
///
/// The heap is single-threaded: no two operations run concurrently, but any
/// allocation may trigger a synchronous collection pause. Handles held across
/// an allocating call must be rooted (via [`Scope`] or [`Heap::add_root`]);
/// finalizer and size-accounting hooks run only inside a pause and never
/// re-enter allocation.
pub struct Heap {
  limits: HeapLimits,

  /// Bytes used by live managed allocations.
  used_bytes: usize,
  /// Advisory external (decoration-owned) bytes attributed to live cells.
  external_bytes: usize,
  gc_runs: u64,

  // GC-managed allocations.
  slots: Vec<Slot>,
  marks: Vec<u8>,
  free_list: Vec<u32>,

  // Root sets.
  pub(crate) root_stack: Vec<Value>,
  persistent_roots: Vec<Option<Value>>,
  persistent_roots_free: Vec<u32>,

  registry: Arc<KindRegistry>,
  pub(crate) classes: ClassTable,
}

/// RAII wrapper for a persistent GC root created by [`Heap::add_root`].
///
/// While this guard is alive it holds a mutable borrow of the [`Heap`]. For
/// long-lived roots stored in host state, prefer storing the [`RootId`] from
/// [`Heap::add_root`] directly.
pub struct PersistentRoot<'a> {
  heap: &'a mut Heap,
  id: RootId,
}

impl<'a> PersistentRoot<'a> {
  /// Adds `value` to the heap's persistent root set and returns a guard that
  /// removes it on drop.
  pub fn new(heap: &'a mut Heap, value: Value) -> Self {
    let id = heap.add_root(value);
    Self { heap, id }
  }

  /// The underlying [`RootId`].
  #[inline]
  pub fn id(&self) -> RootId {
    self.id
  }

  /// Returns the current rooted value.
  #[inline]
  pub fn get(&self) -> Option<Value> {
    self.heap.get_root(self.id)
  }

  /// Updates the rooted value.
  #[inline]
  pub fn set(&mut self, value: Value) {
    self.heap.set_root(self.id, value);
  }

  /// Borrows the underlying heap immutably.
  #[inline]
  pub fn heap(&self) -> &Heap {
    &*self.heap
  }

  /// Borrows the underlying heap mutably.
  #[inline]
  pub fn heap_mut(&mut self) -> &mut Heap {
    &mut *self.heap
  }
}

impl Drop for PersistentRoot<'_> {
  fn drop(&mut self) {
    self.heap.remove_root(self.id);
  }
}

impl Heap {
  /// Creates a new heap against a frozen kind registry.
  pub fn new(limits: HeapLimits, registry: Arc<KindRegistry>) -> Self {
    debug_assert!(
      limits.gc_threshold <= limits.max_bytes,
      "gc_threshold should be <= max_bytes"
    );

    Self {
      limits,
      used_bytes: 0,
      external_bytes: 0,
      gc_runs: 0,
      slots: Vec::new(),
      marks: Vec::new(),
      free_list: Vec::new(),
      root_stack: Vec::new(),
      persistent_roots: Vec::new(),
      persistent_roots_free: Vec::new(),
      registry,
      classes: ClassTable::new(),
    }
  }

  /// Enters a stack-rooting scope.
  ///
  /// Stack roots pushed via [`Scope::push_root`] are removed when the
  /// returned `Scope` is dropped, on every exit path.
  pub fn scope(&mut self) -> Scope<'_> {
    let root_stack_len_at_entry = self.root_stack.len();
    Scope {
      heap: self,
      root_stack_len_at_entry,
    }
  }

  /// The kind registry this heap allocates against.
  pub fn registry(&self) -> &KindRegistry {
    &self.registry
  }

  /// Bytes currently used by live managed allocations.
  pub fn used_bytes(&self) -> usize {
    self.used_bytes
  }

  /// Advisory external bytes currently attributed to live decorations.
  pub fn external_bytes(&self) -> usize {
    self.external_bytes
  }

  /// Total number of GC cycles that have run.
  pub fn gc_runs(&self) -> u64 {
    self.gc_runs
  }

  #[cfg(debug_assertions)]
  fn debug_recompute_used_bytes(&self) -> usize {
    self
      .slots
      .iter()
      .filter(|slot| slot.value.is_some())
      .fold(0usize, |acc, slot| acc.saturating_add(slot.bytes))
  }

  #[cfg(debug_assertions)]
  fn debug_assert_used_bytes_is_correct(&self) {
    let recomputed = self.debug_recompute_used_bytes();
    debug_assert_eq!(
      self.used_bytes, recomputed,
      "Heap::used_bytes mismatch: used_bytes={}, recomputed={}",
      self.used_bytes, recomputed
    );
  }

  /// Explicitly runs a GC cycle.
  ///
  /// Sweeping runs each dead object cell's kind finalizer exactly once, with
  /// only that cell's own storage guaranteed valid, before the slot is
  /// reclaimed.
  pub fn collect_garbage(&mut self) {
    self.gc_runs += 1;
    let registry = Arc::clone(&self.registry);

    // Mark.
    {
      debug_assert_eq!(self.slots.len(), self.marks.len());

      let slots = &self.slots;
      let marks = &mut self.marks[..];

      let mut tracer = Tracer::new(slots, marks);
      for value in &self.root_stack {
        tracer.trace_value(*value);
      }
      for value in self.persistent_roots.iter().flatten() {
        tracer.trace_value(*value);
      }

      while let Some(id) = tracer.pop_work() {
        let Some(idx) = tracer.validate(id) else {
          continue;
        };
        if tracer.marks[idx] != 0 {
          continue;
        }
        tracer.marks[idx] = 1;

        let Some(cell) = tracer.slots[idx].value.as_ref() else {
          debug_assert!(false, "validated heap id points to a free slot: {id:?}");
          continue;
        };
        match cell {
          HeapCell::String(_) => {}
          HeapCell::Object(cell) => trace_object_cell(cell, &registry, &mut tracer),
        }
      }
    }

    // Sweep.
    let mut freed = 0usize;
    for (idx, slot) in self.slots.iter_mut().enumerate() {
      let marked = self.marks[idx] != 0;
      // Reset mark bits for next cycle.
      self.marks[idx] = 0;

      if slot.value.is_none() {
        debug_assert!(!marked);
        continue;
      }

      if marked {
        continue;
      }

      // Unreachable. Finalize object cells, then free the slot.
      if let Some(HeapCell::Object(cell)) = slot.value.as_mut() {
        let desc = registry.descriptor(cell.kind());
        let external = (desc.external_size)(cell);
        self.external_bytes = self.external_bytes.saturating_sub(external);
        (desc.finalizer)(cell);
      }
      self.used_bytes = self.used_bytes.saturating_sub(slot.bytes);
      slot.value = None;
      slot.bytes = 0;
      slot.generation = slot.generation.wrapping_add(1);
      self.free_list.push(idx as u32);
      freed += 1;
    }

    tracing::debug!(
      gc_runs = self.gc_runs,
      freed,
      used_bytes = self.used_bytes,
      external_bytes = self.external_bytes,
      "gc cycle"
    );

    #[cfg(debug_assertions)]
    self.debug_assert_used_bytes_is_correct();
  }

  /// Adds a persistent root and returns an RAII guard that removes it on
  /// drop.
  #[inline]
  pub fn persistent_root(&mut self, value: Value) -> PersistentRoot<'_> {
    PersistentRoot::new(self, value)
  }

  /// Adds a persistent root, keeping `value` live until the returned
  /// [`RootId`] is removed.
  pub fn add_root(&mut self, value: Value) -> RootId {
    // Root sets should not contain stale handles; detect issues early in
    // debug builds.
    debug_assert!(self.debug_value_is_valid_or_primitive(value));

    let idx = match self.persistent_roots_free.pop() {
      Some(idx) => idx as usize,
      None => {
        self.persistent_roots.push(None);
        self.persistent_roots.len() - 1
      }
    };
    debug_assert!(self.persistent_roots[idx].is_none());
    self.persistent_roots[idx] = Some(value);
    RootId(idx as u32)
  }

  /// Returns the current value of a persistent root.
  pub fn get_root(&self, id: RootId) -> Option<Value> {
    self
      .persistent_roots
      .get(id.0 as usize)
      .and_then(|slot| *slot)
  }

  /// Updates a persistent root's value.
  pub fn set_root(&mut self, id: RootId, value: Value) {
    debug_assert!(self.debug_value_is_valid_or_primitive(value));

    let idx = id.0 as usize;
    debug_assert!(idx < self.persistent_roots.len(), "invalid RootId");
    if idx >= self.persistent_roots.len() {
      return;
    }
    debug_assert!(
      self.persistent_roots[idx].is_some(),
      "RootId already removed"
    );
    if self.persistent_roots[idx].is_some() {
      self.persistent_roots[idx] = Some(value);
    }
  }

  /// Removes a persistent root previously created by [`Heap::add_root`].
  pub fn remove_root(&mut self, id: RootId) {
    let idx = id.0 as usize;
    debug_assert!(idx < self.persistent_roots.len(), "invalid RootId");
    if idx >= self.persistent_roots.len() {
      return;
    }
    debug_assert!(
      self.persistent_roots[idx].is_some(),
      "RootId already removed"
    );
    if self.persistent_roots[idx].take().is_some() {
      self.persistent_roots_free.push(id.0);
    }
  }

  /// Returns `true` if `obj` currently points to a live object cell.
  pub fn is_valid_object(&self, obj: GcObject) -> bool {
    matches!(self.get_heap_cell(obj.0), Ok(HeapCell::Object(_)))
  }

  /// Returns `true` if `s` currently points to a live string allocation.
  pub fn is_valid_string(&self, s: GcString) -> bool {
    matches!(self.get_heap_cell(s.0), Ok(HeapCell::String(_)))
  }

  /// Gets the string contents for `s`.
  pub fn get_string(&self, s: GcString) -> Result<&str, VmError> {
    match self.get_heap_cell(s.0)? {
      HeapCell::String(s) => Ok(s),
      _ => Err(VmError::InvalidHandle),
    }
  }

  /// The cell's property-slot region (reserved + named slots).
  pub fn object_slots(&self, obj: GcObject) -> Result<&[Value], VmError> {
    Ok(self.expect_object(obj)?.slots())
  }

  /// Count of reserved (anonymous) slots the cell was created with.
  pub fn reserved_slots(&self, obj: GcObject) -> Result<u32, VmError> {
    let class = self.expect_object(obj)?.class;
    Ok(self.classes.get(class).reserved_slots)
  }

  /// Runs the kind's metadata builder for `obj` and returns the declared
  /// managed-reference slot count.
  ///
  /// This is exactly what the collector's scanner sees; for a freshly created
  /// cell it equals `overlap + anonymous + additional_slots`.
  pub fn declared_reference_slots(&self, obj: GcObject) -> Result<u32, VmError> {
    let cell = self.expect_object(obj)?;
    let desc = self.registry.descriptor(cell.kind());
    let mut mb = MetadataBuilder::new();
    (desc.build_meta)(cell, &mut mb);
    Ok(mb.declared_slots())
  }

  /// Dispatches the kind's size accountant for `obj`: the cell's current
  /// external (non-managed-heap) footprint in bytes.
  pub fn cell_external_size(&self, obj: GcObject) -> Result<usize, VmError> {
    let cell = self.expect_object(obj)?;
    let desc = self.registry.descriptor(cell.kind());
    Ok((desc.external_size)(cell))
  }

  pub(crate) fn expect_object(&self, obj: GcObject) -> Result<&ObjectCell, VmError> {
    match self.get_heap_cell(obj.0)? {
      HeapCell::Object(cell) => Ok(cell),
      _ => Err(VmError::InvalidHandle),
    }
  }

  pub(crate) fn expect_object_mut(&mut self, obj: GcObject) -> Result<&mut ObjectCell, VmError> {
    match self.get_heap_cell_mut(obj.0)? {
      HeapCell::Object(cell) => Ok(cell),
      _ => Err(VmError::InvalidHandle),
    }
  }

  pub(crate) fn descriptor_of(&self, obj: GcObject) -> Result<&CellDescriptor, VmError> {
    let kind = self.expect_object(obj)?.kind();
    Ok(self.registry.descriptor(kind))
  }

  /// Writes a slot without the reserved-range restriction. Snapshot reader
  /// only; callers must have validated the slot layout.
  pub(crate) fn write_slot_raw(
    &mut self,
    obj: GcObject,
    slot: usize,
    value: Value,
  ) -> Result<(), VmError> {
    debug_assert!(self.debug_value_is_valid_or_primitive(value));
    let cell = self.expect_object_mut(obj)?;
    let target = cell.slots.get_mut(slot).ok_or(VmError::SlotOutOfRange)?;
    *target = value;
    Ok(())
  }

  fn get_heap_cell(&self, id: HeapId) -> Result<&HeapCell, VmError> {
    let idx = self.validate(id).ok_or(VmError::InvalidHandle)?;
    self.slots[idx].value.as_ref().ok_or(VmError::InvalidHandle)
  }

  fn get_heap_cell_mut(&mut self, id: HeapId) -> Result<&mut HeapCell, VmError> {
    let idx = self.validate(id).ok_or(VmError::InvalidHandle)?;
    self.slots[idx].value.as_mut().ok_or(VmError::InvalidHandle)
  }

  pub(crate) fn validate(&self, id: HeapId) -> Option<usize> {
    let idx = id.index() as usize;
    let slot = self.slots.get(idx)?;
    if slot.generation != id.generation() {
      return None;
    }
    if slot.value.is_none() {
      return None;
    }
    Some(idx)
  }

  pub(crate) fn ensure_can_allocate(&mut self, new_bytes: usize) -> Result<(), VmError> {
    let after = self
      .used_bytes
      .saturating_add(self.external_bytes)
      .saturating_add(new_bytes);
    if after > self.limits.gc_threshold {
      self.collect_garbage();
    }

    let after = self.used_bytes.saturating_add(new_bytes);
    if after > self.limits.max_bytes {
      return Err(VmError::OutOfMemory);
    }
    Ok(())
  }

  pub(crate) fn update_slot_bytes(&mut self, idx: usize, new_bytes: usize) {
    let slot = &mut self.slots[idx];
    let old_bytes = slot.bytes;

    if new_bytes >= old_bytes {
      self.used_bytes = self.used_bytes.saturating_add(new_bytes - old_bytes);
    } else {
      self.used_bytes = self.used_bytes.saturating_sub(old_bytes - new_bytes);
    }

    slot.bytes = new_bytes;
  }

  pub(crate) fn adjust_external_bytes(&mut self, old: usize, new: usize) {
    if new >= old {
      self.external_bytes = self.external_bytes.saturating_add(new - old);
    } else {
      self.external_bytes = self.external_bytes.saturating_sub(old - new);
    }
  }

  fn alloc_unchecked(&mut self, cell: HeapCell, new_bytes: usize) -> HeapId {
    let idx = match self.free_list.pop() {
      Some(idx) => idx as usize,
      None => {
        let idx = self.slots.len();
        self.slots.push(Slot::new());
        self.marks.push(0);
        idx
      }
    };

    let slot = &mut self.slots[idx];
    debug_assert!(slot.value.is_none(), "free list returned an occupied slot");

    slot.value = Some(cell);
    slot.bytes = new_bytes;
    self.used_bytes = self.used_bytes.saturating_add(new_bytes);

    let id = HeapId::from_parts(idx as u32, slot.generation);

    #[cfg(debug_assertions)]
    self.debug_assert_used_bytes_is_correct();

    id
  }

  pub(crate) fn debug_value_is_valid_or_primitive(&self, value: Value) -> bool {
    match value {
      Value::Undefined | Value::Null | Value::Bool(_) | Value::Number(_) => true,
      Value::String(s) => self.is_valid_string(s),
      Value::Object(o) => self.is_valid_object(o),
    }
  }
}

impl Drop for Heap {
  fn drop(&mut self) {
    // The heap dying is the last collection: every live object cell is
    // finalized exactly once before its storage goes away.
    let registry = Arc::clone(&self.registry);
    for slot in self.slots.iter_mut() {
      if let Some(HeapCell::Object(cell)) = slot.value.as_mut() {
        (registry.descriptor(cell.kind()).finalizer)(cell);
      }
    }
  }
}

/// A stack-rooting scope.
///
/// All stack roots pushed via [`Scope::push_root`] are removed when the scope
/// is dropped, on both normal and error exits.
pub struct Scope<'a> {
  heap: &'a mut Heap,
  root_stack_len_at_entry: usize,
}

impl Drop for Scope<'_> {
  fn drop(&mut self) {
    self.heap.root_stack.truncate(self.root_stack_len_at_entry);
  }
}

impl<'a> Scope<'a> {
  /// Pushes a stack root.
  ///
  /// The returned `Value` is the same as the input, allowing call sites to
  /// write `let v = scope.push_root(v);` if desired.
  pub fn push_root(&mut self, value: Value) -> Value {
    debug_assert!(self.heap.debug_value_is_valid_or_primitive(value));
    self.heap.root_stack.push(value);
    value
  }

  /// Creates a nested child scope that borrows the same heap.
  pub fn reborrow(&mut self) -> Scope<'_> {
    let root_stack_len_at_entry = self.heap.root_stack.len();
    Scope {
      heap: &mut *self.heap,
      root_stack_len_at_entry,
    }
  }

  /// Borrows the underlying heap immutably.
  pub fn heap(&self) -> &Heap {
    &*self.heap
  }

  /// Borrows the underlying heap mutably.
  pub fn heap_mut(&mut self) -> &mut Heap {
    &mut *self.heap
  }

  /// Allocates a string on the heap.
  pub fn alloc_string(&mut self, s: &str) -> Result<GcString, VmError> {
    let new_bytes = s.len();
    self.heap.ensure_can_allocate(new_bytes)?;

    // Allocate the backing buffer fallibly so hostile input cannot abort the
    // host process on allocator OOM.
    let mut buf = String::new();
    buf.try_reserve_exact(s.len()).map_err(|_| VmError::OutOfMemory)?;
    buf.push_str(s);

    let cell = HeapCell::String(buf.into_boxed_str());
    Ok(GcString(self.heap.alloc_unchecked(cell, new_bytes)))
  }

  /// Allocates an ordinary (base-kind) object cell.
  pub fn alloc_object(&mut self, prototype: Option<GcObject>) -> Result<GcObject, VmError> {
    self.create_cell(KindRegistry::OBJECT_KIND, prototype, None, 0)
  }

  /// The creation protocol: allocates one cell of `kind`.
  ///
  /// Derives (or looks up) the hidden class for the prototype sized for
  /// `overlap + anonymous + additional_slots`, checks heap limits (which may
  /// trigger a collection; the prototype is rooted across it), transfers
  /// `decoration` ownership into the new cell, and returns a handle that
  /// stays valid across any later collection while the cell is reachable.
  ///
  /// On error no partially constructed cell is reachable from any root; a
  /// passed decoration is dropped (its cleanup runs once, as always).
  pub fn create_cell(
    &mut self,
    kind: CellKindId,
    prototype: Option<GcObject>,
    decoration: Option<Box<dyn Decoration>>,
    additional_slots: u32,
  ) -> Result<GcObject, VmError> {
    let registry = Arc::clone(&self.heap.registry);
    let desc = registry.get(kind)?;
    let reserved = desc.reserved_slots(additional_slots);

    if let Some(proto) = prototype {
      if !self.heap.is_valid_object(proto) {
        return Err(VmError::InvalidPrototype);
      }
    }

    // Root the prototype in case `ensure_can_allocate` triggers a GC.
    let mut scope = self.reborrow();
    if let Some(proto) = prototype {
      scope.push_root(Value::Object(proto));
    }

    let new_bytes = ObjectCell::heap_size_bytes_for_slot_count(reserved as usize);
    scope.heap.ensure_can_allocate(new_bytes)?;

    let mut buf: Vec<Value> = Vec::new();
    buf
      .try_reserve_exact(reserved as usize)
      .map_err(|_| VmError::OutOfMemory)?;
    buf.resize(reserved as usize, Value::Undefined);

    let class = scope.heap.classes.class_for(prototype, reserved);
    let external = decoration.as_ref().map(|d| d.external_size()).unwrap_or(0);

    let cell = ObjectCell {
      kind,
      class,
      prototype,
      slots: buf.into_boxed_slice(),
      decoration,
    };
    let obj = GcObject(scope.heap.alloc_unchecked(HeapCell::Object(cell), new_bytes));
    scope.heap.adjust_external_bytes(0, external);
    Ok(obj)
  }
}

fn trace_object_cell(cell: &ObjectCell, registry: &KindRegistry, tracer: &mut Tracer<'_>) {
  if let Some(proto) = cell.prototype() {
    tracer.trace_value(Value::Object(proto));
  }

  // The kind's metadata builder declares which slots hold managed
  // references; the decoration is opaque to the scanner.
  let desc = registry.descriptor(cell.kind());
  let mut mb = MetadataBuilder::new();
  (desc.build_meta)(cell, &mut mb);

  let declared = (mb.declared_slots() as usize).min(cell.slots().len());
  debug_assert_eq!(
    declared,
    cell.slots().len(),
    "metadata builder under-declares instance slots"
  );
  for value in &cell.slots()[..declared] {
    tracer.trace_value(*value);
  }
}

pub(crate) struct Tracer<'a> {
  slots: &'a [Slot],
  marks: &'a mut [u8],
  worklist: Vec<HeapId>,
}

impl<'a> Tracer<'a> {
  fn new(slots: &'a [Slot], marks: &'a mut [u8]) -> Self {
    Self {
      slots,
      marks,
      worklist: Vec::new(),
    }
  }

  fn pop_work(&mut self) -> Option<HeapId> {
    self.worklist.pop()
  }

  pub(crate) fn trace_value(&mut self, value: Value) {
    match value {
      Value::Undefined | Value::Null | Value::Bool(_) | Value::Number(_) => {}
      Value::String(s) => self.trace_heap_id(s.0),
      Value::Object(o) => self.trace_heap_id(o.0),
    }
  }

  fn trace_heap_id(&mut self, id: HeapId) {
    let Some(idx) = self.validate(id) else {
      return;
    };
    if self.marks[idx] != 0 {
      return;
    }
    self.worklist.push(id);
  }

  fn validate(&self, id: HeapId) -> Option<usize> {
    let idx = id.index() as usize;
    let slot = self.slots.get(idx)?;
    if slot.generation != id.generation() {
      debug_assert!(false, "stale handle during GC: {id:?}");
      return None;
    }
    if slot.value.is_none() {
      debug_assert!(false, "handle points at a free slot during GC: {id:?}");
      return None;
    }
    Some(idx)
  }
}
