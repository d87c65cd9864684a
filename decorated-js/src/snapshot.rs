//! Heap snapshot codec.
//!
//! A snapshot captures the object graph reachable from a caller-supplied root
//! list as a self-contained, serde-serializable document. Strings are inlined
//! by contents; object cells become [`CellRecord`]s referencing each other by
//! document index. Decorations are excluded by contract: a restored cell comes
//! back undecorated, and kind-specific logic must re-derive any payload.
//!
//! Only kinds registered with [`SnapshotHooks`](crate::kind::SnapshotHooks)
//! participate; reaching a cell of a hook-less kind fails the whole write with
//! [`VmError::SnapshotUnsupported`].

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::kind::SnapshotHooks;
use crate::{CellKindId, GcObject, Heap, Scope, Value, VmError};

/// One scripting value in snapshot form.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum ValueRecord {
  Undefined,
  Null,
  Bool(bool),
  Number(f64),
  /// String contents, inlined.
  String(String),
  /// Index of a [`CellRecord`] in the document's cell list.
  Cell(u32),
}

/// One object cell in snapshot form.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct CellRecord {
  /// The kind's registry tag name.
  pub kind: String,
  /// Document index of the prototype cell, if any.
  pub prototype: Option<u32>,
  /// Reserved (anonymous) slot count the cell was created with.
  pub reserved_slots: u32,
  /// Named-property names, in slot order after the reserved region.
  pub names: Vec<String>,
  /// All slot values, reserved region first.
  pub slots: Vec<ValueRecord>,
}

/// A complete snapshot document.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct HeapSnapshot {
  pub cells: Vec<CellRecord>,
  /// The caller's root list, in the order it was passed to
  /// [`Heap::snapshot`].
  pub roots: Vec<ValueRecord>,
}

/// Snapshot hooks shared by the base object kind and decoration-bearing kinds
/// layered on it.
pub const OBJECT_SNAPSHOT: SnapshotHooks = SnapshotHooks {
  serialize: object_serialize_cell,
  deserialize: object_deserialize_cell,
};

/// Fills the layout fields of a [`CellRecord`] from a live cell's hidden
/// class.
pub fn object_serialize_cell(
  heap: &Heap,
  obj: GcObject,
  record: &mut CellRecord,
) -> Result<(), VmError> {
  let cell = heap.expect_object(obj)?;
  let class = heap.classes.get(cell.class);
  record.reserved_slots = class.reserved_slots;
  record.names = class.names.iter().map(|n| n.to_string()).collect();
  Ok(())
}

/// Allocates a fresh, undecorated cell of `kind` shaped like `record`.
///
/// Only the reserved region is recreated here; the reader re-adds named
/// properties and patches slot values and the prototype afterwards.
pub fn object_deserialize_cell(
  scope: &mut Scope<'_>,
  kind: CellKindId,
  record: &CellRecord,
) -> Result<GcObject, VmError> {
  let base = scope.heap().registry().get(kind)?.reserved_slots(0);
  let additional = record
    .reserved_slots
    .checked_sub(base)
    .ok_or(VmError::CorruptSnapshot("reserved slot count below kind minimum"))?;
  scope.create_cell(kind, None, None, additional)
}

impl Heap {
  /// Writes the object graph reachable from `roots` to a snapshot document.
  pub fn snapshot(&self, roots: &[Value]) -> Result<HeapSnapshot, VmError> {
    let mut writer = SnapshotWriter {
      heap: self,
      indexes: AHashMap::new(),
      pending: Vec::new(),
      cells: Vec::new(),
    };

    let mut root_records = Vec::with_capacity(roots.len());
    for root in roots {
      root_records.push(writer.encode_value(*root)?);
    }
    while let Some(obj) = writer.pending.pop() {
      writer.write_cell(obj)?;
    }

    tracing::debug!(
      cells = writer.cells.len(),
      roots = root_records.len(),
      "snapshot written"
    );
    Ok(HeapSnapshot {
      cells: writer.cells,
      roots: root_records,
    })
  }
}

struct SnapshotWriter<'h> {
  heap: &'h Heap,
  indexes: AHashMap<GcObject, u32>,
  /// Cells assigned an index but not yet written.
  pending: Vec<GcObject>,
  cells: Vec<CellRecord>,
}

impl SnapshotWriter<'_> {
  fn encode_value(&mut self, value: Value) -> Result<ValueRecord, VmError> {
    Ok(match value {
      Value::Undefined => ValueRecord::Undefined,
      Value::Null => ValueRecord::Null,
      Value::Bool(b) => ValueRecord::Bool(b),
      Value::Number(n) => ValueRecord::Number(n),
      Value::String(s) => ValueRecord::String(self.heap.get_string(s)?.to_string()),
      Value::Object(o) => ValueRecord::Cell(self.index_of(o)?),
    })
  }

  /// Assigns a document index to `obj`, scheduling it for writing on first
  /// sight.
  fn index_of(&mut self, obj: GcObject) -> Result<u32, VmError> {
    if let Some(idx) = self.indexes.get(&obj) {
      return Ok(*idx);
    }
    // Reject hook-less kinds before handing out an index.
    let desc = self.heap.descriptor_of(obj)?;
    if desc.snapshot.is_none() {
      return Err(VmError::SnapshotUnsupported);
    }
    let idx = self.indexes.len() as u32;
    self.indexes.insert(obj, idx);
    self.pending.push(obj);
    // Reserve the record's position now so `cells[idx]` lines up.
    self.cells.push(CellRecord::default());
    Ok(idx)
  }

  fn write_cell(&mut self, obj: GcObject) -> Result<(), VmError> {
    let desc = self.heap.descriptor_of(obj)?;
    let Some(hooks) = desc.snapshot else {
      return Err(VmError::SnapshotUnsupported);
    };

    let mut record = CellRecord {
      kind: desc.name.to_string(),
      ..CellRecord::default()
    };
    (hooks.serialize)(self.heap, obj, &mut record)?;

    if let Some(proto) = self.heap.prototype_of(obj)? {
      record.prototype = Some(self.index_of(proto)?);
    }
    let slot_count = self.heap.object_slots(obj)?.len();
    record.slots.reserve(slot_count);
    for i in 0..slot_count {
      let value = self.heap.object_slots(obj)?[i];
      let encoded = self.encode_value(value)?;
      record.slots.push(encoded);
    }

    let idx = self.indexes[&obj] as usize;
    self.cells[idx] = record;
    Ok(())
  }
}

impl<'a> Scope<'a> {
  /// Restores a snapshot document into this heap.
  ///
  /// Allocates one fresh cell per record (undecorated, via the kind's
  /// deserialize hook), then patches prototypes and slot values in a second
  /// pass once every cell exists. Returns the document's root list mapped to
  /// live values, in order. All restored cells are rooted for the duration of
  /// the call; afterwards only the returned roots keep them alive.
  pub fn restore_snapshot(&mut self, snapshot: &HeapSnapshot) -> Result<Vec<Value>, VmError> {
    let mut scope = self.reborrow();

    // Pass 1: allocate every cell and rebuild named-property layouts.
    let mut objects: Vec<GcObject> = Vec::with_capacity(snapshot.cells.len());
    for record in &snapshot.cells {
      let kind = scope
        .heap()
        .registry()
        .lookup(&record.kind)
        .ok_or(VmError::CorruptSnapshot("unknown kind tag"))?;
      let desc = scope.heap().registry().get(kind)?;
      let Some(hooks) = desc.snapshot else {
        return Err(VmError::SnapshotUnsupported);
      };

      let expected = (record.reserved_slots as usize).saturating_add(record.names.len());
      if record.slots.len() != expected {
        return Err(VmError::CorruptSnapshot("slot count does not match layout"));
      }

      let obj = (hooks.deserialize)(&mut scope, kind, record)?;
      scope.push_root(Value::Object(obj));
      for name in &record.names {
        // A duplicate would overwrite instead of appending a slot, desyncing
        // the layout from the record's slot list.
        if scope.heap().has_own_property(obj, name)? {
          return Err(VmError::CorruptSnapshot("duplicate property name"));
        }
        scope.set_property(obj, name, Value::Undefined)?;
      }
      objects.push(obj);
    }

    // Pass 2: patch prototypes and slot values.
    for (record, obj) in snapshot.cells.iter().zip(&objects) {
      if let Some(proto_idx) = record.prototype {
        let proto = *objects
          .get(proto_idx as usize)
          .ok_or(VmError::CorruptSnapshot("dangling prototype reference"))?;
        scope.heap_mut().set_prototype(*obj, Some(proto))?;
      }
      for (slot, value_record) in record.slots.iter().enumerate() {
        let value = decode_value(&mut scope, &objects, value_record)?;
        scope.heap_mut().write_slot_raw(*obj, slot, value)?;
      }
    }

    let mut roots = Vec::with_capacity(snapshot.roots.len());
    for record in &snapshot.roots {
      roots.push(decode_value(&mut scope, &objects, record)?);
    }
    tracing::debug!(cells = objects.len(), "snapshot restored");
    Ok(roots)
  }
}

fn decode_value(
  scope: &mut Scope<'_>,
  objects: &[GcObject],
  record: &ValueRecord,
) -> Result<Value, VmError> {
  Ok(match record {
    ValueRecord::Undefined => Value::Undefined,
    ValueRecord::Null => Value::Null,
    ValueRecord::Bool(b) => Value::Bool(*b),
    ValueRecord::Number(n) => Value::Number(*n),
    ValueRecord::String(s) => Value::String(scope.alloc_string(s)?),
    ValueRecord::Cell(idx) => Value::Object(
      *objects
        .get(*idx as usize)
        .ok_or(VmError::CorruptSnapshot("dangling cell reference"))?,
    ),
  })
}
