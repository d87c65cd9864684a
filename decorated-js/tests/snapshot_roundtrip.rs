use std::sync::Arc;

use decorated_js::{
  decoration_external_size, object_build_meta, object_finalize, register_decorated_kind,
  CellDescriptor, CellKindId, Decoration, HandleFree, Heap, HeapLimits, HeapSnapshot,
  KindRegistry, Value, ValueRecord, VmError, OBJECT_INDEXED,
};

struct Payload {
  bytes: usize,
}

// Safety: holds no GC handles.
unsafe impl HandleFree for Payload {}

impl Decoration for Payload {
  fn external_size(&self) -> usize {
    self.bytes
  }
}

fn decorated_registry() -> (Arc<KindRegistry>, CellKindId) {
  let mut builder = KindRegistry::builder();
  let kind = register_decorated_kind(&mut builder);
  (builder.build(), kind)
}

fn mb() -> HeapLimits {
  HeapLimits::new(1024 * 1024, 1024 * 1024)
}

/// Builds the reference graph: a prototype with one property, and a decorated
/// child with named properties and a slot reference back to a plain object.
fn build_graph(heap: &mut Heap, kind: CellKindId) -> Result<(HeapSnapshot, Value), VmError> {
  let mut scope = heap.scope();

  let proto = scope.alloc_object(None)?;
  scope.push_root(Value::Object(proto));
  scope.set_property(proto, "inherited", Value::Bool(true))?;

  let child = scope.create_decorated(kind, Some(proto), Box::new(Payload { bytes: 512 }), 2)?;
  scope.push_root(Value::Object(child));
  scope.set_property(child, "x", Value::Number(1.5))?;
  let s = scope.alloc_string("hello")?;
  scope.set_property(child, "name", Value::String(s))?;

  let linked = scope.alloc_object(None)?;
  scope
    .heap_mut()
    .set_additional_slot(child, 0, Value::Object(linked))?;
  scope
    .heap_mut()
    .set_additional_slot(child, 1, Value::Number(-0.0))?;

  let root = Value::Object(child);
  let snapshot = scope.heap().snapshot(&[root])?;
  Ok((snapshot, root))
}

#[test]
fn roundtrip_preserves_shape_but_not_the_payload() -> Result<(), VmError> {
  let (registry, kind) = decorated_registry();
  let mut heap = Heap::new(mb(), Arc::clone(&registry));
  let (snapshot, _) = build_graph(&mut heap, kind)?;

  // Restore into a fresh heap built against the same registry.
  let mut restored_heap = Heap::new(mb(), registry);
  let mut scope = restored_heap.scope();
  let roots = scope.restore_snapshot(&snapshot)?;
  assert_eq!(roots.len(), 1);
  let Value::Object(child) = roots[0] else {
    panic!("expected the restored root to be an object");
  };
  scope.push_root(roots[0]);

  // Named properties and the prototype chain came back.
  assert_eq!(scope.heap().get_own_property(child, "x")?, Some(Value::Number(1.5)));
  let Some(Value::String(name)) = scope.heap().get_own_property(child, "name")? else {
    panic!("expected a string property");
  };
  assert_eq!(scope.heap().get_string(name)?, "hello");
  assert_eq!(
    scope.heap().get_property(child, "inherited")?,
    Some(Value::Bool(true))
  );

  // Reserved slots came back, including the object reference.
  let Value::Object(linked) = scope.heap().additional_slot(child, 0)? else {
    panic!("expected an object in the slot");
  };
  assert!(scope.heap().is_valid_object(linked));
  // Negative zero survives with its sign bit.
  let slot = scope.heap().additional_slot(child, 1)?;
  assert!(slot.same_value(Value::Number(-0.0), scope.heap()));
  assert!(!slot.same_value(Value::Number(0.0), scope.heap()));

  // The decoration is excluded by contract.
  assert!(scope.heap().decoration(child)?.is_none());
  assert_eq!(scope.heap().cell_external_size(child)?, 0);
  assert_eq!(scope.heap().external_bytes(), 0);

  Ok(())
}

#[test]
fn snapshot_survives_a_json_roundtrip() -> Result<(), VmError> {
  let (registry, kind) = decorated_registry();
  let mut heap = Heap::new(mb(), Arc::clone(&registry));
  let (snapshot, _) = build_graph(&mut heap, kind)?;

  let json = serde_json::to_string(&snapshot).expect("snapshot should serialize");
  let decoded: HeapSnapshot = serde_json::from_str(&json).expect("snapshot should deserialize");

  let mut restored_heap = Heap::new(mb(), registry);
  let mut scope = restored_heap.scope();
  let roots = scope.restore_snapshot(&decoded)?;
  let Value::Object(child) = roots[0] else {
    panic!("expected the restored root to be an object");
  };
  scope.push_root(roots[0]);
  assert_eq!(scope.heap().get_own_property(child, "x")?, Some(Value::Number(1.5)));

  Ok(())
}

#[test]
fn unknown_kind_tag_is_rejected() -> Result<(), VmError> {
  let (registry, kind) = decorated_registry();
  let mut heap = Heap::new(mb(), Arc::clone(&registry));
  let (mut snapshot, _) = build_graph(&mut heap, kind)?;

  snapshot.cells[0].kind = "NoSuchKind".to_string();

  let mut restored_heap = Heap::new(mb(), registry);
  {
    let mut scope = restored_heap.scope();
    assert!(matches!(
      scope.restore_snapshot(&snapshot),
      Err(VmError::CorruptSnapshot(_))
    ));
  }

  // A failed restore leaves no partially restored cell reachable.
  restored_heap.collect_garbage();
  assert_eq!(restored_heap.used_bytes(), 0);

  Ok(())
}

#[test]
fn inconsistent_slot_count_is_rejected() -> Result<(), VmError> {
  let (registry, kind) = decorated_registry();
  let mut heap = Heap::new(mb(), Arc::clone(&registry));
  let (mut snapshot, _) = build_graph(&mut heap, kind)?;

  snapshot.cells[0].slots.pop();

  let mut restored_heap = Heap::new(mb(), registry);
  let mut scope = restored_heap.scope();
  assert!(matches!(
    scope.restore_snapshot(&snapshot),
    Err(VmError::CorruptSnapshot(_))
  ));

  Ok(())
}

#[test]
fn duplicate_property_names_are_rejected() -> Result<(), VmError> {
  let (registry, kind) = decorated_registry();
  let mut heap = Heap::new(mb(), Arc::clone(&registry));
  let (mut snapshot, _) = build_graph(&mut heap, kind)?;

  // Duplicate a name and pad a slot so the count check still passes; the
  // layout itself is what the reader must reject.
  let record = snapshot
    .cells
    .iter_mut()
    .find(|c| !c.names.is_empty())
    .expect("expected a cell with named properties");
  record.names.push(record.names[0].clone());
  record.slots.push(ValueRecord::Undefined);

  let mut restored_heap = Heap::new(mb(), registry);
  {
    let mut scope = restored_heap.scope();
    assert!(matches!(
      scope.restore_snapshot(&snapshot),
      Err(VmError::CorruptSnapshot(_))
    ));
  }
  restored_heap.collect_garbage();
  assert_eq!(restored_heap.used_bytes(), 0);

  Ok(())
}

#[test]
fn dangling_references_are_rejected() -> Result<(), VmError> {
  let (registry, kind) = decorated_registry();
  let mut heap = Heap::new(mb(), Arc::clone(&registry));
  let (mut snapshot, _) = build_graph(&mut heap, kind)?;

  // Point the first cell-valued slot past the end of the document.
  let out_of_range = snapshot.cells.len() as u32 + 7;
  let mut patched = false;
  for record in &mut snapshot.cells {
    for slot in &mut record.slots {
      if matches!(slot, ValueRecord::Cell(_)) {
        *slot = ValueRecord::Cell(out_of_range);
        patched = true;
        break;
      }
    }
    if patched {
      break;
    }
  }
  assert!(patched, "expected the graph to contain a cell reference");

  let mut restored_heap = Heap::new(mb(), registry);
  let mut scope = restored_heap.scope();
  assert!(matches!(
    scope.restore_snapshot(&snapshot),
    Err(VmError::CorruptSnapshot(_))
  ));

  Ok(())
}

#[test]
fn kinds_without_hooks_cannot_be_snapshotted() -> Result<(), VmError> {
  let mut builder = KindRegistry::builder();
  let opaque = builder.register(CellDescriptor {
    name: "OpaqueHostObject",
    overlap_slots: 1,
    anonymous_slots: 0,
    finalizer: object_finalize,
    external_size: decoration_external_size,
    build_meta: object_build_meta,
    indexed: OBJECT_INDEXED,
    snapshot: None,
  });
  let mut heap = Heap::new(mb(), builder.build());

  let mut scope = heap.scope();
  let obj = scope.create_cell(opaque, None, None, 0)?;
  scope.push_root(Value::Object(obj));

  assert!(matches!(
    scope.heap().snapshot(&[Value::Object(obj)]),
    Err(VmError::SnapshotUnsupported)
  ));

  Ok(())
}
