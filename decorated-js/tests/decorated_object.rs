use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use decorated_js::{
  register_decorated_kind, CellKindId, Decoration, HandleFree, Heap, HeapLimits, IndexedCheck,
  KindRegistry, Value, VmError, DECORATED_ANONYMOUS_SLOTS, DECORATED_OVERLAP_SLOTS,
};

struct Payload {
  bytes: usize,
  drops: Arc<AtomicUsize>,
}

// Safety: holds no GC handles.
unsafe impl HandleFree for Payload {}

impl Decoration for Payload {
  fn external_size(&self) -> usize {
    self.bytes
  }
}

impl Drop for Payload {
  fn drop(&mut self) {
    self.drops.fetch_add(1, Ordering::SeqCst);
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

#[test]
fn create_with_payload_and_extra_slots() -> Result<(), VmError> {
  let (registry, kind) = decorated_registry();
  let mut heap = Heap::new(mb(), registry);
  let drops = Arc::new(AtomicUsize::new(0));

  let mut scope = heap.scope();
  let payload = Box::new(Payload {
    bytes: 64,
    drops: Arc::clone(&drops),
  });
  let obj = scope.create_decorated(kind, None, payload, 2)?;
  scope.push_root(Value::Object(obj));

  assert_eq!(scope.heap().cell_external_size(obj)?, 64);
  // The accountant is stable while the payload is untouched.
  assert_eq!(scope.heap().cell_external_size(obj)?, 64);
  assert_eq!(scope.heap().external_bytes(), 64);
  assert_eq!(
    scope.heap().declared_reference_slots(obj)?,
    DECORATED_OVERLAP_SLOTS + DECORATED_ANONYMOUS_SLOTS + 2
  );
  assert_eq!(
    scope.heap().reserved_slots(obj)?,
    DECORATED_OVERLAP_SLOTS + DECORATED_ANONYMOUS_SLOTS + 2
  );

  // Additional slots start undefined and round-trip by index.
  assert_eq!(scope.heap().additional_slot(obj, 1)?, Value::Undefined);
  scope
    .heap_mut()
    .set_additional_slot(obj, 1, Value::Number(7.0))?;
  assert_eq!(scope.heap().additional_slot(obj, 1)?, Value::Number(7.0));
  assert!(matches!(
    scope.heap().additional_slot(obj, 2),
    Err(VmError::SlotOutOfRange)
  ));

  Ok(())
}

#[test]
fn named_properties_coexist_with_payload() -> Result<(), VmError> {
  let (registry, kind) = decorated_registry();
  let mut heap = Heap::new(mb(), registry);
  let drops = Arc::new(AtomicUsize::new(0));

  let mut scope = heap.scope();
  let proto = scope.alloc_object(None)?;
  scope.push_root(Value::Object(proto));
  scope.set_property(proto, "shared", Value::Bool(true))?;

  let payload = Box::new(Payload {
    bytes: 16,
    drops: Arc::clone(&drops),
  });
  let obj = scope.create_decorated(kind, Some(proto), payload, 0)?;
  scope.push_root(Value::Object(obj));

  scope.set_property(obj, "x", Value::Number(1.0))?;
  let name = scope.alloc_string("hi")?;
  scope.set_property(obj, "name", Value::String(name))?;

  assert_eq!(scope.heap().get_own_property(obj, "x")?, Some(Value::Number(1.0)));
  assert!(scope.heap().has_own_property(obj, "name")?);
  assert_eq!(
    scope.heap().own_property_names(obj)?,
    vec!["x".to_string(), "name".to_string()]
  );

  // Inherited lookups walk the prototype chain; own lookups do not.
  assert_eq!(scope.heap().get_property(obj, "shared")?, Some(Value::Bool(true)));
  assert_eq!(scope.heap().get_own_property(obj, "shared")?, None);

  // The payload is untouched by property growth.
  assert_eq!(scope.heap().cell_external_size(obj)?, 16);
  assert!(scope.heap().decoration(obj)?.is_some());
  assert_eq!(
    scope
      .heap()
      .decoration_as::<Payload>(obj)?
      .map(|p| p.bytes),
    Some(16)
  );

  Ok(())
}

#[test]
fn decorated_cells_have_no_indexed_storage() -> Result<(), VmError> {
  let (registry, kind) = decorated_registry();
  let mut heap = Heap::new(mb(), registry);
  let drops = Arc::new(AtomicUsize::new(0));

  let mut scope = heap.scope();
  let payload = Box::new(Payload {
    bytes: 8,
    drops: Arc::clone(&drops),
  });
  let obj = scope.create_decorated(kind, None, payload, 0)?;
  scope.push_root(Value::Object(obj));

  assert_eq!(scope.heap().own_indexed_range(obj)?, 0..0);
  assert!(!scope.heap().have_own_indexed(obj, 0)?);
  assert_eq!(scope.heap().own_indexed_flags(obj, 0)?, None);
  assert_eq!(scope.heap().get_own_indexed(obj, 0)?, None);
  assert!(scope
    .heap()
    .check_all_own_indexed(obj, IndexedCheck::NonConfigurable)?);
  assert!(scope
    .heap()
    .check_all_own_indexed(obj, IndexedCheck::ReadOnly)?);
  assert!(!scope.set_own_indexed(obj, 0, Value::Number(1.0))?);
  assert!(scope.delete_own_indexed(obj, 0)?);

  Ok(())
}

#[test]
fn unrooted_decorated_cell_is_collected() -> Result<(), VmError> {
  let (registry, kind) = decorated_registry();
  let mut heap = Heap::new(mb(), registry);
  let drops = Arc::new(AtomicUsize::new(0));

  let obj = {
    let mut scope = heap.scope();
    let payload = Box::new(Payload {
      bytes: 32,
      drops: Arc::clone(&drops),
    });
    scope.create_decorated(kind, None, payload, 1)?
  };

  assert_eq!(heap.external_bytes(), 32);
  heap.collect_garbage();

  assert!(!heap.is_valid_object(obj));
  assert!(matches!(heap.decoration(obj), Err(VmError::InvalidHandle)));
  assert_eq!(drops.load(Ordering::SeqCst), 1);
  assert_eq!(heap.external_bytes(), 0);

  Ok(())
}

#[test]
fn kind_id_from_another_registry_is_rejected() -> Result<(), VmError> {
  // A registry holding only the base kind.
  let base_only = KindRegistry::builder().build();
  let mut heap = Heap::new(mb(), base_only);

  // An id minted by a different, larger registry.
  let (_registry, foreign_kind) = decorated_registry();

  let mut scope = heap.scope();
  let result = scope.create_cell(foreign_kind, None, None, 0);
  assert!(matches!(result, Err(VmError::UnknownKind)));

  Ok(())
}

#[test]
fn stale_prototype_is_rejected() -> Result<(), VmError> {
  let (registry, kind) = decorated_registry();
  let mut heap = Heap::new(mb(), registry);
  let drops = Arc::new(AtomicUsize::new(0));

  // An unrooted prototype, collected before use.
  let stale = {
    let mut scope = heap.scope();
    scope.alloc_object(None)?
  };
  heap.collect_garbage();
  assert!(!heap.is_valid_object(stale));

  {
    let mut scope = heap.scope();
    let payload = Box::new(Payload {
      bytes: 32,
      drops: Arc::clone(&drops),
    });
    let result = scope.create_decorated(kind, Some(stale), payload, 1);
    assert!(matches!(result, Err(VmError::InvalidPrototype)));
  }

  // The rejected creation left nothing behind: the payload was destroyed
  // once and no cell or accounted bytes survive a collection.
  assert_eq!(drops.load(Ordering::SeqCst), 1);
  heap.collect_garbage();
  assert_eq!(heap.used_bytes(), 0);
  assert_eq!(heap.external_bytes(), 0);

  // Prototype mutation applies the same check.
  let mut scope = heap.scope();
  let obj = scope.alloc_object(None)?;
  scope.push_root(Value::Object(obj));
  assert!(matches!(
    scope.heap_mut().set_prototype(obj, Some(stale)),
    Err(VmError::InvalidPrototype)
  ));
  assert_eq!(scope.heap().prototype_of(obj)?, None);

  Ok(())
}

#[test]
fn prototype_cycle_is_rejected() -> Result<(), VmError> {
  let (registry, _) = decorated_registry();
  let mut heap = Heap::new(mb(), registry);

  let mut scope = heap.scope();
  let a = scope.alloc_object(None)?;
  scope.push_root(Value::Object(a));
  let b = scope.alloc_object(Some(a))?;
  scope.push_root(Value::Object(b));

  assert_eq!(scope.heap().prototype_of(b)?, Some(a));
  assert!(matches!(
    scope.heap_mut().set_prototype(a, Some(b)),
    Err(VmError::PrototypeCycle)
  ));
  // The failed assignment left the chain unchanged.
  assert_eq!(scope.heap().prototype_of(a)?, None);

  scope.heap_mut().set_prototype(b, None)?;
  assert_eq!(scope.heap().prototype_of(b)?, None);

  Ok(())
}
