use crate::heap::ObjectCell;
use crate::{GcObject, Heap, Scope, Value, VmError};

/// Upper bound on prototype-chain walks.
///
/// Chains anywhere near this deep are degenerate; bounding the walk keeps a
/// corrupted or adversarial chain from hanging the VM.
pub const PROTOTYPE_CHAIN_LIMIT: usize = 256;

impl Heap {
  /// Gets the value of additional reserved slot `index` (the creation-time
  /// `additional_slots` region, after the kind's overlap and anonymous
  /// slots).
  pub fn additional_slot(&self, obj: GcObject, index: u32) -> Result<Value, VmError> {
    let slot = self.additional_slot_index(obj, index)?;
    let cell = self.expect_object(obj)?;
    Ok(cell.slots()[slot])
  }

  /// Sets the value of additional reserved slot `index`.
  ///
  /// Reserved slots exist from creation, so this never allocates and never
  /// triggers a collection.
  pub fn set_additional_slot(
    &mut self,
    obj: GcObject,
    index: u32,
    value: Value,
  ) -> Result<(), VmError> {
    debug_assert!(self.debug_value_is_valid_or_primitive(value));
    let slot = self.additional_slot_index(obj, index)?;
    let cell = self.expect_object_mut(obj)?;
    cell.slots[slot] = value;
    Ok(())
  }

  fn additional_slot_index(&self, obj: GcObject, index: u32) -> Result<usize, VmError> {
    let desc = self.descriptor_of(obj)?;
    let base = desc.reserved_slots(0);
    let cell = self.expect_object(obj)?;
    let reserved = self.classes.get(cell.class).reserved_slots;

    let slot = base.checked_add(index).ok_or(VmError::SlotOutOfRange)?;
    if slot >= reserved {
      return Err(VmError::SlotOutOfRange);
    }
    Ok(slot as usize)
  }

  /// Gets an own named property, without consulting the prototype chain.
  pub fn get_own_property(&self, obj: GcObject, name: &str) -> Result<Option<Value>, VmError> {
    let cell = self.expect_object(obj)?;
    let Some(slot) = self.classes.get(cell.class).name_slot(name) else {
      return Ok(None);
    };
    Ok(Some(cell.slots()[slot]))
  }

  /// Whether `obj` itself has the named property.
  pub fn has_own_property(&self, obj: GcObject, name: &str) -> Result<bool, VmError> {
    let cell = self.expect_object(obj)?;
    Ok(self.classes.get(cell.class).name_slot(name).is_some())
  }

  /// Own named property names, in insertion (slot) order.
  pub fn own_property_names(&self, obj: GcObject) -> Result<Vec<String>, VmError> {
    let cell = self.expect_object(obj)?;
    Ok(
      self
        .classes
        .get(cell.class)
        .names
        .iter()
        .map(|n| n.to_string())
        .collect(),
    )
  }

  /// Gets a named property, walking the prototype chain.
  pub fn get_property(&self, obj: GcObject, name: &str) -> Result<Option<Value>, VmError> {
    let mut current = obj;
    for _ in 0..PROTOTYPE_CHAIN_LIMIT {
      if let Some(value) = self.get_own_property(current, name)? {
        return Ok(Some(value));
      }
      match self.expect_object(current)?.prototype() {
        Some(proto) => current = proto,
        None => return Ok(None),
      }
    }
    Err(VmError::PrototypeChainTooDeep)
  }

  /// The cell's current prototype.
  pub fn prototype_of(&self, obj: GcObject) -> Result<Option<GcObject>, VmError> {
    Ok(self.expect_object(obj)?.prototype())
  }

  /// Replaces the cell's prototype link.
  ///
  /// Rejects non-live prototypes and any assignment that would make the
  /// chain cyclic; on error the cell is unchanged.
  pub fn set_prototype(
    &mut self,
    obj: GcObject,
    prototype: Option<GcObject>,
  ) -> Result<(), VmError> {
    self.expect_object(obj)?;

    if let Some(proto) = prototype {
      if !self.is_valid_object(proto) {
        return Err(VmError::InvalidPrototype);
      }

      // Walk up from the new prototype; reaching `obj` means a cycle.
      let mut current = proto;
      let mut steps = 0usize;
      loop {
        if current == obj {
          return Err(VmError::PrototypeCycle);
        }
        steps += 1;
        if steps > PROTOTYPE_CHAIN_LIMIT {
          return Err(VmError::PrototypeChainTooDeep);
        }
        match self.expect_object(current)?.prototype() {
          Some(next) => current = next,
          None => break,
        }
      }
    }

    self.expect_object_mut(obj)?.prototype = prototype;
    Ok(())
  }
}

impl<'a> Scope<'a> {
  /// Sets a named property, creating it if absent.
  ///
  /// Creating a new property derives the next hidden class and grows the
  /// cell's slot region by one, which may trigger a collection; `obj` and
  /// `value` are rooted across it. Overwriting an existing property never
  /// allocates.
  pub fn set_property(&mut self, obj: GcObject, name: &str, value: Value) -> Result<(), VmError> {
    let mut scope = self.reborrow();
    scope.push_root(Value::Object(obj));
    scope.push_root(value);
    let heap = scope.heap_mut();

    let class = heap.expect_object(obj)?.class;
    if let Some(slot) = heap.classes.get(class).name_slot(name) {
      let cell = heap.expect_object_mut(obj)?;
      cell.slots[slot] = value;
      return Ok(());
    }

    // New name: account for one more slot before growing.
    let old_len = heap.expect_object(obj)?.slots().len();
    let old_bytes = ObjectCell::heap_size_bytes_for_slot_count(old_len);
    let new_bytes = ObjectCell::heap_size_bytes_for_slot_count(old_len + 1);
    heap.ensure_can_allocate(new_bytes.saturating_sub(old_bytes))?;

    let mut buf: Vec<Value> = Vec::new();
    buf
      .try_reserve_exact(old_len + 1)
      .map_err(|_| VmError::OutOfMemory)?;

    let child = heap.classes.transition(class, name);
    let idx = heap.validate(obj.0).ok_or(VmError::InvalidHandle)?;
    let cell = heap.expect_object_mut(obj)?;
    buf.extend_from_slice(&cell.slots);
    buf.push(value);
    cell.slots = buf.into_boxed_slice();
    cell.class = child;
    debug_assert_eq!(
      heap.classes.get(child).name_slot(name),
      Some(old_len),
      "child class places the new name at the appended slot"
    );
    heap.update_slot_bytes(idx, new_bytes);
    Ok(())
  }
}
