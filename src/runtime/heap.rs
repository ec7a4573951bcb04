//! Generational object heap.
//!
//! Objects live in a slot arena. An [`ObjRef`] names a slot *and* the
//! generation the slot had when the object was allocated, so a handle to a
//! freed object never resolves to whatever reuses the slot later. Handles
//! double as weak references: holding one keeps nothing alive.
//!
//! Memory is reclaimed by an explicit mark-and-sweep pass
//! ([`Heap::collect`]) from a caller-provided root set.

use std::fmt;

use super::error::RuntimeError;
use super::object::{
    ClassObject, FunctionObject, InstanceObject, MethodObject, ModuleObject, Object, ObjectKind,
    PropertyObject,
};

/// Generation-checked handle to a heap object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjRef {
    index: u32,
    generation: u32,
}

impl ObjRef {
    #[inline]
    pub fn index(self) -> usize {
        self.index as usize
    }

    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    object: Option<Object>,
}

#[derive(Debug, Default)]
pub struct Heap {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    live: usize,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an object, reusing a freed slot when available.
    pub fn alloc(&mut self, object: Object) -> ObjRef {
        self.live += 1;
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation = slot.generation.wrapping_add(1);
            slot.object = Some(object);
            return ObjRef {
                index,
                generation: slot.generation,
            };
        }

        let index = u32::try_from(self.slots.len()).expect("heap slot count exceeds u32");
        self.slots.push(Slot {
            generation: 0,
            object: Some(object),
        });
        ObjRef {
            index,
            generation: 0,
        }
    }

    #[inline]
    pub fn get(&self, r: ObjRef) -> Option<&Object> {
        self.slots
            .get(r.index())
            .filter(|slot| slot.generation == r.generation)
            .and_then(|slot| slot.object.as_ref())
    }

    #[inline]
    pub fn get_mut(&mut self, r: ObjRef) -> Option<&mut Object> {
        self.slots
            .get_mut(r.index())
            .filter(|slot| slot.generation == r.generation)
            .and_then(|slot| slot.object.as_mut())
    }

    /// Whether the handle still resolves (the weak-reference check).
    #[inline]
    pub fn is_alive(&self, r: ObjRef) -> bool {
        self.get(r).is_some()
    }

    /// Number of live objects.
    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Kind of the object behind `r`, if alive.
    pub fn kind(&self, r: ObjRef) -> Option<ObjectKind> {
        self.get(r).map(Object::kind)
    }

    /// Name of the module that defined the object, following bound methods
    /// to their function.
    pub fn owner_module(&self, r: ObjRef) -> Option<&str> {
        match self.get(r)? {
            Object::Method(m) => self.owner_module(m.function),
            other => other.defining_module(),
        }
    }

    /// Handles of every live instance whose class pointer is `class`.
    pub fn instances_of(&self, class: ObjRef) -> Vec<ObjRef> {
        self.iter()
            .filter_map(|(r, obj)| match obj {
                Object::Instance(i) if i.class == class => Some(r),
                _ => None,
            })
            .collect()
    }

    /// Iterate live objects with their handles.
    pub fn iter(&self) -> impl Iterator<Item = (ObjRef, &Object)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.object.as_ref().map(|obj| {
                (
                    ObjRef {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    obj,
                )
            })
        })
    }

    /// Mark-and-sweep from `roots`. Returns the number of freed objects.
    ///
    /// Unreachable slots are emptied and their generation is bumped on
    /// reuse, so any handle kept elsewhere stops resolving.
    pub fn collect(&mut self, roots: impl IntoIterator<Item = ObjRef>) -> usize {
        let mut reachable = vec![false; self.slots.len()];
        let mut work_list: Vec<ObjRef> = roots.into_iter().collect();

        while let Some(r) = work_list.pop() {
            let idx = r.index();
            if idx >= reachable.len() || reachable[idx] {
                continue;
            }
            let Some(object) = self.get(r) else {
                continue;
            };
            reachable[idx] = true;
            object.collect_refs(&mut work_list);
        }

        let mut freed = 0;
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            if reachable[idx] || slot.object.is_none() {
                continue;
            }
            slot.object = None;
            self.free_list.push(idx as u32);
            freed += 1;
        }
        self.live -= freed;
        freed
    }

    // -------------------------------------------------------------------------
    // Typed accessors
    // -------------------------------------------------------------------------

    fn resolve(&self, r: ObjRef) -> Result<&Object, RuntimeError> {
        self.get(r).ok_or(RuntimeError::DeadReference(r))
    }

    fn resolve_mut(&mut self, r: ObjRef) -> Result<&mut Object, RuntimeError> {
        self.get_mut(r).ok_or(RuntimeError::DeadReference(r))
    }
}

macro_rules! typed_accessors {
    ($($variant:ident => $ty:ty, $get:ident, $get_mut:ident;)*) => {
        impl Heap {
            $(
                pub fn $get(&self, r: ObjRef) -> Result<&$ty, RuntimeError> {
                    match self.resolve(r)? {
                        Object::$variant(o) => Ok(o),
                        other => Err(RuntimeError::WrongKind {
                            expected: ObjectKind::$variant,
                            found: other.kind(),
                        }),
                    }
                }

                pub fn $get_mut(&mut self, r: ObjRef) -> Result<&mut $ty, RuntimeError> {
                    match self.resolve_mut(r)? {
                        Object::$variant(o) => Ok(o),
                        other => Err(RuntimeError::WrongKind {
                            expected: ObjectKind::$variant,
                            found: other.kind(),
                        }),
                    }
                }
            )*
        }
    };
}

typed_accessors! {
    Module => ModuleObject, module, module_mut;
    Class => ClassObject, class, class_mut;
    Function => FunctionObject, function, function_mut;
    Method => MethodObject, method, method_mut;
    Property => PropertyObject, property, property_mut;
    Instance => InstanceObject, instance, instance_mut;
}
