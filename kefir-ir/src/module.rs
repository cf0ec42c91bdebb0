//! The IR module: the top-level container shared by every function in a
//! translation unit — named types, the bigint pool, interned string literals,
//! and the function table itself.

use crate::bigint::BigIntPool;
use crate::function::Function;
use crate::types::TypeTable;
use kefir_entity::{entity_impl, PrimaryMap};

/// A reference to an interned string literal (e.g. the argument of a format
/// string, or an initializer for a `char[]`).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StringId(u32);
entity_impl!(StringId, "str");

/// A reference to a function defined (or merely declared) in this module.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncId(u32);
entity_impl!(FuncId, "fn");

enum FuncEntry {
    Declared,
    Defined(Function),
}

/// The module-level data every function compilation reads from. Construction
/// happens once per translation unit, up front; the string/bigint tables are
/// append-only afterwards (constant folding of a `BitInt` multiply interns a
/// freshly computed bigint, for instance), and by the time a second function
/// starts compiling, the previous function's compilation has fully completed,
/// so there is never a concurrent writer.
pub struct Module {
    pub types: TypeTable,
    pub bigints: BigIntPool,
    strings: PrimaryMap<StringId, String>,
    functions: PrimaryMap<FuncId, FuncEntry>,
    names: Vec<String>,
}

impl Module {
    pub fn new() -> Self {
        Self {
            types: TypeTable::new(),
            bigints: BigIntPool::new(),
            strings: PrimaryMap::new(),
            functions: PrimaryMap::new(),
            names: Vec::new(),
        }
    }

    pub fn intern_string(&mut self, s: impl Into<String>) -> StringId {
        self.strings.push(s.into())
    }

    pub fn string(&self, id: StringId) -> &str {
        self.strings.get(id).expect("dangling StringId")
    }

    pub fn declare_function(&mut self, name: impl Into<String>) -> FuncId {
        let name = name.into();
        let id = self.functions.push(FuncEntry::Declared);
        self.names.push(name);
        debug_assert_eq!(self.names.len(), self.functions.len());
        id
    }

    pub fn define_function(&mut self, id: FuncId, body: Function) {
        *self.functions.get_mut(id).expect("dangling FuncId") = FuncEntry::Defined(body);
    }

    pub fn function_name(&self, id: FuncId) -> &str {
        &self.names[id.index_for_names()]
    }

    pub fn function_body(&self, id: FuncId) -> Option<&Function> {
        match self.functions.get(id) {
            Some(FuncEntry::Defined(f)) => Some(f),
            _ => None,
        }
    }

    pub fn function_body_mut(&mut self, id: FuncId) -> Option<&mut Function> {
        match self.functions.get_mut(id) {
            Some(FuncEntry::Defined(f)) => Some(f),
            _ => None,
        }
    }

    pub fn function_ids(&self) -> impl Iterator<Item = FuncId> + '_ {
        self.functions.keys()
    }

    /// Move a function's body out of the module, leaving `id` merely
    /// declared. Lets a caller hold the function mutably alongside a
    /// mutable borrow of the rest of the module (e.g. to intern a bigint
    /// while folding a constant) without aliasing — put it back with
    /// `define_function` once done.
    pub fn take_function_body(&mut self, id: FuncId) -> Option<Function> {
        let entry = self.functions.get_mut(id)?;
        match std::mem::replace(entry, FuncEntry::Declared) {
            FuncEntry::Defined(f) => Some(f),
            declared => {
                *entry = declared;
                None
            }
        }
    }
}

impl Default for Module {
    fn default() -> Self {
        Self::new()
    }
}

// `FuncId::index()` is also used to index the plain `names` vec above; give it
// a distinctly-named accessor at the call site instead of reusing
// `EntityRef::index` so it reads clearly as "this is a vec, not an arena".
trait FuncIdExt {
    fn index_for_names(self) -> usize;
}
impl FuncIdExt for FuncId {
    fn index_for_names(self) -> usize {
        use kefir_entity::EntityRef;
        self.index()
    }
}
