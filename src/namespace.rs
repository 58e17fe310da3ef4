//! Namespace ACPI.
//!
//! El namespace es un árbol de entradas almacenado en una arena. Cada
//! entrada conoce a su padre únicamente para resolver rutas relativas; la
//! arena es dueña de todas ellas. Un cursor en forma de pila indica el
//! scope actual: cada operador que abre un scope lo empuja al entrar y lo
//! saca exactamente una vez al salir.

use std::{
    collections::BTreeMap,
    fmt::{self, Display},
};

use log::{debug, trace};
use thiserror::Error;

use crate::{
    ast::NodeId,
    error::{Classify, Status},
    name::{NameSeg, NameString, Prefix},
};

/// Referencia a una entrada del namespace.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeId(usize);

impl ScopeId {
    /// La raíz `\`.
    pub const ROOT: ScopeId = ScopeId(0);
}

/// Lo que define a una entrada.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Definition {
    Root,

    /// Nodo del AST que declaró el nombre.
    Node(NodeId),

    /// Alias literal a un rango de bits dentro de un buffer.
    Field { bit_offset: u64, bit_count: u64 },
}

#[derive(Debug)]
pub struct Entry {
    seg: NameSeg,
    parent: Option<ScopeId>,
    children: BTreeMap<NameSeg, ScopeId>,
    definition: Definition,
}

impl Entry {
    pub fn seg(&self) -> NameSeg {
        self.seg
    }

    pub fn parent(&self) -> Option<ScopeId> {
        self.parent
    }

    pub fn definition(&self) -> Definition {
        self.definition
    }

    /// Hijos en orden de segmento.
    pub fn children(&self) -> impl Iterator<Item = ScopeId> + '_ {
        self.children.values().copied()
    }

    pub fn child(&self, seg: NameSeg) -> Option<ScopeId> {
        self.children.get(&seg).copied()
    }
}

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum NamespaceError {
    #[error("Name `{0}` already exists in this scope")]
    Duplicate(String),

    #[error("Scope `{0}` does not exist")]
    NotFound(NameString),

    #[error("Path `{0}` walks above the namespace root")]
    AboveRoot(NameString),

    #[error("Cannot declare the namespace root itself")]
    EmptyName,

    #[error("Namespace scope stack is unbalanced")]
    Unbalanced,
}

impl Classify for NamespaceError {
    fn status(&self) -> Status {
        match self {
            NamespaceError::Unbalanced => Status::Internal,
            _ => Status::Semantic,
        }
    }
}

pub type Resolve<T> = Result<T, NamespaceError>;

/// Árbol de nombres más cursor de scope actual.
#[derive(Debug)]
pub struct Namespace {
    entries: Vec<Entry>,
    stack: Vec<ScopeId>,
}

impl Default for Namespace {
    fn default() -> Self {
        Namespace::new()
    }
}

impl Namespace {
    /// Crea un namespace con solo la raíz, que es además el scope actual.
    pub fn new() -> Self {
        let root = Entry {
            seg: NameSeg::from_bytes(*b"\\___"),
            parent: None,
            children: BTreeMap::new(),
            definition: Definition::Root,
        };

        Namespace {
            entries: vec![root],
            stack: vec![ScopeId::ROOT],
        }
    }

    /// Scope actual.
    pub fn current(&self) -> ScopeId {
        self.stack.last().copied().unwrap_or(ScopeId::ROOT)
    }

    /// Profundidad de la pila de scopes, incluyendo la raíz.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn get(&self, id: ScopeId) -> &Entry {
        &self.entries[id.0]
    }

    /// Inserta un nombre nuevo a partir del scope actual.
    ///
    /// Todos los segmentos salvo el último deben existir. Si `switch_into`
    /// está activo, la nueva entrada pasa a ser el scope actual.
    pub fn add_entry(
        &mut self,
        name: &NameString,
        definition: Definition,
        switch_into: bool,
    ) -> Resolve<ScopeId> {
        let (parent, last) = self.parent_of(name)?;
        if let Some(existing) = self.get(parent).child(last) {
            return Err(NamespaceError::Duplicate(self.path(existing)));
        }

        let id = self.insert(parent, last, definition);
        debug!("Declared `{}`", self.path(id));

        if switch_into {
            self.push(id);
        }

        Ok(id)
    }

    /// Entra a un scope, creándolo si todavía no existe.
    pub fn enter(&mut self, name: &NameString, definition: Definition) -> Resolve<ScopeId> {
        if name.prefix() == Prefix::Root && name.segments().is_empty() {
            self.push(ScopeId::ROOT);
            return Ok(ScopeId::ROOT);
        }

        let (parent, last) = self.parent_of(name)?;
        let id = match self.get(parent).child(last) {
            Some(existing) => existing,
            None => {
                let id = self.insert(parent, last, definition);
                debug!("Declared `{}`", self.path(id));
                id
            }
        };

        self.push(id);
        Ok(id)
    }

    /// Regresa al scope anterior.
    pub fn pop_scope(&mut self) -> Resolve<ScopeId> {
        if self.stack.len() <= 1 {
            return Err(NamespaceError::Unbalanced);
        }

        let popped = self.stack.pop().ok_or(NamespaceError::Unbalanced)?;
        trace!("Leaving scope `{}`", self.path(popped));

        Ok(popped)
    }

    /// Busca un nombre según las reglas de búsqueda de ACPI.
    ///
    /// Las rutas con prefijo o con varios segmentos se resuelven de forma
    /// exacta. Un segmento único se busca en `from` y luego en cada
    /// ancestro hasta la raíz.
    pub fn lookup(&self, from: ScopeId, name: &NameString) -> Option<ScopeId> {
        if name.is_single() {
            let seg = name.last()?;

            let mut scope = Some(from);
            while let Some(id) = scope {
                let entry = self.get(id);
                if let Some(found) = entry.child(seg) {
                    return Some(found);
                }

                scope = entry.parent;
            }

            return None;
        }

        let start = self.start(from, name).ok()?;
        self.walk(start, name.segments(), name).ok()
    }

    /// Resuelve una ruta textual, relativa a la raíz.
    pub fn resolve_path(&self, path: &str) -> Option<ScopeId> {
        let name: NameString = path.parse().ok()?;
        let start = self.start(ScopeId::ROOT, &name).ok()?;
        self.walk(start, name.segments(), &name).ok()
    }

    /// Ruta absoluta de una entrada, como `\_SB_.DEV0`.
    pub fn path(&self, id: ScopeId) -> String {
        let mut segs = Vec::new();

        let mut scope = id;
        while let Some(parent) = self.get(scope).parent {
            segs.push(self.get(scope).seg.to_string());
            scope = parent;
        }

        segs.reverse();
        format!("\\{}", segs.join("."))
    }

    fn push(&mut self, id: ScopeId) {
        trace!("Entering scope `{}`", self.path(id));
        self.stack.push(id);
    }

    fn insert(&mut self, parent: ScopeId, seg: NameSeg, definition: Definition) -> ScopeId {
        let id = ScopeId(self.entries.len());
        self.entries.push(Entry {
            seg,
            parent: Some(parent),
            children: BTreeMap::new(),
            definition,
        });

        self.entries[parent.0].children.insert(seg, id);
        id
    }

    /// Localiza la entrada que contendrá al último segmento de `name`.
    fn parent_of(&self, name: &NameString) -> Resolve<(ScopeId, NameSeg)> {
        let (&last, intermediate) = name
            .segments()
            .split_last()
            .ok_or(NamespaceError::EmptyName)?;

        let start = self.start(self.current(), name)?;
        let parent = self.walk(start, intermediate, name)?;

        Ok((parent, last))
    }

    fn start(&self, from: ScopeId, name: &NameString) -> Resolve<ScopeId> {
        match name.prefix() {
            Prefix::None => Ok(from),
            Prefix::Root => Ok(ScopeId::ROOT),
            Prefix::Parent(levels) => (0..levels).try_fold(from, |scope, _| {
                self.get(scope)
                    .parent
                    .ok_or_else(|| NamespaceError::AboveRoot(name.clone()))
            }),
        }
    }

    fn walk(&self, from: ScopeId, segs: &[NameSeg], name: &NameString) -> Resolve<ScopeId> {
        segs.iter().try_fold(from, |scope, &seg| {
            self.get(scope)
                .child(seg)
                .ok_or_else(|| NamespaceError::NotFound(name.clone()))
        })
    }
}

impl Display for Namespace {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn dump(
            namespace: &Namespace,
            id: ScopeId,
            depth: usize,
            fmt: &mut fmt::Formatter<'_>,
        ) -> fmt::Result {
            let entry = namespace.get(id);
            let indent = depth * 4;

            match entry.definition {
                Definition::Root => writeln!(fmt, "\\")?,
                Definition::Node(_) => writeln!(fmt, "{:indent$}{}", "", entry.seg, indent = indent)?,
                Definition::Field {
                    bit_offset,
                    bit_count,
                } => writeln!(
                    fmt,
                    "{:indent$}{} [bit {}, width {}]",
                    "",
                    entry.seg,
                    bit_offset,
                    bit_count,
                    indent = indent
                )?,
            }

            entry
                .children()
                .try_for_each(|child| dump(namespace, child, depth + 1, fmt))
        }

        dump(self, ScopeId::ROOT, 0, fmt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(text: &str) -> NameString {
        text.parse().unwrap()
    }

    fn node(index: usize) -> Definition {
        Definition::Node(NodeId(index))
    }

    #[test]
    fn nested_declarations() {
        let mut namespace = Namespace::new();

        namespace.enter(&name("\\_SB"), node(0)).unwrap();
        namespace.add_entry(&name("DEV0"), node(1), true).unwrap();
        namespace.add_entry(&name("_HID"), node(2), false).unwrap();
        namespace.pop_scope().unwrap();
        namespace.pop_scope().unwrap();

        assert_eq!(namespace.current(), ScopeId::ROOT);
        for path in &["\\_SB", "\\_SB.DEV0", "\\_SB.DEV0._HID"] {
            assert!(namespace.resolve_path(path).is_some(), "{}", path);
        }

        let hid = namespace.resolve_path("\\_SB.DEV0._HID").unwrap();
        assert_eq!(namespace.path(hid), "\\_SB_.DEV0._HID");
    }

    #[test]
    fn duplicates_are_rejected() {
        let mut namespace = Namespace::new();

        namespace.add_entry(&name("FOO"), node(0), false).unwrap();
        let error = namespace.add_entry(&name("FOO"), node(1), false).unwrap_err();

        assert!(matches!(error, NamespaceError::Duplicate(ref path) if path == "\\FOO_"));
        assert_eq!(error.status(), Status::Semantic);
    }

    #[test]
    fn intermediate_segments_must_exist() {
        let mut namespace = Namespace::new();

        let error = namespace
            .add_entry(&name("\\_SB.PCI0.DEV0"), node(0), false)
            .unwrap_err();

        assert!(matches!(error, NamespaceError::NotFound(_)));
    }

    #[test]
    fn parent_prefix() {
        let mut namespace = Namespace::new();

        namespace.add_entry(&name("AAAA"), node(0), true).unwrap();
        namespace.add_entry(&name("BBBB"), node(1), true).unwrap();
        namespace.add_entry(&name("^CCCC"), node(2), false).unwrap();
        assert!(namespace.resolve_path("\\AAAA.CCCC").is_some());

        let error = namespace
            .add_entry(&name("^^^DDDD"), node(3), false)
            .unwrap_err();
        assert!(matches!(error, NamespaceError::AboveRoot(_)));
    }

    #[test]
    fn single_segments_search_upward() {
        let mut namespace = Namespace::new();

        let global = namespace.add_entry(&name("GLOB"), node(0), false).unwrap();
        let dev = namespace.add_entry(&name("DEV0"), node(1), true).unwrap();
        namespace.add_entry(&name("LOCL"), node(2), false).unwrap();

        assert_eq!(namespace.lookup(dev, &name("GLOB")), Some(global));
        assert_eq!(namespace.lookup(ScopeId::ROOT, &name("LOCL")), None);
        assert!(namespace.lookup(ScopeId::ROOT, &name("DEV0.LOCL")).is_some());
    }

    #[test]
    fn popping_the_root_fails() {
        let mut namespace = Namespace::new();

        let error = namespace.pop_scope().unwrap_err();
        assert!(matches!(error, NamespaceError::Unbalanced));
        assert_eq!(error.status(), Status::Internal);
    }

    #[test]
    fn dump_lists_every_entry() {
        let mut namespace = Namespace::new();

        namespace.add_entry(&name("DEV0"), node(0), true).unwrap();
        namespace
            .add_entry(
                &name("_CRS"),
                Definition::Field {
                    bit_offset: 8,
                    bit_count: 16,
                },
                false,
            )
            .unwrap();

        let dump = namespace.to_string();
        assert!(dump.contains("    DEV0\n"));
        assert!(dump.contains("        _CRS [bit 8, width 16]\n"));
    }
}
