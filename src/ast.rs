//! Árbol de sintaxis abstracta.
//!
//! Los nodos viven en una arena ([`Ast`]) y se refieren entre sí mediante
//! [`NodeId`]. Liberar el árbol consiste en soltar la arena completa.

use std::{
    ops::{Index, IndexMut},
    rc::Rc,
};

use crate::{
    field::FieldEntry,
    name::NameString,
    namespace::ScopeId,
    ops::{AccessType, ArgType, LockRule, ObjectType, Op, RegionSpace, SerializeRule, UpdateRule},
    source::Location,
};

/// Referencia a un nodo dentro de su arena.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) usize);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    /// Invocación de un operador de la tabla.
    Op(Op),

    /// Referencia a un nombre, posiblemente con argumentos de llamada.
    Identifier(NameString),

    String(Rc<str>),
    Number(u64),
    Local(u8),
    Arg(u8),
}

/// Datos adicionales que algunos operadores adjuntan a su nodo.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    None,

    /// Lista de unidades de `Field` e `IndexField`.
    Fields(Vec<FieldEntry>),

    /// Descriptores sellados de un `ResourceTemplate`.
    Resources(Vec<u8>),

    /// Inicializador de un `Buffer`.
    Bytes(Vec<u8>),
}

/// Argumento de un nodo.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Argument {
    /// Argumento opcional omitido.
    Null,

    Node(NodeId),
    Name(NameString),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    Str(Rc<str>),
    Uuid([u8; 16]),
    Region(RegionSpace),
    Access(AccessType),
    Lock(LockRule),
    Update(UpdateRule),
    Serialize(SerializeRule),
    ObjType(ObjectType),
}

impl Argument {
    /// Determina si la etiqueta de este argumento corresponde al tipo declarado.
    pub fn matches(&self, typ: ArgType) -> bool {
        use Argument as A;

        match (typ, self) {
            (ArgType::TermArg, A::Node(_)) => true,
            (ArgType::Target, A::Node(_) | A::Null) => true,
            (ArgType::NameString, A::Name(_)) => true,
            (ArgType::U8 | ArgType::ArgCount | ArgType::SyncLevel, A::U8(_)) => true,
            (ArgType::U16, A::U16(_)) => true,
            (ArgType::U32 | ArgType::EisaId, A::U32(_)) => true,
            (ArgType::U64, A::U64(_)) => true,
            (ArgType::StringLiteral, A::Str(_)) => true,
            (ArgType::Uuid, A::Uuid(_)) => true,
            (ArgType::RegionSpace, A::Region(_)) => true,
            (ArgType::AccessType, A::Access(_)) => true,
            (ArgType::LockRule, A::Lock(_)) => true,
            (ArgType::UpdateRule, A::Update(_)) => true,
            (ArgType::SerializeRule, A::Serialize(_)) => true,
            (ArgType::ObjectType, A::ObjType(_)) => true,
            _ => false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Node {
    pub kind: NodeKind,
    pub args: Vec<Argument>,
    pub children: Vec<NodeId>,
    pub payload: Payload,

    /// Scope del namespace vigente cuando se analizó el nodo.
    pub scope: ScopeId,

    pub location: Location,
}

impl Node {
    /// Operador del nodo, si lo es.
    pub fn op(&self) -> Option<Op> {
        match self.kind {
            NodeKind::Op(op) => Some(op),
            _ => None,
        }
    }
}

/// Arena de nodos y lista de sentencias de primer nivel.
#[derive(Clone, Debug, Default)]
pub struct Ast {
    nodes: Vec<Node>,
    statements: Vec<NodeId>,
}

impl Ast {
    /// Reserva un nodo sin argumentos ni hijos.
    pub fn alloc(&mut self, kind: NodeKind, scope: ScopeId, location: Location) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            args: Vec::new(),
            children: Vec::new(),
            payload: Payload::None,
            scope,
            location,
        });

        id
    }

    pub fn statements(&self) -> &[NodeId] {
        &self.statements
    }

    pub fn set_statements(&mut self, statements: Vec<NodeId>) {
        self.statements = statements;
    }

    /// Cantidad de nodos en la arena.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Pasada de transformación previa a la emisión.
    ///
    /// Actualmente es la identidad; los nodos salen tal como entraron.
    pub fn transform(self) -> Self {
        self
    }
}

impl Index<NodeId> for Ast {
    type Output = Node;

    fn index(&self, NodeId(index): NodeId) -> &Node {
        &self.nodes[index]
    }
}

impl IndexMut<NodeId> for Ast {
    fn index_mut(&mut self, NodeId(index): NodeId) -> &mut Node {
        &mut self.nodes[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ops::DefaultValue, source};

    #[test]
    fn arguments_match_their_slot_types() {
        assert!(Argument::Null.matches(ArgType::Target));
        assert!(!Argument::Null.matches(ArgType::TermArg));
        assert!(Argument::U8(7).matches(ArgType::ArgCount));
        assert!(!Argument::U16(7).matches(ArgType::U8));
        assert!(Argument::U32(0x0300_d041).matches(ArgType::EisaId));
        assert!(Argument::from(DefaultValue::Serialize(SerializeRule::NotSerialized))
            .matches(ArgType::SerializeRule));
    }

    #[test]
    fn arena_allocation() {
        let (start, _) = source::consume("".as_bytes(), "test.asl");

        let mut ast = Ast::default();
        let first = ast.alloc(NodeKind::Number(1), ScopeId::ROOT, start.clone());
        let second = ast.alloc(NodeKind::Op(Op::Zero), ScopeId::ROOT, start);

        ast[first].children.push(second);
        ast.set_statements(vec![first]);

        let ast = ast.transform();
        assert_eq!(ast.len(), 2);
        assert_eq!(ast.statements(), &[first]);
        assert_eq!(ast[first].children, vec![second]);
        assert_eq!(ast[second].op(), Some(Op::Zero));
    }
}
