//! Emisión de AML a partir del AST.
//!
//! El recorrido es en preorden: cada nodo emite su opcode, luego sus
//! argumentos fijos en el orden declarado por su [`Descriptor`] y por
//! último sus hijos o su carga adjunta. Los operadores que abren un
//! paquete se cierran con su `PkgLength` al terminar los hijos.

use thiserror::Error;

use log::{debug, trace};

use crate::{
    aml::{self, EncodeError, Header, Table},
    ast::{Argument, Ast, NodeId, NodeKind, Payload},
    error::{Classify, Status},
    field::FieldEntry,
    namespace::{Definition, Namespace},
    ops::{Descriptor, Op, OpFlags},
    source::{Located, Location},
};

const BUFFER_OP: u8 = 0x11;
const PACKAGE_OP: u8 = 0x12;
const VAR_PACKAGE_OP: u8 = 0x13;
const LOCAL0_OP: u8 = 0x60;
const ARG0_OP: u8 = 0x68;
const RESERVED_FIELD: u8 = 0x00;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum EmitError {
    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("Node for `{op}` carries {found} arguments, expected {expected}")]
    Arity {
        op: Op,
        expected: usize,
        found: usize,
    },

    #[error("Argument {slot} of `{op}` does not match its declared type")]
    Mismatch { op: Op, slot: usize },

    #[error("Package with {0} elements exceeds the limit of 255, use a variable-length count")]
    PackageSize(usize),

    #[error("Package declares {declared} elements but its initializer lists {elements}")]
    PackageCount { declared: u64, elements: usize },

    #[error("Buffer declares {declared} bytes but its initializer lists {bytes}")]
    BufferSize { declared: u64, bytes: usize },
}

impl Classify for EmitError {
    fn status(&self) -> Status {
        match self {
            EmitError::Encode(error) => error.status(),
            EmitError::Arity { .. } | EmitError::Mismatch { .. } => Status::Internal,
            EmitError::PackageSize(_) => Status::ResourceExhaustion,
            EmitError::PackageCount { .. } | EmitError::BufferSize { .. } => Status::Semantic,
        }
    }
}

pub type Emit<T> = Result<T, Located<EmitError>>;

/// Emite una tabla completa a partir de las sentencias de primer nivel.
///
/// `unit` es la ubicación que se reporta para errores que no pertenecen
/// a ningún nodo en particular.
pub fn emit(ast: &Ast, namespace: &Namespace, header: &Header, unit: &Location) -> Emit<Vec<u8>> {
    let mut emitter = Emitter {
        ast,
        namespace,
        table: Table::new(),
    };

    for &statement in ast.statements() {
        emitter.node(statement)?;
    }

    debug!("Emitted {} bytes of AML", emitter.table.len());

    emitter
        .table
        .finish(header)
        .map_err(|error| Located::at(error.into(), unit.clone()))
}

struct Emitter<'a> {
    ast: &'a Ast,
    namespace: &'a Namespace,
    table: Table,
}

impl Emitter<'_> {
    fn node(&mut self, id: NodeId) -> Emit<()> {
        let ast = self.ast;
        let node = &ast[id];

        match &node.kind {
            NodeKind::Op(op) => return self.operator(id, *op),

            NodeKind::Identifier(name) => {
                self.encode(id, |table| table.name(name))?;
                for argument in &node.args {
                    self.argument(id, argument)?;
                }
            }

            NodeKind::String(string) => self.table.string(string),
            NodeKind::Number(value) => self.table.integer(*value),
            NodeKind::Local(index) => self.table.byte(LOCAL0_OP + index),
            NodeKind::Arg(index) => self.table.byte(ARG0_OP + index),
        }

        Ok(())
    }

    fn operator(&mut self, id: NodeId, op: Op) -> Emit<()> {
        let ast = self.ast;
        let descriptor = op.descriptor();
        self.check(id, descriptor)?;

        trace!("Emitting `{}` at offset {}", op, self.table.len());

        match op {
            Op::Method => self.method(id),
            Op::Field | Op::IndexField => self.field(id, descriptor),
            Op::Package => self.package(id),
            Op::Buffer => self.buffer(id),

            Op::ResourceTemplate => match &ast[id].payload {
                Payload::Resources(bytes) => self.opaque_buffer(id, bytes),
                _ => self.fail(id, EmitError::Mismatch { op, slot: 0 }),
            },

            Op::ToUuid => match &ast[id].args[0] {
                Argument::Uuid(bytes) => self.opaque_buffer(id, bytes),
                _ => self.fail(id, EmitError::Mismatch { op, slot: 0 }),
            },

            Op::Unicode => match &ast[id].args[0] {
                Argument::Str(string) => {
                    let mut bytes: Vec<u8> = string
                        .encode_utf16()
                        .flat_map(|unit| unit.to_le_bytes().to_vec())
                        .collect();

                    bytes.extend_from_slice(&[0, 0]);
                    self.opaque_buffer(id, &bytes)
                }

                _ => self.fail(id, EmitError::Mismatch { op, slot: 0 }),
            },

            _ => self.generic(id, descriptor),
        }
    }

    /// Verifica que los argumentos del nodo correspondan a su descriptor.
    fn check(&self, id: NodeId, descriptor: &Descriptor) -> Emit<()> {
        let args = &self.ast[id].args;
        if args.len() != descriptor.arity() {
            return self.fail(
                id,
                EmitError::Arity {
                    op: descriptor.op,
                    expected: descriptor.arity(),
                    found: args.len(),
                },
            );
        }

        for (slot, argument) in args.iter().enumerate() {
            let matches = descriptor
                .arg_type(slot)
                .map_or(false, |typ| argument.matches(typ));

            if !matches {
                return self.fail(id, EmitError::Mismatch {
                    op: descriptor.op,
                    slot,
                });
            }
        }

        Ok(())
    }

    /// Opcode, argumentos en orden y, si abre un scope, los hijos dentro de un paquete.
    fn generic(&mut self, id: NodeId, descriptor: &Descriptor) -> Emit<()> {
        let ast = self.ast;
        let node = &ast[id];
        let packaged = descriptor.flags.contains(OpFlags::NEW_SCOPE);

        if packaged {
            self.table.pkg_start(descriptor.opcode);
        } else {
            self.table.bytes(descriptor.opcode);
        }

        for (slot, argument) in node.args.iter().enumerate() {
            if slot == 1 && is_create_field(descriptor.op) {
                if let Some(index) = self.field_index(descriptor.op, argument) {
                    self.table.integer(index);
                    continue;
                }
            }

            self.argument(id, argument)?;
        }

        if packaged {
            for &child in &node.children {
                self.node(child)?;
            }

            self.finish(id)?;
        }

        Ok(())
    }

    fn argument(&mut self, id: NodeId, argument: &Argument) -> Emit<()> {
        match argument {
            Argument::Null => self.table.byte(0),
            Argument::Node(node) => return self.node(*node),
            Argument::Name(name) => return self.encode(id, |table| table.name(name)),
            Argument::U8(value) => self.table.byte(*value),
            Argument::U16(value) => self.table.bytes(&value.to_le_bytes()),
            Argument::U32(value) => self.table.bytes(&value.to_le_bytes()),
            Argument::U64(value) => self.table.bytes(&value.to_le_bytes()),
            Argument::Str(string) => self.table.string(string),
            Argument::Uuid(bytes) => self.table.bytes(bytes),
            Argument::Region(space) => self.table.byte(space.encoding()),
            Argument::Access(access) => self.table.byte(access.encoding()),
            Argument::Lock(lock) => self.table.byte(lock.encoding()),
            Argument::Update(update) => self.table.byte(update.encoding()),
            Argument::Serialize(rule) => self.table.byte(rule.encoding()),
            Argument::ObjType(typ) => self.table.byte(typ.encoding()),
        }

        Ok(())
    }

    /// Índice de un `CreateXField` que nombra un alias de descriptor de recursos.
    fn field_index(&self, op: Op, argument: &Argument) -> Option<u64> {
        let node = match argument {
            Argument::Node(node) => &self.ast[*node],
            _ => return None,
        };

        let name = match &node.kind {
            NodeKind::Identifier(name) if node.args.is_empty() => name,
            _ => return None,
        };

        // Las rutas relativas a un alias se intentan desde cada scope ancestro
        let mut scope = Some(node.scope);
        let entry = loop {
            let from = scope?;
            if let Some(entry) = self.namespace.lookup(from, name) {
                break entry;
            }

            scope = self.namespace.get(from).parent();
        };

        match self.namespace.get(entry).definition() {
            Definition::Field { bit_offset, .. } => {
                let index = if op == Op::CreateBitField {
                    bit_offset
                } else {
                    bit_offset / 8
                };

                trace!("Index `{}` of `{}` resolves to {}", name, op, index);
                Some(index)
            }

            _ => None,
        }
    }

    /// `Method`: paquete, nombre, byte de banderas y cuerpo.
    fn method(&mut self, id: NodeId) -> Emit<()> {
        let ast = self.ast;
        let node = &ast[id];

        let flags = match node.args[..] {
            [_, Argument::U8(argc), Argument::Serialize(rule), Argument::U8(sync)] => {
                argc | rule.encoding() << 3 | sync << 4
            }

            _ => return self.fail(id, EmitError::Mismatch {
                op: Op::Method,
                slot: 1,
            }),
        };

        self.table.pkg_start(Op::Method.descriptor().opcode);
        self.argument(id, &node.args[0])?;
        self.table.byte(flags);

        for &child in &node.children {
            self.node(child)?;
        }

        self.finish(id)
    }

    /// `Field` e `IndexField`: paquete, nombres, banderas y unidades.
    fn field(&mut self, id: NodeId, descriptor: &Descriptor) -> Emit<()> {
        let ast = self.ast;
        let node = &ast[id];

        let names = descriptor.arity() - 3;
        let flags = match node.args[names..] {
            [Argument::Access(access), Argument::Lock(lock), Argument::Update(update)] => {
                access.encoding() | lock.encoding() << 4 | update.encoding() << 5
            }

            _ => return self.fail(id, EmitError::Mismatch {
                op: descriptor.op,
                slot: names,
            }),
        };

        let entries = match &node.payload {
            Payload::Fields(entries) => entries,
            _ => return self.fail(id, EmitError::Mismatch {
                op: descriptor.op,
                slot: 0,
            }),
        };

        self.table.pkg_start(descriptor.opcode);
        for argument in &node.args[..names] {
            self.argument(id, argument)?;
        }

        self.table.byte(flags);

        let mut cursor = 0;
        for entry in entries {
            match *entry {
                FieldEntry::Offset(offset) => {
                    let gap = offset * 8 - cursor;
                    if gap > 0 {
                        self.table.byte(RESERVED_FIELD);
                        self.length(id, gap)?;
                    }

                    cursor = offset * 8;
                }

                FieldEntry::Unit { name, bits } => {
                    match name {
                        Some(seg) => self.table.bytes(seg.as_bytes()),
                        None => self.table.byte(RESERVED_FIELD),
                    }

                    self.length(id, bits)?;
                    cursor += bits;
                }
            }
        }

        self.finish(id)
    }

    /// `Package`: cuenta fija de hasta 255 elementos o `VarPackage`.
    fn package(&mut self, id: NodeId) -> Emit<()> {
        let ast = self.ast;
        let node = &ast[id];
        let elements = node.children.len();

        let count = match node.args[0] {
            Argument::Null if elements > u8::MAX.into() => {
                return self.fail(id, EmitError::PackageSize(elements))
            }

            Argument::Null => Some(elements as u8),
            Argument::Node(count) => match ast[count].kind {
                NodeKind::Number(declared) if declared < elements as u64 => {
                    return self.fail(id, EmitError::PackageCount { declared, elements });
                }

                NodeKind::Number(declared) if declared <= u8::MAX.into() => Some(declared as u8),
                _ => None,
            },

            _ => return self.fail(id, EmitError::Mismatch {
                op: Op::Package,
                slot: 0,
            }),
        };

        match count {
            Some(count) => {
                self.table.pkg_start(&[PACKAGE_OP]);
                self.table.byte(count);
            }

            None => {
                self.table.pkg_start(&[VAR_PACKAGE_OP]);
                self.argument(id, &node.args[0])?;
            }
        }

        for &element in &node.children {
            self.node(element)?;
        }

        self.finish(id)
    }

    /// `Buffer`: tamaño declarado o implícito seguido del inicializador.
    fn buffer(&mut self, id: NodeId) -> Emit<()> {
        let ast = self.ast;
        let node = &ast[id];

        let bytes = match &node.payload {
            Payload::Bytes(bytes) => bytes,
            _ => return self.fail(id, EmitError::Mismatch {
                op: Op::Buffer,
                slot: 0,
            }),
        };

        if let Argument::Node(size) = node.args[0] {
            if let NodeKind::Number(declared) = ast[size].kind {
                if declared < bytes.len() as u64 {
                    let bytes = bytes.len();
                    return self.fail(id, EmitError::BufferSize { declared, bytes });
                }
            }
        }

        self.table.pkg_start(&[BUFFER_OP]);
        match node.args[0] {
            Argument::Null => self.table.integer(bytes.len() as u64),
            ref size => self.argument(id, size)?,
        }

        self.table.bytes(bytes);
        self.finish(id)
    }

    /// Buffer de bytes opacos con tamaño implícito.
    fn opaque_buffer(&mut self, id: NodeId, bytes: &[u8]) -> Emit<()> {
        self.table.pkg_start(&[BUFFER_OP]);
        self.table.integer(bytes.len() as u64);
        self.table.bytes(bytes);
        self.finish(id)
    }

    /// `PkgLength` de una unidad de campo, que no se cuenta a sí mismo.
    fn length(&mut self, id: NodeId, bits: u64) -> Emit<()> {
        self.encode(id, |table| {
            table.bytes(&aml::pkg_length(bits as usize, false)?);
            Ok(())
        })
    }

    fn finish(&mut self, id: NodeId) -> Emit<()> {
        self.encode(id, Table::pkg_finish)
    }

    fn encode<F>(&mut self, id: NodeId, encode: F) -> Emit<()>
    where
        F: FnOnce(&mut Table) -> Result<(), EncodeError>,
    {
        let location = &self.ast[id].location;
        encode(&mut self.table).map_err(|error| Located::at(error.into(), location.clone()))
    }

    fn fail<T>(&self, id: NodeId, error: EmitError) -> Emit<T> {
        Err(Located::at(error, self.ast[id].location.clone()))
    }
}

fn is_create_field(op: Op) -> bool {
    matches!(
        op,
        Op::CreateBitField
            | Op::CreateByteField
            | Op::CreateWordField
            | Op::CreateDWordField
            | Op::CreateQWordField
    )
}
