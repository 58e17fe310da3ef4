//! Tabla de operadores.
//!
//! Cada operador de ASL que el compilador reconoce tiene exactamente un
//! [`Descriptor`] en [`OPERATORS`], indexado por el discriminante de [`Op`].
//! El descriptor declara los tipos de los argumentos obligatorios, los
//! argumentos opcionales con sus valores por omisión, si el operador abre
//! un scope léxico o registra un nombre en el namespace, y si el cuerpo del
//! operador requiere un analizador especializado ([`Hook`]).
//!
//! El parser genérico de argumentos en [`crate::parse`] se rige únicamente
//! por esta tabla.

use bitflags::bitflags;

use crate::ast::Argument;

bitflags! {
    /// Propiedades de un operador.
    pub struct OpFlags: u8 {
        /// El operador es seguido por `{ ... }` con una lista de sentencias.
        const NEW_SCOPE = 0x01;

        /// Uno de los argumentos es un nombre que se inserta en el namespace.
        const REGISTERS_NAME = 0x02;
    }
}

const NONE: OpFlags = OpFlags::empty();
const SCOPED: OpFlags = OpFlags::NEW_SCOPE;
const NAMED: OpFlags = OpFlags::REGISTERS_NAME;
const NAMED_SCOPE: OpFlags =
    OpFlags::from_bits_truncate(OpFlags::NEW_SCOPE.bits() | OpFlags::REGISTERS_NAME.bits());

/// Tipo declarado de un argumento.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ArgType {
    /// Expresión arbitraria.
    TermArg,

    /// Expresión que puede omitirse; por omisión es nula.
    Target,

    NameString,
    U8,
    U16,
    U32,
    U64,

    /// Cantidad de argumentos de un método, `[0, 7]`.
    ArgCount,

    /// Nivel de sincronización, `[0, 15]`.
    SyncLevel,

    StringLiteral,

    /// Literal de cadena con un UUID canónico.
    Uuid,

    /// Literal de cadena con un identificador EISA comprimible.
    EisaId,

    RegionSpace,
    AccessType,
    LockRule,
    UpdateRule,
    SerializeRule,
    ObjectType,
}

/// Valor por omisión de un argumento opcional.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DefaultValue {
    Null,
    U8(u8),
    U32(u32),
    Serialize(SerializeRule),
    ObjType(ObjectType),
}

impl From<DefaultValue> for Argument {
    fn from(value: DefaultValue) -> Self {
        match value {
            DefaultValue::Null => Argument::Null,
            DefaultValue::U8(value) => Argument::U8(value),
            DefaultValue::U32(value) => Argument::U32(value),
            DefaultValue::Serialize(rule) => Argument::Serialize(rule),
            DefaultValue::ObjType(typ) => Argument::ObjType(typ),
        }
    }
}

/// Analizadores especializados para cuerpos de operadores.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Hook {
    /// `{ Offset(n), NAME, bits, ... }`
    Fields,

    /// `{ Memory32Fixed(...), IRQ(...) { ... }, ... }`
    ResourceTemplate,

    /// `{ term, term, ... }`
    Package,

    /// `{ byte, byte, ... }` o `{ "string" }`
    Buffer,
}

/// Metadatos de un operador.
#[derive(Debug)]
pub struct Descriptor {
    pub op: Op,
    pub name: &'static str,
    pub opcode: &'static [u8],
    pub required: &'static [ArgType],
    pub optional: &'static [(ArgType, DefaultValue)],
    pub flags: OpFlags,
    pub name_slot: usize,
    pub hook: Option<Hook>,
}

impl Descriptor {
    /// Cantidad total de argumentos de un nodo de este operador.
    pub fn arity(&self) -> usize {
        self.required.len() + self.optional.len()
    }

    /// Tipo declarado para una posición de argumento.
    pub fn arg_type(&self, slot: usize) -> Option<ArgType> {
        match slot.checked_sub(self.required.len()) {
            None => self.required.get(slot).copied(),
            Some(optional) => self.optional.get(optional).map(|&(typ, _)| typ),
        }
    }

    const fn hook(self, hook: Hook) -> Self {
        Descriptor {
            hook: Some(hook),
            ..self
        }
    }

    const fn name_slot(self, name_slot: usize) -> Self {
        Descriptor { name_slot, ..self }
    }
}

const fn op(
    op: Op,
    name: &'static str,
    opcode: &'static [u8],
    required: &'static [ArgType],
    optional: &'static [(ArgType, DefaultValue)],
    flags: OpFlags,
) -> Descriptor {
    Descriptor {
        op,
        name,
        opcode,
        required,
        optional,
        flags,
        name_slot: 0,
        hook: None,
    }
}

/// Operadores reconocidos.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Op {
    Scope,
    Device,
    Processor,
    Method,
    Name,
    External,
    Mutex,
    Event,
    OperationRegion,
    Field,
    IndexField,
    CreateBitField,
    CreateByteField,
    CreateWordField,
    CreateDWordField,
    CreateQWordField,
    Package,
    Buffer,
    ResourceTemplate,
    ToUuid,
    EisaId,
    Unicode,
    Zero,
    One,
    Ones,
    If,
    Else,
    While,
    Return,
    Break,
    Continue,
    Noop,
    BreakPoint,
    Sleep,
    Stall,
    Acquire,
    Release,
    Notify,
    LAnd,
    LOr,
    LNot,
    LEqual,
    LGreater,
    LGreaterEqual,
    LLess,
    LLessEqual,
    LNotEqual,
    Add,
    Subtract,
    Multiply,
    Divide,
    Mod,
    And,
    Nand,
    Nor,
    Or,
    Xor,
    Not,
    ShiftLeft,
    ShiftRight,
    Increment,
    Decrement,
    FindSetLeftBit,
    FindSetRightBit,
    Store,
    RefOf,
    DerefOf,
    CondRefOf,
    SizeOf,
    Index,
    Concatenate,
    ConcatenateResTemplate,
}

impl Op {
    /// Obtiene el descriptor de este operador.
    pub fn descriptor(self) -> &'static Descriptor {
        &OPERATORS[self as usize]
    }

    /// Busca un operador por su ortografía, sin distinción de mayúsculas.
    pub fn lookup(word: &str) -> Option<Op> {
        let word = crate::lex::NoCase::new(word);
        OPERATORS
            .iter()
            .find(|descriptor| crate::lex::NoCase::new(descriptor.name) == word)
            .map(|descriptor| descriptor.op)
    }
}

impl std::fmt::Display for Op {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.write_str(self.descriptor().name)
    }
}

keywords! {
    /// Espacio de direcciones de una región de operación.
    pub enum RegionSpace ("region space") {
        SystemMemory = "SystemMemory" => 0x00,
        SystemIo = "SystemIO" => 0x01,
        PciConfig = "PCI_Config" => 0x02,
        EmbeddedControl = "EmbeddedControl" => 0x03,
        SmBus = "SMBus" => 0x04,
        SystemCmos = "SystemCMOS" => 0x05,
        PciBarTarget = "PciBarTarget" => 0x06,
        Ipmi = "IPMI" => 0x07,
        GeneralPurposeIo = "GeneralPurposeIO" => 0x08,
        GenericSerialBus = "GenericSerialBus" => 0x09,
        Pcc = "PCC" => 0x0a,
    }
}

keywords! {
    /// Ancho de acceso de una lista de campos.
    pub enum AccessType ("access type") {
        AnyAcc = "AnyAcc" => 0,
        ByteAcc = "ByteAcc" => 1,
        WordAcc = "WordAcc" => 2,
        DWordAcc = "DWordAcc" => 3,
        QWordAcc = "QWordAcc" => 4,
        BufferAcc = "BufferAcc" => 5,
    }
}

keywords! {
    pub enum LockRule ("lock rule") {
        NoLock = "NoLock" => 0,
        Lock = "Lock" => 1,
    }
}

keywords! {
    pub enum UpdateRule ("update rule") {
        Preserve = "Preserve" => 0,
        WriteAsOnes = "WriteAsOnes" => 1,
        WriteAsZeros = "WriteAsZeros" => 2,
    }
}

keywords! {
    pub enum SerializeRule ("serialize rule") {
        NotSerialized = "NotSerialized" => 0,
        Serialized = "Serialized" => 1,
    }
}

keywords! {
    /// Tipo de objeto declarado por `External`.
    pub enum ObjectType ("object type") {
        UnknownObj = "UnknownObj" => 0,
        IntObj = "IntObj" => 1,
        StrObj = "StrObj" => 2,
        BuffObj = "BuffObj" => 3,
        PkgObj = "PkgObj" => 4,
        FieldUnitObj = "FieldUnitObj" => 5,
        DeviceObj = "DeviceObj" => 6,
        EventObj = "EventObj" => 7,
        MethodObj = "MethodObj" => 8,
        MutexObj = "MutexObj" => 9,
        OpRegionObj = "OpRegionObj" => 10,
        PowerResObj = "PowerResObj" => 11,
        ProcessorObj = "ProcessorObj" => 12,
        ThermalZoneObj = "ThermalZoneObj" => 13,
        BuffFieldObj = "BuffFieldObj" => 14,
    }
}

use ArgType::*;

const T1: &[ArgType] = &[TermArg];
const T2: &[ArgType] = &[TermArg, TermArg];
const NAME: &[ArgType] = &[NameString];
const NO_ARGS: &[ArgType] = &[];
const NO_OPTIONALS: &[(ArgType, DefaultValue)] = &[];
const TARGET: &[(ArgType, DefaultValue)] = &[(Target, DefaultValue::Null)];
const CREATE_FIELD: &[ArgType] = &[TermArg, TermArg, NameString];

/// Tabla de operadores, en el mismo orden que [`Op`].
pub static OPERATORS: &[Descriptor] = &[
    op(Op::Scope, "Scope", &[0x10], NAME, NO_OPTIONALS, NAMED_SCOPE),
    op(Op::Device, "Device", &[0x5b, 0x82], NAME, NO_OPTIONALS, NAMED_SCOPE),
    op(
        Op::Processor,
        "Processor",
        &[0x5b, 0x83],
        &[NameString, U8],
        &[(U32, DefaultValue::U32(0)), (U8, DefaultValue::U8(0))],
        NAMED_SCOPE,
    ),
    op(
        Op::Method,
        "Method",
        &[0x14],
        NAME,
        &[
            (ArgCount, DefaultValue::U8(0)),
            (
                ArgType::SerializeRule,
                DefaultValue::Serialize(SerializeRule::NotSerialized),
            ),
            (SyncLevel, DefaultValue::U8(0)),
        ],
        NAMED_SCOPE,
    ),
    op(Op::Name, "Name", &[0x08], &[NameString, TermArg], NO_OPTIONALS, NAMED),
    op(
        Op::External,
        "External",
        &[0x15],
        NAME,
        &[
            (
                ArgType::ObjectType,
                DefaultValue::ObjType(ObjectType::UnknownObj),
            ),
            (ArgCount, DefaultValue::U8(0)),
        ],
        NAMED,
    ),
    op(
        Op::Mutex,
        "Mutex",
        &[0x5b, 0x01],
        NAME,
        &[(SyncLevel, DefaultValue::U8(0))],
        NAMED,
    ),
    op(Op::Event, "Event", &[0x5b, 0x02], NAME, NO_OPTIONALS, NAMED),
    op(
        Op::OperationRegion,
        "OperationRegion",
        &[0x5b, 0x80],
        &[NameString, ArgType::RegionSpace, TermArg, TermArg],
        NO_OPTIONALS,
        NAMED,
    ),
    op(
        Op::Field,
        "Field",
        &[0x5b, 0x81],
        &[
            NameString,
            ArgType::AccessType,
            ArgType::LockRule,
            ArgType::UpdateRule,
        ],
        NO_OPTIONALS,
        NONE,
    )
    .hook(Hook::Fields),
    op(
        Op::IndexField,
        "IndexField",
        &[0x5b, 0x86],
        &[
            NameString,
            NameString,
            ArgType::AccessType,
            ArgType::LockRule,
            ArgType::UpdateRule,
        ],
        NO_OPTIONALS,
        NONE,
    )
    .hook(Hook::Fields),
    op(Op::CreateBitField, "CreateBitField", &[0x8d], CREATE_FIELD, NO_OPTIONALS, NAMED).name_slot(2),
    op(Op::CreateByteField, "CreateByteField", &[0x8c], CREATE_FIELD, NO_OPTIONALS, NAMED).name_slot(2),
    op(Op::CreateWordField, "CreateWordField", &[0x8b], CREATE_FIELD, NO_OPTIONALS, NAMED).name_slot(2),
    op(Op::CreateDWordField, "CreateDWordField", &[0x8a], CREATE_FIELD, NO_OPTIONALS, NAMED).name_slot(2),
    op(Op::CreateQWordField, "CreateQWordField", &[0x8f], CREATE_FIELD, NO_OPTIONALS, NAMED).name_slot(2),
    op(Op::Package, "Package", &[0x12], NO_ARGS, TARGET, NONE).hook(Hook::Package),
    op(Op::Buffer, "Buffer", &[0x11], NO_ARGS, TARGET, NONE).hook(Hook::Buffer),
    op(Op::ResourceTemplate, "ResourceTemplate", &[0x11], NO_ARGS, NO_OPTIONALS, NONE)
        .hook(Hook::ResourceTemplate),
    op(Op::ToUuid, "ToUUID", &[0x11], &[Uuid], NO_OPTIONALS, NONE),
    op(Op::EisaId, "EisaId", &[0x0c], &[EisaId], NO_OPTIONALS, NONE),
    op(Op::Unicode, "Unicode", &[0x11], &[StringLiteral], NO_OPTIONALS, NONE),
    op(Op::Zero, "Zero", &[0x00], NO_ARGS, NO_OPTIONALS, NONE),
    op(Op::One, "One", &[0x01], NO_ARGS, NO_OPTIONALS, NONE),
    op(Op::Ones, "Ones", &[0xff], NO_ARGS, NO_OPTIONALS, NONE),
    op(Op::If, "If", &[0xa0], T1, NO_OPTIONALS, SCOPED),
    op(Op::Else, "Else", &[0xa1], NO_ARGS, NO_OPTIONALS, SCOPED),
    op(Op::While, "While", &[0xa2], T1, NO_OPTIONALS, SCOPED),
    op(Op::Return, "Return", &[0xa4], NO_ARGS, TARGET, NONE),
    op(Op::Break, "Break", &[0xa5], NO_ARGS, NO_OPTIONALS, NONE),
    op(Op::Continue, "Continue", &[0x9f], NO_ARGS, NO_OPTIONALS, NONE),
    op(Op::Noop, "Noop", &[0xa3], NO_ARGS, NO_OPTIONALS, NONE),
    op(Op::BreakPoint, "BreakPoint", &[0xcc], NO_ARGS, NO_OPTIONALS, NONE),
    op(Op::Sleep, "Sleep", &[0x5b, 0x22], T1, NO_OPTIONALS, NONE),
    op(Op::Stall, "Stall", &[0x5b, 0x21], T1, NO_OPTIONALS, NONE),
    op(Op::Acquire, "Acquire", &[0x5b, 0x23], &[TermArg, U16], NO_OPTIONALS, NONE),
    op(Op::Release, "Release", &[0x5b, 0x27], T1, NO_OPTIONALS, NONE),
    op(Op::Notify, "Notify", &[0x86], T2, NO_OPTIONALS, NONE),
    op(Op::LAnd, "LAnd", &[0x90], T2, NO_OPTIONALS, NONE),
    op(Op::LOr, "LOr", &[0x91], T2, NO_OPTIONALS, NONE),
    op(Op::LNot, "LNot", &[0x92], T1, NO_OPTIONALS, NONE),
    op(Op::LEqual, "LEqual", &[0x93], T2, NO_OPTIONALS, NONE),
    op(Op::LGreater, "LGreater", &[0x94], T2, NO_OPTIONALS, NONE),
    op(Op::LGreaterEqual, "LGreaterEqual", &[0x92, 0x95], T2, NO_OPTIONALS, NONE),
    op(Op::LLess, "LLess", &[0x95], T2, NO_OPTIONALS, NONE),
    op(Op::LLessEqual, "LLessEqual", &[0x92, 0x94], T2, NO_OPTIONALS, NONE),
    op(Op::LNotEqual, "LNotEqual", &[0x92, 0x93], T2, NO_OPTIONALS, NONE),
    op(Op::Add, "Add", &[0x72], T2, TARGET, NONE),
    op(Op::Subtract, "Subtract", &[0x74], T2, TARGET, NONE),
    op(Op::Multiply, "Multiply", &[0x77], T2, TARGET, NONE),
    op(
        Op::Divide,
        "Divide",
        &[0x78],
        T2,
        &[(Target, DefaultValue::Null), (Target, DefaultValue::Null)],
        NONE,
    ),
    op(Op::Mod, "Mod", &[0x85], T2, TARGET, NONE),
    op(Op::And, "And", &[0x7b], T2, TARGET, NONE),
    op(Op::Nand, "Nand", &[0x7c], T2, TARGET, NONE),
    op(Op::Nor, "Nor", &[0x7e], T2, TARGET, NONE),
    op(Op::Or, "Or", &[0x7d], T2, TARGET, NONE),
    op(Op::Xor, "Xor", &[0x7f], T2, TARGET, NONE),
    op(Op::Not, "Not", &[0x80], T1, TARGET, NONE),
    op(Op::ShiftLeft, "ShiftLeft", &[0x79], T2, TARGET, NONE),
    op(Op::ShiftRight, "ShiftRight", &[0x7a], T2, TARGET, NONE),
    op(Op::Increment, "Increment", &[0x75], T1, NO_OPTIONALS, NONE),
    op(Op::Decrement, "Decrement", &[0x76], T1, NO_OPTIONALS, NONE),
    op(Op::FindSetLeftBit, "FindSetLeftBit", &[0x81], T1, TARGET, NONE),
    op(Op::FindSetRightBit, "FindSetRightBit", &[0x82], T1, TARGET, NONE),
    op(Op::Store, "Store", &[0x70], T2, NO_OPTIONALS, NONE),
    op(Op::RefOf, "RefOf", &[0x71], T1, NO_OPTIONALS, NONE),
    op(Op::DerefOf, "DerefOf", &[0x83], T1, NO_OPTIONALS, NONE),
    op(Op::CondRefOf, "CondRefOf", &[0x5b, 0x12], T1, TARGET, NONE),
    op(Op::SizeOf, "SizeOf", &[0x87], T1, NO_OPTIONALS, NONE),
    op(Op::Index, "Index", &[0x88], T2, TARGET, NONE),
    op(Op::Concatenate, "Concatenate", &[0x73], T2, TARGET, NONE),
    op(
        Op::ConcatenateResTemplate,
        "ConcatenateResTemplate",
        &[0x84],
        T2,
        TARGET,
        NONE,
    ),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_indexed_by_operator() {
        for (index, descriptor) in OPERATORS.iter().enumerate() {
            assert_eq!(descriptor.op as usize, index, "{}", descriptor.name);
            assert!(std::ptr::eq(descriptor.op.descriptor(), descriptor));
        }

        assert_eq!(
            OPERATORS.len(),
            Op::ConcatenateResTemplate as usize + 1
        );
    }

    #[test]
    fn arity_limits() {
        for descriptor in OPERATORS {
            assert!(descriptor.required.len() <= 5, "{}", descriptor.name);
            assert!(descriptor.optional.len() <= 3, "{}", descriptor.name);
            assert!(descriptor.arity() <= 8, "{}", descriptor.name);
        }
    }

    #[test]
    fn registered_names_are_name_strings() {
        for descriptor in OPERATORS {
            if descriptor.flags.contains(OpFlags::REGISTERS_NAME) {
                assert_eq!(
                    descriptor.arg_type(descriptor.name_slot),
                    Some(NameString),
                    "{}",
                    descriptor.name
                );
            }
        }
    }

    #[test]
    fn defaults_match_declared_types() {
        for descriptor in OPERATORS {
            for &(typ, default) in descriptor.optional {
                assert!(Argument::from(default).matches(typ), "{}", descriptor.name);
            }
        }
    }

    #[test]
    fn lookup_ignores_case() {
        assert_eq!(Op::lookup("DEVICE"), Some(Op::Device));
        assert_eq!(Op::lookup("touuid"), Some(Op::ToUuid));
        assert_eq!(Op::lookup("Offset"), None);
    }
}
