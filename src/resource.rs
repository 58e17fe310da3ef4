//! Plantillas de descriptores de recursos.
//!
//! Dentro de `ResourceTemplate () { ... }` cada macro describe un recurso
//! de hardware y se serializa como un descriptor empacado. Los descriptores
//! con nombre publican alias literales en el namespace, cuyos valores son
//! desplazamientos en bits relativos al inicio del buffer sellado.
//!
//! | Macro           | Descriptor                              |
//! |-----------------|-----------------------------------------|
//! | `Memory32Fixed` | `86 09 00 rw base32 len32`              |
//! | `IRQ`           | `22 mask16` o `23 mask16 flags`         |
//! | `IRQNoFlags`    | `22 mask16`                             |
//! | `IO`            | `47 decode min16 max16 align len`       |
//! | `DMA`           | `2A mask8 flags`                        |
//! | `Interrupt`     | `89 len16 flags count int32...`         |
//! | `WordIO`, `WordBusNumber` | `88 0D 00 type gflags tflags` + 5 × 16 bits |
//! | `DWordMemory`   | `87 17 00 type gflags tflags` + 5 × 32 bits |
//! | `QWordMemory`, `QWordIO` | `8A 2B 00 type gflags tflags` + 5 × 64 bits |
//!
//! Los descriptores grandes pueden terminar con un índice y el nombre de
//! la fuente del recurso. La plantilla termina con `79` y un checksum.

use std::{convert::TryFrom, rc::Rc};

use log::{debug, trace};
use thiserror::Error;

use crate::{
    error::{Classify, Status},
    lex::{Keyword, Token},
    name::{NameSeg, NameString},
    namespace::{Definition, NamespaceError},
    parse::{Parse, Parser, ParserError},
    source::{InputStream, Located},
};

keywords! {
    /// Macros de descriptores de recursos reconocidas.
    pub enum ResourceMacro ("resource macro") {
        Memory32Fixed = "Memory32Fixed",
        Irq = "IRQ",
        IrqNoFlags = "IRQNoFlags",
        Io = "IO",
        Dma = "DMA",
        Interrupt = "Interrupt",
        DWordMemory = "DWordMemory",
        QWordMemory = "QWordMemory",
        WordIo = "WordIO",
        QWordIo = "QWordIO",
        WordBusNumber = "WordBusNumber",
    }
}

keywords! {
    pub enum ReadWrite ("read/write access") {
        ReadWrite = "ReadWrite" => 1,
        ReadOnly = "ReadOnly" => 0,
    }
}

keywords! {
    pub enum DecodeWidth ("I/O decode width") {
        Decode16 = "Decode16" => 1,
        Decode10 = "Decode10" => 0,
    }
}

keywords! {
    pub enum Trigger ("interrupt trigger") {
        Edge = "Edge" => 1,
        Level = "Level" => 0,
    }
}

keywords! {
    pub enum Polarity ("interrupt polarity") {
        ActiveHigh = "ActiveHigh" => 0,
        ActiveLow = "ActiveLow" => 1,
    }
}

keywords! {
    /// Bit 0: compartido. Bit 1: puede despertar al sistema.
    pub enum Sharing ("interrupt sharing mode") {
        Exclusive = "Exclusive" => 0,
        Shared = "Shared" => 1,
        ExclusiveAndWake = "ExclusiveAndWake" => 2,
        SharedAndWake = "SharedAndWake" => 3,
    }
}

keywords! {
    pub enum DmaSpeed ("DMA channel speed") {
        Compatibility = "Compatibility" => 0,
        TypeA = "TypeA" => 1,
        TypeB = "TypeB" => 2,
        TypeF = "TypeF" => 3,
    }
}

keywords! {
    pub enum BusMaster ("bus master mode") {
        BusMaster = "BusMaster" => 1,
        NotBusMaster = "NotBusMaster" => 0,
    }
}

keywords! {
    pub enum TransferWidth ("DMA transfer width") {
        Transfer8 = "Transfer8" => 0,
        Transfer8_16 = "Transfer8_16" => 1,
        Transfer16 = "Transfer16" => 2,
    }
}

keywords! {
    pub enum ResourceUsage ("resource usage") {
        ResourceConsumer = "ResourceConsumer" => 1,
        ResourceProducer = "ResourceProducer" => 0,
    }
}

keywords! {
    pub enum AddressDecode ("address decode type") {
        PosDecode = "PosDecode" => 0,
        SubDecode = "SubDecode" => 1,
    }
}

keywords! {
    pub enum MinFixed ("minimum address fixedness") {
        MinFixed = "MinFixed" => 1,
        MinNotFixed = "MinNotFixed" => 0,
    }
}

keywords! {
    pub enum MaxFixed ("maximum address fixedness") {
        MaxFixed = "MaxFixed" => 1,
        MaxNotFixed = "MaxNotFixed" => 0,
    }
}

keywords! {
    pub enum Cacheability ("memory cacheability") {
        NonCacheable = "NonCacheable" => 0,
        Cacheable = "Cacheable" => 1,
        WriteCombining = "WriteCombining" => 2,
        Prefetchable = "Prefetchable" => 3,
    }
}

keywords! {
    pub enum MemoryType ("memory range type") {
        AddressRangeMemory = "AddressRangeMemory" => 0,
        AddressRangeReserved = "AddressRangeReserved" => 1,
        AddressRangeAcpi = "AddressRangeACPI" => 2,
        AddressRangeNvs = "AddressRangeNVS" => 3,
    }
}

keywords! {
    pub enum TranslationType ("translation type") {
        TypeStatic = "TypeStatic" => 0,
        TypeTranslation = "TypeTranslation" => 1,
    }
}

keywords! {
    pub enum IsaRanges ("ISA range type") {
        NonIsaOnlyRanges = "NonISAOnlyRanges" => 1,
        IsaOnlyRanges = "ISAOnlyRanges" => 2,
        EntireRange = "EntireRange" => 3,
    }
}

keywords! {
    pub enum TranslationDensity ("translation density") {
        DenseTranslation = "DenseTranslation" => 0,
        SparseTranslation = "SparseTranslation" => 1,
    }
}

/// Cierre que extrae una variante de [`Keyword`] para [`Parser::enumerant`].
macro_rules! pick {
    ($variant:ident) => {
        |keyword| match keyword {
            Keyword::$variant(value) => Some(value),
            _ => None,
        }
    };
}

const END_TAG: u8 = 0x79;
const EXTENDED_INTERRUPT: u8 = 0x89;

const MEMORY_SPACE: u8 = 0;
const IO_SPACE: u8 = 1;
const BUS_NUMBER_SPACE: u8 = 2;

/// Máximo de entradas en la lista de un descriptor `Interrupt`.
pub const MAX_INTERRUPTS: usize = 255;

/// Ancho de los campos numéricos de un descriptor de espacio de direcciones.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AddressWidth {
    Word,
    DWord,
    QWord,
}

impl AddressWidth {
    fn tag(self) -> u8 {
        match self {
            AddressWidth::Word => 0x88,
            AddressWidth::DWord => 0x87,
            AddressWidth::QWord => 0x8a,
        }
    }

    fn bytes(self) -> usize {
        match self {
            AddressWidth::Word => 2,
            AddressWidth::DWord => 4,
            AddressWidth::QWord => 8,
        }
    }

    fn max(self) -> u64 {
        match self {
            AddressWidth::Word => u16::MAX.into(),
            AddressWidth::DWord => u32::MAX.into(),
            AddressWidth::QWord => u64::MAX,
        }
    }
}

/// Cantidad de líneas de interrupción de un descriptor IRQ.
pub const IRQ_LINES: u64 = 16;

/// Cantidad de canales de un descriptor DMA.
pub const DMA_CHANNELS: u64 = 8;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("Value {value:#x} for {what} exceeds the maximum of {max:#x}")]
    OutOfRange {
        what: &'static str,
        value: u64,
        max: u64,
    },

    #[error(
        "Memory window at {base:#x} with length {length:#x} \
         exceeds the 32-bit address space"
    )]
    AddressOverflow { base: u64, length: u64 },

    #[error("Duplicate {what} {value} in descriptor list")]
    Duplicate { what: &'static str, value: u64 },

    #[error("Minimum address {min:#x} is above maximum address {max:#x}")]
    InvertedRange { min: u64, max: u64 },

    #[error("Range length {length:#x} does not fit between {min:#x} and {max:#x}")]
    LengthExceedsWindow { length: u64, min: u64, max: u64 },

    #[error("Resource source index given without a resource source")]
    SourceIndexWithoutSource,

    #[error("Interrupt list must not be empty")]
    EmptyInterruptList,

    #[error("Interrupt list exceeds the limit of {} entries", MAX_INTERRUPTS)]
    TooManyInterrupts,

    #[error("Descriptor body of {0} bytes exceeds the 16-bit length field")]
    DescriptorTooLong(usize),
}

impl Classify for ResourceError {
    fn status(&self) -> Status {
        match self {
            ResourceError::TooManyInterrupts | ResourceError::DescriptorTooLong(_) => {
                Status::ResourceExhaustion
            }

            _ => Status::Semantic,
        }
    }
}

/// Búfer de descriptores, solo de escritura al final.
///
/// Sellar el búfer lo consume, por lo que no es posible agregar
/// descriptores después del marcador final.
#[derive(Debug, Default)]
pub struct ResourceBuilder {
    bytes: Vec<u8>,
}

impl ResourceBuilder {
    pub fn new() -> Self {
        ResourceBuilder::default()
    }

    /// Desplazamiento en bytes del siguiente descriptor.
    pub fn offset(&self) -> usize {
        self.bytes.len()
    }

    pub fn push(&mut self, descriptor: &[u8]) {
        self.bytes.extend_from_slice(descriptor);
    }

    /// Agrega el marcador final y su checksum.
    pub fn seal(mut self) -> Vec<u8> {
        self.bytes.push(END_TAG);

        let sum = self.bytes.iter().fold(0u8, |sum, &byte| sum.wrapping_add(byte));
        self.bytes.push(sum.wrapping_neg());

        self.bytes
    }
}

/// Alias de un campo dentro de un descriptor: nombre, bit inicial y ancho.
type Alias = (NameSeg, u64, u64);

const fn seg(bytes: &[u8; 4]) -> NameSeg {
    NameSeg::from_bytes(*bytes)
}

const MEMORY32_FIXED_ALIASES: &[Alias] = &[
    (seg(b"_RW_"), 3 * 8, 1),
    (seg(b"_BAS"), 4 * 8, 32),
    (seg(b"_LEN"), 8 * 8, 32),
];

const IRQ_ALIASES: &[Alias] = &[(seg(b"_INT"), 8, 16)];

const IRQ_FLAG_ALIASES: &[Alias] = &[
    (seg(b"_INT"), 8, 16),
    (seg(b"_HE_"), 3 * 8, 1),
    (seg(b"_LL_"), 3 * 8 + 3, 1),
    (seg(b"_SHR"), 3 * 8 + 4, 2),
];

const IO_ALIASES: &[Alias] = &[
    (seg(b"_DEC"), 8, 1),
    (seg(b"_MIN"), 2 * 8, 16),
    (seg(b"_MAX"), 4 * 8, 16),
    (seg(b"_ALN"), 6 * 8, 8),
    (seg(b"_LEN"), 7 * 8, 8),
];

const DMA_ALIASES: &[Alias] = &[
    (seg(b"_DMA"), 8, 8),
    (seg(b"_SIZ"), 2 * 8, 2),
    (seg(b"_BM_"), 2 * 8 + 2, 1),
    (seg(b"_TYP"), 2 * 8 + 5, 2),
];

const MEMORY_ALIASES: &[Alias] = &[
    (seg(b"_RW_"), 5 * 8, 1),
    (seg(b"_MEM"), 5 * 8 + 1, 2),
    (seg(b"_MTP"), 5 * 8 + 3, 2),
    (seg(b"_TTP"), 5 * 8 + 5, 1),
];

const IO_RANGE_ALIASES: &[Alias] = &[
    (seg(b"_RNG"), 5 * 8, 2),
    (seg(b"_TTP"), 5 * 8 + 4, 1),
    (seg(b"_TRS"), 5 * 8 + 5, 1),
];

/// Alias de un descriptor de espacio de direcciones: banderas generales,
/// `specific` para las banderas del tipo y los cinco campos numéricos.
fn address_aliases(width: AddressWidth, specific: &[Alias]) -> Vec<Alias> {
    let mut aliases = vec![
        (seg(b"_DEC"), 4 * 8 + 1, 1),
        (seg(b"_MIF"), 4 * 8 + 2, 1),
        (seg(b"_MAF"), 4 * 8 + 3, 1),
    ];

    aliases.extend_from_slice(specific);

    let bits = width.bytes() as u64 * 8;
    let fields = [b"_GRA", b"_MIN", b"_MAX", b"_TRA", b"_LEN"];
    for (index, name) in fields.iter().enumerate() {
        aliases.push((seg(name), 6 * 8 + index as u64 * bits, bits));
    }

    aliases
}

/// Banderas generales de un descriptor de espacio de direcciones.
fn general_flags(
    usage: Option<ResourceUsage>,
    decode: Option<AddressDecode>,
    min: Option<MinFixed>,
    max: Option<MaxFixed>,
) -> u8 {
    usage.unwrap_or(ResourceUsage::ResourceConsumer).encoding()
        | decode.unwrap_or(AddressDecode::PosDecode).encoding() << 1
        | min.unwrap_or(MinFixed::MinNotFixed).encoding() << 2
        | max.unwrap_or(MaxFixed::MaxNotFixed).encoding() << 3
}

/// Índice y nombre de la fuente del recurso, con terminador nulo.
fn append_source(body: &mut Vec<u8>, source: Option<(u8, Rc<str>)>) {
    if let Some((index, source)) = source {
        body.push(index);
        body.extend_from_slice(source.as_bytes());
        body.push(0);
    }
}

impl<S: InputStream> Parser<S> {
    /// `{ macro, macro, ... }`, retornando el búfer sellado.
    pub(crate) fn resource_template(&mut self) -> Parse<Vec<u8>> {
        self.expect(Token::OpenCurly)?;

        let mut builder = ResourceBuilder::new();
        loop {
            match self.next("a resource descriptor macro or `}`")?.into_inner() {
                Token::CloseCurly => break,
                Token::Comma => continue,

                Token::Keyword(Keyword::Resource(resource)) => {
                    trace!("{} descriptor at offset {}", resource, builder.offset());
                    self.resource(resource, &mut builder)?;
                }

                found => {
                    return self.fail(ParserError::Expected(
                        "a resource descriptor macro".into(),
                        found,
                    ))
                }
            }
        }

        let sealed = builder.seal();
        debug!("Sealed resource template of {} bytes", sealed.len());

        Ok(sealed)
    }

    fn resource(&mut self, resource: ResourceMacro, builder: &mut ResourceBuilder) -> Parse<()> {
        match resource {
            ResourceMacro::Memory32Fixed => self.memory32_fixed(builder),
            ResourceMacro::Irq => self.irq(builder),
            ResourceMacro::IrqNoFlags => self.irq_no_flags(builder),
            ResourceMacro::Io => self.io(builder),
            ResourceMacro::Dma => self.dma(builder),
            ResourceMacro::Interrupt => self.interrupt(builder),
            ResourceMacro::DWordMemory => self.address_memory(AddressWidth::DWord, builder),
            ResourceMacro::QWordMemory => self.address_memory(AddressWidth::QWord, builder),
            ResourceMacro::WordIo => self.address_io(AddressWidth::Word, builder),
            ResourceMacro::QWordIo => self.address_io(AddressWidth::QWord, builder),
            ResourceMacro::WordBusNumber => self.bus_number(builder),
        }
    }

    /// `Memory32Fixed(ReadWrite|ReadOnly, base, length [, NAME])`
    fn memory32_fixed(&mut self, builder: &mut ResourceBuilder) -> Parse<()> {
        self.expect(Token::OpenParen)?;

        let access = self.enumerant(ReadWrite::WHAT, pick!(ReadWrite))?;

        self.expect(Token::Comma)?;
        let base = self.limited("base address", u32::MAX.into())?;

        self.expect(Token::Comma)?;
        let length = self.limited("window length", u32::MAX.into())?;

        if base + length > u64::from(u32::MAX) {
            return self.fail(ResourceError::AddressOverflow { base, length });
        }

        let name = self.descriptor_name(false)?;
        self.expect(Token::CloseParen)?;

        let mut descriptor = vec![0x86, 0x09, 0x00, access.encoding()];
        descriptor.extend_from_slice(&(base as u32).to_le_bytes());
        descriptor.extend_from_slice(&(length as u32).to_le_bytes());

        self.publish(name, builder, &descriptor, MEMORY32_FIXED_ALIASES)
    }

    /// `IRQ(Edge|Level, ActiveHigh|ActiveLow [, sharing [, NAME]]) { lines }`
    fn irq(&mut self, builder: &mut ResourceBuilder) -> Parse<()> {
        self.expect(Token::OpenParen)?;

        let trigger = self.enumerant(Trigger::WHAT, pick!(Trigger))?;

        self.expect(Token::Comma)?;
        let polarity = self.enumerant(Polarity::WHAT, pick!(Polarity))?;

        let sharing =
            self.optional_slot(false, |parser| parser.enumerant(Sharing::WHAT, pick!(Sharing)))?;

        let name = self.descriptor_name(false)?;
        self.expect(Token::CloseParen)?;

        let mask = self.line_list("interrupt line", IRQ_LINES)? as u16;
        let sharing = sharing.unwrap_or(Sharing::Exclusive);

        let flags = trigger.encoding() | polarity.encoding() << 3 | sharing.encoding() << 4;
        let [low, high] = mask.to_le_bytes();

        // La configuración por omisión cabe en la forma corta
        if flags == Trigger::Edge.encoding() {
            self.publish(name, builder, &[0x22, low, high], IRQ_ALIASES)
        } else {
            self.publish(name, builder, &[0x23, low, high, flags], IRQ_FLAG_ALIASES)
        }
    }

    /// `IRQNoFlags([NAME]) { lines }`
    fn irq_no_flags(&mut self, builder: &mut ResourceBuilder) -> Parse<()> {
        let name = if self.accept(&Token::OpenParen)? {
            let name = self.descriptor_name(true)?;
            self.expect(Token::CloseParen)?;
            name
        } else {
            None
        };

        let mask = self.line_list("interrupt line", IRQ_LINES)? as u16;
        let [low, high] = mask.to_le_bytes();

        self.publish(name, builder, &[0x22, low, high], IRQ_ALIASES)
    }

    /// `IO(Decode16|Decode10, min, max, alignment, length [, NAME])`
    fn io(&mut self, builder: &mut ResourceBuilder) -> Parse<()> {
        self.expect(Token::OpenParen)?;

        let decode = self.enumerant(DecodeWidth::WHAT, pick!(Decode))?;

        self.expect(Token::Comma)?;
        let min = self.limited("minimum I/O address", u16::MAX.into())? as u16;

        self.expect(Token::Comma)?;
        let max = self.limited("maximum I/O address", u16::MAX.into())? as u16;

        self.expect(Token::Comma)?;
        let alignment = self.limited("I/O alignment", u8::MAX.into())? as u8;

        self.expect(Token::Comma)?;
        let length = self.limited("I/O range length", u8::MAX.into())? as u8;

        let name = self.descriptor_name(false)?;
        self.expect(Token::CloseParen)?;

        let [min_low, min_high] = min.to_le_bytes();
        let [max_low, max_high] = max.to_le_bytes();

        let descriptor = [
            0x47,
            decode.encoding(),
            min_low,
            min_high,
            max_low,
            max_high,
            alignment,
            length,
        ];

        self.publish(name, builder, &descriptor, IO_ALIASES)
    }

    /// `DMA(speed, BusMaster|NotBusMaster, width [, NAME]) { channels }`
    fn dma(&mut self, builder: &mut ResourceBuilder) -> Parse<()> {
        self.expect(Token::OpenParen)?;

        let speed = self.enumerant(DmaSpeed::WHAT, pick!(DmaSpeed))?;

        self.expect(Token::Comma)?;
        let master = self.enumerant(BusMaster::WHAT, pick!(BusMaster))?;

        self.expect(Token::Comma)?;
        let width = self.enumerant(TransferWidth::WHAT, pick!(Transfer))?;

        let name = self.descriptor_name(false)?;
        self.expect(Token::CloseParen)?;

        let mask = self.line_list("DMA channel", DMA_CHANNELS)? as u8;
        let flags = speed.encoding() << 5 | master.encoding() << 2 | width.encoding();

        self.publish(name, builder, &[0x2a, mask, flags], DMA_ALIASES)
    }

    /// `Interrupt([usage], trigger, polarity [, sharing [, index [, source [, NAME]]]]) { n, ... }`
    fn interrupt(&mut self, builder: &mut ResourceBuilder) -> Parse<()> {
        self.expect(Token::OpenParen)?;

        let usage =
            self.optional_slot(true, |parser| parser.enumerant(ResourceUsage::WHAT, pick!(Usage)))?;

        self.expect(Token::Comma)?;
        let trigger = self.enumerant(Trigger::WHAT, pick!(Trigger))?;

        self.expect(Token::Comma)?;
        let polarity = self.enumerant(Polarity::WHAT, pick!(Polarity))?;

        let sharing =
            self.optional_slot(false, |parser| parser.enumerant(Sharing::WHAT, pick!(Sharing)))?;

        let source = self.resource_source()?;
        let name = self.descriptor_name(false)?;
        self.expect(Token::CloseParen)?;

        let interrupts = self.interrupt_list()?;

        let flags = usage.unwrap_or(ResourceUsage::ResourceConsumer).encoding()
            | trigger.encoding() << 1
            | polarity.encoding() << 2
            | sharing.unwrap_or(Sharing::Exclusive).encoding() << 3;

        let mut body = vec![flags, interrupts.len() as u8];
        for interrupt in &interrupts {
            body.extend_from_slice(&interrupt.to_le_bytes());
        }

        append_source(&mut body, source);
        let descriptor = self.large_item(EXTENDED_INTERRUPT, body)?;

        let aliases = [
            (seg(b"_HE_"), 3 * 8 + 1, 1),
            (seg(b"_LL_"), 3 * 8 + 2, 1),
            (seg(b"_SHR"), 3 * 8 + 3, 2),
            (seg(b"_INT"), 5 * 8, interrupts.len() as u64 * 32),
        ];

        self.publish(name, builder, &descriptor, &aliases)
    }

    /// `DWordMemory`/`QWordMemory`: `([usage], [decode], [min], [max],
    /// [cache], ReadWrite|ReadOnly, granularity, min, max, translation,
    /// length [, index [, source [, NAME [, type [, translation]]]]])`
    fn address_memory(&mut self, width: AddressWidth, builder: &mut ResourceBuilder) -> Parse<()> {
        self.expect(Token::OpenParen)?;

        let usage =
            self.optional_slot(true, |parser| parser.enumerant(ResourceUsage::WHAT, pick!(Usage)))?;
        let decode = self.optional_slot(false, |parser| {
            parser.enumerant(AddressDecode::WHAT, pick!(AddressDecode))
        })?;
        let min = self.optional_slot(false, |parser| {
            parser.enumerant(MinFixed::WHAT, pick!(MinFixed))
        })?;
        let max = self.optional_slot(false, |parser| {
            parser.enumerant(MaxFixed::WHAT, pick!(MaxFixed))
        })?;
        let cache =
            self.optional_slot(false, |parser| parser.enumerant(Cacheability::WHAT, pick!(Cache)))?;

        self.expect(Token::Comma)?;
        let access = self.enumerant(ReadWrite::WHAT, pick!(ReadWrite))?;

        let values = self.address_values(width)?;
        let source = self.resource_source()?;
        let name = self.descriptor_name(false)?;

        let memory = self.optional_slot(false, |parser| {
            parser.enumerant(MemoryType::WHAT, pick!(MemoryType))
        })?;
        let translation = self.optional_slot(false, |parser| {
            parser.enumerant(TranslationType::WHAT, pick!(Translation))
        })?;

        self.expect(Token::CloseParen)?;

        let general = general_flags(usage, decode, min, max);
        let specific = access.encoding()
            | cache.unwrap_or(Cacheability::NonCacheable).encoding() << 1
            | memory.unwrap_or(MemoryType::AddressRangeMemory).encoding() << 3
            | translation.unwrap_or(TranslationType::TypeStatic).encoding() << 5;

        let descriptor =
            self.address_space(MEMORY_SPACE, width, general, specific, values, source)?;
        self.publish(name, builder, &descriptor, &address_aliases(width, MEMORY_ALIASES))
    }

    /// `WordIO`/`QWordIO`: `([usage], [min], [max], [decode], [ranges],
    /// granularity, min, max, translation, length [, index [, source
    /// [, NAME [, translation [, density]]]]])`
    fn address_io(&mut self, width: AddressWidth, builder: &mut ResourceBuilder) -> Parse<()> {
        self.expect(Token::OpenParen)?;

        let usage =
            self.optional_slot(true, |parser| parser.enumerant(ResourceUsage::WHAT, pick!(Usage)))?;
        let min = self.optional_slot(false, |parser| {
            parser.enumerant(MinFixed::WHAT, pick!(MinFixed))
        })?;
        let max = self.optional_slot(false, |parser| {
            parser.enumerant(MaxFixed::WHAT, pick!(MaxFixed))
        })?;
        let decode = self.optional_slot(false, |parser| {
            parser.enumerant(AddressDecode::WHAT, pick!(AddressDecode))
        })?;
        let ranges = self.optional_slot(false, |parser| {
            parser.enumerant(IsaRanges::WHAT, pick!(IsaRanges))
        })?;

        let values = self.address_values(width)?;
        let source = self.resource_source()?;
        let name = self.descriptor_name(false)?;

        let translation = self.optional_slot(false, |parser| {
            parser.enumerant(TranslationType::WHAT, pick!(Translation))
        })?;
        let density = self.optional_slot(false, |parser| {
            parser.enumerant(TranslationDensity::WHAT, pick!(Density))
        })?;

        self.expect(Token::CloseParen)?;

        let general = general_flags(usage, decode, min, max);
        let specific = ranges.unwrap_or(IsaRanges::EntireRange).encoding()
            | translation.unwrap_or(TranslationType::TypeStatic).encoding() << 4
            | density.unwrap_or(TranslationDensity::DenseTranslation).encoding() << 5;

        let descriptor = self.address_space(IO_SPACE, width, general, specific, values, source)?;
        self.publish(name, builder, &descriptor, &address_aliases(width, IO_RANGE_ALIASES))
    }

    /// `WordBusNumber([usage], [min], [max], [decode], granularity, min,
    /// max, translation, length [, index [, source [, NAME]]])`
    fn bus_number(&mut self, builder: &mut ResourceBuilder) -> Parse<()> {
        self.expect(Token::OpenParen)?;

        let usage =
            self.optional_slot(true, |parser| parser.enumerant(ResourceUsage::WHAT, pick!(Usage)))?;
        let min = self.optional_slot(false, |parser| {
            parser.enumerant(MinFixed::WHAT, pick!(MinFixed))
        })?;
        let max = self.optional_slot(false, |parser| {
            parser.enumerant(MaxFixed::WHAT, pick!(MaxFixed))
        })?;
        let decode = self.optional_slot(false, |parser| {
            parser.enumerant(AddressDecode::WHAT, pick!(AddressDecode))
        })?;

        let width = AddressWidth::Word;
        let values = self.address_values(width)?;
        let source = self.resource_source()?;
        let name = self.descriptor_name(false)?;
        self.expect(Token::CloseParen)?;

        let general = general_flags(usage, decode, min, max);
        let descriptor = self.address_space(BUS_NUMBER_SPACE, width, general, 0, values, source)?;

        self.publish(name, builder, &descriptor, &address_aliases(width, &[]))
    }

    /// Granularidad, mínimo, máximo, traslación y longitud.
    ///
    /// El mínimo no puede superar al máximo y una longitud distinta de
    /// cero debe caber en la ventana `[min, max]`.
    fn address_values(&mut self, width: AddressWidth) -> Parse<[u64; 5]> {
        const FIELDS: [&str; 5] = [
            "address granularity",
            "minimum address",
            "maximum address",
            "translation offset",
            "range length",
        ];

        let mut values = [0; 5];
        for (value, &what) in values.iter_mut().zip(FIELDS.iter()) {
            self.expect(Token::Comma)?;
            *value = self.limited(what, width.max())?;
        }

        let [_, min, max, _, length] = values;
        if min > max {
            return self.fail(ResourceError::InvertedRange { min, max });
        }

        if length != 0 && u128::from(length) > u128::from(max - min) + 1 {
            return self.fail(ResourceError::LengthExceedsWindow { length, min, max });
        }

        Ok(values)
    }

    /// `[, index [, "source"]]`
    fn resource_source(&mut self) -> Parse<Option<(u8, Rc<str>)>> {
        let index = self.optional_slot(false, |parser| {
            parser.limited("resource source index", u8::MAX.into())
        })?;

        let source = self.optional_slot(false, |parser| parser.string("a resource source"))?;

        match (index, source) {
            (index, Some(source)) => Ok(Some((index.unwrap_or(0) as u8, source))),
            (Some(_), None) => self.fail(ResourceError::SourceIndexWithoutSource),
            (None, None) => Ok(None),
        }
    }

    /// `{ n, n, ... }` con números de interrupción de 32 bits.
    fn interrupt_list(&mut self) -> Parse<Vec<u32>> {
        self.expect(Token::OpenCurly)?;

        let mut interrupts: Vec<u32> = Vec::new();
        while !self.accept(&Token::CloseCurly)? {
            if !interrupts.is_empty() {
                self.expect(Token::Comma)?;
            }

            if interrupts.len() == MAX_INTERRUPTS {
                return self.fail(ResourceError::TooManyInterrupts);
            }

            let interrupt = self.limited("interrupt number", u32::MAX.into())? as u32;
            if interrupts.contains(&interrupt) {
                return self.fail(ResourceError::Duplicate {
                    what: "interrupt",
                    value: interrupt.into(),
                });
            }

            interrupts.push(interrupt);
        }

        if interrupts.is_empty() {
            return self.fail(ResourceError::EmptyInterruptList);
        }

        Ok(interrupts)
    }

    /// Cuerpo de un descriptor de espacio de direcciones, ya con cabecera.
    fn address_space(
        &self,
        space: u8,
        width: AddressWidth,
        general: u8,
        specific: u8,
        values: [u64; 5],
        source: Option<(u8, Rc<str>)>,
    ) -> Parse<Vec<u8>> {
        let mut body = vec![space, general, specific];
        for value in &values {
            body.extend_from_slice(&value.to_le_bytes()[..width.bytes()]);
        }

        append_source(&mut body, source);
        self.large_item(width.tag(), body)
    }

    /// Descriptor grande: etiqueta, longitud de 16 bits y contenido.
    fn large_item(&self, tag: u8, body: Vec<u8>) -> Parse<Vec<u8>> {
        let length = match u16::try_from(body.len()) {
            Ok(length) => length,
            Err(_) => return self.fail(ResourceError::DescriptorTooLong(body.len())),
        };

        let mut descriptor = Vec::with_capacity(3 + body.len());
        descriptor.push(tag);
        descriptor.extend_from_slice(&length.to_le_bytes());
        descriptor.extend_from_slice(&body);

        Ok(descriptor)
    }

    /// `{ n, n, ... }` como máscara de bits, rechazando duplicados.
    fn line_list(&mut self, what: &'static str, count: u64) -> Parse<u64> {
        self.expect(Token::OpenCurly)?;

        let mut mask = 0u64;
        let mut first = true;

        while !self.accept(&Token::CloseCurly)? {
            if !first {
                self.expect(Token::Comma)?;
            }

            first = false;

            let line = self.limited(what, count - 1)?;
            if mask & (1 << line) != 0 {
                return self.fail(ResourceError::Duplicate { what, value: line });
            }

            mask |= 1 << line;
        }

        Ok(mask)
    }

    /// Nombre opcional al final de la lista de argumentos de una macro.
    fn descriptor_name(&mut self, first: bool) -> Parse<Option<Located<NameString>>> {
        self.optional_slot(first, |parser| parser.name())
    }

    fn limited(&mut self, what: &'static str, max: u64) -> Parse<u64> {
        let value = self.natural(what)?;
        if value > max {
            return self.fail(ResourceError::OutOfRange { what, value, max });
        }

        Ok(value)
    }

    /// Agrega un descriptor y, si tiene nombre, publica sus alias.
    ///
    /// El nombre se declara en el scope actual y abarca el descriptor
    /// completo; los alias se declaran como sus hijos.
    fn publish(
        &mut self,
        name: Option<Located<NameString>>,
        builder: &mut ResourceBuilder,
        descriptor: &[u8],
        aliases: &[Alias],
    ) -> Parse<()> {
        let base = builder.offset() as u64 * 8;
        builder.push(descriptor);

        let (location, name) = match name {
            Some(name) => name.split(),
            None => return Ok(()),
        };

        let whole = Definition::Field {
            bit_offset: base,
            bit_count: descriptor.len() as u64 * 8,
        };

        let located = |error: NamespaceError| Located::at(ParserError::from(error), location.clone());

        self.namespace.add_entry(&name, whole, true).map_err(located)?;
        for &(seg, bit_offset, bit_count) in aliases {
            let alias = Definition::Field {
                bit_offset: base + bit_offset,
                bit_count,
            };

            self.namespace
                .add_entry(&NameString::from(seg), alias, false)
                .map_err(located)?;
        }

        self.namespace.pop_scope().map_err(located)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ast::Payload,
        lex::Lexer,
        namespace::{Namespace, ScopeId},
        parse, source,
    };

    fn template(body: &str) -> Result<(Vec<u8>, Namespace), Located<ParserError>> {
        let text = format!(
            "DefinitionBlock(\"t.aml\", \"SSDT\", 2, \"OEM\", \"TABLE\", 1) {{ \
             Name(_CRS, ResourceTemplate () {{ {} }}) }}",
            body
        );

        let (start, stream) = source::consume(text.as_bytes(), "test.asl");
        let parsed = parse::parse(Lexer::new(start, stream))?;

        let name = parsed.ast.statements()[0];
        let value = match parsed.ast[name].args[1] {
            crate::ast::Argument::Node(value) => value,
            _ => panic!("Name without a value"),
        };

        match &parsed.ast[value].payload {
            Payload::Resources(bytes) => Ok((bytes.clone(), parsed.namespace)),
            _ => panic!("ResourceTemplate without descriptors"),
        }
    }

    fn sum(bytes: &[u8]) -> u8 {
        bytes.iter().fold(0, |sum: u8, &byte| sum.wrapping_add(byte))
    }

    #[test]
    fn sealed_buffer_checksums_to_zero() {
        let mut builder = ResourceBuilder::new();
        builder.push(&[0x22, 0x02, 0x00]);

        let sealed = builder.seal();
        assert_eq!(&sealed[..4], &[0x22, 0x02, 0x00, 0x79]);
        assert_eq!(sum(&sealed), 0);
    }

    #[test]
    fn back_to_back_io_ports() {
        let (bytes, namespace) =
            template("IO(Decode16, 0x60, 0x60, 0, 1) IO(Decode16, 0x64, 0x64, 0, 1)").unwrap();

        assert_eq!(
            bytes[..16],
            [
                0x47, 0x01, 0x60, 0x00, 0x60, 0x00, 0x00, 0x01, 0x47, 0x01, 0x64, 0x00, 0x64, 0x00,
                0x00, 0x01
            ]
        );

        assert_eq!(bytes.len(), 18);
        assert_eq!(bytes[16], 0x79);

        let root = namespace.get(ScopeId::ROOT);
        assert_eq!(root.children().count(), 1);
    }

    #[test]
    fn memory32_fixed_fields() {
        let (bytes, _) = template("Memory32Fixed(ReadWrite, 0xFED40000, 0x5000)").unwrap();
        assert_eq!(
            bytes[..12],
            [0x86, 0x09, 0x00, 0x01, 0x00, 0x00, 0xd4, 0xfe, 0x00, 0x50, 0x00, 0x00]
        );
    }

    #[test]
    fn memory32_fixed_overflow() {
        let error = template("Memory32Fixed(ReadOnly, 0xFFFFF000, 0x1000)")
            .unwrap_err()
            .into_inner();

        assert!(matches!(
            error,
            ParserError::Resource(ResourceError::AddressOverflow { .. })
        ));
        assert_eq!(error.status(), Status::Semantic);

        assert!(template("Memory32Fixed(ReadOnly, 0xFFFFE000, 0x1000)").is_ok());
    }

    #[test]
    fn irq_masks_and_forms() {
        let (bytes, _) = template("IRQNoFlags() {1, 3, 15}").unwrap();
        assert_eq!(bytes[..3], [0x22, 0x0a, 0x80]);

        let (bytes, _) = template("IRQ(Edge, ActiveHigh, Exclusive) {4}").unwrap();
        assert_eq!(bytes[..3], [0x22, 0x10, 0x00]);

        let (bytes, _) = template("IRQ(Level, ActiveLow, Shared) {9}").unwrap();
        assert_eq!(bytes[..4], [0x23, 0x00, 0x02, 0x18]);
    }

    #[test]
    fn irq_duplicates_and_range() {
        let error = template("IRQNoFlags() {1, 1}").unwrap_err().into_inner();
        assert!(matches!(
            error,
            ParserError::Resource(ResourceError::Duplicate { value: 1, .. })
        ));

        let error = template("IRQNoFlags() {16}").unwrap_err().into_inner();
        assert!(matches!(
            error,
            ParserError::Resource(ResourceError::OutOfRange { value: 16, .. })
        ));
    }

    #[test]
    fn dma_descriptor() {
        let (bytes, _) = template("DMA(TypeF, BusMaster, Transfer16) {2, 7}").unwrap();
        assert_eq!(bytes[..3], [0x2a, 0x84, 0x66]);
    }

    #[test]
    fn named_descriptors_publish_aliases() {
        let (_, namespace) = template(
            "IO(Decode16, 0x60, 0x60, 0, 1) \
             Memory32Fixed(ReadWrite, 0x1000, 0x100, MEM0) \
             IRQNoFlags(IRQ0) {5}",
        )
        .unwrap();

        let field = |path: &str| namespace.get(namespace.resolve_path(path).unwrap()).definition();

        assert_eq!(
            field("\\MEM0"),
            Definition::Field {
                bit_offset: 64,
                bit_count: 96
            }
        );

        assert_eq!(
            field("\\MEM0._BAS"),
            Definition::Field {
                bit_offset: 64 + 32,
                bit_count: 32
            }
        );

        assert_eq!(
            field("\\IRQ0._INT"),
            Definition::Field {
                bit_offset: (8 + 12 + 1) * 8,
                bit_count: 16
            }
        );
    }

    #[test]
    fn flagged_irq_publishes_flag_aliases() {
        let (_, namespace) = template("IRQ(Level, ActiveLow, Shared, IRQ1) {9}").unwrap();
        let field = |path: &str| namespace.get(namespace.resolve_path(path).unwrap()).definition();

        assert_eq!(
            field("\\IRQ1._HE_"),
            Definition::Field {
                bit_offset: 3 * 8,
                bit_count: 1
            }
        );

        assert_eq!(
            field("\\IRQ1._SHR"),
            Definition::Field {
                bit_offset: 3 * 8 + 4,
                bit_count: 2
            }
        );
    }

    #[test]
    fn dword_memory_window() {
        let (bytes, _) = template(
            "DWordMemory(ResourceProducer, PosDecode, MinFixed, MaxFixed, Cacheable, ReadWrite, \
             0x0, 0xC0000000, 0xFEBFFFFF, 0x0, 0x3EC00000)",
        )
        .unwrap();

        assert_eq!(
            bytes[..26],
            [
                0x87, 0x17, 0x00, 0x00, 0x0c, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xc0,
                0xff, 0xff, 0xbf, 0xfe, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xc0, 0x3e
            ]
        );

        assert_eq!(bytes.len(), 28);
    }

    #[test]
    fn qword_memory_flags_and_aliases() {
        let (bytes, namespace) = template(
            "QWordMemory(ResourceConsumer, , MinNotFixed, MaxNotFixed, Prefetchable, ReadOnly, \
             0x0, 0x100000000, 0x1FFFFFFFF, 0x0, 0x100000000, , , MEM1, \
             AddressRangeReserved, TypeTranslation)",
        )
        .unwrap();

        assert_eq!(bytes[..6], [0x8a, 0x2b, 0x00, 0x00, 0x01, 0x2e]);
        assert_eq!(bytes[14..22], [0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00]);
        assert_eq!(bytes.len(), 46 + 2);

        let field = |path: &str| namespace.get(namespace.resolve_path(path).unwrap()).definition();

        assert_eq!(
            field("\\MEM1._MIN"),
            Definition::Field {
                bit_offset: 6 * 8 + 64,
                bit_count: 64
            }
        );

        assert_eq!(
            field("\\MEM1._MTP"),
            Definition::Field {
                bit_offset: 5 * 8 + 3,
                bit_count: 2
            }
        );
    }

    #[test]
    fn word_io_and_bus_number() {
        let (bytes, _) = template(
            "WordBusNumber(ResourceProducer, MinFixed, MaxFixed, PosDecode, \
             0x0000, 0x0000, 0x00FF, 0x0000, 0x0100) \
             WordIO(ResourceProducer, MinFixed, MaxFixed, PosDecode, EntireRange, \
             0x0000, 0x0D00, 0xFFFF, 0x0000, 0xF300)",
        )
        .unwrap();

        assert_eq!(
            bytes[..16],
            [
                0x88, 0x0d, 0x00, 0x02, 0x0c, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0x00, 0x00, 0x00,
                0x00, 0x01
            ]
        );

        assert_eq!(
            bytes[16..32],
            [
                0x88, 0x0d, 0x00, 0x01, 0x0c, 0x03, 0x00, 0x00, 0x00, 0x0d, 0xff, 0xff, 0x00, 0x00,
                0x00, 0xf3
            ]
        );
    }

    #[test]
    fn qword_io_sparse_translation() {
        let (bytes, _) = template(
            "QWordIO(, , , SubDecode, ISAOnlyRanges, 0x0, 0x1000, 0x1FFF, 0x0, 0x0, , , , \
             TypeTranslation, SparseTranslation)",
        )
        .unwrap();

        assert_eq!(bytes[..6], [0x8a, 0x2b, 0x00, 0x01, 0x03, 0x32]);
    }

    #[test]
    fn address_ranges_are_checked() {
        let error = template("WordBusNumber(, , , , 0x0, 0x10, 0x0F, 0x0, 0x0)")
            .unwrap_err()
            .into_inner();

        assert!(matches!(
            error,
            ParserError::Resource(ResourceError::InvertedRange { min: 0x10, max: 0x0f })
        ));

        let error = template("WordBusNumber(, , , , 0x0, 0x0, 0xFF, 0x0, 0x101)")
            .unwrap_err()
            .into_inner();

        assert!(matches!(
            error,
            ParserError::Resource(ResourceError::LengthExceedsWindow { length: 0x101, .. })
        ));
        assert_eq!(error.status(), Status::Semantic);

        let error = template("WordIO(, , , , , 0x0, 0x0, 0x10000, 0x0, 0x0)")
            .unwrap_err()
            .into_inner();

        assert!(matches!(
            error,
            ParserError::Resource(ResourceError::OutOfRange { value: 0x10000, max: 0xffff, .. })
        ));

        assert!(template(
            "QWordMemory(, , , , , ReadWrite, 0x0, 0x0, 0xFFFFFFFFFFFFFFFF, 0x0, 0x0)"
        )
        .is_ok());
    }

    #[test]
    fn extended_interrupt_list() {
        let (bytes, namespace) = template(
            "Interrupt(ResourceConsumer, Level, ActiveHigh, Shared, , , INT0) { 0x10, 0x11 }",
        )
        .unwrap();

        assert_eq!(
            bytes[..13],
            [0x89, 0x0a, 0x00, 0x09, 0x02, 0x10, 0x00, 0x00, 0x00, 0x11, 0x00, 0x00, 0x00]
        );

        assert_eq!(
            namespace
                .get(namespace.resolve_path("\\INT0._INT").unwrap())
                .definition(),
            Definition::Field {
                bit_offset: 5 * 8,
                bit_count: 64
            }
        );
    }

    #[test]
    fn extended_interrupt_with_resource_source() {
        let (bytes, _) = template("Interrupt(, Edge, ActiveLow, , 2, \"GSI0\") {5}").unwrap();
        assert_eq!(
            bytes[..15],
            [
                0x89, 0x0c, 0x00, 0x07, 0x01, 0x05, 0x00, 0x00, 0x00, 0x02, 0x47, 0x53, 0x49, 0x30,
                0x00
            ]
        );

        let error = template("Interrupt(, Edge, ActiveLow, , 2) {5}")
            .unwrap_err()
            .into_inner();

        assert!(matches!(
            error,
            ParserError::Resource(ResourceError::SourceIndexWithoutSource)
        ));
    }

    #[test]
    fn interrupt_list_bounds() {
        let error = template("Interrupt(, Edge, ActiveHigh) {}").unwrap_err().into_inner();
        assert!(matches!(
            error,
            ParserError::Resource(ResourceError::EmptyInterruptList)
        ));

        let list = (0..=MAX_INTERRUPTS)
            .map(|interrupt| interrupt.to_string())
            .collect::<Vec<_>>()
            .join(", ");

        let error = template(&format!("Interrupt(, Edge, ActiveHigh) {{ {} }}", list))
            .unwrap_err()
            .into_inner();

        assert!(matches!(
            error,
            ParserError::Resource(ResourceError::TooManyInterrupts)
        ));
        assert_eq!(error.status(), Status::ResourceExhaustion);
    }
}
