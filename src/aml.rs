//! Construcción de tablas AML.
//!
//! [`Table`] acumula el flujo de opcodes de una tabla y sabe codificar las
//! primitivas de AML: enteros, cadenas, rutas y paquetes con prefijo de
//! longitud (`PkgLength`). Al finalizar se antepone el encabezado de 36
//! bytes y se calcula el checksum.
//!
//! # Encabezado
//! ```text
//!  0  signature       [u8; 4]
//!  4  length          u32
//!  8  revision        u8
//!  9  checksum        u8
//! 10  OEM ID          [u8; 6]
//! 16  OEM table ID    [u8; 8]
//! 24  OEM revision    u32
//! 28  creator ID      [u8; 4]
//! 32  creator rev.    u32
//! ```
//! Todos los campos multibyte son little-endian.

use std::{
    fmt::{self, Display},
    str::FromStr,
};

use log::debug;
use thiserror::Error;

use crate::{
    error::{Classify, Status},
    name::{NameString, Prefix},
};

/// Tamaño del encabezado de una tabla.
pub const HEADER_LEN: usize = 36;

const CHECKSUM_OFFSET: usize = 9;

/// Longitud máxima codificable en un `PkgLength`, exclusiva.
pub const MAX_PKG_LENGTH: usize = 1 << 28;

const ZERO_OP: u8 = 0x00;
const ONE_OP: u8 = 0x01;
const BYTE_PREFIX: u8 = 0x0a;
const WORD_PREFIX: u8 = 0x0b;
const DWORD_PREFIX: u8 = 0x0c;
const STRING_PREFIX: u8 = 0x0d;
const QWORD_PREFIX: u8 = 0x0e;
const DUAL_NAME_PREFIX: u8 = 0x2e;
const MULTI_NAME_PREFIX: u8 = 0x2f;
const ROOT_CHAR: u8 = b'\\';
const PARENT_PREFIX_CHAR: u8 = b'^';
const NULL_NAME: u8 = 0x00;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Package of {0} bytes exceeds the AML limit of 2^28 - 1 bytes")]
    PkgLength(usize),

    #[error("Name path with {0} segments exceeds the AML limit of 255")]
    TooManySegments(usize),

    #[error("Unbalanced package nesting in AML stream")]
    Unbalanced,
}

impl Classify for EncodeError {
    fn status(&self) -> Status {
        match self {
            EncodeError::Unbalanced => Status::Internal,
            _ => Status::ResourceExhaustion,
        }
    }
}

pub type Encode<T> = Result<T, EncodeError>;

/// Tipo de tabla.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Signature {
    /// Differentiated System Description Table.
    Dsdt,

    /// Secondary System Description Table.
    Ssdt,
}

impl Signature {
    pub fn as_bytes(self) -> &'static [u8; 4] {
        match self {
            Signature::Dsdt => b"DSDT",
            Signature::Ssdt => b"SSDT",
        }
    }
}

impl FromStr for Signature {
    type Err = ();

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        match string {
            "DSDT" => Ok(Signature::Dsdt),
            "SSDT" => Ok(Signature::Ssdt),
            _ => Err(()),
        }
    }
}

impl Display for Signature {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signature::Dsdt => fmt.write_str("DSDT"),
            Signature::Ssdt => fmt.write_str("SSDT"),
        }
    }
}

/// Campos del encabezado, excepto longitud y checksum.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    pub signature: Signature,
    pub revision: u8,
    pub oem_id: [u8; 6],
    pub oem_table_id: [u8; 8],
    pub oem_revision: u32,
    pub creator_id: [u8; 4],
    pub creator_revision: u32,
}

/// Rellena una cadena con espacios hasta el ancho de un campo.
pub fn pad<const N: usize>(string: &str) -> [u8; N] {
    let mut field = [b' '; N];
    for (slot, &byte) in field.iter_mut().zip(string.as_bytes()) {
        *slot = byte;
    }

    field
}

/// Cuerpo de una tabla en construcción.
#[derive(Debug, Default)]
pub struct Table {
    body: Vec<u8>,
    packages: Vec<usize>,
}

impl Table {
    pub fn new() -> Self {
        Table::default()
    }

    /// Longitud actual del cuerpo.
    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    pub fn byte(&mut self, byte: u8) {
        self.body.push(byte);
    }

    pub fn bytes(&mut self, bytes: &[u8]) {
        self.body.extend_from_slice(bytes);
    }

    /// Emite un opcode e inicia un paquete cuya longitud se conocerá al cerrarlo.
    pub fn pkg_start(&mut self, opcode: &[u8]) {
        self.bytes(opcode);
        self.packages.push(self.body.len());
    }

    /// Cierra el paquete más reciente e inserta su `PkgLength`.
    pub fn pkg_finish(&mut self) -> Encode<()> {
        let start = self.packages.pop().ok_or(EncodeError::Unbalanced)?;
        let length = pkg_length(self.body.len() - start, true)?;

        self.body.splice(start..start, length);
        Ok(())
    }

    /// Constante entera en su forma más corta.
    pub fn integer(&mut self, value: u64) {
        match value {
            0 => self.byte(ZERO_OP),
            1 => self.byte(ONE_OP),
            _ if value <= u8::MAX.into() => self.bytes(&[BYTE_PREFIX, value as u8]),
            _ if value <= u16::MAX.into() => {
                self.byte(WORD_PREFIX);
                self.bytes(&(value as u16).to_le_bytes());
            }

            _ if value <= u32::MAX.into() => {
                self.byte(DWORD_PREFIX);
                self.bytes(&(value as u32).to_le_bytes());
            }

            _ => {
                self.byte(QWORD_PREFIX);
                self.bytes(&value.to_le_bytes());
            }
        }
    }

    /// Cadena terminada en nulo.
    pub fn string(&mut self, string: &str) {
        self.byte(STRING_PREFIX);
        self.bytes(string.as_bytes());
        self.byte(0);
    }

    pub fn name(&mut self, name: &NameString) -> Encode<()> {
        match name.prefix() {
            Prefix::None => (),
            Prefix::Root => self.byte(ROOT_CHAR),
            Prefix::Parent(levels) => (0..levels).for_each(|_| self.byte(PARENT_PREFIX_CHAR)),
        }

        let segments = name.segments();
        match segments.len() {
            0 => self.byte(NULL_NAME),
            1 => (),
            2 => self.byte(DUAL_NAME_PREFIX),
            count if count <= u8::MAX.into() => self.bytes(&[MULTI_NAME_PREFIX, count as u8]),
            count => return Err(EncodeError::TooManySegments(count)),
        }

        for seg in segments {
            self.bytes(seg.as_bytes());
        }

        Ok(())
    }

    /// Antepone el encabezado y calcula longitud y checksum.
    pub fn finish(self, header: &Header) -> Encode<Vec<u8>> {
        if !self.packages.is_empty() {
            return Err(EncodeError::Unbalanced);
        }

        let length = HEADER_LEN + self.body.len();
        let mut table = Vec::with_capacity(length);

        table.extend_from_slice(header.signature.as_bytes());
        table.extend_from_slice(&(length as u32).to_le_bytes());
        table.push(header.revision);
        table.push(0);
        table.extend_from_slice(&header.oem_id);
        table.extend_from_slice(&header.oem_table_id);
        table.extend_from_slice(&header.oem_revision.to_le_bytes());
        table.extend_from_slice(&header.creator_id);
        table.extend_from_slice(&header.creator_revision.to_le_bytes());
        table.extend_from_slice(&self.body);

        table[CHECKSUM_OFFSET] = checksum(&table);
        debug!("{} table of {} bytes", header.signature, length);

        Ok(table)
    }
}

/// Byte que lleva la suma de `bytes` a cero, módulo 256.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes
        .iter()
        .fold(0u8, |sum, &byte| sum.wrapping_add(byte))
        .wrapping_neg()
}

/// Codifica un `PkgLength`.
///
/// Si `inclusive`, la longitud codificada incluye los bytes del propio
/// `PkgLength`, como en los paquetes de opcodes. Las unidades de campo
/// codifican anchos en bits sin incluirse a sí mismas.
pub fn pkg_length(length: usize, inclusive: bool) -> Encode<Vec<u8>> {
    for (extra, limit) in [1usize << 6, 1 << 12, 1 << 20, 1 << 28].iter().enumerate() {
        let total = if inclusive { length + extra + 1 } else { length };
        if total >= *limit {
            continue;
        }

        let encoded = match extra {
            0 => vec![total as u8],
            _ => {
                let mut encoded = vec![(extra << 6) as u8 | (total & 0x0f) as u8];
                encoded.extend((0..extra).map(|i| (total >> (4 + 8 * i)) as u8));
                encoded
            }
        };

        return Ok(encoded);
    }

    Err(EncodeError::PkgLength(length))
}
