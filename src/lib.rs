//! Compilador de ASL a AML.
//!
//! # Front end
//! Cada tabla deriva de un único archivo de código fuente ASL, el cual
//! contiene exactamente un `DefinitionBlock`. Este archivo se somete
//! primero a análisis léxico en [`lex`], de lo cual se obtiene un flujo
//! de tokens. El análisis sintáctico en [`parse`] dispone los tokens en un
//! AST ([`ast`]) dirigido por la tabla de operadores de [`ops`], a la vez
//! que construye el namespace ([`namespace`]). Las listas de campos y las
//! plantillas de recursos tienen sintaxis propia y se analizan en
//! [`field`] y [`resource`], respectivamente.
//!
//! # Back end
//! El AST se recorre en [`emit`] para producir el flujo de opcodes AML,
//! el cual [`aml`] encapsula en una tabla ACPI con encabezado, longitud
//! y checksum.
//!
//! # Diagnósticos
//! La primera falla en cualquier fase aborta la compilación. El error
//! resultante se reporta como un único [`Diagnostics`](error::Diagnostics).

#[macro_use]
mod macros;

pub mod aml;
pub mod ast;
pub mod emit;
pub mod error;
pub mod field;
pub mod lex;
pub mod name;
pub mod namespace;
pub mod ops;
pub mod parse;
pub mod resource;
pub mod source;

use std::io::BufRead;

use log::info;

use crate::{
    aml::Header,
    ast::Ast,
    error::Diagnostics,
    lex::Lexer,
    namespace::Namespace,
    parse::DefinitionBlock,
    source::Location,
};

/// Parámetros de compilación que no provienen del código fuente.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Options {
    /// Identificador del compilador en el encabezado de la tabla.
    pub creator_id: [u8; 4],

    /// Revisión del compilador en el encabezado de la tabla.
    pub creator_revision: u32,
}

impl Default for Options {
    fn default() -> Self {
        let major: u32 = env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or(0);
        let minor: u32 = env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or(0);

        Options {
            creator_id: *b"ASLC",
            creator_revision: major << 16 | minor,
        }
    }
}

/// Unidad de compilación analizada, lista para emitirse.
pub struct Unit {
    pub block: DefinitionBlock,
    pub ast: Ast,
    pub namespace: Namespace,
    location: Location,
}

impl Unit {
    /// Emite la tabla AML completa.
    pub fn emit(&self, options: &Options) -> Result<Vec<u8>, Diagnostics> {
        let block = &self.block;
        let header = Header {
            signature: block.signature,
            revision: block.revision,
            oem_id: aml::pad(&block.oem_id),
            oem_table_id: aml::pad(&block.table_id),
            oem_revision: block.oem_revision,
            creator_id: options.creator_id,
            creator_revision: options.creator_revision,
        };

        let table = emit::emit(&self.ast, &self.namespace, &header, &self.location)?;
        Ok(table)
    }
}

/// Analiza una unidad completa sin emitirla.
pub fn parse<R: BufRead>(reader: R, name: &str) -> Result<Unit, Diagnostics> {
    let (start, stream) = source::consume(reader, name);
    let parsed = parse::parse(Lexer::new(start, stream))?;

    info!(
        "Parsed {}: {} nodes, {} top-level statements",
        name,
        parsed.ast.len(),
        parsed.ast.statements().len()
    );

    Ok(Unit {
        block: parsed.block,
        ast: parsed.ast.transform(),
        namespace: parsed.namespace,
        location: parsed.location,
    })
}

/// Compila una unidad de ASL a una tabla AML.
///
/// No se produce salida alguna si la compilación falla.
pub fn compile<R: BufRead>(reader: R, name: &str, options: &Options) -> Result<Vec<u8>, Diagnostics> {
    parse(reader, name)?.emit(options)
}
