//! Listas de unidades de campo.
//!
//! `Field` e `IndexField` describen una región opaca como una secuencia de
//! rangos de bits. Cada elemento de la lista es un salto explícito
//! `Offset(bytes)`, una unidad con nombre `NAME, bits` o una unidad
//! reservada `, bits`. El cursor de bits avanza con cada unidad.

use log::trace;
use thiserror::Error;

use crate::{
    ast::NodeId,
    error::{Classify, Status},
    lex::{Keyword, Token},
    name::NameSeg,
    namespace::Definition,
    parse::{Parse, Parser, ParserError},
    source::{InputStream, Located},
};

/// Cantidad máxima de elementos en una lista de campos.
pub const MAX_FIELDS: usize = 128;

/// Ancho máximo de una unidad, exclusivo.
pub const MAX_FIELD_BITS: u64 = 1 << 28;

/// Un elemento de una lista de campos.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FieldEntry {
    /// Avanza el cursor hasta el byte indicado.
    Offset(u64),

    /// Unidad de `bits` bits; sin nombre si es reservada.
    Unit { name: Option<NameSeg>, bits: u64 },
}

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum FieldError {
    #[error("Field list exceeds the maximum of {} entries", MAX_FIELDS)]
    TooManyEntries,

    #[error("Offset({offset}) moves backwards, the field cursor is already at bit {cursor}")]
    Backwards { offset: u64, cursor: u64 },

    #[error("Field width {0} is too large, it must be less than 2^28 bits")]
    TooWide(u64),

    #[error("Field unit names must be a single name segment, found `{0}`")]
    QualifiedName(crate::name::NameString),
}

impl Classify for FieldError {
    fn status(&self) -> Status {
        match self {
            FieldError::TooManyEntries => Status::ResourceExhaustion,
            _ => Status::Semantic,
        }
    }
}

impl<S: InputStream> Parser<S> {
    /// `{ Offset(n), NAME, bits, , bits, ... }`
    ///
    /// Las unidades con nombre se declaran en el scope actual y apuntan
    /// al nodo `owner`.
    pub(crate) fn field_list(&mut self, owner: NodeId) -> Parse<Vec<FieldEntry>> {
        self.expect(Token::OpenCurly)?;

        let mut entries = Vec::new();
        let mut cursor = 0;

        while !self.accept(&Token::CloseCurly)? {
            if !entries.is_empty() {
                self.expect(Token::Comma)?;
                if self.accept(&Token::CloseCurly)? {
                    break;
                }
            }

            if entries.len() == MAX_FIELDS {
                return self.fail(FieldError::TooManyEntries);
            }

            let (location, token) = self.next("a field unit")?.split();
            let entry = match token {
                Token::Keyword(Keyword::Offset) => {
                    self.expect(Token::OpenParen)?;
                    let offset = self.natural("a byte offset")?;
                    self.expect(Token::CloseParen)?;

                    let target = match offset.checked_mul(8) {
                        Some(bits) if bits < MAX_FIELD_BITS => bits,
                        _ => return self.fail(FieldError::TooWide(offset.saturating_mul(8))),
                    };

                    if target < cursor {
                        return self.fail(FieldError::Backwards { offset, cursor });
                    }

                    cursor = target;
                    FieldEntry::Offset(offset)
                }

                Token::Name(name) => {
                    let seg = match name.last() {
                        Some(seg) if name.is_single() => seg,
                        _ => return self.fail(FieldError::QualifiedName(name)),
                    };

                    self.expect(Token::Comma)?;
                    let bits = self.width()?;

                    self.namespace
                        .add_entry(&name, Definition::Node(owner), false)
                        .map_err(|error| Located::at(ParserError::from(error), location))?;

                    cursor += bits;
                    FieldEntry::Unit {
                        name: Some(seg),
                        bits,
                    }
                }

                Token::Comma => {
                    let bits = self.width()?;

                    cursor += bits;
                    FieldEntry::Unit { name: None, bits }
                }

                found => {
                    return self.fail(ParserError::Expected("a field unit".into(), found));
                }
            };

            trace!("Field entry {:?}, cursor at bit {}", entry, cursor);
            entries.push(entry);
        }

        Ok(entries)
    }

    fn width(&mut self) -> Parse<u64> {
        match self.natural("a bit width")? {
            bits if bits < MAX_FIELD_BITS => Ok(bits),
            bits => self.fail(FieldError::TooWide(bits)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lex::Lexer, parse, source};

    fn fields(body: &str) -> Result<Vec<FieldEntry>, Located<ParserError>> {
        let text = format!(
            "DefinitionBlock(\"t.aml\", \"SSDT\", 2, \"OEM\", \"TABLE\", 1) {{ \
             OperationRegion(REGN, SystemMemory, 0x1000, 0x100) \
             Field(REGN, ByteAcc, NoLock, Preserve) {{ {} }} }}",
            body
        );

        let (start, stream) = source::consume(text.as_bytes(), "test.asl");
        let parsed = parse::parse(Lexer::new(start, stream))?;

        let field = parsed.ast.statements()[1];
        match &parsed.ast[field].payload {
            crate::ast::Payload::Fields(entries) => Ok(entries.clone()),
            _ => panic!("Field node without a field list"),
        }
    }

    fn seg(text: &str) -> Option<NameSeg> {
        Some(text.parse().unwrap())
    }

    #[test]
    fn offset_then_named_unit() {
        assert_eq!(
            fields("OFFSET(4), FLD1, 8").unwrap(),
            vec![
                FieldEntry::Offset(4),
                FieldEntry::Unit {
                    name: seg("FLD1"),
                    bits: 8
                },
            ]
        );
    }

    #[test]
    fn reserved_units() {
        assert_eq!(
            fields(", 3, FLD1, 1, , 4").unwrap(),
            vec![
                FieldEntry::Unit { name: None, bits: 3 },
                FieldEntry::Unit {
                    name: seg("FLD1"),
                    bits: 1
                },
                FieldEntry::Unit { name: None, bits: 4 },
            ]
        );
    }

    #[test]
    fn offsets_cannot_move_backwards() {
        let error = fields("FLD1, 32, Offset(2)").unwrap_err().into_inner();
        assert!(matches!(
            error,
            ParserError::Field(FieldError::Backwards {
                offset: 2,
                cursor: 32
            })
        ));
    }

    #[test]
    fn entry_limit() {
        let body = vec![", 1"; MAX_FIELDS].join(", ");
        assert_eq!(fields(&body).unwrap().len(), MAX_FIELDS);

        let body = vec![", 1"; MAX_FIELDS + 1].join(", ");
        let error = fields(&body).unwrap_err().into_inner();
        assert_eq!(error.status(), Status::ResourceExhaustion);
    }

    #[test]
    fn duplicate_unit_names() {
        let error = fields("FLD1, 8, FLD1, 8").unwrap_err().into_inner();
        assert_eq!(error.status(), Status::Semantic);
    }
}
