//! Análisis sintáctico.
//!
//! Descenso recursivo sin retroceso. Cada operador se analiza de forma
//! genérica a partir de su [`Descriptor`]: argumentos obligatorios,
//! opcionales con sus valores por omisión, registro en el namespace y
//! cuerpo. Los cuerpos con sintaxis propia (listas de campos, plantillas
//! de recursos, paquetes y buffers) se delegan a su respectivo [`Hook`].
//! El primer error aborta todo el análisis.

use std::{iter::Peekable, rc::Rc};

use log::{debug, trace};
use thiserror::Error;

use crate::{
    aml::Signature,
    ast::{Argument, Ast, NodeId, NodeKind, Payload},
    error::{Classify, Status},
    field::FieldError,
    lex::{Keyword, Lexer, LexerError, Token},
    name::NameString,
    namespace::{Definition, Namespace, NamespaceError},
    ops::{ArgType, Hook, Op, OpFlags},
    resource::ResourceError,
    source::{InputStream, Located, Location},
};

/// Máximo de argumentos en una invocación de método.
pub const MAX_CALL_ARGS: usize = 8;

/// Máximo anidamiento de operadores e invocaciones.
pub const MAX_NESTING: usize = 128;

/// Error de análisis sintáctico o semántico durante el análisis.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ParserError {
    #[error(transparent)]
    Lexer(#[from] LexerError),

    #[error(transparent)]
    Namespace(#[from] NamespaceError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Field(#[from] FieldError),

    #[error("Expected {0}, found {1} instead")]
    Expected(String, Token),

    #[error("Expected {0}, found end of input instead")]
    UnexpectedEof(String),

    #[error("Expected {0}, found {1} instead")]
    BadEnumerant(&'static str, Token),

    #[error(
        "Value for {width} parameter {parameter} is out of range ({value:#x}) \
         while processing keyword '{keyword}'"
    )]
    OutOfRange {
        width: &'static str,
        parameter: usize,
        value: u64,
        keyword: &'static str,
    },

    #[error("Method argument count {0} is out of range, valid range is [0, 7]")]
    ArgCount(u64),

    #[error("Synchronization level {0} is out of range, valid range is [0, 15]")]
    SyncLevel(u64),

    #[error("Too many arguments in call to `{0}`, at most {} are allowed", MAX_CALL_ARGS)]
    TooManyCallArgs(NameString),

    #[error("Invalid UUID string {0:?}, expected the form aabbccdd-eeff-gghh-iijj-kkllmmnnoopp")]
    BadUuid(Rc<str>),

    #[error("Invalid EISA ID string {0:?}, expected three uppercase letters and four hex digits")]
    BadEisaId(Rc<str>),

    #[error("Byte value {0:#x} in buffer initializer does not fit in 8 bits")]
    BadByte(u64),

    #[error("Table signature must be either 'DSDT' or 'SSDT'")]
    BadSignature,

    #[error("{what} {value:?} is longer than {max} characters")]
    StringTooLong {
        what: &'static str,
        value: Rc<str>,
        max: usize,
    },

    #[error("Nesting exceeds the limit of {} levels", MAX_NESTING)]
    TooDeep,

    #[error("`Else` must immediately follow an `If` block")]
    ElseWithoutIf,

    #[error("Found unexpected token after final closing }}, expected end of stream")]
    TrailingToken,
}

impl Classify for ParserError {
    fn status(&self) -> Status {
        use ParserError::*;

        match self {
            Lexer(_) => Status::Lexical,
            Namespace(error) => error.status(),
            Resource(error) => error.status(),
            Field(error) => error.status(),

            Expected(_, _) | UnexpectedEof(_) | ElseWithoutIf | TrailingToken => Status::Syntax,
            TooDeep => Status::ResourceExhaustion,

            BadEnumerant(_, _)
            | OutOfRange { .. }
            | ArgCount(_)
            | SyncLevel(_)
            | TooManyCallArgs(_)
            | BadUuid(_)
            | BadEisaId(_)
            | BadByte(_)
            | BadSignature
            | StringTooLong { .. } => Status::Semantic,
        }
    }
}

pub type Parse<T> = Result<T, Located<ParserError>>;

/// Encabezado declarado por `DefinitionBlock`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DefinitionBlock {
    /// Nombre de archivo de salida sugerido.
    pub hint: Rc<str>,
    pub signature: Signature,
    pub revision: u8,
    pub oem_id: Rc<str>,
    pub table_id: Rc<str>,
    pub oem_revision: u32,
}

/// Resultado de analizar una unidad completa.
pub struct Parsed {
    pub block: DefinitionBlock,

    /// Ubicación de la palabra clave `DefinitionBlock`.
    pub location: Location,

    pub ast: Ast,
    pub namespace: Namespace,
}

/// Analiza una unidad de compilación: un `DefinitionBlock` y nada más.
pub fn parse<S: InputStream>(lexer: Lexer<S>) -> Parse<Parsed> {
    let mut parser = Parser {
        last_known: lexer.here().clone(),
        tokens: lexer.peekable(),
        depth: 0,
        ast: Ast::default(),
        namespace: Namespace::new(),
    };

    let (location, block) = parser.definition_block()?.split();

    // Nada puede seguir a la llave final
    if parser.peek()?.is_some() {
        parser.next("end of input")?;
        return parser.fail(ParserError::TrailingToken);
    }

    if parser.namespace.depth() != 1 {
        return parser.fail(NamespaceError::Unbalanced);
    }

    Ok(Parsed {
        block,
        location,
        ast: parser.ast,
        namespace: parser.namespace,
    })
}

pub(crate) struct Parser<S: InputStream> {
    tokens: Peekable<Lexer<S>>,
    last_known: Location,
    depth: usize,
    pub(crate) ast: Ast,
    pub(crate) namespace: Namespace,
}

impl<S: InputStream> Parser<S> {
    fn definition_block(&mut self) -> Parse<Located<DefinitionBlock>> {
        const KEYWORD: &str = "DefinitionBlock";

        self.expect(Token::Keyword(Keyword::DefinitionBlock))?;
        let location = self.last_known.clone();

        self.expect(Token::OpenParen)?;

        let hint = self.string("output file name")?;
        self.expect(Token::Comma)?;

        let signature = match self.string("table signature")?.parse() {
            Ok(signature) => signature,
            Err(()) => return self.fail(ParserError::BadSignature),
        };

        self.expect(Token::Comma)?;
        let revision = self.bounded(KEYWORD, 2, "byte", u8::MAX.into())? as u8;

        self.expect(Token::Comma)?;
        let oem_id = self.limited_string("OEM ID", 6)?;

        self.expect(Token::Comma)?;
        let table_id = self.limited_string("OEM table ID", 8)?;

        self.expect(Token::Comma)?;
        let oem_revision = self.bounded(KEYWORD, 5, "32-bit", u32::MAX.into())? as u32;

        self.expect(Token::CloseParen)?;
        debug!(
            "DefinitionBlock {} for {:?} (OEM {:?}, table {:?})",
            signature, hint, oem_id, table_id
        );

        let statements = self.block()?;
        self.ast.set_statements(statements);

        let block = DefinitionBlock {
            hint,
            signature,
            revision,
            oem_id,
            table_id,
            oem_revision,
        };

        Ok(Located::at(block, location))
    }

    /// `{ statement* }`
    pub(crate) fn block(&mut self) -> Parse<Vec<NodeId>> {
        self.expect(Token::OpenCurly)?;

        let mut statements: Vec<NodeId> = Vec::new();
        loop {
            let (location, token) = self.next("a statement or `}`")?.split();
            let statement = match token {
                Token::CloseCurly => break Ok(statements),

                Token::Keyword(Keyword::Op(Op::Else)) => {
                    let follows_if = statements
                        .last()
                        .map_or(false, |&last| self.ast[last].op() == Some(Op::If));

                    if !follows_if {
                        return self.fail(ParserError::ElseWithoutIf);
                    }

                    self.operator(Op::Else, location)?
                }

                Token::Keyword(Keyword::Op(op)) => self.operator(op, location)?,
                Token::Name(name) => self.call(name, location)?,

                found => return self.fail(ParserError::Expected("a statement".into(), found)),
            };

            statements.push(statement);
        }
    }

    /// Analizador genérico de operadores, dirigido por la tabla.
    pub(crate) fn operator(&mut self, op: Op, location: Location) -> Parse<NodeId> {
        self.nested(|parser| parser.operator_body(op, location))
    }

    fn operator_body(&mut self, op: Op, location: Location) -> Parse<NodeId> {
        let descriptor = op.descriptor();
        trace!("Parsing `{}` at {}", op, location);

        let node = self
            .ast
            .alloc(NodeKind::Op(op), self.namespace.current(), location.clone());

        // Los paréntesis son opcionales si no hay argumentos obligatorios
        let parenthesized = if descriptor.required.is_empty() {
            self.accept(&Token::OpenParen)?
        } else {
            self.expect(Token::OpenParen)?;
            true
        };

        let mut args = Vec::with_capacity(descriptor.arity());
        let mut name_location = location;

        if parenthesized {
            for (slot, &typ) in descriptor.required.iter().enumerate() {
                if slot > 0 {
                    self.expect(Token::Comma)?;
                }

                args.push(self.argument(op, slot, typ)?);
                if slot == descriptor.name_slot {
                    name_location = self.last_known.clone();
                }
            }

            for &(typ, default) in descriptor.optional {
                let slot = args.len();
                let parsed = self.optional_slot(slot == 0, |parser| parser.argument(op, slot, typ))?;

                match parsed {
                    Some(argument) => args.push(argument),
                    None => args.push(default.into()),
                }
            }

            self.expect(Token::CloseParen)?;
        }

        let defaults = descriptor.optional[args.len() - descriptor.required.len()..].iter();
        args.extend(defaults.map(|&(_, default)| Argument::from(default)));

        let registers = descriptor.flags.contains(OpFlags::REGISTERS_NAME);
        let opens_scope = descriptor.flags.contains(OpFlags::NEW_SCOPE);

        let switched = if registers {
            let name = match &args[descriptor.name_slot] {
                Argument::Name(name) => name.clone(),
                _ => return self.fail(NamespaceError::Unbalanced),
            };

            let definition = Definition::Node(node);
            let result = if op == Op::Scope {
                self.namespace.enter(&name, definition)
            } else {
                self.namespace.add_entry(&name, definition, opens_scope)
            };

            result.map_err(|error| Located::at(ParserError::from(error), name_location))?;
            opens_scope
        } else {
            false
        };

        self.ast[node].args = args;

        match descriptor.hook {
            Some(Hook::Fields) => {
                let fields = self.field_list(node)?;
                self.ast[node].payload = Payload::Fields(fields);
            }

            Some(Hook::ResourceTemplate) => {
                let resources = self.resource_template()?;
                self.ast[node].payload = Payload::Resources(resources);
            }

            Some(Hook::Package) => {
                let elements = self.package_elements()?;
                self.ast[node].children = elements;
            }

            Some(Hook::Buffer) => {
                let bytes = self.buffer_initializer()?;
                self.ast[node].payload = Payload::Bytes(bytes);
            }

            None if opens_scope => {
                let children = self.block()?;
                self.ast[node].children = children;
            }

            None => (),
        }

        if switched {
            self.namespace
                .pop_scope()
                .map_err(|error| Located::at(ParserError::from(error), self.last_known.clone()))?;
        }

        Ok(node)
    }

    /// Una posición de argumento opcional.
    ///
    /// Retorna `None` si el argumento se omitió, ya sea porque la lista
    /// terminó o porque sigue otra coma.
    pub(crate) fn optional_slot<T, F>(&mut self, first: bool, rule: F) -> Parse<Option<T>>
    where
        F: FnOnce(&mut Self) -> Parse<T>,
    {
        if self.peek_is(&Token::CloseParen)? {
            return Ok(None);
        }

        if !first {
            self.expect(Token::Comma)?;
        }

        if self.peek_is(&Token::CloseParen)? || self.peek_is(&Token::Comma)? {
            Ok(None)
        } else {
            rule(self).map(Some)
        }
    }

    fn argument(&mut self, op: Op, slot: usize, typ: ArgType) -> Parse<Argument> {
        let keyword = op.descriptor().name;

        let argument = match typ {
            ArgType::TermArg | ArgType::Target => Argument::Node(self.term()?),
            ArgType::NameString => Argument::Name(self.name()?.into_inner()),

            ArgType::U8 => Argument::U8(self.bounded(keyword, slot, "byte", u8::MAX.into())? as u8),
            ArgType::U16 => {
                Argument::U16(self.bounded(keyword, slot, "word", u16::MAX.into())? as u16)
            }

            ArgType::U32 => {
                Argument::U32(self.bounded(keyword, slot, "32-bit", u32::MAX.into())? as u32)
            }

            ArgType::U64 => Argument::U64(self.natural("an integer constant")?),

            ArgType::ArgCount => match self.natural("an argument count")? {
                count @ 0..=7 => Argument::U8(count as u8),
                count => return self.fail(ParserError::ArgCount(count)),
            },

            ArgType::SyncLevel => match self.natural("a synchronization level")? {
                level @ 0..=15 => Argument::U8(level as u8),
                level => return self.fail(ParserError::SyncLevel(level)),
            },

            ArgType::StringLiteral => Argument::Str(self.string("a string literal")?),

            ArgType::Uuid => {
                let string = self.string("a UUID string")?;
                match uuid(&string) {
                    Some(bytes) => Argument::Uuid(bytes),
                    None => return self.fail(ParserError::BadUuid(string)),
                }
            }

            ArgType::EisaId => {
                let string = self.string("an EISA ID string")?;
                match eisa_id(&string) {
                    Some(id) => Argument::U32(id),
                    None => return self.fail(ParserError::BadEisaId(string)),
                }
            }

            ArgType::RegionSpace => Argument::Region(self.enumerant("a region space", |k| match k {
                Keyword::Region(space) => Some(space),
                _ => None,
            })?),

            ArgType::AccessType => Argument::Access(self.enumerant("an access type", |k| match k {
                Keyword::Access(access) => Some(access),
                _ => None,
            })?),

            ArgType::LockRule => Argument::Lock(self.enumerant("a lock rule", |k| match k {
                Keyword::Lock(lock) => Some(lock),
                _ => None,
            })?),

            ArgType::UpdateRule => Argument::Update(self.enumerant("an update rule", |k| match k {
                Keyword::Update(update) => Some(update),
                _ => None,
            })?),

            ArgType::SerializeRule => {
                Argument::Serialize(self.enumerant("a serialize rule", |k| match k {
                    Keyword::Serialize(rule) => Some(rule),
                    _ => None,
                })?)
            }

            ArgType::ObjectType => Argument::ObjType(self.enumerant("an object type", |k| match k {
                Keyword::ObjType(typ) => Some(typ),
                _ => None,
            })?),
        };

        Ok(argument)
    }

    /// Expresión arbitraria.
    pub(crate) fn term(&mut self) -> Parse<NodeId> {
        let (location, token) = self.next("a term argument")?.split();
        let scope = self.namespace.current();

        let kind = match token {
            Token::Keyword(Keyword::Op(Op::Else)) => return self.fail(ParserError::ElseWithoutIf),
            Token::Keyword(Keyword::Op(op)) => return self.operator(op, location),
            Token::Name(name) => return self.call(name, location),

            Token::Keyword(Keyword::Local(index)) => NodeKind::Local(index),
            Token::Keyword(Keyword::Arg(index)) => NodeKind::Arg(index),
            Token::StringLiteral(string) => NodeKind::String(string),
            Token::Natural(value) => NodeKind::Number(value),

            found => return self.fail(ParserError::Expected("a term argument".into(), found)),
        };

        Ok(self.ast.alloc(kind, scope, location))
    }

    /// Referencia a un nombre con argumentos de llamada opcionales.
    fn call(&mut self, name: NameString, location: Location) -> Parse<NodeId> {
        self.nested(|parser| parser.call_body(name, location))
    }

    fn call_body(&mut self, name: NameString, location: Location) -> Parse<NodeId> {
        let node = self.ast.alloc(
            NodeKind::Identifier(name.clone()),
            self.namespace.current(),
            location,
        );

        let mut args = Vec::new();
        if self.accept(&Token::OpenParen)? && !self.accept(&Token::CloseParen)? {
            loop {
                if args.len() == MAX_CALL_ARGS {
                    return self.fail(ParserError::TooManyCallArgs(name));
                }

                args.push(Argument::Node(self.term()?));
                if self.accept(&Token::CloseParen)? {
                    break;
                }

                self.expect(Token::Comma)?;
            }
        }

        self.ast[node].args = args;
        Ok(node)
    }

    /// Aplica `rule` un nivel de anidamiento más adentro.
    fn nested<T, F>(&mut self, rule: F) -> Parse<T>
    where
        F: FnOnce(&mut Self) -> Parse<T>,
    {
        if self.depth == MAX_NESTING {
            return self.fail(ParserError::TooDeep);
        }

        self.depth += 1;
        let result = rule(self);
        self.depth -= 1;

        result
    }

    /// `{ term, term, ... }`
    fn package_elements(&mut self) -> Parse<Vec<NodeId>> {
        self.expect(Token::OpenCurly)?;

        let mut elements = Vec::new();
        while !self.accept(&Token::CloseCurly)? {
            if !elements.is_empty() {
                self.expect(Token::Comma)?;
                if self.accept(&Token::CloseCurly)? {
                    break;
                }
            }

            elements.push(self.term()?);
        }

        Ok(elements)
    }

    /// `{ byte, byte, ... }` o `{ "string" }`
    fn buffer_initializer(&mut self) -> Parse<Vec<u8>> {
        self.expect(Token::OpenCurly)?;

        if let Some(Token::StringLiteral(_)) = self.peek()? {
            let string = self.string("a string literal")?;
            self.expect(Token::CloseCurly)?;

            let mut bytes = string.as_bytes().to_vec();
            bytes.push(0);

            return Ok(bytes);
        }

        let mut bytes = Vec::new();
        while !self.accept(&Token::CloseCurly)? {
            if !bytes.is_empty() {
                self.expect(Token::Comma)?;
                if self.accept(&Token::CloseCurly)? {
                    break;
                }
            }

            match self.natural("a byte constant")? {
                byte @ 0..=0xff => bytes.push(byte as u8),
                value => return self.fail(ParserError::BadByte(value)),
            }
        }

        Ok(bytes)
    }

    /// Constante natural acotada a un ancho.
    pub(crate) fn bounded(
        &mut self,
        keyword: &'static str,
        slot: usize,
        width: &'static str,
        max: u64,
    ) -> Parse<u64> {
        let value = self.natural("an integer constant")?;
        if value > max {
            return self.fail(ParserError::OutOfRange {
                width,
                parameter: slot + 1,
                value,
                keyword,
            });
        }

        Ok(value)
    }

    pub(crate) fn natural(&mut self, what: &str) -> Parse<u64> {
        match self.next(what)?.into_inner() {
            Token::Natural(value) => Ok(value),
            found => self.fail(ParserError::Expected(what.into(), found)),
        }
    }

    pub(crate) fn string(&mut self, what: &str) -> Parse<Rc<str>> {
        match self.next(what)?.into_inner() {
            Token::StringLiteral(string) => Ok(string),
            found => self.fail(ParserError::Expected(what.into(), found)),
        }
    }

    fn limited_string(&mut self, what: &'static str, max: usize) -> Parse<Rc<str>> {
        let value = self.string("a string literal")?;
        if value.len() > max {
            return self.fail(ParserError::StringTooLong { what, value, max });
        }

        Ok(value)
    }

    pub(crate) fn name(&mut self) -> Parse<Located<NameString>> {
        let (location, token) = self.next("a name")?.split();
        match token {
            Token::Name(name) => Ok(Located::at(name, location)),
            found => self.fail(ParserError::Expected("a name".into(), found)),
        }
    }

    /// Una palabra clave de una enumeración en particular.
    pub(crate) fn enumerant<T, F>(&mut self, what: &'static str, pick: F) -> Parse<T>
    where
        F: FnOnce(Keyword) -> Option<T>,
    {
        match self.next(what)?.into_inner() {
            Token::Keyword(keyword) => match pick(keyword) {
                Some(value) => Ok(value),
                None => self.fail(ParserError::BadEnumerant(what, Token::Keyword(keyword))),
            },

            found => self.fail(ParserError::Expected(what.into(), found)),
        }
    }

    /// Consume el siguiente token si es igual a `token`.
    pub(crate) fn accept(&mut self, token: &Token) -> Parse<bool> {
        if self.peek_is(token)? {
            self.next("")?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub(crate) fn expect(&mut self, token: Token) -> Parse<()> {
        let found = self.next(&token.to_string())?.into_inner();
        if found == token {
            Ok(())
        } else {
            self.fail(ParserError::Expected(token.to_string(), found))
        }
    }

    pub(crate) fn peek_is(&mut self, token: &Token) -> Parse<bool> {
        Ok(self.peek()?.as_ref() == Some(token))
    }

    /// Observa el siguiente token sin consumirlo.
    pub(crate) fn peek(&mut self) -> Parse<Option<Token>> {
        // Los errores léxicos se reportan tan pronto se observan
        if let Some(Err(_)) = self.tokens.peek() {
            if let Some(Err(error)) = self.tokens.next() {
                return Err(error.map(ParserError::Lexer));
            }
        }

        Ok(self
            .tokens
            .peek()
            .and_then(|result| result.as_ref().ok())
            .map(|token| token.val().clone()))
    }

    pub(crate) fn next(&mut self, expected: &str) -> Parse<Located<Token>> {
        match self.tokens.next() {
            Some(Ok(token)) => {
                self.last_known = token.location().clone();
                Ok(token)
            }

            Some(Err(error)) => Err(error.map(ParserError::Lexer)),
            None => self.fail(ParserError::UnexpectedEof(expected.into())),
        }
    }

    pub(crate) fn fail<T, E: Into<ParserError>>(&self, error: E) -> Parse<T> {
        Err(Located::at(error.into(), self.last_known.clone()))
    }
}

/// Convierte un UUID textual a la disposición de bytes de `ToUUID`.
///
/// Los primeros tres grupos se almacenan en little-endian y los últimos
/// dos en el orden en que aparecen.
fn uuid(text: &str) -> Option<[u8; 16]> {
    let groups: Vec<&str> = text.split('-').collect();
    let lengths: Vec<usize> = groups.iter().map(|group| group.len()).collect();

    if lengths != [8, 4, 4, 4, 12] || !groups.iter().all(|g| g.chars().all(|c| c.is_ascii_hexdigit())) {
        return None;
    }

    let digits = groups.concat();
    let mut bytes = [0; 16];
    for (i, byte) in bytes.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&digits[2 * i..2 * i + 2], 16).ok()?;
    }

    bytes[0..4].reverse();
    bytes[4..6].reverse();
    bytes[6..8].reverse();

    Some(bytes)
}

/// Comprime un identificador EISA `AAA####` a 32 bits.
fn eisa_id(text: &str) -> Option<u32> {
    let bytes = text.as_bytes();
    if bytes.len() != 7 {
        return None;
    }

    let (vendor, product) = bytes.split_at(3);
    if !vendor.iter().all(u8::is_ascii_uppercase) || !product.iter().all(u8::is_ascii_hexdigit) {
        return None;
    }

    let letters = vendor
        .iter()
        .fold(0, |id, &letter| (id << 5) | u32::from(letter - b'@'));

    let product = u32::from_str_radix(&text[3..], 16).ok()?;
    let id = (letters << 16) | product;

    Some(id.swap_bytes())
}
