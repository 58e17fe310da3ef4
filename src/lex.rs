//! Análisis léxico.
//!
//! # Tokenization
//! Esta es la primera fase del compilador. Descompone un [`InputStream`]
//! (flujo de caracteres) en unidades léxicas denominadas tokens. Los espacios
//! en blanco y los comentarios (`// ...` y `/* ... */`) se descartan durante
//! esta operación. Cada token emitido está asociado a una ubicación en el
//! código fuente original.
//!
//! # Contenido de un token
//! Operadores, puntuación y palabras clave se identifican por lo que son y no
//! incluyen lexemas. Las rutas del namespace se descomponen de inmediato en
//! [`NameString`]. Las constantes literales se resuelven a sus valores.
//!
//! # Reglas importantes del lenguaje
//! - El lenguaje es case-insensitive: `DefinitionBlock`, `DEFINITIONBLOCK` y
//!   `definitionblock` son la misma palabra clave. Los nombres se convierten
//!   a mayúsculas.
//! - Un segmento de nombre tiene entre 1 y 4 caracteres y se rellena con `_`.
//! - Los identificadores tienen un límite de longitud de 512 bytes.
//! - Las constantes numéricas son naturales; `0x` introduce hexadecimal y un
//!   `0` inicial seguido de dígitos introduce octal.
//! - Los literales de cadena solo admiten ASCII entre 0x01 y 0x7f, incluso
//!   a través de escapes: el terminador nulo lo agrega el emisor.
//!
//! # Errores
//! El lexer no se recupera de errores. Tras el primer error el flujo de
//! tokens termina.

use crate::{
    name::{NameError, NameString},
    ops::{AccessType, LockRule, ObjectType, Op, RegionSpace, SerializeRule, UpdateRule},
    resource::{
        AddressDecode, BusMaster, Cacheability, DecodeWidth, DmaSpeed, IsaRanges, MaxFixed,
        MemoryType, MinFixed, Polarity, ReadWrite, ResourceMacro, ResourceUsage, Sharing,
        TransferWidth, TranslationDensity, TranslationType, Trigger,
    },
    source::{InputStream, Located, Location, SourceError},
};

use std::{
    fmt::{self, Display},
    rc::Rc,
    str::FromStr,
};

use thiserror::Error;

// Case-insensitive
pub use unicase::Ascii as NoCase;

/// Longitud máxima de un identificador.
pub const MAX_IDENTIFIER_LEN: usize = 512;

/// Error de escaneo.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LexerError {
    /// Falla de lectura o codificación del [`InputStream`].
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Carácter desconocido o inesperado en el flujo de entrada.
    #[error("Bad character {0:?} in input stream")]
    BadChar(char),

    /// Dígito que no corresponde a la base de la constante.
    #[error("Bad digit {0:?} in base-{1} integer literal")]
    BadDigit(char, u32),

    /// Prefijo `0x` sin dígitos.
    #[error("Hexadecimal literal has no digits after `0x`")]
    MissingHexDigits,

    /// Una constante entera no cabe en 64 bits.
    #[error("Integer literal overflow, valid range is [0, {}]", u64::MAX)]
    IntOverflow,

    #[error("Unterminated string literal")]
    UnterminatedString,

    #[error("Unterminated block comment")]
    UnterminatedComment,

    #[error("Bad escape sequence `\\{0}` in string literal")]
    BadEscape(char),

    /// Las cadenas AML solo admiten ASCII entre 0x01 y 0x7f.
    #[error("Character {0:?} is not allowed in a string literal, only ASCII 0x01-0x7f")]
    BadStringChar(char),

    #[error("Identifier exceeds the allowed length of {} characters", MAX_IDENTIFIER_LEN)]
    IdentifierTooLong,

    #[error(transparent)]
    Name(#[from] NameError),
}

/// Objeto resultante del análisis léxico.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Palabra clave.
    Keyword(Keyword),

    /// Ruta del namespace.
    Name(NameString),

    /// Literal de cadena, ya sin secuencias de escape.
    StringLiteral(Rc<str>),

    /// Literal natural.
    Natural(u64),

    /// `,`
    Comma,

    /// `(`
    OpenParen,

    /// `)`
    CloseParen,

    /// `{`
    OpenCurly,

    /// `}`
    CloseCurly,
}

impl Display for Token {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Token::*;

        match self {
            Keyword(keyword) => write!(fmt, "keyword `{}`", keyword),
            Name(name) => write!(fmt, "name `{}`", name),
            StringLiteral(string) => write!(fmt, "string literal {:?}", string),
            Natural(integer) => write!(fmt, "literal `{:#x}`", integer),
            Comma => fmt.write_str("`,`"),
            OpenParen => fmt.write_str("`(`"),
            CloseParen => fmt.write_str("`)`"),
            OpenCurly => fmt.write_str("`{`"),
            CloseCurly => fmt.write_str("`}`"),
        }
    }
}

/// Una palabra clave.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Keyword {
    DefinitionBlock,
    Offset,
    Local(u8),
    Arg(u8),
    Op(Op),
    Resource(ResourceMacro),
    Region(RegionSpace),
    Access(AccessType),
    Lock(LockRule),
    Update(UpdateRule),
    Serialize(SerializeRule),
    ObjType(ObjectType),
    ReadWrite(ReadWrite),
    Decode(DecodeWidth),
    Trigger(Trigger),
    Polarity(Polarity),
    Sharing(Sharing),
    DmaSpeed(DmaSpeed),
    BusMaster(BusMaster),
    Transfer(TransferWidth),
    Usage(ResourceUsage),
    AddressDecode(AddressDecode),
    MinFixed(MinFixed),
    MaxFixed(MaxFixed),
    Cache(Cacheability),
    MemoryType(MemoryType),
    Translation(TranslationType),
    IsaRanges(IsaRanges),
    Density(TranslationDensity),
}

impl Display for Keyword {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Keyword::DefinitionBlock => fmt.write_str("DefinitionBlock"),
            Keyword::Offset => fmt.write_str("Offset"),
            Keyword::Local(index) => write!(fmt, "Local{}", index),
            Keyword::Arg(index) => write!(fmt, "Arg{}", index),
            Keyword::Op(op) => op.fmt(fmt),
            Keyword::Resource(resource) => resource.fmt(fmt),
            Keyword::Region(space) => space.fmt(fmt),
            Keyword::Access(access) => access.fmt(fmt),
            Keyword::Lock(lock) => lock.fmt(fmt),
            Keyword::Update(update) => update.fmt(fmt),
            Keyword::Serialize(rule) => rule.fmt(fmt),
            Keyword::ObjType(typ) => typ.fmt(fmt),
            Keyword::ReadWrite(rw) => rw.fmt(fmt),
            Keyword::Decode(decode) => decode.fmt(fmt),
            Keyword::Trigger(trigger) => trigger.fmt(fmt),
            Keyword::Polarity(polarity) => polarity.fmt(fmt),
            Keyword::Sharing(sharing) => sharing.fmt(fmt),
            Keyword::DmaSpeed(speed) => speed.fmt(fmt),
            Keyword::BusMaster(master) => master.fmt(fmt),
            Keyword::Transfer(width) => width.fmt(fmt),
            Keyword::Usage(usage) => usage.fmt(fmt),
            Keyword::AddressDecode(decode) => decode.fmt(fmt),
            Keyword::MinFixed(min) => min.fmt(fmt),
            Keyword::MaxFixed(max) => max.fmt(fmt),
            Keyword::Cache(cache) => cache.fmt(fmt),
            Keyword::MemoryType(memory) => memory.fmt(fmt),
            Keyword::Translation(translation) => translation.fmt(fmt),
            Keyword::IsaRanges(ranges) => ranges.fmt(fmt),
            Keyword::Density(density) => density.fmt(fmt),
        }
    }
}

impl FromStr for Keyword {
    type Err = ();

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        const KEYWORDS: &[(NoCase<&str>, Keyword)] = &[
            (NoCase::new("DefinitionBlock"), Keyword::DefinitionBlock),
            (NoCase::new("Offset"),          Keyword::Offset),
            (NoCase::new("Local0"),          Keyword::Local(0)),
            (NoCase::new("Local1"),          Keyword::Local(1)),
            (NoCase::new("Local2"),          Keyword::Local(2)),
            (NoCase::new("Local3"),          Keyword::Local(3)),
            (NoCase::new("Local4"),          Keyword::Local(4)),
            (NoCase::new("Local5"),          Keyword::Local(5)),
            (NoCase::new("Local6"),          Keyword::Local(6)),
            (NoCase::new("Local7"),          Keyword::Local(7)),
            (NoCase::new("Arg0"),            Keyword::Arg(0)),
            (NoCase::new("Arg1"),            Keyword::Arg(1)),
            (NoCase::new("Arg2"),            Keyword::Arg(2)),
            (NoCase::new("Arg3"),            Keyword::Arg(3)),
            (NoCase::new("Arg4"),            Keyword::Arg(4)),
            (NoCase::new("Arg5"),            Keyword::Arg(5)),
            (NoCase::new("Arg6"),            Keyword::Arg(6)),
        ];

        let word = NoCase::new(string);
        let keyword = find(KEYWORDS, word, |keyword| keyword)
            .or_else(|| Op::lookup(string).map(Keyword::Op))
            .or_else(|| find(ResourceMacro::KEYWORDS, word, Keyword::Resource))
            .or_else(|| find(RegionSpace::KEYWORDS, word, Keyword::Region))
            .or_else(|| find(AccessType::KEYWORDS, word, Keyword::Access))
            .or_else(|| find(LockRule::KEYWORDS, word, Keyword::Lock))
            .or_else(|| find(UpdateRule::KEYWORDS, word, Keyword::Update))
            .or_else(|| find(SerializeRule::KEYWORDS, word, Keyword::Serialize))
            .or_else(|| find(ObjectType::KEYWORDS, word, Keyword::ObjType))
            .or_else(|| find(ReadWrite::KEYWORDS, word, Keyword::ReadWrite))
            .or_else(|| find(DecodeWidth::KEYWORDS, word, Keyword::Decode))
            .or_else(|| find(Trigger::KEYWORDS, word, Keyword::Trigger))
            .or_else(|| find(Polarity::KEYWORDS, word, Keyword::Polarity))
            .or_else(|| find(Sharing::KEYWORDS, word, Keyword::Sharing))
            .or_else(|| find(DmaSpeed::KEYWORDS, word, Keyword::DmaSpeed))
            .or_else(|| find(BusMaster::KEYWORDS, word, Keyword::BusMaster))
            .or_else(|| find(TransferWidth::KEYWORDS, word, Keyword::Transfer))
            .or_else(|| find(ResourceUsage::KEYWORDS, word, Keyword::Usage))
            .or_else(|| find(AddressDecode::KEYWORDS, word, Keyword::AddressDecode))
            .or_else(|| find(MinFixed::KEYWORDS, word, Keyword::MinFixed))
            .or_else(|| find(MaxFixed::KEYWORDS, word, Keyword::MaxFixed))
            .or_else(|| find(Cacheability::KEYWORDS, word, Keyword::Cache))
            .or_else(|| find(MemoryType::KEYWORDS, word, Keyword::MemoryType))
            .or_else(|| find(TranslationType::KEYWORDS, word, Keyword::Translation))
            .or_else(|| find(IsaRanges::KEYWORDS, word, Keyword::IsaRanges))
            .or_else(|| find(TranslationDensity::KEYWORDS, word, Keyword::Density));

        keyword.ok_or(())
    }
}

/// Busca una palabra en una tabla de palabras clave.
fn find<T, F>(table: &[(NoCase<&'static str>, T)], word: NoCase<&str>, wrap: F) -> Option<Keyword>
where
    T: Copy,
    F: FnOnce(T) -> Keyword,
{
    table
        .iter()
        .find(|&&(name, _)| name == word)
        .map(|&(_, value)| wrap(value))
}

/// Máquina de estados para análisis léxico.
///
/// Un lexer puede encontrarse en uno de diversos estados. La
/// salida del lexer, así como su siguiente estado, se define
/// a partir de tanto su estado actual como el siguiente carácter
/// encontrado en el flujo de entrada.
pub struct Lexer<S: Iterator> {
    source: std::iter::Peekable<S>,
    state: State,
    start: Location,
    next: Location,
}

/// Posibles estados del lexer.
enum State {
    /// Estado que ocurre antes de encontrar el inicio de un token.
    Start,

    /// Se encontró un error o el final de la entrada. No hay más tokens.
    Done,

    /// Estado de completitud; siempre emite el token incluido,
    /// consume la entrada actual y pasa a [`State::Start`].
    Complete(Token),

    /// Se encontró `/`, debería seguir `/` o `*`.
    Slash,

    /// Comentario de línea, termina con `'\n'`.
    LineComment,

    /// Comentario de bloque.
    BlockComment,

    /// Se encontró `*` dentro de un comentario de bloque.
    BlockCommentStar,

    /// Se encontró un `0` inicial.
    Zero,

    /// Se encontró `0x`, debe seguir al menos un dígito.
    HexPrefix,

    /// Constante entera en la base indicada.
    Integer { radix: u32, value: u64 },

    /// Término que puede ser una palabra clave o una ruta.
    Word(String),

    /// Literal de cadena.
    Str(String),

    /// Se encontró `\` dentro de un literal de cadena.
    Escape(String),

    /// Secuencia `\x` con hasta dos dígitos hexadecimales.
    Hex { string: String, value: u8, digits: u8 },
}

impl<S: InputStream> Lexer<S> {
    /// Crea un lexer en estado inicial a partir de un flujo.
    pub fn new(start: Location, source: S) -> Self {
        let next = start.clone();
        Lexer {
            source: source.peekable(),
            state: State::Start,
            start,
            next,
        }
    }

    /// Ubicación del siguiente carácter sin consumir.
    pub fn here(&self) -> &Location {
        &self.next
    }

    /// Intenta construir un siguiente token.
    fn lex(&mut self) -> Result<Option<(Token, Location)>, LexerError> {
        use {State::*, Token::*};

        let mut last_accepted = self.start.clone();
        let token = loop {
            // Se espera un siguiente carácter, fallando si hay error de E/S
            let peeked = self
                .source
                .peek()
                .map(|result| result.as_ref().map(|&(c, _)| c).map_err(|_| ()));

            let next_char = match peeked {
                None => None,
                Some(Ok(c)) => Some(c),
                Some(Err(())) => match self.source.next() {
                    Some(Err(error)) => break Err(error.into()),
                    _ => None,
                },
            };

            // La posición de origen se mueve junto a la posición
            // siguiente siempre que no se haya encontrado una
            // frontera de token
            if let Start = self.state {
                self.start = self.next.clone();
            }

            match (&mut self.state, next_char) {
                (Done, _) => return Ok(None),

                // Tokens triviales
                (Start, None) => return Ok(None),
                (Start, Some(',')) => self.state = Complete(Comma),
                (Start, Some('(')) => self.state = Complete(OpenParen),
                (Start, Some(')')) => self.state = Complete(CloseParen),
                (Start, Some('{')) => self.state = Complete(OpenCurly),
                (Start, Some('}')) => self.state = Complete(CloseCurly),
                (Start, Some('/')) => self.state = Slash,
                (Start, Some('"')) => self.state = Str(String::new()),

                // Palabras clave y rutas
                (Start, Some(c)) if c.is_ascii_alphabetic() || matches!(c, '_' | '\\' | '^') => {
                    self.state = Word(c.to_string())
                }

                (Start, Some('0')) => self.state = Zero,

                // Inicio de una constante decimal. No se consume el dígito,
                // ya que el estado de constante entera se encarga de ello.
                (Start, Some(c)) if c.is_ascii_digit() => {
                    self.state = Integer {
                        radix: 10,
                        value: 0,
                    };
                    continue;
                }

                // Espacios en blanco y caracteres inesperados
                (Start, Some(c)) if c.is_whitespace() => (),
                (Start, Some(c)) => break Err(LexerError::BadChar(c)),

                // Emisión retardada de tokens cualesquiera
                (Complete(value), _) => break Ok(std::mem::replace(value, Comma)),

                // Comentarios
                (Slash, Some('/')) => self.state = LineComment,
                (Slash, Some('*')) => self.state = BlockComment,
                (Slash, _) => break Err(LexerError::BadChar('/')),

                (LineComment, Some('\n')) | (LineComment, None) => self.state = Start,
                (LineComment, Some(_)) => (),

                (BlockComment, Some('*')) => self.state = BlockCommentStar,
                (BlockComment, Some(_)) => (),
                (BlockCommentStar, Some('/')) => self.state = Start,
                (BlockCommentStar, Some('*')) => (),
                (BlockCommentStar, Some(_)) => self.state = BlockComment,
                (BlockComment, None) | (BlockCommentStar, None) => {
                    break Err(LexerError::UnterminatedComment)
                }

                // Prefijos `0x` y `0`
                (Zero, Some('x')) | (Zero, Some('X')) => self.state = HexPrefix,

                (HexPrefix, Some(c)) if c.is_ascii_hexdigit() => {
                    self.state = Integer {
                        radix: 16,
                        value: 0,
                    };
                    continue;
                }

                (HexPrefix, Some(c)) if c.is_ascii_alphanumeric() => {
                    break Err(LexerError::BadDigit(c, 16))
                }

                (HexPrefix, _) => break Err(LexerError::MissingHexDigits),

                (Zero, Some(c)) if c.is_ascii_alphanumeric() => {
                    self.state = Integer { radix: 8, value: 0 };
                    continue;
                }

                (Zero, _) => break Ok(Natural(0)),

                // Acumulación dígito por dígito de constantes enteras
                (Integer { radix, value }, Some(c)) if c.is_ascii_alphanumeric() => {
                    let digit = match c.to_digit(*radix) {
                        Some(digit) => u64::from(digit),
                        None => break Err(LexerError::BadDigit(c, *radix)),
                    };

                    match value
                        .checked_mul(u64::from(*radix))
                        .and_then(|n| n.checked_add(digit))
                    {
                        Some(result) => *value = result,
                        None => break Err(LexerError::IntOverflow),
                    }
                }

                // Si sigue algo que no es un dígito, la constante ha terminado
                (Integer { value, .. }, _) => break Ok(Natural(*value)),

                // Extensión de términos
                (Word(word), Some(c)) if is_word_char(c) => {
                    if word.len() >= MAX_IDENTIFIER_LEN {
                        break Err(LexerError::IdentifierTooLong);
                    }

                    word.push(c);
                }

                // Si sigue algo que no puede formar parte del término, ha terminado
                (Word(word), _) => break classify(word),

                // Literales de cadena
                (Str(string), Some('"')) => {
                    let string = std::mem::take(string);
                    self.state = Complete(StringLiteral(string.into()));
                }

                (Str(_), Some('\n')) | (Str(_), None) => {
                    break Err(LexerError::UnterminatedString)
                }

                (Str(string), Some('\\')) => {
                    let string = std::mem::take(string);
                    self.state = Escape(string);
                }

                (Str(_), Some(c)) if !is_string_char(c) => break Err(LexerError::BadStringChar(c)),
                (Str(string), Some(c)) => string.push(c),

                (Escape(_), Some('\n')) | (Escape(_), None) => {
                    break Err(LexerError::UnterminatedString)
                }

                (Escape(string), Some('x')) => {
                    let string = std::mem::take(string);
                    self.state = Hex {
                        string,
                        value: 0,
                        digits: 0,
                    };
                }

                (Escape(string), Some(c)) => {
                    let escaped = match c {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '0' => '\0',
                        'a' => '\x07',
                        'b' => '\x08',
                        'f' => '\x0c',
                        'v' => '\x0b',
                        '\\' | '"' | '\'' => c,
                        _ => break Err(LexerError::BadEscape(c)),
                    };

                    if !is_string_char(escaped) {
                        break Err(LexerError::BadStringChar(escaped));
                    }

                    let mut string = std::mem::take(string);
                    string.push(escaped);
                    self.state = Str(string);
                }

                (
                    Hex {
                        value, digits: d @ 0..=1, ..
                    },
                    Some(c),
                ) if c.is_ascii_hexdigit() => {
                    *value = (*value << 4) | c.to_digit(16).unwrap_or(0) as u8;
                    *d += 1;
                }

                (Hex { digits: 0, .. }, _) => break Err(LexerError::BadEscape('x')),

                // Tras los dígitos se retorna al literal sin consumir
                (Hex { string, value, .. }, _) => {
                    let escaped = char::from(*value);
                    if !is_string_char(escaped) {
                        break Err(LexerError::BadStringChar(escaped));
                    }

                    let mut string = std::mem::take(string);
                    string.push(escaped);
                    self.state = Str(string);
                    continue;
                }
            }

            // Si no hubo `continue`, aquí se consume el carácter que
            // se observó con lookahead anteriormente
            if let Some(Ok((_, next_position))) = self.source.next() {
                last_accepted = std::mem::replace(&mut self.next, next_position);
            }
        };

        token.map(|token| Some((token, last_accepted)))
    }
}

impl<S: InputStream> Iterator for Lexer<S> {
    type Item = Result<Located<Token>, Located<LexerError>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.lex() {
            Ok(None) => {
                self.state = State::Done;
                None
            }

            Ok(Some((token, last_accepted))) => {
                self.state = State::Start;

                let location = Location::span(self.start.clone(), &last_accepted);
                Some(Ok(Located::at(token, location)))
            }

            Err(error) => {
                self.state = State::Done;
                Some(Err(Located::at(error, self.next.clone())))
            }
        }
    }
}

/// Determina si un carácter puede pertenecer a un término.
fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '^')
}

/// Determina si un carácter puede formar parte de una cadena AML.
fn is_string_char(c: char) -> bool {
    matches!(c, '\x01'..='\x7f')
}

/// Decide si un término es una palabra clave o una ruta.
fn classify(word: &mut String) -> Result<Token, LexerError> {
    let word = std::mem::take(word);

    let plain = !word.contains('.') && !word.starts_with(&['\\', '^'][..]);
    if plain {
        if let Ok(keyword) = Keyword::from_str(&word) {
            return Ok(Token::Keyword(keyword));
        }
    }

    Ok(Token::Name(NameString::from_str(&word)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source;

    fn lex(text: &str) -> Result<Vec<Token>, LexerError> {
        let (start, stream) = source::consume(text.as_bytes(), "test.asl");
        Lexer::new(start, stream)
            .map(|result| result.map(Located::into_inner).map_err(Located::into_inner))
            .collect()
    }

    fn name(text: &str) -> Token {
        Token::Name(text.parse().unwrap())
    }

    #[test]
    fn keywords_ignore_case() {
        let tokens = lex("DEFINITIONBLOCK definitionblock Scope local3 ARG6").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Keyword(Keyword::DefinitionBlock),
                Token::Keyword(Keyword::DefinitionBlock),
                Token::Keyword(Keyword::Op(Op::Scope)),
                Token::Keyword(Keyword::Local(3)),
                Token::Keyword(Keyword::Arg(6)),
            ]
        );
    }

    #[test]
    fn comments_are_discarded() {
        let tokens = lex("// line\n( /* block\n * still */ )").unwrap();
        assert_eq!(tokens, vec![Token::OpenParen, Token::CloseParen]);
    }

    #[test]
    fn numbers() {
        let tokens = lex("0 42 0x1F 0X10 017").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Natural(0),
                Token::Natural(42),
                Token::Natural(0x1f),
                Token::Natural(0x10),
                Token::Natural(0o17),
            ]
        );

        assert!(matches!(lex("0x1G"), Err(LexerError::BadDigit('G', 16))));
        assert!(matches!(lex("0xG"), Err(LexerError::BadDigit('G', 16))));
        assert!(matches!(lex("0x"), Err(LexerError::MissingHexDigits)));
        assert!(matches!(lex("0x )"), Err(LexerError::MissingHexDigits)));
        assert!(matches!(
            lex("0xFFFFFFFFFFFFFFFFF"),
            Err(LexerError::IntOverflow)
        ));
    }

    #[test]
    fn names() {
        let tokens = lex(r"\_SB.PCI0 ^^foo _hid DEV0").unwrap();
        assert_eq!(
            tokens,
            vec![name(r"\_SB_.PCI0"), name("^^FOO_"), name("_HID"), name("DEV0")]
        );

        assert!(matches!(
            lex("ABCDE"),
            Err(LexerError::Name(NameError::SegmentLength(_)))
        ));
    }

    #[test]
    fn strings() {
        let tokens = lex(r#""ACPI0000" "a\tb\x41\"""#).unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::StringLiteral("ACPI0000".into()),
                Token::StringLiteral("a\tbA\"".into()),
            ]
        );

        assert!(matches!(lex("\"open"), Err(LexerError::UnterminatedString)));
        assert!(matches!(lex(r#""\q""#), Err(LexerError::BadEscape('q'))));
    }

    #[test]
    fn strings_are_plain_ascii() {
        assert!(matches!(lex(r#""a\0b""#), Err(LexerError::BadStringChar('\0'))));
        assert!(matches!(lex(r#""\x00""#), Err(LexerError::BadStringChar('\0'))));
        assert!(matches!(lex(r#""\xFF""#), Err(LexerError::BadStringChar('\u{ff}'))));
        assert!(matches!(lex(r#""\x80""#), Err(LexerError::BadStringChar('\u{80}'))));
        assert!(matches!(lex("\"caf\u{e9}\""), Err(LexerError::BadStringChar('\u{e9}'))));

        let tokens = lex(r#""\x7f~""#).unwrap();
        assert_eq!(tokens, vec![Token::StringLiteral("\x7f~".into())]);
    }

    #[test]
    fn invalid_utf8_is_a_lexical_error() {
        let (start, stream) = source::consume(&b"( \xc3( )"[..], "test.asl");
        let mut lexer = Lexer::new(start, stream);

        assert!(matches!(lexer.next(), Some(Ok(_))));
        match lexer.next() {
            Some(Err(error)) => {
                assert_eq!(error.location().start().column(), 3);
                assert!(matches!(
                    error.into_inner(),
                    LexerError::Source(SourceError::Encoding)
                ));
            }

            _ => panic!("expected an encoding error"),
        }
    }

    #[test]
    fn errors_end_the_stream() {
        let (start, stream) = source::consume("( $ )".as_bytes(), "test.asl");
        let mut lexer = Lexer::new(start, stream);

        assert!(matches!(lexer.next(), Some(Ok(_))));
        assert!(matches!(lexer.next(), Some(Err(_))));
        assert!(lexer.next().is_none());
    }

    #[test]
    fn identifier_length_limit() {
        let long = vec!["ABCD"; 103].join(".");
        assert!(matches!(lex(&long), Err(LexerError::IdentifierTooLong)));

        let fits = vec!["ABCD"; 102].join(".");
        assert!(lex(&fits).is_ok());
    }

    #[test]
    fn unterminated_comment() {
        assert!(matches!(
            lex("/* never closed"),
            Err(LexerError::UnterminatedComment)
        ));
    }
}
