//! Rastreo de ubicaciones originales en código fuente ASL.
//!
//! Tokens, nodos del AST y errores llevan cuenta de la posición o rango
//! de posiciones en el archivo original donde se originaron. Esto permite
//! que un diagnóstico señale la línea exacta que provocó el fallo.

use std::{
    cell::RefCell,
    fmt::{self, Debug, Display, Formatter},
    io::{self, BufRead},
    ops::Range,
    rc::Rc,
    vec,
};

use thiserror::Error;

/// Un flujo de entrada, carácter por carácter.
pub trait InputStream: Iterator<Item = Result<(char, Location), SourceError>> {}

impl<I> InputStream for I where I: Iterator<Item = Result<(char, Location), SourceError>> {}

/// Falla al leer el texto fuente.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// La línea contiene una secuencia que no es UTF-8.
    #[error("Source text is not valid UTF-8")]
    Encoding,
}

/// Un objeto cualquiera con una posición original asociada.
#[derive(Debug, Clone)]
pub struct Located<T> {
    location: Location,
    value: T,
}

impl<T> Located<T> {
    /// Obtiene el valor.
    pub fn val(&self) -> &T {
        &self.value
    }

    /// Obtiene la ubicación.
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Descarta la ubicación y toma ownership del valor.
    pub fn into_inner(self) -> T {
        self.value
    }

    /// Descompone y toma ownership de las dos partes.
    pub fn split(self) -> (Location, T) {
        (self.location, self.value)
    }

    /// Construye a partir de un valor y una ubicación.
    pub fn at(value: T, location: Location) -> Self {
        Located { value, location }
    }

    /// Transforma el valor con la misma ubicación.
    pub fn map<U, F>(self, map: F) -> Located<U>
    where
        F: FnOnce(T) -> U,
    {
        Located {
            value: map(self.value),
            location: self.location,
        }
    }
}

impl<T> AsRef<T> for Located<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}

/// Una ubicación está conformada por un origen y un rango de posiciones.
#[derive(Clone)]
pub struct Location {
    from: Rc<Source>,
    position: Range<Position>,
}

impl Location {
    /// Unifica un rango de ubicaciones. Se asume el mismo origen.
    pub fn span(from: Location, to: &Location) -> Self {
        Location {
            from: from.from,
            position: from.position.start..to.position.end,
        }
    }

    /// Obtiene la posición de inicio.
    pub fn start(&self) -> Position {
        self.position.start
    }

    /// Obtiene la posición de fin.
    pub fn end(&self) -> Position {
        self.position.end
    }

    /// Obtiene el origen de esta ubicación.
    pub fn source(&self) -> &Source {
        &self.from
    }
}

impl Display for Location {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:", self.from.name)?;

        let Range { start, end } = self.position;
        if end == start.advance() {
            // Solo se señala una columna en específico
            write!(formatter, "{}", start)
        } else {
            write!(formatter, "[{}-{}]", start, end.back())
        }
    }
}

impl Debug for Location {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        <Self as Display>::fmt(self, formatter)
    }
}

/// Una posición línea-columna en un archivo.
///
/// Las columnas cuentan caracteres; un tabulador ocupa una sola columna.
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct Position {
    line: u32,
    column: u32,
}

impl Position {
    /// Obtiene el número de línea.
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Obtiene el número de columna.
    pub fn column(&self) -> u32 {
        self.column
    }

    /// Incrementa el número de columna.
    pub fn advance(self) -> Position {
        Position {
            line: self.line,
            column: self.column + 1,
        }
    }

    /// Decrementa el número de columna.
    pub fn back(self) -> Position {
        Position {
            line: self.line,
            column: self.column.saturating_sub(1).max(1),
        }
    }

    /// Incrementa el número de línea y retorna a la columna 1.
    pub fn newline(self) -> Position {
        Position {
            line: self.line + 1,
            column: 1,
        }
    }

}

impl Default for Position {
    fn default() -> Self {
        Position { line: 1, column: 1 }
    }
}

impl Display for Position {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}", self.line, self.column)
    }
}

/// Nombre de origen e histórico interior de líneas.
///
/// Las líneas se retienen conforme el lexer las consume, de manera
/// que los diagnósticos puedan citarlas después. Una línea que no es
/// UTF-8 válido se retiene con caracteres de reemplazo.
pub struct Source {
    name: String,
    lines: RefCell<Vec<String>>,
}

impl Source {
    /// Nombre del archivo o flujo de origen.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoca `f` con el contenido de una línea ya leída (base 1).
    ///
    /// Si la línea no se ha leído todavía se entrega una cadena vacía.
    pub fn with_line<R, F>(&self, line_number: u32, f: F) -> R
    where
        F: FnOnce(&str) -> R,
    {
        let lines = self.lines.borrow();
        let line = (line_number as usize)
            .checked_sub(1)
            .and_then(|index| lines.get(index))
            .map(String::as_str)
            .unwrap_or("");

        f(line)
    }
}

/// Transforma un flujo de entrada estándar en uno que itera por carácter.
///
/// La ubicación que se encuentra en la tupla de retorno es la posición que
/// le corresponderá al primer caracter en la salida. Cada carácter emitido
/// incluye a la ubicación del siguiente. Los finales de línea `\r\n` se
/// entregan como un solo `\n`.
pub fn consume<R, S>(reader: R, name: S) -> (Location, impl InputStream)
where
    R: BufRead,
    S: Into<String>,
{
    let source = Rc::new(Source {
        name: name.into(),
        lines: Default::default(),
    });

    let position = Position::default();
    let start = Location {
        from: Rc::clone(&source),
        position: position..position.advance(),
    };

    let chars = SourceChars {
        reader,
        source,
        position,
        pending: Vec::new().into_iter(),
        failed: None,
        done: false,
    };

    (start, chars)
}

/// Lector línea por línea que valida la codificación antes de entregar
/// los caracteres de cada línea.
struct SourceChars<R> {
    reader: R,
    source: Rc<Source>,
    position: Position,
    pending: vec::IntoIter<char>,
    failed: Option<SourceError>,
    done: bool,
}

impl<R: BufRead> SourceChars<R> {
    /// Carga la siguiente línea. Retorna `false` al final de la entrada.
    fn read_line(&mut self) -> Result<bool, SourceError> {
        let mut bytes = Vec::new();
        if self.reader.read_until(b'\n', &mut bytes)? == 0 {
            return Ok(false);
        }

        if bytes.last() == Some(&b'\n') {
            bytes.pop();
            if bytes.last() == Some(&b'\r') {
                bytes.pop();
            }
        }

        // Los caracteres válidos previos a un error se entregan normalmente,
        // así el error queda ubicado en la columna exacta
        let mut chars: Vec<char> = match std::str::from_utf8(&bytes) {
            Ok(line) => line.chars().collect(),
            Err(error) => {
                let valid = &bytes[..error.valid_up_to()];
                self.failed = Some(SourceError::Encoding);
                String::from_utf8_lossy(valid).chars().collect()
            }
        };

        if self.failed.is_none() {
            chars.push('\n');
        }

        let line = String::from_utf8_lossy(&bytes).into_owned();
        self.source.lines.borrow_mut().push(line);
        self.pending = chars.into_iter();

        Ok(true)
    }
}

impl<R: BufRead> Iterator for SourceChars<R> {
    type Item = Result<(char, Location), SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(c) = self.pending.next() {
                self.position = match c {
                    '\n' => self.position.newline(),
                    _ => self.position.advance(),
                };

                let location = Location {
                    from: Rc::clone(&self.source),
                    position: self.position..self.position.advance(),
                };

                return Some(Ok((c, location)));
            }

            if let Some(error) = self.failed.take() {
                self.done = true;
                return Some(Err(error));
            }

            if self.done {
                return None;
            }

            match self.read_line() {
                Ok(true) => (),
                Ok(false) => {
                    self.done = true;
                    return None;
                }

                Err(error) => {
                    self.done = true;
                    return Some(Err(error));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(bytes: &[u8]) -> Vec<Result<(char, u32, u32), String>> {
        let (_, stream) = consume(bytes, "test.asl");
        stream
            .map(|result| {
                result
                    .map(|(c, next)| (c, next.start().line(), next.start().column()))
                    .map_err(|error| error.to_string())
            })
            .collect()
    }

    #[test]
    fn positions_count_characters() {
        assert_eq!(
            chars(b"a\tb\r\nc"),
            vec![
                Ok(('a', 1, 2)),
                Ok(('\t', 1, 3)),
                Ok(('b', 1, 4)),
                Ok(('\n', 2, 1)),
                Ok(('c', 2, 2)),
                Ok(('\n', 3, 1)),
            ]
        );
    }

    #[test]
    fn invalid_utf8_stops_at_the_offending_column() {
        let result = chars(b"ok\nab\xffcd\nnever");
        assert_eq!(result.len(), 6);
        assert_eq!(result[4], Ok(('b', 2, 3)));
        assert_eq!(result[5], Err("Source text is not valid UTF-8".to_string()));
    }

    #[test]
    fn lines_are_kept_for_diagnostics() {
        let (start, stream) = consume("Name(FOO, 1)\r\n\tZero\n".as_bytes(), "test.asl");
        assert_eq!(stream.count(), 19);

        let source = start.source();
        assert_eq!(source.name(), "test.asl");
        source.with_line(1, |line| assert_eq!(line, "Name(FOO, 1)"));
        source.with_line(2, |line| assert_eq!(line, "\tZero"));
        source.with_line(3, |line| assert_eq!(line, ""));
    }
}
