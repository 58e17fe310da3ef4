//! Diagnósticos de compilación.
//!
//! Una compilación fallida produce exactamente un error. Cada fase define
//! su propio tipo de error y lo clasifica en una de las categorías de
//! [`Status`], lo cual permite a quien invoca distinguir entre errores de
//! sintaxis, violaciones semánticas, agotamiento de recursos y fallos
//! internos.

use crate::source::{Located, Location};
use std::{
    error::Error,
    fmt::{self, Display},
};

/// Categoría amplia de un error.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Status {
    /// Literal sin terminar, identificador demasiado largo, carácter desconocido.
    Lexical,

    /// Token inesperado donde se requería otro.
    Syntax,

    /// Violación de reglas del namespace, valores fuera de rango, etc.
    Semantic,

    /// Alguna lista o paquete excede una capacidad fija.
    ResourceExhaustion,

    /// Condición que no debería ser alcanzable.
    Internal,
}

impl Status {
    /// Descripción corta que encabeza un diagnóstico.
    pub fn kind(self) -> &'static str {
        match self {
            Status::Lexical => "Lexical error",
            Status::Syntax => "Syntax error",
            Status::Semantic => "Semantic error",
            Status::ResourceExhaustion => "Resource exhausted",
            Status::Internal => "Internal compiler error",
        }
    }

    /// Código de salida del proceso para esta categoría.
    pub fn exit_code(self) -> i32 {
        match self {
            Status::Lexical | Status::Syntax => 2,
            Status::Semantic => 3,
            Status::ResourceExhaustion => 4,
            Status::Internal => 70,
        }
    }
}

/// Clasificación de un error según su [`Status`].
pub trait Classify {
    fn status(&self) -> Status;
}

mod sealed {
    pub trait Sealed {}
}

pub trait LocatedError: sealed::Sealed {
    fn source(&self) -> &dyn Error;
    fn location(&self) -> &Location;
}

/// El error único de una compilación fallida.
pub struct Diagnostics {
    status: Status,
    error: Box<dyn 'static + LocatedError>,
}

impl Diagnostics {
    /// Categoría del error.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Mensaje del error, sin ubicación.
    pub fn message(&self) -> String {
        self.error.source().to_string()
    }

    /// Ubicación del error en el código fuente.
    pub fn location(&self) -> &Location {
        self.error.location()
    }
}

impl<E: 'static + Error + Classify> From<Located<E>> for Diagnostics {
    fn from(error: Located<E>) -> Self {
        Diagnostics {
            status: error.as_ref().status(),
            error: Box::new(error),
        }
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            fmt,
            "{:?} at {}: {}",
            self.status,
            self.location(),
            self.message()
        )
    }
}

impl Display for Diagnostics {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Diagnostics { status, error } = self;

        writeln!(fmt, "{}: {}", status.kind(), error.source())?;

        let location = error.location();
        writeln!(fmt, " --> {}", location)?;

        let digits = location.end().line().to_string().chars().count();
        writeln!(fmt, "{:digits$} |", "", digits = digits)?;

        for line_number in location.start().line()..=location.end().line() {
            location.source().with_line(line_number, |line| {
                writeln!(fmt, "{:>digits$} | {}", line_number, line, digits = digits)
            })?
        }

        let (from, to) = (
            location.start().column(),
            location.end().column().saturating_sub(1).max(1),
        );
        let min = from.min(to);
        let max = from.max(to);

        // Los tabuladores de la línea se reproducen para que el marcador
        // quede alineado sin importar el ancho que use la terminal
        let skip: String = location.source().with_line(location.start().line(), |line| {
            let mut chars = line.chars();
            (1..min)
                .map(|_| match chars.next() {
                    Some('\t') => '\t',
                    _ => ' ',
                })
                .collect()
        });

        let highlight = (max - min + 1) as usize;
        writeln!(
            fmt,
            "{:digits$} | {}{:^<highlight$}",
            "",
            skip,
            "",
            digits = digits,
            highlight = highlight
        )?;

        writeln!(fmt)?;
        writeln!(fmt, "Build failed with 1 error")
    }
}

impl<E: Error> sealed::Sealed for Located<E> {}

impl<E: Error> LocatedError for Located<E> {
    fn source(&self) -> &dyn Error {
        self.as_ref()
    }

    fn location(&self) -> &Location {
        Located::location(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diagnostics(text: &str) -> Diagnostics {
        match crate::parse(text.as_bytes(), "test.asl") {
            Ok(_) => panic!("{:?} should not parse", text),
            Err(diagnostics) => diagnostics,
        }
    }

    #[test]
    fn marker_keeps_tabs_aligned() {
        let diagnostics = diagnostics("\t$");
        assert_eq!(diagnostics.status(), Status::Lexical);

        let rendered = diagnostics.to_string();
        assert!(rendered.starts_with("Lexical error: Bad character '$' in input stream\n"));
        assert!(rendered.contains(" --> test.asl:1:2\n"));
        assert!(rendered.contains("1 | \t$\n  | \t^\n"), "{}", rendered);
    }

    #[test]
    fn encoding_errors_point_at_the_column() {
        let bytes = b"DefinitionBlock(\"\xff\"";
        let diagnostics = match crate::parse(&bytes[..], "test.asl") {
            Ok(_) => panic!("invalid UTF-8 should not parse"),
            Err(diagnostics) => diagnostics,
        };

        assert_eq!(diagnostics.status(), Status::Lexical);
        assert_eq!(diagnostics.message(), "Source text is not valid UTF-8");
        assert_eq!(diagnostics.location().start().column(), 18);
    }
}
