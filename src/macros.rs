/// Define una enumeración de palabras clave del lenguaje.
///
/// Cada variante se asocia a su ortografía en ASL y, opcionalmente, a su
/// codificación binaria. Se generan la tabla `KEYWORDS` que consulta el
/// lexer, `Display` con la ortografía original y `encoding()`.
macro_rules! keywords {
    (
        $(#[$meta:meta])*
        pub enum $name:ident ($what:literal) {
            $($variant:ident = $spelling:literal => $code:expr),* $(,)?
        }
    ) => {
        keywords! {
            $(#[$meta])*
            pub enum $name ($what) {
                $($variant = $spelling),*
            }
        }

        impl $name {
            /// Codificación binaria de esta variante.
            pub fn encoding(self) -> u8 {
                match self {
                    $($name::$variant => $code),*
                }
            }
        }
    };

    (
        $(#[$meta:meta])*
        pub enum $name:ident ($what:literal) {
            $($variant:ident = $spelling:literal),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq)]
        pub enum $name {
            $($variant),*
        }

        impl $name {
            /// Descripción de la enumeración para diagnósticos.
            pub const WHAT: &'static str = $what;

            /// Ortografías reconocidas por el lexer, sin distinción de mayúsculas.
            pub const KEYWORDS: &'static [(crate::lex::NoCase<&'static str>, $name)] = &[
                $((crate::lex::NoCase::new($spelling), $name::$variant)),*
            ];
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let spelling = match self {
                    $($name::$variant => $spelling),*
                };

                fmt.write_str(spelling)
            }
        }
    };
}
