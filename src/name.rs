//! Segmentos de nombre y rutas del namespace ACPI.
//!
//! Un [`NameSeg`] es siempre de cuatro bytes; los segmentos más cortos se
//! rellenan con `_`. Una [`NameString`] combina un prefijo opcional (raíz
//! `\` o una o más subidas `^`) con una secuencia de segmentos.

use std::{
    fmt::{self, Debug, Display},
    str::FromStr,
};

use thiserror::Error;

/// Un segmento de nombre mal formado.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    #[error("Name segment `{0}` must be 1 to 4 characters long")]
    SegmentLength(String),

    #[error("Name segment `{0}` starts with an invalid character")]
    SegmentStart(String),

    #[error("Name segment `{0}` contains an invalid character")]
    SegmentChar(String),

    #[error("Parent prefix `^` must be followed by a name segment")]
    DanglingParent,
}

/// Segmento de nombre de cuatro caracteres.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NameSeg([u8; 4]);

impl NameSeg {
    /// Construye un segmento a partir de bytes ya validados.
    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        NameSeg(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl FromStr for NameSeg {
    type Err = NameError;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        let bytes = string.as_bytes();
        if bytes.is_empty() || bytes.len() > 4 {
            return Err(NameError::SegmentLength(string.to_owned()));
        }

        let lead = bytes[0].to_ascii_uppercase();
        if lead != b'_' && !lead.is_ascii_uppercase() {
            return Err(NameError::SegmentStart(string.to_owned()));
        }

        let mut seg = [b'_'; 4];
        for (slot, &byte) in seg.iter_mut().zip(bytes) {
            let byte = byte.to_ascii_uppercase();
            if byte != b'_' && !byte.is_ascii_uppercase() && !byte.is_ascii_digit() {
                return Err(NameError::SegmentChar(string.to_owned()));
            }

            *slot = byte;
        }

        Ok(NameSeg(seg))
    }
}

impl Display for NameSeg {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.iter().try_for_each(|&byte| write!(fmt, "{}", byte as char))
    }
}

impl Debug for NameSeg {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "NameSeg({})", self)
    }
}

/// Punto de partida de una ruta.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Prefix {
    /// Relativa al scope actual.
    None,

    /// `\`
    Root,

    /// `^` repetido la cantidad indicada de veces.
    Parent(usize),
}

/// Ruta en el namespace, absoluta o relativa.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct NameString {
    prefix: Prefix,
    segments: Vec<NameSeg>,
}

impl NameString {
    pub fn new(prefix: Prefix, segments: Vec<NameSeg>) -> Self {
        NameString { prefix, segments }
    }

    pub fn prefix(&self) -> Prefix {
        self.prefix
    }

    pub fn segments(&self) -> &[NameSeg] {
        &self.segments
    }

    /// Último segmento, si lo hay.
    pub fn last(&self) -> Option<NameSeg> {
        self.segments.last().copied()
    }

    /// Determina si se trata de un único segmento sin prefijo.
    pub fn is_single(&self) -> bool {
        self.prefix == Prefix::None && self.segments.len() == 1
    }

    /// Extiende la ruta con un segmento adicional.
    pub fn join(&self, seg: NameSeg) -> NameString {
        let mut segments = self.segments.clone();
        segments.push(seg);

        NameString {
            prefix: self.prefix,
            segments,
        }
    }
}

impl From<NameSeg> for NameString {
    fn from(seg: NameSeg) -> Self {
        NameString {
            prefix: Prefix::None,
            segments: vec![seg],
        }
    }
}

impl FromStr for NameString {
    type Err = NameError;

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        let (prefix, rest) = if let Some(rest) = string.strip_prefix('\\') {
            (Prefix::Root, rest)
        } else {
            let rest = string.trim_start_matches('^');
            match string.len() - rest.len() {
                0 => (Prefix::None, rest),
                levels => (Prefix::Parent(levels), rest),
            }
        };

        if rest.is_empty() {
            return match prefix {
                Prefix::Root => Ok(NameString::new(Prefix::Root, Vec::new())),
                Prefix::Parent(_) => Err(NameError::DanglingParent),
                Prefix::None => Err(NameError::SegmentLength(String::new())),
            };
        }

        let segments = rest
            .split('.')
            .map(NameSeg::from_str)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(NameString { prefix, segments })
    }
}

impl Display for NameString {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.prefix {
            Prefix::None => (),
            Prefix::Root => fmt.write_str("\\")?,
            Prefix::Parent(levels) => (0..levels).try_for_each(|_| fmt.write_str("^"))?,
        }

        for (i, seg) in self.segments.iter().enumerate() {
            if i > 0 {
                fmt.write_str(".")?;
            }

            write!(fmt, "{}", seg)?;
        }

        Ok(())
    }
}

impl Debug for NameString {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "NameString({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_segments_are_padded() {
        let seg: NameSeg = "ab".parse().unwrap();
        assert_eq!(seg.as_bytes(), b"AB__");
        assert_eq!(seg.to_string(), "AB__");
    }

    #[test]
    fn segment_rules() {
        assert_eq!(
            "1ABC".parse::<NameSeg>(),
            Err(NameError::SegmentStart("1ABC".into()))
        );
        assert_eq!(
            "ABCDE".parse::<NameSeg>(),
            Err(NameError::SegmentLength("ABCDE".into()))
        );
        assert_eq!(
            "A-B".parse::<NameSeg>(),
            Err(NameError::SegmentChar("A-B".into()))
        );
    }

    #[test]
    fn prefixes() {
        let root: NameString = "\\_SB.PCI0".parse().unwrap();
        assert_eq!(root.prefix(), Prefix::Root);
        assert_eq!(root.segments().len(), 2);
        assert_eq!(root.to_string(), "\\_SB_.PCI0");

        let up: NameString = "^^FOO".parse().unwrap();
        assert_eq!(up.prefix(), Prefix::Parent(2));
        assert_eq!(up.to_string(), "^^FOO_");

        let bare: NameString = "\\".parse().unwrap();
        assert!(bare.segments().is_empty());

        assert_eq!("^".parse::<NameString>(), Err(NameError::DanglingParent));
    }
}
