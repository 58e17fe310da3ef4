#![allow(dead_code)]

use aslc::{error::Diagnostics, Options, Unit};

pub const HEADER_LEN: usize = 36;

/// Envuelve sentencias en un `DefinitionBlock` de prueba.
pub fn block(body: &str) -> String {
    format!(
        "DefinitionBlock(\"test.aml\", \"SSDT\", 2, \"OEMID\", \"OEMTBLID\", 1)\n{{\n{}\n}}\n",
        body
    )
}

pub fn parse(body: &str) -> Result<Unit, Diagnostics> {
    aslc::parse(block(body).as_bytes(), "test.asl")
}

pub fn compile(body: &str) -> Result<Vec<u8>, Diagnostics> {
    aslc::compile(block(body).as_bytes(), "test.asl", &Options::default())
}

/// Compila y retorna únicamente el cuerpo de la tabla.
pub fn body(statements: &str) -> Vec<u8> {
    let table = compile(statements).unwrap_or_else(|error| panic!("{}", error));
    assert_valid(&table);

    table[HEADER_LEN..].to_vec()
}

/// Longitud declarada igual a la real y suma de bytes nula.
pub fn assert_valid(table: &[u8]) {
    let declared = u32::from_le_bytes([table[4], table[5], table[6], table[7]]);
    assert_eq!(declared as usize, table.len());

    let sum = table.iter().fold(0u8, |sum, &byte| sum.wrapping_add(byte));
    assert_eq!(sum, 0, "table checksum");
}

pub fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}
