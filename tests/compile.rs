mod common;

use aslc::{
    ast::{Argument, Payload},
    error::Status,
    field::FieldEntry,
    namespace::ScopeId,
    ops::{ObjectType, SerializeRule},
    Options,
};

use common::{assert_valid, block, body, compile, contains, parse, HEADER_LEN};

fn status(statements: &str) -> Status {
    match compile(statements) {
        Ok(_) => panic!("compilation of {:?} should have failed", statements),
        Err(diagnostics) => diagnostics.status(),
    }
}

#[test]
fn minimal_unit_is_header_only() {
    let table = compile("").unwrap();
    assert_valid(&table);

    let revision = Options::default().creator_revision;

    assert_eq!(table.len(), HEADER_LEN);
    assert_eq!(&table[0..4], b"SSDT");
    assert_eq!(table[8], 2);
    assert_eq!(&table[10..16], b"OEMID ");
    assert_eq!(&table[16..24], b"OEMTBLID");
    assert_eq!(&table[24..28], &1u32.to_le_bytes());
    assert_eq!(&table[28..32], b"ASLC");
    assert_eq!(&table[32..36], &revision.to_le_bytes());
}

#[test]
fn device_in_scope() {
    let source = r#"Scope(\_SB) { Device(DEV0) { Name(_HID, "ACPI0000") } }"#;

    let unit = parse(source).unwrap();
    for path in &["\\_SB", "\\_SB.DEV0", "\\_SB.DEV0._HID"] {
        assert!(unit.namespace.resolve_path(path).is_some(), "{}", path);
    }

    let mut expected = vec![0x10, 0x1c, b'\\', b'_', b'S', b'B', b'_'];
    expected.extend_from_slice(&[0x5b, 0x82, 0x14, b'D', b'E', b'V', b'0']);
    expected.extend_from_slice(&[0x08, b'_', b'H', b'I', b'D', 0x0d]);
    expected.extend_from_slice(b"ACPI0000\0");

    assert_eq!(body(source), expected);
}

#[test]
fn method_defaults() {
    let source = "Method(FOO, 2) { Return (Add(Arg0, Arg1)) }";

    let unit = parse(source).unwrap();
    let method = unit.ast.statements()[0];
    assert_eq!(
        unit.ast[method].args[1..],
        [
            Argument::U8(2),
            Argument::Serialize(SerializeRule::NotSerialized),
            Argument::U8(0)
        ]
    );

    assert_eq!(
        body(source),
        vec![0x14, 0x0b, b'F', b'O', b'O', b'_', 0x02, 0xa4, 0x72, 0x68, 0x69, 0x00]
    );
}

#[test]
fn elided_optionals_take_their_defaults() {
    let unit = parse("Method(FOO, 1, , 3) { } Method(BAR) { } External(EXT0) Mutex(MTX0)").unwrap();
    let statements = unit.ast.statements();

    assert_eq!(
        unit.ast[statements[0]].args[1..],
        [
            Argument::U8(1),
            Argument::Serialize(SerializeRule::NotSerialized),
            Argument::U8(3)
        ]
    );

    assert_eq!(
        unit.ast[statements[1]].args[1..],
        [
            Argument::U8(0),
            Argument::Serialize(SerializeRule::NotSerialized),
            Argument::U8(0)
        ]
    );

    assert_eq!(
        unit.ast[statements[2]].args[1..],
        [Argument::ObjType(ObjectType::UnknownObj), Argument::U8(0)]
    );

    assert_eq!(unit.ast[statements[3]].args[1..], [Argument::U8(0)]);
}

#[test]
fn back_to_back_io_ports() {
    let source = "Name(_CRS, ResourceTemplate () { \
                  IO(Decode16, 0x60, 0x60, 0, 1) \
                  IO(Decode16, 0x64, 0x64, 0, 1) })";

    let unit = parse(source).unwrap();
    let name = unit.ast.statements()[0];

    let template = match unit.ast[name].args[1] {
        Argument::Node(template) => template,
        _ => panic!("Name without a value node"),
    };

    match &unit.ast[template].payload {
        Payload::Resources(bytes) => {
            assert_eq!(bytes.len(), 18);
            assert_eq!(&bytes[0..8], &[0x47, 0x01, 0x60, 0x00, 0x60, 0x00, 0x00, 0x01]);
            assert_eq!(&bytes[8..16], &[0x47, 0x01, 0x64, 0x00, 0x64, 0x00, 0x00, 0x01]);
            assert_eq!(bytes[16], 0x79);
        }

        payload => panic!("unexpected payload {:?}", payload),
    }

    assert_eq!(unit.namespace.get(ScopeId::ROOT).children().count(), 1);

    let table = body(source);
    assert_eq!(&table[..9], &[0x08, b'_', b'C', b'R', b'S', 0x11, 0x15, 0x0a, 0x12]);
    assert_eq!(table.len(), 9 + 18);
}

#[test]
fn field_list_with_offset() {
    let source = "OperationRegion(REGN, SystemMemory, 0x1000, 0x100) \
                  Field(REGN, ByteAcc, NoLock, Preserve) { OFFSET(4), FLD1, 8 }";

    let unit = parse(source).unwrap();
    let field = unit.ast.statements()[1];
    assert_eq!(
        unit.ast[field].payload,
        Payload::Fields(vec![
            FieldEntry::Offset(4),
            FieldEntry::Unit {
                name: Some("FLD1".parse().unwrap()),
                bits: 8
            },
        ])
    );

    let mut expected = vec![
        0x5b, 0x80, b'R', b'E', b'G', b'N', 0x00, 0x0b, 0x00, 0x10, 0x0b, 0x00, 0x01,
    ];

    expected.extend_from_slice(&[0x5b, 0x81, 0x0d, b'R', b'E', b'G', b'N', 0x01]);
    expected.extend_from_slice(&[0x00, 0x20, b'F', b'L', b'D', b'1', 0x08]);

    assert_eq!(body(source), expected);
}

#[test]
fn index_field() {
    let source = "OperationRegion(IDXR, SystemIO, 0x70, 2) \
                  Field(IDXR, ByteAcc, NoLock, Preserve) { INDX, 8, DATA, 8 } \
                  IndexField(INDX, DATA, ByteAcc, NoLock, Preserve) { Offset(0x10), CMS0, 8 }";

    let table = body(source);
    assert!(contains(
        &table,
        &[
            0x5b, 0x86, 0x12, b'I', b'N', b'D', b'X', b'D', b'A', b'T', b'A', 0x01, 0x00, 0x40,
            0x08, b'C', b'M', b'S', b'0', 0x08
        ]
    ));
}

#[test]
fn method_argument_count_out_of_range() {
    assert_eq!(status("Method(FOO, 8) { }"), Status::Semantic);
}

#[test]
fn compilation_is_idempotent() {
    let source = r#"
        Scope(\_SB) {
            Device(PCI0) {
                Name(_HID, EisaId("PNP0A03"))
                Name(_UID, 0)
                Method(_STA) { Return (0x0F) }
            }
        }
    "#;

    let first = compile(source).unwrap();
    let second = compile(source).unwrap();

    assert_valid(&first);
    assert_eq!(first, second);
}

#[test]
fn keywords_ignore_case() {
    let upper = compile(r"Scope(\_SB) { Device(DEV0) { } }").unwrap();
    let lower = compile(r"scope(\_sb) { DEVICE(dev0) { } }").unwrap();

    assert_eq!(upper, lower);
}

#[test]
fn control_flow() {
    let source = "Method(TEST, 1) { \
                  If (LEqual(Arg0, Zero)) { Return (One) } \
                  Else { Return (Ones) } }";

    assert_eq!(
        body(source),
        vec![
            0x14, 0x11, b'T', b'E', b'S', b'T', 0x01, 0xa0, 0x06, 0x93, 0x68, 0x00, 0xa4, 0x01,
            0xa1, 0x03, 0xa4, 0xff
        ]
    );
}

#[test]
fn locals_and_compound_comparisons() {
    let source = "Method(LOOP) { \
                  Store(0x1234, Local0) \
                  While (LGreaterEqual(Local0, 5)) { Decrement(Local0) } }";

    let table = body(source);
    assert!(contains(&table, &[0x70, 0x0b, 0x34, 0x12, 0x60]));
    assert!(contains(&table, &[0xa2, 0x08, 0x92, 0x95, 0x60, 0x0a, 0x05, 0x76, 0x60]));
}

#[test]
fn method_calls() {
    let table = body("Method(FOO, 2) { } Method(BAR) { FOO(1, Local1) }");
    assert!(contains(&table, &[b'F', b'O', b'O', b'_', 0x01, 0x61]));
}

#[test]
fn data_objects() {
    let source = r#"
        Name(_HID, EisaId("PNP0A03"))
        Name(PKG0, Package() { 1, "A", FOO })
        Name(PKG1, Package(3) { 1 })
        Name(BUF0, Buffer() { 0x01, 0x02 })
        Name(_STR, Unicode("Hi"))
        Name(UUID, ToUUID("33DB4D5B-1FF7-401C-9657-7441C03DD766"))
    "#;

    let table = body(source);

    assert!(contains(&table, &[0x08, b'_', b'H', b'I', b'D', 0x0c, 0x41, 0xd0, 0x0a, 0x03]));
    assert!(contains(
        &table,
        &[0x12, 0x0a, 0x03, 0x01, 0x0d, b'A', 0x00, b'F', b'O', b'O', b'_']
    ));
    assert!(contains(&table, &[0x12, 0x03, 0x03, 0x01]));
    assert!(contains(&table, &[0x11, 0x05, 0x0a, 0x02, 0x01, 0x02]));
    assert!(contains(
        &table,
        &[0x11, 0x09, 0x0a, 0x06, b'H', 0x00, b'i', 0x00, 0x00, 0x00]
    ));
    assert!(contains(
        &table,
        &[0x11, 0x13, 0x0a, 0x10, 0x5b, 0x4d, 0xdb, 0x33, 0xf7, 0x1f, 0x1c, 0x40]
    ));
}

#[test]
fn variable_length_packages() {
    let table = body("Method(MKPK, 1) { Return (Package(Arg0) { 1 }) }");
    assert_eq!(
        table,
        vec![0x14, 0x0b, b'M', b'K', b'P', b'K', 0x01, 0xa4, 0x13, 0x03, 0x68, 0x01]
    );
}

#[test]
fn two_byte_package_length() {
    let bytes = vec!["0"; 100].join(", ");
    let table = body(&format!("Name(BIG0, Buffer() {{ {} }})", bytes));

    assert_eq!(&table[5..9], &[0x11, 0x48, 0x06, 0x0a]);
    assert_eq!(table[9], 100);
    assert_eq!(table.len(), 10 + 100);
}

#[test]
fn objects_with_raw_arguments() {
    let source = "External(EXT0, IntObj) \
                  Mutex(MTX0, 3) \
                  Processor(CPU0, 1, 0x810, 6) { } \
                  Method(GRAB) { Acquire(MTX0, 0xFFFF) }";

    let table = body(source);
    assert!(contains(&table, &[0x15, b'E', b'X', b'T', b'0', 0x01, 0x00]));
    assert!(contains(&table, &[0x5b, 0x01, b'M', b'T', b'X', b'0', 0x03]));
    assert!(contains(
        &table,
        &[0x5b, 0x83, 0x0b, b'C', b'P', b'U', b'0', 0x01, 0x10, 0x08, 0x00, 0x00, 0x06]
    ));
    assert!(contains(&table, &[0x5b, 0x23, b'M', b'T', b'X', b'0', 0xff, 0xff]));
}

#[test]
fn create_field_resolves_resource_aliases() {
    let source = "Name(RBUF, ResourceTemplate () { \
                  Memory32Fixed(ReadWrite, 0xFED00000, 0x1000, MEM0) }) \
                  Method(_CRS) { \
                  CreateDWordField(RBUF, MEM0._BAS, BAS0) \
                  Return (RBUF) }";

    let table = body(source);
    assert!(contains(
        &table,
        &[0x86, 0x09, 0x00, 0x01, 0x00, 0x00, 0xd0, 0xfe, 0x00, 0x10, 0x00, 0x00, 0x79]
    ));

    assert!(contains(
        &table,
        &[0x8a, b'R', b'B', b'U', b'F', 0x0a, 0x04, b'B', b'A', b'S', b'0']
    ));
}

#[test]
fn irq_masks() {
    let table = body(
        "Name(_PRS, ResourceTemplate () { \
         IRQ(Edge, ActiveHigh, Exclusive) { 3, 4, 7 } \
         IRQ(Level, ActiveLow, Shared) { 10 } })",
    );

    assert!(contains(&table, &[0x22, 0x98, 0x00, 0x23, 0x00, 0x04, 0x18, 0x79]));
}

#[test]
fn error_categories() {
    assert_eq!(status("Name(STR0, \"unterminated)"), Status::Lexical);
    assert_eq!(status("Name(FOO)"), Status::Syntax);
    assert_eq!(status("Else { }"), Status::Syntax);
    assert_eq!(status("Name(FOO, 1) Name(FOO, 2)"), Status::Semantic);
    assert_eq!(status("Name(FOO, EisaId(\"PNP\"))"), Status::Semantic);
    assert_eq!(status("Field(REGN, ByteAcc, NoLock, Bogus) { }"), Status::Syntax);
    assert_eq!(status("Field(REGN, ByteAcc, NoLock, Lock) { }"), Status::Semantic);
    assert_eq!(
        status("Name(CRS0, ResourceTemplate () { Memory32Fixed(ReadOnly, 0xFFFFF000, 0x1001) })"),
        Status::Semantic
    );
    assert_eq!(
        status("Name(CRS0, ResourceTemplate () { IRQNoFlags() { 3, 3 } })"),
        Status::Semantic
    );
    assert_eq!(status("Name(PKG0, Package(1) { 1, 2 })"), Status::Semantic);

    let elements = vec!["0"; 256].join(", ");
    assert_eq!(
        status(&format!("Name(PKG0, Package() {{ {} }})", elements)),
        Status::ResourceExhaustion
    );
}

#[test]
fn trailing_tokens_are_rejected() {
    let source = format!("{} Zero", block(""));
    let error = aslc::compile(source.as_bytes(), "test.asl", &Options::default()).unwrap_err();

    assert_eq!(error.status(), Status::Syntax);
    assert_eq!(error.status().exit_code(), 2);
}

#[test]
fn out_of_range_message_names_the_keyword() {
    let error = compile("Processor(CPU0, 256) { }").unwrap_err();

    assert_eq!(error.status(), Status::Semantic);
    assert_eq!(
        error.message(),
        "Value for byte parameter 2 is out of range (0x100) while processing keyword 'Processor'"
    );
}

#[test]
fn strings_must_be_plain_ascii() {
    let rejected = [
        r#"Name(STR0, "a\0b")"#,
        r#"Name(STR0, "\xFF")"#,
        "Name(STR0, \"caf\u{e9}\")",
        r#"Name(BUF0, Buffer() { "a\x00" })"#,
    ];

    for source in &rejected {
        assert_eq!(status(source), Status::Lexical, "{}", source);
    }

    assert_eq!(
        body(r#"Name(STR0, "a\x41")"#),
        vec![0x08, b'S', b'T', b'R', b'0', 0x0d, b'a', b'A', 0x00]
    );
}

#[test]
fn hex_prefix_needs_digits() {
    assert_eq!(status("Name(NUM0, 0x)"), Status::Lexical);
    assert_eq!(body("Name(NUM0, 0x0)"), vec![0x08, b'N', b'U', b'M', b'0', 0x00]);
}

#[test]
fn nesting_is_bounded() {
    let deep = format!("Name(NUM0, {}1{})", "LNot(".repeat(20000), ")".repeat(20000));
    let error = compile(&deep).unwrap_err();

    assert_eq!(error.status(), Status::ResourceExhaustion);
    assert_eq!(error.status().exit_code(), 4);

    let shallow = format!("Name(NUM0, {}1{})", "LNot(".repeat(100), ")".repeat(100));
    let table = body(&shallow);

    assert_eq!(table.iter().filter(|&&byte| byte == 0x92).count(), 100);
    assert_eq!(table.last(), Some(&0x01));
}
