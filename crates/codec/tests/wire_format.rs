//! Exact byte layouts for each record kind

use marshal_codec::{MarshalConfig, MarshalError, dump, load};
use marshal_core::{Encoding, HashDefault, Registry, Symbol, Value};

fn body(reg: &Registry, value: &Value) -> Vec<u8> {
    let bytes = dump(reg, value, &MarshalConfig::default()).unwrap();
    assert_eq!(&bytes[..2], [4, 8]);
    bytes[2..].to_vec()
}

fn read(reg: &Registry, body: &[u8]) -> Result<Value, MarshalError> {
    let mut bytes = vec![4, 8];
    bytes.extend_from_slice(body);
    load(reg, &bytes, &MarshalConfig::default())
}

#[test]
fn test_immediates() {
    let reg = Registry::new();
    assert_eq!(body(&reg, &Value::Nil), b"0");
    assert_eq!(body(&reg, &Value::Bool(true)), b"T");
    assert_eq!(body(&reg, &Value::Bool(false)), b"F");
    assert_eq!(body(&reg, &Value::Integer(0)), [b'i', 0]);
    assert_eq!(body(&reg, &Value::Integer(-1)), [b'i', 0xfa]);
    assert_eq!(body(&reg, &Value::Integer(300)), [b'i', 2, 0x2c, 1]);
}

#[test]
fn test_utf8_string() {
    let reg = Registry::new();
    assert_eq!(
        body(&reg, &reg.str("abc")),
        [b'I', b'"', 8, b'a', b'b', b'c', 6, b':', 6, b'E', b'T']
    );
}

#[test]
fn test_binary_string() {
    let reg = Registry::new();
    assert_eq!(body(&reg, &reg.binary(b"ab")), [b'"', 7, b'a', b'b']);
}

#[test]
fn test_named_encoding_string() {
    let reg = Registry::new();
    let s = reg.string_with(b"a".to_vec(), Encoding::from_name("EUC-JP"));
    let mut expected = vec![b'I', b'"', 6, b'a', 6, b':', 0x0d];
    expected.extend_from_slice(b"encoding");
    expected.extend_from_slice(&[b'"', 0x0b]);
    expected.extend_from_slice(b"EUC-JP");
    assert_eq!(body(&reg, &s), expected);
}

#[test]
fn test_symbol() {
    let reg = Registry::new();
    assert_eq!(body(&reg, &reg.symbol("foo")), [b':', 8, b'f', b'o', b'o']);
}

#[test]
fn test_repeated_symbol() {
    let reg = Registry::new();
    let a = reg.symbol("a");
    assert_eq!(
        body(&reg, &reg.array(vec![a.clone(), a])),
        [b'[', 7, b':', 6, b'a', b';', 0]
    );
}

#[test]
fn test_float() {
    let reg = Registry::new();
    assert_eq!(body(&reg, &Value::Float(1.5)), [b'f', 8, b'1', b'.', b'5']);
    assert_eq!(body(&reg, &Value::Float(100.0)), [b'f', 8, b'1', b'e', b'2']);
    assert_eq!(
        body(&reg, &Value::Float(f64::NEG_INFINITY)),
        [b'f', 9, b'-', b'i', b'n', b'f']
    );
}

#[test]
fn test_large_integer() {
    let reg = Registry::new();
    assert_eq!(
        body(&reg, &Value::Integer(1 << 40)),
        [b'l', b'+', 8, 0, 0, 0, 0, 0, 1]
    );
    assert_eq!(
        body(&reg, &reg.integer_from_magnitude(true, vec![0xff; 9])),
        [b'l', b'-', 10, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0]
    );
}

#[test]
fn test_hash() {
    let reg = Registry::new();
    let h = reg.hash_from(vec![(reg.symbol("a"), Value::Integer(1))]);
    assert_eq!(body(&reg, &h), [b'{', 6, b':', 6, b'a', b'i', 6]);
}

#[test]
fn test_hash_with_default() {
    let reg = Registry::new();
    let h = reg.hash();
    if let Value::Hash(inner) = &h {
        inner.set_default(HashDefault::Value(Value::Integer(0)));
    }
    assert_eq!(body(&reg, &h), [b'}', 0, b'i', 0]);
}

#[test]
fn test_identity_hash() {
    let reg = Registry::new();
    let h = reg.hash();
    if let Value::Hash(inner) = &h {
        inner.set_compare_by_identity(true);
    }
    assert_eq!(
        body(&reg, &h),
        [b'C', b':', 9, b'H', b'a', b's', b'h', b'{', 0]
    );
}

#[test]
fn test_keyword_hash() {
    let reg = Registry::new();
    let h = reg.hash();
    if let Value::Hash(inner) = &h {
        inner.set_keyword(true);
    }
    assert_eq!(
        body(&reg, &h),
        [b'I', b'{', 0, 6, b':', 6, b'K', b'T']
    );
}

#[test]
fn test_regexp() {
    let reg = Registry::new();
    assert_eq!(
        body(&reg, &reg.regexp("ab", 0)),
        [b'I', b'/', 7, b'a', b'b', 0, 6, b':', 6, b'E', b'F']
    );
    let flags = marshal_core::value::REGEXP_IGNORECASE | marshal_core::value::REGEXP_MULTILINE;
    assert_eq!(
        body(&reg, &reg.regexp("x", flags)),
        [b'I', b'/', 6, b'x', 5, 6, b':', 6, b'E', b'F']
    );
}

#[test]
fn test_shared_string() {
    let reg = Registry::new();
    let s = reg.binary(b"a");
    assert_eq!(
        body(&reg, &reg.array(vec![s.clone(), s])),
        [b'[', 7, b'"', 6, b'a', b'@', 6]
    );
}

#[test]
fn test_object_with_attribute() {
    let reg = Registry::new();
    let foo = reg.define_class("Foo", &reg.object_class());
    let o = reg.object(&foo);
    o.set_attribute(Symbol::intern("@a"), Value::Integer(1));
    assert_eq!(
        body(&reg, &o),
        [b'o', b':', 8, b'F', b'o', b'o', 6, b':', 7, b'@', b'a', b'i', 6]
    );
}

#[test]
fn test_struct() {
    let reg = Registry::new();
    let point = reg.define_struct("Point", &["x", "y"]);
    let p = reg.struct_new(&point, vec![Value::Integer(1), Value::Integer(2)]);
    let mut expected = vec![b'S', b':', 0x0a];
    expected.extend_from_slice(b"Point");
    expected.extend_from_slice(&[7, b':', 6, b'x', b'i', 6, b':', 6, b'y', b'i', 7]);
    assert_eq!(body(&reg, &p), expected);
}

#[test]
fn test_class_and_module() {
    let reg = Registry::new();
    let mut expected = vec![b'c', 0x0b];
    expected.extend_from_slice(b"String");
    assert_eq!(body(&reg, &Value::Class(reg.string_class())), expected);

    let comparable = reg.resolve("Comparable").unwrap();
    let mut expected = vec![b'm', 0x0f];
    expected.extend_from_slice(b"Comparable");
    assert_eq!(body(&reg, &Value::Class(comparable)), expected);
}

#[test]
fn test_extended_object() {
    let reg = Registry::new();
    let m = reg.define_module("Mod");
    let o = reg.object(&reg.object_class());
    o.extend(m);
    let mut expected = vec![b'e', b':', 8];
    expected.extend_from_slice(b"Mod");
    expected.extend_from_slice(&[b'o', b':', 0x0b]);
    expected.extend_from_slice(b"Object");
    expected.push(0);
    assert_eq!(body(&reg, &o), expected);
}

#[test]
fn test_string_subclass() {
    let reg = Registry::new();
    let my = reg.define_class("MyStr", &reg.string_class());
    let s = reg.allocate(&my).unwrap();
    let mut expected = vec![b'C', b':', 0x0a];
    expected.extend_from_slice(b"MyStr");
    expected.extend_from_slice(&[b'"', 0]);
    assert_eq!(body(&reg, &s), expected);
}

#[test]
fn test_legacy_class_or_module_tag() {
    let reg = Registry::new();
    let Value::Array(items) = read(&reg, b"[\x08M\x0aArrayM\x0bKernel@\x06").unwrap() else {
        panic!("Expected array");
    };
    let array = items.get(0).unwrap();
    assert!(matches!(&array, Value::Class(c) if std::rc::Rc::ptr_eq(c, &reg.array_class())));
    assert!(matches!(items.get(1), Some(Value::Class(c)) if c.is_module()));
    // `M` records take a link index like `c` and `m`
    assert!(items.get(2).unwrap().ptr_eq(&array));
}

#[test]
fn test_encoding_and_keyword_pairs_need_capable_targets() {
    let reg = Registry::new();
    let s = read(&reg, b"I\"\x06a\x06:\x06EF").unwrap();
    assert_eq!(s.encoding(), Some(Encoding::UsAscii));
    let Value::Hash(h) = read(&reg, b"I{\x00\x06:\x06KT").unwrap() else {
        panic!("Expected hash");
    };
    assert!(h.is_keyword());

    assert!(matches!(
        read(&reg, b"I[\x00\x06:\x06ET"),
        Err(MarshalError::Malformed(_))
    ));
    assert!(matches!(
        read(&reg, b"I[\x00\x06:\x06KT"),
        Err(MarshalError::Malformed(_))
    ));
}
