//! Dump then load: values, identity and cycles survive

use marshal_codec::{MarshalConfig, dump, dump_to, load, load_from, load_with};
use marshal_core::{Encoding, HashDefault, HookError, Registry, Symbol, Value};

fn roundtrip(reg: &Registry, value: &Value) -> Value {
    let config = MarshalConfig::default();
    let bytes = dump(reg, value, &config).unwrap();
    load(reg, &bytes, &config).unwrap()
}

#[test]
fn test_primitives() {
    let reg = Registry::new();
    assert!(roundtrip(&reg, &Value::Nil).is_nil());
    assert!(matches!(roundtrip(&reg, &Value::Bool(true)), Value::Bool(true)));
    assert!(matches!(roundtrip(&reg, &Value::Bool(false)), Value::Bool(false)));
    for n in [
        0,
        1,
        -1,
        122,
        123,
        -123,
        -124,
        255,
        256,
        65535,
        1 << 20,
        -(1 << 20),
        (1 << 30) - 1,
        -(1 << 30),
        1 << 30,
        -(1 << 30) - 1,
        i32::MAX as i64,
        i32::MIN as i64,
        1 << 40,
        i64::MAX,
        i64::MIN,
    ] {
        assert_eq!(roundtrip(&reg, &Value::Integer(n)).as_integer(), Some(n), "integer {}", n);
    }
}

#[test]
fn test_bignum() {
    let reg = Registry::new();
    let big = reg.integer_from_magnitude(false, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11]);
    match roundtrip(&reg, &big) {
        Value::Bignum(b) => {
            assert!(!b.is_negative());
            assert_eq!(b.magnitude(), [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11]);
        }
        other => panic!("Expected bignum, got {:?}", other),
    }
}

#[test]
fn test_floats() {
    let reg = Registry::new();
    for f in [0.0, -0.0, 1.5, -2.75, 1e100, 1e-100, 0.1, f64::MAX, f64::MIN_POSITIVE] {
        match roundtrip(&reg, &Value::Float(f)) {
            Value::Float(back) => assert_eq!(back.to_bits(), f.to_bits(), "float {}", f),
            other => panic!("Expected float, got {:?}", other),
        }
    }
    match roundtrip(&reg, &Value::Float(f64::NAN)) {
        Value::Float(back) => assert!(back.is_nan()),
        other => panic!("Expected float, got {:?}", other),
    }
}

#[test]
fn test_strings_keep_encoding() {
    let reg = Registry::new();
    let utf8 = reg.str("héllo wörld");
    let back = roundtrip(&reg, &utf8);
    assert_eq!(back.string_bytes(), utf8.string_bytes());
    assert_eq!(back.encoding(), Some(Encoding::Utf8));

    let raw = reg.binary(&[0, 0xff, 0x80]);
    let back = roundtrip(&reg, &raw);
    assert_eq!(back.string_bytes().unwrap(), [0, 0xff, 0x80]);
    assert_eq!(back.encoding(), Some(Encoding::Binary));

    let sjis = reg.string_with(vec![0x82, 0xa0], Encoding::from_name("Shift_JIS"));
    assert_eq!(
        roundtrip(&reg, &sjis).encoding(),
        Some(Encoding::Other("Shift_JIS".into()))
    );
}

#[test]
fn test_symbols() {
    let reg = Registry::new();
    let back = roundtrip(&reg, &reg.symbol("name"));
    assert_eq!(back.as_symbol(), Some(&Symbol::intern("name")));
    let back = roundtrip(&reg, &reg.symbol("café"));
    assert_eq!(back.as_symbol(), Some(&Symbol::intern("café")));
}

#[test]
fn test_collections() {
    let reg = Registry::new();
    let h = reg.hash_from(vec![
        (reg.symbol("a"), Value::Integer(1)),
        (reg.str("b"), reg.array(vec![Value::Nil, Value::Float(2.5)])),
    ]);
    let back = roundtrip(&reg, &h);
    let Value::Hash(hash) = &back else {
        panic!("Expected hash");
    };
    assert_eq!(hash.len(), 2);
    assert_eq!(hash.get(&reg.symbol("a")).unwrap().as_integer(), Some(1));
    let Some(Value::Array(list)) = hash.get(&reg.str("b")) else {
        panic!("Expected array value");
    };
    assert!(list.get(0).unwrap().is_nil());
    assert!(matches!(hash.default(), HashDefault::None));
}

#[test]
fn test_hash_default_and_identity() {
    let reg = Registry::new();
    let h = reg.hash();
    let Value::Hash(inner) = &h else {
        panic!("Expected hash");
    };
    inner.set_default(HashDefault::Value(reg.str("missing")));
    inner.set_compare_by_identity(true);
    inner.insert(reg.str("k"), Value::Integer(1));

    let back = roundtrip(&reg, &h);
    let Value::Hash(hash) = &back else {
        panic!("Expected hash");
    };
    assert!(hash.is_compare_by_identity());
    match hash.default() {
        HashDefault::Value(d) => assert_eq!(d.string_bytes().unwrap(), b"missing"),
        _ => panic!("Expected default value"),
    }
    assert!(std::rc::Rc::ptr_eq(&back.class_of().unwrap(), &reg.hash_class()));
}

#[test]
fn test_keyword_flag() {
    let reg = Registry::new();
    let h = reg.hash_from(vec![(reg.symbol("k"), Value::Integer(1))]);
    if let Value::Hash(inner) = &h {
        inner.set_keyword(true);
    }
    match roundtrip(&reg, &h) {
        Value::Hash(hash) => assert!(hash.is_keyword()),
        other => panic!("Expected hash, got {:?}", other),
    }
}

#[test]
fn test_shared_identity() {
    let reg = Registry::new();
    let s = reg.str("shared");
    let back = roundtrip(&reg, &reg.array(vec![s.clone(), s]));
    let Value::Array(a) = &back else {
        panic!("Expected array");
    };
    assert!(a.get(0).unwrap().ptr_eq(&a.get(1).unwrap()));

    let distinct = roundtrip(&reg, &reg.array(vec![reg.str("x"), reg.str("x")]));
    let Value::Array(a) = &distinct else {
        panic!("Expected array");
    };
    assert!(!a.get(0).unwrap().ptr_eq(&a.get(1).unwrap()));
}

#[test]
fn test_self_referential_hash() {
    let reg = Registry::new();
    let h = reg.hash();
    if let Value::Hash(inner) = &h {
        inner.insert(reg.symbol("self"), h.clone());
    }
    let back = roundtrip(&reg, &h);
    let Value::Hash(hash) = &back else {
        panic!("Expected hash");
    };
    assert!(hash.get(&reg.symbol("self")).unwrap().ptr_eq(&back));
}

#[test]
fn test_object_cycle_through_attributes() {
    let reg = Registry::new();
    let node = reg.define_class("Node", &reg.object_class());
    let a = reg.object(&node);
    let b = reg.object(&node);
    a.set_attribute(Symbol::intern("@next"), b.clone());
    b.set_attribute(Symbol::intern("@next"), a.clone());

    let back = roundtrip(&reg, &a);
    let next = back.attribute("@next").unwrap();
    assert!(next.attribute("@next").unwrap().ptr_eq(&back));
    assert!(std::rc::Rc::ptr_eq(&back.class_of().unwrap(), &node));
}

#[test]
fn test_symbol_dedup() {
    let reg = Registry::new();
    let config = MarshalConfig::default();
    let sym = reg.symbol("repeat");
    let value = reg.array(vec![sym; 5]);
    let bytes = dump(&reg, &value, &config).unwrap();

    let full = bytes.windows(2).filter(|w| *w == b":\x0b").count();
    let links = bytes.windows(2).filter(|w| *w == b";\x00").count();
    assert_eq!(full, 1);
    assert_eq!(links, 4);

    let Value::Array(a) = load(&reg, &bytes, &config).unwrap() else {
        panic!("Expected array");
    };
    let first = a.get(0).unwrap();
    for item in a.items().iter() {
        assert!(item.as_symbol().unwrap().ptr_eq(first.as_symbol().unwrap()));
    }
}

#[test]
fn test_struct_and_regexp() {
    let reg = Registry::new();
    let point = reg.define_struct("Point", &["x", "y"]);
    let p = reg.struct_new(&point, vec![Value::Integer(3), reg.regexp("a+b", 1)]);
    let back = roundtrip(&reg, &p);
    let Value::Struct(s) = &back else {
        panic!("Expected struct");
    };
    assert_eq!(s.get(&Symbol::intern("x")).unwrap().as_integer(), Some(3));
    let Some(Value::Regexp(r)) = s.get(&Symbol::intern("y")) else {
        panic!("Expected regexp");
    };
    assert_eq!(*r.source(), b"a+b");
    assert_eq!(r.options(), 1);
    assert_eq!(r.encoding(), Encoding::UsAscii);
}

#[test]
fn test_classes_and_extensions() {
    let reg = Registry::new();
    let m = reg.define_module("Greeter");
    let first = reg.define_module("First");
    let s = reg.str("hi");
    s.extend(m.clone());
    s.extend(first.clone());
    let value = reg.array(vec![Value::Class(reg.array_class()), Value::Class(m.clone()), s]);

    let back = roundtrip(&reg, &value);
    let Value::Array(a) = &back else {
        panic!("Expected array");
    };
    assert!(matches!(a.get(0), Some(Value::Class(c)) if std::rc::Rc::ptr_eq(&c, &reg.array_class())));
    assert!(matches!(a.get(1), Some(Value::Class(c)) if std::rc::Rc::ptr_eq(&c, &m)));
    let chain = a.get(2).unwrap().header().map(|h| h.extended()).unwrap();
    assert_eq!(chain.len(), 2);
    assert!(std::rc::Rc::ptr_eq(&chain[0], &first));
    assert!(std::rc::Rc::ptr_eq(&chain[1], &m));
}

#[test]
fn test_subclass_instances() {
    let reg = Registry::new();
    let list = reg.define_class("List", &reg.array_class());
    let value = reg.allocate(&list).unwrap();
    if let Value::Array(a) = &value {
        a.push(Value::Integer(1));
    }
    value.set_attribute(Symbol::intern("@name"), reg.str("nums"));

    let back = roundtrip(&reg, &value);
    assert!(std::rc::Rc::ptr_eq(&back.class_of().unwrap(), &list));
    assert_eq!(
        back.attribute("@name").unwrap().string_bytes().unwrap(),
        b"nums"
    );
}

#[test]
fn test_freeze_deduplicates_strings() {
    let reg = Registry::new();
    let config = MarshalConfig::new().with_freeze(true);
    let value = reg.array(vec![reg.str("same"), reg.str("same"), reg.str("other")]);
    let bytes = dump(&reg, &value, &config).unwrap();
    let back = load(&reg, &bytes, &config).unwrap();
    assert!(back.is_frozen());
    let Value::Array(a) = &back else {
        panic!("Expected array");
    };
    let (x, y, z) = (a.get(0).unwrap(), a.get(1).unwrap(), a.get(2).unwrap());
    assert!(x.is_frozen());
    assert!(x.ptr_eq(&y));
    assert!(!x.ptr_eq(&z));
}

#[test]
fn test_load_with_callback() {
    let reg = Registry::new();
    let config = MarshalConfig::default();
    let value = reg.array(vec![Value::Integer(1), reg.symbol("s"), Value::Integer(2)]);
    let bytes = dump(&reg, &value, &config).unwrap();

    let mut seen = Vec::new();
    let mut double = |v: Value| -> Result<Value, HookError> {
        seen.push(format!("{:?}", v));
        Ok(match v {
            Value::Integer(n) => Value::Integer(n * 2),
            other => other,
        })
    };
    let back = load_with(&reg, &bytes[..], &config, &mut double).unwrap();
    let Value::Array(a) = &back else {
        panic!("Expected array");
    };
    assert_eq!(a.get(0).unwrap().as_integer(), Some(2));
    assert_eq!(a.get(2).unwrap().as_integer(), Some(4));
    // two integers and the array; the symbol is skipped
    assert_eq!(seen.len(), 3);
}

#[test]
fn test_callback_error_aborts() {
    let reg = Registry::new();
    let config = MarshalConfig::default();
    let bytes = dump(&reg, &reg.str("x"), &config).unwrap();
    let mut fail = |_: Value| -> Result<Value, HookError> { Err(HookError::new("rejected")) };
    let err = load_with(&reg, &bytes[..], &config, &mut fail).unwrap_err();
    assert_eq!(err.to_string(), "rejected");
}

#[test]
fn test_stream_helpers() {
    let reg = Registry::new();
    let config = MarshalConfig::default();
    let mut sink = Vec::new();
    dump_to(&reg, &reg.str("io"), &config, &mut sink).unwrap();
    let back = load_from(&reg, std::io::Cursor::new(sink), &config).unwrap();
    assert_eq!(back.string_bytes().unwrap(), b"io");
}

fn my_str(reg: &Registry, bytes: &[u8]) -> Value {
    let class = reg.define_class("MyStr", &reg.string_class());
    let value = reg.allocate(&class).unwrap();
    if let Value::String(s) = &value {
        s.set_bytes(bytes.to_vec());
    }
    value
}

#[test]
fn test_freeze_keeps_subclass_strings_apart() {
    let reg = Registry::new();
    let config = MarshalConfig::new().with_freeze(true);
    for plain_first in [true, false] {
        let (plain, sub) = (reg.binary(b"abc"), my_str(&reg, b"abc"));
        let items = if plain_first {
            vec![plain, sub]
        } else {
            vec![sub, plain]
        };
        let bytes = dump(&reg, &reg.array(items), &config).unwrap();
        let Value::Array(a) = load(&reg, &bytes, &config).unwrap() else {
            panic!("Expected array");
        };
        let (first, second) = (a.get(0).unwrap(), a.get(1).unwrap());
        let (plain, sub) = if plain_first {
            (first, second)
        } else {
            (second, first)
        };
        assert_eq!(plain.type_name(), "String");
        assert_eq!(sub.type_name(), "MyStr");
        assert!(!plain.ptr_eq(&sub));
        assert!(plain.is_frozen() && sub.is_frozen());
    }
}

#[test]
fn test_callback_sees_wrapper_class() {
    let reg = Registry::new();
    let config = MarshalConfig::default();
    let bytes = dump(&reg, &reg.array(vec![my_str(&reg, b"x")]), &config).unwrap();

    let mut seen = Vec::new();
    let mut record = |v: Value| -> Result<Value, HookError> {
        seen.push(v.type_name());
        Ok(v)
    };
    load_with(&reg, &bytes[..], &config, &mut record).unwrap();
    assert_eq!(seen, ["MyStr", "Array"]);
}
