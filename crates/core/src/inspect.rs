//! Inspect rendering
//!
//! Formats a value graph as Ruby-like literal text. Graphs may be cyclic;
//! a container reached again while it is still being printed renders as
//! `[...]`, `{...}` or `#<Name ...>`.
//!
//! # Format Examples
//!
//! - Integer: `42`, Float: `1.5`, Symbol: `:name`
//! - String: `"hello"` (escaped)
//! - Array: `[1, 2, 3]`
//! - Hash: `{:a=>1, "b"=>2}`
//! - Object: `#<Point @x=1, @y=2>`
//! - Struct: `#<struct Point x=1, y=2>`

use crate::encoding::Encoding;
use crate::value::{HashDefault, ObjectId, Value};
use std::collections::HashSet;

/// Configuration for inspect output formatting
#[derive(Clone)]
pub struct InspectConfig {
    /// Use pretty printing with indentation
    pub pretty: bool,
    /// Number of spaces per indentation level
    pub indent: usize,
}

impl Default for InspectConfig {
    fn default() -> Self {
        Self {
            pretty: false,
            indent: 2,
        }
    }
}

impl InspectConfig {
    /// Create a compact (single-line) config
    pub fn compact() -> Self {
        Self::default()
    }

    /// Create a pretty-printed config
    pub fn pretty() -> Self {
        Self {
            pretty: true,
            indent: 2,
        }
    }
}

/// Render a value graph
pub fn inspect(value: &Value, config: &InspectConfig) -> String {
    let mut fmt = Formatter {
        config,
        visiting: HashSet::new(),
        buf: String::new(),
    };
    fmt.value(value, 0);
    fmt.buf
}

struct Formatter<'a> {
    config: &'a InspectConfig,
    visiting: HashSet<ObjectId>,
    buf: String,
}

impl Formatter<'_> {
    fn value(&mut self, value: &Value, depth: usize) {
        match value {
            Value::Nil => self.buf.push_str("nil"),
            Value::Bool(b) => self.buf.push_str(if *b { "true" } else { "false" }),
            Value::Integer(n) => self.buf.push_str(&n.to_string()),
            Value::Float(f) => self.float(*f),
            Value::Bignum(b) => {
                if b.is_negative() {
                    self.buf.push('-');
                }
                self.buf.push_str("0x");
                for byte in b.magnitude().iter().rev() {
                    self.buf.push_str(&format!("{:02x}", byte));
                }
            }
            Value::Symbol(s) => {
                self.buf.push(':');
                self.buf.push_str(&String::from_utf8_lossy(s.as_bytes()));
            }
            Value::String(s) => {
                let bytes = s.bytes().clone();
                format_string(&bytes, &s.encoding(), &mut self.buf);
            }
            Value::Regexp(r) => {
                self.buf.push('/');
                self.buf.push_str(&String::from_utf8_lossy(&r.source()));
                self.buf.push('/');
                let opts = r.options();
                if opts & crate::value::REGEXP_MULTILINE != 0 {
                    self.buf.push('m');
                }
                if opts & crate::value::REGEXP_IGNORECASE != 0 {
                    self.buf.push('i');
                }
                if opts & crate::value::REGEXP_EXTENDED != 0 {
                    self.buf.push('x');
                }
            }
            Value::Class(c) => self.buf.push_str(&c.display_name()),
            Value::Proc(_) => self.buf.push_str("#<Proc>"),
            Value::Data(d) => {
                self.buf.push_str(&format!(
                    "#<{} data={}B>",
                    d.header.class().display_name(),
                    d.payload().len()
                ));
            }
            Value::Array(_) | Value::Hash(_) | Value::Struct(_) | Value::Object(_) => {
                self.container(value, depth);
            }
        }
    }

    fn float(&mut self, f: f64) {
        if f.is_nan() {
            self.buf.push_str("NaN");
        } else if f.is_infinite() {
            self.buf.push_str(if f < 0.0 { "-Infinity" } else { "Infinity" });
        } else {
            let s = f.to_string();
            self.buf.push_str(&s);
            // Ensure floats always have decimal point for disambiguation
            if !s.contains('.') {
                self.buf.push_str(".0");
            }
        }
    }

    fn container(&mut self, value: &Value, depth: usize) {
        let Some(id) = value.identity() else {
            return;
        };
        if !self.visiting.insert(id) {
            match value {
                Value::Array(_) => self.buf.push_str("[...]"),
                Value::Hash(_) => self.buf.push_str("{...}"),
                other => self.buf.push_str(&format!("#<{} ...>", other.type_name())),
            }
            return;
        }

        match value {
            Value::Array(a) => {
                let items = a.items().clone();
                self.buf.push('[');
                self.sequence(&items, depth, |fmt, item, d| fmt.value(item, d));
                self.buf.push(']');
            }
            Value::Hash(h) => {
                let entries = h.entries().clone();
                self.buf.push('{');
                self.sequence(&entries, depth, |fmt, (k, v), d| {
                    fmt.value(k, d);
                    fmt.buf.push_str("=>");
                    fmt.value(v, d);
                });
                self.buf.push('}');
                if let HashDefault::Value(default) = h.default() {
                    self.buf.push_str(" (default ");
                    self.value(&default, depth);
                    self.buf.push(')');
                }
            }
            Value::Struct(s) => {
                let class = s.header.class();
                let fields: Vec<_> = class
                    .members()
                    .iter()
                    .cloned()
                    .zip(s.values().iter().cloned())
                    .collect();
                self.buf.push_str("#<struct ");
                self.buf.push_str(&class.display_name());
                if !fields.is_empty() {
                    self.buf.push(' ');
                }
                self.sequence(&fields, depth, |fmt, (name, v), d| {
                    fmt.buf.push_str(&name.to_string());
                    fmt.buf.push('=');
                    fmt.value(v, d);
                });
                self.buf.push('>');
            }
            Value::Object(o) => {
                let attrs = o.header.attributes();
                self.buf.push_str("#<");
                self.buf.push_str(&o.header.class().display_name());
                if !attrs.is_empty() {
                    self.buf.push(' ');
                }
                self.sequence(&attrs, depth, |fmt, (name, v), d| {
                    fmt.buf.push_str(&name.to_string());
                    fmt.buf.push('=');
                    fmt.value(v, d);
                });
                self.buf.push('>');
            }
            _ => {}
        }

        self.visiting.remove(&id);
    }

    fn sequence<T>(
        &mut self,
        items: &[T],
        depth: usize,
        mut each: impl FnMut(&mut Self, &T, usize),
    ) {
        if items.is_empty() {
            return;
        }
        if self.config.pretty {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    self.buf.push(',');
                }
                self.buf.push('\n');
                push_indent(&mut self.buf, depth + 1, self.config.indent);
                each(self, item, depth + 1);
            }
            self.buf.push('\n');
            push_indent(&mut self.buf, depth, self.config.indent);
        } else {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    self.buf.push_str(", ");
                }
                each(self, item, depth);
            }
        }
    }
}

/// Format a string with proper escaping
fn format_string(bytes: &[u8], encoding: &Encoding, buf: &mut String) {
    buf.push('"');
    let text = match encoding {
        Encoding::Binary => None,
        _ => std::str::from_utf8(bytes).ok(),
    };
    match text {
        Some(s) => {
            for c in s.chars() {
                match c {
                    '"' => buf.push_str("\\\""),
                    '\\' => buf.push_str("\\\\"),
                    '\n' => buf.push_str("\\n"),
                    '\r' => buf.push_str("\\r"),
                    '\t' => buf.push_str("\\t"),
                    c if c.is_control() => buf.push_str(&format!("\\u{:04x}", c as u32)),
                    c => buf.push(c),
                }
            }
        }
        None => {
            for &b in bytes {
                match b {
                    b'"' => buf.push_str("\\\""),
                    b'\\' => buf.push_str("\\\\"),
                    0x20..=0x7e => buf.push(b as char),
                    _ => buf.push_str(&format!("\\x{:02X}", b)),
                }
            }
        }
    }
    buf.push('"');
}

/// Push indentation spaces
fn push_indent(buf: &mut String, depth: usize, indent_size: usize) {
    for _ in 0..(depth * indent_size) {
        buf.push(' ');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use crate::symbol::Symbol;

    #[test]
    fn test_scalars() {
        let c = InspectConfig::compact();
        assert_eq!(inspect(&Value::Nil, &c), "nil");
        assert_eq!(inspect(&Value::Integer(-3), &c), "-3");
        assert_eq!(inspect(&Value::Float(2.0), &c), "2.0");
        assert_eq!(inspect(&Value::Symbol(Symbol::intern("a")), &c), ":a");
    }

    #[test]
    fn test_string_escaping() {
        let reg = Registry::new();
        let c = InspectConfig::compact();
        assert_eq!(inspect(&reg.str("a\"b\n"), &c), "\"a\\\"b\\n\"");
        assert_eq!(inspect(&reg.binary(&[0xff, b'a']), &c), "\"\\xFFa\"");
    }

    #[test]
    fn test_nested_containers() {
        let reg = Registry::new();
        let h = reg.hash_from(vec![(reg.symbol("k"), reg.array(vec![Value::Integer(1)]))]);
        assert_eq!(inspect(&h, &InspectConfig::compact()), "{:k=>[1]}");
    }

    #[test]
    fn test_cycle_marker() {
        let reg = Registry::new();
        let a = reg.array(vec![]);
        if let Value::Array(inner) = &a {
            inner.push(a.clone());
        }
        assert_eq!(inspect(&a, &InspectConfig::compact()), "[[...]]");
    }

    #[test]
    fn test_shared_not_cycle() {
        let reg = Registry::new();
        let s = reg.array(vec![]);
        let outer = reg.array(vec![s.clone(), s]);
        assert_eq!(inspect(&outer, &InspectConfig::compact()), "[[], []]");
    }

    #[test]
    fn test_pretty() {
        let reg = Registry::new();
        let a = reg.array(vec![Value::Integer(1), Value::Integer(2)]);
        assert_eq!(inspect(&a, &InspectConfig::pretty()), "[\n  1,\n  2\n]");
    }

    #[test]
    fn test_object_and_struct() {
        let reg = Registry::new();
        let point = reg.define_struct("Point", &["x", "y"]);
        let p = reg.struct_new(&point, vec![Value::Integer(1), Value::Integer(2)]);
        assert_eq!(
            inspect(&p, &InspectConfig::compact()),
            "#<struct Point x=1, y=2>"
        );
        let foo = reg.define_class("Foo", &reg.object_class());
        let o = reg.object(&foo);
        o.set_attribute(Symbol::intern("@a"), Value::Nil);
        assert_eq!(inspect(&o, &InspectConfig::compact()), "#<Foo @a=nil>");
    }
}
