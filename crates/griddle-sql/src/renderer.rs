use crate::expression::{Arg, Expression, Rendered};
use crate::Dialect;

use griddle_core::{Error, Result, Value};
use indexmap::IndexMap;

/// Walks expression templates and writes the final SQL.
///
/// One renderer instance exists per top-level render call. Nested expressions
/// and queries share it, so parameter names stay unique across the whole
/// statement.
pub(crate) struct Renderer {
    dialect: Dialect,

    /// Where the serialized SQL is written
    dst: String,

    /// Parameters collected so far, keyed by placeholder name
    params: IndexMap<String, Value>,

    /// How many parameters have been named in this render pass
    param_count: usize,

    /// When set, values are written as SQL literals instead of parameters.
    /// Used for diagnostic previews only.
    inline_literals: bool,
}

impl Renderer {
    pub(crate) fn new(dialect: Dialect) -> Renderer {
        Renderer {
            dialect,
            dst: String::new(),
            params: IndexMap::new(),
            param_count: 0,
            inline_literals: false,
        }
    }

    pub(crate) fn new_preview(dialect: Dialect) -> Renderer {
        Renderer {
            inline_literals: true,
            ..Renderer::new(dialect)
        }
    }

    pub(crate) fn finish(self) -> Rendered {
        Rendered {
            sql: self.dst,
            params: self.params,
        }
    }

    /// Scans the template once, copying literal spans and dispatching on the
    /// three placeholder kinds.
    ///
    /// The scanner is byte-oriented. Every byte it treats specially is ASCII,
    /// so multi-byte characters always land in literal spans and are copied
    /// through verbatim.
    pub(crate) fn render_expression(&mut self, expr: &Expression) -> Result<()> {
        let template = expr.template.as_str();
        let bytes = template.as_bytes();

        let mut pos = 0;
        let mut lit_start = 0;
        let mut cursor = 0;

        while pos < bytes.len() {
            match bytes[pos] {
                // Quoted spans are literal text. Placeholders inside them are
                // never resolved.
                b'\'' | b'"' | b'`' => {
                    pos = skip_quoted(bytes, pos, self.dialect);
                }
                b'[' => {
                    if let Some((tag_end, next)) = scan_placeholder(bytes, pos + 1, b"]") {
                        self.dst.push_str(&template[lit_start..pos]);
                        let arg = resolve(expr, &template[pos + 1..tag_end], &mut cursor)?;
                        self.render_param(arg)?;
                        pos = next;
                        lit_start = pos;
                    } else {
                        pos += 1;
                    }
                }
                b'{' if pos + 1 < bytes.len() && bytes[pos + 1] == b'{' => {
                    if let Some((tag_end, next)) = scan_placeholder(bytes, pos + 2, b"}}") {
                        self.dst.push_str(&template[lit_start..pos]);
                        let arg = resolve(expr, &template[pos + 2..tag_end], &mut cursor)?;
                        self.render_identifier(arg, true)?;
                        pos = next;
                        lit_start = pos;
                    } else {
                        pos += 1;
                    }
                }
                b'{' => {
                    if let Some((tag_end, next)) = scan_placeholder(bytes, pos + 1, b"}") {
                        self.dst.push_str(&template[lit_start..pos]);
                        let arg = resolve(expr, &template[pos + 1..tag_end], &mut cursor)?;
                        self.render_identifier(arg, false)?;
                        pos = next;
                        lit_start = pos;
                    } else {
                        pos += 1;
                    }
                }
                _ => pos += 1,
            }
        }

        self.dst.push_str(&template[lit_start..]);
        Ok(())
    }

    fn render_param(&mut self, arg: &Arg) -> Result<()> {
        match arg {
            Arg::Value(Value::List(items)) => {
                if items.is_empty() {
                    return Err(Error::render("cannot bind an empty list as a parameter"));
                }
                self.dst.push('(');
                let mut sep = "";
                for item in items {
                    self.dst.push_str(sep);
                    self.value(item)?;
                    sep = ", ";
                }
                self.dst.push(')');
                Ok(())
            }
            Arg::Value(value) => self.value(value),
            Arg::Expr(expr) => self.render_expression(expr),
            Arg::Query(query) => {
                let built = query.build(self.dialect)?;
                if query.is_wrapped() {
                    self.dst.push('(');
                    self.render_expression(&built)?;
                    self.dst.push(')');
                } else {
                    self.render_expression(&built)?;
                }
                Ok(())
            }
        }
    }

    fn render_identifier(&mut self, arg: &Arg, soft: bool) -> Result<()> {
        match arg {
            Arg::Value(Value::String(name)) => {
                let escaped = if soft {
                    self.dialect.escape_identifier_soft(name)
                } else {
                    self.dialect.escape_identifier(name)
                };
                self.dst.push_str(&escaped);
                Ok(())
            }
            Arg::Value(other) => Err(Error::render(format!(
                "identifier placeholder requires a string, got {}",
                other.type_name()
            ))),
            // Expression arguments under an identifier placeholder are
            // consumed inline, matching the parameter placeholder path.
            _ => self.render_param(arg),
        }
    }

    fn value(&mut self, value: &Value) -> Result<()> {
        if self.inline_literals {
            return self.literal(value);
        }

        let name = format!(":{}", param_name(self.param_count));
        self.param_count += 1;
        self.dst.push_str(&name);
        self.params.insert(name, value.clone());
        Ok(())
    }

    fn literal(&mut self, value: &Value) -> Result<()> {
        use std::fmt::Write;

        match value {
            Value::Null => self.dst.push_str("null"),
            Value::Bool(true) => self.dst.push_str("true"),
            Value::Bool(false) => self.dst.push_str("false"),
            Value::I64(n) => {
                let _ = write!(self.dst, "{n}");
            }
            Value::F64(n) => {
                let _ = write!(self.dst, "{n}");
            }
            Value::String(s) => self.string_literal(s),
            Value::Bytes(bytes) => {
                self.dst.push_str("x'");
                for byte in bytes {
                    let _ = write!(self.dst, "{byte:02x}");
                }
                self.dst.push('\'');
            }
            Value::Date(date) => self.string_literal(&date.format("%Y-%m-%d").to_string()),
            Value::Time(time) => self.string_literal(&time.format("%H:%M:%S").to_string()),
            Value::DateTime(dt) => {
                self.string_literal(&dt.format("%Y-%m-%d %H:%M:%S").to_string())
            }
            Value::Json(json) => {
                let text = serde_json::to_string(json).map_err(Error::from)?;
                self.string_literal(&text);
            }
            Value::List(items) => {
                self.dst.push('(');
                let mut sep = "";
                for item in items {
                    self.dst.push_str(sep);
                    self.literal(item)?;
                    sep = ", ";
                }
                self.dst.push(')');
            }
        }
        Ok(())
    }

    fn string_literal(&mut self, s: &str) {
        self.dst.push('\'');
        for ch in s.chars() {
            if ch == '\'' {
                self.dst.push('\'');
            }
            self.dst.push(ch);
        }
        self.dst.push('\'');
    }
}

/// Looks up the argument for a placeholder tag. The empty tag consumes the
/// next positional argument.
fn resolve<'e>(expr: &'e Expression, tag: &str, cursor: &mut usize) -> Result<&'e Arg> {
    if tag.is_empty() {
        let arg = expr.positional.get(*cursor).ok_or_else(|| {
            Error::render(format!(
                "not enough positional arguments for template {:?}",
                expr.template
            ))
        })?;
        *cursor += 1;
        Ok(arg)
    } else {
        expr.named.get(tag).ok_or_else(|| {
            Error::render(format!(
                "tag {:?} has no matching argument in template {:?}",
                tag, expr.template
            ))
        })
    }
}

/// Scans a placeholder body starting at `start`: word characters followed by
/// the expected closer. Returns the tag end and the position after the
/// closer, or `None` if the text is not a placeholder.
fn scan_placeholder(bytes: &[u8], start: usize, closer: &[u8]) -> Option<(usize, usize)> {
    let mut i = start;
    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
        i += 1;
    }
    if bytes[i..].starts_with(closer) {
        Some((i, i + closer.len()))
    } else {
        None
    }
}

/// Skips a quoted span, returning the position just past the closing quote.
///
/// A doubled quote stays inside the span. Under dialects with backslash
/// escapes, a backslash consumes the following character unless the span is
/// a backtick identifier. An unterminated span runs to the end of input.
fn skip_quoted(bytes: &[u8], start: usize, dialect: Dialect) -> usize {
    let quote = bytes[start];
    let backslash = dialect.backslash_escapes() && quote != b'`';

    let mut i = start + 1;
    while i < bytes.len() {
        let b = bytes[i];
        if backslash && b == b'\\' {
            i += 2;
            continue;
        }
        if b == quote {
            if i + 1 < bytes.len() && bytes[i + 1] == quote {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

/// Parameter names count through `a`..`z`, then `aa`, `ab`, and so on.
fn param_name(mut n: usize) -> String {
    let mut buf = Vec::new();
    loop {
        buf.push(b'a' + (n % 26) as u8);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    buf.reverse();
    // Bytes are always ASCII lowercase letters
    String::from_utf8(buf).unwrap()
}
