/// The SQL dialect a statement is rendered for.
///
/// The dialect handles the differences between engines: identifier quoting,
/// string escape rules, and the few operators that are spelled differently.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Dialect {
    #[default]
    Sqlite,
    Mysql,
    Postgresql,
}

impl Dialect {
    /// The character used to quote identifiers.
    pub fn identifier_quote(&self) -> char {
        match self {
            Dialect::Mysql => '`',
            Dialect::Sqlite | Dialect::Postgresql => '"',
        }
    }

    /// Whether string literals treat backslash as an escape character.
    ///
    /// Standard SQL escapes a quote by doubling it. MySQL additionally
    /// accepts backslash escapes, which the template scanner must honor so
    /// placeholders inside literals stay untouched.
    pub fn backslash_escapes(&self) -> bool {
        matches!(self, Dialect::Mysql)
    }

    /// The spelling of the regular expression match operator.
    pub fn regexp_operator(&self) -> &'static str {
        match self {
            Dialect::Postgresql => "~",
            Dialect::Sqlite | Dialect::Mysql => "regexp",
        }
    }

    /// The spelling of the negated regular expression match operator.
    pub fn not_regexp_operator(&self) -> &'static str {
        match self {
            Dialect::Postgresql => "!~",
            Dialect::Sqlite | Dialect::Mysql => "not regexp",
        }
    }

    /// Quotes an identifier unconditionally, doubling embedded quote marks.
    pub fn escape_identifier(&self, ident: &str) -> String {
        let quote = self.identifier_quote();
        let mut out = String::with_capacity(ident.len() + 2);
        out.push(quote);
        for ch in ident.chars() {
            if ch == quote {
                out.push(quote);
            }
            out.push(ch);
        }
        out.push(quote);
        out
    }

    /// Quotes an identifier unless it is a form that must pass through as-is.
    ///
    /// Left untouched: the bare `*` projection, dotted paths such as
    /// `employee.name` or `e.*`, parenthesized sub-expressions, and values the
    /// caller already quoted.
    pub fn escape_identifier_soft(&self, ident: &str) -> String {
        if self.is_unescapable(ident) {
            ident.to_string()
        } else {
            self.escape_identifier(ident)
        }
    }

    fn is_unescapable(&self, ident: &str) -> bool {
        ident == "*"
            || ident.contains('.')
            || ident.contains('(')
            || (ident.starts_with(self.identifier_quote()) && ident.ends_with(self.identifier_quote()) && ident.len() >= 2)
    }
}

impl core::fmt::Display for Dialect {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.write_str(match self {
            Dialect::Sqlite => "sqlite",
            Dialect::Mysql => "mysql",
            Dialect::Postgresql => "postgresql",
        })
    }
}
