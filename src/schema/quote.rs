/// Quote an identifier with no table prefix. See [`IdentifierQuoter::quote`].
///
/// ```rust
/// use sqlsrv_core::schema::quote_identifier;
///
/// assert_eq!(quote_identifier("dbo.users.id"), "[dbo].[users].[id]");
/// assert_eq!(quote_identifier("odd]name"), "[odd]]name]");
/// assert_eq!(quote_identifier("*"), "*");
/// ```
#[must_use]
pub fn quote_identifier(value: &str) -> String {
    IdentifierQuoter::default().quote(value)
}

/// Bracket-quotes identifiers, applying a table prefix where a table name appears.
///
/// This only transforms text. It never evaluates its input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentifierQuoter {
    prefix: String,
}

impl IdentifierQuoter {
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Quote a column-level identifier.
    ///
    /// * `*` is returned as is.
    /// * Each `"name"` inside an expression such as `COUNT("id")` is quoted in place.
    /// * A dotted name is quoted per segment; the table segment (second to
    ///   last) gets the prefix.
    /// * Anything else is wrapped in brackets with `]` doubled.
    #[must_use]
    pub fn quote(&self, value: &str) -> String {
        if value == "*" {
            return value.to_string();
        }
        if value.contains('"') {
            return self.requote_embedded(value);
        }
        if value.contains('.') {
            let mut parts: Vec<String> = value.split('.').map(str::to_string).collect();
            if !self.prefix.is_empty() {
                let table = parts.len() - 2;
                parts[table].insert_str(0, &self.prefix);
            }
            return parts.iter().map(|p| self.quote(p)).collect::<Vec<_>>().join(".");
        }
        bracket(value)
    }

    /// Quote a table name, prefixing its last segment.
    #[must_use]
    pub fn quote_table(&self, table: &str) -> String {
        let mut parts: Vec<&str> = table.split('.').collect();
        let name = format!("{}{}", self.prefix, parts.pop().unwrap_or_default());
        parts
            .into_iter()
            .map(bracket)
            .chain(std::iter::once(bracket(&name)))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// `[value] AS [alias]`
    #[must_use]
    pub fn aliased(&self, value: &str, alias: &str) -> String {
        format!("{} AS {}", self.quote(value), self.quote(alias))
    }

    fn requote_embedded(&self, value: &str) -> String {
        let mut out = String::with_capacity(value.len() + 8);
        let mut rest = value;
        while let Some(open) = rest.find('"') {
            let after = &rest[open + 1..];
            // The quoted name needs at least one character.
            let close = after
                .char_indices()
                .skip(1)
                .find(|&(_, c)| c == '"')
                .map(|(i, _)| i);
            let Some(close) = close else {
                break;
            };
            out.push_str(&rest[..open]);
            out.push_str(&self.quote(&after[..close]));
            rest = &after[close + 1..];
        }
        out.push_str(rest);
        out
    }
}

fn bracket(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_table_segment_of_columns() {
        let q = IdentifierQuoter::new("app_");
        assert_eq!(q.quote("users.id"), "[app_users].[id]");
        assert_eq!(q.quote("dbo.users.id"), "[dbo].[app_users].[id]");
        assert_eq!(q.quote("users.*"), "[app_users].*");
        assert_eq!(q.quote("id"), "[id]");
    }

    #[test]
    fn quotes_tables_and_aliases() {
        let q = IdentifierQuoter::new("app_");
        assert_eq!(q.quote_table("users"), "[app_users]");
        assert_eq!(q.quote_table("dbo.users"), "[dbo].[app_users]");
        assert_eq!(q.aliased("name", "n"), "[name] AS [n]");
    }

    #[test]
    fn requotes_embedded_identifiers_without_evaluating() {
        let q = IdentifierQuoter::default();
        assert_eq!(q.quote("COUNT(\"id\")"), "COUNT([id])");
        assert_eq!(q.quote("MAX(\"t.a\") + \"b\""), "MAX([t].[a]) + [b]");
        assert_eq!(q.quote("f(\"${x}\")"), "f([${x}])");
        assert_eq!(q.quote("x = \"\""), "x = \"\"");
    }
}
