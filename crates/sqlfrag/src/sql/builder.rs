use super::{Arg, FieldRef, Sql};
use crate::error::{SqlError, SqlResult};
use crate::template;

/// The first input of a construction: template text, or an existing fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum Template {
    Text(String),
    Sql(Sql),
}

impl From<&str> for Template {
    fn from(v: &str) -> Self {
        Template::Text(v.to_string())
    }
}

impl From<String> for Template {
    fn from(v: String) -> Self {
        Template::Text(v)
    }
}

impl From<Sql> for Template {
    fn from(v: Sql) -> Self {
        Template::Sql(v)
    }
}

impl From<&Sql> for Template {
    fn from(v: &Sql) -> Self {
        Template::Sql(v.clone())
    }
}

/// General fragment construction.
///
/// Accepts either positional arguments (`%s`) or named arguments
/// (`%(name)s`), never both, plus an optional flush hint. When the template is
/// already a [`Sql`], no further input is accepted and the result is a copy.
///
/// # Example
///
/// ```ignore
/// let f = Sql::build("%(col)s = %(val)s")
///     .named("col", Sql::identifier("name")?)
///     .named("val", "Acme")
///     .to_flush(FieldRef::new("res.partner", "name"))
///     .finish()?;
/// ```
#[derive(Debug, Clone)]
#[must_use]
pub struct SqlBuilder {
    template: Template,
    positional: Vec<Arg>,
    named: Vec<(String, Arg)>,
    to_flush: Option<FieldRef>,
}

impl SqlBuilder {
    pub(crate) fn new(template: Template) -> Self {
        Self {
            template,
            positional: Vec::new(),
            named: Vec::new(),
            to_flush: None,
        }
    }

    /// Add a positional argument.
    pub fn arg(mut self, arg: impl Into<Arg>) -> Self {
        self.positional.push(arg.into());
        self
    }

    /// Add several positional arguments.
    pub fn args<A: Into<Arg>>(mut self, args: impl IntoIterator<Item = A>) -> Self {
        self.positional.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add a named argument.
    pub fn named(mut self, name: impl Into<String>, arg: impl Into<Arg>) -> Self {
        self.named.push((name.into(), arg.into()));
        self
    }

    /// Record a flush hint on the resulting fragment.
    pub fn to_flush(mut self, field: FieldRef) -> Self {
        self.to_flush = Some(field);
        self
    }

    pub fn finish(self) -> SqlResult<Sql> {
        let text = match self.template {
            Template::Sql(sql) => {
                if !self.positional.is_empty() || !self.named.is_empty() || self.to_flush.is_some()
                {
                    return Err(SqlError::construction(
                        "unexpected arguments when code has type Sql",
                    ));
                }
                return Ok(sql);
            }
            Template::Text(text) => text,
        };

        if !self.positional.is_empty() && !self.named.is_empty() {
            return Err(SqlError::construction(
                "takes either positional arguments, or named arguments",
            ));
        }

        if self.named.is_empty() {
            return Sql::compose(&text, self.positional, self.to_flush);
        }

        for (i, (name, _)) in self.named.iter().enumerate() {
            if self.named[..i].iter().any(|(n, _)| n == name) {
                return Err(SqlError::construction(format!(
                    "named argument '{name}' given more than once"
                )));
            }
        }

        let named = self.named;
        let (positional, order) =
            template::named_to_positional(&text, |name| named.iter().position(|(n, _)| n == name))?;
        let args = order.into_iter().map(|i| named[i].1.clone()).collect();
        Sql::compose(&positional, args, self.to_flush)
    }
}
