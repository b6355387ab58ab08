use std::any::TypeId;

use crate::cache::{CodecKey, QueryKey};
use crate::codec::Value;
use crate::driver::protocol::{Cardinality, Headers, IoFormat};

/// A statement with everything that affects how the server compiles it.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub command: String,
    pub cardinality: Cardinality,
    pub format: IoFormat,
    pub headers: Headers,
    pub args: Value,
}

impl Query {
    pub fn new(command: impl Into<String>, cardinality: Cardinality) -> Self {
        Self {
            command: command.into(),
            cardinality,
            format: IoFormat::Binary,
            headers: Headers::new(),
            args: Value::Nothing,
        }
    }

    pub fn args(mut self, args: Value) -> Self {
        self.args = args;
        self
    }

    pub fn format(mut self, format: IoFormat) -> Self {
        self.format = format;
        self
    }

    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Whether an empty result is an error.
    pub fn expects_one(&self) -> bool {
        matches!(self.cardinality, Cardinality::One | Cardinality::AtMostOne)
    }

    pub(crate) fn key(&self) -> QueryKey {
        QueryKey {
            command: self.command.clone(),
            cardinality: self.cardinality,
            format: self.format,
            headers: self.headers.clone(),
        }
    }

    pub(crate) fn codec_key(&self, shape: TypeId) -> CodecKey {
        CodecKey {
            query: self.key(),
            shape,
        }
    }
}

/// Where decoded rows go.
pub enum Destination<'a, T> {
    /// Single result, written in place
    One(&'a mut T),
    /// All results; the vector is cleared first
    Many(&'a mut Vec<T>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_includes_everything_compiled() {
        let a = Query::new("select 1", Cardinality::Many);
        let b = a.clone().format(IoFormat::Json);
        let c = a.clone().args(Value::Int64(1));
        assert_ne!(a.key(), b.key());
        // arguments don't change the compiled statement
        assert_eq!(a.key(), c.key());
        assert_ne!(
            a.codec_key(TypeId::of::<i64>()),
            a.codec_key(TypeId::of::<String>())
        );
    }
}
