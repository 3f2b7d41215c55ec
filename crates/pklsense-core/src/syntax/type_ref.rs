//! Type annotations as written in source.
//!
//! A `TypeRef` is the unresolved, syntactic form of a type (`Listing<String>?`,
//! `"a"|"b"`, `(Int) -> String`). Module sources carry annotations as plain
//! strings, so this module also owns the small annotation grammar:
//!
//! ```text
//! type     := postfix ('|' postfix)*
//! postfix  := primary '?'*
//! primary  := '(' [type (',' type)*] ')' ['->' type]
//!           | STRING
//!           | NAME ('.' NAME)* ['<' type (',' type)* '>']
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Syntactic type annotation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TypeRef {
    /// A (possibly qualified) type name with optional type arguments
    Named { name: String, args: Vec<TypeRef> },
    Nullable(Box<TypeRef>),
    Union(Vec<TypeRef>),
    Function {
        params: Vec<TypeRef>,
        ret: Box<TypeRef>,
    },
    StringLiteral(String),
    Unknown,
    Nothing,
    /// The `module` keyword: the type of the enclosing module
    Module,
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        TypeRef::Named {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn generic(name: impl Into<String>, args: Vec<TypeRef>) -> Self {
        TypeRef::Named {
            name: name.into(),
            args,
        }
    }

    pub fn nullable(inner: TypeRef) -> Self {
        TypeRef::Nullable(Box::new(inner))
    }

    pub fn function(params: Vec<TypeRef>, ret: TypeRef) -> Self {
        TypeRef::Function {
            params,
            ret: Box::new(ret),
        }
    }

    /// Parse an annotation, e.g. `Mapping<String, Listing<Int>>?`
    pub fn parse(input: &str) -> Result<Self, CoreError> {
        let mut parser = AnnotationParser::new(input);
        let ty = parser.parse_type()?;
        parser.skip_ws();
        if !parser.at_end() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(ty)
    }

    /// Visit every type name mentioned in this annotation
    pub fn for_each_name<'a>(&'a self, f: &mut dyn FnMut(&'a str)) {
        match self {
            TypeRef::Named { name, args } => {
                f(name);
                for arg in args {
                    arg.for_each_name(f);
                }
            }
            TypeRef::Nullable(inner) => inner.for_each_name(f),
            TypeRef::Union(members) => {
                for member in members {
                    member.for_each_name(f);
                }
            }
            TypeRef::Function { params, ret } => {
                for param in params {
                    param.for_each_name(f);
                }
                ret.for_each_name(f);
            }
            TypeRef::StringLiteral(_) | TypeRef::Unknown | TypeRef::Nothing | TypeRef::Module => {}
        }
    }

    fn fmt_member(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Function { .. } | TypeRef::Union(_) => write!(f, "({})", self),
            _ => write!(f, "{}", self),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Named { name, args } => {
                write!(f, "{}", name)?;
                if !args.is_empty() {
                    write!(f, "<")?;
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", arg)?;
                    }
                    write!(f, ">")?;
                }
                Ok(())
            }
            TypeRef::Nullable(inner) => {
                inner.fmt_member(f)?;
                write!(f, "?")
            }
            TypeRef::Union(members) => {
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, "|")?;
                    }
                    match member {
                        TypeRef::Function { .. } => write!(f, "({})", member)?,
                        _ => write!(f, "{}", member)?,
                    }
                }
                Ok(())
            }
            TypeRef::Function { params, ret } => {
                write!(f, "(")?;
                for (i, param) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", param)?;
                }
                write!(f, ") -> {}", ret)
            }
            TypeRef::StringLiteral(text) => write!(f, "\"{}\"", text),
            TypeRef::Unknown => write!(f, "unknown"),
            TypeRef::Nothing => write!(f, "nothing"),
            TypeRef::Module => write!(f, "module"),
        }
    }
}

impl FromStr for TypeRef {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TypeRef::parse(s)
    }
}

impl TryFrom<String> for TypeRef {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        TypeRef::parse(&value)
    }
}

impl From<TypeRef> for String {
    fn from(value: TypeRef) -> Self {
        value.to_string()
    }
}

struct AnnotationParser<'a> {
    input: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> AnnotationParser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, reason: &str) -> CoreError {
        CoreError::InvalidTypeAnnotation {
            input: self.input.to_string(),
            reason: format!("{} at offset {}", reason, self.pos),
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        self.skip_ws();
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_arrow(&mut self) -> bool {
        self.skip_ws();
        if self.peek() == Some('-') && self.chars.get(self.pos + 1) == Some(&'>') {
            self.pos += 2;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), CoreError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", expected)))
        }
    }

    fn parse_type(&mut self) -> Result<TypeRef, CoreError> {
        let mut members = vec![self.parse_postfix()?];
        while self.eat('|') {
            members.push(self.parse_postfix()?);
        }
        if members.len() == 1 {
            Ok(members.remove(0))
        } else {
            Ok(TypeRef::Union(members))
        }
    }

    fn parse_postfix(&mut self) -> Result<TypeRef, CoreError> {
        let mut ty = self.parse_primary()?;
        while self.eat('?') {
            ty = TypeRef::Nullable(Box::new(ty));
        }
        Ok(ty)
    }

    fn parse_list(&mut self, close: char) -> Result<Vec<TypeRef>, CoreError> {
        let mut items = Vec::new();
        if self.eat(close) {
            return Ok(items);
        }
        loop {
            items.push(self.parse_type()?);
            if self.eat(',') {
                continue;
            }
            self.expect(close)?;
            return Ok(items);
        }
    }

    fn parse_primary(&mut self) -> Result<TypeRef, CoreError> {
        self.skip_ws();
        match self.peek() {
            Some('(') => {
                self.pos += 1;
                let mut items = self.parse_list(')')?;
                if self.eat_arrow() {
                    let ret = self.parse_type()?;
                    return Ok(TypeRef::Function {
                        params: items,
                        ret: Box::new(ret),
                    });
                }
                if items.len() != 1 {
                    return Err(self.error("parenthesized type must contain exactly one type"));
                }
                Ok(items.remove(0))
            }
            Some('"') => {
                self.pos += 1;
                let mut text = String::new();
                loop {
                    match self.peek() {
                        Some('"') => {
                            self.pos += 1;
                            return Ok(TypeRef::StringLiteral(text));
                        }
                        Some('\\') => {
                            self.pos += 1;
                            if let Some(c) = self.peek() {
                                text.push(c);
                                self.pos += 1;
                            }
                        }
                        Some(c) => {
                            text.push(c);
                            self.pos += 1;
                        }
                        None => return Err(self.error("unterminated string literal type")),
                    }
                }
            }
            Some(c) if is_ident_start(c) => {
                let mut name = self.parse_ident();
                while self.peek() == Some('.') {
                    self.pos += 1;
                    if !matches!(self.peek(), Some(c) if is_ident_start(c)) {
                        return Err(self.error("expected identifier after '.'"));
                    }
                    name.push('.');
                    name.push_str(&self.parse_ident());
                }
                let args = if self.eat('<') {
                    self.parse_list('>')?
                } else {
                    Vec::new()
                };
                Ok(match (name.as_str(), args.is_empty()) {
                    ("unknown", true) => TypeRef::Unknown,
                    ("nothing", true) => TypeRef::Nothing,
                    ("module", true) => TypeRef::Module,
                    _ => TypeRef::Named { name, args },
                })
            }
            _ => Err(self.error("expected a type")),
        }
    }

    fn parse_ident(&mut self) -> String {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if is_ident_part(c)) {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_generic_nullable() {
        let ty = TypeRef::parse("Mapping<String, Listing<Int>>?").unwrap();
        assert_eq!(
            ty,
            TypeRef::Nullable(Box::new(TypeRef::generic(
                "Mapping",
                vec![
                    TypeRef::named("String"),
                    TypeRef::generic("Listing", vec![TypeRef::named("Int")]),
                ]
            )))
        );
    }

    #[test]
    fn test_parse_union_of_literals() {
        let ty = TypeRef::parse(r#""a"|"b"|Int"#).unwrap();
        assert_eq!(
            ty,
            TypeRef::Union(vec![
                TypeRef::StringLiteral("a".into()),
                TypeRef::StringLiteral("b".into()),
                TypeRef::named("Int"),
            ])
        );
    }

    #[test]
    fn test_parse_function_and_keywords() {
        let ty = TypeRef::parse("(Int, unknown) -> module").unwrap();
        assert_eq!(
            ty,
            TypeRef::Function {
                params: vec![TypeRef::named("Int"), TypeRef::Unknown],
                ret: Box::new(TypeRef::Module),
            }
        );
        assert_eq!(
            TypeRef::parse("() -> nothing").unwrap(),
            TypeRef::Function {
                params: vec![],
                ret: Box::new(TypeRef::Nothing)
            }
        );
    }

    #[test]
    fn test_qualified_name() {
        let ty = TypeRef::parse("other.Renderer").unwrap();
        assert_eq!(ty, TypeRef::named("other.Renderer"));
    }

    #[test]
    fn test_display_reparses() {
        for input in [
            "Listing<String>",
            "(String|Int)?",
            "((Int) -> String)|Null",
            "Map<String, \"x\"|\"y\">",
        ] {
            let ty = TypeRef::parse(input).unwrap();
            assert_eq!(TypeRef::parse(&ty.to_string()).unwrap(), ty);
        }
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(TypeRef::parse("Listing<").is_err());
        assert!(TypeRef::parse("Int Int").is_err());
        assert!(TypeRef::parse("(A, B)").is_err());
    }
}
