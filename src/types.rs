//! Type descriptors and the type-string grammar.
//!
//! A [`DataType`] describes the shape (possibly ragged) and element type of a
//! typed memory block, independent of its storage. Descriptors are obtained
//! by parsing a type string or built programmatically; both forms round-trip
//! through [`Display`](core::fmt::Display).
//!
//! # Grammar
//!
//! ```text
//! type   := '?' type
//!         | INT '*' type          fixed dimension:    "2 * 3 * int64"
//!         | 'var' '*' type        ragged dimension:   "var * var * int64"
//!         | IDENT '*' type        symbolic dimension: "N * float64" (abstract)
//!         | dtype
//! dtype  := scalar | 'Any' | record | categorical
//! record := '{' IDENT ':' type (',' IDENT ':' type)* '}'
//! categorical := 'categorical' '(' level (',' level)* ')'
//! level  := '<label>' | NA
//! scalar := bool | int8..int64 | uint8..uint64 | float32 | float64 | string
//! ```
//!
//! Abstract types (containing a symbolic dimension or the `Any` dtype) are
//! templates: they must be instantiated against a concrete type before they
//! can describe memory.

use crate::error::{Error, Result};

/// Fixed-width or string element kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    /// 1-byte boolean, 0 or 1.
    Bool,
    /// Signed 8-bit integer.
    Int8,
    /// Signed 16-bit integer.
    Int16,
    /// Signed 32-bit integer.
    Int32,
    /// Signed 64-bit integer.
    Int64,
    /// Unsigned 8-bit integer.
    UInt8,
    /// Unsigned 16-bit integer.
    UInt16,
    /// Unsigned 32-bit integer.
    UInt32,
    /// Unsigned 64-bit integer.
    UInt64,
    /// IEEE-754 single precision.
    Float32,
    /// IEEE-754 double precision.
    Float64,
    /// UTF-8 string, variable size.
    String,
}

impl ScalarKind {
    /// The grammar name of the kind.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::UInt8 => "uint8",
            Self::UInt16 => "uint16",
            Self::UInt32 => "uint32",
            Self::UInt64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::String => "string",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "bool" => Self::Bool,
            "int8" => Self::Int8,
            "int16" => Self::Int16,
            "int32" => Self::Int32,
            "int64" => Self::Int64,
            "uint8" => Self::UInt8,
            "uint16" => Self::UInt16,
            "uint32" => Self::UInt32,
            "uint64" => Self::UInt64,
            "float32" => Self::Float32,
            "float64" => Self::Float64,
            "string" => Self::String,
            _ => return None,
        })
    }

    /// Packed size in bytes, or `None` for variable-size kinds.
    pub const fn size(self) -> Option<usize> {
        match self {
            Self::Bool | Self::Int8 | Self::UInt8 => Some(1),
            Self::Int16 | Self::UInt16 => Some(2),
            Self::Int32 | Self::UInt32 | Self::Float32 => Some(4),
            Self::Int64 | Self::UInt64 | Self::Float64 => Some(8),
            Self::String => None,
        }
    }

    /// True for the signed integer kinds.
    pub const fn is_signed_int(self) -> bool {
        matches!(self, Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64)
    }

    /// True for the unsigned integer kinds.
    pub const fn is_unsigned_int(self) -> bool {
        matches!(self, Self::UInt8 | Self::UInt16 | Self::UInt32 | Self::UInt64)
    }

    /// True for any integer kind.
    pub const fn is_int(self) -> bool {
        self.is_signed_int() || self.is_unsigned_int()
    }

    /// True for the floating-point kinds.
    pub const fn is_float(self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }

    /// True for integer and floating-point kinds.
    pub const fn is_numeric(self) -> bool {
        self.is_int() || self.is_float()
    }
}

/// An immutable description of a value's shape and element type.
#[derive(Debug, Clone, PartialEq)]
pub enum DataType {
    /// A dimension of known length.
    FixedDim {
        /// Number of elements along this dimension.
        size: usize,
        /// Element type.
        elem: Box<DataType>,
    },
    /// A ragged dimension whose per-entry lengths are carried by the data.
    VarDim {
        /// Element type.
        elem: Box<DataType>,
    },
    /// A named placeholder dimension; makes the type abstract.
    SymbolicDim {
        /// Placeholder name (e.g. `N`).
        name: String,
        /// Element type.
        elem: Box<DataType>,
    },
    /// Named fields, stored in declaration order.
    Record(Vec<(String, DataType)>),
    /// A fixed enumeration of labels stored as compact indices; a `None`
    /// level is the missing-value marker (`NA`).
    Categorical(Vec<Option<String>>),
    /// A possibly-missing element (1-byte presence tag plus payload).
    Optional(Box<DataType>),
    /// A scalar element.
    Scalar(ScalarKind),
    /// The abstract element-type placeholder.
    Any,
}

impl DataType {
    /// Parses a type string.
    ///
    /// # Example
    /// ```
    /// use ragbox::types::DataType;
    /// let t = DataType::parse("2 * 3 * int64").unwrap();
    /// assert_eq!(t.to_string(), "2 * 3 * int64");
    /// ```
    pub fn parse(input: &str) -> Result<Self> {
        let toks = tokenize(input)?;
        let mut p = Parser {
            input,
            toks,
            pos: 0,
        };
        let ty = p.parse_type()?;
        if p.pos != p.toks.len() {
            return Err(p.error("trailing input after type"));
        }
        Ok(ty)
    }

    /// True if the type contains a symbolic dimension or the `Any` dtype.
    pub fn is_abstract(&self) -> bool {
        match self {
            Self::Any | Self::SymbolicDim { .. } => true,
            Self::FixedDim { elem, .. } | Self::VarDim { elem } | Self::Optional(elem) => {
                elem.is_abstract()
            }
            Self::Record(fields) => fields.iter().any(|(_, t)| t.is_abstract()),
            Self::Categorical(_) | Self::Scalar(_) => false,
        }
    }

    /// The innermost element type, after stripping all dimensions.
    pub fn dtype(&self) -> &DataType {
        match self {
            Self::FixedDim { elem, .. }
            | Self::VarDim { elem }
            | Self::SymbolicDim { elem, .. } => elem.dtype(),
            other => other,
        }
    }

    /// The hidden element type of an abstract template, used to constrain
    /// inference before instantiation. `Any` means unconstrained.
    pub fn hidden_dtype(&self) -> DataType {
        self.dtype().clone()
    }

    /// The fixed shape of the leading dimensions.
    ///
    /// Fails for ragged and abstract dimensions, which have no fixed shape.
    pub fn shape(&self) -> Result<Vec<usize>> {
        let mut dims = Vec::new();
        let mut t = self;
        loop {
            match t {
                Self::FixedDim { size, elem } => {
                    dims.push(*size);
                    t = elem;
                }
                Self::VarDim { .. } => {
                    return Err(Error::TypeMismatch {
                        context: self.to_string(),
                        reason: "variable dimensions have no fixed shape".to_string(),
                    });
                }
                Self::SymbolicDim { .. } => {
                    return Err(Error::TypeMismatch {
                        context: self.to_string(),
                        reason: "abstract dimensions have no fixed shape".to_string(),
                    });
                }
                _ => return Ok(dims),
            }
        }
    }

    /// Row-major byte strides matching [`shape`](Self::shape).
    ///
    /// Fails when the shape is not fixed or the element type has no fixed
    /// size.
    pub fn strides(&self) -> Result<Vec<usize>> {
        let shape = self.shape()?;
        let item = self.dtype().datasize().map_err(|_| Error::TypeMismatch {
            context: self.to_string(),
            reason: "element type has no fixed size, so no strides".to_string(),
        })?;
        let mut strides = vec![0usize; shape.len()];
        let mut acc = item;
        for (i, dim) in shape.iter().enumerate().rev() {
            strides[i] = acc;
            acc *= (*dim).max(1);
        }
        Ok(strides)
    }

    /// Packed byte size of a value of this type.
    ///
    /// Fails for types whose size depends on the data (ragged dimensions,
    /// strings) and for abstract types.
    pub fn datasize(&self) -> Result<usize> {
        let fail = |reason: &str| Error::TypeMismatch {
            context: self.to_string(),
            reason: reason.to_string(),
        };
        match self {
            Self::FixedDim { size, elem } => Ok(size * elem.datasize()?),
            Self::VarDim { .. } => Err(fail("variable dimensions have no static size")),
            Self::SymbolicDim { .. } | Self::Any => Err(fail("abstract types have no size")),
            Self::Record(fields) => {
                let mut total = 0;
                for (_, t) in fields {
                    total += t.datasize()?;
                }
                Ok(total)
            }
            Self::Categorical(_) => Ok(1),
            Self::Optional(elem) => Ok(1 + elem.datasize()?),
            Self::Scalar(kind) => kind.size().ok_or_else(|| {
                fail("variable-size element types have no static size")
            }),
        }
    }

    /// The scalar kind of the innermost element, if it is a plain scalar.
    pub fn scalar_kind(&self) -> Option<ScalarKind> {
        match self.dtype() {
            Self::Scalar(kind) => Some(*kind),
            _ => None,
        }
    }
}

/// Replaces the innermost scalar element of `ty` with `dtype`.
///
/// Used by the contiguous-copy cast: the shape is preserved and only the
/// element type changes.
pub fn replace_dtype(ty: &DataType, dtype: &DataType) -> Result<DataType> {
    match ty {
        DataType::FixedDim { size, elem } => Ok(DataType::FixedDim {
            size: *size,
            elem: Box::new(replace_dtype(elem, dtype)?),
        }),
        DataType::VarDim { elem } => Ok(DataType::VarDim {
            elem: Box::new(replace_dtype(elem, dtype)?),
        }),
        DataType::Scalar(_) => Ok(dtype.clone()),
        other => Err(Error::TypeMismatch {
            context: other.to_string(),
            reason: "only scalar element types can be cast".to_string(),
        }),
    }
}

/// Instantiates an abstract template against a concrete type.
///
/// Symbolic dimensions take the concrete type's dimension at the same depth,
/// and `Any` is replaced by the concrete remainder. Concrete parts of the
/// template must agree with `concrete`.
pub fn instantiate(template: &DataType, concrete: &DataType) -> Result<DataType> {
    let mismatch = |reason: String| Error::TypeMismatch {
        context: template.to_string(),
        reason,
    };
    match (template, concrete) {
        (DataType::Any, c) => Ok(c.clone()),
        (DataType::SymbolicDim { elem, .. }, DataType::FixedDim { size, elem: ce }) => {
            Ok(DataType::FixedDim {
                size: *size,
                elem: Box::new(instantiate(elem, ce)?),
            })
        }
        (DataType::SymbolicDim { elem, .. }, DataType::VarDim { elem: ce }) => {
            Ok(DataType::VarDim {
                elem: Box::new(instantiate(elem, ce)?),
            })
        }
        (DataType::SymbolicDim { name, .. }, c) => Err(mismatch(format!(
            "symbolic dimension '{name}' has no counterpart in '{c}'"
        ))),
        (DataType::VarDim { elem }, DataType::VarDim { elem: ce }) => Ok(DataType::VarDim {
            elem: Box::new(instantiate(elem, ce)?),
        }),
        (DataType::VarDim { elem }, DataType::FixedDim { elem: ce, .. }) => {
            // A ragged template accepts uniform data.
            Ok(DataType::VarDim {
                elem: Box::new(instantiate(elem, ce)?),
            })
        }
        (DataType::FixedDim { size, elem }, DataType::FixedDim { size: cs, elem: ce }) => {
            if size != cs {
                return Err(mismatch(format!(
                    "fixed dimension {size} does not match inferred dimension {cs}"
                )));
            }
            Ok(DataType::FixedDim {
                size: *size,
                elem: Box::new(instantiate(elem, ce)?),
            })
        }
        (DataType::Optional(elem), DataType::Optional(ce)) => {
            Ok(DataType::Optional(Box::new(instantiate(elem, ce)?)))
        }
        (t, c) => {
            if t.is_abstract() {
                Err(mismatch(format!("cannot instantiate against '{c}'")))
            } else if t == c {
                Ok(t.clone())
            } else {
                Err(mismatch(format!("template does not match inferred type '{c}'")))
            }
        }
    }
}

impl core::fmt::Display for DataType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::FixedDim { size, elem } => write!(f, "{size} * {elem}"),
            Self::VarDim { elem } => write!(f, "var * {elem}"),
            Self::SymbolicDim { name, elem } => write!(f, "{name} * {elem}"),
            Self::Record(fields) => {
                write!(f, "{{")?;
                for (i, (name, ty)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name} : {ty}")?;
                }
                write!(f, "}}")
            }
            Self::Categorical(levels) => {
                write!(f, "categorical(")?;
                for (i, level) in levels.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match level {
                        Some(label) => write!(f, "'{label}'")?,
                        None => write!(f, "NA")?,
                    }
                }
                write!(f, ")")
            }
            Self::Optional(elem) => write!(f, "?{elem}"),
            Self::Scalar(kind) => write!(f, "{}", kind.name()),
            Self::Any => write!(f, "Any"),
        }
    }
}

// --- tokenizer / parser ---

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Int(usize),
    Ident(String),
    Quoted(String),
    Star,
    Question,
    LBrace,
    RBrace,
    LParen,
    RParen,
    Colon,
    Comma,
}

fn tokenize(input: &str) -> Result<Vec<(usize, Tok)>> {
    let s = input.as_bytes();
    let mut toks = Vec::new();
    let mut i = 0;
    while i < s.len() {
        let start = i;
        let c = s[i];
        i += 1;
        let tok = match c {
            b' ' | b'\t' | b'\n' | b'\r' => continue,
            b'*' => Tok::Star,
            b'?' => Tok::Question,
            b'{' => Tok::LBrace,
            b'}' => Tok::RBrace,
            b'(' => Tok::LParen,
            b')' => Tok::RParen,
            b':' => Tok::Colon,
            b',' => Tok::Comma,
            b'\'' => {
                let lit_start = i;
                while i < s.len() && s[i] != b'\'' {
                    i += 1;
                }
                if i >= s.len() {
                    return Err(Error::TypeParse {
                        input: input.to_string(),
                        offset: start,
                        reason: "unterminated label literal",
                    });
                }
                let lit = core::str::from_utf8(&s[lit_start..i])
                    .map_err(|_| Error::TypeParse {
                        input: input.to_string(),
                        offset: lit_start,
                        reason: "label literal is not valid UTF-8",
                    })?
                    .to_string();
                i += 1; // closing quote
                Tok::Quoted(lit)
            }
            b'0'..=b'9' => {
                while i < s.len() && s[i].is_ascii_digit() {
                    i += 1;
                }
                let digits = core::str::from_utf8(&s[start..i]).unwrap();
                let n = digits.parse::<usize>().map_err(|_| Error::TypeParse {
                    input: input.to_string(),
                    offset: start,
                    reason: "dimension size out of range",
                })?;
                Tok::Int(n)
            }
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                while i < s.len() && (s[i].is_ascii_alphanumeric() || s[i] == b'_') {
                    i += 1;
                }
                Tok::Ident(core::str::from_utf8(&s[start..i]).unwrap().to_string())
            }
            _ => {
                return Err(Error::TypeParse {
                    input: input.to_string(),
                    offset: start,
                    reason: "unexpected character",
                });
            }
        };
        toks.push((start, tok));
    }
    Ok(toks)
}

struct Parser<'a> {
    input: &'a str,
    toks: Vec<(usize, Tok)>,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self, ahead: usize) -> Option<&Tok> {
        self.toks.get(self.pos + ahead).map(|(_, t)| t)
    }

    fn next(&mut self) -> Option<Tok> {
        let t = self.toks.get(self.pos).map(|(_, t)| t.clone());
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn error(&self, reason: &'static str) -> Error {
        let offset = self
            .toks
            .get(self.pos.min(self.toks.len().saturating_sub(1)))
            .map_or(self.input.len(), |(o, _)| *o);
        Error::TypeParse {
            input: self.input.to_string(),
            offset,
            reason,
        }
    }

    fn expect(&mut self, tok: &Tok, reason: &'static str) -> Result<()> {
        match self.next() {
            Some(t) if t == *tok => Ok(()),
            _ => Err(self.error(reason)),
        }
    }

    fn parse_type(&mut self) -> Result<DataType> {
        let head = self.peek(0).cloned();
        let starred = matches!(self.peek(1), Some(Tok::Star));
        match head {
            Some(Tok::Question) => {
                self.next();
                Ok(DataType::Optional(Box::new(self.parse_type()?)))
            }
            Some(Tok::Int(size)) if starred => {
                self.next();
                self.next();
                Ok(DataType::FixedDim {
                    size,
                    elem: Box::new(self.parse_type()?),
                })
            }
            Some(Tok::Ident(name)) if starred && name == "var" => {
                self.next();
                self.next();
                Ok(DataType::VarDim {
                    elem: Box::new(self.parse_type()?),
                })
            }
            Some(Tok::Ident(name)) if starred => {
                if !name.starts_with(|c: char| c.is_ascii_uppercase()) {
                    return Err(self.error("dimension must be an integer, 'var', or symbolic"));
                }
                self.next();
                self.next();
                Ok(DataType::SymbolicDim {
                    name,
                    elem: Box::new(self.parse_type()?),
                })
            }
            _ => self.parse_dtype(),
        }
    }

    fn parse_dtype(&mut self) -> Result<DataType> {
        match self.next() {
            Some(Tok::LBrace) => self.parse_record(),
            Some(Tok::Ident(name)) if name == "categorical" => self.parse_categorical(),
            Some(Tok::Ident(name)) if name == "Any" => Ok(DataType::Any),
            Some(Tok::Ident(name)) => match ScalarKind::from_name(&name) {
                Some(kind) => Ok(DataType::Scalar(kind)),
                None => {
                    self.pos -= 1;
                    Err(self.error("unknown element type name"))
                }
            },
            _ => Err(self.error("expected an element type")),
        }
    }

    fn parse_record(&mut self) -> Result<DataType> {
        let mut fields = Vec::new();
        loop {
            let name = match self.next() {
                Some(Tok::Ident(name)) => name,
                _ => return Err(self.error("expected a field name")),
            };
            self.expect(&Tok::Colon, "expected ':' after field name")?;
            let ty = self.parse_type()?;
            fields.push((name, ty));
            match self.next() {
                Some(Tok::Comma) => continue,
                Some(Tok::RBrace) => break,
                _ => return Err(self.error("expected ',' or '}' in record type")),
            }
        }
        Ok(DataType::Record(fields))
    }

    fn parse_categorical(&mut self) -> Result<DataType> {
        self.expect(&Tok::LParen, "expected '(' after 'categorical'")?;
        let mut levels = Vec::new();
        loop {
            match self.next() {
                Some(Tok::Quoted(label)) => levels.push(Some(label)),
                Some(Tok::Ident(name)) if name == "NA" => levels.push(None),
                _ => return Err(self.error("expected a quoted label or NA")),
            }
            match self.next() {
                Some(Tok::Comma) => continue,
                Some(Tok::RParen) => break,
                _ => return Err(self.error("expected ',' or ')' in categorical levels")),
            }
        }
        if levels.len() > usize::from(u8::MAX) {
            return Err(self.error("categorical types support at most 255 levels"));
        }
        Ok(DataType::Categorical(levels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips() {
        for s in [
            "2 * 3 * int64",
            "var * var * int64",
            "{a : string, b : 3 * int64}",
            "4 * categorical('a', 'b', NA)",
            "?int64",
            "3 * uint8",
            "N * float64",
            "var * var * Any",
        ] {
            assert_eq!(DataType::parse(s).unwrap().to_string(), s);
        }
    }

    #[test]
    fn abstractness() {
        assert!(DataType::parse("N * float64").unwrap().is_abstract());
        assert!(DataType::parse("var * Any").unwrap().is_abstract());
        assert!(!DataType::parse("2 * float64").unwrap().is_abstract());
    }

    #[test]
    fn shape_and_strides() {
        let t = DataType::parse("2 * 3 * int64").unwrap();
        assert_eq!(t.shape().unwrap(), vec![2, 3]);
        assert_eq!(t.strides().unwrap(), vec![24, 8]);
        assert_eq!(t.datasize().unwrap(), 48);
        assert!(DataType::parse("var * int64").unwrap().shape().is_err());
    }

    #[test]
    fn instantiate_symbolic_dims() {
        let template = DataType::parse("N * M * Any").unwrap();
        let concrete = DataType::parse("2 * 3 * int64").unwrap();
        let t = instantiate(&template, &concrete).unwrap();
        assert_eq!(t.to_string(), "2 * 3 * int64");
    }

    #[test]
    fn bad_inputs_fail() {
        assert!(DataType::parse("2 ** int64").is_err());
        assert!(DataType::parse("flub").is_err());
        assert!(DataType::parse("2 * int64 trailing").is_err());
        assert!(DataType::parse("categorical('a'").is_err());
    }
}
