use {
    frontend::ast,
    std::{collections::BTreeMap, fmt, sync::LazyLock},
};

/// A resolved type. Integer kinds keep their source name so that they print
/// back the way they were written.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[must_use]
pub enum Type {
    Int(&'static str),
    Bool,
    String,
    Any,
    Slice(Box<Type>),
    Array(usize, Box<Type>),
    Map(Box<Type>, Box<Type>),
    Chan(Box<Type>),
    Func(Signature),
    // results of calls returning zero or several values
    Tuple(Vec<Type>),
    // types declared outside the loaded source, e.g. `error` or `time.Duration`
    Named {
        package: Option<String>,
        name: String,
    },
    // the untyped `nil`
    Nil,
}

impl Type {
    pub const fn int() -> Self {
        Type::Int("int")
    }

    pub const fn unit() -> Self {
        Type::Tuple(vec![])
    }

    pub fn error() -> Self {
        Type::Named {
            package: None,
            name: "error".to_owned(),
        }
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Type::Int(_))
    }

    /// Whether a `nil` value may stand for this type.
    pub fn is_nilable(&self) -> bool {
        matches!(
            self,
            Type::Slice(_)
                | Type::Map(..)
                | Type::Chan(_)
                | Type::Func(_)
                | Type::Any
                | Type::Named { .. }
                | Type::Nil
        )
    }

    /// Element type produced by indexing.
    pub fn elem(&self) -> Option<&Type> {
        match self {
            Type::Slice(elem) | Type::Array(_, elem) | Type::Chan(elem) => Some(elem),
            Type::Map(_, value) => Some(value),
            _ => None,
        }
    }

    /// Key and value types produced by a `range` loop over this type.
    pub fn range_types(&self) -> Option<(Type, Option<Type>)> {
        match self {
            Type::Slice(elem) | Type::Array(_, elem) => Some((Type::int(), Some((**elem).clone()))),
            Type::String => Some((Type::int(), Some(Type::Int("rune")))),
            Type::Map(key, value) => Some(((**key).clone(), Some((**value).clone()))),
            Type::Chan(elem) => Some(((**elem).clone(), None)),
            Type::Int(_) => Some((self.clone(), None)),
            _ => None,
        }
    }

    /// Flattens a call result into the values it produces.
    pub fn into_values(self) -> Vec<Type> {
        match self {
            Type::Tuple(tys) => tys,
            ty => vec![ty],
        }
    }
}

/// The parameter and result types of a function; names are not part of it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Signature {
    pub params: Vec<Type>,
    pub results: Vec<Type>,
}

impl Signature {
    pub fn result(&self) -> Type {
        match self.results.as_slice() {
            [ty] => ty.clone(),
            tys => Type::Tuple(tys.to_vec()),
        }
    }
}

impl From<&ast::FuncType> for Signature {
    fn from(ty: &ast::FuncType) -> Self {
        Signature {
            params: ty.param_types().map(Type::from).collect(),
            results: ty.result_types().map(Type::from).collect(),
        }
    }
}

/// The type arguments `(Y, R)` of a suspension point: `Y` is the type of the
/// values handed out and `R` the type of the values sent back in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Color {
    pub yield_ty: Type,
    pub resume_ty: Type,
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}, {}]", self.yield_ty, self.resume_ty)
    }
}

pub static PRIMITIVE_TYPES: LazyLock<BTreeMap<&str, Type>> = LazyLock::new(|| {
    BTreeMap::from([
        ("int", Type::Int("int")),
        ("int8", Type::Int("int8")),
        ("int16", Type::Int("int16")),
        ("int32", Type::Int("int32")),
        ("int64", Type::Int("int64")),
        ("uint", Type::Int("uint")),
        ("uint8", Type::Int("uint8")),
        ("uint16", Type::Int("uint16")),
        ("uint32", Type::Int("uint32")),
        ("uint64", Type::Int("uint64")),
        ("uintptr", Type::Int("uintptr")),
        ("byte", Type::Int("byte")),
        ("rune", Type::Int("rune")),
        ("bool", Type::Bool),
        ("string", Type::String),
        ("any", Type::Any),
        ("error", Type::error()),
    ])
});

impl From<&ast::Type> for Type {
    fn from(ty: &ast::Type) -> Self {
        match *ty {
            ast::Type::Named(ref name) => match PRIMITIVE_TYPES.get(name.as_str()) {
                Some(ty) => ty.clone(),
                None => Type::Named {
                    package: None,
                    name: name.clone(),
                },
            },
            ast::Type::Qualified {
                ref package,
                ref name,
            } => Type::Named {
                package: Some(package.clone()),
                name: name.clone(),
            },
            ast::Type::Slice(ref elem) => Type::Slice(Box::new(Type::from(&**elem))),
            ast::Type::Array { len, ref elem } => Type::Array(len, Box::new(Type::from(&**elem))),
            ast::Type::Map { ref key, ref value } => Type::Map(
                Box::new(Type::from(&**key)),
                Box::new(Type::from(&**value)),
            ),
            ast::Type::Chan(ref elem) => Type::Chan(Box::new(Type::from(&**elem))),
            ast::Type::Func(ref func) => Type::Func(Signature::from(func)),
        }
    }
}

fn unnamed(tys: &[Type]) -> Vec<ast::Field> {
    tys.iter()
        .map(|ty| ast::Field {
            names: vec![],
            ty: ast::Type::from(ty),
        })
        .collect()
}

// Tuples never reach a declaration; `nil` has no spelling of its own, so both
// fall back to `any`.
impl From<&Type> for ast::Type {
    fn from(ty: &Type) -> Self {
        match *ty {
            Type::Int(name) => ast::Type::Named(name.to_owned()),
            Type::Bool => ast::Type::Named("bool".to_owned()),
            Type::String => ast::Type::Named("string".to_owned()),
            Type::Any | Type::Tuple(_) | Type::Nil => ast::Type::Named("any".to_owned()),
            Type::Slice(ref elem) => ast::Type::Slice(Box::new(ast::Type::from(&**elem))),
            Type::Array(len, ref elem) => ast::Type::Array {
                len,
                elem: Box::new(ast::Type::from(&**elem)),
            },
            Type::Map(ref key, ref value) => ast::Type::Map {
                key: Box::new(ast::Type::from(&**key)),
                value: Box::new(ast::Type::from(&**value)),
            },
            Type::Chan(ref elem) => ast::Type::Chan(Box::new(ast::Type::from(&**elem))),
            Type::Func(ref sig) => ast::Type::Func(ast::FuncType {
                params: unnamed(&sig.params),
                results: unnamed(&sig.results),
            }),
            Type::Named {
                package: Some(ref package),
                ref name,
            } => ast::Type::Qualified {
                package: package.clone(),
                name: name.clone(),
            },
            Type::Named {
                package: None,
                ref name,
            } => ast::Type::Named(name.clone()),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Type::Tuple(ref tys) => {
                write!(f, "(")?;
                for (i, ty) in tys.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{ty}")?;
                }
                write!(f, ")")
            }
            Type::Nil => write!(f, "untyped nil"),
            _ => write!(f, "{}", ast::Type::from(self)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_source_types() {
        let ty = ast::Type::Map {
            key: Box::new(ast::Type::Named("string".to_owned())),
            value: Box::new(ast::Type::Slice(Box::new(ast::Type::Named(
                "byte".to_owned(),
            )))),
        };
        let resolved = Type::from(&ty);
        assert_eq!(
            resolved,
            Type::Map(
                Box::new(Type::String),
                Box::new(Type::Slice(Box::new(Type::Int("byte"))))
            )
        );
        assert_eq!(ast::Type::from(&resolved), ty);
        assert_eq!(resolved.to_string(), "map[string][]byte");
    }

    #[test]
    fn prints_colors_as_type_arguments() {
        let color = Color {
            yield_ty: Type::int(),
            resume_ty: Type::Any,
        };
        assert_eq!(color.to_string(), "[int, any]");
    }
}
