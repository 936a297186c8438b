use {
    frontend::ast::{Block, FuncType},
    middle::types::Type,
    std::{
        cell::RefCell,
        collections::{BTreeMap, VecDeque},
        fmt,
        rc::Rc,
    },
    crate::interp::Env,
};

pub type Shared<T> = Rc<RefCell<T>>;

fn shared<T>(value: T) -> Shared<T> {
    Rc::new(RefCell::new(value))
}

#[derive(Debug, Default)]
pub struct Channel {
    pub queue: VecDeque<Value>,
    pub closed: bool,
}

#[derive(Debug, Clone)]
pub enum Func {
    // a function declared in a loaded package
    Named { package: usize, name: String },
    External { path: String, name: String },
    Closure {
        ty: FuncType,
        body: Rc<Block>,
        env: Env,
    },
}

/// A run-time value. Slices, maps and channels are references: copying the
/// value aliases the same storage, exactly like in Go.
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Int(i64),
    Bool(bool),
    Str(String),
    Error(String),
    // `items` is `None` for a nil slice
    Slice {
        elem: Type,
        items: Option<Shared<Vec<Value>>>,
    },
    Array(Vec<Value>),
    Map {
        key: Type,
        value: Type,
        entries: Option<Shared<Vec<(Value, Value)>>>,
    },
    Chan {
        elem: Type,
        chan: Option<Shared<Channel>>,
    },
    Func(Func),
    Tuple(Vec<Value>),
    // the coroutine context of the running call, `_c` in compiled code
    Context,
    // a frame of the coroutine stack, by index, `_f` in compiled code
    Frame(usize),
}

impl Value {
    pub fn unit() -> Self {
        Value::Tuple(vec![])
    }

    pub fn zero(ty: &Type) -> Self {
        match *ty {
            Type::Int(_) => Value::Int(0),
            Type::Bool => Value::Bool(false),
            Type::String => Value::Str(String::new()),
            Type::Slice(ref elem) => Value::Slice {
                elem: (**elem).clone(),
                items: None,
            },
            Type::Array(len, ref elem) => Value::Array(vec![Value::zero(elem); len]),
            Type::Map(ref key, ref value) => Value::Map {
                key: (**key).clone(),
                value: (**value).clone(),
                entries: None,
            },
            Type::Chan(ref elem) => Value::Chan {
                elem: (**elem).clone(),
                chan: None,
            },
            Type::Tuple(ref tys) => Value::Tuple(tys.iter().map(Value::zero).collect()),
            Type::Func(_) | Type::Any | Type::Named { .. } | Type::Nil => Value::Nil,
        }
    }

    pub fn slice(elem: Type, items: Vec<Value>) -> Self {
        Value::Slice {
            elem,
            items: Some(shared(items)),
        }
    }

    pub fn map(key: Type, value: Type, entries: Vec<(Value, Value)>) -> Self {
        Value::Map {
            key,
            value,
            entries: Some(shared(entries)),
        }
    }

    pub fn chan(elem: Type) -> Self {
        Value::Chan {
            elem,
            chan: Some(shared(Channel::default())),
        }
    }

    /// Flattens the results of a call into the values it produces.
    pub fn into_values(self) -> Vec<Value> {
        match self {
            Value::Tuple(values) => values,
            value => vec![value],
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(
            self,
            Value::Nil
                | Value::Slice { items: None, .. }
                | Value::Map { entries: None, .. }
                | Value::Chan { chan: None, .. }
        )
    }

    /// Whether the value may be stored in a variable of type `ty`.
    pub fn has_type(&self, ty: &Type) -> bool {
        match (self, ty) {
            (_, Type::Any | Type::Named { .. }) => true,
            (Value::Nil, ty) => ty.is_nilable(),
            (Value::Int(_), Type::Int(_))
            | (Value::Bool(_), Type::Bool)
            | (Value::Str(_), Type::String)
            | (Value::Func(_), Type::Func(_)) => true,
            (Value::Slice { elem, .. }, Type::Slice(expected))
            | (Value::Chan { elem, .. }, Type::Chan(expected)) => elem == &**expected,
            (Value::Map { key, value, .. }, Type::Map(k, v)) => key == &**k && value == &**v,
            (Value::Array(items), Type::Array(len, elem)) => {
                items.len() == *len && items.iter().all(|item| item.has_type(elem))
            }
            (Value::Tuple(items), Type::Tuple(tys)) => {
                items.len() == tys.len() && items.iter().zip(tys).all(|(item, ty)| item.has_type(ty))
            }
            _ => false,
        }
    }

    /// A short description of the dynamic type, for diagnostics.
    pub fn type_name(&self) -> String {
        match self {
            Value::Nil => "nil".to_owned(),
            Value::Int(_) => "int".to_owned(),
            Value::Bool(_) => "bool".to_owned(),
            Value::Str(_) => "string".to_owned(),
            Value::Error(_) => "error".to_owned(),
            Value::Slice { elem, .. } => Type::Slice(Box::new(elem.clone())).to_string(),
            Value::Array(items) => format!("[{}]array", items.len()),
            Value::Map { key, value, .. } => {
                Type::Map(Box::new(key.clone()), Box::new(value.clone())).to_string()
            }
            Value::Chan { elem, .. } => Type::Chan(Box::new(elem.clone())).to_string(),
            Value::Func(_) => "func".to_owned(),
            Value::Tuple(_) => "tuple".to_owned(),
            Value::Context => "context".to_owned(),
            Value::Frame(_) => "frame".to_owned(),
        }
    }

    /// Go's `==`, for the comparable values.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) | (Value::Error(a), Value::Error(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(a, b)| a.equals(b))
            }
            (Value::Chan { chan: Some(a), .. }, Value::Chan { chan: Some(b), .. }) => {
                Rc::ptr_eq(a, b)
            }
            (a, b) if a.is_nil() || b.is_nil() => a.is_nil() && b.is_nil(),
            _ => false,
        }
    }

    pub fn len(&self) -> Option<usize> {
        match self {
            Value::Str(s) => Some(s.len()),
            Value::Array(items) => Some(items.len()),
            Value::Slice { items, .. } => Some(items.as_ref().map_or(0, |items| items.borrow().len())),
            Value::Map { entries, .. } => {
                Some(entries.as_ref().map_or(0, |entries| entries.borrow().len()))
            }
            Value::Chan { chan, .. } => Some(chan.as_ref().map_or(0, |chan| chan.borrow().queue.len())),
            _ => None,
        }
    }

    /// Elements of a slice or array, copied out.
    pub fn items(&self) -> Option<Vec<Value>> {
        match self {
            Value::Array(items) => Some(items.clone()),
            Value::Slice { items, .. } => {
                Some(items.as_ref().map_or_else(Vec::new, |items| items.borrow().clone()))
            }
            _ => None,
        }
    }

    /// Map entries ordered by key, the way `fmt` prints them.
    pub fn sorted_entries(&self) -> Vec<(Value, Value)> {
        let Value::Map {
            entries: Some(entries),
            ..
        } = self
        else {
            return vec![];
        };
        let mut entries = entries.borrow().clone();
        entries.sort_by(|(a, _), (b, _)| match (a, b) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            _ => a.to_string().cmp(&b.to_string()),
        });
        entries
    }
}

/// Deep copies values, preserving sharing between them: two references to
/// one backing store still share one store in the copy.
#[derive(Default)]
pub struct DeepCopy {
    slices: BTreeMap<usize, Shared<Vec<Value>>>,
    maps: BTreeMap<usize, Shared<Vec<(Value, Value)>>>,
    chans: BTreeMap<usize, Shared<Channel>>,
}

impl DeepCopy {
    pub fn copy(&mut self, value: &Value) -> Value {
        match value {
            Value::Slice {
                elem,
                items: Some(items),
            } => {
                let key = Rc::as_ptr(items) as usize;
                let items = match self.slices.get(&key) {
                    Some(copy) => copy.clone(),
                    None => {
                        let copy = shared(vec![]);
                        self.slices.insert(key, copy.clone());
                        let copied = items.borrow().iter().map(|item| self.copy(item)).collect();
                        *copy.borrow_mut() = copied;
                        copy
                    }
                };
                Value::Slice {
                    elem: elem.clone(),
                    items: Some(items),
                }
            }
            Value::Map {
                key,
                value,
                entries: Some(entries),
            } => {
                let ptr = Rc::as_ptr(entries) as usize;
                let entries = match self.maps.get(&ptr) {
                    Some(copy) => copy.clone(),
                    None => {
                        let copy = shared(vec![]);
                        self.maps.insert(ptr, copy.clone());
                        let copied = entries
                            .borrow()
                            .iter()
                            .map(|(k, v)| (self.copy(k), self.copy(v)))
                            .collect();
                        *copy.borrow_mut() = copied;
                        copy
                    }
                };
                Value::Map {
                    key: key.clone(),
                    value: value.clone(),
                    entries: Some(entries),
                }
            }
            Value::Chan {
                elem,
                chan: Some(chan),
            } => {
                let ptr = Rc::as_ptr(chan) as usize;
                let chan = match self.chans.get(&ptr) {
                    Some(copy) => copy.clone(),
                    None => {
                        let copy = shared(Channel::default());
                        self.chans.insert(ptr, copy.clone());
                        let queue = chan.borrow().queue.iter().map(|v| self.copy(v)).collect();
                        let closed = chan.borrow().closed;
                        *copy.borrow_mut() = Channel { queue, closed };
                        copy
                    }
                };
                Value::Chan {
                    elem: elem.clone(),
                    chan: Some(chan),
                }
            }
            Value::Array(items) => Value::Array(items.iter().map(|item| self.copy(item)).collect()),
            Value::Tuple(items) => Value::Tuple(items.iter().map(|item| self.copy(item)).collect()),
            value => value.clone(),
        }
    }
}

fn write_list<'a>(
    f: &mut fmt::Formatter,
    items: impl IntoIterator<Item = &'a Value>,
) -> fmt::Result {
    write!(f, "[")?;
    for (i, item) in items.into_iter().enumerate() {
        if i > 0 {
            write!(f, " ")?;
        }
        write!(f, "{item}")?;
    }
    write!(f, "]")
}

// formats like `%v`
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "<nil>"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Str(s) | Value::Error(s) => write!(f, "{s}"),
            Value::Slice { items: None, .. } => write!(f, "[]"),
            Value::Slice {
                items: Some(items), ..
            } => write_list(f, items.borrow().iter()),
            Value::Array(items) => write_list(f, items),
            Value::Map { .. } => {
                write!(f, "map[")?;
                for (i, (key, value)) in self.sorted_entries().iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{key}:{value}")?;
                }
                write!(f, "]")
            }
            Value::Chan { chan: None, .. } => write!(f, "<nil>"),
            Value::Chan { .. } => write!(f, "chan"),
            Value::Func(_) => write!(f, "func"),
            Value::Tuple(items) => write_list(f, items),
            Value::Context => write!(f, "context"),
            Value::Frame(index) => write!(f, "frame#{index}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_values_are_typed() {
        let ty = Type::Slice(Box::new(Type::int()));
        let zero = Value::zero(&ty);
        assert!(zero.is_nil());
        assert!(zero.has_type(&ty));
        assert!(!zero.has_type(&Type::Slice(Box::new(Type::String))));
        assert_eq!(Value::zero(&Type::Array(2, Box::new(Type::Bool))).to_string(), "[false false]");
    }

    #[test]
    fn deep_copy_preserves_aliasing() {
        let shared = Value::slice(Type::int(), vec![Value::Int(1)]);
        let pair = Value::Tuple(vec![shared.clone(), shared]);
        let Value::Tuple(copies) = DeepCopy::default().copy(&pair) else {
            panic!("expected a tuple");
        };
        let (
            Value::Slice { items: Some(a), .. },
            Value::Slice { items: Some(b), .. },
        ) = (&copies[0], &copies[1])
        else {
            panic!("expected slices");
        };
        assert!(Rc::ptr_eq(a, b));
        let Value::Tuple(ref originals) = pair else {
            unreachable!()
        };
        let Value::Slice {
            items: Some(ref original),
            ..
        } = originals[0]
        else {
            unreachable!()
        };
        assert!(!Rc::ptr_eq(a, original));
    }

    #[test]
    fn prints_maps_sorted_by_key() {
        let map = Value::map(
            Type::String,
            Type::int(),
            vec![
                (Value::Str("b".to_owned()), Value::Int(2)),
                (Value::Str("a".to_owned()), Value::Int(1)),
            ],
        );
        assert_eq!(map.to_string(), "map[a:1 b:2]");
    }
}
