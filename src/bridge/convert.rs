//! Marshaling between stack values and host types
//!
//! Routines are written against plain Rust types; these traits convert at
//! the dispatch boundary. A routine's argument list is a tuple implementing
//! [`FromArgs`], its result anything implementing [`IntoDispatch`].

use super::dispatch::DispatchResult;
use super::error::ConversionError;
use crate::interpreter::{Value, ValueKind};

/// Host type built from a stack value
///
/// `None` is the void result of a nested invocation (an empty stack on
/// teardown); only `Option<T>` and `Value` accept it.
pub trait FromValue: Sized {
    /// Shape name for descriptors and error messages
    fn shape() -> String;

    fn from_value(value: Option<Value>) -> Result<Self, ConversionError>;
}

/// Host type that can be pushed on a frame's stack
pub trait IntoValue {
    fn into_value(self) -> Value;
}

fn require(value: Option<Value>, expected: &str) -> Result<Value, ConversionError> {
    value.ok_or_else(|| ConversionError::Void {
        expected: expected.to_string(),
    })
}

fn mismatch(expected: &str, found: &Value) -> ConversionError {
    ConversionError::Mismatch {
        expected: expected.to_string(),
        found: found.kind(),
    }
}

impl FromValue for i64 {
    fn shape() -> String {
        ValueKind::Int.to_string()
    }

    fn from_value(value: Option<Value>) -> Result<Self, ConversionError> {
        match require(value, "int")? {
            Value::Int(n) => Ok(n),
            other => Err(mismatch("int", &other)),
        }
    }
}

impl FromValue for bool {
    fn shape() -> String {
        ValueKind::Bool.to_string()
    }

    fn from_value(value: Option<Value>) -> Result<Self, ConversionError> {
        match require(value, "bool")? {
            Value::Bool(b) => Ok(b),
            other => Err(mismatch("bool", &other)),
        }
    }
}

impl FromValue for String {
    fn shape() -> String {
        ValueKind::Str.to_string()
    }

    /// Accepts `str`, and `bytes` holding valid UTF-8
    fn from_value(value: Option<Value>) -> Result<Self, ConversionError> {
        match require(value, "str")? {
            Value::Str(s) => Ok(s),
            Value::Bytes(b) => String::from_utf8(b).map_err(|_| ConversionError::InvalidUtf8),
            other => Err(mismatch("str", &other)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn shape() -> String {
        ValueKind::Bytes.to_string()
    }

    fn from_value(value: Option<Value>) -> Result<Self, ConversionError> {
        match require(value, "bytes")? {
            Value::Bytes(b) => Ok(b),
            Value::Str(s) => Ok(s.into_bytes()),
            other => Err(mismatch("bytes", &other)),
        }
    }
}

/// Any value; void reads as `null`
impl FromValue for Value {
    fn shape() -> String {
        "any".to_string()
    }

    fn from_value(value: Option<Value>) -> Result<Self, ConversionError> {
        Ok(value.unwrap_or(Value::Null))
    }
}

/// Void or `null` become `None`
impl<T: FromValue> FromValue for Option<T> {
    fn shape() -> String {
        format!("{}?", T::shape())
    }

    fn from_value(value: Option<Value>) -> Result<Self, ConversionError> {
        match value {
            None | Some(Value::Null) => Ok(None),
            some => T::from_value(some).map(Some),
        }
    }
}

impl IntoValue for Value {
    fn into_value(self) -> Value {
        self
    }
}

impl IntoValue for i64 {
    fn into_value(self) -> Value {
        Value::Int(self)
    }
}

impl IntoValue for bool {
    fn into_value(self) -> Value {
        Value::Bool(self)
    }
}

impl IntoValue for String {
    fn into_value(self) -> Value {
        Value::Str(self)
    }
}

impl IntoValue for &str {
    fn into_value(self) -> Value {
        Value::Str(self.to_string())
    }
}

impl IntoValue for Vec<u8> {
    fn into_value(self) -> Value {
        Value::Bytes(self)
    }
}

/* ===================== Argument Lists ===================== */

/// Argument tuple of a routine
///
/// Arguments are passed in declaration order: the last one is on top of
/// the calling frame's stack.
pub trait FromArgs: Sized {
    fn arity() -> usize;

    fn shapes() -> Vec<String>;

    /// Convert popped arguments; `Err` carries the failing argument's index
    fn from_args(args: Vec<Value>) -> Result<Self, (usize, ConversionError)>;
}

macro_rules! impl_from_args {
    ($len:expr; $($ty:ident),*) => {
        impl<$($ty: FromValue),*> FromArgs for ($($ty,)*) {
            fn arity() -> usize {
                $len
            }

            fn shapes() -> Vec<String> {
                vec![$($ty::shape()),*]
            }

            #[allow(unused_variables, unused_mut)]
            fn from_args(args: Vec<Value>) -> Result<Self, (usize, ConversionError)> {
                if args.len() != $len {
                    return Err((
                        0,
                        ConversionError::Arity {
                            expected: $len,
                            found: args.len(),
                        },
                    ));
                }
                let mut args = args.into_iter().enumerate();
                Ok(($(
                    {
                        let (index, value) = args.next().ok_or((
                            0,
                            ConversionError::Arity { expected: $len, found: 0 },
                        ))?;
                        $ty::from_value(Some(value)).map_err(|e| (index, e))?
                    },
                )*))
            }
        }
    };
}

impl_from_args!(0;);
impl_from_args!(1; A);
impl_from_args!(2; A, B);
impl_from_args!(3; A, B, C);
impl_from_args!(4; A, B, C, D);

/* ===================== Results ===================== */

/// What a routine's successful return becomes
pub trait IntoDispatch {
    fn into_dispatch(self) -> DispatchResult;
}

impl IntoDispatch for () {
    fn into_dispatch(self) -> DispatchResult {
        DispatchResult::Void
    }
}

/// `None` is void
impl<T: IntoValue> IntoDispatch for Option<T> {
    fn into_dispatch(self) -> DispatchResult {
        match self {
            Some(v) => DispatchResult::Value(v.into_value()),
            None => DispatchResult::Void,
        }
    }
}

macro_rules! impl_into_dispatch {
    ($($ty:ty),*) => {
        $(
            impl IntoDispatch for $ty {
                fn into_dispatch(self) -> DispatchResult {
                    DispatchResult::Value(self.into_value())
                }
            }
        )*
    };
}

impl_into_dispatch!(Value, i64, bool, String, Vec<u8>);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_conversions() {
        assert_eq!(i64::from_value(Some(Value::Int(3))), Ok(3));
        assert_eq!(bool::from_value(Some(Value::Bool(true))), Ok(true));
        assert_eq!(
            String::from_value(Some(Value::Bytes(b"hi".to_vec()))),
            Ok("hi".to_string())
        );
        assert_eq!(
            String::from_value(Some(Value::Bytes(vec![0xff]))),
            Err(ConversionError::InvalidUtf8)
        );
    }

    #[test]
    fn test_mismatch_and_void() {
        assert_eq!(
            i64::from_value(Some(Value::Str("x".to_string()))),
            Err(ConversionError::Mismatch {
                expected: "int".to_string(),
                found: ValueKind::Str,
            })
        );
        assert_eq!(
            i64::from_value(None),
            Err(ConversionError::Void {
                expected: "int".to_string()
            })
        );
    }

    #[test]
    fn test_optional_and_any() {
        assert_eq!(Option::<i64>::from_value(None), Ok(None));
        assert_eq!(Option::<i64>::from_value(Some(Value::Null)), Ok(None));
        assert_eq!(Option::<i64>::from_value(Some(Value::Int(1))), Ok(Some(1)));
        assert_eq!(Value::from_value(None), Ok(Value::Null));
        assert_eq!(Option::<String>::shape(), "str?");
    }

    #[test]
    fn test_argument_tuples() {
        type Args = (i64, String);
        assert_eq!(Args::arity(), 2);
        assert_eq!(Args::shapes(), vec!["int".to_string(), "str".to_string()]);

        let args = Args::from_args(vec![Value::Int(1), Value::Str("a".to_string())]);
        assert_eq!(args, Ok((1, "a".to_string())));

        let err = Args::from_args(vec![Value::Int(1), Value::Int(2)]).unwrap_err();
        assert_eq!(err.0, 1);

        let err = Args::from_args(vec![Value::Int(1)]).unwrap_err();
        assert!(matches!(err.1, ConversionError::Arity { expected: 2, found: 1 }));

        assert_eq!(<()>::from_args(Vec::new()), Ok(()));
    }

    #[test]
    fn test_into_dispatch() {
        assert_eq!(().into_dispatch(), DispatchResult::Void);
        assert_eq!(32i64.into_dispatch(), DispatchResult::Value(Value::Int(32)));
        assert_eq!(None::<i64>.into_dispatch(), DispatchResult::Void);
        assert_eq!(
            Some("x".to_string()).into_dispatch(),
            DispatchResult::Value(Value::Str("x".to_string()))
        );
    }
}
