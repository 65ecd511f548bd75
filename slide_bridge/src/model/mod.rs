//! The published data model: objects holding variables and methods that
//! remote clients read and call.

use std::fmt;

use crate::bridge::MethodBinding;

pub mod server;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NamespaceIndex(pub u16);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectHandle(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VariableHandle(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodHandle(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Double,
    Boolean,
    String,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Double => "Double",
            DataType::Boolean => "Boolean",
            DataType::String => "String",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Variant {
    Double(f64),
    Boolean(bool),
    String(String),
}

impl Variant {
    pub fn data_type(&self) -> DataType {
        match self {
            Variant::Double(_) => DataType::Double,
            Variant::Boolean(_) => DataType::Boolean,
            Variant::String(_) => DataType::String,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Variant::Double(value) => Some(*value),
            _ => None,
        }
    }

    /// Parses client text as a value of `data_type`. Doubles must be finite.
    pub fn parse(data_type: DataType, text: &str) -> Option<Variant> {
        let text = text.trim();
        match data_type {
            DataType::Double => text
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .map(Variant::Double),
            DataType::Boolean => match text.to_ascii_lowercase().as_str() {
                "true" | "1" => Some(Variant::Boolean(true)),
                "false" | "0" => Some(Variant::Boolean(false)),
                _ => None,
            },
            DataType::String => Some(Variant::String(text.to_string())),
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Double(value) => write!(f, "{}", value),
            Variant::Boolean(value) => write!(f, "{}", value),
            Variant::String(value) => f.write_str(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub name: &'static str,
    pub data_type: DataType,
    pub description: &'static str,
    /// Used when the caller leaves the argument out.
    pub default: Option<Variant>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDecl {
    pub name: &'static str,
    pub inputs: Vec<Argument>,
    pub outputs: Vec<Argument>,
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Unknown namespace {0}")]
    UnknownNamespace(u16),

    #[error("Unknown object '{0}'")]
    UnknownObject(String),

    #[error("Unknown variable '{0}'")]
    UnknownVariable(String),

    #[error("Unknown method '{0}'")]
    UnknownMethod(String),

    #[error("'{name}' already exists")]
    DuplicateName { name: String },

    #[error("Variable '{variable}' holds {expected}, got {found}")]
    TypeMismatch {
        variable: String,
        expected: DataType,
        found: DataType,
    },

    #[error("Bad arguments: {0}")]
    BadArguments(String),
}

/// The registration and publishing surface a bridge node needs from the
/// protocol server.
pub trait AddressSpace: Send {
    fn register_namespace(&mut self, name: &str) -> NamespaceIndex;

    fn add_object(&mut self, ns: NamespaceIndex, name: &str) -> Result<ObjectHandle, ModelError>;

    /// The variable's data type is taken from `initial`.
    fn add_variable(
        &mut self,
        object: ObjectHandle,
        name: &str,
        initial: Variant,
    ) -> Result<VariableHandle, ModelError>;

    fn add_method(
        &mut self,
        object: ObjectHandle,
        decl: MethodDecl,
        binding: MethodBinding,
    ) -> Result<MethodHandle, ModelError>;

    fn publish(&mut self, variable: VariableHandle, value: Variant) -> Result<(), ModelError>;
}
