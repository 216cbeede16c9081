//! Error type and Return values used by the Serialization.

use core::fmt::Display;

use serde::ser;

/// Represents all possible errors that can happen during Serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The value contains a type that is not directly representable in
    /// Solidity types.
    ///
    /// For example floating point numbers, options, enums and maps. We don't
    /// pick a representation for these, as it would force a specific layout on
    /// the Solidity side.
    TypeNotRepresentable(&'static str),
    /// The type is representable in Solidity, but only as a dynamic type
    /// (`string`, `bytes`, `T[]`). Channel states are fixed-size tuples, so
    /// the serializer only writes the static head.
    DynamicTypeNotSupported(&'static str),
    /// Although the type is representable in Solidity (currently only used for
    /// `char`), the Serializer does not implement this functionality.
    TypeNotYetSupported(&'static str),
    /// Raised by a `Serialize` implementation via [ser::Error::custom()].
    Custom(String),
}

impl ser::Error for Error {
    fn custom<T>(msg: T) -> Self
    where
        T: core::fmt::Display,
    {
        Error::Custom(msg.to_string())
    }
}

impl std::error::Error for Error {}

impl Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::TypeNotRepresentable(type_name) => {
                f.write_str("type is not representable in abi encoding: ")?;
                f.write_str(type_name)
            }
            Error::DynamicTypeNotSupported(type_name) => {
                f.write_str("dynamic abi types are not supported: ")?;
                f.write_str(type_name)
            }
            Error::TypeNotYetSupported(type_name) => {
                f.write_str("type is not yet implemented: ")?;
                f.write_str(type_name)
            }
            Error::Custom(msg) => f.write_str(msg),
        }
    }
}

/// Alias for `Result` using the [Error] returned by the Serializer.
pub type Result<T> = core::result::Result<T, Error>;
