//! User objects as the marshaller sees them.
//!
//! Working memory holds [`Fact`]s: opaque, shared (`Arc`) values whose only
//! mandatory capability is naming their type. A type that additionally
//! implements [`Externalizable`] knows how to turn itself into bytes and back,
//! which is what the content strategy needs. Decoding goes through a
//! [`TypeRegistry`] keyed by type name, since a stream only records the name.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::calendar::Calendar;
use crate::error::{MarshalError, Result};

// ------------- Fact -------------
pub trait Fact: Any + Send + Sync + fmt::Debug {
    /// Fully qualified type name, matched by acceptors and recorded as the slot type tag.
    fn type_name(&self) -> &str;
    fn as_any(&self) -> &dyn Any;
    /// The self-describing byte form, if this type has one.
    fn externalize(&self) -> Option<Result<Vec<u8>>> {
        None
    }
    fn as_calendar(&self) -> Option<&dyn Calendar> {
        None
    }
}

pub type FactRef = Arc<dyn Fact>;

impl dyn Fact {
    pub fn downcast_ref<T: Fact>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
    pub fn is<T: Fact>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

// ------------- Externalizable -------------
pub trait Externalizable: Fact + Sized {
    const TYPE_NAME: &'static str;
    fn encode(&self) -> Result<Vec<u8>>;
    fn decode(bytes: &[u8]) -> Result<Self>;
}

/// Implements [`Fact`] for a type.
///
/// `fact!(Person)` wires an [`Externalizable`] type so that it can travel
/// through the content strategy. `fact!(Handle, opaque = "org.acme.Handle")`
/// declares a type without a byte form; such objects can only be marshalled
/// by identity.
#[macro_export]
macro_rules! fact {
    ($ty:ty) => {
        impl $crate::object::Fact for $ty {
            fn type_name(&self) -> &str {
                <$ty as $crate::object::Externalizable>::TYPE_NAME
            }
            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }
            fn externalize(
                &self,
            ) -> ::std::option::Option<$crate::error::Result<::std::vec::Vec<u8>>> {
                ::std::option::Option::Some(<$ty as $crate::object::Externalizable>::encode(self))
            }
        }
    };
    ($ty:ty, opaque = $name:expr) => {
        impl $crate::object::Fact for $ty {
            fn type_name(&self) -> &str {
                $name
            }
            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }
        }
    };
}

pub fn encode_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

pub fn decode_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(bytes)?)
}

// ------------- TypeRegistry -------------
type Decoder = Arc<dyn Fn(&[u8]) -> Result<FactRef> + Send + Sync>;

#[derive(Clone, Default)]
pub struct TypeRegistry {
    decoders: HashMap<String, Decoder>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }
    /// Returns true if a decoder was already registered under the same name.
    pub fn register<T: Externalizable>(&mut self) -> bool {
        self.register_with(T::TYPE_NAME, |bytes| {
            let object: FactRef = Arc::new(T::decode(bytes)?);
            Ok(object)
        })
    }
    pub fn register_with<F>(&mut self, type_name: &str, decoder: F) -> bool
    where
        F: Fn(&[u8]) -> Result<FactRef> + Send + Sync + 'static,
    {
        self.decoders
            .insert(type_name.to_owned(), Arc::new(decoder))
            .is_some()
    }
    pub fn contains(&self, type_name: &str) -> bool {
        self.decoders.contains_key(type_name)
    }
    pub fn decode(&self, type_tag: &str, bytes: &[u8]) -> Result<FactRef> {
        let decoder = self
            .decoders
            .get(type_tag)
            .ok_or_else(|| MarshalError::ClassResolution { type_tag: type_tag.to_owned() })?;
        decoder(bytes)
    }
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.decoders.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
    pub fn len(&self) -> usize {
        self.decoders.len()
    }
    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.type_names())
            .finish()
    }
}
