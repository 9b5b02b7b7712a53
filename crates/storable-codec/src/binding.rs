//! Binding a host type to an [`EncodingStrategy`].
//!
//! The codecs work on rows of [`Value`]s. A [`StorableBinding`] bridges a host
//! type to those rows through one getter/setter pair per property and, for
//! serial encodings, an accessor for the host's [`PropertyStates`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use storable_codec::types::{LogicalType, PropertyDescriptor, PropertySchema};
//! use storable_codec::{CodecError, EncodingStrategy, StorableBinding, StrategyConfig, Value};
//!
//! #[derive(Default)]
//! struct Point {
//!     x: i32,
//!     label: String,
//! }
//!
//! let schema = PropertySchema::builder()
//!     .key(PropertyDescriptor::new("x", LogicalType::I32))
//!     .data(PropertyDescriptor::new("label", LogicalType::String))
//!     .build()
//!     .unwrap();
//! let strategy = Arc::new(EncodingStrategy::new("Point", schema, StrategyConfig::new()).unwrap());
//!
//! let binding = StorableBinding::builder(strategy)
//!     .property(
//!         "x",
//!         |p: &Point| Value::I32(p.x),
//!         |p: &mut Point, v| match v {
//!             Value::I32(x) => {
//!                 p.x = x;
//!                 Ok(())
//!             }
//!             other => Err(CodecError::illegal(format!("x: {other:?}"))),
//!         },
//!     )
//!     .property(
//!         "label",
//!         |p: &Point| Value::String(p.label.clone()),
//!         |p: &mut Point, v| match v {
//!             Value::String(s) => {
//!                 p.label = s;
//!                 Ok(())
//!             }
//!             other => Err(CodecError::illegal(format!("label: {other:?}"))),
//!         },
//!     )
//!     .build()
//!     .unwrap();
//!
//! let point = Point { x: 3, label: "origin-ish".into() };
//! let key = binding.encode_key(&point).unwrap();
//! let data = binding.encode_data(&point, None).unwrap();
//!
//! let mut copy = Point::default();
//! binding.decode_key_into(&key, &mut copy).unwrap();
//! binding.decode_data_into(&data, &mut copy, None).unwrap();
//! assert_eq!((copy.x, copy.label.as_str()), (3, "origin-ish"));
//! ```

use std::fmt;
use std::ops::RangeBounds;
use std::sync::Arc;

use crate::error::{CodecError, CodecResult};
use crate::strategy::EncodingStrategy;
use crate::types::{PropertyStates, Value};

type Getter<S> = Box<dyn Fn(&S) -> Value + Send + Sync>;
type Setter<S> = Box<dyn Fn(&mut S, Value) -> CodecResult<()> + Send + Sync>;
type StatesRef<S> = Box<dyn Fn(&S) -> &PropertyStates + Send + Sync>;
type StatesMut<S> = Box<dyn Fn(&mut S) -> &mut PropertyStates + Send + Sync>;

struct Accessor<S> {
    get: Getter<S>,
    set: Setter<S>,
}

struct StateAccess<S> {
    get: StatesRef<S>,
    get_mut: StatesMut<S>,
}

/// Encodes and decodes a host type `S` through accessor closures.
///
/// Setters are applied one property at a time after the whole buffer has
/// decoded; a failing setter leaves the properties before it already written.
pub struct StorableBinding<S> {
    strategy: Arc<EncodingStrategy>,
    /// Indexed by ordinal.
    accessors: Vec<Accessor<S>>,
    states: Option<StateAccess<S>>,
}

impl<S> fmt::Debug for StorableBinding<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorableBinding")
            .field("type_name", &self.strategy.type_name())
            .field("properties", &self.accessors.len())
            .field("tracks_states", &self.states.is_some())
            .finish()
    }
}

impl<S> StorableBinding<S> {
    /// Starts a binding over `strategy`.
    #[must_use]
    pub fn builder(strategy: Arc<EncodingStrategy>) -> StorableBindingBuilder<S> {
        let slots = (0..strategy.schema().len()).map(|_| None).collect();
        StorableBindingBuilder { strategy, accessors: slots, states: None, error: None }
    }

    /// The bound strategy.
    #[must_use]
    pub fn strategy(&self) -> &Arc<EncodingStrategy> {
        &self.strategy
    }

    fn blank_row(&self) -> Vec<Value> {
        vec![Value::Null; self.accessors.len()]
    }

    fn read(&self, source: &S, ordinals: &[usize]) -> Vec<Value> {
        let mut row = self.blank_row();
        for &ordinal in ordinals {
            row[ordinal] = (self.accessors[ordinal].get)(source);
        }
        row
    }

    fn write(&self, target: &mut S, mut row: Vec<Value>, ordinals: &[usize]) -> CodecResult<()> {
        for &ordinal in ordinals {
            let value = std::mem::replace(&mut row[ordinal], Value::Null);
            (self.accessors[ordinal].set)(target, value)?;
        }
        Ok(())
    }

    fn state_access(&self) -> CodecResult<&StateAccess<S>> {
        self.states.as_ref().ok_or_else(|| {
            CodecError::illegal(format!(
                "{} binding has no property state accessor",
                self.strategy.type_name()
            ))
        })
    }

    /// Encodes the full key of `source`.
    ///
    /// # Errors
    ///
    /// See [`EncodingStrategy::build_key_encoding`].
    pub fn encode_key(&self, source: &S) -> CodecResult<Vec<u8>> {
        self.encode_key_range(source, ..)
    }

    /// Encodes the `range` slice of the key properties of `source`.
    ///
    /// # Errors
    ///
    /// See [`EncodingStrategy::build_key_encoding`].
    pub fn encode_key_range(
        &self,
        source: &S,
        range: impl RangeBounds<usize>,
    ) -> CodecResult<Vec<u8>> {
        let row = self.read(source, self.strategy.schema().key_ordinals());
        self.strategy.build_key_encoding(&row, range)
    }

    /// Decodes a full key and sets the key properties of `target`.
    ///
    /// # Errors
    ///
    /// See [`EncodingStrategy::build_key_decoding`]; setter errors are passed through.
    pub fn decode_key_into(&self, bytes: &[u8], target: &mut S) -> CodecResult<()> {
        let mut row = self.blank_row();
        self.strategy.build_key_decoding(bytes, &mut row, ..)?;
        self.write(target, row, self.strategy.schema().key_ordinals())
    }

    /// Encodes the non-key properties of `source`.
    ///
    /// # Errors
    ///
    /// See [`EncodingStrategy::build_data_encoding`].
    pub fn encode_data(&self, source: &S, generation: Option<u32>) -> CodecResult<Vec<u8>> {
        let row = self.read(source, self.strategy.schema().data_ordinals());
        self.strategy.build_data_encoding(&row, generation)
    }

    /// Decodes a data encoding and sets the non-key properties of `target`.
    ///
    /// # Errors
    ///
    /// See [`EncodingStrategy::build_data_decoding`]; setter errors are passed through.
    pub fn decode_data_into(
        &self,
        bytes: &[u8],
        target: &mut S,
        expected: Option<u32>,
    ) -> CodecResult<()> {
        let mut row = self.blank_row();
        self.strategy.build_data_decoding(bytes, &mut row, expected, None)?;
        self.write(target, row, self.strategy.schema().data_ordinals())
    }

    /// Like [`decode_data_into`](Self::decode_data_into), but hands data from
    /// another generation to `upgrade` along with the generation it carries.
    ///
    /// # Errors
    ///
    /// See [`EncodingStrategy::build_data_decoding`]; errors from `upgrade` and
    /// from setters are passed through.
    pub fn decode_data_into_or_else<F>(
        &self,
        bytes: &[u8],
        target: &mut S,
        expected: Option<u32>,
        mut upgrade: F,
    ) -> CodecResult<()>
    where
        F: FnMut(u32, &[u8], &mut S) -> CodecResult<()>,
    {
        let mut row = self.blank_row();
        let mut foreign = None;
        let mut record = |generation: u32, _: &[u8], _: &mut [Value]| -> CodecResult<()> {
            foreign = Some(generation);
            Ok(())
        };
        self.strategy.build_data_decoding(bytes, &mut row, expected, Some(&mut record))?;
        match foreign {
            Some(generation) => upgrade(generation, bytes, target),
            None => self.write(target, row, self.strategy.schema().data_ordinals()),
        }
    }

    /// Encodes the initialized properties of `source`.
    ///
    /// Only initialized properties are read from `source`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::IllegalArgument`] if the binding has no state
    /// accessor; otherwise see [`EncodingStrategy::build_serial_encoding`].
    pub fn encode_serial(&self, source: &S) -> CodecResult<Vec<u8>> {
        let states = (self.state_access()?.get)(source);
        let initialized: Vec<usize> =
            states.initialized().filter(|&o| o < self.accessors.len()).collect();
        let row = self.read(source, &initialized);
        self.strategy.build_serial_encoding(&row, states)
    }

    /// Decodes a serial encoding into every property of `target` and its states.
    ///
    /// Uninitialized properties are set to their zero value.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::IllegalArgument`] if the binding has no state
    /// accessor; otherwise see [`EncodingStrategy::build_serial_decoding`].
    /// Setter errors are passed through.
    pub fn decode_serial_into(&self, bytes: &[u8], target: &mut S) -> CodecResult<()> {
        let access = self.state_access()?;
        let mut row = self.blank_row();
        let mut states = (access.get)(target).clone();
        self.strategy.build_serial_decoding(bytes, &mut row, &mut states)?;
        let ordinals: Vec<usize> = (0..self.accessors.len()).collect();
        self.write(target, row, &ordinals)?;
        *(access.get_mut)(target) = states;
        Ok(())
    }
}

/// Builder for [`StorableBinding`].
///
/// Every property of the strategy's schema needs an accessor pair.
pub struct StorableBindingBuilder<S> {
    strategy: Arc<EncodingStrategy>,
    accessors: Vec<Option<Accessor<S>>>,
    states: Option<StateAccess<S>>,
    error: Option<CodecError>,
}

impl<S> StorableBindingBuilder<S> {
    /// Binds the property called `name`.
    #[must_use]
    pub fn property<G, T>(mut self, name: &str, get: G, set: T) -> Self
    where
        G: Fn(&S) -> Value + Send + Sync + 'static,
        T: Fn(&mut S, Value) -> CodecResult<()> + Send + Sync + 'static,
    {
        if self.error.is_some() {
            return self;
        }
        let Some(ordinal) = self.strategy.schema().property(name).map(|p| p.ordinal()) else {
            self.error = Some(CodecError::illegal(format!(
                "{} has no property '{name}'",
                self.strategy.type_name()
            )));
            return self;
        };
        if self.accessors[ordinal].is_some() {
            self.error = Some(CodecError::illegal(format!("property '{name}' is bound twice")));
            return self;
        }
        self.accessors[ordinal] = Some(Accessor { get: Box::new(get), set: Box::new(set) });
        self
    }

    /// Binds the host's property state bitmap, needed for serial encodings.
    #[must_use]
    pub fn states<G, M>(mut self, get: G, get_mut: M) -> Self
    where
        G: Fn(&S) -> &PropertyStates + Send + Sync + 'static,
        M: Fn(&mut S) -> &mut PropertyStates + Send + Sync + 'static,
    {
        self.states = Some(StateAccess { get: Box::new(get), get_mut: Box::new(get_mut) });
        self
    }

    /// Finishes the binding.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::IllegalArgument`] for an unknown or doubly bound
    /// property name, or if any schema property was left unbound.
    pub fn build(self) -> CodecResult<StorableBinding<S>> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let schema = self.strategy.schema();
        let mut accessors = Vec::with_capacity(self.accessors.len());
        for (ordinal, slot) in self.accessors.into_iter().enumerate() {
            let accessor = slot.ok_or_else(|| {
                CodecError::illegal(format!(
                    "property '{}' of {} has no accessor",
                    schema.properties()[ordinal].name(),
                    self.strategy.type_name()
                ))
            })?;
            accessors.push(accessor);
        }
        Ok(StorableBinding { strategy: self.strategy, accessors, states: self.states })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::strategy::StrategyConfig;
    use crate::types::{LogicalType, PropertyDescriptor, PropertySchema, PropertyState};

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Account {
        region: String,
        number: u32,
        owner: Option<String>,
        balance: i64,
        states: PropertyStates,
    }

    fn strategy() -> Arc<EncodingStrategy> {
        let schema = PropertySchema::builder()
            .key(PropertyDescriptor::new("region", LogicalType::String))
            .key(PropertyDescriptor::new("number", LogicalType::U32))
            .data(PropertyDescriptor::new("owner", LogicalType::String).nullable())
            .data(PropertyDescriptor::new("balance", LogicalType::I64))
            .build()
            .unwrap();
        Arc::new(EncodingStrategy::new("Account", schema, StrategyConfig::new()).unwrap())
    }

    fn mismatch(name: &str, v: &Value) -> CodecError {
        CodecError::illegal(format!("{name}: unexpected {}", v.type_name()))
    }

    fn builder() -> StorableBindingBuilder<Account> {
        StorableBinding::builder(strategy())
            .property(
                "region",
                |a: &Account| Value::String(a.region.clone()),
                |a: &mut Account, v| match v {
                    Value::String(s) => {
                        a.region = s;
                        Ok(())
                    }
                    other => Err(mismatch("region", &other)),
                },
            )
            .property(
                "number",
                |a: &Account| Value::U32(a.number),
                |a: &mut Account, v| match v {
                    Value::U32(n) => {
                        a.number = n;
                        Ok(())
                    }
                    other => Err(mismatch("number", &other)),
                },
            )
            .property(
                "owner",
                |a: &Account| a.owner.clone().into(),
                |a: &mut Account, v| match v {
                    Value::Null => {
                        a.owner = None;
                        Ok(())
                    }
                    Value::String(s) => {
                        a.owner = Some(s);
                        Ok(())
                    }
                    other => Err(mismatch("owner", &other)),
                },
            )
            .property(
                "balance",
                |a: &Account| Value::I64(a.balance),
                |a: &mut Account, v| match v {
                    Value::I64(b) => {
                        a.balance = b;
                        Ok(())
                    }
                    other => Err(mismatch("balance", &other)),
                },
            )
    }

    fn binding() -> StorableBinding<Account> {
        builder().states(|a: &Account| &a.states, |a: &mut Account| &mut a.states).build().unwrap()
    }

    fn account() -> Account {
        Account {
            region: "eu".into(),
            number: 1001,
            owner: Some("Ada".into()),
            balance: -250,
            states: PropertyStates::new(4),
        }
    }

    // ========================================================================
    // Builder
    // ========================================================================

    #[test]
    fn unknown_property_rejected() {
        let err = builder().property("nope", |_| Value::Null, |_, _| Ok(())).build().unwrap_err();
        assert!(err.to_string().contains("no property 'nope'"));
    }

    #[test]
    fn missing_property_rejected() {
        let err = StorableBinding::<Account>::builder(strategy())
            .property("region", |a| Value::String(a.region.clone()), |_, _| Ok(()))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("has no accessor"));
    }

    #[test]
    fn double_binding_rejected() {
        let err =
            builder().property("balance", |_| Value::I64(0), |_, _| Ok(())).build().unwrap_err();
        assert!(err.to_string().contains("bound twice"));
    }

    // ========================================================================
    // Encoding
    // ========================================================================

    #[test]
    fn key_and_data_roundtrip() {
        let binding = binding();
        let original = account();
        let key = binding.encode_key(&original).unwrap();
        let data = binding.encode_data(&original, Some(2)).unwrap();

        let mut decoded = Account::default();
        binding.decode_key_into(&key, &mut decoded).unwrap();
        assert_eq!(decoded.region, "eu");
        assert_eq!(decoded.owner, None);
        binding.decode_data_into(&data, &mut decoded, Some(2)).unwrap();
        assert_eq!(decoded.owner.as_deref(), Some("Ada"));
        assert_eq!(decoded.balance, -250);
    }

    #[test]
    fn key_range_is_prefix_of_full_key() {
        let binding = binding();
        let original = account();
        let full = binding.encode_key(&original).unwrap();
        let leading = binding.encode_key_range(&original, ..1).unwrap();
        assert!(full.starts_with(&leading));
    }

    #[test]
    fn upgrade_handler_receives_foreign_generation() {
        let binding = binding();
        let data = binding.encode_data(&account(), Some(1)).unwrap();

        let mut decoded = Account::default();
        binding
            .decode_data_into_or_else(&data, &mut decoded, Some(2), |generation, _, target| {
                target.balance = i64::from(generation);
                Ok(())
            })
            .unwrap();
        assert_eq!(decoded.balance, 1);
        assert_eq!(decoded.owner, None);

        let err = binding.decode_data_into(&data, &mut decoded, Some(2)).unwrap_err();
        assert_eq!(err.generations(), Some((2, 1)));
    }

    #[test]
    fn serial_roundtrip_resets_uninitialized() {
        let binding = binding();
        let mut original = account();
        original.states.set(1, PropertyState::Dirty);
        original.states.set(3, PropertyState::Clean);
        let bytes = binding.encode_serial(&original).unwrap();

        let mut decoded = account();
        binding.decode_serial_into(&bytes, &mut decoded).unwrap();
        assert_eq!(decoded.region, "");
        assert_eq!(decoded.number, 1001);
        assert_eq!(decoded.owner, None);
        assert_eq!(decoded.balance, -250);
        assert_eq!(decoded.states, original.states);
    }

    #[test]
    fn serial_needs_state_accessor() {
        let binding = builder().build().unwrap();
        let err = binding.encode_serial(&account()).unwrap_err();
        assert!(matches!(err, CodecError::IllegalArgument(_)));
    }

    #[test]
    fn setter_errors_propagate() {
        let binding = StorableBinding::builder(strategy())
            .property("region", |a: &Account| Value::String(a.region.clone()), |_, _| Ok(()))
            .property("number", |a: &Account| Value::U32(a.number), |_, _| {
                Err(CodecError::illegal("read-only"))
            })
            .property("owner", |_| Value::Null, |_, _| Ok(()))
            .property("balance", |_| Value::I64(0), |_, _| Ok(()))
            .build()
            .unwrap();
        let key = binding.encode_key(&account()).unwrap();
        let err = binding.decode_key_into(&key, &mut Account::default()).unwrap_err();
        assert!(err.to_string().contains("read-only"));
    }
}
