//! Integration tests for EncodingStrategy.

use std::ops::Bound;

use storable_codec::types::{Adapter, LobLocator};
use storable_codec::{
    CodecError, EncodingStrategy, LogicalType, PropertyDescriptor, PropertySchema, PropertyState,
    PropertyStates, StrategyConfig, Value,
};

fn key_only(descriptors: Vec<PropertyDescriptor>, config: StrategyConfig) -> EncodingStrategy {
    let schema = descriptors
        .into_iter()
        .fold(PropertySchema::builder(), |b, d| b.key(d))
        .build()
        .expect("valid schema");
    EncodingStrategy::new("Test", schema, config).expect("supported schema")
}

fn int_key(nullable: bool, descending: bool) -> EncodingStrategy {
    let mut d = PropertyDescriptor::new("n", LogicalType::I32);
    if nullable {
        d = d.nullable();
    }
    if descending {
        d = d.descending();
    }
    key_only(vec![d], StrategyConfig::new())
}

// ============================================================================
// Key ordering
// ============================================================================

#[test]
fn negative_one_sorts_before_zero() {
    let strategy = int_key(false, false);
    let minus_one = strategy.build_key_encoding(&[Value::I32(-1)], ..).unwrap();
    let zero = strategy.build_key_encoding(&[Value::I32(0)], ..).unwrap();
    assert!(minus_one < zero);
    assert_eq!(minus_one, vec![0x7F, 0xFF, 0xFF, 0xFF]);
    assert_eq!(zero, vec![0x80, 0x00, 0x00, 0x00]);
}

#[test]
fn null_sorts_first_ascending_and_last_descending() {
    let asc = int_key(true, false);
    let null = asc.build_key_encoding(&[Value::Null], ..).unwrap();
    let zero = asc.build_key_encoding(&[Value::I32(0)], ..).unwrap();
    assert!(null < zero);
    assert_eq!(null.len(), 1);
    assert_eq!(zero.len(), 5);

    let desc = int_key(true, true);
    let null = desc.build_key_encoding(&[Value::Null], ..).unwrap();
    let zero = desc.build_key_encoding(&[Value::I32(0)], ..).unwrap();
    assert!(null > zero);
}

#[test]
fn descending_reverses_integer_order() {
    let strategy = int_key(false, true);
    let keys: Vec<Vec<u8>> = [i32::MIN, -1, 0, 1, i32::MAX]
        .iter()
        .map(|&v| strategy.build_key_encoding(&[Value::I32(v)], ..).unwrap())
        .collect();
    assert!(keys.windows(2).all(|w| w[0] > w[1]));
}

#[test]
fn string_prefix_sorts_first() {
    let strategy = key_only(
        vec![
            PropertyDescriptor::new("s", LogicalType::String),
            PropertyDescriptor::new("n", LogicalType::U8),
        ],
        StrategyConfig::new(),
    );
    let short = strategy.build_key_encoding(&[Value::from("ab"), Value::U8(0xFF)], ..).unwrap();
    let long = strategy.build_key_encoding(&[Value::from("ab\0"), Value::U8(0)], ..).unwrap();
    assert!(short < long);
}

// ============================================================================
// Partial keys
// ============================================================================

fn three_part(config: StrategyConfig) -> EncodingStrategy {
    key_only(
        vec![
            PropertyDescriptor::new("a", LogicalType::I32),
            PropertyDescriptor::new("b", LogicalType::String),
            PropertyDescriptor::new("c", LogicalType::I32),
        ],
        config,
    )
}

fn ten_abc_five() -> Vec<Value> {
    vec![Value::I32(10), Value::from("abc"), Value::I32(5)]
}

#[test]
fn partial_keys_concatenate_to_full_key() {
    let strategy = three_part(StrategyConfig::new());
    let values = ten_abc_five();
    let head = strategy.build_key_encoding(&values, 0..2).unwrap();
    let tail = strategy.build_key_encoding(&values, 2..3).unwrap();
    let full = strategy.build_key_encoding(&values, 0..3).unwrap();
    assert_eq!([head, tail].concat(), full);
}

#[test]
fn partial_keys_own_only_their_padding() {
    let strategy = three_part(StrategyConfig::new().key_prefix(3).key_suffix(2));
    let values = ten_abc_five();
    let head = strategy.build_key_encoding(&values, ..2).unwrap();
    let tail = strategy.build_key_encoding(&values, 2..).unwrap();
    let full = strategy.build_key_encoding(&values, ..).unwrap();

    assert_eq!(&head[..3], &[0, 0, 0]);
    assert_eq!(head.len(), 3 + 4 + 5);
    assert_eq!(tail.len(), 4 + 2);
    assert_eq!([head, tail].concat(), full);

    let mut decoded = vec![Value::Null; 3];
    strategy.build_key_decoding(&full, &mut decoded, ..).unwrap();
    assert_eq!(decoded, values);
}

#[test]
fn invalid_partial_bounds_are_rejected() {
    let strategy = three_part(StrategyConfig::new());
    let values = ten_abc_five();
    for result in [
        strategy.build_key_encoding(&values, 3..),
        strategy.build_key_encoding(&values, ..4),
        strategy.build_key_encoding(&values, (Bound::Included(2), Bound::Excluded(1))),
    ] {
        assert!(matches!(result, Err(CodecError::IllegalArgument(_))));
    }
}

#[test]
fn single_property_ignores_partial_bounds() {
    let strategy = int_key(false, false);
    let full = strategy.build_key_encoding(&[Value::I32(7)], ..).unwrap();
    let partial = strategy.build_key_encoding(&[Value::I32(7)], 5..9).unwrap();
    assert_eq!(full, partial);
}

// ============================================================================
// Data and generations
// ============================================================================

fn data_strategy() -> EncodingStrategy {
    let schema = PropertySchema::builder()
        .key(PropertyDescriptor::new("id", LogicalType::U64))
        .data(PropertyDescriptor::new("title", LogicalType::String))
        .data(PropertyDescriptor::new("pages", LogicalType::U16).nullable())
        .data(PropertyDescriptor::new("scan", LogicalType::Lob).nullable())
        .build()
        .unwrap();
    EncodingStrategy::new("Book", schema, StrategyConfig::new().data_prefix(1)).unwrap()
}

fn book() -> Vec<Value> {
    vec![
        Value::U64(9),
        Value::from("Dune"),
        Value::Null,
        Value::Lob(LobLocator::new(77)),
    ]
}

#[test]
fn data_roundtrip_with_generation() {
    let strategy = data_strategy();
    let data = strategy.build_data_encoding(&book(), Some(200)).unwrap();
    // prefix, 4-byte tag, title, null pages, lob
    assert_eq!(data.len(), 1 + 4 + (1 + 4) + 1 + (1 + 8));
    assert_eq!(strategy.data_codec().peek_generation(&data).unwrap(), 200);

    let mut row = vec![Value::Null; 4];
    strategy.build_data_decoding(&data, &mut row, Some(200), None).unwrap();
    assert_eq!(row[0], Value::Null);
    assert_eq!(&row[1..], &book()[1..]);
}

#[test]
fn generation_mismatch_is_corrupt() {
    let strategy = data_strategy();
    let data = strategy.build_data_encoding(&book(), Some(5)).unwrap();
    let mut row = vec![Value::Null; 4];
    let err = strategy.build_data_decoding(&data, &mut row, Some(6), None).unwrap_err();
    assert!(err.is_corrupt());
    assert_eq!(err.generations(), Some((6, 5)));
    assert!(row.iter().all(Value::is_null));
}

#[test]
fn single_data_property_decodes_alone() {
    let strategy = data_strategy();
    let row = book();
    let data = strategy.build_data_encoding(&row, Some(2)).unwrap();

    for ordinal in 1..4 {
        let value = strategy.build_data_field_decoding(&data, ordinal, Some(2)).unwrap();
        assert_eq!(value, row[ordinal]);
    }
    let err = strategy.build_data_field_decoding(&data, 0, Some(2)).unwrap_err();
    assert!(err.is_configuration());
    let err = strategy.build_data_field_decoding(&data, 3, Some(1)).unwrap_err();
    assert_eq!(err.generations(), Some((1, 2)));
}

#[test]
fn skipped_presence_byte_is_validated() {
    let strategy = data_strategy();
    let mut data = strategy.build_data_encoding(&book(), None).unwrap();
    // prefix, title (1 + 4), pages presence byte
    assert_eq!(data[6], 0x00);
    data[6] = 0x05;

    let title = strategy.build_data_field_decoding(&data, 1, None).unwrap();
    assert_eq!(title, Value::from("Dune"));
    let err = strategy.build_data_field_decoding(&data, 3, None).unwrap_err();
    assert!(err.is_corrupt());
}

#[test]
fn out_of_range_generation_is_rejected() {
    let strategy = data_strategy();
    let err = strategy.build_data_encoding(&book(), Some(0x8000_0000)).unwrap_err();
    assert!(matches!(err, CodecError::IllegalArgument(_)));
}

#[test]
fn missing_required_value_is_illegal() {
    let strategy = data_strategy();
    let mut row = book();
    row[1] = Value::Null;
    let err = strategy.build_data_encoding(&row, None).unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn truncated_data_is_corrupt() {
    let strategy = data_strategy();
    let data = strategy.build_data_encoding(&book(), None).unwrap();
    let mut row = vec![Value::Null; 4];
    let truncated = &data[..data.len() - 3];
    let err = strategy.build_data_decoding(truncated, &mut row, None, None).unwrap_err();
    assert!(err.is_corrupt());
}

// ============================================================================
// Serial
// ============================================================================

#[test]
fn serial_encodes_only_initialized_properties() {
    let schema = PropertySchema::builder()
        .key(PropertyDescriptor::new("id", LogicalType::I64))
        .data(PropertyDescriptor::new("name", LogicalType::String))
        .data(PropertyDescriptor::new("email", LogicalType::String).nullable())
        .data(PropertyDescriptor::new("age", LogicalType::I32))
        .data(PropertyDescriptor::new("avatar", LogicalType::Bytes))
        .build()
        .unwrap();
    let strategy = EncodingStrategy::new("Person", schema, StrategyConfig::new()).unwrap();
    let row = vec![
        Value::I64(1),
        Value::from("Lin"),
        Value::from("lin@example.com"),
        Value::I32(40),
        Value::Bytes(vec![1, 2, 3]),
    ];
    let mut states = PropertyStates::new(5);
    states.set(0, PropertyState::Dirty);
    states.set(3, PropertyState::Clean);

    let bytes = strategy.build_serial_encoding(&row, &states).unwrap();
    let state_len = strategy.serial_codec().state_len();
    assert_eq!(state_len, 2);
    assert_eq!(bytes.len(), state_len + 8 + 4);

    let mut decoded = row.clone();
    let mut decoded_states = PropertyStates::new(5);
    strategy.build_serial_decoding(&bytes, &mut decoded, &mut decoded_states).unwrap();
    assert_eq!(
        decoded,
        vec![
            Value::I64(1),
            Value::String(String::new()),
            Value::Null,
            Value::I32(40),
            Value::Bytes(Vec::new()),
        ]
    );
    assert_eq!(decoded_states, states);
}

// ============================================================================
// Schema validation
// ============================================================================

#[test]
fn unsupported_type_needs_an_adapter() {
    let opaque = LogicalType::Opaque("Duration".into());
    let schema = PropertySchema::builder()
        .key(PropertyDescriptor::new("ttl", opaque.clone()))
        .build()
        .unwrap();
    let err = EncodingStrategy::new("Lease", schema, StrategyConfig::new()).unwrap_err();
    assert!(matches!(err, CodecError::UnsupportedPropertyType { .. }));

    let adapter = Adapter::new(
        "seconds",
        LogicalType::U32,
        |v| match v {
            Value::U64(ms) => Ok(Value::U32((ms / 1000) as u32)),
            other => Err(CodecError::illegal(format!("not a duration: {other:?}"))),
        },
        |v| match v {
            Value::U32(s) => Ok(Value::U64(u64::from(*s) * 1000)),
            other => Err(CodecError::corrupt(format!("not seconds: {other:?}"))),
        },
    );
    let schema = PropertySchema::builder()
        .key(PropertyDescriptor::new("ttl", opaque).with_adapter(adapter))
        .build()
        .unwrap();
    let strategy = EncodingStrategy::new("Lease", schema, StrategyConfig::new()).unwrap();
    let key = strategy.build_key_encoding(&[Value::U64(30_000)], ..).unwrap();
    assert_eq!(key, 30u32.to_be_bytes());

    let mut row = vec![Value::Null];
    strategy.build_key_decoding(&key, &mut row, ..).unwrap();
    assert_eq!(row, vec![Value::U64(30_000)]);
}

#[test]
fn strategies_compare_by_type_and_padding() {
    let a = three_part(StrategyConfig::new().key_prefix(1));
    let b = three_part(StrategyConfig::new().key_prefix(1));
    let c = three_part(StrategyConfig::new().data_suffix(1));
    assert_eq!(a, b);
    assert_ne!(a, c);
}
